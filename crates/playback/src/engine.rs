//! The playback state machine.
//!
//! [`PlaybackEngine::start`] spawns a player task that owns all traversal
//! state and returns a [`PlayerHandle`] for driving it. Per node visit the
//! player goes `ENTER -> PLAYING -> { advance | AWAITING_CHOICE | TERMINAL }`.
//!
//! There is at most one primary timer. It is a sleep owned by the player
//! loop and replaced on every `ENTER`, so a timer armed for a node that has
//! been left can never fire.

use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use pov_assets::StoredAsset;
use pov_core::scenario::node_types;
use pov_core::types::{ChoiceId, NodeId};
use pov_core::{GraphStore, Node, TimerSettings};
use tokio::sync::{broadcast, mpsc, oneshot, watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::Sleep;
use tokio_util::sync::CancellationToken;

use crate::audio::{AudioTrack, TrackSpec};
use crate::error::{PlaybackError, TransitionError};
use crate::source::MediaSource;
use crate::state::{EventSender, PlaybackEvent, PlaybackState, DEFAULT_EVENT_CAPACITY};

/// Number of volume steps in a fade.
pub const DEFAULT_FADE_STEPS: u32 = 50;

#[derive(Debug, Clone)]
pub struct PlaybackConfig {
    pub fade_steps: u32,
    pub event_capacity: usize,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            fade_steps: DEFAULT_FADE_STEPS,
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

pub struct PlaybackEngine {
    graph: Arc<GraphStore>,
    media: Arc<dyn MediaSource>,
    config: PlaybackConfig,
}

impl PlaybackEngine {
    pub fn new(graph: Arc<GraphStore>, media: Arc<dyn MediaSource>, config: PlaybackConfig) -> Self {
        Self {
            graph,
            media,
            config,
        }
    }

    /// Start playing from the graph's start node.
    ///
    /// Must be called within a Tokio runtime. Every call starts a fresh
    /// player; there is no resume.
    pub fn start(&self) -> Result<PlayerHandle, PlaybackError> {
        self.start_subscribed().map(|(player, _)| player)
    }

    /// [`start`](Self::start), plus an event receiver that sees every event
    /// from the first `NodeEntered` on.
    pub fn start_subscribed(
        &self,
    ) -> Result<(PlayerHandle, broadcast::Receiver<PlaybackEvent>), PlaybackError> {
        let start = self
            .graph
            .find_start_node()
            .ok_or(PlaybackError::NoStartNode)?
            .id
            .clone();

        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(PlaybackState::Entering {
            node_id: start.clone(),
        });
        let events = EventSender::new(self.config.event_capacity);
        let receiver = events.subscribe();
        let cancel = CancellationToken::new();

        let player = Player {
            graph: Arc::clone(&self.graph),
            media: Arc::clone(&self.media),
            fade_steps: self.config.fade_steps,
            events: events.clone(),
            state: state_tx,
            commands: command_rx,
            cancel: cancel.clone(),
            visit: None,
            timer: None,
            fading: Vec::new(),
        };

        tracing::info!(start_node = %start, nodes = self.graph.node_count(), "Playback starting");
        let task = tokio::spawn(player.run(start));

        let player = PlayerHandle {
            commands: command_tx,
            state: state_rx,
            events,
            cancel,
            task: Mutex::new(Some(task)),
        };
        Ok((player, receiver))
    }
}

// ---------------------------------------------------------------------------
// PlayerHandle
// ---------------------------------------------------------------------------

enum Command {
    Interact,
    MediaEnded,
    SelectChoice {
        choice_id: ChoiceId,
        reply: oneshot::Sender<Result<NodeId, TransitionError>>,
    },
}

/// Caller side of a running player.
///
/// Pair every [`PlaybackEngine::start`] with a [`stop`](Self::stop).
pub struct PlayerHandle {
    commands: mpsc::UnboundedSender<Command>,
    state: watch::Receiver<PlaybackState>,
    events: EventSender,
    cancel: CancellationToken,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl PlayerHandle {
    /// Report a user interaction (click, tap, key press).
    pub fn interact(&self) {
        let _ = self.commands.send(Command::Interact);
    }

    /// Report that the current node's video finished playing.
    pub fn media_ended(&self) {
        let _ = self.commands.send(Command::MediaEnded);
    }

    /// Select a choice on the current node and return the node entered.
    pub async fn select_choice(&self, choice_id: &str) -> Result<NodeId, TransitionError> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(Command::SelectChoice {
                choice_id: choice_id.to_string(),
                reply,
            })
            .map_err(|_| TransitionError::Stopped)?;
        response.await.map_err(|_| TransitionError::Stopped)?
    }

    pub fn state(&self) -> PlaybackState {
        self.state.borrow().clone()
    }

    /// A receiver notified on every state change.
    pub fn watch_state(&self) -> watch::Receiver<PlaybackState> {
        self.state.clone()
    }

    /// Events published from now on. Use
    /// [`PlaybackEngine::start_subscribed`] to also see the start node.
    pub fn subscribe(&self) -> broadcast::Receiver<PlaybackEvent> {
        self.events.subscribe()
    }

    /// Stop playback from any state and wait for the player to wind down.
    ///
    /// Idempotent.
    pub async fn stop(&self) {
        self.cancel.cancel();
        let task = self.task.lock().await.take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                tracing::error!(error = %e, "Player task failed");
            }
        }
    }

    pub fn is_stopped(&self) -> bool {
        matches!(*self.state.borrow(), PlaybackState::Stopped)
    }
}

// ---------------------------------------------------------------------------
// Player task
// ---------------------------------------------------------------------------

struct Visit {
    node: Node,
    /// One-way latch set by the first interaction on a pause-on-interaction
    /// timer.
    interacted: bool,
    /// Keeps the media handle alive for the UI while the node is shown.
    _media: Option<StoredAsset>,
    audio: Option<AudioTrack>,
}

struct Player {
    graph: Arc<GraphStore>,
    media: Arc<dyn MediaSource>,
    fade_steps: u32,
    events: EventSender,
    state: watch::Sender<PlaybackState>,
    commands: mpsc::UnboundedReceiver<Command>,
    cancel: CancellationToken,
    visit: Option<Visit>,
    timer: Option<Pin<Box<Sleep>>>,
    /// Tracks of nodes already left, still fading out.
    fading: Vec<AudioTrack>,
}

/// Resolves when the armed timer fires; never resolves when none is armed.
async fn fired(timer: &mut Option<Pin<Box<Sleep>>>) {
    match timer {
        Some(sleep) => sleep.as_mut().await,
        None => std::future::pending().await,
    }
}

impl Player {
    async fn run(mut self, start: NodeId) {
        self.enter(start).await;

        loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    tracing::debug!("Player stop requested");
                    break;
                }
                command = self.commands.recv() => match command {
                    Some(command) => self.handle(command).await,
                    None => {
                        tracing::debug!("Player handle dropped");
                        break;
                    }
                },
                () = fired(&mut self.timer) => {
                    self.timer = None;
                    self.on_timer().await;
                }
            }
        }

        self.shutdown().await;
    }

    async fn handle(&mut self, command: Command) {
        match command {
            Command::Interact => self.on_interact(),
            Command::MediaEnded => self.on_media_ended().await,
            Command::SelectChoice { choice_id, reply } => {
                let result = self.resolve_choice(&choice_id);
                let target = result.as_ref().ok().cloned();
                if let Err(e) = &result {
                    tracing::warn!(choice_id = %choice_id, error = %e, "Choice selection rejected");
                }
                let _ = reply.send(result);

                if let Some(target) = target {
                    self.advance(target, Some(choice_id)).await;
                }
            }
        }
    }

    // -----------------------------------------------------------------------
    // ENTER
    // -----------------------------------------------------------------------

    async fn enter(&mut self, node_id: NodeId) {
        let previous = self.visit.as_ref().map(|visit| visit.node.id.clone());
        self.leave();

        let Some(node) = self.graph.node(&node_id).cloned() else {
            tracing::error!(%node_id, "Transition target missing from graph");
            // End where the player last was.
            let node_id = previous.unwrap_or(node_id);
            self.set_state(PlaybackState::Terminal {
                node_id: node_id.clone(),
            });
            self.events.publish(PlaybackEvent::Terminal { node_id });
            return;
        };

        self.set_state(PlaybackState::Entering {
            node_id: node_id.clone(),
        });
        self.events.publish(PlaybackEvent::NodeEntered {
            node_id: node_id.clone(),
        });

        let media = match &node.data.media_id {
            Some(asset_id) => self.load(&node_id, asset_id).await,
            None => None,
        };
        if let Some(stored) = &media {
            self.events.publish(PlaybackEvent::MediaReady {
                node_id: node_id.clone(),
                asset_id: stored.metadata.id.clone(),
                kind: stored.metadata.kind,
                url: stored.handle.url().to_string(),
            });
        }

        let audio = match &node.data.audio_id {
            Some(asset_id) => self.load(&node_id, asset_id).await.map(|stored| {
                AudioTrack::spawn(
                    TrackSpec {
                        node_id: node_id.clone(),
                        asset_id: stored.metadata.id.clone(),
                        url: stored.handle.url().to_string(),
                        settings: node.data.content.audio.clone().unwrap_or_default(),
                        fade_steps: self.fade_steps,
                    },
                    self.events.clone(),
                )
            }),
            None => None,
        };

        if self.cancel.is_cancelled() {
            if let Some(track) = audio {
                self.fading.push(track);
            }
            return;
        }

        let timer = still_timer(&node).cloned();
        self.visit = Some(Visit {
            node,
            interacted: false,
            _media: media,
            audio,
        });
        self.set_state(PlaybackState::Playing {
            node_id: node_id.clone(),
        });

        if let Some(timer) = timer {
            self.arm_timer(&node_id, timer.duration);
        }
    }

    /// Load an asset, publishing a placeholder event on failure.
    async fn load(&self, node_id: &str, asset_id: &str) -> Option<StoredAsset> {
        let result = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return None,
            result = self.media.load(asset_id) => result,
        };
        match result {
            Ok(stored) => Some(stored),
            Err(e) => {
                tracing::warn!(node_id, asset_id, error = %e, "Media unavailable, showing placeholder");
                self.events.publish(PlaybackEvent::MediaUnavailable {
                    node_id: node_id.to_string(),
                    asset_id: asset_id.to_string(),
                    reason: e.to_string(),
                });
                None
            }
        }
    }

    /// Clear the primary timer and let the current node's audio fade out.
    fn leave(&mut self) {
        self.timer = None;
        self.fading.retain(|track| !track.is_finished());
        if let Some(visit) = self.visit.take() {
            if let Some(track) = visit.audio {
                track.leave();
                self.fading.push(track);
            }
        }
    }

    fn arm_timer(&mut self, node_id: &str, duration_secs: f64) {
        let secs = if duration_secs.is_finite() && duration_secs > 0.0 {
            duration_secs
        } else {
            0.0
        };
        // Saturates; tokio parks an unreachable deadline in the far future.
        let delay = Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX);
        self.timer = Some(Box::pin(tokio::time::sleep(delay)));
        tracing::debug!(node_id, duration_secs = secs, "Timer armed");
        self.events.publish(PlaybackEvent::TimerArmed {
            node_id: node_id.to_string(),
            duration_secs: secs,
        });
    }

    // -----------------------------------------------------------------------
    // PLAYING
    // -----------------------------------------------------------------------

    async fn on_timer(&mut self) {
        let Some(visit) = &self.visit else {
            return;
        };
        let node_id = visit.node.id.clone();
        if loops(&visit.node) {
            let duration = visit.node.timer().map_or(0.0, |t| t.duration);
            self.events.publish(PlaybackEvent::Looped {
                node_id: node_id.clone(),
            });
            self.arm_timer(&node_id, duration);
            return;
        }
        self.complete().await;
    }

    async fn on_media_ended(&mut self) {
        let Some(visit) = &self.visit else {
            return;
        };
        let playing = matches!(*self.state.borrow(), PlaybackState::Playing { .. });
        if visit.node.node_type != node_types::VIDEO || !playing {
            tracing::debug!(node_id = %visit.node.id, "Ignoring media end");
            return;
        }
        if loops(&visit.node) {
            self.events.publish(PlaybackEvent::Looped {
                node_id: visit.node.id.clone(),
            });
            return;
        }
        self.complete().await;
    }

    fn on_interact(&mut self) {
        let Some(visit) = &mut self.visit else {
            return;
        };
        let pauses = visit
            .node
            .timer()
            .is_some_and(|t| t.pause_on_interaction);
        if !pauses || visit.interacted {
            return;
        }
        visit.interacted = true;
        if self.timer.take().is_some() {
            tracing::debug!(node_id = %visit.node.id, "Timer paused by interaction");
            self.events.publish(PlaybackEvent::TimerCancelled {
                node_id: visit.node.id.clone(),
            });
        }
    }

    /// The node's media finished: advance, wait for a choice, or end.
    async fn complete(&mut self) {
        let Some(visit) = &self.visit else {
            return;
        };
        let node_id = visit.node.id.clone();

        if let Some(next) = self.graph.find_next(&node_id, None).cloned() {
            self.advance(next, None).await;
        } else if self.graph.has_choice_edges(&node_id) {
            let choices = visit
                .node
                .data
                .content
                .choices
                .iter()
                .filter(|c| self.graph.choice_target(&node_id, &c.id).is_some())
                .map(|c| c.id.clone())
                .collect();
            self.set_state(PlaybackState::AwaitingChoice {
                node_id: node_id.clone(),
            });
            self.events
                .publish(PlaybackEvent::AwaitingChoice { node_id, choices });
        } else {
            tracing::info!(%node_id, "Scenario reached a terminal node");
            self.set_state(PlaybackState::Terminal {
                node_id: node_id.clone(),
            });
            self.events.publish(PlaybackEvent::Terminal { node_id });
        }
    }

    // -----------------------------------------------------------------------
    // Transitions
    // -----------------------------------------------------------------------

    fn resolve_choice(&self, choice_id: &str) -> Result<NodeId, TransitionError> {
        let state = self.state.borrow().clone();
        if !state.accepts_choices() {
            return Err(TransitionError::NotActionable {
                state: state.name(),
            });
        }
        let Some(visit) = &self.visit else {
            return Err(TransitionError::NotActionable {
                state: state.name(),
            });
        };
        let node_id = &visit.node.id;

        if visit.node.choice(choice_id).is_none() {
            return Err(TransitionError::UnknownChoice {
                node_id: node_id.clone(),
                choice_id: choice_id.to_string(),
            });
        }
        self.graph
            .choice_target(node_id, choice_id)
            .cloned()
            .ok_or_else(|| TransitionError::Unresolved {
                node_id: node_id.clone(),
                choice_id: choice_id.to_string(),
            })
    }

    async fn advance(&mut self, target: NodeId, choice_id: Option<ChoiceId>) {
        let from = self
            .visit
            .as_ref()
            .map(|v| v.node.id.clone())
            .unwrap_or_default();
        tracing::debug!(%from, to = %target, choice_id = ?choice_id, "Advancing");
        self.events.publish(PlaybackEvent::Advanced {
            from,
            to: target.clone(),
            choice_id,
        });
        self.enter(target).await;
    }

    fn set_state(&self, state: PlaybackState) {
        self.state.send_replace(state);
    }

    async fn shutdown(&mut self) {
        self.timer = None;
        if let Some(visit) = self.visit.take() {
            if let Some(track) = visit.audio {
                track.cut().await;
            }
        }
        for track in self.fading.drain(..) {
            track.cut().await;
        }
        self.set_state(PlaybackState::Stopped);
        self.events.publish(PlaybackEvent::Stopped);
        tracing::info!("Playback stopped");
    }
}

/// Timer that drives a still (non-video) node, if it auto-transitions.
fn still_timer(node: &Node) -> Option<&TimerSettings> {
    if node.node_type == node_types::VIDEO {
        return None;
    }
    node.timer().filter(|t| t.auto_transition)
}

/// A node with no choices and `loop` set restarts instead of completing.
fn loops(node: &Node) -> bool {
    node.data.content.choices.is_empty() && node.timer().is_some_and(|t| t.looping)
}
