//! Interactive playback over line-based input.
//!
//! Every [`PlaybackEvent`] is written to the output as one JSON line. Input
//! lines drive the player:
//!
//! | Input        | Effect                                  |
//! |--------------|-----------------------------------------|
//! | `1`, `2`, .. | select the n-th choice of the current node |
//! | `c <id>`     | select a choice by id                   |
//! | `i`          | report a user interaction               |
//! | `e`          | report that the video finished          |
//! | `q`          | stop                                    |
//!
//! The session ends on `q`, end of input, a terminal node, or `shutdown`.

use std::future::Future;
use std::io::Write;
use std::sync::Arc;

use pov_core::GraphStore;
use pov_playback::{PlaybackEngine, PlaybackEvent, PlayerHandle};
use serde::Serialize;
use serde_json::json;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::broadcast::{self, error::RecvError};

use crate::error::PlayerError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input {
    /// 1-based position in the current node's choice list.
    Choose(usize),
    ChooseId(String),
    Interact,
    MediaEnded,
    Quit,
}

pub fn parse_input(line: &str) -> Option<Input> {
    let line = line.trim();
    match line {
        "i" => return Some(Input::Interact),
        "e" => return Some(Input::MediaEnded),
        "q" => return Some(Input::Quit),
        _ => {}
    }
    if let Some(id) = line.strip_prefix("c ") {
        let id = id.trim();
        return (!id.is_empty()).then(|| Input::ChooseId(id.to_string()));
    }
    line.parse().ok().filter(|n| *n > 0).map(Input::Choose)
}

/// How a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionEnd {
    Quit,
    EndOfInput,
    Terminal,
    Shutdown,
}

pub struct Session<W> {
    /// Subscribed before the player task was spawned.
    events: broadcast::Receiver<PlaybackEvent>,
    driver: Driver<W>,
}

impl<W: Write> Session<W> {
    /// Start a player on `engine`. `graph` must be the graph the engine
    /// plays; it maps choice positions to ids.
    pub fn start(
        engine: &PlaybackEngine,
        graph: Arc<GraphStore>,
        out: W,
    ) -> Result<Self, PlayerError> {
        let (player, events) = engine.start_subscribed()?;
        Ok(Self {
            events,
            driver: Driver { graph, player, out },
        })
    }

    pub async fn run<R, S>(self, input: R, shutdown: S) -> Result<SessionEnd, PlayerError>
    where
        R: AsyncBufRead + Unpin,
        S: Future<Output = ()>,
    {
        let Self {
            mut events,
            driver: mut session,
        } = self;
        let mut lines = input.lines();
        tokio::pin!(shutdown);

        let end = loop {
            tokio::select! {
                _ = &mut shutdown => break SessionEnd::Shutdown,
                event = events.recv() => match event {
                    Ok(event) => {
                        session.emit(&event)?;
                        if matches!(event, PlaybackEvent::Terminal { .. }) {
                            break SessionEnd::Terminal;
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "Session output fell behind playback");
                    }
                    Err(RecvError::Closed) => break SessionEnd::Shutdown,
                },
                line = lines.next_line() => match line? {
                    None => break SessionEnd::EndOfInput,
                    Some(line) => match parse_input(&line) {
                        Some(Input::Quit) => break SessionEnd::Quit,
                        Some(input) => session.apply(input).await?,
                        None if line.trim().is_empty() => {}
                        None => session.reject(&format!("Unrecognised input: {}", line.trim()))?,
                    },
                },
            }
        };

        session.player.stop().await;
        while let Ok(event) = events.try_recv() {
            session.emit(&event)?;
        }
        tracing::info!(end = ?end, "Session finished");
        Ok(end)
    }
}

struct Driver<W> {
    graph: Arc<GraphStore>,
    player: PlayerHandle,
    out: W,
}

impl<W: Write> Driver<W> {
    async fn apply(&mut self, input: Input) -> Result<(), PlayerError> {
        let choice_id = match input {
            Input::Interact => {
                self.player.interact();
                return Ok(());
            }
            Input::MediaEnded => {
                self.player.media_ended();
                return Ok(());
            }
            Input::Quit => return Ok(()),
            Input::ChooseId(id) => id,
            Input::Choose(position) => match self.choice_at(position) {
                Some(id) => id,
                None => return self.reject(&format!("No choice number {position}")),
            },
        };

        if let Err(e) = self.player.select_choice(&choice_id).await {
            self.reject(&e.to_string())?;
        }
        Ok(())
    }

    fn choice_at(&self, position: usize) -> Option<String> {
        let state = self.player.state();
        let node = self.graph.node(state.node_id()?)?;
        node.data
            .content
            .choices
            .get(position - 1)
            .map(|c| c.id.clone())
    }

    fn emit<T: Serialize>(&mut self, value: &T) -> Result<(), PlayerError> {
        serde_json::to_writer(&mut self.out, value)?;
        writeln!(self.out)?;
        self.out.flush()?;
        Ok(())
    }

    fn reject(&mut self, reason: &str) -> Result<(), PlayerError> {
        self.emit(&json!({ "event": "rejected", "reason": reason }))
    }
}
