//! Background audio for one node visit.
//!
//! Each track runs in its own task so fades never block transitions. The
//! task publishes volume steps; the UI applies them to the actual output.

use std::time::Duration;

use pov_core::types::{AssetId, NodeId};
use pov_core::AudioSettings;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::state::{EventSender, PlaybackEvent};

pub(crate) struct AudioTrack {
    /// Fade out (if configured) and stop.
    leave: CancellationToken,
    /// Stop immediately.
    cut: CancellationToken,
    task: JoinHandle<()>,
}

pub(crate) struct TrackSpec {
    pub node_id: NodeId,
    pub asset_id: AssetId,
    pub url: String,
    pub settings: AudioSettings,
    pub fade_steps: u32,
}

impl AudioTrack {
    pub(crate) fn spawn(spec: TrackSpec, events: EventSender) -> Self {
        let leave = CancellationToken::new();
        let cut = CancellationToken::new();
        let task = tokio::spawn(run_track(spec, events, leave.clone(), cut.clone()));
        Self { leave, cut, task }
    }

    /// Begin the fade-out without waiting for it.
    pub(crate) fn leave(&self) {
        self.leave.cancel();
    }

    pub(crate) fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Stop immediately and wait until the track has reported it.
    pub(crate) async fn cut(self) {
        self.cut.cancel();
        if let Err(e) = self.task.await {
            tracing::error!(error = %e, "Audio task failed");
        }
    }
}

/// Positive, finite fade length. Lengths too large for a `Duration` saturate.
fn fade_length(secs: Option<f64>) -> Option<Duration> {
    secs.filter(|s| s.is_finite() && *s > 0.0)
        .map(|s| Duration::try_from_secs_f64(s).unwrap_or(Duration::MAX))
}

enum Fade {
    Completed,
    Interrupted,
    Cut,
}

/// Current volume of a track and where its steps are published.
struct Fader<'a> {
    node_id: &'a str,
    events: &'a EventSender,
    cut: &'a CancellationToken,
    steps: u32,
    volume: f64,
}

impl Fader<'_> {
    /// Ramp from the current volume to `to` in equal steps over `length`.
    async fn ramp(
        &mut self,
        to: f64,
        length: Duration,
        interrupt: Option<&CancellationToken>,
    ) -> Fade {
        let from = self.volume;
        let step = length / self.steps;
        for i in 1..=self.steps {
            let interrupted = async {
                match interrupt {
                    Some(token) => token.cancelled().await,
                    None => std::future::pending().await,
                }
            };
            tokio::select! {
                biased;
                _ = self.cut.cancelled() => return Fade::Cut,
                _ = interrupted => return Fade::Interrupted,
                _ = tokio::time::sleep(step) => {
                    self.volume = from + (to - from) * f64::from(i) / f64::from(self.steps);
                    self.events.publish(PlaybackEvent::AudioVolume {
                        node_id: self.node_id.to_string(),
                        volume: self.volume,
                    });
                }
            }
        }
        Fade::Completed
    }
}

async fn run_track(
    spec: TrackSpec,
    events: EventSender,
    leave: CancellationToken,
    cut: CancellationToken,
) {
    let TrackSpec {
        node_id,
        asset_id,
        url,
        settings,
        fade_steps,
    } = spec;
    let target = settings.effective_volume();
    let fade_in = fade_length(settings.fade_in);

    let mut fader = Fader {
        node_id: &node_id,
        events: &events,
        cut: &cut,
        steps: fade_steps.max(1),
        volume: if fade_in.is_some() { 0.0 } else { target },
    };

    tracing::debug!(%node_id, %asset_id, target, "Audio started");
    events.publish(PlaybackEvent::AudioStarted {
        node_id: node_id.clone(),
        asset_id,
        url,
        volume: fader.volume,
        looping: settings.looping,
    });

    let mut was_cut = false;
    if let Some(length) = fade_in {
        was_cut = matches!(fader.ramp(target, length, Some(&leave)).await, Fade::Cut);
    }

    if !was_cut {
        tokio::select! {
            biased;
            _ = cut.cancelled() => was_cut = true,
            _ = leave.cancelled() => {}
        }
    }

    if !was_cut {
        if let Some(length) = fade_length(settings.fade_out) {
            fader.ramp(0.0, length, None).await;
        }
    }

    tracing::debug!(%node_id, "Audio stopped");
    events.publish(PlaybackEvent::AudioStopped { node_id });
}
