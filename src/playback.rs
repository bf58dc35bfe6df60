use std::thread;
use std::time::Instant;

use crossbeam_channel::{bounded, select, tick, Sender};
use log::{debug, info, warn};

use crate::config::PlaybackConfig;

/// Fire-and-forget signal from a playback context to the notifying context.
/// Delivery is unacknowledged; a closed receiver loses the event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NearEndSignal {
    pub video_id: Option<String>,
}

/// Observable playback surface: whatever exposes a current video identity,
/// duration and position. The detector never touches the player directly.
pub trait PlayerProbe: Send {
    fn video_id(&self) -> Option<String>;
    fn duration(&self) -> Option<f64>;
    fn position(&self) -> Option<f64>;
    /// Whether the player has begun loading, even if duration is unknown.
    fn ready(&self) -> bool;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DetectorState {
    Idle,
    Watching { video_id: Option<String> },
    Notified { video_id: Option<String> },
}

/// Per-session state machine that signals "near end" exactly once per
/// distinct video identity.
#[derive(Debug)]
pub struct NearEndDetector {
    near_end_secs: f64,
    min_duration_secs: f64,
    state: DetectorState,
}

impl NearEndDetector {
    pub fn new(cfg: &PlaybackConfig) -> Self {
        Self {
            near_end_secs: cfg.near_end_secs,
            min_duration_secs: cfg.min_duration_secs,
            state: DetectorState::Idle,
        }
    }

    pub fn state(&self) -> &DetectorState {
        &self.state
    }

    /// Idle -> Watching, on first binding to a playable video.
    pub fn bind(&mut self, video_id: Option<String>) {
        if self.state == DetectorState::Idle {
            self.state = DetectorState::Watching { video_id };
        }
    }

    /// Compares the observed identity against the tracked one; a change
    /// resets to Watching with a cleared notified flag. Returns whether a
    /// change was seen.
    pub fn observe_identity(&mut self, current: Option<&str>) -> bool {
        let tracked = match &self.state {
            DetectorState::Idle => return false,
            DetectorState::Watching { video_id } | DetectorState::Notified { video_id } => {
                video_id.as_deref()
            }
        };
        if tracked == current {
            return false;
        }
        self.state = DetectorState::Watching {
            video_id: current.map(|id| id.to_string()),
        };
        true
    }

    /// One evaluation tick. Fires at most once per identity: when watching a
    /// long-enough video with `0 < remaining <= near_end_secs`, transitions
    /// to Notified and returns the signal.
    pub fn evaluate(&mut self, duration: Option<f64>, position: f64) -> Option<NearEndSignal> {
        let video_id = match &self.state {
            DetectorState::Watching { video_id } => video_id.clone(),
            _ => return None,
        };
        let duration = duration?;
        if !duration.is_finite() || duration <= 0.0 {
            return None;
        }
        if duration <= self.min_duration_secs {
            return None;
        }
        let remaining = duration - position;
        if remaining > 0.0 && remaining <= self.near_end_secs {
            self.state = DetectorState::Notified {
                video_id: video_id.clone(),
            };
            return Some(NearEndSignal { video_id });
        }
        None
    }
}

/// Polls a [`PlayerProbe`] on a dedicated thread, feeding a
/// [`NearEndDetector`]. Binding waits up to `bind_timeout` for a playable
/// video to appear, then the watch loop re-evaluates every `poll_interval`
/// until stopped.
pub struct Watcher {
    stop: Sender<()>,
    handle: Option<thread::JoinHandle<()>>,
}

impl Watcher {
    pub fn spawn(
        probe: Box<dyn PlayerProbe>,
        cfg: PlaybackConfig,
        signal: Sender<NearEndSignal>,
    ) -> Self {
        let (stop_tx, stop_rx) = bounded(1);
        let handle = thread::spawn(move || {
            watch_loop(probe, cfg, signal, stop_rx);
        });
        Self {
            stop: stop_tx,
            handle: Some(handle),
        }
    }

    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        let _ = self.stop.send(());
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for Watcher {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn bindable(probe: &dyn PlayerProbe) -> bool {
    probe.ready()
        || probe
            .duration()
            .map_or(false, |d| d.is_finite() && d > 0.0)
}

fn watch_loop(
    probe: Box<dyn PlayerProbe>,
    cfg: PlaybackConfig,
    signal: Sender<NearEndSignal>,
    stop: crossbeam_channel::Receiver<()>,
) {
    let ticker = tick(cfg.poll_interval);

    // Binding phase: wait for a playable video, bounded by the deadline.
    let deadline = Instant::now() + cfg.bind_timeout;
    loop {
        if bindable(probe.as_ref()) {
            break;
        }
        if Instant::now() >= deadline {
            debug!(
                "no playable video within {}, giving up",
                humantime::format_duration(cfg.bind_timeout)
            );
            return;
        }
        select! {
            recv(stop) -> _ => return,
            recv(ticker) -> _ => {}
        }
    }

    let mut detector = NearEndDetector::new(&cfg);
    detector.bind(probe.video_id());
    info!("player attached, duration: {:?}", probe.duration());

    loop {
        let current = probe.video_id();
        if detector.observe_identity(current.as_deref()) {
            debug!("video changed to {current:?}");
        }

        if let Some(position) = probe.position() {
            if let Some(sig) = detector.evaluate(probe.duration(), position) {
                info!("video ending soon: {:?}", sig.video_id);
                if signal.send(sig).is_err() {
                    warn!("near-end receiver gone, signal dropped");
                }
            }
        }

        select! {
            recv(stop) -> _ => return,
            recv(ticker) -> _ => {}
        }
    }
}
