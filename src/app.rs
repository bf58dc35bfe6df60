use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use crossbeam_channel::{select, unbounded, Receiver, Sender};
use log::{info, warn};

use crate::checker::{self, CheckOutcome};
use crate::config::{self, Config};
use crate::feed::{self, FeedSource};
use crate::notify::{DesktopNotifier, Notifier};
use crate::playback::NearEndSignal;
use crate::schedule::{self, Alarms, WakeKind};
use crate::storage;

/// Fallback wait when the wake set is somehow empty. Planning always emits
/// the daily reset, so this should never matter.
const IDLE_WAIT: Duration = Duration::from_secs(60 * 60);

pub fn run() -> Result<()> {
    let cfg = config::load(config::LoadOptions::default()).context("load config")?;
    let mut daemon = Daemon::new(cfg)?;
    daemon.run()
}

/// The scheduling/checking context. Processes one wake at a time; the only
/// other input is the fire-and-forget near-end signal channel.
pub struct Daemon {
    cfg: Config,
    store: Arc<storage::Store>,
    feed: Box<dyn FeedSource>,
    notifier: Box<dyn Notifier>,
    alarms: Alarms,
    near_end_tx: Sender<NearEndSignal>,
    near_end_rx: Receiver<NearEndSignal>,
}

impl Daemon {
    pub fn new(cfg: Config) -> Result<Self> {
        let store =
            Arc::new(storage::Store::open(storage::Options::default()).context("open storage")?);

        let feed_client = feed::Client::new(feed::ClientConfig {
            user_agent: cfg.feed.user_agent.clone(),
            http_client: None,
        })
        .context("build feed client")?;

        let notifier = DesktopNotifier::new(cfg.playback.hint_duration);
        let (near_end_tx, near_end_rx) = unbounded();

        Ok(Self {
            cfg,
            store,
            feed: Box::new(feed_client),
            notifier: Box::new(notifier),
            alarms: Alarms::new(),
            near_end_tx,
            near_end_rx,
        })
    }

    /// Sender half of the near-end channel, for playback watchers hosted in
    /// the same process.
    pub fn near_end_sender(&self) -> Sender<NearEndSignal> {
        self.near_end_tx.clone()
    }

    pub fn check_once(&self) -> Result<CheckOutcome> {
        checker::check_latest_and_notify(
            &self.cfg,
            &self.store,
            self.feed.as_ref(),
            self.notifier.as_ref(),
        )
    }

    pub fn run(&mut self) -> Result<()> {
        self.reschedule();
        let near_end_rx = self.near_end_rx.clone();

        loop {
            let wait = self
                .alarms
                .next()
                .map(|wake| (wake.when - Utc::now()).to_std().unwrap_or(Duration::ZERO))
                .unwrap_or(IDLE_WAIT);

            select! {
                recv(near_end_rx) -> msg => {
                    if let Ok(sig) = msg {
                        if let Err(err) = self.notifier.notify_near_end(sig.video_id.as_deref()) {
                            warn!("near-end notification failed: {err}");
                        }
                    }
                }
                default(wait) => self.fire_due_wakes(),
            }
        }
    }

    fn fire_due_wakes(&mut self) {
        let mut reset = false;
        for wake in self.alarms.take_due(Utc::now()) {
            match wake.kind {
                WakeKind::Check { .. } => {
                    info!("check alarm fired: {}", wake.name);
                    match self.check_once() {
                        Ok(outcome) => info!("check concluded: {}", outcome.describe()),
                        Err(err) => warn!("check failed: {err:#}"),
                    }
                }
                WakeKind::DailyReset => reset = true,
            }
        }
        if reset {
            info!("daily reset fired");
            self.reschedule();
        }
    }

    /// Re-reads the configuration (external edits take effect here) and
    /// atomically replaces the wake set with today's plan.
    fn reschedule(&mut self) {
        match config::load(config::LoadOptions::default()) {
            Ok(cfg) => self.cfg = cfg,
            Err(err) => warn!("config reload failed, keeping previous: {err:#}"),
        }

        let wakes = schedule::plan_day(&self.cfg.schedule, Utc::now());
        for wake in &wakes {
            info!(
                "alarm scheduled: {} -> {}",
                wake.name,
                wake.when.with_timezone(&schedule::jst())
            );
        }
        self.alarms.replace_all(wakes);
    }
}
