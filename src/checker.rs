use anyhow::Result;
use log::{debug, info, warn};

use crate::config::Config;
use crate::feed::FeedSource;
use crate::notify::Notifier;
use crate::storage::Store;

/// How a single check concluded. Only `Notified` mutates persisted state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckOutcome {
    /// No channel configured; nothing to do.
    NoChannel,
    /// Feed fetch failed; retried at the next scheduled wake.
    FeedUnavailable,
    /// Every recent upload is short-form. A normal empty result.
    NothingEligible,
    /// The newest eligible upload was already notified.
    AlreadyNotified { video_id: String },
    /// Notification raised and state advanced.
    Notified { video_id: String },
    /// Notification surface failed; state left untouched so the same upload
    /// is retried next cycle.
    NotifyFailed { video_id: String },
}

impl CheckOutcome {
    pub fn describe(&self) -> String {
        match self {
            CheckOutcome::NoChannel => "no channel configured".into(),
            CheckOutcome::FeedUnavailable => "feed unavailable".into(),
            CheckOutcome::NothingEligible => "no eligible long-form upload".into(),
            CheckOutcome::AlreadyNotified { video_id } => {
                format!("already notified for {video_id}")
            }
            CheckOutcome::Notified { video_id } => format!("notified for {video_id}"),
            CheckOutcome::NotifyFailed { video_id } => {
                format!("notification failed for {video_id}")
            }
        }
    }
}

/// One full check: fetch the channel feed, pick the newest long-form entry,
/// compare against the last notified id, and raise a notification on change.
/// The persisted id advances only after the notification is raised.
pub fn check_latest_and_notify(
    cfg: &Config,
    store: &Store,
    feed: &dyn FeedSource,
    notifier: &dyn Notifier,
) -> Result<CheckOutcome> {
    let channel_id = cfg.feed.channel_id.trim();
    if channel_id.is_empty() {
        debug!("no channel configured, skipping check");
        return Ok(CheckOutcome::NoChannel);
    }

    let latest = match feed.latest_long_form(channel_id) {
        Ok(latest) => latest,
        Err(err) => {
            warn!("feed fetch failed for {channel_id}: {err}");
            return Ok(CheckOutcome::FeedUnavailable);
        }
    };

    let entry = match latest {
        Some(entry) => entry,
        None => {
            info!("no eligible long-form entry in feed");
            return Ok(CheckOutcome::NothingEligible);
        }
    };

    if store.last_video_id()?.as_deref() == Some(entry.video_id.as_str()) {
        debug!("already notified for {}", entry.video_id);
        return Ok(CheckOutcome::AlreadyNotified {
            video_id: entry.video_id,
        });
    }

    if let Err(err) = notifier.notify_new_video(&entry) {
        warn!(
            "notification failed for {}: {err}; retrying next cycle",
            entry.video_id
        );
        return Ok(CheckOutcome::NotifyFailed {
            video_id: entry.video_id,
        });
    }

    store.set_last_video_id(&entry.video_id)?;
    info!("notified: {} {:?} {}", entry.video_id, entry.title, entry.url);

    Ok(CheckOutcome::Notified {
        video_id: entry.video_id,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::feed::{self, FeedEntry, FeedError, FeedSource};
    use crate::notify::{Notifier, NotifyError};
    use crate::storage::{Options, Store};
    use parking_lot::Mutex;
    use tempfile::tempdir;

    struct FixedFeed(Option<FeedEntry>);

    impl FeedSource for FixedFeed {
        fn latest_long_form(&self, _channel_id: &str) -> Result<Option<FeedEntry>, FeedError> {
            Ok(self.0.clone())
        }
    }

    struct FailingFeed;

    impl FeedSource for FailingFeed {
        fn latest_long_form(&self, _channel_id: &str) -> Result<Option<FeedEntry>, FeedError> {
            Err(FeedError::Status(reqwest::StatusCode::SERVICE_UNAVAILABLE))
        }
    }

    /// Serves a static feed document through the real selection logic.
    struct StaticXmlFeed(&'static str);

    impl FeedSource for StaticXmlFeed {
        fn latest_long_form(&self, _channel_id: &str) -> Result<Option<FeedEntry>, FeedError> {
            Ok(feed::select_latest_long_form(self.0))
        }
    }

    #[derive(Default)]
    struct RecordingNotifier {
        raised: Mutex<Vec<FeedEntry>>,
        fail: bool,
    }

    impl Notifier for RecordingNotifier {
        fn notify_new_video(&self, entry: &FeedEntry) -> Result<(), NotifyError> {
            if self.fail {
                return Err(NotifyError::new("surface down"));
            }
            self.raised.lock().push(entry.clone());
            Ok(())
        }

        fn notify_near_end(&self, _video_id: Option<&str>) -> Result<(), NotifyError> {
            Ok(())
        }
    }

    fn test_store() -> (tempfile::TempDir, Store) {
        let dir = tempdir().unwrap();
        let store = Store::open(Options {
            path: Some(dir.path().join("state.db")),
        })
        .unwrap();
        (dir, store)
    }

    fn entry(video_id: &str) -> FeedEntry {
        FeedEntry {
            video_id: video_id.into(),
            title: format!("Upload {video_id}"),
            url: feed::watch_url(video_id),
        }
    }

    #[test]
    fn first_check_notifies_and_persists() {
        let (_dir, store) = test_store();
        let notifier = RecordingNotifier::default();
        let outcome = check_latest_and_notify(
            &Config::default(),
            &store,
            &FixedFeed(Some(entry("v1"))),
            &notifier,
        )
        .unwrap();
        assert_eq!(outcome, CheckOutcome::Notified { video_id: "v1".into() });
        assert_eq!(store.last_video_id().unwrap().as_deref(), Some("v1"));
        assert_eq!(notifier.raised.lock().len(), 1);
    }

    #[test]
    fn same_video_is_deduplicated() {
        let (_dir, store) = test_store();
        store.set_last_video_id("v1").unwrap();
        let notifier = RecordingNotifier::default();
        let outcome = check_latest_and_notify(
            &Config::default(),
            &store,
            &FixedFeed(Some(entry("v1"))),
            &notifier,
        )
        .unwrap();
        assert_eq!(
            outcome,
            CheckOutcome::AlreadyNotified { video_id: "v1".into() }
        );
        assert!(notifier.raised.lock().is_empty());
    }

    #[test]
    fn new_video_replaces_old_state() {
        let (_dir, store) = test_store();
        store.set_last_video_id("v1").unwrap();
        let notifier = RecordingNotifier::default();
        let outcome = check_latest_and_notify(
            &Config::default(),
            &store,
            &FixedFeed(Some(entry("v2"))),
            &notifier,
        )
        .unwrap();
        assert_eq!(outcome, CheckOutcome::Notified { video_id: "v2".into() });
        assert_eq!(store.last_video_id().unwrap().as_deref(), Some("v2"));
    }

    #[test]
    fn empty_channel_skips_everything() {
        let (_dir, store) = test_store();
        let mut cfg = Config::default();
        cfg.feed.channel_id = "  ".into();
        let notifier = RecordingNotifier::default();
        let outcome =
            check_latest_and_notify(&cfg, &store, &FailingFeed, &notifier).unwrap();
        assert_eq!(outcome, CheckOutcome::NoChannel);
        assert!(notifier.raised.lock().is_empty());
    }

    #[test]
    fn fetch_failure_is_swallowed() {
        let (_dir, store) = test_store();
        let notifier = RecordingNotifier::default();
        let outcome =
            check_latest_and_notify(&Config::default(), &store, &FailingFeed, &notifier)
                .unwrap();
        assert_eq!(outcome, CheckOutcome::FeedUnavailable);
        assert_eq!(store.last_video_id().unwrap(), None);
    }

    #[test]
    fn nothing_eligible_is_not_an_error() {
        let (_dir, store) = test_store();
        let notifier = RecordingNotifier::default();
        let outcome =
            check_latest_and_notify(&Config::default(), &store, &FixedFeed(None), &notifier)
                .unwrap();
        assert_eq!(outcome, CheckOutcome::NothingEligible);
    }

    #[test]
    fn notify_failure_does_not_advance_state() {
        let (_dir, store) = test_store();
        let notifier = RecordingNotifier {
            fail: true,
            ..Default::default()
        };
        let outcome = check_latest_and_notify(
            &Config::default(),
            &store,
            &FixedFeed(Some(entry("v1"))),
            &notifier,
        )
        .unwrap();
        assert_eq!(outcome, CheckOutcome::NotifyFailed { video_id: "v1".into() });
        // The same upload must be retried next cycle.
        assert_eq!(store.last_video_id().unwrap(), None);
    }

    const SAMPLE_FEED: &str = r#"<feed>
<entry>
  <yt:videoId>s1</yt:videoId>
  <title>Clip #shorts</title>
  <link rel="alternate" href="https://www.youtube.com/shorts/s1"/>
</entry>
<entry>
  <yt:videoId>v1</yt:videoId>
  <title>Full talk</title>
  <link rel="alternate" href="https://www.youtube.com/watch?v=v1"/>
</entry>
</feed>"#;

    #[test]
    fn end_to_end_selects_long_form_and_persists() {
        let (_dir, store) = test_store();
        let notifier = RecordingNotifier::default();
        let outcome = check_latest_and_notify(
            &Config::default(),
            &store,
            &StaticXmlFeed(SAMPLE_FEED),
            &notifier,
        )
        .unwrap();
        assert_eq!(outcome, CheckOutcome::Notified { video_id: "v1".into() });
        assert_eq!(store.last_video_id().unwrap().as_deref(), Some("v1"));
        let raised = notifier.raised.lock();
        assert_eq!(raised[0].title, "Full talk");
        assert_eq!(raised[0].url, "https://www.youtube.com/watch?v=v1");
    }
}
