use std::time::Duration;

use notify_rust::{Notification, Timeout};

use crate::feed::{self, FeedEntry};

pub const ACTION_OPEN: &str = "open";
pub const ACTION_LATER: &str = "later";

/// Surface-unavailable failure. Callers log it and deliberately do not
/// advance persisted state, so the same item is retried next cycle.
#[derive(Debug, thiserror::Error)]
#[error("notification surface unavailable: {reason}")]
pub struct NotifyError {
    reason: String,
}

impl NotifyError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

impl From<notify_rust::error::Error> for NotifyError {
    fn from(err: notify_rust::error::Error) -> Self {
        Self::new(err.to_string())
    }
}

pub trait Notifier: Send + Sync {
    fn notify_new_video(&self, entry: &FeedEntry) -> Result<(), NotifyError>;
    fn notify_near_end(&self, video_id: Option<&str>) -> Result<(), NotifyError>;
}

/// Desktop notification surface. Where the platform supports notification
/// actions, "Open now" launches the watch page in the default browser; the
/// action wait consumes the handle, so the click handler is one-shot by
/// construction.
pub struct DesktopNotifier {
    hint_duration: Duration,
}

impl DesktopNotifier {
    pub fn new(hint_duration: Duration) -> Self {
        Self { hint_duration }
    }

    // The notification handle is not Send, so both the show and the action
    // wait live on the spawned thread; only the show result crosses back.
    #[cfg(all(unix, not(target_os = "macos")))]
    fn show_actionable(
        &self,
        mut notification: Notification,
        open_url: Option<String>,
    ) -> Result<(), NotifyError> {
        notification
            .action(ACTION_OPEN, "Open now")
            .action(ACTION_LATER, "Later");
        let (tx, rx) = crossbeam_channel::bounded(1);
        std::thread::spawn(move || {
            let handle = match notification.show() {
                Ok(handle) => {
                    let _ = tx.send(Ok(()));
                    handle
                }
                Err(err) => {
                    let _ = tx.send(Err(NotifyError::from(err)));
                    return;
                }
            };
            handle.wait_for_action(move |action| {
                if action == ACTION_OPEN {
                    if let Some(url) = open_url {
                        if let Err(err) = webbrowser::open(&url) {
                            log::warn!("failed to open {url}: {err}");
                        }
                    }
                }
            });
        });
        rx.recv()
            .unwrap_or_else(|_| Err(NotifyError::new("notification thread died")))
    }

    #[cfg(not(all(unix, not(target_os = "macos"))))]
    fn show_actionable(
        &self,
        notification: Notification,
        _open_url: Option<String>,
    ) -> Result<(), NotifyError> {
        notification.show()?;
        Ok(())
    }
}

impl Notifier for DesktopNotifier {
    fn notify_new_video(&self, entry: &FeedEntry) -> Result<(), NotifyError> {
        let body = if entry.title.is_empty() {
            "New upload"
        } else {
            entry.title.as_str()
        };
        let mut notification = Notification::new();
        notification
            .appname("yt-reminder")
            .summary("New video published")
            .body(body);
        self.show_actionable(notification, Some(entry.url.clone()))
    }

    fn notify_near_end(&self, video_id: Option<&str>) -> Result<(), NotifyError> {
        let mut notification = Notification::new();
        notification
            .appname("yt-reminder")
            .summary("Video ending soon")
            .body("Thanks for watching! Consider leaving a like.")
            .timeout(Timeout::Milliseconds(
                self.hint_duration.as_millis() as u32
            ));
        self.show_actionable(notification, video_id.map(feed::watch_url))
    }
}
