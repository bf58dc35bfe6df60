use std::time::Duration;

use anyhow::{bail, Result};
use log::debug;
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::blocking::Client as HttpClient;
use reqwest::header::USER_AGENT;
use reqwest::StatusCode;
use url::Url;

pub const FEED_BASE: &str = "https://www.youtube.com/feeds/videos.xml";
pub const WATCH_BASE: &str = "https://www.youtube.com/watch";

/// Transport or HTTP failure while fetching the feed. Callers log and
/// swallow this; the schedule itself is the retry interval.
#[derive(Debug, thiserror::Error)]
pub enum FeedError {
    #[error("feed request failed with status {0}")]
    Status(StatusCode),
    #[error("feed request failed: {0}")]
    Transport(#[from] reqwest::Error),
}

/// One eligible upload, already normalized to its canonical watch URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedEntry {
    pub video_id: String,
    pub title: String,
    pub url: String,
}

pub trait FeedSource: Send + Sync {
    /// Newest long-form entry of the channel's upload feed, or `None` when
    /// every recent upload is short-form.
    fn latest_long_form(&self, channel_id: &str) -> Result<Option<FeedEntry>, FeedError>;
}

#[derive(Debug, Clone, Default)]
pub struct ClientConfig {
    pub user_agent: String,
    pub http_client: Option<HttpClient>,
}

pub struct Client {
    http: HttpClient,
    user_agent: String,
    base_url: Url,
}

impl Client {
    pub fn new(config: ClientConfig) -> Result<Self> {
        if config.user_agent.trim().is_empty() {
            bail!("feed client user agent required");
        }

        let http = match config.http_client {
            Some(client) => client,
            None => HttpClient::builder()
                .timeout(Duration::from_secs(20))
                .build()?,
        };

        Ok(Client {
            http,
            user_agent: config.user_agent,
            base_url: Url::parse(FEED_BASE)?,
        })
    }

    /// Overrides the feed endpoint, for tests against a local server.
    pub fn with_base_url(mut self, base_url: Url) -> Self {
        self.base_url = base_url;
        self
    }

    fn feed_url(&self, channel_id: &str) -> Url {
        let mut url = self.base_url.clone();
        url.query_pairs_mut().append_pair("channel_id", channel_id);
        url
    }

    fn fetch_feed(&self, channel_id: &str) -> Result<String, FeedError> {
        let response = self
            .http
            .get(self.feed_url(channel_id))
            .header(USER_AGENT, &self.user_agent)
            .send()?;

        if !response.status().is_success() {
            return Err(FeedError::Status(response.status()));
        }

        Ok(response.text()?)
    }
}

impl FeedSource for Client {
    fn latest_long_form(&self, channel_id: &str) -> Result<Option<FeedEntry>, FeedError> {
        let body = self.fetch_feed(channel_id)?;
        Ok(select_latest_long_form(&body))
    }
}

static ENTRY_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)<entry>.*?</entry>").unwrap());
static VIDEO_ID_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"<yt:videoId>([^<]+)</yt:videoId>").unwrap());
static LINK_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"<link[^>]+rel="alternate"[^>]+href="([^"]+)""#).unwrap());
static TITLE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"<title>([^<]*)</title>").unwrap());
static SHORTS_PATH_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)/shorts/").unwrap());
static SHORTS_TITLE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)#shorts\b|\bshorts\b").unwrap());

/// Walks the feed in document order (assumed newest-first) and returns the
/// first long-form entry. Entries missing an id or link are skipped.
pub fn select_latest_long_form(xml: &str) -> Option<FeedEntry> {
    for entry in ENTRY_RE.find_iter(xml) {
        let entry = entry.as_str();

        let video_id = match capture(&VIDEO_ID_RE, entry) {
            Some(id) => id,
            None => continue,
        };
        let href = match capture(&LINK_RE, entry) {
            Some(href) => href,
            None => continue,
        };
        let title = capture(&TITLE_RE, entry).unwrap_or_default();

        if is_short_form(&href, &title) {
            debug!("skipping short-form entry {video_id}");
            continue;
        }

        return Some(FeedEntry {
            url: canonical_watch_url(&href, &video_id),
            video_id,
            title,
        });
    }

    None
}

fn capture(re: &Regex, haystack: &str) -> Option<String> {
    re.captures(haystack)
        .map(|caps| caps[1].to_string())
        .filter(|s| !s.is_empty())
}

/// Short-form iff the link path points at shorts, or the title carries a
/// standalone "shorts" word or "#shorts" hashtag (case-insensitive).
pub fn is_short_form(link: &str, title: &str) -> bool {
    SHORTS_PATH_RE.is_match(link) || SHORTS_TITLE_RE.is_match(title)
}

/// Links that already point at a watch page pass through; anything else is
/// rebuilt from the video id.
pub fn canonical_watch_url(link: &str, video_id: &str) -> String {
    if link.contains("/watch") {
        link.to_string()
    } else {
        watch_url(video_id)
    }
}

pub fn watch_url(video_id: &str) -> String {
    format!("{WATCH_BASE}?v={video_id}")
}
