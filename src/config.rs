use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

const DEFAULT_ENV_PREFIX: &str = "YT_REMINDER";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Config {
    #[serde(default)]
    pub feed: FeedConfig,
    #[serde(default)]
    pub schedule: ScheduleConfig,
    #[serde(default)]
    pub playback: PlaybackConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FeedConfig {
    /// Channel whose upload feed is polled. Empty disables checks entirely.
    #[serde(default = "default_channel_id")]
    pub channel_id: String,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            channel_id: default_channel_id(),
            user_agent: default_user_agent(),
        }
    }
}

fn default_channel_id() -> String {
    "UCwjx6ZG4pwCvAPSozYEWymA".to_string()
}

fn default_user_agent() -> String {
    format!("yt-reminder/{}", crate::VERSION)
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScheduleConfig {
    /// Wall-clock "HH:MM" times of day, interpreted in JST.
    #[serde(default = "default_check_times")]
    pub check_times_jst: Vec<String>,
    /// Weekdays on which checks run, 0=Sunday..6=Saturday.
    #[serde(default = "default_weekdays")]
    pub weekdays_to_check: Vec<u32>,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            check_times_jst: default_check_times(),
            weekdays_to_check: default_weekdays(),
        }
    }
}

fn default_check_times() -> Vec<String> {
    // Two slots in a row, in case the upload is published late.
    vec!["19:00".into(), "19:15".into()]
}

fn default_weekdays() -> Vec<u32> {
    vec![3, 6]
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PlaybackConfig {
    /// Signal when this many seconds of playback remain.
    #[serde(default = "default_near_end_secs")]
    pub near_end_secs: f64,
    /// Videos at or below this duration never signal.
    #[serde(default = "default_min_duration_secs")]
    pub min_duration_secs: f64,
    #[serde(default = "default_poll_interval", with = "humantime_serde")]
    pub poll_interval: Duration,
    #[serde(default = "default_bind_timeout", with = "humantime_serde")]
    pub bind_timeout: Duration,
    #[serde(default = "default_hint_duration", with = "humantime_serde")]
    pub hint_duration: Duration,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            near_end_secs: default_near_end_secs(),
            min_duration_secs: default_min_duration_secs(),
            poll_interval: default_poll_interval(),
            bind_timeout: default_bind_timeout(),
            hint_duration: default_hint_duration(),
        }
    }
}

fn default_near_end_secs() -> f64 {
    45.0
}

fn default_min_duration_secs() -> f64 {
    60.0
}

fn default_poll_interval() -> Duration {
    Duration::from_millis(500)
}

fn default_bind_timeout() -> Duration {
    Duration::from_secs(15)
}

fn default_hint_duration() -> Duration {
    Duration::from_secs(6)
}

#[derive(Debug, Clone, Default)]
pub struct LoadOptions {
    pub config_file: Option<PathBuf>,
    pub env_prefix: Option<String>,
}

pub fn load(options: LoadOptions) -> Result<Config> {
    let mut cfg = Config::default();

    if let Some(path) = options.config_file.as_ref() {
        if path.exists() {
            let from_file = read_config_file(path)?;
            cfg = merge_config(cfg, from_file);
        }
    } else if let Some(default_path) = default_config_path() {
        if default_path.exists() {
            let from_file = read_config_file(&default_path)?;
            cfg = merge_config(cfg, from_file);
        }
    }

    let prefix = options.env_prefix.as_deref().unwrap_or(DEFAULT_ENV_PREFIX);
    apply_env(&mut cfg, prefix);

    Ok(cfg)
}

fn read_config_file(path: &Path) -> Result<Config> {
    let data = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file at {}", path.display()))?;
    let config: Config = serde_yaml::from_str(&data)
        .with_context(|| format!("Failed to parse config file at {}", path.display()))?;
    Ok(config)
}

fn merge_config(mut base: Config, other: Config) -> Config {
    if !other.feed.channel_id.is_empty() {
        base.feed.channel_id = other.feed.channel_id;
    }
    if !other.feed.user_agent.is_empty() {
        base.feed.user_agent = other.feed.user_agent;
    }

    if !other.schedule.check_times_jst.is_empty() {
        base.schedule.check_times_jst = other.schedule.check_times_jst;
    }
    if !other.schedule.weekdays_to_check.is_empty() {
        base.schedule.weekdays_to_check = other.schedule.weekdays_to_check;
    }

    base.playback = other.playback;

    base
}

fn apply_env(cfg: &mut Config, prefix: &str) {
    let upper_prefix = format!("{}_", prefix.to_uppercase());

    for (key, value) in env::vars() {
        if let Some(stripped) = key.strip_prefix(&upper_prefix) {
            let normalized = stripped.to_ascii_lowercase().replace("__", ".");
            apply_env_value(cfg, &normalized, value);
        }
    }
}

fn apply_env_value(cfg: &mut Config, key: &str, value: String) {
    match key {
        "feed.channel_id" => cfg.feed.channel_id = value,
        "feed.user_agent" => cfg.feed.user_agent = value,
        "schedule.check_times_jst" => {
            cfg.schedule.check_times_jst = value
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
        }
        "schedule.weekdays_to_check" => {
            cfg.schedule.weekdays_to_check = value
                .split(',')
                .filter_map(|s| s.trim().parse::<u32>().ok())
                .collect();
        }
        "playback.near_end_secs" => {
            if let Ok(parsed) = value.parse::<f64>() {
                cfg.playback.near_end_secs = parsed;
            }
        }
        "playback.min_duration_secs" => {
            if let Ok(parsed) = value.parse::<f64>() {
                cfg.playback.min_duration_secs = parsed;
            }
        }
        "playback.poll_interval" => {
            if let Ok(duration) = humantime::parse_duration(&value) {
                cfg.playback.poll_interval = duration;
            }
        }
        "playback.bind_timeout" => {
            if let Ok(duration) = humantime::parse_duration(&value) {
                cfg.playback.bind_timeout = duration;
            }
        }
        "playback.hint_duration" => {
            if let Ok(duration) = humantime::parse_duration(&value) {
                cfg.playback.hint_duration = duration;
            }
        }
        _ => {}
    }
}

pub fn default_path() -> Option<PathBuf> {
    default_config_path()
}

fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("yt-reminder").join("config.yaml"))
}

pub fn save_channel_settings(
    path: Option<PathBuf>,
    channel_id: &str,
    check_times_jst: &[String],
    weekdays_to_check: &[u32],
) -> Result<PathBuf> {
    let channel_id = channel_id.trim();

    anyhow::ensure!(
        !channel_id.is_empty(),
        "config: feed.channel_id is required"
    );

    let path = if let Some(path) = path {
        path
    } else {
        default_config_path().context("config: unable to determine default config path")?
    };

    let mut cfg = if path.exists() {
        read_config_file(&path)?
    } else {
        Config::default()
    };

    cfg.feed.channel_id = channel_id.to_string();
    if !check_times_jst.is_empty() {
        cfg.schedule.check_times_jst = check_times_jst.to_vec();
    }
    if !weekdays_to_check.is_empty() {
        cfg.schedule.weekdays_to_check = weekdays_to_check.to_vec();
    }

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("config: failed to create directory {}", parent.display()))?;
    }

    let contents = serde_yaml::to_string(&cfg).context("config: failed to serialize config")?;
    fs::write(&path, contents)
        .with_context(|| format!("config: failed to write file {}", path.display()))?;

    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use tempfile::tempdir;

    #[test]
    fn load_defaults_without_files() {
        let cfg = load(LoadOptions {
            config_file: Some(PathBuf::from("/nonexistent/config.yaml")),
            env_prefix: Some("YT_REMINDER_TEST_NONE".into()),
        })
        .unwrap();
        assert_eq!(cfg.feed.channel_id, default_channel_id());
        assert_eq!(cfg.schedule.check_times_jst, vec!["19:00", "19:15"]);
        assert_eq!(cfg.schedule.weekdays_to_check, vec![3, 6]);
        assert_eq!(cfg.playback.near_end_secs, 45.0);
        assert_eq!(cfg.playback.min_duration_secs, 60.0);
        assert_eq!(cfg.playback.poll_interval, Duration::from_millis(500));
        assert_eq!(cfg.playback.bind_timeout, Duration::from_secs(15));
    }

    #[test]
    fn file_overrides_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        fs::write(
            &path,
            "feed:\n  channel_id: UCtest\nschedule:\n  check_times_jst: [\"08:30\"]\n  weekdays_to_check: [1, 5]\n",
        )
        .unwrap();
        let cfg = load(LoadOptions {
            config_file: Some(path),
            env_prefix: Some("YT_REMINDER_TEST_NONE".into()),
        })
        .unwrap();
        assert_eq!(cfg.feed.channel_id, "UCtest");
        assert_eq!(cfg.schedule.check_times_jst, vec!["08:30"]);
        assert_eq!(cfg.schedule.weekdays_to_check, vec![1, 5]);
        // Omitted sections keep defaults.
        assert_eq!(cfg.playback.near_end_secs, 45.0);
    }

    #[test]
    fn env_overrides() {
        env::set_var("YT_REMINDER_ENVTEST_FEED__CHANNEL_ID", "UCfromenv");
        env::set_var("YT_REMINDER_ENVTEST_SCHEDULE__WEEKDAYS_TO_CHECK", "0, 2, x");
        let cfg = load(LoadOptions {
            config_file: Some(PathBuf::from("/nonexistent/config.yaml")),
            env_prefix: Some("YT_REMINDER_ENVTEST".into()),
        })
        .unwrap();
        env::remove_var("YT_REMINDER_ENVTEST_FEED__CHANNEL_ID");
        env::remove_var("YT_REMINDER_ENVTEST_SCHEDULE__WEEKDAYS_TO_CHECK");
        assert_eq!(cfg.feed.channel_id, "UCfromenv");
        assert_eq!(cfg.schedule.weekdays_to_check, vec![0, 2]);
    }

    #[test]
    fn save_channel_settings_creates_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        save_channel_settings(
            Some(path.clone()),
            "UCsaved",
            &["19:02".to_string()],
            &[3, 6],
        )
        .unwrap();
        let saved = read_config_file(&path).unwrap();
        assert_eq!(saved.feed.channel_id, "UCsaved");
        assert_eq!(saved.schedule.check_times_jst, vec!["19:02"]);
    }

    #[test]
    fn save_rejects_empty_channel() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        assert!(save_channel_settings(Some(path), "  ", &[], &[]).is_err());
    }
}
