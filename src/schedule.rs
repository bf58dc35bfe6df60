use std::collections::BTreeMap;

use chrono::{DateTime, Datelike, Duration as ChronoDuration, FixedOffset, NaiveTime, Utc};
use log::{debug, warn};
use once_cell::sync::Lazy;

use crate::config::ScheduleConfig;

/// All schedule configuration is interpreted in JST (UTC+9), regardless of
/// the host timezone.
static JST: Lazy<FixedOffset> =
    Lazy::new(|| FixedOffset::east_opt(9 * 3600).expect("UTC+9 offset"));

pub const RESET_WAKE_NAME: &str = "reset-next-day";

/// The daily reset fires at 09:00 JST the next morning and re-plans the day.
const RESET_HOUR: u32 = 9;

pub fn jst() -> FixedOffset {
    *JST
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WakeKind {
    Check { time: String },
    DailyReset,
}

/// A named, single-fire, absolute-time wake request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Wake {
    pub name: String,
    pub when: DateTime<Utc>,
    pub kind: WakeKind,
}

/// Computes today's wake set: one check wake per configured time of day that
/// is still in the future (if today's JST weekday is a check day), plus the
/// daily reset wake, unconditionally. Already-elapsed times are skipped
/// rather than fired immediately, so a late start does not cause a storm.
pub fn plan_day(cfg: &ScheduleConfig, now: DateTime<Utc>) -> Vec<Wake> {
    let jst_now = now.with_timezone(&jst());
    let today = jst_now.date_naive();
    let weekday = jst_now.weekday().num_days_from_sunday();

    let mut wakes = Vec::new();

    if cfg.weekdays_to_check.contains(&weekday) {
        for time in &cfg.check_times_jst {
            let tod = match parse_check_time(time) {
                Some(tod) => tod,
                None => {
                    warn!("ignoring malformed check time {time:?}");
                    continue;
                }
            };
            let when = match today.and_time(tod).and_local_timezone(jst()).single() {
                Some(local) => local.with_timezone(&Utc),
                None => continue,
            };
            if when > now {
                wakes.push(Wake {
                    name: format!("check-{}", time.trim()),
                    when,
                    kind: WakeKind::Check { time: time.trim().to_string() },
                });
            } else {
                debug!("check time {time} already elapsed today, skipped");
            }
        }
    }

    let reset_local = (today + ChronoDuration::days(1))
        .and_time(NaiveTime::from_hms_opt(RESET_HOUR, 0, 0).expect("valid reset time"));
    if let Some(reset) = reset_local.and_local_timezone(jst()).single() {
        wakes.push(Wake {
            name: RESET_WAKE_NAME.to_string(),
            when: reset.with_timezone(&Utc),
            kind: WakeKind::DailyReset,
        });
    }

    wakes
}

fn parse_check_time(s: &str) -> Option<NaiveTime> {
    NaiveTime::parse_from_str(s.trim(), "%H:%M").ok()
}

/// The pending wake set, keyed by name. `replace_all` builds the new set
/// before swapping it in, so stale and fresh wakes never coexist.
#[derive(Debug, Default, Clone)]
pub struct Alarms {
    pending: BTreeMap<String, Wake>,
}

impl Alarms {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn replace_all(&mut self, wakes: Vec<Wake>) {
        let mut next = BTreeMap::new();
        for wake in wakes {
            next.insert(wake.name.clone(), wake);
        }
        self.pending = next;
    }

    /// The soonest pending wake, ties broken by name for determinism.
    pub fn next(&self) -> Option<&Wake> {
        self.pending
            .values()
            .min_by(|a, b| a.when.cmp(&b.when).then_with(|| a.name.cmp(&b.name)))
    }

    /// Removes and returns every wake whose deadline has passed, soonest
    /// first.
    pub fn take_due(&mut self, now: DateTime<Utc>) -> Vec<Wake> {
        let due_names: Vec<String> = self
            .pending
            .values()
            .filter(|wake| wake.when <= now)
            .map(|wake| wake.name.clone())
            .collect();
        let mut due: Vec<Wake> = due_names
            .iter()
            .filter_map(|name| self.pending.remove(name))
            .collect();
        due.sort_by(|a, b| a.when.cmp(&b.when).then_with(|| a.name.cmp(&b.name)));
        due
    }

    pub fn iter(&self) -> impl Iterator<Item = &Wake> {
        self.pending.values()
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}
