//! Trigger-spec grammar parsing (spec §6).
//!
//! ```text
//! once in N {minute|hour|day}
//! once at HH:MM
//! every day at HH:MM
//! every N {minute|hour}
//! ```

use super::job::JobKind;
use chrono::{DateTime, Duration as ChronoDuration, TimeZone, Utc};
use chrono_tz::Tz;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerSpec {
    OnceRelative { amount: i64, unit: RelativeUnit },
    OnceAt { hour: u32, minute: u32 },
    Daily { hour: u32, minute: u32 },
    Periodic { interval_secs: u32 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelativeUnit {
    Minute,
    Hour,
    Day,
}

impl RelativeUnit {
    fn to_secs(self) -> i64 {
        match self {
            RelativeUnit::Minute => 60,
            RelativeUnit::Hour => 3_600,
            RelativeUnit::Day => 86_400,
        }
    }
}

pub fn parse_trigger(text: &str) -> Option<TriggerSpec> {
    let words: Vec<&str> = text.split_whitespace().collect();
    match words.as_slice() {
        ["once", "in", n, unit] => {
            let amount: i64 = n.parse().ok()?;
            let unit = match singularize(unit) {
                "minute" => RelativeUnit::Minute,
                "hour" => RelativeUnit::Hour,
                "day" => RelativeUnit::Day,
                _ => return None,
            };
            Some(TriggerSpec::OnceRelative { amount, unit })
        }
        ["once", "at", hhmm] => parse_hhmm(hhmm).map(|(hour, minute)| TriggerSpec::OnceAt { hour, minute }),
        ["every", "day", "at", hhmm] => {
            parse_hhmm(hhmm).map(|(hour, minute)| TriggerSpec::Daily { hour, minute })
        }
        ["every", n, unit] => {
            let amount: i64 = n.parse().ok()?;
            let secs = match singularize(unit) {
                "minute" => amount * 60,
                "hour" => amount * 3_600,
                _ => return None,
            };
            if secs < 60 {
                return None;
            }
            Some(TriggerSpec::Periodic {
                interval_secs: secs as u32,
            })
        }
        _ => None,
    }
}

fn singularize(word: &str) -> &str {
    word.strip_suffix('s').unwrap_or(word)
}

fn parse_hhmm(s: &str) -> Option<(u32, u32)> {
    let (h, m) = s.split_once(':')?;
    let hour: u32 = h.parse().ok()?;
    let minute: u32 = m.parse().ok()?;
    if hour > 23 || minute > 59 {
        return None;
    }
    Some((hour, minute))
}

impl TriggerSpec {
    /// Resolve the initial `(JobKind, next_fire_epoch)` at creation time.
    pub fn resolve_initial(&self, now_epoch: i64, tz: Tz) -> (JobKind, i64) {
        match *self {
            TriggerSpec::OnceRelative { amount, unit } => {
                (JobKind::Once, now_epoch + amount * unit.to_secs())
            }
            TriggerSpec::OnceAt { hour, minute } => {
                (JobKind::Once, next_local_hhmm(now_epoch, hour, minute, tz))
            }
            TriggerSpec::Daily { hour, minute } => (
                JobKind::Daily { hour, minute },
                next_local_hhmm(now_epoch, hour, minute, tz),
            ),
            TriggerSpec::Periodic { interval_secs } => (
                JobKind::Periodic { interval_secs },
                now_epoch + interval_secs as i64,
            ),
        }
    }
}

/// Next local HH:MM strictly after `now_epoch`, DST-aware.
pub(crate) fn next_local_hhmm(now_epoch: i64, hour: u32, minute: u32, tz: Tz) -> i64 {
    let now_utc: DateTime<Utc> = Utc.timestamp_opt(now_epoch, 0).single().expect("valid epoch");
    let now_local = now_utc.with_timezone(&tz);

    let mut candidate = now_local
        .date_naive()
        .and_hms_opt(hour, minute, 0)
        .expect("valid hour/minute");
    let resolve = |naive: chrono::NaiveDateTime| -> DateTime<Tz> {
        tz.from_local_datetime(&naive).earliest().unwrap_or_else(|| {
            tz.from_local_datetime(&(naive + ChronoDuration::hours(1)))
                .earliest()
                .expect("post-gap local time resolves")
        })
    };

    let mut candidate_local = resolve(candidate);
    if candidate_local <= now_local {
        candidate = (now_local.date_naive() + ChronoDuration::days(1))
            .and_hms_opt(hour, minute, 0)
            .expect("valid hour/minute");
        candidate_local = resolve(candidate);
    }
    candidate_local.with_timezone(&Utc).timestamp()
}
