//! Hourly/daily request rate limiting (spec §4.B).
//!
//! Owned exclusively by the agent task (single-writer); `snapshot()` gives
//! read-only callers (the `get_health` tool) a consistent point-in-time
//! view without blocking admission.

use std::sync::atomic::{AtomicI64, AtomicU32, Ordering};

const SECONDS_PER_HOUR: i64 = 3_600;
const SECONDS_PER_DAY: i64 = 86_400;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Allow,
    Deny { retry_after_secs: u64 },
}

pub struct RateLimiter {
    hour_cap: u32,
    day_cap: u32,
    hour_count: AtomicU32,
    day_count: AtomicU32,
    hour_window_start: AtomicI64,
    day_window_start: AtomicI64,
    /// Whether the wall clock has ever been synced; unsynced clocks admit
    /// conservatively at a quarter of the configured caps.
    clock_synced: std::sync::atomic::AtomicBool,
}

impl RateLimiter {
    pub fn new(hour_cap: u32, day_cap: u32, now_epoch: i64) -> Self {
        Self {
            hour_cap,
            day_cap,
            hour_count: AtomicU32::new(0),
            day_count: AtomicU32::new(0),
            hour_window_start: AtomicI64::new(now_epoch),
            day_window_start: AtomicI64::new(now_epoch),
            clock_synced: std::sync::atomic::AtomicBool::new(true),
        }
    }

    /// Defaults from spec §4.B: 30/hour, 200/day.
    pub fn with_defaults(now_epoch: i64) -> Self {
        Self::new(30, 200, now_epoch)
    }

    pub fn mark_clock_unsynced(&self) {
        self.clock_synced.store(false, Ordering::SeqCst);
    }

    pub fn mark_clock_synced(&self) {
        self.clock_synced.store(true, Ordering::SeqCst);
    }

    /// Roll the hour/day windows forward if `now` has crossed a boundary,
    /// then attempt to admit one request.
    pub fn admit(&self, now_epoch: i64) -> Admission {
        self.roll_windows(now_epoch);

        let (hour_cap, day_cap) = if self.clock_synced.load(Ordering::SeqCst) {
            (self.hour_cap, self.day_cap)
        } else {
            (self.hour_cap / 4, self.day_cap / 4)
        };

        let hour_count = self.hour_count.load(Ordering::SeqCst);
        let day_count = self.day_count.load(Ordering::SeqCst);

        if hour_count >= hour_cap {
            let retry_after = (self.hour_window_start.load(Ordering::SeqCst) + SECONDS_PER_HOUR
                - now_epoch)
                .max(0) as u64;
            return Admission::Deny {
                retry_after_secs: retry_after,
            };
        }
        if day_count >= day_cap {
            let retry_after = (self.day_window_start.load(Ordering::SeqCst) + SECONDS_PER_DAY
                - now_epoch)
                .max(0) as u64;
            return Admission::Deny {
                retry_after_secs: retry_after,
            };
        }

        self.hour_count.fetch_add(1, Ordering::SeqCst);
        self.day_count.fetch_add(1, Ordering::SeqCst);
        Admission::Allow
    }

    pub fn snapshot(&self, now_epoch: i64) -> (u32, u32) {
        self.roll_windows(now_epoch);
        (
            self.hour_count.load(Ordering::SeqCst),
            self.day_count.load(Ordering::SeqCst),
        )
    }

    fn roll_windows(&self, now_epoch: i64) {
        let hour_start = self.hour_window_start.load(Ordering::SeqCst);
        if now_epoch - hour_start >= SECONDS_PER_HOUR {
            self.hour_count.store(0, Ordering::SeqCst);
            self.hour_window_start.store(now_epoch, Ordering::SeqCst);
        }
        let day_start = self.day_window_start.load(Ordering::SeqCst);
        if now_epoch - day_start >= SECONDS_PER_DAY {
            self.day_count.store(0, Ordering::SeqCst);
            self.day_window_start.store(now_epoch, Ordering::SeqCst);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admits_up_to_hour_cap_then_denies() {
        let limiter = RateLimiter::new(3, 200, 0);
        for _ in 0..3 {
            assert_eq!(limiter.admit(0), Admission::Allow);
        }
        assert!(matches!(limiter.admit(0), Admission::Deny { .. }));
    }

    #[test]
    fn resumes_after_hour_boundary() {
        let limiter = RateLimiter::new(1, 200, 0);
        assert_eq!(limiter.admit(0), Admission::Allow);
        assert!(matches!(limiter.admit(10), Admission::Deny { .. }));
        assert_eq!(limiter.admit(SECONDS_PER_HOUR), Admission::Allow);
    }

    #[test]
    fn unsynced_clock_uses_quarter_cap() {
        let limiter = RateLimiter::new(4, 200, 0);
        limiter.mark_clock_unsynced();
        assert_eq!(limiter.admit(0), Admission::Allow);
        assert!(matches!(limiter.admit(0), Admission::Deny { .. }));
    }

    #[test]
    fn denial_followed_by_admission_at_next_window() {
        let limiter = RateLimiter::new(1, 1, 0);
        assert_eq!(limiter.admit(0), Admission::Allow);
        assert!(matches!(limiter.admit(5), Admission::Deny { .. }));
        // still within the same window
        assert!(matches!(limiter.admit(SECONDS_PER_HOUR - 1), Admission::Deny { .. }));
    }
}
