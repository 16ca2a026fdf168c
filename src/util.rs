use std::cell::Cell;
use std::rc::Rc;
use std::time::{SystemTime, UNIX_EPOCH};

pub const MS_PER_MINUTE: u64 = 60_000;

/// Format a millisecond duration as a zero-padded `HH:MM:SS` clock.
pub fn format_hms(ms: u64) -> String {
    let secs = ms / 1000;
    format!(
        "{:02}:{:02}:{:02}",
        secs / 3600,
        (secs % 3600) / 60,
        secs % 60
    )
}

/// Whole minutes in `ms`, rounded half up.
pub fn round_minutes(ms: u64) -> u64 {
    ms.saturating_add(MS_PER_MINUTE / 2) / MS_PER_MINUTE
}

pub fn minutes_to_ms(minutes: u32) -> u64 {
    minutes as u64 * MS_PER_MINUTE
}

/// Source of wall-clock time in epoch milliseconds
pub trait Clock {
    fn now_ms(&self) -> i64;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as i64)
            .unwrap_or_default()
    }
}

/// Hand-driven clock. Clones share the same instant, so a test can keep one
/// handle and give another to the session.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now: Rc<Cell<i64>>,
}

impl ManualClock {
    pub fn new(start_ms: i64) -> Self {
        Self {
            now: Rc::new(Cell::new(start_ms)),
        }
    }

    pub fn advance(&self, ms: i64) {
        self.now.set(self.now.get() + ms);
    }

    pub fn set(&self, ms: i64) {
        self.now.set(ms);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> i64 {
        self.now.get()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_hms_zero() {
        assert_eq!(format_hms(0), "00:00:00");
    }

    #[test]
    fn test_format_hms_truncates_partial_seconds() {
        assert_eq!(format_hms(999), "00:00:00");
        assert_eq!(format_hms(1_999), "00:00:01");
    }

    #[test]
    fn test_format_hms_hours_minutes_seconds() {
        assert_eq!(format_hms(25 * 60_000), "00:25:00");
        assert_eq!(format_hms(3_600_000 + 61_000), "01:01:01");
        assert_eq!(format_hms(10 * 3_600_000), "10:00:00");
    }

    #[test]
    fn test_round_minutes() {
        assert_eq!(round_minutes(0), 0);
        assert_eq!(round_minutes(29_999), 0);
        assert_eq!(round_minutes(30_000), 1);
        assert_eq!(round_minutes(60_000), 1);
        assert_eq!(round_minutes(25 * 60_000 + 10_000), 25);
        assert_eq!(round_minutes(u64::MAX), u64::MAX / 60_000);
    }

    #[test]
    fn test_manual_clock_shared_between_clones() {
        let clock = ManualClock::new(1_000);
        let other = clock.clone();
        clock.advance(500);
        assert_eq!(other.now_ms(), 1_500);
        other.set(42);
        assert_eq!(clock.now_ms(), 42);
    }

    #[test]
    fn test_system_clock_is_after_2020() {
        assert!(SystemClock.now_ms() > 1_577_836_800_000);
    }
}
