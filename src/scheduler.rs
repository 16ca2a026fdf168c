//! Absolute-time triggers for periodic breaks.
//!
//! A trigger that fires is advanced by exactly its interval, never re-based
//! on "now", so the k-th break lands at `start + k * interval` no matter how
//! late each individual tick observed it.

use crate::session::{Phase, SessionConfig};
use crate::util::MS_PER_MINUTE;

/// The kind of guided break a session can run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum_macros::Display)]
pub enum BreakKind {
    /// short head/eye rest
    #[strum(serialize = "headrest")]
    Headrest,
    /// stand up / posture break
    #[strum(serialize = "stand")]
    Stand,
    /// generic short break
    #[strum(serialize = "break")]
    Break,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct BreakScheduler {
    micro_every_ms: i64,
    stand_every_ms: i64,
    next_micro_at_ms: Option<i64>,
    next_stand_at_ms: Option<i64>,
}

impl BreakScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn schedule(&mut self, config: &SessionConfig, now_ms: i64) {
        self.micro_every_ms = config.micro_every_min as i64 * MS_PER_MINUTE as i64;
        self.stand_every_ms = config.stand_every_min as i64 * MS_PER_MINUTE as i64;
        self.next_micro_at_ms = (self.micro_every_ms > 0).then(|| now_ms + self.micro_every_ms);
        self.next_stand_at_ms = (self.stand_every_ms > 0).then(|| now_ms + self.stand_every_ms);
    }

    /// Returns at most one due break per call, micro before stand, and only
    /// while focusing.
    pub fn check_due(&mut self, now_ms: i64, phase: Phase) -> Option<BreakKind> {
        if phase != Phase::Focus {
            return None;
        }

        if let Some(at) = self.next_micro_at_ms {
            if now_ms >= at {
                self.next_micro_at_ms = Some(at + self.micro_every_ms);
                return Some(BreakKind::Headrest);
            }
        }

        if let Some(at) = self.next_stand_at_ms {
            if now_ms >= at {
                self.next_stand_at_ms = Some(at + self.stand_every_ms);
                return Some(BreakKind::Stand);
            }
        }

        None
    }

    pub fn next_micro_at(&self) -> Option<i64> {
        self.next_micro_at_ms
    }

    pub fn next_stand_at(&self) -> Option<i64> {
        self.next_stand_at_ms
    }

    pub fn clear(&mut self) {
        self.next_micro_at_ms = None;
        self.next_stand_at_ms = None;
    }
}
