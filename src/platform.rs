use std::cell::RefCell;
use std::rc::Rc;

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PlatformError {
    #[error("capability unavailable on this platform")]
    Unavailable,
    #[error("capability request failed: {0}")]
    Failed(String),
}

/// Screen wake-lock state as shown in the status line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, strum_macros::Display)]
pub enum WakeLockStatus {
    #[strum(serialize = "Screen lock: on")]
    On,
    #[default]
    #[strum(serialize = "Screen lock: off")]
    Off,
    #[strum(serialize = "Screen lock: unavailable")]
    Unavailable,
}

/// Best-effort host capabilities a running session asks for. Callers treat
/// every failure as a degraded status, never as a reason to stop.
pub trait Platform {
    fn acquire_wake_lock(&mut self) -> Result<(), PlatformError>;
    fn release_wake_lock(&mut self);
    /// While set, leaving the app must go through the PIN gate.
    fn set_exit_guard(&mut self, on: bool) -> Result<(), PlatformError>;
}

impl<P: Platform> Platform for Rc<RefCell<P>> {
    fn acquire_wake_lock(&mut self) -> Result<(), PlatformError> {
        self.borrow_mut().acquire_wake_lock()
    }

    fn release_wake_lock(&mut self) {
        self.borrow_mut().release_wake_lock()
    }

    fn set_exit_guard(&mut self, on: bool) -> Result<(), PlatformError> {
        self.borrow_mut().set_exit_guard(on)
    }
}

/// Terminal host: there is no screen wake-lock to take, and the exit guard
/// is a flag the event loop consults before quitting.
#[derive(Debug, Clone, Default)]
pub struct TerminalPlatform {
    exit_guard: bool,
}

impl TerminalPlatform {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn exit_guarded(&self) -> bool {
        self.exit_guard
    }
}

impl Platform for TerminalPlatform {
    fn acquire_wake_lock(&mut self) -> Result<(), PlatformError> {
        Err(PlatformError::Unavailable)
    }

    fn release_wake_lock(&mut self) {}

    fn set_exit_guard(&mut self, on: bool) -> Result<(), PlatformError> {
        self.exit_guard = on;
        Ok(())
    }
}

/// Records requests; configurable to fail, for exercising degraded paths.
#[derive(Debug, Clone, Default)]
pub struct RecordingPlatform {
    pub wake_lock_result: Option<PlatformError>,
    pub wake_lock_held: bool,
    pub acquire_calls: usize,
    pub release_calls: usize,
    pub exit_guard: bool,
}

impl RecordingPlatform {
    pub fn failing_with(err: PlatformError) -> Self {
        Self {
            wake_lock_result: Some(err),
            ..Self::default()
        }
    }
}

impl Platform for RecordingPlatform {
    fn acquire_wake_lock(&mut self) -> Result<(), PlatformError> {
        self.acquire_calls += 1;
        match &self.wake_lock_result {
            Some(err) => Err(err.clone()),
            None => {
                self.wake_lock_held = true;
                Ok(())
            }
        }
    }

    fn release_wake_lock(&mut self) {
        self.release_calls += 1;
        self.wake_lock_held = false;
    }

    fn set_exit_guard(&mut self, on: bool) -> Result<(), PlatformError> {
        self.exit_guard = on;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_platform_has_no_wake_lock() {
        let mut p = TerminalPlatform::new();
        assert_eq!(p.acquire_wake_lock(), Err(PlatformError::Unavailable));
    }

    #[test]
    fn test_terminal_platform_exit_guard() {
        let mut p = TerminalPlatform::new();
        assert!(!p.exit_guarded());
        p.set_exit_guard(true).unwrap();
        assert!(p.exit_guarded());
        p.set_exit_guard(false).unwrap();
        assert!(!p.exit_guarded());
    }

    #[test]
    fn test_shared_platform_forwards() {
        let shared = Rc::new(RefCell::new(RecordingPlatform::default()));
        let mut handle = shared.clone();
        handle.acquire_wake_lock().unwrap();
        handle.release_wake_lock();
        assert_eq!(shared.borrow().acquire_calls, 1);
        assert_eq!(shared.borrow().release_calls, 1);
        assert!(!shared.borrow().wake_lock_held);
    }

    #[test]
    fn test_status_text() {
        assert_eq!(WakeLockStatus::On.to_string(), "Screen lock: on");
        assert_eq!(WakeLockStatus::default().to_string(), "Screen lock: off");
        assert_eq!(
            WakeLockStatus::Unavailable.to_string(),
            "Screen lock: unavailable"
        );
    }
}
