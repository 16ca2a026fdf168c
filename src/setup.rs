use clap::ValueEnum;
use thiserror::Error;

use crate::session::{SessionConfig, MAX_DURATION_MS};
use crate::util::minutes_to_ms;

/// Break cadence presets offered at setup
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, strum_macros::Display)]
pub enum BreakPlan {
    /// 25 minutes of focus, 5 minute stand break
    Pomodoro,
    /// 50 minutes of focus, 10 minute stand break
    FiftyTen,
    /// intervals taken from --micro-every / --stand-every / --stand-len
    Custom,
}

/// Micro (head/eye rest) cadence used by both presets.
const PRESET_MICRO_EVERY_MIN: u32 = 20;
const DEFAULT_STAND_LEN_MIN: u32 = 3;
const MAX_EMERGENCY_CONTACTS: usize = 3;

#[derive(Debug, Error, PartialEq)]
pub enum SetupError {
    #[error("Please fix:\n• {}", .0.join("\n• "))]
    Invalid(Vec<String>),
}

/// A phone number is usable once whitespace is stripped and at least three
/// characters remain.
pub fn phone_ok(number: &str) -> bool {
    number.chars().filter(|c| !c.is_whitespace()).count() >= 3
}

pub fn strip_whitespace(number: &str) -> String {
    number.chars().filter(|c| !c.is_whitespace()).collect()
}

/// Everything the setup surface collects before a session can start.
#[derive(Debug, Clone, PartialEq)]
pub struct SetupForm {
    pub minutes: u32,
    pub pin: String,
    pub open_exit: bool,
    pub plan: BreakPlan,
    pub enable_headrest: bool,
    pub enable_stand: bool,
    pub micro_every: u32,
    pub stand_every: u32,
    pub stand_len: u32,
    pub quotes: bool,
    pub emergency: Vec<String>,
    pub description: String,
}

impl Default for SetupForm {
    fn default() -> Self {
        Self {
            minutes: 0,
            pin: String::new(),
            open_exit: false,
            plan: BreakPlan::Pomodoro,
            enable_headrest: true,
            enable_stand: true,
            micro_every: 0,
            stand_every: 0,
            stand_len: DEFAULT_STAND_LEN_MIN,
            quotes: true,
            emergency: Vec::new(),
            description: String::new(),
        }
    }
}

impl SetupForm {
    /// Returns every problem with the form; empty means it can be submitted.
    pub fn validate(&self) -> Vec<String> {
        let mut errs = Vec::new();
        let pin = self.pin.trim();

        if self.minutes < 1 {
            errs.push("Choose a focus duration (≥ 1 minute).".to_string());
        } else if minutes_to_ms(self.minutes) > MAX_DURATION_MS {
            errs.push("Focus duration must be at most 24 hours.".to_string());
        }

        let pin_ok = pin.len() >= 4 && pin.chars().all(|c| c.is_ascii_digit());
        if !(pin_ok || (self.open_exit && pin.is_empty())) {
            errs.push("PIN must be at least 4 digits (numbers only).".to_string());
        }

        if self.plan == BreakPlan::Custom {
            if self.enable_headrest && self.micro_every != 0 && self.micro_every < 10 {
                errs.push("Head/eye rest every must be 0 or ≥ 10 min.".to_string());
            }
            if self.enable_stand && self.stand_every != 0 && self.stand_every < 30 {
                errs.push("Stand every must be 0 or ≥ 30 min.".to_string());
            }
            if self.enable_stand && self.stand_len < 1 {
                errs.push("Stand break length must be ≥ 1 min.".to_string());
            }
        }

        let phones = self.phones();
        if phones.is_empty() {
            errs.push("Enter at least one emergency contact.".to_string());
        } else if phones.len() > MAX_EMERGENCY_CONTACTS {
            errs.push(format!(
                "Enter at most {} emergency contacts.",
                MAX_EMERGENCY_CONTACTS
            ));
        }

        errs
    }

    /// `(micro_every_min, stand_every_min, stand_len_min)` for the chosen plan.
    pub fn plan_values(&self) -> (u32, u32, u32) {
        let micro = |every: u32| if self.enable_headrest { every } else { 0 };
        match self.plan {
            BreakPlan::Pomodoro if self.enable_stand => (micro(PRESET_MICRO_EVERY_MIN), 25, 5),
            BreakPlan::FiftyTen if self.enable_stand => (micro(PRESET_MICRO_EVERY_MIN), 50, 10),
            BreakPlan::Pomodoro | BreakPlan::FiftyTen => (micro(PRESET_MICRO_EVERY_MIN), 0, 0),
            BreakPlan::Custom if self.enable_stand => {
                (micro(self.micro_every), self.stand_every, self.stand_len.max(1))
            }
            BreakPlan::Custom => (micro(self.micro_every), 0, 0),
        }
    }

    fn phones(&self) -> Vec<String> {
        self.emergency
            .iter()
            .filter(|n| phone_ok(n))
            .map(|n| n.trim().to_string())
            .collect()
    }

    /// Validate and build the handoff record for the timer.
    pub fn submit(&self) -> Result<SessionConfig, SetupError> {
        let errs = self.validate();
        if !errs.is_empty() {
            return Err(SetupError::Invalid(errs));
        }

        let (micro_every_min, stand_every_min, stand_len_min) = self.plan_values();
        Ok(SessionConfig {
            duration_ms: minutes_to_ms(self.minutes),
            pin: self.pin.trim().to_string(),
            open_exit: self.open_exit && self.pin.trim().is_empty(),
            micro_every_min,
            stand_every_min,
            stand_len_min,
            emergency: self.phones(),
            description: self.description.trim().to_string(),
            quotes_enabled: self.quotes,
            sound_expected: true,
        })
    }
}
