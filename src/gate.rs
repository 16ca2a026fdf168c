//! PIN challenge in front of destructive or session-leaving actions.
//!
//! The gate only records what was asked for; the session decides what a
//! released action does. There is no lockout: the gate exists to add
//! friction to accidental exits.

use thiserror::Error;

use crate::setup::{phone_ok, strip_whitespace};

const MAX_PIN_INPUT: usize = 12;
const FALLBACK_EMERGENCY_NUMBER: &str = "911";

/// The action waiting behind the PIN sheet
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum_macros::Display)]
pub enum PendingAction {
    #[strum(serialize = "End session")]
    End,
    #[strum(serialize = "Reset session")]
    Reset,
    #[strum(serialize = "Pause")]
    Pause,
    #[strum(serialize = "View history")]
    NavigateToHistory,
    #[strum(serialize = "Back to setup")]
    NavigateToSetup,
    /// sheet opened only to reach the emergency contacts
    #[strum(serialize = "Emergency")]
    None,
}

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum GateError {
    #[error("Incorrect PIN.")]
    IncorrectPin,
    #[error("no action is waiting for a PIN")]
    Closed,
}

#[derive(Debug, Clone, Default)]
pub struct ConfirmationGate {
    pending: Option<PendingAction>,
    input: String,
    rejected: bool,
}

impl ConfirmationGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open the sheet for `action`. A later request replaces the earlier one.
    pub fn request(&mut self, action: PendingAction) {
        self.pending = Some(action);
        self.input.clear();
        self.rejected = false;
    }

    pub fn is_open(&self) -> bool {
        self.pending.is_some()
    }

    pub fn pending(&self) -> Option<PendingAction> {
        self.pending
    }

    /// Release the pending action when `candidate` matches `secret`. An empty
    /// secret is the open-exit policy and accepts anything.
    pub fn submit(&mut self, candidate: &str, secret: &str) -> Result<PendingAction, GateError> {
        let action = self.pending.ok_or(GateError::Closed)?;
        if !secret.is_empty() && candidate != secret {
            self.rejected = true;
            return Err(GateError::IncorrectPin);
        }
        self.cancel();
        Ok(action)
    }

    pub fn cancel(&mut self) {
        self.pending = None;
        self.input.clear();
        self.rejected = false;
    }

    pub fn push_digit(&mut self, c: char) {
        if c.is_ascii_digit() && self.input.len() < MAX_PIN_INPUT {
            self.input.push(c);
            self.rejected = false;
        }
    }

    pub fn backspace(&mut self) {
        self.input.pop();
        self.rejected = false;
    }

    pub fn clear_input(&mut self) {
        self.input.clear();
        self.rejected = false;
    }

    pub fn input(&self) -> &str {
        &self.input
    }

    pub fn masked(&self) -> String {
        "•".repeat(self.input.chars().count())
    }

    /// True after a wrong PIN until the input is edited or the gate closes.
    pub fn rejected(&self) -> bool {
        self.rejected
    }
}

/// Dialable numbers for the emergency sheet.
pub fn emergency_targets(contacts: &[String]) -> Vec<String> {
    let targets: Vec<String> = contacts
        .iter()
        .filter(|c| phone_ok(c))
        .map(|c| strip_whitespace(c))
        .collect();
    if targets.is_empty() {
        vec![FALLBACK_EMERGENCY_NUMBER.to_string()]
    } else {
        targets
    }
}
