//! The focus session: countdown, breaks, pause, completion and the PIN-gated
//! ways out of a running session.
//!
//! Remaining time is always derived from an absolute deadline, so a late or
//! skipped tick never loses or gains time. Breaks and quote rotation are
//! deadlines polled on the same tick.

use std::sync::mpsc::Receiver;

use chrono::{DateTime, TimeZone, Utc};
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::alerts::{AlertBridge, AlertKind, BreakPrompt, ControlHandle, ControlRequest, PromptChoice, SoundStatus};
use crate::gate::{emergency_targets, ConfirmationGate, GateError, PendingAction};
use crate::history::{HistoryEntry, HistoryRecorder, Outcome};
use crate::platform::{Platform, PlatformError, WakeLockStatus};
use crate::quotes::QuoteDeck;
use crate::scheduler::{BreakKind, BreakScheduler};
use crate::setup::phone_ok;
use crate::util::{format_hms, minutes_to_ms, round_minutes, Clock};

const HEADREST_MS: u64 = 20_000;
const SHORT_BREAK_MS: u64 = 5 * 60_000;
/// Longest focus block a handoff may ask for
pub const MAX_DURATION_MS: u64 = 24 * 60 * 60_000;

/// Everything setup hands to the timer
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SessionConfig {
    pub duration_ms: u64,
    pub pin: String,
    /// explicit opt-in to an empty PIN
    pub open_exit: bool,
    pub micro_every_min: u32,
    pub stand_every_min: u32,
    pub stand_len_min: u32,
    #[serde(alias = "emergencyContacts")]
    pub emergency: Vec<String>,
    pub description: String,
    #[serde(alias = "enableQuotes")]
    pub quotes_enabled: bool,
    pub sound_expected: bool,
}

impl SessionConfig {
    /// Structural checks repeated at timer boot, whatever produced the record.
    pub fn check_handoff(&self) -> Result<(), Vec<String>> {
        let mut errs = Vec::new();
        if self.duration_ms == 0 {
            errs.push("Choose a focus duration (≥ 1 minute).".to_string());
        } else if self.duration_ms > MAX_DURATION_MS {
            errs.push("Focus duration must be at most 24 hours.".to_string());
        }
        let pin_ok = self.pin.len() >= 4 && self.pin.chars().all(|c| c.is_ascii_digit());
        if !(pin_ok || (self.open_exit && self.pin.is_empty())) {
            errs.push("PIN must be at least 4 digits (numbers only).".to_string());
        }
        if self.stand_every_min > 0 && self.stand_len_min < 1 {
            errs.push("Stand break length must be ≥ 1 min.".to_string());
        }
        if !self.emergency.iter().any(|c| phone_ok(c)) {
            errs.push("Enter at least one emergency contact.".to_string());
        }
        if errs.is_empty() {
            Ok(())
        } else {
            Err(errs)
        }
    }

    pub fn break_len_ms(&self, kind: BreakKind) -> u64 {
        match kind {
            BreakKind::Headrest => HEADREST_MS,
            BreakKind::Stand => minutes_to_ms(self.stand_len_min.max(1)),
            BreakKind::Break => SHORT_BREAK_MS,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, strum_macros::Display)]
pub enum Phase {
    #[default]
    #[strum(serialize = "Focus")]
    Focus,
    #[strum(serialize = "Micro break")]
    MicroBreak,
    #[strum(serialize = "Stand/stretch")]
    StandBreak,
}

impl Phase {
    fn for_break(kind: BreakKind) -> Self {
        match kind {
            BreakKind::Headrest | BreakKind::Break => Phase::MicroBreak,
            BreakKind::Stand => Phase::StandBreak,
        }
    }

    /// Label written to history
    pub fn history_label(self) -> &'static str {
        match self {
            Phase::Focus => "Focus",
            Phase::MicroBreak | Phase::StandBreak => "Break",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Lifecycle {
    #[default]
    Uninitialized,
    Running,
    Paused,
    Completed,
    Terminated,
}

/// Where the app should go once the session lets go of the screen
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Destination {
    Setup,
    History,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BreakTimer {
    pub kind: BreakKind,
    pub ends_at_ms: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SessionState {
    pub phase: Phase,
    pub remaining_ms: u64,
    pub end_at_ms: Option<i64>,
    pub paused: bool,
    pub configured: bool,
    pub timeup_handled: bool,
    pub focus_mode: bool,
    pub lifecycle: Lifecycle,
    pub wake_lock: WakeLockStatus,
    pub exit_guard: bool,
}

impl Default for SessionState {
    fn default() -> Self {
        Self {
            phase: Phase::Focus,
            remaining_ms: 0,
            end_at_ms: None,
            paused: true,
            configured: false,
            timeup_handled: false,
            focus_mode: false,
            lifecycle: Lifecycle::Uninitialized,
            wake_lock: WakeLockStatus::Off,
            exit_guard: false,
        }
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum SessionError {
    #[error("Please fix:\n• {}", .0.join("\n• "))]
    InvalidHandoff(Vec<String>),
    #[error("Start a valid session from setup first.")]
    NotStarted,
    #[error("No active session to end.")]
    NoActiveSession,
    #[error("Incorrect PIN.")]
    IncorrectPin,
}

/// Capabilities the session is built with
pub struct SessionDeps {
    pub clock: Box<dyn Clock>,
    pub platform: Box<dyn Platform>,
    pub history: Box<dyn HistoryRecorder>,
    /// `None` runs breaks automatically, without a prompt
    pub bridge: Option<Box<dyn AlertBridge>>,
}

pub struct Session {
    config: SessionConfig,
    state: SessionState,
    scheduler: BreakScheduler,
    gate: ConfirmationGate,
    quotes: QuoteDeck,
    break_timer: Option<BreakTimer>,
    notice: Option<String>,
    completion_prompt: bool,
    navigation: Option<Destination>,
    controls: Option<Receiver<ControlRequest>>,
    clock: Box<dyn Clock>,
    platform: Box<dyn Platform>,
    history: Box<dyn HistoryRecorder>,
    bridge: Option<Box<dyn AlertBridge>>,
}

impl Session {
    pub fn new(config: SessionConfig, deps: SessionDeps) -> Self {
        let state = SessionState {
            remaining_ms: config.duration_ms,
            ..SessionState::default()
        };
        Self {
            config,
            state,
            scheduler: BreakScheduler::new(),
            gate: ConfirmationGate::new(),
            quotes: QuoteDeck::new(),
            break_timer: None,
            notice: None,
            completion_prompt: false,
            navigation: None,
            controls: None,
            clock: deps.clock,
            platform: deps.platform,
            history: deps.history,
            bridge: deps.bridge,
        }
    }

    /// Validate the handoff and start counting down.
    pub fn boot(config: SessionConfig, deps: SessionDeps) -> Result<Self, SessionError> {
        config.check_handoff().map_err(SessionError::InvalidHandoff)?;
        let mut session = Session::new(config, deps);
        session.start();
        Ok(session)
    }

    pub fn start(&mut self) {
        let now = self.clock.now_ms();
        self.cancel_timers();
        self.state.remaining_ms = self.config.duration_ms;
        self.state.end_at_ms = Some(now + self.config.duration_ms as i64);
        self.state.paused = false;
        self.state.phase = Phase::Focus;
        self.state.configured = true;
        self.state.timeup_handled = false;
        self.state.lifecycle = Lifecycle::Running;
        self.completion_prompt = false;
        self.notice = None;
        self.scheduler.schedule(&self.config, now);

        self.state.wake_lock = match self.platform.acquire_wake_lock() {
            Ok(()) => WakeLockStatus::On,
            Err(PlatformError::Unavailable) => {
                debug!("no screen wake lock on this platform");
                WakeLockStatus::Unavailable
            }
            Err(err) => {
                warn!(error = %err, "screen wake lock request failed");
                WakeLockStatus::Off
            }
        };
        self.set_exit_guard(true);
        self.state.focus_mode = true;

        if let Some(bridge) = self.bridge.as_mut() {
            let (handle, rx) = ControlHandle::channel();
            bridge.register_controls(Box::new(handle));
            self.controls = Some(rx);
            if self.config.sound_expected {
                bridge.init();
            }
        }

        info!(
            duration_ms = self.config.duration_ms,
            micro_every_min = self.config.micro_every_min,
            stand_every_min = self.config.stand_every_min,
            "session started"
        );
    }

    /// Runtime heartbeat.
    pub fn tick(&mut self) {
        self.poll_timers();
        if self.state.lifecycle == Lifecycle::Running && !self.state.paused {
            let now = self.clock.now_ms();
            self.refresh_remaining(now);
            if self.state.remaining_ms == 0 {
                self.complete();
                return;
            }
            if let Some(kind) = self.scheduler.check_due(now, self.state.phase) {
                self.fire_break(kind);
            }
        }
        self.drain_controls();
    }

    /// Fire the break one-shot and rotate the pause quote when due. Runs on
    /// every tick, paused or not.
    pub fn poll_timers(&mut self) {
        let now = self.clock.now_ms();
        if let Some(timer) = self.break_timer {
            if now >= timer.ends_at_ms {
                self.finish_break(timer.kind);
            }
        }
        if self.state.paused {
            self.quotes.poll(now);
        }
    }

    pub fn pause(&mut self) {
        if self.state.paused || self.state.lifecycle != Lifecycle::Running {
            return;
        }
        let now = self.clock.now_ms();
        self.refresh_remaining(now);
        self.state.paused = true;
        self.state.end_at_ms = None;
        self.state.lifecycle = Lifecycle::Paused;
        self.state.focus_mode = false;
        self.cancel_timers();
        if self.config.quotes_enabled {
            self.quotes.show(now);
        }
        debug!(remaining_ms = self.state.remaining_ms, "session paused");
    }

    pub fn resume(&mut self) -> Result<(), SessionError> {
        if !self.state.configured {
            return Err(SessionError::NotStarted);
        }
        if self.state.lifecycle != Lifecycle::Paused {
            return Ok(());
        }
        let now = self.clock.now_ms();
        self.state.end_at_ms = Some(now + self.state.remaining_ms as i64);
        self.state.paused = false;
        self.state.lifecycle = Lifecycle::Running;
        self.state.phase = Phase::Focus;
        self.state.focus_mode = true;
        self.notice = None;
        self.cancel_timers();
        debug!(remaining_ms = self.state.remaining_ms, "session resumed");
        Ok(())
    }

    /// Run a guided break. The countdown is frozen for its length, so breaks
    /// never eat into focus time.
    pub fn begin_break(&mut self, kind: BreakKind) {
        if !self.is_live() || self.state.phase != Phase::Focus {
            return;
        }
        self.pause();
        self.state.phase = Phase::for_break(kind);
        let now = self.clock.now_ms();
        self.break_timer = Some(BreakTimer {
            kind,
            ends_at_ms: now + self.config.break_len_ms(kind) as i64,
        });
        self.notice = Some(break_instruction(kind, &self.config).to_string());
        info!(%kind, "break started");
    }

    fn finish_break(&mut self, kind: BreakKind) {
        self.break_timer = None;
        self.state.phase = Phase::Focus;
        self.notice = None;
        info!(%kind, "break finished");
        if let Err(err) = self.resume() {
            debug!(error = %err, "break ended without a session to resume");
        }
    }

    fn fire_break(&mut self, kind: BreakKind) {
        debug!(%kind, "break due");
        match self.bridge.as_mut() {
            Some(bridge) => bridge.trigger(AlertKind::from(kind)),
            None => self.begin_break(kind),
        }
        self.drain_controls();
    }

    /// Drop the break one-shot and the quote rotation.
    pub fn cancel_timers(&mut self) {
        self.break_timer = None;
        self.quotes.hide();
    }

    pub fn end_early(&mut self) -> Result<(), SessionError> {
        if !self.is_live() {
            return Err(SessionError::NoActiveSession);
        }
        self.gate.request(PendingAction::End);
        Ok(())
    }

    pub fn reset(&mut self) {
        if self.is_live() {
            self.gate.request(PendingAction::Reset);
        } else {
            self.navigation = Some(Destination::Setup);
        }
    }

    pub fn toggle_pause(&mut self) -> Result<(), SessionError> {
        match self.state.lifecycle {
            Lifecycle::Running => {
                self.gate.request(PendingAction::Pause);
                Ok(())
            }
            Lifecycle::Paused => self.resume(),
            Lifecycle::Uninitialized => Err(SessionError::NotStarted),
            Lifecycle::Completed | Lifecycle::Terminated => Ok(()),
        }
    }

    pub fn enter_focus_mode(&mut self) {
        if self.state.lifecycle == Lifecycle::Running {
            self.state.focus_mode = true;
        }
    }

    pub fn exit_focus_mode(&mut self) {
        self.state.focus_mode = false;
    }

    pub fn request_history(&mut self) {
        if self.is_live() {
            self.gate.request(PendingAction::NavigateToHistory);
        } else {
            self.navigation = Some(Destination::History);
        }
    }

    pub fn request_setup(&mut self) {
        if self.is_live() {
            self.gate.request(PendingAction::NavigateToSetup);
        } else {
            self.navigation = Some(Destination::Setup);
        }
    }

    /// Open the PIN sheet just to reach the emergency contacts.
    pub fn open_emergency(&mut self) {
        self.gate.request(PendingAction::None);
    }

    pub fn cancel_gate(&mut self) {
        self.gate.cancel();
    }

    /// Check `candidate` against the configured PIN and run whatever the
    /// sheet was opened for. `Ok(None)` when no sheet is open.
    pub fn submit_pin(&mut self, candidate: &str) -> Result<Option<PendingAction>, SessionError> {
        let action = match self.gate.submit(candidate, &self.config.pin) {
            Ok(action) => action,
            Err(GateError::IncorrectPin) => {
                debug!("incorrect PIN");
                return Err(SessionError::IncorrectPin);
            }
            Err(GateError::Closed) => return Ok(None),
        };

        debug!(%action, "PIN accepted");
        match action {
            PendingAction::End => self.end_and_navigate(Outcome::EndedViaPin, Destination::Setup),
            PendingAction::Reset => {
                if self.is_live() {
                    self.terminate();
                }
                self.navigation = Some(Destination::Setup);
            }
            PendingAction::Pause => self.pause(),
            PendingAction::NavigateToHistory => {
                self.end_and_navigate(Outcome::EndedToViewHistory, Destination::History)
            }
            PendingAction::NavigateToSetup => {
                self.end_and_navigate(Outcome::EndedToSetup, Destination::Setup)
            }
            PendingAction::None => {}
        }
        Ok(Some(action))
    }

    /// Submit whatever has been typed on the sheet's keypad.
    pub fn submit_gate_input(&mut self) -> Result<Option<PendingAction>, SessionError> {
        let input = self.gate.input().to_string();
        self.submit_pin(&input)
    }

    fn end_and_navigate(&mut self, outcome: Outcome, dest: Destination) {
        if self.is_live() {
            let minutes = self.elapsed_minutes();
            self.record(outcome, minutes, self.state.phase.history_label());
            self.terminate();
        }
        self.navigation = Some(dest);
    }

    /// The process is going away under a live session.
    pub fn abandon(&mut self) {
        if !self.is_live() {
            return;
        }
        let minutes = self.elapsed_minutes();
        self.record(Outcome::EndedEarly, minutes, self.state.phase.history_label());
        self.terminate();
    }

    fn terminate(&mut self) {
        self.stop();
        self.state.lifecycle = Lifecycle::Terminated;
        self.state.configured = false;
        self.controls = None;
        info!("session terminated");
    }

    /// Shared teardown for completion and termination.
    fn stop(&mut self) {
        self.cancel_timers();
        self.scheduler.clear();
        self.state.paused = true;
        self.state.end_at_ms = None;
        self.state.focus_mode = false;
        self.notice = None;
        self.gate.cancel();
        if let Some(bridge) = self.bridge.as_mut() {
            bridge.dismiss();
        }
        self.platform.release_wake_lock();
        if self.state.wake_lock == WakeLockStatus::On {
            self.state.wake_lock = WakeLockStatus::Off;
        }
        self.set_exit_guard(false);
    }

    fn complete(&mut self) {
        if self.state.timeup_handled {
            return;
        }
        self.state.timeup_handled = true;
        self.state.remaining_ms = 0;
        self.stop();
        self.state.phase = Phase::Focus;
        self.state.lifecycle = Lifecycle::Completed;

        let minutes = round_minutes(self.config.duration_ms);
        self.record(Outcome::Completed, minutes, Phase::Focus.history_label());
        if let Some(bridge) = self.bridge.as_mut() {
            bridge.trigger(AlertKind::Completion);
        }
        self.completion_prompt = true;
        info!(minutes, "session complete");
    }

    pub fn acknowledge_completion(&mut self, dest: Destination) {
        if self.completion_prompt {
            self.completion_prompt = false;
            self.navigation = Some(dest);
        }
    }

    pub fn take_navigation(&mut self) -> Option<Destination> {
        self.navigation.take()
    }

    pub fn prompt(&self) -> Option<&BreakPrompt> {
        self.bridge.as_ref().and_then(|b| b.prompt())
    }

    pub fn respond_to_prompt(&mut self, choice: PromptChoice) {
        if let Some(bridge) = self.bridge.as_mut() {
            bridge.respond(choice);
        }
        self.drain_controls();
    }

    /// Apply what the alert bridge asked for since the last drain.
    pub fn drain_controls(&mut self) {
        let requests: Vec<ControlRequest> = match &self.controls {
            Some(rx) => rx.try_iter().collect(),
            None => return,
        };
        for req in requests {
            debug!(?req, "control request");
            match req {
                ControlRequest::Pause => self.pause(),
                ControlRequest::Resume => {
                    if let Err(err) = self.resume() {
                        debug!(error = %err, "resume request ignored");
                    }
                }
                ControlRequest::StartBreak(kind) => self.begin_break(kind),
            }
        }
    }

    /// Wake the audio output from a user key press.
    pub fn unlock_sound(&mut self) {
        if let Some(bridge) = self.bridge.as_mut() {
            if bridge.sound_status() == SoundStatus::Locked {
                bridge.init();
            }
        }
    }

    fn refresh_remaining(&mut self, now: i64) {
        if let Some(end_at) = self.state.end_at_ms {
            self.state.remaining_ms = (end_at - now).max(0) as u64;
        }
    }

    /// Focus minutes spent so far, counting a pause as frozen time.
    fn elapsed_minutes(&self) -> u64 {
        let remaining = if self.state.paused {
            self.state.remaining_ms
        } else {
            self.state
                .end_at_ms
                .map(|end_at| (end_at - self.clock.now_ms()).max(0) as u64)
                .unwrap_or(self.state.remaining_ms)
        };
        round_minutes(self.config.duration_ms.saturating_sub(remaining))
    }

    fn record(&mut self, outcome: Outcome, minutes: u64, label: &str) {
        let entry = HistoryEntry {
            date: self.now_utc(),
            minutes,
            outcome,
            label: label.to_string(),
            description: self.config.description.clone(),
        };
        if let Err(err) = self.history.append(&entry) {
            warn!(error = %err, %outcome, "could not record session history");
        }
    }

    fn now_utc(&self) -> DateTime<Utc> {
        Utc.timestamp_millis_opt(self.clock.now_ms())
            .single()
            .unwrap_or_else(Utc::now)
    }

    fn set_exit_guard(&mut self, on: bool) {
        match self.platform.set_exit_guard(on) {
            Ok(()) => self.state.exit_guard = on,
            Err(err) => {
                warn!(error = %err, on, "exit guard unavailable");
                self.state.exit_guard = false;
            }
        }
    }

    pub fn is_live(&self) -> bool {
        matches!(self.state.lifecycle, Lifecycle::Running | Lifecycle::Paused)
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn scheduler(&self) -> &BreakScheduler {
        &self.scheduler
    }

    pub fn gate(&self) -> &ConfirmationGate {
        &self.gate
    }

    /// Keypad editing for the open PIN sheet
    pub fn gate_mut(&mut self) -> &mut ConfirmationGate {
        &mut self.gate
    }

    pub fn emergency_targets(&self) -> Vec<String> {
        emergency_targets(&self.config.emergency)
    }

    pub fn break_timer(&self) -> Option<BreakTimer> {
        self.break_timer
    }

    pub fn break_remaining_ms(&self) -> Option<u64> {
        let now = self.clock.now_ms();
        self.break_timer
            .map(|t| (t.ends_at_ms - now).max(0) as u64)
    }

    pub fn completion_pending(&self) -> bool {
        self.completion_prompt
    }

    pub fn notice(&self) -> Option<&str> {
        self.notice.as_deref()
    }

    pub fn quote(&self) -> Option<&'static str> {
        self.quotes.current()
    }

    pub fn quote_expanded(&self) -> bool {
        self.quotes.is_expanded()
    }

    pub fn toggle_quote_size(&mut self) {
        self.quotes.toggle_expanded();
    }

    pub fn sound_status(&self) -> Option<SoundStatus> {
        self.bridge.as_ref().map(|b| b.sound_status())
    }

    pub fn clock_text(&self) -> String {
        format_hms(self.state.remaining_ms)
    }

    pub fn progress_pct(&self) -> u16 {
        let duration = self.config.duration_ms;
        if duration == 0 {
            return 0;
        }
        let remaining = u128::from(self.state.remaining_ms.min(duration));
        let duration = u128::from(duration);
        let remaining_pct = (remaining * 100 + duration / 2) / duration;
        (100 - remaining_pct) as u16
    }

    pub fn phase_label(&self) -> String {
        format!("Phase: {}", self.state.phase)
    }

    pub fn wake_lock_text(&self) -> String {
        self.state.wake_lock.to_string()
    }

    /// Description, duration and break plan, one line each.
    pub fn session_info(&self) -> Vec<String> {
        let mut lines = Vec::new();
        if !self.config.description.is_empty() {
            lines.push(format!("Description: {}", self.config.description));
        }
        lines.push(format!(
            "Duration: {} min",
            round_minutes(self.config.duration_ms)
        ));
        let mut breaks = Vec::new();
        if self.config.micro_every_min > 0 {
            breaks.push(format!("Head/eye-rest every {}m", self.config.micro_every_min));
        }
        if self.config.stand_every_min > 0 {
            breaks.push(format!(
                "Stand every {}m ({}m)",
                self.config.stand_every_min, self.config.stand_len_min
            ));
        }
        if !breaks.is_empty() {
            lines.push(format!("Breaks: {}", breaks.iter().join(" • ")));
        }
        lines
    }
}

fn break_instruction(kind: BreakKind, config: &SessionConfig) -> String {
    match kind {
        BreakKind::Headrest => {
            "Head rest: look 20 feet away, relax your eyes and neck for 20 seconds.".to_string()
        }
        BreakKind::Stand => format!(
            "Stand up: stretch, fix your posture and hydrate for {} min.",
            config.stand_len_min.max(1)
        ),
        BreakKind::Break => "Break: short walk, water, breathe. No phone scrolling.".to_string(),
    }
}
