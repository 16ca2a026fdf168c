//! Alert bridge: chimes, desktop notifications, and the break prompt.
//!
//! The session triggers alerts; the bridge answers back through
//! [`TimerControls`], which it receives once at session start. Control
//! requests travel over a channel the session drains, so the bridge never
//! holds a reference into the session.

use std::cell::RefCell;
use std::io::{self, Write};
use std::rc::Rc;
use std::sync::mpsc::{self, Receiver, Sender};

use notify_rust::Notification;
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::Preferences;
use crate::scheduler::BreakKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum_macros::Display)]
pub enum AlertKind {
    #[strum(serialize = "headrest")]
    Headrest,
    #[strum(serialize = "stand")]
    Stand,
    #[strum(serialize = "break")]
    Break,
    #[strum(serialize = "timeup")]
    Completion,
}

impl From<BreakKind> for AlertKind {
    fn from(kind: BreakKind) -> Self {
        match kind {
            BreakKind::Headrest => AlertKind::Headrest,
            BreakKind::Stand => AlertKind::Stand,
            BreakKind::Break => AlertKind::Break,
        }
    }
}

impl AlertKind {
    pub fn break_kind(self) -> Option<BreakKind> {
        match self {
            AlertKind::Headrest => Some(BreakKind::Headrest),
            AlertKind::Stand => Some(BreakKind::Stand),
            AlertKind::Break => Some(BreakKind::Break),
            AlertKind::Completion => None,
        }
    }
}

#[derive(Debug, Error)]
pub enum AlertError {
    #[error("audio output failed: {0}")]
    Io(#[from] io::Error),
    #[error("desktop notification failed: {0}")]
    Notification(String),
}

/// Requests a bridge can make of the running session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlRequest {
    Pause,
    Resume,
    StartBreak(BreakKind),
}

/// Inbound control surface the session registers with its bridge.
/// Every call is a request; repeating one is harmless.
pub trait TimerControls {
    fn pause_timer(&self);
    fn resume_timer(&self);
    fn start_break(&self, kind: BreakKind);
}

#[derive(Debug, Clone)]
pub struct ControlHandle {
    tx: Sender<ControlRequest>,
}

impl ControlHandle {
    pub fn channel() -> (Self, Receiver<ControlRequest>) {
        let (tx, rx) = mpsc::channel();
        (Self { tx }, rx)
    }

    fn send(&self, req: ControlRequest) {
        // the session dropped its receiver: nothing left to control
        let _ = self.tx.send(req);
    }
}

impl TimerControls for ControlHandle {
    fn pause_timer(&self) {
        self.send(ControlRequest::Pause);
    }

    fn resume_timer(&self) {
        self.send(ControlRequest::Resume);
    }

    fn start_break(&self, kind: BreakKind) {
        self.send(ControlRequest::StartBreak(kind));
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptChoice {
    TakeBreak,
    ContinueFocus,
}

/// Interactive "take a break or keep going" card
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BreakPrompt {
    pub kind: BreakKind,
    pub title: &'static str,
    pub subtitle: &'static str,
    pub primary: &'static str,
    pub secondary: &'static str,
    pub tip: &'static str,
}

impl BreakPrompt {
    pub fn for_kind(kind: BreakKind) -> Self {
        let (title, subtitle, primary) = match kind {
            BreakKind::Headrest => (
                "Head Rest",
                "Relax your eyes and neck for ~20 seconds.",
                "Take Head Rest",
            ),
            BreakKind::Stand => (
                "Posture / Stand Up",
                "Stand, stretch, hydrate (about your configured minutes).",
                "Take Posture Break",
            ),
            BreakKind::Break => (
                "Break Time",
                "Short walk, water, breathe. No phone scrolling.",
                "Start Break",
            ),
        };
        Self {
            kind,
            title,
            subtitle,
            primary,
            secondary: "Continue Focus",
            tip: "Tip: Break is off-screen. Stretch / blink 20x / hydrate.",
        }
    }
}

/// Oscillator shape of a tone. Terminal sinks ignore it; an audio sink
/// would render it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Wave {
    Sine,
    Square,
    Triangle,
}

/// One note of a chime. This is the pitch table an audio sink plays;
/// `BellSink` only counts the notes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Tone {
    pub freq_hz: f32,
    pub dur_ms: u32,
    /// offset from the start of the chime
    pub delay_ms: u32,
    pub wave: Wave,
}

const fn tone(freq_hz: f32, dur_ms: u32, delay_ms: u32, wave: Wave) -> Tone {
    Tone {
        freq_hz,
        dur_ms,
        delay_ms,
        wave,
    }
}

/// What a [`ChimeSink`] is asked to play for one alert
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Chime {
    pub tones: &'static [Tone],
    /// on/off pattern in milliseconds
    pub vibration: &'static [u32],
}

const BREAK_TONES: [Tone; 3] = [
    tone(880.0, 180, 0, Wave::Sine),
    tone(1175.0, 160, 220, Wave::Sine),
    tone(1480.0, 160, 420, Wave::Sine),
];
const STAND_TONES: [Tone; 2] = [
    tone(740.0, 220, 0, Wave::Square),
    tone(988.0, 220, 260, Wave::Square),
];
const HEADREST_TONES: [Tone; 2] = [
    tone(660.0, 220, 0, Wave::Sine),
    tone(530.0, 220, 260, Wave::Sine),
];
// two bright bell dings, C6 then D6
const TIMEUP_TONES: [Tone; 2] = [
    tone(1046.5, 350, 0, Wave::Triangle),
    tone(1174.7, 350, 550, Wave::Triangle),
];

pub fn chime_for(kind: AlertKind) -> Chime {
    match kind {
        AlertKind::Break => Chime {
            tones: &BREAK_TONES,
            vibration: &[50, 40, 50],
        },
        AlertKind::Stand => Chime {
            tones: &STAND_TONES,
            vibration: &[60, 40, 60],
        },
        AlertKind::Headrest => Chime {
            tones: &HEADREST_TONES,
            vibration: &[40, 30, 40],
        },
        AlertKind::Completion => Chime {
            tones: &TIMEUP_TONES,
            vibration: &[100, 80, 100],
        },
    }
}

/// Output device for chimes
pub trait ChimeSink {
    /// Prepare output ahead of the first alert.
    fn unlock(&mut self) -> Result<(), AlertError>;
    fn play(&mut self, kind: AlertKind, chime: &Chime, volume: f32) -> Result<(), AlertError>;
    /// Haptic feedback, played even when muted.
    fn vibrate(&mut self, kind: AlertKind, pattern: &[u32]) -> Result<(), AlertError>;
}

impl<S: ChimeSink> ChimeSink for Rc<RefCell<S>> {
    fn unlock(&mut self) -> Result<(), AlertError> {
        self.borrow_mut().unlock()
    }

    fn play(&mut self, kind: AlertKind, chime: &Chime, volume: f32) -> Result<(), AlertError> {
        self.borrow_mut().play(kind, chime, volume)
    }

    fn vibrate(&mut self, kind: AlertKind, pattern: &[u32]) -> Result<(), AlertError> {
        self.borrow_mut().vibrate(kind, pattern)
    }
}

fn notification_text(kind: AlertKind) -> (&'static str, &'static str) {
    match kind.break_kind() {
        Some(b) => {
            let prompt = BreakPrompt::for_kind(b);
            (prompt.title, prompt.subtitle)
        }
        None => (
            "Great job! Session complete!",
            "You did well staying locked in. Ready for the next one?",
        ),
    }
}

/// Where desktop notifications go
pub trait Notifier {
    fn notify(&mut self, title: &str, body: &str) -> Result<(), AlertError>;
}

/// Desktop notifications through the session's notification daemon.
#[derive(Debug, Clone, Copy, Default)]
pub struct DesktopNotifier;

impl Notifier for DesktopNotifier {
    fn notify(&mut self, title: &str, body: &str) -> Result<(), AlertError> {
        Notification::new()
            .summary(title)
            .body(body)
            .appname("lockedin")
            .show()
            .map(|_| ())
            .map_err(|e| AlertError::Notification(e.to_string()))
    }
}

/// Rings the terminal bell once per tone. A terminal has no haptics, so
/// `vibrate` posts the alert as a desktop notification instead; that keeps
/// it to one notification per alert whether or not the bell rang.
pub struct BellSink<W: Write, N: Notifier = DesktopNotifier> {
    out: W,
    notifier: Option<N>,
}

impl BellSink<io::Stdout> {
    pub fn stdout(desktop: bool) -> Self {
        Self::new(io::stdout(), desktop.then_some(DesktopNotifier))
    }
}

impl<W: Write, N: Notifier> BellSink<W, N> {
    pub fn new(out: W, notifier: Option<N>) -> Self {
        Self { out, notifier }
    }
}

impl<W: Write, N: Notifier> ChimeSink for BellSink<W, N> {
    fn unlock(&mut self) -> Result<(), AlertError> {
        self.out.flush()?;
        Ok(())
    }

    fn play(&mut self, _kind: AlertKind, chime: &Chime, volume: f32) -> Result<(), AlertError> {
        if volume > 0.0 {
            for _ in chime.tones {
                self.out.write_all(b"\x07")?;
            }
            self.out.flush()?;
        }
        Ok(())
    }

    fn vibrate(&mut self, kind: AlertKind, _pattern: &[u32]) -> Result<(), AlertError> {
        let Some(notifier) = self.notifier.as_mut() else {
            return Ok(());
        };
        let (title, body) = notification_text(kind);
        notifier.notify(title, body)
    }
}

/// Sink that only remembers what it was asked to do.
#[derive(Debug, Default)]
pub struct RecordingSink {
    pub played: Vec<(AlertKind, usize, f32)>,
    pub vibrations: Vec<AlertKind>,
    pub unlocked: bool,
}

impl ChimeSink for RecordingSink {
    fn unlock(&mut self) -> Result<(), AlertError> {
        self.unlocked = true;
        Ok(())
    }

    fn play(&mut self, kind: AlertKind, chime: &Chime, volume: f32) -> Result<(), AlertError> {
        self.played.push((kind, chime.tones.len(), volume));
        Ok(())
    }

    fn vibrate(&mut self, kind: AlertKind, _pattern: &[u32]) -> Result<(), AlertError> {
        self.vibrations.push(kind);
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum_macros::Display)]
pub enum SoundStatus {
    #[strum(serialize = "Sound: On")]
    On,
    #[strum(serialize = "Sound: Off")]
    Off,
    /// not unlocked yet; the first key press will do it
    #[strum(serialize = "Press any key to enable sound alerts")]
    Locked,
    #[strum(serialize = "Sound: unavailable")]
    Unavailable,
}

/// The session's view of the alert subsystem
pub trait AlertBridge {
    fn register_controls(&mut self, controls: Box<dyn TimerControls>);
    /// Unlock audio output without waiting for a fresh user gesture.
    fn init(&mut self);
    fn trigger(&mut self, kind: AlertKind);
    fn prompt(&self) -> Option<&BreakPrompt>;
    fn respond(&mut self, choice: PromptChoice);
    /// Close the prompt without answering it.
    fn dismiss(&mut self);
    fn sound_status(&self) -> SoundStatus;
}

pub struct TerminalAlerts<S: ChimeSink> {
    sink: S,
    enabled: bool,
    volume: f32,
    unlocked: bool,
    failed: bool,
    controls: Option<Box<dyn TimerControls>>,
    prompt: Option<BreakPrompt>,
}

impl<S: ChimeSink> TerminalAlerts<S> {
    pub fn new(sink: S, prefs: &Preferences) -> Self {
        Self {
            sink,
            enabled: prefs.sound_enabled,
            volume: prefs.volume(),
            unlocked: false,
            failed: false,
            controls: None,
            prompt: None,
        }
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    pub fn set_volume(&mut self, volume: f32) {
        self.volume = volume.clamp(0.0, 1.0);
    }

    fn play(&mut self, kind: AlertKind) {
        let chime = chime_for(kind);
        if self.enabled {
            if let Err(err) = self.sink.play(kind, &chime, self.volume) {
                warn!(%kind, error = %err, "alert sound failed");
                self.failed = true;
            }
        }
        if let Err(err) = self.sink.vibrate(kind, chime.vibration) {
            debug!(%kind, error = %err, "silent alert unavailable");
        }
    }
}

impl<S: ChimeSink> AlertBridge for TerminalAlerts<S> {
    fn register_controls(&mut self, controls: Box<dyn TimerControls>) {
        self.controls = Some(controls);
    }

    fn init(&mut self) {
        match self.sink.unlock() {
            Ok(()) => self.unlocked = true,
            Err(err) => {
                warn!(error = %err, "could not prepare audio output");
                self.failed = true;
            }
        }
    }

    fn trigger(&mut self, kind: AlertKind) {
        if !self.unlocked {
            self.init();
        }

        let Some(break_kind) = kind.break_kind() else {
            // completion: sound only, the session owns the completion prompt
            self.play(kind);
            return;
        };

        if let Some(controls) = &self.controls {
            controls.pause_timer();
        }
        self.play(kind);
        if self.prompt.is_none() {
            self.prompt = Some(BreakPrompt::for_kind(break_kind));
        }
    }

    fn prompt(&self) -> Option<&BreakPrompt> {
        self.prompt.as_ref()
    }

    fn respond(&mut self, choice: PromptChoice) {
        let Some(prompt) = self.prompt.take() else {
            return;
        };
        let Some(controls) = &self.controls else {
            return;
        };
        match choice {
            PromptChoice::TakeBreak => controls.start_break(prompt.kind),
            PromptChoice::ContinueFocus => controls.resume_timer(),
        }
    }

    fn dismiss(&mut self) {
        self.prompt = None;
    }

    fn sound_status(&self) -> SoundStatus {
        if self.failed {
            SoundStatus::Unavailable
        } else if !self.enabled || self.volume <= 0.0 {
            SoundStatus::Off
        } else if !self.unlocked {
            SoundStatus::Locked
        } else {
            SoundStatus::On
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn alerts() -> (
        TerminalAlerts<Rc<RefCell<RecordingSink>>>,
        Rc<RefCell<RecordingSink>>,
        Receiver<ControlRequest>,
    ) {
        let sink = Rc::new(RefCell::new(RecordingSink::default()));
        let mut bridge = TerminalAlerts::new(sink.clone(), &Preferences::default());
        let (handle, rx) = ControlHandle::channel();
        bridge.register_controls(Box::new(handle));
        (bridge, sink, rx)
    }

    fn drain(rx: &Receiver<ControlRequest>) -> Vec<ControlRequest> {
        rx.try_iter().collect()
    }

    #[test]
    fn test_completion_only_plays_sound() {
        let (mut bridge, sink, rx) = alerts();
        bridge.trigger(AlertKind::Completion);
        assert!(drain(&rx).is_empty());
        assert!(bridge.prompt().is_none());
        assert_eq!(sink.borrow().played.len(), 1);
        assert_eq!(sink.borrow().played[0].0, AlertKind::Completion);
        assert_eq!(sink.borrow().played[0].1, 2);
    }

    #[test]
    fn test_break_trigger_pauses_and_prompts() {
        let (mut bridge, _sink, rx) = alerts();
        bridge.trigger(AlertKind::Stand);
        assert_eq!(drain(&rx), vec![ControlRequest::Pause]);
        let prompt = bridge.prompt().unwrap();
        assert_eq!(prompt.kind, BreakKind::Stand);
        assert_eq!(prompt.title, "Posture / Stand Up");
    }

    #[test]
    fn test_second_trigger_keeps_first_prompt() {
        let (mut bridge, _sink, rx) = alerts();
        bridge.trigger(AlertKind::Headrest);
        bridge.trigger(AlertKind::Stand);
        assert_eq!(drain(&rx), vec![ControlRequest::Pause, ControlRequest::Pause]);
        assert_eq!(bridge.prompt().unwrap().kind, BreakKind::Headrest);
    }

    #[test]
    fn test_respond_take_break() {
        let (mut bridge, _sink, rx) = alerts();
        bridge.trigger(AlertKind::Headrest);
        drain(&rx);
        bridge.respond(PromptChoice::TakeBreak);
        assert_eq!(
            drain(&rx),
            vec![ControlRequest::StartBreak(BreakKind::Headrest)]
        );
        assert!(bridge.prompt().is_none());
    }

    #[test]
    fn test_respond_continue_focus() {
        let (mut bridge, _sink, rx) = alerts();
        bridge.trigger(AlertKind::Break);
        drain(&rx);
        bridge.respond(PromptChoice::ContinueFocus);
        assert_eq!(drain(&rx), vec![ControlRequest::Resume]);
    }

    #[test]
    fn test_respond_without_prompt_is_noop() {
        let (mut bridge, _sink, rx) = alerts();
        bridge.respond(PromptChoice::TakeBreak);
        assert!(drain(&rx).is_empty());
    }

    #[test]
    fn test_muted_still_vibrates() {
        let (mut bridge, sink, _rx) = alerts();
        bridge.set_enabled(false);
        bridge.trigger(AlertKind::Completion);
        assert!(sink.borrow().played.is_empty());
        assert_eq!(sink.borrow().vibrations, vec![AlertKind::Completion]);
        assert_eq!(bridge.sound_status(), SoundStatus::Off);
    }

    #[test]
    fn test_sound_status_transitions() {
        let (mut bridge, sink, _rx) = alerts();
        assert_eq!(bridge.sound_status(), SoundStatus::Locked);
        bridge.init();
        assert!(sink.borrow().unlocked);
        assert_eq!(bridge.sound_status(), SoundStatus::On);
        bridge.set_volume(-3.0);
        assert_eq!(bridge.sound_status(), SoundStatus::Off);
    }

    #[derive(Default, Clone)]
    struct Posted(Rc<RefCell<Vec<String>>>);

    impl Notifier for Posted {
        fn notify(&mut self, title: &str, _body: &str) -> Result<(), AlertError> {
            self.0.borrow_mut().push(title.to_string());
            Ok(())
        }
    }

    #[test]
    fn test_bell_sink_rings_once_per_tone() {
        let mut sink = BellSink::new(Vec::new(), None::<Posted>);
        let chime = chime_for(AlertKind::Break);
        sink.play(AlertKind::Break, &chime, 0.7).unwrap();
        assert_eq!(sink.out, b"\x07\x07\x07".to_vec());

        let mut quiet = BellSink::new(Vec::new(), None::<Posted>);
        quiet.play(AlertKind::Break, &chime, 0.0).unwrap();
        assert!(quiet.out.is_empty());
    }

    #[test]
    fn test_one_notification_per_alert() {
        let posted = Posted::default();
        let sink = BellSink::new(Vec::new(), Some(posted.clone()));
        let mut bridge = TerminalAlerts::new(sink, &Preferences::default());

        bridge.trigger(AlertKind::Stand);
        assert_eq!(*posted.0.borrow(), vec!["Posture / Stand Up".to_string()]);
        assert_eq!(bridge.sink.out, b"\x07\x07".to_vec());

        bridge.dismiss();
        bridge.trigger(AlertKind::Completion);
        assert_eq!(posted.0.borrow().len(), 2);
        assert_eq!(posted.0.borrow()[1], "Great job! Session complete!");
    }

    #[test]
    fn test_muted_alert_still_notifies_once() {
        let posted = Posted::default();
        let sink = BellSink::new(Vec::new(), Some(posted.clone()));
        let mut bridge = TerminalAlerts::new(sink, &Preferences::default());
        bridge.set_enabled(false);

        bridge.trigger(AlertKind::Headrest);
        assert!(bridge.sink.out.is_empty());
        assert_eq!(posted.0.borrow().len(), 1);
    }

    #[test]
    fn test_chime_tones_play_in_order() {
        for kind in [
            AlertKind::Headrest,
            AlertKind::Stand,
            AlertKind::Break,
            AlertKind::Completion,
        ] {
            let chime = chime_for(kind);
            assert!(!chime.tones.is_empty());
            assert!(chime
                .tones
                .windows(2)
                .all(|w| w[0].delay_ms + w[0].dur_ms <= w[1].delay_ms));
        }
    }

    #[test]
    fn test_alert_kind_names() {
        assert_eq!(AlertKind::Completion.to_string(), "timeup");
        assert_eq!(AlertKind::from(BreakKind::Stand), AlertKind::Stand);
        assert_eq!(AlertKind::Completion.break_kind(), None);
    }
}
