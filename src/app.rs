use std::cell::RefCell;
use std::fs::File;
use std::rc::Rc;

use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use tracing::{info, warn};

use crate::alerts::PromptChoice;
use crate::history::{default_export_name, HistoryDb, HistoryEntry};
use crate::platform::TerminalPlatform;
use crate::session::{Destination, Session, SessionError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppState {
    Timer,
    History,
}

/// Why the event loop stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitType {
    /// leave the terminal so a new session can be set up
    Setup,
    Quit,
}

#[derive(Debug, Default)]
pub struct HistoryView {
    pub entries: Vec<HistoryEntry>,
    pub scroll: usize,
    pub confirm_clear: bool,
}

pub struct App {
    pub session: Session,
    pub state: AppState,
    pub history: Rc<RefCell<HistoryDb>>,
    pub history_view: HistoryView,
    pub platform: Rc<RefCell<TerminalPlatform>>,
    /// one-line feedback shown under the controls
    pub message: Option<String>,
    pub exit: Option<ExitType>,
}

impl App {
    pub fn new(
        session: Session,
        history: Rc<RefCell<HistoryDb>>,
        platform: Rc<RefCell<TerminalPlatform>>,
    ) -> Self {
        Self {
            session,
            state: AppState::Timer,
            history,
            history_view: HistoryView::default(),
            platform,
            message: None,
            exit: None,
        }
    }

    pub fn on_tick(&mut self) {
        self.session.tick();
        self.follow_navigation();
    }

    /// The terminal is gone: close out a live session without asking.
    pub fn on_hangup(&mut self) {
        self.session.abandon();
        self.exit = Some(ExitType::Quit);
    }

    pub fn handle_key(&mut self, key: KeyEvent) {
        self.session.unlock_sound();

        if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
            self.quit();
        } else {
            match self.state {
                AppState::Timer => self.timer_key(key),
                AppState::History => self.history_key(key),
            }
        }
        self.follow_navigation();
    }

    fn timer_key(&mut self, key: KeyEvent) {
        if self.session.completion_pending() {
            match key.code {
                KeyCode::Char('s') | KeyCode::Enter => {
                    self.session.acknowledge_completion(Destination::Setup)
                }
                KeyCode::Char('h') => self.session.acknowledge_completion(Destination::History),
                KeyCode::Char('q') | KeyCode::Esc => self.quit(),
                _ => {}
            }
            return;
        }

        if self.session.gate().is_open() {
            self.gate_key(key);
            return;
        }

        if self.session.prompt().is_some() {
            match key.code {
                KeyCode::Enter | KeyCode::Char('b') => {
                    self.session.respond_to_prompt(PromptChoice::TakeBreak)
                }
                KeyCode::Esc | KeyCode::Char('c') => {
                    self.session.respond_to_prompt(PromptChoice::ContinueFocus)
                }
                _ => {}
            }
            return;
        }

        if self.session.state().focus_mode {
            // any key brings the controls back
            self.session.exit_focus_mode();
            return;
        }

        self.message = None;
        match key.code {
            KeyCode::Char('p') | KeyCode::Char(' ') => self.report(|s| s.toggle_pause()),
            KeyCode::Char('e') => self.report(|s| s.end_early()),
            KeyCode::Char('r') => self.session.reset(),
            KeyCode::Char('h') => self.session.request_history(),
            KeyCode::Char('s') => self.session.request_setup(),
            KeyCode::Char('!') => self.session.open_emergency(),
            KeyCode::Char('f') => self.session.enter_focus_mode(),
            KeyCode::Char('t') => self.session.toggle_quote_size(),
            KeyCode::Char('q') | KeyCode::Esc => self.quit(),
            _ => {}
        }
    }

    fn gate_key(&mut self, key: KeyEvent) {
        match key.code {
            KeyCode::Char(c) if c.is_ascii_digit() => self.session.gate_mut().push_digit(c),
            KeyCode::Backspace => self.session.gate_mut().backspace(),
            KeyCode::Delete => self.session.gate_mut().clear_input(),
            KeyCode::Esc => self.session.cancel_gate(),
            KeyCode::Enter => {
                if let Err(err) = self.session.submit_gate_input() {
                    self.session.gate_mut().clear_input();
                    self.message = Some(err.to_string());
                } else {
                    self.message = None;
                }
            }
            _ => {}
        }
    }

    fn history_key(&mut self, key: KeyEvent) {
        let confirming = std::mem::take(&mut self.history_view.confirm_clear);
        match key.code {
            KeyCode::Up | KeyCode::Char('k') => {
                self.history_view.scroll = self.history_view.scroll.saturating_sub(1)
            }
            KeyCode::Down | KeyCode::Char('j') => {
                if self.history_view.scroll + 1 < self.history_view.entries.len() {
                    self.history_view.scroll += 1;
                }
            }
            KeyCode::Char('x') => self.export_history(),
            KeyCode::Char('c') if confirming => self.clear_history(),
            KeyCode::Char('c') => {
                self.history_view.confirm_clear = true;
                self.message = Some("Press c again to clear all history.".to_string());
            }
            KeyCode::Char('b') | KeyCode::Char('s') | KeyCode::Backspace => {
                self.exit = Some(ExitType::Setup)
            }
            KeyCode::Char('q') | KeyCode::Esc => self.quit(),
            _ => {}
        }
    }

    /// Leaving while a session is live is an "end", and goes through the PIN.
    pub fn quit(&mut self) {
        if self.session.is_live() && self.platform.borrow().exit_guarded() {
            self.report(|s| s.end_early());
        } else {
            self.exit = Some(ExitType::Quit);
        }
    }

    fn report<F>(&mut self, op: F)
    where
        F: FnOnce(&mut Session) -> Result<(), SessionError>,
    {
        if let Err(err) = op(&mut self.session) {
            self.message = Some(err.to_string());
        }
    }

    fn follow_navigation(&mut self) {
        match self.session.take_navigation() {
            Some(Destination::History) => {
                self.state = AppState::History;
                self.reload_history();
            }
            Some(Destination::Setup) => self.exit = Some(ExitType::Setup),
            None => {}
        }
    }

    pub fn reload_history(&mut self) {
        match self.history.borrow().recent() {
            Ok(entries) => self.history_view.entries = entries,
            Err(err) => {
                warn!(error = %err, "could not read history");
                self.message = Some(err.to_string());
            }
        }
        self.history_view.scroll = 0;
    }

    fn export_history(&mut self) {
        let name = default_export_name();
        let result = File::create(name)
            .map_err(Into::into)
            .and_then(|file| self.history.borrow().export_csv(file));
        self.message = Some(match result {
            Ok(()) => {
                info!(path = name, "history exported");
                format!("Exported {} sessions to {}", self.history_view.entries.len(), name)
            }
            Err(err) => format!("Export failed: {}", err),
        });
    }

    fn clear_history(&mut self) {
        if let Err(err) = self.history.borrow().clear() {
            self.message = Some(err.to_string());
            return;
        }
        self.message = Some("History cleared.".to_string());
        self.reload_history();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{SessionConfig, SessionDeps};
    use crate::util::{ManualClock, MS_PER_MINUTE};
    use crate::history::Outcome;

    const T0: i64 = 1_700_000_000_000;

    fn key(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    fn app(minutes: u64) -> (App, ManualClock) {
        let clock = ManualClock::new(T0);
        let history = Rc::new(RefCell::new(HistoryDb::open_in_memory().unwrap()));
        let platform = Rc::new(RefCell::new(TerminalPlatform::new()));
        let config = SessionConfig {
            duration_ms: minutes * MS_PER_MINUTE,
            pin: "1234".to_string(),
            emergency: vec!["911".to_string()],
            quotes_enabled: true,
            ..SessionConfig::default()
        };
        let deps = SessionDeps {
            clock: Box::new(clock.clone()),
            platform: Box::new(platform.clone()),
            history: Box::new(history.clone()),
            bridge: None,
        };
        let session = Session::boot(config, deps).unwrap();
        (App::new(session, history, platform), clock)
    }

    fn type_pin(app: &mut App, pin: &str) {
        for c in pin.chars() {
            app.handle_key(key(KeyCode::Char(c)));
        }
        app.handle_key(key(KeyCode::Enter));
    }

    #[test]
    fn test_first_key_leaves_focus_mode() {
        let (mut app, _) = app(25);
        assert!(app.session.state().focus_mode);
        app.handle_key(key(KeyCode::Char('e')));
        assert!(!app.session.state().focus_mode);
        assert!(!app.session.gate().is_open());
    }

    #[test]
    fn test_quit_while_live_asks_for_pin() {
        let (mut app, _) = app(25);
        app.handle_key(key(KeyCode::Char('x')));
        app.handle_key(key(KeyCode::Char('q')));
        assert_eq!(app.exit, None);
        assert!(app.session.gate().is_open());

        type_pin(&mut app, "9999");
        assert_eq!(app.message.as_deref(), Some("Incorrect PIN."));
        assert_eq!(app.exit, None);

        type_pin(&mut app, "1234");
        assert_eq!(app.exit, Some(ExitType::Setup));
        assert_eq!(app.history.borrow().list().unwrap()[0].outcome, Outcome::EndedViaPin);
    }

    #[test]
    fn test_history_navigation_through_pin() {
        let (mut app, clock) = app(25);
        clock.advance(2 * 60_000);
        app.on_tick();
        app.handle_key(key(KeyCode::Char('x')));
        app.handle_key(key(KeyCode::Char('h')));
        type_pin(&mut app, "1234");
        assert_eq!(app.state, AppState::History);
        assert_eq!(app.history_view.entries.len(), 1);
        assert_eq!(app.history_view.entries[0].outcome, Outcome::EndedToViewHistory);
        assert_eq!(app.history_view.entries[0].minutes, 2);
    }

    #[test]
    fn test_escape_cancels_sheet() {
        let (mut app, _) = app(25);
        app.handle_key(key(KeyCode::Char('x')));
        app.handle_key(key(KeyCode::Char('r')));
        app.handle_key(key(KeyCode::Char('1')));
        app.handle_key(key(KeyCode::Esc));
        assert!(!app.session.gate().is_open());
        assert!(app.session.is_live());
    }

    #[test]
    fn test_completion_prompt_keys() {
        let (mut app, clock) = app(1);
        clock.advance(60_000);
        app.on_tick();
        assert!(app.session.completion_pending());
        app.handle_key(key(KeyCode::Char('h')));
        assert_eq!(app.state, AppState::History);
        assert_eq!(app.history_view.entries[0].outcome, Outcome::Completed);

        // nothing live any more: quitting needs no PIN
        app.handle_key(key(KeyCode::Char('q')));
        assert_eq!(app.exit, Some(ExitType::Quit));
    }

    #[test]
    fn test_clear_history_needs_confirmation() {
        let (mut app, clock) = app(1);
        clock.advance(60_000);
        app.on_tick();
        app.handle_key(key(KeyCode::Char('h')));
        app.handle_key(key(KeyCode::Char('c')));
        assert_eq!(app.history_view.entries.len(), 1);
        app.handle_key(key(KeyCode::Char('c')));
        assert!(app.history_view.entries.is_empty());
        assert_eq!(app.history.borrow().len().unwrap(), 0);
    }

    #[test]
    fn test_hangup_records_ended_early() {
        let (mut app, clock) = app(25);
        clock.advance(60_000);
        app.on_hangup();
        assert_eq!(app.exit, Some(ExitType::Quit));
        assert_eq!(app.history.borrow().list().unwrap()[0].outcome, Outcome::EndedEarly);
    }

    #[test]
    fn test_pause_key_then_resume() {
        let (mut app, _) = app(25);
        app.handle_key(key(KeyCode::Char('x')));
        app.handle_key(key(KeyCode::Char('p')));
        type_pin(&mut app, "1234");
        assert!(app.session.state().paused);
        assert!(app.session.quote().is_some());
        app.handle_key(key(KeyCode::Char('p')));
        assert!(!app.session.state().paused);
    }
}
