pub mod screen;

use ratatui::{
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Clear, Gauge, Paragraph, Wrap},
    Frame,
};
use unicode_width::UnicodeWidthStr;

use crate::app::App;
use crate::gate::PendingAction;
use crate::session::Session;
use crate::util::format_hms;

const HORIZONTAL_MARGIN: u16 = 5;
const VERTICAL_MARGIN: u16 = 1;
const ACCENT: Color = Color::Rgb(179, 136, 255);

/// Draw whichever screen the app is on.
pub fn draw(app: &App, f: &mut Frame) {
    screen::current_screen(&app.state).render(app, f);
}

fn bold() -> Style {
    Style::default().add_modifier(Modifier::BOLD)
}

fn dim() -> Style {
    Style::default().add_modifier(Modifier::DIM)
}

/// A `width` x `height` box centered in `area`, shrunk to fit.
fn centered_rect(width: u16, height: u16, area: Rect) -> Rect {
    let width = width.min(area.width);
    let height = height.min(area.height);
    Rect {
        x: area.x + (area.width - width) / 2,
        y: area.y + (area.height - height) / 2,
        width,
        height,
    }
}

/// Popup sized to its widest line, with a border and a blank margin.
fn popup(f: &mut Frame, title: &str, lines: Vec<Line>) {
    let area = f.area();
    let widest = lines
        .iter()
        .map(|l| l.width())
        .chain(std::iter::once(title.width()))
        .max()
        .unwrap_or(0);
    let width = u16::try_from(widest).unwrap_or(u16::MAX).saturating_add(6);
    let height = u16::try_from(lines.len()).unwrap_or(u16::MAX).saturating_add(4);
    let rect = centered_rect(width, height, area);
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(ACCENT))
        .title(Span::styled(format!(" {} ", title), bold()));
    let body = Paragraph::new(lines)
        .block(block)
        .alignment(Alignment::Center)
        .wrap(Wrap { trim: true });
    f.render_widget(Clear, rect);
    f.render_widget(body, rect);
}

pub fn render_timer(app: &App, f: &mut Frame) {
    let session = &app.session;
    let overlay_open = session.completion_pending()
        || session.gate().is_open()
        || session.prompt().is_some();

    if session.state().focus_mode && !overlay_open {
        render_focus(session, f);
        return;
    }

    let area = f.area();
    let info = session.session_info();
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .horizontal_margin(HORIZONTAL_MARGIN)
        .vertical_margin(VERTICAL_MARGIN)
        .constraints([
            Constraint::Length(1),                     // title
            Constraint::Min(3),                        // clock or quote
            Constraint::Length(1),                     // phase
            Constraint::Length(1),                     // progress
            Constraint::Length(1),                     // padding
            Constraint::Length(info.len() as u16),     // session info
            Constraint::Length(1),                     // status
            Constraint::Length(1),                     // notice / message
            Constraint::Length(1),                     // legend
        ])
        .split(area);

    let title = Paragraph::new(Span::styled(
        "LockedIn",
        Style::default().patch(bold()).fg(ACCENT),
    ))
    .alignment(Alignment::Center);
    f.render_widget(title, chunks[0]);

    match session.quote() {
        Some(quote) => {
            let style = if session.quote_expanded() {
                Style::default().patch(bold()).fg(Color::White)
            } else {
                Style::default().add_modifier(Modifier::ITALIC)
            };
            let quote = Paragraph::new(Span::styled(format!("“{}”", quote), style))
                .alignment(Alignment::Center)
                .wrap(Wrap { trim: true });
            f.render_widget(quote, vertical_center(chunks[1], 1));
        }
        None => {
            let clock = Paragraph::new(Span::styled(session.clock_text(), bold()))
                .alignment(Alignment::Center);
            f.render_widget(clock, vertical_center(chunks[1], 1));
        }
    }

    let mut phase = session.phase_label();
    if let Some(ms) = session.break_remaining_ms() {
        phase.push_str(&format!("  ({} left)", format_hms(ms)));
    } else if session.state().paused && session.is_live() {
        phase.push_str("  (paused)");
    }
    f.render_widget(
        Paragraph::new(Span::styled(phase, dim())).alignment(Alignment::Center),
        chunks[2],
    );

    let gauge = Gauge::default()
        .gauge_style(Style::default().fg(ACCENT))
        .percent(session.progress_pct());
    f.render_widget(gauge, chunks[3]);

    let info_lines: Vec<Line> = info.into_iter().map(Line::from).collect();
    f.render_widget(Paragraph::new(info_lines), chunks[5]);

    let mut status = vec![session.wake_lock_text()];
    if let Some(sound) = session.sound_status() {
        status.push(sound.to_string());
    }
    f.render_widget(
        Paragraph::new(Span::styled(status.join("   "), dim())),
        chunks[6],
    );

    let notice = app
        .message
        .as_deref()
        .or_else(|| session.notice())
        .unwrap_or_default();
    f.render_widget(
        Paragraph::new(Span::styled(
            notice.to_string(),
            Style::default().fg(Color::Yellow),
        )),
        chunks[7],
    );

    let legend = if session.is_live() {
        let pause = if session.state().paused { "(p) resume" } else { "(p)ause" };
        format!(
            "{} / (e)nd / (r)eset / (h)istory / (s)etup / (f)ocus / (t)oggle quote / (!) emergency",
            pause
        )
    } else {
        "(h)istory / (s)etup / (q)uit".to_string()
    };
    f.render_widget(
        Paragraph::new(Span::styled(
            legend,
            Style::default().add_modifier(Modifier::ITALIC),
        )),
        chunks[8],
    );

    if session.completion_pending() {
        render_completion(f);
    } else if session.gate().is_open() {
        render_gate(app, f);
    } else if session.prompt().is_some() {
        render_break_prompt(session, f);
    }
}

fn vertical_center(area: Rect, height: u16) -> Rect {
    let height = height.min(area.height);
    Rect {
        y: area.y + (area.height - height) / 2,
        height,
        ..area
    }
}

/// Minimal full-screen clock
fn render_focus(session: &Session, f: &mut Frame) {
    let area = f.area();
    let clock = session.clock_text();
    let phase = session.phase_label();
    let rect = centered_rect(clock.width().max(phase.width()) as u16 + 4, 5, area);
    let lines = vec![
        Line::from(Span::styled(
            clock,
            Style::default().patch(bold()).fg(ACCENT),
        )),
        Line::from(""),
        Line::from(Span::styled(phase, dim())),
    ];
    let widget = Paragraph::new(lines).alignment(Alignment::Center);
    f.render_widget(widget, rect);

    let hint = Paragraph::new(Span::styled("press any key for controls", dim()))
        .alignment(Alignment::Center);
    let bottom = Rect {
        y: area.y + area.height.saturating_sub(1),
        height: area.height.min(1),
        ..area
    };
    f.render_widget(hint, bottom);
}

fn render_gate(app: &App, f: &mut Frame) {
    let session = &app.session;
    let gate = session.gate();
    let title = match gate.pending() {
        Some(PendingAction::None) | None => "Emergency".to_string(),
        Some(action) => format!("Enter PIN: {}", action),
    };

    let masked = gate.masked();
    let mut lines = vec![
        Line::from(Span::styled(
            if masked.is_empty() { "_".to_string() } else { masked },
            bold(),
        )),
        Line::from(""),
    ];
    if gate.rejected() {
        lines.push(Line::from(Span::styled(
            "Incorrect PIN.",
            Style::default().fg(Color::Red),
        )));
    }
    for target in session.emergency_targets() {
        lines.push(Line::from(Span::styled(
            format!("🚨 Emergency Call: {}", target),
            Style::default().fg(Color::LightRed),
        )));
    }
    lines.push(Line::from(""));
    lines.push(Line::from(Span::styled(
        "digits / (enter) confirm / (del) clear / (esc) cancel",
        dim(),
    )));
    popup(f, &title, lines);
}

fn render_break_prompt(session: &Session, f: &mut Frame) {
    let Some(prompt) = session.prompt() else {
        return;
    };
    let lines = vec![
        Line::from(prompt.subtitle),
        Line::from(""),
        Line::from(vec![
            Span::styled(format!("(enter) {}", prompt.primary), bold()),
            Span::raw("   "),
            Span::raw(format!("(c) {}", prompt.secondary)),
        ]),
        Line::from(""),
        Line::from(Span::styled(prompt.tip, dim())),
    ];
    popup(f, prompt.title, lines);
}

fn render_completion(f: &mut Frame) {
    let lines = vec![
        Line::from("You did well staying LockedIn. Ready for the next one?"),
        Line::from(""),
        Line::from(vec![
            Span::styled("(s) Back to Setup", bold()),
            Span::raw("   "),
            Span::raw("(h) View History"),
        ]),
    ];
    popup(f, "Great job, session complete!", lines);
}

pub fn render_history(app: &App, f: &mut Frame) {
    let view = &app.history_view;
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .horizontal_margin(HORIZONTAL_MARGIN)
        .vertical_margin(VERTICAL_MARGIN)
        .constraints([
            Constraint::Length(2),
            Constraint::Min(1),
            Constraint::Length(1),
            Constraint::Length(1),
        ])
        .split(f.area());

    f.render_widget(
        Paragraph::new(Span::styled(
            format!("History ({} sessions, newest first)", view.entries.len()),
            Style::default().patch(bold()).fg(ACCENT),
        )),
        chunks[0],
    );

    let lines: Vec<Line> = if view.entries.is_empty() {
        vec![Line::from(Span::styled("No sessions yet.", dim()))]
    } else {
        view.entries
            .iter()
            .skip(view.scroll)
            .take(chunks[1].height as usize)
            .map(|e| {
                let mut spans = vec![Span::raw(e.to_string())];
                if !e.description.is_empty() {
                    spans.push(Span::styled(format!("  {}", e.description), dim()));
                }
                Line::from(spans)
            })
            .collect()
    };
    f.render_widget(Paragraph::new(lines), chunks[1]);

    if let Some(msg) = &app.message {
        f.render_widget(
            Paragraph::new(Span::styled(msg.clone(), Style::default().fg(Color::Yellow))),
            chunks[2],
        );
    }

    f.render_widget(
        Paragraph::new(Span::styled(
            "↑/↓ scroll / e(x)port csv / (c)lear / (b)ack to setup / (q)uit",
            Style::default().add_modifier(Modifier::ITALIC),
        )),
        chunks[3],
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::HistoryDb;
    use crate::platform::TerminalPlatform;
    use crate::session::{SessionConfig, SessionDeps};
    use crate::util::ManualClock;
    use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
    use ratatui::{backend::TestBackend, Terminal};
    use std::cell::RefCell;
    use std::rc::Rc;

    fn test_app(minutes: u64) -> (App, ManualClock) {
        let clock = ManualClock::new(1_700_000_000_000);
        let history = Rc::new(RefCell::new(HistoryDb::open_in_memory().unwrap()));
        let platform = Rc::new(RefCell::new(TerminalPlatform::new()));
        let config = SessionConfig {
            duration_ms: minutes * 60_000,
            pin: "1234".to_string(),
            emergency: vec!["555 0100".to_string()],
            description: "thesis".to_string(),
            micro_every_min: 20,
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

    fn render(app: &App) -> String {
        let backend = TestBackend::new(100, 30);
        let mut terminal = Terminal::new(backend).unwrap();
        terminal.draw(|f| draw(app, f)).unwrap();
        terminal
            .backend()
            .buffer()
            .content
            .iter()
            .map(|c| c.symbol())
            .collect()
    }

    fn press(app: &mut App, c: char) {
        app.handle_key(KeyEvent::new(KeyCode::Char(c), KeyModifiers::NONE));
    }

    #[test]
    fn test_focus_view_shows_only_clock() {
        let (app, _) = test_app(25);
        let content = render(&app);
        assert!(content.contains("00:25:00"));
        assert!(content.contains("Phase: Focus"));
        assert!(!content.contains("Screen lock"));
    }

    #[test]
    fn test_full_view_shows_info_and_status() {
        let (mut app, _) = test_app(25);
        press(&mut app, 'x');
        let content = render(&app);
        assert!(content.contains("LockedIn"));
        assert!(content.contains("Description: thesis"));
        assert!(content.contains("Duration: 25 min"));
        assert!(content.contains("Head/eye-rest every 20m"));
        assert!(content.contains("Screen lock: unavailable"));
    }

    #[test]
    fn test_pin_sheet_lists_emergency_contacts() {
        let (mut app, _) = test_app(25);
        press(&mut app, 'x');
        press(&mut app, 'e');
        press(&mut app, '1');
        let content = render(&app);
        assert!(content.contains("Enter PIN: End session"));
        assert!(content.contains("Emergency Call: 5550100"));
        assert!(content.contains("•"));
    }

    #[test]
    fn test_paused_view_shows_quote_instead_of_clock() {
        let (mut app, _) = test_app(25);
        press(&mut app, 'x');
        press(&mut app, 'p');
        for c in "1234".chars() {
            press(&mut app, c);
        }
        app.handle_key(KeyEvent::new(KeyCode::Enter, KeyModifiers::NONE));
        let content = render(&app);
        assert!(content.contains("Lock in now, cash out later."));
        assert!(content.contains("(paused)"));
    }

    #[test]
    fn test_completion_popup() {
        let (mut app, clock) = test_app(1);
        clock.advance(60_000);
        app.on_tick();
        let content = render(&app);
        assert!(content.contains("session complete"));
        assert!(content.contains("(s) Back to Setup"));
    }

    #[test]
    fn test_history_screen() {
        let (mut app, clock) = test_app(1);
        clock.advance(60_000);
        app.on_tick();
        press(&mut app, 'h');
        let content = render(&app);
        assert!(content.contains("History (1 sessions"));
        assert!(content.contains("Completed"));
        assert!(content.contains("thesis"));
    }

    #[test]
    fn test_tiny_terminal_does_not_panic() {
        let (mut app, _) = test_app(25);
        press(&mut app, 'x');
        press(&mut app, 'e');
        let backend = TestBackend::new(10, 4);
        let mut terminal = Terminal::new(backend).unwrap();
        terminal.draw(|f| draw(&app, f)).unwrap();
    }

    #[test]
    fn test_sheet_with_huge_contact_fits_screen() {
        let history = Rc::new(RefCell::new(HistoryDb::open_in_memory().unwrap()));
        let platform = Rc::new(RefCell::new(TerminalPlatform::new()));
        // the contact line lands a few columns short of u16::MAX
        let contact = "9".repeat(65_515);
        let config = SessionConfig {
            duration_ms: 25 * 60_000,
            pin: "1234".to_string(),
            emergency: vec![contact],
            ..SessionConfig::default()
        };
        let deps = SessionDeps {
            clock: Box::new(ManualClock::new(1_700_000_000_000)),
            platform: Box::new(platform.clone()),
            history: Box::new(history.clone()),
            bridge: None,
        };
        let mut app = App::new(Session::boot(config, deps).unwrap(), history, platform);
        press(&mut app, 'x');
        press(&mut app, '!');

        let screen = render(&app);
        assert!(screen.contains("Emergency"));
    }
}
