/// Shown in place of the clock while a session is paused.
pub const BREAK_QUOTES: [&str; 7] = [
    "Lock in now, cash out later.",
    "Discipline today is freedom tomorrow.",
    "Tiny wins compound. Stay with it.",
    "You're building a future no one can take.",
    "Focus is a superpower. Use it.",
    "This chapter becomes your testimony.",
    "Dreams don't work unless you do.",
];

pub const QUOTE_ROTATION_MS: i64 = 180_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Visible {
    idx: usize,
    rotate_at_ms: i64,
    expanded: bool,
}

/// Cycles through the quotes in order. The position survives across pauses,
/// so each pause starts on the next quote.
#[derive(Debug, Clone, Default)]
pub struct QuoteDeck {
    next_idx: usize,
    visible: Option<Visible>,
}

impl QuoteDeck {
    pub fn new() -> Self {
        Self::default()
    }

    /// Show the next quote, starting the rotation if it is not already running.
    pub fn show(&mut self, now_ms: i64) {
        let idx = self.take_next();
        let expanded = self.visible.is_some_and(|v| v.expanded);
        self.visible = Some(Visible {
            idx,
            rotate_at_ms: now_ms + QUOTE_ROTATION_MS,
            expanded,
        });
    }

    pub fn hide(&mut self) {
        self.visible = None;
    }

    /// Advance to the next quote when the rotation interval has elapsed.
    pub fn poll(&mut self, now_ms: i64) {
        let Some(visible) = self.visible else {
            return;
        };
        if now_ms >= visible.rotate_at_ms {
            let idx = self.take_next();
            self.visible = Some(Visible {
                idx,
                rotate_at_ms: visible.rotate_at_ms + QUOTE_ROTATION_MS,
                ..visible
            });
        }
    }

    pub fn toggle_expanded(&mut self) {
        if let Some(v) = self.visible.as_mut() {
            v.expanded = !v.expanded;
        }
    }

    pub fn current(&self) -> Option<&'static str> {
        self.visible.map(|v| BREAK_QUOTES[v.idx])
    }

    pub fn is_expanded(&self) -> bool {
        self.visible.is_some_and(|v| v.expanded)
    }

    fn take_next(&mut self) -> usize {
        let idx = self.next_idx % BREAK_QUOTES.len();
        self.next_idx = self.next_idx.wrapping_add(1);
        idx
    }
}
