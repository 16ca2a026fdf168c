use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection};
use std::cell::RefCell;
use std::fmt;
use std::io::{Read, Write};
use std::path::Path;
use std::rc::Rc;
use std::str::FromStr;
use thiserror::Error;
use tracing::info;

/// Most recent entries kept; older ones are evicted on append.
pub const HISTORY_CAP: usize = 200;

pub const CSV_HEADER: [&str; 5] = ["Date", "Minutes", "Outcome", "Label", "Description"];

#[derive(Debug, Error)]
pub enum HistoryError {
    #[error("history database error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("history csv error: {0}")]
    Csv(#[from] csv::Error),
    #[error("history io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("bad history date: {0}")]
    Date(#[from] chrono::ParseError),
    #[error("unknown session outcome {0:?}")]
    UnknownOutcome(String),
    #[error("bad minutes value {0:?}")]
    Minutes(String),
    #[error("history row has {0} columns, expected 5")]
    Columns(usize),
}

/// How a session ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum_macros::Display)]
pub enum Outcome {
    #[strum(serialize = "Completed")]
    Completed,
    #[strum(serialize = "Ended early")]
    EndedEarly,
    #[strum(serialize = "Ended via PIN")]
    EndedViaPin,
    #[strum(serialize = "Ended to view history")]
    EndedToViewHistory,
    #[strum(serialize = "Ended to go to setup")]
    EndedToSetup,
}

impl Outcome {
    const ALL: [Outcome; 5] = [
        Outcome::Completed,
        Outcome::EndedEarly,
        Outcome::EndedViaPin,
        Outcome::EndedToViewHistory,
        Outcome::EndedToSetup,
    ];
}

impl FromStr for Outcome {
    type Err = HistoryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Outcome::ALL
            .into_iter()
            .find(|o| o.to_string() == s)
            .ok_or_else(|| HistoryError::UnknownOutcome(s.to_string()))
    }
}

/// One finished (or abandoned) session
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryEntry {
    pub date: DateTime<Utc>,
    pub minutes: u64,
    pub outcome: Outcome,
    pub label: String,
    pub description: String,
}

impl HistoryEntry {
    pub fn date_string(&self) -> String {
        self.date.to_rfc3339_opts(SecondsFormat::Millis, true)
    }
}

impl fmt::Display for HistoryEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} — {}m — {} {}",
            self.date.with_timezone(&chrono::Local).format("%Y-%m-%d %H:%M"),
            self.minutes,
            if self.label.is_empty() { "Focus" } else { &self.label },
            self.outcome
        )
    }
}

/// Where the session writes its outcome
pub trait HistoryRecorder {
    fn append(&mut self, entry: &HistoryEntry) -> Result<(), HistoryError>;
}

impl<R: HistoryRecorder> HistoryRecorder for Rc<RefCell<R>> {
    fn append(&mut self, entry: &HistoryEntry) -> Result<(), HistoryError> {
        self.borrow_mut().append(entry)
    }
}

/// Device-local session log
#[derive(Debug)]
pub struct HistoryDb {
    conn: Connection,
}

impl HistoryDb {
    /// Open (creating if needed) the database at `path`
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, HistoryError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Self::init(Connection::open(path)?)
    }

    pub fn open_in_memory() -> Result<Self, HistoryError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, HistoryError> {
        conn.execute(
            r#"
            CREATE TABLE IF NOT EXISTS history (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                date TEXT NOT NULL,
                minutes INTEGER NOT NULL,
                outcome TEXT NOT NULL,
                label TEXT NOT NULL,
                description TEXT NOT NULL DEFAULT ''
            )
            "#,
            [],
        )?;
        Ok(HistoryDb { conn })
    }

    /// Oldest first
    pub fn list(&self) -> Result<Vec<HistoryEntry>, HistoryError> {
        let mut stmt = self.conn.prepare(
            "SELECT date, minutes, outcome, label, description FROM history ORDER BY id ASC",
        )?;

        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, u64>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, String>(4)?,
            ))
        })?;

        let mut entries = Vec::new();
        for row in rows {
            let (date, minutes, outcome, label, description) = row?;
            entries.push(HistoryEntry {
                date: parse_date(&date)?,
                minutes,
                outcome: outcome.parse()?,
                label,
                description,
            });
        }
        Ok(entries)
    }

    /// Newest first, the order the history screen shows
    pub fn recent(&self) -> Result<Vec<HistoryEntry>, HistoryError> {
        let mut entries = self.list()?;
        entries.reverse();
        Ok(entries)
    }

    pub fn len(&self) -> Result<usize, HistoryError> {
        let n: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM history", [], |row| row.get(0))?;
        Ok(n as usize)
    }

    pub fn is_empty(&self) -> Result<bool, HistoryError> {
        Ok(self.len()? == 0)
    }

    pub fn clear(&self) -> Result<(), HistoryError> {
        self.conn.execute("DELETE FROM history", [])?;
        info!("history cleared");
        Ok(())
    }

    /// Write every stored entry as CSV
    pub fn export_csv<W: Write>(&self, out: W) -> Result<(), HistoryError> {
        export_csv(&self.list()?, out)
    }
}

impl HistoryRecorder for HistoryDb {
    /// Insert and evict beyond the cap in one transaction, so an append is
    /// never observed half done.
    fn append(&mut self, entry: &HistoryEntry) -> Result<(), HistoryError> {
        let tx = self.conn.transaction()?;
        tx.execute(
            r#"
            INSERT INTO history (date, minutes, outcome, label, description)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
            params![
                entry.date_string(),
                entry.minutes,
                entry.outcome.to_string(),
                entry.label,
                entry.description,
            ],
        )?;
        tx.execute(
            "DELETE FROM history WHERE id NOT IN (SELECT id FROM history ORDER BY id DESC LIMIT ?1)",
            [HISTORY_CAP as i64],
        )?;
        tx.commit()?;
        info!(outcome = %entry.outcome, minutes = entry.minutes, "history entry recorded");
        Ok(())
    }
}

fn parse_date(s: &str) -> Result<DateTime<Utc>, HistoryError> {
    Ok(DateTime::parse_from_rfc3339(s)?.with_timezone(&Utc))
}

pub fn default_export_name() -> &'static str {
    "lockedin_history.csv"
}

/// Every field is quoted; embedded quotes are doubled.
pub fn export_csv<W: Write>(entries: &[HistoryEntry], out: W) -> Result<(), HistoryError> {
    let mut wtr = csv::WriterBuilder::new()
        .quote_style(csv::QuoteStyle::Always)
        .from_writer(out);
    wtr.write_record(CSV_HEADER)?;
    for e in entries {
        wtr.write_record([
            e.date_string(),
            e.minutes.to_string(),
            e.outcome.to_string(),
            e.label.clone(),
            e.description.clone(),
        ])?;
    }
    wtr.flush()?;
    Ok(())
}

pub fn parse_csv<R: Read>(input: R) -> Result<Vec<HistoryEntry>, HistoryError> {
    let mut rdr = csv::ReaderBuilder::new().has_headers(true).from_reader(input);
    let mut entries = Vec::new();
    for record in rdr.records() {
        let record = record?;
        if record.len() != CSV_HEADER.len() {
            return Err(HistoryError::Columns(record.len()));
        }
        let minutes = record[1]
            .parse::<u64>()
            .map_err(|_| HistoryError::Minutes(record[1].to_string()))?;
        entries.push(HistoryEntry {
            date: parse_date(&record[0])?,
            minutes,
            outcome: record[2].parse()?,
            label: record[3].to_string(),
            description: record[4].to_string(),
        });
    }
    Ok(entries)
}
