//! Durable cooldown ledger: when was invoice X last reminded under rule Y.
//! SQLite-backed so restarts cannot re-spam customers.

use anyhow::{Context, Result};
use chrono::NaiveDate;
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RuleKind {
    Overdue,
    BeforeDue,
}

impl RuleKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Overdue => "overdue",
            Self::BeforeDue => "before_due",
        }
    }

    pub fn template_key(self) -> &'static str {
        match self {
            Self::Overdue => "paymentOverdueReminder",
            Self::BeforeDue => "paymentBeforeDueReminder",
        }
    }
}

impl fmt::Display for RuleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("ledger persist failure: {0}")]
    PersistFailure(String),
}

pub trait ReminderLedger: Send + Sync {
    fn last_sent(&self, invoice_id: i64, kind: RuleKind) -> Result<Option<NaiveDate>, LedgerError>;
    fn record_sent(&self, invoice_id: i64, kind: RuleKind, day: NaiveDate)
        -> Result<(), LedgerError>;
}

/// SQLite implementation. Opens a fresh connection per call; the ledger is
/// touched a handful of times per tick, not in a hot loop.
pub struct SqliteLedger {
    db_path: PathBuf,
}

const DATE_FORMAT: &str = "%Y-%m-%d";

impl SqliteLedger {
    pub fn new(db_path: impl Into<PathBuf>) -> Self {
        Self {
            db_path: db_path.into(),
        }
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    fn with_connection<T>(&self, f: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        if let Some(parent) = self.db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create {}", parent.display()))?;
            }
        }
        let conn = Connection::open(&self.db_path)
            .with_context(|| format!("Failed to open ledger at {}", self.db_path.display()))?;
        conn.execute(
            "CREATE TABLE IF NOT EXISTS reminder_ledger (
                invoice_id   INTEGER NOT NULL,
                rule_kind    TEXT NOT NULL,
                last_sent_at TEXT NOT NULL,
                PRIMARY KEY (invoice_id, rule_kind)
            )",
            [],
        )
        .context("Failed to create reminder_ledger table")?;
        f(&conn)
    }
}

impl ReminderLedger for SqliteLedger {
    fn last_sent(&self, invoice_id: i64, kind: RuleKind) -> Result<Option<NaiveDate>, LedgerError> {
        self.with_connection(|conn| {
            let raw: Option<String> = conn
                .query_row(
                    "SELECT last_sent_at FROM reminder_ledger
                     WHERE invoice_id = ?1 AND rule_kind = ?2",
                    params![invoice_id, kind.as_str()],
                    |row| row.get(0),
                )
                .optional()
                .context("Failed to query reminder_ledger")?;
            match raw {
                Some(raw) => {
                    let date = NaiveDate::parse_from_str(&raw, DATE_FORMAT)
                        .with_context(|| format!("Corrupt ledger date '{raw}'"))?;
                    Ok(Some(date))
                }
                None => Ok(None),
            }
        })
        .map_err(|e| LedgerError::PersistFailure(e.to_string()))
    }

    fn record_sent(
        &self,
        invoice_id: i64,
        kind: RuleKind,
        day: NaiveDate,
    ) -> Result<(), LedgerError> {
        self.with_connection(|conn| {
            conn.execute(
                "INSERT INTO reminder_ledger (invoice_id, rule_kind, last_sent_at)
                 VALUES (?1, ?2, ?3)
                 ON CONFLICT (invoice_id, rule_kind)
                 DO UPDATE SET last_sent_at = excluded.last_sent_at",
                params![invoice_id, kind.as_str(), day.format(DATE_FORMAT).to_string()],
            )
            .context("Failed to upsert reminder_ledger row")?;
            Ok(())
        })
        .map_err(|e| LedgerError::PersistFailure(e.to_string()))
    }
}

/// Volatile ledger for tests and dry runs.
#[derive(Default)]
pub struct InMemoryLedger {
    entries: parking_lot::Mutex<HashMap<(i64, RuleKind), NaiveDate>>,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ReminderLedger for InMemoryLedger {
    fn last_sent(&self, invoice_id: i64, kind: RuleKind) -> Result<Option<NaiveDate>, LedgerError> {
        Ok(self.entries.lock().get(&(invoice_id, kind)).copied())
    }

    fn record_sent(
        &self,
        invoice_id: i64,
        kind: RuleKind,
        day: NaiveDate,
    ) -> Result<(), LedgerError> {
        self.entries.lock().insert((invoice_id, kind), day);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn empty_ledger_knows_nothing() {
        let dir = TempDir::new().unwrap();
        let ledger = SqliteLedger::new(dir.path().join("ledger.db"));
        assert_eq!(ledger.last_sent(42, RuleKind::Overdue).unwrap(), None);
    }

    #[test]
    fn record_then_read_back() {
        let dir = TempDir::new().unwrap();
        let ledger = SqliteLedger::new(dir.path().join("ledger.db"));

        ledger
            .record_sent(42, RuleKind::Overdue, day(2026, 8, 29))
            .unwrap();
        assert_eq!(
            ledger.last_sent(42, RuleKind::Overdue).unwrap(),
            Some(day(2026, 8, 29))
        );
        // other rule kind for the same invoice is independent
        assert_eq!(ledger.last_sent(42, RuleKind::BeforeDue).unwrap(), None);
    }

    #[test]
    fn upsert_overwrites_the_previous_date() {
        let dir = TempDir::new().unwrap();
        let ledger = SqliteLedger::new(dir.path().join("ledger.db"));

        ledger
            .record_sent(7, RuleKind::BeforeDue, day(2026, 8, 1))
            .unwrap();
        ledger
            .record_sent(7, RuleKind::BeforeDue, day(2026, 8, 15))
            .unwrap();
        assert_eq!(
            ledger.last_sent(7, RuleKind::BeforeDue).unwrap(),
            Some(day(2026, 8, 15))
        );
    }

    #[test]
    fn survives_a_new_handle_on_the_same_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("ledger.db");

        SqliteLedger::new(&path)
            .record_sent(9, RuleKind::Overdue, day(2026, 8, 29))
            .unwrap();

        // simulate a process restart
        let reopened = SqliteLedger::new(&path);
        assert_eq!(
            reopened.last_sent(9, RuleKind::Overdue).unwrap(),
            Some(day(2026, 8, 29))
        );
    }

    #[test]
    fn in_memory_ledger_tracks_per_rule() {
        let ledger = InMemoryLedger::new();
        ledger
            .record_sent(1, RuleKind::Overdue, day(2026, 8, 29))
            .unwrap();
        assert_eq!(
            ledger.last_sent(1, RuleKind::Overdue).unwrap(),
            Some(day(2026, 8, 29))
        );
        assert_eq!(ledger.last_sent(1, RuleKind::BeforeDue).unwrap(), None);
    }
}
