//! Persistence for the reminder dedup ledger.
//!
//! # Invariants
//! - `apply_delta` is atomic: either every change of a delta lands or none.
//! - Stamps overwrite the previous day for the same key; threshold marks are
//!   insert-only.

use crate::db::in_transaction;
use crate::reminder::ledger::{LedgerChange, LedgerDelta, ReminderLedger};
use crate::repo::error::{RepoError, RepoResult};
use rusqlite::{params, Connection};
use std::collections::BTreeSet;

pub trait LedgerStore {
    fn load_ledger(&self) -> RepoResult<ReminderLedger>;
    fn apply_delta(&self, delta: &LedgerDelta) -> RepoResult<()>;
    /// Removes per-entity records for ids not in `live_ids`. Returns the
    /// number of removed rows.
    fn retain_entities(&self, live_ids: &BTreeSet<String>) -> RepoResult<usize>;
}

pub struct SqliteLedgerStore<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteLedgerStore<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }
}

impl LedgerStore for SqliteLedgerStore<'_> {
    fn load_ledger(&self) -> RepoResult<ReminderLedger> {
        let mut ledger = ReminderLedger::new();

        let mut stmt = self
            .conn
            .prepare("SELECT reminder_key, last_day FROM reminder_checks;")?;
        let mut rows = stmt.query([])?;
        while let Some(row) = rows.next()? {
            ledger.record_stamp(row.get::<_, String>(0)?, row.get::<_, String>(1)?);
        }

        let mut stmt = self
            .conn
            .prepare("SELECT entity_id, threshold FROM notified_thresholds;")?;
        let mut rows = stmt.query([])?;
        while let Some(row) = rows.next()? {
            let entity_id: String = row.get(0)?;
            let threshold: i64 = row.get(1)?;
            let threshold = u8::try_from(threshold).map_err(|_| {
                RepoError::InvalidData(format!(
                    "invalid threshold `{threshold}` for entity `{entity_id}`"
                ))
            })?;
            ledger.record_threshold(entity_id, threshold);
        }

        Ok(ledger)
    }

    fn apply_delta(&self, delta: &LedgerDelta) -> RepoResult<()> {
        if delta.is_empty() {
            return Ok(());
        }

        in_transaction(self.conn, |tx| {
            for change in delta.changes() {
                match change {
                    LedgerChange::Stamp { key, day } => {
                        tx.execute(
                            "INSERT INTO reminder_checks (reminder_key, last_day)
                             VALUES (?1, ?2)
                             ON CONFLICT(reminder_key) DO UPDATE SET last_day = excluded.last_day;",
                            params![key, day],
                        )?;
                    }
                    LedgerChange::Threshold {
                        entity_id,
                        threshold,
                    } => {
                        tx.execute(
                            "INSERT OR IGNORE INTO notified_thresholds (entity_id, threshold)
                             VALUES (?1, ?2);",
                            params![entity_id, threshold],
                        )?;
                    }
                }
            }
            Ok(())
        })
    }

    fn retain_entities(&self, live_ids: &BTreeSet<String>) -> RepoResult<usize> {
        let ledger = self.load_ledger()?;
        let stale = ledger.stale_entries(live_ids);
        if stale.is_empty() {
            return Ok(0);
        }

        in_transaction(self.conn, |tx| {
            let mut removed = 0;
            for key in &stale.keys {
                removed +=
                    tx.execute("DELETE FROM reminder_checks WHERE reminder_key = ?1;", [key])?;
            }
            for entity_id in &stale.entity_ids {
                removed += tx.execute(
                    "DELETE FROM notified_thresholds WHERE entity_id = ?1;",
                    [entity_id],
                )?;
            }
            Ok(removed)
        })
    }
}
