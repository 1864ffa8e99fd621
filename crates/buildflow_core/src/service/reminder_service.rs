//! Reminder pass orchestration.
//!
//! # Responsibility
//! - Run one reminder pass: settings check, snapshot read, evaluation, inbox
//!   push, ledger write-back and optional ledger pruning.
//! - Adapt the pass to the scheduler through `ReminderService`.
//!
//! # Invariants
//! - A disabled master switch skips the pass before any entity or ledger
//!   access; nothing is written.
//! - Entities and ledger are read once, at the start of the pass.
//! - Queued notifications are stamped with the wall clock, not the
//!   evaluation instant, so a back-dated pass never sorts below the inbox
//!   retention cut.
//! - `ReminderService` runs each pass in one SQLite transaction, so queued
//!   notifications and their ledger stamps land together or not at all.

use crate::config::{AppConfig, NotificationSettings};
use crate::db::DbError;
use crate::model::notification::Notification;
use crate::reminder::evaluator::{EvaluatorSettings, ReminderEvaluator};
use crate::reminder::scheduler::ReminderPass;
use crate::repo::entity_repo::{EntityRepository, SqliteEntityRepository};
use crate::repo::error::RepoError;
use crate::repo::ledger_repo::{LedgerStore, SqliteLedgerStore};
use crate::repo::notification_repo::{NotificationRepository, SqliteNotificationRepository};
use crate::repo::settings_repo::{SettingsRepository, SqliteSettingsRepository};
use crate::service::inbox_service::NotificationInbox;
use chrono::{DateTime, Utc};
use log::{error, info};
use rusqlite::Connection;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::time::Instant;

pub type PassResult<T> = Result<T, PassError>;

#[derive(Debug)]
pub enum PassError {
    Repo(RepoError),
}

impl Display for PassError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Repo(err) => write!(f, "reminder pass failed: {err}"),
        }
    }
}

impl Error for PassError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Repo(err) => Some(err),
        }
    }
}

impl From<RepoError> for PassError {
    fn from(value: RepoError) -> Self {
        Self::Repo(value)
    }
}

impl From<rusqlite::Error> for PassError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Repo(RepoError::Db(DbError::Sqlite(value)))
    }
}

/// Outcome of one reminder pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PassReport {
    /// Master switch was off; nothing ran.
    pub skipped: bool,
    pub notifications: Vec<Notification>,
    pub ledger_changes: usize,
    pub pruned: usize,
}

/// Pass behavior switches that are not rule tunables.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PassOptions {
    pub prune_deleted_entities: bool,
}

impl Default for PassOptions {
    fn default() -> Self {
        Self {
            prune_deleted_entities: true,
        }
    }
}

/// Runs reminder passes over repository implementations.
pub struct ReminderPassService<E, L, N, S>
where
    E: EntityRepository,
    L: LedgerStore,
    N: NotificationRepository,
    S: SettingsRepository,
{
    entities: E,
    ledger: L,
    inbox: NotificationInbox<N>,
    settings: S,
    evaluator_settings: EvaluatorSettings,
    options: PassOptions,
}

impl<E, L, N, S> ReminderPassService<E, L, N, S>
where
    E: EntityRepository,
    L: LedgerStore,
    N: NotificationRepository,
    S: SettingsRepository,
{
    pub fn new(
        entities: E,
        ledger: L,
        notifications: N,
        settings: S,
        evaluator_settings: EvaluatorSettings,
        options: PassOptions,
    ) -> Self {
        Self {
            entities,
            ledger,
            inbox: NotificationInbox::new(notifications),
            settings,
            evaluator_settings,
            options,
        }
    }

    /// Runs one pass at `now`.
    pub fn run(&self, now: DateTime<Utc>) -> PassResult<PassReport> {
        let user_settings = self.settings.load_notification_settings()?;
        let enabled =
            user_settings.notifications_enabled && self.evaluator_settings.notifications_enabled;
        if !enabled {
            return Ok(PassReport {
                skipped: true,
                ..PassReport::default()
            });
        }

        let snapshot = self.entities.load_snapshot(now)?;
        let ledger = self.ledger.load_ledger()?;

        let evaluation = ReminderEvaluator::new(self.evaluator_settings.clone())
            .evaluate(now, &snapshot, &ledger);

        // Queue time, not `now`: a back-dated pass must still sort newest.
        let queued_at = Utc::now();
        let mut notifications = Vec::with_capacity(evaluation.notifications.len());
        for draft in &evaluation.notifications {
            if let Some(notification) = self.inbox.push(draft, queued_at, &user_settings)? {
                notifications.push(notification);
            }
        }
        self.ledger.apply_delta(&evaluation.delta)?;

        let pruned = if self.options.prune_deleted_entities {
            self.ledger.retain_entities(&snapshot.ledger_entity_ids())?
        } else {
            0
        };

        Ok(PassReport {
            skipped: false,
            notifications,
            ledger_changes: evaluation.delta.len(),
            pruned,
        })
    }
}

/// SQLite-backed reminder pass, driven by `ReminderScheduler`.
pub struct ReminderService {
    conn: Connection,
    evaluator_settings: EvaluatorSettings,
    options: PassOptions,
}

impl ReminderService {
    pub fn new(conn: Connection, evaluator_settings: EvaluatorSettings, options: PassOptions) -> Self {
        Self {
            conn,
            evaluator_settings,
            options,
        }
    }

    pub fn from_config(conn: Connection, config: &AppConfig) -> Self {
        Self::new(
            conn,
            config.evaluator.clone(),
            PassOptions {
                prune_deleted_entities: config.prune_deleted_entities,
            },
        )
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Runs one pass inside a single transaction.
    pub fn run_at(&self, now: DateTime<Utc>) -> PassResult<PassReport> {
        let started_at = Instant::now();
        let tx = self.conn.unchecked_transaction()?;
        let report = ReminderPassService::new(
            SqliteEntityRepository::new(&tx),
            SqliteLedgerStore::new(&tx),
            SqliteNotificationRepository::new(&tx),
            SqliteSettingsRepository::new(&tx),
            self.evaluator_settings.clone(),
            self.options,
        )
        .run(now)?;
        tx.commit()?;

        if report.skipped {
            info!("event=reminder_pass module=reminder status=skipped reason=notifications_disabled");
        } else {
            info!(
                "event=reminder_pass module=reminder status=ok notifications={} ledger_changes={} pruned={} duration_ms={}",
                report.notifications.len(),
                report.ledger_changes,
                report.pruned,
                started_at.elapsed().as_millis()
            );
        }
        Ok(report)
    }

    pub fn notification_settings(&self) -> PassResult<NotificationSettings> {
        Ok(SqliteSettingsRepository::new(&self.conn).load_notification_settings()?)
    }
}

impl ReminderPass for ReminderService {
    fn run_pass(&mut self, now: DateTime<Utc>) {
        if let Err(err) = self.run_at(now) {
            error!("event=reminder_pass module=reminder status=error error={err}");
        }
    }
}
