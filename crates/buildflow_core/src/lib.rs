//! Reminder and notification core for BuildFlow.
//! Owns the rules deciding which construction-project reminders are due and
//! the ledger that keeps them from repeating.

pub mod config;
pub mod db;
pub mod logging;
pub mod model;
pub mod reminder;
pub mod repo;
pub mod service;

pub use config::{
    load_config, AppConfig, ConfigError, NotificationSettings, NotificationSettingsPatch,
    INBOX_RETENTION,
};
pub use logging::{default_log_level, init_logging, logging_status, LoggingError};
pub use model::calendar::{day_stamp, parse_iso_instant};
pub use model::entity::{
    Contractor, EntitySnapshot, EntityValidationError, Priority, Project, ProjectStatus, Reserve,
    ReserveStatus, Subscription, SubscriptionStatus, Task, TaskStatus,
};
pub use model::notification::{Notification, NotificationDraft, NotificationId, NotificationKind};
pub use reminder::evaluator::{
    Evaluation, EvaluatorSettings, ReminderEvaluator, DEFAULT_EXPIRY_WINDOW_DAYS,
    DEFAULT_THRESHOLDS,
};
pub use reminder::ledger::{LedgerChange, LedgerDelta, ReminderKey, ReminderLedger, StaleEntries};
pub use reminder::scheduler::{
    ReminderPass, ReminderScheduler, SchedulerError, SharedPass, DEFAULT_TICK_PERIOD,
};
pub use repo::entity_repo::{EntityKind, EntityRepository, SqliteEntityRepository};
pub use repo::error::{RepoError, RepoResult};
pub use repo::ledger_repo::{LedgerStore, SqliteLedgerStore};
pub use repo::notification_repo::{NotificationRepository, SqliteNotificationRepository};
pub use repo::settings_repo::{SettingsRepository, SqliteSettingsRepository};
pub use service::import_service::{
    import_snapshot, parse_snapshot_file, ImportError, ImportMode, ImportSummary, SnapshotFile,
};
pub use service::inbox_service::NotificationInbox;
pub use service::reminder_service::{
    PassError, PassOptions, PassReport, PassResult, ReminderPassService, ReminderService,
};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::core_version;

    #[test]
    fn version_is_not_empty() {
        assert!(!core_version().is_empty());
    }
}
