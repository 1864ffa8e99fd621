//! Key/value settings persistence.

use crate::config::NotificationSettings;
use crate::repo::error::{RepoError, RepoResult};
use rusqlite::{params, Connection, OptionalExtension};

const NOTIFICATION_SETTINGS_KEY: &str = "notification_settings";

pub trait SettingsRepository {
    /// Returns stored preferences, or defaults when none were saved.
    fn load_notification_settings(&self) -> RepoResult<NotificationSettings>;
    fn save_notification_settings(&self, settings: &NotificationSettings) -> RepoResult<()>;
}

pub struct SqliteSettingsRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteSettingsRepository<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }
}

impl SettingsRepository for SqliteSettingsRepository<'_> {
    fn load_notification_settings(&self) -> RepoResult<NotificationSettings> {
        let stored: Option<String> = self
            .conn
            .query_row(
                "SELECT value FROM settings WHERE key = ?1;",
                [NOTIFICATION_SETTINGS_KEY],
                |row| row.get(0),
            )
            .optional()?;

        match stored {
            Some(json) => serde_json::from_str(&json).map_err(|err| {
                RepoError::InvalidData(format!("invalid notification settings: {err}"))
            }),
            None => Ok(NotificationSettings::default()),
        }
    }

    fn save_notification_settings(&self, settings: &NotificationSettings) -> RepoResult<()> {
        let json = serde_json::to_string(settings).map_err(|err| {
            RepoError::InvalidData(format!("cannot encode notification settings: {err}"))
        })?;
        self.conn.execute(
            "INSERT INTO settings (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value;",
            params![NOTIFICATION_SETTINGS_KEY, json],
        )?;
        Ok(())
    }
}
