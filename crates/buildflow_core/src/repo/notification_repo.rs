//! Notification inbox persistence.
//!
//! # Invariants
//! - Listing order is newest first (`created_at DESC`, then insertion order).
//! - Unread count is derived from stored rows, never cached.

use crate::model::calendar::{format_instant, parse_iso_instant};
use crate::model::notification::{Notification, NotificationId, NotificationKind};
use crate::repo::error::{RepoError, RepoResult};
use rusqlite::{params, Connection, Row};
use uuid::Uuid;

const NOTIFICATION_SELECT_SQL: &str = "SELECT id, kind, title, description, created_at, is_read
FROM notifications";

pub trait NotificationRepository {
    fn insert(&self, notification: &Notification) -> RepoResult<()>;
    fn list(&self, limit: Option<u32>) -> RepoResult<Vec<Notification>>;
    fn mark_read(&self, id: NotificationId) -> RepoResult<()>;
    fn mark_all_read(&self) -> RepoResult<usize>;
    fn delete(&self, id: NotificationId) -> RepoResult<()>;
    fn clear_all(&self) -> RepoResult<usize>;
    fn unread_count(&self) -> RepoResult<u32>;
    /// Deletes everything but the newest `keep` notifications.
    fn retain_newest(&self, keep: u32) -> RepoResult<usize>;
}

pub struct SqliteNotificationRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteNotificationRepository<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }
}

impl NotificationRepository for SqliteNotificationRepository<'_> {
    fn insert(&self, notification: &Notification) -> RepoResult<()> {
        self.conn.execute(
            "INSERT INTO notifications (id, kind, title, description, created_at, is_read)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6);",
            params![
                notification.id.to_string(),
                notification.kind.as_str(),
                notification.title,
                notification.description,
                format_instant(notification.created_at),
                i64::from(notification.read),
            ],
        )?;
        Ok(())
    }

    fn list(&self, limit: Option<u32>) -> RepoResult<Vec<Notification>> {
        let mut stmt = self.conn.prepare(&format!(
            "{NOTIFICATION_SELECT_SQL} ORDER BY created_at DESC, rowid DESC LIMIT ?1;"
        ))?;
        // SQLite treats a negative LIMIT as unbounded.
        let limit = limit.map_or(-1, i64::from);
        let mut rows = stmt.query([limit])?;
        let mut notifications = Vec::new();
        while let Some(row) = rows.next()? {
            notifications.push(parse_notification_row(row)?);
        }
        Ok(notifications)
    }

    fn mark_read(&self, id: NotificationId) -> RepoResult<()> {
        let changed = self.conn.execute(
            "UPDATE notifications SET is_read = 1 WHERE id = ?1;",
            [id.to_string()],
        )?;
        if changed == 0 {
            return Err(not_found(id));
        }
        Ok(())
    }

    fn mark_all_read(&self) -> RepoResult<usize> {
        Ok(self
            .conn
            .execute("UPDATE notifications SET is_read = 1 WHERE is_read = 0;", [])?)
    }

    fn delete(&self, id: NotificationId) -> RepoResult<()> {
        let changed = self
            .conn
            .execute("DELETE FROM notifications WHERE id = ?1;", [id.to_string()])?;
        if changed == 0 {
            return Err(not_found(id));
        }
        Ok(())
    }

    fn clear_all(&self) -> RepoResult<usize> {
        Ok(self.conn.execute("DELETE FROM notifications;", [])?)
    }

    fn unread_count(&self) -> RepoResult<u32> {
        let count = self.conn.query_row(
            "SELECT COUNT(*) FROM notifications WHERE is_read = 0;",
            [],
            |row| row.get::<_, u32>(0),
        )?;
        Ok(count)
    }

    fn retain_newest(&self, keep: u32) -> RepoResult<usize> {
        Ok(self.conn.execute(
            "DELETE FROM notifications
             WHERE rowid NOT IN (
                SELECT rowid FROM notifications
                ORDER BY created_at DESC, rowid DESC
                LIMIT ?1
             );",
            [i64::from(keep)],
        )?)
    }
}

fn not_found(id: NotificationId) -> RepoError {
    RepoError::NotFound {
        kind: "notification",
        id: id.to_string(),
    }
}

fn parse_notification_row(row: &Row<'_>) -> RepoResult<Notification> {
    let id_text: String = row.get("id")?;
    let id = Uuid::parse_str(&id_text).map_err(|_| {
        RepoError::InvalidData(format!("invalid uuid `{id_text}` in notifications.id"))
    })?;

    let kind_text: String = row.get("kind")?;
    let kind = NotificationKind::parse(&kind_text).ok_or_else(|| {
        RepoError::InvalidData(format!("invalid kind `{kind_text}` in notifications.kind"))
    })?;

    let created_text: String = row.get("created_at")?;
    let created_at = parse_iso_instant(&created_text).ok_or_else(|| {
        RepoError::InvalidData(format!(
            "invalid instant `{created_text}` in notifications.created_at"
        ))
    })?;

    let read = match row.get::<_, i64>("is_read")? {
        0 => false,
        1 => true,
        other => {
            return Err(RepoError::InvalidData(format!(
                "invalid is_read value `{other}` in notifications.is_read"
            )));
        }
    };

    Ok(Notification {
        id,
        kind,
        title: row.get("title")?,
        description: row.get("description")?,
        created_at,
        read,
    })
}
