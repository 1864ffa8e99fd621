//! Notification inbox use-cases.
//!
//! # Invariants
//! - Nothing is queued while the master switch is off.
//! - With `auto_delete` on, at most `INBOX_RETENTION` notifications remain
//!   after every push.

use crate::config::{NotificationSettings, INBOX_RETENTION};
use crate::model::notification::{Notification, NotificationDraft, NotificationId};
use crate::repo::error::RepoResult;
use crate::repo::notification_repo::NotificationRepository;
use chrono::{DateTime, Utc};
use log::debug;

pub struct NotificationInbox<R: NotificationRepository> {
    repo: R,
}

impl<R: NotificationRepository> NotificationInbox<R> {
    pub fn new(repo: R) -> Self {
        Self { repo }
    }

    /// Queues `draft` as a new unread notification.
    ///
    /// Returns `None` when notifications are disabled.
    pub fn push(
        &self,
        draft: &NotificationDraft,
        created_at: DateTime<Utc>,
        settings: &NotificationSettings,
    ) -> RepoResult<Option<Notification>> {
        if !settings.notifications_enabled {
            return Ok(None);
        }

        let notification = Notification::from_draft(draft, created_at);
        self.repo.insert(&notification)?;

        if settings.auto_delete {
            let trimmed = self.repo.retain_newest(INBOX_RETENTION)?;
            if trimmed > 0 {
                debug!("event=inbox_trim module=inbox status=ok removed={trimmed}");
            }
        }
        Ok(Some(notification))
    }

    pub fn list(&self, limit: Option<u32>) -> RepoResult<Vec<Notification>> {
        self.repo.list(limit)
    }

    pub fn mark_read(&self, id: NotificationId) -> RepoResult<()> {
        self.repo.mark_read(id)
    }

    pub fn mark_all_read(&self) -> RepoResult<usize> {
        self.repo.mark_all_read()
    }

    pub fn delete(&self, id: NotificationId) -> RepoResult<()> {
        self.repo.delete(id)
    }

    pub fn clear_all(&self) -> RepoResult<usize> {
        self.repo.clear_all()
    }

    pub fn unread_count(&self) -> RepoResult<u32> {
        self.repo.unread_count()
    }
}
