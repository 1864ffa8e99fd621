//! Notification records emitted by reminder passes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub type NotificationId = Uuid;

/// Display category of a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    Info,
    Warning,
    Error,
    Success,
    /// Punch-list (reserve) reminders.
    Reservation,
}

impl NotificationKind {
    /// Stable lowercase name used in storage and CLI output.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Error => "error",
            Self::Success => "success",
            Self::Reservation => "reservation",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "info" => Some(Self::Info),
            "warning" => Some(Self::Warning),
            "error" => Some(Self::Error),
            "success" => Some(Self::Success),
            "reservation" => Some(Self::Reservation),
            _ => None,
        }
    }
}

/// Notification content produced by the evaluator, before it is queued.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationDraft {
    pub kind: NotificationKind,
    pub title: String,
    pub description: String,
}

impl NotificationDraft {
    pub fn new(
        kind: NotificationKind,
        title: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            title: title.into(),
            description: description.into(),
        }
    }
}

/// Queued notification as shown in the inbox.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub id: NotificationId,
    pub kind: NotificationKind,
    pub title: String,
    pub description: String,
    pub created_at: DateTime<Utc>,
    pub read: bool,
}

impl Notification {
    /// Materializes a draft with a fresh id, unread.
    pub fn from_draft(draft: &NotificationDraft, created_at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind: draft.kind,
            title: draft.title.clone(),
            description: draft.description.clone(),
            created_at,
            read: false,
        }
    }
}
