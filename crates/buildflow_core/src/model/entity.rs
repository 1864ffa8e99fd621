//! Entity views consumed by the reminder evaluator.
//!
//! # Responsibility
//! - Mirror the project/task/reserve/contractor/subscription records kept by
//!   the application stores.
//! - Validate the few invariants the evaluator relies on.
//!
//! # Invariants
//! - Every entity id is non-blank.
//! - `Task::progress` is within `0..=100`.
//! - Optional dates mean "rule not applicable" when absent.

use crate::model::calendar::ceil_days_between;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Lifecycle state of a construction project.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProjectStatus {
    Pending,
    InProgress,
    Done,
}

/// Lifecycle state of a planning task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    InProgress,
    Done,
}

/// Lifecycle state of a punch-list reserve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReserveStatus {
    Open,
    InProgress,
    Resolved,
}

/// Urgency shared by tasks and reserves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Urgent,
    Normal,
    Low,
}

/// Licence subscription state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    Trial,
    Active,
    Expired,
    Inactive,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    pub id: String,
    pub name: String,
    pub status: ProjectStatus,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    /// Reference to the owning project; the project may no longer exist.
    pub project_id: String,
    pub title: String,
    pub status: TaskStatus,
    pub priority: Priority,
    /// Completion percentage, `0..=100`.
    pub progress: u8,
    pub end_date: Option<DateTime<Utc>>,
}

/// Punch-list item logged against a project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reserve {
    pub id: String,
    pub project_id: String,
    pub title: String,
    pub status: ReserveStatus,
    pub priority: Priority,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contractor {
    pub id: String,
    pub name: String,
    pub contract_end: Option<DateTime<Utc>>,
}

/// Licence state as seen by reminders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscription {
    pub status: SubscriptionStatus,
    /// Whole days left on the licence, never negative.
    pub days_remaining: i64,
}

impl Subscription {
    /// Derives remaining licence days from the licence end date.
    ///
    /// Inactive subscriptions and subscriptions without an end date have no
    /// remaining days. Otherwise this is `ceil((end - now) / 1 day)` clamped
    /// at zero.
    pub fn derive(
        status: SubscriptionStatus,
        end_date: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Self {
        let days_remaining = match (status, end_date) {
            (SubscriptionStatus::Inactive, _) | (_, None) => 0,
            (_, Some(end)) => ceil_days_between(now, end).max(0),
        };
        Self {
            status,
            days_remaining,
        }
    }
}

/// Validation failures for entity records.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntityValidationError {
    BlankId { kind: &'static str },
    ProgressOutOfRange { task_id: String, progress: u8 },
}

impl Display for EntityValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BlankId { kind } => write!(f, "{kind} id must not be blank"),
            Self::ProgressOutOfRange { task_id, progress } => write!(
                f,
                "task {task_id} progress ({progress}) must be within 0..=100"
            ),
        }
    }
}

impl Error for EntityValidationError {}

fn require_id(kind: &'static str, id: &str) -> Result<(), EntityValidationError> {
    if id.trim().is_empty() {
        return Err(EntityValidationError::BlankId { kind });
    }
    Ok(())
}

impl Project {
    pub fn validate(&self) -> Result<(), EntityValidationError> {
        require_id("project", &self.id)
    }

    pub fn is_done(&self) -> bool {
        self.status == ProjectStatus::Done
    }
}

impl Task {
    pub fn validate(&self) -> Result<(), EntityValidationError> {
        require_id("task", &self.id)?;
        if self.progress > 100 {
            return Err(EntityValidationError::ProgressOutOfRange {
                task_id: self.id.clone(),
                progress: self.progress,
            });
        }
        Ok(())
    }

    pub fn is_done(&self) -> bool {
        self.status == TaskStatus::Done
    }
}

impl Reserve {
    pub fn validate(&self) -> Result<(), EntityValidationError> {
        require_id("reserve", &self.id)
    }

    pub fn is_resolved(&self) -> bool {
        self.status == ReserveStatus::Resolved
    }
}

impl Contractor {
    pub fn validate(&self) -> Result<(), EntityValidationError> {
        require_id("contractor", &self.id)
    }
}

/// Consistent read of every entity source, taken once per reminder pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntitySnapshot {
    pub projects: Vec<Project>,
    pub tasks: Vec<Task>,
    pub reserves: Vec<Reserve>,
    pub contractors: Vec<Contractor>,
    pub subscription: Option<Subscription>,
}

impl EntitySnapshot {
    /// Tasks referencing `project_id`, in snapshot order.
    pub fn tasks_for_project<'a>(&'a self, project_id: &'a str) -> impl Iterator<Item = &'a Task> {
        self.tasks
            .iter()
            .filter(move |task| task.project_id == project_id)
    }

    /// Ids of every project, task and contractor in the snapshot.
    ///
    /// These are the entities that own per-entity ledger records.
    pub fn ledger_entity_ids(&self) -> BTreeSet<String> {
        self.projects
            .iter()
            .map(|project| project.id.clone())
            .chain(self.tasks.iter().map(|task| task.id.clone()))
            .chain(self.contractors.iter().map(|contractor| contractor.id.clone()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::{
        EntityValidationError, Priority, Subscription, SubscriptionStatus, Task, TaskStatus,
    };
    use chrono::{Duration, TimeZone, Utc};

    #[test]
    fn subscription_derive_matches_remaining_days() {
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 9, 0, 0).unwrap();

        let active = Subscription::derive(
            SubscriptionStatus::Active,
            Some(now + Duration::days(7) + Duration::hours(2)),
            now,
        );
        assert_eq!(active.days_remaining, 8);

        let lapsed = Subscription::derive(
            SubscriptionStatus::Active,
            Some(now - Duration::days(2)),
            now,
        );
        assert_eq!(lapsed.days_remaining, 0);

        let inactive = Subscription::derive(
            SubscriptionStatus::Inactive,
            Some(now + Duration::days(30)),
            now,
        );
        assert_eq!(inactive.days_remaining, 0);

        let open_ended = Subscription::derive(SubscriptionStatus::Trial, None, now);
        assert_eq!(open_ended.days_remaining, 0);
    }

    #[test]
    fn task_validate_rejects_blank_id_and_overflowing_progress() {
        let mut task = Task {
            id: " ".to_string(),
            project_id: "p1".to_string(),
            title: "Formwork".to_string(),
            status: TaskStatus::Pending,
            priority: Priority::Normal,
            progress: 10,
            end_date: None,
        };
        assert_eq!(
            task.validate().unwrap_err(),
            EntityValidationError::BlankId { kind: "task" }
        );

        task.id = "t1".to_string();
        task.progress = 101;
        assert!(matches!(
            task.validate().unwrap_err(),
            EntityValidationError::ProgressOutOfRange { progress: 101, .. }
        ));
    }
}
