//! Entity snapshot import.
//!
//! # Responsibility
//! - Decode JSON exports of the application stores.
//! - Write them into the entity repository in one transaction.
//!
//! # Invariants
//! - Blank date strings mean "no date"; any other unparsable date rejects the
//!   whole import.
//! - An import either lands completely or not at all.
//! - In `Replace` mode the file is the whole truth: entities absent from it
//!   are deleted, so removed entities stop producing reminders.

use crate::db::in_transaction;
use crate::model::calendar::parse_iso_instant;
use crate::model::entity::{
    Contractor, Priority, Project, ProjectStatus, Reserve, ReserveStatus, SubscriptionStatus,
    Task, TaskStatus,
};
use crate::repo::entity_repo::{EntityKind, EntityRepository, SqliteEntityRepository};
use crate::repo::error::RepoError;
use chrono::{DateTime, Utc};
use log::info;
use rusqlite::Connection;
use serde::Deserialize;
use std::collections::BTreeSet;
use std::error::Error;
use std::fmt::{Display, Formatter};

#[derive(Debug, Clone, Deserialize)]
pub struct ProjectRecord {
    pub id: String,
    pub name: String,
    pub status: ProjectStatus,
    #[serde(default)]
    pub start_date: Option<String>,
    #[serde(default)]
    pub end_date: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TaskRecord {
    pub id: String,
    pub project_id: String,
    pub title: String,
    pub status: TaskStatus,
    #[serde(default = "default_priority")]
    pub priority: Priority,
    #[serde(default)]
    pub progress: u8,
    #[serde(default)]
    pub end_date: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReserveRecord {
    pub id: String,
    pub project_id: String,
    pub title: String,
    pub status: ReserveStatus,
    #[serde(default = "default_priority")]
    pub priority: Priority,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ContractorRecord {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub contract_end: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SubscriptionRecord {
    pub status: SubscriptionStatus,
    #[serde(default)]
    pub end_date: Option<String>,
}

/// JSON export of the entity stores.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SnapshotFile {
    pub projects: Vec<ProjectRecord>,
    pub tasks: Vec<TaskRecord>,
    pub reserves: Vec<ReserveRecord>,
    pub contractors: Vec<ContractorRecord>,
    pub subscription: Option<SubscriptionRecord>,
}

fn default_priority() -> Priority {
    Priority::Normal
}

/// How an import treats rows already in the store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ImportMode {
    /// The file is a full export; rows missing from it are deleted.
    #[default]
    Replace,
    /// Upsert the file's rows and keep everything else.
    Merge,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImportSummary {
    pub projects: usize,
    pub tasks: usize,
    pub reserves: usize,
    pub contractors: usize,
    pub subscription: bool,
    /// Rows deleted because the file no longer lists them.
    pub removed: usize,
}

#[derive(Debug)]
pub enum ImportError {
    Parse(serde_json::Error),
    InvalidDate { field: String, value: String },
    Repo(RepoError),
}

impl Display for ImportError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Parse(err) => write!(f, "invalid snapshot file: {err}"),
            Self::InvalidDate { field, value } => {
                write!(f, "invalid date `{value}` in {field}")
            }
            Self::Repo(err) => write!(f, "{err}"),
        }
    }
}

impl Error for ImportError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Parse(err) => Some(err),
            Self::InvalidDate { .. } => None,
            Self::Repo(err) => Some(err),
        }
    }
}

impl From<RepoError> for ImportError {
    fn from(value: RepoError) -> Self {
        Self::Repo(value)
    }
}

impl From<rusqlite::Error> for ImportError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Repo(RepoError::from(value))
    }
}

/// Decodes a snapshot export.
pub fn parse_snapshot_file(json: &str) -> Result<SnapshotFile, ImportError> {
    serde_json::from_str(json).map_err(ImportError::Parse)
}

/// Upserts every record of `file` into the entity tables.
pub fn import_snapshot(
    conn: &Connection,
    file: &SnapshotFile,
    mode: ImportMode,
) -> Result<ImportSummary, ImportError> {
    let summary = in_transaction(conn, |tx| {
        let repo = SqliteEntityRepository::new(tx);

        for record in &file.projects {
            repo.upsert_project(&Project {
                id: record.id.clone(),
                name: record.name.clone(),
                status: record.status,
                start_date: parse_date(&record.start_date, "project", &record.id, "start_date")?,
                end_date: parse_date(&record.end_date, "project", &record.id, "end_date")?,
            })?;
        }
        for record in &file.tasks {
            repo.upsert_task(&Task {
                id: record.id.clone(),
                project_id: record.project_id.clone(),
                title: record.title.clone(),
                status: record.status,
                priority: record.priority,
                progress: record.progress,
                end_date: parse_date(&record.end_date, "task", &record.id, "end_date")?,
            })?;
        }
        for record in &file.reserves {
            repo.upsert_reserve(&Reserve {
                id: record.id.clone(),
                project_id: record.project_id.clone(),
                title: record.title.clone(),
                status: record.status,
                priority: record.priority,
            })?;
        }
        for record in &file.contractors {
            repo.upsert_contractor(&Contractor {
                id: record.id.clone(),
                name: record.name.clone(),
                contract_end: parse_date(
                    &record.contract_end,
                    "contractor",
                    &record.id,
                    "contract_end",
                )?,
            })?;
        }
        if let Some(subscription) = &file.subscription {
            let end_date = parse_date(&subscription.end_date, "subscription", "1", "end_date")?;
            repo.set_subscription(subscription.status, end_date)?;
        }

        let removed = match mode {
            ImportMode::Merge => 0,
            ImportMode::Replace => remove_absent(&repo, file)?,
        };

        Ok::<_, ImportError>(ImportSummary {
            projects: file.projects.len(),
            tasks: file.tasks.len(),
            reserves: file.reserves.len(),
            contractors: file.contractors.len(),
            subscription: file.subscription.is_some(),
            removed,
        })
    })?;

    info!(
        "event=snapshot_import module=import status=ok projects={} tasks={} reserves={} contractors={} subscription={} removed={}",
        summary.projects,
        summary.tasks,
        summary.reserves,
        summary.contractors,
        summary.subscription,
        summary.removed
    );
    Ok(summary)
}

fn remove_absent(repo: &impl EntityRepository, file: &SnapshotFile) -> Result<usize, ImportError> {
    fn ids<'a>(records: impl Iterator<Item = &'a String>) -> BTreeSet<String> {
        records.cloned().collect()
    }

    let mut removed = repo.retain_ids(
        EntityKind::Project,
        &ids(file.projects.iter().map(|record| &record.id)),
    )?;
    removed += repo.retain_ids(
        EntityKind::Task,
        &ids(file.tasks.iter().map(|record| &record.id)),
    )?;
    removed += repo.retain_ids(
        EntityKind::Reserve,
        &ids(file.reserves.iter().map(|record| &record.id)),
    )?;
    removed += repo.retain_ids(
        EntityKind::Contractor,
        &ids(file.contractors.iter().map(|record| &record.id)),
    )?;
    if file.subscription.is_none() && repo.clear_subscription()? {
        removed += 1;
    }
    Ok(removed)
}

fn parse_date(
    value: &Option<String>,
    kind: &str,
    id: &str,
    column: &str,
) -> Result<Option<DateTime<Utc>>, ImportError> {
    match value.as_deref().map(str::trim) {
        None | Some("") => Ok(None),
        Some(text) => parse_iso_instant(text)
            .map(Some)
            .ok_or_else(|| ImportError::InvalidDate {
                field: format!("{kind} {id} {column}"),
                value: text.to_string(),
            }),
    }
}
