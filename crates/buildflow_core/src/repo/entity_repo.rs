//! Entity store contracts and SQLite implementation.
//!
//! # Responsibility
//! - Persist projects, tasks, reserves, contractors and the subscription.
//! - Produce the per-pass `EntitySnapshot` read by the evaluator.
//!
//! # Invariants
//! - Upserts validate entities before SQL mutations.
//! - `load_snapshot` reads every table inside one read transaction.

use crate::db::in_transaction;
use crate::model::calendar::{format_instant, parse_iso_instant};
use crate::model::entity::{
    Contractor, EntitySnapshot, Priority, Project, ProjectStatus, Reserve, ReserveStatus,
    Subscription, SubscriptionStatus, Task, TaskStatus,
};
use crate::repo::error::{RepoError, RepoResult};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, Row};
use std::collections::BTreeSet;

/// Entity tables addressable by id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    Project,
    Task,
    Reserve,
    Contractor,
}

impl EntityKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Project => "project",
            Self::Task => "task",
            Self::Reserve => "reserve",
            Self::Contractor => "contractor",
        }
    }

    fn table(self) -> &'static str {
        match self {
            Self::Project => "projects",
            Self::Task => "tasks",
            Self::Reserve => "reserves",
            Self::Contractor => "contractors",
        }
    }
}

/// Repository interface for the entity sources.
pub trait EntityRepository {
    fn upsert_project(&self, project: &Project) -> RepoResult<()>;
    fn upsert_task(&self, task: &Task) -> RepoResult<()>;
    fn upsert_reserve(&self, reserve: &Reserve) -> RepoResult<()>;
    fn upsert_contractor(&self, contractor: &Contractor) -> RepoResult<()>;
    fn set_subscription(
        &self,
        status: SubscriptionStatus,
        end_date: Option<DateTime<Utc>>,
    ) -> RepoResult<()>;
    fn delete_entity(&self, kind: EntityKind, id: &str) -> RepoResult<()>;
    /// Deletes every `kind` row whose id is not in `keep`. Returns the number
    /// of deleted rows.
    fn retain_ids(&self, kind: EntityKind, keep: &BTreeSet<String>) -> RepoResult<usize>;
    /// Removes the subscription record. Returns whether one existed.
    fn clear_subscription(&self) -> RepoResult<bool>;
    /// Reads all entity sources; the subscription is derived at `now`.
    fn load_snapshot(&self, now: DateTime<Utc>) -> RepoResult<EntitySnapshot>;
}

/// SQLite-backed entity repository.
pub struct SqliteEntityRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteEntityRepository<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }
}

impl EntityRepository for SqliteEntityRepository<'_> {
    fn upsert_project(&self, project: &Project) -> RepoResult<()> {
        project.validate()?;
        self.conn.execute(
            "INSERT INTO projects (id, name, status, start_date, end_date)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                status = excluded.status,
                start_date = excluded.start_date,
                end_date = excluded.end_date,
                updated_at = (strftime('%s', 'now') * 1000);",
            params![
                project.id,
                project.name,
                project_status_to_db(project.status),
                project.start_date.map(format_instant),
                project.end_date.map(format_instant),
            ],
        )?;
        Ok(())
    }

    fn upsert_task(&self, task: &Task) -> RepoResult<()> {
        task.validate()?;
        self.conn.execute(
            "INSERT INTO tasks (id, project_id, title, status, priority, progress, end_date)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT(id) DO UPDATE SET
                project_id = excluded.project_id,
                title = excluded.title,
                status = excluded.status,
                priority = excluded.priority,
                progress = excluded.progress,
                end_date = excluded.end_date,
                updated_at = (strftime('%s', 'now') * 1000);",
            params![
                task.id,
                task.project_id,
                task.title,
                task_status_to_db(task.status),
                priority_to_db(task.priority),
                task.progress,
                task.end_date.map(format_instant),
            ],
        )?;
        Ok(())
    }

    fn upsert_reserve(&self, reserve: &Reserve) -> RepoResult<()> {
        reserve.validate()?;
        self.conn.execute(
            "INSERT INTO reserves (id, project_id, title, status, priority)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(id) DO UPDATE SET
                project_id = excluded.project_id,
                title = excluded.title,
                status = excluded.status,
                priority = excluded.priority,
                updated_at = (strftime('%s', 'now') * 1000);",
            params![
                reserve.id,
                reserve.project_id,
                reserve.title,
                reserve_status_to_db(reserve.status),
                priority_to_db(reserve.priority),
            ],
        )?;
        Ok(())
    }

    fn upsert_contractor(&self, contractor: &Contractor) -> RepoResult<()> {
        contractor.validate()?;
        self.conn.execute(
            "INSERT INTO contractors (id, name, contract_end)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                contract_end = excluded.contract_end,
                updated_at = (strftime('%s', 'now') * 1000);",
            params![
                contractor.id,
                contractor.name,
                contractor.contract_end.map(format_instant),
            ],
        )?;
        Ok(())
    }

    fn set_subscription(
        &self,
        status: SubscriptionStatus,
        end_date: Option<DateTime<Utc>>,
    ) -> RepoResult<()> {
        self.conn.execute(
            "INSERT INTO subscription (singleton, status, end_date)
             VALUES (1, ?1, ?2)
             ON CONFLICT(singleton) DO UPDATE SET
                status = excluded.status,
                end_date = excluded.end_date;",
            params![subscription_status_to_db(status), end_date.map(format_instant)],
        )?;
        Ok(())
    }

    fn delete_entity(&self, kind: EntityKind, id: &str) -> RepoResult<()> {
        let changed = self.conn.execute(
            &format!("DELETE FROM {} WHERE id = ?1;", kind.table()),
            [id],
        )?;
        if changed == 0 {
            return Err(RepoError::NotFound {
                kind: kind.as_str(),
                id: id.to_string(),
            });
        }
        Ok(())
    }

    fn retain_ids(&self, kind: EntityKind, keep: &BTreeSet<String>) -> RepoResult<usize> {
        in_transaction(self.conn, |tx| {
            let mut stmt = tx.prepare(&format!("SELECT id FROM {};", kind.table()))?;
            let stale = stmt
                .query_map([], |row| row.get::<_, String>(0))?
                .collect::<Result<Vec<_>, _>>()?
                .into_iter()
                .filter(|id| !keep.contains(id))
                .collect::<Vec<_>>();

            let delete_sql = format!("DELETE FROM {} WHERE id = ?1;", kind.table());
            let mut removed = 0;
            for id in &stale {
                removed += tx.execute(&delete_sql, [id])?;
            }
            Ok(removed)
        })
    }

    fn clear_subscription(&self) -> RepoResult<bool> {
        let changed = self
            .conn
            .execute("DELETE FROM subscription WHERE singleton = 1;", [])?;
        Ok(changed > 0)
    }

    fn load_snapshot(&self, now: DateTime<Utc>) -> RepoResult<EntitySnapshot> {
        in_transaction(self.conn, |tx| load_snapshot_rows(tx, now))
    }
}

fn load_snapshot_rows(tx: &Connection, now: DateTime<Utc>) -> RepoResult<EntitySnapshot> {
    let projects = query_all(
        tx,
        "SELECT id, name, status, start_date, end_date FROM projects ORDER BY id;",
        parse_project_row,
    )?;
    let tasks = query_all(
        tx,
        "SELECT id, project_id, title, status, priority, progress, end_date
         FROM tasks ORDER BY id;",
        parse_task_row,
    )?;
    let reserves = query_all(
        tx,
        "SELECT id, project_id, title, status, priority FROM reserves ORDER BY id;",
        parse_reserve_row,
    )?;
    let contractors = query_all(
        tx,
        "SELECT id, name, contract_end FROM contractors ORDER BY id;",
        parse_contractor_row,
    )?;
    let subscription = query_all(
        tx,
        "SELECT status, end_date FROM subscription WHERE singleton = 1;",
        |row| {
            let status_text: String = row.get("status")?;
            let status = parse_subscription_status(&status_text).ok_or_else(|| {
                invalid("subscription.status", &status_text)
            })?;
            let end_date = parse_date_column(row, "subscription.end_date", "end_date")?;
            Ok(Subscription::derive(status, end_date, now))
        },
    )?
    .into_iter()
    .next();

    Ok(EntitySnapshot {
        projects,
        tasks,
        reserves,
        contractors,
        subscription,
    })
}

fn query_all<T>(
    conn: &Connection,
    sql: &str,
    parse: impl Fn(&Row<'_>) -> RepoResult<T>,
) -> RepoResult<Vec<T>> {
    let mut stmt = conn.prepare(sql)?;
    let mut rows = stmt.query([])?;
    let mut items = Vec::new();
    while let Some(row) = rows.next()? {
        items.push(parse(row)?);
    }
    Ok(items)
}

fn invalid(column: &str, value: &str) -> RepoError {
    RepoError::InvalidData(format!("invalid value `{value}` in {column}"))
}

fn parse_date_column(
    row: &Row<'_>,
    qualified: &str,
    column: &str,
) -> RepoResult<Option<DateTime<Utc>>> {
    match row.get::<_, Option<String>>(column)? {
        Some(text) => parse_iso_instant(&text)
            .map(Some)
            .ok_or_else(|| invalid(qualified, &text)),
        None => Ok(None),
    }
}

fn parse_project_row(row: &Row<'_>) -> RepoResult<Project> {
    let status_text: String = row.get("status")?;
    let project = Project {
        id: row.get("id")?,
        name: row.get("name")?,
        status: parse_project_status(&status_text)
            .ok_or_else(|| invalid("projects.status", &status_text))?,
        start_date: parse_date_column(row, "projects.start_date", "start_date")?,
        end_date: parse_date_column(row, "projects.end_date", "end_date")?,
    };
    project.validate()?;
    Ok(project)
}

fn parse_task_row(row: &Row<'_>) -> RepoResult<Task> {
    let status_text: String = row.get("status")?;
    let priority_text: String = row.get("priority")?;
    let task = Task {
        id: row.get("id")?,
        project_id: row.get("project_id")?,
        title: row.get("title")?,
        status: parse_task_status(&status_text)
            .ok_or_else(|| invalid("tasks.status", &status_text))?,
        priority: parse_priority(&priority_text)
            .ok_or_else(|| invalid("tasks.priority", &priority_text))?,
        progress: row.get("progress")?,
        end_date: parse_date_column(row, "tasks.end_date", "end_date")?,
    };
    task.validate()?;
    Ok(task)
}

fn parse_reserve_row(row: &Row<'_>) -> RepoResult<Reserve> {
    let status_text: String = row.get("status")?;
    let priority_text: String = row.get("priority")?;
    let reserve = Reserve {
        id: row.get("id")?,
        project_id: row.get("project_id")?,
        title: row.get("title")?,
        status: parse_reserve_status(&status_text)
            .ok_or_else(|| invalid("reserves.status", &status_text))?,
        priority: parse_priority(&priority_text)
            .ok_or_else(|| invalid("reserves.priority", &priority_text))?,
    };
    reserve.validate()?;
    Ok(reserve)
}

fn parse_contractor_row(row: &Row<'_>) -> RepoResult<Contractor> {
    let contractor = Contractor {
        id: row.get("id")?,
        name: row.get("name")?,
        contract_end: parse_date_column(row, "contractors.contract_end", "contract_end")?,
    };
    contractor.validate()?;
    Ok(contractor)
}

fn project_status_to_db(status: ProjectStatus) -> &'static str {
    match status {
        ProjectStatus::Pending => "pending",
        ProjectStatus::InProgress => "in_progress",
        ProjectStatus::Done => "done",
    }
}

fn parse_project_status(value: &str) -> Option<ProjectStatus> {
    match value {
        "pending" => Some(ProjectStatus::Pending),
        "in_progress" => Some(ProjectStatus::InProgress),
        "done" => Some(ProjectStatus::Done),
        _ => None,
    }
}

fn task_status_to_db(status: TaskStatus) -> &'static str {
    match status {
        TaskStatus::Pending => "pending",
        TaskStatus::InProgress => "in_progress",
        TaskStatus::Done => "done",
    }
}

fn parse_task_status(value: &str) -> Option<TaskStatus> {
    match value {
        "pending" => Some(TaskStatus::Pending),
        "in_progress" => Some(TaskStatus::InProgress),
        "done" => Some(TaskStatus::Done),
        _ => None,
    }
}

fn reserve_status_to_db(status: ReserveStatus) -> &'static str {
    match status {
        ReserveStatus::Open => "open",
        ReserveStatus::InProgress => "in_progress",
        ReserveStatus::Resolved => "resolved",
    }
}

fn parse_reserve_status(value: &str) -> Option<ReserveStatus> {
    match value {
        "open" => Some(ReserveStatus::Open),
        "in_progress" => Some(ReserveStatus::InProgress),
        "resolved" => Some(ReserveStatus::Resolved),
        _ => None,
    }
}

fn priority_to_db(priority: Priority) -> &'static str {
    match priority {
        Priority::Urgent => "urgent",
        Priority::Normal => "normal",
        Priority::Low => "low",
    }
}

fn parse_priority(value: &str) -> Option<Priority> {
    match value {
        "urgent" => Some(Priority::Urgent),
        "normal" => Some(Priority::Normal),
        "low" => Some(Priority::Low),
        _ => None,
    }
}

fn subscription_status_to_db(status: SubscriptionStatus) -> &'static str {
    match status {
        SubscriptionStatus::Trial => "trial",
        SubscriptionStatus::Active => "active",
        SubscriptionStatus::Expired => "expired",
        SubscriptionStatus::Inactive => "inactive",
    }
}

fn parse_subscription_status(value: &str) -> Option<SubscriptionStatus> {
    match value {
        "trial" => Some(SubscriptionStatus::Trial),
        "active" => Some(SubscriptionStatus::Active),
        "expired" => Some(SubscriptionStatus::Expired),
        "inactive" => Some(SubscriptionStatus::Inactive),
        _ => None,
    }
}
