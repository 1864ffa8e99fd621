//! Reminder rule evaluation.
//!
//! # Responsibility
//! - Decide which reminders are due for one evaluation instant.
//! - Describe the ledger updates that suppress those reminders afterwards.
//!
//! # Invariants
//! - `evaluate` is pure: it reads the snapshot and ledger and returns new
//!   notifications plus a ledger delta. Nothing else is touched.
//! - "Today" is computed once per evaluation from the evaluation instant.
//! - Every rule category runs on every evaluation; no rule short-circuits
//!   another.
//! - Progress thresholds fire in descending order and at most once per entity.

use crate::model::calendar::{ceil_days_between, day_stamp};
use crate::model::entity::{EntitySnapshot, SubscriptionStatus};
use crate::model::notification::{NotificationDraft, NotificationKind};
use crate::reminder::ledger::{LedgerDelta, ReminderKey, ReminderLedger};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Remaining-work milestones, in percent.
pub const DEFAULT_THRESHOLDS: [u8; 4] = [50, 30, 10, 5];
/// Licence and contract reminders start this many days before the end date.
pub const DEFAULT_EXPIRY_WINDOW_DAYS: i64 = 10;
/// Number of reserve titles listed in the daily digest.
pub const DEFAULT_DIGEST_PREVIEW: usize = 3;

/// Tunables for the reminder rules.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EvaluatorSettings {
    /// Master switch. When off, evaluation yields nothing.
    pub notifications_enabled: bool,
    pub thresholds: Vec<u8>,
    pub expiry_window_days: i64,
    pub digest_preview: usize,
}

impl Default for EvaluatorSettings {
    fn default() -> Self {
        Self {
            notifications_enabled: true,
            thresholds: DEFAULT_THRESHOLDS.to_vec(),
            expiry_window_days: DEFAULT_EXPIRY_WINDOW_DAYS,
            digest_preview: DEFAULT_DIGEST_PREVIEW,
        }
    }
}

/// Result of one evaluation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Evaluation {
    pub notifications: Vec<NotificationDraft>,
    pub delta: LedgerDelta,
}

impl Evaluation {
    pub fn is_empty(&self) -> bool {
        self.notifications.is_empty() && self.delta.is_empty()
    }
}

/// Stateless rule engine configured with `EvaluatorSettings`.
#[derive(Debug, Clone, Default)]
pub struct ReminderEvaluator {
    settings: EvaluatorSettings,
}

impl ReminderEvaluator {
    /// Creates an evaluator. Thresholds are normalized to a descending,
    /// duplicate-free list.
    pub fn new(mut settings: EvaluatorSettings) -> Self {
        settings.thresholds.sort_unstable_by(|a, b| b.cmp(a));
        settings.thresholds.dedup();
        Self { settings }
    }

    pub fn settings(&self) -> &EvaluatorSettings {
        &self.settings
    }

    /// Computes due reminders at `now`.
    ///
    /// Applying the returned delta to `ledger` and evaluating again on the
    /// same UTC day with the same snapshot yields an empty evaluation.
    pub fn evaluate(
        &self,
        now: DateTime<Utc>,
        snapshot: &EntitySnapshot,
        ledger: &ReminderLedger,
    ) -> Evaluation {
        if !self.settings.notifications_enabled {
            return Evaluation::default();
        }

        let mut pass = Pass {
            settings: &self.settings,
            ledger,
            today: day_stamp(now),
            out: Evaluation::default(),
        };

        pass.license_expiry(snapshot);
        pass.reserve_digest(snapshot);
        pass.projects(now, snapshot);
        pass.tasks(now, snapshot);
        pass.contractors(now, snapshot);

        pass.out
    }
}

struct Pass<'a> {
    settings: &'a EvaluatorSettings,
    ledger: &'a ReminderLedger,
    today: String,
    out: Evaluation,
}

impl Pass<'_> {
    /// Emits `draft` unless `key` already fired today.
    fn once_per_day(&mut self, key: ReminderKey<'_>, draft: NotificationDraft) {
        let key = key.to_key();
        if self.ledger.is_stamped(&key, &self.today) {
            return;
        }
        self.out.notifications.push(draft);
        self.out.delta.stamp(key, &self.today);
    }

    fn thresholds(
        &mut self,
        entity_id: &str,
        remaining: f64,
        kind: NotificationKind,
        title: &str,
        name: &str,
    ) {
        let settings = self.settings;
        for &threshold in &settings.thresholds {
            if remaining > f64::from(threshold)
                || self.ledger.is_threshold_notified(entity_id, threshold)
            {
                continue;
            }
            self.out.notifications.push(NotificationDraft::new(
                kind,
                title,
                format!("{name}: {}% remaining.", remaining.round() as i64),
            ));
            self.out.delta.mark_threshold(entity_id, threshold);
        }
    }

    fn license_expiry(&mut self, snapshot: &EntitySnapshot) {
        let Some(subscription) = snapshot.subscription else {
            return;
        };
        let days = subscription.days_remaining;
        if subscription.status != SubscriptionStatus::Active
            || days <= 0
            || days > self.settings.expiry_window_days
        {
            return;
        }
        self.once_per_day(
            ReminderKey::LicenseExpiry,
            NotificationDraft::new(
                NotificationKind::Warning,
                "License expiring",
                format!("Your license expires in {days} day(s)."),
            ),
        );
    }

    fn reserve_digest(&mut self, snapshot: &EntitySnapshot) {
        let unresolved: Vec<&str> = snapshot
            .reserves
            .iter()
            .filter(|reserve| !reserve.is_resolved())
            .map(|reserve| reserve.title.as_str())
            .collect();
        if unresolved.is_empty() {
            return;
        }

        let preview = self.settings.digest_preview;
        let mut listed = unresolved
            .iter()
            .take(preview)
            .copied()
            .collect::<Vec<_>>()
            .join(", ");
        if unresolved.len() > preview {
            listed.push_str("...");
        }

        self.once_per_day(
            ReminderKey::DailyReserves,
            NotificationDraft::new(
                NotificationKind::Reservation,
                "Unresolved reserves",
                format!("{} unresolved reserve(s): {listed}", unresolved.len()),
            ),
        );
    }

    fn projects(&mut self, now: DateTime<Utc>, snapshot: &EntitySnapshot) {
        for project in &snapshot.projects {
            let overdue = project.end_date.is_some_and(|end| end < now);
            if overdue && !project.is_done() {
                self.once_per_day(
                    ReminderKey::LateProject(&project.id),
                    NotificationDraft::new(
                        NotificationKind::Error,
                        "Project overdue",
                        format!(
                            "{} passed its end date and is not finished.",
                            project.name
                        ),
                    ),
                );
            }

            let (count, total) = snapshot
                .tasks_for_project(&project.id)
                .fold((0_u32, 0_u32), |(count, total), task| {
                    (count + 1, total + u32::from(task.progress))
                });
            if count == 0 {
                continue;
            }
            let remaining = 100.0 - f64::from(total) / f64::from(count);
            self.thresholds(
                &project.id,
                remaining,
                NotificationKind::Info,
                "Project progress",
                &project.name,
            );
        }
    }

    fn tasks(&mut self, now: DateTime<Utc>, snapshot: &EntitySnapshot) {
        for task in snapshot.tasks.iter().filter(|task| !task.is_done()) {
            if let Some(end) = task.end_date.filter(|end| *end < now) {
                let days_late = ceil_days_between(end, now);
                self.once_per_day(
                    ReminderKey::LateTask(&task.id),
                    NotificationDraft::new(
                        NotificationKind::Error,
                        "Task overdue",
                        format!("{} is {days_late} day(s) late.", task.title),
                    ),
                );
            }

            let remaining = 100.0 - f64::from(task.progress);
            self.thresholds(
                &task.id,
                remaining,
                NotificationKind::Success,
                "Task progress",
                &task.title,
            );
        }
    }

    fn contractors(&mut self, now: DateTime<Utc>, snapshot: &EntitySnapshot) {
        for contractor in &snapshot.contractors {
            let Some(contract_end) = contractor.contract_end else {
                continue;
            };
            let diff_days = ceil_days_between(now, contract_end);

            if diff_days > 0 && diff_days <= self.settings.expiry_window_days {
                self.once_per_day(
                    ReminderKey::ContractExpiry(&contractor.id),
                    NotificationDraft::new(
                        NotificationKind::Warning,
                        "Contract expiring",
                        format!(
                            "{}'s contract ends in {diff_days} day(s).",
                            contractor.name
                        ),
                    ),
                );
            } else if diff_days <= 0 {
                self.once_per_day(
                    ReminderKey::ContractExpired(&contractor.id),
                    NotificationDraft::new(
                        NotificationKind::Error,
                        "Contract expired",
                        format!(
                            "{}'s contract expired {} day(s) ago.",
                            contractor.name,
                            diff_days.abs()
                        ),
                    ),
                );
            }
        }
    }
}
