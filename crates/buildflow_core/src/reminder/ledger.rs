//! Notification de-duplication ledger.
//!
//! # Responsibility
//! - Record the last UTC day each reminder key fired.
//! - Record which progress thresholds were already announced per entity.
//!
//! # Invariants
//! - A key stamped with day `D` suppresses that reminder for the rest of `D`.
//! - Thresholds are only ever added by evaluation; a notified threshold is
//!   never re-armed. Records are only removed for entities that no longer
//!   exist (see `stale_entries`).

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

const LATE_PROJECT_PREFIX: &str = "late_project_";
const LATE_TASK_PREFIX: &str = "late_task_";
const CONTRACT_EXPIRY_PREFIX: &str = "contract_expiry_";
const CONTRACT_EXPIRED_PREFIX: &str = "contract_expired_";

const ENTITY_KEY_PREFIXES: &[&str] = &[
    LATE_PROJECT_PREFIX,
    LATE_TASK_PREFIX,
    CONTRACT_EXPIRY_PREFIX,
    CONTRACT_EXPIRED_PREFIX,
];

/// Reminder dedup keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReminderKey<'a> {
    LicenseExpiry,
    DailyReserves,
    LateProject(&'a str),
    LateTask(&'a str),
    ContractExpiry(&'a str),
    ContractExpired(&'a str),
}

impl ReminderKey<'_> {
    /// Persisted key text, e.g. `late_task_<id>`.
    pub fn to_key(self) -> String {
        match self {
            Self::LicenseExpiry => "license_expiry".to_string(),
            Self::DailyReserves => "daily_reserves".to_string(),
            Self::LateProject(id) => format!("{LATE_PROJECT_PREFIX}{id}"),
            Self::LateTask(id) => format!("{LATE_TASK_PREFIX}{id}"),
            Self::ContractExpiry(id) => format!("{CONTRACT_EXPIRY_PREFIX}{id}"),
            Self::ContractExpired(id) => format!("{CONTRACT_EXPIRED_PREFIX}{id}"),
        }
    }
}

/// Returns the entity id embedded in a per-entity key, if any.
pub fn entity_id_of_key(key: &str) -> Option<&str> {
    ENTITY_KEY_PREFIXES
        .iter()
        .find_map(|prefix| key.strip_prefix(prefix))
        .filter(|id| !id.is_empty())
}

/// One ledger mutation produced by an evaluation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "change", rename_all = "snake_case")]
pub enum LedgerChange {
    Stamp { key: String, day: String },
    Threshold { entity_id: String, threshold: u8 },
}

/// Ordered ledger mutations from one evaluation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerDelta {
    changes: Vec<LedgerChange>,
}

impl LedgerDelta {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stamp(&mut self, key: String, day: &str) {
        self.changes.push(LedgerChange::Stamp {
            key,
            day: day.to_string(),
        });
    }

    pub fn mark_threshold(&mut self, entity_id: &str, threshold: u8) {
        self.changes.push(LedgerChange::Threshold {
            entity_id: entity_id.to_string(),
            threshold,
        });
    }

    pub fn changes(&self) -> &[LedgerChange] {
        &self.changes
    }

    pub fn len(&self) -> usize {
        self.changes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }
}

/// Ledger records left behind by deleted entities.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StaleEntries<'a> {
    /// Day-stamp keys naming a deleted entity.
    pub keys: Vec<&'a str>,
    /// Entities with notified thresholds that no longer exist.
    pub entity_ids: Vec<&'a str>,
}

impl StaleEntries<'_> {
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty() && self.entity_ids.is_empty()
    }
}

/// In-memory ledger value. Loaded from the ledger store before each pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReminderLedger {
    last_checked: BTreeMap<String, String>,
    notified_thresholds: BTreeMap<String, BTreeSet<u8>>,
}

impl ReminderLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns whether `key` already fired on `day`.
    pub fn is_stamped(&self, key: &str, day: &str) -> bool {
        self.last_checked.get(key).map(String::as_str) == Some(day)
    }

    pub fn last_checked(&self, key: &str) -> Option<&str> {
        self.last_checked.get(key).map(String::as_str)
    }

    pub fn is_threshold_notified(&self, entity_id: &str, threshold: u8) -> bool {
        self.notified_thresholds
            .get(entity_id)
            .is_some_and(|set| set.contains(&threshold))
    }

    pub fn thresholds_for(&self, entity_id: &str) -> Option<&BTreeSet<u8>> {
        self.notified_thresholds.get(entity_id)
    }

    /// Records that `key` fired on `day`, replacing any previous day.
    pub fn record_stamp(&mut self, key: impl Into<String>, day: impl Into<String>) {
        self.last_checked.insert(key.into(), day.into());
    }

    pub fn record_threshold(&mut self, entity_id: impl Into<String>, threshold: u8) {
        self.notified_thresholds
            .entry(entity_id.into())
            .or_default()
            .insert(threshold);
    }

    /// Folds an evaluation delta into this ledger.
    pub fn apply(&mut self, delta: &LedgerDelta) {
        for change in delta.changes() {
            match change {
                LedgerChange::Stamp { key, day } => self.record_stamp(key.clone(), day.clone()),
                LedgerChange::Threshold {
                    entity_id,
                    threshold,
                } => self.record_threshold(entity_id.clone(), *threshold),
            }
        }
    }

    /// Collects per-entity records whose entity is not in `live_ids`.
    ///
    /// Global keys (`license_expiry`, `daily_reserves`) are never stale.
    pub fn stale_entries<'a>(&'a self, live_ids: &BTreeSet<String>) -> StaleEntries<'a> {
        StaleEntries {
            keys: self
                .last_checked
                .keys()
                .map(String::as_str)
                .filter(|key| entity_id_of_key(key).is_some_and(|id| !live_ids.contains(id)))
                .collect(),
            entity_ids: self
                .notified_thresholds
                .keys()
                .map(String::as_str)
                .filter(|entity_id| !live_ids.contains(*entity_id))
                .collect(),
        }
    }

    /// Stamped keys with their last day, ordered by key.
    pub fn stamps(&self) -> impl Iterator<Item = (&str, &str)> {
        self.last_checked
            .iter()
            .map(|(key, day)| (key.as_str(), day.as_str()))
    }

    /// Notified thresholds as `(entity_id, threshold)` pairs.
    pub fn thresholds(&self) -> impl Iterator<Item = (&str, u8)> {
        self.notified_thresholds.iter().flat_map(|(entity_id, set)| {
            set.iter()
                .map(move |threshold| (entity_id.as_str(), *threshold))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::{entity_id_of_key, LedgerDelta, ReminderKey, ReminderLedger};
    use std::collections::BTreeSet;

    #[test]
    fn keys_round_trip_entity_ids() {
        assert_eq!(ReminderKey::LateTask("t-1").to_key(), "late_task_t-1");
        assert_eq!(entity_id_of_key("late_task_t-1"), Some("t-1"));
        assert_eq!(entity_id_of_key("contract_expired_c9"), Some("c9"));
        assert_eq!(entity_id_of_key("contract_expiry_c9"), Some("c9"));
        assert_eq!(entity_id_of_key("license_expiry"), None);
        assert_eq!(entity_id_of_key("late_task_"), None);
    }

    #[test]
    fn apply_records_stamps_and_thresholds() {
        let mut delta = LedgerDelta::new();
        delta.stamp(ReminderKey::DailyReserves.to_key(), "2024-04-02");
        delta.mark_threshold("p1", 50);
        delta.mark_threshold("p1", 30);

        let mut ledger = ReminderLedger::new();
        ledger.record_stamp("daily_reserves", "2024-04-01");
        ledger.apply(&delta);

        assert!(ledger.is_stamped("daily_reserves", "2024-04-02"));
        assert!(!ledger.is_stamped("daily_reserves", "2024-04-01"));
        assert!(ledger.is_threshold_notified("p1", 50));
        assert!(ledger.is_threshold_notified("p1", 30));
        assert!(!ledger.is_threshold_notified("p1", 10));
    }

    #[test]
    fn stale_entries_skip_global_keys_and_live_entities() {
        let mut ledger = ReminderLedger::new();
        ledger.record_stamp("license_expiry", "2024-04-02");
        ledger.record_stamp("daily_reserves", "2024-04-02");
        ledger.record_stamp("late_task_gone", "2024-04-02");
        ledger.record_stamp("late_task_live", "2024-04-02");
        ledger.record_threshold("gone", 50);
        ledger.record_threshold("gone", 30);
        ledger.record_threshold("live", 50);

        let live: BTreeSet<String> = ["live".to_string()].into_iter().collect();
        let stale = ledger.stale_entries(&live);

        assert_eq!(stale.keys, vec!["late_task_gone"]);
        assert_eq!(stale.entity_ids, vec!["gone"]);
        assert!(!stale.is_empty());

        let everything: BTreeSet<String> =
            ["live".to_string(), "gone".to_string()].into_iter().collect();
        assert!(ledger.stale_entries(&everything).is_empty());
    }
}
