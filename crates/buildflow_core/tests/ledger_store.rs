use buildflow_core::db::open_db_in_memory;
use buildflow_core::{LedgerDelta, LedgerStore, SqliteLedgerStore};
use std::collections::BTreeSet;

fn live(ids: &[&str]) -> BTreeSet<String> {
    ids.iter().map(|id| id.to_string()).collect()
}

#[test]
fn applied_delta_is_visible_on_next_load() {
    let conn = open_db_in_memory().unwrap();
    let store = SqliteLedgerStore::new(&conn);

    let mut delta = LedgerDelta::new();
    delta.stamp("daily_reserves".to_string(), "2024-05-01");
    delta.stamp("late_task_t1".to_string(), "2024-05-01");
    delta.mark_threshold("t1", 50);
    delta.mark_threshold("t1", 30);
    store.apply_delta(&delta).unwrap();

    let ledger = store.load_ledger().unwrap();
    assert!(ledger.is_stamped("daily_reserves", "2024-05-01"));
    assert_eq!(ledger.last_checked("late_task_t1"), Some("2024-05-01"));
    assert!(ledger.is_threshold_notified("t1", 50));
    assert!(ledger.is_threshold_notified("t1", 30));
    assert!(!ledger.is_threshold_notified("t1", 10));
}

#[test]
fn stamps_overwrite_and_thresholds_accumulate() {
    let conn = open_db_in_memory().unwrap();
    let store = SqliteLedgerStore::new(&conn);

    let mut first = LedgerDelta::new();
    first.stamp("license_expiry".to_string(), "2024-05-01");
    first.mark_threshold("p1", 50);
    store.apply_delta(&first).unwrap();

    let mut second = LedgerDelta::new();
    second.stamp("license_expiry".to_string(), "2024-05-02");
    second.mark_threshold("p1", 50);
    second.mark_threshold("p1", 10);
    store.apply_delta(&second).unwrap();

    let ledger = store.load_ledger().unwrap();
    assert_eq!(ledger.last_checked("license_expiry"), Some("2024-05-02"));
    assert_eq!(
        ledger.thresholds_for("p1").unwrap().iter().copied().collect::<Vec<_>>(),
        vec![10, 50]
    );
}

#[test]
fn retain_entities_drops_only_records_of_deleted_entities() {
    let conn = open_db_in_memory().unwrap();
    let store = SqliteLedgerStore::new(&conn);

    let mut delta = LedgerDelta::new();
    delta.stamp("daily_reserves".to_string(), "2024-05-01");
    delta.stamp("license_expiry".to_string(), "2024-05-01");
    delta.stamp("late_task_gone".to_string(), "2024-05-01");
    delta.stamp("contract_expiry_c1".to_string(), "2024-05-01");
    delta.mark_threshold("gone", 50);
    delta.mark_threshold("gone", 30);
    delta.mark_threshold("p1", 50);
    store.apply_delta(&delta).unwrap();

    let removed = store.retain_entities(&live(&["p1", "c1"])).unwrap();
    assert_eq!(removed, 3);

    let ledger = store.load_ledger().unwrap();
    assert!(ledger.is_stamped("daily_reserves", "2024-05-01"));
    assert!(ledger.is_stamped("license_expiry", "2024-05-01"));
    assert!(ledger.is_stamped("contract_expiry_c1", "2024-05-01"));
    assert_eq!(ledger.last_checked("late_task_gone"), None);
    assert!(ledger.thresholds_for("gone").is_none());
    assert!(ledger.is_threshold_notified("p1", 50));

    assert_eq!(store.retain_entities(&live(&["p1", "c1"])).unwrap(), 0);
}

#[test]
fn empty_delta_is_a_no_op() {
    let conn = open_db_in_memory().unwrap();
    let store = SqliteLedgerStore::new(&conn);

    store.apply_delta(&LedgerDelta::new()).unwrap();
    let ledger = store.load_ledger().unwrap();
    assert_eq!(ledger.stamps().count(), 0);
    assert_eq!(ledger.thresholds().count(), 0);
}
