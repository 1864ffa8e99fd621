use buildflow_core::db::open_db_in_memory;
use buildflow_core::{
    Contractor, EntityKind, EntityRepository, EntitySnapshot, EvaluatorSettings, LedgerStore,
    NotificationDraft, NotificationInbox, NotificationKind, NotificationSettings, PassOptions,
    Priority, Project, ProjectStatus, ReminderPass, ReminderPassService, ReminderService,
    RepoResult, Reserve, ReserveStatus, SettingsRepository, SqliteEntityRepository,
    SqliteLedgerStore, SqliteNotificationRepository, SqliteSettingsRepository,
    SubscriptionStatus, Task, TaskStatus, INBOX_RETENTION,
};
use chrono::{DateTime, Duration, TimeZone, Utc};
use rusqlite::Connection;
use std::collections::BTreeSet;

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 7, 8, 10, 0, 0).unwrap()
}

fn seeded_service(options: PassOptions) -> ReminderService {
    let conn = open_db_in_memory().unwrap();
    seed(&conn);
    ReminderService::new(conn, EvaluatorSettings::default(), options)
}

fn seed(conn: &Connection) {
    let repo = SqliteEntityRepository::new(conn);
    repo.upsert_project(&Project {
        id: "p1".to_string(),
        name: "Harbor offices".to_string(),
        status: ProjectStatus::InProgress,
        start_date: None,
        end_date: Some(now() - Duration::days(2)),
    })
    .unwrap();
    repo.upsert_task(&Task {
        id: "t1".to_string(),
        project_id: "p1".to_string(),
        title: "Electrical rough-in".to_string(),
        status: TaskStatus::InProgress,
        priority: Priority::Urgent,
        progress: 55,
        end_date: None,
    })
    .unwrap();
    repo.upsert_reserve(&Reserve {
        id: "r1".to_string(),
        project_id: "p1".to_string(),
        title: "Loose handrail".to_string(),
        status: ReserveStatus::Open,
        priority: Priority::Urgent,
    })
    .unwrap();
    repo.upsert_contractor(&Contractor {
        id: "c1".to_string(),
        name: "Northside Electric".to_string(),
        contract_end: Some(now() + Duration::days(7)),
    })
    .unwrap();
    repo.set_subscription(SubscriptionStatus::Active, Some(now() + Duration::days(3)))
        .unwrap();
}

fn inbox_len(conn: &Connection) -> usize {
    NotificationInbox::new(SqliteNotificationRepository::new(conn))
        .list(None)
        .unwrap()
        .len()
}

#[test]
fn first_pass_queues_notifications_and_second_pass_is_silent() {
    let service = seeded_service(PassOptions::default());

    let first = service.run_at(now()).unwrap();
    assert!(!first.skipped);
    let titles: Vec<&str> = first
        .notifications
        .iter()
        .map(|notification| notification.title.as_str())
        .collect();
    assert_eq!(
        titles,
        vec![
            "License expiring",
            "Unresolved reserves",
            "Project overdue",
            "Project progress",
            "Task progress",
            "Contract expiring",
        ]
    );
    assert_eq!(first.ledger_changes, 6);
    assert_eq!(inbox_len(service.connection()), 6);

    let second = service.run_at(now() + Duration::minutes(30)).unwrap();
    assert!(second.notifications.is_empty());
    assert_eq!(second.ledger_changes, 0);
    assert_eq!(inbox_len(service.connection()), 6);
}

#[test]
fn next_day_repeats_daily_reminders_only() {
    let service = seeded_service(PassOptions::default());
    service.run_at(now()).unwrap();

    let next_day = service.run_at(now() + Duration::days(1)).unwrap();
    let titles: Vec<&str> = next_day
        .notifications
        .iter()
        .map(|notification| notification.title.as_str())
        .collect();
    assert_eq!(
        titles,
        vec![
            "License expiring",
            "Unresolved reserves",
            "Project overdue",
            "Contract expiring",
        ]
    );
}

#[test]
fn disabled_preference_skips_pass_without_touching_ledger() {
    let service = seeded_service(PassOptions::default());
    SqliteSettingsRepository::new(service.connection())
        .save_notification_settings(&NotificationSettings {
            notifications_enabled: false,
            ..NotificationSettings::default()
        })
        .unwrap();

    let report = service.run_at(now()).unwrap();
    assert!(report.skipped);
    assert!(report.notifications.is_empty());

    let ledger = SqliteLedgerStore::new(service.connection())
        .load_ledger()
        .unwrap();
    assert_eq!(ledger.stamps().count(), 0);
    assert_eq!(ledger.thresholds().count(), 0);
    assert_eq!(inbox_len(service.connection()), 0);
}

#[test]
fn re_enabling_takes_effect_on_next_pass() {
    let service = seeded_service(PassOptions::default());
    let settings_repo = SqliteSettingsRepository::new(service.connection());
    let disabled = NotificationSettings {
        notifications_enabled: false,
        ..NotificationSettings::default()
    };
    settings_repo.save_notification_settings(&disabled).unwrap();
    assert!(service.run_at(now()).unwrap().skipped);

    settings_repo
        .save_notification_settings(&NotificationSettings::default())
        .unwrap();
    let report = service.run_at(now() + Duration::hours(1)).unwrap();
    assert!(!report.skipped);
    assert!(!report.notifications.is_empty());
}

#[test]
fn configured_off_switch_wins_over_stored_preference() {
    let conn = open_db_in_memory().unwrap();
    seed(&conn);
    let service = ReminderService::new(
        conn,
        EvaluatorSettings {
            notifications_enabled: false,
            ..EvaluatorSettings::default()
        },
        PassOptions::default(),
    );

    assert!(service.run_at(now()).unwrap().skipped);
}

#[test]
fn pruning_drops_ledger_records_of_deleted_entities() {
    let service = seeded_service(PassOptions::default());
    service.run_at(now()).unwrap();

    let ledger_store = SqliteLedgerStore::new(service.connection());
    assert!(ledger_store.load_ledger().unwrap().is_threshold_notified("t1", 50));

    SqliteEntityRepository::new(service.connection())
        .delete_entity(EntityKind::Task, "t1")
        .unwrap();
    let report = service.run_at(now() + Duration::hours(2)).unwrap();
    assert_eq!(report.pruned, 1);

    let ledger = ledger_store.load_ledger().unwrap();
    assert!(ledger.thresholds_for("t1").is_none());
    assert!(ledger.is_threshold_notified("p1", 50));
}

#[test]
fn pruning_can_be_switched_off() {
    let service = seeded_service(PassOptions {
        prune_deleted_entities: false,
    });
    service.run_at(now()).unwrap();
    SqliteEntityRepository::new(service.connection())
        .delete_entity(EntityKind::Task, "t1")
        .unwrap();

    let report = service.run_at(now() + Duration::hours(2)).unwrap();
    assert_eq!(report.pruned, 0);
    assert!(SqliteLedgerStore::new(service.connection())
        .load_ledger()
        .unwrap()
        .is_threshold_notified("t1", 50));
}

#[test]
fn scheduler_pass_hook_runs_a_pass() {
    let mut service = seeded_service(PassOptions::default());
    service.run_pass(now());
    assert_eq!(inbox_len(service.connection()), 6);
}

#[test]
fn back_dated_pass_survives_inbox_retention() {
    let service = seeded_service(PassOptions::default());
    let inbox = NotificationInbox::new(SqliteNotificationRepository::new(service.connection()));
    let recent = Utc::now() - Duration::minutes(1);
    for index in 0..INBOX_RETENTION {
        inbox
            .push(
                &NotificationDraft::new(
                    NotificationKind::Info,
                    "Earlier",
                    format!("Earlier {index}"),
                ),
                recent,
                &NotificationSettings::default(),
            )
            .unwrap();
    }

    let report = service.run_at(now()).unwrap();
    assert_eq!(report.notifications.len(), 6);
    assert!(report
        .notifications
        .iter()
        .all(|notification| notification.created_at > recent));

    let listed = inbox.list(None).unwrap();
    assert_eq!(listed.len(), INBOX_RETENTION as usize);
    for queued in &report.notifications {
        assert!(listed.iter().any(|notification| notification.id == queued.id));
    }
}

/// Entity source that fails the test if the pass reads it.
struct UntouchableEntities;

impl EntityRepository for UntouchableEntities {
    fn upsert_project(&self, _project: &Project) -> RepoResult<()> {
        unreachable!("entity writes are not part of a pass")
    }
    fn upsert_task(&self, _task: &Task) -> RepoResult<()> {
        unreachable!("entity writes are not part of a pass")
    }
    fn upsert_reserve(&self, _reserve: &Reserve) -> RepoResult<()> {
        unreachable!("entity writes are not part of a pass")
    }
    fn upsert_contractor(&self, _contractor: &Contractor) -> RepoResult<()> {
        unreachable!("entity writes are not part of a pass")
    }
    fn set_subscription(
        &self,
        _status: SubscriptionStatus,
        _end_date: Option<DateTime<Utc>>,
    ) -> RepoResult<()> {
        unreachable!("entity writes are not part of a pass")
    }
    fn delete_entity(&self, _kind: EntityKind, _id: &str) -> RepoResult<()> {
        unreachable!("entity writes are not part of a pass")
    }
    fn retain_ids(&self, _kind: EntityKind, _keep: &BTreeSet<String>) -> RepoResult<usize> {
        unreachable!("entity writes are not part of a pass")
    }
    fn clear_subscription(&self) -> RepoResult<bool> {
        unreachable!("entity writes are not part of a pass")
    }
    fn load_snapshot(&self, _now: DateTime<Utc>) -> RepoResult<EntitySnapshot> {
        panic!("disabled pass must not read entities")
    }
}

#[test]
fn disabled_pass_never_reads_entity_sources() {
    let conn = open_db_in_memory().unwrap();
    SqliteSettingsRepository::new(&conn)
        .save_notification_settings(&NotificationSettings {
            notifications_enabled: false,
            ..NotificationSettings::default()
        })
        .unwrap();

    let service = ReminderPassService::new(
        UntouchableEntities,
        SqliteLedgerStore::new(&conn),
        SqliteNotificationRepository::new(&conn),
        SqliteSettingsRepository::new(&conn),
        EvaluatorSettings::default(),
        PassOptions::default(),
    );
    assert!(service.run(now()).unwrap().skipped);
}
