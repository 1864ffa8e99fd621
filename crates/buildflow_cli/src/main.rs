//! BuildFlow reminder CLI.
//!
//! # Responsibility
//! - Open the local database, import entity snapshots and delete entities.
//! - Run one reminder pass or the periodic scheduler.
//! - Manage the notification inbox and notification preferences.

use buildflow_core::db::open_db;
use buildflow_core::{
    import_snapshot, init_logging, load_config, parse_iso_instant, parse_snapshot_file,
    AppConfig, EntityKind, EntityRepository, ImportMode, Notification, NotificationId,
    NotificationInbox, NotificationSettings, NotificationSettingsPatch, ReminderScheduler,
    ReminderService, SettingsRepository, SharedPass, SqliteEntityRepository,
    SqliteNotificationRepository, SqliteSettingsRepository,
};
use chrono::Utc;
use clap::{Parser, Subcommand, ValueEnum};
use log::{error, info};
use std::error::Error;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::{Arc, Mutex};

type CliResult = Result<(), Box<dyn Error>>;

#[derive(Debug, Parser)]
#[command(name = "buildflow", version, about = "Construction project reminders")]
struct Cli {
    /// JSON configuration file.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// SQLite database path, overrides the configured one.
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Import a JSON entity snapshot. Entities missing from the file are
    /// deleted unless `--merge` is given.
    Import {
        file: PathBuf,
        #[arg(long)]
        merge: bool,
    },
    /// Delete one entity from the local store.
    Delete { kind: KindArg, id: String },
    /// Run one reminder pass and print new notifications.
    Check {
        /// Evaluation instant (RFC 3339 or YYYY-MM-DD). Defaults to now.
        #[arg(long)]
        at: Option<String>,
    },
    /// Run reminder passes periodically until Ctrl-C.
    Run,
    /// Manage queued notifications.
    Inbox {
        #[command(subcommand)]
        action: InboxAction,
    },
    /// Toggle or inspect notification preferences.
    Notifications {
        #[command(subcommand)]
        action: NotificationsAction,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum KindArg {
    Project,
    Task,
    Reserve,
    Contractor,
}

impl From<KindArg> for EntityKind {
    fn from(value: KindArg) -> Self {
        match value {
            KindArg::Project => Self::Project,
            KindArg::Task => Self::Task,
            KindArg::Reserve => Self::Reserve,
            KindArg::Contractor => Self::Contractor,
        }
    }
}

#[derive(Debug, Subcommand)]
enum InboxAction {
    List {
        #[arg(long)]
        limit: Option<u32>,
        /// Print JSON instead of text lines.
        #[arg(long)]
        json: bool,
    },
    Read { id: NotificationId },
    ReadAll,
    Delete { id: NotificationId },
    Clear,
}

#[derive(Debug, Clone, Copy, Subcommand)]
enum NotificationsAction {
    Enable,
    Disable,
    Status,
    /// Change display preferences.
    Set {
        #[arg(long)]
        sound: Option<bool>,
        #[arg(long)]
        toasts: Option<bool>,
        #[arg(long)]
        browser: Option<bool>,
        #[arg(long)]
        auto_delete: Option<bool>,
    },
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("event=cli_exit module=cli status=error error={err}");
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> CliResult {
    let mut config = load_config(cli.config.as_deref())?;
    if let Some(db) = cli.db {
        config.database_path = db;
    }
    if let Some(log_dir) = &config.log_dir {
        init_logging(&config.log_level, log_dir)?;
    }

    match cli.command {
        Command::Import { file, merge } => import(&config, file, merge),
        Command::Delete { kind, id } => delete(&config, kind, &id),
        Command::Check { at } => check(&config, at.as_deref()),
        Command::Run => run_scheduler(&config).await,
        Command::Inbox { action } => inbox(&config, action),
        Command::Notifications { action } => notifications(&config, action),
    }
}

fn import(config: &AppConfig, file: PathBuf, merge: bool) -> CliResult {
    let text = std::fs::read_to_string(&file)
        .map_err(|err| format!("cannot read `{}`: {err}", file.display()))?;
    let snapshot = parse_snapshot_file(&text)?;
    let conn = open_db(&config.database_path)?;
    let mode = if merge {
        ImportMode::Merge
    } else {
        ImportMode::Replace
    };
    let summary = import_snapshot(&conn, &snapshot, mode)?;
    println!(
        "imported projects={} tasks={} reserves={} contractors={} subscription={} removed={}",
        summary.projects,
        summary.tasks,
        summary.reserves,
        summary.contractors,
        summary.subscription,
        summary.removed
    );
    Ok(())
}

fn delete(config: &AppConfig, kind: KindArg, id: &str) -> CliResult {
    let conn = open_db(&config.database_path)?;
    let kind = EntityKind::from(kind);
    SqliteEntityRepository::new(&conn).delete_entity(kind, id)?;
    println!("deleted {} {id}", kind.as_str());
    Ok(())
}

fn check(config: &AppConfig, at: Option<&str>) -> CliResult {
    let now = match at {
        Some(text) => {
            parse_iso_instant(text).ok_or_else(|| format!("invalid --at instant `{text}`"))?
        }
        None => Utc::now(),
    };

    let service = ReminderService::from_config(open_db(&config.database_path)?, config);
    let report = service.run_at(now)?;
    if report.skipped {
        println!("notifications are disabled; pass skipped");
        return Ok(());
    }
    if report.notifications.is_empty() {
        println!("no new notifications");
    }
    for notification in &report.notifications {
        print_notification(notification);
    }
    Ok(())
}

async fn run_scheduler(config: &AppConfig) -> CliResult {
    let service = ReminderService::from_config(open_db(&config.database_path)?, config);
    let pass: SharedPass = Arc::new(Mutex::new(service));

    let mut scheduler = ReminderScheduler::new(config.tick_period())?;
    scheduler.start(pass)?;
    println!(
        "reminder scheduler running every {}s, press Ctrl-C to stop",
        scheduler.period().as_secs()
    );

    tokio::signal::ctrl_c().await?;
    scheduler.stop();
    info!("event=cli_shutdown module=cli status=ok");
    Ok(())
}

fn inbox(config: &AppConfig, action: InboxAction) -> CliResult {
    let conn = open_db(&config.database_path)?;
    let inbox = NotificationInbox::new(SqliteNotificationRepository::new(&conn));

    match action {
        InboxAction::List { limit, json } => {
            let notifications = inbox.list(limit)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&notifications)?);
                return Ok(());
            }
            if notifications.is_empty() {
                println!("inbox is empty");
            }
            for notification in &notifications {
                print_notification(notification);
            }
            println!("unread={}", inbox.unread_count()?);
        }
        InboxAction::Read { id } => inbox.mark_read(id)?,
        InboxAction::ReadAll => println!("marked {} notification(s) read", inbox.mark_all_read()?),
        InboxAction::Delete { id } => inbox.delete(id)?,
        InboxAction::Clear => println!("deleted {} notification(s)", inbox.clear_all()?),
    }
    Ok(())
}

fn notifications(config: &AppConfig, action: NotificationsAction) -> CliResult {
    let conn = open_db(&config.database_path)?;
    let repo = SqliteSettingsRepository::new(&conn);

    let patch = match action {
        NotificationsAction::Status => NotificationSettingsPatch::default(),
        NotificationsAction::Enable => NotificationSettingsPatch {
            notifications_enabled: Some(true),
            ..NotificationSettingsPatch::default()
        },
        NotificationsAction::Disable => NotificationSettingsPatch {
            notifications_enabled: Some(false),
            ..NotificationSettingsPatch::default()
        },
        NotificationsAction::Set {
            sound,
            toasts,
            browser,
            auto_delete,
        } => NotificationSettingsPatch {
            sound_enabled: sound,
            toasts_enabled: toasts,
            browser_notifications: browser,
            auto_delete,
            ..NotificationSettingsPatch::default()
        },
    };

    let mut settings = repo.load_notification_settings()?;
    if !patch.is_empty() {
        settings = patch.apply(settings);
        repo.save_notification_settings(&settings)?;
    }
    print_settings(&settings, config.evaluator.notifications_enabled);
    Ok(())
}

fn print_settings(settings: &NotificationSettings, allowed_by_config: bool) {
    let on_off = |value: bool| if value { "on" } else { "off" };
    if allowed_by_config {
        println!("notifications {}", on_off(settings.notifications_enabled));
    } else {
        println!(
            "notifications {} (forced off by configuration)",
            on_off(settings.notifications_enabled)
        );
    }
    println!("sound {}", on_off(settings.sound_enabled));
    println!("toasts {}", on_off(settings.toasts_enabled));
    println!("browser {}", on_off(settings.browser_notifications));
    println!("auto-delete {}", on_off(settings.auto_delete));
}

fn print_notification(notification: &Notification) {
    let marker = if notification.read { ' ' } else { '*' };
    println!(
        "{marker} {} [{}] {} {}: {}",
        notification.id,
        notification.kind.as_str(),
        notification.created_at.format("%Y-%m-%d %H:%M"),
        notification.title,
        notification.description
    );
}
