use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

mod cli_style;
use cli_style::{
    get_styles, print_cancelled, print_empty_list, print_error, print_key_value, print_list_item,
    print_notification, print_success, print_warning, TableBuilder,
};

use pushcore::config::{AppConfig, CliConfig, FileConfig};
use pushcore::logging::{init_logging, LogLevel};
use pushcore::payload::Bundle;
use pushcore::pipeline::{
    GroupSummary, NotificationGenerationJob, NotificationHandlers, NotificationPipeline,
    NotificationRenderer, NotificationSnapshot, OpenedResult, PipelineContext,
    ProcessedBundleResult,
};
use pushcore::store::{RecordFilter, SqliteNotificationStore};

const VERSION: &str = concat!(env!("CARGO_PKG_VERSION"), " (", env!("GIT_HASH"), ")");

fn parse_path(s: &str) -> Result<PathBuf> {
    let original_path = PathBuf::from(s);
    if original_path.is_absolute() {
        return Ok(original_path);
    }
    let cwd = std::env::current_dir()?;
    Ok(cwd.join(original_path))
}

#[derive(Parser, Debug)]
#[command(styles=get_styles(), version = VERSION, about = "Drive the notification pipeline against a local store")]
struct CliArgs {
    /// Path to the notification database. Created if missing.
    #[clap(value_parser = parse_path)]
    pub db_path: PathBuf,

    /// Path to a TOML config file. Its values override the command line.
    #[clap(long, value_parser = parse_path)]
    pub config: Option<PathBuf>,

    /// Log verbosity. PUSHCORE_LOG overrides it with filter directives.
    #[clap(long, value_enum, default_value_t = LogLevel::Warn)]
    pub log_level: LogLevel,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Deliver a push bundle read from a JSON file.
    Deliver {
        #[clap(value_parser = parse_path)]
        bundle: PathBuf,
    },

    /// Deliver a generated notification with a fresh id.
    Send {
        #[clap(long)]
        title: Option<String>,
        #[clap(long, default_value = "")]
        alert: String,
        #[clap(long)]
        group: Option<String>,
        #[clap(long)]
        collapse: Option<String>,
        /// Time to live in seconds.
        #[clap(long)]
        ttl: Option<u64>,
    },

    /// Re-display stored notifications.
    Restore {
        /// Wait the boot delay first.
        #[clap(long)]
        boot: bool,
    },

    /// List stored notifications, newest first.
    List {
        #[clap(long)]
        group: Option<String>,
        /// Include opened and dismissed rows.
        #[clap(long)]
        all: bool,
    },

    /// Open the notification shown under an android id.
    Open {
        android_id: i32,
        #[clap(long)]
        action: Option<String>,
    },

    /// Dismiss the notification shown under an android id.
    Dismiss { android_id: i32 },

    /// Dismiss every notification of a group.
    ClearGroup { group: String },

    /// Dismiss every notification.
    ClearAll,

    /// Print the badge count.
    Badge,

    /// Delete records older than the restore window.
    Cleanup,
}

/// Prints what would be posted to the notification shade.
struct ConsoleRenderer;

impl NotificationRenderer for ConsoleRenderer {
    fn display(&self, job: &NotificationGenerationJob) -> bool {
        let header = format!("#{}", job.android_id());
        let mut lines = vec![job.body().unwrap_or_default()];
        lines.extend(
            job.payload()
                .action_buttons()
                .into_iter()
                .map(|b| format!("[{}]", b.text)),
        );
        print_notification(&header, job.title().as_deref(), &lines);
        true
    }

    fn display_summary(&self, summary: &GroupSummary) -> bool {
        let header = format!("#{} group {}", summary.android_id, summary.group_id);
        print_notification(&header, Some(&summary.summary_text), &summary.lines);
        true
    }

    fn cancel(&self, android_id: i32) {
        print_cancelled(android_id);
    }

    fn visible_notification_ids(&self) -> Result<Vec<i32>> {
        // A console has no shade to query
        Ok(Vec::new())
    }
}

struct ConsoleHandlers;

impl NotificationHandlers for ConsoleHandlers {
    fn on_received(&self, notification: &NotificationSnapshot) {
        info!("Received {}", notification.notification_id);
    }

    fn on_opened(&self, result: &OpenedResult) {
        info!(
            "Opened {:?} with action {}",
            result.notification_ids, result.action_id
        );
    }

    fn on_badge_count_changed(&self, count: usize) {
        info!("Badge count {}", count);
    }
}

fn read_bundle(path: &Path) -> Result<Bundle> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read bundle file: {:?}", path))?;
    let value: Value = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse bundle file: {:?}", path))?;
    let Value::Object(entries) = value else {
        bail!("Bundle file must contain a JSON object: {:?}", path);
    };
    // Transports deliver strings only; nested values travel encoded
    Ok(entries
        .into_iter()
        .map(|(k, v)| match v {
            Value::String(s) => (k, s),
            other => (k, other.to_string()),
        })
        .collect())
}

fn send_bundle(
    title: Option<String>,
    alert: String,
    group: Option<String>,
    collapse: Option<String>,
    ttl: Option<u64>,
) -> Bundle {
    let mut bundle = Bundle::new();
    let id = uuid::Uuid::new_v4().to_string();
    bundle.insert(
        "custom".to_string(),
        serde_json::json!({ "i": id }).to_string(),
    );
    bundle.insert("alert".to_string(), alert);
    if let Some(title) = title {
        bundle.insert("title".to_string(), title);
    }
    if let Some(group) = group {
        bundle.insert("grp".to_string(), group);
    }
    if let Some(collapse) = collapse {
        bundle.insert("collapse_key".to_string(), collapse);
    }
    if let Some(ttl) = ttl {
        bundle.insert("ttl".to_string(), ttl.to_string());
    }
    bundle
}

fn report_delivery(result: &ProcessedBundleResult) {
    if !result.is_onesignal_payload {
        print_warning("Not a notification payload (no custom.i), ignored");
    } else if result.is_dup {
        print_warning("Duplicate notification, ignored");
    } else if let Some(outcome) = &result.outcome {
        print_key_value("Notification", &outcome.notification_id);
        print_key_value("Decision", &format!("{:?}", outcome.decision));
        if outcome.shown {
            print_key_value("Android id", &outcome.android_id.to_string());
        }
        if let Some(replaced) = outcome.replaced_android_id {
            print_key_value("Replaced", &format!("#{}", replaced));
        }
        if let Some(summary) = &outcome.summary {
            print_key_value(
                "Group",
                &format!("{} ({} notifications)", summary.group_id, summary.notification_count),
            );
        }
        if outcome.persisted {
            print_success("Stored");
        } else {
            print_error("Not stored, see logs");
        }
    }
}

fn main() -> Result<()> {
    let cli_args = CliArgs::parse();

    let file_config = match &cli_args.config {
        Some(path) => Some(FileConfig::load(path)?),
        None => None,
    };
    let cli_config = CliConfig {
        db_path: Some(cli_args.db_path.clone()),
        log_level: cli_args.log_level,
    };
    let config = AppConfig::resolve(&cli_config, file_config)?;
    init_logging(config.log_level)?;

    info!("Opening notification database at {:?}...", config.db_path);
    let store = Arc::new(SqliteNotificationStore::new(&config.db_path)?);
    let ctx = PipelineContext::builder(store, Arc::new(ConsoleRenderer))
        .handlers(Arc::new(ConsoleHandlers))
        .settings(config.settings.clone())
        .build();
    let pipeline = NotificationPipeline::new(ctx);

    match cli_args.command {
        Command::Deliver { bundle } => {
            let result = pipeline.process_bundle(read_bundle(&bundle)?);
            report_delivery(&result);
        }
        Command::Send {
            title,
            alert,
            group,
            collapse,
            ttl,
        } => {
            let result = pipeline.process_bundle(send_bundle(title, alert, group, collapse, ttl));
            report_delivery(&result);
        }
        Command::Restore { boot } => match pipeline.restore(boot) {
            Some(report) => {
                print_key_value("Purged expired", &report.purged_expired.to_string());
                print_key_value("Candidates", &report.candidates.to_string());
                print_key_value("Already visible", &report.skipped_visible.to_string());
                print_key_value("Failed", &report.failed.to_string());
                print_success(&format!("Restored {} notification(s)", report.restored));
            }
            None => print_warning("Restore already ran"),
        },
        Command::List { group, all } => {
            let records = pipeline.list(&RecordFilter {
                group_id: group,
                include_inactive: all,
            });
            if records.is_empty() {
                print_empty_list("No notifications");
                return Ok(());
            }
            let mut table = TableBuilder::new(vec![
                "android id",
                "notification id",
                "group",
                "state",
                "text",
            ]);
            for record in &records {
                let state = if record.opened {
                    "opened"
                } else if record.dismissed {
                    "dismissed"
                } else if record.is_summary {
                    "summary"
                } else if !record.was_displayed() {
                    "silent"
                } else {
                    "live"
                };
                table.add_row(vec![
                    record.android_id.to_string(),
                    record.notification_id.clone().unwrap_or_default(),
                    record.group_id.clone().unwrap_or_default(),
                    state.to_string(),
                    record.preview_line(),
                ]);
            }
            table.print();
        }
        Command::Open { android_id, action } => {
            match pipeline.notification_opened(android_id, action.as_deref()) {
                Some(result) => {
                    for id in &result.notification_ids {
                        print_list_item(id);
                    }
                    print_success(&format!("Opened with action {}", result.action_id));
                }
                None => print_warning(&format!("No live notification #{}", android_id)),
            }
        }
        Command::Dismiss { android_id } => {
            if pipeline.notification_dismissed(android_id) {
                print_success(&format!("Dismissed #{}", android_id));
            } else {
                print_warning(&format!("No live notification #{}", android_id));
            }
        }
        Command::ClearGroup { group } => {
            let cleared = pipeline.clear_group(&group);
            print_success(&format!("Cleared {} notification(s) of {}", cleared, group));
        }
        Command::ClearAll => {
            let cleared = pipeline.clear_all();
            print_success(&format!("Cleared {} notification(s)", cleared));
        }
        Command::Badge => {
            print_key_value("Badge", &pipeline.badge_count().to_string());
        }
        Command::Cleanup => {
            let deleted = pipeline.cleanup_stale_records();
            print_success(&format!("Deleted {} stale record(s)", deleted));
        }
    }
    Ok(())
}
