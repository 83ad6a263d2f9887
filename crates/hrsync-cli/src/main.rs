//! hrsync CLI - trigger surface for the sync flows
//!
//! Plays the role of the external trigger: connect a tenant, run a flow,
//! drain the retry queue, review conflicts. Scheduling stays outside;
//! point cron (or any scheduler) at the same commands.

use std::path::{Path, PathBuf};

use chrono::{NaiveDate, TimeZone, Utc};
use clap::{Parser, Subcommand, ValueEnum};
use hrsync_core::db::{
    ConflictRepository, Database, LibSqlConflictRepository, LibSqlQueueRepository,
    LibSqlSyncLogRepository, SyncLogRepository,
};
use hrsync_core::hr::MemoryHrRepository;
use hrsync_core::models::{ConflictStrategy, ResolutionState};
use hrsync_core::queue::RetryQueue;
use hrsync_core::sync::{
    AttendanceWindow, EmployeeSyncOptions, LeaveFetchOptions, PayrollPeriod, SyncOrchestrator,
};
use hrsync_core::ConnectionConfig;
use thiserror::Error;

#[derive(Parser)]
#[command(name = "hrsync")]
#[command(about = "Synchronize HR data with a remote Odoo system")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Optional path to the local sync-state database
    #[arg(long, value_name = "PATH", global = true)]
    db_path: Option<PathBuf>,

    /// Tenant the command applies to
    #[arg(long, global = true, default_value = "default")]
    tenant: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Verify credentials without storing anything
    Test {
        #[arg(long)]
        url: String,
        #[arg(long)]
        database: String,
        #[arg(long)]
        username: String,
        #[arg(long)]
        secret: String,
    },
    /// Verify credentials, store the connection, and seed default
    /// field mappings
    Connect {
        #[arg(long)]
        url: String,
        #[arg(long)]
        database: String,
        #[arg(long)]
        username: String,
        #[arg(long)]
        secret: String,
        /// Minutes between automatic runs (scheduler hint)
        #[arg(long, default_value = "5")]
        interval: i64,
        /// Conflict strategy for divergent records
        #[arg(long, value_enum, default_value_t = StrategyArg::Manual)]
        strategy: StrategyArg,
        /// Webhook endpoint for outbound events
        #[arg(long)]
        webhook_url: Option<String>,
        /// Secret for webhook signatures
        #[arg(long)]
        webhook_secret: Option<String>,
    },
    /// Remove the stored connection and all entity mappings
    Disconnect,
    /// Show connection state and the most recent sync run
    Status,
    /// Run a sync flow
    Sync {
        #[command(subcommand)]
        flow: SyncFlow,
    },
    /// Retry queue maintenance
    Queue {
        #[command(subcommand)]
        action: QueueAction,
    },
    /// Conflict review
    Conflicts {
        #[command(subcommand)]
        action: ConflictAction,
    },
    /// Link a local employee to a remote one
    MapEmployee {
        /// Local employee id
        local_id: String,
        /// Remote employee id
        remote_id: i64,
    },
    /// Remove a local employee's link
    UnmapEmployee {
        /// Local employee id
        local_id: String,
    },
    /// List employee links
    Mappings,
    /// Recent sync log entries
    Logs {
        #[arg(short, long, default_value = "10")]
        limit: usize,
    },
}

#[derive(Subcommand)]
enum SyncFlow {
    /// Pull remote employees into the local HR store
    Employees {
        /// Import unmapped remote employees that have a work email
        #[arg(long)]
        create_missing: bool,
        /// Restrict to one remote department
        #[arg(long)]
        department: Option<i64>,
    },
    /// Push local attendance for mapped employees
    Attendance {
        /// Window size in hours, ending now
        #[arg(long, default_value = "24")]
        hours: i64,
    },
    /// Push pending local leave requests
    Leaves,
    /// List remote leave records in a date range
    FetchLeaves {
        #[arg(long, value_name = "YYYY-MM-DD")]
        from: Option<String>,
        #[arg(long, value_name = "YYYY-MM-DD")]
        to: Option<String>,
        #[arg(long)]
        state: Option<String>,
    },
    /// Aggregate attendance into a payroll export, optionally pushing it
    Payroll {
        #[arg(long, value_name = "YYYY-MM-DD")]
        start: String,
        #[arg(long, value_name = "YYYY-MM-DD")]
        end: String,
        /// Also create remote work entries from the export
        #[arg(long)]
        push: bool,
    },
}

#[derive(Subcommand)]
enum QueueAction {
    /// Lease due items and execute them
    Run {
        #[arg(short, long, default_value = "20")]
        limit: usize,
    },
    /// Item counts per status
    Status,
    /// Revert stale PROCESSING items to PENDING
    ResetStuck {
        /// Staleness threshold in minutes
        #[arg(long, default_value = "30")]
        threshold: i64,
    },
    /// Drop finished items older than the retention window
    Cleanup {
        /// Retention in days
        #[arg(long, default_value = "30")]
        retention: i64,
    },
}

#[derive(Subcommand)]
enum ConflictAction {
    /// Conflicts awaiting manual review
    List,
    /// Apply a manual resolution
    Resolve {
        /// Conflict record id
        id: String,
        #[arg(long, value_enum)]
        action: ResolveArg,
        /// Who is resolving (for the audit trail)
        #[arg(long, default_value = "cli")]
        by: String,
    },
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
enum StrategyArg {
    OdooWins,
    LocalWins,
    LatestWins,
    Manual,
}

impl From<StrategyArg> for ConflictStrategy {
    fn from(arg: StrategyArg) -> Self {
        match arg {
            StrategyArg::OdooWins => Self::OdooWins,
            StrategyArg::LocalWins => Self::LocalWins,
            StrategyArg::LatestWins => Self::LatestWins,
            StrategyArg::Manual => Self::Manual,
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
enum ResolveArg {
    KeepLocal,
    KeepOdoo,
    Merged,
    Skipped,
}

impl From<ResolveArg> for ResolutionState {
    fn from(arg: ResolveArg) -> Self {
        match arg {
            ResolveArg::KeepLocal => Self::KeepLocal,
            ResolveArg::KeepOdoo => Self::KeepOdoo,
            ResolveArg::Merged => Self::Merged,
            ResolveArg::Skipped => Self::Skipped,
        }
    }
}

#[derive(Debug, Error)]
enum CliError {
    #[error(transparent)]
    Core(#[from] hrsync_core::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
    #[error("Invalid date '{0}', expected YYYY-MM-DD")]
    InvalidDate(String),
}

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        eprintln!("Error: {error}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), CliError> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("hrsync=info".parse().unwrap()),
        )
        .init();

    let cli = Cli::parse();
    let db_path = resolve_db_path(cli.db_path);
    let db = open_database(&db_path).await?;
    let hr = MemoryHrRepository::new();
    let orchestrator = SyncOrchestrator::new(&db, &hr)?;

    match cli.command {
        Commands::Test {
            url,
            database,
            username,
            secret,
        } => {
            let uid = orchestrator
                .test_connection(&url, &database, &username, &secret)
                .await?;
            println!("Connection ok, session id {uid}");
        }
        Commands::Connect {
            url,
            database,
            username,
            secret,
            interval,
            strategy,
            webhook_url,
            webhook_secret,
        } => {
            let mut config = ConnectionConfig::new(&cli.tenant, url, database, username, secret);
            config.sync_interval_minutes = interval;
            config.conflict_strategy = strategy.into();
            config.webhook_url = webhook_url;
            config.webhook_secret = webhook_secret;

            let stored = orchestrator.connect(config).await?;
            println!(
                "Connected tenant {} to {} (session id {})",
                stored.tenant_id,
                stored.remote_url,
                stored.session_id.unwrap_or_default()
            );
        }
        Commands::Disconnect => {
            orchestrator.disconnect(&cli.tenant).await?;
            println!("Disconnected tenant {}", cli.tenant);
        }
        Commands::Status => {
            let status = orchestrator.status(&cli.tenant).await?;
            if status.connected {
                println!("Connected to {}", status.remote_url.unwrap_or_default());
                println!("Database: {}", status.database.unwrap_or_default());
                println!(
                    "Sync interval: every {} minutes",
                    status.sync_interval_minutes.unwrap_or_default()
                );
                match status.last_sync_at.and_then(format_timestamp) {
                    Some(at) => println!("Last sync: {at}"),
                    None => println!("Last sync: never"),
                }
            } else {
                println!("Not connected");
            }

            let logs = LibSqlSyncLogRepository::new(db.connection());
            if let Some(entry) = logs.latest(&cli.tenant, None).await? {
                println!(
                    "Latest run: {} {} ({}/{} ok, {} failed)",
                    entry.operation,
                    entry.status,
                    entry.success_count,
                    entry.record_count,
                    entry.failed_count
                );
            }
        }
        Commands::Sync { flow } => run_sync_flow(&orchestrator, &cli.tenant, flow).await?,
        Commands::Queue { action } => run_queue_action(&db, &orchestrator, &cli.tenant, action).await?,
        Commands::Conflicts { action } => run_conflict_action(&db, &cli.tenant, action).await?,
        Commands::MapEmployee { local_id, remote_id } => {
            orchestrator
                .map_employee(&cli.tenant, &local_id, remote_id)
                .await?;
            println!("Mapped {local_id} to remote employee {remote_id}");
        }
        Commands::UnmapEmployee { local_id } => {
            orchestrator.unmap_employee(&cli.tenant, &local_id).await?;
            println!("Unmapped {local_id}");
        }
        Commands::Mappings => {
            let mappings = orchestrator.list_employee_mappings(&cli.tenant).await?;
            if mappings.is_empty() {
                println!("No employee mappings");
            }
            for mapping in mappings {
                println!(
                    "{}  ->  remote {}  (last synced {})",
                    mapping.local_id,
                    mapping.remote_id,
                    mapping
                        .last_synced_at
                        .and_then(format_timestamp)
                        .unwrap_or_else(|| "never".to_string())
                );
            }
        }
        Commands::Logs { limit } => {
            let logs = LibSqlSyncLogRepository::new(db.connection());
            for entry in logs.list_recent(&cli.tenant, limit).await? {
                println!(
                    "{}  {:<16} {:<8} {:>4} records  {:>4} failed  {} ms",
                    format_timestamp(entry.started_at).unwrap_or_default(),
                    entry.operation,
                    entry.status,
                    entry.record_count,
                    entry.failed_count,
                    entry.duration_ms
                );
            }
        }
    }

    Ok(())
}

async fn run_sync_flow(
    orchestrator: &SyncOrchestrator<'_, MemoryHrRepository>,
    tenant: &str,
    flow: SyncFlow,
) -> Result<(), CliError> {
    let config = orchestrator.config(tenant).await?;

    match flow {
        SyncFlow::Employees {
            create_missing,
            department,
        } => {
            let options = EmployeeSyncOptions {
                create_missing,
                department_id: department,
                ..EmployeeSyncOptions::default()
            };
            let report = orchestrator.sync_employees(&config, &options).await?;
            println!(
                "Employees: {} imported, {} updated, {} skipped, {} errors",
                report.imported,
                report.updated,
                report.skipped,
                report.errors.len()
            );
            print_errors(&report.errors);
        }
        SyncFlow::Attendance { hours } => {
            let to = Utc::now().timestamp_millis();
            let window = AttendanceWindow {
                from: to - hours * 60 * 60_000,
                to,
            };
            let report = orchestrator.push_attendance(&config, window).await?;
            println!(
                "Attendance: {} pushed, {} failed of {}",
                report.pushed, report.failed, report.total
            );
            print_errors(&report.errors);
        }
        SyncFlow::Leaves => {
            let report = orchestrator.push_leaves(&config).await?;
            println!(
                "Leaves: {} pushed, {} failed of {}",
                report.pushed, report.failed, report.total
            );
            print_errors(&report.errors);
        }
        SyncFlow::FetchLeaves { from, to, state } => {
            let options = LeaveFetchOptions {
                from: from.as_deref().map(parse_date).transpose()?,
                to: to.as_deref().map(parse_date).transpose()?,
                state,
            };
            let leaves = orchestrator.fetch_leaves(&config, &options).await?;
            println!("{}", serde_json::to_string_pretty(&leaves)?);
        }
        SyncFlow::Payroll { start, end, push } => {
            let period = PayrollPeriod {
                start: parse_date(&start)?,
                end: parse_date(&end)?,
            };
            let export = orchestrator.export_payroll(&config, period).await?;
            println!(
                "Payroll: {} employees summarized, {} errors",
                export.summaries.len(),
                export.errors.len()
            );
            print_errors(&export.errors);

            if push {
                let report = orchestrator.push_payroll(&config, &export).await?;
                println!(
                    "Work entries: {} pushed, {} failed",
                    report.pushed, report.failed
                );
                print_errors(&report.errors);
            } else {
                println!("{}", serde_json::to_string_pretty(&export.summaries)?);
            }
        }
    }

    Ok(())
}

async fn run_queue_action(
    db: &Database,
    orchestrator: &SyncOrchestrator<'_, MemoryHrRepository>,
    tenant: &str,
    action: QueueAction,
) -> Result<(), CliError> {
    let queue = RetryQueue::new(LibSqlQueueRepository::new(db.connection()));

    match action {
        QueueAction::Run { limit } => {
            let config = orchestrator.config(tenant).await?;
            let report = orchestrator.run_queue(&config, limit).await?;
            println!(
                "Queue: {} processed, {} completed, {} failed",
                report.processed, report.completed, report.failed
            );
        }
        QueueAction::Status => {
            let counts = {
                use hrsync_core::db::QueueRepository;
                LibSqlQueueRepository::new(db.connection()).counts(tenant).await?
            };
            println!(
                "pending {}  processing {}  completed {}  failed {}",
                counts.pending, counts.processing, counts.completed, counts.failed
            );
        }
        QueueAction::ResetStuck { threshold } => {
            let reverted = queue.reset_stuck(threshold).await?;
            println!("Reverted {reverted} stuck items");
        }
        QueueAction::Cleanup { retention } => {
            let deleted = queue.cleanup(retention).await?;
            println!("Deleted {deleted} finished items");
        }
    }

    Ok(())
}

async fn run_conflict_action(
    db: &Database,
    tenant: &str,
    action: ConflictAction,
) -> Result<(), CliError> {
    let repo = LibSqlConflictRepository::new(db.connection());

    match action {
        ConflictAction::List => {
            let open = repo.list_unresolved(tenant).await?;
            if open.is_empty() {
                println!("No unresolved conflicts");
            }
            for record in open {
                println!(
                    "{}  {}:{}  since {}",
                    record.id,
                    record.entity_type,
                    record.entity_id,
                    format_timestamp(record.created_at).unwrap_or_default()
                );
            }
        }
        ConflictAction::Resolve { id, action, by } => {
            let resolver = hrsync_core::conflict::ConflictResolver::new(repo);
            let record = resolver.resolve_manual(&id, action.into(), &by).await?;
            println!("Conflict {} resolved as {:?}", record.id, record.resolution_state);
        }
    }

    Ok(())
}

fn print_errors(errors: &[String]) {
    for error in errors {
        eprintln!("  {error}");
    }
}

fn parse_date(text: &str) -> Result<i64, CliError> {
    let date = NaiveDate::parse_from_str(text.trim(), "%Y-%m-%d")
        .map_err(|_| CliError::InvalidDate(text.to_string()))?;
    let midnight = date
        .and_hms_opt(0, 0, 0)
        .ok_or_else(|| CliError::InvalidDate(text.to_string()))?;
    Ok(Utc.from_utc_datetime(&midnight).timestamp_millis())
}

fn format_timestamp(ms: i64) -> Option<String> {
    chrono::DateTime::from_timestamp_millis(ms)
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string())
}

fn resolve_db_path(cli_db_path: Option<PathBuf>) -> PathBuf {
    cli_db_path
        .or_else(|| std::env::var_os("HRSYNC_DB_PATH").map(PathBuf::from))
        .unwrap_or_else(default_db_path)
}

fn default_db_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("hrsync")
        .join("hrsync.db")
}

async fn open_database(path: &Path) -> Result<Database, CliError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    tracing::debug!("opening sync-state database at {}", path.display());
    Ok(Database::open(path).await?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_date_accepts_iso_dates_only() {
        assert_eq!(parse_date("2024-03-01").unwrap(), 1_709_251_200_000);
        assert!(parse_date("03/01/2024").is_err());
        assert!(parse_date("").is_err());
    }

    #[test]
    fn format_timestamp_round_trips_parse_date() {
        let ms = parse_date("2024-03-01").unwrap();
        assert_eq!(format_timestamp(ms).unwrap(), "2024-03-01 00:00:00");
    }

    #[test]
    fn strategy_arg_maps_onto_core_strategies() {
        assert_eq!(
            ConflictStrategy::from(StrategyArg::LatestWins),
            ConflictStrategy::LatestWins
        );
        assert_eq!(
            ResolutionState::from(ResolveArg::KeepOdoo),
            ResolutionState::KeepOdoo
        );
    }

    #[test]
    fn default_db_path_is_under_the_data_dir() {
        let path = default_db_path();
        assert!(path.ends_with(Path::new("hrsync").join("hrsync.db")));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn open_database_creates_parent_directories() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("nested").join("state.db");
        open_database(&path).await.unwrap();
        assert!(path.exists());
    }
}
