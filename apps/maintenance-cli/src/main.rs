use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand, ValueEnum};
use clubhouse::config::AppConfig;
use clubhouse::reconcile::backup::BackupManager;
use clubhouse::reconcile::{backup_flag, reconcile, ReconcileContext};
use clubhouse::services::maintenance;
use clubhouse::storage::FileHost;
use clubhouse::{AppError, Storage};
use serde::Serialize;
use tracing::error;

#[derive(Clone, Copy, ValueEnum)]
enum FlagAction {
    Enable,
    Disable,
    Status,
}

#[derive(Subcommand)]
enum Command {
    /// Run the startup reconciler once and print its report
    Reconcile,
    /// Create missing tables and verify existing ones
    InitSchema,
    /// Copy the legacy SQLite file into an empty server database
    MigrateLegacy,
    /// Write a dump and prune old ones
    Backup,
    /// Delete all but the newest dumps
    Prune {
        #[arg(long)]
        keep: Option<usize>,
    },
    /// List dumps, newest first
    ListBackups,
    /// Load a dump (the newest unless --file is given)
    Restore {
        #[arg(long)]
        file: Option<String>,
        /// Replace existing data instead of requiring an empty database
        #[arg(long)]
        force: bool,
    },
    /// Show or change the persisted startup-backup switch
    BackupFlag {
        #[arg(value_enum)]
        action: FlagAction,
    },
    /// Report article image references that do not resolve
    ScanImages,
    /// Point broken image references at the default image
    RepairImages,
}

#[derive(Parser)]
#[command(name = "clubctl")]
#[command(about = "Clubhouse maintenance tool")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug)]
enum CliError {
    App(AppError),
    Failed(String),
}

impl From<AppError> for CliError {
    fn from(e: AppError) -> Self {
        CliError::App(e)
    }
}

impl std::fmt::Display for CliError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CliError::App(e) => write!(f, "{} ({})", e, e.code()),
            CliError::Failed(message) => f.write_str(message),
        }
    }
}

fn print<T: Serialize>(value: &T) -> Result<(), CliError> {
    let text = serde_json::to_string_pretty(value)
        .map_err(|e| CliError::Failed(format!("cannot render output: {e}")))?;
    println!("{text}");
    Ok(())
}

async fn open_storage(config: &AppConfig) -> Result<Storage, CliError> {
    Storage::open(config.backend.clone(), config.connect.clone())
        .await
        .map_err(|e| CliError::Failed(format!("cannot open {}: {e}", config.backend.display_target())))
}

async fn run(command: Command, config: AppConfig) -> Result<(), CliError> {
    let backups = BackupManager::new(config.backup.clone());
    let host: Arc<dyn FileHost> = config.file_host();

    match command {
        Command::ListBackups => return print(&backups.list().await.map_err(AppError::from)?),
        Command::Prune { keep } => {
            let keep = keep.unwrap_or(config.backup.keep);
            let pruned = backups.prune(keep, None).await.map_err(AppError::from)?;
            return print(&serde_json::json!({ "kept": keep, "pruned": pruned }));
        }
        _ => {}
    }

    let storage = open_storage(&config).await?;
    let result = match command {
        Command::Reconcile => {
            let report = reconcile(&ReconcileContext {
                storage: &storage,
                backups: &backups,
                legacy_path: config.legacy_sqlite_path.clone(),
                backup_enabled_default: config.backup_enabled_default,
                bootstrap_admin_password: config.bootstrap_admin_password.clone(),
                bcrypt_cost: config.bcrypt_cost,
            })
            .await;
            print(&report)?;
            if report.is_fatal() {
                Err(CliError::Failed("reconciliation ended in fatal state".into()))
            } else {
                Ok(())
            }
        }
        Command::InitSchema => match storage.initialize().await {
            Ok(()) => print(&serde_json::json!({ "schema": "ready" })),
            Err(e) => Err(CliError::Failed(format!("schema initialization failed: {e}"))),
        },
        Command::MigrateLegacy => {
            let outcome = maintenance::migrate(&storage, &config.legacy_sqlite_path).await?;
            print(&outcome)?;
            if outcome.is_failed() {
                Err(CliError::Failed("legacy migration failed".into()))
            } else {
                Ok(())
            }
        }
        Command::Backup => print(&maintenance::backup(&storage, &backups).await?),
        Command::Restore { file, force } => {
            print(&maintenance::restore(&storage, &backups, file.as_deref(), force).await?)
        }
        Command::BackupFlag { action } => {
            let enabled = match action {
                FlagAction::Enable => maintenance::set_backup_flag(&storage, true).await?,
                FlagAction::Disable => maintenance::set_backup_flag(&storage, false).await?,
                FlagAction::Status => {
                    backup_flag::load(storage.conn(), config.backup_enabled_default)
                        .await
                        .map_err(AppError::from)?
                }
            };
            print(&serde_json::json!({ "backup_enabled": enabled }))
        }
        Command::ScanImages => {
            print(&maintenance::scan_images(&storage, host.as_ref(), &config.images).await?)
        }
        Command::RepairImages => {
            print(&maintenance::repair_images(&storage, host.as_ref(), &config.images).await?)
        }
        Command::ListBackups | Command::Prune { .. } => Ok(()),
    };

    if let Err(e) = storage.close().await {
        error!(error = %e, "failed to close database");
    }
    result
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .without_time()
        .with_target(false)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,sqlx=warn,sea_orm=warn")),
        )
        .init();

    let args = Args::parse();

    let config = match AppConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Invalid configuration: {e}");
            return ExitCode::from(2);
        }
    };

    match run(args.command, config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("clubctl: {e}");
            ExitCode::FAILURE
        }
    }
}
