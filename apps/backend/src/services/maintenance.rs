//! Operator commands shared by the admin routes and `clubctl`.

use std::path::Path;

use serde::Serialize;
use tracing::info;

use crate::error::AppError;
use crate::errors::ErrorCode;
use crate::reconcile::backup::{BackupError, BackupHandle, BackupManager, RestoreError, RestoreMode};
use crate::reconcile::images::{self, ImagePolicy, ImageReport, RepairSummary};
use crate::reconcile::{backup_flag, count_rows, migrate_if_needed, MigrationOutcome, TableCounts};
use crate::storage::{FileHost, Storage};

/// Actions that need a confirmation token before they run.
pub const DESTRUCTIVE_ACTIONS: [&str; 2] = ["restore", "migrate"];

#[derive(Debug, Clone, Serialize)]
pub struct MaintenanceStatus {
    pub backend: &'static str,
    pub target: String,
    pub counts: TableCounts,
    pub backup_enabled: bool,
    pub backups: Vec<BackupHandle>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BackupResult {
    pub backup: BackupHandle,
    pub pruned: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct ImageRepairResult {
    pub report: ImageReport,
    pub repair: RepairSummary,
}

impl From<BackupError> for AppError {
    fn from(e: BackupError) -> Self {
        match e {
            BackupError::ToolUnavailable { .. } => {
                AppError::unavailable(ErrorCode::DumpToolUnavailable, e.to_string())
            }
            BackupError::Db(db) => AppError::from(db),
            other => AppError::internal_with(ErrorCode::BackupFailed, other.to_string()),
        }
    }
}

impl From<RestoreError> for AppError {
    fn from(e: RestoreError) -> Self {
        match e {
            RestoreError::NotEmpty { .. } => AppError::conflict(ErrorCode::DatabaseNotEmpty, e.to_string()),
            RestoreError::NoDump => AppError::not_found(ErrorCode::BackupNotFound, e.to_string()),
            RestoreError::ToolUnavailable { .. } => {
                AppError::unavailable(ErrorCode::DumpToolUnavailable, e.to_string())
            }
            RestoreError::Lock(_) => AppError::conflict(ErrorCode::MaintenanceBusy, e.to_string()),
            RestoreError::Format { .. } => AppError::invalid(ErrorCode::RestoreFailed, e.to_string()),
            other => AppError::internal_with(ErrorCode::RestoreFailed, other.to_string()),
        }
    }
}

pub async fn status(
    storage: &Storage,
    backups: &BackupManager,
    backup_enabled_default: bool,
) -> Result<MaintenanceStatus, AppError> {
    let counts = count_rows(storage.conn()).await?;
    let backup_enabled = backup_flag::load(storage.conn(), backup_enabled_default).await?;
    Ok(MaintenanceStatus {
        backend: storage.backend().kind(),
        target: storage.backend().display_target(),
        counts,
        backup_enabled,
        backups: backups.list().await?,
    })
}

pub async fn backup(storage: &Storage, backups: &BackupManager) -> Result<BackupResult, AppError> {
    let (backup, pruned) = backups.backup_and_prune(storage).await?;
    Ok(BackupResult { backup, pruned })
}

/// Operator restore. `file` picks a dump by name; otherwise the newest one.
///
/// With `force` the dump replaces existing data, without it the target must
/// be empty.
pub async fn restore(
    storage: &Storage,
    backups: &BackupManager,
    file: Option<&str>,
    force: bool,
) -> Result<BackupHandle, AppError> {
    let handle = match file {
        Some(name) => backups.find(name).await?.ok_or_else(|| {
            AppError::not_found(ErrorCode::BackupNotFound, format!("No dump named '{name}'"))
        })?,
        None => backups
            .latest()
            .await?
            .ok_or_else(|| AppError::from(RestoreError::NoDump))?,
    };
    let mode = if force {
        RestoreMode::Manual
    } else {
        RestoreMode::Automatic
    };
    backups.restore(storage, &handle, mode).await?;
    info!(file = %handle.file_name, ?mode, "operator restore finished");
    Ok(handle)
}

pub async fn migrate(storage: &Storage, legacy_path: &Path) -> Result<MigrationOutcome, AppError> {
    let outcome = migrate_if_needed(storage, legacy_path).await.map_err(|e| {
        AppError::internal_with(ErrorCode::DbError, format!("legacy migration failed: {e}"))
    })?;
    info!(outcome = ?outcome, "operator migration finished");
    Ok(outcome)
}

pub async fn set_backup_flag(storage: &Storage, enabled: bool) -> Result<bool, AppError> {
    backup_flag::set(storage.conn(), enabled).await?;
    Ok(enabled)
}

pub async fn scan_images(
    storage: &Storage,
    host: &dyn FileHost,
    policy: &ImagePolicy,
) -> Result<ImageReport, AppError> {
    Ok(images::scan(storage.conn(), host, policy).await?)
}

/// Scan, then rewrite every dangling or invalid reference to the default
/// image. References that could not be checked are left alone.
pub async fn repair_images(
    storage: &Storage,
    host: &dyn FileHost,
    policy: &ImagePolicy,
) -> Result<ImageRepairResult, AppError> {
    let report = images::scan(storage.conn(), host, policy).await?;
    let repair = images::repair(storage.conn(), &report, &policy.default_image).await?;
    Ok(ImageRepairResult { report, repair })
}
