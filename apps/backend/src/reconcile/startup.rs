//! The once-per-process reconciliation that runs before the server binds.
//!
//! ```text
//! Initialize -> CheckEmptiness -> Migrate ----------> Done
//!                    |              | failed or         ^
//!                    |              v skipped, flag on  |
//!                    +---------> AttemptRestore --------+
//!                    |                                  |
//!                    +---------> Backup ----------------+
//! ```
//!
//! Only `Initialize` and row counting can end in `Fatal`. Failures in the
//! later steps are logged, recorded in the report and end in `Done`.

use std::path::PathBuf;

use serde::Serialize;
use time::OffsetDateTime;
use tracing::{error, info, warn};

use super::backup::BackupManager;
use super::backup_flag;
use super::migrator::{migrate_if_needed, MigrationOutcome};
use super::tables::{count_rows, TableCounts};
use crate::services::members::ensure_bootstrap_admin;
use crate::storage::Storage;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "reason", rename_all = "snake_case")]
pub enum ReconcileState {
    Initialize,
    CheckEmptiness,
    Migrate,
    AttemptRestore,
    Backup,
    Done,
    Fatal(String),
}

impl ReconcileState {
    pub fn name(&self) -> &'static str {
        match self {
            ReconcileState::Initialize => "initialize",
            ReconcileState::CheckEmptiness => "check_emptiness",
            ReconcileState::Migrate => "migrate",
            ReconcileState::AttemptRestore => "attempt_restore",
            ReconcileState::Backup => "backup",
            ReconcileState::Done => "done",
            ReconcileState::Fatal(_) => "fatal",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ReconcileState::Done | ReconcileState::Fatal(_))
    }
}

/// Everything the reconciler reads. The backup flag is loaded once, during
/// `CheckEmptiness`, and not re-read afterwards.
pub struct ReconcileContext<'a> {
    pub storage: &'a Storage,
    pub backups: &'a BackupManager,
    pub legacy_path: PathBuf,
    pub backup_enabled_default: bool,
    pub bootstrap_admin_password: Option<String>,
    pub bcrypt_cost: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RestoreSummary {
    pub file: Option<String>,
    pub restored: bool,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BackupSummary {
    pub file: Option<String>,
    pub pruned: usize,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReconcileReport {
    pub final_state: ReconcileState,
    pub steps: Vec<&'static str>,
    pub counts: Option<TableCounts>,
    pub backup_enabled: Option<bool>,
    pub migration: Option<MigrationOutcome>,
    pub migration_error: Option<String>,
    pub restore: Option<RestoreSummary>,
    pub backup: Option<BackupSummary>,
    pub bootstrap_admin_created: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub finished_at: OffsetDateTime,
}

impl ReconcileReport {
    fn new() -> Self {
        Self {
            final_state: ReconcileState::Initialize,
            steps: Vec::new(),
            counts: None,
            backup_enabled: None,
            migration: None,
            migration_error: None,
            restore: None,
            backup: None,
            bootstrap_admin_created: false,
            finished_at: OffsetDateTime::now_utc(),
        }
    }

    pub fn is_fatal(&self) -> bool {
        matches!(self.final_state, ReconcileState::Fatal(_))
    }
}

/// Run the state machine to completion.
pub async fn reconcile(ctx: &ReconcileContext<'_>) -> ReconcileReport {
    let mut report = ReconcileReport::new();
    let mut backup_enabled = ctx.backup_enabled_default;
    let mut state = ReconcileState::Initialize;

    loop {
        report.steps.push(state.name());
        if state.is_terminal() {
            break;
        }
        info!(state = state.name(), "reconcile step");

        state = match state {
            ReconcileState::Initialize => match ctx.storage.initialize().await {
                Ok(()) => ReconcileState::CheckEmptiness,
                Err(e) => ReconcileState::Fatal(format!("schema initialization failed: {e}")),
            },

            ReconcileState::CheckEmptiness => {
                match count_rows(ctx.storage.conn()).await {
                    Err(e) => ReconcileState::Fatal(format!("cannot count rows: {e}")),
                    Ok(counts) => {
                        backup_enabled =
                            match backup_flag::load(ctx.storage.conn(), ctx.backup_enabled_default)
                                .await
                            {
                                Ok(enabled) => enabled,
                                Err(e) => {
                                    warn!(error = %e, "backup flag unreadable, using default");
                                    ctx.backup_enabled_default
                                }
                            };
                        report.counts = Some(counts);
                        report.backup_enabled = Some(backup_enabled);

                        if !counts.is_empty() {
                            if backup_enabled {
                                ReconcileState::Backup
                            } else {
                                ReconcileState::Done
                            }
                        } else if ctx.legacy_path.exists() {
                            ReconcileState::Migrate
                        } else {
                            restore_or_done(ctx, backup_enabled).await
                        }
                    }
                }
            }

            ReconcileState::Migrate => {
                match migrate_if_needed(ctx.storage, &ctx.legacy_path).await {
                    Ok(outcome) => {
                        let next = match &outcome {
                            MigrationOutcome::Migrated { .. } => ReconcileState::Done,
                            MigrationOutcome::Failed { .. } | MigrationOutcome::Skipped { .. } => {
                                restore_or_done(ctx, backup_enabled).await
                            }
                        };
                        report.migration = Some(outcome);
                        next
                    }
                    Err(e) => {
                        error!(error = %e, "legacy migration could not start");
                        report.migration_error = Some(e.to_string());
                        restore_or_done(ctx, backup_enabled).await
                    }
                }
            }

            ReconcileState::AttemptRestore => {
                let summary = match ctx.backups.restore_latest(ctx.storage).await {
                    Ok(handle) => RestoreSummary {
                        file: Some(handle.file_name),
                        restored: true,
                        error: None,
                    },
                    Err(e) => {
                        error!(error = %e, "automatic restore failed");
                        RestoreSummary {
                            file: None,
                            restored: false,
                            error: Some(e.to_string()),
                        }
                    }
                };
                report.restore = Some(summary);
                ReconcileState::Done
            }

            ReconcileState::Backup => {
                let summary = match ctx.backups.backup_and_prune(ctx.storage).await {
                    Ok((handle, pruned)) => BackupSummary {
                        file: Some(handle.file_name),
                        pruned,
                        error: None,
                    },
                    Err(e) => {
                        error!(error = %e, "startup backup failed");
                        BackupSummary {
                            error: Some(e.to_string()),
                            ..BackupSummary::default()
                        }
                    }
                };
                report.backup = Some(summary);
                ReconcileState::Done
            }

            terminal @ (ReconcileState::Done | ReconcileState::Fatal(_)) => terminal,
        };
    }

    if state == ReconcileState::Done {
        if let Some(password) = &ctx.bootstrap_admin_password {
            match ensure_bootstrap_admin(ctx.storage.conn(), password, ctx.bcrypt_cost).await {
                Ok(created) => report.bootstrap_admin_created = created,
                Err(e) => warn!(error = %e, "bootstrap admin not created"),
            }
        }
    }

    match &state {
        ReconcileState::Fatal(reason) => error!(reason = %reason, "reconcile failed"),
        _ => info!(steps = ?report.steps, "reconcile finished"),
    }
    report.final_state = state;
    report.finished_at = OffsetDateTime::now_utc();
    report
}

/// Empty database with nothing migrated (skipped or failed): restore the
/// newest dump only when backups are enabled and one exists.
async fn restore_or_done(ctx: &ReconcileContext<'_>, backup_enabled: bool) -> ReconcileState {
    if !backup_enabled {
        return ReconcileState::Done;
    }
    match ctx.backups.latest().await {
        Ok(Some(_)) => ReconcileState::AttemptRestore,
        Ok(None) => ReconcileState::Done,
        Err(e) => {
            warn!(error = %e, "backup directory unreadable, skipping restore");
            ReconcileState::Done
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_names_and_serialization() {
        assert_eq!(ReconcileState::AttemptRestore.name(), "attempt_restore");
        assert!(ReconcileState::Fatal("x".into()).is_terminal());
        assert!(!ReconcileState::Backup.is_terminal());

        let json = serde_json::to_value(ReconcileState::Fatal("no db".into())).unwrap();
        assert_eq!(json["state"], "fatal");
        assert_eq!(json["reason"], "no db");
        assert_eq!(serde_json::to_value(ReconcileState::Done).unwrap()["state"], "done");
    }
}
