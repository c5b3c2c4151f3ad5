//! Startup reconciliation and the maintenance operations it is built from.
//!
//! Everything here runs either once before the HTTP server binds
//! ([`startup::reconcile`]) or on explicit admin request.

pub mod backup;
pub mod backup_flag;
pub mod images;
pub mod migrator;
pub mod startup;
pub mod tables;

pub use backup::{
    BackupConfig, BackupError, BackupHandle, BackupManager, DumpFormat, RestoreError, RestoreMode,
    ToolChoice,
};
pub use images::{ImagePolicy, ImageReport, RepairSummary};
pub use migrator::{migrate_if_needed, MigrationOutcome, SkipReason};
pub use startup::{reconcile, ReconcileContext, ReconcileReport, ReconcileState};
pub use tables::{count_rows, TableCounts, TRACKED_TABLES};
