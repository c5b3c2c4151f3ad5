use std::path::PathBuf;

use sea_orm::DbErr;
use thiserror::Error;

/// Configuration and coordination failures raised before any query runs.
#[derive(Debug, Error)]
pub enum DbInfraError {
    #[error("Configuration error: {message}")]
    Config { message: String },
    #[error("Lock error: {message}")]
    Lock { message: String },
}

impl DbInfraError {
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    pub fn lock(message: impl Into<String>) -> Self {
        Self::Lock {
            message: message.into(),
        }
    }
}

/// Errors surfaced by opening and initializing the active database.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("database at {target} is unreachable: {reason}")]
    ConnectionRefused { target: String, reason: String },
    #[error("table `{table}` is missing expected columns: {}", missing.join(", "))]
    SchemaConflict { table: String, missing: Vec<String> },
    #[error("legacy store {} cannot be opened: {reason}", path.display())]
    LegacyUnavailable { path: PathBuf, reason: String },
    #[error(transparent)]
    Infra(#[from] DbInfraError),
    #[error("database error: {0}")]
    Db(#[from] DbErr),
}
