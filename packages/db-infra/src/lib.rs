//! Database backend selection, schema initialization and cross-process locks.
//! Shared by the backend and the maintenance CLI.

pub mod config;
pub mod error;
pub mod infra;

pub use config::db::{Backend, ConnectSettings, Dialect};
pub use error::{DbInfraError, StorageError};
pub use infra::db::core::{
    acquire_with_backoff, connect, initialize_schema, open_legacy_readonly, sanitize_db_url,
};
pub use infra::db::locking::{lock_for, BootstrapLock, Guard, StorageLock};
pub use infra::db::schema_check::TableShape;
