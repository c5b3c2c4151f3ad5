pub mod core;
pub mod locking;
pub mod schema_check;

pub use core::{acquire_with_backoff, connect, initialize_schema, open_legacy_readonly};
pub use locking::{
    lock_for, BootstrapLock, Guard, InMemoryLock, MySqlNamedLock, PgAdvisoryLock, SqliteFileLock,
    StorageLock,
};
