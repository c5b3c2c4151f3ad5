use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use sea_orm::{
    ConnectOptions, ConnectionTrait, Database, DatabaseBackend, DatabaseConnection, Statement,
};
use tracing::{debug, warn};
use xxhash_rust::xxh3::xxh3_64;

use crate::config::db::{Backend, ConnectSettings};
use crate::error::DbInfraError;
use crate::infra::db::core::sanitize_db_url;

pub fn lock_id(key: &str) -> i64 {
    xxh3_64(key.as_bytes()) as i64
}

/// A held cross-process lock. Call [`Guard::release`] when done; dropping a
/// guard releases file locks but leaves server locks to the session teardown.
pub struct Guard {
    held: Held,
    released: bool,
}

enum Held {
    Advisory { conn: DatabaseConnection, key: i64 },
    Named { conn: DatabaseConnection, name: String },
    File { file: File, path: PathBuf },
    Noop,
}

impl Guard {
    fn new(held: Held) -> Self {
        Self {
            held,
            released: false,
        }
    }

    pub async fn release(mut self) -> Result<(), DbInfraError> {
        if self.released {
            return Ok(());
        }
        self.released = true;

        match std::mem::replace(&mut self.held, Held::Noop) {
            Held::Advisory { conn, key } => {
                let stmt = Statement::from_sql_and_values(
                    DatabaseBackend::Postgres,
                    "SELECT pg_advisory_unlock($1) AS unlocked",
                    vec![key.into()],
                );
                match conn.query_one(stmt).await {
                    Ok(Some(row)) => {
                        let unlocked: bool = row.try_get("", "unlocked").map_err(|e| {
                            DbInfraError::lock(format!("failed to read unlock result: {e}"))
                        })?;
                        if !unlocked {
                            warn!(code = "PG_UNLOCK_FALSE", lock_key = key, "advisory unlock returned false");
                        }
                    }
                    Ok(None) => warn!(lock_key = key, "no result from advisory unlock"),
                    Err(e) => warn!(error = %e, lock_key = key, "failed to unlock advisory lock"),
                }
                let _ = conn.close().await;
            }
            Held::Named { conn, name } => {
                let stmt = Statement::from_sql_and_values(
                    DatabaseBackend::MySql,
                    "SELECT RELEASE_LOCK(?) AS released",
                    vec![name.clone().into()],
                );
                if let Err(e) = conn.execute(stmt).await {
                    warn!(error = %e, lock_name = %name, "failed to release named lock");
                }
                let _ = conn.close().await;
            }
            Held::File { file, path } => {
                use fs4::fs_std::FileExt;
                if let Err(e) = FileExt::unlock(&file) {
                    // the handle is closed right after, which drops the lock anyway
                    debug!(error = %e, lock_path = %path.display(), "file unlock returned error");
                } else {
                    debug!(lock_path = %path.display(), "file lock released");
                }
            }
            Held::Noop => {}
        }
        Ok(())
    }
}

/// Non-blocking lock acquisition; the caller owns backoff and timeout.
#[async_trait]
pub trait BootstrapLock: Send {
    /// `Some(guard)` when acquired, `None` when another holder has it.
    async fn try_acquire(&mut self) -> Result<Option<Guard>, DbInfraError>;
}

/// PostgreSQL session advisory lock.
///
/// The connection must be a dedicated single-connection pool so that lock and
/// unlock run on the same session.
pub struct PgAdvisoryLock {
    conn: DatabaseConnection,
    lock_key: i64,
}

impl PgAdvisoryLock {
    pub fn new(conn: DatabaseConnection, key: &str) -> Self {
        Self {
            conn,
            lock_key: lock_id(key),
        }
    }
}

#[async_trait]
impl BootstrapLock for PgAdvisoryLock {
    async fn try_acquire(&mut self) -> Result<Option<Guard>, DbInfraError> {
        let stmt = Statement::from_sql_and_values(
            DatabaseBackend::Postgres,
            "SELECT pg_try_advisory_lock($1) AS locked",
            vec![self.lock_key.into()],
        );

        let row = self
            .conn
            .query_one(stmt)
            .await
            .map_err(|e| DbInfraError::lock(format!("failed to acquire advisory lock: {e}")))?
            .ok_or_else(|| DbInfraError::lock("pg_try_advisory_lock returned no row"))?;

        let locked: bool = row
            .try_get("", "locked")
            .map_err(|e| DbInfraError::lock(format!("failed to read lock result: {e}")))?;

        Ok(locked.then(|| {
            Guard::new(Held::Advisory {
                conn: self.conn.clone(),
                key: self.lock_key,
            })
        }))
    }
}

/// MySQL/MariaDB named lock (`GET_LOCK`), scoped to a dedicated session.
pub struct MySqlNamedLock {
    conn: DatabaseConnection,
    name: String,
}

impl MySqlNamedLock {
    pub fn new(conn: DatabaseConnection, key: &str) -> Self {
        // lock names are capped at 64 characters
        Self {
            conn,
            name: format!("clubhouse:{:016x}", lock_id(key)),
        }
    }
}

#[async_trait]
impl BootstrapLock for MySqlNamedLock {
    async fn try_acquire(&mut self) -> Result<Option<Guard>, DbInfraError> {
        let stmt = Statement::from_sql_and_values(
            DatabaseBackend::MySql,
            "SELECT GET_LOCK(?, 0) AS locked",
            vec![self.name.clone().into()],
        );

        let row = self
            .conn
            .query_one(stmt)
            .await
            .map_err(|e| DbInfraError::lock(format!("failed to acquire named lock: {e}")))?
            .ok_or_else(|| DbInfraError::lock("GET_LOCK returned no row"))?;

        let locked: Option<i64> = row
            .try_get("", "locked")
            .map_err(|e| DbInfraError::lock(format!("failed to read lock result: {e}")))?;

        Ok((locked == Some(1)).then(|| {
            Guard::new(Held::Named {
                conn: self.conn.clone(),
                name: self.name.clone(),
            })
        }))
    }
}

/// OS-level exclusive lock on a sidecar file next to the SQLite database.
pub struct SqliteFileLock {
    lock_path: PathBuf,
}

impl SqliteFileLock {
    pub fn new(lock_path: &Path) -> Self {
        Self {
            lock_path: lock_path.to_path_buf(),
        }
    }
}

#[async_trait]
impl BootstrapLock for SqliteFileLock {
    async fn try_acquire(&mut self) -> Result<Option<Guard>, DbInfraError> {
        use fs4::fs_std::FileExt;

        if let Some(parent) = self.lock_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                DbInfraError::lock(format!("failed to create lock file directory: {e}"))
            })?;
        }

        let file = OpenOptions::new()
            .create(true)
            .truncate(true)
            .read(true)
            .write(true)
            .open(&self.lock_path)
            .map_err(|e| DbInfraError::lock(format!("failed to open lock file: {e}")))?;

        match file.try_lock_exclusive() {
            Ok(true) => {
                debug!(lock_path = %self.lock_path.display(), "file lock acquired");
                Ok(Some(Guard::new(Held::File {
                    file,
                    path: self.lock_path.clone(),
                })))
            }
            Ok(false) => Ok(None),
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => Ok(None),
            Err(e) => Err(DbInfraError::lock(format!(
                "failed to acquire file lock {}: {e}",
                self.lock_path.display()
            ))),
        }
    }
}

/// No-op lock for in-memory databases, which are private to one process.
pub struct InMemoryLock;

#[async_trait]
impl BootstrapLock for InMemoryLock {
    async fn try_acquire(&mut self) -> Result<Option<Guard>, DbInfraError> {
        Ok(Some(Guard::new(Held::Noop)))
    }
}

/// The lock matching whatever database a connection points at.
pub enum StorageLock {
    Postgres(PgAdvisoryLock),
    MySql(MySqlNamedLock),
    File(SqliteFileLock),
    Memory(InMemoryLock),
}

#[async_trait]
impl BootstrapLock for StorageLock {
    async fn try_acquire(&mut self) -> Result<Option<Guard>, DbInfraError> {
        match self {
            StorageLock::Postgres(lock) => lock.try_acquire().await,
            StorageLock::MySql(lock) => lock.try_acquire().await,
            StorageLock::File(lock) => lock.try_acquire().await,
            StorageLock::Memory(lock) => lock.try_acquire().await,
        }
    }
}

/// Build the lock for `purpose` (e.g. `schema`, `restore`) on the database
/// behind `conn`. Server locks get their own single-connection pool.
pub async fn lock_for(
    conn: &DatabaseConnection,
    backend: &Backend,
    purpose: &str,
    settings: &ConnectSettings,
) -> Result<StorageLock, DbInfraError> {
    match conn.get_database_backend() {
        DatabaseBackend::Sqlite => match sqlite_main_file(conn).await? {
            Some(file) => {
                let lock_path = PathBuf::from(format!("{}.{purpose}.lock", file.display()));
                Ok(StorageLock::File(SqliteFileLock::new(&lock_path)))
            }
            None => Ok(StorageLock::Memory(InMemoryLock)),
        },
        db_backend @ (DatabaseBackend::Postgres | DatabaseBackend::MySql) => {
            let Backend::Server { url, .. } = backend else {
                return Err(DbInfraError::config(
                    "server connection without a server backend descriptor",
                ));
            };
            let key = format!("clubhouse:{purpose}:{}", sanitize_db_url(url));
            let lock_conn = session_connection(url, settings).await?;
            Ok(if db_backend == DatabaseBackend::Postgres {
                StorageLock::Postgres(PgAdvisoryLock::new(lock_conn, &key))
            } else {
                StorageLock::MySql(MySqlNamedLock::new(lock_conn, &key))
            })
        }
    }
}

async fn session_connection(
    url: &str,
    settings: &ConnectSettings,
) -> Result<DatabaseConnection, DbInfraError> {
    let mut opt = ConnectOptions::new(url);
    opt.min_connections(1)
        .max_connections(1)
        .connect_timeout(settings.connect_timeout)
        .acquire_timeout(settings.connect_timeout)
        .sqlx_logging(false);

    Database::connect(opt).await.map_err(|e| {
        DbInfraError::lock(format!(
            "failed to open lock session on {}: {e}",
            sanitize_db_url(url)
        ))
    })
}

/// Path of the main database file, or `None` for in-memory databases.
async fn sqlite_main_file(conn: &DatabaseConnection) -> Result<Option<PathBuf>, DbInfraError> {
    let row = conn
        .query_one(Statement::from_string(
            DatabaseBackend::Sqlite,
            "SELECT file FROM pragma_database_list WHERE name = 'main'",
        ))
        .await
        .map_err(|e| DbInfraError::lock(format!("failed to locate database file: {e}")))?;

    let file: Option<String> = match row {
        Some(row) => row.try_get("", "file").ok(),
        None => None,
    };
    Ok(file.filter(|f| !f.is_empty()).map(PathBuf::from))
}
