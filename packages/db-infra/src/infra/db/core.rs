use std::future::Future;
use std::path::Path;
use std::time::{Duration, Instant};

use migration::{migrate, MigrationCommand};
use rand::Rng;
use sea_orm::{ConnectOptions, Database, DatabaseConnection};
use sqlx::sqlite::SqliteJournalMode;
use tracing::{info, trace, warn};

use crate::config::db::{Backend, ConnectSettings};
use crate::error::{DbInfraError, StorageError};
use crate::infra::db::locking::{lock_for, BootstrapLock, Guard};
use crate::infra::db::schema_check::{self, TableShape};

async fn retry_connection<T, F, Fut>(
    mut connect_fn: F,
    max_attempts: u32,
    interval: Duration,
) -> Result<T, StorageError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, StorageError>>,
{
    let mut last_error = None;

    for attempt in 1..=max_attempts {
        match connect_fn().await {
            Ok(result) => {
                if attempt > 1 {
                    info!(
                        "connection_retry=success attempts={} interval_ms={}",
                        attempt,
                        interval.as_millis()
                    );
                }
                return Ok(result);
            }
            Err(e) => {
                last_error = Some(e);
                if attempt < max_attempts {
                    warn!(
                        "connection_retry=failed attempt={} max_attempts={} interval_ms={}",
                        attempt,
                        max_attempts,
                        interval.as_millis()
                    );
                    tokio::time::sleep(interval).await;
                }
            }
        }
    }

    Err(last_error.unwrap_or_else(|| {
        StorageError::Infra(DbInfraError::config(
            "no connection attempt was made (max_attempts is zero)",
        ))
    }))
}

/// Open the pool for the active backend.
///
/// Server backends are retried with a bounded attempt count and every attempt
/// carries an explicit connect timeout, so an unreachable host fails startup
/// instead of hanging it.
pub async fn connect(
    backend: &Backend,
    settings: &ConnectSettings,
) -> Result<DatabaseConnection, StorageError> {
    let target = backend.display_target();
    let mut opt = ConnectOptions::new(backend.connection_url());
    opt.max_connections(settings.max_connections)
        .connect_timeout(settings.connect_timeout)
        .acquire_timeout(settings.connect_timeout)
        .sqlx_logging(false);

    let conn = match backend {
        Backend::Embedded { path } => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent).map_err(|e| StorageError::ConnectionRefused {
                    target: target.clone(),
                    reason: format!("cannot create database directory: {e}"),
                })?;
            }
            opt.map_sqlx_sqlite_opts(|o| {
                o.create_if_missing(true)
                    .foreign_keys(true)
                    .journal_mode(SqliteJournalMode::Wal)
                    .busy_timeout(Duration::from_secs(5))
            });
            Database::connect(opt)
                .await
                .map_err(|e| StorageError::ConnectionRefused {
                    target: target.clone(),
                    reason: e.to_string(),
                })?
        }
        Backend::Server { .. } => {
            retry_connection(
                || {
                    let opt = opt.clone();
                    let target = target.clone();
                    async move {
                        Database::connect(opt)
                            .await
                            .map_err(|e| StorageError::ConnectionRefused {
                                target,
                                reason: e.to_string(),
                            })
                    }
                },
                settings.max_attempts,
                settings.retry_interval,
            )
            .await?
        }
    };

    info!(backend = backend.kind(), target = %target, "database connected");
    Ok(conn)
}

/// Open a legacy embedded store without any chance of writing to it.
pub async fn open_legacy_readonly(path: &Path) -> Result<DatabaseConnection, StorageError> {
    let mut opt = ConnectOptions::new(format!("sqlite://{}?mode=ro", path.display()));
    opt.max_connections(1)
        .min_connections(1)
        .sqlx_logging(false);
    opt.map_sqlx_sqlite_opts(|o| o.read_only(true).create_if_missing(false));

    Database::connect(opt)
        .await
        .map_err(|e| StorageError::LegacyUnavailable {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
}

/// Sanitize database URL by masking password in connection strings.
/// Used for generating lock keys and logging.
pub fn sanitize_db_url(url: &str) -> String {
    let Some((auth_part, host_part)) = url.rsplit_once('@') else {
        return url.to_string();
    };
    let Some((scheme, credentials)) = auth_part.split_once("://") else {
        return url.to_string();
    };
    match credentials.split_once(':') {
        Some((user, _)) => format!("{scheme}://{user}:***@{host_part}"),
        None => url.to_string(),
    }
}

/// Poll `lock` with exponential backoff plus jitter until acquired or
/// `timeout` elapses.
pub async fn acquire_with_backoff<L>(lock: &mut L, timeout: Duration) -> Result<Guard, DbInfraError>
where
    L: BootstrapLock + ?Sized,
{
    let start = Instant::now();
    let mut attempts: u32 = 0;

    loop {
        attempts += 1;

        if let Some(guard) = lock.try_acquire().await? {
            trace!(
                lock = "won",
                attempts = attempts,
                elapsed_ms = start.elapsed().as_millis()
            );
            return Ok(guard);
        }

        if start.elapsed() >= timeout {
            return Err(DbInfraError::lock(format!(
                "lock acquisition timeout after {:?} ({} attempts)",
                start.elapsed(),
                attempts
            )));
        }

        let base_delay_ms = (5u64 << attempts.saturating_sub(1).min(8)).min(80);
        let jitter_ms = rand::rng().random::<u64>() % 4;
        trace!(
            lock = "backoff",
            attempts = attempts,
            delay_ms = base_delay_ms + jitter_ms
        );
        tokio::time::sleep(Duration::from_millis(base_delay_ms + jitter_ms)).await;
    }
}

/// Create every required table if absent and verify existing shapes.
///
/// Idempotent; never drops or truncates. Tables that already exist with
/// missing columns fail with [`StorageError::SchemaConflict`] before any DDL
/// runs. Extra columns are tolerated.
pub async fn initialize_schema(
    conn: &DatabaseConnection,
    backend: &Backend,
    settings: &ConnectSettings,
    shapes: &[TableShape],
) -> Result<(), StorageError> {
    schema_check::verify_existing(conn, shapes).await?;

    let mut lock = lock_for(conn, backend, "schema", settings).await?;
    let guard = acquire_with_backoff(&mut lock, settings.lock_timeout).await?;

    let started = Instant::now();
    let result = migrate(conn, MigrationCommand::Up).await;

    if let Err(e) = guard.release().await {
        warn!(error = %e, "failed to release schema lock");
    }
    result?;

    schema_check::verify_complete(conn, shapes).await?;
    info!(
        backend = backend.kind(),
        tables = shapes.len(),
        elapsed_ms = started.elapsed().as_millis(),
        "schema initialized"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_masks_password_only() {
        assert_eq!(
            sanitize_db_url("postgres://club:s3cret@db:5432/club"),
            "postgres://club:***@db:5432/club"
        );
        assert_eq!(
            sanitize_db_url("postgres://db:5432/club"),
            "postgres://db:5432/club"
        );
        assert_eq!(sanitize_db_url("sqlite://data/club.db"), "sqlite://data/club.db");
    }

    #[tokio::test]
    async fn unreachable_server_is_connection_refused() {
        let backend = Backend::Server {
            dialect: crate::config::db::Dialect::Postgres,
            url: "postgres://club:pw@127.0.0.1:1/club".to_string(),
        };
        let settings = ConnectSettings {
            connect_timeout: Duration::from_millis(300),
            max_attempts: 2,
            retry_interval: Duration::from_millis(10),
            ..ConnectSettings::default()
        };

        let err = connect(&backend, &settings).await.unwrap_err();
        match err {
            StorageError::ConnectionRefused { target, .. } => {
                assert!(!target.contains("pw"));
            }
            other => panic!("expected ConnectionRefused, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn embedded_connect_creates_missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("club.db");
        let backend = Backend::Embedded { path: path.clone() };

        let conn = connect(&backend, &ConnectSettings::default()).await.unwrap();
        conn.close().await.unwrap();
        assert!(path.exists());
    }
}
