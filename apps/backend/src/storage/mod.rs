//! The active database target plus the image file host.
//!
//! A process talks to exactly one database. [`Storage`] pairs the
//! [`Backend`] chosen at startup with its live connection so callers never
//! re-derive the dialect.

pub mod file_host;
pub mod ftp_host;

use db_infra::{connect, initialize_schema, Backend, ConnectSettings, StorageError, TableShape};
use sea_orm::{DatabaseConnection, EntityTrait, Iterable};
use sea_orm::IdenStatic;
use tracing::info;

use crate::entities::{app_settings, articles, members, reservations, sessions};

pub use file_host::{FileHost, HostError, LocalFileHost};
pub use ftp_host::{FtpFileHost, FtpHostConfig};

#[derive(Clone, Debug)]
pub struct Storage {
    backend: Backend,
    settings: ConnectSettings,
    conn: DatabaseConnection,
}

impl Storage {
    /// Connect to the configured backend. Unreachable servers fail with
    /// [`StorageError::ConnectionRefused`] after the bounded retry.
    pub async fn open(backend: Backend, settings: ConnectSettings) -> Result<Self, StorageError> {
        let conn = connect(&backend, &settings).await?;
        Ok(Self {
            backend,
            settings,
            conn,
        })
    }

    /// Wrap an already open connection. `backend` still decides the logical
    /// kind (embedded or server) used by migration and backup policy.
    pub fn from_connection(
        backend: Backend,
        settings: ConnectSettings,
        conn: DatabaseConnection,
    ) -> Self {
        Self {
            backend,
            settings,
            conn,
        }
    }

    pub fn backend(&self) -> &Backend {
        &self.backend
    }

    pub fn settings(&self) -> &ConnectSettings {
        &self.settings
    }

    pub fn conn(&self) -> &DatabaseConnection {
        &self.conn
    }

    /// Create missing tables and verify existing ones. Safe to call on every
    /// start; never drops or truncates anything.
    pub async fn initialize(&self) -> Result<(), StorageError> {
        initialize_schema(&self.conn, &self.backend, &self.settings, &required_tables()).await?;
        info!(backend = self.backend.kind(), "storage ready");
        Ok(())
    }

    pub async fn close(self) -> Result<(), StorageError> {
        self.conn.close().await?;
        Ok(())
    }
}

fn shape_of<E>() -> TableShape
where
    E: EntityTrait,
{
    TableShape::new(
        E::default().table_name(),
        E::Column::iter().map(|c| c.as_str().to_string()),
    )
}

/// Every table the application reads or writes, with the columns it expects.
pub fn required_tables() -> Vec<TableShape> {
    vec![
        shape_of::<members::Entity>(),
        shape_of::<reservations::Entity>(),
        shape_of::<articles::Entity>(),
        shape_of::<sessions::Entity>(),
        shape_of::<app_settings::Entity>(),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn required_tables_follow_entities() {
        let tables = required_tables();
        let names: Vec<&str> = tables.iter().map(|t| t.table.as_str()).collect();
        assert_eq!(
            names,
            ["members", "reservations", "articles", "sessions", "app_settings"]
        );

        let members = &tables[0];
        assert!(members.columns.iter().any(|c| c == "password_hash"));
        assert!(members.columns.iter().any(|c| c == "is_trainer"));
    }
}
