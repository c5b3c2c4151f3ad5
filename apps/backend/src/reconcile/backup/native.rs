//! Portable JSON dump of the tracked tables. Works on every backend and is
//! the only strategy for the embedded store.

use std::path::Path;

use async_trait::async_trait;
use sea_orm::{EntityTrait, QueryOrder, TransactionTrait};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tracing::info;

use super::{BackupError, DumpFormat, DumpTool, RestoreError, RestoreMode};
use crate::entities::{articles, members, reservations, sessions};
use crate::reconcile::tables::{count_rows, insert_rows, resync_sequences};
use crate::storage::Storage;

pub const FORMAT_TAG: &str = "clubhouse-dump";
pub const FORMAT_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
pub struct NativeDocument {
    pub format: String,
    pub version: u32,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    pub backend: String,
    pub members: Vec<members::Model>,
    pub reservations: Vec<reservations::Model>,
    pub articles: Vec<articles::Model>,
}

impl NativeDocument {
    fn rows(&self) -> u64 {
        (self.members.len() + self.reservations.len() + self.articles.len()) as u64
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NativeDump;

#[async_trait]
impl DumpTool for NativeDump {
    fn format(&self) -> DumpFormat {
        DumpFormat::Json
    }

    fn name(&self) -> &'static str {
        "native"
    }

    async fn dump(&self, storage: &Storage, dest: &Path) -> Result<(), BackupError> {
        // one transaction so the three tables are read from the same snapshot
        let txn = storage.conn().begin().await?;
        let document = NativeDocument {
            format: FORMAT_TAG.to_string(),
            version: FORMAT_VERSION,
            created_at: OffsetDateTime::now_utc(),
            backend: storage.backend().kind().to_string(),
            members: members::Entity::find()
                .order_by_asc(members::Column::Id)
                .all(&txn)
                .await?,
            reservations: reservations::Entity::find()
                .order_by_asc(reservations::Column::Id)
                .all(&txn)
                .await?,
            articles: articles::Entity::find()
                .order_by_asc(articles::Column::Id)
                .all(&txn)
                .await?,
        };
        txn.commit().await?;

        let bytes = serde_json::to_vec_pretty(&document)?;
        tokio::fs::write(dest, &bytes)
            .await
            .map_err(|source| BackupError::Io {
                path: dest.to_path_buf(),
                source,
            })?;
        info!(rows = document.rows(), file = %dest.display(), "native dump written");
        Ok(())
    }

    async fn load(
        &self,
        storage: &Storage,
        src: &Path,
        mode: RestoreMode,
    ) -> Result<(), RestoreError> {
        let document = read_document(src).await?;
        let conn = storage.conn();

        let txn = conn.begin().await?;
        match mode {
            RestoreMode::Automatic => {
                let counts = count_rows(&txn).await?;
                if !counts.is_empty() {
                    return Err(RestoreError::NotEmpty {
                        rows: counts.total(),
                    });
                }
            }
            RestoreMode::Manual => {
                articles::Entity::delete_many().exec(&txn).await?;
                reservations::Entity::delete_many().exec(&txn).await?;
                sessions::Entity::delete_many().exec(&txn).await?;
                members::Entity::delete_many().exec(&txn).await?;
            }
        }

        let rows = document.rows();
        insert_rows::<members::Entity, _>(&txn, document.members).await?;
        insert_rows::<reservations::Entity, _>(&txn, document.reservations).await?;
        insert_rows::<articles::Entity, _>(&txn, document.articles).await?;
        resync_sequences(&txn).await?;
        txn.commit().await?;

        info!(rows, file = %src.display(), mode = ?mode, "native dump restored");
        Ok(())
    }
}

async fn read_document(src: &Path) -> Result<NativeDocument, RestoreError> {
    let bytes = tokio::fs::read(src)
        .await
        .map_err(|source| RestoreError::Io {
            path: src.to_path_buf(),
            source,
        })?;
    let format_err = |detail: String| RestoreError::Format {
        path: src.to_path_buf(),
        detail,
    };

    let document: NativeDocument =
        serde_json::from_slice(&bytes).map_err(|e| format_err(e.to_string()))?;
    if document.format != FORMAT_TAG {
        return Err(format_err(format!("unknown dump format `{}`", document.format)));
    }
    if document.version > FORMAT_VERSION {
        return Err(format_err(format!(
            "dump version {} is newer than supported version {FORMAT_VERSION}",
            document.version
        )));
    }
    Ok(document)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn foreign_json_is_a_format_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("club_backup_20250101_000000.json");
        tokio::fs::write(&path, br#"{"format":"other","version":1}"#)
            .await
            .unwrap();

        match read_document(&path).await {
            Err(RestoreError::Format { detail, .. }) => assert!(!detail.is_empty()),
            other => panic!("expected format error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn newer_version_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dump.json");
        let doc = serde_json::json!({
            "format": FORMAT_TAG,
            "version": FORMAT_VERSION + 1,
            "created_at": "2025-01-01T00:00:00Z",
            "backend": "sqlite",
            "members": [],
            "reservations": [],
            "articles": []
        });
        tokio::fs::write(&path, serde_json::to_vec(&doc).unwrap())
            .await
            .unwrap();

        assert!(matches!(
            read_document(&path).await,
            Err(RestoreError::Format { .. })
        ));
    }
}
