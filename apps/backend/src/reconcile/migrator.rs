//! One-shot copy of a legacy embedded store into an empty server database.

use std::path::Path;

use db_infra::{open_legacy_readonly, StorageError};
use sea_orm::{
    ActiveModelTrait, ConnectionTrait, DatabaseBackend, DatabaseConnection, DbErr, EntityTrait,
    IntoActiveModel, Statement, TransactionTrait,
};
use serde::Serialize;
use tracing::{error, info, warn};

use super::tables::{count_rows, insert_rows, resync_sequences, TableCounts, TRACKED_TABLES};
use crate::entities::{articles, members, reservations};
use crate::storage::Storage;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// Only server targets are migrated into.
    EmbeddedBackend,
    /// The target already holds club data.
    TargetNotEmpty,
    LegacyMissing,
    /// The legacy file exists but has zero bytes.
    LegacyEmpty,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum MigrationOutcome {
    Skipped {
        reason: SkipReason,
    },
    Migrated {
        rows: TableCounts,
    },
    /// `table` rolled back; tables before it in foreign-key order stay copied.
    Failed {
        table: String,
        reason: String,
        copied: TableCounts,
    },
}

impl MigrationOutcome {
    pub fn is_failed(&self) -> bool {
        matches!(self, MigrationOutcome::Failed { .. })
    }
}

/// Copy every tracked table from `legacy_path` when the target is a server
/// database with no club data yet.
///
/// Never writes to or deletes the legacy file. Infrastructure failures that
/// happen before any row is copied come back as `Err`.
pub async fn migrate_if_needed(
    storage: &Storage,
    legacy_path: &Path,
) -> Result<MigrationOutcome, StorageError> {
    if !storage.backend().is_server() {
        return Ok(skipped(SkipReason::EmbeddedBackend));
    }

    let target_counts = count_rows(storage.conn()).await?;
    if !target_counts.is_empty() {
        return Ok(skipped(SkipReason::TargetNotEmpty));
    }

    match std::fs::metadata(legacy_path) {
        Err(_) => return Ok(skipped(SkipReason::LegacyMissing)),
        Ok(meta) if meta.len() == 0 => return Ok(skipped(SkipReason::LegacyEmpty)),
        Ok(_) => {}
    }

    info!(legacy = %legacy_path.display(), target = %storage.backend().display_target(), "migrating legacy data");
    let legacy = open_legacy_readonly(legacy_path).await?;
    let outcome = copy_all(&legacy, storage.conn()).await;
    if let Err(e) = legacy.close().await {
        warn!(error = %e, "failed to close legacy store");
    }

    match &outcome {
        MigrationOutcome::Migrated { rows } => info!(
            members = rows.members,
            reservations = rows.reservations,
            articles = rows.articles,
            "legacy migration complete"
        ),
        MigrationOutcome::Failed { table, reason, .. } => {
            error!(table = %table, reason = %reason, "legacy migration failed")
        }
        MigrationOutcome::Skipped { .. } => {}
    }
    Ok(outcome)
}

fn skipped(reason: SkipReason) -> MigrationOutcome {
    info!(reason = ?reason, "legacy migration skipped");
    MigrationOutcome::Skipped { reason }
}

async fn copy_all(legacy: &DatabaseConnection, target: &DatabaseConnection) -> MigrationOutcome {
    let mut copied = TableCounts::default();

    for table in TRACKED_TABLES {
        let result = match table {
            "members" => copy_table::<members::Entity>(legacy, target, table).await,
            "reservations" => copy_table::<reservations::Entity>(legacy, target, table).await,
            _ => copy_table::<articles::Entity>(legacy, target, table).await,
        };

        match result {
            Ok(rows) => copied.set(table, rows),
            Err(e) => {
                return MigrationOutcome::Failed {
                    table: table.to_string(),
                    reason: e.to_string(),
                    copied,
                }
            }
        }
    }

    if let Err(e) = resync_sequences(target).await {
        return MigrationOutcome::Failed {
            table: "sequences".to_string(),
            reason: e.to_string(),
            copied,
        };
    }

    MigrationOutcome::Migrated { rows: copied }
}

/// One transaction per table; a failure rolls back only this table.
async fn copy_table<E>(
    legacy: &DatabaseConnection,
    target: &DatabaseConnection,
    table: &str,
) -> Result<u64, DbErr>
where
    E: EntityTrait,
    E::Model: IntoActiveModel<E::ActiveModel>,
    E::ActiveModel: ActiveModelTrait<Entity = E> + Send,
{
    if !legacy_has_table(legacy, table).await? {
        warn!(table, "table absent from legacy store, counted as empty");
        return Ok(0);
    }

    let rows = E::find().all(legacy).await?;
    if rows.is_empty() {
        return Ok(0);
    }

    let txn = target.begin().await?;
    let written = insert_rows::<E, _>(&txn, rows).await?;
    txn.commit().await?;
    info!(table, rows = written, "table copied");
    Ok(written)
}

async fn legacy_has_table(legacy: &DatabaseConnection, table: &str) -> Result<bool, DbErr> {
    let row = legacy
        .query_one(Statement::from_sql_and_values(
            DatabaseBackend::Sqlite,
            "SELECT COUNT(*) AS n FROM sqlite_master WHERE type = 'table' AND name = ?",
            vec![table.into()],
        ))
        .await?;
    let n: i64 = match row {
        Some(row) => row.try_get("", "n")?,
        None => 0,
    };
    Ok(n > 0)
}
