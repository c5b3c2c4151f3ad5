//! Persisted switch for startup backups, stored in `app_settings`.

use sea_orm::sea_query::OnConflict;
use sea_orm::{ConnectionTrait, DbErr, EntityTrait, Set};
use time::OffsetDateTime;
use tracing::info;

use crate::entities::app_settings;

pub const BACKUP_ENABLED_KEY: &str = "backup_enabled";

/// The persisted value, or `default` when it was never written.
pub async fn load<C>(conn: &C, default: bool) -> Result<bool, DbErr>
where
    C: ConnectionTrait,
{
    let row = app_settings::Entity::find_by_id(BACKUP_ENABLED_KEY.to_string())
        .one(conn)
        .await?;
    Ok(row.map(|r| parse_flag(&r.value)).unwrap_or(default))
}

pub async fn enable<C>(conn: &C) -> Result<(), DbErr>
where
    C: ConnectionTrait,
{
    set(conn, true).await
}

pub async fn disable<C>(conn: &C) -> Result<(), DbErr>
where
    C: ConnectionTrait,
{
    set(conn, false).await
}

/// Idempotent upsert.
pub async fn set<C>(conn: &C, enabled: bool) -> Result<(), DbErr>
where
    C: ConnectionTrait,
{
    let row = app_settings::ActiveModel {
        key: Set(BACKUP_ENABLED_KEY.to_string()),
        value: Set(enabled.to_string()),
        updated_at: Set(OffsetDateTime::now_utc()),
    };
    app_settings::Entity::insert(row)
        .on_conflict(
            OnConflict::column(app_settings::Column::Key)
                .update_columns([app_settings::Column::Value, app_settings::Column::UpdatedAt])
                .to_owned(),
        )
        .exec_without_returning(conn)
        .await?;
    info!(enabled, "backup flag updated");
    Ok(())
}

fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "true" | "1" | "yes" | "on"
    )
}
