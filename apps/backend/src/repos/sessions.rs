use std::time::Duration;

use sea_orm::{ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, Set};
use time::OffsetDateTime;
use ulid::Ulid;

use crate::entities::sessions::{self, Model as Session};
use crate::errors::domain::DomainError;
use crate::infra::db_errors::map_db_err;

pub async fn create_session<C: ConnectionTrait + Send + Sync>(
    conn: &C,
    member_id: i64,
    ttl: Duration,
) -> Result<Session, DomainError> {
    let now = OffsetDateTime::now_utc();
    let row = sessions::ActiveModel {
        id: Set(Ulid::new().to_string()),
        member_id: Set(member_id),
        created_at: Set(now),
        expires_at: Set(now + ttl),
    };
    row.insert(conn).await.map_err(map_db_err)
}

/// The session, if it exists and has not expired.
pub async fn find_live<C: ConnectionTrait + Send + Sync>(
    conn: &C,
    id: &str,
) -> Result<Option<Session>, DomainError> {
    let session = sessions::Entity::find_by_id(id.to_string())
        .one(conn)
        .await
        .map_err(map_db_err)?;
    Ok(session.filter(|s| s.expires_at > OffsetDateTime::now_utc()))
}

pub async fn delete_session<C: ConnectionTrait + Send + Sync>(
    conn: &C,
    id: &str,
) -> Result<bool, DomainError> {
    let result = sessions::Entity::delete_by_id(id.to_string())
        .exec(conn)
        .await
        .map_err(map_db_err)?;
    Ok(result.rows_affected > 0)
}

pub async fn purge_expired<C: ConnectionTrait + Send + Sync>(conn: &C) -> Result<u64, DomainError> {
    let result = sessions::Entity::delete_many()
        .filter(sessions::Column::ExpiresAt.lte(OffsetDateTime::now_utc()))
        .exec(conn)
        .await
        .map_err(map_db_err)?;
    Ok(result.rows_affected)
}
