use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, NotSet, PaginatorTrait,
    QueryFilter, QueryOrder, Set,
};
use time::OffsetDateTime;

use crate::entities::members::{self, MemberStatus, Model as Member};
use crate::errors::domain::{DomainError, NotFoundKind};
use crate::infra::db_errors::map_db_err;

/// Fields of a member row that the caller decides.
#[derive(Debug, Clone)]
pub struct NewMember {
    pub username: String,
    pub password_hash: String,
    pub full_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub status: MemberStatus,
    pub is_admin: bool,
    pub is_trainer: bool,
}

pub async fn create_member<C: ConnectionTrait + Send + Sync>(
    conn: &C,
    new: NewMember,
) -> Result<Member, DomainError> {
    let now = OffsetDateTime::now_utc();
    let row = members::ActiveModel {
        id: NotSet,
        username: Set(new.username),
        password_hash: Set(new.password_hash),
        full_name: Set(new.full_name),
        email: Set(new.email),
        phone: Set(new.phone),
        status: Set(new.status),
        is_admin: Set(new.is_admin),
        is_trainer: Set(new.is_trainer),
        created_at: Set(now),
        updated_at: Set(now),
    };
    row.insert(conn).await.map_err(map_db_err)
}

pub async fn find_by_id<C: ConnectionTrait + Send + Sync>(
    conn: &C,
    id: i64,
) -> Result<Option<Member>, DomainError> {
    members::Entity::find_by_id(id)
        .one(conn)
        .await
        .map_err(map_db_err)
}

pub async fn require_by_id<C: ConnectionTrait + Send + Sync>(
    conn: &C,
    id: i64,
) -> Result<Member, DomainError> {
    find_by_id(conn, id).await?.ok_or_else(|| {
        DomainError::not_found(NotFoundKind::Member, format!("Member {id} not found"))
    })
}

pub async fn find_by_username<C: ConnectionTrait + Send + Sync>(
    conn: &C,
    username: &str,
) -> Result<Option<Member>, DomainError> {
    members::Entity::find()
        .filter(members::Column::Username.eq(username))
        .one(conn)
        .await
        .map_err(map_db_err)
}

pub async fn list_members<C: ConnectionTrait + Send + Sync>(
    conn: &C,
    status: Option<MemberStatus>,
) -> Result<Vec<Member>, DomainError> {
    let mut query = members::Entity::find().order_by_asc(members::Column::Username);
    if let Some(status) = status {
        query = query.filter(members::Column::Status.eq(status));
    }
    query.all(conn).await.map_err(map_db_err)
}

pub async fn set_status<C: ConnectionTrait + Send + Sync>(
    conn: &C,
    id: i64,
    status: MemberStatus,
) -> Result<Member, DomainError> {
    let member = require_by_id(conn, id).await?;
    let mut row: members::ActiveModel = member.into();
    row.status = Set(status);
    row.updated_at = Set(OffsetDateTime::now_utc());
    row.update(conn).await.map_err(map_db_err)
}

pub async fn count_members<C: ConnectionTrait + Send + Sync>(conn: &C) -> Result<u64, DomainError> {
    members::Entity::find().count(conn).await.map_err(map_db_err)
}
