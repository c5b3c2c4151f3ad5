use std::time::SystemTime;

use sea_orm::{ConnectionTrait, TransactionTrait};
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::auth::{
    hash_password, mint_session_token, normalize_username, validate_password, verify_password,
};
use crate::entities::members::{MemberStatus, Model as Member};
use crate::entities::sessions::Model as Session;
use crate::error::AppError;
use crate::errors::domain::{ConflictKind, DomainError};
use crate::errors::ErrorCode;
use crate::infra::db_errors::map_db_err;
use crate::repos::members::{self as members_repo, NewMember};
use crate::repos::sessions as sessions_repo;
use crate::state::security_config::SecurityConfig;

pub const BOOTSTRAP_ADMIN_USERNAME: &str = "admin";

#[derive(Debug, Clone, Deserialize)]
pub struct Registration {
    pub username: String,
    pub password: String,
    pub full_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
}

#[derive(Debug, Clone)]
pub struct LoginOutcome {
    pub member: Member,
    pub session: Session,
    pub token: String,
}

fn optional(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Register a new member. New members wait in `pending` until an admin
/// approves them.
pub async fn register<C: ConnectionTrait + Send + Sync>(
    conn: &C,
    registration: Registration,
    bcrypt_cost: u32,
) -> Result<Member, AppError> {
    let username = normalize_username(&registration.username)?;
    validate_password(&registration.password)?;

    if members_repo::find_by_username(conn, &username).await?.is_some() {
        return Err(DomainError::conflict(
            ConflictKind::UsernameTaken,
            format!("Username '{username}' is already registered"),
        )
        .into());
    }

    let password_hash = hash_password(&registration.password, bcrypt_cost).await?;
    let member = members_repo::create_member(
        conn,
        NewMember {
            username,
            password_hash,
            full_name: optional(registration.full_name),
            email: optional(registration.email),
            phone: optional(registration.phone),
            status: MemberStatus::Pending,
            is_admin: false,
            is_trainer: false,
        },
    )
    .await?;

    info!(member_id = member.id, username = %member.username, "member registered");
    Ok(member)
}

/// Check credentials, open a session row and mint the token that refers to it.
///
/// Unknown usernames and wrong passwords produce the same error.
pub async fn login<C: ConnectionTrait + Send + Sync>(
    conn: &C,
    username: &str,
    password: &str,
    security: &SecurityConfig,
) -> Result<LoginOutcome, AppError> {
    let invalid = || {
        AppError::unauthorized_with(
            ErrorCode::InvalidCredentials,
            "Username or password is incorrect",
        )
    };

    let Ok(username) = normalize_username(username) else {
        return Err(invalid());
    };
    let Some(member) = members_repo::find_by_username(conn, &username).await? else {
        debug!(username = %username, "login for unknown username");
        return Err(invalid());
    };
    if !verify_password(password, &member.password_hash).await {
        warn!(member_id = member.id, "login with wrong password");
        return Err(invalid());
    }
    if member.status != MemberStatus::Approved {
        return Err(AppError::forbidden(
            ErrorCode::MemberNotApproved,
            "Membership has not been approved yet",
        ));
    }

    let session = sessions_repo::create_session(conn, member.id, security.session_ttl).await?;
    let token = mint_session_token(member.id, &session.id, SystemTime::now(), security)?;
    info!(member_id = member.id, session_id = %session.id, "member logged in");

    Ok(LoginOutcome {
        member,
        session,
        token,
    })
}

pub async fn logout<C: ConnectionTrait + Send + Sync>(
    conn: &C,
    session_id: &str,
) -> Result<(), AppError> {
    if sessions_repo::delete_session(conn, session_id).await? {
        info!(session_id = %session_id, "session closed");
    }
    Ok(())
}

pub async fn list_members<C: ConnectionTrait + Send + Sync>(
    conn: &C,
    status: Option<MemberStatus>,
) -> Result<Vec<Member>, AppError> {
    Ok(members_repo::list_members(conn, status).await?)
}

pub async fn set_status<C: ConnectionTrait + Send + Sync>(
    conn: &C,
    member_id: i64,
    status: MemberStatus,
) -> Result<Member, AppError> {
    let member = members_repo::set_status(conn, member_id, status).await?;
    info!(member_id, status = ?member.status, "member status changed");
    Ok(member)
}

/// Create the `admin` account when the members table is empty.
///
/// Returns whether an account was created. Runs in one transaction so two
/// processes starting together cannot both insert it.
pub async fn ensure_bootstrap_admin<C: ConnectionTrait + TransactionTrait + Send + Sync>(
    conn: &C,
    password: &str,
    bcrypt_cost: u32,
) -> Result<bool, AppError> {
    validate_password(password)?;
    let password_hash = hash_password(password, bcrypt_cost).await?;

    let txn = conn.begin().await.map_err(map_db_err)?;
    if members_repo::count_members(&txn).await? > 0 {
        return Ok(false);
    }
    let admin = members_repo::create_member(
        &txn,
        NewMember {
            username: BOOTSTRAP_ADMIN_USERNAME.to_string(),
            password_hash,
            full_name: None,
            email: None,
            phone: None,
            status: MemberStatus::Approved,
            is_admin: true,
            is_trainer: false,
        },
    )
    .await?;
    txn.commit().await.map_err(map_db_err)?;

    info!(member_id = admin.id, "bootstrap admin created");
    Ok(true)
}
