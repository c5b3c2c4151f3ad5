//! Operator endpoints. Every command is a POST; the two that can destroy
//! data also need a confirmation token minted moments earlier.

use std::time::SystemTime;

use actix_web::{web, HttpResponse, Result};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::auth::{mint_confirmation_token, verify_confirmation_token, CONFIRM_TTL};
use crate::db::require_storage;
use crate::error::AppError;
use crate::errors::ErrorCode;
use crate::extractors::AdminMember;
use crate::services::maintenance::{self, DESTRUCTIVE_ACTIONS};
use crate::state::app_state::AppState;

#[derive(Debug, Deserialize)]
pub struct ConfirmationRequest {
    pub action: String,
}

#[derive(Debug, Serialize)]
pub struct ConfirmationResponse {
    pub action: String,
    pub confirmation: String,
    #[serde(with = "time::serde::rfc3339")]
    pub expires_at: OffsetDateTime,
}

#[derive(Debug, Deserialize)]
pub struct RestoreRequest {
    #[serde(default)]
    pub confirmation: String,
    pub file: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct MigrateRequest {
    #[serde(default)]
    pub confirmation: String,
}

#[derive(Debug, Serialize)]
struct FlagResponse {
    backup_enabled: bool,
}

fn confirm(
    admin: &AdminMember,
    token: &str,
    action: &str,
    app_state: &AppState,
) -> Result<(), AppError> {
    if token.trim().is_empty() {
        return Err(AppError::forbidden(
            ErrorCode::ConfirmationRequired,
            format!("'{action}' needs a confirmation token"),
        ));
    }
    verify_confirmation_token(token, admin.id(), action, &app_state.security)?;
    Ok(())
}

async fn status(
    _admin: AdminMember,
    app_state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    let storage = require_storage(&app_state)?;
    let summary =
        maintenance::status(storage, &app_state.backups, app_state.backup_enabled_default).await?;
    let mut status =
        serde_json::to_value(summary).map_err(|e| AppError::internal(e.to_string()))?;
    status["reconcile"] = serde_json::to_value(app_state.reconcile.as_deref())
        .map_err(|e| AppError::internal(e.to_string()))?;
    Ok(HttpResponse::Ok().json(status))
}

async fn list_backups(
    _admin: AdminMember,
    app_state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    Ok(HttpResponse::Ok().json(app_state.backups.list().await?))
}

async fn backup(
    _admin: AdminMember,
    app_state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    let storage = require_storage(&app_state)?;
    let result = maintenance::backup(storage, &app_state.backups).await?;
    Ok(HttpResponse::Created().json(result))
}

async fn set_flag(app_state: &AppState, enabled: bool) -> Result<HttpResponse, AppError> {
    let storage = require_storage(app_state)?;
    let backup_enabled = maintenance::set_backup_flag(storage, enabled).await?;
    Ok(HttpResponse::Ok().json(FlagResponse { backup_enabled }))
}

async fn enable_backups(
    _admin: AdminMember,
    app_state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    set_flag(&app_state, true).await
}

async fn disable_backups(
    _admin: AdminMember,
    app_state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    set_flag(&app_state, false).await
}

async fn scan_images(
    _admin: AdminMember,
    app_state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    let storage = require_storage(&app_state)?;
    let report =
        maintenance::scan_images(storage, app_state.file_host.as_ref(), &app_state.images).await?;
    Ok(HttpResponse::Ok().json(report))
}

async fn repair_images(
    _admin: AdminMember,
    app_state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    let storage = require_storage(&app_state)?;
    let result =
        maintenance::repair_images(storage, app_state.file_host.as_ref(), &app_state.images)
            .await?;
    Ok(HttpResponse::Ok().json(result))
}

async fn issue_confirmation(
    admin: AdminMember,
    body: web::Json<ConfirmationRequest>,
    app_state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    let action = body.action.trim();
    if !DESTRUCTIVE_ACTIONS.contains(&action) {
        return Err(AppError::invalid(
            ErrorCode::ValidationError,
            format!("No confirmation exists for action '{action}'"),
        ));
    }
    let confirmation =
        mint_confirmation_token(admin.id(), action, SystemTime::now(), &app_state.security)?;
    Ok(HttpResponse::Ok().json(ConfirmationResponse {
        action: action.to_string(),
        confirmation,
        expires_at: OffsetDateTime::now_utc() + CONFIRM_TTL,
    }))
}

/// Replaces the database contents with a dump.
async fn restore(
    admin: AdminMember,
    body: web::Json<RestoreRequest>,
    app_state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    confirm(&admin, &body.confirmation, "restore", &app_state)?;
    let storage = require_storage(&app_state)?;
    let handle =
        maintenance::restore(storage, &app_state.backups, body.file.as_deref(), true).await?;
    Ok(HttpResponse::Ok().json(handle))
}

async fn migrate(
    admin: AdminMember,
    body: web::Json<MigrateRequest>,
    app_state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    confirm(&admin, &body.confirmation, "migrate", &app_state)?;
    let storage = require_storage(&app_state)?;
    let outcome = maintenance::migrate(storage, &app_state.legacy_path).await?;
    Ok(HttpResponse::Ok().json(outcome))
}

pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/status").route(web::get().to(status)))
        .service(web::resource("/backups").route(web::get().to(list_backups)))
        .service(web::resource("/backup").route(web::post().to(backup)))
        .service(web::resource("/backup-flag/enable").route(web::post().to(enable_backups)))
        .service(web::resource("/backup-flag/disable").route(web::post().to(disable_backups)))
        .service(web::resource("/images/scan").route(web::post().to(scan_images)))
        .service(web::resource("/images/repair").route(web::post().to(repair_images)))
        .service(web::resource("/confirmations").route(web::post().to(issue_confirmation)))
        .service(web::resource("/restore").route(web::post().to(restore)))
        .service(web::resource("/migrate").route(web::post().to(migrate)));
}
