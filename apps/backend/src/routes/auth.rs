use actix_web::cookie::{Cookie, SameSite};
use actix_web::{web, HttpResponse, Result};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use super::members::MemberView;
use crate::db::require_db;
use crate::error::AppError;
use crate::extractors::{CurrentMember, SESSION_COOKIE};
use crate::services::members::{self, Registration};
use crate::state::app_state::AppState;

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub token: String,
    #[serde(with = "time::serde::rfc3339")]
    pub expires_at: OffsetDateTime,
    pub member: MemberView,
}

async fn register(
    body: web::Json<Registration>,
    app_state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    let db = require_db(&app_state)?;
    let member = members::register(db, body.into_inner(), app_state.security.bcrypt_cost).await?;
    Ok(HttpResponse::Created().json(MemberView::from(&member)))
}

/// Returns the token in the body for API clients and as an HttpOnly cookie
/// for browsers.
async fn login(
    body: web::Json<LoginRequest>,
    app_state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    let db = require_db(&app_state)?;
    let outcome = members::login(db, &body.username, &body.password, &app_state.security).await?;

    let cookie = Cookie::build(SESSION_COOKIE, outcome.token.clone())
        .path("/")
        .http_only(true)
        .same_site(SameSite::Strict)
        .max_age(actix_web::cookie::time::Duration::seconds(
            app_state.security.session_ttl.as_secs() as i64,
        ))
        .finish();

    Ok(HttpResponse::Ok().cookie(cookie).json(LoginResponse {
        token: outcome.token,
        expires_at: outcome.session.expires_at,
        member: MemberView::from(&outcome.member),
    }))
}

async fn logout(
    current: CurrentMember,
    app_state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    let db = require_db(&app_state)?;
    members::logout(db, &current.session_id).await?;

    let mut cookie = Cookie::build(SESSION_COOKIE, "").path("/").finish();
    cookie.make_removal();
    Ok(HttpResponse::NoContent().cookie(cookie).finish())
}

pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/register").route(web::post().to(register)))
        .service(web::resource("/login").route(web::post().to(login)))
        .service(web::resource("/logout").route(web::post().to(logout)));
}
