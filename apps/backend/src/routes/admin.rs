use actix_web::{web, HttpResponse, Result};
use serde::Deserialize;

use super::members::MemberView;
use crate::db::require_db;
use crate::entities::members::MemberStatus;
use crate::error::AppError;
use crate::errors::ErrorCode;
use crate::extractors::AdminMember;
use crate::services::articles::{self, ArticleDraft, ArticleEdit};
use crate::services::{members, reservations};
use crate::state::app_state::AppState;

#[derive(Debug, Deserialize)]
pub struct StatusQuery {
    pub status: Option<MemberStatus>,
}

#[derive(Debug, Deserialize)]
pub struct StatusChange {
    pub status: MemberStatus,
}

#[derive(Debug, Deserialize)]
pub struct ImageQuery {
    pub filename: String,
}

async fn list_members(
    _admin: AdminMember,
    query: web::Query<StatusQuery>,
    app_state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    let db = require_db(&app_state)?;
    let rows = members::list_members(db, query.status).await?;
    let views: Vec<MemberView> = rows.iter().map(MemberView::from).collect();
    Ok(HttpResponse::Ok().json(views))
}

async fn set_member_status(
    admin: AdminMember,
    path: web::Path<i64>,
    body: web::Json<StatusChange>,
    app_state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    let member_id = path.into_inner();
    if member_id == admin.id() && body.status != MemberStatus::Approved {
        return Err(AppError::invalid(
            ErrorCode::InvalidStatus,
            "Administrators cannot revoke their own approval",
        ));
    }
    let db = require_db(&app_state)?;
    let member = members::set_status(db, member_id, body.status).await?;
    Ok(HttpResponse::Ok().json(MemberView::from(&member)))
}

async fn list_reservations(
    _admin: AdminMember,
    app_state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    let db = require_db(&app_state)?;
    Ok(HttpResponse::Ok().json(reservations::list_all(db).await?))
}

async fn create_article(
    admin: AdminMember,
    body: web::Json<ArticleDraft>,
    app_state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    let db = require_db(&app_state)?;
    let article = articles::create(db, &admin.0.member, body.into_inner(), &app_state.images).await?;
    Ok(HttpResponse::Created().json(article))
}

async fn update_article(
    _admin: AdminMember,
    path: web::Path<i64>,
    body: web::Json<ArticleEdit>,
    app_state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    let db = require_db(&app_state)?;
    let article =
        articles::update(db, path.into_inner(), body.into_inner(), &app_state.images).await?;
    Ok(HttpResponse::Ok().json(article))
}

async fn delete_article(
    _admin: AdminMember,
    path: web::Path<i64>,
    app_state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    let db = require_db(&app_state)?;
    articles::delete(db, path.into_inner()).await?;
    Ok(HttpResponse::NoContent().finish())
}

/// Raw image bytes in the body; the original file name only picks the
/// extension.
async fn replace_article_image(
    _admin: AdminMember,
    path: web::Path<i64>,
    query: web::Query<ImageQuery>,
    body: web::Bytes,
    app_state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    let db = require_db(&app_state)?;
    let article = articles::replace_image(
        db,
        app_state.file_host.as_ref(),
        path.into_inner(),
        &query.filename,
        &body,
    )
    .await?;
    Ok(HttpResponse::Ok().json(article))
}

pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/members").route(web::get().to(list_members)))
        .service(web::resource("/members/{id}/status").route(web::post().to(set_member_status)))
        .service(web::resource("/reservations").route(web::get().to(list_reservations)))
        .service(web::resource("/articles").route(web::post().to(create_article)))
        .service(
            web::resource("/articles/{id}")
                .route(web::put().to(update_article))
                .route(web::delete().to(delete_article)),
        )
        .service(
            web::resource("/articles/{id}/image").route(web::put().to(replace_article_image)),
        )
        .service(web::scope("/maintenance").configure(super::maintenance::configure_routes));
}
