use actix_web::{web, HttpResponse, Result};

use crate::db::require_db;
use crate::error::AppError;
use crate::services::articles;
use crate::state::app_state::AppState;

async fn list(app_state: web::Data<AppState>) -> Result<HttpResponse, AppError> {
    let db = require_db(&app_state)?;
    Ok(HttpResponse::Ok().json(articles::list(db).await?))
}

async fn get(
    path: web::Path<i64>,
    app_state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    let db = require_db(&app_state)?;
    Ok(HttpResponse::Ok().json(articles::get(db, path.into_inner()).await?))
}

pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("").route(web::get().to(list)))
        .service(web::resource("/{id}").route(web::get().to(get)));
}
