use actix_web::{web, HttpResponse, Result};
use serde::Deserialize;
use time::OffsetDateTime;

use crate::db::require_db;
use crate::error::AppError;
use crate::extractors::CurrentMember;
use crate::services::reservations::{self, parse_date, ReservationRequest};
use crate::state::app_state::AppState;

#[derive(Debug, Deserialize)]
pub struct DateQuery {
    pub date: Option<String>,
}

/// Confirmed bookings for one day, today when `date` is absent.
async fn list(
    _current: CurrentMember,
    query: web::Query<DateQuery>,
    app_state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    let date = match query.date.as_deref() {
        Some(raw) => parse_date(raw)?,
        None => OffsetDateTime::now_utc().date(),
    };
    let db = require_db(&app_state)?;
    let rows = reservations::list_for_date(db, date).await?;
    Ok(HttpResponse::Ok().json(rows))
}

async fn create(
    current: CurrentMember,
    body: web::Json<ReservationRequest>,
    app_state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    let db = require_db(&app_state)?;
    let reservation = reservations::create(db, &current.member, &body).await?;
    Ok(HttpResponse::Created().json(reservation))
}

async fn cancel(
    current: CurrentMember,
    path: web::Path<i64>,
    app_state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    let db = require_db(&app_state)?;
    let reservation = reservations::cancel(db, &current.member, path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(reservation))
}

pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::resource("")
            .route(web::get().to(list))
            .route(web::post().to(create)),
    )
    .service(web::resource("/{id}").route(web::delete().to(cancel)));
}
