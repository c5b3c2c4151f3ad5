use actix_web::{web, HttpResponse};
use migration::get_latest_migration_version;
use serde::Serialize;
use time::OffsetDateTime;
use tracing::warn;

use crate::error::AppError;
use crate::reconcile::{backup_flag, count_rows, ReconcileState, TableCounts};
use crate::state::app_state::AppState;

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    app_version: &'static str,
    backend: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    counts: Option<TableCounts>,
    reconcile: Option<ReconcileState>,
    migration: Option<String>,
    backup_enabled: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    db_error: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    time: OffsetDateTime,
}

/// Degraded (503) when reconciliation ended in `fatal` or the database does
/// not answer.
async fn health(app_state: web::Data<AppState>) -> Result<HttpResponse, AppError> {
    let reconcile = app_state
        .reconcile
        .as_ref()
        .map(|report| report.final_state.clone());

    let mut response = HealthResponse {
        status: "ok",
        app_version: env!("CARGO_PKG_VERSION"),
        backend: app_state.storage().map(|s| s.backend().kind()),
        counts: None,
        reconcile,
        migration: None,
        backup_enabled: None,
        db_error: None,
        time: OffsetDateTime::now_utc(),
    };

    match app_state.storage() {
        None => response.db_error = Some("no database configured".to_string()),
        Some(storage) => match count_rows(storage.conn()).await {
            Ok(counts) => {
                response.counts = Some(counts);
                response.migration = get_latest_migration_version(storage.conn())
                    .await
                    .ok()
                    .flatten();
                response.backup_enabled =
                    backup_flag::load(storage.conn(), app_state.backup_enabled_default)
                        .await
                        .ok();
            }
            Err(e) => {
                warn!(error = %e, "health query failed");
                response.db_error = Some(format!("DB query failed: {e}"));
            }
        },
    }

    let fatal = matches!(response.reconcile, Some(ReconcileState::Fatal(_)));
    if fatal || response.db_error.is_some() {
        response.status = "degraded";
        return Ok(HttpResponse::ServiceUnavailable().json(response));
    }
    Ok(HttpResponse::Ok().json(response))
}

pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.route("", web::get().to(health));
}
