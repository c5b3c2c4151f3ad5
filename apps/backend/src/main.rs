use actix_web::{web, App, HttpServer};
use clubhouse::config::AppConfig;
use clubhouse::infra::state::StateBuilder;
use clubhouse::middleware::{RequestTrace, TraceSpan};
use clubhouse::reconcile::{reconcile, ReconcileContext, ReconcileState};
use clubhouse::{routes, telemetry, Storage};
use tracing::{error, info};

fn fatal(message: &str, e: &dyn std::fmt::Display) -> ! {
    error!(error = %e, "{message}");
    std::process::exit(1);
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    telemetry::init_tracing();

    // Configuration comes from the environment only.
    let config = AppConfig::from_env().unwrap_or_else(|e| fatal("invalid configuration", &e));
    let builder = StateBuilder::from_config(&config)
        .unwrap_or_else(|e| fatal("invalid configuration", &e));

    info!(target = %config.backend.display_target(), "opening database");
    let storage = Storage::open(config.backend.clone(), config.connect.clone())
        .await
        .unwrap_or_else(|e| fatal("database unreachable", &e));

    let mut app_state = builder.with_storage(storage.clone()).build();

    // Reconciliation finishes before the server accepts connections.
    let report = reconcile(&ReconcileContext {
        storage: &storage,
        backups: &app_state.backups,
        legacy_path: config.legacy_sqlite_path.clone(),
        backup_enabled_default: config.backup_enabled_default,
        bootstrap_admin_password: config.bootstrap_admin_password.clone(),
        bcrypt_cost: config.bcrypt_cost,
    })
    .await;
    if let ReconcileState::Fatal(reason) = &report.final_state {
        fatal("startup reconciliation failed", reason);
    }
    app_state.reconcile = Some(std::sync::Arc::new(report));

    let max_upload_size = app_state.max_upload_size;
    let data = web::Data::new(app_state);

    info!(host = %config.host, port = config.port, "starting HTTP server");
    HttpServer::new(move || {
        App::new()
            .wrap(TraceSpan)
            .wrap(RequestTrace)
            .app_data(data.clone())
            .app_data(web::PayloadConfig::new(max_upload_size))
            .configure(routes::configure)
    })
    .bind((config.host.as_str(), config.port))?
    .run()
    .await
}
