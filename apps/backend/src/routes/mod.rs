use actix_web::web;

pub mod admin;
pub mod articles;
pub mod auth;
pub mod health;
pub mod maintenance;
pub mod members;
pub mod reservations;

/// Register every route. `main.rs` and the HTTP tests share this so both see
/// the same paths.
pub fn configure(cfg: &mut web::ServiceConfig) {
    // Health check routes: /health
    cfg.service(web::scope("/health").configure(health::configure_routes));

    cfg.service(
        web::scope("/api")
            .service(web::scope("/auth").configure(auth::configure_routes))
            .service(web::scope("/members").configure(members::configure_routes))
            .service(web::scope("/reservations").configure(reservations::configure_routes))
            .service(web::scope("/articles").configure(articles::configure_routes))
            .service(web::scope("/admin").configure(admin::configure_routes)),
    );
}
