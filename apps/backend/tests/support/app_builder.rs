//! Given an AppState, build an initialized actix test service with the
//! production routes and middleware.

use actix_web::body::BoxBody;
use actix_web::dev::{Service, ServiceResponse};
use actix_web::{test, web, App, Error as ActixError};
use clubhouse::middleware::{RequestTrace, TraceSpan};
use clubhouse::AppState;
use serde_json::{json, Value};

pub async fn test_app(
    state: AppState,
) -> impl Service<actix_http::Request, Response = ServiceResponse<BoxBody>, Error = ActixError> {
    let app = App::new()
        .wrap(TraceSpan)
        .wrap(RequestTrace)
        .app_data(web::Data::new(state))
        .configure(clubhouse::routes::configure);
    test::init_service(app).await
}

/// Log in and return the session token.
pub async fn login<S>(app: &S, username: &str, password: &str) -> String
where
    S: Service<actix_http::Request, Response = ServiceResponse<BoxBody>, Error = ActixError>,
{
    let req = test::TestRequest::post()
        .uri("/api/auth/login")
        .set_json(json!({ "username": username, "password": password }))
        .to_request();
    let resp = test::call_service(app, req).await;
    assert!(resp.status().is_success(), "login failed: {}", resp.status());
    let body: Value = test::read_body_json(resp).await;
    body["token"].as_str().expect("token").to_string()
}

pub fn bearer(token: &str) -> (&'static str, String) {
    ("Authorization", format!("Bearer {token}"))
}
