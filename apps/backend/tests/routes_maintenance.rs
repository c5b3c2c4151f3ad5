mod common;
mod support;

use actix_web::http::StatusCode;
use actix_web::test;
use backend_test_support::problem_details::assert_problem_details_from_service_response;
use clubhouse::entities::members::MemberStatus;
use clubhouse::reconcile::count_rows;
use serde_json::{json, Value};
use support::app_builder::{bearer, login, test_app};
use support::{fixture, seed_member, PASSWORD};

#[tokio::test]
async fn maintenance_is_admin_only() {
    let fx = fixture().await;
    seed_member(fx.storage.conn(), "bob", MemberStatus::Approved, false).await;
    let app = test_app(fx.state()).await;
    let bob = login(&app, "bob", PASSWORD).await;

    let req = test::TestRequest::post()
        .uri("/api/admin/maintenance/backup")
        .insert_header(bearer(&bob))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_problem_details_from_service_response(
        resp,
        "ADMIN_REQUIRED",
        StatusCode::FORBIDDEN,
        None,
    )
    .await;
}

#[tokio::test]
async fn commands_only_accept_post() {
    let fx = fixture().await;
    seed_member(fx.storage.conn(), "root", MemberStatus::Approved, true).await;
    let app = test_app(fx.state()).await;
    let admin = login(&app, "root", PASSWORD).await;

    for uri in [
        "/api/admin/maintenance/backup",
        "/api/admin/maintenance/restore",
        "/api/admin/maintenance/backup-flag/enable",
    ] {
        let req = test::TestRequest::get()
            .uri(uri)
            .insert_header(bearer(&admin))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::METHOD_NOT_ALLOWED, "{uri}");
    }
    assert!(fx.backups().list().await.unwrap().is_empty());
}

#[tokio::test]
async fn backup_flag_and_manual_backup() {
    let fx = fixture().await;
    seed_member(fx.storage.conn(), "root", MemberStatus::Approved, true).await;
    let app = test_app(fx.state()).await;
    let admin = login(&app, "root", PASSWORD).await;

    let req = test::TestRequest::post()
        .uri("/api/admin/maintenance/backup-flag/enable")
        .insert_header(bearer(&admin))
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["backup_enabled"], true);

    let req = test::TestRequest::post()
        .uri("/api/admin/maintenance/backup")
        .insert_header(bearer(&admin))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::CREATED);
    let body: Value = test::read_body_json(resp).await;
    assert!(body["backup"]["file_name"]
        .as_str()
        .unwrap()
        .starts_with("club_backup_"));

    let req = test::TestRequest::get()
        .uri("/api/admin/maintenance/status")
        .insert_header(bearer(&admin))
        .to_request();
    let status: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(status["backup_enabled"], true);
    assert_eq!(status["backups"].as_array().unwrap().len(), 1);
    assert_eq!(status["counts"]["members"], 1);

    let req = test::TestRequest::post()
        .uri("/api/admin/maintenance/backup-flag/disable")
        .insert_header(bearer(&admin))
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["backup_enabled"], false);
}

#[tokio::test]
async fn restore_needs_a_matching_confirmation() {
    let fx = fixture().await;
    seed_member(fx.storage.conn(), "root", MemberStatus::Approved, true).await;
    let app = test_app(fx.state()).await;
    let admin = login(&app, "root", PASSWORD).await;

    // dump holds only the admin
    let req = test::TestRequest::post()
        .uri("/api/admin/maintenance/backup")
        .insert_header(bearer(&admin))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::CREATED);
    seed_member(fx.storage.conn(), "late", MemberStatus::Approved, false).await;

    let req = test::TestRequest::post()
        .uri("/api/admin/maintenance/restore")
        .insert_header(bearer(&admin))
        .set_json(json!({}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_problem_details_from_service_response(
        resp,
        "CONFIRMATION_REQUIRED",
        StatusCode::FORBIDDEN,
        None,
    )
    .await;

    // a confirmation for another action does not count
    let req = test::TestRequest::post()
        .uri("/api/admin/maintenance/confirmations")
        .insert_header(bearer(&admin))
        .set_json(json!({ "action": "migrate" }))
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    let wrong = body["confirmation"].as_str().unwrap().to_string();
    let req = test::TestRequest::post()
        .uri("/api/admin/maintenance/restore")
        .insert_header(bearer(&admin))
        .set_json(json!({ "confirmation": wrong }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_problem_details_from_service_response(
        resp,
        "INVALID_CONFIRMATION",
        StatusCode::FORBIDDEN,
        None,
    )
    .await;
    assert_eq!(count_rows(fx.storage.conn()).await.unwrap().members, 2);

    let req = test::TestRequest::post()
        .uri("/api/admin/maintenance/confirmations")
        .insert_header(bearer(&admin))
        .set_json(json!({ "action": "restore" }))
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["action"], "restore");
    let confirmation = body["confirmation"].as_str().unwrap().to_string();

    let req = test::TestRequest::post()
        .uri("/api/admin/maintenance/restore")
        .insert_header(bearer(&admin))
        .set_json(json!({ "confirmation": confirmation }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(count_rows(fx.storage.conn()).await.unwrap().members, 1);

    // sessions were cleared with the data
    let req = test::TestRequest::get()
        .uri("/api/members/me")
        .insert_header(bearer(&admin))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn unknown_confirmation_action_is_rejected() {
    let fx = fixture().await;
    seed_member(fx.storage.conn(), "root", MemberStatus::Approved, true).await;
    let app = test_app(fx.state()).await;
    let admin = login(&app, "root", PASSWORD).await;

    let req = test::TestRequest::post()
        .uri("/api/admin/maintenance/confirmations")
        .insert_header(bearer(&admin))
        .set_json(json!({ "action": "drop-everything" }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_problem_details_from_service_response(
        resp,
        "VALIDATION_ERROR",
        StatusCode::UNPROCESSABLE_ENTITY,
        None,
    )
    .await;
}

#[tokio::test]
async fn image_scan_reports_through_the_api() {
    let fx = fixture().await;
    seed_member(fx.storage.conn(), "root", MemberStatus::Approved, true).await;
    std::fs::create_dir_all(fx.image_dir()).unwrap();
    std::fs::write(fx.image_dir().join("stray.png"), b"img").unwrap();
    let app = test_app(fx.state()).await;
    let admin = login(&app, "root", PASSWORD).await;

    let req = test::TestRequest::post()
        .uri("/api/admin/maintenance/images/scan")
        .insert_header(bearer(&admin))
        .to_request();
    let report: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(report["host_reachable"], true);
    assert_eq!(report["orphan_files"], json!(["stray.png"]));
}
