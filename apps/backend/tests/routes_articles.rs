mod common;
mod support;

use actix_web::http::StatusCode;
use actix_web::test;
use backend_test_support::problem_details::assert_problem_details_from_service_response;
use backend_test_support::unique_helpers::unique_username;
use clubhouse::entities::members::MemberStatus;
use clubhouse::reconcile::images::DEFAULT_IMAGE;
use serde_json::{json, Value};
use support::app_builder::{bearer, login, test_app};
use support::{fixture, seed_member, PASSWORD};

#[tokio::test]
async fn admin_edits_title_body_and_image() {
    let fx = fixture().await;
    let admin_name = unique_username("admin");
    seed_member(fx.storage.conn(), &admin_name, MemberStatus::Approved, true).await;
    let app = test_app(fx.state()).await;
    let admin = login(&app, &admin_name, PASSWORD).await;

    let req = test::TestRequest::post()
        .uri("/api/admin/articles")
        .insert_header(bearer(&admin))
        .set_json(json!({ "title": "Draft", "body": "tbd", "image_path": null }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::CREATED);
    let created: Value = test::read_body_json(resp).await;
    let id = created["id"].as_i64().unwrap();

    let req = test::TestRequest::put()
        .uri(&format!("/api/admin/articles/{id}"))
        .insert_header(bearer(&admin))
        .set_json(json!({
            "title": "  Summer league  ",
            "image_path": "/static/article_images/league.png"
        }))
        .to_request();
    let edited: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(edited["title"], "Summer league");
    assert_eq!(edited["body"], "tbd");
    assert_eq!(edited["image_path"], "/static/article_images/league.png");

    // the default image is always accepted; an empty reference clears it
    for (raw, expected) in [(DEFAULT_IMAGE, json!(DEFAULT_IMAGE)), ("", Value::Null)] {
        let req = test::TestRequest::put()
            .uri(&format!("/api/admin/articles/{id}"))
            .insert_header(bearer(&admin))
            .set_json(json!({ "image_path": raw }))
            .to_request();
        let edited: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(edited["image_path"], expected, "{raw:?}");
    }

    let req = test::TestRequest::get()
        .uri(&format!("/api/articles/{id}"))
        .to_request();
    let public: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(public["title"], "Summer league");
}

#[tokio::test]
async fn edit_rejects_bad_input_and_unknown_articles() {
    let fx = fixture().await;
    let admin_name = unique_username("admin");
    seed_member(fx.storage.conn(), &admin_name, MemberStatus::Approved, true).await;
    let app = test_app(fx.state()).await;
    let admin = login(&app, &admin_name, PASSWORD).await;

    let req = test::TestRequest::post()
        .uri("/api/admin/articles")
        .insert_header(bearer(&admin))
        .set_json(json!({ "title": "Courts", "body": "open" }))
        .to_request();
    let created: Value = test::call_and_read_body_json(&app, req).await;
    let id = created["id"].as_i64().unwrap();

    let req = test::TestRequest::put()
        .uri(&format!("/api/admin/articles/{id}"))
        .insert_header(bearer(&admin))
        .set_json(json!({ "image_path": "https://cdn.example.com/court.jpg" }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_problem_details_from_service_response(
        resp,
        "INVALID_IMAGE_REFERENCE",
        StatusCode::UNPROCESSABLE_ENTITY,
        None,
    )
    .await;

    let req = test::TestRequest::put()
        .uri(&format!("/api/admin/articles/{id}"))
        .insert_header(bearer(&admin))
        .set_json(json!({ "title": "   " }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_problem_details_from_service_response(
        resp,
        "VALIDATION_ERROR",
        StatusCode::UNPROCESSABLE_ENTITY,
        None,
    )
    .await;

    let req = test::TestRequest::put()
        .uri(&format!("/api/admin/articles/{}", id + 100))
        .insert_header(bearer(&admin))
        .set_json(json!({ "body": "gone" }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_problem_details_from_service_response(
        resp,
        "ARTICLE_NOT_FOUND",
        StatusCode::NOT_FOUND,
        None,
    )
    .await;

    // rejected edits left the article as it was
    let req = test::TestRequest::get()
        .uri(&format!("/api/articles/{id}"))
        .to_request();
    let article: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(article["title"], "Courts");
    assert!(article["image_path"].is_null());
}

#[tokio::test]
async fn members_cannot_edit_articles() {
    let fx = fixture().await;
    let member_name = unique_username("member");
    seed_member(fx.storage.conn(), &member_name, MemberStatus::Approved, false).await;
    let app = test_app(fx.state()).await;
    let member = login(&app, &member_name, PASSWORD).await;

    let req = test::TestRequest::put()
        .uri("/api/admin/articles/1")
        .insert_header(bearer(&member))
        .set_json(json!({ "title": "Mine now" }))
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
