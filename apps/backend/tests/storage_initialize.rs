mod common;
mod support;

use clubhouse::entities::members::MemberStatus;
use clubhouse::reconcile::count_rows;
use db_infra::StorageError;
use sea_orm::ConnectionTrait;
use support::{fixture, open_embedded, seed_member};

#[tokio::test]
async fn initialize_is_idempotent_and_keeps_rows() {
    let fx = fixture().await;
    seed_member(fx.storage.conn(), "ada", MemberStatus::Approved, false).await;

    fx.storage.initialize().await.unwrap();
    fx.storage.initialize().await.unwrap();

    let counts = count_rows(fx.storage.conn()).await.unwrap();
    assert_eq!(counts.members, 1);
    assert_eq!(counts.total(), 1);
}

#[tokio::test]
async fn fresh_database_starts_empty() {
    let fx = fixture().await;
    let counts = count_rows(fx.storage.conn()).await.unwrap();
    assert!(counts.is_empty());
}

#[tokio::test]
async fn conflicting_table_is_reported_without_changes() {
    let tmp = backend_test_support::sqlite::TempSqlite::new().unwrap();
    let storage = open_embedded(tmp.path().to_path_buf()).await;
    storage
        .conn()
        .execute_unprepared("CREATE TABLE members (id INTEGER PRIMARY KEY, username TEXT)")
        .await
        .unwrap();

    let err = storage.initialize().await.unwrap_err();
    match err {
        StorageError::SchemaConflict { table, missing } => {
            assert_eq!(table, "members");
            assert!(missing.contains(&"password_hash".to_string()), "{missing:?}");
        }
        other => panic!("expected SchemaConflict, got {other:?}"),
    }

    // nothing else was created
    let row = storage
        .conn()
        .query_one(sea_orm::Statement::from_string(
            sea_orm::DatabaseBackend::Sqlite,
            "SELECT COUNT(*) AS n FROM sqlite_master WHERE type = 'table' AND name = 'articles'",
        ))
        .await
        .unwrap()
        .unwrap();
    let n: i64 = row.try_get("", "n").unwrap();
    assert_eq!(n, 0);
}
