mod common;
mod support;

use clubhouse::entities::members::MemberStatus;
use clubhouse::reconcile::{count_rows, migrate_if_needed, MigrationOutcome, SkipReason};
use clubhouse::repos::members::find_by_username;
use support::{as_server, break_articles_table, fixture, seed_member, write_legacy};

#[tokio::test]
async fn embedded_target_is_never_migrated() {
    let fx = fixture().await;
    write_legacy(&fx.legacy_path()).await;

    let outcome = migrate_if_needed(&fx.storage, &fx.legacy_path()).await.unwrap();
    assert_eq!(
        outcome,
        MigrationOutcome::Skipped {
            reason: SkipReason::EmbeddedBackend
        }
    );
}

#[tokio::test]
async fn missing_or_empty_legacy_file_is_skipped() {
    let fx = fixture().await;
    let target = as_server(&fx);

    let outcome = migrate_if_needed(&target, &fx.legacy_path()).await.unwrap();
    assert_eq!(
        outcome,
        MigrationOutcome::Skipped {
            reason: SkipReason::LegacyMissing
        }
    );

    std::fs::write(fx.legacy_path(), b"").unwrap();
    let outcome = migrate_if_needed(&target, &fx.legacy_path()).await.unwrap();
    assert_eq!(
        outcome,
        MigrationOutcome::Skipped {
            reason: SkipReason::LegacyEmpty
        }
    );
}

#[tokio::test]
async fn non_empty_target_is_left_alone() {
    let fx = fixture().await;
    write_legacy(&fx.legacy_path()).await;
    seed_member(fx.storage.conn(), "carol", MemberStatus::Approved, false).await;

    let outcome = migrate_if_needed(&as_server(&fx), &fx.legacy_path()).await.unwrap();
    assert_eq!(
        outcome,
        MigrationOutcome::Skipped {
            reason: SkipReason::TargetNotEmpty
        }
    );
    assert_eq!(count_rows(fx.storage.conn()).await.unwrap().members, 1);
}

#[tokio::test]
async fn copies_every_table_and_leaves_legacy_untouched() {
    let fx = fixture().await;
    write_legacy(&fx.legacy_path()).await;
    let before = std::fs::read(fx.legacy_path()).unwrap();

    let outcome = migrate_if_needed(&as_server(&fx), &fx.legacy_path()).await.unwrap();
    let MigrationOutcome::Migrated { rows } = outcome else {
        panic!("expected Migrated, got {outcome:?}");
    };
    assert_eq!((rows.members, rows.reservations, rows.articles), (2, 1, 1));

    let counts = count_rows(fx.storage.conn()).await.unwrap();
    assert_eq!(counts, rows);
    let ada = find_by_username(fx.storage.conn(), "ada").await.unwrap().unwrap();
    assert!(ada.is_admin);
    assert!(!ada.password_hash.is_empty());

    assert_eq!(std::fs::read(fx.legacy_path()).unwrap(), before);

    // second run sees a populated target
    let again = migrate_if_needed(&as_server(&fx), &fx.legacy_path()).await.unwrap();
    assert_eq!(
        again,
        MigrationOutcome::Skipped {
            reason: SkipReason::TargetNotEmpty
        }
    );
}

#[tokio::test]
async fn failure_keeps_earlier_tables_and_names_the_failing_one() {
    let fx = fixture().await;
    write_legacy(&fx.legacy_path()).await;
    break_articles_table(fx.storage.conn()).await;

    let outcome = migrate_if_needed(&as_server(&fx), &fx.legacy_path()).await.unwrap();
    match outcome {
        MigrationOutcome::Failed { table, copied, .. } => {
            assert_eq!(table, "articles");
            assert_eq!((copied.members, copied.reservations, copied.articles), (2, 1, 0));
        }
        other => panic!("expected Failed, got {other:?}"),
    }

    let counts = count_rows(fx.storage.conn()).await.unwrap();
    assert_eq!((counts.members, counts.reservations, counts.articles), (2, 1, 0));
}
