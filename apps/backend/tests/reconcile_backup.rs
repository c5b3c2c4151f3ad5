mod common;
mod support;

use clubhouse::entities::members::MemberStatus;
use clubhouse::reconcile::backup::naming;
use clubhouse::reconcile::{count_rows, DumpFormat, RestoreError, RestoreMode};
use clubhouse::repos::members::find_by_username;
use clubhouse::repos::sessions::{create_session, find_live};
use support::{fixture, seed_member};

#[tokio::test]
async fn backup_writes_a_named_json_dump() {
    let fx = fixture().await;
    seed_member(fx.storage.conn(), "ada", MemberStatus::Approved, false).await;
    let backups = fx.backups();

    let handle = backups.backup(&fx.storage).await.unwrap();
    assert_eq!(handle.format, DumpFormat::Json);
    assert!(handle.file_name.starts_with("club_backup_"));
    assert!(handle.file_name.ends_with(".json"));
    assert!(naming::parse(&handle.file_name).is_some());
    assert!(handle.size_bytes > 0);
    assert!(handle.path.starts_with(fx.backup_dir()));

    let listed = backups.list().await.unwrap();
    assert_eq!(listed, vec![handle.clone()]);
    assert_eq!(backups.latest().await.unwrap(), Some(handle));
}

#[tokio::test]
async fn listing_ignores_foreign_files_and_missing_dir() {
    let fx = fixture().await;
    let backups = fx.backups();
    assert!(backups.list().await.unwrap().is_empty());

    std::fs::create_dir_all(fx.backup_dir()).unwrap();
    std::fs::write(fx.backup_dir().join("notes.txt"), "keep me").unwrap();
    std::fs::write(fx.backup_dir().join("club_backup_garbage.json"), "{}").unwrap();
    assert!(backups.list().await.unwrap().is_empty());
    assert_eq!(backups.find("../club.db").await.unwrap(), None);
}

#[tokio::test]
async fn backup_and_prune_keeps_five_newest() {
    let fx = fixture().await;
    let backups = fx.backups();

    let mut created = Vec::new();
    for _ in 0..7 {
        let (handle, _) = backups.backup_and_prune(&fx.storage).await.unwrap();
        created.push(handle.file_name);
    }
    std::fs::write(fx.backup_dir().join("notes.txt"), "keep me").unwrap();

    let listed: Vec<String> = backups
        .list()
        .await
        .unwrap()
        .into_iter()
        .map(|h| h.file_name)
        .collect();
    assert_eq!(listed.len(), 5);
    let mut newest: Vec<String> = created[2..].to_vec();
    newest.reverse();
    assert_eq!(listed, newest);
    assert!(fx.backup_dir().join("notes.txt").exists());

    // explicit prune with a smaller retention
    let pruned = backups.prune(2, None).await.unwrap();
    assert_eq!(pruned, 3);
    assert_eq!(backups.list().await.unwrap().len(), 2);
}

#[tokio::test]
async fn automatic_restore_fills_an_empty_database() {
    let source = fixture().await;
    seed_member(source.storage.conn(), "ada", MemberStatus::Approved, true).await;
    seed_member(source.storage.conn(), "bob", MemberStatus::Pending, false).await;
    let handle = source.backups().backup(&source.storage).await.unwrap();

    let target = fixture().await;
    let target_backups = clubhouse::reconcile::BackupManager::new(
        clubhouse::reconcile::BackupConfig {
            dir: source.backup_dir(),
            ..source.backups().config().clone()
        },
    );
    let restored = target_backups.restore_latest(&target.storage).await.unwrap();
    assert_eq!(restored.file_name, handle.file_name);

    let counts = count_rows(target.storage.conn()).await.unwrap();
    assert_eq!(counts.members, 2);
    let ada = find_by_username(target.storage.conn(), "ada").await.unwrap().unwrap();
    assert!(ada.is_admin);

    // ids keep counting after the restored rows
    let carol = seed_member(target.storage.conn(), "carol", MemberStatus::Approved, false).await;
    assert!(carol.id > ada.id);
}

#[tokio::test]
async fn automatic_restore_refuses_a_populated_database() {
    let fx = fixture().await;
    seed_member(fx.storage.conn(), "ada", MemberStatus::Approved, false).await;
    let backups = fx.backups();
    let handle = backups.backup(&fx.storage).await.unwrap();

    let err = backups
        .restore(&fx.storage, &handle, RestoreMode::Automatic)
        .await
        .unwrap_err();
    assert!(matches!(err, RestoreError::NotEmpty { rows: 1 }), "{err:?}");
    assert_eq!(count_rows(fx.storage.conn()).await.unwrap().members, 1);
}

#[tokio::test]
async fn manual_restore_replaces_data_and_drops_sessions() {
    let fx = fixture().await;
    let ada = seed_member(fx.storage.conn(), "ada", MemberStatus::Approved, false).await;
    let backups = fx.backups();
    let handle = backups.backup(&fx.storage).await.unwrap();

    seed_member(fx.storage.conn(), "bob", MemberStatus::Approved, false).await;
    let session = create_session(fx.storage.conn(), ada.id, std::time::Duration::from_secs(3600))
        .await
        .unwrap();

    backups
        .restore(&fx.storage, &handle, RestoreMode::Manual)
        .await
        .unwrap();

    let conn = fx.storage.conn();
    assert_eq!(count_rows(conn).await.unwrap().members, 1);
    assert!(find_by_username(conn, "bob").await.unwrap().is_none());
    assert!(find_live(conn, &session.id).await.unwrap().is_none());
}

#[tokio::test]
async fn restore_without_dumps_reports_no_dump() {
    let fx = fixture().await;
    let err = fx.backups().restore_latest(&fx.storage).await.unwrap_err();
    assert!(matches!(err, RestoreError::NoDump), "{err:?}");
}
