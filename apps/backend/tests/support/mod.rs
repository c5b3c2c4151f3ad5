#![allow(dead_code)]

pub mod app_builder;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use backend_test_support::sqlite::TempSqlite;
use clubhouse::auth::hash_password;
use clubhouse::entities::members::{MemberStatus, Model as Member};
use clubhouse::infra::state::build_state;
use clubhouse::reconcile::backup::{BackupConfig, BackupManager, ToolChoice};
use clubhouse::reconcile::ImagePolicy;
use clubhouse::repos::articles::{create_article, NewArticle};
use clubhouse::repos::members::{create_member, NewMember};
use clubhouse::repos::reservations::{create_reservation, NewReservation};
use clubhouse::storage::LocalFileHost;
use clubhouse::{AppState, SecurityConfig, Storage};
use db_infra::{Backend, ConnectSettings, Dialect};
use migration::{migrate, MigrationCommand};
use sea_orm::{ConnectionTrait, Database};
use time::macros::{date, time};

pub const PASSWORD: &str = "correct-horse-battery";

/// An embedded database plus backup and image directories, all under one
/// temporary directory.
pub struct Fixture {
    pub tmp: TempSqlite,
    pub storage: Storage,
}

impl Fixture {
    pub fn backup_dir(&self) -> PathBuf {
        self.tmp.sibling("backups")
    }

    pub fn image_dir(&self) -> PathBuf {
        self.tmp.sibling("images")
    }

    pub fn legacy_path(&self) -> PathBuf {
        self.tmp.sibling("legacy.db")
    }

    pub fn backups(&self) -> BackupManager {
        BackupManager::new(BackupConfig {
            dir: self.backup_dir(),
            keep: 5,
            tool: ToolChoice::Native,
            tool_timeout: Duration::from_secs(30),
        })
    }

    pub fn file_host(&self) -> LocalFileHost {
        LocalFileHost::new(self.image_dir(), ImagePolicy::default().url_prefix)
    }

    pub fn state(&self) -> AppState {
        build_state()
            .with_storage(self.storage.clone())
            .with_security(SecurityConfig::for_tests())
            .with_backups(self.backups())
            .with_file_host(Arc::new(self.file_host()))
            .with_legacy_path(self.legacy_path())
            .build()
    }
}

pub fn test_settings() -> ConnectSettings {
    ConnectSettings {
        connect_timeout: Duration::from_secs(2),
        max_attempts: 1,
        retry_interval: Duration::from_millis(50),
        max_connections: 4,
        lock_timeout: Duration::from_secs(2),
    }
}

/// Open an embedded store at `path` without creating the schema.
pub async fn open_embedded(path: PathBuf) -> Storage {
    Storage::open(Backend::Embedded { path }, test_settings())
        .await
        .expect("open embedded store")
}

/// Fresh embedded database with the schema in place.
pub async fn fixture() -> Fixture {
    let tmp = TempSqlite::new().expect("temp dir");
    let storage = open_embedded(tmp.path().to_path_buf()).await;
    storage.initialize().await.expect("initialize schema");
    Fixture { tmp, storage }
}

pub async fn seed_member<C: ConnectionTrait + Send + Sync>(
    conn: &C,
    username: &str,
    status: MemberStatus,
    is_admin: bool,
) -> Member {
    let password_hash = hash_password(PASSWORD, 4).await.expect("hash");
    create_member(
        conn,
        NewMember {
            username: username.to_string(),
            password_hash,
            full_name: Some(format!("{username} example")),
            email: None,
            phone: None,
            status,
            is_admin,
            is_trainer: false,
        },
    )
    .await
    .expect("seed member")
}

/// The fixture's connection, presented as a server backend so the migrator
/// treats it as a migration target.
pub fn as_server(fx: &Fixture) -> Storage {
    Storage::from_connection(
        Backend::Server {
            dialect: Dialect::Postgres,
            url: "postgres://club@db.invalid/club".to_string(),
        },
        test_settings(),
        fx.storage.conn().clone(),
    )
}

/// A legacy store in rollback-journal mode holding 2 members, 1 reservation
/// and 1 article.
pub async fn write_legacy(path: &Path) {
    let conn = Database::connect(format!("sqlite://{}?mode=rwc", path.display()))
        .await
        .expect("open legacy store");
    migrate(&conn, MigrationCommand::Up)
        .await
        .expect("legacy schema");

    let ada = seed_member(&conn, "ada", MemberStatus::Approved, true).await;
    seed_member(&conn, "bob", MemberStatus::Pending, false).await;
    create_reservation(
        &conn,
        NewReservation {
            member_id: ada.id,
            court: 2,
            date: date!(2024 - 05 - 04),
            start_time: time!(10:00),
            end_time: time!(11:00),
        },
    )
    .await
    .expect("legacy reservation");
    create_article(
        &conn,
        NewArticle {
            title: "Spring opening".into(),
            body: "Courts open on Saturday.".into(),
            image_path: Some("/static/article_images/spring.jpg".into()),
            author_id: Some(ada.id),
        },
    )
    .await
    .expect("legacy article");
    conn.close().await.expect("close legacy store");
}

/// Replace the target's articles table with one the legacy rows cannot
/// satisfy. Schema checks only warn about the extra column.
pub async fn break_articles_table<C: ConnectionTrait>(conn: &C) {
    conn.execute_unprepared("DROP TABLE articles")
        .await
        .expect("drop articles");
    conn.execute_unprepared(
        "CREATE TABLE articles (id INTEGER PRIMARY KEY, title TEXT NOT NULL, body TEXT NOT NULL, \
         image_path TEXT, author_id INTEGER, published_at TEXT NOT NULL, updated_at TEXT NOT NULL, \
         editor_note TEXT NOT NULL)",
    )
    .await
    .expect("create articles");
}
