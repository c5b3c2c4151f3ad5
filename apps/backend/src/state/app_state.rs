use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use sea_orm::DatabaseConnection;

use super::security_config::SecurityConfig;
use crate::reconcile::backup::BackupManager;
use crate::reconcile::{ImagePolicy, ReconcileReport};
use crate::storage::{FileHost, Storage};

/// Application state containing shared resources
#[derive(Clone)]
pub struct AppState {
    /// Active database target (absent in handler tests that need no DB)
    pub storage: Option<Storage>,
    /// Security configuration including token settings
    pub security: SecurityConfig,
    pub backups: Arc<BackupManager>,
    pub images: ImagePolicy,
    pub file_host: Arc<dyn FileHost>,
    /// Outcome of the startup reconciler, reported by `/health`
    pub reconcile: Option<Arc<ReconcileReport>>,
    pub legacy_path: PathBuf,
    pub backup_enabled_default: bool,
    pub max_upload_size: usize,
}

impl fmt::Debug for AppState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppState")
            .field("storage", &self.storage)
            .field("backups", &self.backups.config())
            .field("images", &self.images)
            .field("file_host", &self.file_host.describe())
            .field(
                "reconcile",
                &self.reconcile.as_ref().map(|r| r.final_state.name()),
            )
            .field("legacy_path", &self.legacy_path)
            .finish_non_exhaustive()
    }
}

impl AppState {
    pub fn db(&self) -> Option<&DatabaseConnection> {
        self.storage.as_ref().map(Storage::conn)
    }

    pub fn storage(&self) -> Option<&Storage> {
        self.storage.as_ref()
    }
}
