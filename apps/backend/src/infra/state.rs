use std::path::PathBuf;
use std::sync::Arc;

use db_infra::config::db::legacy_sqlite_path;

use crate::config::AppConfig;
use crate::error::AppError;
use crate::reconcile::backup::{BackupConfig, BackupManager};
use crate::reconcile::{ImagePolicy, ReconcileReport};
use crate::state::app_state::AppState;
use crate::state::security_config::SecurityConfig;
use crate::storage::{FileHost, LocalFileHost, Storage};

/// Builder for creating AppState instances (used in both tests and main)
pub struct StateBuilder {
    security_config: SecurityConfig,
    storage: Option<Storage>,
    backups: Option<Arc<BackupManager>>,
    images: ImagePolicy,
    file_host: Option<Arc<dyn FileHost>>,
    reconcile: Option<Arc<ReconcileReport>>,
    legacy_path: PathBuf,
    backup_enabled_default: bool,
    max_upload_size: usize,
}

impl StateBuilder {
    pub fn new() -> Self {
        Self {
            security_config: SecurityConfig::for_tests(),
            storage: None,
            backups: None,
            images: ImagePolicy::default(),
            file_host: None,
            reconcile: None,
            legacy_path: legacy_sqlite_path(),
            backup_enabled_default: true,
            max_upload_size: 5 * 1024 * 1024,
        }
    }

    /// Everything except the storage and reconcile report, taken from `config`.
    pub fn from_config(config: &AppConfig) -> Result<Self, AppError> {
        Ok(Self::new()
            .with_security(config.security()?)
            .with_backups(BackupManager::new(config.backup.clone()))
            .with_images(config.images.clone())
            .with_file_host(config.file_host())
            .with_legacy_path(config.legacy_sqlite_path.clone())
            .with_backup_enabled_default(config.backup_enabled_default)
            .with_max_upload_size(config.max_upload_size))
    }

    pub fn with_storage(mut self, storage: Storage) -> Self {
        self.storage = Some(storage);
        self
    }
    pub fn with_security(mut self, security_config: SecurityConfig) -> Self {
        self.security_config = security_config;
        self
    }
    pub fn with_backups(mut self, backups: BackupManager) -> Self {
        self.backups = Some(Arc::new(backups));
        self
    }
    pub fn with_images(mut self, images: ImagePolicy) -> Self {
        self.images = images;
        self
    }
    pub fn with_file_host(mut self, host: Arc<dyn FileHost>) -> Self {
        self.file_host = Some(host);
        self
    }
    pub fn with_reconcile_report(mut self, report: ReconcileReport) -> Self {
        self.reconcile = Some(Arc::new(report));
        self
    }
    pub fn with_legacy_path(mut self, path: PathBuf) -> Self {
        self.legacy_path = path;
        self
    }
    pub fn with_backup_enabled_default(mut self, enabled: bool) -> Self {
        self.backup_enabled_default = enabled;
        self
    }
    pub fn with_max_upload_size(mut self, bytes: usize) -> Self {
        self.max_upload_size = bytes;
        self
    }

    pub fn build(self) -> AppState {
        let images = self.images;
        let file_host = self.file_host.unwrap_or_else(|| {
            Arc::new(LocalFileHost::new(
                crate::config::app::DEFAULT_IMAGE_DIR,
                images.url_prefix.clone(),
            ))
        });
        AppState {
            storage: self.storage,
            security: self.security_config,
            backups: self
                .backups
                .unwrap_or_else(|| Arc::new(BackupManager::new(BackupConfig::default()))),
            images,
            file_host,
            reconcile: self.reconcile,
            legacy_path: self.legacy_path,
            backup_enabled_default: self.backup_enabled_default,
            max_upload_size: self.max_upload_size,
        }
    }
}

impl Default for StateBuilder {
    fn default() -> Self {
        Self::new()
    }
}

pub fn build_state() -> StateBuilder {
    StateBuilder::new()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_without_storage() {
        let state = build_state().with_backup_enabled_default(false).build();
        assert!(state.db().is_none());
        assert!(state.reconcile.is_none());
        assert!(!state.backup_enabled_default);
        assert_eq!(state.backups.config().keep, 5);
    }
}
