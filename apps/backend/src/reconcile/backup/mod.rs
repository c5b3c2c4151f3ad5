//! Timestamped database dumps with retention, and guarded restore.

pub mod external;
pub mod naming;
pub mod native;

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use db_infra::{acquire_with_backoff, lock_for, Backend, DbInfraError};
use serde::Serialize;
use thiserror::Error;
use time::OffsetDateTime;
use tokio::sync::Mutex;
use tracing::{info, warn};

pub use external::ExternalDump;
pub use naming::DumpFormat;
pub use native::NativeDump;

use crate::reconcile::tables::count_rows;
use crate::storage::Storage;

pub const DEFAULT_KEEP: usize = 5;
pub const DEFAULT_TOOL_TIMEOUT: Duration = Duration::from_secs(300);

#[derive(Debug, Error)]
pub enum BackupError {
    #[error("dump tool `{tool}` is not installed")]
    ToolUnavailable { tool: String },
    #[error("dump tool `{tool}` exited with {status}: {stderr}")]
    ToolFailed {
        tool: String,
        status: String,
        stderr: String,
    },
    #[error("dump tool `{tool}` did not finish within {secs}s")]
    Timeout { tool: String, secs: u64 },
    #[error("backup i/o error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("database error during backup: {0}")]
    Db(#[from] sea_orm::DbErr),
    #[error("failed to encode dump: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("backup not supported: {0}")]
    Unsupported(String),
}

#[derive(Debug, Error)]
pub enum RestoreError {
    /// Automatic restore refuses to touch a database that holds club data.
    #[error("database is not empty ({rows} rows in tracked tables)")]
    NotEmpty { rows: u64 },
    #[error("no dump available to restore")]
    NoDump,
    #[error("restore tool `{tool}` is not installed")]
    ToolUnavailable { tool: String },
    #[error("restore tool `{tool}` exited with {status}: {stderr}")]
    ToolFailed {
        tool: String,
        status: String,
        stderr: String,
    },
    #[error("restore tool `{tool}` did not finish within {secs}s")]
    Timeout { tool: String, secs: u64 },
    #[error("restore i/o error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("database error during restore: {0}")]
    Db(#[from] sea_orm::DbErr),
    #[error("unusable dump {path}: {detail}")]
    Format { path: PathBuf, detail: String },
    #[error("could not take the restore lock: {0}")]
    Lock(#[from] DbInfraError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RestoreMode {
    /// Startup recovery: only into an empty database.
    Automatic,
    /// Operator-confirmed: replaces whatever is there.
    Manual,
}

/// Which dump strategy a server backend uses. Embedded always uses native.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolChoice {
    #[default]
    Auto,
    Native,
    External,
}

impl FromStr for ToolChoice {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "auto" => Ok(ToolChoice::Auto),
            "native" | "json" => Ok(ToolChoice::Native),
            "external" | "sql" => Ok(ToolChoice::External),
            other => Err(format!("unknown backup tool `{other}`")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct BackupConfig {
    pub dir: PathBuf,
    pub keep: usize,
    pub tool: ToolChoice,
    pub tool_timeout: Duration,
}

impl Default for BackupConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("backups"),
            keep: DEFAULT_KEEP,
            tool: ToolChoice::Auto,
            tool_timeout: DEFAULT_TOOL_TIMEOUT,
        }
    }
}

/// A dump file on disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BackupHandle {
    pub path: PathBuf,
    pub file_name: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    pub size_bytes: u64,
    pub format: DumpFormat,
}

/// A way of writing and loading a dump file.
#[async_trait]
pub trait DumpTool: Send + Sync {
    fn format(&self) -> DumpFormat;

    fn name(&self) -> &'static str;

    /// Write a complete dump to `dest`, which already exists and is empty.
    async fn dump(&self, storage: &Storage, dest: &Path) -> Result<(), BackupError>;

    async fn load(&self, storage: &Storage, src: &Path, mode: RestoreMode)
        -> Result<(), RestoreError>;
}

/// Creates, prunes, lists and restores dumps in one directory.
///
/// Backup and restore never overlap within a process; restore additionally
/// holds a cross-process lock.
#[derive(Debug)]
pub struct BackupManager {
    config: BackupConfig,
    programs: Option<(String, String)>,
    exclusive: Mutex<()>,
}

impl BackupManager {
    pub fn new(config: BackupConfig) -> Self {
        Self {
            config,
            programs: None,
            exclusive: Mutex::new(()),
        }
    }

    /// Use these program names for external dump and load.
    pub fn with_external_programs(
        mut self,
        dump: impl Into<String>,
        load: impl Into<String>,
    ) -> Self {
        self.programs = Some((dump.into(), load.into()));
        self
    }

    pub fn config(&self) -> &BackupConfig {
        &self.config
    }

    fn dump_tool(&self, backend: &Backend) -> Box<dyn DumpTool> {
        match (backend.dialect(), self.config.tool) {
            (None, _) | (Some(_), ToolChoice::Native) => Box::new(NativeDump),
            (Some(dialect), ToolChoice::Auto | ToolChoice::External) => {
                Box::new(self.external(dialect))
            }
        }
    }

    fn external(&self, dialect: db_infra::Dialect) -> ExternalDump {
        let tool = ExternalDump::for_dialect(dialect, self.config.tool_timeout);
        match &self.programs {
            Some((dump, load)) => tool.with_programs(dump.clone(), load.clone()),
            None => tool,
        }
    }

    fn load_tool(&self, backend: &Backend, format: DumpFormat) -> Option<Box<dyn DumpTool>> {
        match (format, backend.dialect()) {
            (DumpFormat::Json, _) => Some(Box::new(NativeDump)),
            (DumpFormat::Sql, Some(dialect)) => Some(Box::new(self.external(dialect))),
            (DumpFormat::Sql, None) => None,
        }
    }

    /// Write a new dump. A partially written file is removed on failure.
    pub async fn backup(&self, storage: &Storage) -> Result<BackupHandle, BackupError> {
        let _exclusive = self.exclusive.lock().await;
        self.backup_locked(storage).await
    }

    async fn backup_locked(&self, storage: &Storage) -> Result<BackupHandle, BackupError> {
        let dir = &self.config.dir;
        tokio::fs::create_dir_all(dir)
            .await
            .map_err(|source| BackupError::Io {
                path: dir.clone(),
                source,
            })?;

        let tool = self.dump_tool(storage.backend());
        let (path, name) = naming::reserve(dir, OffsetDateTime::now_utc(), tool.format())
            .map_err(|source| BackupError::Io {
                path: dir.clone(),
                source,
            })?;

        if let Err(e) = tool.dump(storage, &path).await {
            if let Err(rm) = tokio::fs::remove_file(&path).await {
                warn!(error = %rm, file = %path.display(), "failed to remove partial dump");
            }
            return Err(e);
        }

        let size_bytes = tokio::fs::metadata(&path)
            .await
            .map_err(|source| BackupError::Io {
                path: path.clone(),
                source,
            })?
            .len();

        info!(file = %name.file_name, size_bytes, tool = tool.name(), "backup created");
        Ok(BackupHandle {
            path,
            file_name: name.file_name,
            created_at: name.created_at,
            size_bytes,
            format: name.format,
        })
    }

    /// Back up, then prune to the configured retention.
    pub async fn backup_and_prune(
        &self,
        storage: &Storage,
    ) -> Result<(BackupHandle, usize), BackupError> {
        let _exclusive = self.exclusive.lock().await;
        let handle = self.backup_locked(storage).await?;
        let pruned = self
            .prune_locked(self.config.keep, Some(&handle.file_name))
            .await?;
        Ok((handle, pruned))
    }

    /// Keep `just_created` plus the `keep - 1` newest other dumps and delete
    /// the rest. Files that do not follow the naming scheme are left alone.
    /// Returns how many files were deleted.
    pub async fn prune(&self, keep: usize, just_created: Option<&str>) -> Result<usize, BackupError> {
        let _exclusive = self.exclusive.lock().await;
        self.prune_locked(keep, just_created).await
    }

    async fn prune_locked(&self, keep: usize, just_created: Option<&str>) -> Result<usize, BackupError> {
        let keep = keep.max(1);
        let dumps = self.scan().await?;

        let mut kept = 0usize;
        let mut doomed = Vec::new();
        if let Some(name) = just_created {
            if dumps.iter().any(|d| d.file_name == name) {
                kept += 1;
            }
        }
        for dump in &dumps {
            if Some(dump.file_name.as_str()) == just_created {
                continue;
            }
            if kept < keep {
                kept += 1;
            } else {
                doomed.push(dump);
            }
        }

        let mut deleted = 0usize;
        for dump in doomed {
            match tokio::fs::remove_file(&dump.path).await {
                Ok(()) => {
                    deleted += 1;
                    info!(file = %dump.file_name, "old backup pruned");
                }
                Err(source) => {
                    return Err(BackupError::Io {
                        path: dump.path.clone(),
                        source,
                    })
                }
            }
        }
        Ok(deleted)
    }

    /// All dumps in the directory, newest first.
    pub async fn list(&self) -> Result<Vec<BackupHandle>, BackupError> {
        self.scan().await
    }

    pub async fn latest(&self) -> Result<Option<BackupHandle>, BackupError> {
        Ok(self.scan().await?.into_iter().next())
    }

    /// Look a dump up by exact file name. Only names produced by this
    /// manager are accepted, so callers cannot reach outside the directory.
    pub async fn find(&self, file_name: &str) -> Result<Option<BackupHandle>, BackupError> {
        if naming::parse(file_name).is_none() {
            return Ok(None);
        }
        Ok(self
            .scan()
            .await?
            .into_iter()
            .find(|d| d.file_name == file_name))
    }

    async fn scan(&self) -> Result<Vec<BackupHandle>, BackupError> {
        let dir = &self.config.dir;
        let io_err = |source: std::io::Error| BackupError::Io {
            path: dir.clone(),
            source,
        };

        let mut entries = match tokio::fs::read_dir(dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(io_err(e)),
        };

        let mut names = Vec::new();
        let mut sizes = std::collections::HashMap::new();
        while let Some(entry) = entries.next_entry().await.map_err(io_err)? {
            let Some(file_name) = entry.file_name().to_str().map(str::to_string) else {
                continue;
            };
            let Some(name) = naming::parse(&file_name) else {
                continue;
            };
            let meta = entry.metadata().await.map_err(io_err)?;
            if !meta.is_file() {
                continue;
            }
            sizes.insert(file_name, meta.len());
            names.push(name);
        }

        naming::sort_newest_first(&mut names);
        Ok(names
            .into_iter()
            .map(|name| BackupHandle {
                path: dir.join(&name.file_name),
                size_bytes: sizes.get(&name.file_name).copied().unwrap_or(0),
                file_name: name.file_name,
                created_at: name.created_at,
                format: name.format,
            })
            .collect())
    }

    /// Load `handle` into the database.
    ///
    /// Both modes hold the cross-process restore lock. `Automatic` checks
    /// under that lock that every tracked table is empty and fails with
    /// [`RestoreError::NotEmpty`] otherwise.
    pub async fn restore(
        &self,
        storage: &Storage,
        handle: &BackupHandle,
        mode: RestoreMode,
    ) -> Result<(), RestoreError> {
        let _exclusive = self.exclusive.lock().await;

        let tool = self
            .load_tool(storage.backend(), handle.format)
            .ok_or_else(|| RestoreError::Format {
                path: handle.path.clone(),
                detail: "sql dumps can only be loaded into a server backend".to_string(),
            })?;

        let settings = storage.settings();
        let mut lock = lock_for(storage.conn(), storage.backend(), "restore", settings).await?;
        let guard = acquire_with_backoff(&mut lock, settings.lock_timeout).await?;

        let result = async {
            if mode == RestoreMode::Automatic {
                let counts = count_rows(storage.conn()).await?;
                if !counts.is_empty() {
                    return Err(RestoreError::NotEmpty {
                        rows: counts.total(),
                    });
                }
            }
            tool.load(storage, &handle.path, mode).await
        }
        .await;

        if let Err(e) = guard.release().await {
            warn!(error = %e, "failed to release restore lock");
        }

        match &result {
            Ok(()) => info!(file = %handle.file_name, mode = ?mode, "restore complete"),
            Err(e) => warn!(file = %handle.file_name, mode = ?mode, error = %e, "restore failed"),
        }
        result
    }

    /// Automatic restore of the newest dump.
    pub async fn restore_latest(&self, storage: &Storage) -> Result<BackupHandle, RestoreError> {
        let latest = self.latest().await.map_err(|e| match e {
            BackupError::Io { path, source } => RestoreError::Io { path, source },
            other => RestoreError::Format {
                path: self.config.dir.clone(),
                detail: other.to_string(),
            },
        })?;
        let handle = latest.ok_or(RestoreError::NoDump)?;
        self.restore(storage, &handle, RestoreMode::Automatic).await?;
        Ok(handle)
    }
}
