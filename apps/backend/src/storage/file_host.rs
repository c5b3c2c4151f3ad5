//! Where article images live.
//!
//! The database only stores public paths; the bytes are on a file host,
//! either a local directory served under a URL prefix or a remote FTP server
//! (see [`super::ftp_host`]).

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use thiserror::Error;
use tracing::debug;

pub(crate) const ALLOWED_EXTENSIONS: [&str; 5] = ["jpg", "jpeg", "png", "gif", "webp"];

#[derive(Debug, Error)]
pub enum HostError {
    #[error("file host unreachable: {0}")]
    Unreachable(String),
    #[error("file host did not answer within {secs}s")]
    Timeout { secs: u64 },
    #[error("file host i/o error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("file host rejected the request: {0}")]
    Rejected(String),
    #[error("invalid file name: {0}")]
    InvalidName(String),
}

#[async_trait]
pub trait FileHost: Send + Sync {
    /// Names of every stored file (no directories).
    async fn list(&self) -> Result<Vec<String>, HostError>;

    /// Store `bytes` under a content-derived name and return its public path.
    async fn upload(&self, original_name: &str, bytes: &[u8]) -> Result<String, HostError>;

    /// Log-friendly description of the host.
    fn describe(&self) -> String;
}

/// A directory on local disk, published under `public_prefix`.
#[derive(Debug, Clone)]
pub struct LocalFileHost {
    root: PathBuf,
    public_prefix: String,
}

impl LocalFileHost {
    pub fn new(root: impl Into<PathBuf>, public_prefix: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            public_prefix: public_prefix.into(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

/// `<first 32 hex chars of blake3(bytes)>.<ext>`, so identical uploads share
/// one file and names never collide with user input.
pub fn content_name(original_name: &str, bytes: &[u8]) -> Result<String, HostError> {
    let ext = Path::new(original_name)
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .filter(|e| ALLOWED_EXTENSIONS.contains(&e.as_str()))
        .ok_or_else(|| HostError::InvalidName(original_name.to_string()))?;

    let digest = blake3::hash(bytes).to_hex();
    Ok(format!("{}.{ext}", &digest.as_str()[..32]))
}

#[async_trait]
impl FileHost for LocalFileHost {
    async fn list(&self) -> Result<Vec<String>, HostError> {
        let mut entries = match tokio::fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            // a missing directory usually means an unmounted volume
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(HostError::Unreachable(format!(
                    "{} does not exist",
                    self.root.display()
                )))
            }
            Err(source) => {
                return Err(HostError::Io {
                    path: self.root.clone(),
                    source,
                })
            }
        };

        let mut names = Vec::new();
        loop {
            let entry = entries.next_entry().await.map_err(|source| HostError::Io {
                path: self.root.clone(),
                source,
            })?;
            let Some(entry) = entry else { break };

            let is_file = entry
                .file_type()
                .await
                .map(|t| t.is_file())
                .unwrap_or(false);
            if !is_file {
                continue;
            }
            // dot-files are upload temporaries, never published images
            match entry.file_name().to_str() {
                Some(name) if !name.starts_with('.') => names.push(name.to_string()),
                _ => {}
            }
        }
        names.sort();
        Ok(names)
    }

    async fn upload(&self, original_name: &str, bytes: &[u8]) -> Result<String, HostError> {
        if bytes.is_empty() {
            return Err(HostError::InvalidName(format!("{original_name} is empty")));
        }
        let name = content_name(original_name, bytes)?;
        let io_err = |path: &Path| {
            let path = path.to_path_buf();
            move |source| HostError::Io { path, source }
        };

        tokio::fs::create_dir_all(&self.root)
            .await
            .map_err(io_err(&self.root))?;

        let target = self.root.join(&name);
        if tokio::fs::try_exists(&target).await.unwrap_or(false) {
            debug!(file = %name, "image already stored");
        } else {
            let partial = self.root.join(format!(".{name}.partial"));
            tokio::fs::write(&partial, bytes)
                .await
                .map_err(io_err(&partial))?;
            tokio::fs::rename(&partial, &target)
                .await
                .map_err(io_err(&target))?;
            debug!(file = %name, size = bytes.len(), "image stored");
        }

        Ok(format!("{}{name}", self.public_prefix))
    }

    fn describe(&self) -> String {
        format!("local:{}", self.root.display())
    }
}
