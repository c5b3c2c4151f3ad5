//! Throw-away SQLite files for tests that need a real embedded database.

use std::path::{Path, PathBuf};

use tempfile::TempDir;

/// A directory that holds a database file (and anything else a test wants to
/// put next to it). Everything is removed on drop.
pub struct TempSqlite {
    dir: TempDir,
    path: PathBuf,
}

impl TempSqlite {
    pub fn new() -> std::io::Result<Self> {
        let dir = tempfile::Builder::new().prefix("clubhouse-test-").tempdir()?;
        let path = dir.path().join("club.db");
        Ok(Self { dir, path })
    }

    /// Path of the database file; it does not exist until something opens it.
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn dir(&self) -> &Path {
        self.dir.path()
    }

    /// Another file path inside the same directory.
    pub fn sibling(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }
}
