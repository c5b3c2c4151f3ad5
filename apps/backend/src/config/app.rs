//! Process configuration, read once from the environment.
//!
//! Database selection and connection tuning live in `db_infra::config::db`;
//! this module adds everything else the server and `clubctl` need.

use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use db_infra::config::db::{env_parse, legacy_sqlite_path};
use db_infra::{Backend, ConnectSettings, DbInfraError};

use crate::error::AppError;
use crate::reconcile::backup::{BackupConfig, ToolChoice, DEFAULT_KEEP, DEFAULT_TOOL_TIMEOUT};
use crate::reconcile::images::{ImagePolicy, DEFAULT_IMAGE, DEFAULT_URL_PREFIX};
use crate::state::security_config::SecurityConfig;
use crate::storage::{FileHost, FtpFileHost, FtpHostConfig, LocalFileHost};

pub const DEFAULT_IMAGE_DIR: &str = "static/article_images";
const MIN_SECRET_LEN: usize = 32;

/// Where article image files live.
#[derive(Debug, Clone)]
pub enum ImageHostConfig {
    Local { dir: PathBuf },
    Ftp(FtpHostConfig),
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,

    pub backend: Backend,
    pub connect: ConnectSettings,
    pub legacy_sqlite_path: PathBuf,

    /// Needed only by the HTTP server; see [`AppConfig::security`].
    pub session_secret: Option<String>,
    pub bcrypt_cost: u32,
    pub bootstrap_admin_password: Option<String>,

    pub backup: BackupConfig,
    /// Value of the backup flag until one has been persisted.
    pub backup_enabled_default: bool,

    /// `CLUB_IMAGE_HOST` (an `ftp://` url) when set, else `CLUB_IMAGE_DIR`.
    pub image_host: ImageHostConfig,
    pub images: ImagePolicy,

    pub max_upload_size: usize,
}

fn infra(e: DbInfraError) -> AppError {
    AppError::config(e.to_string())
}

fn optional_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn parse_bool(name: &str, default: bool) -> Result<bool, AppError> {
    match optional_var(name) {
        None => Ok(default),
        Some(raw) => match raw.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            other => Err(AppError::config(format!(
                "{name} must be a boolean, got '{other}'"
            ))),
        },
    }
}

impl AppConfig {
    /// Load and validate all configuration from environment variables.
    pub fn from_env() -> Result<Self, AppError> {
        let host = env::var("BACKEND_HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
        let port = env_parse("BACKEND_PORT", 3001u16).map_err(infra)?;

        let backend = Backend::from_env().map_err(infra)?;
        let connect = ConnectSettings::from_env().map_err(infra)?;

        let bcrypt_cost = env_parse("CLUB_BCRYPT_COST", bcrypt::DEFAULT_COST).map_err(infra)?;
        if !(4..=31).contains(&bcrypt_cost) {
            return Err(AppError::config(format!(
                "CLUB_BCRYPT_COST must be between 4 and 31, got {bcrypt_cost}"
            )));
        }

        let tool = match optional_var("CLUB_BACKUP_TOOL") {
            Some(raw) => ToolChoice::from_str(&raw).map_err(AppError::config)?,
            None => ToolChoice::Auto,
        };
        let backup = BackupConfig {
            dir: optional_var("CLUB_BACKUP_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| BackupConfig::default().dir),
            keep: env_parse("CLUB_BACKUP_KEEP", DEFAULT_KEEP).map_err(infra)?,
            tool,
            tool_timeout: Duration::from_secs(
                env_parse("CLUB_TOOL_TIMEOUT_SECS", DEFAULT_TOOL_TIMEOUT.as_secs())
                    .map_err(infra)?,
            ),
        };
        if backup.keep == 0 {
            return Err(AppError::config("CLUB_BACKUP_KEEP must be at least 1"));
        }

        let mut url_prefix =
            optional_var("CLUB_IMAGE_URL_PREFIX").unwrap_or_else(|| DEFAULT_URL_PREFIX.to_string());
        if !url_prefix.ends_with('/') {
            url_prefix.push('/');
        }
        let images = ImagePolicy {
            url_prefix,
            default_image: optional_var("CLUB_DEFAULT_IMAGE")
                .unwrap_or_else(|| DEFAULT_IMAGE.to_string()),
            list_timeout: Duration::from_secs(
                env_parse("CLUB_IMAGE_LIST_TIMEOUT_SECS", 10u64).map_err(infra)?,
            ),
        };

        let image_host = match optional_var("CLUB_IMAGE_HOST") {
            Some(url) => ImageHostConfig::Ftp(
                FtpHostConfig::from_url(&url, images.url_prefix.clone(), images.list_timeout)
                    .map_err(|e| AppError::config(format!("CLUB_IMAGE_HOST: {e}")))?,
            ),
            None => ImageHostConfig::Local {
                dir: optional_var("CLUB_IMAGE_DIR")
                    .map(PathBuf::from)
                    .unwrap_or_else(|| PathBuf::from(DEFAULT_IMAGE_DIR)),
            },
        };

        Ok(Self {
            host,
            port,
            backend,
            connect,
            legacy_sqlite_path: legacy_sqlite_path(),
            session_secret: optional_var("CLUB_SESSION_SECRET"),
            bcrypt_cost,
            bootstrap_admin_password: optional_var("CLUB_BOOTSTRAP_ADMIN_PASSWORD"),
            backup,
            backup_enabled_default: parse_bool("CLUB_BACKUP_ENABLED_DEFAULT", true)?,
            image_host,
            images,
            max_upload_size: env_parse("CLUB_MAX_UPLOAD_BYTES", 5 * 1024 * 1024usize)
                .map_err(infra)?,
        })
    }

    pub fn file_host(&self) -> Arc<dyn FileHost> {
        match &self.image_host {
            ImageHostConfig::Local { dir } => Arc::new(LocalFileHost::new(
                dir.clone(),
                self.images.url_prefix.clone(),
            )),
            ImageHostConfig::Ftp(ftp) => Arc::new(FtpFileHost::new(ftp.clone())),
        }
    }

    /// Token signing settings. The server refuses to start without a secret.
    pub fn security(&self) -> Result<SecurityConfig, AppError> {
        let secret = self
            .session_secret
            .as_deref()
            .ok_or_else(|| AppError::config("CLUB_SESSION_SECRET must be set"))?;
        if secret.len() < MIN_SECRET_LEN {
            return Err(AppError::config(format!(
                "CLUB_SESSION_SECRET must be at least {MIN_SECRET_LEN} bytes"
            )));
        }
        Ok(SecurityConfig::new(secret.as_bytes()).with_bcrypt_cost(self.bcrypt_cost))
    }
}

#[cfg(test)]
mod tests {
    use serial_test::serial;

    use super::*;

    const VARS: [&str; 10] = [
        "DATABASE_URL",
        "CLUB_IMAGE_HOST",
        "CLUB_IMAGE_DIR",
        "CLUB_SESSION_SECRET",
        "CLUB_BACKUP_KEEP",
        "CLUB_BACKUP_TOOL",
        "CLUB_BACKUP_ENABLED_DEFAULT",
        "CLUB_IMAGE_URL_PREFIX",
        "BACKEND_PORT",
        "CLUB_BCRYPT_COST",
    ];

    fn clear() {
        for var in VARS {
            env::remove_var(var);
        }
    }

    #[test]
    #[serial]
    fn defaults_select_embedded_backend() {
        clear();
        let config = AppConfig::from_env().unwrap();
        assert!(!config.backend.is_server());
        assert_eq!(config.port, 3001);
        assert_eq!(config.backup.keep, 5);
        assert_eq!(config.backup.tool, ToolChoice::Auto);
        assert!(config.backup_enabled_default);
        assert_eq!(config.images.url_prefix, DEFAULT_URL_PREFIX);
        assert!(config.security().is_err());
        assert!(matches!(
            &config.image_host,
            ImageHostConfig::Local { dir } if dir == &PathBuf::from(DEFAULT_IMAGE_DIR)
        ));
        assert!(config.file_host().describe().starts_with("local:"));
    }

    #[test]
    #[serial]
    fn ftp_image_host_is_selected_by_url() {
        clear();
        env::set_var("CLUB_IMAGE_DIR", "/ignored");
        env::set_var("CLUB_IMAGE_HOST", "ftp://club:pw@files.example.com/static/article_images");

        let config = AppConfig::from_env().unwrap();
        let ImageHostConfig::Ftp(ftp) = &config.image_host else {
            panic!("expected an ftp host, got {:?}", config.image_host);
        };
        assert_eq!(ftp.host, "files.example.com");
        assert_eq!(ftp.directory, "static/article_images");
        assert_eq!(ftp.public_prefix, DEFAULT_URL_PREFIX);
        assert_eq!(
            config.file_host().describe(),
            "ftp://club@files.example.com:21/static/article_images"
        );
        clear();
    }

    #[test]
    #[serial]
    fn overrides_are_applied() {
        clear();
        env::set_var("CLUB_BACKUP_KEEP", "9");
        env::set_var("CLUB_BACKUP_TOOL", "native");
        env::set_var("CLUB_BACKUP_ENABLED_DEFAULT", "off");
        env::set_var("CLUB_IMAGE_URL_PREFIX", "/media");
        env::set_var("CLUB_SESSION_SECRET", "0123456789abcdef0123456789abcdef");

        let config = AppConfig::from_env().unwrap();
        assert_eq!(config.backup.keep, 9);
        assert_eq!(config.backup.tool, ToolChoice::Native);
        assert!(!config.backup_enabled_default);
        assert_eq!(config.images.url_prefix, "/media/");
        assert!(config.security().is_ok());
        clear();
    }

    #[test]
    #[serial]
    fn malformed_values_are_config_errors() {
        for (var, value) in [
            ("BACKEND_PORT", "eighty"),
            ("CLUB_BACKUP_KEEP", "0"),
            ("CLUB_BACKUP_TOOL", "tar"),
            ("CLUB_BACKUP_ENABLED_DEFAULT", "perhaps"),
            ("CLUB_BCRYPT_COST", "2"),
            ("CLUB_IMAGE_HOST", "https://files.example.com/img"),
        ] {
            clear();
            env::set_var(var, value);
            let err = AppConfig::from_env().unwrap_err();
            assert!(matches!(err, AppError::Config { .. }), "{var}={value}");
        }
        clear();
    }
}
