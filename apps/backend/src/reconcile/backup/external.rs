//! Dumps through the server's own client tools (`pg_dump`/`psql`,
//! `mysqldump`/`mysql`).
//!
//! Passwords travel through the tools' environment variables rather than the
//! command line, so they never show up in process listings.

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use db_infra::config::db::{parse_server_url, ServerUrl};
use db_infra::{Backend, Dialect};
use tokio::process::Command;
use tracing::{debug, info};

use super::{BackupError, DumpFormat, DumpTool, RestoreError, RestoreMode};
use crate::storage::Storage;

/// Longest stderr excerpt kept in an error.
const STDERR_LIMIT: usize = 2000;

#[derive(Debug, Clone)]
pub struct ExternalDump {
    dialect: Dialect,
    dump_program: String,
    load_program: String,
    timeout: Duration,
}

impl ExternalDump {
    pub fn for_dialect(dialect: Dialect, timeout: Duration) -> Self {
        let (dump_program, load_program) = match dialect {
            Dialect::Postgres => ("pg_dump", "psql"),
            Dialect::MySql => ("mysqldump", "mysql"),
        };
        Self {
            dialect,
            dump_program: dump_program.to_string(),
            load_program: load_program.to_string(),
            timeout,
        }
    }

    /// Replace the program names, e.g. with absolute paths.
    pub fn with_programs(mut self, dump: impl Into<String>, load: impl Into<String>) -> Self {
        self.dump_program = dump.into();
        self.load_program = load.into();
        self
    }

    fn dump_invocation(&self, server: &ServerUrl, dest: &Path) -> Invocation {
        let dest = dest.display().to_string();
        let mut args: Vec<String> = Vec::new();
        match self.dialect {
            Dialect::Postgres => {
                args.extend(
                    ["--clean", "--if-exists", "--no-owner", "--no-privileges"].map(String::from),
                );
                push_pg_target(&mut args, server);
                args.extend(["--file".to_string(), dest]);
            }
            Dialect::MySql => {
                push_mysql_target(&mut args, server);
                args.extend(
                    ["--single-transaction", "--routines", "--add-drop-table"].map(String::from),
                );
                args.extend([format!("--result-file={dest}"), server.database.clone()]);
            }
        }
        Invocation {
            program: self.dump_program.clone(),
            args,
            envs: password_env(self.dialect, server),
            stdin_from: None,
        }
    }

    fn load_invocation(&self, server: &ServerUrl, src: &Path) -> Invocation {
        let mut args: Vec<String> = Vec::new();
        let stdin_from = match self.dialect {
            Dialect::Postgres => {
                args.extend(["-v", "ON_ERROR_STOP=1", "--quiet"].map(String::from));
                push_pg_target(&mut args, server);
                args.extend(["--file".to_string(), src.display().to_string()]);
                None
            }
            Dialect::MySql => {
                push_mysql_target(&mut args, server);
                args.push(server.database.clone());
                Some(src.to_path_buf())
            }
        };
        Invocation {
            program: self.load_program.clone(),
            args,
            envs: password_env(self.dialect, server),
            stdin_from,
        }
    }
}

fn push_pg_target(args: &mut Vec<String>, server: &ServerUrl) {
    args.extend(["--host".to_string(), server.host.clone()]);
    if let Some(port) = server.port {
        args.extend(["--port".to_string(), port.to_string()]);
    }
    if let Some(user) = &server.user {
        args.extend(["--username".to_string(), user.clone()]);
    }
    args.extend(["--dbname".to_string(), server.database.clone()]);
}

fn push_mysql_target(args: &mut Vec<String>, server: &ServerUrl) {
    args.push(format!("--host={}", server.host));
    if let Some(port) = server.port {
        args.push(format!("--port={port}"));
    }
    if let Some(user) = &server.user {
        args.push(format!("--user={user}"));
    }
}

fn password_env(dialect: Dialect, server: &ServerUrl) -> Vec<(String, String)> {
    let var = match dialect {
        Dialect::Postgres => "PGPASSWORD",
        Dialect::MySql => "MYSQL_PWD",
    };
    server
        .password
        .iter()
        .map(|p| (var.to_string(), p.clone()))
        .collect()
}

struct Invocation {
    program: String,
    args: Vec<String>,
    envs: Vec<(String, String)>,
    stdin_from: Option<std::path::PathBuf>,
}

/// How a tool run went wrong, before it is mapped onto the caller's error.
#[derive(Debug)]
enum ToolFailure {
    Unavailable,
    Failed { status: String, stderr: String },
    Timeout,
    Io(std::io::Error),
}

async fn run(invocation: Invocation, timeout: Duration) -> Result<(), ToolFailure> {
    let mut cmd = Command::new(&invocation.program);
    cmd.args(&invocation.args)
        .envs(invocation.envs.iter().map(|(k, v)| (k.as_str(), v.as_str())))
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    match &invocation.stdin_from {
        Some(path) => {
            let file = std::fs::File::open(path).map_err(ToolFailure::Io)?;
            cmd.stdin(Stdio::from(file));
        }
        None => {
            cmd.stdin(Stdio::null());
        }
    }

    debug!(program = %invocation.program, args = ?invocation.args, "running dump tool");
    let child = match cmd.spawn() {
        Ok(child) => child,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Err(ToolFailure::Unavailable),
        Err(e) => return Err(ToolFailure::Io(e)),
    };

    // dropping the child on timeout kills it
    let output = match tokio::time::timeout(timeout, child.wait_with_output()).await {
        Ok(result) => result.map_err(ToolFailure::Io)?,
        Err(_) => return Err(ToolFailure::Timeout),
    };

    if output.status.success() {
        return Ok(());
    }
    let mut stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
    if stderr.len() > STDERR_LIMIT {
        let mut cut = STDERR_LIMIT;
        while !stderr.is_char_boundary(cut) {
            cut -= 1;
        }
        stderr.truncate(cut);
    }
    Err(ToolFailure::Failed {
        status: output.status.to_string(),
        stderr,
    })
}

fn server_of(storage: &Storage) -> Option<(Dialect, &str)> {
    match storage.backend() {
        Backend::Server { dialect, url } => Some((*dialect, url.as_str())),
        Backend::Embedded { .. } => None,
    }
}

#[async_trait]
impl DumpTool for ExternalDump {
    fn format(&self) -> DumpFormat {
        DumpFormat::Sql
    }

    fn name(&self) -> &'static str {
        match self.dialect {
            Dialect::Postgres => "pg_dump",
            Dialect::MySql => "mysqldump",
        }
    }

    async fn dump(&self, storage: &Storage, dest: &Path) -> Result<(), BackupError> {
        let Some((_, url)) = server_of(storage) else {
            return Err(BackupError::Unsupported(
                "external dump tools need a server backend".to_string(),
            ));
        };
        let server = parse_server_url(url).map_err(|e| BackupError::Unsupported(e.to_string()))?;
        let tool = self.dump_program.clone();

        run(self.dump_invocation(&server, dest), self.timeout)
            .await
            .map_err(|failure| match failure {
                ToolFailure::Unavailable => BackupError::ToolUnavailable { tool },
                ToolFailure::Failed { status, stderr } => BackupError::ToolFailed {
                    tool,
                    status,
                    stderr,
                },
                ToolFailure::Timeout => BackupError::Timeout {
                    tool,
                    secs: self.timeout.as_secs(),
                },
                ToolFailure::Io(source) => BackupError::Io {
                    path: dest.to_path_buf(),
                    source,
                },
            })?;
        info!(tool = %self.dump_program, file = %dest.display(), "external dump written");
        Ok(())
    }

    async fn load(
        &self,
        storage: &Storage,
        src: &Path,
        mode: RestoreMode,
    ) -> Result<(), RestoreError> {
        let Some((_, url)) = server_of(storage) else {
            return Err(RestoreError::Format {
                path: src.to_path_buf(),
                detail: "sql dumps can only be loaded into a server backend".to_string(),
            });
        };
        let server = parse_server_url(url).map_err(|e| RestoreError::Format {
            path: src.to_path_buf(),
            detail: e.to_string(),
        })?;
        let tool = self.load_program.clone();

        run(self.load_invocation(&server, src), self.timeout)
            .await
            .map_err(|failure| match failure {
                ToolFailure::Unavailable => RestoreError::ToolUnavailable { tool },
                ToolFailure::Failed { status, stderr } => RestoreError::ToolFailed {
                    tool,
                    status,
                    stderr,
                },
                ToolFailure::Timeout => RestoreError::Timeout {
                    tool,
                    secs: self.timeout.as_secs(),
                },
                ToolFailure::Io(source) => RestoreError::Io {
                    path: src.to_path_buf(),
                    source,
                },
            })?;
        info!(tool = %self.load_program, file = %src.display(), mode = ?mode, "external dump restored");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn server() -> ServerUrl {
        ServerUrl {
            host: "db".into(),
            port: Some(5433),
            user: Some("club".into()),
            password: Some("s3cret".into()),
            database: "club".into(),
        }
    }

    #[test]
    fn pg_dump_is_clean_and_keeps_password_off_the_command_line() {
        let tool = ExternalDump::for_dialect(Dialect::Postgres, Duration::from_secs(5));
        let inv = tool.dump_invocation(&server(), Path::new("/b/x.sql"));
        assert_eq!(inv.program, "pg_dump");
        for flag in ["--clean", "--if-exists", "--no-owner", "--no-privileges"] {
            assert!(inv.args.iter().any(|a| a == flag), "{flag}");
        }
        assert!(inv.args.iter().all(|a| !a.contains("s3cret")));
        assert_eq!(inv.envs, vec![("PGPASSWORD".to_string(), "s3cret".to_string())]);
    }

    #[test]
    fn mysql_restore_reads_dump_from_stdin() {
        let tool = ExternalDump::for_dialect(Dialect::MySql, Duration::from_secs(5));
        let inv = tool.load_invocation(&server(), Path::new("/b/x.sql"));
        assert_eq!(inv.program, "mysql");
        assert_eq!(inv.stdin_from.as_deref(), Some(Path::new("/b/x.sql")));
        assert_eq!(inv.args.last().map(String::as_str), Some("club"));
        assert_eq!(inv.envs[0].0, "MYSQL_PWD");
    }

    #[tokio::test]
    async fn missing_program_is_unavailable() {
        let inv = Invocation {
            program: "clubhouse-no-such-dump-tool".into(),
            args: vec![],
            envs: vec![],
            stdin_from: None,
        };
        assert!(matches!(
            run(inv, Duration::from_secs(1)).await,
            Err(ToolFailure::Unavailable)
        ));
    }
}
