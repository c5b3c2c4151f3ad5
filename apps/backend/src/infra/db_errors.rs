//! SeaORM -> DomainError translation helpers.
//!
//! Repositories convert `sea_orm::DbErr` into `DomainError` here, and higher
//! layers map `DomainError` to `AppError` via `From`.

use tracing::{error, warn};

use crate::errors::domain::{ConflictKind, DomainError, InfraErrorKind, NotFoundKind, ValidationKind};
use crate::trace_ctx;

fn mentions_sqlstate(msg: &str, code: &str) -> bool {
    msg.contains(code) || msg.contains(&format!("SQLSTATE({code})"))
}

fn is_unique_violation(msg: &str) -> bool {
    mentions_sqlstate(msg, "23505")
        || msg.contains("duplicate key value violates unique constraint")
        || msg.contains("UNIQUE constraint failed")
        || msg.contains("Duplicate entry")
}

fn is_fk_violation(msg: &str) -> bool {
    mentions_sqlstate(msg, "23503")
        || msg.contains("FOREIGN KEY constraint failed")
        || msg.contains("a foreign key constraint fails")
}

/// Postgres `40001`, MySQL deadlock victims and SQLite stale WAL snapshots.
fn is_serialization_failure(msg: &str) -> bool {
    mentions_sqlstate(msg, "40001")
        || msg.contains("could not serialize access")
        || msg.contains("Deadlock found")
        || msg.contains("database is locked")
}

/// SQLite reports `members.username`, Postgres and MySQL report the index name.
fn unique_target_is_username(msg: &str) -> bool {
    msg.contains("members.username") || msg.contains("ux_members_username")
}

/// Translate a `DbErr` into a `DomainError` whose detail is safe to show to clients.
pub fn map_db_err(e: sea_orm::DbErr) -> DomainError {
    let error_msg = e.to_string();
    let trace_id = trace_ctx::trace_id();

    match &e {
        sea_orm::DbErr::RecordNotFound(_) => {
            return DomainError::not_found(NotFoundKind::Other("Record".into()), "Record not found");
        }
        sea_orm::DbErr::ConnectionAcquire(_) | sea_orm::DbErr::Conn(_) => {
            warn!(trace_id = %trace_id, raw_error = %error_msg, "Database unavailable");
            return DomainError::infra(InfraErrorKind::DbUnavailable, "Database unavailable");
        }
        _ => {}
    }

    if is_unique_violation(&error_msg) {
        warn!(trace_id = %trace_id, raw_error = %error_msg, "Unique constraint violation");
        if unique_target_is_username(&error_msg) {
            return DomainError::conflict(ConflictKind::UsernameTaken, "Username already taken");
        }
        return DomainError::conflict(ConflictKind::Other("Unique".into()), "Unique constraint violation");
    }

    if is_fk_violation(&error_msg) {
        warn!(trace_id = %trace_id, raw_error = %error_msg, "Foreign key constraint violation");
        return DomainError::validation(
            ValidationKind::Other("FK_VIOLATION".into()),
            "Referenced record does not exist",
        );
    }

    if is_serialization_failure(&error_msg) {
        warn!(trace_id = %trace_id, raw_error = %error_msg, "Concurrent write conflict");
        return DomainError::conflict(
            ConflictKind::Other("SERIALIZATION".into()),
            "A concurrent change got there first; try again",
        );
    }

    if error_msg.contains("timed out") || error_msg.contains("timeout") {
        warn!(trace_id = %trace_id, raw_error = %error_msg, "Database timeout");
        return DomainError::infra(InfraErrorKind::Timeout, "Database timeout");
    }

    error!(trace_id = %trace_id, raw_error = %error_msg, "Unhandled database error");
    DomainError::infra(InfraErrorKind::Other("DbErr".into()), "Database operation failed")
}

#[cfg(test)]
mod tests {
    use sea_orm::{DbErr, RuntimeErr};

    use super::*;

    fn exec_err(msg: &str) -> DbErr {
        DbErr::Exec(RuntimeErr::Internal(msg.to_string()))
    }

    #[test]
    fn username_unique_violation_is_username_taken() {
        for msg in [
            "UNIQUE constraint failed: members.username",
            "duplicate key value violates unique constraint \"ux_members_username\"",
            "Duplicate entry 'ana' for key 'members.ux_members_username'",
        ] {
            let mapped = map_db_err(exec_err(msg));
            assert!(
                matches!(mapped, DomainError::Conflict(ConflictKind::UsernameTaken, _)),
                "{msg} -> {mapped:?}"
            );
        }
    }

    #[test]
    fn other_unique_violation_is_generic_conflict() {
        let mapped = map_db_err(exec_err("UNIQUE constraint failed: app_settings.key"));
        assert!(matches!(mapped, DomainError::Conflict(ConflictKind::Other(_), _)));
    }

    #[test]
    fn serialization_failures_are_conflicts() {
        for msg in [
            "error returned from database: could not serialize access due to read/write dependencies among transactions",
            "SQLSTATE(40001) serialization failure",
            "Deadlock found when trying to get lock; try restarting transaction",
            "database is locked",
        ] {
            let mapped = map_db_err(exec_err(msg));
            assert!(
                matches!(mapped, DomainError::Conflict(ConflictKind::Other(_), _)),
                "{msg} -> {mapped:?}"
            );
        }
    }

    #[test]
    fn record_not_found_maps_to_not_found() {
        let mapped = map_db_err(DbErr::RecordNotFound("members".into()));
        assert!(matches!(mapped, DomainError::NotFound(_, _)));
    }

    #[test]
    fn unknown_errors_do_not_leak_raw_text() {
        let mapped = map_db_err(exec_err("syntax error near SELEKT password_hash"));
        match mapped {
            DomainError::Infra(_, detail) => assert!(!detail.contains("password_hash")),
            other => panic!("unexpected mapping {other:?}"),
        }
    }
}
