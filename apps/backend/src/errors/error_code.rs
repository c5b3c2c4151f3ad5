//! Error codes for the Clubhouse API.
//!
//! Add new codes here; never pass ad-hoc strings as error codes.
//! All codes are SCREAMING_SNAKE_CASE and map 1:1 to the strings that
//! appear in HTTP responses.

use core::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    // Authentication & Authorization
    Unauthorized,
    UnauthorizedMissingToken,
    UnauthorizedInvalidToken,
    UnauthorizedExpiredToken,
    SessionRevoked,
    InvalidCredentials,
    MemberNotApproved,
    Forbidden,
    AdminRequired,
    ConfirmationRequired,
    InvalidConfirmation,

    // Request Validation
    ValidationError,
    BadRequest,
    InvalidUsername,
    InvalidPassword,
    InvalidCourt,
    InvalidTimeRange,
    InvalidDate,
    InvalidStatus,
    InvalidImageReference,
    InvalidImageUpload,

    // Resource Not Found
    NotFound,
    MemberNotFound,
    ReservationNotFound,
    ArticleNotFound,
    BackupNotFound,

    // Business Logic Conflicts
    Conflict,
    UsernameTaken,
    ReservationOverlap,
    DatabaseNotEmpty,
    MaintenanceBusy,

    // Maintenance
    BackupFailed,
    RestoreFailed,
    DumpToolUnavailable,
    FileHostUnavailable,

    // System Errors
    DbError,
    DbUnavailable,
    DbTimeout,
    UniqueViolation,
    FkViolation,
    Internal,
    ConfigError,
}

impl ErrorCode {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Unauthorized => "UNAUTHORIZED",
            Self::UnauthorizedMissingToken => "UNAUTHORIZED_MISSING_TOKEN",
            Self::UnauthorizedInvalidToken => "UNAUTHORIZED_INVALID_TOKEN",
            Self::UnauthorizedExpiredToken => "UNAUTHORIZED_EXPIRED_TOKEN",
            Self::SessionRevoked => "SESSION_REVOKED",
            Self::InvalidCredentials => "INVALID_CREDENTIALS",
            Self::MemberNotApproved => "MEMBER_NOT_APPROVED",
            Self::Forbidden => "FORBIDDEN",
            Self::AdminRequired => "ADMIN_REQUIRED",
            Self::ConfirmationRequired => "CONFIRMATION_REQUIRED",
            Self::InvalidConfirmation => "INVALID_CONFIRMATION",

            Self::ValidationError => "VALIDATION_ERROR",
            Self::BadRequest => "BAD_REQUEST",
            Self::InvalidUsername => "INVALID_USERNAME",
            Self::InvalidPassword => "INVALID_PASSWORD",
            Self::InvalidCourt => "INVALID_COURT",
            Self::InvalidTimeRange => "INVALID_TIME_RANGE",
            Self::InvalidDate => "INVALID_DATE",
            Self::InvalidStatus => "INVALID_STATUS",
            Self::InvalidImageReference => "INVALID_IMAGE_REFERENCE",
            Self::InvalidImageUpload => "INVALID_IMAGE_UPLOAD",

            Self::NotFound => "NOT_FOUND",
            Self::MemberNotFound => "MEMBER_NOT_FOUND",
            Self::ReservationNotFound => "RESERVATION_NOT_FOUND",
            Self::ArticleNotFound => "ARTICLE_NOT_FOUND",
            Self::BackupNotFound => "BACKUP_NOT_FOUND",

            Self::Conflict => "CONFLICT",
            Self::UsernameTaken => "USERNAME_TAKEN",
            Self::ReservationOverlap => "RESERVATION_OVERLAP",
            Self::DatabaseNotEmpty => "DATABASE_NOT_EMPTY",
            Self::MaintenanceBusy => "MAINTENANCE_BUSY",

            Self::BackupFailed => "BACKUP_FAILED",
            Self::RestoreFailed => "RESTORE_FAILED",
            Self::DumpToolUnavailable => "DUMP_TOOL_UNAVAILABLE",
            Self::FileHostUnavailable => "FILE_HOST_UNAVAILABLE",

            Self::DbError => "DB_ERROR",
            Self::DbUnavailable => "DB_UNAVAILABLE",
            Self::DbTimeout => "DB_TIMEOUT",
            Self::UniqueViolation => "UNIQUE_VIOLATION",
            Self::FkViolation => "FK_VIOLATION",
            Self::Internal => "INTERNAL",
            Self::ConfigError => "CONFIG_ERROR",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_render_as_screaming_snake_case() {
        for code in [
            ErrorCode::UnauthorizedMissingToken,
            ErrorCode::ReservationOverlap,
            ErrorCode::DatabaseNotEmpty,
            ErrorCode::DumpToolUnavailable,
            ErrorCode::InvalidImageReference,
        ] {
            let s = code.as_str();
            assert!(s.chars().all(|c| c.is_ascii_uppercase() || c == '_'), "{s}");
            assert_eq!(code.to_string(), s);
        }
    }
}
