// Unit tests for error mapping - pure domain logic without HTTP or database dependencies
use crate::errors::domain::{
    ConflictKind, DomainError, InfraErrorKind, NotFoundKind, ValidationKind,
};
use crate::{AppError, ErrorCode};

#[test]
fn maps_validation_to_422() {
    let de = DomainError::validation(ValidationKind::Court, "court 7 does not exist");
    let app: AppError = de.into();
    assert_eq!(app.code(), ErrorCode::InvalidCourt);
    assert_eq!(app.status().as_u16(), 422);

    let other = DomainError::validation(ValidationKind::Other("misc".into()), "bad field");
    let app: AppError = other.into();
    assert_eq!(app.code(), ErrorCode::ValidationError);
}

#[test]
fn maps_conflicts() {
    let overlap = DomainError::conflict(ConflictKind::ReservationOverlap, "court taken");
    let app: AppError = overlap.into();
    assert_eq!(app.code().as_str(), "RESERVATION_OVERLAP");
    assert_eq!(app.status().as_u16(), 409);

    let taken = DomainError::conflict(ConflictKind::UsernameTaken, "username exists");
    let app: AppError = taken.into();
    assert_eq!(app.code().as_str(), "USERNAME_TAKEN");

    let other = DomainError::conflict(ConflictKind::Other("x".to_string()), "generic conflict");
    let app: AppError = other.into();
    assert_eq!(app.code().as_str(), "CONFLICT");
    assert_eq!(app.status().as_u16(), 409);
}

#[test]
fn maps_not_found() {
    let nf = DomainError::not_found(NotFoundKind::Article, "no article");
    let app: AppError = nf.into();
    assert_eq!(app.code().as_str(), "ARTICLE_NOT_FOUND");
    assert_eq!(app.status().as_u16(), 404);
}

#[test]
fn maps_infra() {
    let t = DomainError::infra(InfraErrorKind::Timeout, "timeout");
    let app: AppError = t.into();
    assert_eq!(app.code().as_str(), "DB_TIMEOUT");
    assert_eq!(app.status().as_u16(), 504);
    assert!(matches!(app, AppError::Timeout { .. }));

    let down = DomainError::infra(InfraErrorKind::DbUnavailable, "down");
    let app: AppError = down.into();
    assert_eq!(app.code().as_str(), "DB_UNAVAILABLE");
    assert_eq!(app.status().as_u16(), 503);

    let other = DomainError::infra(InfraErrorKind::Other("unknown".to_string()), "other");
    let app: AppError = other.into();
    assert_eq!(app.code().as_str(), "DB_ERROR");
    assert_eq!(app.status().as_u16(), 500);
}

#[test]
fn admin_required_is_forbidden() {
    let app = AppError::admin_required();
    assert_eq!(app.code(), ErrorCode::AdminRequired);
    assert_eq!(app.status().as_u16(), 403);
}
