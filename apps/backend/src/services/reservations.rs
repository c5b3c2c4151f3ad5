use sea_orm::{ConnectionTrait, DatabaseBackend, IsolationLevel, TransactionTrait};
use serde::Deserialize;
use time::macros::{format_description, time};
use time::{Date, Time};
use tracing::info;

use crate::entities::members::Model as Member;
use crate::entities::reservations::{Model as Reservation, ReservationStatus};
use crate::error::AppError;
use crate::errors::domain::{ConflictKind, DomainError, ValidationKind};
use crate::errors::ErrorCode;
use crate::infra::db_errors::map_db_err;
use crate::repos::reservations::{self as reservations_repo, NewReservation};

pub const COURTS: std::ops::RangeInclusive<i16> = 1..=3;
pub const OPENS_AT: Time = time!(8:00);
pub const CLOSES_AT: Time = time!(22:00);

/// Reservation request as it arrives over the wire.
#[derive(Debug, Clone, Deserialize)]
pub struct ReservationRequest {
    pub court: i16,
    /// `YYYY-MM-DD`
    pub date: String,
    /// `HH:MM`
    pub start_time: String,
    /// `HH:MM`
    pub end_time: String,
}

pub fn parse_date(raw: &str) -> Result<Date, DomainError> {
    Date::parse(raw.trim(), format_description!("[year]-[month]-[day]")).map_err(|_| {
        DomainError::validation(ValidationKind::Date, format!("'{raw}' is not a YYYY-MM-DD date"))
    })
}

fn parse_time(raw: &str) -> Result<Time, DomainError> {
    Time::parse(raw.trim(), format_description!("[hour]:[minute]")).map_err(|_| {
        DomainError::validation(ValidationKind::TimeRange, format!("'{raw}' is not an HH:MM time"))
    })
}

/// Validated reservation slot.
pub fn validate(request: &ReservationRequest) -> Result<(i16, Date, Time, Time), DomainError> {
    if !COURTS.contains(&request.court) {
        return Err(DomainError::validation(
            ValidationKind::Court,
            format!("Court must be between {} and {}", COURTS.start(), COURTS.end()),
        ));
    }
    let date = parse_date(&request.date)?;
    let start = parse_time(&request.start_time)?;
    let end = parse_time(&request.end_time)?;

    if start >= end {
        return Err(DomainError::validation(
            ValidationKind::TimeRange,
            "End time must be after start time",
        ));
    }
    if start < OPENS_AT || end > CLOSES_AT {
        return Err(DomainError::validation(
            ValidationKind::TimeRange,
            "Courts are open from 08:00 to 22:00",
        ));
    }
    Ok((request.court, date, start, end))
}

/// Isolation for the check-then-insert of a booking. Postgres and MySQL run
/// it serializable so two concurrent bookings cannot both pass the overlap
/// check; the loser fails with a serialization error mapped to a conflict.
/// SQLite already allows a single writer at a time.
fn booking_isolation(backend: DatabaseBackend) -> Option<IsolationLevel> {
    match backend {
        DatabaseBackend::Sqlite => None,
        _ => Some(IsolationLevel::Serializable),
    }
}

/// Book a slot. The overlap check and the insert share one transaction.
pub async fn create<C: ConnectionTrait + TransactionTrait + Send + Sync>(
    conn: &C,
    member: &Member,
    request: &ReservationRequest,
) -> Result<Reservation, AppError> {
    let (court, date, start_time, end_time) = validate(request)?;

    let txn = conn
        .begin_with_config(booking_isolation(conn.get_database_backend()), None)
        .await
        .map_err(map_db_err)?;
    let clashes =
        reservations_repo::find_overlapping(&txn, court, date, start_time, end_time).await?;
    if let Some(existing) = clashes.first() {
        return Err(DomainError::conflict(
            ConflictKind::ReservationOverlap,
            format!(
                "Court {court} is already booked by reservation {}",
                existing.id
            ),
        )
        .into());
    }
    let reservation = reservations_repo::create_reservation(
        &txn,
        NewReservation {
            member_id: member.id,
            court,
            date,
            start_time,
            end_time,
        },
    )
    .await?;
    txn.commit().await.map_err(map_db_err)?;

    info!(
        reservation_id = reservation.id,
        member_id = member.id,
        court,
        date = %date,
        "reservation created"
    );
    Ok(reservation)
}

pub async fn list_for_date<C: ConnectionTrait + Send + Sync>(
    conn: &C,
    date: Date,
) -> Result<Vec<Reservation>, AppError> {
    Ok(reservations_repo::list_for_date(conn, date).await?)
}

pub async fn list_all<C: ConnectionTrait + Send + Sync>(
    conn: &C,
) -> Result<Vec<Reservation>, AppError> {
    Ok(reservations_repo::list_all(conn).await?)
}

/// Only the owner or an admin may cancel. Cancelling twice is a no-op.
pub async fn cancel<C: ConnectionTrait + Send + Sync>(
    conn: &C,
    member: &Member,
    reservation_id: i64,
) -> Result<Reservation, AppError> {
    let reservation = reservations_repo::require_by_id(conn, reservation_id).await?;
    if reservation.member_id != member.id && !member.is_admin {
        return Err(AppError::forbidden(
            ErrorCode::Forbidden,
            "Only the member who booked this slot can cancel it",
        ));
    }
    if reservation.status == ReservationStatus::Cancelled {
        return Ok(reservation);
    }
    let cancelled = reservations_repo::cancel(conn, reservation).await?;
    info!(reservation_id, member_id = member.id, "reservation cancelled");
    Ok(cancelled)
}
