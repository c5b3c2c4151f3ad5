use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, NotSet, QueryFilter, QueryOrder,
    Set,
};
use time::{Date, OffsetDateTime, Time};

use crate::entities::reservations::{self, Model as Reservation, ReservationStatus};
use crate::errors::domain::{DomainError, NotFoundKind};
use crate::infra::db_errors::map_db_err;

#[derive(Debug, Clone)]
pub struct NewReservation {
    pub member_id: i64,
    pub court: i16,
    pub date: Date,
    pub start_time: Time,
    pub end_time: Time,
}

pub async fn create_reservation<C: ConnectionTrait + Send + Sync>(
    conn: &C,
    new: NewReservation,
) -> Result<Reservation, DomainError> {
    let row = reservations::ActiveModel {
        id: NotSet,
        member_id: Set(new.member_id),
        court: Set(new.court),
        date: Set(new.date),
        start_time: Set(new.start_time),
        end_time: Set(new.end_time),
        status: Set(ReservationStatus::Confirmed),
        created_at: Set(OffsetDateTime::now_utc()),
    };
    row.insert(conn).await.map_err(map_db_err)
}

/// Confirmed reservations on `court` and `date` that intersect
/// `[start, end)`.
pub async fn find_overlapping<C: ConnectionTrait + Send + Sync>(
    conn: &C,
    court: i16,
    date: Date,
    start: Time,
    end: Time,
) -> Result<Vec<Reservation>, DomainError> {
    reservations::Entity::find()
        .filter(reservations::Column::Court.eq(court))
        .filter(reservations::Column::Date.eq(date))
        .filter(reservations::Column::Status.eq(ReservationStatus::Confirmed))
        .filter(reservations::Column::StartTime.lt(end))
        .filter(reservations::Column::EndTime.gt(start))
        .all(conn)
        .await
        .map_err(map_db_err)
}

pub async fn list_for_date<C: ConnectionTrait + Send + Sync>(
    conn: &C,
    date: Date,
) -> Result<Vec<Reservation>, DomainError> {
    reservations::Entity::find()
        .filter(reservations::Column::Date.eq(date))
        .filter(reservations::Column::Status.eq(ReservationStatus::Confirmed))
        .order_by_asc(reservations::Column::Court)
        .order_by_asc(reservations::Column::StartTime)
        .all(conn)
        .await
        .map_err(map_db_err)
}

pub async fn list_all<C: ConnectionTrait + Send + Sync>(
    conn: &C,
) -> Result<Vec<Reservation>, DomainError> {
    reservations::Entity::find()
        .order_by_desc(reservations::Column::Date)
        .order_by_asc(reservations::Column::Court)
        .order_by_asc(reservations::Column::StartTime)
        .all(conn)
        .await
        .map_err(map_db_err)
}

pub async fn require_by_id<C: ConnectionTrait + Send + Sync>(
    conn: &C,
    id: i64,
) -> Result<Reservation, DomainError> {
    reservations::Entity::find_by_id(id)
        .one(conn)
        .await
        .map_err(map_db_err)?
        .ok_or_else(|| {
            DomainError::not_found(NotFoundKind::Reservation, format!("Reservation {id} not found"))
        })
}

pub async fn cancel<C: ConnectionTrait + Send + Sync>(
    conn: &C,
    reservation: Reservation,
) -> Result<Reservation, DomainError> {
    let mut row: reservations::ActiveModel = reservation.into();
    row.status = Set(ReservationStatus::Cancelled);
    row.update(conn).await.map_err(map_db_err)
}
