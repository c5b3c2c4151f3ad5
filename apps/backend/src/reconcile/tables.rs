//! The tables that carry club data, in foreign-key order.

use sea_orm::{
    ActiveModelTrait, ConnectionTrait, DatabaseBackend, DbErr, EntityTrait, IntoActiveModel,
    PaginatorTrait, Statement,
};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::entities::{articles, members, reservations};

/// Parents first. Copies and restores insert in this order and clear in
/// reverse.
pub const TRACKED_TABLES: [&str; 3] = ["members", "reservations", "articles"];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableCounts {
    pub members: u64,
    pub reservations: u64,
    pub articles: u64,
}

impl TableCounts {
    pub fn total(&self) -> u64 {
        self.members + self.reservations + self.articles
    }

    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }

    pub fn get(&self, table: &str) -> Option<u64> {
        match table {
            "members" => Some(self.members),
            "reservations" => Some(self.reservations),
            "articles" => Some(self.articles),
            _ => None,
        }
    }

    pub(crate) fn set(&mut self, table: &str, rows: u64) {
        match table {
            "members" => self.members = rows,
            "reservations" => self.reservations = rows,
            "articles" => self.articles = rows,
            _ => {}
        }
    }
}

pub async fn count_rows<C>(conn: &C) -> Result<TableCounts, DbErr>
where
    C: ConnectionTrait,
{
    Ok(TableCounts {
        members: members::Entity::find().count(conn).await?,
        reservations: reservations::Entity::find().count(conn).await?,
        articles: articles::Entity::find().count(conn).await?,
    })
}

/// Rows per INSERT statement; keeps bind parameters well under every
/// driver's limit.
const INSERT_CHUNK: usize = 200;

/// Insert `rows` with their primary keys intact. Returns rows written.
pub(crate) async fn insert_rows<E, C>(conn: &C, rows: Vec<E::Model>) -> Result<u64, DbErr>
where
    E: EntityTrait,
    E::Model: IntoActiveModel<E::ActiveModel>,
    E::ActiveModel: ActiveModelTrait<Entity = E> + Send,
    C: ConnectionTrait,
{
    let mut written = 0u64;
    let mut rows = rows.into_iter().peekable();
    while rows.peek().is_some() {
        let batch: Vec<E::ActiveModel> = rows
            .by_ref()
            .take(INSERT_CHUNK)
            .map(IntoActiveModel::into_active_model)
            .collect();
        let len = batch.len() as u64;
        E::insert_many(batch).exec_without_returning(conn).await?;
        written += len;
    }
    Ok(written)
}

/// Point Postgres id sequences past the highest copied id. Other backends
/// track auto-increment values on their own.
pub(crate) async fn resync_sequences<C>(conn: &C) -> Result<(), DbErr>
where
    C: ConnectionTrait,
{
    if conn.get_database_backend() != DatabaseBackend::Postgres {
        return Ok(());
    }
    for table in TRACKED_TABLES {
        let sql = format!(
            "SELECT setval(pg_get_serial_sequence('{table}', 'id'), \
             COALESCE((SELECT MAX(id) FROM {table}), 0) + 1, false)"
        );
        conn.execute(Statement::from_string(DatabaseBackend::Postgres, sql))
            .await?;
        debug!(table, "sequence resynchronised");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_total_and_lookup() {
        let mut counts = TableCounts::default();
        assert!(counts.is_empty());

        counts.set("reservations", 4);
        counts.set("articles", 1);
        counts.set("unknown", 99);
        assert_eq!(counts.total(), 5);
        assert_eq!(counts.get("reservations"), Some(4));
        assert_eq!(counts.get("sessions"), None);
        assert!(!counts.is_empty());
    }
}
