//! Best-effort column check against the catalog. Not a migration framework:
//! it only confirms that expected columns are present.

use sea_orm::{ConnectionTrait, DatabaseBackend, DbErr, Statement};
use tracing::warn;

use crate::error::StorageError;

/// Expected columns of one required table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableShape {
    pub table: String,
    pub columns: Vec<String>,
}

impl TableShape {
    pub fn new(table: impl Into<String>, columns: impl IntoIterator<Item = String>) -> Self {
        Self {
            table: table.into(),
            columns: columns.into_iter().collect(),
        }
    }
}

/// Column names of `table`, or `None` when the table does not exist.
pub async fn existing_columns<C>(conn: &C, table: &str) -> Result<Option<Vec<String>>, DbErr>
where
    C: ConnectionTrait,
{
    let backend = conn.get_database_backend();
    let sql = match backend {
        DatabaseBackend::Sqlite => "SELECT name FROM pragma_table_info(?)",
        DatabaseBackend::Postgres => {
            "SELECT column_name AS name FROM information_schema.columns \
             WHERE table_schema = current_schema() AND table_name = $1"
        }
        DatabaseBackend::MySql => {
            "SELECT CAST(column_name AS CHAR) AS name FROM information_schema.columns \
             WHERE table_schema = DATABASE() AND table_name = ?"
        }
    };

    let rows = conn
        .query_all(Statement::from_sql_and_values(
            backend,
            sql,
            vec![table.into()],
        ))
        .await?;

    if rows.is_empty() {
        return Ok(None);
    }

    let mut columns = Vec::with_capacity(rows.len());
    for row in rows {
        columns.push(row.try_get::<String>("", "name")?.to_ascii_lowercase());
    }
    Ok(Some(columns))
}

fn missing_columns(shape: &TableShape, present: &[String]) -> Vec<String> {
    shape
        .columns
        .iter()
        .filter(|c| !present.iter().any(|p| p == &c.to_ascii_lowercase()))
        .cloned()
        .collect()
}

/// Fail on any table that exists but lacks expected columns. Absent tables
/// are fine; they are about to be created.
pub async fn verify_existing<C>(conn: &C, shapes: &[TableShape]) -> Result<(), StorageError>
where
    C: ConnectionTrait,
{
    for shape in shapes {
        if let Some(present) = existing_columns(conn, &shape.table).await? {
            check_shape(shape, &present)?;
        }
    }
    Ok(())
}

/// Every table must exist with every expected column.
pub async fn verify_complete<C>(conn: &C, shapes: &[TableShape]) -> Result<(), StorageError>
where
    C: ConnectionTrait,
{
    for shape in shapes {
        match existing_columns(conn, &shape.table).await? {
            Some(present) => check_shape(shape, &present)?,
            None => {
                return Err(StorageError::SchemaConflict {
                    table: shape.table.clone(),
                    missing: shape.columns.clone(),
                })
            }
        }
    }
    Ok(())
}

fn check_shape(shape: &TableShape, present: &[String]) -> Result<(), StorageError> {
    let missing = missing_columns(shape, present);
    if !missing.is_empty() {
        return Err(StorageError::SchemaConflict {
            table: shape.table.clone(),
            missing,
        });
    }

    let extra: Vec<&String> = present
        .iter()
        .filter(|p| !shape.columns.iter().any(|c| &c.to_ascii_lowercase() == *p))
        .collect();
    if !extra.is_empty() {
        warn!(table = %shape.table, extra = ?extra, "table has unexpected columns");
    }
    Ok(())
}
