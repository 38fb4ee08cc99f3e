//! SQLite-Backend fuer Kanal-Register und Aktivitaetsprotokoll

pub mod activity;
pub mod channels;
pub mod pool;

pub use pool::SqliteDb;

use uuid::Uuid;

use crate::error::DbError;
use crate::repository::DbResult;

/// Liest eine UUID-Spalte (als TEXT gespeichert)
pub(crate) fn parse_uuid(row: &sqlx::sqlite::SqliteRow, col: &str) -> DbResult<Uuid> {
    use sqlx::Row as _;

    let s: String = row.try_get(col)?;
    Uuid::parse_str(&s).map_err(|e| DbError::intern(format!("Ungueltige UUID in '{col}': {e}")))
}

/// Liest einen RFC3339-Zeitstempel
pub(crate) fn parse_zeit(
    row: &sqlx::sqlite::SqliteRow,
    col: &str,
) -> DbResult<chrono::DateTime<chrono::Utc>> {
    use sqlx::Row as _;

    let s: String = row.try_get(col)?;
    chrono::DateTime::parse_from_rfc3339(&s)
        .map(|t| t.with_timezone(&chrono::Utc))
        .map_err(|e| DbError::intern(format!("Ungueltiger Zeitstempel in '{col}' ('{s}'): {e}")))
}
