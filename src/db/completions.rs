//! Completion record CRUD operations
//!
//! Completions are write-once: the first `mark_complete` for a
//! (user, item) pair wins and later calls are no-ops, so progress
//! derived from this table can only move forward.

use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};

use super::{now_rfc3339, Scope};
use crate::error::GatingError;

/// Completion record row from database
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionRecord {
    pub user_id: String,
    pub item_id: String,
    pub scope: Scope,
    pub completed_at: String,
}

impl CompletionRecord {
    fn from_row(row: &Row) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            user_id: row.get("user_id")?,
            item_id: row.get("item_id")?,
            scope: row.get("scope")?,
            completed_at: row.get("completed_at")?,
        })
    }
}

/// Record a completion; repeat calls are no-ops
///
/// Returns true when the record was newly written.
pub fn mark_complete(
    conn: &Connection,
    user_id: &str,
    item_id: &str,
    scope: Scope,
) -> Result<bool, GatingError> {
    let changes = conn
        .execute(
            r#"
            INSERT OR IGNORE INTO completion_records (user_id, item_id, scope, completed_at)
            VALUES (?, ?, ?, ?)
            "#,
            params![user_id, item_id, scope, now_rfc3339()],
        )
        .map_err(|e| GatingError::Internal(format!("Completion insert failed: {}", e)))?;

    Ok(changes > 0)
}

/// Check whether a user has completed an item
pub fn is_complete(
    conn: &Connection,
    user_id: &str,
    item_id: &str,
    scope: Scope,
) -> Result<bool, GatingError> {
    let found = conn
        .query_row(
            "SELECT 1 FROM completion_records WHERE user_id = ? AND item_id = ? AND scope = ?",
            params![user_id, item_id, scope],
            |_| Ok(()),
        )
        .optional()
        .map_err(|e| GatingError::Internal(format!("Query failed: {}", e)))?;

    Ok(found.is_some())
}

/// All completions for a user within one scope
pub fn list_completed(
    conn: &Connection,
    user_id: &str,
    scope: Scope,
) -> Result<Vec<CompletionRecord>, GatingError> {
    let mut stmt = conn
        .prepare(
            r#"
            SELECT * FROM completion_records
            WHERE user_id = ? AND scope = ?
            ORDER BY completed_at, item_id
            "#,
        )
        .map_err(|e| GatingError::Internal(format!("Prepare failed: {}", e)))?;

    let records: Vec<CompletionRecord> = stmt
        .query_map(params![user_id, scope], |row| CompletionRecord::from_row(row))
        .map_err(|e| GatingError::Internal(format!("Query failed: {}", e)))?
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| GatingError::Internal(format!("Row parse failed: {}", e)))?;

    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::GatingDb;

    #[test]
    fn test_mark_complete_is_write_once() {
        let db = GatingDb::open_in_memory().unwrap();

        let first = db
            .with_conn(|conn| mark_complete(conn, "u1", "l1", Scope::Lesson))
            .unwrap();
        let second = db
            .with_conn(|conn| mark_complete(conn, "u1", "l1", Scope::Lesson))
            .unwrap();

        assert!(first);
        assert!(!second);
        assert!(db
            .with_conn(|conn| is_complete(conn, "u1", "l1", Scope::Lesson))
            .unwrap());
    }

    #[test]
    fn test_is_complete_respects_scope_and_user() {
        let db = GatingDb::open_in_memory().unwrap();
        db.with_conn(|conn| mark_complete(conn, "u1", "l1", Scope::Lesson))
            .unwrap();

        assert!(!db
            .with_conn(|conn| is_complete(conn, "u1", "l1", Scope::Course))
            .unwrap());
        assert!(!db
            .with_conn(|conn| is_complete(conn, "u2", "l1", Scope::Lesson))
            .unwrap());
    }

    #[test]
    fn test_list_completed_filters_by_scope() {
        let db = GatingDb::open_in_memory().unwrap();
        db.with_conn(|conn| {
            mark_complete(conn, "u1", "l1", Scope::Lesson)?;
            mark_complete(conn, "u1", "l2", Scope::Lesson)?;
            mark_complete(conn, "u1", "course-a", Scope::Course)
        })
        .unwrap();

        let lessons = db
            .with_conn(|conn| list_completed(conn, "u1", Scope::Lesson))
            .unwrap();
        assert_eq!(lessons.len(), 2);

        let courses = db
            .with_conn(|conn| list_completed(conn, "u1", Scope::Course))
            .unwrap();
        assert_eq!(courses.len(), 1);
        assert_eq!(courses[0].item_id, "course-a");
    }
}
