//! Enrollment state CRUD operations
//!
//! One row per (user, course). Status and percent are only written by
//! the progress service; `completed` is terminal.

use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};

use super::{now_rfc3339, EnrollmentStatus};
use crate::error::GatingError;

/// Enrollment state row from database
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnrollmentState {
    pub user_id: String,
    pub course_id: String,
    pub status: EnrollmentStatus,
    pub progress_percent: u8,
    pub enrolled_at: String,
    pub updated_at: String,
    pub completed_at: Option<String>,
}

impl EnrollmentState {
    fn from_row(row: &Row) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            user_id: row.get("user_id")?,
            course_id: row.get("course_id")?,
            status: row.get("status")?,
            progress_percent: row.get("progress_percent")?,
            enrolled_at: row.get("enrolled_at")?,
            updated_at: row.get("updated_at")?,
            completed_at: row.get("completed_at")?,
        })
    }
}

/// Create an enrollment at `not_started` / 0%; re-enrolling is a no-op
///
/// Returns the state and whether the row was newly written.
pub fn create(
    conn: &Connection,
    user_id: &str,
    course_id: &str,
) -> Result<(EnrollmentState, bool), GatingError> {
    let now = now_rfc3339();
    let changes = conn
        .execute(
            r#"
            INSERT OR IGNORE INTO enrollment_state
                (user_id, course_id, status, progress_percent, enrolled_at, updated_at)
            VALUES (?, ?, 'not_started', 0, ?, ?)
            "#,
            params![user_id, course_id, now, now],
        )
        .map_err(|e| GatingError::Internal(format!("Enrollment insert failed: {}", e)))?;

    let state = get(conn, user_id, course_id)?
        .ok_or_else(|| GatingError::Internal("Enrollment not found after insert".to_string()))?;

    Ok((state, changes > 0))
}

/// Get enrollment state
pub fn get(
    conn: &Connection,
    user_id: &str,
    course_id: &str,
) -> Result<Option<EnrollmentState>, GatingError> {
    conn.query_row(
        "SELECT * FROM enrollment_state WHERE user_id = ? AND course_id = ?",
        params![user_id, course_id],
        |row| EnrollmentState::from_row(row),
    )
    .optional()
    .map_err(|e| GatingError::Internal(format!("Query failed: {}", e)))
}

/// List enrollments for a user
pub fn list_for_user(conn: &Connection, user_id: &str) -> Result<Vec<EnrollmentState>, GatingError> {
    let mut stmt = conn
        .prepare("SELECT * FROM enrollment_state WHERE user_id = ? ORDER BY enrolled_at, course_id")
        .map_err(|e| GatingError::Internal(format!("Prepare failed: {}", e)))?;

    let states: Vec<EnrollmentState> = stmt
        .query_map(params![user_id], |row| EnrollmentState::from_row(row))
        .map_err(|e| GatingError::Internal(format!("Query failed: {}", e)))?
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| GatingError::Internal(format!("Row parse failed: {}", e)))?;

    Ok(states)
}

/// Persist a recomputed status and percent
///
/// `completed_at` is only ever set, never cleared.
pub fn update_progress(
    conn: &Connection,
    user_id: &str,
    course_id: &str,
    status: EnrollmentStatus,
    progress_percent: u8,
    completed_at: Option<&str>,
) -> Result<EnrollmentState, GatingError> {
    conn.execute(
        r#"
        UPDATE enrollment_state
        SET status = ?, progress_percent = ?, updated_at = ?,
            completed_at = COALESCE(?, completed_at)
        WHERE user_id = ? AND course_id = ?
        "#,
        params![
            status,
            progress_percent,
            now_rfc3339(),
            completed_at,
            user_id,
            course_id,
        ],
    )
    .map_err(|e| GatingError::Internal(format!("Enrollment update failed: {}", e)))?;

    get(conn, user_id, course_id)?
        .ok_or_else(|| GatingError::Internal("Enrollment not found after update".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::GatingDb;

    #[test]
    fn test_create_is_idempotent() {
        let db = GatingDb::open_in_memory().unwrap();

        let (first, newly) = db.with_conn(|conn| create(conn, "u1", "c1")).unwrap();
        assert!(newly);
        assert_eq!(first.status, EnrollmentStatus::NotStarted);
        assert_eq!(first.progress_percent, 0);

        let (again, newly) = db.with_conn(|conn| create(conn, "u1", "c1")).unwrap();
        assert!(!newly);
        assert_eq!(again.enrolled_at, first.enrolled_at);
    }

    #[test]
    fn test_update_progress_persists() {
        let db = GatingDb::open_in_memory().unwrap();
        db.with_conn(|conn| create(conn, "u1", "c1")).unwrap();

        let updated = db
            .with_conn(|conn| {
                update_progress(conn, "u1", "c1", EnrollmentStatus::InProgress, 40, None)
            })
            .unwrap();
        assert_eq!(updated.status, EnrollmentStatus::InProgress);
        assert_eq!(updated.progress_percent, 40);
        assert!(updated.completed_at.is_none());
    }

    #[test]
    fn test_completed_at_sticks() {
        let db = GatingDb::open_in_memory().unwrap();
        db.with_conn(|conn| create(conn, "u1", "c1")).unwrap();

        let done = db
            .with_conn(|conn| {
                update_progress(
                    conn,
                    "u1",
                    "c1",
                    EnrollmentStatus::Completed,
                    100,
                    Some("2026-01-01T00:00:00+00:00"),
                )
            })
            .unwrap();
        assert!(done.completed_at.is_some());

        // A later update without a timestamp must not clear it
        let later = db
            .with_conn(|conn| {
                update_progress(conn, "u1", "c1", EnrollmentStatus::Completed, 100, None)
            })
            .unwrap();
        assert_eq!(later.completed_at, done.completed_at);
    }
}
