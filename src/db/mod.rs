//! SQLite database module for gating state
//!
//! All state the gating engine owns lives in one SQLite database:
//! course structure reference data, prerequisite edges, completion
//! records, enrollment state, and issued certificates.
//!
//! ## Tables
//!
//! - `courses` / `course_modules` / `lessons` - course structure
//! - `prerequisite_edges` - directed prerequisite graph, scope-keyed
//! - `completion_records` - write-once per (user, item) completions
//! - `enrollment_state` - per-enrollment status and progress percent
//! - `certificates` - one per (user, course), unique tokens

pub mod schema;
pub mod catalog;
pub mod prerequisites;
pub mod completions;
pub mod enrollments;
pub mod certificates;

use std::fmt;
use std::path::Path;
use std::sync::Mutex;

use chrono::Utc;
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::GatingError;

/// Current timestamp as RFC 3339 string
pub(crate) fn now_rfc3339() -> String {
    Utc::now().to_rfc3339()
}

/// Which prerequisite graph an edge or completion belongs to.
///
/// Course-level and lesson-level graphs are kept isolated; there are
/// no cross-scope edges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    Course,
    Lesson,
}

impl Scope {
    pub fn as_str(&self) -> &'static str {
        match self {
            Scope::Course => "course",
            Scope::Lesson => "lesson",
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromSql for Scope {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        match value.as_str()? {
            "course" => Ok(Scope::Course),
            "lesson" => Ok(Scope::Lesson),
            other => Err(FromSqlError::Other(
                format!("unknown scope: {}", other).into(),
            )),
        }
    }
}

impl ToSql for Scope {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(self.as_str().into())
    }
}

/// Enrollment status state machine.
///
/// `not_started` -> `in_progress` -> `completed`; `completed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnrollmentStatus {
    NotStarted,
    InProgress,
    Completed,
}

impl EnrollmentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EnrollmentStatus::NotStarted => "not_started",
            EnrollmentStatus::InProgress => "in_progress",
            EnrollmentStatus::Completed => "completed",
        }
    }
}

impl fmt::Display for EnrollmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromSql for EnrollmentStatus {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        match value.as_str()? {
            "not_started" => Ok(EnrollmentStatus::NotStarted),
            "in_progress" => Ok(EnrollmentStatus::InProgress),
            "completed" => Ok(EnrollmentStatus::Completed),
            other => Err(FromSqlError::Other(
                format!("unknown enrollment status: {}", other).into(),
            )),
        }
    }
}

impl ToSql for EnrollmentStatus {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(self.as_str().into())
    }
}

/// SQLite database for gating state
pub struct GatingDb {
    conn: Mutex<Connection>,
}

impl GatingDb {
    /// Open or create the gating database
    pub fn open(storage_dir: &Path) -> Result<Self, GatingError> {
        std::fs::create_dir_all(storage_dir)?;
        let db_path = storage_dir.join("gating.db");
        info!("Opening SQLite database at {:?}", db_path);

        let conn = Connection::open(&db_path)
            .map_err(|e| GatingError::Internal(format!("Failed to open SQLite: {}", e)))?;

        // Enable WAL mode for better concurrent read performance
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")
            .map_err(|e| GatingError::Internal(format!("Failed to set PRAGMA: {}", e)))?;

        let db = Self {
            conn: Mutex::new(conn),
        };

        db.init_schema()?;

        Ok(db)
    }

    /// Open an in-memory database (for testing)
    pub fn open_in_memory() -> Result<Self, GatingError> {
        debug!("Opening in-memory SQLite database");

        let conn = Connection::open_in_memory()
            .map_err(|e| GatingError::Internal(format!("Failed to open in-memory SQLite: {}", e)))?;

        let db = Self {
            conn: Mutex::new(conn),
        };

        db.init_schema()?;

        Ok(db)
    }

    /// Initialize database schema
    fn init_schema(&self) -> Result<(), GatingError> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| GatingError::Internal(format!("Lock poisoned: {}", e)))?;

        schema::init_schema(&conn)?;

        Ok(())
    }

    /// Run a read operation against the connection
    pub fn with_conn<F, T>(&self, f: F) -> Result<T, GatingError>
    where
        F: FnOnce(&Connection) -> Result<T, GatingError>,
    {
        let conn = self
            .conn
            .lock()
            .map_err(|e| GatingError::Internal(format!("Lock poisoned: {}", e)))?;
        f(&conn)
    }

    /// Execute a write operation with exclusive access
    pub fn with_conn_mut<F, T>(&self, f: F) -> Result<T, GatingError>
    where
        F: FnOnce(&mut Connection) -> Result<T, GatingError>,
    {
        let mut conn = self
            .conn
            .lock()
            .map_err(|e| GatingError::Internal(format!("Lock poisoned: {}", e)))?;
        f(&mut conn)
    }

    /// Get database statistics
    pub fn stats(&self) -> Result<DbStats, GatingError> {
        self.with_conn(|conn| {
            let count = |sql: &str| -> Result<u64, GatingError> {
                let n: i64 = conn
                    .query_row(sql, [], |row| row.get(0))
                    .map_err(|e| GatingError::Internal(format!("Query failed: {}", e)))?;
                Ok(n as u64)
            };

            Ok(DbStats {
                course_count: count("SELECT COUNT(*) FROM courses")?,
                lesson_count: count("SELECT COUNT(*) FROM lessons")?,
                edge_count: count("SELECT COUNT(*) FROM prerequisite_edges")?,
                completion_count: count("SELECT COUNT(*) FROM completion_records")?,
                enrollment_count: count("SELECT COUNT(*) FROM enrollment_state")?,
                certificate_count: count("SELECT COUNT(*) FROM certificates")?,
            })
        })
    }
}

/// Database statistics
#[derive(Debug, Clone, Serialize)]
pub struct DbStats {
    pub course_count: u64,
    pub lesson_count: u64,
    pub edge_count: u64,
    pub completion_count: u64,
    pub enrollment_count: u64,
    pub certificate_count: u64,
}

// Re-exports
pub use catalog::{
    CourseRow, CourseStructure, CreateCourseInput, CreateLessonInput, CreateModuleInput,
    LessonRow, ModuleRow,
};
pub use certificates::Certificate;
pub use completions::CompletionRecord;
pub use enrollments::EnrollmentState;
pub use prerequisites::PrerequisiteEdge;
