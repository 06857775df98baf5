//! Database schema definitions

use rusqlite::Connection;
use tracing::info;

use crate::error::GatingError;

/// Current schema version for migrations
pub const SCHEMA_VERSION: i32 = 1;

/// Initialize the database schema
pub fn init_schema(conn: &Connection) -> Result<(), GatingError> {
    // Check current schema version
    let current_version = get_schema_version(conn)?;

    if current_version == 0 {
        info!("Creating new database schema v{}", SCHEMA_VERSION);
        create_tables(conn)?;
        set_schema_version(conn, SCHEMA_VERSION)?;
    } else if current_version < SCHEMA_VERSION {
        info!(
            "Migrating schema from v{} to v{}",
            current_version, SCHEMA_VERSION
        );
        migrate_schema(conn, current_version)?;
    } else {
        info!("Database schema is up to date (v{})", current_version);
    }

    Ok(())
}

/// Get current schema version (0 if not initialized)
fn get_schema_version(conn: &Connection) -> Result<i32, GatingError> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL)",
        [],
    )
    .map_err(|e| GatingError::Internal(format!("Failed to create schema_version table: {}", e)))?;

    let version: i32 = conn
        .query_row("SELECT version FROM schema_version LIMIT 1", [], |row| {
            row.get(0)
        })
        .unwrap_or(0);

    Ok(version)
}

/// Set schema version
fn set_schema_version(conn: &Connection, version: i32) -> Result<(), GatingError> {
    conn.execute("DELETE FROM schema_version", [])
        .map_err(|e| GatingError::Internal(format!("Failed to clear schema_version: {}", e)))?;
    conn.execute("INSERT INTO schema_version (version) VALUES (?)", [version])
        .map_err(|e| GatingError::Internal(format!("Failed to set schema_version: {}", e)))?;
    Ok(())
}

/// Create all tables
fn create_tables(conn: &Connection) -> Result<(), GatingError> {
    conn.execute_batch(CATALOG_SCHEMA)
        .map_err(|e| GatingError::Internal(format!("Failed to create catalog tables: {}", e)))?;

    conn.execute_batch(GATING_SCHEMA)
        .map_err(|e| GatingError::Internal(format!("Failed to create gating tables: {}", e)))?;

    conn.execute_batch(INDEXES_SCHEMA)
        .map_err(|e| GatingError::Internal(format!("Failed to create indexes: {}", e)))?;

    Ok(())
}

/// Migrate schema from older version
fn migrate_schema(conn: &Connection, from_version: i32) -> Result<(), GatingError> {
    // Add migration steps here as schema evolves
    match from_version {
        _ => {}
    }

    set_schema_version(conn, SCHEMA_VERSION)?;
    Ok(())
}

/// Course structure schema
const CATALOG_SCHEMA: &str = r#"
-- Courses (structure reference data)
CREATE TABLE IF NOT EXISTS courses (
    id TEXT PRIMARY KEY NOT NULL,
    title TEXT NOT NULL,
    description TEXT,

    -- Metadata as JSON (flexible schema)
    metadata_json TEXT,

    -- Visibility
    visibility TEXT NOT NULL DEFAULT 'public',

    -- Authorship
    created_by TEXT,
    created_at TEXT NOT NULL DEFAULT (datetime('now')),
    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- Ordered modules within a course
CREATE TABLE IF NOT EXISTS course_modules (
    id TEXT PRIMARY KEY NOT NULL,
    course_id TEXT NOT NULL,
    title TEXT NOT NULL,
    order_index INTEGER NOT NULL DEFAULT 0,

    FOREIGN KEY (course_id) REFERENCES courses(id) ON DELETE CASCADE
);

-- Ordered lessons within a module
CREATE TABLE IF NOT EXISTS lessons (
    id TEXT PRIMARY KEY NOT NULL,
    course_id TEXT NOT NULL,
    module_id TEXT NOT NULL,

    title TEXT NOT NULL,
    lesson_type TEXT NOT NULL DEFAULT 'reading',
    order_index INTEGER NOT NULL DEFAULT 0,

    FOREIGN KEY (course_id) REFERENCES courses(id) ON DELETE CASCADE,
    FOREIGN KEY (module_id) REFERENCES course_modules(id) ON DELETE CASCADE
);
"#;

/// Gating state schema
const GATING_SCHEMA: &str = r#"
-- Directed prerequisite edges, scope-keyed
-- NOTE: No FK constraints on item ids because course-scope edges may be
-- registered before the courses themselves are seeded
CREATE TABLE IF NOT EXISTS prerequisite_edges (
    dependent_id TEXT NOT NULL,
    prerequisite_id TEXT NOT NULL,
    scope TEXT NOT NULL,
    enforce INTEGER NOT NULL DEFAULT 1,
    created_at TEXT NOT NULL DEFAULT (datetime('now')),

    PRIMARY KEY (dependent_id, prerequisite_id, scope)
);

-- Write-once completion records
CREATE TABLE IF NOT EXISTS completion_records (
    user_id TEXT NOT NULL,
    item_id TEXT NOT NULL,
    scope TEXT NOT NULL,
    completed_at TEXT NOT NULL DEFAULT (datetime('now')),

    PRIMARY KEY (user_id, item_id)
);

-- Per-enrollment progress state
CREATE TABLE IF NOT EXISTS enrollment_state (
    user_id TEXT NOT NULL,
    course_id TEXT NOT NULL,
    status TEXT NOT NULL DEFAULT 'not_started',
    progress_percent INTEGER NOT NULL DEFAULT 0,
    enrolled_at TEXT NOT NULL DEFAULT (datetime('now')),
    updated_at TEXT NOT NULL DEFAULT (datetime('now')),
    completed_at TEXT,

    PRIMARY KEY (user_id, course_id)
);

-- Issued certificates, at most one per (user, course)
CREATE TABLE IF NOT EXISTS certificates (
    id TEXT PRIMARY KEY NOT NULL,
    user_id TEXT NOT NULL,
    course_id TEXT NOT NULL,
    certificate_number TEXT NOT NULL UNIQUE,
    verification_code TEXT NOT NULL UNIQUE,
    issued_at TEXT NOT NULL DEFAULT (datetime('now')),

    UNIQUE (user_id, course_id)
);
"#;

/// Index definitions for fast queries
const INDEXES_SCHEMA: &str = r#"
-- Catalog indexes
CREATE INDEX IF NOT EXISTS idx_modules_course ON course_modules(course_id, order_index);
CREATE INDEX IF NOT EXISTS idx_lessons_course ON lessons(course_id);
CREATE INDEX IF NOT EXISTS idx_lessons_module ON lessons(module_id, order_index);

-- Edge indexes (forward and reverse walks)
CREATE INDEX IF NOT EXISTS idx_edges_dependent ON prerequisite_edges(scope, dependent_id);
CREATE INDEX IF NOT EXISTS idx_edges_prerequisite ON prerequisite_edges(scope, prerequisite_id);

-- Completion indexes
CREATE INDEX IF NOT EXISTS idx_completions_user_scope ON completion_records(user_id, scope);

-- Enrollment indexes
CREATE INDEX IF NOT EXISTS idx_enrollments_user ON enrollment_state(user_id);
CREATE INDEX IF NOT EXISTS idx_enrollments_status ON enrollment_state(status);

-- Certificate indexes
CREATE INDEX IF NOT EXISTS idx_certificates_user ON certificates(user_id);
"#;
