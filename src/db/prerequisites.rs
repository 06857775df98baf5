//! Prerequisite edge CRUD and reachability walks
//!
//! Edges are flat rows keyed by (dependent, prerequisite, scope); the
//! graph itself is never materialized. Reachability is computed on
//! demand by walking the edge table. Cycle rejection happens in the
//! service layer before insert, inside one exclusive connection hold.

use std::collections::BTreeSet;

use rusqlite::{params, Connection, Row};
use serde::{Deserialize, Serialize};

use super::{now_rfc3339, Scope};
use crate::error::GatingError;

/// Prerequisite edge row from database
///
/// `dependent_id` requires `prerequisite_id`. Advisory edges
/// (`enforce = false`) surface in access decisions but never block.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrerequisiteEdge {
    pub dependent_id: String,
    pub prerequisite_id: String,
    pub scope: Scope,
    pub enforce: bool,
    pub created_at: String,
}

impl PrerequisiteEdge {
    fn from_row(row: &Row) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            dependent_id: row.get("dependent_id")?,
            prerequisite_id: row.get("prerequisite_id")?,
            scope: row.get("scope")?,
            enforce: row.get("enforce")?,
            created_at: row.get("created_at")?,
        })
    }
}

/// Insert an edge; duplicate insert is a no-op
///
/// Returns true when the edge was newly written.
pub fn insert_edge(
    conn: &Connection,
    dependent_id: &str,
    prerequisite_id: &str,
    scope: Scope,
    enforce: bool,
) -> Result<bool, GatingError> {
    let changes = conn
        .execute(
            r#"
            INSERT OR IGNORE INTO prerequisite_edges
                (dependent_id, prerequisite_id, scope, enforce, created_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
            params![dependent_id, prerequisite_id, scope, enforce, now_rfc3339()],
        )
        .map_err(|e| GatingError::Internal(format!("Edge insert failed: {}", e)))?;

    Ok(changes > 0)
}

/// Remove an edge; absent edge is a no-op
///
/// Returns true when something was deleted.
pub fn remove_edge(
    conn: &Connection,
    dependent_id: &str,
    prerequisite_id: &str,
    scope: Scope,
) -> Result<bool, GatingError> {
    let changes = conn
        .execute(
            "DELETE FROM prerequisite_edges WHERE dependent_id = ? AND prerequisite_id = ? AND scope = ?",
            params![dependent_id, prerequisite_id, scope],
        )
        .map_err(|e| GatingError::Internal(format!("Edge delete failed: {}", e)))?;

    Ok(changes > 0)
}

/// Direct prerequisites of an item
pub fn direct_prerequisites(
    conn: &Connection,
    item_id: &str,
    scope: Scope,
) -> Result<Vec<PrerequisiteEdge>, GatingError> {
    let mut stmt = conn
        .prepare(
            r#"
            SELECT * FROM prerequisite_edges
            WHERE dependent_id = ? AND scope = ?
            ORDER BY prerequisite_id
            "#,
        )
        .map_err(|e| GatingError::Internal(format!("Prepare failed: {}", e)))?;

    let edges: Vec<PrerequisiteEdge> = stmt
        .query_map(params![item_id, scope], |row| PrerequisiteEdge::from_row(row))
        .map_err(|e| GatingError::Internal(format!("Query failed: {}", e)))?
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| GatingError::Internal(format!("Row parse failed: {}", e)))?;

    Ok(edges)
}

/// Direct dependents of an item (reverse edges)
pub fn direct_dependents(
    conn: &Connection,
    item_id: &str,
    scope: Scope,
) -> Result<Vec<PrerequisiteEdge>, GatingError> {
    let mut stmt = conn
        .prepare(
            r#"
            SELECT * FROM prerequisite_edges
            WHERE prerequisite_id = ? AND scope = ?
            ORDER BY dependent_id
            "#,
        )
        .map_err(|e| GatingError::Internal(format!("Prepare failed: {}", e)))?;

    let edges: Vec<PrerequisiteEdge> = stmt
        .query_map(params![item_id, scope], |row| PrerequisiteEdge::from_row(row))
        .map_err(|e| GatingError::Internal(format!("Query failed: {}", e)))?
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| GatingError::Internal(format!("Row parse failed: {}", e)))?;

    Ok(edges)
}

/// All ancestors of an item reachable through prerequisite edges
///
/// The item itself is not included; an item appearing in its own
/// ancestor set would mean the table already holds a cycle.
pub fn transitive_prerequisites(
    conn: &Connection,
    item_id: &str,
    scope: Scope,
) -> Result<BTreeSet<String>, GatingError> {
    let mut seen = BTreeSet::new();
    let mut frontier = vec![item_id.to_string()];

    while let Some(current) = frontier.pop() {
        for edge in direct_prerequisites(conn, &current, scope)? {
            if seen.insert(edge.prerequisite_id.clone()) {
                frontier.push(edge.prerequisite_id);
            }
        }
    }

    Ok(seen)
}
