//! Graph service - prerequisite edge administration
//!
//! Maintains the acyclicity invariant: an edge is only written after a
//! reachability walk proves the reverse direction has no path. The
//! walk and the insert run inside one exclusive connection hold so
//! concurrent adds cannot interleave a cycle into the table.

use std::collections::BTreeSet;
use std::sync::Arc;

use tracing::debug;

use crate::db::{prerequisites, GatingDb, PrerequisiteEdge, Scope};
use crate::error::GatingError;

use super::events::{EventBus, GatingEvent};

/// Graph service for prerequisite administration
pub struct GraphService {
    db: Arc<GatingDb>,
    events: Arc<EventBus>,
}

impl GraphService {
    /// Create a new graph service
    pub fn new(db: Arc<GatingDb>, events: Arc<EventBus>) -> Self {
        Self { db, events }
    }

    // =========================================================================
    // Write Operations
    // =========================================================================

    /// Add a prerequisite edge; duplicate adds are no-ops
    ///
    /// Returns true when the edge was newly written. Fails with
    /// `SelfReference` when an item would require itself and with
    /// `Cycle` when the prerequisite already depends on the dependent
    /// in the same scope; a failed add leaves the graph unchanged.
    pub fn add_edge(
        &self,
        dependent_id: &str,
        prerequisite_id: &str,
        scope: Scope,
        enforce: bool,
    ) -> Result<bool, GatingError> {
        if dependent_id == prerequisite_id {
            return Err(GatingError::SelfReference(dependent_id.to_string()));
        }

        let added = self.db.with_conn_mut(|conn| {
            let ancestors =
                prerequisites::transitive_prerequisites(conn, prerequisite_id, scope)?;
            if ancestors.contains(dependent_id) {
                return Err(GatingError::Cycle {
                    dependent: dependent_id.to_string(),
                    prerequisite: prerequisite_id.to_string(),
                });
            }

            prerequisites::insert_edge(conn, dependent_id, prerequisite_id, scope, enforce)
        })?;

        if added {
            debug!(
                dependent = %dependent_id,
                prerequisite = %prerequisite_id,
                scope = %scope,
                "Added prerequisite edge"
            );
            self.events.emit(GatingEvent::PrerequisiteAdded {
                dependent_id: dependent_id.to_string(),
                prerequisite_id: prerequisite_id.to_string(),
                scope,
                enforce,
            });
        }

        Ok(added)
    }

    /// Remove a prerequisite edge; absent edge is a no-op
    pub fn remove_edge(
        &self,
        dependent_id: &str,
        prerequisite_id: &str,
        scope: Scope,
    ) -> Result<bool, GatingError> {
        let removed = self.db.with_conn_mut(|conn| {
            prerequisites::remove_edge(conn, dependent_id, prerequisite_id, scope)
        })?;

        if removed {
            self.events.emit(GatingEvent::PrerequisiteRemoved {
                dependent_id: dependent_id.to_string(),
                prerequisite_id: prerequisite_id.to_string(),
                scope,
            });
        }

        Ok(removed)
    }

    // =========================================================================
    // Read Operations
    // =========================================================================

    /// Direct prerequisites of an item
    pub fn direct_prerequisites(
        &self,
        item_id: &str,
        scope: Scope,
    ) -> Result<Vec<PrerequisiteEdge>, GatingError> {
        self.db
            .with_conn(|conn| prerequisites::direct_prerequisites(conn, item_id, scope))
    }

    /// Direct dependents of an item (reverse edges)
    pub fn direct_dependents(
        &self,
        item_id: &str,
        scope: Scope,
    ) -> Result<Vec<PrerequisiteEdge>, GatingError> {
        self.db
            .with_conn(|conn| prerequisites::direct_dependents(conn, item_id, scope))
    }

    /// All ancestors reachable through prerequisite edges
    pub fn transitive_prerequisites(
        &self,
        item_id: &str,
        scope: Scope,
    ) -> Result<BTreeSet<String>, GatingError> {
        self.db
            .with_conn(|conn| prerequisites::transitive_prerequisites(conn, item_id, scope))
    }

    // =========================================================================
    // Scope-specific wrappers
    // =========================================================================

    /// Course X requires course Y
    pub fn add_course_prerequisite(
        &self,
        course_id: &str,
        prerequisite_course_id: &str,
        enforce: bool,
    ) -> Result<bool, GatingError> {
        self.add_edge(course_id, prerequisite_course_id, Scope::Course, enforce)
    }

    /// Remove a course prerequisite
    pub fn remove_course_prerequisite(
        &self,
        course_id: &str,
        prerequisite_course_id: &str,
    ) -> Result<bool, GatingError> {
        self.remove_edge(course_id, prerequisite_course_id, Scope::Course)
    }

    /// Direct course prerequisites
    pub fn get_course_prerequisites(
        &self,
        course_id: &str,
    ) -> Result<Vec<PrerequisiteEdge>, GatingError> {
        self.direct_prerequisites(course_id, Scope::Course)
    }

    /// Lesson X requires lesson Y
    pub fn add_lesson_prerequisite(
        &self,
        lesson_id: &str,
        prerequisite_lesson_id: &str,
        enforce: bool,
    ) -> Result<bool, GatingError> {
        self.add_edge(lesson_id, prerequisite_lesson_id, Scope::Lesson, enforce)
    }

    /// Remove a lesson prerequisite
    pub fn remove_lesson_prerequisite(
        &self,
        lesson_id: &str,
        prerequisite_lesson_id: &str,
    ) -> Result<bool, GatingError> {
        self.remove_edge(lesson_id, prerequisite_lesson_id, Scope::Lesson)
    }

    /// Direct lesson prerequisites
    pub fn get_lesson_prerequisites(
        &self,
        lesson_id: &str,
    ) -> Result<Vec<PrerequisiteEdge>, GatingError> {
        self.direct_prerequisites(lesson_id, Scope::Lesson)
    }
}
