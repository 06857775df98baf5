//! Access service - prerequisite gate evaluation
//!
//! Checks the direct enforced prerequisites of an item against the
//! caller's completion records. Direct-only is sound: every
//! completion was itself gated the same way, so a complete direct
//! prerequisite implies its whole chain is satisfied.

use std::sync::Arc;

use serde::Serialize;

use crate::db::{completions, prerequisites, GatingDb, Scope};
use crate::error::GatingError;

use super::catalog_service::CourseCatalog;

/// Result of an access check
#[derive(Debug, Clone, Serialize)]
pub struct AccessDecision {
    /// Whether access is granted
    pub allowed: bool,

    /// Enforced prerequisites the user has not completed
    pub missing_prerequisites: Vec<String>,

    /// Advisory (non-blocking) prerequisites the user has not completed
    pub advisory_unmet: Vec<String>,
}

/// Access service for gate evaluation
pub struct AccessService {
    db: Arc<GatingDb>,
    catalog: Arc<dyn CourseCatalog>,
}

impl AccessService {
    /// Create a new access service
    pub fn new(db: Arc<GatingDb>, catalog: Arc<dyn CourseCatalog>) -> Self {
        Self { db, catalog }
    }

    /// Check whether a user may access a course
    pub fn check_course_access(
        &self,
        user_id: &str,
        course_id: &str,
    ) -> Result<AccessDecision, GatingError> {
        if !self.catalog.course_exists(course_id)? {
            return Err(GatingError::NotFound(format!(
                "Course not found: {}",
                course_id
            )));
        }

        self.evaluate(user_id, course_id, Scope::Course)
    }

    /// Check whether a user may access a lesson
    pub fn check_lesson_access(
        &self,
        user_id: &str,
        lesson_id: &str,
    ) -> Result<AccessDecision, GatingError> {
        if self.catalog.lesson_course(lesson_id)?.is_none() {
            return Err(GatingError::NotFound(format!(
                "Lesson not found: {}",
                lesson_id
            )));
        }

        self.evaluate(user_id, lesson_id, Scope::Lesson)
    }

    /// Evaluate the direct prerequisites of an item for a user
    fn evaluate(
        &self,
        user_id: &str,
        item_id: &str,
        scope: Scope,
    ) -> Result<AccessDecision, GatingError> {
        self.db.with_conn(|conn| {
            let edges = prerequisites::direct_prerequisites(conn, item_id, scope)?;

            let mut missing = vec![];
            let mut advisory = vec![];
            for edge in &edges {
                if completions::is_complete(conn, user_id, &edge.prerequisite_id, scope)? {
                    continue;
                }

                if edge.enforce {
                    missing.push(edge.prerequisite_id.clone());
                } else {
                    advisory.push(edge.prerequisite_id.clone());
                }
            }

            Ok(AccessDecision {
                allowed: missing.is_empty(),
                missing_prerequisites: missing,
                advisory_unmet: advisory,
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::catalog::{CreateCourseInput, CreateLessonInput, CreateModuleInput};
    use crate::services::catalog_service::CatalogService;
    use crate::services::events::EventBus;
    use crate::services::graph_service::GraphService;

    struct Fixture {
        db: Arc<GatingDb>,
        access: AccessService,
        graph: GraphService,
    }

    fn fixture() -> Fixture {
        let db = Arc::new(GatingDb::open_in_memory().unwrap());
        let events = Arc::new(EventBus::new());
        let catalog = Arc::new(CatalogService::new(db.clone(), events.clone()));

        catalog
            .register_course(CreateCourseInput {
                id: "c1".to_string(),
                title: "Course".to_string(),
                description: None,
                metadata_json: None,
                visibility: "public".to_string(),
                created_by: None,
                modules: vec![CreateModuleInput {
                    id: "m1".to_string(),
                    title: "Module".to_string(),
                    order_index: 0,
                    lessons: vec![
                        CreateLessonInput {
                            id: "l1".to_string(),
                            title: "One".to_string(),
                            lesson_type: "reading".to_string(),
                            order_index: 0,
                        },
                        CreateLessonInput {
                            id: "l2".to_string(),
                            title: "Two".to_string(),
                            lesson_type: "reading".to_string(),
                            order_index: 1,
                        },
                    ],
                }],
            })
            .unwrap();

        Fixture {
            access: AccessService::new(db.clone(), catalog),
            graph: GraphService::new(db.clone(), events),
            db,
        }
    }

    #[test]
    fn test_no_prerequisites_always_allowed() {
        let fx = fixture();
        let decision = fx.access.check_lesson_access("u1", "l1").unwrap();
        assert!(decision.allowed);
        assert!(decision.missing_prerequisites.is_empty());
        assert!(decision.advisory_unmet.is_empty());
    }

    #[test]
    fn test_enforced_gate_flips_on_completion() {
        let fx = fixture();
        fx.graph.add_lesson_prerequisite("l2", "l1", true).unwrap();

        let decision = fx.access.check_lesson_access("u1", "l2").unwrap();
        assert!(!decision.allowed);
        assert_eq!(decision.missing_prerequisites, vec!["l1"]);

        fx.db
            .with_conn(|conn| completions::mark_complete(conn, "u1", "l1", Scope::Lesson))
            .unwrap();

        let decision = fx.access.check_lesson_access("u1", "l2").unwrap();
        assert!(decision.allowed);
        assert!(decision.missing_prerequisites.is_empty());
    }

    #[test]
    fn test_advisory_edge_never_blocks() {
        let fx = fixture();
        fx.graph.add_lesson_prerequisite("l2", "l1", false).unwrap();

        let decision = fx.access.check_lesson_access("u1", "l2").unwrap();
        assert!(decision.allowed);
        assert_eq!(decision.advisory_unmet, vec!["l1"]);
    }

    #[test]
    fn test_unknown_lesson_is_not_found() {
        let fx = fixture();
        let err = fx.access.check_lesson_access("u1", "ghost").unwrap_err();
        assert!(matches!(err, GatingError::NotFound(_)));
    }

    #[test]
    fn test_unknown_course_is_not_found() {
        let fx = fixture();
        let err = fx.access.check_course_access("u1", "ghost").unwrap_err();
        assert!(matches!(err, GatingError::NotFound(_)));
    }
}
