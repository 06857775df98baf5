//! Catalog service - course structure registration and lookup
//!
//! Owns the course/module/lesson reference data and implements the
//! `CourseCatalog` trait the gating services consume, so an embedder
//! can substitute its own structure source without touching the
//! gating logic.

use std::sync::Arc;

use tracing::debug;

use crate::db::{catalog, GatingDb};
use crate::error::GatingError;

use super::events::{EventBus, GatingEvent};

/// Course structure as seen by the gating services.
///
/// Structure data is owned elsewhere conceptually; everything the
/// gating engine needs from it goes through this seam.
pub trait CourseCatalog: Send + Sync {
    /// Whether a course exists
    fn course_exists(&self, course_id: &str) -> Result<bool, GatingError>;

    /// The course a lesson belongs to, if the lesson exists
    fn lesson_course(&self, lesson_id: &str) -> Result<Option<String>, GatingError>;

    /// Lesson IDs for a course, ordered by module then lesson position
    fn ordered_lesson_ids(&self, course_id: &str) -> Result<Vec<String>, GatingError>;
}

/// Catalog service backed by the gating database
pub struct CatalogService {
    db: Arc<GatingDb>,
    events: Arc<EventBus>,
}

impl CatalogService {
    /// Create a new catalog service
    pub fn new(db: Arc<GatingDb>, events: Arc<EventBus>) -> Self {
        Self { db, events }
    }

    // =========================================================================
    // Read Operations
    // =========================================================================

    /// Get course by ID
    pub fn get(&self, id: &str) -> Result<Option<catalog::CourseRow>, GatingError> {
        self.db.with_conn(|conn| catalog::get_course(conn, id))
    }

    /// Get course with all modules and lessons
    pub fn get_structure(&self, id: &str) -> Result<Option<catalog::CourseStructure>, GatingError> {
        self.db
            .with_conn(|conn| catalog::get_course_structure(conn, id))
    }

    /// List courses with pagination
    pub fn list(&self, limit: u32, offset: u32) -> Result<Vec<catalog::CourseRow>, GatingError> {
        self.db
            .with_conn(|conn| catalog::list_courses(conn, limit, offset))
    }

    /// Get a lesson by ID
    pub fn get_lesson(&self, id: &str) -> Result<Option<catalog::LessonRow>, GatingError> {
        self.db.with_conn(|conn| catalog::get_lesson(conn, id))
    }

    // =========================================================================
    // Write Operations
    // =========================================================================

    /// Register a course with its modules and lessons
    pub fn register_course(
        &self,
        input: catalog::CreateCourseInput,
    ) -> Result<catalog::CourseRow, GatingError> {
        self.validate_course(&input)?;

        if self.get(&input.id)?.is_some() {
            return Err(GatingError::AlreadyExists(format!(
                "Course already registered: {}",
                input.id
            )));
        }

        let result = self
            .db
            .with_conn_mut(|conn| catalog::create_course(conn, input))?;

        debug!(id = %result.id, lessons = result.lesson_count, "Registered course");
        self.events.emit(GatingEvent::CourseRegistered {
            id: result.id.clone(),
            title: result.title.clone(),
            lesson_count: result.lesson_count,
        });

        Ok(result)
    }

    // =========================================================================
    // Validation
    // =========================================================================

    /// Validate course input
    fn validate_course(&self, input: &catalog::CreateCourseInput) -> Result<(), GatingError> {
        if input.id.is_empty() {
            return Err(GatingError::InvalidInput("id is required".into()));
        }

        if input.id.len() > 255 {
            return Err(GatingError::InvalidInput(
                "id must be <= 255 characters".into(),
            ));
        }

        if input.title.is_empty() {
            return Err(GatingError::InvalidInput("title is required".into()));
        }

        if input.title.len() > 500 {
            return Err(GatingError::InvalidInput(
                "title must be <= 500 characters".into(),
            ));
        }

        let valid_visibility = ["public", "private", "unlisted", "draft"];
        if !valid_visibility.contains(&input.visibility.as_str()) {
            return Err(GatingError::InvalidInput(format!(
                "visibility '{}' is not valid. Valid values: {:?}",
                input.visibility, valid_visibility
            )));
        }

        // Validate metadata_json is valid JSON if provided
        if let Some(ref json_str) = input.metadata_json {
            if !json_str.is_empty() {
                serde_json::from_str::<serde_json::Value>(json_str).map_err(|e| {
                    GatingError::InvalidInput(format!("metadata_json is not valid JSON: {}", e))
                })?;
            }
        }

        let mut seen_lessons = std::collections::BTreeSet::new();
        for (i, module) in input.modules.iter().enumerate() {
            if module.id.is_empty() {
                return Err(GatingError::InvalidInput(format!(
                    "modules[{}]: module id is required",
                    i
                )));
            }

            if module.title.is_empty() {
                return Err(GatingError::InvalidInput(format!(
                    "modules[{}]: module title is required",
                    i
                )));
            }

            for (j, lesson) in module.lessons.iter().enumerate() {
                self.validate_lesson(lesson).map_err(|e| {
                    GatingError::InvalidInput(format!("modules[{}].lessons[{}]: {}", i, j, e))
                })?;

                if !seen_lessons.insert(lesson.id.clone()) {
                    return Err(GatingError::InvalidInput(format!(
                        "duplicate lesson id: {}",
                        lesson.id
                    )));
                }
            }
        }

        Ok(())
    }

    /// Validate lesson input
    fn validate_lesson(&self, input: &catalog::CreateLessonInput) -> Result<(), GatingError> {
        if input.id.is_empty() {
            return Err(GatingError::InvalidInput("lesson id is required".into()));
        }

        if input.title.is_empty() {
            return Err(GatingError::InvalidInput("lesson title is required".into()));
        }

        let valid_types = [
            "video",
            "reading",
            "quiz",
            "assignment",
            "discussion",
            "project",
        ];
        if !valid_types.contains(&input.lesson_type.as_str()) {
            return Err(GatingError::InvalidInput(format!(
                "lesson_type '{}' is not valid. Valid types: {:?}",
                input.lesson_type, valid_types
            )));
        }

        Ok(())
    }
}

impl CourseCatalog for CatalogService {
    fn course_exists(&self, course_id: &str) -> Result<bool, GatingError> {
        self.db
            .with_conn(|conn| catalog::course_exists(conn, course_id))
    }

    fn lesson_course(&self, lesson_id: &str) -> Result<Option<String>, GatingError> {
        self.db
            .with_conn(|conn| catalog::lesson_course(conn, lesson_id))
    }

    fn ordered_lesson_ids(&self, course_id: &str) -> Result<Vec<String>, GatingError> {
        self.db
            .with_conn(|conn| catalog::ordered_lesson_ids(conn, course_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::catalog::{CreateCourseInput, CreateLessonInput, CreateModuleInput};

    fn service() -> CatalogService {
        let db = Arc::new(GatingDb::open_in_memory().unwrap());
        CatalogService::new(db, Arc::new(EventBus::new()))
    }

    fn minimal_course(id: &str) -> CreateCourseInput {
        CreateCourseInput {
            id: id.to_string(),
            title: "Test Course".to_string(),
            description: None,
            metadata_json: None,
            visibility: "public".to_string(),
            created_by: None,
            modules: vec![CreateModuleInput {
                id: format!("{}-m1", id),
                title: "Module 1".to_string(),
                order_index: 0,
                lessons: vec![CreateLessonInput {
                    id: format!("{}-l1", id),
                    title: "Lesson 1".to_string(),
                    lesson_type: "reading".to_string(),
                    order_index: 0,
                }],
            }],
        }
    }

    #[test]
    fn test_register_then_duplicate_fails() {
        let svc = service();
        svc.register_course(minimal_course("c1")).unwrap();

        let err = svc.register_course(minimal_course("c1")).unwrap_err();
        assert!(matches!(err, GatingError::AlreadyExists(_)));
    }

    #[test]
    fn test_rejects_bad_lesson_type() {
        let svc = service();
        let mut input = minimal_course("c1");
        input.modules[0].lessons[0].lesson_type = "hologram".to_string();

        let err = svc.register_course(input).unwrap_err();
        assert!(matches!(err, GatingError::InvalidInput(_)));
    }

    #[test]
    fn test_rejects_duplicate_lesson_ids() {
        let svc = service();
        let mut input = minimal_course("c1");
        let dup = input.modules[0].lessons[0].clone();
        input.modules[0].lessons.push(dup);

        let err = svc.register_course(input).unwrap_err();
        assert!(matches!(err, GatingError::InvalidInput(_)));
    }

    #[test]
    fn test_rejects_invalid_metadata_json() {
        let svc = service();
        let mut input = minimal_course("c1");
        input.metadata_json = Some("{not json".to_string());

        let err = svc.register_course(input).unwrap_err();
        assert!(matches!(err, GatingError::InvalidInput(_)));
    }

    #[test]
    fn test_catalog_trait_answers() {
        let svc = service();
        svc.register_course(minimal_course("c1")).unwrap();

        assert!(svc.course_exists("c1").unwrap());
        assert!(!svc.course_exists("c2").unwrap());
        assert_eq!(svc.lesson_course("c1-l1").unwrap().as_deref(), Some("c1"));
        assert_eq!(svc.ordered_lesson_ids("c1").unwrap(), vec!["c1-l1"]);
    }
}
