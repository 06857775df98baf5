//! Course structure CRUD operations
//!
//! Courses hold ordered modules which hold ordered lessons. This is
//! reference data: the gating engine reads it to compute progress and
//! resolve which course a lesson belongs to, but never mutates it as
//! part of progress tracking.

use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};

use super::now_rfc3339;
use crate::error::GatingError;

/// Course row from database
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CourseRow {
    pub id: String,
    pub title: String,
    pub description: Option<String>,
    pub metadata_json: Option<String>,
    pub visibility: String,
    pub created_by: Option<String>,
    pub created_at: String,
    pub updated_at: String,
    #[serde(default)]
    pub lesson_count: u32,
}

impl CourseRow {
    fn from_row(row: &Row) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            title: row.get("title")?,
            description: row.get("description")?,
            metadata_json: row.get("metadata_json")?,
            visibility: row.get("visibility")?,
            created_by: row.get("created_by")?,
            created_at: row.get("created_at")?,
            updated_at: row.get("updated_at")?,
            lesson_count: 0,
        })
    }
}

/// Module row from database
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModuleRow {
    pub id: String,
    pub course_id: String,
    pub title: String,
    pub order_index: i32,
    #[serde(default)]
    pub lessons: Vec<LessonRow>,
}

impl ModuleRow {
    fn from_row(row: &Row) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            course_id: row.get("course_id")?,
            title: row.get("title")?,
            order_index: row.get("order_index")?,
            lessons: vec![],
        })
    }
}

/// Lesson row from database
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LessonRow {
    pub id: String,
    pub course_id: String,
    pub module_id: String,
    pub title: String,
    pub lesson_type: String,
    pub order_index: i32,
}

impl LessonRow {
    fn from_row(row: &Row) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            course_id: row.get("course_id")?,
            module_id: row.get("module_id")?,
            title: row.get("title")?,
            lesson_type: row.get("lesson_type")?,
            order_index: row.get("order_index")?,
        })
    }
}

/// Input for registering a course
#[derive(Debug, Clone, Deserialize)]
pub struct CreateCourseInput {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub metadata_json: Option<String>,
    #[serde(default = "default_visibility")]
    pub visibility: String,
    #[serde(default)]
    pub created_by: Option<String>,
    #[serde(default)]
    pub modules: Vec<CreateModuleInput>,
}

fn default_visibility() -> String {
    "public".to_string()
}

/// Input for a module within a course registration
#[derive(Debug, Clone, Deserialize)]
pub struct CreateModuleInput {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub order_index: i32,
    #[serde(default)]
    pub lessons: Vec<CreateLessonInput>,
}

/// Input for a lesson within a module registration
#[derive(Debug, Clone, Deserialize)]
pub struct CreateLessonInput {
    pub id: String,
    pub title: String,
    #[serde(default = "default_lesson_type")]
    pub lesson_type: String,
    #[serde(default)]
    pub order_index: i32,
}

fn default_lesson_type() -> String {
    "reading".to_string()
}

/// Course with its full module/lesson structure
#[derive(Debug, Clone, Serialize)]
pub struct CourseStructure {
    pub course: CourseRow,
    pub modules: Vec<ModuleRow>,
}

/// Get course by ID
pub fn get_course(conn: &Connection, id: &str) -> Result<Option<CourseRow>, GatingError> {
    let course = conn
        .query_row("SELECT * FROM courses WHERE id = ?", params![id], |row| {
            CourseRow::from_row(row)
        })
        .optional()
        .map_err(|e| GatingError::Internal(format!("Query failed: {}", e)))?;

    match course {
        Some(mut course) => {
            course.lesson_count = lesson_count(conn, id)?;
            Ok(Some(course))
        }
        None => Ok(None),
    }
}

/// Get course with all modules and lessons
pub fn get_course_structure(
    conn: &Connection,
    id: &str,
) -> Result<Option<CourseStructure>, GatingError> {
    let course = match get_course(conn, id)? {
        Some(c) => c,
        None => return Ok(None),
    };

    let mut stmt = conn
        .prepare("SELECT * FROM course_modules WHERE course_id = ? ORDER BY order_index")
        .map_err(|e| GatingError::Internal(format!("Prepare failed: {}", e)))?;

    let module_rows = stmt
        .query_map(params![id], |row| ModuleRow::from_row(row))
        .map_err(|e| GatingError::Internal(format!("Query failed: {}", e)))?;

    let mut modules = vec![];
    for row_result in module_rows {
        let mut module = row_result
            .map_err(|e| GatingError::Internal(format!("Row parse failed: {}", e)))?;

        module.lessons = get_lessons_for_module(conn, &module.id)?;
        modules.push(module);
    }

    Ok(Some(CourseStructure { course, modules }))
}

/// Get lessons for a module
fn get_lessons_for_module(conn: &Connection, module_id: &str) -> Result<Vec<LessonRow>, GatingError> {
    let mut stmt = conn
        .prepare("SELECT * FROM lessons WHERE module_id = ? ORDER BY order_index")
        .map_err(|e| GatingError::Internal(format!("Prepare failed: {}", e)))?;

    let lessons: Vec<LessonRow> = stmt
        .query_map(params![module_id], |row| LessonRow::from_row(row))
        .map_err(|e| GatingError::Internal(format!("Query failed: {}", e)))?
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| GatingError::Internal(format!("Row parse failed: {}", e)))?;

    Ok(lessons)
}

/// List all courses
pub fn list_courses(
    conn: &Connection,
    limit: u32,
    offset: u32,
) -> Result<Vec<CourseRow>, GatingError> {
    let mut stmt = conn
        .prepare("SELECT * FROM courses ORDER BY created_at DESC LIMIT ? OFFSET ?")
        .map_err(|e| GatingError::Internal(format!("Prepare failed: {}", e)))?;

    let course_rows = stmt
        .query_map(params![limit as i64, offset as i64], |row| {
            CourseRow::from_row(row)
        })
        .map_err(|e| GatingError::Internal(format!("Query failed: {}", e)))?;

    let mut courses = vec![];
    for row_result in course_rows {
        let mut course = row_result
            .map_err(|e| GatingError::Internal(format!("Row parse failed: {}", e)))?;

        course.lesson_count = lesson_count(conn, &course.id)?;
        courses.push(course);
    }

    Ok(courses)
}

/// Register a course with its modules and lessons
pub fn create_course(conn: &mut Connection, input: CreateCourseInput) -> Result<CourseRow, GatingError> {
    let tx = conn
        .transaction()
        .map_err(|e| GatingError::Internal(format!("Transaction failed: {}", e)))?;

    let now = now_rfc3339();

    tx.execute(
        r#"
        INSERT INTO courses (
            id, title, description, metadata_json, visibility, created_by,
            created_at, updated_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        "#,
        params![
            input.id,
            input.title,
            input.description,
            input.metadata_json,
            input.visibility,
            input.created_by,
            now,
            now,
        ],
    )
    .map_err(|e| GatingError::Internal(format!("Course insert failed: {}", e)))?;

    for module in &input.modules {
        tx.execute(
            "INSERT INTO course_modules (id, course_id, title, order_index) VALUES (?, ?, ?, ?)",
            params![module.id, input.id, module.title, module.order_index],
        )
        .map_err(|e| GatingError::Internal(format!("Module insert failed: {}", e)))?;

        for lesson in &module.lessons {
            tx.execute(
                r#"
                INSERT INTO lessons (id, course_id, module_id, title, lesson_type, order_index)
                VALUES (?, ?, ?, ?, ?, ?)
                "#,
                params![
                    lesson.id,
                    input.id,
                    module.id,
                    lesson.title,
                    lesson.lesson_type,
                    lesson.order_index,
                ],
            )
            .map_err(|e| GatingError::Internal(format!("Lesson insert failed: {}", e)))?;
        }
    }

    tx.commit()
        .map_err(|e| GatingError::Internal(format!("Commit failed: {}", e)))?;

    get_course(conn, &input.id)?
        .ok_or_else(|| GatingError::Internal("Course not found after insert".to_string()))
}

/// Check whether a course exists
pub fn course_exists(conn: &Connection, id: &str) -> Result<bool, GatingError> {
    let exists = conn
        .query_row("SELECT 1 FROM courses WHERE id = ?", params![id], |_| Ok(()))
        .optional()
        .map_err(|e| GatingError::Internal(format!("Query failed: {}", e)))?;

    Ok(exists.is_some())
}

/// Get a lesson by ID
pub fn get_lesson(conn: &Connection, id: &str) -> Result<Option<LessonRow>, GatingError> {
    conn.query_row("SELECT * FROM lessons WHERE id = ?", params![id], |row| {
        LessonRow::from_row(row)
    })
    .optional()
    .map_err(|e| GatingError::Internal(format!("Query failed: {}", e)))
}

/// Get the course a lesson belongs to
pub fn lesson_course(conn: &Connection, lesson_id: &str) -> Result<Option<String>, GatingError> {
    conn.query_row(
        "SELECT course_id FROM lessons WHERE id = ?",
        params![lesson_id],
        |row| row.get(0),
    )
    .optional()
    .map_err(|e| GatingError::Internal(format!("Query failed: {}", e)))
}

/// Lesson IDs for a course in module order, then lesson order
pub fn ordered_lesson_ids(conn: &Connection, course_id: &str) -> Result<Vec<String>, GatingError> {
    let mut stmt = conn
        .prepare(
            r#"
            SELECT l.id FROM lessons l
            JOIN course_modules m ON l.module_id = m.id
            WHERE l.course_id = ?
            ORDER BY m.order_index, l.order_index
            "#,
        )
        .map_err(|e| GatingError::Internal(format!("Prepare failed: {}", e)))?;

    let ids: Vec<String> = stmt
        .query_map(params![course_id], |row| row.get(0))
        .map_err(|e| GatingError::Internal(format!("Query failed: {}", e)))?
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| GatingError::Internal(format!("Row parse failed: {}", e)))?;

    Ok(ids)
}

/// Get lesson count for a course
pub fn lesson_count(conn: &Connection, course_id: &str) -> Result<u32, GatingError> {
    let count: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM lessons WHERE course_id = ?",
            params![course_id],
            |row| row.get(0),
        )
        .map_err(|e| GatingError::Internal(format!("Query failed: {}", e)))?;

    Ok(count as u32)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::GatingDb;

    fn course_input() -> CreateCourseInput {
        CreateCourseInput {
            id: "rust-intro".to_string(),
            title: "Introduction to Rust".to_string(),
            description: Some("Ownership and borrowing from first principles".to_string()),
            metadata_json: None,
            visibility: "public".to_string(),
            created_by: Some("instructor-1".to_string()),
            modules: vec![
                CreateModuleInput {
                    id: "m1".to_string(),
                    title: "Basics".to_string(),
                    order_index: 0,
                    lessons: vec![
                        CreateLessonInput {
                            id: "l1".to_string(),
                            title: "Hello, world".to_string(),
                            lesson_type: "reading".to_string(),
                            order_index: 0,
                        },
                        CreateLessonInput {
                            id: "l2".to_string(),
                            title: "Variables".to_string(),
                            lesson_type: "video".to_string(),
                            order_index: 1,
                        },
                    ],
                },
                CreateModuleInput {
                    id: "m2".to_string(),
                    title: "Ownership".to_string(),
                    order_index: 1,
                    lessons: vec![CreateLessonInput {
                        id: "l3".to_string(),
                        title: "Moves".to_string(),
                        lesson_type: "quiz".to_string(),
                        order_index: 0,
                    }],
                },
            ],
        }
    }

    #[test]
    fn test_create_and_get_course() {
        let db = GatingDb::open_in_memory().unwrap();

        let created = db
            .with_conn_mut(|conn| create_course(conn, course_input()))
            .unwrap();
        assert_eq!(created.id, "rust-intro");
        assert_eq!(created.lesson_count, 3);

        let fetched = db.with_conn(|conn| get_course(conn, "rust-intro")).unwrap();
        assert!(fetched.is_some());
        assert_eq!(fetched.unwrap().title, "Introduction to Rust");
    }

    #[test]
    fn test_ordered_lesson_ids_follow_module_order() {
        let db = GatingDb::open_in_memory().unwrap();
        db.with_conn_mut(|conn| create_course(conn, course_input()))
            .unwrap();

        let ids = db
            .with_conn(|conn| ordered_lesson_ids(conn, "rust-intro"))
            .unwrap();
        assert_eq!(ids, vec!["l1", "l2", "l3"]);
    }

    #[test]
    fn test_lesson_course_resolution() {
        let db = GatingDb::open_in_memory().unwrap();
        db.with_conn_mut(|conn| create_course(conn, course_input()))
            .unwrap();

        let course = db.with_conn(|conn| lesson_course(conn, "l3")).unwrap();
        assert_eq!(course.as_deref(), Some("rust-intro"));

        let missing = db.with_conn(|conn| lesson_course(conn, "nope")).unwrap();
        assert!(missing.is_none());
    }

    #[test]
    fn test_course_structure_groups_lessons() {
        let db = GatingDb::open_in_memory().unwrap();
        db.with_conn_mut(|conn| create_course(conn, course_input()))
            .unwrap();

        let structure = db
            .with_conn(|conn| get_course_structure(conn, "rust-intro"))
            .unwrap()
            .unwrap();
        assert_eq!(structure.modules.len(), 2);
        assert_eq!(structure.modules[0].lessons.len(), 2);
        assert_eq!(structure.modules[1].lessons.len(), 1);
    }
}
