//! Progress service - enrollment lifecycle and progress aggregation
//!
//! Drives the enrollment state machine: `not_started` becomes
//! `in_progress` on the first lesson completion and `completed` when
//! every lesson in every module is complete. `completed` is terminal.
//!
//! Recomputation is a read-modify-write over completion records and
//! enrollment state. Two guards keep it consistent under concurrent
//! completions of the same enrollment:
//! - a per-(user, course) mutex held across mark -> recompute -> issue,
//!   so only one caller decides the completion transition;
//! - a single SQLite transaction around the count-and-persist step.

use std::sync::{Arc, Mutex};

use dashmap::DashMap;
use serde::Serialize;
use tracing::debug;

use crate::db::certificates::Certificate;
use crate::db::enrollments::EnrollmentState;
use crate::db::{completions, enrollments, CompletionRecord, EnrollmentStatus, GatingDb, Scope};
use crate::error::GatingError;

use super::access_service::AccessService;
use super::catalog_service::CourseCatalog;
use super::certificate_service::CertificateService;
use super::events::{EventBus, GatingEvent};

/// Result of a lesson completion
#[derive(Debug, Clone, Serialize)]
pub struct CompletionOutcome {
    /// Whether this call wrote a new completion record
    pub newly_completed_lesson: bool,

    /// Enrollment state after recomputation
    pub state: EnrollmentState,

    /// The course certificate, present once the enrollment is completed
    pub certificate: Option<Certificate>,
}

/// Progress service
pub struct ProgressService {
    db: Arc<GatingDb>,
    catalog: Arc<dyn CourseCatalog>,
    access: Arc<AccessService>,
    certificates: Arc<CertificateService>,
    events: Arc<EventBus>,
    enrollment_locks: DashMap<(String, String), Arc<Mutex<()>>>,
}

impl ProgressService {
    /// Create a new progress service
    pub fn new(
        db: Arc<GatingDb>,
        catalog: Arc<dyn CourseCatalog>,
        access: Arc<AccessService>,
        certificates: Arc<CertificateService>,
        events: Arc<EventBus>,
    ) -> Self {
        Self {
            db,
            catalog,
            access,
            certificates,
            events,
            enrollment_locks: DashMap::new(),
        }
    }

    // =========================================================================
    // Enrollment
    // =========================================================================

    /// Enroll a user in a course; re-enrolling is a no-op
    ///
    /// Enforced course prerequisites gate enrollment the same way
    /// lesson prerequisites gate lesson access.
    pub fn enroll(&self, user_id: &str, course_id: &str) -> Result<EnrollmentState, GatingError> {
        // Raises NotFound for an unknown course
        let decision = self.access.check_course_access(user_id, course_id)?;
        if !decision.allowed {
            return Err(GatingError::PrerequisitesNotMet {
                item_id: course_id.to_string(),
                missing: decision.missing_prerequisites,
            });
        }

        let (state, newly) = self
            .db
            .with_conn_mut(|conn| enrollments::create(conn, user_id, course_id))?;

        if newly {
            debug!(user = %user_id, course = %course_id, "Created enrollment");
            self.events.emit(GatingEvent::EnrollmentCreated {
                user_id: user_id.to_string(),
                course_id: course_id.to_string(),
            });
        }

        Ok(state)
    }

    /// Get enrollment state for a user and course
    pub fn get_enrollment_progress(
        &self,
        user_id: &str,
        course_id: &str,
    ) -> Result<EnrollmentState, GatingError> {
        self.db
            .with_conn(|conn| enrollments::get(conn, user_id, course_id))?
            .ok_or_else(|| {
                GatingError::NotFound(format!(
                    "No enrollment for user {} in course {}",
                    user_id, course_id
                ))
            })
    }

    /// List all enrollments for a user
    pub fn list_enrollments(&self, user_id: &str) -> Result<Vec<EnrollmentState>, GatingError> {
        self.db
            .with_conn(|conn| enrollments::list_for_user(conn, user_id))
    }

    // =========================================================================
    // Completion
    // =========================================================================

    /// Mark a lesson complete and recompute course progress
    ///
    /// The only producer of lesson completion records. Requires an
    /// enrollment in the owning course and satisfied enforced lesson
    /// prerequisites. Returns the recomputed state plus the course
    /// certificate once the enrollment has completed.
    pub fn mark_lesson_complete(
        &self,
        user_id: &str,
        lesson_id: &str,
    ) -> Result<CompletionOutcome, GatingError> {
        let course_id = self.catalog.lesson_course(lesson_id)?.ok_or_else(|| {
            GatingError::NotFound(format!("Lesson not found: {}", lesson_id))
        })?;

        if self
            .db
            .with_conn(|conn| enrollments::get(conn, user_id, &course_id))?
            .is_none()
        {
            return Err(GatingError::NotFound(format!(
                "No enrollment for user {} in course {}",
                user_id, course_id
            )));
        }

        let decision = self.access.check_lesson_access(user_id, lesson_id)?;
        if !decision.allowed {
            return Err(GatingError::PrerequisitesNotMet {
                item_id: lesson_id.to_string(),
                missing: decision.missing_prerequisites,
            });
        }

        let lock = self.enrollment_lock(user_id, &course_id);
        let _guard = lock
            .lock()
            .map_err(|e| GatingError::Internal(format!("Enrollment lock poisoned: {}", e)))?;

        let newly_completed_lesson = self.db.with_conn_mut(|conn| {
            completions::mark_complete(conn, user_id, lesson_id, Scope::Lesson)
        })?;

        if newly_completed_lesson {
            debug!(user = %user_id, lesson = %lesson_id, "Completed lesson");
            self.events.emit(GatingEvent::LessonCompleted {
                user_id: user_id.to_string(),
                lesson_id: lesson_id.to_string(),
                course_id: course_id.clone(),
            });
        }

        let (state, newly_completed_course) = self.recompute_locked(user_id, &course_id)?;

        // Issuance is idempotent, so asking again for an already
        // completed enrollment cannot mint a second certificate; it
        // also heals a completion whose first issuance attempt failed.
        let certificate = if state.status == EnrollmentStatus::Completed {
            Some(self.certificates.issue(user_id, &course_id)?)
        } else {
            None
        };

        if newly_completed_course {
            self.events.emit(GatingEvent::CourseCompleted {
                user_id: user_id.to_string(),
                course_id: course_id.clone(),
            });
        }

        Ok(CompletionOutcome {
            newly_completed_lesson,
            state,
            certificate,
        })
    }

    /// Check whether a user has completed an item
    pub fn is_complete(&self, user_id: &str, item_id: &str, scope: Scope) -> Result<bool, GatingError> {
        self.db
            .with_conn(|conn| completions::is_complete(conn, user_id, item_id, scope))
    }

    /// All completions for a user within one scope
    pub fn list_completed(
        &self,
        user_id: &str,
        scope: Scope,
    ) -> Result<Vec<CompletionRecord>, GatingError> {
        self.db
            .with_conn(|conn| completions::list_completed(conn, user_id, scope))
    }

    // =========================================================================
    // Recomputation
    // =========================================================================

    /// Recompute progress for an enrollment
    ///
    /// Idempotent: with no new completions the resulting state is
    /// identical. Safe to call after a storage failure left progress
    /// stale.
    pub fn recompute_progress(
        &self,
        user_id: &str,
        course_id: &str,
    ) -> Result<EnrollmentState, GatingError> {
        let lock = self.enrollment_lock(user_id, course_id);
        let _guard = lock
            .lock()
            .map_err(|e| GatingError::Internal(format!("Enrollment lock poisoned: {}", e)))?;

        let (state, newly_completed) = self.recompute_locked(user_id, course_id)?;

        if newly_completed {
            self.certificates.issue(user_id, course_id)?;
            self.events.emit(GatingEvent::CourseCompleted {
                user_id: user_id.to_string(),
                course_id: course_id.to_string(),
            });
        }

        Ok(state)
    }

    /// Recompute while holding the enrollment lock
    ///
    /// Returns the persisted state and whether this call transitioned
    /// the enrollment to `completed`.
    fn recompute_locked(
        &self,
        user_id: &str,
        course_id: &str,
    ) -> Result<(EnrollmentState, bool), GatingError> {
        // Structure is read-only reference data; fetching it outside
        // the transaction below cannot skew the count.
        let lesson_ids = self.catalog.ordered_lesson_ids(course_id)?;

        let (state, newly_completed, changed) = self.db.with_conn_mut(|conn| {
            let tx = conn
                .transaction()
                .map_err(|e| GatingError::Internal(format!("Transaction failed: {}", e)))?;

            let current = enrollments::get(&tx, user_id, course_id)?.ok_or_else(|| {
                GatingError::NotFound(format!(
                    "No enrollment for user {} in course {}",
                    user_id, course_id
                ))
            })?;

            // Terminal state: nothing to recompute
            if current.status == EnrollmentStatus::Completed {
                return Ok((current, false, false));
            }

            let total = lesson_ids.len();
            let mut completed = 0usize;
            for lesson_id in &lesson_ids {
                if completions::is_complete(&tx, user_id, lesson_id, Scope::Lesson)? {
                    completed += 1;
                }
            }

            // Rounded to the nearest point so a 2-of-3 course reads 67%
            let progress_percent = if total == 0 {
                0
            } else {
                (((completed * 100 + total / 2) / total) as u8).min(100)
            };

            let status = if total == 0 || completed == 0 {
                EnrollmentStatus::NotStarted
            } else if completed == total {
                EnrollmentStatus::Completed
            } else {
                EnrollmentStatus::InProgress
            };

            let newly_completed = status == EnrollmentStatus::Completed;
            let changed =
                status != current.status || progress_percent != current.progress_percent;

            let completed_at = if newly_completed {
                Some(crate::db::now_rfc3339())
            } else {
                None
            };

            let state = enrollments::update_progress(
                &tx,
                user_id,
                course_id,
                status,
                progress_percent,
                completed_at.as_deref(),
            )?;

            // A completed course is itself a completion, visible to
            // course-scope prerequisite gates.
            if newly_completed {
                completions::mark_complete(&tx, user_id, course_id, Scope::Course)?;
            }

            tx.commit()
                .map_err(|e| GatingError::Internal(format!("Commit failed: {}", e)))?;

            Ok((state, newly_completed, changed))
        })?;

        if changed {
            self.events.emit(GatingEvent::ProgressUpdated {
                user_id: user_id.to_string(),
                course_id: course_id.to_string(),
                status: state.status,
                progress_percent: state.progress_percent,
            });
        }

        Ok((state, newly_completed))
    }

    /// Lock guarding recomputation for one enrollment
    fn enrollment_lock(&self, user_id: &str, course_id: &str) -> Arc<Mutex<()>> {
        self.enrollment_locks
            .entry((user_id.to_string(), course_id.to_string()))
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }
}
