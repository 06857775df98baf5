//! Lamad Core - progress gating engine for Lamad courses
//!
//! Decides whether a learner may access a course or lesson, tracks
//! completion, aggregates it into enrollment progress, and issues
//! exactly one certificate per completed enrollment. The surrounding
//! application layer owns routing, media, payments, and rendering;
//! this crate owns the invariants:
//!
//! - the prerequisite graph never contains a cycle,
//! - completion records are write-once and progress never reverts,
//! - certificate issuance is exactly-once per (user, course).
//!
//! ## Architecture
//!
//! | Component            | Responsibility                                 |
//! |----------------------|------------------------------------------------|
//! | `GraphService`       | prerequisite edges, cycle rejection            |
//! | `AccessService`      | allow/deny against enforced prerequisites      |
//! | `ProgressService`    | enrollment state machine, percent aggregation  |
//! | `CertificateService` | idempotent certificate issuance + verification |
//! | `CatalogService`     | course/module/lesson reference data            |
//!
//! All state lives in one SQLite database; events fan out over a
//! broadcast bus for audit logging and notification delivery.
//!
//! ## Example
//!
//! ```no_run
//! use lamad_core::{Config, Services};
//!
//! let services = Services::open(&Config::default())?;
//!
//! services.graph.add_lesson_prerequisite("ownership-quiz", "ownership-intro", true)?;
//!
//! services.progress.enroll("learner-1", "rust-intro")?;
//! let outcome = services.progress.mark_lesson_complete("learner-1", "ownership-intro")?;
//! println!("{}% complete", outcome.state.progress_percent);
//! # Ok::<(), lamad_core::GatingError>(())
//! ```

pub mod config;
pub mod db;
pub mod error;
pub mod services;

// Re-exports
pub use config::Config;
pub use db::{
    Certificate, CompletionRecord, CourseRow, CourseStructure, CreateCourseInput,
    CreateLessonInput, CreateModuleInput, DbStats, EnrollmentState, EnrollmentStatus, GatingDb,
    LessonRow, ModuleRow, PrerequisiteEdge, Scope,
};
pub use error::GatingError;
pub use services::{
    AccessDecision, AccessService, CatalogService, CertificateService, CompletionOutcome,
    CourseCatalog, EventBus, EventListener, GatingEvent, GraphService, LoggingEventListener,
    ProgressService, Services,
};
