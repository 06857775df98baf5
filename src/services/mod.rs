//! Service layer for lamad-core
//!
//! Services encapsulate gating logic between the embedding
//! application and the repositories. Each service wraps database
//! operations with:
//! - Input validation
//! - Invariant enforcement (acyclicity, terminal states, idempotence)
//! - Event emission for audit/notifications
//! - Transaction boundaries
//!
//! ## Architecture
//!
//! ```text
//! Embedding application (HTTP, jobs, grading hooks)
//!     |
//! Service Layer (gating logic)
//!     |
//! Repository Layer (db/*.rs)
//!     |
//! SQLite Database
//! ```

pub mod events;
pub mod catalog_service;
pub mod graph_service;
pub mod access_service;
pub mod progress_service;
pub mod certificate_service;

// Re-exports
pub use access_service::{AccessDecision, AccessService};
pub use catalog_service::{CatalogService, CourseCatalog};
pub use certificate_service::CertificateService;
pub use events::{EventBus, EventListener, GatingEvent, LoggingEventListener};
pub use graph_service::GraphService;
pub use progress_service::{CompletionOutcome, ProgressService};

use std::sync::Arc;

use crate::config::Config;
use crate::db::GatingDb;
use crate::error::GatingError;

/// Service container for dependency injection
///
/// Holds all services with a shared database connection. Pass this to
/// the embedding application layer.
pub struct Services {
    pub catalog: Arc<CatalogService>,
    pub graph: Arc<GraphService>,
    pub access: Arc<AccessService>,
    pub progress: Arc<ProgressService>,
    pub certificates: Arc<CertificateService>,
    pub events: Arc<EventBus>,
}

impl Services {
    /// Create all services over a shared database
    pub fn new(db: Arc<GatingDb>, config: &Config) -> Self {
        let events = Arc::new(EventBus::with_capacity(config.event_capacity));
        let catalog = Arc::new(CatalogService::new(db.clone(), events.clone()));
        let graph = Arc::new(GraphService::new(db.clone(), events.clone()));
        let access = Arc::new(AccessService::new(
            db.clone(),
            catalog.clone() as Arc<dyn CourseCatalog>,
        ));
        let certificates = Arc::new(CertificateService::new(db.clone(), events.clone(), config));
        let progress = Arc::new(ProgressService::new(
            db,
            catalog.clone() as Arc<dyn CourseCatalog>,
            access.clone(),
            certificates.clone(),
            events.clone(),
        ));

        Self {
            catalog,
            graph,
            access,
            progress,
            certificates,
            events,
        }
    }

    /// Open the database under the configured storage dir and wire services
    pub fn open(config: &Config) -> Result<Self, GatingError> {
        let db = Arc::new(GatingDb::open(&config.storage_dir)?);
        Ok(Self::new(db, config))
    }

    /// In-memory services (for testing)
    pub fn in_memory() -> Result<Self, GatingError> {
        let db = Arc::new(GatingDb::open_in_memory()?);
        Ok(Self::new(db, &Config::default()))
    }
}
