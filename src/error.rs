//! Error types for lamad-core

use thiserror::Error;

#[derive(Error, Debug)]
pub enum GatingError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Item cannot require itself: {0}")]
    SelfReference(String),

    #[error("Prerequisite cycle: {prerequisite} already requires {dependent}")]
    Cycle {
        dependent: String,
        prerequisite: String,
    },

    #[error("Already exists: {0}")]
    AlreadyExists(String),

    #[error("Prerequisites not met for {item_id}: missing {missing:?}")]
    PrerequisitesNotMet {
        item_id: String,
        missing: Vec<String>,
    },

    #[error("Certificate issuance failed: {0}")]
    Issuance(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}
