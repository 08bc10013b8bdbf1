//! Unified error types for the triage engine
//!
//! This module defines error types that:
//! - Are serializable so a view bridge can forward them as-is
//! - Carry the machine-readable kind the remote service reports
//! - Separate transport outcomes from local engine refusals

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Engine error type for store operations and remote calls
///
/// Remote kinds (`Cancelled`, `NotFound`, `Conflict`, `Forbidden`, `Service`,
/// `Network`) come back from the triage service. The rest are raised locally.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "type", content = "message")]
pub enum TriageError {
    #[error("Request cancelled")]
    Cancelled,

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Service error: {0}")]
    Service(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Item not loaded: {0}")]
    ItemNotFound(String),

    #[error("An action is already in progress for {0}")]
    AlreadyInFlight(String),

    #[error("Cannot undo: {0}")]
    UndoUnsupported(String),

    #[error("Nothing to undo")]
    NothingToUndo,

    #[error("A bulk action is already running")]
    BulkInProgress,

    #[error("No bulk action is waiting for confirmation")]
    NoPendingConfirmation,

    #[error("No failed bulk action to retry")]
    NothingToRetry,

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(String),

    #[error("{0}")]
    Other(String),
}

impl TriageError {
    /// Client-initiated cancellation, never shown to the user
    pub fn is_cancellation(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Remote state disagrees with ours; callers reconcile from the service
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    /// Someone else already holds the target (assign race)
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict(_))
    }
}

// Implement From for common error types

impl From<std::io::Error> for TriageError {
    fn from(err: std::io::Error) -> Self {
        TriageError::Io(err.to_string())
    }
}

impl From<toml::de::Error> for TriageError {
    fn from(err: toml::de::Error) -> Self {
        TriageError::Config(err.to_string())
    }
}

/// Result type alias using TriageError
pub type Result<T> = std::result::Result<T, TriageError>;
