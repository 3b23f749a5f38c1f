//! Error types for Strata

use thiserror::Error;

use crate::memory::types::{NodeId, TierKind};

/// Main error type for Strata operations
#[derive(Error, Debug)]
pub enum StrataError {
    /// The referenced node is not present in the tier
    #[error("Node not found in {tier} tier: {id}")]
    NotFound { tier: TierKind, id: NodeId },

    /// Eviction could not make room for a new node
    #[error("{tier} tier is at capacity ({capacity})")]
    CapacityExceeded { tier: TierKind, capacity: usize },

    /// The persistence collaborator failed to save or delete
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// A consolidation pass failed; the next scheduled pass retries
    #[error("Consolidation error: {0}")]
    Consolidation(String),

    /// Fusion was requested with too few or unknown source nodes
    #[error("Invalid fusion input: {0}")]
    InvalidFusionInput(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Embedding or summarization capability errors
    #[error("Embedding error: {0}")]
    Embedding(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl StrataError {
    /// True for failures that mean "busy, try later" rather than "not stored".
    pub fn is_retryable(&self) -> bool {
        matches!(self, StrataError::Consolidation(_))
    }
}

impl From<serde_json::Error> for StrataError {
    fn from(e: serde_json::Error) -> Self {
        StrataError::Serialization(e.to_string())
    }
}

/// Result type alias for Strata operations
pub type Result<T> = std::result::Result<T, StrataError>;
