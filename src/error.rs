//! Error types for the sinew relationship graph.

use std::sync::Arc;

use thiserror::Error;

/// Main error type for sinew operations.
#[derive(Error, Debug)]
pub enum SinewError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Overlay error: {0}")]
    Overlay(#[from] OverlayError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Configuration-related errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadFile(#[source] std::io::Error),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Missing required field: {0}")]
    MissingField(String),
}

/// Relationship-store errors.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Store has not been initialized")]
    NotReady,

    #[error("Store rejected the operation: {0}")]
    Rejected(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Failures surfaced by the optimistic overlay.
///
/// Values are `Clone` (causes live behind `Arc`) because a failure is both
/// kept in the overlay's passive error state and returned to the caller.
#[derive(Error, Debug, Clone)]
pub enum OverlayError {
    #[error("Relationship layer is not initialized")]
    NotInitialized,

    #[error("Failed to add relationship: {cause}")]
    AddFailed { cause: Arc<StoreError> },

    #[error("Failed to remove relationship: {cause}")]
    RemoveFailed { cause: Arc<StoreError> },

    #[error("Relationship operation failed: {0}")]
    Unknown(String),
}

impl OverlayError {
    /// Normalize a failed store add into the overlay taxonomy.
    pub fn add_failed(err: SinewError) -> Self {
        match err {
            SinewError::Store(e) => Self::AddFailed { cause: Arc::new(e) },
            other => Self::Unknown(other.to_string()),
        }
    }

    /// Normalize a failed store remove into the overlay taxonomy.
    pub fn remove_failed(err: SinewError) -> Self {
        match err {
            SinewError::Store(e) => Self::RemoveFailed { cause: Arc::new(e) },
            other => Self::Unknown(other.to_string()),
        }
    }
}

/// Result type alias for sinew operations.
pub type Result<T> = std::result::Result<T, SinewError>;
