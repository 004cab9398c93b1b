//! Error types for the onboarding story workflow.

use std::time::Duration;

/// Top-level error type.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Attachment error: {0}")]
    Attachment(#[from] AttachmentError),

    #[error("Sync error: {0}")]
    Sync(#[from] SyncError),

    #[error("Story error: {0}")]
    Story(#[from] StoryError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Database-related errors.
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Connection pool error: {0}")]
    Pool(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Remote manifest / image fetch errors.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("Request to {url} failed: {reason}")]
    RequestFailed { url: String, reason: String },

    #[error("Request to {url} returned HTTP {status}")]
    Status { url: String, status: u16 },

    #[error("Invalid manifest: {0}")]
    InvalidManifest(String),
}

/// Attachment ingestion errors.
#[derive(Debug, thiserror::Error)]
pub enum AttachmentError {
    #[error("Malformed attachment: {reason}")]
    Malformed { reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Account record sync errors.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("Account sync failed: {0}")]
    Failed(String),

    #[error("Account sync timed out after {0:?}")]
    Timeout(Duration),
}

/// Workflow-level errors raised by the coordinator itself.
#[derive(Debug, thiserror::Error)]
pub enum StoryError {
    #[error("Story transport is not initialized")]
    TransportNotInitialized,

    #[error("Manifest has no images for locale {locale} and no usable fallback")]
    NoImagesForLocale { locale: String },

    #[error("Downloaded {actual} images, expected {expected}")]
    ImageCountMismatch { expected: usize, actual: usize },

    #[error("Story already in phase {from}, cannot transition to {to}")]
    InvalidTransition { from: String, to: String },
}

/// Result type alias for the crate.
pub type Result<T> = std::result::Result<T, Error>;
