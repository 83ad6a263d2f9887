//! Error types for hrsync-core

use thiserror::Error;

/// Result type alias using hrsync-core's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in hrsync-core operations
#[derive(Error, Debug)]
pub enum Error {
    /// Malformed wire markup
    #[error("Parse error: {0}")]
    Parse(String),

    /// Fault reported by the remote system
    #[error("Remote fault: {0}")]
    Fault(String),

    /// Bad credentials or session
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// Transport failure, timeout, or non-2xx response
    #[error("API error: {0}")]
    Api(String),

    /// A required field has no usable mapping or value
    #[error("Mapping gap for {entity_type}.{field}")]
    MappingGap {
        /// Entity type the mapping belongs to
        entity_type: String,
        /// Local field that could not be mapped
        field: String,
    },

    /// Inbound webhook signature did not match
    #[error("Webhook signature mismatch")]
    SignatureMismatch,

    /// Retry queue item exhausted its attempts
    #[error("Queue item {0} exhausted its attempts")]
    QueueExhausted(String),

    /// Another run holds the tenant's sync lease
    #[error("Sync already in progress: {0}")]
    SyncInProgress(String),

    /// HTTP client error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// libSQL error
    #[error("libSQL error: {0}")]
    LibSql(#[from] libsql::Error),

    /// Record not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Whether a failed operation is worth re-attempting through the
    /// retry queue. Parse errors, bad credentials, and mapping gaps will
    /// fail the same way every time; transport problems may not.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Api(_) | Self::Http(_) | Self::SyncInProgress(_)
        )
    }
}
