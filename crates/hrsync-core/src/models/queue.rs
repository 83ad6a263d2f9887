//! Retry queue item model

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::util::{new_id, now_millis};

/// Lifecycle state of a queued operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QueueStatus {
    /// Waiting for its retry time
    Pending,
    /// Leased by a worker
    Processing,
    /// Finished successfully (terminal)
    Completed,
    /// Out of attempts (terminal)
    Failed,
}

impl QueueStatus {
    /// Stable string form used in storage.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Processing => "PROCESSING",
            Self::Completed => "COMPLETED",
            Self::Failed => "FAILED",
        }
    }

    /// Terminal states are never leased again.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl fmt::Display for QueueStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for QueueStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(Self::Pending),
            "PROCESSING" => Ok(Self::Processing),
            "COMPLETED" => Ok(Self::Completed),
            "FAILED" => Ok(Self::Failed),
            other => Err(Error::InvalidInput(format!("unknown queue status: {other}"))),
        }
    }
}

/// One durable unit of retryable work with an opaque payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryQueueItem {
    /// Row identifier
    pub id: String,
    /// Owning tenant
    pub tenant_id: String,
    /// Operation name dispatched by the worker
    pub operation: String,
    /// Operation input, opaque to the queue
    pub payload: serde_json::Value,
    /// Higher runs first
    pub priority: i64,
    /// Failed attempts so far
    pub attempts: u32,
    /// Attempts allowed before the item is failed for good
    pub max_attempts: u32,
    /// Lifecycle state
    pub status: QueueStatus,
    /// Earliest time the item may be leased again (unix ms)
    pub next_retry_at: Option<i64>,
    /// Message from the most recent failure
    pub last_error: Option<String>,
    /// Creation timestamp (unix ms)
    pub created_at: i64,
    /// Last transition timestamp (unix ms)
    pub updated_at: i64,
}

impl RetryQueueItem {
    /// Create a pending item that is immediately due.
    #[must_use]
    pub fn new(
        tenant_id: impl Into<String>,
        operation: impl Into<String>,
        payload: serde_json::Value,
        priority: i64,
        max_attempts: u32,
    ) -> Self {
        let now = now_millis();
        Self {
            id: new_id(),
            tenant_id: tenant_id.into(),
            operation: operation.into(),
            payload,
            priority,
            attempts: 0,
            max_attempts,
            status: QueueStatus::Pending,
            next_retry_at: Some(now),
            last_error: None,
            created_at: now,
            updated_at: now,
        }
    }
}
