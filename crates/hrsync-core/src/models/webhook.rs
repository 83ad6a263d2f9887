//! Webhook event model

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::util::{new_id, now_millis};

/// Which way the event travelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WebhookDirection {
    Inbound,
    Outbound,
}

impl WebhookDirection {
    /// Stable string form used in storage.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Inbound => "INBOUND",
            Self::Outbound => "OUTBOUND",
        }
    }
}

impl FromStr for WebhookDirection {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "INBOUND" => Ok(Self::Inbound),
            "OUTBOUND" => Ok(Self::Outbound),
            other => Err(Error::InvalidInput(format!(
                "unknown webhook direction: {other}"
            ))),
        }
    }
}

/// Delivery state of a webhook event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WebhookStatus {
    Pending,
    Delivered,
    Failed,
}

impl WebhookStatus {
    /// Stable string form used in storage.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Delivered => "DELIVERED",
            Self::Failed => "FAILED",
        }
    }
}

impl fmt::Display for WebhookStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WebhookStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(Self::Pending),
            "DELIVERED" => Ok(Self::Delivered),
            "FAILED" => Ok(Self::Failed),
            other => Err(Error::InvalidInput(format!(
                "unknown webhook status: {other}"
            ))),
        }
    }
}

/// One sent or received event, kept for delivery tracking and replay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebhookEvent {
    /// Row identifier
    pub id: String,
    /// Owning tenant
    pub tenant_id: String,
    /// Direction of travel
    pub direction: WebhookDirection,
    /// Event name, e.g. `employee.updated`
    pub event_type: String,
    /// Event body
    pub payload: serde_json::Value,
    /// Delivery state
    pub status: WebhookStatus,
    /// Delivery attempts so far
    pub attempts: u32,
    /// Message from the most recent failure
    pub last_error: Option<String>,
    /// Creation timestamp (unix ms)
    pub created_at: i64,
    /// Last state change (unix ms)
    pub updated_at: i64,
}

impl WebhookEvent {
    /// Record a new pending event.
    #[must_use]
    pub fn new(
        tenant_id: impl Into<String>,
        direction: WebhookDirection,
        event_type: impl Into<String>,
        payload: serde_json::Value,
    ) -> Self {
        let now = now_millis();
        Self {
            id: new_id(),
            tenant_id: tenant_id.into(),
            direction,
            event_type: event_type.into(),
            payload,
            status: WebhookStatus::Pending,
            attempts: 0,
            last_error: None,
            created_at: now,
            updated_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_round_trips_through_str() {
        for status in [
            WebhookStatus::Pending,
            WebhookStatus::Delivered,
            WebhookStatus::Failed,
        ] {
            assert_eq!(status.as_str().parse::<WebhookStatus>().unwrap(), status);
        }
    }

    #[test]
    fn new_event_is_pending() {
        let event = WebhookEvent::new(
            "t1",
            WebhookDirection::Outbound,
            "employee.updated",
            serde_json::json!({"id": 1}),
        );
        assert_eq!(event.status, WebhookStatus::Pending);
        assert_eq!(event.attempts, 0);
    }
}
