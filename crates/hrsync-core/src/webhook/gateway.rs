//! Outbound delivery and inbound dispatch of signed events

use std::time::Duration;

use serde_json::Value as Json;

use crate::db::{QueueRepository, WebhookEventRepository};
use crate::error::{Error, Result};
use crate::models::{ConnectionConfig, WebhookDirection, WebhookEvent, WebhookStatus};
use crate::queue::RetryQueue;
use crate::util::now_millis;

use super::signature::{sign, verify};

/// Header carrying the hex HMAC-SHA256 signature.
pub const SIGNATURE_HEADER: &str = "X-Webhook-Signature";
/// Header carrying the event type.
pub const EVENT_HEADER: &str = "X-Webhook-Event";

const WEBHOOK_TIMEOUT_SECS: u64 = 10;
const RETRY_CEILING: u32 = 3;

/// Delivers outbound domain events to the tenant's endpoint and
/// authenticates/dispatches inbound ones.
///
/// Inbound events do not run sync work inline; the dispatch table
/// enqueues the matching retry-queue operation so the worker picks it up
/// with the usual backoff guarantees.
#[derive(Debug)]
pub struct WebhookGateway<E, Q> {
    events: E,
    queue: RetryQueue<Q>,
    http: reqwest::Client,
}

impl<E, Q> WebhookGateway<E, Q>
where
    E: WebhookEventRepository,
    Q: QueueRepository,
{
    /// Create a gateway over the given event store and retry queue.
    pub fn new(events: E, queue: RetryQueue<Q>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(WEBHOOK_TIMEOUT_SECS))
            .build()?;
        Ok(Self {
            events,
            queue,
            http,
        })
    }

    /// Send one outbound event to the tenant endpoint.
    ///
    /// A tenant without a configured endpoint is a no-op, not an error.
    /// Returns whether the event was delivered.
    pub async fn send(
        &self,
        config: &ConnectionConfig,
        event_type: &str,
        data: Json,
    ) -> Result<bool> {
        let Some(endpoint) = config.webhook_url.as_deref() else {
            tracing::debug!(tenant = %config.tenant_id, event_type, "no webhook endpoint, skipping");
            return Ok(false);
        };

        let payload = envelope(event_type, data);
        let mut event = WebhookEvent::new(
            &config.tenant_id,
            WebhookDirection::Outbound,
            event_type,
            payload,
        );
        // Record before sending so a crash mid-flight leaves a trace
        self.events.save(&event).await?;

        let delivered = self
            .deliver(endpoint, config.webhook_secret.as_deref(), &mut event)
            .await;
        self.events.save(&event).await?;

        Ok(delivered)
    }

    /// Authenticate and dispatch one inbound event.
    ///
    /// A signature that does not match the recomputed one rejects the
    /// event before anything is processed or stored.
    pub async fn receive(
        &self,
        config: &ConnectionConfig,
        event_type: &str,
        payload: Json,
        signature: &str,
    ) -> Result<bool> {
        if let Some(secret) = config.webhook_secret.as_deref() {
            let serialized = serde_json::to_string(&payload)?;
            if !verify(secret, &serialized, signature) {
                tracing::warn!(tenant = %config.tenant_id, event_type, "webhook signature mismatch");
                return Err(Error::SignatureMismatch);
            }
        }

        let mut event = WebhookEvent::new(
            &config.tenant_id,
            WebhookDirection::Inbound,
            event_type,
            payload,
        );
        self.events.save(&event).await?;

        self.dispatch(config, &event).await?;

        event.status = WebhookStatus::Delivered;
        event.updated_at = now_millis();
        self.events.save(&event).await?;

        Ok(true)
    }

    /// Re-send failed outbound events still under the attempt ceiling.
    /// Returns how many were retried.
    pub async fn retry_failed(&self, config: &ConnectionConfig) -> Result<usize> {
        let Some(endpoint) = config.webhook_url.as_deref() else {
            return Ok(0);
        };

        let failed = self
            .events
            .list_failed_outbound(&config.tenant_id, RETRY_CEILING)
            .await?;
        let retried = failed.len();

        for mut event in failed {
            self.deliver(endpoint, config.webhook_secret.as_deref(), &mut event)
                .await;
            self.events.save(&event).await?;
        }

        Ok(retried)
    }

    /// One delivery attempt; updates the event in place.
    async fn deliver(
        &self,
        endpoint: &str,
        secret: Option<&str>,
        event: &mut WebhookEvent,
    ) -> bool {
        event.attempts += 1;
        event.updated_at = now_millis();

        let serialized = match serde_json::to_string(&event.payload) {
            Ok(serialized) => serialized,
            Err(error) => {
                event.status = WebhookStatus::Failed;
                event.last_error = Some(error.to_string());
                return false;
            }
        };
        let signature = secret.map(|secret| sign(secret, &serialized)).unwrap_or_default();

        let response = self
            .http
            .post(endpoint)
            .header("Content-Type", "application/json")
            .header(SIGNATURE_HEADER, signature)
            .header(EVENT_HEADER, event.event_type.clone())
            .body(serialized)
            .send()
            .await;

        match response {
            Ok(response) if response.status().is_success() => {
                event.status = WebhookStatus::Delivered;
                event.last_error = None;
                tracing::debug!(event = %event.id, "webhook delivered");
                true
            }
            Ok(response) => {
                event.status = WebhookStatus::Failed;
                event.last_error = Some(format!("HTTP {}", response.status().as_u16()));
                false
            }
            Err(error) => {
                event.status = WebhookStatus::Failed;
                event.last_error = Some(error.to_string());
                false
            }
        }
    }

    /// Fixed dispatch table from inbound event type to the queued sync
    /// operation. Unknown types are logged and accepted as no-ops.
    async fn dispatch(&self, config: &ConnectionConfig, event: &WebhookEvent) -> Result<()> {
        let operation = match event.event_type.as_str() {
            "employee.created" | "employee.updated" => Some("employee_sync"),
            "attendance.checkin" | "attendance.checkout" => Some("attendance_push"),
            "leave.requested" | "leave.approved" => Some("leave_push"),
            _ => None,
        };

        match operation {
            Some(operation) => {
                self.queue
                    .enqueue(&config.tenant_id, operation, event.payload.clone(), 0)
                    .await?;
                Ok(())
            }
            None => {
                tracing::info!(
                    tenant = %config.tenant_id,
                    event_type = %event.event_type,
                    "no handler for inbound event, accepted as no-op"
                );
                Ok(())
            }
        }
    }
}

/// Outbound payload shape: `{event_type, timestamp, data}`.
fn envelope(event_type: &str, data: Json) -> Json {
    serde_json::json!({
        "event_type": event_type,
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "data": data,
    })
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use crate::db::{Database, LibSqlQueueRepository, LibSqlWebhookEventRepository};
    use crate::models::QueueStatus;

    use super::*;

    async fn setup() -> Database {
        Database::open_in_memory().await.unwrap()
    }

    fn gateway(db: &Database) -> WebhookGateway<LibSqlWebhookEventRepository<'_>, LibSqlQueueRepository<'_>> {
        WebhookGateway::new(
            LibSqlWebhookEventRepository::new(db.connection()),
            RetryQueue::new(LibSqlQueueRepository::new(db.connection())),
        )
        .unwrap()
    }

    fn config_with_secret() -> ConnectionConfig {
        let mut config = ConnectionConfig::new("t1", "https://erp.example.com", "db", "admin", "k");
        config.webhook_secret = Some("hook-secret".to_string());
        config
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn send_without_endpoint_is_a_noop() {
        let db = setup().await;
        let gateway = gateway(&db);
        let config = config_with_secret();

        let delivered = gateway
            .send(&config, "employee.updated", json!({"id": 1}))
            .await
            .unwrap();
        assert!(!delivered);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn receive_rejects_tampered_payload() {
        let db = setup().await;
        let gateway = gateway(&db);
        let config = config_with_secret();

        let payload = json!({"amount": 100});
        let signature = sign("hook-secret", &serde_json::to_string(&payload).unwrap());

        // Flip one byte of the payload, keep the original signature
        let tampered = json!({"amount": 900});
        let error = gateway
            .receive(&config, "attendance.checkin", tampered, &signature)
            .await
            .unwrap_err();
        assert!(matches!(error, Error::SignatureMismatch));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn receive_dispatches_known_event_to_queue() {
        let db = setup().await;
        let gateway = gateway(&db);
        let config = config_with_secret();

        let payload = json!({"employee_id": 9});
        let signature = sign("hook-secret", &serde_json::to_string(&payload).unwrap());

        let accepted = gateway
            .receive(&config, "attendance.checkin", payload, &signature)
            .await
            .unwrap();
        assert!(accepted);

        let queue = RetryQueue::new(LibSqlQueueRepository::new(db.connection()));
        let leased = queue.lease_next_for("t1", 10).await.unwrap();
        assert_eq!(leased.len(), 1);
        assert_eq!(leased[0].operation, "attendance_push");
        assert_eq!(leased[0].status, QueueStatus::Processing);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn receive_accepts_unknown_event_as_noop() {
        let db = setup().await;
        let gateway = gateway(&db);
        let config = config_with_secret();

        let payload = json!({"x": 1});
        let signature = sign("hook-secret", &serde_json::to_string(&payload).unwrap());

        let accepted = gateway
            .receive(&config, "invoice.created", payload, &signature)
            .await
            .unwrap();
        assert!(accepted);

        let queue = RetryQueue::new(LibSqlQueueRepository::new(db.connection()));
        assert!(queue.lease_next_for("t1", 10).await.unwrap().is_empty());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn retry_failed_without_endpoint_retries_nothing() {
        let db = setup().await;
        let gateway = gateway(&db);
        let config = config_with_secret();

        assert_eq!(gateway.retry_failed(&config).await.unwrap(), 0);
    }

    #[test]
    fn envelope_carries_type_timestamp_and_data() {
        let payload = envelope("employee.updated", json!({"id": 4}));
        assert_eq!(payload["event_type"], "employee.updated");
        assert_eq!(payload["data"]["id"], 4);
        assert!(payload["timestamp"].as_str().unwrap().contains('T'));
    }
}
