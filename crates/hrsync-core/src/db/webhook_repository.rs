//! Webhook event repository implementation

use libsql::{params, Connection};

use crate::error::Result;
use crate::models::WebhookEvent;

use super::opt_text;

/// Trait for webhook event storage operations
#[allow(async_fn_in_trait)]
pub trait WebhookEventRepository {
    /// Upsert an event by id
    async fn save(&self, event: &WebhookEvent) -> Result<()>;

    /// Load an event
    async fn get(&self, id: &str) -> Result<Option<WebhookEvent>>;

    /// Failed outbound events still below the attempt ceiling, oldest
    /// first
    async fn list_failed_outbound(
        &self,
        tenant_id: &str,
        max_attempts: u32,
    ) -> Result<Vec<WebhookEvent>>;
}

/// libSQL implementation of `WebhookEventRepository`
pub struct LibSqlWebhookEventRepository<'a> {
    conn: &'a Connection,
}

impl<'a> LibSqlWebhookEventRepository<'a> {
    /// Create a new repository with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    fn parse_event(row: &libsql::Row) -> Result<WebhookEvent> {
        Ok(WebhookEvent {
            id: row.get(0)?,
            tenant_id: row.get(1)?,
            direction: row.get::<String>(2)?.parse()?,
            event_type: row.get(3)?,
            payload: serde_json::from_str(&row.get::<String>(4)?)?,
            status: row.get::<String>(5)?.parse()?,
            attempts: u32::try_from(row.get::<i64>(6)?).unwrap_or(0),
            last_error: row.get::<Option<String>>(7)?,
            created_at: row.get(8)?,
            updated_at: row.get(9)?,
        })
    }
}

const EVENT_COLUMNS: &str =
    "id, tenant_id, direction, event_type, payload, status, attempts, last_error, created_at, updated_at";

impl WebhookEventRepository for LibSqlWebhookEventRepository<'_> {
    async fn save(&self, event: &WebhookEvent) -> Result<()> {
        self.conn
            .execute(
                "INSERT INTO webhook_events (id, tenant_id, direction, event_type, payload, \
                 status, attempts, last_error, created_at, updated_at)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                 ON CONFLICT(id) DO UPDATE SET
                    status = excluded.status,
                    attempts = excluded.attempts,
                    last_error = excluded.last_error,
                    updated_at = excluded.updated_at",
                params![
                    event.id.as_str(),
                    event.tenant_id.as_str(),
                    event.direction.as_str(),
                    event.event_type.as_str(),
                    serde_json::to_string(&event.payload)?,
                    event.status.as_str(),
                    i64::from(event.attempts),
                    opt_text(event.last_error.as_deref()),
                    event.created_at,
                    event.updated_at,
                ],
            )
            .await?;
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<WebhookEvent>> {
        let mut rows = self
            .conn
            .query(
                &format!("SELECT {EVENT_COLUMNS} FROM webhook_events WHERE id = ?"),
                params![id],
            )
            .await?;

        match rows.next().await? {
            Some(row) => Ok(Some(Self::parse_event(&row)?)),
            None => Ok(None),
        }
    }

    async fn list_failed_outbound(
        &self,
        tenant_id: &str,
        max_attempts: u32,
    ) -> Result<Vec<WebhookEvent>> {
        let mut rows = self
            .conn
            .query(
                &format!(
                    "SELECT {EVENT_COLUMNS} FROM webhook_events
                     WHERE tenant_id = ? AND direction = 'OUTBOUND' AND status = 'FAILED'
                       AND attempts < ?
                     ORDER BY created_at ASC"
                ),
                params![tenant_id, i64::from(max_attempts)],
            )
            .await?;

        let mut events = Vec::new();
        while let Some(row) = rows.next().await? {
            events.push(Self::parse_event(&row)?);
        }
        Ok(events)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use crate::db::Database;
    use crate::models::{WebhookDirection, WebhookStatus};

    use super::*;

    async fn setup() -> Database {
        Database::open_in_memory().await.unwrap()
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn save_and_get_round_trip() {
        let db = setup().await;
        let repo = LibSqlWebhookEventRepository::new(db.connection());

        let event = WebhookEvent::new(
            "t1",
            WebhookDirection::Outbound,
            "employee.updated",
            json!({"id": 1}),
        );
        repo.save(&event).await.unwrap();

        let loaded = repo.get(&event.id).await.unwrap().unwrap();
        assert_eq!(loaded, event);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn failed_outbound_listing_respects_ceiling_and_direction() {
        let db = setup().await;
        let repo = LibSqlWebhookEventRepository::new(db.connection());

        let mut retryable = WebhookEvent::new("t1", WebhookDirection::Outbound, "a", json!({}));
        retryable.status = WebhookStatus::Failed;
        retryable.attempts = 1;

        let mut exhausted = WebhookEvent::new("t1", WebhookDirection::Outbound, "b", json!({}));
        exhausted.status = WebhookStatus::Failed;
        exhausted.attempts = 3;

        let mut inbound = WebhookEvent::new("t1", WebhookDirection::Inbound, "c", json!({}));
        inbound.status = WebhookStatus::Failed;

        for event in [&retryable, &exhausted, &inbound] {
            repo.save(event).await.unwrap();
        }

        let failed = repo.list_failed_outbound("t1", 3).await.unwrap();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].id, retryable.id);
    }
}
