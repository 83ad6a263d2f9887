//! At-least-once execution of transiently failing operations

use crate::db::QueueRepository;
use crate::error::{Error, Result};
use crate::models::{QueueStatus, RetryQueueItem};
use crate::util::now_millis;

/// Delay before each retry, indexed by failures so far; the last entry is
/// the cap.
pub const BACKOFF_SCHEDULE_MINUTES: [i64; 5] = [1, 5, 15, 30, 60];

/// Attempts granted when the caller does not say otherwise.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

const MINUTE_MS: i64 = 60_000;

/// Minutes to wait after the given number of failures.
#[must_use]
pub fn backoff_minutes(attempts: u32) -> i64 {
    let index = usize::try_from(attempts.saturating_sub(1))
        .unwrap_or(usize::MAX)
        .min(BACKOFF_SCHEDULE_MINUTES.len() - 1);
    BACKOFF_SCHEDULE_MINUTES[index]
}

/// Work queue of sync operations that may fail transiently.
///
/// The queue operates on opaque payloads; dispatching an operation name
/// back to real work is the worker's concern.
#[derive(Debug)]
pub struct RetryQueue<R> {
    repo: R,
}

impl<R: QueueRepository> RetryQueue<R> {
    /// Create a queue over the given repository.
    pub const fn new(repo: R) -> Self {
        Self { repo }
    }

    /// Enqueue an operation with [`DEFAULT_MAX_ATTEMPTS`].
    pub async fn enqueue(
        &self,
        tenant_id: &str,
        operation: &str,
        payload: serde_json::Value,
        priority: i64,
    ) -> Result<String> {
        self.enqueue_with_attempts(tenant_id, operation, payload, priority, DEFAULT_MAX_ATTEMPTS)
            .await
    }

    /// Enqueue an operation with an explicit attempt limit.
    pub async fn enqueue_with_attempts(
        &self,
        tenant_id: &str,
        operation: &str,
        payload: serde_json::Value,
        priority: i64,
        max_attempts: u32,
    ) -> Result<String> {
        if max_attempts == 0 {
            return Err(Error::InvalidInput("max_attempts must be at least 1".to_string()));
        }

        let item = RetryQueueItem::new(tenant_id, operation, payload, priority, max_attempts);
        self.repo.insert(&item).await?;
        tracing::debug!(item = %item.id, operation, tenant = tenant_id, "enqueued");
        Ok(item.id)
    }

    /// Lease up to `limit` due items across all tenants, marking each
    /// PROCESSING so concurrent workers never pick the same item.
    pub async fn lease_next(&self, limit: usize) -> Result<Vec<RetryQueueItem>> {
        self.repo.lease(None, limit, now_millis()).await
    }

    /// Lease up to `limit` due items for one tenant.
    pub async fn lease_next_for(&self, tenant_id: &str, limit: usize) -> Result<Vec<RetryQueueItem>> {
        self.repo.lease(Some(tenant_id), limit, now_millis()).await
    }

    /// Finish an item successfully.
    pub async fn mark_completed(&self, item_id: &str) -> Result<()> {
        let mut item = self.require(item_id).await?;
        item.status = QueueStatus::Completed;
        item.next_retry_at = None;
        item.updated_at = now_millis();
        self.repo.update(&item).await
    }

    /// Record a failed attempt: either schedule the next retry on the
    /// backoff curve or fail the item for good.
    pub async fn mark_failed(&self, item_id: &str, error: &str) -> Result<RetryQueueItem> {
        let mut item = self.require(item_id).await?;
        if item.status.is_terminal() {
            return Err(Error::QueueExhausted(item.id));
        }
        let now = now_millis();

        item.attempts += 1;
        item.last_error = Some(error.to_string());
        item.updated_at = now;

        if item.attempts >= item.max_attempts {
            item.status = QueueStatus::Failed;
            item.next_retry_at = None;
            tracing::warn!(
                item = %item.id,
                operation = %item.operation,
                attempts = item.attempts,
                "queue item failed permanently: {error}"
            );
        } else {
            item.status = QueueStatus::Pending;
            item.next_retry_at = Some(now + backoff_minutes(item.attempts) * MINUTE_MS);
        }

        self.repo.update(&item).await?;
        Ok(item)
    }

    /// Crash-recovery sweep: PROCESSING items untouched for longer than
    /// the threshold go back to PENDING and become immediately due. Must
    /// be invoked periodically by the external scheduler.
    pub async fn reset_stuck(&self, threshold_minutes: i64) -> Result<u64> {
        let now = now_millis();
        let reverted = self
            .repo
            .reset_stuck(now - threshold_minutes * MINUTE_MS, now)
            .await?;
        if reverted > 0 {
            tracing::info!(reverted, "reverted stuck queue items to pending");
        }
        Ok(reverted)
    }

    /// Drop terminal items older than the retention window.
    pub async fn cleanup(&self, retention_days: i64) -> Result<u64> {
        let cutoff = now_millis() - retention_days * 24 * 60 * MINUTE_MS;
        self.repo.delete_finished_before(cutoff).await
    }

    /// Fetch an item by id.
    pub async fn get(&self, item_id: &str) -> Result<Option<RetryQueueItem>> {
        self.repo.get(item_id).await
    }

    async fn require(&self, item_id: &str) -> Result<RetryQueueItem> {
        self.repo
            .get(item_id)
            .await?
            .ok_or_else(|| Error::NotFound(item_id.to_string()))
    }
}
