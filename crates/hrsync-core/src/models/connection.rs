//! Tenant connection configuration

use serde::{Deserialize, Serialize};

use super::ConflictStrategy;
use crate::util::now_millis;

/// Per-tenant connection settings for the remote ERP.
///
/// One row per tenant, created on connect and removed on disconnect. The
/// session id is a soft cache: it is re-derived by authenticating again
/// whenever a call finds it absent or stale.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// Tenant the connection belongs to
    pub tenant_id: String,
    /// Base URL of the remote system
    pub remote_url: String,
    /// Remote database name
    pub database: String,
    /// Remote login
    pub username: String,
    /// Remote API key or password
    pub secret: String,
    /// Cached session id (remote uid), if any
    pub session_id: Option<i64>,
    /// Scheduler hint: minutes between automatic runs
    pub sync_interval_minutes: i64,
    /// Whether the external scheduler should trigger runs at all
    pub auto_sync: bool,
    /// Strategy applied when local and remote edits diverge
    pub conflict_strategy: ConflictStrategy,
    /// Tenant-configured webhook endpoint, if any
    pub webhook_url: Option<String>,
    /// Secret for webhook HMAC signatures
    pub webhook_secret: Option<String>,
    /// When the tenant connected (unix ms)
    pub connected_at: i64,
    /// When a sync flow last finished (unix ms)
    pub last_sync_at: Option<i64>,
}

impl ConnectionConfig {
    /// Create a fresh configuration for a tenant.
    #[must_use]
    pub fn new(
        tenant_id: impl Into<String>,
        remote_url: impl Into<String>,
        database: impl Into<String>,
        username: impl Into<String>,
        secret: impl Into<String>,
    ) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            remote_url: remote_url.into(),
            database: database.into(),
            username: username.into(),
            secret: secret.into(),
            session_id: None,
            sync_interval_minutes: 5,
            auto_sync: true,
            conflict_strategy: ConflictStrategy::Manual,
            webhook_url: None,
            webhook_secret: None,
            connected_at: now_millis(),
            last_sync_at: None,
        }
    }
}

impl std::fmt::Debug for ConnectionConfig {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("ConnectionConfig")
            .field("tenant_id", &self.tenant_id)
            .field("remote_url", &self.remote_url)
            .field("database", &self.database)
            .field("username", &self.username)
            .field("secret", &"[REDACTED]")
            .field("session_id", &self.session_id)
            .field("sync_interval_minutes", &self.sync_interval_minutes)
            .field("auto_sync", &self.auto_sync)
            .field("conflict_strategy", &self.conflict_strategy)
            .field("webhook_url", &self.webhook_url)
            .field("webhook_secret", &self.webhook_secret.as_ref().map(|_| "[REDACTED]"))
            .field("connected_at", &self.connected_at)
            .field("last_sync_at", &self.last_sync_at)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_redacts_secrets() {
        let mut config = ConnectionConfig::new("t1", "https://erp.example.com", "db", "admin", "api-key");
        config.webhook_secret = Some("hook-secret".to_string());

        let debug = format!("{config:?}");
        assert!(!debug.contains("api-key"));
        assert!(!debug.contains("hook-secret"));
        assert!(debug.contains("[REDACTED]"));
    }

    #[test]
    fn new_defaults_to_manual_strategy() {
        let config = ConnectionConfig::new("t1", "https://erp.example.com", "db", "admin", "k");
        assert_eq!(config.conflict_strategy, ConflictStrategy::Manual);
        assert!(config.auto_sync);
        assert_eq!(config.sync_interval_minutes, 5);
    }
}
