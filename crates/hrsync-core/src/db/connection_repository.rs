//! Tenant connection repository implementation

use libsql::{params, Connection};

use crate::error::{Error, Result};
use crate::models::ConnectionConfig;

use super::{opt_int, opt_text};

/// Trait for tenant connection storage operations
#[allow(async_fn_in_trait)]
pub trait ConnectionRepository {
    /// Upsert a tenant's connection settings
    async fn save(&self, config: &ConnectionConfig) -> Result<()>;

    /// Load a tenant's connection settings
    async fn find(&self, tenant_id: &str) -> Result<Option<ConnectionConfig>>;

    /// Remove a tenant's connection settings
    async fn delete(&self, tenant_id: &str) -> Result<()>;

    /// Cache a freshly derived session id
    async fn cache_session(&self, tenant_id: &str, session_id: i64) -> Result<()>;

    /// Record when a sync flow last finished
    async fn record_sync(&self, tenant_id: &str, at: i64) -> Result<()>;
}

/// libSQL implementation of `ConnectionRepository`
pub struct LibSqlConnectionRepository<'a> {
    conn: &'a Connection,
}

impl<'a> LibSqlConnectionRepository<'a> {
    /// Create a new repository with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    fn parse_config(row: &libsql::Row) -> Result<ConnectionConfig> {
        Ok(ConnectionConfig {
            tenant_id: row.get(0)?,
            remote_url: row.get(1)?,
            database: row.get(2)?,
            username: row.get(3)?,
            secret: row.get(4)?,
            session_id: row.get::<Option<i64>>(5)?,
            sync_interval_minutes: row.get(6)?,
            auto_sync: row.get::<i64>(7)? != 0,
            conflict_strategy: row.get::<String>(8)?.parse()?,
            webhook_url: row.get::<Option<String>>(9)?,
            webhook_secret: row.get::<Option<String>>(10)?,
            connected_at: row.get(11)?,
            last_sync_at: row.get::<Option<i64>>(12)?,
        })
    }
}

const SELECT_COLUMNS: &str = "tenant_id, remote_url, database_name, username, secret, session_id, \
     sync_interval_minutes, auto_sync, conflict_strategy, webhook_url, webhook_secret, \
     connected_at, last_sync_at";

impl ConnectionRepository for LibSqlConnectionRepository<'_> {
    async fn save(&self, config: &ConnectionConfig) -> Result<()> {
        self.conn
            .execute(
                "INSERT INTO connections (tenant_id, remote_url, database_name, username, secret, \
                 session_id, sync_interval_minutes, auto_sync, conflict_strategy, webhook_url, \
                 webhook_secret, connected_at, last_sync_at)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                 ON CONFLICT(tenant_id) DO UPDATE SET
                    remote_url = excluded.remote_url,
                    database_name = excluded.database_name,
                    username = excluded.username,
                    secret = excluded.secret,
                    session_id = excluded.session_id,
                    sync_interval_minutes = excluded.sync_interval_minutes,
                    auto_sync = excluded.auto_sync,
                    conflict_strategy = excluded.conflict_strategy,
                    webhook_url = excluded.webhook_url,
                    webhook_secret = excluded.webhook_secret,
                    connected_at = excluded.connected_at,
                    last_sync_at = excluded.last_sync_at",
                params![
                    config.tenant_id.as_str(),
                    config.remote_url.as_str(),
                    config.database.as_str(),
                    config.username.as_str(),
                    config.secret.as_str(),
                    opt_int(config.session_id),
                    config.sync_interval_minutes,
                    i64::from(config.auto_sync),
                    config.conflict_strategy.as_str(),
                    opt_text(config.webhook_url.as_deref()),
                    opt_text(config.webhook_secret.as_deref()),
                    config.connected_at,
                    opt_int(config.last_sync_at),
                ],
            )
            .await?;
        Ok(())
    }

    async fn find(&self, tenant_id: &str) -> Result<Option<ConnectionConfig>> {
        let mut rows = self
            .conn
            .query(
                &format!("SELECT {SELECT_COLUMNS} FROM connections WHERE tenant_id = ?"),
                params![tenant_id],
            )
            .await?;

        match rows.next().await? {
            Some(row) => Ok(Some(Self::parse_config(&row)?)),
            None => Ok(None),
        }
    }

    async fn delete(&self, tenant_id: &str) -> Result<()> {
        let affected = self
            .conn
            .execute("DELETE FROM connections WHERE tenant_id = ?", params![tenant_id])
            .await?;
        if affected == 0 {
            return Err(Error::NotFound(tenant_id.to_string()));
        }
        Ok(())
    }

    async fn cache_session(&self, tenant_id: &str, session_id: i64) -> Result<()> {
        self.conn
            .execute(
                "UPDATE connections SET session_id = ? WHERE tenant_id = ?",
                params![session_id, tenant_id],
            )
            .await?;
        Ok(())
    }

    async fn record_sync(&self, tenant_id: &str, at: i64) -> Result<()> {
        self.conn
            .execute(
                "UPDATE connections SET last_sync_at = ? WHERE tenant_id = ?",
                params![at, tenant_id],
            )
            .await?;
        Ok(())
    }
}
