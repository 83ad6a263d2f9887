//! Database migrations

use libsql::Connection;

use crate::error::Result;

/// Current schema version
const CURRENT_VERSION: i32 = 2;

/// Run all pending migrations
pub async fn run(conn: &Connection) -> Result<()> {
    let version = get_version(conn).await?;

    if version < 1 {
        migrate_v1(conn).await?;
    }
    if version < 2 {
        migrate_v2(conn).await?;
    }

    Ok(())
}

/// Get the current schema version
async fn get_version(conn: &Connection) -> Result<i32> {
    let mut rows = conn
        .query(
            "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type='table' AND name='schema_version')",
            (),
        )
        .await?;

    let exists: bool = if let Some(row) = rows.next().await? {
        row.get::<i32>(0)? != 0
    } else {
        false
    };

    if !exists {
        return Ok(0);
    }

    let mut rows = conn
        .query("SELECT COALESCE(MAX(version), 0) FROM schema_version", ())
        .await?;

    let version: i32 = if let Some(row) = rows.next().await? {
        row.get(0)?
    } else {
        0
    };

    Ok(version)
}

async fn apply(conn: &Connection, statements: &[&str]) -> Result<()> {
    // libsql doesn't have execute_batch, so we run each statement
    // separately inside a transaction for atomicity
    conn.execute("BEGIN TRANSACTION", ()).await?;

    for stmt in statements {
        if let Err(e) = conn.execute(stmt, ()).await {
            conn.execute("ROLLBACK", ()).await.ok();
            return Err(e.into());
        }
    }

    if let Err(e) = conn.execute("COMMIT", ()).await {
        conn.execute("ROLLBACK", ()).await.ok();
        return Err(e.into());
    }

    Ok(())
}

/// Migration to version 1: connections, mappings, and the sync audit log
async fn migrate_v1(conn: &Connection) -> Result<()> {
    apply(
        conn,
        &[
            // Schema version tracking
            "CREATE TABLE IF NOT EXISTS schema_version (
                version INTEGER PRIMARY KEY
            )",
            // Per-tenant remote connection settings
            "CREATE TABLE IF NOT EXISTS connections (
                tenant_id TEXT PRIMARY KEY,
                remote_url TEXT NOT NULL,
                database_name TEXT NOT NULL,
                username TEXT NOT NULL,
                secret TEXT NOT NULL,
                session_id INTEGER,
                sync_interval_minutes INTEGER NOT NULL DEFAULT 5,
                auto_sync INTEGER NOT NULL DEFAULT 1,
                conflict_strategy TEXT NOT NULL DEFAULT 'MANUAL',
                webhook_url TEXT,
                webhook_secret TEXT,
                connected_at INTEGER NOT NULL,
                last_sync_at INTEGER
            )",
            // Local-id ⇄ remote-id links, one-to-one per tenant
            "CREATE TABLE IF NOT EXISTS entity_mappings (
                id TEXT PRIMARY KEY,
                tenant_id TEXT NOT NULL,
                entity_type TEXT NOT NULL,
                local_id TEXT NOT NULL,
                remote_id INTEGER NOT NULL,
                created_at INTEGER NOT NULL,
                last_synced_at INTEGER,
                UNIQUE (tenant_id, entity_type, local_id),
                UNIQUE (tenant_id, entity_type, remote_id)
            )",
            "CREATE INDEX IF NOT EXISTS idx_entity_mappings_tenant ON entity_mappings(tenant_id, entity_type)",
            // Field translation rules
            "CREATE TABLE IF NOT EXISTS field_mappings (
                id TEXT PRIMARY KEY,
                tenant_id TEXT NOT NULL,
                entity_type TEXT NOT NULL,
                local_field TEXT NOT NULL,
                remote_field_path TEXT NOT NULL,
                transformer TEXT,
                transformer_config TEXT,
                is_required INTEGER NOT NULL DEFAULT 0,
                is_active INTEGER NOT NULL DEFAULT 1,
                UNIQUE (tenant_id, entity_type, local_field)
            )",
            // Append-only flow audit trail
            "CREATE TABLE IF NOT EXISTS sync_logs (
                id TEXT PRIMARY KEY,
                tenant_id TEXT NOT NULL,
                operation TEXT NOT NULL,
                direction TEXT NOT NULL,
                status TEXT NOT NULL,
                record_count INTEGER NOT NULL DEFAULT 0,
                success_count INTEGER NOT NULL DEFAULT 0,
                failed_count INTEGER NOT NULL DEFAULT 0,
                duration_ms INTEGER NOT NULL DEFAULT 0,
                errors TEXT NOT NULL DEFAULT '[]',
                started_at INTEGER NOT NULL,
                finished_at INTEGER
            )",
            "CREATE INDEX IF NOT EXISTS idx_sync_logs_tenant_started ON sync_logs(tenant_id, started_at DESC)",
            // Record migration version
            "INSERT INTO schema_version (version) VALUES (1)",
        ],
    )
    .await?;

    tracing::info!("Migrated database to version 1");
    Ok(())
}

/// Migration to version 2: conflicts, retry queue, webhook events, leases
async fn migrate_v2(conn: &Connection) -> Result<()> {
    apply(
        conn,
        &[
            "CREATE TABLE IF NOT EXISTS conflicts (
                id TEXT PRIMARY KEY,
                tenant_id TEXT NOT NULL,
                entity_type TEXT NOT NULL,
                entity_id TEXT NOT NULL,
                local_snapshot TEXT NOT NULL,
                remote_snapshot TEXT NOT NULL,
                conflict_kind TEXT NOT NULL,
                resolution_state TEXT NOT NULL DEFAULT 'UNRESOLVED',
                resolved_by TEXT,
                resolved_at INTEGER,
                created_at INTEGER NOT NULL
            )",
            "CREATE INDEX IF NOT EXISTS idx_conflicts_tenant_state ON conflicts(tenant_id, resolution_state)",
            "CREATE TABLE IF NOT EXISTS retry_queue (
                id TEXT PRIMARY KEY,
                tenant_id TEXT NOT NULL,
                operation TEXT NOT NULL,
                payload TEXT NOT NULL,
                priority INTEGER NOT NULL DEFAULT 0,
                attempts INTEGER NOT NULL DEFAULT 0,
                max_attempts INTEGER NOT NULL DEFAULT 3,
                status TEXT NOT NULL DEFAULT 'PENDING',
                next_retry_at INTEGER,
                last_error TEXT,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL
            )",
            "CREATE INDEX IF NOT EXISTS idx_retry_queue_due ON retry_queue(status, next_retry_at)",
            "CREATE INDEX IF NOT EXISTS idx_retry_queue_tenant ON retry_queue(tenant_id, status)",
            "CREATE TABLE IF NOT EXISTS webhook_events (
                id TEXT PRIMARY KEY,
                tenant_id TEXT NOT NULL,
                direction TEXT NOT NULL,
                event_type TEXT NOT NULL,
                payload TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'PENDING',
                attempts INTEGER NOT NULL DEFAULT 0,
                last_error TEXT,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL
            )",
            "CREATE INDEX IF NOT EXISTS idx_webhook_events_tenant_status ON webhook_events(tenant_id, status)",
            // Per-tenant, per-flow run guard with reclaimable expiry
            "CREATE TABLE IF NOT EXISTS sync_leases (
                tenant_id TEXT NOT NULL,
                flow TEXT NOT NULL,
                owner TEXT NOT NULL,
                expires_at INTEGER NOT NULL,
                PRIMARY KEY (tenant_id, flow)
            )",
            "INSERT INTO schema_version (version) VALUES (2)",
        ],
    )
    .await?;

    tracing::info!("Migrated database to version {CURRENT_VERSION}");
    Ok(())
}
