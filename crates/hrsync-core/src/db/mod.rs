//! Storage layer for hrsync's sync state
//!
//! Per-entity repository traits with libSQL implementations. Components
//! depend on the traits, so the store stays swappable; the libSQL store
//! is the one this crate ships.

mod conflict_repository;
mod connection;
mod connection_repository;
mod lease_repository;
mod mapping_repository;
mod migrations;
mod queue_repository;
mod sync_log_repository;
mod webhook_repository;

pub use conflict_repository::{ConflictRepository, LibSqlConflictRepository};
pub use connection::Database;
pub use connection_repository::{ConnectionRepository, LibSqlConnectionRepository};
pub use lease_repository::{LeaseRepository, LibSqlLeaseRepository};
pub use mapping_repository::{
    EntityMappingRepository, FieldMappingRepository, LibSqlEntityMappingRepository,
    LibSqlFieldMappingRepository,
};
pub use queue_repository::{LibSqlQueueRepository, QueueCounts, QueueRepository};
pub use sync_log_repository::{LibSqlSyncLogRepository, SyncLogRepository};
pub use webhook_repository::{LibSqlWebhookEventRepository, WebhookEventRepository};

/// Optional text as a bindable value.
pub(crate) fn opt_text(value: Option<&str>) -> libsql::Value {
    value.map_or(libsql::Value::Null, |text| {
        libsql::Value::Text(text.to_string())
    })
}

/// Optional integer as a bindable value.
pub(crate) fn opt_int(value: Option<i64>) -> libsql::Value {
    value.map_or(libsql::Value::Null, libsql::Value::Integer)
}
