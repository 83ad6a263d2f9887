//! Data model for hrsync

mod conflict;
mod connection;
mod hr;
mod mapping;
mod queue;
mod sync_log;
mod webhook;

pub use conflict::{ConflictKind, ConflictRecord, ConflictStrategy, ResolutionState};
pub use connection::ConnectionConfig;
pub use hr::{AttendanceRecord, AttendanceStatus, LeaveRequest, LocalEmployee, PayrollSummary};
pub use mapping::{EntityMapping, EntityType, FieldMapping};
pub use queue::{QueueStatus, RetryQueueItem};
pub use sync_log::{SyncDirection, SyncLogEntry, SyncRunStatus};
pub use webhook::{WebhookDirection, WebhookEvent, WebhookStatus};
