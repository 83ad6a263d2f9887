//! Durable retry queue with exponential backoff

mod retry;

pub use retry::{backoff_minutes, RetryQueue, BACKOFF_SCHEDULE_MINUTES, DEFAULT_MAX_ATTEMPTS};
