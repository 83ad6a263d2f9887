//! Signed webhook gateway for asynchronous event exchange

mod gateway;
mod signature;

pub use gateway::{WebhookGateway, EVENT_HEADER, SIGNATURE_HEADER};
pub use signature::{sign, verify};
