//! hrsync-core - Core library for hrsync
//!
//! Synchronizes employee, attendance, leave, and payroll data between a
//! local HR system and an Odoo ERP over the remote system's XML-RPC
//! protocol, with a signed webhook channel for asynchronous events.
//!
//! The pieces compose in one direction: [`wire`] encodes and decodes the
//! protocol's value grammar, [`remote`] speaks it over HTTP, [`mapping`]
//! translates field namespaces, [`conflict`] reconciles divergent edits,
//! [`queue`] retries transient failures with backoff, [`webhook`]
//! exchanges signed events, and [`sync`] orchestrates the concrete flows
//! on top of all of them.

pub mod conflict;
pub mod db;
pub mod error;
pub mod hr;
pub mod mapping;
pub mod models;
pub mod queue;
pub mod remote;
pub mod sync;
pub mod util;
pub mod webhook;
pub mod wire;

pub use error::{Error, Result};
pub use models::ConnectionConfig;
pub use sync::SyncOrchestrator;
