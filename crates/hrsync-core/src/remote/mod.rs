//! Client for the remote ERP's RPC endpoints

mod client;

pub use client::RemoteClient;
