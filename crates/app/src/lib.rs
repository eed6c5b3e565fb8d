//! # homedash-app
//!
//! Application layer — the real-time sync core and its **port definitions**.
//!
//! ## Responsibilities
//! - Define the **transport port** that adapters implement
//!   (`Transport`: open / send / recv / close over JSON text frames)
//! - Sequence the hub protocol through a pure **state machine**
//!   (`protocol::ProtocolMachine`)
//! - Maintain the filtered **entity cache**
//! - **Supervise** connections: exponential backoff, bounded retries
//! - **Dispatch** commands and expose observable state (`HubHandle`)
//! - Wire configuration changes to connector lifecycles (`SyncClient`)
//!
//! ## Dependency rule
//! Depends on `homedash-domain` only (plus `tokio` for tasks, channels and
//! timers). Never imports adapter crates. Adapters depend on *this* crate,
//! not the reverse.

pub mod cache;
pub mod client;
pub mod connector;
pub mod dispatcher;
pub mod event_bus;
pub mod ports;
pub mod protocol;
pub mod reconnect;

#[cfg(test)]
mod testing;

pub use cache::{EntityCache, EntityMap};
pub use client::SyncClient;
pub use connector::Connector;
pub use dispatcher::HubHandle;
pub use event_bus::SyncBus;
pub use reconnect::ReconnectPolicy;
