//! # homedash-adapter-ws-tungstenite
//!
//! WebSocket adapter — implements the [`Transport`](homedash_app::ports::Transport)
//! port on top of `tokio-tungstenite`.
//!
//! ## Responsibilities
//! - Open `ws://` / `wss://` connections to the hub's `/api/websocket` endpoint
//! - Carry JSON text frames in both directions
//! - Report the peer's close code so the connector can tell a clean close
//!   (1000) from a dropped connection
//!
//! ## Dependency rule
//! Same as other adapters: depends on `homedash-app` and `homedash-domain`.

pub mod config;
pub mod error;
mod transport;

pub use config::WsConfig;
pub use error::WsError;
pub use transport::WebSocketTransport;
