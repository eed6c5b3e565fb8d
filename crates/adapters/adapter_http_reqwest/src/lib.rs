//! # homedash-adapter-http-reqwest
//!
//! HTTP adapter — reaches the hub through its REST API.
//!
//! ## Responsibilities
//! - [`PollingTransport`]: a [`Transport`](homedash_app::ports::Transport)
//!   that speaks the real-time message protocol to the connector while
//!   talking plain HTTP to the hub, for networks where WebSockets are blocked
//! - [`diagnostics`]: the connectivity / authentication / states probes behind
//!   the connection-test screen
//!
//! ## Dependency rule
//! Same as other adapters: depends on `homedash-app` and `homedash-domain`.

pub mod api;
pub mod config;
pub mod diagnostics;
pub mod error;
mod transport;

pub use api::RestClient;
pub use config::PollingConfig;
pub use diagnostics::{DiagnosticReport, Outcome, Probe, diagnose};
pub use error::HttpError;
pub use transport::PollingTransport;
