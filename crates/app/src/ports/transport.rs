//! Transport port — a bidirectional text-message channel to the hub.
//!
//! The connector drives one transport per active configuration. A transport
//! may be opened again after it closed; each `open` starts a fresh channel.

use std::error::Error as StdError;
use std::fmt;
use std::future::Future;

use homedash_domain::connection::HubConfig;
use homedash_domain::error::SyncError;

type BoxError = Box<dyn StdError + Send + Sync>;

/// Why the channel closed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseReason {
    pub code: u16,
    pub reason: String,
}

impl CloseReason {
    /// Close code for an intentional, clean shutdown.
    pub const NORMAL: u16 = 1000;
    /// Close code used when the channel dropped without a close frame.
    pub const ABNORMAL: u16 = 1006;

    #[must_use]
    pub fn normal() -> Self {
        Self {
            code: Self::NORMAL,
            reason: String::new(),
        }
    }

    #[must_use]
    pub fn abnormal(reason: impl Into<String>) -> Self {
        Self {
            code: Self::ABNORMAL,
            reason: reason.into(),
        }
    }

    /// Any code other than 1000 means the close was unexpected.
    #[must_use]
    pub fn is_normal(&self) -> bool {
        self.code == Self::NORMAL
    }
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.reason.is_empty() {
            write!(f, "code {}", self.code)
        } else {
            write!(f, "code {}: {}", self.code, self.reason)
        }
    }
}

/// What [`Transport::recv`] yields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// One inbound text frame.
    Message(String),
    /// The channel is gone; no further messages will arrive.
    Closed(CloseReason),
}

/// Failures raised by a transport implementation.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The channel could not be established.
    #[error("failed to open channel")]
    Open(#[source] BoxError),

    /// A frame could not be written.
    #[error("failed to send frame")]
    Send(#[source] BoxError),

    /// The operation needs an open channel.
    #[error("channel is not open")]
    NotOpen,
}

impl TransportError {
    /// The error message followed by each of its sources.
    #[must_use]
    pub fn chain(&self) -> String {
        let mut out = self.to_string();
        let mut source = self.source();
        while let Some(err) = source {
            out.push_str(": ");
            out.push_str(&err.to_string());
            source = err.source();
        }
        out
    }
}

impl From<&TransportError> for SyncError {
    fn from(err: &TransportError) -> Self {
        SyncError::TransientNetworkFailure {
            reason: err.chain(),
        }
    }
}

/// A channel that carries the hub's JSON text frames.
///
/// `recv` must be cancel-safe: the connector polls it inside `select!`
/// alongside its command queue and timers.
pub trait Transport: Send {
    /// Establish a new channel for `config`.
    fn open(
        &mut self,
        config: &HubConfig,
    ) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Write one text frame.
    fn send(&mut self, frame: String) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Wait for the next inbound frame or the close of the channel.
    fn recv(&mut self) -> impl Future<Output = TransportEvent> + Send;

    /// Close the channel with code 1000. Closing a closed channel is a no-op.
    fn close(&mut self) -> impl Future<Output = Result<(), TransportError>> + Send;
}
