//! WebSocket adapter error types.

use homedash_app::ports::TransportError;
use tokio_tungstenite::tungstenite;

/// Errors specific to the WebSocket adapter.
#[derive(Debug, thiserror::Error)]
pub enum WsError {
    /// No connection is open.
    #[error("websocket not connected")]
    NotOpen,

    /// The handshake did not finish in time.
    #[error("websocket handshake timed out")]
    ConnectTimeout,

    /// TCP, TLS or the HTTP upgrade failed.
    #[error("websocket handshake failed")]
    Connect(#[source] tungstenite::Error),

    /// Writing a frame failed.
    #[error("failed to write websocket frame")]
    Send(#[source] tungstenite::Error),
}

impl From<WsError> for TransportError {
    fn from(err: WsError) -> Self {
        match err {
            WsError::NotOpen => TransportError::NotOpen,
            err @ (WsError::ConnectTimeout | WsError::Connect(_)) => {
                TransportError::Open(Box::new(err))
            }
            err @ WsError::Send(_) => TransportError::Send(Box::new(err)),
        }
    }
}
