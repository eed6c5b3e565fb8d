//! HTTP adapter error types.

use homedash_app::ports::TransportError;

/// Errors specific to the HTTP adapter.
#[derive(Debug, thiserror::Error)]
pub enum HttpError {
    /// The HTTP client could not be built (TLS backend, invalid settings).
    #[error("failed to build HTTP client")]
    Client(#[source] reqwest::Error),

    /// No session is open.
    #[error("polling session not open")]
    NotOpen,

    /// The request did not complete (connect, timeout, body read).
    #[error("HTTP request failed")]
    Request(#[source] reqwest::Error),

    /// A frame handed to the transport is not a protocol message.
    #[error("failed to decode outbound frame")]
    Decode(#[source] serde_json::Error),
}

impl From<HttpError> for TransportError {
    fn from(err: HttpError) -> Self {
        match err {
            HttpError::NotOpen => TransportError::NotOpen,
            err @ HttpError::Client(_) => TransportError::Open(Box::new(err)),
            err @ (HttpError::Request(_) | HttpError::Decode(_)) => {
                TransportError::Send(Box::new(err))
            }
        }
    }
}
