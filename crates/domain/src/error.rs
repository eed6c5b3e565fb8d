//! Common error types used across the workspace.
//!
//! [`ValidationError`] covers invariant violations detected while building
//! domain values. [`SyncError`] is the connection-level taxonomy observed by
//! the UI: it is `Clone` so it can sit on the published status, and it is
//! leveled through [`SyncError::is_retryable`] / [`SyncError::is_terminal`]
//! rather than through its message text.

/// Domain invariant violations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    /// Entity identifier is empty.
    #[error("entity id must not be empty")]
    EmptyEntityId,

    /// Entity identifier is not of the form `<domain>.<object>`.
    #[error("entity id {0:?} must look like <domain>.<object>")]
    MalformedEntityId(String),

    /// Base URL could not be parsed as an absolute URL.
    #[error("base url {0:?} is not an absolute url")]
    InvalidBaseUrl(String),

    /// Base URL uses a scheme other than http(s)/ws(s).
    #[error("unsupported url scheme {0:?}")]
    UnsupportedScheme(String),

    /// Access token is empty.
    #[error("access token must not be empty")]
    EmptyToken,

    /// Service name is empty.
    #[error("service name must not be empty")]
    EmptyService,
}

/// Why a dispatched command did not take effect.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CommandFailure {
    /// The channel is not in the ready state; nothing was sent.
    #[error("not connected")]
    NotConnected,

    /// The hub answered the command with a non-success result.
    #[error("hub rejected the command: {code}: {message}")]
    Rejected {
        /// Hub error code (e.g. `not_found`).
        code: String,
        /// Hub error message.
        message: String,
    },

    /// The channel went away before the command could be written.
    #[error("channel closed before the command was sent")]
    ChannelClosed,

    /// The hub never answered the command within the request timeout.
    #[error("hub did not answer the command in time")]
    TimedOut,

    /// The command itself is malformed (blank service name, bad target).
    #[error("invalid command")]
    Invalid(#[from] ValidationError),
}

/// Connection-level failures surfaced to observers.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SyncError {
    /// No credentials supplied. Reported as "not configured", not as a failure.
    #[error("hub connection is not configured")]
    ConfigurationMissing,

    /// The hub explicitly rejected the access token.
    #[error("authentication failed - check your access token")]
    AuthenticationRejected {
        /// Message supplied by the hub, if any.
        message: Option<String>,
    },

    /// The channel failed to open or closed unexpectedly.
    #[error("connection lost: {reason}")]
    TransientNetworkFailure {
        /// Human readable cause, for logs and banners only.
        reason: String,
    },

    /// The reconnect ceiling was reached.
    #[error("failed to connect after {attempts} attempts")]
    ReconnectExhausted {
        /// Number of reconnect attempts made.
        attempts: u32,
    },

    /// A request went unanswered for too long.
    #[error("request {id} timed out")]
    RequestTimeout {
        /// Correlation id of the request.
        id: u64,
    },

    /// A dispatched command failed.
    #[error("command failed")]
    Command(#[from] CommandFailure),

    /// The hub could not supply a state snapshot.
    #[error("failed to retrieve entity states: {message}")]
    SnapshotRejected {
        /// Hub error message.
        message: String,
    },

    /// An inbound message did not have the expected shape.
    #[error("malformed message: {0}")]
    MalformedMessage(String),
}

impl SyncError {
    /// Whether the reconnection supervisor may retry after this error.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::TransientNetworkFailure { .. } | Self::RequestTimeout { .. }
        )
    }

    /// Whether this error ends the life of the current credential/connector.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::AuthenticationRejected { .. } | Self::ReconnectExhausted { .. }
        )
    }
}
