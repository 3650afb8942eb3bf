//! Error types shared across the chat core.

/// REST collaborator error, for client-side use.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApiError {
    Network(String),
    Http { status: u16, body: String },
    Deserialize(String),
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ApiError::Network(msg) => write!(f, "Network error: {}", msg),
            ApiError::Http { status, body } => write!(f, "HTTP {}: {}", status, body),
            ApiError::Deserialize(msg) => write!(f, "Deserialization error: {}", msg),
        }
    }
}

impl std::error::Error for ApiError {}

/// Failures of the chat transport layer surfaced to callers.
///
/// Everything else (transient transport drops, malformed frames, exhausted
/// reconnects) is contained inside the core and reported through the log or
/// the notification channel.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChatError {
    /// A send was attempted while the socket was not open. The payload is
    /// dropped, not queued.
    #[error("connection lost")]
    ConnectionLost,
    /// An operation that needs a forum scope was called before one was
    /// selected.
    #[error("no active forum")]
    NoActiveForum,
}
