//! Bearer token access for REST and WebSocket authentication.

/// Supplies the bearer token used to authenticate REST requests and each
/// WebSocket connection attempt.
///
/// The token is re-read on every request and every reconnect attempt so
/// rotated tokens are picked up without tearing the session down. `None`
/// means the caller is not authenticated; connection attempts treat that as
/// a retryable failure.
pub trait TokenProvider: Send + Sync {
    fn bearer_token(&self) -> Option<String>;
}

/// A fixed token, for callers that manage rotation elsewhere and for tests.
#[derive(Debug, Clone)]
pub struct StaticToken(pub String);

impl TokenProvider for StaticToken {
    fn bearer_token(&self) -> Option<String> {
        Some(self.0.clone())
    }
}
