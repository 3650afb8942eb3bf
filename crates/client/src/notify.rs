//! User-facing notification channel.
//!
//! The chat core never raises failures to the wider application as
//! exceptions. The user-visible ones flow through this seam (the toast
//! equivalent) so the surrounding application decides how to render them,
//! and tests can record them.

/// A transient, best-effort user notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    /// A send was attempted while the connection was down; the message was
    /// dropped and a reconnect is under way.
    ConnectionLost,
    /// Automatic reconnection gave up after the configured attempt cap.
    ReconnectFailed,
    /// The server reported an error over the socket.
    ServerError(String),
}

pub trait Notifier: Send + Sync {
    fn notify(&self, notice: Notice);
}

/// Default notifier that forwards notices to the log.
#[derive(Debug, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, notice: Notice) {
        match notice {
            Notice::ConnectionLost => tracing::warn!("connection lost, reconnecting"),
            Notice::ReconnectFailed => tracing::warn!("could not reconnect to chat"),
            Notice::ServerError(message) => tracing::warn!("chat server error: {}", message),
        }
    }
}
