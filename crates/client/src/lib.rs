//! ClassConnect chat client core.
//!
//! Real-time chat transport for the ClassConnect platform: a reconnecting
//! WebSocket bound to one forum at a time, a bearer-authenticated REST
//! client for forum lists and message history, and a session context that
//! binds the two to observable state.

pub mod api_client;
pub mod auth;
pub mod config;
pub mod notify;
pub mod session;
pub mod stores;
pub mod ws;

pub use api_client::ApiClient;
pub use auth::{StaticToken, TokenProvider};
pub use config::ChatConfig;
pub use notify::{LogNotifier, Notice, Notifier};
pub use session::{ChatSession, SessionPhase};
pub use ws::{ChatSocket, ConnectionState, MessageSubscription, ReconnectConfig};

/// Initialize tracing for binaries and tests. Controlled by `RUST_LOG`;
/// safe to call more than once.
pub fn init_tracing() {
    use tracing_subscriber::EnvFilter;
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .try_init();
}
