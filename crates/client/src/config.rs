//! Client configuration from environment variables.

use crate::ws::ReconnectConfig;

/// Endpoints and reconnect tuning for the chat core.
#[derive(Debug, Clone)]
pub struct ChatConfig {
    /// Base URL for the REST collaborators, e.g. "http://localhost:8080/api".
    pub api_base_url: String,
    /// Base URL for the WebSocket endpoint, e.g. "ws://localhost:8080".
    pub ws_base_url: String,
    pub reconnect: ReconnectConfig,
}

impl ChatConfig {
    /// Read configuration from environment variables.
    ///
    /// - `CLASSCONNECT_API_URL`: REST base URL (default "http://localhost:8080/api")
    /// - `CLASSCONNECT_WS_URL`: WebSocket base URL (default "ws://localhost:8080")
    pub fn from_env() -> Self {
        let api_base_url = std::env::var("CLASSCONNECT_API_URL")
            .unwrap_or_else(|_| "http://localhost:8080/api".to_string());
        let ws_base_url = std::env::var("CLASSCONNECT_WS_URL")
            .unwrap_or_else(|_| "ws://localhost:8080".to_string());
        Self {
            api_base_url,
            ws_base_url,
            reconnect: ReconnectConfig::default(),
        }
    }
}
