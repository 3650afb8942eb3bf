//! Shared types for the ClassConnect chat core: data models, the WebSocket
//! wire protocol, and error types.

pub mod error;
pub mod models;
pub mod protocol;

pub use error::*;
pub use models::*;
pub use protocol::*;
