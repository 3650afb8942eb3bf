//! WebSocket transport for the chat core.
//!
//! One [`ChatSocket`] per session, bound to one forum at a time. Switching
//! forums discards the connection and creates a new one; there is no
//! connection pool.
//!
//! ```text
//!   ChatSession ──connect/disconnect/send──▶ ChatSocket
//!        ▲                                      │
//!        │                               background task
//!   on_message handlers ◀──decoded frames───────┘
//! ```

mod connection;
mod socket;

pub use connection::{ConnectionState, ReconnectConfig};
pub use socket::{ChatSocket, MessageSubscription};
