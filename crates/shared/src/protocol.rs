//! Wire protocol for the chat WebSocket.
//!
//! Every frame is one JSON text message forming a tagged union: a `type`
//! field selecting the kind and a `payload` field carrying the body. There
//! is no binary framing and no multiplexing beyond one socket per forum.

use serde::{Deserialize, Serialize};

use crate::models::ChatMessage;

/// Frames sent from client to server.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum ClientFrame {
    /// Post a message to the forum the socket is bound to. Attachments are
    /// referenced by id only; the binary upload happens over REST.
    Message {
        content: String,
        file_id: Option<String>,
    },
    /// Mark a message as seen by the authenticated user.
    Seen { message_id: i64 },
}

/// A seen receipt pushed by the server, to be merged into the matching
/// message's `seen_by` set.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SeenReceipt {
    pub message_id: i64,
    pub user_id: String,
}

/// Frames received from the server.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum ServerFrame {
    /// A full message entity, either new or the authoritative copy of one
    /// we sent ourselves.
    Message(ChatMessage),
    Seen(SeenReceipt),
    Typing { user_id: String },
    Error { message: String },
}

impl ServerFrame {
    /// Decode one inbound text frame.
    ///
    /// Parse failures are returned for the caller to log and discard; a
    /// malformed frame must never reach message handlers or tear down the
    /// connection.
    pub fn decode(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}

impl ClientFrame {
    /// Encode an outbound frame as JSON text.
    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
