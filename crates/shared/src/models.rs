//! Shared data models for the ClassConnect chat core.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A chat room. The list of forums a user belongs to is owned by the
/// surrounding application and fetched over REST; this layer treats forums
/// as immutable once fetched.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Forum {
    pub id: i64,
    pub name: String,
}

/// A message inside a single forum.
///
/// Server-assigned ids are positive. Optimistic local inserts carry negative
/// temporary ids until the server's authoritative copy arrives over the
/// socket and replaces them.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatMessage {
    pub id: i64,
    pub forum_id: i64,
    pub sender_id: String,
    pub content: String,
    #[serde(default)]
    pub file_id: Option<String>,
    /// Frames that omit the timestamp are stamped at decode time.
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    /// User ids that have seen this message. Append-only.
    #[serde(default)]
    pub seen_by: BTreeSet<String>,
}

impl ChatMessage {
    /// Whether this message is a local optimistic insert that the server has
    /// not confirmed yet.
    pub fn is_optimistic(&self) -> bool {
        self.id < 0
    }
}
