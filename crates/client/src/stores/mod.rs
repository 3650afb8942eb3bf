//! State stores bridging socket events to application-observable data.

pub mod messages;

pub use messages::ForumMessages;
