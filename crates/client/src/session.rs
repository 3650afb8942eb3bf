//! The chat session context.
//!
//! Binds the socket to application-observable state: the per-forum message
//! list, loading and error state, and the connection flag. One session per
//! authenticated user; the socket, REST client, and notifier are injected
//! so tests can substitute fakes.

use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use classconnect_shared::{ApiError, ChatError, ChatMessage, Forum, ServerFrame};

use crate::api_client::ApiClient;
use crate::notify::{Notice, Notifier};
use crate::stores::ForumMessages;
use crate::ws::{ChatSocket, MessageSubscription};

/// How often the cached connection flag is refreshed, in addition to
/// event-driven updates.
const CONNECTION_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Where the session is in its forum lifecycle.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum SessionPhase {
    #[default]
    NoForumSelected,
    Loading {
        forum: Forum,
    },
    Ready {
        forum: Forum,
    },
}

#[derive(Debug, Default)]
struct SessionState {
    phase: SessionPhase,
    forums: Vec<Forum>,
    messages: ForumMessages,
    last_error: Option<ApiError>,
}

struct SessionInner {
    api: ApiClient,
    socket: Arc<ChatSocket>,
    notifier: Arc<dyn Notifier>,
    user_id: String,
    state: Mutex<SessionState>,
    /// Bumped on every forum switch; stale history fetches check it before
    /// committing so an out-of-order completion never overwrites state for
    /// a newer selection.
    switch_epoch: AtomicU64,
    connected: AtomicBool,
    next_temp_id: AtomicI64,
}

impl SessionInner {
    fn lock_state(&self) -> std::sync::MutexGuard<'_, SessionState> {
        self.state.lock().expect("session state poisoned")
    }

    fn handle_frame(&self, frame: &ServerFrame) {
        match frame {
            ServerFrame::Message(msg) => {
                let mut state = self.lock_state();
                let current = match &state.phase {
                    SessionPhase::Ready { forum } => forum.id,
                    _ => {
                        debug!("dropping message frame outside an active forum");
                        return;
                    }
                };
                if msg.forum_id != current {
                    debug!("dropping message for stale forum {}", msg.forum_id);
                    return;
                }
                if msg.sender_id == self.user_id {
                    state.messages.reconcile_own(msg.clone());
                } else {
                    state.messages.add_message(msg.clone());
                }
            }
            ServerFrame::Seen(receipt) => {
                let mut state = self.lock_state();
                state
                    .messages
                    .merge_seen(receipt.message_id, &receipt.user_id);
            }
            ServerFrame::Typing { user_id } => {
                debug!("{} is typing", user_id);
            }
            ServerFrame::Error { message } => {
                warn!("server error frame: {}", message);
                self.notifier.notify(Notice::ServerError(message.clone()));
            }
        }
    }
}

/// Application-facing chat state container.
pub struct ChatSession {
    inner: Arc<SessionInner>,
    subscription: Option<MessageSubscription>,
    poll_task: JoinHandle<()>,
}

impl ChatSession {
    /// Build a session around an injected socket and REST client.
    ///
    /// Must be called within a tokio runtime: the session spawns a small
    /// task that refreshes the cached connection flag on state changes and
    /// on a periodic timer.
    pub fn new(
        api: ApiClient,
        socket: Arc<ChatSocket>,
        notifier: Arc<dyn Notifier>,
        user_id: impl Into<String>,
    ) -> Self {
        let inner = Arc::new(SessionInner {
            api,
            socket: socket.clone(),
            notifier,
            user_id: user_id.into(),
            state: Mutex::new(SessionState::default()),
            switch_epoch: AtomicU64::new(0),
            connected: AtomicBool::new(false),
            next_temp_id: AtomicI64::new(-1),
        });

        let handler_inner = Arc::downgrade(&inner);
        let subscription = socket.on_message(move |frame| {
            if let Some(inner) = handler_inner.upgrade() {
                inner.handle_frame(frame);
            }
        });

        let poll_inner = Arc::downgrade(&inner);
        let mut state_rx = socket.state_watch();
        let poll_task = tokio::spawn(async move {
            let mut interval = tokio::time::interval(CONNECTION_POLL_INTERVAL);
            loop {
                tokio::select! {
                    _ = interval.tick() => {}
                    changed = state_rx.changed() => {
                        if changed.is_err() {
                            break;
                        }
                    }
                }
                match poll_inner.upgrade() {
                    Some(inner) => inner
                        .connected
                        .store(inner.socket.is_connected(), Ordering::Relaxed),
                    None => break,
                }
            }
        });

        Self {
            inner,
            subscription: Some(subscription),
            poll_task,
        }
    }

    /// Fetch the forums the authenticated user belongs to.
    ///
    /// Failures land in [`last_error`](Self::last_error) so the caller can
    /// render a retry affordance; they are never raised.
    pub async fn load_forums(&self) {
        match self.inner.api.get_json::<Vec<Forum>>("/forums").await {
            Ok(forums) => {
                let mut state = self.inner.lock_state();
                state.forums = forums;
                state.last_error = None;
            }
            Err(err) => {
                warn!("failed to load forums: {}", err);
                self.inner.lock_state().last_error = Some(err);
            }
        }
    }

    /// Switch the session to `forum`.
    ///
    /// Tears down the previous socket scope, loads the forum's history over
    /// REST, then opens a new scope. Concurrent switches are safe: a stale
    /// fetch resolving after a newer switch is discarded.
    pub async fn set_current_forum(&self, forum: Forum) {
        let epoch = self.inner.switch_epoch.fetch_add(1, Ordering::SeqCst) + 1;
        {
            // Teardown runs under the state lock so switches serialize: an
            // older switch resuming here after a newer one has started must
            // not tear down the newer scope.
            let mut state = self.inner.lock_state();
            if self.inner.switch_epoch.load(Ordering::SeqCst) != epoch {
                return;
            }
            self.inner.socket.disconnect();
            state.phase = SessionPhase::Loading {
                forum: forum.clone(),
            };
            state.messages.clear();
            state.last_error = None;
        }

        let path = format!("/forums/{}/messages", forum.id);
        let result = self.inner.api.get_json::<Vec<ChatMessage>>(&path).await;

        let mut state = self.inner.lock_state();
        if self.inner.switch_epoch.load(Ordering::SeqCst) != epoch {
            debug!("discarding stale history fetch for forum {}", forum.id);
            return;
        }
        match result {
            Ok(history) => {
                state.messages.set_history(history);
                state.phase = SessionPhase::Ready {
                    forum: forum.clone(),
                };
                self.inner.socket.connect(forum.id);
            }
            Err(err) => {
                warn!("failed to load history for forum {}: {}", forum.id, err);
                state.last_error = Some(err);
            }
        }
    }

    /// Send a message to the current forum and optimistically insert a local
    /// copy with a temporary negative id, replaced when the authoritative
    /// copy arrives over the socket.
    pub fn send_message(&self, content: &str, file_id: Option<String>) -> Result<(), ChatError> {
        let forum_id = match self.current_forum() {
            Some(forum) => forum.id,
            None => return Err(ChatError::NoActiveForum),
        };

        if let Err(err) = self.inner.socket.send_message(content, file_id.clone()) {
            // The payload is dropped, not queued; the notifier already
            // surfaced it. The optimistic insert still happens so the user
            // sees what they typed.
            debug!("message send dropped: {}", err);
        }

        let msg = ChatMessage {
            id: self.inner.next_temp_id.fetch_sub(1, Ordering::Relaxed),
            forum_id,
            sender_id: self.inner.user_id.clone(),
            content: content.to_string(),
            file_id,
            created_at: Utc::now(),
            seen_by: std::collections::BTreeSet::from([self.inner.user_id.clone()]),
        };
        self.inner.lock_state().messages.add_message(msg);
        Ok(())
    }

    /// Mark a message as seen. Best-effort: relies entirely on the server
    /// echoing a seen frame back; no local mutation.
    pub fn mark_as_seen(&self, message_id: i64) {
        self.inner.socket.send_seen(message_id);
    }

    /// Forum the session is ready in, if any.
    pub fn current_forum(&self) -> Option<Forum> {
        match &self.inner.lock_state().phase {
            SessionPhase::Ready { forum } => Some(forum.clone()),
            _ => None,
        }
    }

    pub fn phase(&self) -> SessionPhase {
        self.inner.lock_state().phase.clone()
    }

    pub fn forums(&self) -> Vec<Forum> {
        self.inner.lock_state().forums.clone()
    }

    /// Snapshot of the current forum's message list.
    pub fn messages(&self) -> Vec<ChatMessage> {
        self.inner.lock_state().messages.messages().to_vec()
    }

    pub fn last_error(&self) -> Option<ApiError> {
        self.inner.lock_state().last_error.clone()
    }

    /// Cached connection flag, refreshed on socket state changes and on a
    /// 5-second timer.
    pub fn is_connected(&self) -> bool {
        self.inner.connected.load(Ordering::Relaxed)
    }

    /// Tear the session down: stop listening, stop polling, close the
    /// socket. Also runs on drop.
    pub fn close(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        if let Some(subscription) = self.subscription.take() {
            subscription.unsubscribe();
        }
        self.poll_task.abort();
        self.inner.socket.disconnect();
    }
}

impl Drop for ChatSession {
    fn drop(&mut self) {
        self.shutdown();
    }
}
