//! The chat socket: one authenticated WebSocket bound to a single forum,
//! with automatic reconnection.
//!
//! A background tokio task owns the socket and drives read, write, and
//! backoff through one `select!` loop, so aborting the task is the single
//! teardown point: it closes the socket and cancels any pending reconnect
//! timer at once. Sends while the socket is down are dropped by
//! construction, never queued — the outbound channel only exists while a
//! connection is open.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, info, warn};

use classconnect_shared::{ChatError, ClientFrame, ServerFrame};

use super::connection::{ConnectionState, ReconnectConfig};
use crate::auth::TokenProvider;
use crate::config::ChatConfig;
use crate::notify::{Notice, Notifier};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type Handler = Arc<dyn Fn(&ServerFrame) + Send + Sync>;
type HandlerList = Mutex<Vec<(u64, Handler)>>;

/// Registration handle returned by [`ChatSocket::on_message`].
///
/// Dropping the handle leaves the handler registered for the lifetime of
/// the socket; call [`unsubscribe`](Self::unsubscribe) to remove it.
pub struct MessageSubscription {
    id: u64,
    handlers: Weak<HandlerList>,
}

impl MessageSubscription {
    pub fn unsubscribe(self) {
        if let Some(handlers) = self.handlers.upgrade() {
            handlers
                .lock()
                .expect("handler lock poisoned")
                .retain(|(id, _)| *id != self.id);
        }
    }
}

struct Scope {
    forum_id: i64,
    task: JoinHandle<()>,
}

struct SocketShared {
    ws_base_url: String,
    reconnect: ReconnectConfig,
    tokens: Arc<dyn TokenProvider>,
    notifier: Arc<dyn Notifier>,
    state_tx: watch::Sender<ConnectionState>,
    /// Present only while a socket is open.
    out_tx: Mutex<Option<mpsc::UnboundedSender<ClientFrame>>>,
    handlers: Arc<HandlerList>,
    next_handler_id: AtomicU64,
}

impl SocketShared {
    /// Deliver a decoded frame to every registered handler, in registration
    /// order. A panicking handler is isolated so the rest still run.
    fn dispatch(&self, frame: &ServerFrame) {
        let snapshot: Vec<Handler> = {
            let handlers = self.handlers.lock().expect("handler lock poisoned");
            handlers.iter().map(|(_, handler)| handler.clone()).collect()
        };
        for handler in snapshot {
            if catch_unwind(AssertUnwindSafe(|| handler(frame))).is_err() {
                error!("message handler panicked; continuing with remaining handlers");
            }
        }
    }
}

/// A managed WebSocket connection scoped to one forum at a time.
pub struct ChatSocket {
    shared: Arc<SocketShared>,
    scope: Mutex<Option<Scope>>,
}

impl ChatSocket {
    pub fn new(
        config: &ChatConfig,
        tokens: Arc<dyn TokenProvider>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let (state_tx, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            shared: Arc::new(SocketShared {
                ws_base_url: config.ws_base_url.clone(),
                reconnect: config.reconnect.clone(),
                tokens,
                notifier,
                state_tx,
                out_tx: Mutex::new(None),
                handlers: Arc::new(Mutex::new(Vec::new())),
                next_handler_id: AtomicU64::new(0),
            }),
            scope: Mutex::new(None),
        }
    }

    /// Current connection state snapshot.
    pub fn state(&self) -> ConnectionState {
        self.shared.state_tx.borrow().clone()
    }

    /// True iff the underlying socket is open at the instant of the call.
    pub fn is_connected(&self) -> bool {
        self.state().is_connected()
    }

    /// Watch connection state changes.
    pub fn state_watch(&self) -> watch::Receiver<ConnectionState> {
        self.shared.state_tx.subscribe()
    }

    /// Forum the socket is currently scoped to, if any.
    pub fn current_forum(&self) -> Option<i64> {
        self.scope
            .lock()
            .expect("scope lock poisoned")
            .as_ref()
            .map(|scope| scope.forum_id)
    }

    /// Bind the socket to `forum_id` and start connecting.
    ///
    /// Any existing connection is torn down first; there are never two live
    /// sockets. The attempt counter starts fresh, and the bearer token is
    /// re-read from the provider on every attempt.
    pub fn connect(&self, forum_id: i64) {
        let mut scope = self.scope.lock().expect("scope lock poisoned");
        if let Some(old) = scope.take() {
            old.task.abort();
        }
        *self.shared.out_tx.lock().expect("sender lock poisoned") = None;
        self.shared.state_tx.send_replace(ConnectionState::Connecting);

        let shared = self.shared.clone();
        let task = tokio::spawn(run_loop(shared, forum_id));
        *scope = Some(Scope { forum_id, task });
    }

    /// Close any live socket, cancel pending reconnects, and clear the forum
    /// scope. Idempotent.
    pub fn disconnect(&self) {
        let mut scope = self.scope.lock().expect("scope lock poisoned");
        if let Some(old) = scope.take() {
            old.task.abort();
        }
        *self.shared.out_tx.lock().expect("sender lock poisoned") = None;
        self.shared
            .state_tx
            .send_replace(ConnectionState::Disconnected);
    }

    /// Send a chat message over the live socket.
    ///
    /// Requires an open connection: when the socket is down the payload is
    /// dropped (not queued), the user is notified through the notification
    /// channel, and a reconnect is kicked off if the scope had given up.
    pub fn send_message(&self, content: &str, file_id: Option<String>) -> Result<(), ChatError> {
        let frame = ClientFrame::Message {
            content: content.to_string(),
            file_id,
        };
        if self.try_send(frame) {
            return Ok(());
        }

        self.shared.notifier.notify(Notice::ConnectionLost);
        if matches!(self.state(), ConnectionState::Failed { .. }) {
            if let Some(forum_id) = self.current_forum() {
                self.connect(forum_id);
            }
        }
        Err(ChatError::ConnectionLost)
    }

    /// Best-effort seen receipt; silently dropped when the socket is down.
    pub fn send_seen(&self, message_id: i64) {
        if !self.try_send(ClientFrame::Seen { message_id }) {
            debug!("socket closed, dropping seen receipt for message {}", message_id);
        }
    }

    fn try_send(&self, frame: ClientFrame) -> bool {
        let guard = self.shared.out_tx.lock().expect("sender lock poisoned");
        match guard.as_ref() {
            Some(tx) => tx.send(frame).is_ok(),
            None => false,
        }
    }

    /// Register a handler for every decoded inbound frame.
    ///
    /// Handlers run in registration order; a handler that panics is isolated
    /// so the remaining handlers still see the frame.
    pub fn on_message(
        &self,
        handler: impl Fn(&ServerFrame) + Send + Sync + 'static,
    ) -> MessageSubscription {
        let id = self.shared.next_handler_id.fetch_add(1, Ordering::Relaxed);
        self.shared
            .handlers
            .lock()
            .expect("handler lock poisoned")
            .push((id, Arc::new(handler)));
        MessageSubscription {
            id,
            handlers: Arc::downgrade(&self.shared.handlers),
        }
    }
}

impl Drop for ChatSocket {
    fn drop(&mut self) {
        if let Ok(mut scope) = self.scope.lock() {
            if let Some(old) = scope.take() {
                old.task.abort();
            }
        }
    }
}

/// Connection loop: connect, pump frames, reconnect with capped exponential
/// backoff. Runs until aborted or the attempt cap is exceeded.
async fn run_loop(shared: Arc<SocketShared>, forum_id: i64) {
    let mut attempt: u32 = 0;

    loop {
        if attempt == 0 {
            shared.state_tx.send_replace(ConnectionState::Connecting);
        } else {
            shared
                .state_tx
                .send_replace(ConnectionState::Reconnecting { attempt });
        }

        match open_socket(&shared, forum_id).await {
            Ok(stream) => {
                info!("chat socket connected for forum {}", forum_id);
                attempt = 0;
                shared.state_tx.send_replace(ConnectionState::Connected);

                pump(&shared, stream).await;

                *shared.out_tx.lock().expect("sender lock poisoned") = None;
                shared
                    .state_tx
                    .send_replace(ConnectionState::Disconnected);
                warn!("chat socket for forum {} closed unexpectedly", forum_id);
            }
            Err(err) => {
                warn!("chat socket connect failed for forum {}: {}", forum_id, err);
            }
        }

        if attempt >= shared.reconnect.max_attempts {
            shared.state_tx.send_replace(ConnectionState::Failed {
                reason: format!(
                    "max reconnect attempts ({}) exceeded",
                    shared.reconnect.max_attempts
                ),
            });
            shared.notifier.notify(Notice::ReconnectFailed);
            break;
        }

        let delay = shared.reconnect.delay_for_attempt(attempt);
        debug!(
            "reconnecting to forum {} in {}ms (attempt {})",
            forum_id,
            delay,
            attempt + 1
        );
        tokio::time::sleep(Duration::from_millis(delay as u64)).await;
        attempt += 1;
    }
}

/// Build the connection URL and open the socket. Token and URL construction
/// failures take the same reconnect path as transport errors.
async fn open_socket(shared: &SocketShared, forum_id: i64) -> Result<WsStream, String> {
    let token = shared
        .tokens
        .bearer_token()
        .ok_or_else(|| "no bearer token available".to_string())?;
    let url = format!(
        "{}/ws/chat/{}/?token={}",
        shared.ws_base_url.trim_end_matches('/'),
        forum_id,
        urlencoding::encode(&token),
    );
    let (stream, _response) = connect_async(url.as_str())
        .await
        .map_err(|e| e.to_string())?;
    Ok(stream)
}

/// Pump one established connection: decode and dispatch inbound text frames,
/// relay outbound frames. Returns when the socket closes or errors.
async fn pump(shared: &Arc<SocketShared>, stream: WsStream) {
    let (mut write, mut read) = stream.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<ClientFrame>();
    *shared.out_tx.lock().expect("sender lock poisoned") = Some(tx);

    loop {
        tokio::select! {
            incoming = read.next() => match incoming {
                Some(Ok(Message::Text(text))) => match ServerFrame::decode(text.as_str()) {
                    Ok(frame) => shared.dispatch(&frame),
                    Err(err) => warn!("discarding malformed frame: {}", err),
                },
                Some(Ok(Message::Close(_))) => {
                    debug!("received close frame");
                    break;
                }
                Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) => {
                    // Pong replies are handled by tungstenite.
                }
                Some(Ok(_)) => {
                    // Binary frames are not part of this protocol.
                }
                Some(Err(err)) => {
                    warn!("socket read error: {}", err);
                    break;
                }
                None => break,
            },
            outgoing = rx.recv() => match outgoing {
                Some(frame) => match frame.encode() {
                    Ok(json) => {
                        if let Err(err) = write.send(Message::Text(json.into())).await {
                            warn!("socket send failed: {}", err);
                            break;
                        }
                    }
                    Err(err) => warn!("failed to encode outbound frame: {}", err),
                },
                None => break,
            },
        }
    }
}
