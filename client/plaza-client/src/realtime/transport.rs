//! Broker connection: STOMP over a WebSocket with automatic reconnect
//!
//! The connection is driven by one background task. Outbound frames go
//! through an unbounded channel to that task; inbound MESSAGE frames are
//! routed by subscription id to per-subscription receivers. Subscriptions do
//! not survive a dropped connection: their receivers close and the owner is
//! expected to subscribe again once the state returns to `Connected`.

use super::stomp::{Command, Frame};
use error_types::{ClientError, ClientResult};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use resilience::{with_timeout_result, ReconnectPolicy, TimeoutConfig, TimeoutError};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::header::COOKIE;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

/// Live topic subscription; `messages` closes when the subscription ends
#[derive(Debug)]
pub struct BrokerSubscription {
    pub id: String,
    pub destination: String,
    pub messages: mpsc::UnboundedReceiver<String>,
}

/// Publish/subscribe access to the message broker
pub trait BrokerConnection: Send + Sync {
    fn state(&self) -> watch::Receiver<ConnectionState>;

    /// Start connecting; reconnects until [`Self::deactivate`]
    fn activate(&self);

    fn deactivate(&self);

    /// Fails when the connection is not live
    fn subscribe(&self, destination: &str) -> ClientResult<BrokerSubscription>;

    fn unsubscribe(&self, subscription_id: &str);

    /// Fails when the connection is not live; nothing is queued
    fn publish(&self, destination: &str, body: String) -> ClientResult<()>;

    fn is_connected(&self) -> bool {
        *self.state().borrow() == ConnectionState::Connected
    }
}

/// Supplies the `Cookie` header for the WebSocket upgrade
pub type CookieProvider = Arc<dyn Fn() -> Option<String> + Send + Sync>;

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;
type SocketParts = (SplitSink<Socket, WsMessage>, SplitStream<Socket>);

pub struct StompClient {
    inner: Arc<Inner>,
}

struct Inner {
    url: String,
    host: String,
    policy: ReconnectPolicy,
    /// Bounds the socket upgrade plus the CONNECT/CONNECTED exchange
    handshake_timeout: TimeoutConfig,
    cookies: Option<CookieProvider>,
    state: watch::Sender<ConnectionState>,
    writer: Mutex<Option<mpsc::UnboundedSender<Frame>>>,
    routes: Mutex<HashMap<String, mpsc::UnboundedSender<String>>>,
    next_id: AtomicU64,
    shutdown: Mutex<Option<watch::Sender<bool>>>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl StompClient {
    pub fn new(
        url: impl Into<String>,
        policy: ReconnectPolicy,
        handshake_timeout: TimeoutConfig,
        cookies: Option<CookieProvider>,
    ) -> Self {
        let url = url.into();
        let host = url::Url::parse(&url)
            .ok()
            .and_then(|u| u.host_str().map(str::to_string))
            .unwrap_or_else(|| "localhost".to_string());
        let (state, _) = watch::channel(ConnectionState::Disconnected);

        Self {
            inner: Arc::new(Inner {
                url,
                host,
                policy,
                handshake_timeout,
                cookies,
                state,
                writer: Mutex::new(None),
                routes: Mutex::new(HashMap::new()),
                next_id: AtomicU64::new(0),
                shutdown: Mutex::new(None),
                task: Mutex::new(None),
            }),
        }
    }

    pub fn url(&self) -> &str {
        &self.inner.url
    }
}

impl BrokerConnection for StompClient {
    fn state(&self) -> watch::Receiver<ConnectionState> {
        self.inner.state.subscribe()
    }

    fn activate(&self) {
        let mut task = self.inner.task.lock();
        if task.as_ref().is_some_and(|t| !t.is_finished()) {
            return;
        }

        let handle = match tokio::runtime::Handle::try_current() {
            Ok(handle) => handle,
            Err(e) => {
                error!(error = %e, "Broker connection needs a Tokio runtime");
                return;
            }
        };

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        *self.inner.shutdown.lock() = Some(shutdown_tx);
        *task = Some(handle.spawn(run(self.inner.clone(), shutdown_rx)));
        info!(url = %self.inner.url, "Broker connection activated");
    }

    fn deactivate(&self) {
        if let Some(shutdown) = self.inner.shutdown.lock().take() {
            let _ = shutdown.send(true);
            info!(url = %self.inner.url, "Broker connection deactivated");
        }
        self.inner.task.lock().take();
    }

    fn subscribe(&self, destination: &str) -> ClientResult<BrokerSubscription> {
        let id = format!("sub-{}", self.inner.next_id.fetch_add(1, Ordering::Relaxed));
        let (tx, rx) = mpsc::unbounded_channel();

        self.inner.routes.lock().insert(id.clone(), tx);
        if let Err(e) = self.inner.write("subscribe", Frame::subscribe(&id, destination)) {
            self.inner.routes.lock().remove(&id);
            return Err(e);
        }

        debug!(%id, %destination, "Subscribed");
        Ok(BrokerSubscription {
            id,
            destination: destination.to_string(),
            messages: rx,
        })
    }

    fn unsubscribe(&self, subscription_id: &str) {
        if self.inner.routes.lock().remove(subscription_id).is_none() {
            return;
        }
        match self.inner.write("unsubscribe", Frame::unsubscribe(subscription_id)) {
            Ok(()) => debug!(id = %subscription_id, "Unsubscribed"),
            Err(e) => debug!(id = %subscription_id, error = %e, "Unsubscribe not sent"),
        }
    }

    fn publish(&self, destination: &str, body: String) -> ClientResult<()> {
        self.inner.write("publish", Frame::send(destination, body))
    }
}

impl Drop for StompClient {
    fn drop(&mut self) {
        self.deactivate();
    }
}

impl Inner {
    fn write(&self, operation: &str, frame: Frame) -> ClientResult<()> {
        let writer = self.writer.lock();
        let Some(writer) = writer.as_ref() else {
            return Err(ClientError::network(operation, "broker not connected"));
        };
        writer
            .send(frame)
            .map_err(|_| ClientError::network(operation, "broker connection closed"))
    }

    fn set_state(&self, state: ConnectionState) {
        self.state.send_if_modified(|current| {
            if *current == state {
                return false;
            }
            *current = state;
            true
        });
    }

    /// Forget everything tied to the current socket
    fn drop_session(&self) {
        self.writer.lock().take();
        self.routes.lock().clear();
        self.set_state(ConnectionState::Disconnected);
    }

    fn dispatch(&self, text: &str) {
        let frame = match Frame::decode(text) {
            Ok(Some(frame)) => frame,
            Ok(None) => return,
            Err(e) => {
                warn!(error = %e, "Dropping malformed broker frame");
                return;
            }
        };

        match frame.command {
            Command::Message => {
                let Some(id) = frame.get("subscription").map(str::to_owned) else {
                    warn!("MESSAGE frame without subscription header");
                    return;
                };
                let mut routes = self.routes.lock();
                if let Some(route) = routes.get(&id) {
                    if route.send(frame.body).is_err() {
                        routes.remove(&id);
                    }
                }
            }
            Command::Error => {
                warn!(message = frame.get("message").unwrap_or(""), body = %frame.body, "Broker reported an error");
            }
            Command::Receipt => debug!(receipt = frame.get("receipt-id").unwrap_or(""), "Receipt"),
            other => debug!(command = %other, "Ignoring broker frame"),
        }
    }

    async fn handshake(&self) -> ClientResult<SocketParts> {
        let mut request = self
            .url
            .as_str()
            .into_client_request()
            .map_err(|e| ClientError::network("open broker connection", e))?;
        if let Some(cookie) = self.cookies.as_ref().and_then(|provider| provider()) {
            match HeaderValue::from_str(&cookie) {
                Ok(value) => {
                    request.headers_mut().insert(COOKIE, value);
                }
                Err(e) => warn!(error = %e, "Session cookie is not a valid header value"),
            }
        }

        let (socket, _) = connect_async(request)
            .await
            .map_err(|e| ClientError::network("open broker connection", e))?;
        let (mut sink, mut stream) = socket.split();

        sink.send(WsMessage::text(Frame::connect(&self.host).encode()))
            .await
            .map_err(|e| ClientError::network("send CONNECT", e))?;

        loop {
            match stream.next().await {
                Some(Ok(WsMessage::Text(text))) => match Frame::decode(text.as_str()) {
                    Ok(Some(frame)) if frame.command == Command::Connected => return Ok((sink, stream)),
                    Ok(Some(frame)) if frame.command == Command::Error => {
                        let message = frame.get("message").unwrap_or("rejected").to_string();
                        return Err(ClientError::network("STOMP handshake", message));
                    }
                    Ok(_) => continue,
                    Err(e) => return Err(ClientError::parse("CONNECTED frame", e)),
                },
                Some(Ok(WsMessage::Close(_))) | None => {
                    return Err(ClientError::network("STOMP handshake", "socket closed"));
                }
                Some(Ok(_)) => continue,
                Some(Err(e)) => return Err(ClientError::network("STOMP handshake", e)),
            }
        }
    }

    async fn session(&self, shutdown: &mut watch::Receiver<bool>) -> ClientResult<()> {
        let handshake = with_timeout_result(self.handshake_timeout.duration, self.handshake());
        let (mut sink, mut stream) = tokio::select! {
            result = handshake => match result {
                Ok(parts) => parts,
                Err(TimeoutError::OperationFailed(e)) => return Err(e),
                Err(TimeoutError::Elapsed(after)) => {
                    return Err(ClientError::network("STOMP handshake", format!("timed out after {after:?}")));
                }
            },
            _ = shutdown.changed() => return Ok(()),
        };

        let (tx, mut outbound) = mpsc::unbounded_channel::<Frame>();
        *self.writer.lock() = Some(tx);
        self.set_state(ConnectionState::Connected);
        info!(url = %self.url, "Broker connected");

        loop {
            tokio::select! {
                frame = outbound.recv() => {
                    let Some(frame) = frame else { return Ok(()) };
                    sink.send(WsMessage::text(frame.encode()))
                        .await
                        .map_err(|e| ClientError::network("write broker frame", e))?;
                }
                inbound = stream.next() => match inbound {
                    Some(Ok(WsMessage::Text(text))) => self.dispatch(text.as_str()),
                    Some(Ok(WsMessage::Close(_))) | None => return Ok(()),
                    Some(Ok(_)) => {}
                    Some(Err(e)) => return Err(ClientError::network("read broker frame", e)),
                },
                _ = shutdown.changed() => {
                    let _ = sink.send(WsMessage::text(Frame::disconnect().encode())).await;
                    let _ = sink.close().await;
                    return Ok(());
                }
            }
        }
    }
}

async fn run(inner: Arc<Inner>, mut shutdown: watch::Receiver<bool>) {
    let mut attempt: u32 = 0;

    loop {
        inner.set_state(ConnectionState::Connecting);
        let result = inner.session(&mut shutdown).await;
        let was_connected = inner.writer.lock().is_some();
        inner.drop_session();

        if *shutdown.borrow() {
            break;
        }

        match result {
            Ok(()) => warn!(url = %inner.url, "Broker connection closed"),
            Err(e) => warn!(url = %inner.url, error = %e, "Broker connection failed"),
        }

        attempt = if was_connected { 1 } else { attempt + 1 };
        let proceed = tokio::select! {
            proceed = inner.policy.wait(attempt) => proceed,
            _ = shutdown.changed() => false,
        };
        if !proceed {
            break;
        }
    }

    inner.drop_session();
    debug!(url = %inner.url, "Broker connection task stopped");
}
