use super::TransportError;
use crate::{
    config::{RuntimeConfig, Session},
    guard::{Gates, Operation},
    handshake::Resolver,
    http,
};
use async_channel::{Receiver, Sender};
use futures_util::{
    SinkExt, StreamExt,
    stream::{SplitSink, SplitStream},
};
use serde::Deserialize;
use std::{
    fmt,
    sync::{
        Arc, Mutex, PoisonError, Weak,
        atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering},
    },
    time::Duration,
};
use tokio::{net::TcpStream, task::JoinHandle};
use tokio_tungstenite::{
    MaybeTlsStream, WebSocketStream, connect_async, tungstenite::Message,
};
use url::Url;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, Message>;

const BASE_RECONNECT_DELAY_MS: f64 = 1000.0;
const RECONNECT_BACKOFF_FACTOR: f64 = 1.5;
const MAX_RECONNECT_DELAY_MS: f64 = 5000.0;
const CLOSE_TIMEOUT: Duration = Duration::from_secs(1);

/// Delay before reconnect attempt `attempt`: `min(1000 * 1.5^attempt, 5000)` ms.
pub fn reconnect_delay(attempt: u32) -> Duration {
    let exponent = attempt.min(64) as i32;
    let millis = (BASE_RECONNECT_DELAY_MS * RECONNECT_BACKOFF_FACTOR.powi(exponent))
        .min(MAX_RECONNECT_DELAY_MS);
    Duration::from_millis(millis as u64)
}

/// Error raised by a control frame the client does not understand.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum ProtocolError {
    /// The frame was not a valid control envelope.
    #[error("malformed control message: {0}")]
    Malformed(#[from] serde_json::Error),
    /// The frame carried an event code this client does not know.
    #[error("unknown control command `{0}`")]
    UnknownCommand(String),
}

/// Server-pushed control frames, `{"e": ...}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlMessage {
    /// `"u"`: update notice; auto-update is not supported.
    Update,
    /// `"r"`: the server asks the client to reconnect.
    Reconnect,
    /// `"p"`: keepalive.
    Ping,
}

impl ControlMessage {
    /// Parse a text frame.
    pub fn parse(text: &str) -> Result<Self, ProtocolError> {
        #[derive(Deserialize)]
        struct Frame {
            e: String,
        }

        let frame: Frame = serde_json::from_str(text)?;
        match frame.e.as_str() {
            "u" => Ok(ControlMessage::Update),
            "r" => Ok(ControlMessage::Reconnect),
            "p" => Ok(ControlMessage::Ping),
            _ => Err(ProtocolError::UnknownCommand(frame.e)),
        }
    }
}

/// Lifecycle of the streaming connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No connection, either never opened or explicitly disconnected.
    Disconnected,
    /// Opening a connection.
    Connecting,
    /// Connected; sends go out immediately.
    Open,
    /// Tearing the previous connection down.
    Closing,
    /// The connection was closed or failed.
    Closed,
    /// Waiting out the backoff before the next connect.
    Reconnecting,
}

enum ConnectionEvent {
    Closed,
    Errored(String),
    Message(String),
}

struct TaggedEvent {
    generation: u64,
    event: ConnectionEvent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ConnectOutcome {
    Opened,
    Busy,
    Unresolved,
    Aborted,
    Failed,
}

/// Persistent websocket transport with exponential-backoff reconnects.
///
/// Frames read from the socket are turned into events on an internal
/// channel; a single dispatcher task drives the reconnect state machine from
/// those events. Events of a connection that has since been replaced are
/// ignored.
#[derive(Clone)]
pub struct StreamingTransport {
    inner: Arc<Inner>,
}

struct Inner {
    config: Arc<RuntimeConfig>,
    resolver: Resolver,
    gates: Arc<Gates>,
    state: Mutex<ConnectionState>,
    attempt: AtomicU32,
    generation: AtomicU64,
    stopped: AtomicBool,
    sink: async_lock::Mutex<Option<WsSink>>,
    reader: Mutex<Option<JoinHandle<()>>>,
    events: Sender<TaggedEvent>,
    errors: Sender<ProtocolError>,
}

impl StreamingTransport {
    /// Must be called from within a tokio runtime; spawns the event dispatcher.
    pub(crate) fn new(
        config: Arc<RuntimeConfig>,
        resolver: Resolver,
        gates: Arc<Gates>,
        errors: Sender<ProtocolError>,
    ) -> Self {
        let (events, consumer) = async_channel::unbounded();
        let inner = Arc::new(Inner {
            config,
            resolver,
            gates,
            state: Mutex::new(ConnectionState::Disconnected),
            attempt: AtomicU32::new(0),
            generation: AtomicU64::new(0),
            stopped: AtomicBool::new(false),
            sink: async_lock::Mutex::new(None),
            reader: Mutex::new(None),
            events,
            errors,
        });
        tokio::spawn(dispatch(Arc::downgrade(&inner), consumer));
        Self { inner }
    }

    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        *self
            .inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Reconnect attempts since the last successful open.
    pub fn reconnect_attempts(&self) -> u32 {
        self.inner.attempt.load(Ordering::Acquire)
    }

    /// Whether the connection is open.
    pub fn is_active(&self) -> bool {
        self.state() == ConnectionState::Open
    }

    fn set_state(&self, state: ConnectionState) {
        *self
            .inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = state;
    }

    fn is_stopped(&self) -> bool {
        self.inner.stopped.load(Ordering::Acquire)
    }

    /// Open the connection, resolving the session first when needed.
    ///
    /// Returns silently when another connect is running or no server could
    /// be resolved. A failed open schedules a reconnect.
    pub async fn connect(&self) {
        self.inner.stopped.store(false, Ordering::Release);
        if self.try_connect().await == ConnectOutcome::Failed {
            self.trigger_reconnect();
        }
    }

    /// Close the connection and stop reconnecting.
    pub async fn disconnect(&self) {
        self.inner.stopped.store(true, Ordering::Release);
        self.teardown().await;
        self.set_state(ConnectionState::Disconnected);
    }

    /// Back off, then connect; repeated until the connection opens.
    ///
    /// At most one reconnect loop runs at a time. The attempt counter is only
    /// reset by a successful open.
    pub async fn reconnect(&self) {
        let Some(_guard) = self.inner.gates.enter(Operation::Reconnect) else {
            return;
        };

        loop {
            if self.is_stopped() || self.is_active() {
                return;
            }
            self.set_state(ConnectionState::Reconnecting);

            let attempt = self.inner.attempt.fetch_add(1, Ordering::AcqRel) + 1;
            let delay = reconnect_delay(attempt);
            tracing::debug!(attempt, ?delay, "reconnecting");
            tokio::time::sleep(delay).await;

            if self.is_stopped() {
                return;
            }
            match self.try_connect().await {
                ConnectOutcome::Opened | ConnectOutcome::Unresolved | ConnectOutcome::Aborted => {
                    return;
                }
                ConnectOutcome::Busy | ConnectOutcome::Failed => continue,
            }
        }
    }

    fn trigger_reconnect(&self) {
        let this = self.clone();
        tokio::spawn(async move { this.reconnect().await });
    }

    /// Transmit one batch envelope.
    ///
    /// A closed connection first triggers a reconnect; the message is only
    /// sent when the connection is open at that moment.
    pub async fn send(&self, message: &str) -> bool {
        let state = self.state();
        if matches!(
            state,
            ConnectionState::Disconnected | ConnectionState::Closed
        ) && !self.is_stopped()
        {
            tracing::debug!(?state, "connection closed, triggering reconnect");
            self.trigger_reconnect();
        }

        if !self.is_active() {
            return false;
        }

        let mut sink = self.inner.sink.lock().await;
        let Some(sink) = sink.as_mut() else {
            return false;
        };
        match sink.send(Message::Text(message.to_string())).await {
            Ok(()) => true,
            Err(e) => {
                self.inner
                    .config
                    .diagnostics
                    .error("failed to send batch", &TransportError::from(e));
                false
            }
        }
    }

    async fn try_connect(&self) -> ConnectOutcome {
        let Some(_guard) = self.inner.gates.enter(Operation::Connect) else {
            return ConnectOutcome::Busy;
        };

        self.teardown().await;
        let expected = self.inner.generation.load(Ordering::Acquire);

        let config = &self.inner.config;
        if !config.is_resolved() {
            if let Err(e) = self.inner.resolver.resolve().await {
                config.diagnostics.error("authentication failed", &e);
            }
        }
        let Some(session) = config.session().filter(|s| !s.server.is_empty()) else {
            tracing::debug!("no ingestion server resolved, not connecting");
            self.set_state(ConnectionState::Disconnected);
            return ConnectOutcome::Unresolved;
        };

        let url = match connection_url(config, &session) {
            Ok(url) => url,
            Err(e) => {
                config
                    .diagnostics
                    .error("invalid streaming url", &TransportError::from(e));
                self.set_state(ConnectionState::Closed);
                return ConnectOutcome::Failed;
            }
        };

        self.set_state(ConnectionState::Connecting);
        tracing::debug!(server = %session.server, port = session.port, "connecting websocket");
        let ws = match connect_async(url.as_str()).await {
            Ok((ws, _)) => ws,
            Err(e) => {
                config
                    .diagnostics
                    .error("failed to open websocket", &TransportError::from(e));
                self.set_state(ConnectionState::Closed);
                return ConnectOutcome::Failed;
            }
        };

        // A disconnect while the handshake was in flight wins; the sink lock
        // orders this check against its teardown.
        let mut slot = self.inner.sink.lock().await;
        if self.is_stopped() || self.inner.generation.load(Ordering::Acquire) != expected {
            drop(slot);
            tracing::debug!("disconnected while connecting, dropping new websocket");
            let mut ws = ws;
            if tokio::time::timeout(CLOSE_TIMEOUT, ws.close(None))
                .await
                .is_err()
            {
                tracing::trace!("timed out closing abandoned connection");
            }
            return ConnectOutcome::Aborted;
        }

        let (sink, stream) = ws.split();
        let generation = self.inner.generation.fetch_add(1, Ordering::AcqRel) + 1;
        *slot = Some(sink);
        let reader = tokio::spawn(read_frames(stream, generation, self.inner.events.clone()));
        *self
            .inner
            .reader
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(reader);

        self.inner.attempt.store(0, Ordering::Release);
        self.set_state(ConnectionState::Open);
        drop(slot);
        tracing::debug!("websocket connected");
        ConnectOutcome::Opened
    }

    /// Best-effort close of the current connection.
    async fn teardown(&self) {
        self.inner.generation.fetch_add(1, Ordering::AcqRel);
        let reader = self
            .inner
            .reader
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(reader) = reader {
            reader.abort();
        }

        let previous = self.inner.sink.lock().await.take();
        if let Some(mut sink) = previous {
            self.set_state(ConnectionState::Closing);
            match tokio::time::timeout(CLOSE_TIMEOUT, sink.close()).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => tracing::trace!(err = %e, "error closing previous connection"),
                Err(_) => tracing::trace!("timed out closing previous connection"),
            }
        }
    }

    async fn handle_event(&self, tagged: TaggedEvent) {
        if tagged.generation != self.inner.generation.load(Ordering::Acquire) {
            tracing::trace!(generation = tagged.generation, "ignoring stale connection event");
            return;
        }

        match tagged.event {
            ConnectionEvent::Closed => self.connection_lost("connection closed"),
            ConnectionEvent::Errored(e) => self.connection_lost(&e),
            ConnectionEvent::Message(text) => match ControlMessage::parse(&text) {
                Ok(ControlMessage::Update) => tracing::trace!("ignoring update notice"),
                Ok(ControlMessage::Ping) => tracing::trace!("keepalive"),
                Ok(ControlMessage::Reconnect) => {
                    tracing::debug!("server requested reconnect");
                    self.connect().await;
                }
                Err(e) => {
                    self.inner
                        .config
                        .diagnostics
                        .error("invalid control message", &e);
                    if let Err(e) = self.inner.errors.force_send(e) {
                        tracing::trace!("protocol error dropped: {e}");
                    }
                }
            },
        }
    }

    fn connection_lost(&self, reason: &str) {
        let was_open = {
            let mut state = self
                .inner
                .state
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            let was_open = *state == ConnectionState::Open;
            *state = ConnectionState::Closed;
            was_open
        };
        tracing::debug!(%reason, was_open, "connection lost");
        if was_open && !self.is_stopped() {
            self.trigger_reconnect();
        }
    }
}

impl fmt::Debug for StreamingTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamingTransport")
            .field("state", &self.state())
            .field("reconnect_attempts", &self.reconnect_attempts())
            .finish_non_exhaustive()
    }
}

async fn dispatch(inner: Weak<Inner>, events: Receiver<TaggedEvent>) {
    while let Ok(event) = events.recv().await {
        let Some(inner) = inner.upgrade() else {
            break;
        };
        StreamingTransport { inner }.handle_event(event).await;
    }
}

async fn read_frames(
    mut stream: SplitStream<WsStream>,
    generation: u64,
    events: Sender<TaggedEvent>,
) {
    let emit = |event| {
        events
            .try_send(TaggedEvent { generation, event })
            .map_err(|e| tracing::trace!("connection event dropped: {e}"))
            .ok();
    };

    while let Some(frame) = stream.next().await {
        match frame {
            Ok(Message::Text(text)) => emit(ConnectionEvent::Message(text)),
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(e) => {
                emit(ConnectionEvent::Errored(e.to_string()));
                return;
            }
        }
    }
    emit(ConnectionEvent::Closed);
}

pub(crate) fn connection_url(
    config: &RuntimeConfig,
    session: &Session,
) -> Result<Url, url::ParseError> {
    let mut url = Url::parse(&format!(
        "{}://{}:{}/",
        session.ws_scheme(),
        session.server,
        session.port
    ))?;
    url.query_pairs_mut()
        .append_pair("auth_token", &session.token)
        .append_pair("timestamp", &http::now_millis().to_string())
        .append_pair("compress", "1")
        .append_pair("tailmode", "")
        .append_pair("transport", "")
        .append_pair("hostname", config.hostname())
        .append_pair("mac", "")
        .append_pair("ip", "")
        .append_pair("tags", &config.joined_tags().unwrap_or_default());
    Ok(url)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{config::TransportKind, http::HttpClient};
    use tokio::net::TcpListener;
    use tokio_tungstenite::accept_async;

    fn transport_for(port: u16) -> (StreamingTransport, Receiver<ProtocolError>) {
        let mut config = RuntimeConfig::new("KEY".into(), TransportKind::Streaming);
        config.auth_endpoint = "http://127.0.0.1:9".parse().unwrap();
        config.auth_fail_delay = Duration::from_millis(1);
        config.max_auth_attempts = 1;
        let config = Arc::new(config);
        config.set_session(Session {
            token: "tok".into(),
            server: "127.0.0.1".into(),
            port,
            ssl: false,
        });

        let gates = Arc::new(Gates::new());
        let http = HttpClient::new(Duration::from_secs(5)).unwrap();
        let resolver = Resolver::new(http, config.clone(), gates.clone());
        let (errors, consumer) = async_channel::bounded(8);
        (
            StreamingTransport::new(config, resolver, gates, errors),
            consumer,
        )
    }

    async fn listener() -> (TcpListener, u16) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        (listener, port)
    }

    async fn wait_until(mut condition: impl FnMut() -> bool) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while !condition() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("condition not reached in time");
    }

    #[test]
    fn backoff_sequence() {
        let delays: Vec<_> = (1..=5).map(|n| reconnect_delay(n).as_millis()).collect();
        assert_eq!(delays, [1500, 2250, 3375, 5000, 5000]);
        assert_eq!(reconnect_delay(0).as_millis(), 1000);
        assert_eq!(reconnect_delay(u32::MAX).as_millis(), 5000);
    }

    #[test]
    fn control_messages() {
        assert_eq!(ControlMessage::parse(r#"{"e":"u"}"#).unwrap(), ControlMessage::Update);
        assert_eq!(ControlMessage::parse(r#"{"e":"r"}"#).unwrap(), ControlMessage::Reconnect);
        assert_eq!(ControlMessage::parse(r#"{"e":"p"}"#).unwrap(), ControlMessage::Ping);
        assert!(matches!(
            ControlMessage::parse(r#"{"e":"x"}"#),
            Err(ProtocolError::UnknownCommand(code)) if code == "x"
        ));
        assert!(matches!(
            ControlMessage::parse("not json"),
            Err(ProtocolError::Malformed(_))
        ));
        assert!(matches!(
            ControlMessage::parse(r#"{"type":"r"}"#),
            Err(ProtocolError::Malformed(_))
        ));
    }

    #[test]
    fn connection_url_shape() {
        let mut config = RuntimeConfig::new("KEY".into(), TransportKind::Streaming);
        config.hostname = "box".into();
        config.tags = vec!["a".into(), "b".into()];
        let session = Session {
            token: "a+b/c d".into(),
            server: "ws.example.com".into(),
            port: 8443,
            ssl: true,
        };
        let url = connection_url(&config, &session).unwrap();
        assert_eq!(url.scheme(), "wss");
        assert_eq!(url.port(), Some(8443));
        let query = url.query().unwrap();
        assert!(query.starts_with("auth_token=a%2Bb%2Fc+d&timestamp="));
        assert!(query.ends_with(
            "&compress=1&tailmode=&transport=&hostname=box&mac=&ip=&tags=a%2Cb"
        ));
    }

    #[tokio::test]
    async fn connect_then_send() {
        let (listener, port) = listener().await;
        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = accept_async(stream).await.unwrap();
            loop {
                match ws.next().await.unwrap().unwrap() {
                    Message::Text(text) => return text,
                    _ => continue,
                }
            }
        });

        let (transport, _errors) = transport_for(port);
        transport.connect().await;
        assert_eq!(transport.state(), ConnectionState::Open);
        assert_eq!(transport.reconnect_attempts(), 0);

        assert!(transport.send(r#"{"e":"ls","ls":[]}"#).await);
        assert_eq!(server.await.unwrap(), r#"{"e":"ls","ls":[]}"#);
        transport.disconnect().await;
        assert_eq!(transport.state(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn send_while_closed_triggers_reconnect_and_fails() {
        let (listener, port) = listener().await;
        drop(listener);

        let (transport, _errors) = transport_for(port);
        assert_eq!(transport.state(), ConnectionState::Disconnected);
        assert!(!transport.send("{}").await);

        wait_until(|| transport.reconnect_attempts() >= 1).await;
        assert_eq!(transport.state(), ConnectionState::Reconnecting);
        transport.disconnect().await;
    }

    #[tokio::test]
    async fn unknown_control_message_surfaces_error() {
        let (listener, port) = listener().await;
        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = accept_async(stream).await.unwrap();
            ws.send(Message::Text(r#"{"e":"p"}"#.into())).await.unwrap();
            ws.send(Message::Text(r#"{"e":"z"}"#.into())).await.unwrap();
            ws.send(Message::Text("garbage".into())).await.unwrap();
            while ws.next().await.is_some() {}
        });

        let (transport, errors) = transport_for(port);
        transport.connect().await;

        let first = tokio::time::timeout(Duration::from_secs(5), errors.recv())
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(first, ProtocolError::UnknownCommand(code) if code == "z"));
        let second = tokio::time::timeout(Duration::from_secs(5), errors.recv())
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(second, ProtocolError::Malformed(_)));
        assert!(transport.is_active());
        transport.disconnect().await;
    }

    #[tokio::test]
    async fn server_requested_reconnect_opens_new_connection() {
        let (listener, port) = listener().await;
        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut first = accept_async(stream).await.unwrap();
            first.send(Message::Text(r#"{"e":"r"}"#.into())).await.unwrap();

            let (stream, _) = listener.accept().await.unwrap();
            let mut second = accept_async(stream).await.unwrap();
            loop {
                match second.next().await.unwrap().unwrap() {
                    Message::Text(text) => return text,
                    _ => continue,
                }
            }
        });

        let (transport, _errors) = transport_for(port);
        transport.connect().await;

        // sends may still reach the first connection until the control frame
        // has been handled
        let sent = async {
            while !server.is_finished() {
                transport.send("after").await;
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        };
        tokio::time::timeout(Duration::from_secs(5), sent)
            .await
            .expect("server never saw the second connection");
        assert_eq!(server.await.unwrap(), "after");
        transport.disconnect().await;
    }

    #[tokio::test]
    async fn lost_connection_reconnects_with_backoff() {
        let (listener, port) = listener().await;
        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut first = accept_async(stream).await.unwrap();
            first.close(None).await.unwrap();

            let (stream, _) = listener.accept().await.unwrap();
            let mut second = accept_async(stream).await.unwrap();
            while second.next().await.is_some() {}
        });

        let (transport, _errors) = transport_for(port);
        transport.connect().await;
        wait_until(|| transport.reconnect_attempts() == 1).await;
        wait_until(|| transport.is_active() && transport.reconnect_attempts() == 0).await;
        transport.disconnect().await;
        server.abort();
    }

    #[tokio::test]
    async fn disconnect_during_connect_stays_closed() {
        let (listener, port) = listener().await;
        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_millis(300)).await;
            let mut ws = accept_async(stream).await.unwrap();
            while ws.next().await.is_some() {}
        });

        let (transport, _errors) = transport_for(port);
        let connecting = tokio::spawn({
            let transport = transport.clone();
            async move { transport.connect().await }
        });
        wait_until(|| transport.state() == ConnectionState::Connecting).await;
        tokio::time::sleep(Duration::from_millis(50)).await;

        transport.disconnect().await;
        assert_eq!(transport.state(), ConnectionState::Disconnected);
        connecting.await.unwrap();

        assert_eq!(transport.state(), ConnectionState::Disconnected);
        assert!(!transport.is_active());
        assert!(!transport.send("{}").await);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(transport.state(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn unresolved_connect_aborts_silently() {
        let mut config = RuntimeConfig::new("KEY".into(), TransportKind::Streaming);
        config.auth_endpoint = "http://127.0.0.1:9".parse().unwrap();
        config.max_auth_attempts = 1;
        let config = Arc::new(config);
        let gates = Arc::new(Gates::new());
        let http = HttpClient::new(Duration::from_secs(5)).unwrap();
        let resolver = Resolver::new(http, config.clone(), gates.clone());
        let (errors, _consumer) = async_channel::bounded(1);
        let transport = StreamingTransport::new(config, resolver, gates.clone(), errors);

        transport.connect().await;
        assert_eq!(transport.state(), ConnectionState::Disconnected);
        assert_eq!(transport.reconnect_attempts(), 0);
        assert!(!gates.is_held(Operation::Connect));
    }
}
