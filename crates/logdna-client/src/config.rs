//! Runtime configuration shared between the client, the resolver and the transports.
use http::Uri;
use std::{
    fmt,
    sync::{PoisonError, RwLock},
    time::Duration,
};

pub(crate) const DEFAULT_AUTH_ENDPOINT: &str = "https://api.logdna.com";
pub(crate) const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_millis(250);
pub(crate) const DEFAULT_BUFFER_CAPACITY: usize = 10_000;
pub(crate) const DEFAULT_FLUSH_THRESHOLD: usize = 5_000;
pub(crate) const DEFAULT_AUTH_FAIL_DELAY: Duration = Duration::from_secs(15 * 60);
pub(crate) const DEFAULT_MAX_AUTH_ATTEMPTS: u32 = 10;
pub(crate) const DEFAULT_RETRY_TIMEOUT: Duration = Duration::from_millis(5_000);
pub(crate) const DEFAULT_MAX_SEND_RETRIES: u32 = 10;
pub(crate) const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Which transport ships the flushed batches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportKind {
    /// A persistent websocket connection.
    Streaming,
    /// Stateless, gzip-compressed HTTP posts.
    Batched,
}

impl TransportKind {
    /// The value used for the `transport` hint in the handshake.
    pub fn as_hint(self) -> &'static str {
        match self {
            TransportKind::Streaming => "websocket",
            TransportKind::Batched => "http",
        }
    }

    pub(crate) fn from_hint(hint: &str) -> Option<Self> {
        match hint {
            "http" | "https" => Some(TransportKind::Batched),
            "websocket" | "ws" | "wss" => Some(TransportKind::Streaming),
            _ => None,
        }
    }

    /// The buffer flavor this transport uses unless overridden.
    pub fn default_buffer_mode(self) -> BufferMode {
        match self {
            TransportKind::Streaming => BufferMode::Bounded,
            TransportKind::Batched => BufferMode::Queue,
        }
    }
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_hint())
    }
}

/// How pending lines are held between flushes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BufferMode {
    /// Lock-protected list; a failed send keeps the batch for the next flush.
    Bounded,
    /// Multi-producer queue drained by snapshot; a failed batch is dropped.
    Queue,
}

/// Session state produced by a successful handshake.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    /// Token used by the streaming transport.
    pub token: String,
    /// Ingestion server host.
    pub server: String,
    /// Ingestion server port.
    pub port: u16,
    /// Whether to use TLS towards the ingestion server.
    pub ssl: bool,
}

impl Session {
    pub(crate) fn http_scheme(&self) -> &'static str {
        if self.ssl { "https" } else { "http" }
    }

    pub(crate) fn ws_scheme(&self) -> &'static str {
        if self.ssl { "wss" } else { "ws" }
    }
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct Diagnostics {
    pub(crate) enable_trace: bool,
    pub(crate) print_internal_error: bool,
}

impl Diagnostics {
    pub(crate) fn error(&self, context: &str, err: &dyn fmt::Display) {
        if self.enable_trace {
            tracing::error!(%err, "{context}");
        } else if self.print_internal_error {
            eprintln!("[logdna-client] {context}: {err}");
        }
    }
}

/// Settings of one client plus the session resolved by the handshake.
///
/// Everything except the session and the selected transport is fixed at
/// build time. Those two are written only by the resolver.
#[derive(Debug)]
pub struct RuntimeConfig {
    pub(crate) ingestion_key: String,
    pub(crate) tags: Vec<String>,
    pub(crate) hostname: String,
    pub(crate) flush_interval: Duration,
    pub(crate) buffer_capacity: usize,
    pub(crate) flush_threshold: usize,
    pub(crate) auth_fail_delay: Duration,
    pub(crate) max_auth_attempts: u32,
    pub(crate) retry_timeout: Duration,
    pub(crate) max_send_retries: u32,
    pub(crate) request_timeout: Duration,
    pub(crate) auth_endpoint: Uri,
    pub(crate) buffer_mode: BufferMode,
    pub(crate) diagnostics: Diagnostics,
    session: RwLock<Option<Session>>,
    transport: RwLock<TransportKind>,
}

impl RuntimeConfig {
    pub(crate) fn new(ingestion_key: String, transport: TransportKind) -> Self {
        Self {
            ingestion_key,
            tags: Vec::new(),
            hostname: crate::hostname::detect(),
            flush_interval: DEFAULT_FLUSH_INTERVAL,
            buffer_capacity: DEFAULT_BUFFER_CAPACITY,
            flush_threshold: DEFAULT_FLUSH_THRESHOLD,
            auth_fail_delay: DEFAULT_AUTH_FAIL_DELAY,
            max_auth_attempts: DEFAULT_MAX_AUTH_ATTEMPTS,
            retry_timeout: DEFAULT_RETRY_TIMEOUT,
            max_send_retries: DEFAULT_MAX_SEND_RETRIES,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            auth_endpoint: Uri::from_static(DEFAULT_AUTH_ENDPOINT),
            buffer_mode: transport.default_buffer_mode(),
            diagnostics: Diagnostics {
                enable_trace: true,
                print_internal_error: false,
            },
            session: RwLock::new(None),
            transport: RwLock::new(transport),
        }
    }

    /// The ingestion key this client authenticates with.
    pub fn ingestion_key(&self) -> &str {
        &self.ingestion_key
    }

    /// Host name reported to the service.
    pub fn hostname(&self) -> &str {
        &self.hostname
    }

    /// Tags joined with commas, or `None` when there are no tags.
    pub fn joined_tags(&self) -> Option<String> {
        (!self.tags.is_empty()).then(|| self.tags.join(","))
    }

    /// Interval of the periodic flush.
    pub fn flush_interval(&self) -> Duration {
        self.flush_interval
    }

    /// Maximum number of pending lines.
    pub fn buffer_capacity(&self) -> usize {
        self.buffer_capacity
    }

    /// The currently resolved session, if any.
    pub fn session(&self) -> Option<Session> {
        self.session
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Whether a handshake has resolved an ingestion server.
    pub fn is_resolved(&self) -> bool {
        self.session
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|session| !session.server.is_empty())
    }

    /// The transport currently selected.
    pub fn transport(&self) -> TransportKind {
        *self.transport.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn set_session(&self, session: Session) {
        *self.session.write().unwrap_or_else(PoisonError::into_inner) = Some(session);
    }

    pub(crate) fn set_transport(&self, transport: TransportKind) {
        *self.transport.write().unwrap_or_else(PoisonError::into_inner) = transport;
    }
}
