use super::{ClientInner, LogClient};
use crate::{
    buffer::IngestionBuffer,
    config::{BufferMode, RuntimeConfig, TransportKind},
    guard::Gates,
    handshake::Resolver,
    http::HttpClient,
};
use http::Uri;
use std::{
    sync::{Arc, Mutex, atomic::AtomicBool},
    time::Duration,
};
use tokio::sync::Notify;

const ERROR_CHANNEL_CAPACITY: usize = 64;

/// Builder error.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum BuilderError {
    /// Missing required field in the builder.
    #[error("missing required field: {0}")]
    Missing(&'static str),
    /// The authenticate endpoint is not a valid absolute uri.
    #[error("invalid authenticate endpoint `{0}`")]
    InvalidEndpoint(String),
    /// The http client could not be created.
    #[error("failed to create http client: {0}")]
    Http(#[from] reqwest::Error),
}

/// Builder for a [`LogClient`] with required and optional parameters.
pub struct ClientBuilder {
    ingestion_key: Option<String>,
    tags: Vec<String>,
    hostname: Option<String>,
    flush_interval: Option<Duration>,
    buffer_capacity: Option<usize>,
    flush_threshold: Option<usize>,
    auth_fail_delay: Option<Duration>,
    max_auth_attempts: Option<u32>,
    retry_timeout: Option<Duration>,
    max_send_retries: Option<u32>,
    request_timeout: Option<Duration>,
    auth_endpoint: Option<String>,
    transport: TransportKind,
    buffer_mode: Option<BufferMode>,
    enable_trace: bool,
    print_internal_error: bool,
}

type Result<T, E = BuilderError> = std::result::Result<T, E>;

impl Default for ClientBuilder {
    fn default() -> Self {
        Self {
            ingestion_key: None,
            tags: Vec::new(),
            hostname: None,
            flush_interval: None,
            buffer_capacity: None,
            flush_threshold: None,
            auth_fail_delay: None,
            max_auth_attempts: None,
            retry_timeout: None,
            max_send_retries: None,
            request_timeout: None,
            auth_endpoint: None,
            transport: TransportKind::Batched,
            buffer_mode: None,
            enable_trace: true,
            print_internal_error: false,
        }
    }
}

impl ClientBuilder {
    /// Set the ingestion key.
    pub fn ingestion_key(mut self, ingestion_key: impl Into<String>) -> Self {
        self.ingestion_key = Some(ingestion_key.into());
        self
    }

    /// Add a tag sent with the handshake and every batch.
    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    /// Replace the tag set.
    pub fn tags<I, T>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    /// Override the detected host name.
    pub fn hostname(mut self, hostname: impl Into<String>) -> Self {
        self.hostname = Some(hostname.into());
        self
    }

    /// Interval of the periodic flush.
    ///
    /// Default is 250 ms.
    pub fn flush_interval(mut self, interval: Duration) -> Self {
        self.flush_interval = Some(interval);
        self
    }

    /// Maximum number of pending lines; the oldest line is dropped beyond it.
    ///
    /// Default is `10000`.
    pub fn buffer_capacity(mut self, capacity: usize) -> Self {
        self.buffer_capacity = Some(capacity);
        self
    }

    /// Number of pending lines that triggers an immediate flush.
    ///
    /// Default is `5000`, never more than the buffer capacity.
    pub fn flush_threshold(mut self, threshold: usize) -> Self {
        self.flush_threshold = Some(threshold);
        self
    }

    /// Delay between failed authentication attempts.
    ///
    /// Default is 15 minutes.
    pub fn auth_fail_delay(mut self, delay: Duration) -> Self {
        self.auth_fail_delay = Some(delay);
        self
    }

    /// Authentication attempts before giving up.
    ///
    /// Default is `10`.
    pub fn max_auth_attempts(mut self, attempts: u32) -> Self {
        self.max_auth_attempts = Some(attempts.max(1));
        self
    }

    /// Delay before a batch rejected with a transient status is resent.
    ///
    /// Default is 5 s.
    pub fn retry_timeout(mut self, timeout: Duration) -> Self {
        self.retry_timeout = Some(timeout);
        self
    }

    /// How often one batch is resent after transient statuses.
    ///
    /// Default is `10`.
    pub fn max_send_retries(mut self, retries: u32) -> Self {
        self.max_send_retries = Some(retries);
        self
    }

    /// Timeout of a single http request.
    ///
    /// Default is 30 s.
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    /// Base uri of the authenticate endpoint.
    ///
    /// Default is `https://api.logdna.com`.
    pub fn auth_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.auth_endpoint = Some(endpoint.into());
        self
    }

    /// Transport requested in the handshake; the service may pick another one.
    ///
    /// Default is [`TransportKind::Batched`].
    pub fn transport(mut self, transport: TransportKind) -> Self {
        self.transport = transport;
        self
    }

    /// Override the buffer flavor derived from the requested transport.
    pub fn buffer_mode(mut self, mode: BufferMode) -> Self {
        self.buffer_mode = Some(mode);
        self
    }

    /// Enable or disable tracing for the client.
    ///
    /// Enabled by default.
    /// If enabled, client will log via [`tracing`](https://docs.rs/tracing/latest/tracing/) crate.
    pub fn enable_trace(mut self, enable_trace: bool) -> Self {
        self.enable_trace = enable_trace;
        self
    }

    /// Enable or disable printing internal errors to stderr.
    ///
    /// Disabled by default.
    /// If enabled and tracing is not enabled, client will print errors to stderr.
    pub fn print_internal_error(mut self, print_internal_error: bool) -> Self {
        self.print_internal_error = print_internal_error;
        self
    }

    /// Build the client. Nothing is sent until [`LogClient::connect`].
    pub fn build(self) -> Result<LogClient> {
        let ingestion_key = self
            .ingestion_key
            .filter(|key| !key.is_empty())
            .ok_or(BuilderError::Missing("ingestion_key"))?;

        let mut config = RuntimeConfig::new(ingestion_key, self.transport);
        config.tags = self.tags;
        if let Some(hostname) = self.hostname {
            config.hostname = hostname;
        }
        if let Some(interval) = self.flush_interval {
            config.flush_interval = interval;
        }
        if let Some(capacity) = self.buffer_capacity {
            config.buffer_capacity = capacity.max(1);
        }
        config.flush_threshold = self
            .flush_threshold
            .unwrap_or(config.flush_threshold)
            .clamp(1, config.buffer_capacity);
        if let Some(delay) = self.auth_fail_delay {
            config.auth_fail_delay = delay;
        }
        if let Some(attempts) = self.max_auth_attempts {
            config.max_auth_attempts = attempts;
        }
        if let Some(timeout) = self.retry_timeout {
            config.retry_timeout = timeout;
        }
        if let Some(retries) = self.max_send_retries {
            config.max_send_retries = retries;
        }
        if let Some(timeout) = self.request_timeout {
            config.request_timeout = timeout;
        }
        if let Some(endpoint) = self.auth_endpoint {
            config.auth_endpoint = endpoint
                .parse::<Uri>()
                .ok()
                .filter(|uri| uri.scheme().is_some() && uri.authority().is_some())
                .ok_or(BuilderError::InvalidEndpoint(endpoint))?;
        }
        if let Some(mode) = self.buffer_mode {
            config.buffer_mode = mode;
        }
        config.diagnostics.enable_trace = self.enable_trace;
        config.diagnostics.print_internal_error = self.print_internal_error;

        let config = Arc::new(config);
        let gates = Arc::new(Gates::new());
        let http = HttpClient::new(config.request_timeout)?;
        let resolver = Resolver::new(http.clone(), config.clone(), gates.clone());
        let buffer = IngestionBuffer::new(
            config.buffer_mode,
            config.buffer_capacity,
            config.flush_threshold,
            gates.clone(),
        );
        let errors = async_channel::bounded(ERROR_CHANNEL_CAPACITY);

        Ok(LogClient {
            inner: Arc::new(ClientInner {
                config,
                gates,
                http,
                resolver,
                transport: async_lock::OnceCell::new(),
                buffer,
                active: AtomicBool::new(false),
                eager_flush: Arc::new(Notify::new()),
                worker: Mutex::new(None),
                errors,
            }),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ingestion_key_is_required() {
        assert!(matches!(
            ClientBuilder::default().build(),
            Err(BuilderError::Missing("ingestion_key"))
        ));
        assert!(matches!(
            LogClient::builder("").build(),
            Err(BuilderError::Missing("ingestion_key"))
        ));
    }

    #[test]
    fn defaults() {
        let client = LogClient::builder("KEY").build().unwrap();
        let config = client.config();
        assert_eq!(config.ingestion_key(), "KEY");
        assert_eq!(config.flush_interval(), Duration::from_millis(250));
        assert_eq!(config.buffer_capacity(), 10_000);
        assert_eq!(config.flush_threshold, 5_000);
        assert_eq!(config.auth_fail_delay, Duration::from_millis(900_000));
        assert_eq!(config.max_auth_attempts, 10);
        assert_eq!(config.retry_timeout, Duration::from_millis(5_000));
        assert_eq!(config.auth_endpoint.scheme_str(), Some("https"));
        assert_eq!(config.auth_endpoint.host(), Some("api.logdna.com"));
        assert_eq!(config.transport(), TransportKind::Batched);
        assert_eq!(client.inner.buffer.mode(), BufferMode::Queue);
        assert!(!config.hostname().is_empty());
        assert!(!client.is_active());
    }

    #[test]
    fn threshold_is_clamped_to_capacity() {
        let client = LogClient::builder("KEY")
            .buffer_capacity(3)
            .flush_threshold(100)
            .build()
            .unwrap();
        assert_eq!(client.config().flush_threshold, 3);
    }

    #[test]
    fn buffer_mode_follows_requested_transport() {
        let client = LogClient::builder("KEY")
            .transport(TransportKind::Streaming)
            .build()
            .unwrap();
        assert_eq!(client.inner.buffer.mode(), BufferMode::Bounded);

        let client = LogClient::builder("KEY")
            .transport(TransportKind::Streaming)
            .buffer_mode(BufferMode::Queue)
            .build()
            .unwrap();
        assert_eq!(client.inner.buffer.mode(), BufferMode::Queue);
    }

    #[test]
    fn relative_endpoint_is_rejected() {
        assert!(matches!(
            LogClient::builder("KEY").auth_endpoint("/authenticate").build(),
            Err(BuilderError::InvalidEndpoint(_))
        ));
    }
}
