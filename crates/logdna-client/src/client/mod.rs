//! The application-facing client.
use crate::{
    buffer::{FlushOutcome, IngestionBuffer},
    config::{RuntimeConfig, TransportKind},
    guard::Gates,
    handshake::{HandshakeError, Resolver},
    http::HttpClient,
    line::LogLine,
    transport::{BatchedTransport, ProtocolError, StreamingTransport, Transport},
};
use async_channel::{Receiver, Sender};
use futures_util::{FutureExt, select};
use std::sync::{
    Arc, Mutex, PoisonError, Weak,
    atomic::{AtomicBool, Ordering},
};
use tokio::{sync::Notify, task::JoinHandle};

mod builder;

pub use builder::{BuilderError, ClientBuilder};

/// Client error.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum ClientError {
    /// The handshake did not resolve an ingestion server.
    #[error(transparent)]
    Handshake(#[from] HandshakeError),
    /// The client was used outside of a tokio runtime.
    #[error("no tokio runtime: {0}")]
    NoRuntime(#[from] tokio::runtime::TryCurrentError),
}

/// Buffers log lines and ships them to the ingestion service.
///
/// Lines can be added at any time; they are held in the buffer until the
/// client is connected and the periodic flush (or the flush threshold) sends
/// them. Cloning is cheap and every clone drives the same client.
#[derive(Clone)]
pub struct LogClient {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    config: Arc<RuntimeConfig>,
    gates: Arc<Gates>,
    http: HttpClient,
    resolver: Resolver,
    transport: async_lock::OnceCell<Transport>,
    buffer: IngestionBuffer,
    active: AtomicBool,
    eager_flush: Arc<Notify>,
    worker: Mutex<Option<Worker>>,
    errors: (Sender<ProtocolError>, Receiver<ProtocolError>),
}

struct Worker {
    shutdown: Sender<()>,
    handle: JoinHandle<()>,
}

impl LogClient {
    /// Start building a client for `ingestion_key`.
    pub fn builder(ingestion_key: impl Into<String>) -> ClientBuilder {
        ClientBuilder::default().ingestion_key(ingestion_key)
    }

    /// Resolve the ingestion endpoint, open the selected transport and start
    /// the periodic flush.
    ///
    /// The transport kind is decided by the handshake and fixed for the
    /// lifetime of the client. Calling `connect` again after [`disconnect`]
    /// reopens the same transport.
    ///
    /// [`disconnect`]: LogClient::disconnect
    pub async fn connect(&self) -> Result<(), ClientError> {
        tokio::runtime::Handle::try_current()?;
        let inner = &self.inner;

        if !inner.config.is_resolved() {
            inner.resolver.resolve().await?;
        }

        let transport = inner
            .transport
            .get_or_init(|| async { inner.new_transport() })
            .await;
        tracing::debug!(transport = %transport.kind(), "connecting");
        transport.connect().await;

        inner.active.store(true, Ordering::Release);
        inner.start_worker(Arc::downgrade(&self.inner));
        Ok(())
    }

    /// Queue a line for the next flush.
    ///
    /// Never blocks on the network. When the buffer is full the oldest pending
    /// line is dropped; reaching the flush threshold wakes the flush worker.
    pub fn add_line(&self, line: LogLine) {
        if self.inner.buffer.add_line(line) {
            self.inner.eager_flush.notify_one();
        }
    }

    /// Send pending lines now.
    ///
    /// Does nothing while the client is not connected, or when a flush is
    /// already running.
    pub async fn flush(&self) -> FlushOutcome {
        self.inner.flush().await
    }

    /// Stop the periodic flush, flush once more, then close the transport.
    ///
    /// A flush the worker already started is awaited first, so the final
    /// flush is never turned away as busy.
    pub async fn disconnect(&self) {
        let inner = &self.inner;
        let worker = inner
            .worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(Worker { shutdown, handle }) = worker {
            shutdown.close();
            if let Err(e) = handle.await {
                tracing::warn!("flush worker ended abnormally: {e}");
            }
        }

        let outcome = inner.flush().await;
        tracing::debug!(?outcome, "final flush before disconnect");
        inner.active.store(false, Ordering::Release);

        if let Some(transport) = inner.transport.get() {
            transport.disconnect().await;
        }
    }

    /// Whether the client is connected.
    pub fn is_active(&self) -> bool {
        self.inner.active.load(Ordering::Acquire)
    }

    /// Number of lines waiting to be flushed.
    pub fn pending(&self) -> usize {
        self.inner.buffer.len()
    }

    /// The transport selected by the handshake, once connected.
    pub fn transport(&self) -> Option<&Transport> {
        self.inner.transport.get()
    }

    /// Settings and resolved session of this client.
    pub fn config(&self) -> &RuntimeConfig {
        &self.inner.config
    }

    /// Control messages from the service that the client could not handle.
    pub fn errors(&self) -> Receiver<ProtocolError> {
        self.inner.errors.1.clone()
    }
}

impl ClientInner {
    fn new_transport(&self) -> Transport {
        match self.config.transport() {
            TransportKind::Streaming => Transport::Streaming(StreamingTransport::new(
                self.config.clone(),
                self.resolver.clone(),
                self.gates.clone(),
                self.errors.0.clone(),
            )),
            TransportKind::Batched => Transport::Batched(BatchedTransport::new(
                self.http.clone(),
                self.config.clone(),
                self.resolver.clone(),
                self.gates.clone(),
            )),
        }
    }

    async fn flush(&self) -> FlushOutcome {
        if !self.active.load(Ordering::Acquire) {
            return FlushOutcome::Inactive;
        }
        let Some(transport) = self.transport.get() else {
            return FlushOutcome::Inactive;
        };
        self.buffer.flush(transport).await
    }

    fn start_worker(&self, client: Weak<ClientInner>) {
        let mut worker = self.worker.lock().unwrap_or_else(PoisonError::into_inner);
        if worker.is_some() {
            return;
        }

        let (shutdown, signal) = async_channel::bounded(1);
        let handle = tokio::spawn(run_flush_worker(
            client,
            self.eager_flush.clone(),
            self.config.flush_interval,
            signal,
        ));
        *worker = Some(Worker { shutdown, handle });
    }
}

async fn run_flush_worker(
    client: Weak<ClientInner>,
    eager_flush: Arc<Notify>,
    interval: std::time::Duration,
    shutdown: Receiver<()>,
) {
    loop {
        select! {
            _ = tokio::time::sleep(interval).fuse() => {},
            _ = eager_flush.notified().fuse() => tracing::trace!("flush threshold reached"),
            _ = shutdown.recv().fuse() => break,
        }

        let Some(client) = client.upgrade() else {
            break;
        };
        match client.flush().await {
            FlushOutcome::Sent(count) => tracing::trace!(count, "batch sent"),
            FlushOutcome::Failed(count) => tracing::debug!(count, "batch not sent"),
            _ => {}
        }
    }
    tracing::trace!("flush worker stopped");
}

impl std::fmt::Debug for LogClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogClient")
            .field("active", &self.is_active())
            .field("pending", &self.pending())
            .field("transport", &self.transport().map(Transport::kind))
            .finish_non_exhaustive()
    }
}
