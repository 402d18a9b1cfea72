//! Transports that deliver flushed batches to the ingestion service.
use crate::{buffer::LineSink, config::TransportKind};

mod batched;
mod streaming;

pub use batched::BatchedTransport;
pub use streaming::{
    ConnectionState, ControlMessage, ProtocolError, StreamingTransport, reconnect_delay,
};

/// Transport error.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum TransportError {
    /// No ingestion server has been resolved yet.
    #[error("no ingestion server resolved")]
    Unresolved,
    /// The ingestion endpoint answered with a non-successful status.
    #[error("ingest returned http {0}")]
    Status(u16),
    /// HTTP transport failure.
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    /// Websocket failure.
    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),
    /// The ingestion url could not be built.
    #[error("invalid ingestion url: {0}")]
    Url(#[from] url::ParseError),
    /// Compressing the request body failed.
    #[error("compression failed: {0}")]
    Compress(#[from] std::io::Error),
}

/// The transport selected by the handshake.
#[derive(Clone, Debug)]
pub enum Transport {
    /// See [`StreamingTransport`].
    Streaming(StreamingTransport),
    /// See [`BatchedTransport`].
    Batched(BatchedTransport),
}

impl Transport {
    /// Which kind of transport this is.
    pub fn kind(&self) -> TransportKind {
        match self {
            Transport::Streaming(_) => TransportKind::Streaming,
            Transport::Batched(_) => TransportKind::Batched,
        }
    }

    /// Open the transport.
    pub async fn connect(&self) {
        match self {
            Transport::Streaming(t) => t.connect().await,
            Transport::Batched(t) => t.connect().await,
        }
    }

    /// Close the transport.
    pub async fn disconnect(&self) {
        match self {
            Transport::Streaming(t) => t.disconnect().await,
            Transport::Batched(t) => t.disconnect(),
        }
    }

    /// Send one batch envelope; returns whether it was transmitted.
    pub async fn send(&self, message: &str) -> bool {
        match self {
            Transport::Streaming(t) => t.send(message).await,
            Transport::Batched(t) => t.send(message).await,
        }
    }

    /// Whether the transport can currently accept batches.
    pub fn is_active(&self) -> bool {
        match self {
            Transport::Streaming(t) => t.is_active(),
            Transport::Batched(t) => t.is_active(),
        }
    }
}

impl LineSink for Transport {
    async fn send(&self, payload: &str) -> bool {
        Transport::send(self, payload).await
    }
}
