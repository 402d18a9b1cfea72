//! Client for the [LogDNA](https://www.logdna.com) log ingestion service.
//!
//! A [`LogClient`] buffers [`LogLine`]s and ships them in batches. On
//! [`connect`](LogClient::connect) the ingestion key is exchanged for a
//! region-specific ingestion server, and the service decides which transport
//! carries the batches:
//!
//! - [`TransportKind::Streaming`]: a persistent websocket that reconnects with
//!   exponential backoff.
//! - [`TransportKind::Batched`]: gzip-compressed HTTP posts with retries on
//!   transient server errors.
//!
//! ```no_run
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! use logdna_client::{LogClient, LogLine};
//!
//! let client = LogClient::builder("INGESTION_KEY").tag("web").build()?;
//! client.connect().await?;
//! client.add_line(LogLine::new("my-app", "hello"));
//! client.disconnect().await;
//! # Ok(())
//! # }
//! ```
//!
//! ## Feature Flags
//!
//! - `rustls` (default): TLS through [`rustls`] for both http and websocket.
//! - `native-tls`: TLS through the platform's native library.
//!
//! [`rustls`]: https://docs.rs/rustls
#![deny(unsafe_code)]
#![deny(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod buffer;
pub mod client;
pub mod config;
pub mod guard;
pub mod handshake;
/// Log lines and the batch envelope.
pub mod line;
pub mod transport;

mod hostname;
mod http;

pub use buffer::FlushOutcome;
pub use client::{BuilderError, ClientBuilder, ClientError, LogClient};
pub use config::{BufferMode, RuntimeConfig, Session, TransportKind};
pub use handshake::HandshakeError;
pub use line::{BatchMessage, LogLine};
pub use transport::{ProtocolError, TransportError};

#[cfg(test)]
#[cfg_attr(test, ctor::ctor)]
fn init() {
    // Initialize the tracing subscriber for tests
    use tracing_subscriber::EnvFilter;
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .init();
}
