//! A tracing layer that sends logs to LogDNA.
//!
//! ```no_run
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! use tracing_logdna::LogClient;
//! use tracing_subscriber::layer::SubscriberExt;
//!
//! let client = LogClient::builder("INGESTION_KEY").build()?;
//! client.connect().await?;
//!
//! let subscriber = tracing_subscriber::registry()
//!     .with(tracing_logdna::layer(client.clone()).with_app("my-app"));
//! tracing::subscriber::set_global_default(subscriber)?;
//!
//! tracing::info!("shipped to logdna");
//! client.disconnect().await;
//! # Ok(())
//! # }
//! ```
#![deny(unsafe_code)]
#![deny(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

/// Formatters for writing an [`Event`](tracing::Event) into a line's content.
pub mod event;
/// Formatters for logging tracing events.
pub mod format;
/// Tracing layer that sends logs to LogDNA.
pub mod layer;

pub use layer::layer;
pub use logdna_client::{LogClient, LogLine};
