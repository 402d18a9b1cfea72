//! Thin HTTP layer shared by the handshake and the batched transport.
use base64::{Engine, prelude::BASE64_STANDARD};
use flate2::{Compression, write::GzEncoder};
use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderValue};
use std::{io, io::Write, time::Duration};
use url::Url;

pub(crate) mod headers;

type Result<T, E = reqwest::Error> = std::result::Result<T, E>;

#[derive(Clone, Debug)]
pub(crate) struct HttpClient {
    inner: reqwest::Client,
}

impl HttpClient {
    pub(crate) fn new(timeout: Duration) -> Result<Self> {
        Ok(Self {
            inner: reqwest::ClientBuilder::new()
                .user_agent(headers::USER_AGENT_VALUE)
                .timeout(timeout)
                .default_headers(HeaderMap::from_iter([(
                    CONTENT_TYPE,
                    HeaderValue::from_static(headers::JSON_CONTENT_TYPE),
                )]))
                .build()?,
        })
    }

    pub(crate) fn post(&self, url: Url) -> reqwest::RequestBuilder {
        self.inner.post(url)
    }
}

/// `Basic base64("x:{ingestion key}")`
pub(crate) fn basic_authorization(ingestion_key: &str) -> String {
    let credentials = format!("{}:{ingestion_key}", headers::BASIC_AUTH_USER);
    format!("Basic {}", BASE64_STANDARD.encode(credentials))
}

pub(crate) fn gzip(raw: &[u8]) -> io::Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::with_capacity(raw.len() / 4), Compression::default());
    encoder.write_all(raw)?;
    encoder.finish()
}

pub(crate) fn now_millis() -> i64 {
    jiff::Timestamp::now().as_millisecond()
}
