//! Authenticate-and-redirect handshake that resolves an ingestion key into a session.
use crate::{
    config::{RuntimeConfig, Session, TransportKind},
    guard::{Gates, Operation},
    http::{HttpClient, headers},
};
use serde::{Deserialize, Deserializer, Serialize};
use std::sync::Arc;
use tracing::Instrument;
use url::Url;

const MAX_REDIRECTS: u32 = 3;

/// Handshake error.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum HandshakeError {
    /// Every allowed attempt failed; the client stays unresolved.
    #[error("authentication failed after {attempts} attempts")]
    Exhausted {
        /// Number of failed attempts.
        attempts: u32,
    },
    /// Another task is already authenticating this client.
    #[error("authentication already in progress")]
    InProgress,
    /// The authenticate endpoint could not be turned into a URL.
    #[error("invalid authenticate endpoint: {0}")]
    InvalidEndpoint(String),
    /// Non-successful HTTP response.
    #[error("authenticate returned http {0}")]
    Status(u16),
    /// Transport level failure.
    #[error("authenticate request failed: {0}")]
    Http(#[from] reqwest::Error),
    /// The request or response body was not the expected JSON.
    #[error("invalid authenticate payload: {0}")]
    Decode(#[from] serde_json::Error),
}

#[derive(Debug, Serialize)]
struct HandshakeRequest<'a> {
    tags: Option<String>,
    hostname: &'a str,
    mac: Option<&'a str>,
    ip: Option<&'a str>,
    agentname: &'static str,
    agentversion: &'static str,
    osdist: &'static str,
    awsid: Option<&'a str>,
    awsregion: Option<&'a str>,
    awsaz: Option<&'a str>,
    awsami: Option<&'a str>,
    awstype: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    transport: Option<&'static str>,
}

#[derive(Debug, Deserialize)]
struct HandshakeResponse {
    #[serde(default)]
    token: String,
    #[serde(default)]
    server: String,
    #[serde(default, deserialize_with = "lenient_port")]
    port: u16,
    #[serde(default, deserialize_with = "lenient_bool")]
    ssl: bool,
    #[serde(default)]
    apiserver: Option<String>,
    #[serde(default)]
    transport: Option<String>,
}

/// Resolves the ingestion endpoint for one client.
#[derive(Clone, Debug)]
pub struct Resolver {
    http: HttpClient,
    config: Arc<RuntimeConfig>,
    gates: Arc<Gates>,
}

impl Resolver {
    pub(crate) fn new(http: HttpClient, config: Arc<RuntimeConfig>, gates: Arc<Gates>) -> Self {
        Self {
            http,
            config,
            gates,
        }
    }

    /// Run the handshake and store the resulting session in the runtime config.
    ///
    /// Failed attempts are retried after the auth-fail delay until the attempt
    /// budget runs out. Redirects to a regional api server do not count as
    /// attempts. When the response names a transport it becomes the selected one.
    pub async fn resolve(&self) -> Result<Session, HandshakeError> {
        let _guard = self
            .gates
            .enter(Operation::Authenticate)
            .ok_or(HandshakeError::InProgress)?;

        self.resolve_inner()
            .instrument(tracing::debug_span!("handshake"))
            .await
    }

    async fn resolve_inner(&self) -> Result<Session, HandshakeError> {
        let config = &self.config;
        let endpoint = &config.auth_endpoint;
        let scheme = endpoint.scheme_str().unwrap_or("https").to_string();
        let mut authority = endpoint
            .authority()
            .map(|authority| authority.as_str().to_string())
            .ok_or_else(|| HandshakeError::InvalidEndpoint(endpoint.to_string()))?;

        let body = serde_json::to_vec(&self.request())?;
        let mut attempts = 0u32;
        let mut redirects = 0u32;

        loop {
            let url = authenticate_url(&scheme, &authority, &config.ingestion_key)?;
            tracing::debug!(%authority, "authenticating");

            let response = match self.authenticate_once(url, &body).await {
                Ok(response) => response,
                Err(e) => {
                    attempts += 1;
                    config
                        .diagnostics
                        .error("authentication failed, retrying after a delay", &e);
                    if attempts >= config.max_auth_attempts {
                        return Err(HandshakeError::Exhausted { attempts });
                    }
                    tokio::time::sleep(config.auth_fail_delay).await;
                    continue;
                }
            };

            if let Some(apiserver) = response.apiserver.as_deref() {
                if response.ssl
                    && !is_same_host(apiserver, &authority)
                    && redirects < MAX_REDIRECTS
                {
                    tracing::debug!(%apiserver, "redirected to regional api server");
                    authority = apiserver.to_string();
                    redirects += 1;
                    continue;
                }
            }

            return Ok(self.apply(response));
        }
    }

    async fn authenticate_once(
        &self,
        url: Url,
        body: &[u8],
    ) -> Result<HandshakeResponse, HandshakeError> {
        let res = self.http.post(url).body(body.to_vec()).send().await?;
        let status = res.status();
        if !status.is_success() {
            return Err(HandshakeError::Status(status.as_u16()));
        }
        let bytes = res.bytes().await?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    fn request(&self) -> HandshakeRequest<'_> {
        HandshakeRequest {
            tags: self.config.joined_tags(),
            hostname: &self.config.hostname,
            mac: None,
            ip: None,
            agentname: headers::AGENT_NAME,
            agentversion: headers::AGENT_VERSION,
            osdist: std::env::consts::OS,
            awsid: None,
            awsregion: None,
            awsaz: None,
            awsami: None,
            awstype: None,
            transport: Some(self.config.transport().as_hint()),
        }
    }

    fn apply(&self, response: HandshakeResponse) -> Session {
        let session = Session {
            token: response.token,
            server: response.server,
            port: response.port,
            ssl: response.ssl,
        };

        if let Some(hint) = response.transport.as_deref() {
            match TransportKind::from_hint(hint) {
                Some(kind) => self.config.set_transport(kind),
                None => tracing::warn!(%hint, "ignoring unknown transport hint"),
            }
        }

        tracing::debug!(
            server = %session.server,
            port = session.port,
            ssl = session.ssl,
            transport = %self.config.transport(),
            "session resolved"
        );
        self.config.set_session(session.clone());
        session
    }
}

fn authenticate_url(scheme: &str, authority: &str, key: &str) -> Result<Url, HandshakeError> {
    let invalid = || HandshakeError::InvalidEndpoint(format!("{scheme}://{authority}"));
    let mut url = Url::parse(&format!("{scheme}://{authority}")).map_err(|_| invalid())?;
    url.path_segments_mut()
        .map_err(|_| invalid())?
        .pop_if_empty()
        .extend(["authenticate", key]);
    Ok(url)
}

fn is_same_host(apiserver: &str, authority: &str) -> bool {
    let host = authority.split(':').next().unwrap_or(authority);
    apiserver == authority || apiserver == host
}

fn lenient_bool<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Lenient {
        Bool(bool),
        Str(String),
    }

    match Lenient::deserialize(deserializer)? {
        Lenient::Bool(value) => Ok(value),
        Lenient::Str(value) if value.eq_ignore_ascii_case("true") => Ok(true),
        Lenient::Str(value) if value.eq_ignore_ascii_case("false") => Ok(false),
        Lenient::Str(value) => Err(serde::de::Error::custom(format_args!(
            "invalid boolean `{value}`"
        ))),
    }
}

fn lenient_port<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u16, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Lenient {
        Num(u16),
        Str(String),
    }

    match Lenient::deserialize(deserializer)? {
        Lenient::Num(port) => Ok(port),
        Lenient::Str(port) => port.parse().map_err(serde::de::Error::custom),
    }
}
