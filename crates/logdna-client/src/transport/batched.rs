use super::TransportError;
use crate::{
    config::{RuntimeConfig, Session},
    guard::{Gates, Operation},
    handshake::Resolver,
    http::{self, HttpClient, headers},
};
use reqwest::{
    StatusCode,
    header::{AUTHORIZATION, CONNECTION, CONTENT_ENCODING},
};
use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};
use tracing::Instrument;
use url::Url;

/// Stateless transport posting gzip-compressed batches over HTTP.
#[derive(Clone, Debug)]
pub struct BatchedTransport {
    http: HttpClient,
    config: Arc<RuntimeConfig>,
    resolver: Resolver,
    gates: Arc<Gates>,
    active: Arc<AtomicBool>,
}

impl BatchedTransport {
    pub(crate) fn new(
        http: HttpClient,
        config: Arc<RuntimeConfig>,
        resolver: Resolver,
        gates: Arc<Gates>,
    ) -> Self {
        Self {
            http,
            config,
            resolver,
            gates,
            active: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Mark the transport usable, resolving the session first if needed.
    pub async fn connect(&self) {
        if !self.config.is_resolved() {
            self.reconnect().await;
        }
        self.active.store(true, Ordering::Release);
    }

    /// Stop accepting flushes.
    pub fn disconnect(&self) {
        self.active.store(false, Ordering::Release);
    }

    /// Whether the transport has been connected and not disconnected since.
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// Re-run the handshake to refresh the token and server.
    ///
    /// Skipped when a re-authentication is already running.
    pub async fn reconnect(&self) {
        let Some(_guard) = self.gates.enter(Operation::Reconnect) else {
            return;
        };
        tracing::debug!("re-authenticating");
        if let Err(e) = self.resolver.resolve().await {
            self.config
                .diagnostics
                .error("re-authentication failed", &e);
        }
    }

    /// Post one batch envelope.
    ///
    /// Transient server errors (408, 502, 503, 504) are retried with the same
    /// request after the retry timeout, up to the configured retry cap. A 401
    /// re-authenticates and reports failure without resending.
    pub async fn send(&self, message: &str) -> bool {
        match self
            .try_send(message)
            .instrument(tracing::trace_span!("send_batch"))
            .await
        {
            Ok(()) => true,
            Err(e) => {
                self.config.diagnostics.error("failed to send batch", &e);
                false
            }
        }
    }

    async fn try_send(&self, message: &str) -> Result<(), TransportError> {
        let Some(session) = self.config.session().filter(|s| !s.server.is_empty()) else {
            self.reconnect().await;
            return Err(TransportError::Unresolved);
        };

        let url = ingest_url(&self.config, &session)?;
        let body = http::gzip(message.as_bytes())?;
        let authorization = http::basic_authorization(&self.config.ingestion_key);

        let mut retries = 0u32;
        loop {
            let res = self
                .http
                .post(url.clone())
                .header(AUTHORIZATION, authorization.as_str())
                .header(CONTENT_ENCODING, headers::GZIP_ENCODING)
                .header(CONNECTION, headers::CONNECTION_KEEP_ALIVE)
                .header(headers::KEEP_ALIVE_HEADER, headers::KEEP_ALIVE_VALUE)
                .body(body.clone())
                .send()
                .await?;

            let status = res.status();
            tracing::trace!(%status, "ingest responded");
            if status.is_success() {
                return Ok(());
            }

            if is_transient(status) && retries < self.config.max_send_retries {
                retries += 1;
                tracing::debug!(%status, retries, "transient ingest error, retrying");
                tokio::time::sleep(self.config.retry_timeout).await;
                continue;
            }

            if status == StatusCode::UNAUTHORIZED {
                self.reconnect().await;
            }
            return Err(TransportError::Status(status.as_u16()));
        }
    }
}

fn is_transient(status: StatusCode) -> bool {
    matches!(
        status,
        StatusCode::REQUEST_TIMEOUT
            | StatusCode::BAD_GATEWAY
            | StatusCode::SERVICE_UNAVAILABLE
            | StatusCode::GATEWAY_TIMEOUT
    )
}

pub(crate) fn ingest_url(config: &RuntimeConfig, session: &Session) -> Result<Url, url::ParseError> {
    let mut url = Url::parse(&format!(
        "{}://{}:{}/logs/agent",
        session.http_scheme(),
        session.server,
        session.port
    ))?;
    url.query_pairs_mut()
        .append_pair("timestamp", &http::now_millis().to_string())
        .append_pair("hostname", config.hostname())
        .append_pair("mac", "")
        .append_pair("ip", "")
        .append_pair("tags", &config.joined_tags().unwrap_or_default())
        .append_pair("compress", "1");
    Ok(url)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TransportKind;
    use mockito::{Matcher, Server, ServerGuard};
    use std::time::Duration;

    fn transport_for(ingest: &ServerGuard, auth: &str) -> BatchedTransport {
        let mut config = RuntimeConfig::new("KEY".into(), TransportKind::Batched);
        config.auth_endpoint = auth.parse().unwrap();
        config.auth_fail_delay = Duration::from_millis(1);
        config.max_auth_attempts = 1;
        config.retry_timeout = Duration::from_millis(20);
        config.max_send_retries = 2;
        config.hostname = "test-host".into();
        config.tags = vec!["web".into()];
        let config = Arc::new(config);

        let addr = ingest.socket_address();
        config.set_session(Session {
            token: "tok".into(),
            server: addr.ip().to_string(),
            port: addr.port(),
            ssl: false,
        });

        let gates = Arc::new(Gates::new());
        let http = HttpClient::new(Duration::from_secs(5)).unwrap();
        let resolver = Resolver::new(http.clone(), config.clone(), gates.clone());
        BatchedTransport::new(http, config, resolver, gates)
    }

    #[tokio::test]
    async fn posts_compressed_batch_with_basic_auth() {
        let mut ingest = Server::new_async().await;
        let mock = ingest
            .mock("POST", "/logs/agent")
            .match_header("authorization", "Basic eDpLRVk=")
            .match_header("content-encoding", "gzip")
            .match_header("content-type", "application/json")
            .match_header("connection", "keep-alive")
            .match_header("keep-alive", "60000")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("hostname".into(), "test-host".into()),
                Matcher::UrlEncoded("tags".into(), "web".into()),
                Matcher::UrlEncoded("compress".into(), "1".into()),
                Matcher::UrlEncoded("mac".into(), "".into()),
            ]))
            .with_status(200)
            .create_async()
            .await;

        let transport = transport_for(&ingest, "http://127.0.0.1:9");
        assert!(transport.send(r#"{"e":"ls","ls":[]}"#).await);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn service_unavailable_is_retried() {
        let mut ingest = Server::new_async().await;
        let unavailable = ingest
            .mock("POST", "/logs/agent")
            .match_query(Matcher::Any)
            .with_status(503)
            .expect(1)
            .create_async()
            .await;
        let accepted = ingest
            .mock("POST", "/logs/agent")
            .match_query(Matcher::Any)
            .with_status(200)
            .expect(1)
            .create_async()
            .await;

        let transport = transport_for(&ingest, "http://127.0.0.1:9");
        assert!(transport.send("{}").await);
        unavailable.assert_async().await;
        accepted.assert_async().await;
    }

    #[tokio::test]
    async fn transient_retries_are_capped() {
        let mut ingest = Server::new_async().await;
        let mock = ingest
            .mock("POST", "/logs/agent")
            .match_query(Matcher::Any)
            .with_status(504)
            .expect(3)
            .create_async()
            .await;

        let transport = transport_for(&ingest, "http://127.0.0.1:9");
        assert!(!transport.send("{}").await);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn unauthorized_reauthenticates_without_resending() {
        let mut ingest = Server::new_async().await;
        let mut auth = Server::new_async().await;
        let rejected = ingest
            .mock("POST", "/logs/agent")
            .match_query(Matcher::Any)
            .with_status(401)
            .expect(1)
            .create_async()
            .await;
        let handshake = auth
            .mock("POST", "/authenticate/KEY")
            .with_status(200)
            .with_body(r#"{"token":"fresh","server":"logs.example.com","port":443,"ssl":true}"#)
            .expect(1)
            .create_async()
            .await;

        let transport = transport_for(&ingest, &auth.url());
        assert!(!transport.send("{}").await);

        rejected.assert_async().await;
        handshake.assert_async().await;
        let session = transport.config.session().unwrap();
        assert_eq!(session.token, "fresh");
        assert_eq!(session.server, "logs.example.com");
    }

    #[test]
    fn ingest_url_shape() {
        let mut config = RuntimeConfig::new("KEY".into(), TransportKind::Batched);
        config.hostname = "box".into();
        let session = Session {
            token: String::new(),
            server: "logs.example.com".into(),
            port: 443,
            ssl: true,
        };
        let url = ingest_url(&config, &session).unwrap();
        assert_eq!(url.scheme(), "https");
        assert_eq!(url.path(), "/logs/agent");
        let keys: Vec<_> = url.query_pairs().map(|(k, _)| k.into_owned()).collect();
        assert_eq!(keys, ["timestamp", "hostname", "mac", "ip", "tags", "compress"]);
        assert!(url.query().unwrap().ends_with("&hostname=box&mac=&ip=&tags=&compress=1"));
    }
}
