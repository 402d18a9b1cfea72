use crate::{
    event::{DefaultEvent, RecordEvent},
    format::Format,
};
use compact_str::CompactString;
use logdna_client::{LogClient, LogLine};
use std::marker::PhantomData;
use tracing::{Event, Subscriber};
use tracing_subscriber::layer::{self, Context};

/// Targets whose events are never shipped: the client itself and the
/// network stack it runs on.
const DEFAULT_IGNORED_TARGETS: &[&str] = &[
    "logdna_client",
    "reqwest",
    "hyper",
    "hyper_util",
    "h2",
    "rustls",
    "tokio_tungstenite",
    "tungstenite",
];

/// A [`Layer`] that turns events into [`LogLine`]s for a [`LogClient`].
///
/// [`Layer`]: tracing_subscriber::layer::Layer
pub struct Layer<S, E = DefaultEvent> {
    client: LogClient,
    format: Format,
    record_event: E,
    app: Option<CompactString>,
    ignored_targets: Vec<CompactString>,
    _inner: PhantomData<fn(S)>,
}

impl<S> Layer<S> {
    /// Returns a new [`Layer`] with the default configuration.
    pub fn new(client: LogClient) -> Self {
        Self {
            client,
            format: Format::default(),
            record_event: DefaultEvent::default(),
            app: None,
            ignored_targets: DEFAULT_IGNORED_TARGETS
                .iter()
                .copied()
                .map(CompactString::const_new)
                .collect(),
            _inner: PhantomData,
        }
    }
}

impl<S, E> Layer<S, E> {
    /// Sets the event recorder for the layer.
    pub fn record_event<E2>(self, record_event: E2) -> Layer<S, E2>
    where
        E2: RecordEvent + 'static,
    {
        Layer {
            client: self.client,
            format: self.format,
            record_event,
            app: self.app,
            ignored_targets: self.ignored_targets,
            _inner: PhantomData,
        }
    }

    /// Sets the event format.
    pub fn with_format(self, format: Format) -> Self {
        Self { format, ..self }
    }

    /// Use `app` as the source of every line instead of the event target.
    pub fn with_app(self, app: impl Into<CompactString>) -> Self {
        Self {
            app: Some(app.into()),
            ..self
        }
    }

    /// Drop events whose target starts with `prefix`.
    pub fn ignore_target(mut self, prefix: impl Into<CompactString>) -> Self {
        self.ignored_targets.push(prefix.into());
        self
    }

    fn is_ignored(&self, target: &str) -> bool {
        self.ignored_targets.iter().any(|prefix| {
            target
                .strip_prefix(prefix.as_str())
                .is_some_and(|rest| rest.is_empty() || rest.starts_with("::"))
        })
    }
}

impl<S, E> layer::Layer<S> for Layer<S, E>
where
    S: Subscriber,
    E: RecordEvent + 'static,
{
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let target = event.metadata().target();
        if self.is_ignored(target) {
            return;
        }

        let mut content = String::new();
        if self
            .record_event
            .record_event(event, &self.format, &mut content)
            .is_err()
        {
            return;
        }

        let source = match &self.app {
            Some(app) => app.clone(),
            None => CompactString::from(target),
        };
        self.client.add_line(LogLine::new(source, content));
    }
}

/// Returns a new [logdna layer] that can be [composed] with other layers to
/// construct a [`Subscriber`].
///
/// This is a shorthand for the equivalent [`Layer::new`] function.
///
/// [logdna layer]: Layer
/// [composed]: tracing_subscriber::layer
pub fn layer<S>(client: LogClient) -> Layer<S> {
    Layer::new(client)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_subscriber::{layer::SubscriberExt, registry};

    fn client() -> LogClient {
        LogClient::builder("KEY").hostname("test-host").build().unwrap()
    }

    #[test]
    fn events_become_pending_lines() {
        let client = client();
        let subscriber = registry().with(layer(client.clone()).with_app("shop"));
        tracing::subscriber::with_default(subscriber, || {
            tracing::info!(target: "shop::cart", "added item");
            tracing::warn!("from the test module");
        });
        assert_eq!(client.pending(), 2);
    }

    #[test]
    fn own_and_network_events_are_ignored() {
        let client = client();
        let subscriber = registry().with(layer(client.clone()).ignore_target("noisy"));
        tracing::subscriber::with_default(subscriber, || {
            tracing::debug!(target: "logdna_client::transport", "internal");
            tracing::debug!(target: "hyper_util::client", "pool");
            tracing::debug!(target: "noisy", "ignored");
            tracing::debug!(target: "noisy_neighbour", "kept");
            tracing::debug!(target: "logdna_client_app", "kept");
        });
        assert_eq!(client.pending(), 2);
    }

    #[test]
    fn prefix_matching() {
        let layer = layer::<tracing_subscriber::Registry>(client());
        assert!(layer.is_ignored("logdna_client"));
        assert!(layer.is_ignored("logdna_client::buffer"));
        assert!(layer.is_ignored("h2::codec"));
        assert!(!layer.is_ignored("h2o"));
        assert!(!layer.is_ignored("app"));
    }
}
