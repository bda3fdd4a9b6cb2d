//! Forward `tracing` events into a [`Client`]
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use samsara_core::{Client, ClientConfig, EventLayer};
//! use tracing_subscriber::layer::SubscriberExt;
//! use tracing_subscriber::util::SubscriberInitExt;
//!
//! let client = Arc::new(Client::new(ClientConfig::new("http://ingestion.local:9000")).unwrap());
//! tracing_subscriber::registry()
//!     .with(EventLayer::new(client))
//!     .init();
//!
//! tracing::warn!(order_id = 42, "payment declined");
//! ```
//!
//! The call above is buffered as
//! `{"eventName": "log", "level": "WARN", "target": ..., "message": "payment declined", "order_id": 42}`.

use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::field::{Field, Visit};
use tracing::{Level, Subscriber};
use tracing_subscriber::layer::Context;
use tracing_subscriber::Layer;

use crate::client::Client;
use crate::event::{Event, EVENT_NAME};

/// Targets whose events are never forwarded: our own diagnostics and the
/// HTTP stack used to publish them.
const IGNORED_TARGETS: &[&str] = &["samsara_core", "reqwest", "hyper", "h2", "rustls"];

/// `tracing_subscriber` layer recording each log event through a client
pub struct EventLayer {
    client: Arc<Client>,
    event_name: String,
    max_level: Level,
}

impl EventLayer {
    pub fn new(client: Arc<Client>) -> Self {
        Self {
            client,
            event_name: "log".to_string(),
            max_level: Level::INFO,
        }
    }

    /// Value used for `eventName`
    pub fn with_event_name(mut self, event_name: impl Into<String>) -> Self {
        self.event_name = event_name.into();
        self
    }

    /// Most verbose level forwarded (default INFO)
    pub fn with_max_level(mut self, level: Level) -> Self {
        self.max_level = level;
        self
    }
}

impl<S: Subscriber> Layer<S> for EventLayer {
    fn on_event(&self, event: &tracing::Event<'_>, _ctx: Context<'_, S>) {
        let metadata = event.metadata();
        if *metadata.level() > self.max_level {
            return;
        }
        let target = metadata.target();
        if IGNORED_TARGETS
            .iter()
            .any(|ignored| target == *ignored || target.starts_with(&format!("{ignored}::")))
        {
            return;
        }

        let mut visitor = FieldVisitor::default();
        event.record(&mut visitor);

        let mut fields = visitor.fields;
        fields.insert(EVENT_NAME.to_string(), Value::from(self.event_name.as_str()));
        fields.insert("level".to_string(), Value::from(metadata.level().as_str()));
        fields.insert("target".to_string(), Value::from(target));

        // a logger has nobody to report to
        let _ = self.client.record_event(&Event::from(fields));
    }
}

#[derive(Default)]
struct FieldVisitor {
    fields: Map<String, Value>,
}

impl Visit for FieldVisitor {
    fn record_f64(&mut self, field: &Field, value: f64) {
        self.fields.insert(field.name().to_string(), Value::from(value));
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.fields.insert(field.name().to_string(), Value::from(value));
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.fields.insert(field.name().to_string(), Value::from(value));
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.fields.insert(field.name().to_string(), Value::from(value));
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        self.fields.insert(field.name().to_string(), Value::from(value));
    }

    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        self.fields
            .insert(field.name().to_string(), Value::from(format!("{:?}", value)));
    }
}
