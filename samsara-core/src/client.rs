//! Buffering client for the Samsara ingestion API
//!
//! Producers call [`Client::record_event`], which only enriches, validates and
//! buffers. A background [`FlushScheduler`] periodically calls
//! [`Client::flush_if_ready`]; a flush snapshots the buffer, sends it without
//! holding the buffer lock, and on success drops exactly the snapshotted
//! prefix. A failed flush leaves the buffer as it was, so the same events are
//! retried on the next tick.

use std::sync::{Arc, Mutex, PoisonError};

use crate::buffer::EventBuffer;
use crate::compression::CompressorRegistry;
use crate::config::ClientConfig;
use crate::error::{Error, Result};
use crate::event::{now_millis, validate_event, validate_events, Event};
use crate::publisher::Publisher;
use crate::scheduler::FlushScheduler;
use crate::transport::{HttpTransport, Transport};

/// Result of one flush attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlushOutcome {
    /// Fewer than `min_buffer_size` events were buffered
    NotReady { buffered: usize },
    /// Nothing to send
    Empty,
    /// The batch was accepted and dropped from the buffer
    Published { events: usize },
    /// The batch was not accepted and stays buffered
    Failed { events: usize, error: String },
}

impl FlushOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, FlushOutcome::Published { .. })
    }
}

/// Publishing statistics
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PublishStats {
    /// Flushes that actually sent a batch
    pub flushes_attempted: u64,
    pub flushes_succeeded: u64,
    pub flushes_failed: u64,
    /// Total events in accepted batches
    pub events_published: u64,
    /// Events lost to buffer overflow
    pub events_evicted: u64,
    /// Outcome of the most recent batch send
    pub last_flush: Option<FlushOutcome>,
}

/// State shared between producers and the scheduler thread
struct Shared {
    config: ClientConfig,
    buffer: EventBuffer,
    publisher: Publisher,
    /// Serializes flush attempts; never taken by producers
    flush_lock: tokio::sync::Mutex<()>,
    stats: Mutex<PublishStats>,
}

impl Shared {
    fn is_ready(&self) -> bool {
        self.buffer.len() >= self.config.min_buffer_size
    }

    async fn flush_if_ready(&self) -> FlushOutcome {
        let buffered = self.buffer.len();
        if buffered < self.config.min_buffer_size {
            tracing::trace!(
                buffered,
                min_buffer_size = self.config.min_buffer_size,
                "Buffer not ready"
            );
            return FlushOutcome::NotReady { buffered };
        }
        self.flush().await
    }

    async fn flush(&self) -> FlushOutcome {
        let _flushing = self.flush_lock.lock().await;

        let snapshot = self.buffer.snapshot();
        let Some(mark) = snapshot.mark else {
            return FlushOutcome::Empty;
        };
        let events = snapshot.len();

        let outcome = match self.publisher.post(&snapshot.payload()).await {
            Ok(()) => {
                let dropped = self.buffer.drop_through(mark);
                tracing::debug!(
                    events,
                    dropped,
                    remaining = self.buffer.len(),
                    "Published buffered events"
                );
                FlushOutcome::Published { events }
            }
            Err(e) => {
                tracing::warn!(
                    events,
                    error = %e,
                    "Failed to publish buffered events, keeping them for the next attempt"
                );
                FlushOutcome::Failed {
                    events,
                    error: e.to_string(),
                }
            }
        };

        self.record_outcome(&outcome);
        outcome
    }

    fn record_outcome(&self, outcome: &FlushOutcome) {
        let mut stats = self.stats.lock().unwrap_or_else(PoisonError::into_inner);
        match outcome {
            FlushOutcome::Published { events } => {
                stats.flushes_succeeded += 1;
                stats.events_published += *events as u64;
            }
            FlushOutcome::Failed { .. } => stats.flushes_failed += 1,
            FlushOutcome::NotReady { .. } | FlushOutcome::Empty => return,
        }
        stats.flushes_attempted += 1;
        stats.last_flush = Some(outcome.clone());
    }
}

/// Client for recording events and publishing them in batches
///
/// Two states: idle (no scheduler) and publishing (scheduler running),
/// switched with [`start_consuming`](Self::start_consuming) and
/// [`stop_consuming`](Self::stop_consuming). Dropping the client stops
/// the scheduler; events still buffered at that point are lost.
pub struct Client {
    shared: Arc<Shared>,
    scheduler: FlushScheduler,
}

impl Client {
    /// Create a client sending over HTTP with the default codecs
    ///
    /// Starts publishing right away when `start_publishing_thread` is set.
    pub fn new(config: ClientConfig) -> Result<Self> {
        Self::builder(config).build()
    }

    pub fn builder(config: ClientConfig) -> ClientBuilder {
        ClientBuilder {
            config,
            transport: None,
            compressors: CompressorRegistry::default(),
        }
    }

    /// Fill in default `sourceId` and current `timestamp` where absent
    pub fn enrich(&self, event: &Event) -> Event {
        event.enriched(self.shared.config.source_id.as_deref(), now_millis())
    }

    /// Enrich, validate and buffer an event. Never touches the network.
    pub fn record_event(&self, event: &Event) -> Result<()> {
        let event = self.enrich(event);
        validate_event(&event)?;
        self.shared.buffer.enqueue(event);
        Ok(())
    }

    /// Flush when at least `min_buffer_size` events are buffered
    pub async fn flush_if_ready(&self) -> FlushOutcome {
        self.shared.flush_if_ready().await
    }

    /// Attempt to publish everything currently buffered, regardless of
    /// `min_buffer_size`
    pub async fn flush(&self) -> FlushOutcome {
        self.shared.flush().await
    }

    /// Validate and send a batch immediately, bypassing the buffer
    ///
    /// Events are sent as given; use [`enrich`](Self::enrich) first to fill
    /// in defaults.
    pub async fn publish_events(&self, events: &[Event]) -> Result<()> {
        validate_events(events)?;
        let batch: Vec<&Event> = events.iter().collect();
        match self.shared.publisher.post(&batch).await {
            Ok(()) => {
                tracing::debug!(events = batch.len(), "Published events");
                Ok(())
            }
            Err(e) => {
                tracing::warn!(events = batch.len(), error = %e, "Failed to publish events");
                Err(e)
            }
        }
    }

    /// Start (or restart) the periodic publishing task
    pub fn start_consuming(&self) -> Result<()> {
        let shared = Arc::clone(&self.shared);
        self.scheduler
            .start(self.shared.config.publish_interval(), move || {
                let shared = Arc::clone(&shared);
                async move {
                    shared.flush_if_ready().await;
                }
            })?;
        tracing::info!(
            interval_ms = self.shared.config.publish_interval_ms,
            endpoint = %self.shared.publisher.endpoint(),
            "Started publishing"
        );
        Ok(())
    }

    /// Stop the periodic publishing task. Idempotent.
    pub fn stop_consuming(&self) {
        self.scheduler.stop();
    }

    pub fn is_publishing(&self) -> bool {
        self.scheduler.is_running()
    }

    /// Whether a scheduled flush would send right now
    pub fn is_ready(&self) -> bool {
        self.shared.is_ready()
    }

    pub fn buffer(&self) -> &EventBuffer {
        &self.shared.buffer
    }

    /// Normalized configuration in effect
    pub fn config(&self) -> &ClientConfig {
        &self.shared.config
    }

    pub fn stats(&self) -> PublishStats {
        let mut stats = self
            .shared
            .stats
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        stats.events_evicted = self.shared.buffer.evicted();
        stats
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("publisher", &self.shared.publisher)
            .field("buffer", &self.shared.buffer)
            .field("scheduler", &self.scheduler)
            .finish()
    }
}

/// Builder for [`Client`] with injectable transport and codecs
pub struct ClientBuilder {
    config: ClientConfig,
    transport: Option<Arc<dyn Transport>>,
    compressors: CompressorRegistry,
}

impl ClientBuilder {
    /// Use a custom transport instead of HTTP
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Use a custom compressor registry
    pub fn compressors(mut self, compressors: CompressorRegistry) -> Self {
        self.compressors = compressors;
        self
    }

    pub fn build(self) -> Result<Client> {
        let config = self.config.validate(&self.compressors)?;
        let compressor = self.compressors.get(&config.compression)?;
        let endpoint = config.endpoint().ok_or_else(|| {
            Error::InvalidConfiguration("url of the ingestion API is required".to_string())
        })?;
        let transport = match self.transport {
            Some(transport) => transport,
            None => Arc::new(HttpTransport::new()?),
        };

        let publisher = Publisher::new(endpoint, compressor, transport, config.send_timeout());
        let shared = Arc::new(Shared {
            buffer: EventBuffer::new(config.max_buffer_size),
            publisher,
            flush_lock: tokio::sync::Mutex::new(()),
            stats: Mutex::new(PublishStats::default()),
            config,
        });

        let client = Client {
            shared,
            scheduler: FlushScheduler::new(),
        };

        tracing::debug!(
            endpoint = %client.shared.publisher.endpoint(),
            compression = %client.shared.config.compression,
            max_buffer_size = client.shared.config.max_buffer_size,
            min_buffer_size = client.shared.config.min_buffer_size,
            "Client created"
        );

        if client.shared.config.start_publishing_thread {
            client.start_consuming()?;
        }
        Ok(client)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{SOURCE_ID, TIMESTAMP};
    use crate::transport::PublishRequest;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use tokio::sync::Notify;

    struct StubTransport {
        succeed: AtomicBool,
        calls: AtomicUsize,
    }

    impl StubTransport {
        fn new(succeed: bool) -> Arc<Self> {
            Arc::new(Self {
                succeed: AtomicBool::new(succeed),
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl Transport for StubTransport {
        async fn send(&self, _request: PublishRequest) -> Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.succeed.load(Ordering::SeqCst) {
                Ok(())
            } else {
                Err(Error::Rejected {
                    status: 503,
                    body: "unavailable".to_string(),
                })
            }
        }
    }

    /// Holds every send until released
    #[derive(Default)]
    struct GatedTransport {
        entered: Notify,
        release: Notify,
    }

    #[async_trait]
    impl Transport for GatedTransport {
        async fn send(&self, _request: PublishRequest) -> Result<()> {
            self.entered.notify_one();
            self.release.notified().await;
            Ok(())
        }
    }

    fn config() -> ClientConfig {
        ClientConfig {
            source_id: Some("svc-test".to_string()),
            start_publishing_thread: false,
            min_buffer_size: 3,
            max_buffer_size: 100,
            ..ClientConfig::new("http://ingestion.local")
        }
    }

    fn client_with(config: ClientConfig, transport: Arc<dyn Transport>) -> Client {
        Client::builder(config).transport(transport).build().unwrap()
    }

    fn event(n: u64) -> Event {
        Event::new("clicked").with("n", n)
    }

    #[test]
    fn test_invalid_configuration() {
        let err = Client::builder(ClientConfig::default())
            .transport(StubTransport::new(true))
            .build()
            .unwrap_err();
        assert!(matches!(err, Error::InvalidConfiguration(_)));

        let config = ClientConfig {
            compression: "lz4".to_string(),
            ..config()
        };
        assert!(matches!(
            Client::builder(config)
                .transport(StubTransport::new(true))
                .build(),
            Err(Error::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn test_initial_state_follows_config() {
        let client = client_with(config(), StubTransport::new(true));
        assert!(!client.is_publishing());

        let client = client_with(
            ClientConfig {
                start_publishing_thread: true,
                ..config()
            },
            StubTransport::new(true),
        );
        assert!(client.is_publishing());
        client.stop_consuming();
        assert!(!client.is_publishing());
        client.stop_consuming();
    }

    #[test]
    fn test_record_event_enriches_and_buffers() {
        let client = client_with(config(), StubTransport::new(true));
        client.record_event(&event(0)).unwrap();
        client
            .record_event(&event(1).with(SOURCE_ID, "explicit").with(TIMESTAMP, 5))
            .unwrap();

        let snapshot = client.buffer().snapshot();
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot.events[0].event.source_id(), Some("svc-test"));
        assert!(snapshot.events[0].event.timestamp().unwrap() > 0);
        assert_eq!(snapshot.events[1].event.source_id(), Some("explicit"));
        assert_eq!(snapshot.events[1].event.timestamp(), Some(5));
        assert!(snapshot.events[0].sequence_id < snapshot.events[1].sequence_id);
    }

    #[test]
    fn test_invalid_event_not_buffered() {
        let client = client_with(config(), StubTransport::new(true));
        client.record_event(&event(0)).unwrap();

        let nameless = Event::default().with("n", 1);
        let err = client.record_event(&nameless).unwrap_err();
        assert!(matches!(err, Error::InvalidEvent(_)));
        assert_eq!(client.buffer().len(), 1);
    }

    #[tokio::test]
    async fn test_flush_if_ready_below_threshold_is_noop() {
        let transport = StubTransport::new(true);
        let client = client_with(config(), transport.clone());
        client.record_event(&event(0)).unwrap();
        client.record_event(&event(1)).unwrap();

        assert!(!client.is_ready());
        assert_eq!(
            client.flush_if_ready().await,
            FlushOutcome::NotReady { buffered: 2 }
        );
        assert_eq!(transport.calls.load(Ordering::SeqCst), 0);
        assert_eq!(client.buffer().len(), 2);
        assert_eq!(client.stats().last_flush, None);
    }

    #[tokio::test]
    async fn test_successful_flush_empties_buffer() {
        let transport = StubTransport::new(true);
        let client = client_with(config(), transport.clone());
        for n in 0..5 {
            client.record_event(&event(n)).unwrap();
        }

        assert_eq!(
            client.flush_if_ready().await,
            FlushOutcome::Published { events: 5 }
        );
        assert!(client.buffer().is_empty());

        let stats = client.stats();
        assert_eq!(stats.flushes_succeeded, 1);
        assert_eq!(stats.events_published, 5);
        assert_eq!(stats.last_flush, Some(FlushOutcome::Published { events: 5 }));
    }

    #[tokio::test]
    async fn test_failed_flush_retains_buffer() {
        let transport = StubTransport::new(false);
        let client = client_with(config(), transport.clone());
        for n in 0..4 {
            client.record_event(&event(n)).unwrap();
        }
        let before = client.buffer().snapshot();

        let outcome = client.flush().await;
        assert!(matches!(outcome, FlushOutcome::Failed { events: 4, .. }));
        assert_eq!(client.buffer().snapshot().events, before.events);

        // the next attempt sends the same events plus new arrivals
        client.record_event(&event(4)).unwrap();
        transport.succeed.store(true, Ordering::SeqCst);
        assert_eq!(client.flush().await, FlushOutcome::Published { events: 5 });
        assert!(client.buffer().is_empty());

        let stats = client.stats();
        assert_eq!(stats.flushes_attempted, 2);
        assert_eq!(stats.flushes_failed, 1);
        assert_eq!(stats.flushes_succeeded, 1);
    }

    #[tokio::test]
    async fn test_flush_of_empty_buffer() {
        let transport = StubTransport::new(true);
        let client = client_with(config(), transport.clone());
        assert_eq!(client.flush().await, FlushOutcome::Empty);
        assert_eq!(transport.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_events_recorded_during_flush_survive() {
        let transport = Arc::new(GatedTransport::default());
        let client = Arc::new(client_with(config(), transport.clone()));
        for n in 0..3 {
            client.record_event(&event(n)).unwrap();
        }

        let flushing = tokio::spawn({
            let client = Arc::clone(&client);
            async move { client.flush().await }
        });

        transport.entered.notified().await;
        client.record_event(&event(3)).unwrap();
        client.record_event(&event(4)).unwrap();
        transport.release.notify_one();

        assert_eq!(flushing.await.unwrap(), FlushOutcome::Published { events: 3 });
        let remaining: Vec<_> = client
            .buffer()
            .snapshot()
            .events
            .iter()
            .map(|b| b.event.get("n").and_then(|v| v.as_u64()).unwrap())
            .collect();
        assert_eq!(remaining, vec![3, 4]);
    }

    #[tokio::test]
    async fn test_publish_events_bypasses_buffer() {
        let transport = StubTransport::new(true);
        let client = client_with(config(), transport.clone());
        client.record_event(&event(0)).unwrap();

        let batch = vec![client.enrich(&event(10)), client.enrich(&event(11))];
        client.publish_events(&batch).await.unwrap();
        assert_eq!(transport.calls.load(Ordering::SeqCst), 1);
        assert_eq!(client.buffer().len(), 1);

        transport.succeed.store(false, Ordering::SeqCst);
        assert!(matches!(
            client.publish_events(&batch).await,
            Err(Error::Rejected { status: 503, .. })
        ));
    }

    #[tokio::test]
    async fn test_publish_events_validates_first() {
        let transport = StubTransport::new(true);
        let client = client_with(config(), transport.clone());

        let err = client.publish_events(&[event(0)]).await.unwrap_err();
        assert!(matches!(err, Error::InvalidEvent(_)));
        assert_eq!(transport.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_stats_report_evictions() {
        let client = client_with(
            ClientConfig {
                max_buffer_size: 2,
                min_buffer_size: 1,
                ..config()
            },
            StubTransport::new(true),
        );
        for n in 0..5 {
            client.record_event(&event(n)).unwrap();
        }
        assert_eq!(client.buffer().len(), 2);
        assert_eq!(client.stats().events_evicted, 3);
    }
}
