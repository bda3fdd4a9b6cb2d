//! # samsara-core
//!
//! Client library for buffering application events and publishing them in
//! batches to a Samsara ingestion endpoint.
//!
//! This library provides:
//! - A bounded, thread-safe event buffer with monotonic sequence ids
//! - A periodic flush scheduler running on its own thread
//! - Event validation and enrichment
//! - Pluggable payload compression and HTTP transport
//! - Configuration management and logging infrastructure
//!
//! ## Architecture
//!
//! ```text
//! record_event ──► enrich + validate ──► EventBuffer
//!                                            │ (scheduler tick, size >= min_buffer_size)
//!                                            ▼
//!                          snapshot + mark ──► compress ──► Transport (POST /v1/events)
//!                                            │
//!                         success: drop_through(mark)   failure: keep for next tick
//! ```
//!
//! Producers never block on the network and never see back-pressure: when
//! the buffer is full the oldest event is dropped.
//!
//! ## Example
//!
//! ```rust,no_run
//! use samsara_core::{Client, ClientConfig, Event};
//!
//! let config = ClientConfig {
//!     source_id: Some("checkout-service".to_string()),
//!     ..ClientConfig::new("http://samsara-ingestion.local:9000")
//! };
//! let client = Client::new(config).expect("invalid configuration");
//!
//! client
//!     .record_event(&Event::new("order_placed").with("order_id", 42))
//!     .expect("invalid event");
//! ```

// Re-export commonly used items at the crate root
pub use buffer::{BufferedEvent, EventBuffer, Snapshot};
pub use client::{Client, ClientBuilder, FlushOutcome, PublishStats};
pub use compression::{Compressor, CompressorRegistry};
pub use config::{ClientConfig, Config};
pub use error::{Error, Result};
pub use event::Event;
pub use layer::EventLayer;
pub use transport::{HttpTransport, PublishRequest, Transport};

// Public modules
pub mod buffer;
pub mod client;
pub mod compression;
pub mod config;
pub mod error;
pub mod event;
pub mod layer;
pub mod logging;
pub mod publisher;
pub mod scheduler;
pub mod transport;
