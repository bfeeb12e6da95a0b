//! # Application State Management
//!
//! Shared state handed to every HTTP handler and every WebSocket actor.
//!
//! ## What is shared, what is not:
//! - **config**: Read-only after startup
//! - **pipeline**: One set of vendor adapters for all connections
//! - **metrics**: Counters updated from any connection
//! - Per-connection session state is NOT here. Each WebSocket actor owns its
//!   own `Session`, so connections cannot observe each other.
//!
//! ## Key Rust Concepts:
//!
//! ### Arc (Atomically Reference Counted)
//! - **Purpose**: Every actix worker gets a clone of `AppState`, all clones
//!   point at the same config, pipeline and counters
//!
//! ### Atomics instead of RwLock
//! - **Purpose**: Counters are bumped from many actors at once. `AtomicU64`
//!   needs no lock, so a slow reader can never stall a connection.

use crate::config::AppConfig;
use crate::remote::{AssemblyAiTranscriber, GeminiModel, GeminiSpeech};
use crate::session::Pipeline;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub pipeline: Arc<Pipeline>,
    pub metrics: Arc<RelayMetrics>,
    /// When the server started (never changes)
    pub start_time: Instant,
}

/// Relay counters since server start.
///
/// ## Counters:
/// - **active_connections**: Open WebSockets right now
/// - **total_connections**: WebSockets ever accepted
/// - **pipelines_started / pipelines_failed**: Admitted turns and how many
///   ended in an `error` event
/// - **busy_rejections**: Turns refused because one was already in flight
/// - **images_received**: Images fully reassembled
/// - **decode_errors**: Frames that could not be parsed
#[derive(Debug, Default)]
pub struct RelayMetrics {
    active_connections: AtomicU64,
    total_connections: AtomicU64,
    pipelines_started: AtomicU64,
    pipelines_failed: AtomicU64,
    busy_rejections: AtomicU64,
    images_received: AtomicU64,
    decode_errors: AtomicU64,
}

/// Point-in-time copy of [`RelayMetrics`], safe to serialize.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct MetricsSnapshot {
    pub active_connections: u64,
    pub total_connections: u64,
    pub pipelines_started: u64,
    pub pipelines_failed: u64,
    pub busy_rejections: u64,
    pub images_received: u64,
    pub decode_errors: u64,
}

impl AppState {
    /// Build the state with the real vendor adapters.
    pub fn new(config: AppConfig) -> anyhow::Result<Self> {
        let pipeline = Pipeline::new(
            Arc::new(AssemblyAiTranscriber::new(&config.transcription)?),
            Arc::new(GeminiModel::new(&config.inference)?),
            Arc::new(GeminiSpeech::new(&config.synthesis)?),
        );
        Ok(Self::with_pipeline(config, pipeline))
    }

    /// Build the state around an already assembled pipeline.
    pub fn with_pipeline(config: AppConfig, pipeline: Pipeline) -> Self {
        Self {
            config: Arc::new(config),
            pipeline: Arc::new(pipeline),
            metrics: Arc::new(RelayMetrics::default()),
            start_time: Instant::now(),
        }
    }

    pub fn get_uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}

impl RelayMetrics {
    pub fn connection_opened(&self) {
        self.active_connections.fetch_add(1, Ordering::Relaxed);
        self.total_connections.fetch_add(1, Ordering::Relaxed);
    }

    /// Saturates at zero.
    pub fn connection_closed(&self) {
        let _ = self
            .active_connections
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| n.checked_sub(1));
    }

    pub fn pipeline_started(&self) {
        self.pipelines_started.fetch_add(1, Ordering::Relaxed);
    }

    pub fn pipeline_failed(&self) {
        self.pipelines_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn busy_rejected(&self) {
        self.busy_rejections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn image_received(&self) {
        self.images_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn decode_failed(&self) {
        self.decode_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            active_connections: self.active_connections.load(Ordering::Relaxed),
            total_connections: self.total_connections.load(Ordering::Relaxed),
            pipelines_started: self.pipelines_started.load(Ordering::Relaxed),
            pipelines_failed: self.pipelines_failed.load(Ordering::Relaxed),
            busy_rejections: self.busy_rejections.load(Ordering::Relaxed),
            images_received: self.images_received.load(Ordering::Relaxed),
            decode_errors: self.decode_errors.load(Ordering::Relaxed),
        }
    }
}
