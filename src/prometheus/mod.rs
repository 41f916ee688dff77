//! Prometheus metrics exporter: a text-format `GET /metrics` endpoint
//! exposing buffer, processor and connection gauges.

use once_cell::sync::Lazy;
use prometheus::{Gauge, GaugeVec, Opts, Registry};

pub mod server;

use crate::buffer::CircularBuffer;
use crate::processor::ProcessorStats;
use crate::stats::GlobalStats;

pub static REGISTRY: Lazy<Registry> = Lazy::new(Registry::new);

pub static BUFFER_SIZE: Lazy<Gauge> = Lazy::new(|| {
    Gauge::new("logcentral_buffer_size", "Current number of records in the buffer").unwrap()
});
pub static BUFFER_CAPACITY: Lazy<Gauge> = Lazy::new(|| {
    Gauge::new("logcentral_buffer_capacity", "Configured capacity of the buffer").unwrap()
});
pub static BUFFER_UTILISATION: Lazy<Gauge> = Lazy::new(|| {
    Gauge::new("logcentral_buffer_utilisation", "Buffer size divided by capacity").unwrap()
});
pub static BUFFER_TOTAL_ADDED: Lazy<Gauge> = Lazy::new(|| {
    Gauge::new("logcentral_buffer_total_added", "Cumulative records ever offered to the buffer").unwrap()
});
pub static BUFFER_TOTAL_DROPPED: Lazy<Gauge> = Lazy::new(|| {
    Gauge::new("logcentral_buffer_total_dropped", "Cumulative records evicted or rejected").unwrap()
});
pub static BUFFER_BACKPRESSURE: Lazy<Gauge> = Lazy::new(|| {
    Gauge::new("logcentral_buffer_backpressure_active", "1 if the buffer is in back-pressure state").unwrap()
});
pub static PROCESSOR_RECORDS: Lazy<Gauge> = Lazy::new(|| {
    Gauge::new("logcentral_processor_records_processed", "Cumulative records written to storage").unwrap()
});
pub static PROCESSOR_BATCHES: Lazy<Gauge> = Lazy::new(|| {
    Gauge::new("logcentral_processor_batches_flushed", "Cumulative batches flushed to storage").unwrap()
});
pub static ACTIVE_CLIENTS: Lazy<Gauge> = Lazy::new(|| {
    Gauge::new("logcentral_active_clients", "Currently connected client count").unwrap()
});

/// Kept for parity with the teacher's per-label gauge idiom; currently
/// unused by any single-dimension metric but ready for a per-application
/// breakdown should one be added.
pub static RECORDS_BY_LEVEL: Lazy<GaugeVec> = Lazy::new(|| {
    GaugeVec::new(
        Opts::new("logcentral_records_by_level", "Records processed, broken down by level"),
        &["level"],
    )
    .unwrap()
});

/// Registers every gauge into [`REGISTRY`]. Must run once before the exporter
/// starts serving; idempotent registration errors are logged, not fatal.
pub fn register() {
    for result in [
        REGISTRY.register(Box::new(BUFFER_SIZE.clone())),
        REGISTRY.register(Box::new(BUFFER_CAPACITY.clone())),
        REGISTRY.register(Box::new(BUFFER_UTILISATION.clone())),
        REGISTRY.register(Box::new(BUFFER_TOTAL_ADDED.clone())),
        REGISTRY.register(Box::new(BUFFER_TOTAL_DROPPED.clone())),
        REGISTRY.register(Box::new(BUFFER_BACKPRESSURE.clone())),
        REGISTRY.register(Box::new(PROCESSOR_RECORDS.clone())),
        REGISTRY.register(Box::new(PROCESSOR_BATCHES.clone())),
        REGISTRY.register(Box::new(ACTIVE_CLIENTS.clone())),
        REGISTRY.register(Box::new(RECORDS_BY_LEVEL.clone())),
    ] {
        if let Err(error) = result {
            tracing::warn!(%error, "failed to register metric (already registered?)");
        }
    }
}

/// Pulls the current atomics out of the buffer/processor/connection layers
/// into the gauges just before a scrape. Called from the HTTP handler, not
/// on the hot path.
pub fn update_metrics(buffer: &CircularBuffer, processor: &ProcessorStats, clients: &GlobalStats) {
    BUFFER_SIZE.set(buffer.size() as f64);
    BUFFER_CAPACITY.set(buffer.capacity() as f64);
    BUFFER_UTILISATION.set(buffer.utilisation());
    BUFFER_TOTAL_ADDED.set(buffer.total_added() as f64);
    BUFFER_TOTAL_DROPPED.set(buffer.total_dropped() as f64);
    BUFFER_BACKPRESSURE.set(if buffer.is_back_pressured() { 1.0 } else { 0.0 });
    PROCESSOR_RECORDS.set(processor.records_processed.load(std::sync::atomic::Ordering::Relaxed) as f64);
    PROCESSOR_BATCHES.set(processor.batches_flushed.load(std::sync::atomic::Ordering::Relaxed) as f64);
    ACTIVE_CLIENTS.set(clients.active_clients() as f64);
}
