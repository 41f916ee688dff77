//! The processor pool: `P` workers draining the buffer, enriching records,
//! and handing batches to the storage sink.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::time::sleep;

use crate::buffer::CircularBuffer;
use crate::record::{Level, LogRecord};
use crate::storage::StorageSink;

const POLL_INTERVAL: Duration = Duration::from_millis(100);
const FLUSH_TIMEOUT: Duration = Duration::from_secs(5);

/// Minimum target batch size, regardless of how the capacity/worker-count
/// ratio works out for small configurations.
const MIN_BATCH_SIZE: usize = 10;

/// Computes `B = max(10, capacity / (10 * workers))`.
pub fn target_batch_size(capacity: usize, workers: usize) -> usize {
    let workers = workers.max(1);
    (capacity / (10 * workers)).max(MIN_BATCH_SIZE)
}

/// Process-wide counters exposed to the metrics exporter.
#[derive(Default)]
pub struct ProcessorStats {
    pub records_processed: AtomicU64,
    pub batches_flushed: AtomicU64,
}

/// Owns the shared `running` flag and per-worker join handles for a pool of
/// `P` identical processor tasks.
pub struct ProcessorPool {
    running: Arc<AtomicBool>,
    stats: Arc<ProcessorStats>,
    handles: Vec<tokio::task::JoinHandle<()>>,
}

impl ProcessorPool {
    /// Spawns `workers` processor tasks, each polling `buffer` and writing
    /// enriched batches to `storage`.
    pub fn spawn(
        buffer: Arc<CircularBuffer>,
        storage: Arc<StorageSink>,
        workers: usize,
    ) -> ProcessorPool {
        let running = Arc::new(AtomicBool::new(true));
        let stats = Arc::new(ProcessorStats::default());
        let batch_size = target_batch_size(buffer.capacity(), workers);

        let handles = (0..workers.max(1))
            .map(|worker_id| {
                let buffer = Arc::clone(&buffer);
                let storage = Arc::clone(&storage);
                let running = Arc::clone(&running);
                let stats = Arc::clone(&stats);
                tokio::spawn(async move {
                    run_worker(worker_id, buffer, storage, running, stats, batch_size).await;
                })
            })
            .collect();

        ProcessorPool {
            running,
            stats,
            handles,
        }
    }

    pub fn stats(&self) -> Arc<ProcessorStats> {
        Arc::clone(&self.stats)
    }

    /// Clears the running flag; workers will drain the buffer and exit.
    pub fn shutdown(&self) {
        self.running.store(false, Ordering::Relaxed);
    }

    /// Waits, bounded by `timeout`, for every worker to finish draining.
    pub async fn join(self, timeout: Duration) {
        let _ = tokio::time::timeout(timeout, async move {
            for handle in self.handles {
                let _ = handle.await;
            }
        })
        .await;
    }
}

async fn run_worker(
    worker_id: usize,
    buffer: Arc<CircularBuffer>,
    storage: Arc<StorageSink>,
    running: Arc<AtomicBool>,
    stats: Arc<ProcessorStats>,
    batch_size: usize,
) {
    let mut batch: Vec<LogRecord> = Vec::with_capacity(batch_size);
    let mut last_flush = Instant::now();

    loop {
        match buffer.try_dequeue() {
            Some(record) => {
                batch.push(enrich(record, worker_id));
            }
            None => {
                if !running.load(Ordering::Relaxed) && batch.is_empty() {
                    break;
                }
                sleep(POLL_INTERVAL).await;
            }
        }

        let should_flush = batch.len() >= batch_size
            || (!batch.is_empty() && last_flush.elapsed() > FLUSH_TIMEOUT)
            || (!running.load(Ordering::Relaxed) && !batch.is_empty());

        if should_flush {
            flush(&storage, &stats, &mut batch).await;
            last_flush = Instant::now();
        }

        if !running.load(Ordering::Relaxed) && batch.is_empty() {
            // One more drain pass in case records arrived between the check
            // above and here.
            if buffer.try_dequeue().is_none() {
                break;
            }
        }
    }

    tracing::debug!(worker_id, "processor worker exiting");
}

async fn flush(storage: &Arc<StorageSink>, stats: &Arc<ProcessorStats>, batch: &mut Vec<LogRecord>) {
    if batch.is_empty() {
        return;
    }
    let count = batch.len() as u64;
    if let Err(error) = storage.write_batch(batch) {
        tracing::warn!(%error, "batch write failed, records dropped");
    }
    stats.records_processed.fetch_add(count, Ordering::Relaxed);
    stats.batches_flushed.fetch_add(1, Ordering::Relaxed);
    batch.clear();
}

/// Substring classifiers, checked case-insensitively against the message.
const CLASSIFIERS: &[(&str, &[&str])] = &[
    ("database", &["database", "sql", "query", "db "]),
    ("web", &["http", "request", "response", "url", "endpoint"]),
    ("memory", &["memory", "heap", "oom", "allocation"]),
    ("security", &["auth", "login", "permission", "token", "unauthorized"]),
];

fn classify(message: &str) -> Option<&'static str> {
    let lower = message.to_ascii_lowercase();
    CLASSIFIERS
        .iter()
        .find(|(_, needles)| needles.iter().any(|needle| lower.contains(needle)))
        .map(|(component, _)| *component)
}

fn severity(level: Level) -> &'static str {
    if level >= Level::Error {
        "high"
    } else if level == Level::Warn {
        "medium"
    } else {
        "low"
    }
}

fn enrich(mut record: LogRecord, worker_id: usize) -> LogRecord {
    record.set_metadata("processor_thread", worker_id.to_string());
    record.set_metadata("processed_at", chrono::Local::now().timestamp_millis().to_string());
    if record.message.len() > 5000 {
        record.set_metadata("truncated", "true");
    }
    if let Some(component) = classify(&record.message) {
        record.set_metadata("component", component);
    }
    record.set_metadata("severity", severity(record.level));
    record
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn target_batch_size_respects_floor() {
        assert_eq!(target_batch_size(100, 4), 10);
        assert_eq!(target_batch_size(10_000, 2), 500);
    }

    #[test]
    fn classify_matches_known_substrings() {
        assert_eq!(classify("SQL query timed out"), Some("database"));
        assert_eq!(classify("user login failed"), Some("security"));
        assert_eq!(classify("nothing special here"), None);
    }

    #[test]
    fn severity_follows_level_thresholds() {
        assert_eq!(severity(Level::Fatal), "high");
        assert_eq!(severity(Level::Error), "high");
        assert_eq!(severity(Level::Warn), "medium");
        assert_eq!(severity(Level::Info), "low");
    }

    #[test]
    fn enrich_adds_expected_metadata_keys() {
        let record = LogRecord::new(Level::Error, "db timeout".to_string(), "svc".to_string(), None);
        let enriched = enrich(record, 3);
        assert_eq!(enriched.metadata.get("processor_thread").map(String::as_str), Some("3"));
        assert!(enriched.metadata.contains_key("processed_at"));
        assert_eq!(enriched.metadata.get("component").map(String::as_str), Some("database"));
        assert_eq!(enriched.metadata.get("severity").map(String::as_str), Some("high"));
    }
}
