//! Counters surfaced through the control sub-protocol and the metrics exporter.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use crate::buffer::CircularBuffer;

/// Process-wide counters that outlive any single connection.
#[derive(Default)]
pub struct GlobalStats {
    pub active_clients: AtomicU64,
}

impl GlobalStats {
    pub fn new() -> GlobalStats {
        GlobalStats::default()
    }

    pub fn active_clients(&self) -> u64 {
        self.active_clients.load(Ordering::Relaxed)
    }
}

/// Per-connection counters. `connected_at` is immutable after construction,
/// so the whole struct needs no lock: every field is either atomic or fixed.
pub struct ConnectionStats {
    messages_received: AtomicU64,
    messages_rejected: AtomicU64,
    connected_at: Instant,
}

impl ConnectionStats {
    pub fn new() -> ConnectionStats {
        ConnectionStats {
            messages_received: AtomicU64::new(0),
            messages_rejected: AtomicU64::new(0),
            connected_at: Instant::now(),
        }
    }

    pub fn record_received(&self) {
        self.messages_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_rejected(&self) {
        self.messages_rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn messages_received(&self) -> u64 {
        self.messages_received.load(Ordering::Relaxed)
    }

    pub fn messages_rejected(&self) -> u64 {
        self.messages_rejected.load(Ordering::Relaxed)
    }

    pub fn uptime_secs(&self) -> u64 {
        self.connected_at.elapsed().as_secs()
    }

    fn rate_per_sec(&self) -> f64 {
        let elapsed = self.connected_at.elapsed().as_secs_f64();
        if elapsed < 0.001 {
            return 0.0;
        }
        self.messages_received() as f64 / elapsed
    }

    /// Renders the body of a `CMD:STATS` reply (without the `OK:STATS:` prefix).
    pub fn stats_line(&self) -> String {
        format!(
            "Messages:{},Rejected:{},Rate:{:.2}/s,Uptime:{}s",
            self.messages_received(),
            self.messages_rejected(),
            self.rate_per_sec(),
            self.uptime_secs(),
        )
    }
}

impl Default for ConnectionStats {
    fn default() -> ConnectionStats {
        ConnectionStats::new()
    }
}

/// Renders the body of a `CMD:BUFFER_STATS` reply (without the
/// `OK:BUFFER_STATS:` prefix).
pub fn buffer_stats_line(buffer: &CircularBuffer) -> String {
    let size = buffer.size();
    let capacity = buffer.capacity();
    let percent = buffer.utilisation() * 100.0;
    format!(
        "Buffer Stats - Size: {size}/{capacity} ({percent:.1}%), Added: {}, Dropped: {}, BackPressure: {}",
        buffer.total_added(),
        buffer.total_dropped(),
        buffer.is_back_pressured(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stats_line_reflects_recorded_counts() {
        let stats = ConnectionStats::new();
        stats.record_received();
        stats.record_received();
        stats.record_rejected();
        let line = stats.stats_line();
        assert!(line.contains("Messages:2"));
        assert!(line.contains("Rejected:1"));
        assert!(line.contains("Uptime:"));
    }

    #[test]
    fn buffer_stats_line_reports_size_and_capacity() {
        let buffer = CircularBuffer::new(10);
        buffer.enqueue(crate::record::LogRecord::new(
            crate::record::Level::Info,
            "hi".to_string(),
            "app".to_string(),
            None,
        ));
        let line = buffer_stats_line(&buffer);
        assert!(line.contains("Size: 1/10"));
        assert!(line.contains("BackPressure: false"));
    }
}
