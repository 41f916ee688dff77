//! Priority-aware bounded circular buffer sitting between connection handlers
//! and the processor pool.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::{Condvar, Mutex};

use crate::record::LogRecord;

/// Utilisation above which the buffer enters the back-pressure state.
const BACKPRESSURE_HIGH: f64 = 0.9;
/// Utilisation below which the back-pressure flag clears (hysteresis band).
const BACKPRESSURE_LOW: f64 = 0.7;

/// Outcome of a non-blocking [`CircularBuffer::enqueue`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueOutcome {
    Accepted,
    Rejected,
}

/// A fixed-capacity, never-blocking-on-write queue of [`LogRecord`]s with
/// priority eviction under sustained overload.
///
/// `size`/`totalAdded`/`totalDropped`/back-pressure are atomics readable
/// without taking the lock, so metrics scraping never contends with the
/// hot enqueue/dequeue path.
pub struct CircularBuffer {
    capacity: usize,
    inner: Mutex<VecDeque<LogRecord>>,
    not_empty: Condvar,
    size: AtomicUsize,
    total_added: AtomicU64,
    total_dropped: AtomicU64,
    back_pressure: AtomicBool,
}

impl CircularBuffer {
    pub fn new(capacity: usize) -> Arc<CircularBuffer> {
        assert!(capacity > 0, "buffer capacity must be greater than zero");
        Arc::new(CircularBuffer {
            capacity,
            inner: Mutex::new(VecDeque::with_capacity(capacity)),
            not_empty: Condvar::new(),
            size: AtomicUsize::new(0),
            total_added: AtomicU64::new(0),
            total_dropped: AtomicU64::new(0),
            back_pressure: AtomicBool::new(false),
        })
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn size(&self) -> usize {
        self.size.load(Ordering::Relaxed)
    }

    pub fn total_added(&self) -> u64 {
        self.total_added.load(Ordering::Relaxed)
    }

    pub fn total_dropped(&self) -> u64 {
        self.total_dropped.load(Ordering::Relaxed)
    }

    pub fn is_back_pressured(&self) -> bool {
        self.back_pressure.load(Ordering::Relaxed)
    }

    pub fn utilisation(&self) -> f64 {
        self.size() as f64 / self.capacity as f64
    }

    /// Never blocks. Evicts a low-priority (or, failing that, the oldest)
    /// record when the buffer is at or above capacity.
    pub fn enqueue(&self, record: LogRecord) -> EnqueueOutcome {
        self.total_added.fetch_add(1, Ordering::Relaxed);
        let mut guard = self.inner.lock();
        let utilisation = guard.len() as f64 / self.capacity as f64;

        if utilisation >= BACKPRESSURE_HIGH {
            self.back_pressure.store(true, Ordering::Relaxed);
        } else if utilisation < BACKPRESSURE_LOW {
            self.back_pressure.store(false, Ordering::Relaxed);
        }

        if guard.len() >= self.capacity {
            let victim_index = guard.iter().position(|r| r.level.is_low_priority());
            let evicted = match victim_index {
                Some(index) => guard.remove(index),
                None => guard.pop_front(),
            };
            if evicted.is_none() {
                // Degenerate: full deque with nothing to evict cannot happen
                // for capacity > 0, but reject rather than overrun if it ever did.
                self.total_dropped.fetch_add(1, Ordering::Relaxed);
                return EnqueueOutcome::Rejected;
            }
            guard.push_back(record);
            self.total_dropped.fetch_add(1, Ordering::Relaxed);
            self.size.store(guard.len(), Ordering::Relaxed);
            self.not_empty.notify_one();
            return EnqueueOutcome::Accepted;
        }

        guard.push_back(record);
        self.size.store(guard.len(), Ordering::Relaxed);
        self.not_empty.notify_one();
        EnqueueOutcome::Accepted
    }

    /// Blocks the calling thread until a record is available. Intended for
    /// use from a `spawn_blocking` context, not directly on an async task.
    pub fn dequeue(&self) -> LogRecord {
        let mut guard = self.inner.lock();
        loop {
            if let Some(record) = guard.pop_front() {
                self.size.store(guard.len(), Ordering::Relaxed);
                return record;
            }
            self.not_empty.wait(&mut guard);
        }
    }

    /// Never blocks.
    pub fn try_dequeue(&self) -> Option<LogRecord> {
        let mut guard = self.inner.lock();
        let record = guard.pop_front();
        if record.is_some() {
            self.size.store(guard.len(), Ordering::Relaxed);
        }
        record
    }
}
