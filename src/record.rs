//! The normalised structured log datum flowing through the ingestion pipeline.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::Local;
use rand::Rng;

/// Upper bound on a record's message size, enforced by the connection handler
/// before the line is ever handed to the parser.
pub const MAX_MESSAGE_BYTES: usize = 10_000;

/// Upper bound on the number of metadata entries a single record may carry.
pub const MAX_METADATA_ENTRIES: usize = 100;

/// Process-wide monotonic counter mixed into every record id, so ids assigned
/// within the same millisecond on the same host are still distinguishable.
static ID_SEQUENCE: AtomicU64 = AtomicU64::new(0);

/// Severity of a log record. Unknown wire-format level strings map to [`Level::Info`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum Level {
    Trace = 1,
    Debug = 2,
    Info = 3,
    Warn = 4,
    Error = 5,
    Fatal = 6,
}

impl Level {
    /// Parses a level name case-insensitively, defaulting to [`Level::Info`]
    /// for anything unrecognised (per the data model's "unknown string levels
    /// map to INFO" rule).
    pub fn parse(s: &str) -> Level {
        match s.trim().to_ascii_uppercase().as_str() {
            "TRACE" => Level::Trace,
            "DEBUG" => Level::Debug,
            "INFO" => Level::Info,
            "WARN" | "WARNING" => Level::Warn,
            "ERROR" => Level::Error,
            "FATAL" => Level::Fatal,
            _ => Level::Info,
        }
    }

    /// `true` for the two priorities the back-pressure eviction policy may discard.
    pub fn is_low_priority(self) -> bool {
        matches!(self, Level::Trace | Level::Debug)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Level::Trace => "TRACE",
            Level::Debug => "DEBUG",
            Level::Info => "INFO",
            Level::Warn => "WARN",
            Level::Error => "ERROR",
            Level::Fatal => "FATAL",
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A globally unique, opaque record id assigned at construction time.
///
/// Not a database key and not ordered for anything other than debugging —
/// it is a millisecond timestamp and a process-local sequence number, which
/// is enough to make ids unique across every record this process will ever
/// create without reaching for a UUID dependency the rest of the stack
/// doesn't otherwise need.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RecordId(String);

impl RecordId {
    fn new() -> RecordId {
        let millis = Local::now().timestamp_millis();
        let seq = ID_SEQUENCE.fetch_add(1, Ordering::Relaxed);
        let salt: u32 = rand::rng().random();
        RecordId(format!("{millis:x}-{seq:x}-{salt:x}"))
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The unit of ingestion. Immutable except for `metadata`, which the pipeline
/// extends (never removes from) as the record moves from parser to processor.
#[derive(Debug, Clone)]
pub struct LogRecord {
    pub id: RecordId,
    pub timestamp: chrono::DateTime<Local>,
    pub level: Level,
    pub message: String,
    pub application: String,
    pub hostname: String,
    pub metadata: HashMap<String, String>,
}

impl LogRecord {
    /// Constructs a record, stamping `id` and `timestamp` at the moment of creation.
    pub fn new(
        level: Level,
        message: String,
        application: String,
        hostname: Option<String>,
    ) -> LogRecord {
        LogRecord {
            id: RecordId::new(),
            timestamp: Local::now(),
            level,
            message,
            application,
            hostname: hostname.unwrap_or_else(|| "unknown".to_string()),
            metadata: HashMap::new(),
        }
    }

    /// Inserts a metadata entry, silently dropping it once the record already
    /// holds [`MAX_METADATA_ENTRIES`] entries (last-wins on existing keys,
    /// capacity enforced only for genuinely new keys).
    pub fn set_metadata(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        if self.metadata.len() >= MAX_METADATA_ENTRIES && !self.metadata.contains_key(&key) {
            tracing::debug!(application = %self.application, "metadata cap reached, dropping key {key}");
            return;
        }
        self.metadata.insert(key, value.into());
    }

    /// Renders the human-readable storage line for this record (§4.4):
    /// `[YYYY-MM-DD HH:MM:SS.mmm] LEVEL [application] [hostname] - message {k1=v1, ...}`.
    pub fn to_storage_line(&self) -> String {
        let mut line = format!(
            "[{}] {} [{}] [{}] - {}",
            self.timestamp.format("%Y-%m-%d %H:%M:%S%.3f"),
            self.level,
            self.application,
            self.hostname,
            self.message,
        );
        if !self.metadata.is_empty() {
            let mut pairs: Vec<_> = self.metadata.iter().collect();
            pairs.sort_by(|a, b| a.0.cmp(b.0));
            let rendered = pairs
                .iter()
                .map(|(k, v)| format!("{k}={v}"))
                .collect::<Vec<_>>()
                .join(", ");
            line.push_str(" {");
            line.push_str(&rendered);
            line.push('}');
        }
        line
    }
}
