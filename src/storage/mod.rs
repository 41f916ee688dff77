//! Per-application, daily-rotated append-only storage sink.

use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Local;
use parking_lot::{Mutex, RwLock};

use crate::errors::StorageError;
use crate::record::{Level, LogRecord};

/// `(application, day)` key identifying one rotated log file.
type HandleKey = (String, chrono::NaiveDate);

/// Holds one open append-mode file handle per `(application, day)` pair.
///
/// Handle creation takes the map's write lock; writing to an existing
/// handle only needs a read lock on the map plus the handle's own mutex,
/// so concurrent batch writes to different applications never contend on
/// the map itself.
pub struct StorageSink {
    base_dir: PathBuf,
    handles: RwLock<HashMap<HandleKey, Arc<Mutex<File>>>>,
}

impl StorageSink {
    pub fn new(base_dir: impl Into<PathBuf>) -> Result<StorageSink, StorageError> {
        let base_dir = base_dir.into();
        std::fs::create_dir_all(&base_dir).map_err(|source| StorageError::Open {
            path: base_dir.display().to_string(),
            source,
        })?;
        Ok(StorageSink {
            base_dir,
            handles: RwLock::new(HashMap::new()),
        })
    }

    fn path_for(&self, application: &str, day: chrono::NaiveDate) -> PathBuf {
        self.base_dir
            .join(format!("{application}_{}.log", day.format("%Y-%m-%d")))
    }

    fn handle_for(&self, application: &str, day: chrono::NaiveDate) -> Result<Arc<Mutex<File>>, StorageError> {
        let key = (application.to_string(), day);
        if let Some(handle) = self.handles.read().get(&key) {
            return Ok(Arc::clone(handle));
        }
        let mut handles = self.handles.write();
        if let Some(handle) = handles.get(&key) {
            return Ok(Arc::clone(handle));
        }
        let path = self.path_for(application, day);
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|source| StorageError::Open {
                path: path.display().to_string(),
                source,
            })?;
        let handle = Arc::new(Mutex::new(file));
        handles.insert(key, Arc::clone(&handle));
        Ok(handle)
    }

    /// Groups `records` by `(application, write-time day)`, writes each
    /// group's lines to its handle in one critical section, then flushes.
    ///
    /// The grouping key is today's date at the moment of writing, not the
    /// record's own timestamp — a batch whose processing straddles local
    /// midnight legitimately produces two groups for the same application.
    pub fn write_batch(&self, records: &[LogRecord]) -> Result<(), StorageError> {
        let mut groups: HashMap<HandleKey, Vec<&LogRecord>> = HashMap::new();
        let today = Local::now().date_naive();
        for record in records {
            groups
                .entry((record.application.clone(), today))
                .or_default()
                .push(record);
        }

        for ((application, day), group) in groups {
            let handle = self.handle_for(&application, day)?;
            let mut file = handle.lock();
            let mut buffer = String::new();
            for record in &group {
                buffer.push_str(&record.to_storage_line());
                buffer.push('\n');
            }
            file.write_all(buffer.as_bytes())
                .and_then(|()| file.flush())
                .map_err(|source| StorageError::Write { application: application.clone(), source })?;
        }
        Ok(())
    }

    /// Best-effort read-back of an application's stored records across all
    /// of its daily files, newest file first, up to `limit` records total.
    /// Diagnostic/test use only; not a load-bearing query path.
    pub fn get_by_application(&self, application: &str, limit: usize) -> Vec<LogRecord> {
        self.read_matching(application, limit, |_| true)
    }

    /// As [`Self::get_by_application`], additionally filtered by level.
    pub fn get_by_level(&self, application: &str, level: Level, limit: usize) -> Vec<LogRecord> {
        self.read_matching(application, limit, move |record| record.level == level)
    }

    fn read_matching(
        &self,
        application: &str,
        limit: usize,
        predicate: impl Fn(&LogRecord) -> bool,
    ) -> Vec<LogRecord> {
        let mut files = self.daily_files_for(application);
        files.sort_by(|a, b| b.cmp(a));

        let mut out = Vec::new();
        for path in files {
            if out.len() >= limit {
                break;
            }
            for record in read_log_file(&path) {
                if predicate(&record) {
                    out.push(record);
                    if out.len() >= limit {
                        break;
                    }
                }
            }
        }
        out
    }

    fn daily_files_for(&self, application: &str) -> Vec<PathBuf> {
        let prefix = format!("{application}_");
        let Ok(entries) = std::fs::read_dir(&self.base_dir) else {
            return Vec::new();
        };
        entries
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| {
                path.file_name()
                    .and_then(|name| name.to_str())
                    .is_some_and(|name| name.starts_with(&prefix) && name.ends_with(".log"))
            })
            .collect()
    }
}

/// Re-parses a stored plain-text file back into records, skipping any line
/// that doesn't match the storage format rather than failing the whole read.
fn read_log_file(path: &Path) -> Vec<LogRecord> {
    let Ok(file) = File::open(path) else {
        return Vec::new();
    };
    BufReader::new(file)
        .lines()
        .map_while(Result::ok)
        .filter_map(|line| parse_storage_line(&line))
        .collect()
}

fn parse_storage_line(line: &str) -> Option<LogRecord> {
    let rest = line.strip_prefix('[')?;
    let (timestamp_str, rest) = rest.split_once("] ")?;
    let timestamp = chrono::NaiveDateTime::parse_from_str(timestamp_str, "%Y-%m-%d %H:%M:%S%.3f").ok()?;
    let timestamp = timestamp.and_local_timezone(Local).single()?;

    let (level_str, rest) = rest.split_once(' ')?;
    let level = Level::parse(level_str);

    let rest = rest.strip_prefix('[')?;
    let (application, rest) = rest.split_once("] [")?;
    let (hostname, rest) = rest.split_once("] - ")?;

    let (message, metadata) = match rest.rfind(" {") {
        Some(index) if rest.ends_with('}') => (&rest[..index], Some(&rest[index + 2..rest.len() - 1])),
        _ => (rest, None),
    };

    let mut record = LogRecord::new(level, message.to_string(), application.to_string(), Some(hostname.to_string()));
    record.timestamp = timestamp;
    if let Some(metadata) = metadata {
        for pair in metadata.split(", ") {
            if let Some((key, value)) = pair.split_once('=') {
                record.set_metadata(key, value);
            }
        }
    }
    Some(record)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn record(application: &str, level: Level, message: &str) -> LogRecord {
        LogRecord::new(level, message.to_string(), application.to_string(), Some("host-1".to_string()))
    }

    #[test]
    fn write_batch_creates_one_file_per_application() {
        let dir = tempdir().unwrap();
        let sink = StorageSink::new(dir.path()).unwrap();
        sink.write_batch(&[record("svc-a", Level::Info, "hello"), record("svc-b", Level::Error, "oops")])
            .unwrap();

        let today = Local::now().date_naive().format("%Y-%m-%d");
        assert!(dir.path().join(format!("svc-a_{today}.log")).exists());
        assert!(dir.path().join(format!("svc-b_{today}.log")).exists());
    }

    #[test]
    fn write_batch_appends_across_calls() {
        let dir = tempdir().unwrap();
        let sink = StorageSink::new(dir.path()).unwrap();
        sink.write_batch(&[record("svc", Level::Info, "first")]).unwrap();
        sink.write_batch(&[record("svc", Level::Info, "second")]).unwrap();

        let records = sink.get_by_application("svc", 10);
        assert_eq!(records.len(), 2);
    }

    #[test]
    fn get_by_level_filters_results() {
        let dir = tempdir().unwrap();
        let sink = StorageSink::new(dir.path()).unwrap();
        sink.write_batch(&[
            record("svc", Level::Info, "info line"),
            record("svc", Level::Error, "error line"),
        ])
        .unwrap();

        let errors = sink.get_by_level("svc", Level::Error, 10);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].message, "error line");
    }

    #[test]
    fn round_trips_metadata_through_storage_line_format() {
        let mut r = record("svc", Level::Warn, "low disk");
        r.set_metadata("disk_pct", "91");
        let line = r.to_storage_line();
        let parsed = parse_storage_line(&line).unwrap();
        assert_eq!(parsed.metadata.get("disk_pct").map(String::as_str), Some("91"));
        assert_eq!(parsed.message, "low disk");
        assert_eq!(parsed.application, "svc");
    }
}
