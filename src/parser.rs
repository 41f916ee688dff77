//! Wire-format parsing. The parser is total: every line that reaches it
//! yields a [`LogRecord`], per the fallback rule below.

use crate::record::{Level, LogRecord};

/// Parses one client-supplied line (already known to be non-empty and under
/// the size cap) into a record. Recognises, in order:
///
/// - **Extended**: `LEVEL|APPLICATION|HOSTNAME|MESSAGE|META` where `META` is
///   a comma-separated list of `key=value` pairs.
/// - **Simple**: first whitespace-separated token is a level name, the rest
///   is the message; `application`/`hostname` default to `"unknown"`.
/// - **Fallback**: the raw line becomes an `INFO` message with
///   `application = "unknown"`.
pub fn parse(line: &str) -> LogRecord {
    let mut record = parse_extended(line)
        .or_else(|| parse_simple(line))
        .unwrap_or_else(|| LogRecord::new(Level::Info, line.to_string(), "unknown".to_string(), None));

    record.set_metadata("raw_length", line.len().to_string());
    record.set_metadata("parsed_at", chrono::Local::now().timestamp_millis().to_string());
    record
}

fn parse_extended(line: &str) -> Option<LogRecord> {
    let fields: Vec<&str> = line.splitn(5, '|').collect();
    if fields.len() != 5 {
        return None;
    }
    let [level, application, hostname, message, meta] = fields.try_into().ok()?;
    let level = Level::parse(level);
    let application = non_empty_or_unknown(application);
    let hostname = non_empty_or_unknown(hostname);
    let mut record = LogRecord::new(level, message.to_string(), application, Some(hostname));
    for pair in meta.split(',') {
        let pair = pair.trim();
        if pair.is_empty() {
            continue;
        }
        if let Some((key, value)) = pair.split_once('=') {
            record.set_metadata(key.trim(), value.trim());
        }
    }
    Some(record)
}

fn parse_simple(line: &str) -> Option<LogRecord> {
    if !line.contains(char::is_whitespace) {
        return None;
    }
    let (level_token, rest) = line.split_once(char::is_whitespace)?;
    let level = Level::parse(level_token);
    Some(LogRecord::new(
        level,
        rest.trim_start().to_string(),
        "unknown".to_string(),
        None,
    ))
}

fn non_empty_or_unknown(field: &str) -> String {
    let field = field.trim();
    if field.is_empty() {
        "unknown".to_string()
    } else {
        field.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extended_format_populates_all_fields() {
        let r = parse("ERROR|billing|host-1|payment failed|user=42, region = eu");
        assert_eq!(r.level, Level::Error);
        assert_eq!(r.application, "billing");
        assert_eq!(r.hostname, "host-1");
        assert_eq!(r.message, "payment failed");
        assert_eq!(r.metadata.get("user").map(String::as_str), Some("42"));
        assert_eq!(r.metadata.get("region").map(String::as_str), Some("eu"));
    }

    #[test]
    fn extended_format_drops_malformed_meta_pairs() {
        let r = parse("INFO|svc|host|hello|justkey,ok=1");
        assert_eq!(r.metadata.len(), 1);
        assert_eq!(r.metadata.get("ok").map(String::as_str), Some("1"));
    }

    #[test]
    fn extended_format_duplicate_keys_last_wins() {
        let r = parse("INFO|svc|host|hello|a=1,a=2");
        assert_eq!(r.metadata.get("a").map(String::as_str), Some("2"));
    }

    #[test]
    fn simple_format_defaults_application_and_hostname() {
        let r = parse("WARN disk usage high");
        assert_eq!(r.level, Level::Warn);
        assert_eq!(r.application, "unknown");
        assert_eq!(r.hostname, "unknown");
        assert_eq!(r.message, "disk usage high");
    }

    #[test]
    fn simple_format_unknown_level_name_falls_back_to_info() {
        let r = parse("weird message with spaces");
        assert_eq!(r.level, Level::Info);
        assert_eq!(r.message, "message with spaces");
    }

    #[test]
    fn no_delimiter_and_no_whitespace_yields_raw_info_record() {
        let r = parse("single-token-line");
        assert_eq!(r.level, Level::Info);
        assert_eq!(r.application, "unknown");
        assert_eq!(r.message, "single-token-line");
    }

    #[test]
    fn parser_never_fails_on_arbitrary_input() {
        for line in ["", "|||", "a|b", "😀🔥 not ascii | still fine"] {
            let _ = parse(line);
        }
    }
}
