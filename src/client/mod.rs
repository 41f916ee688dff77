mod protocol;

use std::net::SocketAddr;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use chrono::Local;
use once_cell::sync::Lazy;
use regex::Regex;
use socket2::SockRef;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;

use crate::buffer::{CircularBuffer, EnqueueOutcome};
use crate::parser;
use crate::record::MAX_MESSAGE_BYTES;
use crate::stats::{ConnectionStats, GlobalStats};
use protocol::ControlReply;

const READ_TIMEOUT: Duration = Duration::from_secs(30);

static ERROR_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new("(?i)error|exception").unwrap());
static WARN_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new("(?i)warn").unwrap());
static LIFECYCLE_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new("(?i)startup|shutdown").unwrap());

/// Classifies a message into the Connection Handler's own `category`
/// metadata, distinct from the processor's substring-based `component`.
fn classify_category(message: &str) -> &'static str {
    if ERROR_PATTERN.is_match(message) {
        "error"
    } else if WARN_PATTERN.is_match(message) {
        "warning"
    } else if LIFECYCLE_PATTERN.is_match(message) {
        "lifecycle"
    } else {
        "general"
    }
}

/// Stamps the Connection-Handler-level metadata the parser itself cannot
/// know: peer address, receipt time, connection id, and message category.
fn enrich(mut record: crate::record::LogRecord, peer_addr: SocketAddr, client_id: &str) -> crate::record::LogRecord {
    record.set_metadata("client_ip", peer_addr.ip().to_string());
    record.set_metadata("server_time", Local::now().timestamp_millis().to_string());
    record.set_metadata("client_id", client_id.to_string());
    record.set_metadata("category", classify_category(&record.message));
    record
}

/// Drives one accepted connection end to end: greeting, read loop, per-line
/// dispatch, and cleanup. Runs as a single `tokio::task`.
pub async fn handle_connection(
    stream: TcpStream,
    peer_addr: SocketAddr,
    buffer: Arc<CircularBuffer>,
    global_stats: Arc<GlobalStats>,
) {
    if let Err(error) = configure_socket(&stream) {
        tracing::warn!(%peer_addr, %error, "failed to tune client socket");
    }

    global_stats.active_clients.fetch_add(1, Ordering::Relaxed);
    let _guard = scopeguard::guard((), |()| {
        global_stats.active_clients.fetch_sub(1, Ordering::Relaxed);
    });

    let client_id = format!("{peer_addr}-{}", Local::now().timestamp_millis());
    let (reader, mut writer) = stream.into_split();
    let mut lines = BufReader::new(reader).lines();
    let stats = ConnectionStats::new();

    if writer
        .write_all(format!("OK:CONNECTED:{client_id}\n").as_bytes())
        .await
        .is_err()
    {
        return;
    }

    loop {
        let next_line = match tokio::time::timeout(READ_TIMEOUT, lines.next_line()).await {
            Ok(Ok(Some(line))) => line,
            Ok(Ok(None)) => {
                tracing::debug!(%client_id, "client closed connection");
                break;
            }
            Ok(Err(error)) => {
                tracing::warn!(%client_id, %error, "read error, closing connection");
                break;
            }
            Err(_) => {
                tracing::debug!(%client_id, "read timed out, closing connection");
                break;
            }
        };

        let reply = dispatch(&next_line, peer_addr, &client_id, &buffer, &stats);
        let should_disconnect = matches!(reply, Dispatch::Disconnect(_));
        let text = match reply {
            Dispatch::Reply(text) | Dispatch::Disconnect(text) => text,
        };

        if writer.write_all(format!("{text}\n").as_bytes()).await.is_err() {
            break;
        }
        if should_disconnect {
            break;
        }
    }

    tracing::info!(
        %client_id,
        messages_received = stats.messages_received(),
        messages_rejected = stats.messages_rejected(),
        uptime_secs = stats.uptime_secs(),
        "connection closed"
    );
}

enum Dispatch {
    Reply(String),
    Disconnect(String),
}

fn dispatch(
    line: &str,
    peer_addr: SocketAddr,
    client_id: &str,
    buffer: &CircularBuffer,
    stats: &ConnectionStats,
) -> Dispatch {
    if line.is_empty() {
        return Dispatch::Reply("ERROR:EMPTY_MESSAGE".to_string());
    }

    if let Some(command) = line.strip_prefix("CMD:") {
        return match protocol::handle(command, stats, buffer) {
            ControlReply::Reply(text) => Dispatch::Reply(text),
            ControlReply::Disconnect(text) => Dispatch::Disconnect(text),
        };
    }

    if line.len() >= MAX_MESSAGE_BYTES {
        stats.record_rejected();
        return Dispatch::Reply("ERROR:INVALID_MESSAGE_FORMAT".to_string());
    }

    stats.record_received();
    let record = parser::parse(line);
    let record = enrich(record, peer_addr, client_id);
    let record_id = record.id.to_string();
    match buffer.enqueue(record) {
        EnqueueOutcome::Accepted => Dispatch::Reply(format!("OK:QUEUED:{record_id}")),
        EnqueueOutcome::Rejected => {
            stats.record_rejected();
            Dispatch::Reply("ERROR:BUFFER_FULL:BACKPRESSURE_ACTIVE".to_string())
        }
    }
}

fn configure_socket(stream: &TcpStream) -> std::io::Result<()> {
    let socket_ref = SockRef::from(stream);
    socket_ref.set_keepalive(true)?;
    socket_ref.set_nodelay(true)?;
    Ok(())
}
