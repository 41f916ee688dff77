//! The `CMD:<name>[:<args>]` control sub-protocol.

use crate::buffer::CircularBuffer;
use crate::stats::{buffer_stats_line, ConnectionStats};

/// Outcome of routing one `CMD:` line. `Disconnect` tells the caller to send
/// the reply and then close the connection.
pub enum ControlReply {
    Reply(String),
    Disconnect(String),
}

/// Parses and executes a control command, given the line with its `CMD:`
/// prefix already stripped.
pub fn handle(command_line: &str, stats: &ConnectionStats, buffer: &CircularBuffer) -> ControlReply {
    let mut parts = command_line.splitn(2, ':');
    let name = parts.next().unwrap_or("").to_ascii_uppercase();

    match name.as_str() {
        "PING" => ControlReply::Reply("OK:PONG".to_string()),
        "STATS" => ControlReply::Reply(format!("OK:STATS:{}", stats.stats_line())),
        "BUFFER_STATS" => ControlReply::Reply(format!("OK:BUFFER_STATS:{}", buffer_stats_line(buffer))),
        "DISCONNECT" => ControlReply::Disconnect("OK:DISCONNECTING".to_string()),
        "HELP" => ControlReply::Reply("OK:COMMANDS:PING,STATS,BUFFER_STATS,DISCONNECT,HELP".to_string()),
        other => ControlReply::Reply(format!("ERROR:UNKNOWN_COMMAND:{other}")),
    }
}
