//! Raw-TCP HTTP/1.1 responder for the `GET /metrics` endpoint.

use std::net::SocketAddr;
use std::sync::Arc;

use prometheus::{Encoder, TextEncoder};
use tokio::io::{AsyncReadExt, AsyncWriteExt, BufReader, BufWriter};
use tokio::net::{TcpListener, TcpStream};

use super::REGISTRY;
use crate::buffer::CircularBuffer;
use crate::processor::ProcessorStats;
use crate::stats::GlobalStats;

/// Reads (and discards) the request line and headers, then serves the
/// current metric snapshot regardless of path — this endpoint has exactly
/// one route.
async fn handle_metrics_request(
    stream: TcpStream,
    buffer: &CircularBuffer,
    processor: &ProcessorStats,
    clients: &GlobalStats,
) {
    let (read_half, write_half) = stream.into_split();
    let mut reader = BufReader::new(read_half);
    let mut writer = BufWriter::new(write_half);
    let mut request = [0u8; 1024];

    if let Err(error) = reader.read(&mut request).await {
        tracing::warn!(%error, "failed to read metrics request");
        return;
    }

    super::update_metrics(buffer, processor, clients);

    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut body = Vec::new();
    if let Err(error) = encoder.encode(&metric_families, &mut body) {
        tracing::error!(%error, "failed to encode metrics");
        return;
    }

    let response = format!(
        "HTTP/1.1 200 OK\r\nContent-Type: {}\r\nContent-Length: {}\r\n\r\n",
        encoder.format_type(),
        body.len(),
    );

    if writer.write_all(response.as_bytes()).await.is_err() {
        return;
    }
    if writer.write_all(&body).await.is_err() {
        return;
    }
    let _ = writer.flush().await;
}

/// Binds `port` and serves `/metrics` until the process exits. Spawned as
/// its own task; a bind failure here is logged but not fatal to the rest of
/// the server (the metrics endpoint is ambient, not load-bearing).
pub async fn run(
    port: u16,
    buffer: Arc<CircularBuffer>,
    processor: Arc<ProcessorStats>,
    clients: Arc<GlobalStats>,
) {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = match TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(error) => {
            tracing::error!(%addr, %error, "failed to bind metrics exporter, metrics disabled");
            return;
        }
    };
    tracing::info!(%addr, "metrics exporter listening");

    loop {
        match listener.accept().await {
            Ok((stream, _)) => {
                let buffer = Arc::clone(&buffer);
                let processor = Arc::clone(&processor);
                let clients = Arc::clone(&clients);
                tokio::spawn(async move {
                    handle_metrics_request(stream, &buffer, &processor, &clients).await;
                });
            }
            Err(error) => {
                tracing::warn!(%error, "failed to accept metrics connection");
            }
        }
    }
}
