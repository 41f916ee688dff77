use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::runtime::Builder;
use tokio::sync::mpsc;

use crate::buffer::CircularBuffer;
use crate::client;
use crate::config::Config;
use crate::prometheus as metrics;
use crate::processor::ProcessorPool;
use crate::stats::GlobalStats;
use crate::storage::StorageSink;

const SHUTDOWN_TICK: Duration = Duration::from_secs(5);
const HANDLER_DRAIN_BUDGET: Duration = Duration::from_secs(10);
const WORKER_DRAIN_BUDGET: Duration = Duration::from_secs(30);

/// Process-wide flag cleared on shutdown; the acceptor, every handler, and
/// every processor worker observe it to begin winding down.
pub static RUNNING: AtomicBool = AtomicBool::new(true);

/// Builds the multi-threaded runtime and blocks on [`serve`]. The only
/// failure path that terminates the process is a listener bind failure.
pub fn run_server(config: Config) -> Result<(), crate::Error> {
    let runtime = Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(crate::errors::StorageError::Io)?;
    runtime.block_on(serve(config))
}

/// Resolves on the first `SIGINT` or `SIGTERM` (Unix) / Ctrl-C (Windows).
#[cfg(not(windows))]
async fn shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};
    let mut sigint = signal(SignalKind::interrupt()).expect("failed to install SIGINT handler");
    let mut sigterm = signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
    tokio::select! {
        _ = sigint.recv() => tracing::info!("received SIGINT, starting graceful shutdown"),
        _ = sigterm.recv() => tracing::info!("received SIGTERM, starting graceful shutdown"),
    }
}

#[cfg(windows)]
async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    tracing::info!("received Ctrl-C, starting graceful shutdown");
}

/// Binds the listener and runs the accept loop to completion (on shutdown
/// signal or the [`RUNNING`] flag clearing). Exposed so integration tests
/// can drive a real server instance without going through [`run_server`]'s
/// own runtime construction.
pub async fn serve(config: Config) -> Result<(), crate::Error> {
    let addr = format!("0.0.0.0:{}", config.server.port);
    let listener = match TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(error) => {
            tracing::error!(%addr, %error, "failed to bind listener, exiting");
            std::process::exit(exitcode::CONFIG);
        }
    };
    tracing::info!(%addr, "logcentral listening");

    let buffer = CircularBuffer::new(config.buffer.size);
    let storage = Arc::new(StorageSink::new(&config.storage.directory)?);
    let global_stats = Arc::new(GlobalStats::new());

    metrics::register();
    let processor = ProcessorPool::spawn(Arc::clone(&buffer), Arc::clone(&storage), config.processor_workers());
    let processor_stats = processor.stats();

    if config.metrics.enabled {
        let buffer = Arc::clone(&buffer);
        let processor_stats = Arc::clone(&processor_stats);
        let global_stats = Arc::clone(&global_stats);
        let port = config.metrics.port;
        tokio::spawn(async move {
            metrics::server::run(port, buffer, processor_stats, global_stats).await;
        });
    }

    let (completion_tx, mut completion_rx) = mpsc::unbounded_channel::<()>();
    let mut tick = tokio::time::interval(SHUTDOWN_TICK);
    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    tracing::info!(max_clients = config.server.max_clients, "accepting connections");
    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            _ = tick.tick() => {
                if !RUNNING.load(Ordering::Relaxed) {
                    break;
                }
            }
            accepted = listener.accept() => {
                match accepted {
                    Ok((stream, peer_addr)) => {
                        if global_stats.active_clients() >= config.server.max_clients as u64 {
                            tracing::debug!(%peer_addr, "connection rejected, at max_clients");
                            continue;
                        }
                        let buffer = Arc::clone(&buffer);
                        let global_stats = Arc::clone(&global_stats);
                        let completion_tx = completion_tx.clone();
                        tokio::spawn(async move {
                            client::handle_connection(stream, peer_addr, buffer, global_stats).await;
                            let _ = completion_tx.send(());
                        });
                    }
                    Err(error) => {
                        tracing::warn!(%error, "failed to accept connection");
                    }
                }
            }
        }
    }

    RUNNING.store(false, Ordering::Relaxed);
    drop(listener);
    drop(completion_tx);

    tracing::info!("waiting for connection handlers to drain");
    let _ = tokio::time::timeout(HANDLER_DRAIN_BUDGET, async {
        while completion_rx.recv().await.is_some() {}
    })
    .await;

    tracing::info!("waiting for processor workers to drain");
    processor.shutdown();
    processor.join(WORKER_DRAIN_BUDGET).await;

    tracing::info!("shutdown complete");
    Ok(())
}
