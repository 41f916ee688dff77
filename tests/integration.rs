//! End-to-end coverage: spins up the real server and drives it over a live
//! TCP socket, the way an actual log-shipping client would.

use std::time::Duration;

use logcentral::app;
use logcentral::config::Config;
use serial_test::serial;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;

fn test_config(storage_dir: &std::path::Path, port: u16, buffer_size: usize, workers: usize) -> Config {
    let mut config = Config::default();
    config.server.port = port;
    config.buffer.size = buffer_size;
    config.thread.pool.size = workers;
    config.storage.directory = storage_dir.display().to_string();
    config.metrics.enabled = false;
    config
}

async fn connect(port: u16) -> (BufReader<tokio::net::tcp::OwnedReadHalf>, tokio::net::tcp::OwnedWriteHalf) {
    let stream = TcpStream::connect(("127.0.0.1", port)).await.expect("connect to server");
    let (reader, writer) = stream.into_split();
    let mut reader = BufReader::new(reader);
    let mut greeting = String::new();
    reader.read_line(&mut greeting).await.expect("read greeting");
    assert!(greeting.starts_with("OK:CONNECTED:"), "unexpected greeting: {greeting}");
    (reader, writer)
}

async fn send_line(writer: &mut tokio::net::tcp::OwnedWriteHalf, line: &str) {
    writer.write_all(format!("{line}\n").as_bytes()).await.expect("write line");
}

async fn read_reply(reader: &mut BufReader<tokio::net::tcp::OwnedReadHalf>) -> String {
    let mut line = String::new();
    reader.read_line(&mut line).await.expect("read reply");
    line.trim_end().to_string()
}

/// Polls `f` until it returns `Some`, or panics once `timeout` elapses.
async fn wait_for<T>(timeout: Duration, mut f: impl FnMut() -> Option<T>) -> T {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if let Some(value) = f() {
            return value;
        }
        if tokio::time::Instant::now() >= deadline {
            panic!("condition not met within {timeout:?}");
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
}

fn count_lines(dir: &std::path::Path, application: &str) -> usize {
    let today = chrono::Local::now().date_naive().format("%Y-%m-%d");
    let path = dir.join(format!("{application}_{today}.log"));
    std::fs::read_to_string(path)
        .map(|contents| contents.lines().count())
        .unwrap_or(0)
}

/// E1: a single client sends a batch-size worth of records into a small
/// buffer with one processor worker; every line lands in the storage file.
#[tokio::test]
#[serial]
async fn e1_single_client_records_land_in_storage() {
    let dir = tempfile::tempdir().unwrap();
    let port = portpicker::pick_unused_port().expect("free port");
    let config = test_config(dir.path(), port, 50, 1);
    let handle = tokio::spawn(app::serve(config));
    tokio::time::sleep(Duration::from_millis(100)).await;

    let (mut reader, mut writer) = connect(port).await;
    for i in 0..10 {
        send_line(&mut writer, &format!("INFO|e1app|host-1|message {i}|")).await;
        let reply = read_reply(&mut reader).await;
        assert!(reply.starts_with("OK:QUEUED:"), "unexpected reply: {reply}");
    }

    wait_for(Duration::from_secs(3), || {
        let count = count_lines(dir.path(), "e1app");
        (count == 10).then_some(())
    })
    .await;

    handle.abort();
}

/// E4: the control sub-protocol answers known and unknown commands.
#[tokio::test]
#[serial]
async fn e4_control_protocol_ping_and_unknown_command() {
    let dir = tempfile::tempdir().unwrap();
    let port = portpicker::pick_unused_port().expect("free port");
    let config = test_config(dir.path(), port, 50, 1);
    let handle = tokio::spawn(app::serve(config));
    tokio::time::sleep(Duration::from_millis(100)).await;

    let (mut reader, mut writer) = connect(port).await;

    send_line(&mut writer, "CMD:PING").await;
    assert_eq!(read_reply(&mut reader).await, "OK:PONG");

    send_line(&mut writer, "CMD:UNKNOWN").await;
    assert_eq!(read_reply(&mut reader).await, "ERROR:UNKNOWN_COMMAND:UNKNOWN");

    handle.abort();
}

/// E5: three concurrent clients each send 20 records into a shared buffer
/// drained by two processor workers; every record survives, none duplicate.
#[tokio::test]
#[serial]
async fn e5_three_concurrent_clients_no_duplicate_ids() {
    let dir = tempfile::tempdir().unwrap();
    let port = portpicker::pick_unused_port().expect("free port");
    let config = test_config(dir.path(), port, 100, 2);
    let handle = tokio::spawn(app::serve(config));
    tokio::time::sleep(Duration::from_millis(100)).await;

    let mut client_tasks = Vec::new();
    for client_idx in 0..3 {
        client_tasks.push(tokio::spawn(async move {
            let (mut reader, mut writer) = connect(port).await;
            let mut ids = Vec::new();
            for i in 0..20 {
                send_line(&mut writer, &format!("INFO|e5app|host-{client_idx}|client {client_idx} record {i}|")).await;
                let reply = read_reply(&mut reader).await;
                assert!(reply.starts_with("OK:QUEUED:"), "unexpected reply: {reply}");
                ids.push(reply.trim_start_matches("OK:QUEUED:").to_string());
            }
            ids
        }));
    }

    let mut all_ids = Vec::new();
    for task in client_tasks {
        all_ids.extend(task.await.expect("client task panicked"));
    }
    assert_eq!(all_ids.len(), 60);
    let mut unique_ids = all_ids.clone();
    unique_ids.sort();
    unique_ids.dedup();
    assert_eq!(unique_ids.len(), 60, "expected no duplicate record ids");

    wait_for(Duration::from_secs(3), || {
        let count = count_lines(dir.path(), "e5app");
        (count == 60).then_some(())
    })
    .await;

    handle.abort();
}

/// E6: empty lines and oversized lines are rejected without touching the buffer.
#[tokio::test]
#[serial]
async fn e6_empty_and_oversized_lines_are_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let port = portpicker::pick_unused_port().expect("free port");
    let config = test_config(dir.path(), port, 50, 1);
    let handle = tokio::spawn(app::serve(config));
    tokio::time::sleep(Duration::from_millis(100)).await;

    let (mut reader, mut writer) = connect(port).await;

    send_line(&mut writer, "").await;
    assert_eq!(read_reply(&mut reader).await, "ERROR:EMPTY_MESSAGE");

    let oversized = "x".repeat(11_000);
    send_line(&mut writer, &oversized).await;
    assert_eq!(read_reply(&mut reader).await, "ERROR:INVALID_MESSAGE_FORMAT");

    handle.abort();
}
