use anyhow::Result;
use std::io::Write as _;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::io::AsyncWriteExt;

use ferry::client::send_file;
use ferry::control::ServerHandle;
use ferry::metrics::{TransferMetrics, TransferStatus};
use ferry::observer::{NoopObserver, TransferObserver};
use ferry::server::ServerConfig;

#[derive(Default)]
struct Recording {
    finals: Mutex<Vec<TransferMetrics>>,
    realtime: Mutex<usize>,
    logs: Mutex<Vec<String>>,
}

impl TransferObserver for Recording {
    fn on_realtime_metrics(&self, _sample: &ferry::metrics::MetricsSample) {
        *self.realtime.lock().unwrap() += 1;
    }
    fn on_final_metrics(&self, metrics: &TransferMetrics) {
        self.finals.lock().unwrap().push(metrics.clone());
    }
    fn on_log(&self, message: &str) {
        self.logs.lock().unwrap().push(message.to_string());
    }
}

fn write_file(path: &Path, size: usize) -> Result<()> {
    let mut f = std::fs::File::create(path)?;
    if size == 0 {
        return Ok(());
    }
    let mut buf = vec![0u8; 1024 * 64];
    let mut remaining = size;
    let mut val: u8 = 0;
    while remaining > 0 {
        for b in buf.iter_mut() {
            *b = val;
            val = val.wrapping_add(1);
        }
        let n = remaining.min(buf.len());
        f.write_all(&buf[..n])?;
        remaining -= n;
    }
    Ok(())
}

async fn start_server(save_dir: &Path) -> (ServerHandle, Arc<Recording>, std::net::SocketAddr) {
    let recording = Arc::new(Recording::default());
    let server = ServerHandle::new(
        ServerConfig::new("127.0.0.1:0", save_dir),
        recording.clone() as Arc<dyn TransferObserver>,
    );
    server.start().await.expect("server failed to start");
    let addr = server.local_addr().expect("no local addr after start");
    (server, recording, addr)
}

async fn wait_for_finals(recording: &Recording, expected: usize) -> Vec<TransferMetrics> {
    for _ in 0..200u32 {
        {
            let finals = recording.finals.lock().unwrap();
            if finals.len() >= expected {
                return finals.clone();
            }
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    panic!("timed out waiting for {expected} final metrics record(s)");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn small_file_transfer() -> Result<()> {
    let save_dir = tempfile::tempdir()?;
    let src_dir = tempfile::tempdir()?;
    let (server, recording, addr) = start_server(save_dir.path()).await;

    let src = src_dir.path().join("small.bin");
    write_file(&src, 1024)?;
    send_file("127.0.0.1", addr.port(), &src, &NoopObserver).await?;

    let finals = wait_for_finals(&recording, 1).await;
    let m = &finals[0];
    assert_eq!(m.file_name, "small.bin");
    assert_eq!(m.file_size, Some(1024));
    assert_eq!(m.file_type, ".bin");
    assert_eq!(m.transfer_status, TransferStatus::Success);
    assert_eq!(m.transfer_byte_difference, 0);

    let saved = std::fs::read(save_dir.path().join("small.bin"))?;
    assert_eq!(saved.len(), 1024);
    assert_eq!(saved, std::fs::read(&src)?);

    // At least the baseline realtime sample was published.
    assert!(*recording.realtime.lock().unwrap() >= 1);

    server.stop().await;
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn large_file_transfer_10mb() -> Result<()> {
    let save_dir = tempfile::tempdir()?;
    let src_dir = tempfile::tempdir()?;
    let (server, recording, addr) = start_server(save_dir.path()).await;

    let size = 10 * 1024 * 1024;
    let src = src_dir.path().join("large.bin");
    write_file(&src, size)?;
    send_file("127.0.0.1", addr.port(), &src, &NoopObserver).await?;

    let finals = wait_for_finals(&recording, 1).await;
    let m = &finals[0];
    assert_eq!(m.file_name, "large.bin");
    assert_eq!(m.file_size, Some(size as u64));
    assert_eq!(m.transfer_status, TransferStatus::Success);
    assert!(m.total_transfer_time > 0.0);
    assert!(m.throughput > 0.0);

    let saved = std::fs::read(save_dir.path().join("large.bin"))?;
    assert_eq!(saved, std::fs::read(&src)?);

    server.stop().await;
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn simultaneous_transfers() -> Result<()> {
    let save_dir = tempfile::tempdir()?;
    let src_dir = tempfile::tempdir()?;
    let (server, recording, addr) = start_server(save_dir.path()).await;

    let names = ["c1.bin", "c2.bin", "c3.bin"];
    let mut tasks = Vec::new();
    for name in names {
        let src = src_dir.path().join(name);
        write_file(&src, 2048)?;
        let port = addr.port();
        tasks.push(tokio::spawn(async move {
            send_file("127.0.0.1", port, &src, &NoopObserver).await
        }));
    }
    for task in tasks {
        task.await.unwrap()?;
    }

    let finals = wait_for_finals(&recording, names.len()).await;
    assert_eq!(finals.len(), names.len());
    for name in names {
        let m = finals
            .iter()
            .find(|m| m.file_name == name)
            .unwrap_or_else(|| panic!("no metrics for {name}"));
        assert_eq!(m.transfer_byte_difference, 0);
        assert_eq!(m.transfer_status, TransferStatus::Success);
        assert_eq!(std::fs::read(save_dir.path().join(name))?.len(), 2048);
    }

    server.stop().await;
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn client_disconnect_mid_transfer_marked_failed() -> Result<()> {
    let save_dir = tempfile::tempdir()?;
    let (server, recording, addr) = start_server(save_dir.path()).await;

    let expected_size = 10_240u64;
    let sent = vec![b'd'; 1024];
    let mut stream = tokio::net::TcpStream::connect(addr).await?;
    stream
        .write_all(format!("incomplete.bin|{expected_size}|.bin\n").as_bytes())
        .await?;
    stream.write_all(&sent).await?;
    stream.shutdown().await?;
    drop(stream);

    let finals = wait_for_finals(&recording, 1).await;
    let m = &finals[0];
    assert_eq!(m.file_name, "incomplete.bin");
    assert_eq!(m.transfer_status, TransferStatus::Failed);
    assert_eq!(m.transfer_byte_difference, (expected_size - 1024) as i64);

    server.stop().await;
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn malformed_header_is_stored_as_unknown() -> Result<()> {
    let save_dir = tempfile::tempdir()?;
    let (server, recording, addr) = start_server(save_dir.path()).await;

    let mut stream = tokio::net::TcpStream::connect(addr).await?;
    stream.write_all(b"not-a-valid-header\nsome body").await?;
    stream.shutdown().await?;
    drop(stream);

    let finals = wait_for_finals(&recording, 1).await;
    let m = &finals[0];
    assert_eq!(m.file_name, "unknown");
    assert_eq!(m.file_type, "");
    assert_eq!(m.transfer_status, TransferStatus::Failed);

    let saved = std::fs::read(save_dir.path().join("unknown"))?;
    assert_eq!(saved, b"some body");

    server.stop().await;
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn stop_never_started_emits_nothing() -> Result<()> {
    let save_dir = tempfile::tempdir()?;
    let recording = Arc::new(Recording::default());
    let server = ServerHandle::new(
        ServerConfig::new("127.0.0.1:0", save_dir.path()),
        recording.clone() as Arc<dyn TransferObserver>,
    );
    server.stop().await;
    assert!(recording.finals.lock().unwrap().is_empty());
    assert!(recording.logs.lock().unwrap().is_empty());
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn stop_unblocks_accept_and_releases_the_port() -> Result<()> {
    let save_dir = tempfile::tempdir()?;
    let (server, recording, addr) = start_server(save_dir.path()).await;
    assert!(server.is_running());

    server.stop().await;
    assert!(!server.is_running());

    // The listener is gone; new connections are refused.
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(tokio::net::TcpStream::connect(addr).await.is_err());

    // Shutdown was an orderly state transition, not a fault.
    let logs = recording.logs.lock().unwrap();
    assert!(logs.iter().any(|l| l.contains("server listening")));
    assert!(logs.iter().any(|l| l == "server stopped"));
    assert!(!logs.iter().any(|l| l.contains("accept failed")));
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn transfers_accepted_after_restart() -> Result<()> {
    let save_dir = tempfile::tempdir()?;
    let src_dir = tempfile::tempdir()?;
    let (server, recording, _addr) = start_server(save_dir.path()).await;

    server.stop().await;
    server.start().await?;
    let addr = server.local_addr().unwrap();

    let src = src_dir.path().join("again.bin");
    write_file(&src, 256)?;
    send_file("127.0.0.1", addr.port(), &src, &NoopObserver).await?;

    let finals = wait_for_finals(&recording, 1).await;
    assert_eq!(finals[0].file_name, "again.bin");
    assert_eq!(finals[0].transfer_status, TransferStatus::Success);

    server.stop().await;
    Ok(())
}
