//! Server side: accept loop and per-connection transfer handling.
//!
//! One task runs the accept loop; every accepted connection gets its own
//! spawned task, unbounded. A handler reads the header line, streams the
//! body into the storage directory, and samples throughput/CPU/RAM inside
//! the copy loop, publishing realtime samples as they are taken and one
//! final metrics record at stream end. Handler faults are absorbed at the
//! task boundary; only bind/accept failures stop the listener.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::Notify;

use crate::error::ListenerError;
use crate::metrics::{throughput_mb_s, MetricsSample, TransferMetrics};
use crate::observer::TransferObserver;
use crate::protocol::{TransferHeader, CHUNK_SIZE, HEADER_TERMINATOR, MAX_HEADER_LEN, UNKNOWN_FILE_NAME};
use crate::sysmon::ResourceSampler;

/// Minimum spacing between metric samples unless configured otherwise.
pub const DEFAULT_SAMPLE_INTERVAL: Duration = Duration::from_millis(1);

#[derive(Clone, Debug)]
pub struct ServerConfig {
    /// Bind address, `host:port`.
    pub bind: String,
    /// Directory where received files are stored; created if absent.
    pub save_dir: PathBuf,
    /// Minimum spacing between metric samples. Zero means sample on every
    /// chunk.
    pub sample_interval: Duration,
}

impl ServerConfig {
    pub fn new(bind: impl Into<String>, save_dir: impl Into<PathBuf>) -> Self {
        Self {
            bind: bind.into(),
            save_dir: save_dir.into(),
            sample_interval: DEFAULT_SAMPLE_INTERVAL,
        }
    }

    pub fn sample_interval(mut self, interval: Duration) -> Self {
        self.sample_interval = interval;
        self
    }
}

/// Cloneable handle that unblocks the accept loop and flips the running
/// flag. `stop` is idempotent.
#[derive(Clone)]
pub struct ShutdownHandle {
    running: Arc<AtomicBool>,
    shutdown: Arc<Notify>,
}

impl ShutdownHandle {
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        // notify_one stores a permit, so a stop that races ahead of the
        // accept loop's first select is not lost.
        self.shutdown.notify_one();
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

/// A bound listener, ready to serve. Binding and serving are split so the
/// lifecycle controller can learn the local address (port 0 binds) before
/// the accept loop task starts.
pub struct Listener {
    listener: TcpListener,
    local_addr: SocketAddr,
    config: ServerConfig,
    running: Arc<AtomicBool>,
    shutdown: Arc<Notify>,
    active: Arc<AtomicUsize>,
}

impl Listener {
    pub async fn bind(config: ServerConfig) -> Result<Self, ListenerError> {
        std::fs::create_dir_all(&config.save_dir).map_err(|source| ListenerError::SaveDir {
            path: config.save_dir.clone(),
            source,
        })?;
        let listener = TcpListener::bind(&config.bind)
            .await
            .map_err(|source| ListenerError::Bind {
                addr: config.bind.clone(),
                source,
            })?;
        let local_addr = listener.local_addr().map_err(|source| ListenerError::Bind {
            addr: config.bind.clone(),
            source,
        })?;
        Ok(Self {
            listener,
            local_addr,
            config,
            running: Arc::new(AtomicBool::new(false)),
            shutdown: Arc::new(Notify::new()),
            active: Arc::new(AtomicUsize::new(0)),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            running: Arc::clone(&self.running),
            shutdown: Arc::clone(&self.shutdown),
        }
    }

    /// Run the accept loop until `stop()` or a fatal accept error. Each
    /// accepted connection is handled on its own task; handler faults are
    /// logged with the peer address and never propagate here.
    pub async fn serve(self, observer: Arc<dyn TransferObserver>) -> Result<(), ListenerError> {
        let Listener {
            listener,
            local_addr,
            config,
            running,
            shutdown,
            active,
        } = self;

        running.store(true, Ordering::SeqCst);
        observer.on_log(&format!(
            "server listening on {} save_dir={}",
            local_addr,
            config.save_dir.display()
        ));

        loop {
            let accepted = tokio::select! {
                res = listener.accept() => res,
                _ = shutdown.notified() => break,
            };
            match accepted {
                Ok((stream, peer)) => {
                    let _ = stream.set_nodelay(true);
                    observer.on_log(&format!("connection from {peer}"));
                    let count = active.fetch_add(1, Ordering::SeqCst) + 1;
                    observer.on_log(&format!("active connections {count}"));

                    let save_dir = config.save_dir.clone();
                    let interval = config.sample_interval;
                    let observer = Arc::clone(&observer);
                    let active = Arc::clone(&active);
                    tokio::spawn(async move {
                        if let Err(e) =
                            handle_connection(stream, peer, &save_dir, interval, observer.as_ref())
                                .await
                        {
                            observer.on_log(&format!("error handling client {peer}: {e:#}"));
                        }
                        active.fetch_sub(1, Ordering::SeqCst);
                    });
                }
                Err(e) => {
                    if !running.load(Ordering::SeqCst) {
                        // stop() closed us out from under the accept call.
                        break;
                    }
                    observer.on_log(&format!("accept failed: {e}"));
                    running.store(false, Ordering::SeqCst);
                    return Err(ListenerError::Accept(e));
                }
            }
        }

        running.store(false, Ordering::SeqCst);
        observer.on_log("server stopped");
        Ok(())
    }
}

/// Handle one accepted connection end to end.
///
/// Generic over the byte source so tests can drive it with in-memory
/// streams; the server only ever reads from the connection.
async fn handle_connection<S>(
    mut stream: S,
    peer: SocketAddr,
    save_dir: &Path,
    sample_interval: Duration,
    observer: &dyn TransferObserver,
) -> anyhow::Result<()>
where
    S: AsyncRead + Unpin,
{
    let line = read_header_line(&mut stream).await?;
    let header = TransferHeader::decode(&line);
    observer.on_log(&format!("receiving file: {} from {peer}", header.file_name));

    let dest = save_dir.join(sanitize_file_name(&header.file_name));
    let mut out = tokio::fs::File::create(&dest).await?;

    let mut sampler = ResourceSampler::new();
    let mut samples: Vec<MetricsSample> = Vec::new();
    let start = Instant::now();

    // Baseline sample before any body bytes arrive.
    take_sample(&mut sampler, &mut samples, start, 0, observer);
    let mut last_sample = Instant::now();

    let mut buf = vec![0u8; CHUNK_SIZE];
    let mut received: u64 = 0;
    loop {
        let n = stream.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        out.write_all(&buf[..n]).await?;
        received += n as u64;
        if last_sample.elapsed() >= sample_interval {
            take_sample(&mut sampler, &mut samples, start, received, observer);
            last_sample = Instant::now();
        }
    }
    out.flush().await?;
    let total_transfer_time = start.elapsed().as_secs_f64();

    let metrics = TransferMetrics::from_transfer(&header, received, total_transfer_time, &samples);
    observer.on_log(&format!(
        "file saved: {} ({received} bytes, {})",
        dest.display(),
        metrics.transfer_status
    ));
    observer.on_final_metrics(&metrics);
    Ok(())
}

fn take_sample(
    sampler: &mut ResourceSampler,
    samples: &mut Vec<MetricsSample>,
    start: Instant,
    bytes_received: u64,
    observer: &dyn TransferObserver,
) {
    let elapsed = start.elapsed().as_secs_f64();
    let (cpu_percent, ram_percent) = sampler.sample();
    let sample = MetricsSample {
        elapsed_seconds: elapsed,
        throughput_mb_s: throughput_mb_s(bytes_received, elapsed),
        cpu_percent,
        ram_percent,
    };
    observer.on_realtime_metrics(&sample);
    samples.push(sample);
}

/// Accumulate bytes until the terminator, EOF, or the length cap. The
/// result is whatever arrived, decoded leniently: a peer that closes
/// without a newline still gets its line (possibly empty) parsed.
async fn read_header_line<S>(stream: &mut S) -> std::io::Result<String>
where
    S: AsyncRead + Unpin,
{
    let mut line = Vec::new();
    let mut byte = [0u8; 1];
    while line.len() < MAX_HEADER_LEN {
        let n = stream.read(&mut byte).await?;
        if n == 0 || byte[0] == HEADER_TERMINATOR {
            break;
        }
        line.push(byte[0]);
    }
    Ok(String::from_utf8_lossy(&line).into_owned())
}

/// Reduce a received file name to a single safe path component. Anything
/// that would walk out of the storage directory (separators, `..`, NUL)
/// collapses to its final component or to the sentinel name.
fn sanitize_file_name(name: &str) -> String {
    let trimmed = name.trim();
    if trimmed.contains('\0') {
        return UNKNOWN_FILE_NAME.to_string();
    }
    let base = Path::new(trimmed)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    if base.is_empty() {
        UNKNOWN_FILE_NAME.to_string()
    } else {
        base
    }
}
