//! Observer surface between the transfer core and its collaborators.
//!
//! The core never prints, never touches a UI toolkit, and never persists
//! metrics itself: everything flows through an injected
//! [`TransferObserver`]. Observers are called synchronously from inside the
//! handler's copy loop, so implementations must not block; queue and return.

use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::Mutex;

use anyhow::Result;
use chrono::Utc;
use tokio::sync::mpsc;

use crate::metrics::{MetricsSample, TransferMetrics};

pub trait TransferObserver: Send + Sync {
    /// Fired repeatedly during a transfer, once per sample.
    fn on_realtime_metrics(&self, _sample: &MetricsSample) {}
    /// Fired once per connection, after every realtime sample for it.
    fn on_final_metrics(&self, _metrics: &TransferMetrics) {}
    /// Informational and error events (connection opened, file saved,
    /// handler faults).
    fn on_log(&self, _message: &str) {}
}

pub struct NoopObserver;
impl TransferObserver for NoopObserver {}

/// Appends timestamped log lines and rendered final metrics to a file.
pub struct TextLogObserver {
    file: Mutex<File>,
}

impl TextLogObserver {
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent).ok();
        }
        let f = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            file: Mutex::new(f),
        })
    }

    fn line(&self, s: &str) {
        if let Ok(mut f) = self.file.lock() {
            let _ = writeln!(f, "[{}] {}", Utc::now().to_rfc3339(), s);
        }
    }
}

impl TransferObserver for TextLogObserver {
    fn on_final_metrics(&self, metrics: &TransferMetrics) {
        self.line(&format!(
            "TRANSFER file={} status={} bytes_diff={} time={:.4}s",
            metrics.file_name,
            metrics.transfer_status,
            metrics.transfer_byte_difference,
            metrics.total_transfer_time
        ));
    }

    fn on_log(&self, message: &str) {
        self.line(message);
    }
}

/// Appends one JSON object per final metrics record. Stands in for the
/// original deployment's database sink; the core only hands records over.
pub struct JsonlMetricsLog {
    path: PathBuf,
}

impl JsonlMetricsLog {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self { path: path.into() }
    }

    fn append(&self, metrics: &TransferMetrics) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).ok();
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        let mut writer = std::io::BufWriter::new(file);
        serde_json::to_writer(&mut writer, metrics)?;
        writer.write_all(b"\n")?;
        writer.flush()?;
        Ok(())
    }

    pub fn read_log(&self) -> Result<Vec<TransferMetrics>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let reader = BufReader::new(File::open(&self.path)?);
        let mut entries = Vec::new();
        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            entries.push(serde_json::from_str(&line)?);
        }
        Ok(entries)
    }
}

impl TransferObserver for JsonlMetricsLog {
    fn on_final_metrics(&self, metrics: &TransferMetrics) {
        // Sink failures must not stall or fail the transfer.
        let _ = self.append(metrics);
    }
}

/// Event forwarded by [`ChannelObserver`].
#[derive(Clone, Debug)]
pub enum TransferEvent {
    Realtime(MetricsSample),
    Final(TransferMetrics),
    Log(String),
}

/// Forwards events over an unbounded channel so a UI or test harness can
/// consume them without blocking the handler.
pub struct ChannelObserver {
    tx: mpsc::UnboundedSender<TransferEvent>,
}

impl ChannelObserver {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<TransferEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl TransferObserver for ChannelObserver {
    fn on_realtime_metrics(&self, sample: &MetricsSample) {
        let _ = self.tx.send(TransferEvent::Realtime(*sample));
    }

    fn on_final_metrics(&self, metrics: &TransferMetrics) {
        let _ = self.tx.send(TransferEvent::Final(metrics.clone()));
    }

    fn on_log(&self, message: &str) {
        let _ = self.tx.send(TransferEvent::Log(message.to_string()));
    }
}

/// Replicates every event to each inner observer, in order.
pub struct FanoutObserver {
    sinks: Vec<Arc<dyn TransferObserver>>,
}

impl FanoutObserver {
    pub fn new(sinks: Vec<Arc<dyn TransferObserver>>) -> Self {
        Self { sinks }
    }
}

impl TransferObserver for FanoutObserver {
    fn on_realtime_metrics(&self, sample: &MetricsSample) {
        for sink in &self.sinks {
            sink.on_realtime_metrics(sample);
        }
    }

    fn on_final_metrics(&self, metrics: &TransferMetrics) {
        for sink in &self.sinks {
            sink.on_final_metrics(metrics);
        }
    }

    fn on_log(&self, message: &str) {
        for sink in &self.sinks {
            sink.on_log(message);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::TransferStatus;
    use crate::protocol::TransferHeader;

    fn metrics(name: &str) -> TransferMetrics {
        let header = TransferHeader::new(name, 10, ".bin");
        TransferMetrics::from_transfer(&header, 10, 1.0, &[])
    }

    fn sample() -> MetricsSample {
        MetricsSample {
            elapsed_seconds: 0.5,
            throughput_mb_s: 1.5,
            cpu_percent: 12.0,
            ram_percent: 34.0,
        }
    }

    #[test]
    fn channel_observer_delivers_events_in_order() {
        let (observer, mut rx) = ChannelObserver::new();
        observer.on_log("hello");
        observer.on_realtime_metrics(&sample());
        observer.on_final_metrics(&metrics("a.bin"));

        assert!(matches!(rx.try_recv().unwrap(), TransferEvent::Log(m) if m == "hello"));
        assert!(matches!(rx.try_recv().unwrap(), TransferEvent::Realtime(s) if s.cpu_percent == 12.0));
        assert!(matches!(rx.try_recv().unwrap(), TransferEvent::Final(m) if m.file_name == "a.bin"));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn channel_observer_survives_dropped_receiver() {
        let (observer, rx) = ChannelObserver::new();
        drop(rx);
        observer.on_log("nobody listening");
        observer.on_final_metrics(&metrics("a.bin"));
    }

    #[test]
    fn jsonl_log_round_trips_records() {
        let dir = tempfile::tempdir().unwrap();
        let log = JsonlMetricsLog::new(dir.path().join("metrics.jsonl"));
        log.on_final_metrics(&metrics("one.bin"));
        log.on_final_metrics(&metrics("two.bin"));

        let entries = log.read_log().unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].file_name, "one.bin");
        assert_eq!(entries[1].file_name, "two.bin");
        assert_eq!(entries[0].transfer_status, TransferStatus::Success);
    }

    #[test]
    fn jsonl_log_reads_empty_when_missing() {
        let dir = tempfile::tempdir().unwrap();
        let log = JsonlMetricsLog::new(dir.path().join("absent.jsonl"));
        assert!(log.read_log().unwrap().is_empty());
    }

    #[test]
    fn text_log_appends_timestamped_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("server.log");
        let log = TextLogObserver::new(&path).unwrap();
        log.on_log("server started");
        log.on_final_metrics(&metrics("a.bin"));

        let contents = std::fs::read_to_string(&path).unwrap();
        assert!(contents.contains("server started"));
        assert!(contents.contains("TRANSFER file=a.bin status=Success"));
    }

    #[test]
    fn fanout_reaches_every_sink() {
        let (first, mut rx1) = ChannelObserver::new();
        let (second, mut rx2) = ChannelObserver::new();
        let fanout = FanoutObserver::new(vec![Arc::new(first), Arc::new(second)]);
        fanout.on_log("both");
        assert!(matches!(rx1.try_recv().unwrap(), TransferEvent::Log(_)));
        assert!(matches!(rx2.try_recv().unwrap(), TransferEvent::Log(_)));
    }
}
