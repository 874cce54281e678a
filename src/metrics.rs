//! Transfer metrics: per-sample readings and the per-connection summary.
//!
//! Samples are taken inside the server's copy loop while a transfer is in
//! flight; the summary is derived once at stream end. Aggregation is pure
//! computation over one connection's ordered sample list; an empty list is
//! a defined zero result, never an error.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::protocol::TransferHeader;

/// Bytes per megabyte for throughput figures (MiB, matching the display).
pub const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

/// One in-flight measurement, published to the realtime observer as it is
/// taken. Exists only during a connection's handling.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct MetricsSample {
    pub elapsed_seconds: f64,
    pub throughput_mb_s: f64,
    pub cpu_percent: f64,
    pub ram_percent: f64,
}

/// Success iff the declared size was known and every byte arrived.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransferStatus {
    Success,
    Failed,
}

impl TransferStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            TransferStatus::Success => "Success",
            TransferStatus::Failed => "Failed",
        }
    }
}

impl fmt::Display for TransferStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Immutable summary of one handled connection, published exactly once to
/// the final-metrics observer and then discarded by the core.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TransferMetrics {
    pub file_name: String,
    /// Size the sender declared; `None` if the header did not carry one.
    pub file_size: Option<u64>,
    pub file_type: String,
    /// Wall-clock seconds from first to last body read.
    pub total_transfer_time: f64,
    /// End-to-end average, MB/s.
    pub throughput: f64,
    /// Max of the instantaneous sampled throughputs; equals `throughput`
    /// when no samples were taken.
    pub peak_throughput: f64,
    /// Declared size minus received bytes; 0 when the size was unknown.
    pub transfer_byte_difference: i64,
    pub transfer_status: TransferStatus,
    pub cpu_usage_avg: f64,
    pub cpu_usage_peak: f64,
    pub ram_usage_avg: f64,
    pub ram_usage_peak: f64,
}

/// Instantaneous throughput in MB/s, zero when no time has elapsed.
pub fn throughput_mb_s(bytes: u64, elapsed_seconds: f64) -> f64 {
    if elapsed_seconds <= 0.0 {
        0.0
    } else {
        bytes as f64 / elapsed_seconds / BYTES_PER_MB
    }
}

impl TransferMetrics {
    /// Derive the summary for one finished (or aborted) transfer.
    pub fn from_transfer(
        header: &TransferHeader,
        bytes_received: u64,
        total_transfer_time: f64,
        samples: &[MetricsSample],
    ) -> Self {
        let throughput = throughput_mb_s(bytes_received, total_transfer_time);
        let peak_throughput = if samples.is_empty() {
            throughput
        } else {
            peak(samples.iter().map(|s| s.throughput_mb_s))
        };
        let transfer_byte_difference = match header.file_size {
            Some(expected) => expected as i64 - bytes_received as i64,
            None => 0,
        };
        let transfer_status = match header.file_size {
            Some(expected) if expected == bytes_received => TransferStatus::Success,
            _ => TransferStatus::Failed,
        };
        Self {
            file_name: header.file_name.clone(),
            file_size: header.file_size,
            file_type: header.file_type.clone(),
            total_transfer_time,
            throughput,
            peak_throughput,
            transfer_byte_difference,
            transfer_status,
            cpu_usage_avg: mean(samples.iter().map(|s| s.cpu_percent)),
            cpu_usage_peak: peak(samples.iter().map(|s| s.cpu_percent)),
            ram_usage_avg: mean(samples.iter().map(|s| s.ram_percent)),
            ram_usage_peak: peak(samples.iter().map(|s| s.ram_percent)),
        }
    }

    /// Multi-line human-readable summary, as the daemon prints it.
    pub fn render(&self) -> String {
        let size = match self.file_size {
            Some(n) => format!("{n} bytes"),
            None => "unknown".to_string(),
        };
        format!(
            "File name: {}\n\
             File size: {}\n\
             File type: {}\n\
             \n\
             Total transfer time: {:.4} s\n\
             Avg throughput: {:.4} MB/s\n\
             Peak throughput: {:.4} MB/s\n\
             Transfer byte difference: {}\n\
             Transfer status: {}\n\
             \n\
             CPU avg: {:.2} %\n\
             CPU peak: {:.2} %\n\
             RAM avg: {:.2} %\n\
             RAM peak: {:.2} %",
            self.file_name,
            size,
            self.file_type,
            self.total_transfer_time,
            self.throughput,
            self.peak_throughput,
            self.transfer_byte_difference,
            self.transfer_status,
            self.cpu_usage_avg,
            self.cpu_usage_peak,
            self.ram_usage_avg,
            self.ram_usage_peak,
        )
    }
}

fn mean(values: impl Iterator<Item = f64>) -> f64 {
    let mut sum = 0.0;
    let mut count = 0usize;
    for v in values {
        sum += v;
        count += 1;
    }
    if count == 0 {
        0.0
    } else {
        sum / count as f64
    }
}

fn peak(values: impl Iterator<Item = f64>) -> f64 {
    values.fold(0.0, f64::max)
}
