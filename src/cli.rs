//! Shared CLI helpers and small reusable Clap fragments

use clap::Parser;
use std::path::PathBuf;

/// Port the daemon listens on unless told otherwise.
pub const DEFAULT_PORT: u16 = 5000;

/// Default peer host for the client: this machine's hostname, falling back
/// to loopback when it cannot be read.
pub fn default_host() -> String {
    hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .filter(|h| !h.is_empty())
        .unwrap_or_else(|| "127.0.0.1".to_string())
}

/// Common daemon options used by ferryd
#[derive(Clone, Debug, Parser)]
pub struct DaemonOpts {
    /// Bind address (host:port)
    #[arg(long, default_value = "0.0.0.0:5000")]
    pub bind: String,

    /// Directory where received files are stored (created if missing)
    #[arg(long, default_value = "received_files")]
    pub save_dir: PathBuf,

    /// Minimum milliseconds between metric samples
    #[arg(long, default_value_t = 1)]
    pub sample_interval_ms: u64,

    /// Append timestamped log lines to this file
    #[arg(long = "log-file")]
    pub log_file: Option<PathBuf>,

    /// Append one JSON metrics record per transfer to this file
    #[arg(long = "metrics-log")]
    pub metrics_log: Option<PathBuf>,
}

/// Options for the ferry send client
#[derive(Clone, Debug, Parser)]
pub struct SendOpts {
    /// File to send
    pub file: PathBuf,

    /// Server host (defaults to this machine's hostname)
    #[arg(long)]
    pub host: Option<String>,

    /// Server port
    #[arg(long, default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// Suppress the progress display
    #[arg(short, long)]
    pub quiet: bool,
}
