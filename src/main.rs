//! ferry: send a file to a ferryd daemon.

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

use ferry::cli::{default_host, SendOpts};
use ferry::client::send_file;
use ferry::metrics::BYTES_PER_MB;
use ferry::observer::TransferObserver;

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Send a file to a ferryd daemon over the header-delimited transfer protocol"
)]
struct Args {
    #[command(flatten)]
    opts: SendOpts,
}

/// Routes core log events above the spinner line.
struct SpinnerObserver {
    bar: ProgressBar,
}

impl TransferObserver for SpinnerObserver {
    fn on_log(&self, message: &str) {
        self.bar.println(format!("  {message}"));
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let host = args.opts.host.clone().unwrap_or_else(default_host);

    let bar = if args.opts.quiet {
        ProgressBar::hidden()
    } else {
        let spinner = ProgressBar::new_spinner();
        spinner.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.green} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        spinner.enable_steady_tick(Duration::from_millis(100));
        spinner
    };
    bar.set_message(format!(
        "Sending {} to {host}:{}",
        args.opts.file.display(),
        args.opts.port
    ));
    let observer = SpinnerObserver { bar: bar.clone() };

    let report = send_file(&host, args.opts.port, &args.opts.file, &observer)
        .await
        .with_context(|| format!("sending {}", args.opts.file.display()))?;

    let secs = report.elapsed.as_secs_f64();
    let rate = if secs > 0.0 {
        report.bytes_sent as f64 / secs / BYTES_PER_MB
    } else {
        0.0
    };
    bar.finish_with_message(format!(
        "Sent {} ({} bytes) in {:.2}s ({:.2} MB/s)",
        report.file_name, report.bytes_sent, secs, rate
    ));
    Ok(())
}
