//! ferryd: receive files and report transfer metrics.

use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;
use std::time::Duration;

use ferry::cli::DaemonOpts;
use ferry::control::ServerHandle;
use ferry::metrics::TransferMetrics;
use ferry::observer::{FanoutObserver, JsonlMetricsLog, TextLogObserver, TransferObserver};
use ferry::server::ServerConfig;

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "ferry daemon - receive files over the header-delimited transfer protocol"
)]
struct Args {
    #[command(flatten)]
    opts: DaemonOpts,
}

/// Console sink: log lines and a rendered summary per transfer.
struct StdoutObserver;

impl TransferObserver for StdoutObserver {
    fn on_final_metrics(&self, metrics: &TransferMetrics) {
        println!("{}\n", metrics.render());
    }

    fn on_log(&self, message: &str) {
        println!("{message}");
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut sinks: Vec<Arc<dyn TransferObserver>> = vec![Arc::new(StdoutObserver)];
    if let Some(path) = &args.opts.log_file {
        let log = TextLogObserver::new(path)
            .with_context(|| format!("opening log file {}", path.display()))?;
        sinks.push(Arc::new(log));
    }
    if let Some(path) = &args.opts.metrics_log {
        sinks.push(Arc::new(JsonlMetricsLog::new(path)));
    }
    let observer: Arc<dyn TransferObserver> = Arc::new(FanoutObserver::new(sinks));

    // Floor of 1ms keeps a zero interval from sampling every chunk unless
    // the library user asks for that explicitly.
    let interval = Duration::from_millis(args.opts.sample_interval_ms.max(1));
    let config = ServerConfig::new(args.opts.bind.clone(), args.opts.save_dir.clone())
        .sample_interval(interval);

    let server = ServerHandle::new(config, observer);
    server
        .start()
        .await
        .with_context(|| format!("starting server on {}", args.opts.bind))?;

    tokio::signal::ctrl_c()
        .await
        .context("waiting for shutdown signal")?;
    println!("shutting down");
    server.stop().await;
    Ok(())
}
