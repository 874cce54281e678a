//! Start/stop orchestration around the listener, exposed to external
//! callers (CLI, tests, embedding UIs).
//!
//! `start` is idempotent while a serve task is alive; `stop` asks the
//! listener to shut down and waits a bounded time for the task to finish.
//! Stopping a server that was never started is a no-op.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;

use crate::error::ListenerError;
use crate::observer::TransferObserver;
use crate::server::{Listener, ServerConfig, ShutdownHandle};

/// How long `stop` waits for the serve task to wind down.
pub const STOP_WAIT: Duration = Duration::from_secs(1);

pub struct ServerHandle {
    config: ServerConfig,
    observer: Arc<dyn TransferObserver>,
    inner: Mutex<Option<Running>>,
}

struct Running {
    shutdown: ShutdownHandle,
    task: JoinHandle<()>,
    local_addr: SocketAddr,
}

impl ServerHandle {
    pub fn new(config: ServerConfig, observer: Arc<dyn TransferObserver>) -> Self {
        Self {
            config,
            observer,
            inner: Mutex::new(None),
        }
    }

    /// Bind and spawn the accept loop, unless a live serve task already
    /// exists; repeated starts are a no-op.
    pub async fn start(&self) -> Result<(), ListenerError> {
        {
            let guard = self.inner.lock();
            if let Some(running) = guard.as_ref() {
                if !running.task.is_finished() {
                    return Ok(());
                }
            }
        }

        let listener = Listener::bind(self.config.clone()).await?;
        let local_addr = listener.local_addr();
        let shutdown = listener.shutdown_handle();
        let observer = Arc::clone(&self.observer);
        let task = tokio::spawn(async move {
            if let Err(e) = listener.serve(Arc::clone(&observer)).await {
                observer.on_log(&format!("server error: {e}"));
            }
        });

        *self.inner.lock() = Some(Running {
            shutdown,
            task,
            local_addr,
        });
        Ok(())
    }

    /// Signal shutdown and wait (bounded) for the serve task. In-flight
    /// connection handlers are not aborted; they run to completion.
    pub async fn stop(&self) {
        let running = self.inner.lock().take();
        if let Some(running) = running {
            running.shutdown.stop();
            let _ = tokio::time::timeout(STOP_WAIT, running.task).await;
        }
    }

    pub fn is_running(&self) -> bool {
        self.inner
            .lock()
            .as_ref()
            .map(|r| !r.task.is_finished())
            .unwrap_or(false)
    }

    /// Actual bound address, once started. Useful with port-0 binds.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.inner.lock().as_ref().map(|r| r.local_addr)
    }
}
