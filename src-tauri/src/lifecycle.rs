use std::{
    sync::{Mutex, MutexGuard, PoisonError},
    time::Duration,
};

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::time;
use tokio_util::sync::CancellationToken;

use crate::{
    backend::{locate, stale, BackendLayout, BackendSupervisor},
    client::BackendClient,
    config::{BuildVariant, ShellConfig},
    error::ShellError,
    readiness::{wait_until_ready, PollOutcome, ReadyReport},
};

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::{log_error, log_info, log_warn};

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "state", rename_all = "camelCase")]
pub enum ShellStatus {
    Starting {
        since: DateTime<Utc>,
    },
    #[serde(rename_all = "camelCase")]
    Ready {
        pid: Option<u32>,
        attempts: u32,
        elapsed_ms: u64,
        at: DateTime<Utc>,
    },
    Failed {
        reason: String,
        at: DateTime<Utc>,
    },
    Stopped {
        at: DateTime<Utc>,
    },
}

/// Application-run context: owns the backend handle, the shell status and the
/// token that cancels readiness polling at shutdown.
pub struct ShellLifecycle {
    config: ShellConfig,
    supervisor: Mutex<BackendSupervisor>,
    status: Mutex<ShellStatus>,
    shutdown: CancellationToken,
    client: BackendClient,
}

impl ShellLifecycle {
    pub fn new(config: ShellConfig, supervisor: BackendSupervisor) -> Result<Self> {
        let client = BackendClient::new(config.backend_base_url())?;
        Ok(Self {
            config,
            supervisor: Mutex::new(supervisor),
            status: Mutex::new(ShellStatus::Starting { since: Utc::now() }),
            shutdown: CancellationToken::new(),
            client,
        })
    }

    pub fn config(&self) -> &ShellConfig {
        &self.config
    }

    pub fn client(&self) -> &BackendClient {
        &self.client
    }

    pub fn status(&self) -> ShellStatus {
        lock(&self.status).clone()
    }

    pub fn ensure_ready(&self) -> Result<(), ShellError> {
        match self.status() {
            ShellStatus::Ready { .. } => Ok(()),
            _ => Err(ShellError::NotReady),
        }
    }

    /// Locates and spawns the backend, then waits for its port. `on_ready` runs
    /// at most once, only after the first successful probe.
    ///
    /// `Ok(None)` means shutdown cancelled the wait. Errors leave the shell in
    /// the `Failed` state.
    pub async fn start<F>(
        &self,
        layout: &BackendLayout,
        on_ready: F,
    ) -> Result<Option<ReadyReport>, ShellError>
    where
        F: FnOnce(ReadyReport),
    {
        let pid = match self.launch_backend(layout) {
            Ok(pid) => pid,
            Err(err) => return Err(self.fail(err)),
        };

        let addr = self.config.backend_addr();
        let policy = self.config.retry_policy();
        log_info!("waiting for backend on {addr}");

        let outcome = tokio::select! {
            outcome = wait_until_ready(&addr, &policy, &self.shutdown, on_ready) => outcome,
            _ = self.watch_backend_exit(policy.retry_delay) => {
                if self.shutdown.is_cancelled() {
                    return Ok(None);
                }
                return Err(self.fail(ShellError::BackendExited));
            }
        };

        match outcome {
            PollOutcome::Ready(report) => {
                self.set_status(ShellStatus::Ready {
                    pid: Some(pid),
                    attempts: report.attempts,
                    elapsed_ms: report.elapsed_ms,
                    at: Utc::now(),
                });
                Ok(Some(report))
            }
            PollOutcome::Exhausted { attempts, elapsed } => {
                lock(&self.supervisor).stop();
                Err(self.fail(ShellError::BackendUnreachable {
                    attempts,
                    waited: elapsed,
                }))
            }
            PollOutcome::Cancelled { attempts } => {
                log_info!("backend wait cancelled after {attempts} attempts");
                Ok(None)
            }
        }
    }

    fn launch_backend(&self, layout: &BackendLayout) -> Result<u32, ShellError> {
        let plan = locate(layout)?;
        log_info!("launching {:?} backend from {}", plan.variant, plan.entrypoint().display());
        if plan.variant == BuildVariant::Packaged {
            let reaped = stale::reap_stale_backends(&plan.program);
            if reaped > 0 {
                log_warn!("reaped {reaped} stale backend process(es)");
            }
        }
        lock(&self.supervisor).start(&plan)
    }

    /// Resolves once the spawned backend has exited.
    async fn watch_backend_exit(&self, every: Duration) {
        loop {
            time::sleep(every).await;
            let running = lock(&self.supervisor).is_running();
            if !running {
                return;
            }
        }
    }

    /// Stops polling and kills the backend. Safe to call repeatedly.
    pub fn shutdown(&self) -> bool {
        self.shutdown.cancel();
        let (pid, killed) = {
            let mut supervisor = lock(&self.supervisor);
            (supervisor.pid(), supervisor.stop())
        };
        if let (true, Some(pid)) = (killed, pid) {
            log_info!("backend pid {pid} stopped at shutdown");
            self.set_status(ShellStatus::Stopped { at: Utc::now() });
        }
        killed
    }

    fn fail(&self, err: ShellError) -> ShellError {
        log_error!("startup failed: {err}");
        self.set_status(ShellStatus::Failed {
            reason: err.to_string(),
            at: Utc::now(),
        });
        err
    }

    fn set_status(&self, status: ShellStatus) {
        *lock(&self.status) = status;
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
