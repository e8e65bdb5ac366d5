//! TCP readiness polling for the backend port.
//!
//! A probe is a bare connect with a timeout; nothing is sent over the socket.
//! Failed probes are retried after a fixed delay until the policy gives up or
//! the shutdown token fires.

use std::time::Duration;

use serde::Serialize;
use tokio::{
    net::TcpStream,
    time::{self, Instant},
};
use tokio_util::sync::CancellationToken;

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::{log_info, log_warn};

/// How often to log a still-waiting line while the backend boots.
const WAITING_LOG_EVERY: u32 = 10;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub probe_timeout: Duration,
    pub retry_delay: Duration,
    pub max_attempts: Option<u32>,
    pub max_wait: Option<Duration>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            probe_timeout: Duration::from_secs(2),
            retry_delay: Duration::from_millis(500),
            max_attempts: None,
            max_wait: Some(Duration::from_secs(120)),
        }
    }
}

impl RetryPolicy {
    fn exhausted(&self, attempts: u32, elapsed: Duration) -> bool {
        if self.max_attempts.is_some_and(|max| attempts >= max) {
            return true;
        }
        self.max_wait.is_some_and(|max| elapsed >= max)
    }
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ReadyReport {
    pub attempts: u32,
    pub elapsed_ms: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    Ready(ReadyReport),
    Exhausted { attempts: u32, elapsed: Duration },
    Cancelled { attempts: u32 },
}

/// Single connect attempt. The stream is dropped immediately on success.
pub async fn probe_port(addr: &str, timeout: Duration) -> bool {
    match time::timeout(timeout, TcpStream::connect(addr)).await {
        Ok(Ok(stream)) => {
            drop(stream);
            true
        }
        Ok(Err(err)) => {
            log::debug!("probe {addr} failed: {err}");
            false
        }
        Err(_) => {
            log::debug!("probe {addr} timed out after {}ms", timeout.as_millis());
            false
        }
    }
}

/// Polls `addr` until it accepts a connection, then calls `on_ready` once.
///
/// `on_ready` is never called for the `Exhausted` or `Cancelled` outcomes.
pub async fn wait_until_ready<F>(
    addr: &str,
    policy: &RetryPolicy,
    cancel: &CancellationToken,
    on_ready: F,
) -> PollOutcome
where
    F: FnOnce(ReadyReport),
{
    let started = Instant::now();
    let mut attempts: u32 = 0;

    loop {
        if cancel.is_cancelled() {
            return PollOutcome::Cancelled { attempts };
        }

        attempts = attempts.saturating_add(1);
        let open = tokio::select! {
            open = probe_port(addr, policy.probe_timeout) => open,
            _ = cancel.cancelled() => return PollOutcome::Cancelled { attempts },
        };

        if open {
            let report = ReadyReport {
                attempts,
                elapsed_ms: started.elapsed().as_millis() as u64,
            };
            log_info!(
                "{addr} accepted a connection after {} attempt(s), {}ms",
                report.attempts,
                report.elapsed_ms
            );
            on_ready(report);
            return PollOutcome::Ready(report);
        }

        let elapsed = started.elapsed();
        if policy.exhausted(attempts, elapsed) {
            log_warn!("giving up on {addr} after {attempts} attempts");
            return PollOutcome::Exhausted { attempts, elapsed };
        }

        if attempts % WAITING_LOG_EVERY == 0 {
            log_info!("still waiting for {addr} ({attempts} attempts)");
        }

        tokio::select! {
            _ = time::sleep(policy.retry_delay) => {}
            _ = cancel.cancelled() => return PollOutcome::Cancelled { attempts },
        }
    }
}
