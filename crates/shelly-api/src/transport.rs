// Shared transport configuration for building reqwest::Client instances.
//
// Both the Gen1 and RPC clients share pooling, timeout, and retry settings
// through this module, avoiding duplicated builder logic.

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::Error;

/// Retry policy for transient transport failures.
///
/// Only connection failures and timeouts are retried; a 4xx response or an
/// RPC-level error means the device heard us and said no.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Additional attempts after the first (not total attempts).
    pub retries: u32,
    /// Delay before each retry.
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            retries: 1,
            backoff: Duration::from_millis(250),
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries (used by discovery probes, which sweep
    /// hundreds of addresses and treat silence as "not a Shelly").
    pub fn none() -> Self {
        Self {
            retries: 0,
            backoff: Duration::ZERO,
        }
    }
}

/// Shared transport configuration for building HTTP clients.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Per-request deadline.
    pub timeout: Duration,
    /// TCP connect deadline, kept short for subnet sweeps.
    pub connect_timeout: Duration,
    /// How long idle pooled connections are kept per host.
    pub pool_idle_timeout: Duration,
    pub retry: RetryPolicy,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(5),
            connect_timeout: Duration::from_secs(1),
            pool_idle_timeout: Duration::from_secs(30),
            retry: RetryPolicy::default(),
        }
    }
}

impl TransportConfig {
    /// Build a `reqwest::Client` from this config.
    pub fn build_client(&self) -> Result<reqwest::Client, Error> {
        reqwest::Client::builder()
            .timeout(self.timeout)
            .connect_timeout(self.connect_timeout)
            .pool_idle_timeout(self.pool_idle_timeout)
            .user_agent(concat!("shellyctl/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(Error::Transport)
    }
}

/// Run `attempt` under the retry policy and cancellation token.
///
/// The closure is re-invoked for each attempt so the request is rebuilt
/// fresh. Cancellation wins over everything, including the backoff sleep.
pub(crate) async fn with_retry<F, Fut>(
    retry: RetryPolicy,
    cancel: &CancellationToken,
    mut attempt: F,
) -> Result<reqwest::Response, Error>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<reqwest::Response, reqwest::Error>>,
{
    let mut remaining = retry.retries;

    loop {
        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(Error::Cancelled),
            r = attempt() => r,
        };

        match result {
            Ok(resp) => return Ok(resp),
            Err(e) => {
                let err = Error::Transport(e);
                if remaining == 0 || !err.is_transient() {
                    return Err(err);
                }
                remaining -= 1;
                debug!(error = %err, backoff_ms = retry.backoff.as_millis() as u64, "retrying after transient error");
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return Err(Error::Cancelled),
                    _ = tokio::time::sleep(retry.backoff) => {}
                }
            }
        }
    }
}
