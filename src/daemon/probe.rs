// Readiness probing
//
// Polls a health probe until the worker answers `ok: true` or the deadline
// passes. Transport failures and `ok: false` both mean "not yet ready".

use std::future::Future;
use std::time::Duration;

use tokio::time::{sleep, Instant};
use tracing::trace;

use crate::error::{AgentError, Result};
use crate::types::HealthStatus;

/// Wait for the probe to report ready.
///
/// Probes immediately, then sleeps `interval` between attempts, yielding the
/// scheduler each time. Returns the first healthy status, or
/// `AgentError::Timeout` once `timeout` has elapsed. Calling this against an
/// already-ready worker returns on the first probe.
pub async fn wait_until_ready<F, Fut>(
    mut probe: F,
    timeout: Duration,
    interval: Duration,
) -> Result<HealthStatus>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<HealthStatus>>,
{
    let start = Instant::now();
    loop {
        match probe().await {
            Ok(health) if health.ok => return Ok(health),
            Ok(_) => trace!("Worker answered but is not ready yet"),
            Err(e) => trace!(error = %e, "Readiness probe failed"),
        }

        if start.elapsed() >= timeout {
            return Err(AgentError::Timeout { waited: timeout });
        }
        sleep(interval).await;
    }
}
