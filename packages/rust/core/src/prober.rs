//! Readiness prober: bounded polling of the platform's liveness endpoint.

use tracing::{debug, info, instrument, warn};

use datalive_control_plane::ControlPlane;
use datalive_shared::{BootstrapError, ReadinessSettings, Result};

/// Successful readiness probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Readiness {
    /// Number of liveness requests made, including the successful one.
    pub attempts: u32,
}

/// Maximum number of liveness requests for the given window.
pub fn max_attempts(settings: &ReadinessSettings) -> u32 {
    let interval = settings.poll_interval.as_millis().max(1);
    let polls = settings.max_wait.as_millis() / interval;
    u32::try_from(polls).unwrap_or(u32::MAX).saturating_add(1)
}

/// Poll until the platform answers healthy or the attempt budget runs out.
///
/// A timeout is returned as [`BootstrapError::Timeout`]; the caller treats it
/// as fatal.
#[instrument(skip_all, fields(max_wait_secs = settings.max_wait.as_secs()))]
pub async fn wait_until_ready(
    control_plane: &dyn ControlPlane,
    settings: &ReadinessSettings,
) -> Result<Readiness> {
    let limit = max_attempts(settings);
    let mut last_error = String::from("no response");

    for attempt in 1..=limit {
        match control_plane.health().await {
            Ok(()) => {
                info!(attempt, "platform is ready");
                return Ok(Readiness { attempts: attempt });
            }
            Err(e) => {
                debug!(attempt, limit, error = %e, "platform not ready");
                last_error = e.to_string();
            }
        }
        if attempt < limit {
            tokio::time::sleep(settings.poll_interval).await;
        }
    }

    warn!(attempts = limit, "platform did not become ready");
    Err(BootstrapError::Timeout(format!(
        "platform not ready after {} attempts over {}s (last error: {last_error})",
        limit,
        settings.max_wait.as_secs()
    )))
}
