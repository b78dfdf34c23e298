//! Entitlement activator. Always best-effort.

use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use datalive_control_plane::ControlPlane;
use datalive_shared::SessionArtifact;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum EntitlementOutcome {
    /// No activation key configured.
    Skipped,
    Activated,
    Failed { error: String },
}

/// Submit the activation key, if any. Never fails the run.
#[instrument(skip_all, fields(has_key = key.is_some()))]
pub async fn activate(
    control_plane: &dyn ControlPlane,
    session: &SessionArtifact,
    key: Option<&str>,
) -> EntitlementOutcome {
    let Some(key) = key else {
        info!("no activation key configured");
        return EntitlementOutcome::Skipped;
    };

    match control_plane.activate_license(session, key).await {
        Ok(()) => {
            info!("license activated");
            EntitlementOutcome::Activated
        }
        Err(e) => {
            warn!(error = %e, "license activation failed; continuing");
            EntitlementOutcome::Failed {
                error: e.to_string(),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testkit::{SimulatedPlatform, VALID_LICENSE, login, owner, scratch_storage};

    async fn platform() -> SimulatedPlatform {
        let storage = scratch_storage().await;
        storage.insert_owner(&owner()).await.unwrap();
        SimulatedPlatform::new(storage)
    }

    #[tokio::test]
    async fn missing_key_is_skipped() {
        let platform = platform().await;
        let session = login(&platform).await;
        assert_eq!(
            activate(&platform, &session, None).await,
            EntitlementOutcome::Skipped
        );
    }

    #[tokio::test]
    async fn valid_key_activates() {
        let platform = platform().await;
        let session = login(&platform).await;
        assert_eq!(
            activate(&platform, &session, Some(VALID_LICENSE)).await,
            EntitlementOutcome::Activated
        );
        assert_eq!(platform.license().as_deref(), Some(VALID_LICENSE));
    }

    #[tokio::test]
    async fn invalid_key_is_reported_not_raised() {
        let platform = platform().await;
        let session = login(&platform).await;
        let outcome = activate(&platform, &session, Some("bogus")).await;
        match outcome {
            EntitlementOutcome::Failed { error } => assert!(error.contains("invalid")),
            other => panic!("expected failure, got {other:?}"),
        }
    }
}
