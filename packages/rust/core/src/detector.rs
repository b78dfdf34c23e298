//! State detector: which bootstrap phase is the target platform in?
//!
//! Three signals are consulted:
//! 1. the control plane's own "owner configured" flag,
//! 2. the number of configured owner rows in the backing store,
//! 3. a login probe with the configured credentials.
//!
//! The row count is ground truth. The flag can be stale after a crash in the
//! middle of a previous bootstrap, so when both are available and disagree
//! the row count wins and the disagreement is logged.

use tracing::{debug, info, instrument, warn};

use datalive_control_plane::ControlPlane;
use datalive_shared::{DetectedState, DetectionSignals, OwnerIdentity, SessionArtifact};
use datalive_storage::Storage;

/// Detection result.
#[derive(Debug, Clone)]
pub struct Detection {
    pub state: DetectedState,
    pub signals: DetectionSignals,
    /// Session obtained by a successful login probe, reusable by the session phase.
    pub session: Option<SessionArtifact>,
}

/// Resolve the platform's bootstrap state. Never fails: unavailable signals
/// are recorded and the remaining ones decide.
#[instrument(skip_all, fields(email = %owner.email))]
pub async fn detect_state(
    control_plane: &dyn ControlPlane,
    storage: Option<&Storage>,
    owner: &OwnerIdentity,
) -> Detection {
    let mut signals = DetectionSignals::default();

    match control_plane.owner_configured().await {
        Ok(flag) => signals.api_flag = flag,
        Err(e) => {
            warn!(error = %e, "owner flag unavailable from control plane");
            signals.api_error = Some(e.to_string());
        }
    }

    if let Some(storage) = storage {
        match storage.count_configured_owners().await {
            Ok(rows) => signals.owner_rows = Some(rows),
            Err(e) => {
                warn!(error = %e, "owner count unavailable from backing store");
                signals.storage_error = Some(e.to_string());
            }
        }
    }

    let identity_exists = resolve_identity(&mut signals);
    debug!(?identity_exists, ?signals, "identity signals resolved");

    if identity_exists == Some(false) {
        info!(state = %DetectedState::Uninitialized, "state detected");
        return Detection {
            state: DetectedState::Uninitialized,
            signals,
            session: None,
        };
    }

    let (state, session) = match control_plane.login(&owner.email, &owner.password).await {
        Ok(session) => {
            signals.login_probe = Some(true);
            (DetectedState::AuthenticatedButUnconfigured, Some(session))
        }
        Err(e) => {
            debug!(error = %e, "login probe failed");
            signals.login_probe = Some(false);
            let state = if identity_exists == Some(true) {
                DetectedState::OwnerPending
            } else {
                DetectedState::Uninitialized
            };
            (state, None)
        }
    };

    info!(%state, "state detected");
    Detection {
        state,
        signals,
        session,
    }
}

/// Combine the flag and the row count into "does the identity exist".
/// `None` means neither signal was available.
fn resolve_identity(signals: &mut DetectionSignals) -> Option<bool> {
    match (signals.owner_rows, signals.api_flag) {
        (Some(rows), flag) => {
            let exists = rows > 0;
            if flag.is_some_and(|f| f != exists) {
                signals.divergent = true;
                warn!(
                    api_flag = ?flag,
                    owner_rows = rows,
                    "control-plane flag disagrees with backing store; trusting row count"
                );
            }
            Some(exists)
        }
        (None, Some(flag)) => Some(flag),
        (None, None) => None,
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;

    use super::*;
    use crate::testkit::{SimulatedPlatform, owner, scratch_storage};

    #[test]
    fn row_count_beats_flag() {
        let mut signals = DetectionSignals {
            api_flag: Some(true),
            owner_rows: Some(0),
            ..Default::default()
        };
        assert_eq!(resolve_identity(&mut signals), Some(false));
        assert!(signals.divergent);

        let mut signals = DetectionSignals {
            api_flag: Some(false),
            owner_rows: Some(1),
            ..Default::default()
        };
        assert_eq!(resolve_identity(&mut signals), Some(true));
        assert!(signals.divergent);
    }

    #[test]
    fn flag_decides_without_storage() {
        let mut signals = DetectionSignals {
            api_flag: Some(true),
            ..Default::default()
        };
        assert_eq!(resolve_identity(&mut signals), Some(true));
        assert!(!signals.divergent);

        let mut none = DetectionSignals::default();
        assert_eq!(resolve_identity(&mut none), None);
    }

    #[tokio::test]
    async fn fresh_platform_is_uninitialized() {
        let storage = scratch_storage().await;
        let platform = SimulatedPlatform::new(storage.clone());

        let detection = detect_state(&platform, Some(&*storage), &owner()).await;
        assert_eq!(detection.state, DetectedState::Uninitialized);
        assert_eq!(detection.signals.owner_rows, Some(0));
        assert_eq!(detection.signals.api_flag, Some(false));
        assert!(detection.session.is_none());
        assert_eq!(platform.login_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn stale_flag_with_no_rows_is_uninitialized() {
        let storage = scratch_storage().await;
        let platform = SimulatedPlatform::new(storage.clone());
        *platform.flag_override.lock().unwrap() = Some(true);

        let detection = detect_state(&platform, Some(&*storage), &owner()).await;
        assert_eq!(detection.state, DetectedState::Uninitialized);
        assert!(detection.signals.divergent);
    }

    #[tokio::test]
    async fn configured_owner_is_authenticated() {
        let storage = scratch_storage().await;
        storage.insert_owner(&owner()).await.unwrap();
        let platform = SimulatedPlatform::new(storage.clone());

        let detection = detect_state(&platform, Some(&*storage), &owner()).await;
        assert_eq!(detection.state, DetectedState::AuthenticatedButUnconfigured);
        assert_eq!(detection.signals.login_probe, Some(true));
        assert!(detection.session.is_some());
    }

    #[tokio::test]
    async fn wrong_password_is_owner_pending() {
        let storage = scratch_storage().await;
        storage.insert_owner(&owner()).await.unwrap();
        let platform = SimulatedPlatform::new(storage.clone());

        let mut configured = owner();
        configured.password = "rotated-password".into();
        let detection = detect_state(&platform, Some(&*storage), &configured).await;
        assert_eq!(detection.state, DetectedState::OwnerPending);
        assert_eq!(detection.signals.login_probe, Some(false));
    }

    #[tokio::test]
    async fn no_signals_falls_back_to_login_probe() {
        let storage = scratch_storage().await;
        let platform = SimulatedPlatform::new(storage.clone());
        platform.fail_settings.store(true, Ordering::SeqCst);

        let detection = detect_state(&platform, None, &owner()).await;
        assert_eq!(detection.state, DetectedState::Uninitialized);
        assert!(detection.signals.api_error.is_some());
        assert_eq!(detection.signals.login_probe, Some(false));

        storage.insert_owner(&owner()).await.unwrap();
        let detection = detect_state(&platform, None, &owner()).await;
        assert_eq!(detection.state, DetectedState::AuthenticatedButUnconfigured);
    }
}
