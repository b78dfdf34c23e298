//! Session manager: authenticate once, reuse the artifact for the whole run.

use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use datalive_control_plane::ControlPlane;
use datalive_shared::{BootstrapError, OwnerIdentity, Result, SessionArtifact, SessionSettings};

/// Log in with bounded retries and linear backoff.
///
/// Exhausting the attempts means the identity cannot authenticate, which the
/// caller treats as fatal.
#[instrument(skip_all, fields(email = %owner.email, attempts = settings.attempts))]
pub async fn login_with_retry(
    control_plane: &dyn ControlPlane,
    owner: &OwnerIdentity,
    settings: &SessionSettings,
) -> Result<(SessionArtifact, u32)> {
    let attempts = settings.attempts.max(1);
    let mut last_error = None;

    for attempt in 1..=attempts {
        match control_plane.login(&owner.email, &owner.password).await {
            Ok(session) => {
                info!(attempt, "session established");
                return Ok((session, attempt));
            }
            Err(e) => {
                warn!(attempt, attempts, error = %e, "login failed");
                last_error = Some(e);
            }
        }
        if attempt < attempts {
            tokio::time::sleep(settings.backoff * attempt).await;
        }
    }

    Err(last_error.unwrap_or_else(|| BootstrapError::api(401, "login failed")))
}

#[derive(Serialize)]
struct SessionFile<'a> {
    run_id: &'a str,
    created_at: String,
    session: &'a SessionArtifact,
}

/// Write the session artifact to `{dir}/session-{run_id}.json`, readable by
/// the owner only.
pub fn persist_session(dir: &Path, run_id: &str, session: &SessionArtifact) -> Result<PathBuf> {
    std::fs::create_dir_all(dir).map_err(|e| BootstrapError::io(dir, e))?;
    let path = dir.join(format!("session-{run_id}.json"));

    let json = serde_json::to_vec_pretty(&SessionFile {
        run_id,
        created_at: Utc::now().to_rfc3339(),
        session,
    })
    .map_err(|e| BootstrapError::validation(format!("failed to serialize session: {e}")))?;

    let mut options = std::fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    let mut file = options.open(&path).map_err(|e| BootstrapError::io(&path, e))?;
    file.write_all(&json)
        .map_err(|e| BootstrapError::io(&path, e))?;

    // `mode` only applies on creation; tighten a pre-existing file too.
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o600))
            .map_err(|e| BootstrapError::io(&path, e))?;
    }

    debug!(path = %path.display(), "session artifact persisted");
    Ok(path)
}

/// Remove the transient session file. Failures are only logged.
pub fn discard_session(path: &Path) {
    match std::fs::remove_file(path) {
        Ok(()) => debug!(path = %path.display(), "session file removed"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!(path = %path.display(), error = %e, "failed to remove session file"),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;
    use std::time::Duration;

    use super::*;
    use crate::testkit::{SimulatedPlatform, owner, scratch_dir, scratch_storage};

    fn settings(attempts: u32) -> SessionSettings {
        SessionSettings {
            attempts,
            backoff: Duration::from_millis(1),
            dir: std::env::temp_dir(),
            keep_file: false,
        }
    }

    #[tokio::test]
    async fn login_succeeds_first_try() {
        let storage = scratch_storage().await;
        storage.insert_owner(&owner()).await.unwrap();
        let platform = SimulatedPlatform::new(storage);

        let (_, attempts) = login_with_retry(&platform, &owner(), &settings(3))
            .await
            .expect("login");
        assert_eq!(attempts, 1);
    }

    #[tokio::test]
    async fn login_retries_are_bounded() {
        let storage = scratch_storage().await;
        let platform = SimulatedPlatform::new(storage);

        let err = login_with_retry(&platform, &owner(), &settings(3))
            .await
            .unwrap_err();
        assert_eq!(err.status(), Some(401));
        assert_eq!(platform.login_calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn session_file_roundtrip_and_removal() {
        let dir = scratch_dir("datalive_session");
        let session = SessionArtifact::Bearer {
            token: "tok-123".into(),
        };

        let path = persist_session(&dir, "run-1", &session).expect("persist");
        assert_eq!(path.file_name().unwrap(), "session-run-1.json");

        let raw = std::fs::read_to_string(&path).unwrap();
        let json: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(json["run_id"], "run-1");
        assert_eq!(json["session"]["kind"], "bearer");

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = std::fs::metadata(&path).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o600);
        }

        discard_session(&path);
        assert!(!path.exists());
        discard_session(&path);
        let _ = std::fs::remove_dir_all(&dir);
    }
}
