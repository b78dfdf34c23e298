//! Identity bootstrapper: create the single administrative identity.
//!
//! Writers are tried in order. [`ApiWriter`] uses the platform's one-time
//! owner registration; [`StorageWriter`] inserts the identity directly into
//! the backing store and is the only place that knows about password hashing
//! and linkage rows.

use std::fmt;

use async_trait::async_trait;
use tracing::{info, instrument, warn};

use datalive_control_plane::ControlPlane;
use datalive_shared::{BootstrapError, OwnerIdentity, Result};
use datalive_storage::Storage;

/// A way of creating the owner identity.
#[async_trait]
pub trait IdentityWriter: Send + Sync {
    /// Short name used in logs and the run report.
    fn name(&self) -> &'static str;

    /// Create the identity and return its user id. Success means every
    /// invariant of a usable identity holds.
    async fn write(&self, owner: &OwnerIdentity) -> Result<String>;
}

/// Primary path: the control plane's owner registration endpoint.
pub struct ApiWriter<'a> {
    control_plane: &'a dyn ControlPlane,
}

impl<'a> ApiWriter<'a> {
    pub fn new(control_plane: &'a dyn ControlPlane) -> Self {
        Self { control_plane }
    }
}

#[async_trait]
impl IdentityWriter for ApiWriter<'_> {
    fn name(&self) -> &'static str {
        "api"
    }

    async fn write(&self, owner: &OwnerIdentity) -> Result<String> {
        let user = self.control_plane.setup_owner(owner).await?;
        if user.id.is_empty() {
            return Err(BootstrapError::api(200, "owner setup returned an empty identifier"));
        }
        Ok(user.id)
    }
}

/// Fallback path: privileged insert into the backing store.
pub struct StorageWriter<'a> {
    storage: Option<&'a Storage>,
}

impl<'a> StorageWriter<'a> {
    pub fn new(storage: Option<&'a Storage>) -> Self {
        Self { storage }
    }
}

#[async_trait]
impl IdentityWriter for StorageWriter<'_> {
    fn name(&self) -> &'static str {
        "storage"
    }

    async fn write(&self, owner: &OwnerIdentity) -> Result<String> {
        let storage = self.storage.ok_or_else(|| {
            BootstrapError::config(
                "no backing-store channel configured ([storage] path or url); fallback unavailable",
            )
        })?;

        // A primary call that timed out may still have created the identity.
        if let Some(check) = storage.verify_owner(&owner.email).await? {
            if check.is_complete() {
                info!(user_id = %check.user_id, "owner identity already present in backing store");
                return Ok(check.user_id);
            }
        }

        storage.insert_owner(owner).await?;

        let check = storage
            .verify_owner(&owner.email)
            .await?
            .ok_or_else(|| BootstrapError::Storage("owner row missing after insert".into()))?;
        if !check.is_complete() {
            return Err(BootstrapError::Storage(format!(
                "owner identity incomplete after insert (owner role: {}, password: {}, personal project: {})",
                check.is_owner,
                check.has_password,
                check.personal_project.is_some()
            )));
        }
        Ok(check.user_id)
    }
}

/// Successful identity creation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityCreated {
    pub user_id: String,
    /// Name of the writer that succeeded.
    pub writer: &'static str,
}

/// Every writer failed.
#[derive(Debug)]
pub struct IdentityFailure {
    pub attempts: Vec<(&'static str, BootstrapError)>,
}

impl fmt::Display for IdentityFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("owner identity could not be created")?;
        for (writer, error) in &self.attempts {
            write!(f, "; {writer}: {error}")?;
        }
        Ok(())
    }
}

/// Tries each [`IdentityWriter`] in order until one succeeds.
pub struct IdentityBootstrapper<'a> {
    writers: Vec<Box<dyn IdentityWriter + 'a>>,
}

impl<'a> IdentityBootstrapper<'a> {
    /// API first, backing store second.
    pub fn new(control_plane: &'a dyn ControlPlane, storage: Option<&'a Storage>) -> Self {
        Self::with_writers(vec![
            Box::new(ApiWriter::new(control_plane)),
            Box::new(StorageWriter::new(storage)),
        ])
    }

    pub fn with_writers(writers: Vec<Box<dyn IdentityWriter + 'a>>) -> Self {
        Self { writers }
    }

    #[instrument(skip_all, fields(email = %owner.email))]
    pub async fn bootstrap(
        &self,
        owner: &OwnerIdentity,
    ) -> std::result::Result<IdentityCreated, IdentityFailure> {
        let mut attempts = Vec::new();
        for writer in &self.writers {
            match writer.write(owner).await {
                Ok(user_id) => {
                    info!(writer = writer.name(), %user_id, "owner identity created");
                    return Ok(IdentityCreated {
                        user_id,
                        writer: writer.name(),
                    });
                }
                Err(e) => {
                    warn!(writer = writer.name(), error = %e, "identity writer failed");
                    attempts.push((writer.name(), e));
                }
            }
        }
        Err(IdentityFailure { attempts })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;

    use super::*;
    use crate::testkit::{SimulatedPlatform, owner, scratch_storage};

    #[tokio::test]
    async fn api_path_creates_owner() {
        let storage = scratch_storage().await;
        let platform = SimulatedPlatform::new(storage.clone());

        let created = IdentityBootstrapper::new(&platform, Some(&*storage))
            .bootstrap(&owner())
            .await
            .expect("bootstrap");
        assert_eq!(created.writer, "api");
        assert_eq!(storage.count_configured_owners().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn fallback_is_equivalent_to_api() {
        let storage = scratch_storage().await;
        let platform = SimulatedPlatform::new(storage.clone());
        platform.fail_owner_setup.store(true, Ordering::SeqCst);

        let created = IdentityBootstrapper::new(&platform, Some(&*storage))
            .bootstrap(&owner())
            .await
            .expect("bootstrap");
        assert_eq!(created.writer, "storage");

        let owner = owner();
        platform
            .login(&owner.email, &owner.password)
            .await
            .expect("login after fallback");
        assert_eq!(platform.owner_configured().await.unwrap(), Some(true));
    }

    #[tokio::test]
    async fn both_paths_failing_reports_each() {
        let storage = scratch_storage().await;
        let platform = SimulatedPlatform::new(storage.clone());
        platform.fail_owner_setup.store(true, Ordering::SeqCst);

        let failure = IdentityBootstrapper::new(&platform, None)
            .bootstrap(&owner())
            .await
            .unwrap_err();
        assert_eq!(failure.attempts.len(), 2);
        let message = failure.to_string();
        assert!(message.contains("api:"));
        assert!(message.contains("fallback unavailable"));
    }

    #[tokio::test]
    async fn storage_writer_accepts_existing_complete_owner() {
        let storage = scratch_storage().await;
        let first = storage.insert_owner(&owner()).await.unwrap();

        let id = StorageWriter::new(Some(&*storage))
            .write(&owner())
            .await
            .expect("idempotent write");
        assert_eq!(id, first);
        assert_eq!(storage.count_configured_owners().await.unwrap(), 1);
    }
}
