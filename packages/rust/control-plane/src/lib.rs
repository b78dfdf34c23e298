//! Control-plane access for the automation platform.
//!
//! [`ControlPlane`] is the seam every bootstrap phase talks through. The
//! production implementation is [`ControlPlaneClient`] (reqwest over the
//! platform's REST API); tests substitute in-process doubles.
//!
//! The API's shape is treated as an external contract that drifts between
//! platform versions, so responses are read by field presence (see
//! `shapes`) rather than deserialized into fixed structs.

mod client;
mod shapes;

use async_trait::async_trait;
use serde_json::Value;

use datalive_shared::{
    NewCredential, OwnerIdentity, RemoteCredential, RemoteUser, RemoteWorkflow, Result,
    SessionArtifact,
};

pub use client::{ClientOptions, ControlPlaneClient};

/// Operations the bootstrapper needs from the platform's management API.
#[async_trait]
pub trait ControlPlane: Send + Sync {
    /// Liveness check. `Ok` only on a 2xx answer.
    async fn health(&self) -> Result<()>;

    /// The platform's own "owner is configured" flag; `None` when the
    /// response does not carry one.
    async fn owner_configured(&self) -> Result<Option<bool>>;

    /// One-time owner registration.
    async fn setup_owner(&self, owner: &OwnerIdentity) -> Result<RemoteUser>;

    /// Authenticate and return the session artifact.
    async fn login(&self, email: &str, password: &str) -> Result<SessionArtifact>;

    async fn activate_license(&self, session: &SessionArtifact, key: &str) -> Result<()>;

    async fn list_credentials(&self, session: &SessionArtifact) -> Result<Vec<RemoteCredential>>;

    async fn create_credential(
        &self,
        session: &SessionArtifact,
        credential: &NewCredential,
    ) -> Result<RemoteCredential>;

    async fn list_workflows(&self, session: &SessionArtifact) -> Result<Vec<RemoteWorkflow>>;

    async fn create_workflow(
        &self,
        session: &SessionArtifact,
        definition: &Value,
    ) -> Result<RemoteWorkflow>;

    /// Replace the definition of workflow `id`.
    async fn update_workflow(
        &self,
        session: &SessionArtifact,
        id: &str,
        definition: &Value,
    ) -> Result<RemoteWorkflow>;

    async fn activate_workflow(
        &self,
        session: &SessionArtifact,
        workflow: &RemoteWorkflow,
    ) -> Result<()>;
}
