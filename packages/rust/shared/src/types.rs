//! Core domain types for a bootstrap run.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Run phases and states
// ---------------------------------------------------------------------------

/// Initialization state of the target platform, as resolved by the detector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DetectedState {
    /// No administrative identity exists yet.
    Uninitialized,
    /// The identity exists but the configured credentials do not log in (yet).
    OwnerPending,
    /// A login with the configured credentials succeeded.
    AuthenticatedButUnconfigured,
}

impl std::fmt::Display for DetectedState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Uninitialized => "UNINITIALIZED",
            Self::OwnerPending => "OWNER_PENDING",
            Self::AuthenticatedButUnconfigured => "AUTHENTICATED_BUT_UNCONFIGURED",
        };
        f.write_str(s)
    }
}

/// Final marker of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FinalPhase {
    Ready,
    Degraded,
    Failed,
}

impl FinalPhase {
    /// Process exit code for this marker.
    pub fn exit_code(self) -> i32 {
        match self {
            Self::Ready => 0,
            Self::Failed => 1,
            Self::Degraded => 2,
        }
    }
}

impl std::fmt::Display for FinalPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Ready => "READY",
            Self::Degraded => "DEGRADED",
            Self::Failed => "FAILED",
        };
        f.write_str(s)
    }
}

/// The ordered phases of a bootstrap run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Readiness,
    StateDetection,
    Identity,
    Session,
    Entitlement,
    Credentials,
    Workflows,
}

impl Phase {
    /// Human-readable label for progress output.
    pub fn label(self) -> &'static str {
        match self {
            Self::Readiness => "Waiting for platform",
            Self::StateDetection => "Detecting bootstrap state",
            Self::Identity => "Bootstrapping owner identity",
            Self::Session => "Establishing session",
            Self::Entitlement => "Activating license",
            Self::Credentials => "Provisioning credentials",
            Self::Workflows => "Importing workflows",
        }
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Readiness => "readiness",
            Self::StateDetection => "state_detection",
            Self::Identity => "identity",
            Self::Session => "session",
            Self::Entitlement => "entitlement",
            Self::Credentials => "credentials",
            Self::Workflows => "workflows",
        };
        f.write_str(s)
    }
}

/// Outcome of a single phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhaseStatus {
    Succeeded,
    Skipped,
    RecoverableFailure,
    FatalFailure,
}

/// One entry in the run's phase log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhaseRecord {
    pub phase: Phase,
    pub status: PhaseStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    pub elapsed_ms: u64,
}

/// Raw signals the state detector looked at.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DetectionSignals {
    /// The control plane's "owner configured" flag, if it reported one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_flag: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_error: Option<String>,
    /// Configured owner rows in the backing store, if the store was reachable.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner_rows: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_error: Option<String>,
    /// Result of the login probe, if one was made.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub login_probe: Option<bool>,
    /// True when the API flag and the row count disagreed.
    pub divergent: bool,
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

/// Cookie name the platform uses for its auth session.
pub const AUTH_COOKIE_NAME: &str = "n8n-auth";

/// Opaque bearer object obtained at login and reused for the rest of the run.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SessionArtifact {
    Cookie { name: String, value: String },
    Bearer { token: String },
}

impl SessionArtifact {
    /// The `(header, value)` pair that authenticates a request.
    pub fn header(&self) -> (&'static str, String) {
        match self {
            Self::Cookie { name, value } => ("cookie", format!("{name}={value}")),
            Self::Bearer { token } => ("authorization", format!("Bearer {token}")),
        }
    }
}

impl std::fmt::Debug for SessionArtifact {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Cookie { name, .. } => write!(f, "Cookie({name}=<redacted>)"),
            Self::Bearer { .. } => f.write_str("Bearer(<redacted>)"),
        }
    }
}

// ---------------------------------------------------------------------------
// Identity
// ---------------------------------------------------------------------------

/// Desired administrative identity.
#[derive(Clone)]
pub struct OwnerIdentity {
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub password: String,
}

impl std::fmt::Debug for OwnerIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OwnerIdentity")
            .field("email", &self.email)
            .field("first_name", &self.first_name)
            .field("last_name", &self.last_name)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// A user as reported by the control plane or the backing store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteUser {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

// ---------------------------------------------------------------------------
// Credentials
// ---------------------------------------------------------------------------

/// A secret record as listed by the control plane.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteCredential {
    pub id: String,
    pub name: String,
    #[serde(rename = "type", default)]
    pub kind: String,
}

/// A secret record to create. The payload is never logged.
#[derive(Clone)]
pub struct NewCredential {
    pub name: String,
    pub kind: String,
    pub data: serde_json::Value,
}

impl std::fmt::Debug for NewCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NewCredential")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("data", &"<redacted>")
            .finish()
    }
}

/// What the provisioner did for one catalog entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CredentialAction {
    Created,
    Skipped,
    Failed,
}

/// Typed per-item result of the credential provisioner.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CredentialOutcome {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub action: CredentialAction,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

// ---------------------------------------------------------------------------
// Workflows
// ---------------------------------------------------------------------------

/// A workflow record as listed by the control plane.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteWorkflow {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub active: bool,
    #[serde(default, rename = "versionId", skip_serializing_if = "Option::is_none")]
    pub version_id: Option<String>,
}

/// Definition-write result for one workflow file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowAction {
    Created,
    /// Already present: creation was skipped and the definition updated in place.
    Updated,
    Failed,
}

/// Activation result, reported independently of the definition write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivationStatus {
    Activated,
    Failed,
    NotAttempted,
}

/// Typed per-item result of the workflow importer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowOutcome {
    /// Workflow name, or the file name when the definition has none.
    pub name: String,
    pub file: String,
    pub action: WorkflowAction,
    pub activation: ActivationStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub definition_sha256: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub activation_error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detected_state_wire_names() {
        let json = serde_json::to_string(&DetectedState::AuthenticatedButUnconfigured).unwrap();
        assert_eq!(json, "\"AUTHENTICATED_BUT_UNCONFIGURED\"");
        assert_eq!(DetectedState::OwnerPending.to_string(), "OWNER_PENDING");
    }

    #[test]
    fn final_phase_exit_codes() {
        assert_eq!(FinalPhase::Ready.exit_code(), 0);
        assert_eq!(FinalPhase::Failed.exit_code(), 1);
        assert_eq!(FinalPhase::Degraded.exit_code(), 2);
        assert_eq!(serde_json::to_string(&FinalPhase::Ready).unwrap(), "\"READY\"");
    }

    #[test]
    fn session_header_forms() {
        let cookie = SessionArtifact::Cookie {
            name: AUTH_COOKIE_NAME.into(),
            value: "abc".into(),
        };
        assert_eq!(cookie.header(), ("cookie", "n8n-auth=abc".to_string()));

        let bearer = SessionArtifact::Bearer { token: "t0k".into() };
        assert_eq!(bearer.header(), ("authorization", "Bearer t0k".to_string()));
    }

    #[test]
    fn secrets_are_redacted_in_debug() {
        let cookie = SessionArtifact::Cookie {
            name: AUTH_COOKIE_NAME.into(),
            value: "super-secret".into(),
        };
        assert!(!format!("{cookie:?}").contains("super-secret"));

        let owner = OwnerIdentity {
            email: "admin@example.com".into(),
            first_name: "Ada".into(),
            last_name: "Admin".into(),
            password: "hunter2!".into(),
        };
        let dbg = format!("{owner:?}");
        assert!(dbg.contains("admin@example.com"));
        assert!(!dbg.contains("hunter2"));

        let cred = NewCredential {
            name: "DataLive Redis".into(),
            kind: "redis".into(),
            data: serde_json::json!({ "password": "p4ss" }),
        };
        assert!(!format!("{cred:?}").contains("p4ss"));
    }

    #[test]
    fn remote_workflow_tolerates_missing_fields() {
        let wf: RemoteWorkflow =
            serde_json::from_str(r#"{"id": "7", "name": "Ingest"}"#).expect("parse");
        assert!(!wf.active);
        assert!(wf.version_id.is_none());
    }

    #[test]
    fn credential_outcome_serializes_type_field() {
        let outcome = CredentialOutcome {
            name: "DataLive PostgreSQL".into(),
            kind: "postgres".into(),
            action: CredentialAction::Created,
            id: Some("12".into()),
            error: None,
        };
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["type"], "postgres");
        assert_eq!(json["action"], "created");
        assert!(json.get("error").is_none());
    }
}
