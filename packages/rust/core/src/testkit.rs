//! In-process platform double shared by the phase tests.
//!
//! [`SimulatedPlatform`] answers the control-plane API from memory but keeps
//! its identities in a real libSQL store, so the storage fallback and the API
//! observe one consistent target. Logins are verified against the stored
//! bcrypt hash, exactly like the real platform does.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::Value;
use uuid::Uuid;

use datalive_control_plane::ControlPlane;
use datalive_shared::{
    AUTH_COOKIE_NAME, BootstrapError, NewCredential, OwnerIdentity, RemoteCredential, RemoteUser,
    RemoteWorkflow, Result, SessionArtifact,
};
use datalive_storage::{Storage, verify_password};

pub(crate) const VALID_LICENSE: &str = "valid-license-key";

#[derive(Default)]
struct SimState {
    sessions: HashSet<String>,
    credentials: Vec<RemoteCredential>,
    workflows: Vec<(RemoteWorkflow, Value)>,
    next_id: u64,
    license: Option<String>,
}

impl SimState {
    fn next_id(&mut self) -> String {
        self.next_id += 1;
        self.next_id.to_string()
    }
}

pub(crate) struct SimulatedPlatform {
    storage: Arc<Storage>,
    state: Mutex<SimState>,
    /// Health checks to fail before answering healthy.
    pub health_failures: AtomicU32,
    /// Make `/owner/setup` fail with a 500.
    pub fail_owner_setup: AtomicBool,
    /// Report this flag instead of the stored setting.
    pub flag_override: Mutex<Option<bool>>,
    /// Make the settings endpoint error out.
    pub fail_settings: AtomicBool,
    /// Credential names whose creation fails.
    pub fail_credentials: Mutex<HashSet<String>>,
    /// Credential names another writer creates just before we do.
    pub racing_credentials: Mutex<HashSet<String>>,
    /// Workflow names whose activation fails.
    pub fail_activation: Mutex<HashSet<String>>,
    pub fail_workflow_listing: AtomicBool,
    /// Logins to reject before accepting valid credentials again.
    pub reject_logins: AtomicU32,
    pub login_calls: AtomicU32,
    pub setup_calls: AtomicU32,
}

impl SimulatedPlatform {
    pub fn new(storage: Arc<Storage>) -> Self {
        Self {
            storage,
            state: Mutex::new(SimState::default()),
            health_failures: AtomicU32::new(0),
            fail_owner_setup: AtomicBool::new(false),
            flag_override: Mutex::new(None),
            fail_settings: AtomicBool::new(false),
            fail_credentials: Mutex::new(HashSet::new()),
            racing_credentials: Mutex::new(HashSet::new()),
            fail_activation: Mutex::new(HashSet::new()),
            fail_workflow_listing: AtomicBool::new(false),
            reject_logins: AtomicU32::new(0),
            login_calls: AtomicU32::new(0),
            setup_calls: AtomicU32::new(0),
        }
    }

    pub fn credential_names(&self) -> Vec<String> {
        let state = self.state.lock().unwrap();
        state.credentials.iter().map(|c| c.name.clone()).collect()
    }

    pub fn workflow(&self, name: &str) -> Option<(RemoteWorkflow, Value)> {
        let state = self.state.lock().unwrap();
        state.workflows.iter().find(|(w, _)| w.name == name).cloned()
    }

    pub fn workflow_count(&self) -> usize {
        self.state.lock().unwrap().workflows.len()
    }

    pub fn license(&self) -> Option<String> {
        self.state.lock().unwrap().license.clone()
    }

    pub fn seed_credential(&self, name: &str, kind: &str) -> String {
        let mut state = self.state.lock().unwrap();
        let id = state.next_id();
        state.credentials.push(RemoteCredential {
            id: id.clone(),
            name: name.into(),
            kind: kind.into(),
        });
        id
    }

    fn authorize(&self, session: &SessionArtifact) -> Result<()> {
        let token = match session {
            SessionArtifact::Cookie { value, .. } => value,
            SessionArtifact::Bearer { token } => token,
        };
        if self.state.lock().unwrap().sessions.contains(token) {
            Ok(())
        } else {
            Err(BootstrapError::api(401, "Unauthorized"))
        }
    }
}

#[async_trait]
impl ControlPlane for SimulatedPlatform {
    async fn health(&self) -> Result<()> {
        let remaining = self.health_failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.health_failures.store(remaining - 1, Ordering::SeqCst);
            return Err(BootstrapError::Network("connection refused".into()));
        }
        Ok(())
    }

    async fn owner_configured(&self) -> Result<Option<bool>> {
        if self.fail_settings.load(Ordering::SeqCst) {
            return Err(BootstrapError::api(500, "settings unavailable"));
        }
        let flag_override = *self.flag_override.lock().unwrap();
        if let Some(flag) = flag_override {
            return Ok(Some(flag));
        }
        Ok(Some(self.storage.owner_setup_flag().await?.unwrap_or(false)))
    }

    async fn setup_owner(&self, owner: &OwnerIdentity) -> Result<RemoteUser> {
        self.setup_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_owner_setup.load(Ordering::SeqCst) {
            return Err(BootstrapError::api(500, "Internal Server Error"));
        }
        if self.storage.count_configured_owners().await? > 0 {
            return Err(BootstrapError::api(400, "Instance owner already setup"));
        }
        let id = self.storage.insert_owner(owner).await?;
        Ok(RemoteUser {
            id,
            email: Some(owner.email.clone()),
        })
    }

    async fn login(&self, email: &str, password: &str) -> Result<SessionArtifact> {
        self.login_calls.fetch_add(1, Ordering::SeqCst);
        let rejected = self.reject_logins.load(Ordering::SeqCst);
        if rejected > 0 {
            self.reject_logins.store(rejected - 1, Ordering::SeqCst);
            return Err(BootstrapError::api(401, "Wrong username or password"));
        }
        let user = self.storage.find_user_by_email(email).await?;
        let valid = user
            .and_then(|u| u.password_hash)
            .is_some_and(|hash| verify_password(password, &hash));
        if !valid {
            return Err(BootstrapError::api(401, "Wrong username or password"));
        }
        let token = Uuid::now_v7().to_string();
        self.state.lock().unwrap().sessions.insert(token.clone());
        Ok(SessionArtifact::Cookie {
            name: AUTH_COOKIE_NAME.into(),
            value: token,
        })
    }

    async fn activate_license(&self, session: &SessionArtifact, key: &str) -> Result<()> {
        self.authorize(session)?;
        if key != VALID_LICENSE {
            return Err(BootstrapError::api(400, "Activation key is invalid"));
        }
        self.state.lock().unwrap().license = Some(key.into());
        Ok(())
    }

    async fn list_credentials(&self, session: &SessionArtifact) -> Result<Vec<RemoteCredential>> {
        self.authorize(session)?;
        Ok(self.state.lock().unwrap().credentials.clone())
    }

    async fn create_credential(
        &self,
        session: &SessionArtifact,
        credential: &NewCredential,
    ) -> Result<RemoteCredential> {
        self.authorize(session)?;
        if self.fail_credentials.lock().unwrap().contains(&credential.name) {
            return Err(BootstrapError::api(500, "credential store unavailable"));
        }
        if self.racing_credentials.lock().unwrap().remove(&credential.name) {
            self.seed_credential(&credential.name, &credential.kind);
        }

        let mut state = self.state.lock().unwrap();
        if state.credentials.iter().any(|c| c.name == credential.name) {
            return Err(BootstrapError::api(409, "credential name already in use"));
        }
        let record = RemoteCredential {
            id: state.next_id(),
            name: credential.name.clone(),
            kind: credential.kind.clone(),
        };
        state.credentials.push(record.clone());
        Ok(record)
    }

    async fn list_workflows(&self, session: &SessionArtifact) -> Result<Vec<RemoteWorkflow>> {
        self.authorize(session)?;
        if self.fail_workflow_listing.load(Ordering::SeqCst) {
            return Err(BootstrapError::api(503, "workflow listing unavailable"));
        }
        let state = self.state.lock().unwrap();
        Ok(state.workflows.iter().map(|(w, _)| w.clone()).collect())
    }

    async fn create_workflow(
        &self,
        session: &SessionArtifact,
        definition: &Value,
    ) -> Result<RemoteWorkflow> {
        self.authorize(session)?;
        let name = definition
            .get("name")
            .and_then(Value::as_str)
            .ok_or_else(|| BootstrapError::api(400, "workflow name is required"))?;

        let mut state = self.state.lock().unwrap();
        let record = RemoteWorkflow {
            id: state.next_id(),
            name: name.into(),
            active: false,
            version_id: Some(Uuid::now_v7().to_string()),
        };
        state.workflows.push((record.clone(), definition.clone()));
        Ok(record)
    }

    async fn update_workflow(
        &self,
        session: &SessionArtifact,
        id: &str,
        definition: &Value,
    ) -> Result<RemoteWorkflow> {
        self.authorize(session)?;
        let mut state = self.state.lock().unwrap();
        let (record, stored) = state
            .workflows
            .iter_mut()
            .find(|(w, _)| w.id == id)
            .ok_or_else(|| BootstrapError::api(404, "workflow not found"))?;

        let sent_version = definition.get("versionId").and_then(Value::as_str);
        if sent_version != record.version_id.as_deref() {
            return Err(BootstrapError::api(409, "workflow was changed by someone else"));
        }
        *stored = definition.clone();
        record.version_id = Some(Uuid::now_v7().to_string());
        Ok(record.clone())
    }

    async fn activate_workflow(
        &self,
        session: &SessionArtifact,
        workflow: &RemoteWorkflow,
    ) -> Result<()> {
        self.authorize(session)?;
        if self.fail_activation.lock().unwrap().contains(&workflow.name) {
            return Err(BootstrapError::api(400, "workflow has no trigger node"));
        }
        let mut state = self.state.lock().unwrap();
        let (record, _) = state
            .workflows
            .iter_mut()
            .find(|(w, _)| w.id == workflow.id)
            .ok_or_else(|| BootstrapError::api(404, "workflow not found"))?;
        record.active = true;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

pub(crate) async fn scratch_storage() -> Arc<Storage> {
    let path = std::env::temp_dir().join(format!("datalive_core_{}.db", Uuid::now_v7()));
    Arc::new(Storage::create(&path).await.expect("create scratch db"))
}

pub(crate) fn owner() -> OwnerIdentity {
    OwnerIdentity {
        email: "admin@datalive.local".into(),
        first_name: "DataLive".into(),
        last_name: "Admin".into(),
        password: "Sup3r-secret".into(),
    }
}

pub(crate) fn fixtures_dir(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("../../../fixtures")
        .join(name)
}

pub(crate) fn scratch_dir(prefix: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("{prefix}_{}", Uuid::now_v7()));
    std::fs::create_dir_all(&dir).expect("create scratch dir");
    dir
}

pub(crate) async fn login(platform: &SimulatedPlatform) -> SessionArtifact {
    let owner = owner();
    platform
        .login(&owner.email, &owner.password)
        .await
        .expect("login")
}
