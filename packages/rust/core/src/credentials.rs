//! Credential provisioner: one named secret record per downstream dependency.
//!
//! A reconciliation loop: the desired catalog is diffed against a single
//! listing of existing records and only the missing names are created.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use serde_json::json;
use tracing::{info, instrument, warn};

use datalive_control_plane::ControlPlane;
use datalive_shared::{
    BootstrapError, CredentialAction, CredentialOutcome, NewCredential, OAuthClientConfig, Result,
    ServicesConfig, SessionArtifact,
};

use crate::pool::run_bounded;

pub const POSTGRES_CREDENTIAL: &str = "DataLive PostgreSQL";
pub const REDIS_CREDENTIAL: &str = "DataLive Redis";
pub const MINIO_CREDENTIAL: &str = "DataLive MinIO";
pub const QDRANT_CREDENTIAL: &str = "DataLive Qdrant";
pub const NEO4J_CREDENTIAL: &str = "DataLive Neo4j";
pub const OLLAMA_CREDENTIAL: &str = "DataLive Ollama";
pub const GOOGLE_OAUTH_CREDENTIAL: &str = "DataLive Google OAuth";
pub const MICROSOFT_OAUTH_CREDENTIAL: &str = "DataLive Microsoft OAuth";

// ---------------------------------------------------------------------------
// Catalog
// ---------------------------------------------------------------------------

/// Build the credential catalog from the `[services]` configuration.
///
/// The six core dependencies are always present; OAuth providers are added
/// only when both client id and secret are configured.
pub fn build_catalog(services: &ServicesConfig) -> Vec<NewCredential> {
    let pg = &services.postgres;
    let redis = &services.redis;
    let minio = &services.minio;
    let neo4j = &services.neo4j;

    let mut catalog = vec![
        NewCredential {
            name: POSTGRES_CREDENTIAL.into(),
            kind: "postgres".into(),
            data: json!({
                "host": pg.host,
                "port": pg.port,
                "database": pg.database,
                "user": pg.user,
                "password": pg.password,
                "ssl": if pg.ssl { "require" } else { "disable" },
                "allowUnauthorizedCerts": false,
            }),
        },
        NewCredential {
            name: REDIS_CREDENTIAL.into(),
            kind: "redis".into(),
            data: json!({
                "host": redis.host,
                "port": redis.port,
                "password": redis.password,
                "database": redis.database,
            }),
        },
        NewCredential {
            name: MINIO_CREDENTIAL.into(),
            kind: "s3".into(),
            data: json!({
                "endpoint": minio.endpoint,
                "region": minio.region,
                "accessKeyId": minio.access_key,
                "secretAccessKey": minio.secret_key,
                "forcePathStyle": true,
            }),
        },
        NewCredential {
            name: QDRANT_CREDENTIAL.into(),
            kind: "qdrantApi".into(),
            data: json!({
                "qdrantUrl": services.qdrant.url,
                "apiKey": services.qdrant.api_key,
            }),
        },
        NewCredential {
            name: NEO4J_CREDENTIAL.into(),
            kind: "httpBasicAuth".into(),
            data: json!({
                "user": neo4j.user,
                "password": neo4j.password,
            }),
        },
        NewCredential {
            name: OLLAMA_CREDENTIAL.into(),
            kind: "ollamaApi".into(),
            data: json!({ "baseUrl": services.ollama.base_url }),
        },
    ];

    if let Some(oauth) = configured_oauth(services.google_oauth.as_ref()) {
        catalog.push(oauth_credential(GOOGLE_OAUTH_CREDENTIAL, "googleOAuth2Api", oauth));
    }
    if let Some(oauth) = configured_oauth(services.microsoft_oauth.as_ref()) {
        catalog.push(oauth_credential(
            MICROSOFT_OAUTH_CREDENTIAL,
            "microsoftOAuth2Api",
            oauth,
        ));
    }
    catalog
}

fn configured_oauth(oauth: Option<&OAuthClientConfig>) -> Option<&OAuthClientConfig> {
    oauth.filter(|o| !o.client_id.is_empty() && !o.client_secret.is_empty())
}

fn oauth_credential(name: &str, kind: &str, oauth: &OAuthClientConfig) -> NewCredential {
    NewCredential {
        name: name.into(),
        kind: kind.into(),
        data: json!({
            "clientId": oauth.client_id,
            "clientSecret": oauth.client_secret,
        }),
    }
}

/// Reject empty or duplicate names; the name is the record's identity.
pub fn validate_catalog(catalog: &[NewCredential]) -> Result<()> {
    let mut seen = HashSet::new();
    for entry in catalog {
        if entry.name.trim().is_empty() {
            return Err(BootstrapError::validation(format!(
                "credential of type '{}' has an empty name",
                entry.kind
            )));
        }
        if !seen.insert(entry.name.as_str()) {
            return Err(BootstrapError::validation(format!(
                "duplicate credential name '{}' in catalog",
                entry.name
            )));
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Reconciliation
// ---------------------------------------------------------------------------

/// Name → identifier map of every provisioned (created or pre-existing) record.
pub fn id_map(outcomes: &[CredentialOutcome]) -> HashMap<String, String> {
    outcomes
        .iter()
        .filter_map(|o| o.id.as_ref().map(|id| (o.name.clone(), id.clone())))
        .collect()
}

/// Ensure one record per catalog entry.
///
/// Returns `Err` only when the existing records cannot be listed; per-item
/// failures are reported as [`CredentialAction::Failed`] outcomes.
#[instrument(skip_all, fields(catalog = catalog.len(), concurrency = concurrency))]
pub async fn provision(
    control_plane: Arc<dyn ControlPlane>,
    session: &SessionArtifact,
    catalog: Vec<NewCredential>,
    concurrency: usize,
) -> Result<Vec<CredentialOutcome>> {
    let existing: HashMap<String, String> = control_plane
        .list_credentials(session)
        .await?
        .into_iter()
        .map(|c| (c.name, c.id))
        .collect();

    let mut slots: Vec<Option<CredentialOutcome>> = Vec::with_capacity(catalog.len());
    let mut missing = Vec::new();
    for entry in catalog {
        match existing.get(&entry.name) {
            Some(id) => {
                info!(name = %entry.name, %id, "credential exists, skipping");
                slots.push(Some(outcome(&entry, CredentialAction::Skipped, Some(id.clone()), None)));
            }
            None => {
                missing.push((slots.len(), entry));
                slots.push(None);
            }
        }
    }

    let session = Arc::new(session.clone());
    let pending: Vec<(String, String)> = missing
        .iter()
        .map(|(_, e)| (e.name.clone(), e.kind.clone()))
        .collect();
    let indices: Vec<usize> = missing.iter().map(|(i, _)| *i).collect();
    let entries: Vec<NewCredential> = missing.into_iter().map(|(_, e)| e).collect();

    let results = run_bounded(entries, concurrency, move |entry| {
        let control_plane = control_plane.clone();
        let session = session.clone();
        async move { create_one(control_plane.as_ref(), &session, entry).await }
    })
    .await;

    for ((slot, (name, kind)), result) in indices.into_iter().zip(pending).zip(results) {
        slots[slot] = Some(result.unwrap_or_else(|e| CredentialOutcome {
            name,
            kind,
            action: CredentialAction::Failed,
            id: None,
            error: Some(format!("worker task failed: {e}")),
        }));
    }

    Ok(slots.into_iter().flatten().collect())
}

async fn create_one(
    control_plane: &dyn ControlPlane,
    session: &SessionArtifact,
    entry: NewCredential,
) -> CredentialOutcome {
    match control_plane.create_credential(session, &entry).await {
        Ok(record) => {
            info!(name = %entry.name, id = %record.id, "credential created");
            outcome(&entry, CredentialAction::Created, Some(record.id), None)
        }
        Err(e) if e.is_conflict() => resolve_conflict(control_plane, session, &entry).await,
        Err(e) => {
            warn!(name = %entry.name, error = %e, "credential creation failed");
            outcome(&entry, CredentialAction::Failed, None, Some(e.to_string()))
        }
    }
}

/// Another writer created the record between our listing and our create.
async fn resolve_conflict(
    control_plane: &dyn ControlPlane,
    session: &SessionArtifact,
    entry: &NewCredential,
) -> CredentialOutcome {
    match control_plane.list_credentials(session).await {
        Ok(records) => match records.into_iter().find(|c| c.name == entry.name) {
            Some(record) => {
                info!(name = %entry.name, id = %record.id, "credential created concurrently, skipping");
                outcome(entry, CredentialAction::Skipped, Some(record.id), None)
            }
            None => outcome(
                entry,
                CredentialAction::Failed,
                None,
                Some("create reported a conflict but no record with this name exists".into()),
            ),
        },
        Err(e) => {
            warn!(name = %entry.name, error = %e, "re-listing after conflict failed");
            outcome(entry, CredentialAction::Failed, None, Some(e.to_string()))
        }
    }
}

fn outcome(
    entry: &NewCredential,
    action: CredentialAction,
    id: Option<String>,
    error: Option<String>,
) -> CredentialOutcome {
    CredentialOutcome {
        name: entry.name.clone(),
        kind: entry.kind.clone(),
        action,
        id,
        error,
    }
}
