//! Workflow importer: create-or-update every definition in a directory, then
//! activate it.
//!
//! The definition write and the activation are reported separately; a
//! workflow can be written successfully and still fail to activate.

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;

use serde_json::Value;
use sha2::{Digest, Sha256};
use tracing::{debug, info, instrument, warn};

use datalive_control_plane::ControlPlane;
use datalive_shared::{
    ActivationStatus, BootstrapError, RemoteWorkflow, Result, SessionArtifact, WorkflowAction,
    WorkflowOutcome,
};

use crate::pool::run_bounded;

/// A parsed, validated definition file.
#[derive(Debug, Clone)]
pub struct WorkflowDefinition {
    pub file: String,
    pub name: String,
    pub body: Value,
    pub sha256: String,
}

/// One `*.json` file from the workflow directory.
#[derive(Debug, Clone)]
pub struct DefinitionFile {
    pub file: String,
    pub parsed: std::result::Result<WorkflowDefinition, String>,
}

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

/// Read every `*.json` file in `dir`, sorted by file name.
///
/// A missing or unreadable directory is an error; a bad file is not, it is
/// returned with its parse error. Later files reusing an earlier name are
/// rejected as duplicates.
pub fn load_definitions(dir: &Path) -> Result<Vec<DefinitionFile>> {
    let entries = std::fs::read_dir(dir).map_err(|e| BootstrapError::io(dir, e))?;

    let mut paths: Vec<_> = entries
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.is_file() && p.extension().is_some_and(|ext| ext == "json"))
        .collect();
    paths.sort();

    let mut seen = HashSet::new();
    let mut files = Vec::with_capacity(paths.len());
    for path in paths {
        let file = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        let parsed = std::fs::read(&path)
            .map_err(|e| format!("failed to read file: {e}"))
            .and_then(|bytes| parse_definition(&file, &bytes))
            .and_then(|def| {
                if seen.insert(def.name.clone()) {
                    Ok(def)
                } else {
                    Err(format!("duplicate workflow name '{}'", def.name))
                }
            });

        if let Err(e) = &parsed {
            warn!(%file, error = %e, "skipping workflow definition");
        }
        files.push(DefinitionFile { file, parsed });
    }

    debug!(dir = %dir.display(), count = files.len(), "workflow definitions loaded");
    Ok(files)
}

fn parse_definition(file: &str, bytes: &[u8]) -> std::result::Result<WorkflowDefinition, String> {
    let body: Value = serde_json::from_slice(bytes).map_err(|e| format!("invalid JSON: {e}"))?;
    if !body.is_object() {
        return Err("definition is not a JSON object".into());
    }
    let name = body
        .get("name")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .ok_or_else(|| "missing required string field 'name'".to_string())?
        .to_string();

    Ok(WorkflowDefinition {
        file: file.to_string(),
        name,
        body,
        sha256: compute_hash(bytes),
    })
}

fn compute_hash(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

// ---------------------------------------------------------------------------
// Credential wiring
// ---------------------------------------------------------------------------

/// Fill in missing credential ids on node references by record name.
///
/// Node references look like `"credentials": {"postgres": {"name": "DataLive PostgreSQL"}}`.
/// References that already carry an id are left alone. Returns the number of
/// references wired.
pub fn wire_credentials(body: &mut Value, ids: &HashMap<String, String>) -> usize {
    let Some(nodes) = body.get_mut("nodes").and_then(Value::as_array_mut) else {
        return 0;
    };

    let mut wired = 0;
    for node in nodes {
        let Some(refs) = node.get_mut("credentials").and_then(Value::as_object_mut) else {
            continue;
        };
        for reference in refs.values_mut() {
            let Some(reference) = reference.as_object_mut() else {
                continue;
            };
            let has_id = reference
                .get("id")
                .and_then(Value::as_str)
                .is_some_and(|id| !id.is_empty());
            if has_id {
                continue;
            }
            let id = reference
                .get("name")
                .and_then(Value::as_str)
                .and_then(|name| ids.get(name));
            if let Some(id) = id {
                reference.insert("id".into(), Value::String(id.clone()));
                wired += 1;
            }
        }
    }
    wired
}

/// Shape a definition for the write call: ids and activation state are the
/// platform's, not the file's.
fn request_body(def: &WorkflowDefinition, ids: &HashMap<String, String>) -> Value {
    let mut body = def.body.clone();
    wire_credentials(&mut body, ids);
    if let Some(obj) = body.as_object_mut() {
        obj.remove("id");
        obj.remove("active");
        obj.remove("versionId");
    }
    body
}

// ---------------------------------------------------------------------------
// Import
// ---------------------------------------------------------------------------

/// Import every definition in `dir`.
///
/// Returns `Err` when the directory cannot be read or the existing workflows
/// cannot be listed; every per-file problem becomes a failed outcome.
#[instrument(skip_all, fields(dir = %dir.display(), concurrency = concurrency))]
pub async fn import(
    control_plane: Arc<dyn ControlPlane>,
    session: &SessionArtifact,
    dir: &Path,
    credential_ids: &HashMap<String, String>,
    concurrency: usize,
) -> Result<Vec<WorkflowOutcome>> {
    let files = load_definitions(dir)?;

    let mut existing: HashMap<String, Vec<RemoteWorkflow>> = HashMap::new();
    for workflow in control_plane.list_workflows(session).await? {
        existing.entry(workflow.name.clone()).or_default().push(workflow);
    }

    let mut slots: Vec<Option<WorkflowOutcome>> = Vec::with_capacity(files.len());
    let mut jobs = Vec::new();
    for file in files {
        match file.parsed {
            Ok(def) => {
                let matches = existing.get(&def.name).map(Vec::as_slice).unwrap_or_default();
                if matches.len() > 1 {
                    warn!(name = %def.name, count = matches.len(), "remote workflow name is ambiguous");
                    slots.push(Some(WorkflowOutcome {
                        name: def.name.clone(),
                        file: def.file,
                        action: WorkflowAction::Failed,
                        activation: ActivationStatus::NotAttempted,
                        id: None,
                        definition_sha256: Some(def.sha256),
                        error: Some(format!(
                            "ambiguous: {} workflows named {}",
                            matches.len(),
                            def.name
                        )),
                        activation_error: None,
                    }));
                    continue;
                }
                let current = matches.first().cloned();
                let body = request_body(&def, credential_ids);
                jobs.push((slots.len(), ImportJob { def, body, current }));
                slots.push(None);
            }
            Err(error) => slots.push(Some(WorkflowOutcome {
                name: file.file.clone(),
                file: file.file,
                action: WorkflowAction::Failed,
                activation: ActivationStatus::NotAttempted,
                id: None,
                definition_sha256: None,
                error: Some(error),
                activation_error: None,
            })),
        }
    }

    let session = Arc::new(session.clone());
    let labels: Vec<(usize, String, String, String)> = jobs
        .iter()
        .map(|(i, j)| (*i, j.def.name.clone(), j.def.file.clone(), j.def.sha256.clone()))
        .collect();
    let jobs: Vec<ImportJob> = jobs.into_iter().map(|(_, j)| j).collect();

    let results = run_bounded(jobs, concurrency, move |job| {
        let control_plane = control_plane.clone();
        let session = session.clone();
        async move { import_one(control_plane.as_ref(), &session, job).await }
    })
    .await;

    for ((slot, name, file, sha256), result) in labels.into_iter().zip(results) {
        slots[slot] = Some(result.unwrap_or_else(|e| WorkflowOutcome {
            name,
            file,
            action: WorkflowAction::Failed,
            activation: ActivationStatus::NotAttempted,
            id: None,
            definition_sha256: Some(sha256),
            error: Some(format!("worker task failed: {e}")),
            activation_error: None,
        }));
    }

    Ok(slots.into_iter().flatten().collect())
}

struct ImportJob {
    def: WorkflowDefinition,
    body: Value,
    current: Option<RemoteWorkflow>,
}

async fn import_one(
    control_plane: &dyn ControlPlane,
    session: &SessionArtifact,
    job: ImportJob,
) -> WorkflowOutcome {
    let ImportJob {
        def,
        mut body,
        current,
    } = job;

    let mut outcome = WorkflowOutcome {
        name: def.name.clone(),
        file: def.file.clone(),
        action: WorkflowAction::Failed,
        activation: ActivationStatus::NotAttempted,
        id: current.as_ref().map(|w| w.id.clone()),
        definition_sha256: Some(def.sha256.clone()),
        error: None,
        activation_error: None,
    };

    let written = match &current {
        Some(existing) => {
            if let (Some(obj), Some(version)) = (body.as_object_mut(), &existing.version_id) {
                obj.insert("versionId".into(), Value::String(version.clone()));
            }
            control_plane
                .update_workflow(session, &existing.id, &body)
                .await
                .map(|w| (WorkflowAction::Updated, w))
        }
        None => control_plane
            .create_workflow(session, &body)
            .await
            .map(|w| (WorkflowAction::Created, w)),
    };

    let record = match written {
        Ok((action, record)) => {
            info!(name = %def.name, id = %record.id, ?action, "workflow written");
            outcome.action = action;
            outcome.id = Some(record.id.clone());
            record
        }
        Err(e) => {
            warn!(name = %def.name, error = %e, "workflow write failed");
            outcome.error = Some(e.to_string());
            return outcome;
        }
    };

    match control_plane.activate_workflow(session, &record).await {
        Ok(()) => {
            info!(name = %def.name, id = %record.id, "workflow activated");
            outcome.activation = ActivationStatus::Activated;
        }
        Err(e) => {
            warn!(name = %def.name, error = %e, "workflow activation failed");
            outcome.activation = ActivationStatus::Failed;
            outcome.activation_error = Some(e.to_string());
        }
    }
    outcome
}
