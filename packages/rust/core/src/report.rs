//! Run reporter: counts, final phase marker, JSON artifact and human summary.

use std::fmt::Write as _;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use datalive_shared::{
    ActivationStatus, BootstrapError, CredentialAction, CredentialOutcome, DetectedState,
    DetectionSignals, FinalPhase, Phase, PhaseRecord, PhaseStatus, Result, WorkflowAction,
    WorkflowOutcome,
};

use crate::entitlement::EntitlementOutcome;

/// The phase that ended the run, and why.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FatalFailure {
    pub phase: Phase,
    pub message: String,
}

/// Per-category item counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemCounts {
    pub created: usize,
    pub skipped: usize,
    pub updated: usize,
    pub failed: usize,
    pub activated: usize,
    pub activation_failed: usize,
}

impl ItemCounts {
    pub fn from_credentials(outcomes: &[CredentialOutcome]) -> Self {
        let mut counts = Self::default();
        for o in outcomes {
            match o.action {
                CredentialAction::Created => counts.created += 1,
                CredentialAction::Skipped => counts.skipped += 1,
                CredentialAction::Failed => counts.failed += 1,
            }
        }
        counts
    }

    pub fn from_workflows(outcomes: &[WorkflowOutcome]) -> Self {
        let mut counts = Self::default();
        for o in outcomes {
            match o.action {
                WorkflowAction::Created => counts.created += 1,
                WorkflowAction::Updated => {
                    counts.skipped += 1;
                    counts.updated += 1;
                }
                WorkflowAction::Failed => counts.failed += 1,
            }
            match o.activation {
                ActivationStatus::Activated => counts.activated += 1,
                ActivationStatus::Failed => counts.activation_failed += 1,
                ActivationStatus::NotAttempted => {}
            }
        }
        counts
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunCounts {
    pub identities_created: usize,
    pub credentials: ItemCounts,
    pub workflows: ItemCounts,
}

/// Machine-readable record of one bootstrap run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: String,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub starting_state: Option<DetectedState>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signals: Option<DetectionSignals>,
    pub phases: Vec<PhaseRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entitlement: Option<EntitlementOutcome>,
    pub credentials: Vec<CredentialOutcome>,
    pub workflows: Vec<WorkflowOutcome>,
    pub counts: RunCounts,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fatal: Option<FatalFailure>,
    pub final_phase: FinalPhase,
}

impl RunReport {
    pub fn new(run_id: impl Into<String>) -> Self {
        Self {
            run_id: run_id.into(),
            started_at: Utc::now(),
            finished_at: None,
            starting_state: None,
            signals: None,
            phases: Vec::new(),
            entitlement: None,
            credentials: Vec::new(),
            workflows: Vec::new(),
            counts: RunCounts::default(),
            fatal: None,
            final_phase: FinalPhase::Failed,
        }
    }

    /// Stamp the finish time and derive counts and the final phase.
    pub fn finalize(&mut self) {
        self.finished_at = Some(Utc::now());
        self.counts.credentials = ItemCounts::from_credentials(&self.credentials);
        self.counts.workflows = ItemCounts::from_workflows(&self.workflows);
        self.final_phase = final_phase(&self.phases, self.fatal.is_some());
    }

    pub fn phase(&self, phase: Phase) -> Option<&PhaseRecord> {
        self.phases.iter().find(|r| r.phase == phase)
    }
}

/// `FAILED` on any fatal failure; `DEGRADED` when a phase other than
/// entitlement ended in a phase-level recoverable failure; `READY` otherwise.
/// Item-level failures never change the marker.
pub fn final_phase(phases: &[PhaseRecord], fatal: bool) -> FinalPhase {
    if fatal || phases.iter().any(|r| r.status == PhaseStatus::FatalFailure) {
        return FinalPhase::Failed;
    }
    let degraded = phases
        .iter()
        .any(|r| r.status == PhaseStatus::RecoverableFailure && r.phase != Phase::Entitlement);
    if degraded {
        FinalPhase::Degraded
    } else {
        FinalPhase::Ready
    }
}

/// Write the report as pretty JSON, atomically (temp file, then rename).
pub fn write_report(path: &Path, report: &RunReport) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| BootstrapError::io(parent, e))?;
    }

    let json = serde_json::to_string_pretty(report)
        .map_err(|e| BootstrapError::validation(format!("failed to serialize report: {e}")))?;

    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "bootstrap-report.json".into());
    let temp = path.with_file_name(format!(".{file_name}.tmp"));

    std::fs::write(&temp, json).map_err(|e| BootstrapError::io(&temp, e))?;
    std::fs::rename(&temp, path).map_err(|e| BootstrapError::io(path, e))?;

    debug!(path = %path.display(), "run report written");
    Ok(())
}

/// Human-readable multi-line summary.
pub fn render_summary(report: &RunReport) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Bootstrap run {}", report.run_id);
    if let Some(state) = report.starting_state {
        let _ = writeln!(out, "  starting state: {state}");
    }
    for record in &report.phases {
        let status = match record.status {
            PhaseStatus::Succeeded => "ok",
            PhaseStatus::Skipped => "skipped",
            PhaseStatus::RecoverableFailure => "recoverable failure",
            PhaseStatus::FatalFailure => "FATAL",
        };
        let _ = write!(
            out,
            "  {:<16} {:<20} {:>6}ms",
            record.phase.to_string(),
            status,
            record.elapsed_ms
        );
        if let Some(detail) = &record.detail {
            let _ = write!(out, "  {detail}");
        }
        out.push('\n');
    }

    let c = &report.counts.credentials;
    let _ = writeln!(
        out,
        "  credentials: {} created, {} skipped, {} failed",
        c.created, c.skipped, c.failed
    );
    let w = &report.counts.workflows;
    let _ = writeln!(
        out,
        "  workflows:   {} created, {} skipped then updated, {} failed; {} activated, {} activation failures",
        w.created, w.updated, w.failed, w.activated, w.activation_failed
    );

    for failed in report
        .credentials
        .iter()
        .filter(|o| o.action == CredentialAction::Failed)
    {
        let _ = writeln!(
            out,
            "    credential {}: {}",
            failed.name,
            failed.error.as_deref().unwrap_or("failed")
        );
    }
    for wf in &report.workflows {
        if let Some(error) = &wf.error {
            let _ = writeln!(out, "    workflow {} ({}): {error}", wf.name, wf.file);
        }
        if let Some(error) = &wf.activation_error {
            let _ = writeln!(out, "    workflow {} activation: {error}", wf.name);
        }
    }

    if let Some(fatal) = &report.fatal {
        let _ = writeln!(out, "  fatal in {}: {}", fatal.phase, fatal.message);
    }
    let _ = writeln!(out, "  final phase: {}", report.final_phase);
    out
}
