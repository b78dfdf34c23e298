//! End-to-end bootstrap run: readiness → detection → identity → session →
//! entitlement → credentials → workflows → report.
//!
//! Phases run strictly in sequence. Each phase ends in a [`PhaseRecord`];
//! only fatal failures stop the run, everything else is accumulated in the
//! [`RunContext`] and surfaces in the final [`RunReport`].

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use datalive_control_plane::ControlPlane;
use datalive_shared::{
    AppConfig, DetectedState, EnvLookup, NewCredential, OwnerIdentity, Phase, PhaseRecord,
    PhaseStatus, ReadinessSettings, Result, SessionSettings,
};
use datalive_storage::Storage;

use crate::credentials::{self, build_catalog, validate_catalog};
use crate::detector::detect_state;
use crate::entitlement::{self, EntitlementOutcome};
use crate::identity::IdentityBootstrapper;
use crate::prober::wait_until_ready;
use crate::report::{FatalFailure, ItemCounts, RunReport, write_report};
use crate::session::{discard_session, login_with_retry, persist_session};
use crate::workflows;

/// Everything a run needs, resolved from configuration and environment.
#[derive(Clone)]
pub struct BootstrapOptions {
    pub owner: OwnerIdentity,
    /// Optional license activation key.
    pub license_key: Option<String>,
    pub readiness: ReadinessSettings,
    pub session: SessionSettings,
    pub catalog: Vec<NewCredential>,
    pub workflows_dir: PathBuf,
    /// Where the JSON report is written; `None` skips the artifact.
    pub report_path: Option<PathBuf>,
    pub concurrency: usize,
    /// Wall-clock budget for the session, credential and workflow phases.
    pub phase_timeout: Duration,
}

impl BootstrapOptions {
    /// Resolve options from a loaded config. Secrets come from `env`.
    pub fn from_config(config: &AppConfig, env: EnvLookup<'_>) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            owner: config.owner_identity(env)?,
            license_key: config.license_key(env),
            readiness: ReadinessSettings::from(config),
            session: SessionSettings::from(config),
            catalog: build_catalog(&config.services),
            workflows_dir: PathBuf::from(&config.run.workflows_dir),
            report_path: Some(PathBuf::from(&config.run.report_path)),
            concurrency: config.run.concurrency as usize,
            phase_timeout: Duration::from_secs(config.run.phase_timeout_secs),
        })
    }
}

/// Progress callback for reporting run status.
pub trait ProgressReporter: Send + Sync {
    /// Called when entering a phase.
    fn phase(&self, phase: Phase);
    /// Called when a phase ends (any status).
    fn phase_finished(&self, record: &PhaseRecord);
    /// Called the moment a fatal failure occurs.
    fn fatal(&self, failure: &FatalFailure);
    /// Called once the report is final.
    fn done(&self, report: &RunReport);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn phase(&self, _phase: Phase) {}
    fn phase_finished(&self, _record: &PhaseRecord) {}
    fn fatal(&self, _failure: &FatalFailure) {}
    fn done(&self, _report: &RunReport) {}
}

// ---------------------------------------------------------------------------
// Run context
// ---------------------------------------------------------------------------

/// Accumulator passed down through the phases of one run.
pub struct RunContext<'p> {
    report: RunReport,
    session_file: Option<PathBuf>,
    progress: &'p dyn ProgressReporter,
}

impl<'p> RunContext<'p> {
    pub fn new(progress: &'p dyn ProgressReporter) -> Self {
        Self {
            report: RunReport::new(Uuid::now_v7().to_string()),
            session_file: None,
            progress,
        }
    }

    pub fn run_id(&self) -> &str {
        &self.report.run_id
    }

    fn begin(&self, phase: Phase) -> Instant {
        info!(%phase, "phase started");
        self.progress.phase(phase);
        Instant::now()
    }

    fn record(
        &mut self,
        phase: Phase,
        status: PhaseStatus,
        detail: impl Into<String>,
        started: Instant,
    ) {
        let record = PhaseRecord {
            phase,
            status,
            detail: Some(detail.into()).filter(|d| !d.is_empty()),
            elapsed_ms: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
        };
        match status {
            PhaseStatus::Succeeded | PhaseStatus::Skipped => {
                info!(%phase, ?status, detail = ?record.detail, "phase finished");
            }
            PhaseStatus::RecoverableFailure => {
                warn!(%phase, detail = ?record.detail, "phase failed; continuing");
            }
            PhaseStatus::FatalFailure => {
                error!(%phase, detail = ?record.detail, "phase failed fatally");
            }
        }
        self.progress.phase_finished(&record);
        self.report.phases.push(record);
    }

    fn fatal(&mut self, phase: Phase, message: String, started: Instant) -> FatalFailure {
        self.record(phase, PhaseStatus::FatalFailure, message.clone(), started);
        let failure = FatalFailure { phase, message };
        self.progress.fatal(&failure);
        self.report.fatal = Some(failure.clone());
        failure
    }
}

// ---------------------------------------------------------------------------
// Orchestration
// ---------------------------------------------------------------------------

/// Run the full bootstrap against one platform instance.
///
/// Never returns an error: fatal failures end the run early and are carried
/// in the report (`final_phase == FAILED`). The report artifact is written
/// in every case when `report_path` is set.
#[instrument(skip_all, fields(owner = %options.owner.email))]
pub async fn run_bootstrap(
    control_plane: Arc<dyn ControlPlane>,
    storage: Option<&Storage>,
    options: &BootstrapOptions,
    progress: &dyn ProgressReporter,
) -> RunReport {
    let mut ctx = RunContext::new(progress);
    info!(run_id = %ctx.run_id(), "starting bootstrap run");

    if let Err(failure) = execute(&mut ctx, control_plane, storage, options).await {
        error!(phase = %failure.phase, message = %failure.message, "bootstrap aborted");
    }

    if let Some(path) = ctx.session_file.take() {
        if !options.session.keep_file {
            discard_session(&path);
        }
    }

    let mut report = ctx.report;
    report.finalize();

    if let Some(path) = &options.report_path {
        if let Err(e) = write_report(path, &report) {
            error!(path = %path.display(), error = %e, "failed to write run report");
        }
    }

    info!(
        final_phase = %report.final_phase,
        credentials_created = report.counts.credentials.created,
        workflows_created = report.counts.workflows.created,
        workflows_updated = report.counts.workflows.updated,
        "bootstrap run finished"
    );
    progress.done(&report);
    report
}

async fn execute(
    ctx: &mut RunContext<'_>,
    control_plane: Arc<dyn ControlPlane>,
    storage: Option<&Storage>,
    options: &BootstrapOptions,
) -> std::result::Result<(), FatalFailure> {
    let cp = control_plane.as_ref();

    // --- Phase 1: Readiness ---
    let started = ctx.begin(Phase::Readiness);
    match wait_until_ready(cp, &options.readiness).await {
        Ok(ready) => ctx.record(
            Phase::Readiness,
            PhaseStatus::Succeeded,
            format!("ready after {} attempt(s)", ready.attempts),
            started,
        ),
        Err(e) => return Err(ctx.fatal(Phase::Readiness, e.to_string(), started)),
    }

    // --- Phase 2: State detection ---
    let started = ctx.begin(Phase::StateDetection);
    let detection = detect_state(cp, storage, &options.owner).await;
    let detail = if detection.signals.divergent {
        format!("{} (owner flag disagreed with backing store)", detection.state)
    } else {
        detection.state.to_string()
    };
    ctx.report.starting_state = Some(detection.state);
    ctx.report.signals = Some(detection.signals.clone());
    ctx.record(Phase::StateDetection, PhaseStatus::Succeeded, detail, started);

    // --- Phase 3: Identity ---
    let started = ctx.begin(Phase::Identity);
    if detection.state == DetectedState::Uninitialized {
        match IdentityBootstrapper::new(cp, storage)
            .bootstrap(&options.owner)
            .await
        {
            Ok(created) => {
                ctx.report.counts.identities_created = 1;
                ctx.record(
                    Phase::Identity,
                    PhaseStatus::Succeeded,
                    format!("owner created via {}", created.writer),
                    started,
                );
            }
            Err(failure) => return Err(ctx.fatal(Phase::Identity, failure.to_string(), started)),
        }
    } else {
        ctx.record(
            Phase::Identity,
            PhaseStatus::Skipped,
            "owner identity already exists",
            started,
        );
    }

    // --- Phase 4: Session ---
    let started = ctx.begin(Phase::Session);
    let session = match detection.session {
        Some(session) => {
            ctx.record(
                Phase::Session,
                PhaseStatus::Succeeded,
                "reused session from login probe",
                started,
            );
            session
        }
        None => {
            let login = login_with_retry(cp, &options.owner, &options.session);
            match tokio::time::timeout(options.phase_timeout, login).await {
                Ok(Ok((session, attempts))) => {
                    ctx.record(
                        Phase::Session,
                        PhaseStatus::Succeeded,
                        format!("logged in after {attempts} attempt(s)"),
                        started,
                    );
                    session
                }
                Ok(Err(e)) => {
                    return Err(ctx.fatal(
                        Phase::Session,
                        format!("authentication failed after identity bootstrap: {e}"),
                        started,
                    ));
                }
                Err(_) => {
                    return Err(ctx.fatal(
                        Phase::Session,
                        budget_exceeded(options.phase_timeout),
                        started,
                    ));
                }
            }
        }
    };

    let run_id = ctx.run_id().to_string();
    match persist_session(&options.session.dir, &run_id, &session) {
        Ok(path) => ctx.session_file = Some(path),
        Err(e) => warn!(error = %e, "could not persist session artifact"),
    }

    // --- Phase 5: Entitlement ---
    let started = ctx.begin(Phase::Entitlement);
    let outcome = entitlement::activate(cp, &session, options.license_key.as_deref()).await;
    let (status, detail) = match &outcome {
        EntitlementOutcome::Skipped => (PhaseStatus::Skipped, "no activation key configured".to_string()),
        EntitlementOutcome::Activated => (PhaseStatus::Succeeded, "license activated".to_string()),
        EntitlementOutcome::Failed { error } => (PhaseStatus::RecoverableFailure, error.clone()),
    };
    ctx.report.entitlement = Some(outcome);
    ctx.record(Phase::Entitlement, status, detail, started);

    // --- Phase 6: Credentials ---
    let started = ctx.begin(Phase::Credentials);
    let mut credential_ids = HashMap::new();
    if let Err(e) = validate_catalog(&options.catalog) {
        ctx.record(Phase::Credentials, PhaseStatus::RecoverableFailure, e.to_string(), started);
    } else {
        let provision = credentials::provision(
            control_plane.clone(),
            &session,
            options.catalog.clone(),
            options.concurrency,
        );
        match tokio::time::timeout(options.phase_timeout, provision).await {
            Ok(Ok(outcomes)) => {
                let counts = ItemCounts::from_credentials(&outcomes);
                credential_ids = credentials::id_map(&outcomes);
                ctx.report.credentials = outcomes;
                ctx.record(
                    Phase::Credentials,
                    PhaseStatus::Succeeded,
                    format!(
                        "{} created, {} skipped, {} failed",
                        counts.created, counts.skipped, counts.failed
                    ),
                    started,
                );
            }
            Ok(Err(e)) => ctx.record(
                Phase::Credentials,
                PhaseStatus::RecoverableFailure,
                e.to_string(),
                started,
            ),
            Err(_) => ctx.record(
                Phase::Credentials,
                PhaseStatus::RecoverableFailure,
                budget_exceeded(options.phase_timeout),
                started,
            ),
        }
    }

    // --- Phase 7: Workflows ---
    let started = ctx.begin(Phase::Workflows);
    let import = workflows::import(
        control_plane.clone(),
        &session,
        &options.workflows_dir,
        &credential_ids,
        options.concurrency,
    );
    match tokio::time::timeout(options.phase_timeout, import).await {
        Ok(Ok(outcomes)) => {
            let counts = ItemCounts::from_workflows(&outcomes);
            ctx.report.workflows = outcomes;
            ctx.record(
                Phase::Workflows,
                PhaseStatus::Succeeded,
                format!(
                    "{} created, {} skipped then updated, {} failed; {} activated",
                    counts.created, counts.updated, counts.failed, counts.activated
                ),
                started,
            );
        }
        Ok(Err(e)) => ctx.record(
            Phase::Workflows,
            PhaseStatus::RecoverableFailure,
            e.to_string(),
            started,
        ),
        Err(_) => ctx.record(
            Phase::Workflows,
            PhaseStatus::RecoverableFailure,
            budget_exceeded(options.phase_timeout),
            started,
        ),
    }

    Ok(())
}

fn budget_exceeded(budget: Duration) -> String {
    format!("phase budget of {}s exceeded", budget.as_secs_f64())
}
