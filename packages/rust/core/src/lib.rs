//! Bootstrap phases and orchestration for the DataLive automation platform.
//!
//! This crate drives a freshly started platform instance to a usable state:
//! readiness probing, state detection, owner identity creation (API first,
//! backing store as fallback), session login, license activation, credential
//! provisioning and workflow import. [`pipeline::run_bootstrap`] runs the
//! phases in order and returns a [`report::RunReport`].

pub mod credentials;
pub mod detector;
pub mod entitlement;
pub mod identity;
pub mod pipeline;
pub mod pool;
pub mod prober;
pub mod report;
pub mod session;
pub mod workflows;

#[cfg(test)]
mod testkit;

pub use pipeline::{BootstrapOptions, ProgressReporter, RunContext, SilentProgress, run_bootstrap};
pub use report::{FatalFailure, RunReport, render_summary, write_report};
