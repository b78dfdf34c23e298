//! Shared types, error model, and configuration for the DataLive bootstrapper.
//!
//! This crate is the foundation depended on by all other bootstrap crates.
//! It provides:
//! - [`BootstrapError`], the unified error type
//! - Domain types ([`DetectedState`], [`SessionArtifact`], per-item outcomes)
//! - Configuration ([`AppConfig`], env overlay, config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, EnvLookup, MinioConfig, Neo4jConfig, OAuthClientConfig, OllamaConfig, OwnerConfig,
    PlatformConfig, PostgresConfig, QdrantConfig, ReadinessConfig, ReadinessSettings, RedisConfig,
    RunConfig, ServicesConfig, SessionSettings, StorageConfig, config_dir, config_file_path,
    init_config, load_config, load_config_from, process_env, resolve_config,
};
pub use error::{BootstrapError, Result};
pub use types::{
    AUTH_COOKIE_NAME, ActivationStatus, CredentialAction, CredentialOutcome, DetectedState,
    DetectionSignals, FinalPhase, NewCredential, OwnerIdentity, Phase, PhaseRecord, PhaseStatus,
    RemoteCredential, RemoteUser, RemoteWorkflow, SessionArtifact, WorkflowAction,
    WorkflowOutcome,
};
