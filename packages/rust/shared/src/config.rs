//! Bootstrap configuration.
//!
//! Resolution order: built-in defaults, then `~/.datalive/bootstrap.toml`
//! (or an explicit `--config` path), then environment variables, then CLI
//! flags. Secrets for the owner identity and the license are only ever read
//! from the environment.

use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::Duration;

use regex::Regex;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{BootstrapError, Result};
use crate::types::OwnerIdentity;

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "bootstrap.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".datalive";

/// Placeholder printed instead of secret values.
const REDACTED: &str = "********";

/// Environment lookup used to overlay settings. Empty values count as unset.
pub type EnvLookup<'a> = &'a dyn Fn(&str) -> Option<String>;

/// Reads from the process environment.
pub fn process_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}

// ---------------------------------------------------------------------------
// Config structs (matching bootstrap.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub platform: PlatformConfig,

    #[serde(default)]
    pub readiness: ReadinessConfig,

    #[serde(default)]
    pub owner: OwnerConfig,

    /// Privileged backing-store channel. Leaving both `path` and `url`
    /// unset disables the fallback path.
    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub run: RunConfig,

    /// Connection parameters for the credential catalog.
    #[serde(default)]
    pub services: ServicesConfig,
}

/// `[platform]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlatformConfig {
    /// Base URL of the automation platform.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Prefix of the control-plane REST API.
    #[serde(default = "default_rest_prefix")]
    pub rest_prefix: String,

    /// Liveness endpoint path.
    #[serde(default = "default_health_path")]
    pub health_path: String,

    /// Per-request timeout.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

impl Default for PlatformConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            rest_prefix: default_rest_prefix(),
            health_path: default_health_path(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

fn default_base_url() -> String {
    "http://n8n:5678".into()
}
fn default_rest_prefix() -> String {
    "/rest".into()
}
fn default_health_path() -> String {
    "/healthz".into()
}
fn default_request_timeout() -> u64 {
    30
}

/// `[readiness]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadinessConfig {
    #[serde(default = "default_max_wait")]
    pub max_wait_secs: u64,

    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,
}

impl Default for ReadinessConfig {
    fn default() -> Self {
        Self {
            max_wait_secs: default_max_wait(),
            poll_interval_secs: default_poll_interval(),
        }
    }
}

fn default_max_wait() -> u64 {
    300
}
fn default_poll_interval() -> u64 {
    5
}

/// `[owner]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OwnerConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,

    #[serde(default = "default_first_name")]
    pub first_name: String,

    #[serde(default = "default_last_name")]
    pub last_name: String,

    /// Name of the env var holding the owner password (never store the password itself).
    #[serde(default = "default_password_env")]
    pub password_env: String,

    /// Name of the env var holding the optional license activation key.
    #[serde(default = "default_license_key_env")]
    pub license_key_env: String,
}

impl Default for OwnerConfig {
    fn default() -> Self {
        Self {
            email: None,
            first_name: default_first_name(),
            last_name: default_last_name(),
            password_env: default_password_env(),
            license_key_env: default_license_key_env(),
        }
    }
}

fn default_first_name() -> String {
    "DataLive".into()
}
fn default_last_name() -> String {
    "Admin".into()
}
fn default_password_env() -> String {
    "N8N_USER_PASSWORD".into()
}
fn default_license_key_env() -> String {
    "N8N_LICENSE_KEY".into()
}

/// `[storage]` section.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Local SQLite/libSQL database file of the platform.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,

    /// Remote libSQL endpoint.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_token: Option<String>,
}

impl StorageConfig {
    /// Whether a fallback channel is configured at all.
    pub fn is_configured(&self) -> bool {
        self.path.is_some() || self.url.is_some()
    }
}

/// `[run]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    /// Directory of workflow definition files.
    #[serde(default = "default_workflows_dir")]
    pub workflows_dir: String,

    /// Where the JSON run report is written.
    #[serde(default = "default_report_path")]
    pub report_path: String,

    /// Directory for the transient session file (defaults to the system temp dir).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_dir: Option<String>,

    /// Keep the session file after the run, for debugging.
    #[serde(default)]
    pub keep_session_file: bool,

    /// Worker pool size for credential and workflow items.
    #[serde(default = "default_concurrency")]
    pub concurrency: u32,

    /// Wall-clock budget per phase.
    #[serde(default = "default_phase_timeout")]
    pub phase_timeout_secs: u64,

    #[serde(default = "default_login_attempts")]
    pub login_attempts: u32,

    #[serde(default = "default_login_backoff")]
    pub login_backoff_ms: u64,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            workflows_dir: default_workflows_dir(),
            report_path: default_report_path(),
            session_dir: None,
            keep_session_file: false,
            concurrency: default_concurrency(),
            phase_timeout_secs: default_phase_timeout(),
            login_attempts: default_login_attempts(),
            login_backoff_ms: default_login_backoff(),
        }
    }
}

fn default_workflows_dir() -> String {
    "workflows".into()
}
fn default_report_path() -> String {
    "bootstrap-report.json".into()
}
fn default_concurrency() -> u32 {
    4
}
fn default_phase_timeout() -> u64 {
    120
}
fn default_login_attempts() -> u32 {
    5
}
fn default_login_backoff() -> u64 {
    2000
}

/// `[services]` section.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServicesConfig {
    #[serde(default)]
    pub postgres: PostgresConfig,
    #[serde(default)]
    pub redis: RedisConfig,
    #[serde(default)]
    pub minio: MinioConfig,
    #[serde(default)]
    pub qdrant: QdrantConfig,
    #[serde(default)]
    pub neo4j: Neo4jConfig,
    #[serde(default)]
    pub ollama: OllamaConfig,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub google_oauth: Option<OAuthClientConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub microsoft_oauth: Option<OAuthClientConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostgresConfig {
    #[serde(default = "default_postgres_host")]
    pub host: String,
    #[serde(default = "default_postgres_port")]
    pub port: u16,
    #[serde(default = "default_postgres_database")]
    pub database: String,
    #[serde(default = "default_postgres_user")]
    pub user: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub ssl: bool,
}

impl Default for PostgresConfig {
    fn default() -> Self {
        Self {
            host: default_postgres_host(),
            port: default_postgres_port(),
            database: default_postgres_database(),
            user: default_postgres_user(),
            password: String::new(),
            ssl: false,
        }
    }
}

fn default_postgres_host() -> String {
    "postgres".into()
}
fn default_postgres_port() -> u16 {
    5432
}
fn default_postgres_database() -> String {
    "datalive_db".into()
}
fn default_postgres_user() -> String {
    "datalive_user".into()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisConfig {
    #[serde(default = "default_redis_host")]
    pub host: String,
    #[serde(default = "default_redis_port")]
    pub port: u16,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub database: u32,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            host: default_redis_host(),
            port: default_redis_port(),
            password: String::new(),
            database: 0,
        }
    }
}

fn default_redis_host() -> String {
    "redis".into()
}
fn default_redis_port() -> u16 {
    6379
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MinioConfig {
    #[serde(default = "default_minio_endpoint")]
    pub endpoint: String,
    #[serde(default)]
    pub access_key: String,
    #[serde(default)]
    pub secret_key: String,
    #[serde(default = "default_minio_region")]
    pub region: String,
}

impl Default for MinioConfig {
    fn default() -> Self {
        Self {
            endpoint: default_minio_endpoint(),
            access_key: String::new(),
            secret_key: String::new(),
            region: default_minio_region(),
        }
    }
}

fn default_minio_endpoint() -> String {
    "http://minio:9000".into()
}
fn default_minio_region() -> String {
    "us-east-1".into()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QdrantConfig {
    #[serde(default = "default_qdrant_url")]
    pub url: String,
    #[serde(default)]
    pub api_key: String,
}

impl Default for QdrantConfig {
    fn default() -> Self {
        Self {
            url: default_qdrant_url(),
            api_key: String::new(),
        }
    }
}

fn default_qdrant_url() -> String {
    "http://qdrant:6333".into()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Neo4jConfig {
    #[serde(default = "default_neo4j_url")]
    pub url: String,
    #[serde(default = "default_neo4j_user")]
    pub user: String,
    #[serde(default)]
    pub password: String,
}

impl Default for Neo4jConfig {
    fn default() -> Self {
        Self {
            url: default_neo4j_url(),
            user: default_neo4j_user(),
            password: String::new(),
        }
    }
}

fn default_neo4j_url() -> String {
    "http://neo4j:7474".into()
}
fn default_neo4j_user() -> String {
    "neo4j".into()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OllamaConfig {
    #[serde(default = "default_ollama_url")]
    pub base_url: String,
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            base_url: default_ollama_url(),
        }
    }
}

fn default_ollama_url() -> String {
    "http://ollama:11434".into()
}

/// OAuth client registration for an optional external provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OAuthClientConfig {
    pub client_id: String,
    pub client_secret: String,
}

// ---------------------------------------------------------------------------
// Environment overlay
// ---------------------------------------------------------------------------

impl AppConfig {
    /// Overlay environment variables on top of file/default values.
    pub fn apply_env(&mut self, env: EnvLookup<'_>) -> Result<()> {
        set_string(env, "N8N_URL", &mut self.platform.base_url);
        if let Some(email) = env("N8N_USER_EMAIL") {
            self.owner.email = Some(email);
        }
        set_string(env, "N8N_USER_FIRSTNAME", &mut self.owner.first_name);
        set_string(env, "N8N_USER_LASTNAME", &mut self.owner.last_name);

        if let Some(path) = env("N8N_DB_PATH") {
            self.storage.path = Some(path);
        }
        if let Some(url) = env("N8N_DB_URL") {
            self.storage.url = Some(url);
        }
        if let Some(token) = env("N8N_DB_AUTH_TOKEN") {
            self.storage.auth_token = Some(token);
        }

        set_string(env, "N8N_WORKFLOWS_DIR", &mut self.run.workflows_dir);
        set_string(env, "BOOTSTRAP_REPORT_PATH", &mut self.run.report_path);

        let pg = &mut self.services.postgres;
        set_string(env, "POSTGRES_HOST", &mut pg.host);
        set_parsed(env, "POSTGRES_PORT", &mut pg.port)?;
        set_string(env, "POSTGRES_DB", &mut pg.database);
        set_string(env, "POSTGRES_USER", &mut pg.user);
        set_string(env, "POSTGRES_PASSWORD", &mut pg.password);

        let redis = &mut self.services.redis;
        set_string(env, "REDIS_HOST", &mut redis.host);
        set_parsed(env, "REDIS_PORT", &mut redis.port)?;
        set_string(env, "REDIS_PASSWORD", &mut redis.password);

        let minio = &mut self.services.minio;
        set_string(env, "MINIO_ENDPOINT", &mut minio.endpoint);
        set_string(env, "MINIO_ROOT_USER", &mut minio.access_key);
        set_string(env, "MINIO_ROOT_PASSWORD", &mut minio.secret_key);
        set_string(env, "MINIO_REGION", &mut minio.region);

        let qdrant = &mut self.services.qdrant;
        set_string(env, "QDRANT_URL", &mut qdrant.url);
        set_string(env, "QDRANT_API_KEY", &mut qdrant.api_key);

        let neo4j = &mut self.services.neo4j;
        set_string(env, "NEO4J_URL", &mut neo4j.url);
        set_string(env, "NEO4J_USER", &mut neo4j.user);
        set_string(env, "NEO4J_PASSWORD", &mut neo4j.password);

        set_string(env, "OLLAMA_URL", &mut self.services.ollama.base_url);

        if let (Some(client_id), Some(client_secret)) =
            (env("GOOGLE_CLIENT_ID"), env("GOOGLE_CLIENT_SECRET"))
        {
            self.services.google_oauth = Some(OAuthClientConfig {
                client_id,
                client_secret,
            });
        }
        if let (Some(client_id), Some(client_secret)) =
            (env("MICROSOFT_CLIENT_ID"), env("MICROSOFT_CLIENT_SECRET"))
        {
            self.services.microsoft_oauth = Some(OAuthClientConfig {
                client_id,
                client_secret,
            });
        }

        Ok(())
    }

    /// Check the settings every run needs, before any network call.
    pub fn validate(&self) -> Result<()> {
        let base = Url::parse(&self.platform.base_url).map_err(|e| {
            BootstrapError::config(format!(
                "invalid platform.base_url '{}': {e}",
                self.platform.base_url
            ))
        })?;
        if base.scheme() != "http" && base.scheme() != "https" {
            return Err(BootstrapError::config(format!(
                "platform.base_url must be http or https, got '{}'",
                base.scheme()
            )));
        }

        match self.owner.email.as_deref() {
            None => {
                return Err(BootstrapError::config(
                    "owner email not set. Set N8N_USER_EMAIL or [owner].email",
                ));
            }
            Some(email) if !email_pattern().is_match(email) => {
                return Err(BootstrapError::config(format!(
                    "owner email '{email}' is not a valid address"
                )));
            }
            Some(_) => {}
        }

        if self.storage.path.is_some() && self.storage.url.is_some() {
            return Err(BootstrapError::config(
                "set either storage.path or storage.url, not both",
            ));
        }
        if self.run.concurrency == 0 {
            return Err(BootstrapError::config("run.concurrency must be at least 1"));
        }
        if self.readiness.poll_interval_secs == 0 {
            return Err(BootstrapError::config(
                "readiness.poll_interval_secs must be at least 1",
            ));
        }
        if self.run.login_attempts == 0 {
            return Err(BootstrapError::config("run.login_attempts must be at least 1"));
        }
        if self.run.phase_timeout_secs == 0 {
            return Err(BootstrapError::config("run.phase_timeout_secs must be at least 1"));
        }
        Ok(())
    }

    /// Resolve the owner identity, reading the password from the environment.
    pub fn owner_identity(&self, env: EnvLookup<'_>) -> Result<OwnerIdentity> {
        let email = self
            .owner
            .email
            .clone()
            .ok_or_else(|| BootstrapError::config("owner email not set"))?;
        let var_name = &self.owner.password_env;
        let password = env(var_name).ok_or_else(|| {
            BootstrapError::config(format!(
                "owner password not found. Set the {var_name} environment variable."
            ))
        })?;

        Ok(OwnerIdentity {
            email,
            first_name: self.owner.first_name.clone(),
            last_name: self.owner.last_name.clone(),
            password,
        })
    }

    /// The optional license activation key.
    pub fn license_key(&self, env: EnvLookup<'_>) -> Option<String> {
        env(&self.owner.license_key_env)
    }

    /// A copy safe to print: secret values replaced.
    pub fn redacted(&self) -> AppConfig {
        let mut copy = self.clone();
        if copy.storage.auth_token.is_some() {
            copy.storage.auth_token = Some(REDACTED.into());
        }
        let services = &mut copy.services;
        for secret in [
            &mut services.postgres.password,
            &mut services.redis.password,
            &mut services.minio.secret_key,
            &mut services.qdrant.api_key,
            &mut services.neo4j.password,
        ] {
            if !secret.is_empty() {
                *secret = REDACTED.into();
            }
        }
        for oauth in [&mut services.google_oauth, &mut services.microsoft_oauth]
            .into_iter()
            .flatten()
        {
            oauth.client_secret = REDACTED.into();
        }
        copy
    }
}

fn set_string(env: EnvLookup<'_>, key: &str, target: &mut String) {
    if let Some(value) = env(key) {
        *target = value;
    }
}

fn set_parsed<T: std::str::FromStr>(env: EnvLookup<'_>, key: &str, target: &mut T) -> Result<()>
where
    T::Err: std::fmt::Display,
{
    if let Some(raw) = env(key) {
        *target = raw
            .parse()
            .map_err(|e| BootstrapError::config(format!("{key}='{raw}': {e}")))?;
    }
    Ok(())
}

fn email_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("valid email regex"))
}

// ---------------------------------------------------------------------------
// Runtime settings (merged from config + CLI flags)
// ---------------------------------------------------------------------------

/// Readiness probe parameters.
#[derive(Debug, Clone, Copy)]
pub struct ReadinessSettings {
    pub max_wait: Duration,
    pub poll_interval: Duration,
}

impl From<&AppConfig> for ReadinessSettings {
    fn from(config: &AppConfig) -> Self {
        Self {
            max_wait: Duration::from_secs(config.readiness.max_wait_secs),
            poll_interval: Duration::from_secs(config.readiness.poll_interval_secs),
        }
    }
}

/// Session manager parameters.
#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub attempts: u32,
    pub backoff: Duration,
    /// Directory for the transient session file.
    pub dir: PathBuf,
    pub keep_file: bool,
}

impl From<&AppConfig> for SessionSettings {
    fn from(config: &AppConfig) -> Self {
        let dir = config
            .run
            .session_dir
            .as_ref()
            .map(PathBuf::from)
            .unwrap_or_else(|| std::env::temp_dir().join("datalive-bootstrap"));
        Self {
            attempts: config.run.login_attempts,
            backoff: Duration::from_millis(config.run.login_backoff_ms),
            dir,
            keep_file: config.run.keep_session_file,
        }
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.datalive/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| BootstrapError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.datalive/bootstrap.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| BootstrapError::io(path, e))?;

    toml::from_str(&content)
        .map_err(|e| BootstrapError::config(format!("failed to parse {}: {e}", path.display())))
}

/// Load from `path` (or the default location) and overlay the process environment.
pub fn resolve_config(path: Option<&Path>) -> Result<AppConfig> {
    let mut config = match path {
        Some(p) => load_config_from(p)?,
        None => load_config()?,
    };
    config.apply_env(&process_env)?;
    Ok(config)
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| BootstrapError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| BootstrapError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| BootstrapError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn env_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    fn valid_config() -> AppConfig {
        let mut config = AppConfig::default();
        config.owner.email = Some("admin@datalive.local".into());
        config
    }

    #[test]
    fn default_config_serializes() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize default config");
        assert!(toml_str.contains("base_url"));
        assert!(toml_str.contains("N8N_USER_PASSWORD"));
    }

    #[test]
    fn config_roundtrip() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize");
        let parsed: AppConfig = toml::from_str(&toml_str).expect("deserialize");
        assert_eq!(parsed.readiness.max_wait_secs, 300);
        assert_eq!(parsed.run.concurrency, 4);
        assert_eq!(parsed.services.postgres.port, 5432);
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let toml_str = r#"
[platform]
base_url = "http://localhost:5678"

[storage]
path = "/data/n8n/database.sqlite"

[services.redis]
host = "cache"
"#;
        let config: AppConfig = toml::from_str(toml_str).expect("parse");
        assert_eq!(config.platform.base_url, "http://localhost:5678");
        assert_eq!(config.platform.rest_prefix, "/rest");
        assert!(config.storage.is_configured());
        assert_eq!(config.services.redis.host, "cache");
        assert_eq!(config.services.redis.port, 6379);
    }

    #[test]
    fn env_overrides_file_values() {
        let mut config = AppConfig::default();
        let env = env_from(&[
            ("N8N_URL", "http://automation:5678"),
            ("N8N_USER_EMAIL", "ops@example.com"),
            ("N8N_DB_PATH", "/tmp/n8n.sqlite"),
            ("POSTGRES_PORT", "6543"),
            ("NEO4J_PASSWORD", "graph"),
            ("GOOGLE_CLIENT_ID", "gid"),
            ("GOOGLE_CLIENT_SECRET", "gsecret"),
        ]);
        config.apply_env(&env).expect("apply env");

        assert_eq!(config.platform.base_url, "http://automation:5678");
        assert_eq!(config.owner.email.as_deref(), Some("ops@example.com"));
        assert_eq!(config.storage.path.as_deref(), Some("/tmp/n8n.sqlite"));
        assert_eq!(config.services.postgres.port, 6543);
        assert_eq!(config.services.neo4j.password, "graph");
        assert!(config.services.google_oauth.is_some());
        assert!(config.services.microsoft_oauth.is_none());
    }

    #[test]
    fn env_rejects_bad_port() {
        let mut config = AppConfig::default();
        let env = env_from(&[("REDIS_PORT", "not-a-port")]);
        let err = config.apply_env(&env).unwrap_err();
        assert!(err.to_string().contains("REDIS_PORT"));
    }

    #[test]
    fn validation_requires_owner_email() {
        let config = AppConfig::default();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("owner email not set"));

        let mut config = valid_config();
        config.owner.email = Some("not-an-email".into());
        assert!(config.validate().is_err());

        assert!(valid_config().validate().is_ok());
    }

    #[test]
    fn validation_rejects_bad_settings() {
        let mut config = valid_config();
        config.platform.base_url = "ftp://n8n".into();
        assert!(config.validate().is_err());

        let mut config = valid_config();
        config.run.concurrency = 0;
        assert!(config.validate().is_err());

        let mut config = valid_config();
        config.run.phase_timeout_secs = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("phase_timeout_secs"));

        let mut config = valid_config();
        config.storage.path = Some("/a".into());
        config.storage.url = Some("libsql://b".into());
        assert!(config.validate().is_err());
    }

    #[test]
    fn owner_password_comes_from_env() {
        let config = valid_config();
        let missing = env_from(&[]);
        let err = config.owner_identity(&missing).unwrap_err();
        assert!(err.to_string().contains("N8N_USER_PASSWORD"));

        let present = env_from(&[("N8N_USER_PASSWORD", "s3cret-pass")]);
        let owner = config.owner_identity(&present).expect("owner");
        assert_eq!(owner.email, "admin@datalive.local");
        assert_eq!(owner.password, "s3cret-pass");
        assert_eq!(owner.first_name, "DataLive");
    }

    #[test]
    fn license_key_is_optional() {
        let config = valid_config();
        assert!(config.license_key(&env_from(&[])).is_none());
        let env = env_from(&[("N8N_LICENSE_KEY", "lic-123")]);
        assert_eq!(config.license_key(&env).as_deref(), Some("lic-123"));
    }

    #[test]
    fn redacted_hides_secrets() {
        let mut config = valid_config();
        config.services.postgres.password = "pg-pass".into();
        config.services.microsoft_oauth = Some(OAuthClientConfig {
            client_id: "mid".into(),
            client_secret: "msecret".into(),
        });
        let shown = toml::to_string_pretty(&config.redacted()).expect("serialize");
        assert!(!shown.contains("pg-pass"));
        assert!(!shown.contains("msecret"));
        assert!(shown.contains("mid"));
    }

    #[test]
    fn session_settings_default_dir() {
        let config = valid_config();
        let session = SessionSettings::from(&config);
        assert!(session.dir.ends_with("datalive-bootstrap"));
        assert_eq!(session.attempts, 5);
        assert!(!session.keep_file);
    }
}
