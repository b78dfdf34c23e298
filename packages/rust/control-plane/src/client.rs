//! reqwest implementation of [`ControlPlane`] against the platform's REST API.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::SET_COOKIE;
use reqwest::{Client, Method, RequestBuilder, StatusCode};
use serde_json::{Value, json};
use tracing::{debug, instrument};
use url::Url;

use datalive_shared::{
    AUTH_COOKIE_NAME, BootstrapError, NewCredential, OwnerIdentity, PlatformConfig,
    RemoteCredential, RemoteUser, RemoteWorkflow, Result, SessionArtifact,
};

use crate::ControlPlane;
use crate::shapes;

/// User-Agent string for control-plane requests.
const USER_AGENT: &str = concat!("datalive-bootstrap/", env!("CARGO_PKG_VERSION"));

/// Maximum number of redirects to follow.
const MAX_REDIRECTS: usize = 3;

// ---------------------------------------------------------------------------
// Client options
// ---------------------------------------------------------------------------

/// Connection settings for [`ControlPlaneClient`].
#[derive(Debug, Clone)]
pub struct ClientOptions {
    pub base_url: Url,
    pub rest_prefix: String,
    pub health_path: String,
    pub timeout: Duration,
}

impl ClientOptions {
    /// Options from the `[platform]` config section.
    pub fn from_config(config: &PlatformConfig) -> Result<Self> {
        let base_url = Url::parse(&config.base_url).map_err(|e| {
            BootstrapError::config(format!("invalid base URL '{}': {e}", config.base_url))
        })?;
        Ok(Self {
            base_url,
            rest_prefix: config.rest_prefix.clone(),
            health_path: config.health_path.clone(),
            timeout: Duration::from_secs(config.request_timeout_secs),
        })
    }

    /// Defaults pointed at `base_url` (used by tests against mock servers).
    pub fn for_base(base_url: Url) -> Self {
        let defaults = PlatformConfig::default();
        Self {
            base_url,
            rest_prefix: defaults.rest_prefix,
            health_path: defaults.health_path,
            timeout: Duration::from_secs(defaults.request_timeout_secs),
        }
    }
}

// ---------------------------------------------------------------------------
// ControlPlaneClient
// ---------------------------------------------------------------------------

/// HTTP client for the automation platform's control plane.
#[derive(Debug, Clone)]
pub struct ControlPlaneClient {
    client: Client,
    base: String,
    rest_prefix: String,
    health_path: String,
}

impl ControlPlaneClient {
    /// Build a client with the given options.
    pub fn new(opts: &ClientOptions) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .redirect(reqwest::redirect::Policy::limited(MAX_REDIRECTS))
            .timeout(opts.timeout)
            .build()
            .map_err(|e| BootstrapError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base: opts.base_url.as_str().trim_end_matches('/').to_string(),
            rest_prefix: normalize_path(&opts.rest_prefix),
            health_path: normalize_path(&opts.health_path),
        })
    }

    fn rest_url(&self, path: &str) -> String {
        format!("{}{}/{}", self.base, self.rest_prefix, path.trim_start_matches('/'))
    }

    fn request(
        &self,
        method: Method,
        path: &str,
        session: Option<&SessionArtifact>,
    ) -> RequestBuilder {
        let builder = self.client.request(method, self.rest_url(path));
        match session {
            Some(session) => {
                let (name, value) = session.header();
                builder.header(name, value)
            }
            None => builder,
        }
    }

    /// Send a request and return the parsed body.
    /// Non-success statuses become [`BootstrapError::Api`].
    async fn send(&self, builder: RequestBuilder, what: &str) -> Result<Value> {
        let (_, body) = self.send_raw(builder, what).await?;
        Ok(body)
    }

    async fn send_raw(
        &self,
        builder: RequestBuilder,
        what: &str,
    ) -> Result<(reqwest::header::HeaderMap, Value)> {
        let response = builder
            .send()
            .await
            .map_err(|e| BootstrapError::Network(format!("{what}: {e}")))?;

        let status = response.status();
        let headers = response.headers().clone();
        let text = response
            .text()
            .await
            .map_err(|e| BootstrapError::Network(format!("{what}: failed to read body: {e}")))?;
        let body: Value = if text.trim().is_empty() {
            Value::Null
        } else {
            serde_json::from_str(&text).unwrap_or(Value::String(text))
        };

        if !status.is_success() {
            return Err(api_error(status, &body, what));
        }

        debug!(%status, what, "control plane call succeeded");
        Ok((headers, body))
    }
}

#[async_trait]
impl ControlPlane for ControlPlaneClient {
    #[instrument(skip_all)]
    async fn health(&self) -> Result<()> {
        let url = format!("{}{}", self.base, self.health_path);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| BootstrapError::Network(format!("{url}: {e}")))?;
        let status = response.status();
        if !status.is_success() {
            return Err(BootstrapError::api(status.as_u16(), format!("{url} not ready")));
        }
        Ok(())
    }

    #[instrument(skip_all)]
    async fn owner_configured(&self) -> Result<Option<bool>> {
        let body = self
            .send(self.request(Method::GET, "settings", None), "settings")
            .await?;
        Ok(shapes::owner_flag(&body))
    }

    #[instrument(skip_all, fields(email = %owner.email))]
    async fn setup_owner(&self, owner: &OwnerIdentity) -> Result<RemoteUser> {
        let payload = json!({
            "email": owner.email,
            "firstName": owner.first_name,
            "lastName": owner.last_name,
            "password": owner.password,
        });
        let body = self
            .send(
                self.request(Method::POST, "owner/setup", None).json(&payload),
                "owner setup",
            )
            .await?;

        let id = shapes::extract_id(&body).ok_or_else(|| {
            BootstrapError::api(200, "owner setup response carried no user identifier")
        })?;
        let email = shapes::unwrap_data(&body)
            .get("email")
            .and_then(Value::as_str)
            .map(String::from);
        Ok(RemoteUser { id, email })
    }

    #[instrument(skip_all, fields(email = %email))]
    async fn login(&self, email: &str, password: &str) -> Result<SessionArtifact> {
        // Older versions read `email`, newer ones `emailOrLdapLoginId`.
        let payload = json!({
            "email": email,
            "emailOrLdapLoginId": email,
            "password": password,
        });
        let (headers, body) = self
            .send_raw(
                self.request(Method::POST, "login", None).json(&payload),
                "login",
            )
            .await?;

        if let Some(value) = auth_cookie(&headers) {
            return Ok(SessionArtifact::Cookie {
                name: AUTH_COOKIE_NAME.to_string(),
                value,
            });
        }
        if let Some(token) = shapes::session_token(&body) {
            return Ok(SessionArtifact::Bearer { token });
        }
        Err(BootstrapError::api(
            200,
            "login succeeded but the response carried no session cookie or token",
        ))
    }

    #[instrument(skip_all)]
    async fn activate_license(&self, session: &SessionArtifact, key: &str) -> Result<()> {
        let payload = json!({ "activationKey": key });
        self.send(
            self.request(Method::POST, "license/activate", Some(session))
                .json(&payload),
            "license activation",
        )
        .await?;
        Ok(())
    }

    #[instrument(skip_all)]
    async fn list_credentials(&self, session: &SessionArtifact) -> Result<Vec<RemoteCredential>> {
        let body = self
            .send(
                self.request(Method::GET, "credentials", Some(session)),
                "list credentials",
            )
            .await?;
        shapes::parse_list(&body, shapes::parse_credential)
    }

    #[instrument(skip_all, fields(name = %credential.name, kind = %credential.kind))]
    async fn create_credential(
        &self,
        session: &SessionArtifact,
        credential: &NewCredential,
    ) -> Result<RemoteCredential> {
        let payload = json!({
            "name": credential.name,
            "type": credential.kind,
            "data": credential.data,
        });
        let body = self
            .send(
                self.request(Method::POST, "credentials", Some(session))
                    .json(&payload),
                "create credential",
            )
            .await?;

        let id = shapes::extract_id(&body).ok_or_else(|| {
            BootstrapError::api(200, "credential create response carried no identifier")
        })?;
        Ok(RemoteCredential {
            id,
            name: credential.name.clone(),
            kind: credential.kind.clone(),
        })
    }

    #[instrument(skip_all)]
    async fn list_workflows(&self, session: &SessionArtifact) -> Result<Vec<RemoteWorkflow>> {
        let body = self
            .send(
                self.request(Method::GET, "workflows", Some(session)),
                "list workflows",
            )
            .await?;
        shapes::parse_list(&body, shapes::parse_workflow)
    }

    #[instrument(skip_all)]
    async fn create_workflow(
        &self,
        session: &SessionArtifact,
        definition: &Value,
    ) -> Result<RemoteWorkflow> {
        let body = self
            .send(
                self.request(Method::POST, "workflows", Some(session))
                    .json(definition),
                "create workflow",
            )
            .await?;
        shapes::parse_workflow(&body).ok_or_else(|| {
            BootstrapError::api(200, "workflow create response carried no identifier")
        })
    }

    #[instrument(skip_all, fields(id = %id))]
    async fn update_workflow(
        &self,
        session: &SessionArtifact,
        id: &str,
        definition: &Value,
    ) -> Result<RemoteWorkflow> {
        let body = self
            .send(
                self.request(Method::PATCH, &format!("workflows/{id}"), Some(session))
                    .json(definition),
                "update workflow",
            )
            .await?;

        // Some versions answer PATCH with an empty body.
        Ok(shapes::parse_workflow(&body).unwrap_or_else(|| RemoteWorkflow {
            id: id.to_string(),
            name: definition
                .get("name")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            active: false,
            version_id: None,
        }))
    }

    #[instrument(skip_all, fields(id = %workflow.id))]
    async fn activate_workflow(
        &self,
        session: &SessionArtifact,
        workflow: &RemoteWorkflow,
    ) -> Result<()> {
        let mut payload = json!({});
        if let Some(version) = &workflow.version_id {
            payload["versionId"] = json!(version);
        }

        let dedicated = self
            .send(
                self.request(
                    Method::POST,
                    &format!("workflows/{}/activate", workflow.id),
                    Some(session),
                )
                .json(&payload),
                "activate workflow",
            )
            .await;

        match dedicated {
            Ok(_) => Ok(()),
            // No dedicated endpoint on this version: flip the flag instead.
            Err(e) if matches!(e.status(), Some(404) | Some(405)) => {
                debug!("activate endpoint unavailable, falling back to PATCH");
                payload["active"] = json!(true);
                self.send(
                    self.request(Method::PATCH, &format!("workflows/{}", workflow.id), Some(session))
                        .json(&payload),
                    "activate workflow",
                )
                .await?;
                Ok(())
            }
            Err(e) => Err(e),
        }
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Ensure a path starts with exactly one `/` and has no trailing slash.
fn normalize_path(path: &str) -> String {
    let trimmed = path.trim_matches('/');
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("/{trimmed}")
    }
}

/// Pull the auth cookie value out of `Set-Cookie` headers.
fn auth_cookie(headers: &reqwest::header::HeaderMap) -> Option<String> {
    headers
        .get_all(SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .find_map(|cookie| {
            let pair = cookie.split(';').next()?;
            let (name, value) = pair.split_once('=')?;
            (name.trim() == AUTH_COOKIE_NAME && !value.trim().is_empty())
                .then(|| value.trim().to_string())
        })
}

fn api_error(status: StatusCode, body: &Value, what: &str) -> BootstrapError {
    let message = shapes::error_message(body)
        .or_else(|| body.as_str().map(String::from))
        .unwrap_or_else(|| status.canonical_reason().unwrap_or("request failed").to_string());
    BootstrapError::api(status.as_u16(), format!("{what}: {message}"))
}
