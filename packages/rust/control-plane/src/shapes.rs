//! Field-presence helpers for control-plane responses.
//!
//! Response envelopes differ between platform versions (`{data: [...]}`,
//! `{data: {data: [...], count}}`, bare objects, numeric vs. string ids), so
//! nothing here deserializes into a fixed schema. Each helper looks for the
//! fields it needs and reports absence as `None`.

use serde_json::Value;
use tracing::debug;

use datalive_shared::{BootstrapError, RemoteCredential, RemoteWorkflow, Result};

/// Unwrap a `{"data": ...}` envelope if present.
pub(crate) fn unwrap_data(body: &Value) -> &Value {
    match body.get("data") {
        Some(inner) if !inner.is_null() => inner,
        _ => body,
    }
}

/// Render an id that may arrive as a string or a number.
pub(crate) fn id_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Identifier of a created/returned object: `data.id`, then `id`.
pub(crate) fn extract_id(body: &Value) -> Option<String> {
    unwrap_data(body)
        .get("id")
        .and_then(id_string)
        .or_else(|| body.get("id").and_then(id_string))
}

/// The list carried by a list response, in any of the known envelopes.
pub(crate) fn data_array(body: &Value) -> Option<&Vec<Value>> {
    if let Some(items) = body.as_array() {
        return Some(items);
    }
    let data = body.get("data")?;
    if let Some(items) = data.as_array() {
        return Some(items);
    }
    data.get("data").and_then(Value::as_array)
}

/// The "owner is configured" flag from a settings response.
///
/// Newer versions expose `isInstanceOwnerSetUp`; older ones only expose
/// `showSetupOnFirstLoad`, which is its negation.
pub(crate) fn owner_flag(body: &Value) -> Option<bool> {
    let um = unwrap_data(body).get("userManagement")?;
    if let Some(flag) = um.get("isInstanceOwnerSetUp").and_then(Value::as_bool) {
        return Some(flag);
    }
    um.get("showSetupOnFirstLoad")
        .and_then(Value::as_bool)
        .map(|show| !show)
}

/// Session token carried in a login body, if the platform issues bearer tokens.
pub(crate) fn session_token(body: &Value) -> Option<String> {
    unwrap_data(body)
        .get("token")
        .or_else(|| body.get("token"))
        .and_then(Value::as_str)
        .filter(|t| !t.is_empty())
        .map(String::from)
}

/// Human-readable error message from an error body.
pub(crate) fn error_message(body: &Value) -> Option<String> {
    body.get("message")
        .or_else(|| unwrap_data(body).get("message"))
        .and_then(Value::as_str)
        .map(String::from)
}

pub(crate) fn parse_credential(item: &Value) -> Option<RemoteCredential> {
    let id = item.get("id").and_then(id_string)?;
    let name = item.get("name").and_then(Value::as_str)?.to_string();
    let kind = item
        .get("type")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    Some(RemoteCredential { id, name, kind })
}

pub(crate) fn parse_workflow(item: &Value) -> Option<RemoteWorkflow> {
    let item = unwrap_data(item);
    let id = item.get("id").and_then(id_string)?;
    let name = item.get("name").and_then(Value::as_str)?.to_string();
    let active = item.get("active").and_then(Value::as_bool).unwrap_or(false);
    let version_id = item.get("versionId").and_then(id_string);
    Some(RemoteWorkflow {
        id,
        name,
        active,
        version_id,
    })
}

/// Parse every recognizable entry of a list response, dropping the rest.
///
/// A body without any array is an error: it says nothing about which
/// records exist, so it must not be read as an empty list.
pub(crate) fn parse_list<T>(body: &Value, parse: fn(&Value) -> Option<T>) -> Result<Vec<T>> {
    let items = data_array(body).ok_or_else(|| {
        BootstrapError::api(200, "list response carried no recognizable array")
    })?;
    Ok(items
        .iter()
        .filter_map(|item| {
            let parsed = parse(item);
            if parsed.is_none() {
                debug!(item = %item, "skipping list entry without id/name");
            }
            parsed
        })
        .collect())
}
