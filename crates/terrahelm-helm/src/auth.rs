//! Bearer token resolution
//!
//! A static token wins. Otherwise an exec-credential command is run and its
//! output is searched for a token: plain text, a JSON string, or any of the
//! JSON shapes cloud CLIs print (`ExecCredential`, OAuth responses, ...).

use std::collections::BTreeMap;
use std::time::Duration;

use serde_json::{Map, Value};
use terrahelm_core::{AuthContext, ExecCredential};

use crate::error::{HelmError, Result};
use crate::runner::{CommandRunner, Invocation};

const EXEC_INFO_VAR: &str = "KUBERNETES_EXEC_INFO";

/// Nesting beyond this depth is not searched
const MAX_TOKEN_DEPTH: usize = 32;

const PREFERRED_PATHS: &[&[&str]] = &[
    &["status", "token"],
    &["status", "accessToken"],
    &["status", "access_token"],
    &["status", "idToken"],
    &["status", "id_token"],
    &["token"],
    &["accessToken"],
    &["access_token"],
    &["idToken"],
    &["id_token"],
];

/// Resolve the token for cluster-facing Helm commands, if any
pub async fn resolve_token(auth: &AuthContext, runner: &dyn CommandRunner) -> Result<Option<String>> {
    if let Some(token) = auth.static_token() {
        return Ok(Some(token.to_string()));
    }
    match &auth.kube_exec {
        Some(exec) => exec_token(exec, runner).await.map(Some),
        None => Ok(None),
    }
}

/// Run the exec-credential command and extract its token
pub async fn exec_token(exec: &ExecCredential, runner: &dyn CommandRunner) -> Result<String> {
    if exec.command.trim().is_empty() {
        return Err(HelmError::InvalidConfig(
            "kube_exec command is required".to_string(),
        ));
    }

    let timeout = (exec.timeout_seconds > 0).then(|| Duration::from_secs(exec.timeout_seconds));
    let invocation = Invocation::new(exec.command.clone(), exec.args.clone())
        .with_env(exec_env(exec))
        .with_timeout(timeout);

    tracing::debug!(command = %exec.command, "running kube_exec credential command");
    let output = runner.run(&invocation).await.map_err(|e| match e {
        HelmError::Timeout { .. } => HelmError::Auth(format!(
            "kube_exec command timed out after {} seconds",
            exec.timeout_seconds
        )),
        HelmError::Spawn { source, .. } => {
            HelmError::Auth(format!("failed to run kube_exec command: {}", source))
        }
        other => other,
    })?;

    if !output.success {
        return Err(HelmError::Auth(format!(
            "failed to run kube_exec command: exit status {} (stderr: {})",
            output
                .code
                .map(|c| c.to_string())
                .unwrap_or_else(|| "unknown".to_string()),
            output.stderr.trim()
        )));
    }

    parse_exec_token(&output.stdout)
}

/// Environment overrides for the credential command
fn exec_env(exec: &ExecCredential) -> BTreeMap<String, String> {
    let mut env = exec.env.clone();
    if let Some(version) = exec.api_version.as_deref().filter(|v| !v.is_empty()) {
        if !env.contains_key(EXEC_INFO_VAR) {
            let info = serde_json::json!({
                "kind": "ExecCredential",
                "apiVersion": version,
                "spec": { "interactive": false },
            });
            env.insert(EXEC_INFO_VAR.to_string(), info.to_string());
        }
    }
    env
}

/// Extract a bearer token from credential command output
pub fn parse_exec_token(output: &str) -> Result<String> {
    let output = output.trim();
    if output.is_empty() {
        return Err(HelmError::Auth(
            "kube_exec command returned empty output".to_string(),
        ));
    }

    if !output.starts_with(['{', '[', '"']) {
        return Ok(output.to_string());
    }

    let value: Value = serde_json::from_str(output)
        .map_err(|e| HelmError::Auth(format!("kube_exec output is not valid JSON: {}", e)))?;

    let token = match &value {
        Value::String(s) => Some(s.trim().to_string()).filter(|s| !s.is_empty()),
        other => find_token(other, 0),
    };

    token.ok_or_else(|| HelmError::Auth("kube_exec output JSON missing token field".to_string()))
}

fn normalize_key(key: &str) -> String {
    key.chars()
        .filter(|c| *c != '_' && *c != '-')
        .flat_map(char::to_lowercase)
        .collect()
}

fn is_token_key(key: &str) -> bool {
    matches!(normalize_key(key).as_str(), "token" | "accesstoken" | "idtoken")
}

fn get_normalized<'a>(object: &'a Map<String, Value>, key: &str) -> Option<&'a Value> {
    let wanted = normalize_key(key);
    object
        .iter()
        .find(|(k, _)| normalize_key(k) == wanted)
        .map(|(_, v)| v)
}

fn string_at_path(object: &Map<String, Value>, path: &[&str]) -> Option<String> {
    let (last, parents) = path.split_last()?;
    let mut current = object;
    for key in parents {
        current = get_normalized(current, key)?.as_object()?;
    }
    non_blank(get_normalized(current, last)?)
}

fn non_blank(value: &Value) -> Option<String> {
    value
        .as_str()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn find_token(value: &Value, depth: usize) -> Option<String> {
    if depth > MAX_TOKEN_DEPTH {
        return None;
    }
    match value {
        Value::Array(items) => items.iter().find_map(|item| find_token(item, depth + 1)),
        Value::Object(object) => {
            if let Some(token) = PREFERRED_PATHS
                .iter()
                .find_map(|path| string_at_path(object, path))
            {
                return Some(token);
            }
            object.iter().find_map(|(key, nested)| {
                if is_token_key(key) {
                    if let Some(token) = non_blank(nested) {
                        return Some(token);
                    }
                }
                find_token(nested, depth + 1)
            })
        }
        _ => None,
    }
}
