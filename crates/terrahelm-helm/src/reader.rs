//! Release state from `helm list` and `helm get values`

use serde::{Deserialize, Deserializer};
use serde_json::Value as JsonValue;
use terrahelm_core::{ReleaseState, ReleaseStatus, flatten_values, release_id, sanitize_yaml, split_chart_string};

use crate::client::HelmClient;
use crate::command::{HelmCommand, Operation};
use crate::error::{HelmError, Result};

/// What to do when Helm does not know the release
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MissingRelease {
    /// Fail with [`HelmError::ReleaseNotFound`]
    Error,
    /// Return an identity-only [`ReleaseState`] with status `unknown`
    Tolerate,
}

/// One entry of `helm list -o json`
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
pub struct ListEntry {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub namespace: String,
    #[serde(default, deserialize_with = "string_or_number")]
    pub revision: String,
    #[serde(default)]
    pub updated: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub chart: String,
    #[serde(default)]
    pub app_version: String,
}

fn string_or_number<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match JsonValue::deserialize(deserializer)? {
        JsonValue::String(s) => s,
        JsonValue::Null => String::new(),
        other => other.to_string(),
    })
}

/// Parse `helm list -o json` output
pub fn parse_list(output: &str, command: &str) -> Result<Vec<ListEntry>> {
    serde_json::from_str(output.trim()).map_err(|e| HelmError::Parse {
        command: command.to_string(),
        message: e.to_string(),
    })
}

/// The entry named exactly `name`
///
/// `helm list -f` filters by unanchored regex, so look-alike releases such as
/// `nginx-canary` for `nginx` are listed too and must not match.
pub fn select_entry(entries: Vec<ListEntry>, name: &str) -> Option<ListEntry> {
    entries.into_iter().find(|e| e.name == name)
}

/// Parse `helm get values -a -o json` output into dotted keys
pub fn parse_all_values(output: &str, command: &str) -> Result<std::collections::BTreeMap<String, String>> {
    let parse_error = |message: String| HelmError::Parse {
        command: command.to_string(),
        message,
    };
    let value: JsonValue = serde_json::from_str(output.trim()).map_err(|e| parse_error(e.to_string()))?;
    flatten_values(&value).map_err(|e| parse_error(e.to_string()))
}

/// Canonicalize `helm get values -o yaml` output
pub fn parse_user_values(output: &str, command: &str) -> Result<String> {
    sanitize_yaml(output).map_err(|e| HelmError::Parse {
        command: command.to_string(),
        message: e.to_string(),
    })
}

impl HelmClient {
    /// Read the current state of a release
    pub async fn read(&self, name: &str, namespace: &str, missing: MissingRelease) -> Result<ReleaseState> {
        let list = HelmCommand::new(Operation::List {
            name: name.to_string(),
            namespace: namespace.to_string(),
        });
        let list_line = list.operation.name();
        let output = self.run(list).await?;
        let entries = parse_list(&output.stdout, list_line)?;

        let Some(entry) = select_entry(entries, name) else {
            return match missing {
                MissingRelease::Error => Err(HelmError::ReleaseNotFound {
                    name: name.to_string(),
                    namespace: namespace.to_string(),
                }),
                MissingRelease::Tolerate => {
                    tracing::info!(name, namespace, "release not found");
                    Ok(ReleaseState::empty(name, namespace))
                }
            };
        };

        let user = HelmCommand::new(Operation::GetValues {
            name: name.to_string(),
            namespace: namespace.to_string(),
            all: false,
        });
        let user_output = self.run(user).await?;
        let user_values = parse_user_values(&user_output.stdout, "get values")?;

        let all = HelmCommand::new(Operation::GetValues {
            name: name.to_string(),
            namespace: namespace.to_string(),
            all: true,
        });
        let all_output = self.run(all).await?;
        let values = parse_all_values(&all_output.stdout, "get values -a")?;

        let (chart_name, chart_version) = split_chart_string(&entry.chart);
        let status = entry.status.parse::<ReleaseStatus>().unwrap_or_default();

        Ok(ReleaseState {
            id: release_id(namespace, name),
            name: name.to_string(),
            namespace: namespace.to_string(),
            revision: entry.revision,
            status,
            chart_name,
            chart_version,
            app_version: entry.app_version,
            updated: entry.updated,
            values,
            user_values,
        })
    }
}
