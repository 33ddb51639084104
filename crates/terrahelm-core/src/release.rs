//! Release state types

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::str::FromStr;

/// Release identity, `"<namespace>/<name>"`
pub fn release_id(namespace: &str, name: &str) -> String {
    format!("{}/{}", namespace, name)
}

/// State of a release as reported by Helm
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReleaseState {
    /// `"<namespace>/<name>"`
    pub id: String,

    pub name: String,

    pub namespace: String,

    /// Revision number, as printed by `helm list`
    pub revision: String,

    pub status: ReleaseStatus,

    pub chart_name: String,

    pub chart_version: String,

    pub app_version: String,

    /// Last deployment time, verbatim from Helm
    pub updated: String,

    /// Effective values flattened to dotted keys
    pub values: BTreeMap<String, String>,

    /// User-supplied values, canonical YAML
    pub user_values: String,
}

impl ReleaseState {
    /// State holding only the identity, used when a release is absent
    pub fn empty(name: &str, namespace: &str) -> Self {
        Self {
            id: release_id(namespace, name),
            name: name.to_string(),
            namespace: namespace.to_string(),
            ..Default::default()
        }
    }
}

/// Release status
///
/// Note: This enum is non-exhaustive - new variants may be added in future versions.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
#[non_exhaustive]
pub enum ReleaseStatus {
    #[default]
    Unknown,
    Deployed,
    Uninstalled,
    Superseded,
    Failed,
    Uninstalling,
    PendingInstall,
    PendingUpgrade,
    PendingRollback,
}

impl std::fmt::Display for ReleaseStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Unknown => "unknown",
            Self::Deployed => "deployed",
            Self::Uninstalled => "uninstalled",
            Self::Superseded => "superseded",
            Self::Failed => "failed",
            Self::Uninstalling => "uninstalling",
            Self::PendingInstall => "pending-install",
            Self::PendingUpgrade => "pending-upgrade",
            Self::PendingRollback => "pending-rollback",
        };
        write!(f, "{}", s)
    }
}

impl FromStr for ReleaseStatus {
    type Err = std::convert::Infallible;

    /// Unrecognized statuses map to `Unknown` rather than failing the read.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.trim() {
            "deployed" => Self::Deployed,
            "uninstalled" => Self::Uninstalled,
            "superseded" => Self::Superseded,
            "failed" => Self::Failed,
            "uninstalling" => Self::Uninstalling,
            "pending-install" => Self::PendingInstall,
            "pending-upgrade" => Self::PendingUpgrade,
            "pending-rollback" => Self::PendingRollback,
            _ => Self::Unknown,
        })
    }
}

/// Split `helm list`'s `<chart-name>-<version>` on the last hyphen.
///
/// Chart names may contain hyphens themselves. A string without any hyphen
/// is returned as the name with an empty version.
pub fn split_chart_string(chart: &str) -> (String, String) {
    match chart.rsplit_once('-') {
        Some((name, version)) => (name.to_string(), version.to_string()),
        None => (chart.to_string(), String::new()),
    }
}
