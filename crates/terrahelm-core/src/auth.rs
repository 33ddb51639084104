//! Kubernetes connection parameters applied to Helm invocations

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

fn default_exec_timeout() -> u64 {
    30
}

/// Connection and authentication settings shared by every Helm call
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthContext {
    pub kube_apiserver: Option<String>,
    pub kube_as_user: Option<String>,
    pub kube_as_group: Option<String>,
    pub kube_ca_file: Option<String>,
    pub kube_context: Option<String>,
    pub kube_insecure_skip_tls_verify: bool,
    pub kube_tls_server_name: Option<String>,
    /// Static bearer token; takes precedence over `kube_exec`
    pub kube_token: Option<String>,
    pub kube_exec: Option<ExecCredential>,
    pub kubeconfig: Option<String>,
}

impl AuthContext {
    /// The static token, ignoring empty values
    pub fn static_token(&self) -> Option<&str> {
        self.kube_token.as_deref().filter(|t| !t.is_empty())
    }
}

/// Exec-based credential plugin (EKS, AKS, GKE and friends)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecCredential {
    /// ExecCredential API version passed via `KUBERNETES_EXEC_INFO`
    #[serde(default)]
    pub api_version: Option<String>,

    pub command: String,

    #[serde(default)]
    pub args: Vec<String>,

    #[serde(default)]
    pub env: BTreeMap<String, String>,

    /// Zero disables the timeout
    #[serde(default = "default_exec_timeout")]
    pub timeout_seconds: u64,
}

impl ExecCredential {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            api_version: None,
            command: command.into(),
            args: Vec::new(),
            env: BTreeMap::new(),
            timeout_seconds: default_exec_timeout(),
        }
    }
}
