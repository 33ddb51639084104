//! Typed Helm command lines
//!
//! A [`HelmCommand`] is a value: an [`Operation`] plus connection flags. Its
//! argument vector is produced by [`HelmCommand::args`] in one fixed order,
//! whatever order the parts were set in:
//!
//! 1. verb and positional arguments
//! 2. connection flags (`--kube-apiserver` ... `--kube-tls-server-name`)
//! 3. `--kube-token`
//! 4. `--kubeconfig`
//! 5. release flags (`--repo`, `--namespace`, `-f`, `--timeout`, post-renderer)
//! 6. custom arguments

use std::collections::BTreeMap;
use std::path::PathBuf;

use terrahelm_core::AuthContext;

use crate::post_renderer::PostRendererArgs;

/// Placeholder printed instead of a bearer token
pub const REDACTED: &str = "REDACTED";

/// Arguments shared by install and upgrade
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReleaseArgs {
    pub name: String,
    /// Local chart path or chart reference
    pub chart: String,
    pub repo_url: Option<String>,
    pub namespace: String,
    pub create_namespace: bool,
    pub version: Option<String>,
    /// `-f` files in application order
    pub values_files: Vec<PathBuf>,
    pub wait: bool,
    pub atomic: bool,
    pub debug: bool,
    pub timeout: Option<String>,
    pub post_renderer: PostRendererArgs,
    pub custom_args: Vec<String>,
}

impl ReleaseArgs {
    pub fn new(name: impl Into<String>, chart: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            chart: chart.into(),
            namespace: namespace.into(),
            ..Default::default()
        }
    }

    fn flags(&self) -> Vec<String> {
        let mut args = Vec::new();
        if let Some(repo) = &self.repo_url {
            args.extend(["--repo".to_string(), repo.clone()]);
        }
        if !self.namespace.is_empty() {
            args.extend(["--namespace".to_string(), self.namespace.clone()]);
        }
        if self.create_namespace {
            args.push("--create-namespace".to_string());
        }
        if let Some(version) = &self.version {
            args.extend(["--version".to_string(), version.clone()]);
        }
        for file in &self.values_files {
            args.extend(["-f".to_string(), file.display().to_string()]);
        }
        if self.wait {
            args.push("--wait".to_string());
        }
        if self.atomic {
            args.push("--atomic".to_string());
        }
        if self.debug {
            args.push("--debug".to_string());
        }
        if let Some(timeout) = &self.timeout {
            args.extend(["--timeout".to_string(), normalize_timeout(timeout)]);
        }
        args.extend(self.post_renderer.flags.iter().cloned());
        args
    }
}

/// What a Helm invocation does
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    DependencyBuild { chart: String },
    Install(ReleaseArgs),
    Upgrade(ReleaseArgs),
    List { name: String, namespace: String },
    /// User-supplied values, or all computed values with `all`
    GetValues { name: String, namespace: String, all: bool },
    Uninstall { name: String, namespace: String },
    Version,
}

impl Operation {
    fn positional(&self) -> Vec<String> {
        match self {
            Operation::DependencyBuild { chart } => {
                owned(&["dependency", "build", "--logtostderr", chart.as_str()])
            }
            Operation::Install(release) => owned(&["install", release.name.as_str(), release.chart.as_str()]),
            Operation::Upgrade(release) => owned(&["upgrade", release.name.as_str(), release.chart.as_str()]),
            Operation::List { name, namespace } => {
                owned(&["list", "-n", namespace.as_str(), "-f", name.as_str(), "-o", "json"])
            }
            Operation::GetValues {
                name,
                namespace,
                all,
            } => {
                let mut args = owned(&["get", "values", "-n", namespace.as_str(), name.as_str()]);
                if *all {
                    args.extend(owned(&["-a", "-o", "json"]));
                } else {
                    args.extend(owned(&["-o", "yaml"]));
                }
                args
            }
            Operation::Uninstall { name, namespace } => {
                owned(&["uninstall", name.as_str(), "--namespace", namespace.as_str()])
            }
            Operation::Version => owned(&["version", "--template", "{{.Version}}"]),
        }
    }

    fn release(&self) -> Option<&ReleaseArgs> {
        match self {
            Operation::Install(release) | Operation::Upgrade(release) => Some(release),
            _ => None,
        }
    }

    /// Short name used in logs and errors
    pub fn name(&self) -> &'static str {
        match self {
            Operation::DependencyBuild { .. } => "dependency build",
            Operation::Install(_) => "install",
            Operation::Upgrade(_) => "upgrade",
            Operation::List { .. } => "list",
            Operation::GetValues { .. } => "get values",
            Operation::Uninstall { .. } => "uninstall",
            Operation::Version => "version",
        }
    }
}

fn owned(parts: &[&str]) -> Vec<String> {
    parts.iter().map(|s| s.to_string()).collect()
}

/// Cluster connection flags
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KubeFlags {
    pub apiserver: Option<String>,
    pub as_user: Option<String>,
    pub as_group: Option<String>,
    pub ca_file: Option<String>,
    pub context: Option<String>,
    pub insecure_skip_tls_verify: bool,
    pub tls_server_name: Option<String>,
    pub kubeconfig: Option<String>,
}

impl From<&AuthContext> for KubeFlags {
    fn from(auth: &AuthContext) -> Self {
        let set = |v: &Option<String>| v.clone().filter(|s| !s.is_empty());
        Self {
            apiserver: set(&auth.kube_apiserver),
            as_user: set(&auth.kube_as_user),
            as_group: set(&auth.kube_as_group),
            ca_file: set(&auth.kube_ca_file),
            context: set(&auth.kube_context),
            insecure_skip_tls_verify: auth.kube_insecure_skip_tls_verify,
            tls_server_name: set(&auth.kube_tls_server_name),
            kubeconfig: set(&auth.kubeconfig),
        }
    }
}

impl KubeFlags {
    fn connection_args(&self) -> Vec<String> {
        let mut args = Vec::new();
        let mut push = |flag: &str, value: &Option<String>| {
            if let Some(value) = value {
                args.extend([flag.to_string(), value.clone()]);
            }
        };
        push("--kube-apiserver", &self.apiserver);
        push("--kube-as-user", &self.as_user);
        push("--kube-as-group", &self.as_group);
        push("--kube-ca-file", &self.ca_file);
        push("--kube-context", &self.context);
        if self.insecure_skip_tls_verify {
            args.push("--kube-insecure-skip-tls-verify".to_string());
        }
        if let Some(name) = &self.tls_server_name {
            args.extend(["--kube-tls-server-name".to_string(), name.clone()]);
        }
        args
    }
}

/// A complete Helm invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HelmCommand {
    pub operation: Operation,
    pub kube: KubeFlags,
    token: Option<String>,
}

impl HelmCommand {
    pub fn new(operation: Operation) -> Self {
        Self {
            operation,
            kube: KubeFlags::default(),
            token: None,
        }
    }

    pub fn with_kube(mut self, kube: KubeFlags) -> Self {
        self.kube = kube;
        self
    }

    /// Attach a bearer token; ignored for operations that never reach the cluster
    pub fn with_token(mut self, token: Option<String>) -> Self {
        self.token = token.filter(|t| !t.is_empty());
        self
    }

    /// Whether a bearer token is relevant for this operation
    pub fn needs_token(&self) -> bool {
        !matches!(
            self.operation,
            Operation::DependencyBuild { .. } | Operation::Version
        )
    }

    /// Argument vector, excluding the program
    pub fn args(&self) -> Vec<String> {
        let mut args = self.operation.positional();
        args.extend(self.kube.connection_args());

        if self.needs_token() {
            if let Some(token) = &self.token {
                args.extend(["--kube-token".to_string(), token.clone()]);
            }
        }

        if let Some(kubeconfig) = &self.kube.kubeconfig {
            args.extend(["--kubeconfig".to_string(), kubeconfig.clone()]);
        }

        if let Some(release) = self.operation.release() {
            args.extend(release.flags());
            args.extend(release.custom_args.iter().cloned());
        }

        args
    }

    /// Extra environment for the Helm process
    pub fn env(&self) -> BTreeMap<String, String> {
        self.operation
            .release()
            .map(|release| release.post_renderer.env.clone())
            .unwrap_or_default()
    }

    /// Command line for logs and errors, with the token redacted
    pub fn display(&self, program: &str) -> String {
        let mut line = vec![program.to_string()];
        line.extend(self.args());
        redact_args(&line)
    }
}

/// `"300"` becomes `"300s"`; anything that is not a bare integer is kept
pub fn normalize_timeout(timeout: &str) -> String {
    let timeout = timeout.trim();
    if !timeout.is_empty() && timeout.chars().all(|c| c.is_ascii_digit()) {
        format!("{}s", timeout)
    } else {
        timeout.to_string()
    }
}

/// Join arguments with every `--kube-token` value replaced by [`REDACTED`]
pub fn redact_args(args: &[String]) -> String {
    let mut redacted = Vec::with_capacity(args.len());
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        if arg.starts_with("--kube-token=") {
            redacted.push(format!("--kube-token={}", REDACTED));
        } else if arg == "--kube-token" {
            redacted.push(arg.clone());
            if iter.next().is_some() {
                redacted.push(REDACTED.to_string());
            }
        } else {
            redacted.push(arg.clone());
        }
    }
    redacted.join(" ")
}
