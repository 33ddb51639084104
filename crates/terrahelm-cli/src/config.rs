//! Provider settings
//!
//! Settings are layered: built-in defaults, then an optional YAML file
//! (`--config`), then flags and their environment variables.

use clap::Args;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use terrahelm_core::{AuthContext, ReleaseConfig, ReleaseSpec, RetryPolicy};
use terrahelm_helm::client::LATEST;
use terrahelm_helm::HelmClientConfig;
use terrahelm_source::CacheLayout;

use crate::error::{CliError, Result};

const CACHE_DIR_NAME: &str = "terrahelm_cache";

/// Provider-level settings shared by every release
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderSettings {
    pub helm_bin_path: String,
    pub git_bin_path: String,
    pub helm_version: String,
    pub cache_dir: Option<PathBuf>,
    pub default_retry: RetryPolicy,
    #[serde(flatten)]
    pub auth: AuthContext,
}

impl Default for ProviderSettings {
    fn default() -> Self {
        Self {
            helm_bin_path: "helm".to_string(),
            git_bin_path: "git".to_string(),
            helm_version: LATEST.to_string(),
            cache_dir: None,
            default_retry: RetryPolicy::default(),
            auth: AuthContext::default(),
        }
    }
}

/// Provider flags, each with the environment variable the provider honours
#[derive(Debug, Clone, Default, Args)]
pub struct ProviderArgs {
    /// Path to the helm binary
    #[arg(long, global = true, env = "HELM_BIN_PATH")]
    pub helm_bin_path: Option<String>,

    /// Path to the git binary
    #[arg(long, global = true, env = "GIT_BIN_PATH")]
    pub git_bin_path: Option<String>,

    /// Helm version in use, or `latest` to ask the binary
    #[arg(long, global = true, env = "HELM_VERSION")]
    pub helm_version: Option<String>,

    /// Cache directory for charts, values and plugins
    #[arg(long, global = true)]
    pub cache_dir: Option<PathBuf>,

    /// Kubernetes API server address
    #[arg(long, global = true, env = "HELM_KUBEAPISERVER")]
    pub kube_apiserver: Option<String>,

    /// Username to impersonate
    #[arg(long, global = true, env = "HELM_KUBEASUSER")]
    pub kube_as_user: Option<String>,

    /// Group to impersonate
    #[arg(long, global = true, env = "HELM_KUBEASGROUPS")]
    pub kube_as_group: Option<String>,

    /// Certificate authority file for the API server
    #[arg(long, global = true, env = "HELM_KUBECAFILE")]
    pub kube_ca_file: Option<String>,

    /// Kubeconfig context
    #[arg(long, global = true, env = "HELM_KUBECONTEXT")]
    pub kube_context: Option<String>,

    /// Skip API server certificate verification
    #[arg(long, global = true, env = "HELM_KUBEINSECURE_SKIP_TLS_VERIFY")]
    pub kube_insecure_skip_tls_verify: bool,

    /// Server name used to validate the API server certificate
    #[arg(long, global = true, env = "HELM_KUBETLS_SERVER_NAME")]
    pub kube_tls_server_name: Option<String>,

    /// Bearer token for the API server
    #[arg(long, global = true, env = "HELM_KUBETOKEN", hide_env_values = true)]
    pub kube_token: Option<String>,

    /// Kubeconfig file
    #[arg(long, global = true, env = "KUBECONFIG")]
    pub kubeconfig: Option<String>,
}

impl ProviderSettings {
    /// Defaults, overlaid with `file` when given, overlaid with flags
    pub fn load(file: Option<&Path>, args: &ProviderArgs) -> Result<Self> {
        let mut settings = match file {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        settings.apply_args(args);
        tracing::debug!(
            helm = %settings.helm_bin_path,
            helm_version = %settings.helm_version,
            cache = %settings.cache_root().display(),
            "provider settings loaded"
        );
        Ok(settings)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            CliError::config(format!("cannot read {}: {}", path.display(), e))
        })?;
        serde_yaml::from_str(&content).map_err(|e| {
            CliError::config_with_help(
                format!("invalid provider settings in {}: {}", path.display(), e),
                "keys are snake_case, e.g. helm_bin_path, kube_context, kube_exec",
            )
        })
    }

    fn apply_args(&mut self, args: &ProviderArgs) {
        fn overlay<T: Clone>(target: &mut T, value: &Option<T>) {
            if let Some(value) = value {
                *target = value.clone();
            }
        }
        fn overlay_opt<T: Clone>(target: &mut Option<T>, value: &Option<T>) {
            if value.is_some() {
                *target = value.clone();
            }
        }

        overlay(&mut self.helm_bin_path, &args.helm_bin_path);
        overlay(&mut self.git_bin_path, &args.git_bin_path);
        overlay(&mut self.helm_version, &args.helm_version);
        overlay_opt(&mut self.cache_dir, &args.cache_dir);

        let auth = &mut self.auth;
        overlay_opt(&mut auth.kube_apiserver, &args.kube_apiserver);
        overlay_opt(&mut auth.kube_as_user, &args.kube_as_user);
        overlay_opt(&mut auth.kube_as_group, &args.kube_as_group);
        overlay_opt(&mut auth.kube_ca_file, &args.kube_ca_file);
        overlay_opt(&mut auth.kube_context, &args.kube_context);
        overlay_opt(&mut auth.kube_tls_server_name, &args.kube_tls_server_name);
        overlay_opt(&mut auth.kube_token, &args.kube_token);
        overlay_opt(&mut auth.kubeconfig, &args.kubeconfig);
        auth.kube_insecure_skip_tls_verify |= args.kube_insecure_skip_tls_verify;
    }

    /// Cache root: explicit setting, `$TF_DATA_DIR/terrahelm_cache`,
    /// `$TH_CACHE`, then `.terraform/terrahelm_cache`
    pub fn cache_root(&self) -> PathBuf {
        resolve_cache_dir(
            self.cache_dir.as_deref(),
            non_empty_env("TF_DATA_DIR"),
            non_empty_env("TH_CACHE"),
        )
    }

    pub fn client_config(&self) -> HelmClientConfig {
        HelmClientConfig {
            helm_bin: self.helm_bin_path.clone(),
            helm_version: self.helm_version.clone(),
            cache: CacheLayout::new(self.cache_root()),
            auth: self.auth.clone(),
        }
    }
}

fn non_empty_env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn resolve_cache_dir(explicit: Option<&Path>, tf_data_dir: Option<String>, th_cache: Option<String>) -> PathBuf {
    if let Some(dir) = explicit {
        return dir.to_path_buf();
    }
    if let Some(dir) = tf_data_dir {
        return PathBuf::from(dir).join(CACHE_DIR_NAME);
    }
    if let Some(dir) = th_cache {
        return PathBuf::from(dir);
    }
    PathBuf::from(".terraform").join(CACHE_DIR_NAME)
}

/// Load and validate a release document
pub fn load_release(path: &Path, default_retry: RetryPolicy) -> Result<ReleaseSpec> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| CliError::config(format!("cannot read {}: {}", path.display(), e)))?;
    let config: ReleaseConfig = serde_yaml::from_str(&content).map_err(|e| {
        CliError::config(format!("invalid release document {}: {}", path.display(), e))
    })?;
    Ok(ReleaseSpec::from_config(config, default_retry)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use terrahelm_core::ChartSource;

    #[test]
    fn test_defaults() {
        let settings = ProviderSettings::default();
        assert_eq!(settings.helm_bin_path, "helm");
        assert_eq!(settings.git_bin_path, "git");
        assert_eq!(settings.helm_version, "latest");
        assert_eq!(settings.default_retry, RetryPolicy::default());
    }

    #[test]
    fn test_cache_dir_precedence() {
        assert_eq!(
            resolve_cache_dir(Some(Path::new("/explicit")), Some("/tf".into()), Some("/th".into())),
            PathBuf::from("/explicit")
        );
        assert_eq!(
            resolve_cache_dir(None, Some("/tf".into()), Some("/th".into())),
            PathBuf::from("/tf/terrahelm_cache")
        );
        assert_eq!(resolve_cache_dir(None, None, Some("/th".into())), PathBuf::from("/th"));
        assert_eq!(
            resolve_cache_dir(None, None, None),
            PathBuf::from(".terraform/terrahelm_cache")
        );
    }

    #[test]
    fn test_file_then_flags() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("provider.yaml");
        std::fs::write(
            &path,
            "helm_bin_path: /opt/helm\nkube_context: staging\ndefault_retry:\n  max_retries: 1\n  delay: 2s\nkube_exec:\n  command: aws\n  args: [eks, get-token]\n",
        )
        .unwrap();

        let args = ProviderArgs {
            kube_context: Some("prod".to_string()),
            ..Default::default()
        };
        let settings = ProviderSettings::load(Some(&path), &args).unwrap();

        assert_eq!(settings.helm_bin_path, "/opt/helm");
        assert_eq!(settings.auth.kube_context.as_deref(), Some("prod"));
        assert_eq!(settings.default_retry, RetryPolicy::new(1, Duration::from_secs(2)));
        let exec = settings.auth.kube_exec.unwrap();
        assert_eq!(exec.command, "aws");
        assert_eq!(exec.timeout_seconds, 30);
    }

    #[test]
    fn test_invalid_provider_file() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("provider.yaml");
        std::fs::write(&path, "helm_bin_path: [a, b]\n").unwrap();
        let err = ProviderSettings::from_file(&path).unwrap_err();
        assert!(matches!(err, CliError::Config { .. }));
    }

    #[test]
    fn test_load_release() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("release.yaml");
        std::fs::write(
            &path,
            "name: nginx\nnamespace: web\ngit_repository: https://example.com/charts.git\ngit_reference: v1.2.0\nchart_path: charts/nginx\nfetch_retries: 0\n",
        )
        .unwrap();

        let spec = load_release(&path, RetryPolicy::default()).unwrap();
        assert_eq!(spec.id(), "web/nginx");
        assert_eq!(spec.retry.max_retries, 0);
        assert_eq!(spec.retry.delay, Duration::from_secs(5));
        assert!(matches!(spec.source, ChartSource::Git { .. }));
    }

    #[test]
    fn test_load_release_conflicting_sources() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("release.yaml");
        std::fs::write(
            &path,
            "name: nginx\nhelm_repository: bitnami\nchart_url: https://example.com/chart.tgz\n",
        )
        .unwrap();

        let err = load_release(&path, RetryPolicy::default()).unwrap_err();
        assert!(matches!(err, CliError::Config { .. }));
        assert!(err.to_string().contains("only one of"));
    }
}
