//! Declarative release description
//!
//! [`ReleaseConfig`] mirrors the loosely-typed attributes a caller supplies
//! (three optional source strings, empty strings meaning "unset").
//! [`ReleaseSpec`] is the validated form the rest of terrahelm works with:
//! the chart source is a [`ChartSource`] sum type built exactly once here.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{CoreError, Result};

fn default_namespace() -> String {
    "default".to_string()
}

fn default_atomic() -> bool {
    true
}

/// Raw release attributes, as read from a release document
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReleaseConfig {
    /// Release name
    pub name: String,

    /// Helm repository URL, local chart directory, or repository alias
    #[serde(default)]
    pub helm_repository: Option<String>,

    /// Git repository containing the chart
    #[serde(default)]
    pub git_repository: Option<String>,

    /// Branch, tag or commit to check out
    #[serde(default)]
    pub git_reference: Option<String>,

    /// Generic source URL (`git::`, `https://`, `file::`, ...)
    #[serde(default)]
    pub chart_url: Option<String>,

    /// Path of the chart inside the source
    #[serde(default)]
    pub chart_path: Option<String>,

    #[serde(default = "default_namespace")]
    pub namespace: String,

    #[serde(default)]
    pub create_namespace: bool,

    /// Inline values YAML
    #[serde(default)]
    pub values: Option<String>,

    /// Value files, applied in order before the inline values
    #[serde(default)]
    pub values_files: Vec<String>,

    #[serde(default)]
    pub chart_version: Option<String>,

    #[serde(default)]
    pub wait: bool,

    #[serde(default = "default_atomic")]
    pub atomic: bool,

    #[serde(default)]
    pub debug: bool,

    /// `"300"` or `"5m"`
    #[serde(default)]
    pub timeout: Option<String>,

    /// Extra arguments appended verbatim to install/upgrade
    #[serde(default)]
    pub custom_args: Vec<String>,

    #[serde(default)]
    pub post_renderer: Option<String>,

    #[serde(default)]
    pub post_renderer_url: Option<String>,

    /// Retries for network fetches; the provider default applies when unset
    #[serde(default)]
    pub fetch_retries: Option<u32>,

    #[serde(default, with = "humantime_serde")]
    pub fetch_retry_delay: Option<Duration>,

    /// Skip TLS verification when fetching chart sources
    #[serde(default)]
    pub insecure_skip_tls_verify: bool,
}

/// Fixed-delay retry policy for network fetches
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Additional attempts after the first one
    pub max_retries: u32,

    /// Sleep between attempts
    #[serde(with = "humantime_serde")]
    pub delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, delay: Duration) -> Self {
        Self { max_retries, delay }
    }

    /// Single attempt, no sleeping
    pub fn none() -> Self {
        Self::new(0, Duration::ZERO)
    }

    /// Total number of attempts this policy allows
    pub fn attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_secs(5))
    }
}

/// How a `helm_repository` value is interpreted
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RepositoryLocation {
    /// `http(s)://` repository, passed to Helm with `--repo`
    RemoteUrl(String),
    /// Absolute or `.`-relative chart directory
    LocalPath(String),
    /// Named repository added with `helm repo add`
    Alias(String),
}

impl RepositoryLocation {
    pub fn classify(location: &str) -> Self {
        if location.starts_with("http://") || location.starts_with("https://") {
            Self::RemoteUrl(location.to_string())
        } else if location.starts_with('/') || location.starts_with('.') {
            Self::LocalPath(location.to_string())
        } else {
            Self::Alias(location.to_string())
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::RemoteUrl(s) | Self::LocalPath(s) | Self::Alias(s) => s,
        }
    }
}

/// Where a chart comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChartSource {
    Repository(RepositoryLocation),
    Git {
        url: String,
        reference: Option<String>,
    },
    Url {
        url: String,
        has_subdir: bool,
    },
}

impl ChartSource {
    /// Build the source from the three mutually exclusive attributes.
    ///
    /// Empty strings count as unset.
    pub fn from_fields(
        helm_repository: Option<&str>,
        git_repository: Option<&str>,
        git_reference: Option<&str>,
        chart_url: Option<&str>,
    ) -> Result<Self> {
        let helm_repository = non_empty(helm_repository);
        let git_repository = non_empty(git_repository);
        let git_reference = non_empty(git_reference);
        let chart_url = non_empty(chart_url);

        let set: Vec<&str> = [
            ("helm_repository", helm_repository.is_some()),
            ("git_repository", git_repository.is_some()),
            ("chart_url", chart_url.is_some()),
        ]
        .into_iter()
        .filter(|(_, present)| *present)
        .map(|(name, _)| name)
        .collect();

        if set.len() > 1 {
            return Err(CoreError::ConflictingChartSources {
                sources: set.join(", "),
            });
        }

        if git_reference.is_some() && git_repository.is_none() {
            return Err(CoreError::GitReferenceWithoutRepository);
        }

        if let Some(location) = helm_repository {
            return Ok(Self::Repository(RepositoryLocation::classify(location)));
        }
        if let Some(url) = git_repository {
            return Ok(Self::Git {
                url: url.to_string(),
                reference: git_reference.map(str::to_string),
            });
        }
        if let Some(url) = chart_url {
            return Ok(Self::Url {
                url: url.to_string(),
                has_subdir: url_has_subdir(url),
            });
        }

        Err(CoreError::MissingChartSource)
    }

    /// Whether the chart is materialized into the cache directory
    pub fn is_cached(&self) -> bool {
        !matches!(self, Self::Repository(_))
    }

    /// Text identifying the source, hashed into cache directory names.
    ///
    /// Git and URL sources hash the concatenation of git repository and chart
    /// URL; exactly one of them is non-empty.
    pub fn identity(&self) -> String {
        match self {
            Self::Repository(location) => location.as_str().to_string(),
            Self::Git { url, .. } => url.clone(),
            Self::Url { url, .. } => url.clone(),
        }
    }

    pub fn git_reference(&self) -> Option<&str> {
        match self {
            Self::Git { reference, .. } => reference.as_deref(),
            _ => None,
        }
    }
}

/// Whether a getter-style URL selects a sub-directory with `//`
fn url_has_subdir(url: &str) -> bool {
    // Forced getter prefix, e.g. `git::https://...`
    let rest = match url.find("::") {
        Some(idx) if !url[..idx].contains('/') => &url[idx + 2..],
        _ => url,
    };
    let rest = match rest.find("://") {
        Some(idx) => &rest[idx + 3..],
        None => rest,
    };
    let rest = rest.split('?').next().unwrap_or_default();
    rest.contains("//")
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

fn non_empty_owned(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// Post-render command configuration
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PostRendererSpec {
    /// Command line, split on whitespace
    pub command: Option<String>,
    /// Script to download; becomes the command when none is given
    pub url: Option<String>,
}

impl PostRendererSpec {
    pub fn is_empty(&self) -> bool {
        self.command.is_none() && self.url.is_none()
    }
}

/// A validated release description
#[derive(Debug, Clone)]
pub struct ReleaseSpec {
    pub name: String,
    pub source: ChartSource,
    pub chart_path: Option<String>,
    pub namespace: String,
    pub create_namespace: bool,
    pub values: Option<String>,
    pub values_files: Vec<String>,
    pub chart_version: Option<String>,
    pub wait: bool,
    pub atomic: bool,
    pub debug: bool,
    pub timeout: Option<String>,
    pub custom_args: Vec<String>,
    pub post_renderer: PostRendererSpec,
    pub retry: RetryPolicy,
    pub insecure_skip_tls_verify: bool,
}

impl ReleaseSpec {
    /// Minimal spec, mostly useful for tests and programmatic callers
    pub fn new(name: impl Into<String>, source: ChartSource) -> Self {
        Self {
            name: name.into(),
            source,
            chart_path: None,
            namespace: default_namespace(),
            create_namespace: false,
            values: None,
            values_files: Vec::new(),
            chart_version: None,
            wait: false,
            atomic: default_atomic(),
            debug: false,
            timeout: None,
            custom_args: Vec::new(),
            post_renderer: PostRendererSpec::default(),
            retry: RetryPolicy::default(),
            insecure_skip_tls_verify: false,
        }
    }

    /// Validate raw attributes. `default_retry` applies when the document
    /// does not set its own retry policy.
    pub fn from_config(config: ReleaseConfig, default_retry: RetryPolicy) -> Result<Self> {
        if config.name.trim().is_empty() {
            return Err(CoreError::MissingField {
                field: "name".to_string(),
            });
        }

        let source = ChartSource::from_fields(
            config.helm_repository.as_deref(),
            config.git_repository.as_deref(),
            config.git_reference.as_deref(),
            config.chart_url.as_deref(),
        )?;

        let namespace = if config.namespace.trim().is_empty() {
            default_namespace()
        } else {
            config.namespace
        };

        let retry = RetryPolicy {
            max_retries: config.fetch_retries.unwrap_or(default_retry.max_retries),
            delay: config.fetch_retry_delay.unwrap_or(default_retry.delay),
        };

        Ok(Self {
            name: config.name,
            source,
            chart_path: non_empty_owned(config.chart_path),
            namespace,
            create_namespace: config.create_namespace,
            values: non_empty_owned(config.values),
            values_files: config.values_files,
            chart_version: non_empty_owned(config.chart_version),
            wait: config.wait,
            atomic: config.atomic,
            debug: config.debug,
            timeout: non_empty_owned(config.timeout),
            custom_args: config.custom_args,
            post_renderer: PostRendererSpec {
                command: non_empty_owned(config.post_renderer),
                url: non_empty_owned(config.post_renderer_url),
            },
            retry,
            insecure_skip_tls_verify: config.insecure_skip_tls_verify,
        })
    }

    /// Release identity, `"<namespace>/<name>"`
    pub fn id(&self) -> String {
        crate::release::release_id(&self.namespace, &self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn git_config() -> ReleaseConfig {
        ReleaseConfig {
            name: "nginx".to_string(),
            git_repository: Some("https://example.com/charts.git".to_string()),
            git_reference: Some("main".to_string()),
            chart_path: Some("bitnami/nginx".to_string()),
            namespace: "web".to_string(),
            atomic: true,
            ..Default::default()
        }
    }

    #[test]
    fn test_git_source() {
        let spec = ReleaseSpec::from_config(git_config(), RetryPolicy::default()).unwrap();
        assert_eq!(
            spec.source,
            ChartSource::Git {
                url: "https://example.com/charts.git".to_string(),
                reference: Some("main".to_string()),
            }
        );
        assert_eq!(spec.id(), "web/nginx");
        assert!(spec.source.is_cached());
    }

    #[test]
    fn test_conflicting_sources() {
        let mut config = git_config();
        config.helm_repository = Some("https://charts.bitnami.com/bitnami".to_string());
        let err = ReleaseSpec::from_config(config, RetryPolicy::default()).unwrap_err();
        assert!(matches!(err, CoreError::ConflictingChartSources { .. }));
        assert!(err.to_string().contains("helm_repository, git_repository"));
    }

    #[test]
    fn test_missing_source() {
        let config = ReleaseConfig {
            name: "nginx".to_string(),
            ..Default::default()
        };
        let err = ReleaseSpec::from_config(config, RetryPolicy::default()).unwrap_err();
        assert!(matches!(err, CoreError::MissingChartSource));
    }

    #[test]
    fn test_empty_strings_are_unset() {
        let mut config = git_config();
        config.helm_repository = Some(String::new());
        config.chart_url = Some("  ".to_string());
        assert!(ReleaseSpec::from_config(config, RetryPolicy::default()).is_ok());
    }

    #[test]
    fn test_git_reference_requires_git_repository() {
        let config = ReleaseConfig {
            name: "nginx".to_string(),
            chart_url: Some("https://example.com/nginx.tgz".to_string()),
            git_reference: Some("main".to_string()),
            ..Default::default()
        };
        let err = ReleaseSpec::from_config(config, RetryPolicy::default()).unwrap_err();
        assert!(matches!(err, CoreError::GitReferenceWithoutRepository));
    }

    #[test]
    fn test_repository_classification() {
        assert_eq!(
            RepositoryLocation::classify("https://charts.bitnami.com/bitnami"),
            RepositoryLocation::RemoteUrl("https://charts.bitnami.com/bitnami".to_string())
        );
        assert_eq!(
            RepositoryLocation::classify("./charts"),
            RepositoryLocation::LocalPath("./charts".to_string())
        );
        assert_eq!(
            RepositoryLocation::classify("/opt/charts"),
            RepositoryLocation::LocalPath("/opt/charts".to_string())
        );
        assert_eq!(
            RepositoryLocation::classify("bitnami"),
            RepositoryLocation::Alias("bitnami".to_string())
        );
    }

    #[test]
    fn test_url_subdir_detection() {
        assert!(url_has_subdir(
            "git::https://github.com/org/repo.git//charts/app?ref=v1"
        ));
        assert!(url_has_subdir("https://example.com/bundle.tgz//nginx"));
        assert!(!url_has_subdir("https://example.com/bundle.tgz"));
        assert!(!url_has_subdir("git::https://github.com/org/repo.git?ref=v1"));
        assert!(!url_has_subdir("file::./charts/app"));
    }

    #[test]
    fn test_retry_defaults_and_overrides() {
        let default_retry = RetryPolicy::new(2, Duration::from_secs(1));
        let spec = ReleaseSpec::from_config(git_config(), default_retry).unwrap();
        assert_eq!(spec.retry, default_retry);

        let mut config = git_config();
        config.fetch_retries = Some(0);
        let spec = ReleaseSpec::from_config(config, default_retry).unwrap();
        assert_eq!(spec.retry.max_retries, 0);
        assert_eq!(spec.retry.attempts(), 1);
        assert_eq!(spec.retry.delay, Duration::from_secs(1));
    }

    #[test]
    fn test_config_from_yaml() {
        let yaml = r#"
name: nginx
git_repository: https://example.com/charts.git
git_reference: main
chart_path: bitnami/nginx
values: |
  replicaCount: 1
values_files:
  - ./values/base.yaml
  - https://example.com/prod.yaml
fetch_retry_delay: 2s
"#;
        let config: ReleaseConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.namespace, "default");
        assert!(config.atomic);
        let spec = ReleaseSpec::from_config(config, RetryPolicy::default()).unwrap();
        assert_eq!(spec.values_files.len(), 2);
        assert_eq!(spec.retry.delay, Duration::from_secs(2));
        assert_eq!(spec.values.as_deref(), Some("replicaCount: 1\n"));
    }
}
