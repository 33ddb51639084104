//! Chart source resolution
//!
//! Turns a [`ChartSource`] into the chart argument Helm receives, cloning or
//! fetching into the cache when the chart does not live in a repository.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use terrahelm_core::{ChartSource, ReleaseSpec, RepositoryLocation};

use crate::cache::{CacheLayout, ensure_parent};
use crate::error::{Result, SourceError};
use crate::fetch::{FetchMode, FetchOptions, Fetcher};
use crate::git::{CloneOptions, GitClient};
use crate::retry::with_retry;

/// Where Helm finds the chart for one reconciliation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedChart {
    /// Chart argument: a local path or a chart reference
    pub chart: String,
    /// `--repo` URL for remote repositories
    pub repo_url: Option<String>,
    /// Directory that relative value files are looked up in
    pub work_dir: Option<PathBuf>,
    /// Chart was cloned or fetched into the cache and needs `helm dependency build`
    pub materialized: bool,
}

/// Resolves chart sources, materializing git and URL sources into the cache
pub struct SourceResolver {
    cache: CacheLayout,
    fetcher: Arc<dyn Fetcher>,
    git: Arc<dyn GitClient>,
}

impl SourceResolver {
    pub fn new(cache: CacheLayout, fetcher: Arc<dyn Fetcher>, git: Arc<dyn GitClient>) -> Self {
        Self {
            cache,
            fetcher,
            git,
        }
    }

    pub fn cache(&self) -> &CacheLayout {
        &self.cache
    }

    pub async fn resolve(&self, spec: &ReleaseSpec) -> Result<ResolvedChart> {
        match &spec.source {
            ChartSource::Repository(location) => resolve_repository(spec, location),
            ChartSource::Git { url, reference } => {
                self.resolve_git(spec, url, reference.as_deref()).await
            }
            ChartSource::Url { url, has_subdir } => self.resolve_url(spec, url, *has_subdir).await,
        }
    }

    async fn resolve_git(&self, spec: &ReleaseSpec, url: &str, reference: Option<&str>) -> Result<ResolvedChart> {
        require_location(url)?;
        let repo_dir = self.cache.repo_dir(spec);
        ensure_parent(&repo_dir).await?;

        let options = CloneOptions {
            depth: Some(1),
            single_branch: true,
            insecure: spec.insecure_skip_tls_verify,
            ssh_key_file: None,
        };

        tracing::info!(url, reference, dir = %repo_dir.display(), "cloning chart repository");
        with_retry(&spec.retry, "git clone", || async {
            remove_existing(&repo_dir).await?;
            self.git.clone_repo(url, reference, &repo_dir, &options).await
        })
        .await
        .map_err(|e| e.exhausted(url, spec.retry.attempts()))?;

        Ok(materialized(&repo_dir, spec.chart_path.as_deref()))
    }

    async fn resolve_url(&self, spec: &ReleaseSpec, url: &str, has_subdir: bool) -> Result<ResolvedChart> {
        require_location(url)?;
        let repo_dir = self.cache.repo_dir(spec);
        ensure_parent(&repo_dir).await?;

        let mode = if spec.chart_path.is_some() || has_subdir {
            FetchMode::Dir
        } else {
            FetchMode::Any
        };
        let options = FetchOptions::new(mode, spec.insecure_skip_tls_verify);

        tracing::info!(url, ?mode, dir = %repo_dir.display(), "fetching chart");
        with_retry(&spec.retry, "chart fetch", || {
            self.fetcher.fetch(url, &repo_dir, &options)
        })
        .await
        .map_err(|e| e.exhausted(url, spec.retry.attempts()))?;

        Ok(materialized(&repo_dir, spec.chart_path.as_deref()))
    }
}

fn resolve_repository(spec: &ReleaseSpec, location: &RepositoryLocation) -> Result<ResolvedChart> {
    let chart_path = spec.chart_path.as_deref();

    match location {
        RepositoryLocation::RemoteUrl(url) => {
            let chart = chart_path.ok_or_else(|| SourceError::InvalidConfig {
                message: format!("chart_path is required when helm_repository is a URL ({})", url),
            })?;
            Ok(ResolvedChart {
                chart: chart.to_string(),
                repo_url: Some(url.clone()),
                work_dir: None,
                materialized: false,
            })
        }
        RepositoryLocation::LocalPath(path) => {
            let chart = match chart_path {
                Some(sub) => Path::new(path).join(sub),
                None => PathBuf::from(path),
            };
            Ok(ResolvedChart {
                chart: chart.display().to_string(),
                repo_url: None,
                work_dir: None,
                materialized: false,
            })
        }
        RepositoryLocation::Alias(alias) => {
            let chart = match chart_path {
                Some(sub) => format!("{}/{}", alias.trim_end_matches('/'), sub),
                None => alias.clone(),
            };
            Ok(ResolvedChart {
                chart,
                repo_url: None,
                work_dir: None,
                materialized: false,
            })
        }
    }
}

fn materialized(repo_dir: &Path, chart_path: Option<&str>) -> ResolvedChart {
    let chart = match chart_path {
        Some(sub) => repo_dir.join(sub),
        None => repo_dir.to_path_buf(),
    };
    ResolvedChart {
        chart: chart.display().to_string(),
        repo_url: None,
        work_dir: Some(repo_dir.to_path_buf()),
        materialized: true,
    }
}

fn require_location(url: &str) -> Result<()> {
    if url.trim().is_empty() {
        return Err(SourceError::InvalidConfig {
            message: "chart source location is empty".to_string(),
        });
    }
    Ok(())
}

async fn remove_existing(dir: &Path) -> Result<()> {
    match tokio::fs::remove_dir_all(dir).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}
