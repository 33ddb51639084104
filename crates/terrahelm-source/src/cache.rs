//! On-disk cache layout
//!
//! Paths are pure functions of their inputs; nothing is ever evicted.

use std::path::{Path, PathBuf};

use terrahelm_core::{ReleaseSpec, content_hash};

use crate::error::Result;

/// Root of the terrahelm cache and the paths derived from it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheLayout {
    root: PathBuf,
}

impl CacheLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Directory a git clone or URL fetch lands in:
    /// `repos/<name>-<hash(source)>`
    pub fn repo_dir(&self, spec: &ReleaseSpec) -> PathBuf {
        self.root.join("repos").join(format!(
            "{}-{}",
            spec.name,
            content_hash(spec.source.identity())
        ))
    }

    /// Inline values file: `values/<scope>/<name>-<hash(values)>-values.yaml`.
    ///
    /// The scope is the git reference for git sources and a hash of the
    /// source identity otherwise.
    pub fn inline_values_file(&self, spec: &ReleaseSpec, values: &str) -> PathBuf {
        let scope = match spec.source.git_reference() {
            Some(reference) => sanitize_segment(reference),
            None => content_hash(spec.source.identity()),
        };
        self.root
            .join("values")
            .join(scope)
            .join(format!("{}-{}-values.yaml", spec.name, content_hash(values)))
    }

    /// Fetched value file: `values-files/<hash(entry)>.yaml`
    pub fn values_file(&self, entry: &str) -> PathBuf {
        self.root
            .join("values-files")
            .join(format!("{}.yaml", content_hash(entry)))
    }

    /// Downloaded post-render script: `post-renderers/<hash(url)>/post-renderer`
    pub fn post_renderer_file(&self, url: &str) -> PathBuf {
        self.root
            .join("post-renderers")
            .join(content_hash(url))
            .join("post-renderer")
    }

    /// Directory Helm is pointed at through `HELM_PLUGINS`
    pub fn plugins_dir(&self) -> PathBuf {
        self.root.join("plugins")
    }
}

/// Create a directory and its parents; succeeds if it already exists
pub async fn ensure_dir(path: &Path) -> Result<()> {
    tokio::fs::create_dir_all(path).await?;
    Ok(())
}

/// Create the parent directory of `path`, if any
pub async fn ensure_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        ensure_dir(parent).await?;
    }
    Ok(())
}

/// Git references such as `feature/x` must stay a single path segment
fn sanitize_segment(segment: &str) -> String {
    segment
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' => '_',
            c => c,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use terrahelm_core::ChartSource;

    fn git_spec(reference: Option<&str>) -> ReleaseSpec {
        ReleaseSpec::new(
            "nginx",
            ChartSource::Git {
                url: "https://example.com/charts.git".to_string(),
                reference: reference.map(str::to_string),
            },
        )
    }

    #[test]
    fn test_repo_dir_is_keyed_by_name_and_source() {
        let cache = CacheLayout::new("/cache");
        let dir = cache.repo_dir(&git_spec(Some("main")));
        assert_eq!(
            dir,
            PathBuf::from(format!(
                "/cache/repos/nginx-{}",
                content_hash("https://example.com/charts.git")
            ))
        );
        // The reference does not change the clone directory
        assert_eq!(dir, cache.repo_dir(&git_spec(Some("v2"))));
    }

    #[test]
    fn test_inline_values_scoped_by_reference() {
        let cache = CacheLayout::new("/cache");
        let path = cache.inline_values_file(&git_spec(Some("feature/x")), "replicaCount: 1");
        assert_eq!(
            path,
            PathBuf::from(format!(
                "/cache/values/feature_x/nginx-{}-values.yaml",
                content_hash("replicaCount: 1")
            ))
        );
    }

    #[test]
    fn test_inline_values_scoped_by_source_without_reference() {
        let cache = CacheLayout::new("/cache");
        let path = cache.inline_values_file(&git_spec(None), "a: 1");
        let scope = content_hash("https://example.com/charts.git");
        assert!(path.starts_with(format!("/cache/values/{}", scope)));
    }

    #[test]
    fn test_values_file_keyed_by_entry() {
        let cache = CacheLayout::new("/cache");
        assert_ne!(
            cache.values_file("https://example.com/a.yaml"),
            cache.values_file("https://example.com/b.yaml")
        );
    }

    #[tokio::test]
    async fn test_ensure_dir_is_idempotent() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("a/b/c");
        ensure_dir(&dir).await.unwrap();
        ensure_dir(&dir).await.unwrap();
        assert!(dir.is_dir());
    }
}
