//! Value files and inline values, materialized for `-f` flags

use std::path::Path;
use std::sync::Arc;

use terrahelm_core::{ReleaseSpec, ValuesPlan};

use crate::cache::{CacheLayout, ensure_parent};
use crate::error::Result;
use crate::fetch::{FetchMode, FetchOptions, Fetcher};
use crate::retry::with_retry;

/// Builds the ordered [`ValuesPlan`] for a release
pub struct ValuesMaterializer {
    cache: CacheLayout,
    fetcher: Arc<dyn Fetcher>,
}

impl ValuesMaterializer {
    pub fn new(cache: CacheLayout, fetcher: Arc<dyn Fetcher>) -> Self {
        Self { cache, fetcher }
    }

    /// Materialize value files in caller order, then the inline values.
    ///
    /// Entries starting with `.` resolve against `work_dir` when the chart
    /// was materialized into the cache; everything else is fetched.
    pub async fn materialize(&self, spec: &ReleaseSpec, work_dir: Option<&Path>) -> Result<ValuesPlan> {
        let mut plan = ValuesPlan::new();

        for entry in &spec.values_files {
            match work_dir {
                Some(dir) if entry.starts_with('.') => plan.push_file(dir.join(entry)),
                _ => plan.push_file(self.fetch_values_file(spec, entry).await?),
            }
        }

        if let Some(values) = spec.values.as_deref().filter(|v| !v.trim().is_empty()) {
            let path = self.cache.inline_values_file(spec, values);
            ensure_parent(&path).await?;
            tokio::fs::write(&path, values).await?;
            tracing::debug!(path = %path.display(), "wrote inline values");
            plan.set_inline(path);
        }

        Ok(plan)
    }

    async fn fetch_values_file(&self, spec: &ReleaseSpec, entry: &str) -> Result<std::path::PathBuf> {
        let destination = self.cache.values_file(entry);
        ensure_parent(&destination).await?;
        let options = FetchOptions::new(FetchMode::File, spec.insecure_skip_tls_verify);

        with_retry(&spec.retry, "values file fetch", || {
            self.fetcher.fetch(entry, &destination, &options)
        })
        .await
        .map_err(|e| e.exhausted(entry, spec.retry.attempts()))?;

        Ok(destination)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockFetcher;
    use std::path::PathBuf;
    use std::time::Duration;
    use terrahelm_core::{ChartSource, RetryPolicy, content_hash};

    fn git_spec() -> ReleaseSpec {
        let mut spec = ReleaseSpec::new(
            "nginx",
            ChartSource::Git {
                url: "https://example.com/charts.git".to_string(),
                reference: Some("main".to_string()),
            },
        );
        spec.retry = RetryPolicy::new(1, Duration::ZERO);
        spec
    }

    #[tokio::test]
    async fn test_order_is_files_then_inline() {
        let tmp = tempfile::tempdir().unwrap();
        let cache = CacheLayout::new(tmp.path());
        let materializer = ValuesMaterializer::new(cache.clone(), Arc::new(MockFetcher::new()));

        let mut spec = git_spec();
        spec.values_files = vec![
            "./values/a.yaml".to_string(),
            "https://example.com/b.yaml".to_string(),
        ];
        spec.values = Some("replicaCount: 1".to_string());

        let work_dir = tmp.path().join("repos/nginx-x");
        let plan = materializer.materialize(&spec, Some(&work_dir)).await.unwrap();

        let paths: Vec<PathBuf> = plan.paths().map(Path::to_path_buf).collect();
        assert_eq!(
            paths,
            vec![
                work_dir.join("./values/a.yaml"),
                cache.values_file("https://example.com/b.yaml"),
                tmp.path()
                    .join("values/main")
                    .join(format!("nginx-{}-values.yaml", content_hash("replicaCount: 1"))),
            ]
        );
        assert_eq!(
            std::fs::read_to_string(plan.inline().unwrap()).unwrap(),
            "replicaCount: 1"
        );
    }

    #[tokio::test]
    async fn test_relative_entry_without_work_dir_is_fetched() {
        let tmp = tempfile::tempdir().unwrap();
        let fetcher = MockFetcher::new().with_file_body("a: 1\n");
        let materializer = ValuesMaterializer::new(CacheLayout::new(tmp.path()), Arc::new(fetcher.clone()));

        let mut spec = git_spec();
        spec.values_files = vec!["./local.yaml".to_string()];

        let plan = materializer.materialize(&spec, None).await.unwrap();
        assert_eq!(plan.len(), 1);
        let calls = fetcher.calls();
        assert_eq!(calls[0].source, "./local.yaml");
        assert_eq!(calls[0].options.mode, FetchMode::File);
    }

    #[tokio::test]
    async fn test_empty_values_produce_empty_plan() {
        let tmp = tempfile::tempdir().unwrap();
        let materializer = ValuesMaterializer::new(CacheLayout::new(tmp.path()), Arc::new(MockFetcher::new()));

        let mut spec = git_spec();
        spec.values = Some("  \n".to_string());

        let plan = materializer.materialize(&spec, None).await.unwrap();
        assert!(plan.is_empty());
    }

    #[tokio::test]
    async fn test_failed_fetch_names_the_entry() {
        let tmp = tempfile::tempdir().unwrap();
        let fetcher = MockFetcher::new().failing(5);
        let materializer = ValuesMaterializer::new(CacheLayout::new(tmp.path()), Arc::new(fetcher.clone()));

        let mut spec = git_spec();
        spec.values_files = vec!["https://example.com/prod.yaml".to_string()];

        let err = materializer.materialize(&spec, None).await.unwrap_err();
        assert_eq!(fetcher.call_count(), 2);
        assert!(err.to_string().contains("https://example.com/prod.yaml"));
    }
}
