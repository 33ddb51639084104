//! Release reconciliation against the Helm CLI

use std::sync::Arc;

use terrahelm_core::{AuthContext, ReleaseSpec, ReleaseState};
use terrahelm_source::{CacheLayout, Fetcher, GitClient, SourceResolver, ValuesMaterializer};
use tokio::sync::OnceCell;

use crate::auth::resolve_token;
use crate::command::{HelmCommand, KubeFlags, Operation, ReleaseArgs};
use crate::error::{HelmError, Result};
use crate::post_renderer::PostRendererAdapter;
use crate::reader::MissingRelease;
use crate::runner::{CommandOutput, CommandRunner, Invocation};

/// Helm version used when none is configured
pub const LATEST: &str = "latest";

/// Whether a reconciliation creates or updates the release
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// `helm install`
    Create,
    /// `helm upgrade`
    Update,
}

/// Immutable provider-level settings for a [`HelmClient`]
#[derive(Debug, Clone)]
pub struct HelmClientConfig {
    /// Path or name of the helm executable
    pub helm_bin: String,
    /// Explicit version such as `v3.14.2`, or `latest` to ask the binary
    pub helm_version: String,
    pub cache: CacheLayout,
    pub auth: AuthContext,
}

impl HelmClientConfig {
    pub fn new(cache: CacheLayout) -> Self {
        Self {
            helm_bin: "helm".to_string(),
            helm_version: LATEST.to_string(),
            cache,
            auth: AuthContext::default(),
        }
    }
}

/// Drives install, upgrade, read and uninstall through the Helm CLI
pub struct HelmClient {
    helm_bin: String,
    auth: AuthContext,
    kube: KubeFlags,
    runner: Arc<dyn CommandRunner>,
    resolver: SourceResolver,
    materializer: ValuesMaterializer,
    post_renderer: PostRendererAdapter,
    /// Resolved on first cluster-facing command
    token: OnceCell<Option<String>>,
    helm_major: OnceCell<u64>,
}

impl HelmClient {
    pub fn new(
        config: HelmClientConfig,
        runner: Arc<dyn CommandRunner>,
        fetcher: Arc<dyn Fetcher>,
        git: Arc<dyn GitClient>,
    ) -> Self {
        let helm_major = OnceCell::new_with(parse_major(&config.helm_version));

        Self {
            helm_bin: config.helm_bin,
            kube: KubeFlags::from(&config.auth),
            auth: config.auth,
            runner,
            resolver: SourceResolver::new(config.cache.clone(), fetcher.clone(), git),
            materializer: ValuesMaterializer::new(config.cache.clone(), fetcher.clone()),
            post_renderer: PostRendererAdapter::new(config.cache, fetcher),
            token: OnceCell::new(),
            helm_major,
        }
    }

    /// Install or upgrade a release, then read back its state
    pub async fn apply(&self, spec: &ReleaseSpec, action: Action) -> Result<ReleaseState> {
        tracing::info!(release = %spec.id(), ?action, "reconciling release");

        let resolved = self.resolver.resolve(spec).await?;
        if resolved.materialized {
            self.dependency_build(&resolved.chart, spec.debug).await?;
        }

        let plan = self
            .materializer
            .materialize(spec, resolved.work_dir.as_deref())
            .await?;

        let post_renderer = if spec.post_renderer.is_empty() {
            Default::default()
        } else {
            let major = self.helm_major().await?;
            self.post_renderer.resolve(spec, major).await?
        };

        let release = ReleaseArgs {
            repo_url: resolved.repo_url,
            create_namespace: spec.create_namespace,
            version: spec.chart_version.clone(),
            values_files: plan.paths().map(|p| p.to_path_buf()).collect(),
            wait: spec.wait,
            atomic: spec.atomic,
            debug: spec.debug,
            timeout: spec.timeout.clone(),
            post_renderer,
            custom_args: spec.custom_args.clone(),
            ..ReleaseArgs::new(&spec.name, resolved.chart, &spec.namespace)
        };

        let operation = match action {
            Action::Create => Operation::Install(release),
            Action::Update => Operation::Upgrade(release),
        };
        self.run_with(HelmCommand::new(operation), spec.debug).await?;

        self.read(&spec.name, &spec.namespace, MissingRelease::Error)
            .await
    }

    /// `helm uninstall`
    pub async fn delete(&self, name: &str, namespace: &str) -> Result<()> {
        tracing::info!(release = %terrahelm_core::release_id(namespace, name), "uninstalling release");
        self.run(HelmCommand::new(Operation::Uninstall {
            name: name.to_string(),
            namespace: namespace.to_string(),
        }))
        .await?;
        Ok(())
    }

    /// `helm dependency build` for a materialized chart
    pub async fn dependency_build(&self, chart: &str, debug: bool) -> Result<()> {
        self.run_with(
            HelmCommand::new(Operation::DependencyBuild {
                chart: chart.to_string(),
            }),
            debug,
        )
        .await?;
        Ok(())
    }

    /// Major version of the configured Helm, asking the binary when unknown
    pub async fn helm_major(&self) -> Result<u64> {
        self.helm_major
            .get_or_try_init(|| self.detect_major_version())
            .await
            .copied()
    }

    async fn detect_major_version(&self) -> Result<u64> {
        let output = self.run(HelmCommand::new(Operation::Version)).await?;
        let reported = output.stdout.trim();
        let major = parse_major(reported).ok_or_else(|| HelmError::HelmVersion(reported.to_string()))?;
        tracing::debug!(version = reported, major, "detected helm version");
        Ok(major)
    }

    async fn token(&self) -> Result<Option<String>> {
        self.token
            .get_or_try_init(|| resolve_token(&self.auth, self.runner.as_ref()))
            .await
            .cloned()
    }

    /// Run a command with connection flags attached; non-zero exit is an error
    pub(crate) async fn run(&self, command: HelmCommand) -> Result<CommandOutput> {
        self.run_with(command, false).await
    }

    /// Like [`run`](Self::run); with `debug` a failure also carries stdout
    async fn run_with(&self, command: HelmCommand, debug: bool) -> Result<CommandOutput> {
        let mut command = command.with_kube(self.kube.clone());
        if command.needs_token() {
            command = command.with_token(self.token().await?);
        }

        let shown = command.display(&self.helm_bin);
        tracing::debug!(command = %shown, "running helm");

        let invocation = Invocation::new(self.helm_bin.clone(), command.args()).with_env(command.env());
        let output = self.runner.run(&invocation).await?;

        if !output.success {
            return Err(HelmError::CommandFailed {
                command: shown,
                stderr: output.stderr.trim().to_string(),
                stdout: debug.then(|| output.stdout.clone()),
            });
        }
        Ok(output)
    }
}

/// Major version of `v3.14.2`-style strings; `None` for `latest` or garbage
fn parse_major(version: &str) -> Option<u64> {
    let version = version.trim();
    let version = version.strip_prefix('v').unwrap_or(version);
    if version.is_empty() || version == LATEST {
        return None;
    }
    semver::Version::parse(version).ok().map(|v| v.major)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::MockRunner;
    use std::path::Path;
    use std::time::Duration;
    use terrahelm_core::{
        ChartSource, ExecCredential, ReleaseStatus, RepositoryLocation, RetryPolicy, content_hash,
    };
    use terrahelm_source::{MockFetcher, MockGitClient};

    const LIST: &str = r#"[{"name":"nginx","namespace":"web","revision":"1","updated":"2024-05-01 12:00:00.000 +0000 UTC","status":"deployed","chart":"nginx-13.2.1","app_version":"1.25.1"}]"#;

    fn deployed_runner() -> MockRunner {
        MockRunner::new()
            .respond("list", CommandOutput::success(LIST))
            .respond("get values", CommandOutput::success("replicaCount: 1\n"))
            .respond(
                "get values -a",
                CommandOutput::success(r#"{"replicaCount":1,"image":{"tag":"1.25"}}"#),
            )
    }

    fn client(cache: &Path, runner: MockRunner, auth: AuthContext, version: &str) -> HelmClient {
        let config = HelmClientConfig {
            helm_bin: "helm".to_string(),
            helm_version: version.to_string(),
            cache: CacheLayout::new(cache),
            auth,
        };
        HelmClient::new(
            config,
            Arc::new(runner),
            Arc::new(MockFetcher::new()),
            Arc::new(MockGitClient::new()),
        )
    }

    fn git_spec() -> ReleaseSpec {
        let mut spec = ReleaseSpec::new(
            "nginx",
            ChartSource::Git {
                url: "https://example.com/charts.git".to_string(),
                reference: Some("main".to_string()),
            },
        );
        spec.namespace = "web".to_string();
        spec.chart_path = Some("bitnami/nginx".to_string());
        spec.values = Some("replicaCount: 1".to_string());
        spec.retry = RetryPolicy::new(0, Duration::ZERO);
        spec
    }

    #[test]
    fn test_parse_major() {
        assert_eq!(parse_major("v3.14.2"), Some(3));
        assert_eq!(parse_major("4.0.0"), Some(4));
        assert_eq!(parse_major("latest"), None);
        assert_eq!(parse_major("nonsense"), None);
    }

    #[tokio::test]
    async fn test_install_from_git_end_to_end() {
        let tmp = tempfile::tempdir().unwrap();
        let runner = deployed_runner();
        let helm = client(tmp.path(), runner.clone(), AuthContext::default(), "v3.14.0");

        let state = helm.apply(&git_spec(), Action::Create).await.unwrap();

        let cache = tmp.path().display().to_string();
        let repo_dir = format!("{}/repos/nginx-{}", cache, content_hash("https://example.com/charts.git"));
        let values_file = format!(
            "{}/values/main/nginx-{}-values.yaml",
            cache,
            content_hash("replicaCount: 1")
        );

        let lines = runner.command_lines();
        assert_eq!(lines[0], format!("dependency build --logtostderr {}/bitnami/nginx", repo_dir));
        assert!(lines[1].starts_with(&format!("install nginx {}/bitnami/nginx", repo_dir)));
        assert!(lines[1].contains(&format!("-f {}", values_file)));
        assert!(lines[1].contains("--namespace web"));
        assert!(lines[1].contains("--atomic"));
        assert_eq!(lines[2], "list -n web -f nginx -o json");

        assert_eq!(state.id, "web/nginx");
        assert_eq!(state.status, ReleaseStatus::Deployed);
        assert_eq!(state.revision, "1");
        assert_eq!(state.chart_name, "nginx");
        assert_eq!(state.chart_version, "13.2.1");
        assert_eq!(state.app_version, "1.25.1");
        assert_eq!(state.values["image.tag"], "1.25");
        assert_eq!(state.values["replicaCount"], "1");
        assert_eq!(state.user_values, "replicaCount: 1\n");
    }

    #[tokio::test]
    async fn test_update_uses_upgrade() {
        let tmp = tempfile::tempdir().unwrap();
        let runner = deployed_runner();
        let helm = client(tmp.path(), runner.clone(), AuthContext::default(), "v3.14.0");

        let mut spec = ReleaseSpec::new(
            "nginx",
            ChartSource::Repository(RepositoryLocation::classify("https://charts.bitnami.com/bitnami")),
        );
        spec.namespace = "web".to_string();
        spec.chart_path = Some("nginx".to_string());
        spec.timeout = Some("300".to_string());

        helm.apply(&spec, Action::Update).await.unwrap();

        let lines = runner.command_lines();
        // Remote repositories are not materialized, so no dependency build
        assert_eq!(
            lines[0],
            "upgrade nginx nginx --repo https://charts.bitnami.com/bitnami --namespace web --atomic --timeout 300s"
        );
    }

    #[tokio::test]
    async fn test_helm_failure_surfaces_stderr() {
        let tmp = tempfile::tempdir().unwrap();
        let runner = deployed_runner().respond("dependency build", CommandOutput::failure(1, "Error: chart not found\n"));
        let helm = client(tmp.path(), runner.clone(), AuthContext::default(), "v3.14.0");

        let err = helm.apply(&git_spec(), Action::Create).await.unwrap_err();
        let message = err.to_string();
        assert!(message.contains("helm dependency build --logtostderr"));
        assert!(message.contains("Error: chart not found"));
        assert_eq!(runner.invocations().len(), 1);
    }

    #[tokio::test]
    async fn test_read_missing_release() {
        let tmp = tempfile::tempdir().unwrap();
        let runner = MockRunner::new().respond("list", CommandOutput::success("[]"));
        let helm = client(tmp.path(), runner, AuthContext::default(), "latest");

        let err = helm.read("nginx", "web", MissingRelease::Error).await.unwrap_err();
        assert!(err.is_not_found());

        let state = helm.read("nginx", "web", MissingRelease::Tolerate).await.unwrap();
        assert_eq!(state, ReleaseState::empty("nginx", "web"));
        assert_eq!(state.status, ReleaseStatus::Unknown);
    }

    #[tokio::test]
    async fn test_read_ignores_look_alike_release() {
        let tmp = tempfile::tempdir().unwrap();
        let canary = r#"[{"name":"nginx-canary","namespace":"web","revision":"7","status":"failed","chart":"nginx-13.2.1"}]"#;
        let runner = MockRunner::new().respond("list", CommandOutput::success(canary));
        let helm = client(tmp.path(), runner.clone(), AuthContext::default(), "latest");

        let err = helm.read("nginx", "web", MissingRelease::Error).await.unwrap_err();
        assert!(err.is_not_found());

        let state = helm.read("nginx", "web", MissingRelease::Tolerate).await.unwrap();
        assert_eq!(state, ReleaseState::empty("nginx", "web"));
        assert!(runner.command_lines().iter().all(|l| l.starts_with("list")));
    }

    #[tokio::test]
    async fn test_debug_failure_keeps_stdout_for_dependency_build() {
        let tmp = tempfile::tempdir().unwrap();
        let runner = deployed_runner().respond(
            "dependency build",
            CommandOutput {
                success: false,
                code: Some(1),
                stdout: "Saving 1 charts\n".to_string(),
                stderr: "Error: no repository definition\n".to_string(),
            },
        );
        let helm = client(tmp.path(), runner, AuthContext::default(), "v3.14.0");

        let mut spec = git_spec();
        spec.debug = true;
        let message = helm.apply(&spec, Action::Create).await.unwrap_err().to_string();
        assert!(message.contains("no repository definition"));
        assert!(message.contains("stdout:\nSaving 1 charts"));

        let err = helm.apply(&git_spec(), Action::Create).await.unwrap_err();
        assert!(!err.to_string().contains("Saving 1 charts"));
    }

    #[tokio::test]
    async fn test_token_is_resolved_once_and_redacted() {
        let tmp = tempfile::tempdir().unwrap();
        let runner = deployed_runner().respond("get-token", CommandOutput::success("s3cr3t\n"));
        let mut exec = ExecCredential::new("aws");
        exec.args = vec!["get-token".to_string()];
        let auth = AuthContext {
            kube_exec: Some(exec),
            kube_context: Some("prod".to_string()),
            ..Default::default()
        };
        let helm = client(tmp.path(), runner.clone(), auth, "v3.14.0");

        helm.read("nginx", "web", MissingRelease::Error).await.unwrap();
        helm.delete("nginx", "web").await.unwrap();

        let lines = runner.command_lines();
        let token_runs = lines.iter().filter(|l| l.as_str() == "get-token").count();
        assert_eq!(token_runs, 1);
        assert!(lines.iter().any(|l| l == "uninstall nginx --namespace web --kube-context prod --kube-token s3cr3t"));
    }

    #[tokio::test]
    async fn test_failed_command_is_redacted() {
        let tmp = tempfile::tempdir().unwrap();
        let runner = MockRunner::new().respond("uninstall", CommandOutput::failure(1, "boom"));
        let auth = AuthContext {
            kube_token: Some("s3cr3t".to_string()),
            ..Default::default()
        };
        let helm = client(tmp.path(), runner, auth, "v3.14.0");

        let err = helm.delete("nginx", "web").await.unwrap_err();
        let message = err.to_string();
        assert!(message.contains("--kube-token REDACTED"));
        assert!(!message.contains("s3cr3t"));
    }

    #[tokio::test]
    async fn test_helm_major_detection() {
        let tmp = tempfile::tempdir().unwrap();
        let runner = MockRunner::new().respond("version", CommandOutput::success("v4.0.1"));
        let helm = client(tmp.path(), runner.clone(), AuthContext::default(), "latest");

        assert_eq!(helm.helm_major().await.unwrap(), 4);
        assert_eq!(helm.helm_major().await.unwrap(), 4);
        assert_eq!(runner.invocations().len(), 1);
        assert_eq!(runner.command_lines()[0], "version --template {{.Version}}");
    }

    #[tokio::test]
    async fn test_explicit_version_skips_detection() {
        let tmp = tempfile::tempdir().unwrap();
        let runner = MockRunner::new();
        let helm = client(tmp.path(), runner.clone(), AuthContext::default(), "v3.15.0");

        assert_eq!(helm.helm_major().await.unwrap(), 3);
        assert!(runner.invocations().is_empty());
    }
}
