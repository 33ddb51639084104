//! Post-renderer wiring
//!
//! Helm 3 takes the post-render executable directly. Helm 4 only accepts the
//! name of a `postrenderer/v1` plugin, so a plugin wrapping the command is
//! generated in the cache and Helm is pointed at it with `HELM_PLUGINS`.

use std::collections::BTreeMap;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;
use terrahelm_core::{ReleaseSpec, content_hash};
use terrahelm_source::cache::{ensure_dir, ensure_parent};
use terrahelm_source::{CacheLayout, FetchMode, FetchOptions, Fetcher, with_retry};

use crate::error::{HelmError, Result};

const PLUGIN_PREFIX: &str = "terrahelm-postrenderer";

/// Flags and environment a Helm invocation needs for post-rendering
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PostRendererArgs {
    pub flags: Vec<String>,
    pub env: BTreeMap<String, String>,
}

impl PostRendererArgs {
    pub fn is_empty(&self) -> bool {
        self.flags.is_empty() && self.env.is_empty()
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PluginManifest {
    api_version: &'static str,
    #[serde(rename = "type")]
    kind: &'static str,
    name: String,
    version: &'static str,
    runtime: &'static str,
    runtime_config: RuntimeConfig,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RuntimeConfig {
    platform_command: Vec<PlatformCommand>,
}

#[derive(Debug, Serialize)]
struct PlatformCommand {
    command: String,
    args: Vec<String>,
}

/// Resolves a release's post-render configuration into Helm flags
pub struct PostRendererAdapter {
    cache: CacheLayout,
    fetcher: Arc<dyn Fetcher>,
}

impl PostRendererAdapter {
    pub fn new(cache: CacheLayout, fetcher: Arc<dyn Fetcher>) -> Self {
        Self { cache, fetcher }
    }

    pub async fn resolve(&self, spec: &ReleaseSpec, helm_major: u64) -> Result<PostRendererArgs> {
        let post_renderer = &spec.post_renderer;
        if post_renderer.is_empty() {
            return Ok(PostRendererArgs::default());
        }

        let mut command = post_renderer.command.clone();
        if let Some(url) = &post_renderer.url {
            let script = self.download(spec, url).await?;
            if command.is_none() {
                make_executable(&script).await?;
                command = Some(script.display().to_string());
            }
        }

        let command = command.unwrap_or_default();
        let mut parts = command.split_whitespace().map(str::to_string);
        let program = parts.next().ok_or_else(|| {
            HelmError::InvalidConfig("post_renderer command is empty".to_string())
        })?;
        let args: Vec<String> = parts.collect();

        if helm_major >= 4 {
            let url = post_renderer.url.as_deref().unwrap_or_default();
            self.plugin_args(&program, &args, url).await
        } else {
            let mut flags = vec!["--post-renderer".to_string(), program];
            for arg in args {
                flags.extend(["--post-renderer-args".to_string(), arg]);
            }
            Ok(PostRendererArgs {
                flags,
                env: BTreeMap::new(),
            })
        }
    }

    async fn download(&self, spec: &ReleaseSpec, url: &str) -> Result<std::path::PathBuf> {
        let destination = self.cache.post_renderer_file(url);
        ensure_parent(&destination).await?;
        let options = FetchOptions::new(FetchMode::File, spec.insecure_skip_tls_verify);

        with_retry(&spec.retry, "post-renderer fetch", || {
            self.fetcher.fetch(url, &destination, &options)
        })
        .await
        .map_err(|e| e.exhausted(url, spec.retry.attempts()))?;

        Ok(destination)
    }

    async fn plugin_args(&self, program: &str, args: &[String], url: &str) -> Result<PostRendererArgs> {
        let name = plugin_name(program, args, url);
        let plugins_dir = self.cache.plugins_dir();
        let plugin_dir = plugins_dir.join(&name);
        ensure_dir(&plugin_dir).await?;

        let manifest = PluginManifest {
            api_version: "v1",
            kind: "postrenderer/v1",
            name: name.clone(),
            version: "0.1.0",
            runtime: "subprocess",
            runtime_config: RuntimeConfig {
                platform_command: vec![PlatformCommand {
                    command: program.to_string(),
                    args: args.to_vec(),
                }],
            },
        };
        tokio::fs::write(plugin_dir.join("plugin.yaml"), serde_yaml::to_string(&manifest)?).await?;
        tracing::debug!(plugin = %name, dir = %plugin_dir.display(), "generated post-renderer plugin");

        Ok(PostRendererArgs {
            flags: vec!["--post-renderer".to_string(), name],
            env: BTreeMap::from([(
                "HELM_PLUGINS".to_string(),
                plugin_search_path(&plugins_dir, std::env::var_os("HELM_PLUGINS"))?,
            )]),
        })
    }
}

/// `existing` plugin directories followed by `plugins_dir`, joined with the
/// platform path separator
fn plugin_search_path(plugins_dir: &Path, existing: Option<OsString>) -> Result<String> {
    let mut dirs: Vec<PathBuf> = existing
        .as_deref()
        .map(|paths| std::env::split_paths(paths).filter(|p| !p.as_os_str().is_empty()).collect())
        .unwrap_or_default();
    if !dirs.iter().any(|dir| dir == plugins_dir) {
        dirs.push(plugins_dir.to_path_buf());
    }
    let joined = std::env::join_paths(dirs)
        .map_err(|e| HelmError::InvalidConfig(format!("cannot extend HELM_PLUGINS: {}", e)))?;
    Ok(joined.to_string_lossy().into_owned())
}

/// `terrahelm-postrenderer-<hash>` over program, arguments and source URL
fn plugin_name(program: &str, args: &[String], url: &str) -> String {
    let mut key = program.to_string();
    for arg in args {
        key.push('\n');
        key.push_str(arg);
    }
    key.push('\n');
    key.push_str(url);
    format!("{}-{}", PLUGIN_PREFIX, content_hash(key))
}

#[cfg(unix)]
async fn make_executable(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755)).await?;
    Ok(())
}

#[cfg(not(unix))]
async fn make_executable(_path: &Path) -> Result<()> {
    Ok(())
}
