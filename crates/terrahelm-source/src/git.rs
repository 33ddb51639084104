//! Git clones through the `git` executable

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::process::Command;

use crate::error::{Result, SourceError};

/// Options for a single clone
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CloneOptions {
    /// Shallow clone depth
    pub depth: Option<u32>,
    /// Fetch only the history of the checked-out branch
    pub single_branch: bool,
    /// Disable TLS verification for HTTPS remotes
    pub insecure: bool,
    /// Private key used through `GIT_SSH_COMMAND`
    pub ssh_key_file: Option<PathBuf>,
}

/// Something that can clone a git repository into a directory
#[async_trait]
pub trait GitClient: Send + Sync {
    /// Clone `url` into `destination`, checking out `reference` when given.
    ///
    /// `destination` must not exist or be empty.
    async fn clone_repo(
        &self,
        url: &str,
        reference: Option<&str>,
        destination: &Path,
        options: &CloneOptions,
    ) -> Result<()>;
}

/// [`GitClient`] backed by the `git` binary
#[derive(Debug, Clone)]
pub struct GitCli {
    program: String,
}

impl GitCli {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// Command-line arguments for a clone
    pub fn clone_args(
        url: &str,
        reference: Option<&str>,
        destination: &Path,
        options: &CloneOptions,
    ) -> Vec<String> {
        let mut args = Vec::new();
        if options.insecure {
            args.extend(["-c".to_string(), "http.sslVerify=false".to_string()]);
        }
        args.push("clone".to_string());
        if let Some(depth) = options.depth {
            args.extend(["--depth".to_string(), depth.to_string()]);
        }
        if options.single_branch {
            args.push("--single-branch".to_string());
        }
        if let Some(reference) = reference {
            args.extend(["--branch".to_string(), reference.to_string()]);
        }
        args.push(url.to_string());
        args.push(destination.display().to_string());
        args
    }

    fn clone_env(options: &CloneOptions) -> BTreeMap<String, String> {
        let mut env = BTreeMap::new();
        env.insert("GIT_TERMINAL_PROMPT".to_string(), "0".to_string());
        if let Some(key) = &options.ssh_key_file {
            env.insert(
                "GIT_SSH_COMMAND".to_string(),
                format!(
                    "ssh -i {} -o IdentitiesOnly=yes -o StrictHostKeyChecking=accept-new",
                    key.display()
                ),
            );
        }
        env
    }
}

impl Default for GitCli {
    fn default() -> Self {
        Self::new("git")
    }
}

#[async_trait]
impl GitClient for GitCli {
    async fn clone_repo(
        &self,
        url: &str,
        reference: Option<&str>,
        destination: &Path,
        options: &CloneOptions,
    ) -> Result<()> {
        let args = Self::clone_args(url, reference, destination, options);
        tracing::debug!(program = %self.program, ?args, "running git");

        let output = Command::new(&self.program)
            .args(&args)
            .envs(Self::clone_env(options))
            .output()
            .await
            .map_err(|e| SourceError::GitFailed {
                url: url.to_string(),
                message: format!("failed to run '{}': {}", self.program, e),
            })?;

        if !output.status.success() {
            return Err(SourceError::GitFailed {
                url: url.to_string(),
                message: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(())
    }
}
