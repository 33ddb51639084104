//! Error types for terrahelm-helm

use terrahelm_source::SourceError;
use thiserror::Error;

/// Result type for terrahelm-helm operations
pub type Result<T> = std::result::Result<T, HelmError>;

/// Errors that can occur while driving the Helm CLI
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum HelmError {
    /// Helm exited non-zero; `command` is already redacted
    #[error("helm command failed: {command}\n{stderr}{}", debug_output(.stdout))]
    CommandFailed {
        command: String,
        stderr: String,
        stdout: Option<String>,
    },

    /// The executable could not be started
    #[error("failed to run '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// Release not found
    #[error("release '{name}' not found in namespace '{namespace}'")]
    ReleaseNotFound { name: String, namespace: String },

    /// Invalid configuration
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Exec credential failures
    #[error("{0}")]
    Auth(String),

    /// A bounded process ran out of time
    #[error("{program} timed out after {seconds} seconds")]
    Timeout { program: String, seconds: u64 },

    /// Unparsable Helm output
    #[error("failed to parse output of '{command}': {message}")]
    Parse { command: String, message: String },

    #[error("unsupported helm version '{0}'")]
    HelmVersion(String),

    #[error(transparent)]
    Source(#[from] SourceError),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(String),
}

fn debug_output(stdout: &Option<String>) -> String {
    match stdout {
        Some(out) if !out.trim().is_empty() => format!("\nstdout:\n{}", out.trim_end()),
        _ => String::new(),
    }
}

impl From<serde_yaml::Error> for HelmError {
    fn from(e: serde_yaml::Error) -> Self {
        HelmError::Serialization(e.to_string())
    }
}

impl HelmError {
    /// Whether the error reports a missing release
    pub fn is_not_found(&self) -> bool {
        matches!(self, HelmError::ReleaseNotFound { .. })
    }
}
