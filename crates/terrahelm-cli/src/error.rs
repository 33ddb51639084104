//! CLI error types with exit code handling
//!
//! Library errors are folded into [`CliError`] so every failure renders as a
//! miette diagnostic and maps to a stable exit code.

use miette::Diagnostic;
use terrahelm_core::CoreError;
use terrahelm_helm::HelmError;
use terrahelm_source::SourceError;
use thiserror::Error;

use crate::exit_codes;

/// CLI-specific error type that includes exit code information
#[derive(Error, Debug, Diagnostic, Clone)]
pub enum CliError {
    /// Release document or provider settings are invalid
    #[error("Configuration error: {message}")]
    #[diagnostic(code(terrahelm::cli::config))]
    Config {
        message: String,
        #[help]
        help: Option<String>,
    },

    /// Chart, values or post-renderer acquisition failed
    #[error("Source error: {message}")]
    #[diagnostic(code(terrahelm::cli::source))]
    Source { message: String },

    /// A helm invocation failed
    #[error("{message}")]
    #[diagnostic(code(terrahelm::cli::helm))]
    Helm {
        message: String,
        #[help]
        help: Option<String>,
    },

    /// The release does not exist
    #[error("{message}")]
    #[diagnostic(
        code(terrahelm::cli::not_found),
        help("use `read --data-source` to tolerate a missing release")
    )]
    NotFound { message: String },

    /// Token resolution failed
    #[error("Authentication error: {message}")]
    #[diagnostic(code(terrahelm::cli::auth))]
    Auth { message: String },

    /// IO error (file not found, permissions, etc.)
    #[error("IO error: {message}")]
    #[diagnostic(code(terrahelm::cli::io))]
    Io { message: String },

    /// Internal error (runtime, unexpected failure)
    #[error("Internal error: {message}")]
    #[diagnostic(code(terrahelm::cli::internal))]
    Internal { message: String },
}

impl CliError {
    /// Get the exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            CliError::Config { .. } => exit_codes::CONFIG_ERROR,
            CliError::Source { .. } => exit_codes::SOURCE_ERROR,
            CliError::Helm { .. } => exit_codes::HELM_ERROR,
            CliError::NotFound { .. } => exit_codes::NOT_FOUND,
            CliError::Auth { .. } => exit_codes::AUTH_ERROR,
            CliError::Io { .. } => exit_codes::IO_ERROR,
            CliError::Internal { .. } => exit_codes::ERROR,
        }
    }

    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
            help: None,
        }
    }

    /// Create a configuration error with help text
    pub fn config_with_help(message: impl Into<String>, help: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
            help: Some(help.into()),
        }
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }
}

impl From<std::io::Error> for CliError {
    fn from(err: std::io::Error) -> Self {
        CliError::Io {
            message: err.to_string(),
        }
    }
}

impl From<serde_yaml::Error> for CliError {
    fn from(err: serde_yaml::Error) -> Self {
        CliError::config(err.to_string())
    }
}

impl From<serde_json::Error> for CliError {
    fn from(err: serde_json::Error) -> Self {
        CliError::internal(err.to_string())
    }
}

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::Io(e) => e.into(),
            other => CliError::config(other.to_string()),
        }
    }
}

impl From<SourceError> for CliError {
    fn from(err: SourceError) -> Self {
        match err {
            SourceError::Core(e) => e.into(),
            SourceError::InvalidConfig { message } => CliError::config(message),
            other => CliError::Source {
                message: other.to_string(),
            },
        }
    }
}

impl From<HelmError> for CliError {
    fn from(err: HelmError) -> Self {
        let message = err.to_string();
        if err.is_not_found() {
            return CliError::NotFound { message };
        }
        match err {
            HelmError::Source(e) => e.into(),
            HelmError::Io(e) => e.into(),
            HelmError::InvalidConfig(message) => CliError::config(message),
            HelmError::Auth(message) => CliError::Auth { message },
            HelmError::Spawn { program, .. } => CliError::Helm {
                message,
                help: Some(format!(
                    "check that `{}` is installed or set --helm-bin-path",
                    program
                )),
            },
            _ => CliError::Helm {
                message,
                help: None,
            },
        }
    }
}

/// Result type for CLI operations
pub type Result<T> = std::result::Result<T, CliError>;
