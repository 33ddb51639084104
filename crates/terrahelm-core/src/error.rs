//! Core error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("either 'helm_repository', 'git_repository' or 'chart_url' must be set")]
    MissingChartSource,

    #[error("only one of 'helm_repository', 'git_repository' or 'chart_url' can be set (got {sources})")]
    ConflictingChartSources { sources: String },

    #[error("'git_reference' can only be used together with 'git_repository'")]
    GitReferenceWithoutRepository,

    #[error("Unexpected values document: {message}")]
    ValuesShape { message: String },

    #[error("Missing required field: {field}")]
    MissingField { field: String },

    #[error("Failed to parse YAML: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, CoreError>;
