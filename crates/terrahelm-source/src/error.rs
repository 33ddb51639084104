//! Error types for source acquisition

use terrahelm_core::CoreError;
use thiserror::Error;

/// Source acquisition errors
#[derive(Debug, Error)]
pub enum SourceError {
    // ============ Configuration Errors ============
    #[error("Invalid source '{location}': {reason}")]
    InvalidSource { location: String, reason: String },

    #[error("Unsupported source '{location}': {reason}")]
    UnsupportedSource { location: String, reason: String },

    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },

    // ============ Fetch Errors ============
    #[error("failed to fetch '{location}' after {attempts} attempt(s): {message}")]
    FetchFailed {
        location: String,
        attempts: u32,
        message: String,
    },

    #[error("failed to clone git repository '{url}': {message}")]
    GitFailed { url: String, message: String },

    #[error("HTTP error fetching {url}: {status}")]
    HttpError { status: u16, url: String },

    #[error("Network error: {message}")]
    NetworkError { message: String },

    #[error("Request timeout after {seconds}s")]
    Timeout { seconds: u64 },

    #[error("Rate limited by server. Retry after {retry_after} seconds")]
    RateLimited { retry_after: u64 },

    #[error("Integrity check failed for {location}: expected {expected}, got {actual}")]
    IntegrityCheckFailed {
        location: String,
        expected: String,
        actual: String,
    },

    #[error("Sub-directory '{subdir}' not found in {location}")]
    SubdirNotFound { location: String, subdir: String },

    // ============ Wrapped Errors ============
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Result type for source operations
pub type Result<T> = std::result::Result<T, SourceError>;

impl SourceError {
    /// Whether another attempt can succeed; configuration errors are final
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            SourceError::InvalidSource { .. }
                | SourceError::UnsupportedSource { .. }
                | SourceError::InvalidConfig { .. }
                | SourceError::Core(_)
                | SourceError::Serialization(_)
        )
    }

    /// The error to report once retries for `location` are used up
    pub fn exhausted(self, location: &str, attempts: u32) -> SourceError {
        if !self.is_retryable() {
            return self;
        }
        SourceError::FetchFailed {
            location: location.to_string(),
            attempts,
            message: self.to_string(),
        }
    }
}

impl From<reqwest::Error> for SourceError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            SourceError::Timeout { seconds: 60 }
        } else if e.is_connect() {
            SourceError::NetworkError {
                message: format!("Connection failed: {}", e),
            }
        } else if let Some(status) = e.status() {
            SourceError::HttpError {
                status: status.as_u16(),
                url: e.url().map(|u| u.to_string()).unwrap_or_default(),
            }
        } else {
            SourceError::NetworkError {
                message: e.to_string(),
            }
        }
    }
}

impl From<serde_yaml::Error> for SourceError {
    fn from(e: serde_yaml::Error) -> Self {
        SourceError::Serialization(e.to_string())
    }
}

impl From<serde_json::Error> for SourceError {
    fn from(e: serde_json::Error) -> Self {
        SourceError::Serialization(e.to_string())
    }
}

impl From<url::ParseError> for SourceError {
    fn from(e: url::ParseError) -> Self {
        SourceError::InvalidSource {
            location: String::new(),
            reason: e.to_string(),
        }
    }
}

impl From<walkdir::Error> for SourceError {
    fn from(e: walkdir::Error) -> Self {
        match e.into_io_error() {
            Some(io) => SourceError::Io(io),
            None => SourceError::InvalidConfig {
                message: "filesystem loop detected while copying source".to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exhausted_wraps_transient_errors() {
        let err = SourceError::NetworkError {
            message: "connection reset".to_string(),
        }
        .exhausted("https://example.com/chart.tgz", 3);
        match err {
            SourceError::FetchFailed { location, attempts, message } => {
                assert_eq!(location, "https://example.com/chart.tgz");
                assert_eq!(attempts, 3);
                assert!(message.contains("connection reset"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_exhausted_keeps_final_errors() {
        let err = SourceError::UnsupportedSource {
            location: "s3::https://bucket/values.yaml".to_string(),
            reason: "s3 getter is not supported".to_string(),
        }
        .exhausted("s3::https://bucket/values.yaml", 3);
        assert!(matches!(err, SourceError::UnsupportedSource { .. }));
    }
}
