//! HTTP(S) downloads for chart archives, value files and post-render scripts

use std::time::Duration;

use sha2::{Digest, Sha256};

use crate::error::{Result, SourceError};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Thin wrapper over `reqwest` with terrahelm's status handling
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: reqwest::Client,
}

impl HttpClient {
    /// Create a client; `insecure` disables certificate verification
    pub fn new(insecure: bool) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .danger_accept_invalid_certs(insecure)
            .user_agent(concat!("terrahelm/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| SourceError::NetworkError {
                message: e.to_string(),
            })?;

        Ok(Self { client })
    }

    async fn get(&self, url: &str) -> Result<reqwest::Response> {
        let response = self.client.get(url).send().await?;
        let status = response.status();

        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get("Retry-After")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse().ok())
                .unwrap_or(60);

            return Err(SourceError::RateLimited { retry_after });
        }

        if !status.is_success() {
            return Err(SourceError::HttpError {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        Ok(response)
    }

    /// Fetch the full body of `url`
    pub async fn get_bytes(&self, url: &str) -> Result<Vec<u8>> {
        tracing::debug!(url, "downloading");
        let response = self.get(url).await?;
        let bytes = response.bytes().await.map_err(|e| SourceError::NetworkError {
            message: e.to_string(),
        })?;
        Ok(bytes.to_vec())
    }
}

/// `sha256:<hex>` digest of `data`
pub(crate) fn compute_digest(data: &[u8]) -> String {
    format!("sha256:{}", hex::encode(Sha256::digest(data)))
}

/// Compare digests, ignoring case and an optional `sha256:` prefix
pub(crate) fn digest_matches(expected: &str, actual: &str) -> bool {
    fn normalize(digest: &str) -> String {
        digest
            .trim()
            .to_lowercase()
            .trim_start_matches("sha256:")
            .to_string()
    }
    normalize(expected) == normalize(actual)
}
