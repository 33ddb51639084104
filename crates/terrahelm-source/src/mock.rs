//! In-memory fetchers for testing
//!
//! Both mocks record every call and can be told to fail a number of times
//! before succeeding, so retry behavior can be asserted without network access.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;

use crate::error::{Result, SourceError};
use crate::fetch::{FetchMode, FetchOptions, Fetcher};
use crate::git::{CloneOptions, GitClient};

/// A recorded [`Fetcher::fetch`] call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchCall {
    pub source: String,
    pub destination: PathBuf,
    pub options: FetchOptions,
}

/// A recorded [`GitClient::clone_repo`] call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloneCall {
    pub url: String,
    pub reference: Option<String>,
    pub destination: PathBuf,
    pub options: CloneOptions,
}

/// Files written on success, relative to the destination
type Files = Vec<(String, String)>;

fn default_chart() -> Files {
    vec![("Chart.yaml".to_string(), "apiVersion: v2\nname: mock\nversion: 0.1.0\n".to_string())]
}

fn write_files(destination: &Path, files: &Files) -> Result<()> {
    for (relative, body) in files {
        let path = destination.join(relative);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, body)?;
    }
    Ok(())
}

/// Consume one scheduled failure, if any remain
fn take_failure(remaining: &AtomicU32) -> bool {
    remaining
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

/// [`Fetcher`] that writes canned content instead of downloading
#[derive(Clone)]
pub struct MockFetcher {
    calls: Arc<RwLock<Vec<FetchCall>>>,
    failures: Arc<AtomicU32>,
    dir_files: Files,
    file_body: String,
}

impl MockFetcher {
    /// Succeeds every time; directories get a `Chart.yaml`
    pub fn new() -> Self {
        Self {
            calls: Arc::new(RwLock::new(Vec::new())),
            failures: Arc::new(AtomicU32::new(0)),
            dir_files: default_chart(),
            file_body: String::new(),
        }
    }

    /// Fail the first `count` calls
    pub fn failing(self, count: u32) -> Self {
        self.failures.store(count, Ordering::SeqCst);
        self
    }

    /// Body written for single-file fetches
    pub fn with_file_body(mut self, body: impl Into<String>) -> Self {
        self.file_body = body.into();
        self
    }

    /// Files written for directory fetches
    pub fn with_files(mut self, files: &[(&str, &str)]) -> Self {
        self.dir_files = files
            .iter()
            .map(|(path, body)| (path.to_string(), body.to_string()))
            .collect();
        self
    }

    pub fn calls(&self) -> Vec<FetchCall> {
        self.calls.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.read().unwrap_or_else(|e| e.into_inner()).len()
    }
}

impl Default for MockFetcher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Fetcher for MockFetcher {
    async fn fetch(&self, source: &str, destination: &Path, options: &FetchOptions) -> Result<()> {
        self.calls
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .push(FetchCall {
                source: source.to_string(),
                destination: destination.to_path_buf(),
                options: *options,
            });

        if take_failure(&self.failures) {
            return Err(SourceError::NetworkError {
                message: format!("mock failure fetching {}", source),
            });
        }

        match options.mode {
            FetchMode::File => {
                if let Some(parent) = destination.parent() {
                    std::fs::create_dir_all(parent)?;
                }
                std::fs::write(destination, &self.file_body)?;
            }
            FetchMode::Dir | FetchMode::Any => {
                std::fs::create_dir_all(destination)?;
                write_files(destination, &self.dir_files)?;
            }
        }
        Ok(())
    }
}

/// [`GitClient`] that materializes canned files instead of cloning
#[derive(Clone)]
pub struct MockGitClient {
    calls: Arc<RwLock<Vec<CloneCall>>>,
    failures: Arc<AtomicU32>,
    files: Files,
}

impl MockGitClient {
    pub fn new() -> Self {
        Self {
            calls: Arc::new(RwLock::new(Vec::new())),
            failures: Arc::new(AtomicU32::new(0)),
            files: default_chart(),
        }
    }

    /// Fail the first `count` clones
    pub fn failing(self, count: u32) -> Self {
        self.failures.store(count, Ordering::SeqCst);
        self
    }

    /// Repository content, relative to the clone root
    pub fn with_files(mut self, files: &[(&str, &str)]) -> Self {
        self.files = files
            .iter()
            .map(|(path, body)| (path.to_string(), body.to_string()))
            .collect();
        self
    }

    pub fn calls(&self) -> Vec<CloneCall> {
        self.calls.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.read().unwrap_or_else(|e| e.into_inner()).len()
    }
}

impl Default for MockGitClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl GitClient for MockGitClient {
    async fn clone_repo(
        &self,
        url: &str,
        reference: Option<&str>,
        destination: &Path,
        options: &CloneOptions,
    ) -> Result<()> {
        self.calls
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .push(CloneCall {
                url: url.to_string(),
                reference: reference.map(str::to_string),
                destination: destination.to_path_buf(),
                options: options.clone(),
            });

        if take_failure(&self.failures) {
            return Err(SourceError::GitFailed {
                url: url.to_string(),
                message: "mock clone failure".to_string(),
            });
        }

        // git refuses to clone into a non-empty directory
        if destination.read_dir().map(|mut d| d.next().is_some()).unwrap_or(false) {
            return Err(SourceError::GitFailed {
                url: url.to_string(),
                message: format!(
                    "destination path '{}' already exists and is not an empty directory",
                    destination.display()
                ),
            });
        }

        std::fs::create_dir_all(destination)?;
        write_files(destination, &self.files)
    }
}
