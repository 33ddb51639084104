//! terrahelm Source Acquisition
//!
//! This crate turns a release's chart source into something Helm can use:
//!
//! - **Source resolution**: chart repositories, git repositories and generic
//!   URLs become a local chart path (or a `--repo` reference)
//! - **Fetching**: a getter-style fetcher for local paths, HTTP(S) files and
//!   archives, and git sources, with sub-directory selection
//! - **Retries**: fixed-delay retry around every network fetch
//! - **Values**: value files and inline values materialized into the cache,
//!   in the order Helm must apply them
//!
//! ## Cache layout
//!
//! ```text
//! <cache>/repos/<name>-<hash>/            git clones and URL fetches
//! <cache>/values/<scope>/<name>-<hash>-values.yaml
//! <cache>/values-files/<hash>.yaml        fetched value files
//! <cache>/post-renderers/<hash>/          downloaded post-render scripts
//! <cache>/plugins/<plugin>/plugin.yaml    generated Helm plugins
//! ```
//!
//! Every path is derived from a content hash, so concurrent writers for the
//! same key write identical bytes.

pub mod cache;
pub mod error;
pub mod fetch;
pub mod git;
pub mod http;
pub mod mock;
pub mod resolver;
pub mod retry;
pub mod values;

// Re-exports for convenience
pub use cache::CacheLayout;
pub use error::{Result, SourceError};
pub use fetch::{FetchMode, FetchOptions, Fetcher, GetterFetcher, SourceAddress};
pub use git::{CloneOptions, GitCli, GitClient};
pub use http::HttpClient;
pub use mock::{MockFetcher, MockGitClient};
pub use resolver::{ResolvedChart, SourceResolver};
pub use retry::{Retryable, with_retry};
pub use values::ValuesMaterializer;
