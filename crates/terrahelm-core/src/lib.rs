//! terrahelm Core - Core types and utilities for Helm release reconciliation
//!
//! This crate provides the foundational types used throughout terrahelm:
//! - `ReleaseSpec`: The validated, declarative description of a release
//! - `ChartSource`: Where the chart comes from (repository, git, or URL)
//! - `ReleaseState`: What Helm reports back about a deployed release
//! - `AuthContext`: Kubernetes connection parameters applied to every Helm call
//! - `content_hash`: Short content digests used to derive cache paths

pub mod auth;
pub mod error;
pub mod hash;
pub mod release;
pub mod spec;
pub mod values;

pub use auth::{AuthContext, ExecCredential};
pub use error::{CoreError, Result};
pub use hash::content_hash;
pub use release::{ReleaseState, ReleaseStatus, release_id, split_chart_string};
pub use spec::{
    ChartSource, PostRendererSpec, ReleaseConfig, ReleaseSpec, RepositoryLocation, RetryPolicy,
};
pub use values::{ValuesPlan, flatten_values, sanitize_yaml};
