//! terrahelm Helm - reconciling releases through the Helm CLI
//!
//! This crate provides:
//! - **Command Builder**: typed Helm invocations serialized in a fixed flag order
//! - **Runner**: process execution with captured output and optional timeout
//! - **Auth**: bearer tokens from static configuration or exec-credential commands
//! - **Post-Renderers**: Helm 3 flags or generated Helm 4 plugins
//! - **Release Reader**: `helm list` and `helm get values` mapped to [`ReleaseState`]
//! - **Client**: the create / update / read / delete pipeline
//!
//! [`ReleaseState`]: terrahelm_core::ReleaseState

pub mod auth;
pub mod client;
pub mod command;
pub mod error;
pub mod post_renderer;
pub mod reader;
pub mod runner;

pub use auth::{parse_exec_token, resolve_token};
pub use client::{Action, HelmClient, HelmClientConfig};
pub use command::{HelmCommand, KubeFlags, Operation, ReleaseArgs, normalize_timeout, redact_args};
pub use error::{HelmError, Result};
pub use post_renderer::{PostRendererAdapter, PostRendererArgs};
pub use reader::{ListEntry, MissingRelease};
pub use runner::{CommandOutput, CommandRunner, Invocation, MockRunner, ProcessRunner};
