//! Standard exit codes for CLI operations
//!
//! These exit codes follow Unix conventions and sysexits.h where applicable.

/// General error - unspecified failure
pub const ERROR: i32 = 1;

/// Configuration error - invalid release document or provider settings
pub const CONFIG_ERROR: i32 = 2;

/// Source error - chart, values or post-renderer could not be fetched
pub const SOURCE_ERROR: i32 = 3;

/// Helm error - a helm invocation failed or printed something unparsable
pub const HELM_ERROR: i32 = 4;

/// IO error - file not found, permission denied, etc.
pub const IO_ERROR: i32 = 5;

/// Not found - the release does not exist
pub const NOT_FOUND: i32 = 6;

/// Authentication error - no usable token for the cluster
pub const AUTH_ERROR: i32 = 77;
