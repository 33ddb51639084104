//! External process execution
//!
//! Helm and exec-credential commands run through [`CommandRunner`], so the
//! whole reconciliation can be exercised against [`MockRunner`].

use std::collections::BTreeMap;
use std::process::Stdio;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;

use crate::error::{HelmError, Result};

/// A process to run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<String>,
    /// Added to the inherited environment
    pub env: BTreeMap<String, String>,
    /// Kill the process after this long
    pub timeout: Option<Duration>,
}

impl Invocation {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            ..Default::default()
        }
    }

    pub fn with_env(mut self, env: BTreeMap<String, String>) -> Self {
        self.env.extend(env);
        self
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Captured result of a finished process
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub success: bool,
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(stdout: impl Into<String>) -> Self {
        Self {
            success: true,
            code: Some(0),
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    pub fn failure(code: i32, stderr: impl Into<String>) -> Self {
        Self {
            success: false,
            code: Some(code),
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }
}

/// Runs external processes
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run to completion. A non-zero exit is reported in [`CommandOutput`],
    /// not as an error; errors mean the process could not run or timed out.
    async fn run(&self, invocation: &Invocation) -> Result<CommandOutput>;
}

/// [`CommandRunner`] spawning real processes with tokio
#[derive(Debug, Clone, Default)]
pub struct ProcessRunner;

#[async_trait]
impl CommandRunner for ProcessRunner {
    async fn run(&self, invocation: &Invocation) -> Result<CommandOutput> {
        let mut command = Command::new(&invocation.program);
        command
            .args(&invocation.args)
            .envs(&invocation.env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let child = command.spawn().map_err(|source| HelmError::Spawn {
            program: invocation.program.clone(),
            source,
        })?;

        let output = match invocation.timeout {
            Some(limit) => tokio::time::timeout(limit, child.wait_with_output())
                .await
                .map_err(|_| HelmError::Timeout {
                    program: invocation.program.clone(),
                    seconds: limit.as_secs(),
                })??,
            None => child.wait_with_output().await?,
        };

        Ok(CommandOutput {
            success: output.status.success(),
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

/// In-memory [`CommandRunner`] returning canned output
///
/// Responses are keyed by argument patterns: whitespace-separated tokens that
/// must all appear in the argument vector. The most specific matching pattern
/// wins; unmatched invocations succeed with empty output.
#[derive(Clone, Default)]
pub struct MockRunner {
    responses: Arc<RwLock<Vec<(Vec<String>, CommandOutput)>>>,
    invocations: Arc<RwLock<Vec<Invocation>>>,
}

impl MockRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer invocations containing every token of `pattern` with `output`
    pub fn respond(self, pattern: &str, output: CommandOutput) -> Self {
        let tokens = pattern.split_whitespace().map(str::to_string).collect();
        self.responses
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .push((tokens, output));
        self
    }

    /// All recorded invocations, oldest first
    pub fn invocations(&self) -> Vec<Invocation> {
        self.invocations
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Recorded argument vectors joined with spaces
    pub fn command_lines(&self) -> Vec<String> {
        self.invocations()
            .iter()
            .map(|inv| inv.args.join(" "))
            .collect()
    }
}

#[async_trait]
impl CommandRunner for MockRunner {
    async fn run(&self, invocation: &Invocation) -> Result<CommandOutput> {
        self.invocations
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .push(invocation.clone());

        let responses = self.responses.read().unwrap_or_else(|e| e.into_inner());
        let output = responses
            .iter()
            .filter(|(tokens, _)| tokens.iter().all(|t| invocation.args.contains(t)))
            .max_by_key(|(tokens, _)| tokens.len())
            .map(|(_, output)| output.clone())
            .unwrap_or_else(|| CommandOutput::success(""));
        Ok(output)
    }
}
