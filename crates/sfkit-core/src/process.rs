//! External process execution.
//!
//! Computation phases and setup steps are opaque programs. The launcher
//! only needs to start one, wait for it and read its exit status (plus,
//! for data validation, its standard output), so the seam is a small
//! async trait that tests replace with a recorder.

use std::path::PathBuf;
use std::process::Stdio;

use async_trait::async_trait;
use sfkit_proto::{BootError, BootResult};
use tokio::process::Command;
use tracing::debug;

/// A fully resolved command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    pub working_dir: Option<PathBuf>,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            working_dir: None,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn current_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.working_dir = dir;
        self
    }

    /// Human-readable command line for logs.
    pub fn display(&self) -> String {
        let mut line = self.program.clone();
        for a in &self.args {
            line.push(' ');
            line.push_str(a);
        }
        line
    }
}

/// Exit status and standard output of a finished command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturedOutput {
    pub code: Option<i32>,
    pub stdout: String,
}

/// Runs a command to completion.
#[async_trait]
pub trait ProcessRunner: Send + Sync {
    /// Returns the exit code, or `None` if the process was killed by a
    /// signal. Failure to start at all is an error.
    async fn run(&self, spec: &CommandSpec) -> BootResult<Option<i32>>;

    /// Like [`ProcessRunner::run`], but collects standard output.
    async fn capture(&self, spec: &CommandSpec) -> BootResult<CapturedOutput>;
}

/// Runs commands as real child processes, inheriting stdio.
#[derive(Debug, Default, Clone)]
pub struct SystemRunner;

#[async_trait]
impl ProcessRunner for SystemRunner {
    async fn run(&self, spec: &CommandSpec) -> BootResult<Option<i32>> {
        debug!("exec: {}", spec.display());

        let mut cmd = Command::new(&spec.program);
        cmd.args(&spec.args);
        if let Some(dir) = &spec.working_dir {
            cmd.current_dir(dir);
        }

        let status = cmd.status().await.map_err(|e| BootError::Spawn {
            what: spec.program.clone(),
            message: e.to_string(),
        })?;
        Ok(status.code())
    }

    async fn capture(&self, spec: &CommandSpec) -> BootResult<CapturedOutput> {
        debug!("exec (captured): {}", spec.display());

        let mut cmd = Command::new(&spec.program);
        cmd.args(&spec.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit());
        if let Some(dir) = &spec.working_dir {
            cmd.current_dir(dir);
        }

        let output = cmd.output().await.map_err(|e| BootError::Spawn {
            what: spec.program.clone(),
            message: e.to_string(),
        })?;
        Ok(CapturedOutput {
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        })
    }
}
