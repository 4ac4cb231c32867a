/*
 * SPDX-FileCopyrightText: 2024 A3Mailer Project
 *
 * SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-SEL
 */

//! Remote executor contract
//!
//! Every interaction with the cluster goes through [`RemoteExecutor`]: the
//! admin host itself, a cluster node reached over a remote shell, or a named
//! service running in the admin host's container runtime.

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncWrite};

use crate::error::{CommandFailureInfo, ExecutionError, Result};

/// Where a command runs
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "name", rename_all = "snake_case")]
pub enum Target {
    /// The admin host running this tool
    Local,
    /// A cluster node addressed by hostname or IP
    Node(String),
    /// A named service inside the container runtime
    Container(String),
}

impl Target {
    pub fn node(address: impl Into<String>) -> Self {
        Target::Node(address.into())
    }

    pub fn container(name: impl Into<String>) -> Self {
        Target::Container(name.into())
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Target::Local => write!(f, "local host"),
            Target::Node(address) => write!(f, "node {}", address),
            Target::Container(name) => write!(f, "container {}", name),
        }
    }
}

/// Captured result of a finished command
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    /// Exit code, `None` when the process was killed by a signal
    pub status: Option<i32>,
}

impl CommandOutput {
    /// Successful output with the given stdout
    pub fn ok(stdout: impl Into<Vec<u8>>) -> Self {
        Self {
            stdout: stdout.into(),
            stderr: Vec::new(),
            status: Some(0),
        }
    }

    /// Failed output with the given exit code and stderr
    pub fn failed(code: i32, stderr: impl Into<Vec<u8>>) -> Self {
        Self {
            stdout: Vec::new(),
            stderr: stderr.into(),
            status: Some(code),
        }
    }

    pub fn success(&self) -> bool {
        self.status == Some(0)
    }

    pub fn stdout_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }

    pub fn stderr_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stderr).into_owned()
    }

    /// Turn a non-zero exit into [`ExecutionError::CommandFailure`]
    pub fn into_result(self, target: &Target, argv: &[String]) -> Result<Self> {
        if self.success() {
            return Ok(self);
        }
        Err(ExecutionError::CommandFailure(Box::new(CommandFailureInfo {
            target: target.clone(),
            command: command_line(argv),
            status: self.status,
            stdout: self.stdout_lossy(),
            stderr: self.stderr_lossy(),
        })))
    }
}

/// A running command with live stdin/stdout handles
///
/// Dropping the process without calling [`RemoteProcess::wait`] leaves the
/// child to be reaped by the runtime.
#[async_trait]
pub trait RemoteProcess: Send {
    /// Pipe connected to the command's stdin, until `wait` closes it
    fn stdin(&mut self) -> Option<&mut (dyn AsyncWrite + Send + Unpin)>;

    /// Pipe connected to the command's stdout
    fn stdout(&mut self) -> Option<&mut (dyn AsyncRead + Send + Unpin)>;

    /// Close stdin and wait for the command to exit
    async fn wait(self: Box<Self>) -> Result<CommandOutput>;
}

/// Executes commands on local, remote and containerized targets
#[async_trait]
pub trait RemoteExecutor: Send + Sync + fmt::Debug {
    /// Run a command to completion, feeding `stdin` if given.
    ///
    /// A non-zero exit is reported through [`CommandOutput::status`], not as
    /// an error.
    async fn run(
        &self,
        target: &Target,
        argv: &[String],
        stdin: Option<&[u8]>,
    ) -> Result<CommandOutput>;

    /// Start a command and hand back its pipes for scoped streaming
    async fn spawn(&self, target: &Target, argv: &[String]) -> Result<Box<dyn RemoteProcess>>;

    /// Run a command and fail on a non-zero exit
    async fn call(&self, target: &Target, argv: &[String]) -> Result<CommandOutput> {
        self.run(target, argv, None)
            .await?
            .into_result(target, argv)
    }

    /// Run a command with piped input and fail on a non-zero exit
    async fn call_with_stdin(
        &self,
        target: &Target,
        argv: &[String],
        stdin: &[u8],
    ) -> Result<CommandOutput> {
        self.run(target, argv, Some(stdin))
            .await?
            .into_result(target, argv)
    }

    /// Run a command, fail on a non-zero exit and return stdout as text
    async fn call_output(&self, target: &Target, argv: &[String]) -> Result<String> {
        Ok(self.call(target, argv).await?.stdout_lossy())
    }
}

/// Build an owned argv from anything string-like
pub fn argv<I, S>(parts: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    parts.into_iter().map(Into::into).collect()
}

/// Human readable rendering of an argv, used in logs and errors
pub fn command_line(argv: &[String]) -> String {
    argv.join(" ")
}
