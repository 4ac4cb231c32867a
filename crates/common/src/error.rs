/*
 * SPDX-FileCopyrightText: 2024 A3Mailer Project
 *
 * SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-SEL
 */

//! Error types for remote command execution

use std::fmt;

use thiserror::Error;

use crate::executor::Target;

/// Result type for remote execution
pub type Result<T> = std::result::Result<T, ExecutionError>;

/// Details about a command that ran to completion with a non-zero status
#[derive(Debug, Clone)]
pub struct CommandFailureInfo {
    pub target: Target,
    pub command: String,
    pub status: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl fmt::Display for CommandFailureInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.status {
            Some(code) => write!(
                f,
                "Command [{}] on {} failed with exit code {}",
                self.command, self.target, code
            )?,
            None => write!(
                f,
                "Command [{}] on {} was terminated by a signal",
                self.command, self.target
            )?,
        }
        if !self.stderr.trim().is_empty() {
            write!(f, ": {}", self.stderr.trim())?;
        }
        Ok(())
    }
}

/// Errors raised while running commands on local, remote or containerized targets
#[derive(Error, Debug)]
pub enum ExecutionError {
    #[error("Failed to start [{command}] on {target}: {err}")]
    ExecutionStart {
        target: Target,
        command: String,
        err: std::io::Error,
    },

    #[error("{0}")]
    CommandFailure(Box<CommandFailureInfo>),

    #[error("I/O error while streaming to [{command}] on {target}: {err}")]
    Stream {
        target: Target,
        command: String,
        err: std::io::Error,
    },

    #[error("Empty command line for {0}")]
    EmptyCommand(Target),
}

impl ExecutionError {
    /// Captured stderr of the failed command, when the command ran at all
    pub fn stderr(&self) -> Option<&str> {
        match self {
            ExecutionError::CommandFailure(info) => Some(info.stderr.as_str()),
            _ => None,
        }
    }

    /// Whether the command was started and exited unsuccessfully
    pub fn is_command_failure(&self) -> bool {
        matches!(self, ExecutionError::CommandFailure(_))
    }
}
