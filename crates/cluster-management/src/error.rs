/*
 * SPDX-FileCopyrightText: 2020 Stalwart Labs Ltd <hello@stalw.art>
 *
 * SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-SEL
 */

//! Error types for cluster management

use common::ExecutionError;
use thiserror::Error;

use crate::node::EnvironmentId;

/// Result type for cluster operations
pub type Result<T> = std::result::Result<T, ClusterError>;

/// Errors that can occur during cluster operations
#[derive(Error, Debug)]
pub enum ClusterError {
    /// A remote command could not run or exited non-zero
    #[error("{0}")]
    Execution(#[from] ExecutionError),

    /// A node is not in a state the operation can start from
    #[error("Precondition failed on node {node} for {path}: {reason}")]
    PreconditionFailed {
        node: String,
        path: String,
        reason: String,
    },

    /// Services are started before they were ever stopped on this node
    #[error("Service list missing on node {node}")]
    ServicesListMissing { node: String },

    /// The cluster did not converge within the configured timeout
    #[error("Timeout waiting for corosync cluster for env {env} to be synced")]
    SyncTimeout { env: EnvironmentId },

    /// A resource transition kept failing up to the configured bound
    #[error("Resource {resource} did not transition after {attempts} attempts")]
    RetryExhausted { resource: String, attempts: u32 },

    /// A resource status document could not be parsed
    #[error("Invalid resource status document: {0}")]
    Xml(String),

    #[error("Environment {0} has no controllers")]
    NoControllers(EnvironmentId),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<roxmltree::Error> for ClusterError {
    fn from(err: roxmltree::Error) -> Self {
        ClusterError::Xml(err.to_string())
    }
}

impl ClusterError {
    /// Whether the error carries stderr of a failed command
    pub fn stderr(&self) -> Option<&str> {
        match self {
            ClusterError::Execution(err) => err.stderr(),
            _ => None,
        }
    }
}
