/*
 * SPDX-FileCopyrightText: 2024 A3Mailer Project
 *
 * SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-SEL
 */

//! Remote transport configuration

use serde::{Deserialize, Serialize};

/// How commands reach nodes and containers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    /// Remote shell client binary
    pub ssh_binary: String,
    /// Login user on cluster nodes
    pub ssh_user: String,
    /// Extra options passed to the remote shell client
    pub ssh_options: Vec<String>,
    /// Command prefix that runs argv inside a named container,
    /// the container name is appended after the prefix
    pub container_exec: Vec<String>,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            ssh_binary: "ssh".to_string(),
            ssh_user: "root".to_string(),
            ssh_options: vec![
                "-o".to_string(),
                "BatchMode=yes".to_string(),
                "-o".to_string(),
                "StrictHostKeyChecking=no".to_string(),
            ],
            container_exec: vec!["dockerctl".to_string(), "shell".to_string()],
        }
    }
}
