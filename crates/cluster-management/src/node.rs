/*
 * SPDX-FileCopyrightText: 2020 Stalwart Labs Ltd <hello@stalw.art>
 *
 * SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-SEL
 */

//! Node module

use std::fmt;

use common::Target;
use serde::{Deserialize, Serialize};

/// Identifier of a deployed environment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EnvironmentId(pub u32);

impl fmt::Display for EnvironmentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for EnvironmentId {
    fn from(id: u32) -> Self {
        EnvironmentId(id)
    }
}

/// A cluster node reachable over the remote shell
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    pub id: u32,
    pub hostname: String,
    /// Address used to reach the node
    pub address: String,
}

impl Node {
    pub fn new(id: u32, hostname: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            id,
            hostname: hostname.into(),
            address: address.into(),
        }
    }

    pub fn target(&self) -> Target {
        Target::node(&self.address)
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "node-{} ({})", self.id, self.address)
    }
}

/// Environment facts the orchestrator needs beyond its node list
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvironmentInfo {
    pub id: EnvironmentId,
    /// Release version of the environment, e.g. `"7.0"`
    pub release: String,
    /// Service tenant id cached from the identity service
    #[serde(default)]
    pub service_tenant_id: Option<String>,
}

impl EnvironmentInfo {
    /// Major component of the release version
    pub fn major_version(&self) -> Option<u32> {
        self.release.split('.').next()?.trim().parse().ok()
    }
}
