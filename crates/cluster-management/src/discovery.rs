/*
 * SPDX-FileCopyrightText: 2020 Stalwart Labs Ltd <hello@stalw.art>
 *
 * SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-SEL
 */

//! Inventory Module
//!
//! The orchestrator never talks to the deployment API directly; it asks an
//! [`Inventory`] for an environment's controllers and release facts. The
//! stock implementation serves a static list from configuration.

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{
    error::{ClusterError, Result},
    node::{EnvironmentId, EnvironmentInfo, Node},
};

/// Source of environment topology
#[async_trait]
pub trait Inventory: Send + Sync + fmt::Debug {
    /// Controller nodes of an environment, in a stable order
    async fn controllers(&self, env: EnvironmentId) -> Result<Vec<Node>>;

    /// Release and identity facts of an environment
    async fn environment(&self, env: EnvironmentId) -> Result<EnvironmentInfo>;

    /// First controller of an environment
    async fn one_controller(&self, env: EnvironmentId) -> Result<Node> {
        self.controllers(env)
            .await?
            .into_iter()
            .next()
            .ok_or(ClusterError::NoControllers(env))
    }
}

/// One statically configured environment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvironmentConfig {
    pub id: EnvironmentId,
    pub release: String,
    #[serde(default)]
    pub service_tenant_id: Option<String>,
    #[serde(default)]
    pub controllers: Vec<Node>,
}

/// Inventory configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InventoryConfig {
    pub environments: Vec<EnvironmentConfig>,
}

/// Inventory backed by configuration
#[derive(Debug, Clone, Default)]
pub struct StaticInventory {
    environments: Vec<EnvironmentConfig>,
}

impl StaticInventory {
    pub fn new(config: &InventoryConfig) -> Self {
        Self {
            environments: config.environments.clone(),
        }
    }

    fn find(&self, env: EnvironmentId) -> Result<&EnvironmentConfig> {
        self.environments
            .iter()
            .find(|candidate| candidate.id == env)
            .ok_or_else(|| ClusterError::Config(format!("Unknown environment {}", env)))
    }
}

#[async_trait]
impl Inventory for StaticInventory {
    async fn controllers(&self, env: EnvironmentId) -> Result<Vec<Node>> {
        let environment = self.find(env)?;
        debug!(
            "Environment {} has {} controllers",
            env,
            environment.controllers.len()
        );
        Ok(environment.controllers.clone())
    }

    async fn environment(&self, env: EnvironmentId) -> Result<EnvironmentInfo> {
        let environment = self.find(env)?;
        Ok(EnvironmentInfo {
            id: environment.id,
            release: environment.release.clone(),
            service_tenant_id: environment.service_tenant_id.clone(),
        })
    }
}
