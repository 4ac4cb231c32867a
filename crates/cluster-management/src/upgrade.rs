/*
 * SPDX-FileCopyrightText: 2020 Stalwart Labs Ltd <hello@stalw.art>
 *
 * SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-SEL
 */

//! Control plane switch steps
//!
//! Plain sequential commands used while moving the control plane from the
//! original environment to the seed environment.

use std::{fmt, sync::Arc};

use async_trait::async_trait;
use common::{argv, command_line, RemoteExecutor};
use tracing::{debug, info};

use crate::{
    config::NetworkSwitchConfig,
    error::Result,
    node::{EnvironmentId, EnvironmentInfo, Node},
};

/// Moves the environment networks between the original and seed controllers
#[async_trait]
pub trait NetworkSwitch: Send + Sync + fmt::Debug {
    async fn disconnect_networks(&self, env: EnvironmentId, controllers: &[Node]) -> Result<()>;

    async fn delete_overlay_networks(&self, env: EnvironmentId, controllers: &[Node])
        -> Result<()>;

    async fn connect_to_networks(&self, env: EnvironmentId, controllers: &[Node]) -> Result<()>;
}

/// Network switch running configured commands on every controller
#[derive(Debug, Clone)]
pub struct CommandNetworkSwitch {
    executor: Arc<dyn RemoteExecutor>,
    config: NetworkSwitchConfig,
}

impl CommandNetworkSwitch {
    pub fn new(executor: Arc<dyn RemoteExecutor>, config: NetworkSwitchConfig) -> Self {
        Self { executor, config }
    }

    async fn run_all(
        &self,
        step: &str,
        env: EnvironmentId,
        commands: &[Vec<String>],
        controllers: &[Node],
    ) -> Result<()> {
        if commands.is_empty() {
            debug!("No commands configured to {} for env {}", step, env);
            return Ok(());
        }
        for node in controllers {
            for command in commands {
                debug!("{} on {}: {}", step, node, command_line(command));
                self.executor.call(&node.target(), command).await?;
            }
        }
        Ok(())
    }
}

#[async_trait]
impl NetworkSwitch for CommandNetworkSwitch {
    async fn disconnect_networks(&self, env: EnvironmentId, controllers: &[Node]) -> Result<()> {
        self.run_all("disconnect networks", env, &self.config.disconnect, controllers)
            .await
    }

    async fn delete_overlay_networks(
        &self,
        env: EnvironmentId,
        controllers: &[Node],
    ) -> Result<()> {
        self.run_all(
            "delete overlay networks",
            env,
            &self.config.delete_overlay,
            controllers,
        )
        .await
    }

    async fn connect_to_networks(&self, env: EnvironmentId, controllers: &[Node]) -> Result<()> {
        self.run_all("connect networks", env, &self.config.connect, controllers)
            .await
    }
}

/// Stop plain init services on every controller, in the given order
pub async fn stop_services(
    executor: &dyn RemoteExecutor,
    controllers: &[Node],
    services: &[String],
) -> Result<()> {
    for node in controllers {
        info!("Stopping {} on {}", services.join(", "), node);
        for service in services {
            executor
                .call(&node.target(), &argv(["service", service.as_str(), "stop"]))
                .await?;
        }
    }
    Ok(())
}

/// Commands tearing down the cluster stack on a controller
pub fn cluster_stop_commands() -> Vec<Vec<String>> {
    vec![argv(["pcs", "cluster", "kill"])]
}

/// Commands bringing the cluster stack up, depending on the release
pub fn cluster_start_commands(env: &EnvironmentInfo) -> Vec<Vec<String>> {
    match env.major_version() {
        Some(major) if major < 6 => vec![argv(["service", "corosync", "start"])],
        _ => vec![argv(["pcs", "cluster", "start"])],
    }
}

/// `sed` invocation pointing neutron at the service tenant
pub fn neutron_tenant_command(tenant_id: &str) -> Vec<String> {
    let script = format!(r"s/^(nova_admin_tenant_id )=.*/\1 = {}/", tenant_id);
    argv([
        "sed",
        "-re",
        script.as_str(),
        "-i",
        "/etc/neutron/neutron.conf",
    ])
}

pub async fn update_neutron_config(
    executor: &dyn RemoteExecutor,
    controllers: &[Node],
    tenant_id: &str,
) -> Result<()> {
    let command = neutron_tenant_command(tenant_id);
    for node in controllers {
        info!("Updating neutron tenant on {}", node);
        executor.call(&node.target(), &command).await?;
    }
    Ok(())
}
