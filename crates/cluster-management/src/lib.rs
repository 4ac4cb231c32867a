/*
 * SPDX-FileCopyrightText: 2020 Stalwart Labs Ltd <hello@stalw.art>
 *
 * SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-SEL
 */

//! # Cluster Management
//!
//! Maintenance orchestration for the controllers of a pacemaker/corosync
//! managed control plane:
//!
//! - Load balancer maintenance mode (disable and enable APIs)
//! - Stopping and starting HA-managed resources with a retry policy
//! - Stopping and starting upstart services with a persisted service list
//! - Waiting for the resource manager to converge
//! - Switching the control plane between two environments

pub mod config;
pub mod discovery;
pub mod error;
pub mod maintenance_mode;
pub mod metrics;
pub mod node;
pub mod remote_fs;
pub mod resources;
pub mod services;
pub mod state;
pub mod sync;
pub mod upgrade;

#[cfg(test)]
mod testing;

pub use crate::metrics::{MaintenanceMetrics, OperationStats};
pub use config::{
    HaproxyConfig, MaintenanceConfig, NetworkSwitchConfig, RetryPolicy, UpstartConfig,
};
pub use discovery::{EnvironmentConfig, Inventory, InventoryConfig, StaticInventory};
pub use error::{ClusterError, Result};
pub use maintenance_mode::{MaintenanceMode, MaintenanceRewriter};
pub use node::{EnvironmentId, EnvironmentInfo, Node};
pub use resources::Transition;
pub use state::{is_resources_synced, ResourceState, ResourceTopology};
pub use upgrade::{CommandNetworkSwitch, NetworkSwitch};

use std::{future::Future, sync::Arc, time::Instant};

use common::{command_line, RemoteExecutor};
use parking_lot::RwLock;
use tracing::{error, info};

/// Main maintenance orchestration service
#[derive(Debug, Clone)]
pub struct MaintenanceOrchestrator {
    inner: Arc<MaintenanceOrchestratorInner>,
}

#[derive(Debug)]
struct MaintenanceOrchestratorInner {
    config: MaintenanceConfig,
    executor: Arc<dyn RemoteExecutor>,
    inventory: Arc<dyn Inventory>,
    network: Arc<dyn NetworkSwitch>,
    metrics: RwLock<MaintenanceMetrics>,
}

impl MaintenanceOrchestrator {
    /// Create an orchestrator switching networks with the configured commands
    pub fn new(
        executor: Arc<dyn RemoteExecutor>,
        inventory: Arc<dyn Inventory>,
        config: MaintenanceConfig,
    ) -> Self {
        let network = Arc::new(CommandNetworkSwitch::new(
            executor.clone(),
            config.network.clone(),
        ));
        Self::with_network_switch(executor, inventory, network, config)
    }

    pub fn with_network_switch(
        executor: Arc<dyn RemoteExecutor>,
        inventory: Arc<dyn Inventory>,
        network: Arc<dyn NetworkSwitch>,
        config: MaintenanceConfig,
    ) -> Self {
        info!("Initializing maintenance orchestrator");
        Self {
            inner: Arc::new(MaintenanceOrchestratorInner {
                config,
                executor,
                inventory,
                network,
                metrics: RwLock::new(MaintenanceMetrics::new()),
            }),
        }
    }

    pub fn config(&self) -> &MaintenanceConfig {
        &self.inner.config
    }

    /// Get a snapshot of the operation metrics
    pub fn get_metrics(&self) -> MaintenanceMetrics {
        self.inner.metrics.read().clone()
    }

    fn executor(&self) -> &dyn RemoteExecutor {
        self.inner.executor.as_ref()
    }

    async fn tracked<T, F>(&self, operation: &'static str, env: EnvironmentId, future: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        let started = Instant::now();
        let result = future.await;
        self.inner
            .metrics
            .write()
            .record(operation, started.elapsed(), result.is_ok());
        if let Err(err) = &result {
            error!("{} failed for env {}: {}", operation, env, err);
        }
        result
    }

    /// Put every controller of `env` into maintenance mode
    pub async fn disable_apis(&self, env: EnvironmentId) -> Result<()> {
        self.tracked("disable_apis", env, async {
            let mode = MaintenanceMode::new(self.executor(), &self.inner.config.haproxy)?;
            for node in self.inner.inventory.controllers(env).await? {
                mode.disable_apis(&node).await?;
            }
            Ok(())
        })
        .await
    }

    /// Take every controller of `env` out of maintenance mode
    pub async fn enable_apis(&self, env: EnvironmentId) -> Result<()> {
        self.tracked("enable_apis", env, async {
            let mode = MaintenanceMode::new(self.executor(), &self.inner.config.haproxy)?;
            for node in self.inner.inventory.controllers(env).await? {
                mode.enable_apis(&node).await?;
            }
            Ok(())
        })
        .await
    }

    pub async fn stop_corosync_services(&self, env: EnvironmentId) -> Result<Vec<String>> {
        self.tracked("stop_corosync_services", env, async {
            let node = self.inner.inventory.one_controller(env).await?;
            resources::transition_all(self.executor(), &node, &self.inner.config, Transition::Stop)
                .await
        })
        .await
    }

    pub async fn start_corosync_services(&self, env: EnvironmentId) -> Result<Vec<String>> {
        self.tracked("start_corosync_services", env, async {
            let node = self.inner.inventory.one_controller(env).await?;
            resources::transition_all(self.executor(), &node, &self.inner.config, Transition::Start)
                .await
        })
        .await
    }

    pub async fn stop_upstart_services(&self, env: EnvironmentId) -> Result<()> {
        self.tracked("stop_upstart_services", env, async {
            let services = services::UpstartServices::new(self.executor(), &self.inner.config.upstart);
            for node in self.inner.inventory.controllers(env).await? {
                services.stop(&node).await?;
            }
            Ok(())
        })
        .await
    }

    pub async fn start_upstart_services(&self, env: EnvironmentId) -> Result<()> {
        self.tracked("start_upstart_services", env, async {
            let services = services::UpstartServices::new(self.executor(), &self.inner.config.upstart);
            for node in self.inner.inventory.controllers(env).await? {
                services.start(&node).await?;
            }
            Ok(())
        })
        .await
    }

    /// Wait until the live resource status of `env` matches its configuration
    pub async fn wait_for_corosync_services_sync(&self, env: EnvironmentId) -> Result<()> {
        self.tracked("wait_for_corosync_services_sync", env, async {
            let node = self.inner.inventory.one_controller(env).await?;
            sync::wait_for_sync(
                self.executor(),
                &node,
                env,
                self.inner.config.sync_timeout(),
                self.inner.config.sync_check_interval(),
            )
            .await
        })
        .await
    }

    /// Stop plain init services on every controller of `env`
    pub async fn stop_services(&self, services: &[String], env: EnvironmentId) -> Result<()> {
        self.tracked("stop_services", env, async {
            let controllers = self.inner.inventory.controllers(env).await?;
            upgrade::stop_services(self.executor(), &controllers, services).await
        })
        .await
    }

    /// Tear down the cluster stack on every controller of `env`
    pub async fn stop_cluster(&self, env: EnvironmentId) -> Result<()> {
        self.tracked("stop_cluster", env, async {
            self.run_on_controllers(env, &upgrade::cluster_stop_commands())
                .await
        })
        .await
    }

    /// Bring the cluster stack up on every controller of `env`
    pub async fn start_cluster(&self, env: EnvironmentId) -> Result<()> {
        self.tracked("start_cluster", env, async {
            let info = self.inner.inventory.environment(env).await?;
            self.run_on_controllers(env, &upgrade::cluster_start_commands(&info))
                .await
        })
        .await
    }

    async fn run_on_controllers(&self, env: EnvironmentId, commands: &[Vec<String>]) -> Result<()> {
        for node in self.inner.inventory.controllers(env).await? {
            for command in commands {
                info!("Running {} on {}", command_line(command), node);
                self.executor().call(&node.target(), command).await?;
            }
        }
        Ok(())
    }

    /// Point neutron on the seed controllers at the original service tenant
    pub async fn update_neutron_config(&self, orig: EnvironmentId, seed: EnvironmentId) -> Result<()> {
        self.tracked("update_neutron_config", seed, async {
            let tenant_id = self
                .inner
                .inventory
                .environment(orig)
                .await?
                .service_tenant_id
                .ok_or_else(|| {
                    ClusterError::Config(format!("Environment {} has no service tenant id", orig))
                })?;
            let controllers = self.inner.inventory.controllers(seed).await?;
            upgrade::update_neutron_config(self.executor(), &controllers, &tenant_id).await
        })
        .await
    }

    /// Move the control plane from `orig` to `seed`
    pub async fn upgrade_control_plane(&self, orig: EnvironmentId, seed: EnvironmentId) -> Result<()> {
        self.tracked("upgrade_control_plane", seed, async {
            info!("Switching control plane from env {} to env {}", orig, seed);

            let seed_node = self.inner.inventory.one_controller(seed).await?;
            resources::transition_all(
                self.executor(),
                &seed_node,
                &self.inner.config,
                Transition::Start,
            )
            .await?;

            let services = services::UpstartServices::new(self.executor(), &self.inner.config.upstart);
            let seed_controllers = self.inner.inventory.controllers(seed).await?;
            for node in &seed_controllers {
                services.start(node).await?;
            }

            let orig_controllers = self.inner.inventory.controllers(orig).await?;
            upgrade::stop_services(
                self.executor(),
                &orig_controllers,
                &self.inner.config.cluster_services,
            )
            .await?;

            let network = &self.inner.network;
            network.disconnect_networks(orig, &orig_controllers).await?;
            network.delete_overlay_networks(seed, &seed_controllers).await?;
            network.connect_to_networks(seed, &seed_controllers).await?;

            info!("Control plane switched to env {}", seed);
            Ok(())
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{state::tests::CIB, testing::FakeCluster};
    use common::CommandOutput;

    const SEED_ADDRESS: &str = "10.20.1.3";

    fn inventory() -> Arc<dyn Inventory> {
        Arc::new(StaticInventory::new(&InventoryConfig {
            environments: vec![
                EnvironmentConfig {
                    id: EnvironmentId(1),
                    release: "6.1".into(),
                    service_tenant_id: Some("4f1d2a".into()),
                    controllers: vec![
                        Node::new(1, "node-1", "10.20.0.3"),
                        Node::new(2, "node-2", "10.20.0.4"),
                    ],
                },
                EnvironmentConfig {
                    id: EnvironmentId(2),
                    release: "7.0".into(),
                    service_tenant_id: None,
                    controllers: vec![Node::new(7, "node-7", SEED_ADDRESS)],
                },
            ],
        }))
    }

    fn orchestrator(cluster: &FakeCluster, config: MaintenanceConfig) -> MaintenanceOrchestrator {
        MaintenanceOrchestrator::new(Arc::new(cluster.executor.clone()), inventory(), config)
    }

    #[tokio::test(start_paused = true)]
    async fn test_upgrade_control_plane_order() {
        let cluster = FakeCluster::new();
        cluster
            .executor
            .respond(common::Target::node(SEED_ADDRESS), &["cibadmin"], CommandOutput::ok(CIB));
        cluster.put(SEED_ADDRESS, "/root/services_list", "nova-api\n");

        let mut config = MaintenanceConfig::default();
        config.cluster_services = vec!["keystone".into()];
        config.network.connect = vec![common::argv(["ifup", "br-mgmt"])];
        let orchestrator = orchestrator(&cluster, config);

        orchestrator
            .upgrade_control_plane(EnvironmentId(1), EnvironmentId(2))
            .await
            .unwrap();

        let commands: Vec<String> = cluster
            .executor
            .commands()
            .into_iter()
            .filter(|c| !c.contains("test -e") && !c.contains(": cat ") && !c.contains("rm -f"))
            .collect();
        assert_eq!(
            commands,
            vec![
                "node 10.20.1.3: cibadmin --query --scope resources",
                "node 10.20.1.3: crm resource start p_heat-engine",
                "node 10.20.1.3: crm resource start clone_p_neutron-l3-agent",
                "node 10.20.1.3: start nova-api",
                "node 10.20.0.3: service keystone stop",
                "node 10.20.0.4: service keystone stop",
                "node 10.20.1.3: ifup br-mgmt",
            ]
        );
        assert_eq!(
            orchestrator
                .get_metrics()
                .get("upgrade_control_plane")
                .map(|stats| stats.completed),
            Some(1)
        );
    }

    #[tokio::test]
    async fn test_apis_round_trip_on_every_controller() {
        let cluster = FakeCluster::new();
        let main = "global\n  stats socket /var/lib/haproxy/stats\n";
        let fragment = "listen keystone-1\n  mode tcp\n  server node-1 10.20.0.3:5000\n";
        for node in ["10.20.0.3", "10.20.0.4"] {
            cluster.put(node, "/etc/haproxy/haproxy.cfg", main);
            cluster.put(node, "/etc/haproxy/conf.d/030-keystone-1.cfg", fragment);
        }
        let orchestrator = orchestrator(&cluster, MaintenanceConfig::default());

        orchestrator.disable_apis(EnvironmentId(1)).await.unwrap();
        for node in ["10.20.0.3", "10.20.0.4"] {
            assert_ne!(cluster.get(node, "/etc/haproxy/haproxy.cfg").unwrap(), main);
        }
        assert_eq!(cluster.executor.count(&["crm", "resource", "restart"]), 2);

        orchestrator.enable_apis(EnvironmentId(1)).await.unwrap();
        for node in ["10.20.0.3", "10.20.0.4"] {
            assert_eq!(cluster.get(node, "/etc/haproxy/haproxy.cfg").unwrap(), main);
            assert_eq!(
                cluster
                    .get(node, "/etc/haproxy/conf.d/030-keystone-1.cfg")
                    .unwrap(),
                fragment
            );
        }
    }

    #[tokio::test]
    async fn test_upstart_stop_and_start_every_controller() {
        let cluster = FakeCluster::new();
        cluster.executor.respond_anywhere(
            &["initctl", "list"],
            CommandOutput::ok("keystone start/running, process 998\n"),
        );
        let orchestrator = orchestrator(&cluster, MaintenanceConfig::default());

        orchestrator.stop_upstart_services(EnvironmentId(1)).await.unwrap();
        assert_eq!(cluster.executor.count(&["stop", "keystone"]), 2);

        orchestrator.start_upstart_services(EnvironmentId(1)).await.unwrap();
        assert_eq!(cluster.executor.count(&["start", "keystone"]), 2);
        assert!(cluster.get("10.20.0.4", "/root/services_list").is_none());

        let err = orchestrator
            .start_upstart_services(EnvironmentId(1))
            .await
            .unwrap_err();
        assert!(matches!(err, ClusterError::ServicesListMissing { .. }));
        assert_eq!(
            orchestrator
                .get_metrics()
                .get("start_upstart_services")
                .map(|stats| (stats.completed, stats.failed)),
            Some((1, 1))
        );
    }

    #[tokio::test]
    async fn test_sync_timeout_names_environment() {
        let cluster = FakeCluster::new();
        cluster.executor.respond_anywhere(&["cibadmin"], CommandOutput::ok(CIB));
        cluster.executor.respond_anywhere(
            &["crm_mon"],
            CommandOutput::ok("<crm_mon><resources/></crm_mon>"),
        );
        let mut config = MaintenanceConfig::default();
        config.sync_timeout_secs = 0;

        let err = orchestrator(&cluster, config)
            .wait_for_corosync_services_sync(EnvironmentId(2))
            .await
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Timeout waiting for corosync cluster for env 2 to be synced"
        );
    }

    #[tokio::test]
    async fn test_cluster_commands_and_neutron_tenant() {
        let cluster = FakeCluster::new();
        let orchestrator = orchestrator(&cluster, MaintenanceConfig::default());

        orchestrator.stop_cluster(EnvironmentId(2)).await.unwrap();
        orchestrator.start_cluster(EnvironmentId(1)).await.unwrap();
        orchestrator
            .update_neutron_config(EnvironmentId(1), EnvironmentId(2))
            .await
            .unwrap();

        let commands = cluster.executor.commands();
        assert_eq!(commands[0], "node 10.20.1.3: pcs cluster kill");
        assert_eq!(commands[1], "node 10.20.0.3: pcs cluster start");
        assert_eq!(commands[2], "node 10.20.0.4: pcs cluster start");
        assert!(commands[3].starts_with("node 10.20.1.3: sed -re"));
        assert!(commands[3].contains("= 4f1d2a/"));

        let err = orchestrator
            .update_neutron_config(EnvironmentId(2), EnvironmentId(1))
            .await
            .unwrap_err();
        assert!(matches!(err, ClusterError::Config(_)));
    }
}
