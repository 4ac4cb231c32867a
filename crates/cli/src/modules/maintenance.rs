/*
 * SPDX-FileCopyrightText: 2024 A3Mailer Project
 *
 * SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-SEL
 */

//! Controller maintenance commands

use anyhow::Context as _;
use cluster_management::EnvironmentId;
use tracing::info;

use super::{cli::MaintenanceCommands, Context};

impl MaintenanceCommands {
    pub fn env_id(&self) -> EnvironmentId {
        match self {
            MaintenanceCommands::DisableApis { env_id }
            | MaintenanceCommands::EnableApis { env_id }
            | MaintenanceCommands::StopServices { env_id }
            | MaintenanceCommands::StartServices { env_id }
            | MaintenanceCommands::WaitSync { env_id }
            | MaintenanceCommands::StopCluster { env_id }
            | MaintenanceCommands::StartCluster { env_id } => EnvironmentId(*env_id),
        }
    }

    pub async fn exec(self, context: &Context) -> anyhow::Result<()> {
        let env = self.env_id();
        let orchestrator = context.orchestrator();

        match self {
            MaintenanceCommands::DisableApis { .. } => orchestrator
                .disable_apis(env)
                .await
                .with_context(|| format!("Disabling APIs of env {} failed", env))?,
            MaintenanceCommands::EnableApis { .. } => orchestrator
                .enable_apis(env)
                .await
                .with_context(|| format!("Enabling APIs of env {} failed", env))?,
            MaintenanceCommands::StopServices { .. } => {
                let stopped = orchestrator
                    .stop_corosync_services(env)
                    .await
                    .with_context(|| format!("Stopping cluster resources of env {} failed", env))?;
                info!("Stopped {} cluster resources", stopped.len());
                orchestrator
                    .stop_upstart_services(env)
                    .await
                    .with_context(|| format!("Stopping services of env {} failed", env))?;
            }
            MaintenanceCommands::StartServices { .. } => {
                let started = orchestrator
                    .start_corosync_services(env)
                    .await
                    .with_context(|| format!("Starting cluster resources of env {} failed", env))?;
                info!("Started {} cluster resources", started.len());
                orchestrator
                    .start_upstart_services(env)
                    .await
                    .with_context(|| format!("Starting services of env {} failed", env))?;
            }
            MaintenanceCommands::WaitSync { .. } => orchestrator
                .wait_for_corosync_services_sync(env)
                .await
                .with_context(|| format!("Waiting for env {} failed", env))?,
            MaintenanceCommands::StopCluster { .. } => orchestrator
                .stop_cluster(env)
                .await
                .with_context(|| format!("Stopping the cluster of env {} failed", env))?,
            MaintenanceCommands::StartCluster { .. } => orchestrator
                .start_cluster(env)
                .await
                .with_context(|| format!("Starting the cluster of env {} failed", env))?,
        }

        info!("Maintenance step finished for env {}", env);
        Ok(())
    }
}
