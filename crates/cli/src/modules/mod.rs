/*
 * SPDX-FileCopyrightText: 2024 A3Mailer Project
 *
 * SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-SEL
 */

use std::sync::Arc;

use backup_restore::ArchiveManager;
use cluster_management::{MaintenanceOrchestrator, StaticInventory};
use common::{RemoteExecutor, ShellExecutor};
use upgrade_config::UpgradeConfig;

pub mod backup;
pub mod cli;
pub mod control_plane;
pub mod maintenance;

/// Everything a command needs to run
#[derive(Debug, Clone)]
pub struct Context {
    pub config: UpgradeConfig,
    pub executor: Arc<dyn RemoteExecutor>,
}

impl Context {
    /// Context running commands through local processes and the remote shell
    pub fn new(config: UpgradeConfig) -> Self {
        let executor = Arc::new(ShellExecutor::new(config.remote.clone()));
        Self::with_executor(config, executor)
    }

    pub fn with_executor(config: UpgradeConfig, executor: Arc<dyn RemoteExecutor>) -> Self {
        Self { config, executor }
    }

    pub fn archive_manager(&self) -> ArchiveManager {
        ArchiveManager::new(self.config.archive.clone(), self.executor.clone())
    }

    pub fn orchestrator(&self) -> MaintenanceOrchestrator {
        MaintenanceOrchestrator::new(
            self.executor.clone(),
            Arc::new(StaticInventory::new(&self.config.inventory)),
            self.config.maintenance.clone(),
        )
    }
}
