/*
 * SPDX-FileCopyrightText: 2020 Stalwart Labs Ltd <hello@stalw.art>
 *
 * SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-SEL
 */

//! # Archive Manager
//!
//! This crate captures the state of an admin node into a single portable
//! archive and replays it onto a fresh node:
//!
//! - Database dumps taken inside the database service container
//! - Files copied out of containerized services
//! - Filesystem trees such as SSH keys and puppet manifests
//! - Mirror directories referenced from cluster attributes
//!
//! Archives are tar streams, optionally gzip or bzip2 compressed.

pub mod archivator;
pub mod backup;
pub mod compression;
pub mod config;
pub mod error;
pub mod metrics;
pub mod restore;
pub mod storage;

pub use archivator::{Archivator, ArchivatorSpec};
pub use backup::{backup_all, BackupManager, BackupReport};
pub use compression::{CompressionConfig, CompressionLevel, CompressionType};
pub use config::{BackupRestoreConfig, DatabaseConfig};
pub use error::{BackupError, RestoreError, Result};
pub use restore::{restore_all, RestoreManager, RestoreReport};
pub use storage::{ArchiveReader, ArchiveTarget, ArchiveWriter};

use std::{path::Path, sync::Arc};

use common::RemoteExecutor;
use tokio::sync::RwLock;
use tracing::info;

/// Backup and restore service for one admin node
#[derive(Debug, Clone)]
pub struct ArchiveManager {
    inner: Arc<ArchiveManagerInner>,
}

#[derive(Debug)]
struct ArchiveManagerInner {
    config: BackupRestoreConfig,
    executor: Arc<dyn RemoteExecutor>,
    metrics: RwLock<crate::metrics::BackupMetrics>,
}

impl ArchiveManager {
    pub fn new(config: BackupRestoreConfig, executor: Arc<dyn RemoteExecutor>) -> Self {
        info!(
            "Initializing archive manager with {} archivators",
            config.archivators.len()
        );
        Self {
            inner: Arc::new(ArchiveManagerInner {
                config,
                executor,
                metrics: RwLock::new(crate::metrics::BackupMetrics::new()),
            }),
        }
    }

    pub fn config(&self) -> &BackupRestoreConfig {
        &self.inner.config
    }

    /// Run a full backup pass into `target`
    pub async fn backup(
        &self,
        target: ArchiveTarget,
        compression: Option<CompressionType>,
    ) -> Result<BackupReport> {
        let manager = BackupManager::from_config(&self.inner.config, self.inner.executor.clone());
        let report = manager.backup(target, compression).await?;

        self.inner.metrics.write().await.record_backup(&report);
        Ok(report)
    }

    /// Run a full restore pass from the archive at `source`
    pub async fn restore(
        &self,
        source: &Path,
        compression: Option<CompressionType>,
    ) -> Result<RestoreReport> {
        let manager = RestoreManager::from_config(&self.inner.config, self.inner.executor.clone());
        let report = manager.restore(source, compression).await?;

        self.inner.metrics.write().await.record_restore(&report);
        Ok(report)
    }

    pub async fn get_metrics(&self) -> crate::metrics::BackupMetrics {
        self.inner.metrics.read().await.clone()
    }
}
