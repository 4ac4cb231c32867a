/*
 * SPDX-FileCopyrightText: 2020 Stalwart Labs Ltd <hello@stalw.art>
 *
 * SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-SEL
 */

//! Backup management module

use std::{sync::Arc, time::Duration};

use common::RemoteExecutor;
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::{
    archivator::{self, Archivator},
    compression::{CompressionLevel, CompressionType},
    config::BackupRestoreConfig,
    error::Result,
    metrics,
    storage::{ArchiveTarget, ArchiveWriter},
};

/// Result of a backup pass
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupReport {
    /// Entry names in archive order
    pub entries: Vec<String>,
    /// Archivator names with the number of entries each produced
    pub archivators: Vec<(String, usize)>,
    pub duration: Duration,
}

/// Runs archivators against one archive sink
#[derive(Debug)]
pub struct BackupManager {
    archivators: Vec<Box<dyn Archivator>>,
    level: CompressionLevel,
}

impl BackupManager {
    pub fn new(archivators: Vec<Box<dyn Archivator>>) -> Self {
        Self {
            archivators,
            level: CompressionLevel::Balanced,
        }
    }

    /// Build the configured archivators in registration order
    pub fn from_config(config: &BackupRestoreConfig, executor: Arc<dyn RemoteExecutor>) -> Self {
        Self {
            archivators: archivator::build_all(executor, config),
            level: config.compression.level,
        }
    }

    pub fn archivators(&self) -> &[Box<dyn Archivator>] {
        &self.archivators
    }

    /// Run every archivator in order into a single archive
    pub async fn backup(
        &self,
        target: ArchiveTarget,
        compression: Option<CompressionType>,
    ) -> Result<BackupReport> {
        let archive = ArchiveWriter::open_with_level(target, compression, self.level)?;
        backup_into(&self.archivators, archive).await
    }
}

/// Open `target`, run `archivators` in order and finish the archive
pub async fn backup_all(
    archivators: &[Box<dyn Archivator>],
    target: ArchiveTarget,
    compression: Option<CompressionType>,
) -> Result<BackupReport> {
    let archive = ArchiveWriter::open(target, compression)?;
    backup_into(archivators, archive).await
}

async fn backup_into(
    archivators: &[Box<dyn Archivator>],
    mut archive: ArchiveWriter,
) -> Result<BackupReport> {
    let start_time = std::time::Instant::now();
    info!("Starting backup with {} archivators", archivators.len());

    let mut produced = Vec::with_capacity(archivators.len());
    for archivator in archivators {
        let name = archivator.name();
        let before = archive.entry_names().len();

        if let Err(err) = archivator.backup(&mut archive).await {
            error!("Backup of {} failed: {}", name, err);
            metrics::record_archivator("backup", &name, false);
            // Dropping the writer closes the archive.
            drop(archive);
            return Err(err.in_archivator(name));
        }

        metrics::record_archivator("backup", &name, true);
        produced.push((name, archive.entry_names().len() - before));
    }

    let entries = archive.finish()?;
    let duration = start_time.elapsed();
    info!(
        "Backup completed in {:.2}s with {} entries",
        duration.as_secs_f64(),
        entries.len()
    );

    Ok(BackupReport {
        entries,
        archivators: produced,
        duration,
    })
}
