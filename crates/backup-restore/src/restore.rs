/*
 * SPDX-FileCopyrightText: 2020 Stalwart Labs Ltd <hello@stalw.art>
 *
 * SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-SEL
 */

//! Restore management module

use std::{path::Path, sync::Arc, time::Duration};

use common::RemoteExecutor;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::{
    archivator::{self, Archivator},
    compression::CompressionType,
    config::BackupRestoreConfig,
    error::{RestoreError, Result},
    metrics,
    storage::ArchiveReader,
};

/// Result of a restore pass
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RestoreReport {
    /// Archivators that replayed their entries, in order
    pub restored: Vec<String>,
    /// Archivators without restore support
    pub skipped: Vec<String>,
    pub duration: Duration,
}

/// Replays an archive through the registered archivators
#[derive(Debug)]
pub struct RestoreManager {
    archivators: Vec<Box<dyn Archivator>>,
}

impl RestoreManager {
    pub fn new(archivators: Vec<Box<dyn Archivator>>) -> Self {
        Self { archivators }
    }

    /// Build the configured archivators in registration order
    pub fn from_config(config: &BackupRestoreConfig, executor: Arc<dyn RemoteExecutor>) -> Self {
        Self::new(archivator::build_all(executor, config))
    }

    /// Restore every supporting archivator from the archive at `source`
    pub async fn restore(
        &self,
        source: &Path,
        compression: Option<CompressionType>,
    ) -> Result<RestoreReport> {
        restore_all(&self.archivators, source, compression).await
    }
}

/// Open the archive at `source` and run `restore()` in registration order.
///
/// Archivators without restore support are skipped.
pub async fn restore_all(
    archivators: &[Box<dyn Archivator>],
    source: &Path,
    compression: Option<CompressionType>,
) -> Result<RestoreReport> {
    let start_time = std::time::Instant::now();
    warn!("Starting restore from {}", source.display());

    let archive = ArchiveReader::open(source, compression)?;
    let mut report = RestoreReport::default();

    for archivator in archivators {
        let name = archivator.name();
        if !archivator.supports_restore() {
            debug!("Skipping {}: restore not supported", name);
            report.skipped.push(name);
            continue;
        }

        info!("Restoring {}", name);
        if let Err(err) = archivator.restore(&archive).await {
            error!("Restore of {} failed: {}", name, err);
            metrics::record_archivator("restore", &name, false);
            return Err(RestoreError::Archivator {
                name,
                source: Box::new(err),
            }
            .into());
        }

        metrics::record_archivator("restore", &name, true);
        report.restored.push(name);
    }

    report.duration = start_time.elapsed();
    warn!(
        "Restore completed in {:.2}s: {} restored, {} skipped",
        report.duration.as_secs_f64(),
        report.restored.len(),
        report.skipped.len()
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        archivator::{DatabaseArchivator, DirsArchivator, PathArchivator},
        config::DatabaseConfig,
        error::BackupError,
        storage::{ArchiveTarget, ArchiveWriter},
    };
    use common::testing::ScriptedExecutor;
    use std::fs;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_unsupported_archivators_are_skipped() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("backup.tar");
        let mut archive = ArchiveWriter::open(ArchiveTarget::Path(path.clone()), None).unwrap();
        archive.add_bytes("databases/nailgun.sql", b"SELECT 1;").unwrap();
        archive.add_bytes("ssh/known_hosts", b"node-1 ssh-rsa").unwrap();
        archive.finish().unwrap();

        let executor = ScriptedExecutor::new();
        let restored_ssh = dir.path().join("ssh");
        let manager = RestoreManager::new(vec![
            Box::new(DatabaseArchivator::new(
                "nailgun",
                Arc::new(executor.clone()),
                &DatabaseConfig::default(),
            )),
            Box::new(DirsArchivator::new(dir.path(), "puppet")),
            Box::new(PathArchivator::new(&restored_ssh, "ssh")),
        ]);

        let report = manager.restore(&path, None).await.unwrap();
        assert_eq!(report.restored, vec!["database nailgun", "path ssh"]);
        assert_eq!(report.skipped, vec!["dirs puppet"]);
        assert_eq!(fs::read(restored_ssh.join("known_hosts")).unwrap(), b"node-1 ssh-rsa");
        assert_eq!(executor.count(&["sudo", "-u", "postgres", "psql"]), 1);
    }

    #[tokio::test]
    async fn test_missing_entry_names_the_archivator() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("backup.tar.bz2");
        ArchiveWriter::open(ArchiveTarget::Path(path.clone()), None)
            .unwrap()
            .finish()
            .unwrap();

        let archivators: Vec<Box<dyn Archivator>> = vec![Box::new(DatabaseArchivator::new(
            "keystone",
            Arc::new(ScriptedExecutor::new()),
            &DatabaseConfig::default(),
        ))];
        let err = restore_all(&archivators, &path, None).await.unwrap_err();

        match err {
            BackupError::Archivator { name, source } => {
                assert_eq!(name, "database keystone");
                assert!(matches!(*source, BackupError::EntryNotFound(_)));
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[tokio::test]
    async fn test_missing_archive() {
        let dir = TempDir::new().unwrap();
        let err = restore_all(&[], &dir.path().join("absent.tar"), None)
            .await
            .unwrap_err();
        assert!(matches!(err, BackupError::ArchiveNotFound(_)));
    }
}
