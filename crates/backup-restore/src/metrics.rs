/*
 * SPDX-FileCopyrightText: 2020 Stalwart Labs Ltd <hello@stalw.art>
 *
 * SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-SEL
 */

//! Metrics collection for backup and restore operations

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::{backup::BackupReport, restore::RestoreReport};

/// Backup and restore metrics
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BackupMetrics {
    pub backup_stats: BackupStats,
    pub restore_stats: RestoreStats,
}

/// Backup operation statistics
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BackupStats {
    pub total_backups: u64,
    pub total_entries: u64,
    pub average_backup_duration: f64,
    pub entries_per_archivator: HashMap<String, u64>,
}

/// Restore operation statistics
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RestoreStats {
    pub total_restores: u64,
    pub restored_archivators: u64,
    pub skipped_archivators: u64,
    pub average_restore_duration: f64,
}

impl BackupMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a finished backup pass
    pub fn record_backup(&mut self, report: &BackupReport) {
        let stats = &mut self.backup_stats;
        stats.total_backups += 1;
        stats.total_entries += report.entries.len() as u64;

        let total = stats.average_backup_duration * (stats.total_backups - 1) as f64;
        stats.average_backup_duration =
            (total + report.duration.as_secs_f64()) / stats.total_backups as f64;

        for (name, entries) in &report.archivators {
            *stats.entries_per_archivator.entry(name.clone()).or_insert(0) += *entries as u64;
        }

        ::metrics::counter!("backup.passes").increment(1);
        ::metrics::histogram!("backup.duration_seconds").record(report.duration.as_secs_f64());
    }

    /// Record a finished restore pass
    pub fn record_restore(&mut self, report: &RestoreReport) {
        let stats = &mut self.restore_stats;
        stats.total_restores += 1;
        stats.restored_archivators += report.restored.len() as u64;
        stats.skipped_archivators += report.skipped.len() as u64;

        let total = stats.average_restore_duration * (stats.total_restores - 1) as f64;
        stats.average_restore_duration =
            (total + report.duration.as_secs_f64()) / stats.total_restores as f64;

        ::metrics::counter!("restore.passes").increment(1);
        ::metrics::histogram!("restore.duration_seconds").record(report.duration.as_secs_f64());
    }
}

/// One entry appended to an archive
pub(crate) fn record_entry(bytes: u64) {
    ::metrics::counter!("backup.entries").increment(1);
    ::metrics::counter!("backup.entry_bytes").increment(bytes);
}

/// One archivator finished its backup or restore
pub(crate) fn record_archivator(operation: &'static str, name: &str, success: bool) {
    let outcome = if success { "success" } else { "failure" };
    ::metrics::counter!(
        "archivator.runs",
        "operation" => operation,
        "archivator" => name.to_string(),
        "outcome" => outcome
    )
    .increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_backup_average_duration() {
        let mut metrics = BackupMetrics::new();
        metrics.record_backup(&BackupReport {
            entries: vec!["ssh".into(), "puppet/manifests".into()],
            archivators: vec![("ssh".into(), 1), ("puppet".into(), 1)],
            duration: Duration::from_secs(2),
        });
        metrics.record_backup(&BackupReport {
            entries: vec!["ssh".into()],
            archivators: vec![("ssh".into(), 1)],
            duration: Duration::from_secs(4),
        });

        assert_eq!(metrics.backup_stats.total_backups, 2);
        assert_eq!(metrics.backup_stats.total_entries, 3);
        assert!((metrics.backup_stats.average_backup_duration - 3.0).abs() < f64::EPSILON);
        assert_eq!(metrics.backup_stats.entries_per_archivator["ssh"], 2);
    }
}
