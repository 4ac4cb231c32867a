/*
 * SPDX-FileCopyrightText: 2020 Stalwart Labs Ltd <hello@stalw.art>
 *
 * SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-SEL
 */

//! Maintenance Metrics Module
//!
//! Per-operation counters kept by the orchestrator, mirrored to the
//! `metrics` facade.

use std::{collections::BTreeMap, time::Duration};

use serde::{Deserialize, Serialize};

/// Maintenance operation metrics
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MaintenanceMetrics {
    /// Statistics keyed by operation name
    pub operations: BTreeMap<String, OperationStats>,
}

/// Statistics of one orchestrator operation
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OperationStats {
    pub completed: u64,
    pub failed: u64,
    /// Average duration in seconds, over completed and failed runs
    pub average_duration: f64,
}

impl MaintenanceMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one finished operation
    pub fn record(&mut self, operation: &'static str, duration: Duration, success: bool) {
        let stats = self.operations.entry(operation.to_string()).or_default();
        let runs = stats.completed + stats.failed;
        stats.average_duration =
            (stats.average_duration * runs as f64 + duration.as_secs_f64()) / (runs + 1) as f64;
        if success {
            stats.completed += 1;
        } else {
            stats.failed += 1;
        }

        ::metrics::counter!(
            "cluster.operations",
            "operation" => operation,
            "result" => if success { "ok" } else { "error" }
        )
        .increment(1);
        ::metrics::histogram!("cluster.operation_duration_seconds", "operation" => operation)
            .record(duration.as_secs_f64());
    }

    pub fn get(&self, operation: &str) -> Option<&OperationStats> {
        self.operations.get(operation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_averages_all_runs() {
        let mut metrics = MaintenanceMetrics::new();
        metrics.record("disable_apis", Duration::from_secs(2), true);
        metrics.record("disable_apis", Duration::from_secs(4), false);

        let stats = metrics.get("disable_apis").unwrap();
        assert_eq!(stats.completed, 1);
        assert_eq!(stats.failed, 1);
        assert!((stats.average_duration - 3.0).abs() < f64::EPSILON);
        assert!(metrics.get("enable_apis").is_none());
    }
}
