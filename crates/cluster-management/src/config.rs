/*
 * SPDX-FileCopyrightText: 2020 Stalwart Labs Ltd <hello@stalw.art>
 *
 * SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-SEL
 */

//! Maintenance configuration
//!
//! Every constant the orchestrator relies on lives here with its stock value.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Cluster maintenance configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MaintenanceConfig {
    /// Resources never stopped or started, matched as substrings of the id
    pub excluded_resources: Vec<String>,
    /// Pause after stopping clustered resources
    pub stop_settle_secs: u64,
    /// Pause after starting clustered resources
    pub start_settle_secs: u64,
    /// Upper bound for the convergence wait
    pub sync_timeout_secs: u64,
    /// Delay between convergence polls
    pub sync_check_interval_secs: u64,
    pub retry: RetryPolicy,
    pub haproxy: HaproxyConfig,
    pub upstart: UpstartConfig,
    /// Services stopped on the original environment when the control plane moves
    pub cluster_services: Vec<String>,
    pub network: NetworkSwitchConfig,
}

/// How often a failed resource transition is retried
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// `None` retries until the transition succeeds
    pub max_attempts: Option<u32>,
    pub delay_secs: u64,
}

/// Load balancer layout on controller nodes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HaproxyConfig {
    /// Main configuration file
    pub main_config: String,
    /// Directory holding one fragment per backend
    pub fragments_dir: String,
    /// Line whose presence marks a node as in maintenance
    pub maintenance_line: String,
    /// Routing rule appended to every fragment
    pub use_backend_line: String,
    pub stats_socket: String,
    /// Cluster resource restarted after the configuration changed
    pub resource: String,
}

/// Upstart service discovery and persistence
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UpstartConfig {
    pub services_list: String,
    /// Name prefixes of the services stopped during maintenance
    pub service_prefixes: Vec<String>,
}

/// Commands run on every controller to move networks between environments
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkSwitchConfig {
    pub disconnect: Vec<Vec<String>>,
    pub delete_overlay: Vec<Vec<String>>,
    pub connect: Vec<Vec<String>>,
}

impl Default for MaintenanceConfig {
    fn default() -> Self {
        Self {
            excluded_resources: [
                "p_mysql",
                "p_haproxy",
                "p_dns",
                "p_ntp",
                "vip",
                "p_conntrackd",
                "p_rabbitmq-server",
                "clone_p_vrouter",
            ]
            .iter()
            .map(|name| name.to_string())
            .collect(),
            stop_settle_secs: 60,
            start_settle_secs: 180,
            sync_timeout_secs: 720,
            sync_check_interval_secs: 20,
            retry: RetryPolicy::default(),
            haproxy: HaproxyConfig::default(),
            upstart: UpstartConfig::default(),
            cluster_services: vec![
                "neutron-server".to_string(),
                "nova-api".to_string(),
                "keystone".to_string(),
            ],
            network: NetworkSwitchConfig::default(),
        }
    }
}

impl MaintenanceConfig {
    pub fn stop_settle(&self) -> Duration {
        Duration::from_secs(self.stop_settle_secs)
    }

    pub fn start_settle(&self) -> Duration {
        Duration::from_secs(self.start_settle_secs)
    }

    pub fn sync_timeout(&self) -> Duration {
        Duration::from_secs(self.sync_timeout_secs)
    }

    pub fn sync_check_interval(&self) -> Duration {
        Duration::from_secs(self.sync_check_interval_secs)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: None,
            delay_secs: 0,
        }
    }
}

impl RetryPolicy {
    pub fn bounded(max_attempts: u32) -> Self {
        Self {
            max_attempts: Some(max_attempts),
            ..Self::default()
        }
    }

    pub fn delay(&self) -> Duration {
        Duration::from_secs(self.delay_secs)
    }

    /// Whether another attempt is allowed after `attempts` failures
    pub fn allows(&self, attempts: u32) -> bool {
        self.max_attempts.map_or(true, |max| attempts < max)
    }
}

impl Default for HaproxyConfig {
    fn default() -> Self {
        Self {
            main_config: "/etc/haproxy/haproxy.cfg".to_string(),
            fragments_dir: "/etc/haproxy/conf.d".to_string(),
            maintenance_line: "backend maintenance".to_string(),
            use_backend_line: "  use_backend maintenance if TRUE".to_string(),
            stats_socket: "/var/lib/haproxy/stats".to_string(),
            resource: "p_haproxy".to_string(),
        }
    }
}

impl Default for UpstartConfig {
    fn default() -> Self {
        Self {
            services_list: "/root/services_list".to_string(),
            service_prefixes: ["nova", "keystone", "heat", "neutron", "cinder", "glance"]
                .iter()
                .map(|prefix| prefix.to_string())
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_policy_bounds() {
        let unbounded = RetryPolicy::default();
        assert!(unbounded.allows(u32::MAX - 1));

        let bounded = RetryPolicy::bounded(3);
        assert!(bounded.allows(2));
        assert!(!bounded.allows(3));
    }

    #[test]
    fn test_stock_intervals() {
        let config = MaintenanceConfig::default();
        assert_eq!(config.stop_settle(), Duration::from_secs(60));
        assert_eq!(config.start_settle(), Duration::from_secs(180));
        assert_eq!(config.sync_timeout(), Duration::from_secs(720));
        assert_eq!(config.sync_check_interval(), Duration::from_secs(20));
    }
}
