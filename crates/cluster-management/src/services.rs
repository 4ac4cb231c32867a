/*
 * SPDX-FileCopyrightText: 2020 Stalwart Labs Ltd <hello@stalw.art>
 *
 * SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-SEL
 */

//! Upstart services on controller nodes
//!
//! The set of stopped services is persisted on each node so the same set is
//! started again in the same order, even across separate invocations.

use common::{argv, RemoteExecutor};
use regex::Regex;
use tracing::{debug, info};

use crate::{
    config::UpstartConfig,
    error::{ClusterError, Result},
    node::Node,
    remote_fs::RemoteFs,
};

/// Running services matching the configured prefixes, in `initctl list` order
pub fn running_services(initctl_list: &str, prefixes: &[String]) -> Result<Vec<String>> {
    if prefixes.is_empty() {
        return Ok(Vec::new());
    }
    let alternatives = prefixes
        .iter()
        .map(|prefix| regex::escape(prefix))
        .collect::<Vec<_>>()
        .join("|");
    let pattern = Regex::new(&format!(r"(?m)^((?:{})\S*).*start/running", alternatives))
        .map_err(|err| ClusterError::Config(err.to_string()))?;

    Ok(pattern
        .captures_iter(initctl_list)
        .filter_map(|captures| captures.get(1))
        .map(|service| service.as_str().to_string())
        .collect())
}

/// Stops and starts upstart services of one node
#[derive(Debug)]
pub struct UpstartServices<'a> {
    executor: &'a dyn RemoteExecutor,
    config: &'a UpstartConfig,
}

impl<'a> UpstartServices<'a> {
    pub fn new(executor: &'a dyn RemoteExecutor, config: &'a UpstartConfig) -> Self {
        Self { executor, config }
    }

    /// Services to stop: the persisted list if present, otherwise a fresh
    /// discovery that is persisted before anything is stopped
    async fn services_to_stop(&self, node: &Node, fs: &RemoteFs<'_>) -> Result<Vec<String>> {
        let list = &self.config.services_list;
        if fs.exists(list).await? {
            debug!("Reusing {} on {}", list, node);
            return Ok(parse_list(&fs.read(list).await?));
        }

        let initctl = self
            .executor
            .call_output(&node.target(), &argv(["initctl", "list"]))
            .await?;
        let services = running_services(&initctl, &self.config.service_prefixes)?;

        let mut content = String::new();
        for service in &services {
            content.push_str(service);
            content.push('\n');
        }
        fs.write_atomic(list, &content).await?;
        Ok(services)
    }

    pub async fn stop(&self, node: &Node) -> Result<Vec<String>> {
        let target = node.target();
        let fs = RemoteFs::new(self.executor, &target);
        let services = self.services_to_stop(node, &fs).await?;

        info!("Stopping {} services on {}", services.len(), node);
        for service in &services {
            self.executor
                .call(&target, &argv(["stop", service.as_str()]))
                .await?;
        }
        Ok(services)
    }

    /// Start the persisted services, then drop the list
    pub async fn start(&self, node: &Node) -> Result<Vec<String>> {
        let target = node.target();
        let fs = RemoteFs::new(self.executor, &target);
        let list = &self.config.services_list;

        if !fs.exists(list).await? {
            return Err(ClusterError::ServicesListMissing {
                node: node.to_string(),
            });
        }
        let services = parse_list(&fs.read(list).await?);

        info!("Starting {} services on {}", services.len(), node);
        for service in &services {
            self.executor
                .call(&target, &argv(["start", service.as_str()]))
                .await?;
        }

        fs.remove(list).await?;
        Ok(services)
    }
}

fn parse_list(content: &str) -> Vec<String> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeCluster;
    use common::CommandOutput;

    const INITCTL: &str = "\
nova-api start/running, process 1201
nova-scheduler stop/waiting
rsyslog start/running, process 402
neutron-server start/running, process 1422
keystone start/running, process 998
glance-registry start/running, process 1500
";

    fn prefixes() -> Vec<String> {
        UpstartConfig::default().service_prefixes
    }

    #[test]
    fn test_running_services_match_prefixes() {
        assert_eq!(
            running_services(INITCTL, &prefixes()).unwrap(),
            vec!["nova-api", "neutron-server", "keystone", "glance-registry"]
        );
        assert!(running_services(INITCTL, &[]).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_stop_persists_list_once() {
        let cluster = FakeCluster::new();
        let node = Node::new(1, "node-1", "10.20.0.3");
        cluster
            .executor
            .respond(node.target(), &["initctl", "list"], CommandOutput::ok(INITCTL));
        let config = UpstartConfig::default();
        let services = UpstartServices::new(&cluster.executor, &config);

        let stopped = services.stop(&node).await.unwrap();
        assert_eq!(stopped.len(), 4);
        assert_eq!(
            cluster.get("10.20.0.3", "/root/services_list").unwrap(),
            "nova-api\nneutron-server\nkeystone\nglance-registry\n"
        );

        // A second stop reuses the list instead of rediscovering.
        services.stop(&node).await.unwrap();
        assert_eq!(cluster.executor.count(&["initctl"]), 1);
        assert_eq!(cluster.executor.count(&["stop"]), 8);
    }

    #[tokio::test]
    async fn test_start_replays_list_and_removes_it() {
        let cluster = FakeCluster::new();
        cluster.put("10.20.0.3", "/root/services_list", "keystone\nnova-api\n");
        let node = Node::new(1, "node-1", "10.20.0.3");
        let config = UpstartConfig::default();

        let started = UpstartServices::new(&cluster.executor, &config)
            .start(&node)
            .await
            .unwrap();

        assert_eq!(started, vec!["keystone", "nova-api"]);
        assert!(cluster.get("10.20.0.3", "/root/services_list").is_none());
        let commands = cluster.executor.commands();
        let starts: Vec<_> = commands.iter().filter(|c| c.contains(": start ")).collect();
        assert_eq!(
            starts,
            vec!["node 10.20.0.3: start keystone", "node 10.20.0.3: start nova-api"]
        );
    }

    #[tokio::test]
    async fn test_failed_start_keeps_list() {
        let cluster = FakeCluster::new();
        cluster.put("10.20.0.3", "/root/services_list", "keystone\nnova-api\n");
        let node = Node::new(1, "node-1", "10.20.0.3");
        cluster.executor.respond(
            node.target(),
            &["start", "nova-api"],
            CommandOutput::failed(1, "start: Job failed to start"),
        );
        let config = UpstartConfig::default();

        let err = UpstartServices::new(&cluster.executor, &config)
            .start(&node)
            .await
            .unwrap_err();
        assert_eq!(err.stderr(), Some("start: Job failed to start"));
        assert!(cluster.get("10.20.0.3", "/root/services_list").is_some());
    }

    #[tokio::test]
    async fn test_start_without_list_is_fatal() {
        let cluster = FakeCluster::new();
        let node = Node::new(1, "node-1", "10.20.0.3");
        let config = UpstartConfig::default();

        let err = UpstartServices::new(&cluster.executor, &config)
            .start(&node)
            .await
            .unwrap_err();
        assert!(matches!(err, ClusterError::ServicesListMissing { .. }));
        assert_eq!(cluster.executor.count(&["start"]), 0);
    }
}
