/*
 * SPDX-FileCopyrightText: 2020 Stalwart Labs Ltd <hello@stalw.art>
 *
 * SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-SEL
 */

//! Waiting for cluster resources to converge

use std::time::Duration;

use common::RemoteExecutor;
use tokio::time::Instant;
use tracing::{debug, info};

use crate::{
    error::{ClusterError, Result},
    node::{EnvironmentId, Node},
    resources::{cib_query, crm_mon_query},
    state::ResourceTopology,
};

/// Poll the live resource status through `node` until it matches the desired
/// configuration. The desired configuration is read once; the live status is
/// re-read every `interval` until `timeout` has elapsed.
pub async fn wait_for_sync(
    executor: &dyn RemoteExecutor,
    node: &Node,
    env: EnvironmentId,
    timeout: Duration,
    interval: Duration,
) -> Result<()> {
    let target = node.target();
    let desired = ResourceTopology::from_cib(&executor.call_output(&target, &cib_query()).await?)?;
    let started = Instant::now();
    let mut checks = 0u64;

    loop {
        let status = executor.call_output(&target, &crm_mon_query()).await?;
        let live = ResourceTopology::from_crm_mon(&status)?;
        checks += 1;

        let differences = live.differences(&desired);
        if differences.is_empty() {
            info!(
                "Cluster resources of env {} synced after {} checks",
                env, checks
            );
            ::metrics::histogram!("cluster.sync_wait_seconds")
                .record(started.elapsed().as_secs_f64());
            return Ok(());
        }

        if started.elapsed() >= timeout {
            ::metrics::counter!("cluster.sync_timeouts").increment(1);
            return Err(ClusterError::SyncTimeout { env });
        }

        debug!(
            "Env {} not synced yet ({} differences, first: {})",
            env,
            differences.len(),
            differences[0]
        );
        tokio::time::sleep(interval).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::tests::{crm_mon, CIB};
    use common::{testing::ScriptedExecutor, CommandOutput};

    fn controller() -> Node {
        Node::new(1, "node-1", "10.20.0.3")
    }

    #[tokio::test]
    async fn test_zero_timeout_fails_immediately() {
        let executor = ScriptedExecutor::new();
        let node = controller();
        executor.respond(node.target(), &["cibadmin"], CommandOutput::ok(CIB));
        executor.respond(
            node.target(),
            &["crm_mon"],
            CommandOutput::ok(crm_mon("Stopped", &[])),
        );

        let err = wait_for_sync(
            &executor,
            &node,
            EnvironmentId(7),
            Duration::ZERO,
            Duration::from_secs(20),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, ClusterError::SyncTimeout { env } if env == EnvironmentId(7)));
        assert!(err.to_string().contains("env 7"));
        assert_eq!(executor.count(&["crm_mon"]), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_polls_until_converged() {
        let executor = ScriptedExecutor::new();
        let node = controller();
        executor.respond(node.target(), &["cibadmin"], CommandOutput::ok(CIB));
        executor.respond_once(
            node.target(),
            &["crm_mon"],
            CommandOutput::ok(crm_mon("Starting", &["Stopped"])),
        );
        executor.respond_once(
            node.target(),
            &["crm_mon"],
            CommandOutput::ok(crm_mon("Stopped", &["Stopped"])),
        );
        executor.respond(
            node.target(),
            &["crm_mon"],
            CommandOutput::ok(crm_mon("Started", &["Stopped"])),
        );

        let started = Instant::now();
        wait_for_sync(
            &executor,
            &node,
            EnvironmentId(1),
            Duration::from_secs(720),
            Duration::from_secs(20),
        )
        .await
        .unwrap();

        assert_eq!(executor.count(&["crm_mon"]), 3);
        assert_eq!(executor.count(&["cibadmin"]), 1);
        assert!(started.elapsed() >= Duration::from_secs(40));
    }

    #[tokio::test(start_paused = true)]
    async fn test_times_out_when_never_converged() {
        let executor = ScriptedExecutor::new();
        let node = controller();
        executor.respond(node.target(), &["cibadmin"], CommandOutput::ok(CIB));
        executor.respond(
            node.target(),
            &["crm_mon"],
            CommandOutput::ok(crm_mon("Stopped", &[])),
        );

        let err = wait_for_sync(
            &executor,
            &node,
            EnvironmentId(2),
            Duration::from_secs(60),
            Duration::from_secs(20),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, ClusterError::SyncTimeout { .. }));
        assert_eq!(executor.count(&["crm_mon"]), 4);
    }
}
