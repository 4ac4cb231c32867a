/*
 * SPDX-FileCopyrightText: 2020 Stalwart Labs Ltd <hello@stalw.art>
 *
 * SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-SEL
 */

//! Clustered resource transitions

use std::fmt;

use common::{argv, RemoteExecutor, Target};
use tracing::{debug, info, warn};

use crate::{
    config::{MaintenanceConfig, RetryPolicy},
    error::{ClusterError, Result},
    node::Node,
};

/// Command querying the desired resource configuration
pub fn cib_query() -> Vec<String> {
    argv(["cibadmin", "--query", "--scope", "resources"])
}

/// Command querying the live resource status
pub fn crm_mon_query() -> Vec<String> {
    argv(["crm_mon", "--as-xml"])
}

/// Requested resource transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Stop,
    Start,
}

impl Transition {
    pub fn verb(&self) -> &'static str {
        match self {
            Transition::Stop => "stop",
            Transition::Start => "start",
        }
    }
}

impl fmt::Display for Transition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.verb())
    }
}

/// Ids of the top-level resources in a CIB resources document, minus
/// every id containing one of the `excluded` substrings
pub fn managed_resources(cib: &str, excluded: &[String]) -> Result<Vec<String>> {
    let document = roxmltree::Document::parse(cib)?;
    Ok(document
        .root_element()
        .children()
        .filter(|child| child.is_element())
        .filter_map(|child| child.attribute("id"))
        .filter(|id| !excluded.iter().any(|pattern| id.contains(pattern.as_str())))
        .map(str::to_string)
        .collect())
}

/// Issue `crm resource <verb> <id>` until it succeeds or the policy gives up
pub async fn transition_resource(
    executor: &dyn RemoteExecutor,
    target: &Target,
    resource: &str,
    transition: Transition,
    retry: &RetryPolicy,
) -> Result<()> {
    let command = argv(["crm", "resource", transition.verb(), resource]);
    let mut attempts = 0u32;

    loop {
        match executor.call(target, &command).await {
            Ok(_) => {
                debug!("Resource {} {} requested", resource, transition);
                return Ok(());
            }
            Err(err) if err.is_command_failure() => {
                attempts += 1;
                ::metrics::counter!("cluster.resource_retries", "transition" => transition.verb())
                    .increment(1);
                if !retry.allows(attempts) {
                    return Err(ClusterError::RetryExhausted {
                        resource: resource.to_string(),
                        attempts,
                    });
                }
                warn!(
                    "Failed to {} resource {} (attempt {}): {}",
                    transition, resource, attempts, err
                );
                if !retry.delay().is_zero() {
                    tokio::time::sleep(retry.delay()).await;
                }
            }
            Err(err) => return Err(err.into()),
        }
    }
}

/// Stop or start every managed resource through one controller, then settle
pub async fn transition_all(
    executor: &dyn RemoteExecutor,
    node: &Node,
    config: &MaintenanceConfig,
    transition: Transition,
) -> Result<Vec<String>> {
    let target = node.target();
    let cib = executor.call_output(&target, &cib_query()).await?;
    let resources = managed_resources(&cib, &config.excluded_resources)?;

    info!(
        "Requesting {} of {} resources through {}",
        transition,
        resources.len(),
        node
    );
    for resource in &resources {
        transition_resource(executor, &target, resource, transition, &config.retry).await?;
    }

    let settle = match transition {
        Transition::Stop => config.stop_settle(),
        Transition::Start => config.start_settle(),
    };
    debug!("Waiting {:?} for resources to settle", settle);
    tokio::time::sleep(settle).await;

    Ok(resources)
}
