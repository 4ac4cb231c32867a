/*
 * SPDX-FileCopyrightText: 2024 A3Mailer Project
 *
 * SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-SEL
 */

//! Control plane switch commands

use anyhow::Context as _;
use cluster_management::EnvironmentId;

use super::Context;

pub async fn upgrade_control_plane(context: &Context, orig_id: u32, seed_id: u32) -> anyhow::Result<()> {
    context
        .orchestrator()
        .upgrade_control_plane(EnvironmentId(orig_id), EnvironmentId(seed_id))
        .await
        .with_context(|| {
            format!(
                "Switching the control plane from env {} to env {} failed",
                orig_id, seed_id
            )
        })
}

pub async fn update_neutron_config(context: &Context, orig_id: u32, seed_id: u32) -> anyhow::Result<()> {
    context
        .orchestrator()
        .update_neutron_config(EnvironmentId(orig_id), EnvironmentId(seed_id))
        .await
        .with_context(|| format!("Updating neutron configuration of env {} failed", seed_id))
}
