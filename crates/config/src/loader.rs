/*
 * SPDX-FileCopyrightText: 2024 A3Mailer Project
 *
 * SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-SEL
 */

//! Configuration Loader
//!
//! Reads the TOML file and applies `UPGRADE_*` environment overrides on top
//! of it.

use std::{path::Path, str::FromStr};

use tracing::{debug, info};

use crate::{ConfigError, Result, UpgradeConfig};

/// Load configuration from a TOML file
pub async fn load_from_file(path: &Path) -> Result<UpgradeConfig> {
    info!("Loading configuration from file: {}", path.display());

    if !tokio::fs::try_exists(path).await? {
        return Err(ConfigError::FileNotFound(path.display().to_string()));
    }

    let content = tokio::fs::read_to_string(path).await?;
    let config = parse(&content)?;

    debug!(
        "Loaded {} archivators and {} environments from {}",
        config.archive.archivators.len(),
        config.inventory.environments.len(),
        path.display()
    );
    Ok(config)
}

/// Parse configuration from TOML text
pub fn parse(content: &str) -> Result<UpgradeConfig> {
    Ok(toml::from_str(content)?)
}

/// Apply overrides from the process environment
pub fn apply_environment(config: &mut UpgradeConfig) -> Result<()> {
    apply_overrides(config, |name| std::env::var(name).ok())
}

/// Apply overrides looked up through `lookup`
pub fn apply_overrides<F>(config: &mut UpgradeConfig, lookup: F) -> Result<()>
where
    F: Fn(&str) -> Option<String>,
{
    // Remote transport
    if let Some(value) = lookup("UPGRADE_SSH_BINARY") {
        config.remote.ssh_binary = value;
    }
    if let Some(value) = lookup("UPGRADE_SSH_USER") {
        config.remote.ssh_user = value;
    }
    if let Some(value) = lookup("UPGRADE_SSH_OPTIONS") {
        config.remote.ssh_options = value.split_whitespace().map(str::to_string).collect();
    }

    // Archive
    if let Some(value) = lookup("UPGRADE_ADMIN_ADDRESS") {
        config.archive.admin_address = value;
    }
    if let Some(value) = lookup("UPGRADE_WWW_ROOT") {
        config.archive.www_root = value.into();
    }
    if let Some(value) = lookup("UPGRADE_DB_CONTAINER") {
        config.archive.database.container = value;
    }

    // Maintenance
    if let Some(value) = lookup("UPGRADE_SYNC_TIMEOUT") {
        config.maintenance.sync_timeout_secs = parse_value("UPGRADE_SYNC_TIMEOUT", &value)?;
    }
    if let Some(value) = lookup("UPGRADE_SYNC_CHECK_INTERVAL") {
        config.maintenance.sync_check_interval_secs =
            parse_value("UPGRADE_SYNC_CHECK_INTERVAL", &value)?;
    }
    if let Some(value) = lookup("UPGRADE_RETRY_MAX_ATTEMPTS") {
        config.maintenance.retry.max_attempts = match value.as_str() {
            "" | "unbounded" => None,
            value => Some(parse_value("UPGRADE_RETRY_MAX_ATTEMPTS", value)?),
        };
    }
    if let Some(value) = lookup("UPGRADE_RETRY_DELAY") {
        config.maintenance.retry.delay_secs = parse_value("UPGRADE_RETRY_DELAY", &value)?;
    }

    // Logging
    if let Some(value) = lookup("UPGRADE_LOG_LEVEL") {
        config.logging.level = value;
    }

    Ok(())
}

fn parse_value<T>(name: &str, value: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|err| ConfigError::ParseError(format!("Invalid {}: {}", name, err)))
}
