/*
 * SPDX-FileCopyrightText: 2024 A3Mailer Project
 *
 * SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-SEL
 */

//! # Upgrade Configuration
//!
//! Layered configuration for the upgrade toolkit. Values come from, in
//! increasing priority:
//!
//! - Built-in defaults of every section
//! - A TOML file
//! - `UPGRADE_*` environment variables
//!
//! The merged configuration is validated before use.
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::path::Path;
//! use upgrade_config::UpgradeConfig;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = UpgradeConfig::load(Some(Path::new("/etc/upgrade.toml"))).await?;
//!     println!("Archivators: {}", config.archive.archivators.len());
//!     Ok(())
//! }
//! ```

use std::path::Path;

use backup_restore::BackupRestoreConfig;
use cluster_management::{InventoryConfig, MaintenanceConfig};
use common::RemoteConfig;
use serde::{Deserialize, Serialize};
use tracing::info;

pub mod error;
pub mod loader;
pub mod validator;

pub use error::{ConfigError, Result};
pub use validator::{ConfigValidator, ValidationResult, ValidationSeverity};

/// Main toolkit configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct UpgradeConfig {
    pub remote: RemoteConfig,
    pub archive: BackupRestoreConfig,
    pub maintenance: MaintenanceConfig,
    pub inventory: InventoryConfig,
    pub logging: LoggingConfig,
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter directive, overridden by `RUST_LOG`
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl UpgradeConfig {
    /// Load defaults, the optional file and environment overrides, then
    /// validate the result
    pub async fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => loader::load_from_file(path).await?,
            None => {
                info!("No configuration file given, using defaults");
                Self::default()
            }
        };
        loader::apply_environment(&mut config)?;
        validator::validate_config(&config, false)?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[tokio::test]
    async fn test_load_without_file_uses_defaults() {
        let config = UpgradeConfig::load(None).await.unwrap();
        assert_eq!(config.archive.admin_address, "10.20.0.2");
        assert_eq!(config.maintenance.sync_timeout_secs, 720);
        assert_eq!(config.remote.ssh_user, "root");
    }

    #[tokio::test]
    async fn test_load_rejects_invalid_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[maintenance]\nsync_check_interval_secs = 0").unwrap();

        let err = UpgradeConfig::load(Some(file.path())).await.unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError(_)));
    }
}
