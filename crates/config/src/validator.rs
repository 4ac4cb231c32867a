/*
 * SPDX-FileCopyrightText: 2024 A3Mailer Project
 *
 * SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-SEL
 */

//! Configuration Validator
//!
//! Collects every problem of a configuration before reporting, so one run
//! shows all of them.

use std::collections::HashSet;

use backup_restore::{ArchivatorSpec, BackupRestoreConfig};
use cluster_management::{InventoryConfig, MaintenanceConfig};
use common::RemoteConfig;
use tracing::{error, info, warn};
use url::Url;

use crate::{ConfigError, LoggingConfig, Result, UpgradeConfig};

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Validation severity levels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationSeverity {
    Error,
    Warning,
}

/// Validation result
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationResult {
    pub severity: ValidationSeverity,
    pub field: String,
    pub message: String,
    pub suggestion: Option<String>,
}

/// Configuration validator
#[derive(Debug, Default)]
pub struct ConfigValidator {
    results: Vec<ValidationResult>,
    strict_mode: bool,
}

impl ConfigValidator {
    /// Create a validator; in strict mode warnings fail validation too
    pub fn new(strict_mode: bool) -> Self {
        Self {
            results: Vec::new(),
            strict_mode,
        }
    }

    fn add_result(
        &mut self,
        severity: ValidationSeverity,
        field: &str,
        message: impl Into<String>,
        suggestion: Option<&str>,
    ) {
        self.results.push(ValidationResult {
            severity,
            field: field.to_string(),
            message: message.into(),
            suggestion: suggestion.map(str::to_string),
        });
    }

    fn add_error(&mut self, field: &str, message: impl Into<String>) {
        self.add_result(ValidationSeverity::Error, field, message, None);
    }

    fn add_warning(&mut self, field: &str, message: impl Into<String>, suggestion: Option<&str>) {
        self.add_result(ValidationSeverity::Warning, field, message, suggestion);
    }

    pub fn get_results(&self) -> &[ValidationResult] {
        &self.results
    }

    pub fn error_count(&self) -> usize {
        self.count(ValidationSeverity::Error)
    }

    pub fn warning_count(&self) -> usize {
        self.count(ValidationSeverity::Warning)
    }

    fn count(&self, severity: ValidationSeverity) -> usize {
        self.results
            .iter()
            .filter(|result| result.severity == severity)
            .count()
    }

    /// Check if validation passed
    pub fn is_valid(&self) -> bool {
        self.error_count() == 0 && !(self.strict_mode && self.warning_count() > 0)
    }

    /// Validate every section of `config`
    pub fn validate(&mut self, config: &UpgradeConfig) {
        self.validate_remote(&config.remote);
        self.validate_archive(&config.archive);
        self.validate_maintenance(&config.maintenance);
        self.validate_inventory(&config.inventory);
        self.validate_logging(&config.logging);
    }

    fn validate_remote(&mut self, remote: &RemoteConfig) {
        if remote.ssh_binary.trim().is_empty() {
            self.add_error("remote.ssh_binary", "Remote shell client cannot be empty");
        }
        if remote.ssh_user.trim().is_empty() {
            self.add_error("remote.ssh_user", "Remote login user cannot be empty");
        }
        if remote.container_exec.is_empty() {
            self.add_error(
                "remote.container_exec",
                "Container exec prefix cannot be empty",
            );
        }
    }

    fn validate_archive(&mut self, archive: &BackupRestoreConfig) {
        if archive.archivators.is_empty() {
            self.add_warning(
                "archive.archivators",
                "No archivators configured, backups will be empty",
                Some("Remove the archivators key to use the stock list"),
            );
        }

        if Url::parse(&format!("http://{}/", archive.admin_address)).is_err()
            || archive.admin_address.is_empty()
        {
            self.add_error(
                "archive.admin_address",
                format!("Invalid admin address: {:?}", archive.admin_address),
            );
        }

        if !archive.www_root.is_absolute() {
            self.add_error(
                "archive.www_root",
                format!("Web root must be absolute: {}", archive.www_root.display()),
            );
        }

        let mut entries = HashSet::new();
        for (index, spec) in archive.archivators.iter().enumerate() {
            let field = format!("archive.archivators[{}]", index);
            let entry = match spec {
                ArchivatorSpec::Path { name, .. } => name.clone(),
                ArchivatorSpec::Dirs { tag, .. } => tag.clone(),
                ArchivatorSpec::Command {
                    container,
                    command,
                    filename,
                } => {
                    if command.is_empty() {
                        self.add_error(&field, format!("Empty command for {}", container));
                    }
                    filename.clone()
                }
                ArchivatorSpec::Container {
                    container,
                    directory,
                    ..
                } => {
                    if !directory.starts_with('/') {
                        self.add_error(&field, format!("Directory must be absolute: {}", directory));
                    }
                    container.clone()
                }
                ArchivatorSpec::Database { db, .. } => format!("databases/{}.sql", db),
                ArchivatorSpec::Mirrors {
                    name, uri_prefix, ..
                } => {
                    if !uri_prefix.is_empty() && !uri_prefix.starts_with('/') {
                        self.add_warning(
                            &field,
                            format!("URI prefix {:?} is not an absolute path", uri_prefix),
                            Some("Prefixes are matched against URI paths such as /mirrors"),
                        );
                    }
                    name.clone()
                }
                ArchivatorSpec::ReleaseMirrors { name, .. } => name.clone(),
            };

            if entry.is_empty() {
                self.add_error(&field, "Archive entry name cannot be empty");
            } else if !entries.insert(entry.clone()) {
                self.add_error(&field, format!("Archive entry {} is produced twice", entry));
            }
        }
    }

    fn validate_maintenance(&mut self, maintenance: &MaintenanceConfig) {
        if maintenance.sync_check_interval_secs == 0 {
            self.add_error(
                "maintenance.sync_check_interval_secs",
                "Check interval must be positive",
            );
        } else if maintenance.sync_check_interval_secs > maintenance.sync_timeout_secs {
            self.add_warning(
                "maintenance.sync_check_interval_secs",
                "Check interval exceeds the sync timeout, only one check will run",
                None,
            );
        }

        if maintenance.retry.max_attempts == Some(0) {
            self.add_error(
                "maintenance.retry.max_attempts",
                "At least one attempt is required",
            );
        }

        if maintenance.excluded_resources.is_empty() {
            self.add_warning(
                "maintenance.excluded_resources",
                "No resources excluded, cluster-critical resources will be stopped",
                Some("Keep p_mysql, p_haproxy and vip excluded"),
            );
        }

        if maintenance.upstart.services_list.is_empty() {
            self.add_error("maintenance.upstart.services_list", "Path cannot be empty");
        }

        let network = &maintenance.network;
        if network.disconnect.is_empty()
            && network.delete_overlay.is_empty()
            && network.connect.is_empty()
        {
            self.add_warning(
                "maintenance.network",
                "No network switch commands configured, upgrade-control-plane will not move networks",
                None,
            );
        }
    }

    fn validate_inventory(&mut self, inventory: &InventoryConfig) {
        let mut ids = HashSet::new();
        for environment in &inventory.environments {
            let field = format!("inventory.environments[{}]", environment.id);
            if !ids.insert(environment.id) {
                self.add_error(&field, "Duplicate environment id");
            }
            if environment.controllers.is_empty() {
                self.add_warning(&field, "Environment has no controllers", None);
            }
            for node in &environment.controllers {
                if node.address.trim().is_empty() {
                    self.add_error(&field, format!("Controller {} has no address", node.id));
                }
            }
        }
    }

    fn validate_logging(&mut self, logging: &LoggingConfig) {
        if !LOG_LEVELS.contains(&logging.level.to_lowercase().as_str()) {
            self.add_error(
                "logging.level",
                format!("Unknown log level: {}", logging.level),
            );
        }
    }
}

/// Validate complete configuration
pub fn validate_config(config: &UpgradeConfig, strict_mode: bool) -> Result<()> {
    let mut validator = ConfigValidator::new(strict_mode);
    validator.validate(config);

    for result in validator.get_results() {
        match result.severity {
            ValidationSeverity::Error => error!("ERROR [{}]: {}", result.field, result.message),
            ValidationSeverity::Warning => {
                warn!("WARNING [{}]: {}", result.field, result.message);
                if let Some(suggestion) = &result.suggestion {
                    warn!("  Suggestion: {}", suggestion);
                }
            }
        }
    }

    if !validator.is_valid() {
        return Err(ConfigError::ValidationError(format!(
            "Configuration validation failed with {} errors and {} warnings",
            validator.error_count(),
            validator.warning_count()
        )));
    }

    info!(
        "Configuration validated with {} warnings",
        validator.warning_count()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use cluster_management::{EnvironmentConfig, EnvironmentId, Node};

    fn validate(config: &UpgradeConfig) -> ConfigValidator {
        let mut validator = ConfigValidator::new(false);
        validator.validate(config);
        validator
    }

    fn fields(validator: &ConfigValidator, severity: ValidationSeverity) -> Vec<String> {
        validator
            .get_results()
            .iter()
            .filter(|result| result.severity == severity)
            .map(|result| result.field.clone())
            .collect()
    }

    #[test]
    fn test_defaults_only_warn_about_network() {
        let validator = validate(&UpgradeConfig::default());
        assert!(validator.is_valid());
        assert_eq!(
            fields(&validator, ValidationSeverity::Warning),
            vec!["maintenance.network"]
        );
        assert!(!{
            let mut strict = ConfigValidator::new(true);
            strict.validate(&UpgradeConfig::default());
            strict.is_valid()
        });
    }

    #[test]
    fn test_duplicate_entries_and_bad_address() {
        let mut config = UpgradeConfig::default();
        config.archive.admin_address = "10.20.0.2:admin".into();
        config.archive.archivators.push(ArchivatorSpec::Database {
            db: "nailgun".into(),
            post_restore: Vec::new(),
        });

        let validator = validate(&config);
        assert_eq!(
            fields(&validator, ValidationSeverity::Error),
            vec!["archive.admin_address", "archive.archivators[8]"]
        );
    }

    #[test]
    fn test_maintenance_and_inventory_errors() {
        let mut config = UpgradeConfig::default();
        config.maintenance.sync_check_interval_secs = 0;
        config.maintenance.retry.max_attempts = Some(0);
        config.logging.level = "loud".into();
        let environment = EnvironmentConfig {
            id: EnvironmentId(3),
            release: "7.0".into(),
            service_tenant_id: None,
            controllers: vec![Node::new(1, "node-1", "")],
        };
        config.inventory.environments = vec![environment.clone(), environment];

        let validator = validate(&config);
        assert_eq!(
            fields(&validator, ValidationSeverity::Error),
            vec![
                "maintenance.sync_check_interval_secs",
                "maintenance.retry.max_attempts",
                "inventory.environments[3]",
                "inventory.environments[3]",
                "inventory.environments[3]",
                "logging.level",
            ]
        );
        assert!(validate_config(&config, false).is_err());
    }
}
