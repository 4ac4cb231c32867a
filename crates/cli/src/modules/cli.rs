/*
 * SPDX-FileCopyrightText: 2024 A3Mailer Project
 *
 * SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-SEL
 */

use std::path::PathBuf;

use backup_restore::CompressionType;
use clap::{Parser, Subcommand, ValueEnum};

#[derive(Parser)]
#[clap(version, about, long_about = None)]
#[clap(name = "upgrade-cli")]
pub struct Cli {
    #[clap(subcommand)]
    pub command: Commands,
    /// Configuration file, defaults are used when absent
    #[clap(short, long, global = true)]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Back up the admin node into a single archive
    Backup(BackupCommand),

    /// Restore the admin node from an archive
    Restore(RestoreCommand),

    /// Switch the control plane from the original to the seed environment
    UpgradeControlPlane {
        /// ID of the original environment
        #[clap(value_name = "ORIG_ID")]
        orig_id: u32,
        /// ID of the seed environment
        #[clap(value_name = "SEED_ID")]
        seed_id: u32,
    },

    /// Point neutron of the seed environment at the original service tenant
    UpdateNeutronConfig {
        #[clap(value_name = "ORIG_ID")]
        orig_id: u32,
        #[clap(value_name = "SEED_ID")]
        seed_id: u32,
    },

    /// Controller maintenance steps
    #[clap(subcommand)]
    Maintenance(MaintenanceCommands),
}

#[derive(clap::Args)]
pub struct BackupCommand {
    /// Archive path, the archive is written uncompressed to stdout when absent
    #[clap(long = "to", value_name = "PATH")]
    pub to: Option<PathBuf>,
    /// Compression, picked from the path suffix when absent
    #[clap(long, value_enum)]
    pub compression: Option<Compression>,
}

#[derive(clap::Args)]
pub struct RestoreCommand {
    /// Archive created by the backup command
    #[clap(long = "from", value_name = "PATH")]
    pub from: PathBuf,
    /// Compression, picked from the path suffix when absent
    #[clap(long, value_enum)]
    pub compression: Option<Compression>,
}

#[derive(Subcommand)]
pub enum MaintenanceCommands {
    /// Route API traffic of every controller to the maintenance backend
    DisableApis {
        #[clap(value_name = "ENV_ID")]
        env_id: u32,
    },

    /// Restore API traffic of every controller
    EnableApis {
        #[clap(value_name = "ENV_ID")]
        env_id: u32,
    },

    /// Stop HA-managed resources and upstart services
    StopServices {
        #[clap(value_name = "ENV_ID")]
        env_id: u32,
    },

    /// Start HA-managed resources and upstart services
    StartServices {
        #[clap(value_name = "ENV_ID")]
        env_id: u32,
    },

    /// Wait until the cluster resources converge
    WaitSync {
        #[clap(value_name = "ENV_ID")]
        env_id: u32,
    },

    /// Tear down the cluster stack on every controller
    StopCluster {
        #[clap(value_name = "ENV_ID")]
        env_id: u32,
    },

    /// Bring the cluster stack up on every controller
    StartCluster {
        #[clap(value_name = "ENV_ID")]
        env_id: u32,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Compression {
    None,
    Gzip,
    Bzip2,
}

impl From<Compression> for CompressionType {
    fn from(compression: Compression) -> Self {
        match compression {
            Compression::None => CompressionType::None,
            Compression::Gzip => CompressionType::Gzip,
            Compression::Bzip2 => CompressionType::Bzip2,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_command_definitions() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_backup_without_path() {
        let cli = Cli::try_parse_from(["upgrade-cli", "backup"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Backup(BackupCommand {
                to: None,
                compression: None
            })
        ));
        assert!(cli.config.is_none());
    }

    #[test]
    fn test_global_config_and_env_ids() {
        let cli = Cli::try_parse_from([
            "upgrade-cli",
            "upgrade-control-plane",
            "1",
            "2",
            "--config",
            "/etc/upgrade.toml",
        ])
        .unwrap();
        assert!(matches!(
            cli.command,
            Commands::UpgradeControlPlane {
                orig_id: 1,
                seed_id: 2
            }
        ));
        assert_eq!(cli.config, Some(PathBuf::from("/etc/upgrade.toml")));

        let cli = Cli::try_parse_from(["upgrade-cli", "maintenance", "wait-sync", "3"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Maintenance(MaintenanceCommands::WaitSync { env_id: 3 })
        ));
        assert!(Cli::try_parse_from(["upgrade-cli", "restore"]).is_err());
    }
}
