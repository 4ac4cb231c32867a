/*
 * SPDX-FileCopyrightText: 2024 A3Mailer Project
 *
 * SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-SEL
 */

use anyhow::Context as _;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;
use upgrade_cli::{Cli, Commands, Context, modules::control_plane};
use upgrade_config::{loader, validator, LoggingConfig, UpgradeConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Cli::parse();

    let mut config = match &args.config {
        Some(path) => loader::load_from_file(path)
            .await
            .with_context(|| format!("Cannot load {}", path.display()))?,
        None => UpgradeConfig::default(),
    };
    loader::apply_environment(&mut config)?;

    init_logging(&config.logging)?;
    validator::validate_config(&config, false)?;

    let context = Context::new(config);
    match args.command {
        Commands::Backup(command) => command.exec(&context).await?,
        Commands::Restore(command) => command.exec(&context).await?,
        Commands::UpgradeControlPlane { orig_id, seed_id } => {
            control_plane::upgrade_control_plane(&context, orig_id, seed_id).await?
        }
        Commands::UpdateNeutronConfig { orig_id, seed_id } => {
            control_plane::update_neutron_config(&context, orig_id, seed_id).await?
        }
        Commands::Maintenance(command) => command.exec(&context).await?,
    }

    info!("Done");
    Ok(())
}

/// Log to stderr, stdout may carry an archive
fn init_logging(logging: &LoggingConfig) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&logging.level))
        .context("Invalid log filter")?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|err| anyhow::anyhow!("Failed to initialize logging: {}", err))
}
