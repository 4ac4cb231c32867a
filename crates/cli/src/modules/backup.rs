/*
 * SPDX-FileCopyrightText: 2024 A3Mailer Project
 *
 * SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-SEL
 */

//! Backup and restore commands

use anyhow::Context as _;
use backup_restore::ArchiveTarget;
use tracing::info;

use super::{
    cli::{BackupCommand, RestoreCommand},
    Context,
};

impl BackupCommand {
    pub async fn exec(self, context: &Context) -> anyhow::Result<()> {
        let to_stdout = self.to.is_none();
        let target = ArchiveTarget::from_option(self.to);
        let description = format!("{:?}", target);

        let report = context
            .archive_manager()
            .backup(target, self.compression.map(Into::into))
            .await
            .with_context(|| format!("Backup into {} failed", description))?;

        info!(
            "Backup finished: {} entries from {} archivators in {:.1}s",
            report.entries.len(),
            report.archivators.len(),
            report.duration.as_secs_f64()
        );

        // Stdout carries the archive itself.
        if !to_stdout {
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Ok(())
    }
}

impl RestoreCommand {
    pub async fn exec(self, context: &Context) -> anyhow::Result<()> {
        let report = context
            .archive_manager()
            .restore(&self.from, self.compression.map(Into::into))
            .await
            .with_context(|| format!("Restore from {} failed", self.from.display()))?;

        info!(
            "Restore finished: {} restored, {} skipped in {:.1}s",
            report.restored.len(),
            report.skipped.len(),
            report.duration.as_secs_f64()
        );
        println!("{}", serde_json::to_string_pretty(&report)?);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules::cli::Compression;
    use backup_restore::ArchivatorSpec;
    use common::testing::ScriptedExecutor;
    use std::{fs, sync::Arc};
    use upgrade_config::UpgradeConfig;

    #[tokio::test]
    async fn test_backup_and_restore_commands() {
        let dir = tempfile::TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("ssh")).unwrap();
        fs::write(dir.path().join("ssh/authorized_keys"), b"ssh-rsa AAAA").unwrap();

        let mut config = UpgradeConfig::default();
        config.archive.archivators = vec![ArchivatorSpec::Path {
            path: dir.path().join("ssh"),
            name: "ssh".into(),
        }];
        let context = Context::with_executor(config, Arc::new(ScriptedExecutor::new()));
        let archive = dir.path().join("backup.tar");

        BackupCommand {
            to: Some(archive.clone()),
            compression: Some(Compression::Bzip2),
        }
        .exec(&context)
        .await
        .unwrap();

        fs::remove_dir_all(dir.path().join("ssh")).unwrap();
        RestoreCommand {
            from: archive.clone(),
            compression: Some(Compression::Bzip2),
        }
        .exec(&context)
        .await
        .unwrap();
        assert_eq!(
            fs::read(dir.path().join("ssh/authorized_keys")).unwrap(),
            b"ssh-rsa AAAA"
        );

        let err = RestoreCommand {
            from: dir.path().join("missing.tar"),
            compression: None,
        }
        .exec(&context)
        .await
        .unwrap_err();
        assert!(err.to_string().starts_with("Restore from"));
    }
}
