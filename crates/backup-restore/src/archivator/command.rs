/*
 * SPDX-FileCopyrightText: 2020 Stalwart Labs Ltd <hello@stalw.art>
 *
 * SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-SEL
 */

//! Archivators backed by commands run inside containerized services

use std::sync::Arc;

use async_trait::async_trait;
use common::{argv, RemoteExecutor, Target};
use tracing::{debug, info};

use super::Archivator;
use crate::{error::Result, storage::ArchiveWriter};

/// Run `command` inside `container` and store its stdout as entry `name`
pub(crate) async fn archive_command_output(
    executor: &dyn RemoteExecutor,
    archive: &mut ArchiveWriter,
    container: &str,
    command: &[String],
    name: &str,
) -> Result<()> {
    let output = executor
        .call(&Target::container(container), command)
        .await?;
    archive.add_bytes(name, &output.stdout)
}

/// Stores the output of one command as one entry
#[derive(Debug, Clone)]
pub struct CmdArchivator {
    executor: Arc<dyn RemoteExecutor>,
    container: String,
    command: Vec<String>,
    filename: String,
}

impl CmdArchivator {
    pub fn new(
        executor: Arc<dyn RemoteExecutor>,
        container: impl Into<String>,
        command: Vec<String>,
        filename: impl Into<String>,
    ) -> Self {
        Self {
            executor,
            container: container.into(),
            command,
            filename: filename.into(),
        }
    }

    pub fn container(&self) -> &str {
        &self.container
    }

    pub fn command(&self) -> &[String] {
        &self.command
    }

    pub fn filename(&self) -> &str {
        &self.filename
    }
}

#[async_trait]
impl Archivator for CmdArchivator {
    fn name(&self) -> String {
        format!("command {}", self.filename)
    }

    async fn backup(&self, archive: &mut ArchiveWriter) -> Result<()> {
        info!(
            "Archiving output of [{}] in {} as {}",
            self.command.join(" "),
            self.container,
            self.filename
        );
        archive_command_output(
            self.executor.as_ref(),
            archive,
            &self.container,
            &self.command,
            &self.filename,
        )
        .await
    }
}

/// Copies every regular file below a directory of a containerized service
#[derive(Debug, Clone)]
pub struct ContainerArchivator {
    executor: Arc<dyn RemoteExecutor>,
    container: String,
    directory: String,
    allowed: Option<Vec<String>>,
    banned: Vec<String>,
}

impl ContainerArchivator {
    pub fn new(
        executor: Arc<dyn RemoteExecutor>,
        container: impl Into<String>,
        directory: impl Into<String>,
    ) -> Self {
        Self {
            executor,
            container: container.into(),
            directory: directory.into(),
            allowed: None,
            banned: Vec::new(),
        }
    }

    /// Only archive these relative paths; `None` archives everything
    pub fn with_allowed(mut self, allowed: Option<Vec<String>>) -> Self {
        self.allowed = allowed;
        self
    }

    /// Never archive these relative paths, even when allowed
    pub fn with_banned(mut self, banned: Vec<String>) -> Self {
        self.banned = banned;
        self
    }

    fn wanted(&self, relative: &str) -> bool {
        if self.banned.iter().any(|banned| banned == relative) {
            return false;
        }
        self.allowed
            .as_ref()
            .map_or(true, |allowed| allowed.iter().any(|name| name == relative))
    }
}

#[async_trait]
impl Archivator for ContainerArchivator {
    fn name(&self) -> String {
        format!("container {}", self.container)
    }

    async fn backup(&self, archive: &mut ArchiveWriter) -> Result<()> {
        let listing = self
            .executor
            .call_output(
                &Target::container(&self.container),
                &argv(["find", self.directory.as_str(), "-type", "f"]),
            )
            .await?;

        let root = self.directory.trim_end_matches('/');
        for found in listing.split_whitespace() {
            let relative = found
                .strip_prefix(root)
                .unwrap_or(found)
                .trim_start_matches('/');
            if relative.is_empty() || !self.wanted(relative) {
                debug!("Skipping {} in {}", found, self.container);
                continue;
            }

            let path = format!("{}/{}", root, relative);
            archive_command_output(
                self.executor.as_ref(),
                archive,
                &self.container,
                &argv(["cat", path.as_str()]),
                &format!("{}/{}", self.container, relative),
            )
            .await?;
        }
        Ok(())
    }
}
