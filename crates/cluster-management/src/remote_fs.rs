/*
 * SPDX-FileCopyrightText: 2020 Stalwart Labs Ltd <hello@stalw.art>
 *
 * SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-SEL
 */

//! File access on cluster nodes through the remote executor

use common::{argv, RemoteExecutor, Target};
use tracing::debug;

use crate::error::Result;

/// Files of one node
#[derive(Debug, Clone, Copy)]
pub struct RemoteFs<'a> {
    executor: &'a dyn RemoteExecutor,
    target: &'a Target,
}

impl<'a> RemoteFs<'a> {
    pub fn new(executor: &'a dyn RemoteExecutor, target: &'a Target) -> Self {
        Self { executor, target }
    }

    pub async fn read(&self, path: &str) -> Result<String> {
        Ok(self
            .executor
            .call_output(self.target, &argv(["cat", path]))
            .await?)
    }

    pub async fn exists(&self, path: &str) -> Result<bool> {
        let command = argv(["test", "-e", path]);
        let output = self.executor.run(self.target, &command, None).await?;
        match output.status {
            Some(0) => Ok(true),
            Some(1) => Ok(false),
            _ => {
                output.into_result(self.target, &command)?;
                Ok(false)
            }
        }
    }

    /// File names directly below `dir`, sorted
    pub async fn list(&self, dir: &str) -> Result<Vec<String>> {
        let listing = self
            .executor
            .call_output(self.target, &argv(["ls", "-1", dir]))
            .await?;
        let mut names: Vec<String> = listing
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect();
        names.sort();
        Ok(names)
    }

    /// Write `content` to `<path>.tmp`, then rename it over `path`
    pub async fn write_atomic(&self, path: &str, content: &str) -> Result<()> {
        let temporary = format!("{}.tmp", path);
        debug!("Writing {} on {}", path, self.target);
        self.write(&temporary, content).await?;
        self.rename(&temporary, path).await
    }

    pub async fn write(&self, path: &str, content: &str) -> Result<()> {
        self.executor
            .call_with_stdin(self.target, &argv(["tee", path]), content.as_bytes())
            .await?;
        Ok(())
    }

    pub async fn rename(&self, from: &str, to: &str) -> Result<()> {
        self.executor
            .call(self.target, &argv(["mv", "-f", from, to]))
            .await?;
        Ok(())
    }

    pub async fn remove(&self, path: &str) -> Result<()> {
        self.executor
            .call(self.target, &argv(["rm", "-f", path]))
            .await?;
        Ok(())
    }
}

/// Join a directory and a file name with exactly one separator
pub fn join(dir: &str, name: &str) -> String {
    format!("{}/{}", dir.trim_end_matches('/'), name.trim_start_matches('/'))
}
