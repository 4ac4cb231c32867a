/*
 * SPDX-FileCopyrightText: 2020 Stalwart Labs Ltd <hello@stalw.art>
 *
 * SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-SEL
 */

//! Filesystem archivators

use std::{fs, path::PathBuf};

use async_trait::async_trait;
use tracing::{debug, info};

use super::Archivator;
use crate::{
    error::Result,
    storage::{ArchiveReader, ArchiveWriter},
};

/// Archives one file or directory tree as a single entry
#[derive(Debug, Clone)]
pub struct PathArchivator {
    path: PathBuf,
    name: String,
}

impl PathArchivator {
    pub fn new(path: impl Into<PathBuf>, name: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            name: name.into(),
        }
    }
}

#[async_trait]
impl Archivator for PathArchivator {
    fn name(&self) -> String {
        format!("path {}", self.name)
    }

    async fn backup(&self, archive: &mut ArchiveWriter) -> Result<()> {
        info!("Archiving {} as {}", self.path.display(), self.name);
        archive.add_path(&self.path, &self.name)
    }

    fn supports_restore(&self) -> bool {
        true
    }

    async fn restore(&self, archive: &ArchiveReader) -> Result<()> {
        let unpacked = archive.unpack(&self.name, &self.path)?;
        info!(
            "Restored {} entries of {} into {}",
            unpacked,
            self.name,
            self.path.display()
        );
        Ok(())
    }
}

/// Archives every child of a directory as `<tag>/<child>`
#[derive(Debug, Clone)]
pub struct DirsArchivator {
    path: PathBuf,
    tag: String,
}

impl DirsArchivator {
    pub fn new(path: impl Into<PathBuf>, tag: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            tag: tag.into(),
        }
    }
}

#[async_trait]
impl Archivator for DirsArchivator {
    fn name(&self) -> String {
        format!("dirs {}", self.tag)
    }

    async fn backup(&self, archive: &mut ArchiveWriter) -> Result<()> {
        let mut children = fs::read_dir(&self.path)?
            .map(|entry| entry.map(|entry| entry.file_name()))
            .collect::<std::io::Result<Vec<_>>>()?;
        children.sort();

        for child in children {
            let child = child.to_string_lossy().into_owned();
            debug!("Archiving {}/{}", self.path.display(), child);
            archive.add_path(&self.path.join(&child), &format!("{}/{}", self.tag, child))?;
        }
        Ok(())
    }
}
