/*
 * SPDX-FileCopyrightText: 2020 Stalwart Labs Ltd <hello@stalw.art>
 *
 * SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-SEL
 */

//! Error types for backup and restore operations

use std::path::PathBuf;

use common::ExecutionError;
use thiserror::Error;

/// Result type for backup operations
pub type Result<T> = std::result::Result<T, BackupError>;

/// Backup-specific errors
#[derive(Error, Debug)]
pub enum BackupError {
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("{0}")]
    Execution(#[from] ExecutionError),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Invalid URI {uri}: {reason}")]
    InvalidUri { uri: String, reason: String },

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Archive entry already exists: {0}")]
    DuplicateEntry(String),

    #[error("Archive entry not found: {0}")]
    EntryNotFound(String),

    #[error("Archive not found: {}", .0.display())]
    ArchiveNotFound(PathBuf),

    #[error("Archivator {0} does not support restore")]
    RestoreNotSupported(String),

    #[error("Archivator {name} failed: {source}")]
    Archivator {
        name: String,
        #[source]
        source: Box<BackupError>,
    },
}

impl BackupError {
    /// Attach the failing archivator's name to an error
    pub fn in_archivator(self, name: impl Into<String>) -> Self {
        BackupError::Archivator {
            name: name.into(),
            source: Box::new(self),
        }
    }
}

/// Restore-specific errors
#[derive(Error, Debug)]
pub enum RestoreError {
    #[error("Backup error: {0}")]
    BackupError(#[from] BackupError),

    #[error("Restore of {name} failed: {source}")]
    Archivator {
        name: String,
        #[source]
        source: Box<BackupError>,
    },
}

impl From<RestoreError> for BackupError {
    fn from(err: RestoreError) -> Self {
        match err {
            RestoreError::BackupError(backup_err) => backup_err,
            RestoreError::Archivator { name, source } => BackupError::Archivator { name, source },
        }
    }
}
