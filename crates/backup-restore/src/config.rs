/*
 * SPDX-FileCopyrightText: 2020 Stalwart Labs Ltd <hello@stalw.art>
 *
 * SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-SEL
 */

//! Configuration for backup and restore system

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::{
    archivator::{ArchivatorSpec, MirrorSource},
    compression::CompressionConfig,
};

/// Main configuration for backup and restore system
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackupRestoreConfig {
    /// Archivators in registration order
    pub archivators: Vec<ArchivatorSpec>,
    pub database: DatabaseConfig,
    /// Web root serving mirrors and provisioning images
    pub www_root: PathBuf,
    /// Admin network address of this host
    pub admin_address: String,
    pub compression: CompressionConfig,
}

/// Database service layout on the admin host
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Container running the database server
    pub container: String,
    /// System user owning the database server
    pub user: String,
    pub container_runtime: String,
    pub service_manager: String,
    /// Database holding cluster attributes and releases
    pub attributes_db: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            container: "postgres".to_string(),
            user: "postgres".to_string(),
            container_runtime: "docker".to_string(),
            service_manager: "systemctl".to_string(),
            attributes_db: "nailgun".to_string(),
        }
    }
}

impl BackupRestoreConfig {
    /// Stock archivator list for an admin node
    pub fn default_archivators() -> Vec<ArchivatorSpec> {
        vec![
            ArchivatorSpec::Database {
                db: "nailgun".to_string(),
                post_restore: Vec::new(),
            },
            ArchivatorSpec::Database {
                db: "keystone".to_string(),
                post_restore: Vec::new(),
            },
            ArchivatorSpec::Container {
                container: "astute".to_string(),
                directory: "/var/lib/astute".to_string(),
                allowed: None,
                banned: Vec::new(),
            },
            ArchivatorSpec::Container {
                container: "cobbler".to_string(),
                directory: "/var/lib/cobbler/config".to_string(),
                allowed: None,
                banned: vec!["systems.d/default.json".to_string()],
            },
            ArchivatorSpec::Path {
                path: PathBuf::from("/root/.ssh"),
                name: "ssh".to_string(),
            },
            ArchivatorSpec::Dirs {
                path: PathBuf::from("/etc/puppet"),
                tag: "puppet".to_string(),
            },
            ArchivatorSpec::Mirrors {
                name: "mirrors".to_string(),
                source: MirrorSource::RepoSetup,
                uri_prefix: "/mirrors".to_string(),
            },
            ArchivatorSpec::Mirrors {
                name: "repos".to_string(),
                source: MirrorSource::ProvisionImages,
                uri_prefix: String::new(),
            },
        ]
    }
}

impl Default for BackupRestoreConfig {
    fn default() -> Self {
        Self {
            archivators: Self::default_archivators(),
            database: DatabaseConfig::default(),
            www_root: PathBuf::from("/var/www/nailgun"),
            admin_address: "10.20.0.2".to_string(),
            compression: CompressionConfig::default(),
        }
    }
}
