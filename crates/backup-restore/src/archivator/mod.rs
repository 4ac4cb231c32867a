/*
 * SPDX-FileCopyrightText: 2020 Stalwart Labs Ltd <hello@stalw.art>
 *
 * SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-SEL
 */

//! Archivators
//!
//! An archivator owns the backup (and optionally restore) logic of exactly one
//! resource: a filesystem tree, a database, a containerized service or a set
//! of mirror directories. Archivators are built from configuration once per
//! pass and hold no state between passes.

use std::{fmt, path::PathBuf, sync::Arc};

use async_trait::async_trait;
use common::RemoteExecutor;
use serde::{Deserialize, Serialize};

use crate::{
    config::BackupRestoreConfig,
    error::{BackupError, Result},
    storage::{ArchiveReader, ArchiveWriter},
};

pub mod command;
pub mod database;
pub mod mirrors;
pub mod path;

pub use command::{CmdArchivator, ContainerArchivator};
pub use database::{CommandHook, DatabaseArchivator, NoopHook, PostRestoreHook, SqlRunner};
pub use mirrors::{
    provision_image_uris, repo_setup_uris, ReleaseMirrorsArchivator, ResourceMirrorArchivator,
    UriExtractor,
};
pub use path::{DirsArchivator, PathArchivator};

/// Backup and restore logic for one resource
#[async_trait]
pub trait Archivator: Send + Sync + fmt::Debug {
    /// Name used in logs and errors
    fn name(&self) -> String;

    /// Append this resource's entries to the archive
    async fn backup(&self, archive: &mut ArchiveWriter) -> Result<()>;

    fn supports_restore(&self) -> bool {
        false
    }

    /// Replay this resource's entries onto the live system.
    ///
    /// Destructive: existing state is overwritten with the archive's content.
    async fn restore(&self, _archive: &ArchiveReader) -> Result<()> {
        Err(BackupError::RestoreNotSupported(self.name()))
    }
}

/// Where a resource mirror archivator finds its URIs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MirrorSource {
    /// `repo_setup.repos.value[*].uri` of the editable cluster attributes
    RepoSetup,
    /// `provision.image_data.*.uri` of the generated cluster attributes
    ProvisionImages,
}

/// Configuration form of an archivator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ArchivatorSpec {
    Path {
        path: PathBuf,
        name: String,
    },
    Dirs {
        path: PathBuf,
        tag: String,
    },
    Command {
        container: String,
        command: Vec<String>,
        filename: String,
    },
    Container {
        container: String,
        directory: String,
        #[serde(default)]
        allowed: Option<Vec<String>>,
        #[serde(default)]
        banned: Vec<String>,
    },
    Database {
        db: String,
        #[serde(default)]
        post_restore: Vec<Vec<String>>,
    },
    Mirrors {
        name: String,
        source: MirrorSource,
        #[serde(default)]
        uri_prefix: String,
    },
    ReleaseMirrors {
        name: String,
        base_mirror: String,
    },
}

impl ArchivatorSpec {
    /// Instantiate the archivator this configuration entry describes
    pub fn build(
        &self,
        executor: Arc<dyn RemoteExecutor>,
        config: &BackupRestoreConfig,
    ) -> Box<dyn Archivator> {
        match self {
            ArchivatorSpec::Path { path, name } => Box::new(PathArchivator::new(path, name)),
            ArchivatorSpec::Dirs { path, tag } => Box::new(DirsArchivator::new(path, tag)),
            ArchivatorSpec::Command {
                container,
                command,
                filename,
            } => Box::new(CmdArchivator::new(
                executor,
                container,
                command.clone(),
                filename,
            )),
            ArchivatorSpec::Container {
                container,
                directory,
                allowed,
                banned,
            } => Box::new(
                ContainerArchivator::new(executor, container, directory)
                    .with_allowed(allowed.clone())
                    .with_banned(banned.clone()),
            ),
            ArchivatorSpec::Database { db, post_restore } => {
                let archivator = DatabaseArchivator::new(db, executor.clone(), &config.database);
                if post_restore.is_empty() {
                    Box::new(archivator)
                } else {
                    Box::new(archivator.with_hook(Box::new(CommandHook::new(
                        executor,
                        post_restore.clone(),
                    ))))
                }
            }
            ArchivatorSpec::Mirrors {
                name,
                source,
                uri_prefix,
            } => {
                let sql = SqlRunner::new(executor, &config.database, &config.database.attributes_db);
                let archivator = match source {
                    MirrorSource::RepoSetup => ResourceMirrorArchivator::new(
                        name,
                        sql,
                        "select editable from attributes;",
                        repo_setup_uris,
                    ),
                    MirrorSource::ProvisionImages => ResourceMirrorArchivator::new(
                        name,
                        sql,
                        "select generated from attributes;",
                        provision_image_uris,
                    ),
                };
                Box::new(
                    archivator
                        .with_www_root(&config.www_root)
                        .with_admin_address(&config.admin_address)
                        .with_uri_prefix(uri_prefix),
                )
            }
            ArchivatorSpec::ReleaseMirrors { name, base_mirror } => {
                let sql = SqlRunner::new(executor, &config.database, &config.database.attributes_db);
                Box::new(
                    ReleaseMirrorsArchivator::new(name, sql, base_mirror)
                        .with_www_root(&config.www_root),
                )
            }
        }
    }
}

/// Build every configured archivator, preserving configuration order
pub fn build_all(
    executor: Arc<dyn RemoteExecutor>,
    config: &BackupRestoreConfig,
) -> Vec<Box<dyn Archivator>> {
    config
        .archivators
        .iter()
        .map(|spec| spec.build(executor.clone(), config))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::testing::ScriptedExecutor;

    #[test]
    fn test_spec_parses_tagged_kinds() {
        #[derive(Deserialize)]
        struct Doc {
            archivators: Vec<ArchivatorSpec>,
        }

        let doc: Doc = serde_json::from_str(
            r#"{"archivators": [
                {"kind": "database", "db": "keystone"},
                {"kind": "container", "container": "cobbler", "directory": "/var/lib/cobbler/config",
                 "banned": ["systems.d/default.json"]},
                {"kind": "mirrors", "name": "mirrors", "source": "repo_setup", "uri_prefix": "/mirrors"}
            ]}"#,
        )
        .unwrap();

        assert_eq!(
            doc.archivators[0],
            ArchivatorSpec::Database {
                db: "keystone".into(),
                post_restore: Vec::new()
            }
        );
        assert!(matches!(
            &doc.archivators[1],
            ArchivatorSpec::Container { allowed: None, banned, .. } if banned.len() == 1
        ));
        assert!(matches!(
            &doc.archivators[2],
            ArchivatorSpec::Mirrors { source: MirrorSource::RepoSetup, .. }
        ));
    }

    #[test]
    fn test_build_all_keeps_registration_order() {
        let executor = Arc::new(ScriptedExecutor::new());
        let config = BackupRestoreConfig::default();
        let archivators = build_all(executor, &config);

        let names: Vec<_> = archivators.iter().map(|a| a.name()).collect();
        assert_eq!(names.len(), config.archivators.len());
        assert_eq!(names[0], "database nailgun");
        assert_eq!(names[1], "database keystone");
        assert!(archivators[0].supports_restore());
    }
}
