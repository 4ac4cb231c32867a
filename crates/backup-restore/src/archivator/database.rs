/*
 * SPDX-FileCopyrightText: 2020 Stalwart Labs Ltd <hello@stalw.art>
 *
 * SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-SEL
 */

//! Database archivator
//!
//! Dumps a database from the database service container and replays the
//! dump on restore. The application container owning the database and its
//! supervising unit are stopped for the duration of the replay.

use std::{fmt, io::Read, sync::Arc};

use async_trait::async_trait;
use common::{argv, ExecutionError, RemoteExecutor, Target};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use super::{command::archive_command_output, Archivator};
use crate::{
    config::DatabaseConfig,
    error::Result,
    storage::{ArchiveReader, ArchiveWriter},
};

/// Runs after a database dump has been replayed
#[async_trait]
pub trait PostRestoreHook: Send + Sync + fmt::Debug {
    async fn run(&self, db: &str) -> Result<()>;
}

/// Hook that does nothing
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopHook;

#[async_trait]
impl PostRestoreHook for NoopHook {
    async fn run(&self, _db: &str) -> Result<()> {
        Ok(())
    }
}

/// Hook that runs a list of commands inside the database's application container
#[derive(Debug, Clone)]
pub struct CommandHook {
    executor: Arc<dyn RemoteExecutor>,
    commands: Vec<Vec<String>>,
}

impl CommandHook {
    pub fn new(executor: Arc<dyn RemoteExecutor>, commands: Vec<Vec<String>>) -> Self {
        Self { executor, commands }
    }
}

#[async_trait]
impl PostRestoreHook for CommandHook {
    async fn run(&self, db: &str) -> Result<()> {
        let target = Target::container(db);
        for command in &self.commands {
            info!("Running post-restore command [{}] in {}", command.join(" "), db);
            self.executor.call(&target, command).await?;
        }
        Ok(())
    }
}

/// Dump and replay of one database
#[derive(Debug)]
pub struct DatabaseArchivator {
    db: String,
    executor: Arc<dyn RemoteExecutor>,
    config: DatabaseConfig,
    command: Vec<String>,
    filename: String,
    hook: Box<dyn PostRestoreHook>,
}

impl DatabaseArchivator {
    pub fn new(db: impl Into<String>, executor: Arc<dyn RemoteExecutor>, config: &DatabaseConfig) -> Self {
        let db = db.into();
        let command = argv([
            "sudo",
            "-u",
            config.user.as_str(),
            "pg_dump",
            "-c",
            db.as_str(),
        ]);
        let filename = format!("databases/{}.sql", db);
        Self {
            db,
            executor,
            config: config.clone(),
            command,
            filename,
            hook: Box::new(NoopHook),
        }
    }

    /// Replace the default no-op post-restore hook
    pub fn with_hook(mut self, hook: Box<dyn PostRestoreHook>) -> Self {
        self.hook = hook;
        self
    }

    pub fn db(&self) -> &str {
        &self.db
    }

    pub fn command(&self) -> &[String] {
        &self.command
    }

    pub fn filename(&self) -> &str {
        &self.filename
    }

    fn unit(&self) -> String {
        format!("docker-{}.service", self.db)
    }

    async fn local(&self, command: Vec<String>) -> Result<()> {
        self.executor.call(&Target::Local, &command).await?;
        Ok(())
    }

    async fn replay(&self, dump: &[u8]) -> Result<()> {
        let target = Target::container(&self.config.container);
        let command = argv(["sudo", "-u", self.config.user.as_str(), "psql"]);
        let mut process = self.executor.spawn(&target, &command).await?;

        if let Some(stdin) = process.stdin() {
            let mut dump = dump;
            tokio::io::copy(&mut dump, stdin)
                .await
                .map_err(|err| ExecutionError::Stream {
                    target: target.clone(),
                    command: command.join(" "),
                    err,
                })?;
            stdin.flush().await.map_err(|err| ExecutionError::Stream {
                target: target.clone(),
                command: command.join(" "),
                err,
            })?;
        } else {
            warn!("No stdin pipe for [{}] on {}", command.join(" "), target);
        }

        process.wait().await?.into_result(&target, &command)?;
        Ok(())
    }
}

#[async_trait]
impl Archivator for DatabaseArchivator {
    fn name(&self) -> String {
        format!("database {}", self.db)
    }

    async fn backup(&self, archive: &mut ArchiveWriter) -> Result<()> {
        info!("Dumping database {} as {}", self.db, self.filename);
        archive_command_output(
            self.executor.as_ref(),
            archive,
            &self.config.container,
            &self.command,
            &self.filename,
        )
        .await
    }

    fn supports_restore(&self) -> bool {
        true
    }

    async fn restore(&self, archive: &ArchiveReader) -> Result<()> {
        let mut dump = Vec::new();
        archive.extract(&self.filename)?.read_to_end(&mut dump)?;
        info!("Restoring database {} from {} ({} bytes)", self.db, self.filename, dump.len());

        let manager = self.config.service_manager.as_str();
        let runtime = self.config.container_runtime.as_str();
        let unit = self.unit();

        self.local(argv([manager, "stop", unit.as_str()])).await?;
        self.local(argv([runtime, "stop", self.db.as_str()])).await?;

        debug!("Replaying dump of {} into {}", self.db, self.config.container);
        self.replay(&dump).await?;

        self.local(argv([runtime, "start", self.db.as_str()])).await?;
        self.local(argv([manager, "start", unit.as_str()])).await?;

        self.hook.run(&self.db).await
    }
}

/// Runs SQL through the database container and returns one string per row
#[derive(Debug, Clone)]
pub struct SqlRunner {
    executor: Arc<dyn RemoteExecutor>,
    container: String,
    user: String,
    db: String,
}

impl SqlRunner {
    pub fn new(executor: Arc<dyn RemoteExecutor>, config: &DatabaseConfig, db: &str) -> Self {
        Self {
            executor,
            container: config.container.clone(),
            user: config.user.clone(),
            db: db.to_string(),
        }
    }

    pub async fn query(&self, sql: &str) -> Result<Vec<String>> {
        let command = argv([
            "sudo",
            "-u",
            self.user.as_str(),
            "psql",
            self.db.as_str(),
            "--tuples-only",
            "--no-align",
            "-c",
            sql,
        ]);
        let stdout = self
            .executor
            .call_output(&Target::container(&self.container), &command)
            .await?;

        Ok(stdout
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{error::BackupError, storage::ArchiveTarget};
    use common::{testing::ScriptedExecutor, CommandOutput};
    use tempfile::TempDir;

    fn archive_with_dump(dir: &TempDir) -> std::path::PathBuf {
        let path = dir.path().join("db.tar.bz2");
        let mut archive = ArchiveWriter::open(ArchiveTarget::Path(path.clone()), None).unwrap();
        archive
            .add_bytes("databases/keystone.sql", b"DROP TABLE token;\nCREATE TABLE token;\n")
            .unwrap();
        archive.finish().unwrap();
        path
    }

    #[test]
    fn test_derived_command_and_filename() {
        let archivator = DatabaseArchivator::new(
            "nailgun",
            Arc::new(ScriptedExecutor::new()),
            &DatabaseConfig::default(),
        );
        assert_eq!(
            archivator.command(),
            &["sudo", "-u", "postgres", "pg_dump", "-c", "nailgun"]
        );
        assert_eq!(archivator.filename(), "databases/nailgun.sql");
        assert_eq!(archivator.name(), "database nailgun");
    }

    #[tokio::test]
    async fn test_backup_runs_dump_in_database_container() {
        let executor = ScriptedExecutor::new();
        executor.respond(
            Target::container("postgres"),
            &["sudo", "-u", "postgres", "pg_dump"],
            CommandOutput::ok("CREATE TABLE nodes;"),
        );
        let dir = TempDir::new().unwrap();
        let mut archive =
            ArchiveWriter::open(ArchiveTarget::Path(dir.path().join("b.tar")), None).unwrap();

        DatabaseArchivator::new("nailgun", Arc::new(executor.clone()), &DatabaseConfig::default())
            .backup(&mut archive)
            .await
            .unwrap();

        assert_eq!(archive.entry_names(), &["databases/nailgun.sql"]);
        assert_eq!(
            executor.commands(),
            vec!["container postgres: sudo -u postgres pg_dump -c nailgun"]
        );
    }

    #[tokio::test]
    async fn test_restore_sequence() {
        let dir = TempDir::new().unwrap();
        let path = archive_with_dump(&dir);
        let executor = ScriptedExecutor::new();
        let hook = CommandHook::new(
            Arc::new(executor.clone()),
            vec![argv(["keystone-manage", "db_sync"])],
        );

        DatabaseArchivator::new("keystone", Arc::new(executor.clone()), &DatabaseConfig::default())
            .with_hook(Box::new(hook))
            .restore(&ArchiveReader::open(&path, None).unwrap())
            .await
            .unwrap();

        assert_eq!(
            executor.commands(),
            vec![
                "local host: systemctl stop docker-keystone.service",
                "local host: docker stop keystone",
                "container postgres: sudo -u postgres psql",
                "local host: docker start keystone",
                "local host: systemctl start docker-keystone.service",
                "container keystone: keystone-manage db_sync",
            ]
        );
        let replay = &executor.invocations()[2];
        assert_eq!(
            replay.stdin.as_deref(),
            Some(&b"DROP TABLE token;\nCREATE TABLE token;\n"[..])
        );
    }

    #[tokio::test]
    async fn test_failed_replay_stops_the_sequence() {
        let dir = TempDir::new().unwrap();
        let path = archive_with_dump(&dir);
        let executor = ScriptedExecutor::new();
        executor.respond(
            Target::container("postgres"),
            &["sudo", "-u", "postgres", "psql"],
            CommandOutput::failed(2, "psql: could not connect to server"),
        );

        let err = DatabaseArchivator::new("keystone", Arc::new(executor.clone()), &DatabaseConfig::default())
            .restore(&ArchiveReader::open(&path, None).unwrap())
            .await
            .unwrap_err();

        assert!(matches!(err, BackupError::Execution(_)));
        assert_eq!(executor.count(&["docker", "start"]), 0);
    }

    #[tokio::test]
    async fn test_sql_runner_returns_non_empty_rows() {
        let executor = ScriptedExecutor::new();
        executor.respond(
            Target::container("postgres"),
            &["sudo", "-u", "postgres", "psql", "nailgun"],
            CommandOutput::ok("{\"a\": 1}\n\n {\"b\": 2} \n"),
        );
        let rows = SqlRunner::new(Arc::new(executor), &DatabaseConfig::default(), "nailgun")
            .query("select editable from attributes;")
            .await
            .unwrap();
        assert_eq!(rows, vec!["{\"a\": 1}", "{\"b\": 2}"]);
    }
}
