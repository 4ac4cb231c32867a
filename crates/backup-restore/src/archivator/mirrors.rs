/*
 * SPDX-FileCopyrightText: 2020 Stalwart Labs Ltd <hello@stalw.art>
 *
 * SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-SEL
 */

//! Mirror archivators
//!
//! Package mirrors and provisioning images live under the admin node's web
//! root and are referenced by URI from cluster attributes stored in the
//! database. Only directories served by this admin node are archived.

use std::{collections::HashSet, path::PathBuf};

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, info};
use url::Url;

use super::{Archivator, SqlRunner};
use crate::{
    error::{BackupError, Result},
    storage::ArchiveWriter,
};

/// Pulls the URI-bearing objects out of one database row
pub type UriExtractor = fn(&Value) -> Vec<Value>;

/// `repo_setup.repos.value[*]` of the editable cluster attributes
pub fn repo_setup_uris(row: &Value) -> Vec<Value> {
    row.pointer("/repo_setup/repos/value")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default()
}

/// `provision.image_data.*` of the generated cluster attributes
pub fn provision_image_uris(row: &Value) -> Vec<Value> {
    row.pointer("/provision/image_data")
        .and_then(Value::as_object)
        .map(|images| images.values().cloned().collect())
        .unwrap_or_default()
}

const DEFAULT_WWW_ROOT: &str = "/var/www/nailgun";

/// Archives mirror directories referenced by URIs in database rows
#[derive(Debug, Clone)]
pub struct ResourceMirrorArchivator {
    name: String,
    sql: SqlRunner,
    query: String,
    extractor: UriExtractor,
    www_root: PathBuf,
    admin_address: String,
    uri_prefix: String,
}

impl ResourceMirrorArchivator {
    pub fn new(
        name: impl Into<String>,
        sql: SqlRunner,
        query: impl Into<String>,
        extractor: UriExtractor,
    ) -> Self {
        Self {
            name: name.into(),
            sql,
            query: query.into(),
            extractor,
            www_root: PathBuf::from(DEFAULT_WWW_ROOT),
            admin_address: String::new(),
            uri_prefix: String::new(),
        }
    }

    pub fn with_www_root(mut self, www_root: impl Into<PathBuf>) -> Self {
        self.www_root = www_root.into();
        self
    }

    /// Only URIs containing this address are archived
    pub fn with_admin_address(mut self, address: impl Into<String>) -> Self {
        self.admin_address = address.into();
        self
    }

    /// URI path prefix removed before taking the first path segment
    pub fn with_uri_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.uri_prefix = prefix.into().trim_matches('/').to_string();
        self
    }

    /// Whether `url` points at the admin node, with or without its port
    fn is_local(&self, url: &Url) -> bool {
        if self.admin_address.is_empty() {
            return true;
        }
        let Some(host) = url.host_str() else {
            return false;
        };
        match url.port() {
            Some(port) if self.admin_address == format!("{}:{}", host, port) => true,
            _ => host == self.admin_address,
        }
    }

    /// First path segment below the URI prefix, if the URI is served locally
    fn segment(&self, uri: &str) -> Result<Option<String>> {
        if !uri.contains(&self.admin_address) {
            return Ok(None);
        }

        let url = Url::parse(uri).map_err(|err| BackupError::InvalidUri {
            uri: uri.to_string(),
            reason: err.to_string(),
        })?;
        if !self.is_local(&url) {
            return Ok(None);
        }
        let mut path = url.path().trim_start_matches('/');
        if !self.uri_prefix.is_empty() {
            path = match path.strip_prefix(self.uri_prefix.as_str()) {
                Some(rest) if rest.starts_with('/') => rest.trim_start_matches('/'),
                _ => return Ok(None),
            };
        }

        Ok(path
            .split('/')
            .next()
            .filter(|segment| !segment.is_empty())
            .map(str::to_string))
    }

    fn local_dir(&self, segment: &str) -> PathBuf {
        let mut dir = self.www_root.clone();
        if !self.uri_prefix.is_empty() {
            dir.push(&self.uri_prefix);
        }
        dir.join(segment)
    }
}

#[async_trait]
impl Archivator for ResourceMirrorArchivator {
    fn name(&self) -> String {
        format!("mirrors {}", self.name)
    }

    async fn backup(&self, archive: &mut ArchiveWriter) -> Result<()> {
        let rows = self.sql.query(&self.query).await?;
        let mut archived = HashSet::new();

        for row in rows {
            let row: Value = serde_json::from_str(&row)?;
            for value in (self.extractor)(&row) {
                let Some(uri) = value.get("uri").and_then(Value::as_str) else {
                    continue;
                };
                let Some(segment) = self.segment(uri)? else {
                    debug!("Skipping {} not served by {}", uri, self.admin_address);
                    continue;
                };
                if !archived.insert(segment.clone()) {
                    continue;
                }

                let dir = self.local_dir(&segment);
                info!("Archiving mirror {} as {}/{}", dir.display(), self.name, segment);
                archive.add_path(&dir, &format!("{}/{}", self.name, segment))?;
            }
        }
        Ok(())
    }
}

/// Archives the base mirror plus one mirror directory per known release
#[derive(Debug, Clone)]
pub struct ReleaseMirrorsArchivator {
    name: String,
    sql: SqlRunner,
    base_mirror: String,
    www_root: PathBuf,
}

impl ReleaseMirrorsArchivator {
    pub const QUERY: &'static str = "select array_to_json(array_agg(distinct version)) from releases;";

    pub fn new(name: impl Into<String>, sql: SqlRunner, base_mirror: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            sql,
            base_mirror: base_mirror.into(),
            www_root: PathBuf::from(DEFAULT_WWW_ROOT),
        }
    }

    pub fn with_www_root(mut self, www_root: impl Into<PathBuf>) -> Self {
        self.www_root = www_root.into();
        self
    }

    async fn mirrors(&self) -> Result<Vec<String>> {
        let mut mirrors = vec![self.base_mirror.clone()];
        for row in self.sql.query(Self::QUERY).await? {
            let versions: Option<Vec<String>> = serde_json::from_str(&row)?;
            for version in versions.unwrap_or_default() {
                if !mirrors.contains(&version) {
                    mirrors.push(version);
                }
            }
        }
        Ok(mirrors)
    }
}

#[async_trait]
impl Archivator for ReleaseMirrorsArchivator {
    fn name(&self) -> String {
        format!("release mirrors {}", self.name)
    }

    async fn backup(&self, archive: &mut ArchiveWriter) -> Result<()> {
        for mirror in self.mirrors().await? {
            let dir = self.www_root.join(&mirror);
            info!("Archiving release mirror {} as {}/{}", dir.display(), self.name, mirror);
            archive.add_path(&dir, &format!("{}/{}", self.name, mirror))?;
        }
        Ok(())
    }
}
