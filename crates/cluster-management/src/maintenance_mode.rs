/*
 * SPDX-FileCopyrightText: 2020 Stalwart Labs Ltd <hello@stalw.art>
 *
 * SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-SEL
 */

//! API maintenance mode
//!
//! A controller is in maintenance when its load balancer main configuration
//! carries the maintenance backend marker. Entering maintenance also routes
//! every backend fragment to the maintenance backend and elevates the stats
//! socket to admin level. Leaving maintenance removes exactly what entering
//! added.

use common::{argv, RemoteExecutor};
use regex::Regex;
use tracing::{debug, info};

use crate::{
    config::HaproxyConfig,
    error::{ClusterError, Result},
    node::Node,
    remote_fs::{join, RemoteFs},
};

/// Suffix tagging a stats socket line elevated by maintenance mode
const ADMIN_TAG: &str = " # maintenance-admin";
const ADMIN_LEVEL: &str = " level admin";

/// Text transforms applied to load balancer configuration
#[derive(Debug, Clone)]
pub struct MaintenanceRewriter {
    config: HaproxyConfig,
    stats_socket: Regex,
    mode_tcp: Regex,
}

impl MaintenanceRewriter {
    pub fn new(config: &HaproxyConfig) -> Result<Self> {
        let stats_socket = Regex::new(&format!(
            r"stats\s+socket\s+{}",
            regex::escape(&config.stats_socket)
        ))
        .map_err(|err| ClusterError::Config(err.to_string()))?;
        let mode_tcp =
            Regex::new(r"mode\s+tcp").map_err(|err| ClusterError::Config(err.to_string()))?;

        Ok(Self {
            config: config.clone(),
            stats_socket,
            mode_tcp,
        })
    }

    pub fn is_in_maintenance(&self, main_config: &str) -> bool {
        has_line(main_config, &self.config.maintenance_line)
    }

    /// Whether a backend fragment may be routed to the maintenance backend
    pub fn fragment_is_tcp(&self, fragment: &str) -> bool {
        self.mode_tcp.is_match(fragment)
    }

    /// Main configuration with maintenance enabled
    pub fn disable_main(&self, content: &str) -> String {
        let mut rewritten = String::with_capacity(content.len() + 64);
        for line in content.split_inclusive('\n') {
            let (body, ending) = split_ending(line);
            match self.stats_socket.find(body) {
                Some(found) if !body.contains(ADMIN_LEVEL.trim_start()) => {
                    rewritten.push_str(&body[..found.end()]);
                    rewritten.push_str(ADMIN_LEVEL);
                    rewritten.push_str(&body[found.end()..]);
                    rewritten.push_str(ADMIN_TAG);
                    rewritten.push_str(ending);
                }
                _ => rewritten.push_str(line),
            }
        }

        if self.is_in_maintenance(&rewritten) {
            rewritten
        } else {
            append_line(&rewritten, &self.config.maintenance_line)
        }
    }

    /// Main configuration with maintenance disabled
    pub fn enable_main(&self, content: &str) -> String {
        let content = remove_lines(content, &self.config.maintenance_line);
        let mut rewritten = String::with_capacity(content.len());
        for line in content.split_inclusive('\n') {
            let (body, ending) = split_ending(line);
            match (body.strip_suffix(ADMIN_TAG), self.stats_socket.find(body)) {
                (Some(tagged), Some(found)) => {
                    let rest = &tagged[found.end()..];
                    rewritten.push_str(&tagged[..found.end()]);
                    rewritten.push_str(rest.strip_prefix(ADMIN_LEVEL).unwrap_or(rest));
                    rewritten.push_str(ending);
                }
                _ => rewritten.push_str(line),
            }
        }
        rewritten
    }

    /// Backend fragment routed to the maintenance backend
    pub fn disable_fragment(&self, content: &str) -> String {
        if has_line(content, &self.config.use_backend_line) {
            return content.to_string();
        }
        append_line(content, &self.config.use_backend_line)
    }

    /// Backend fragment routed to its own servers again
    pub fn enable_fragment(&self, content: &str) -> String {
        remove_lines(content, &self.config.use_backend_line)
    }
}

fn split_ending(line: &str) -> (&str, &str) {
    match line.strip_suffix('\n') {
        Some(body) => (body, "\n"),
        None => (line, ""),
    }
}

fn same_line(candidate: &str, line: &str) -> bool {
    candidate.trim() == line.trim()
}

fn has_line(content: &str, line: &str) -> bool {
    content.lines().any(|candidate| same_line(candidate, line))
}

/// Append `line` as a new last line.
///
/// Content without a final newline keeps that shape: the separator goes
/// before `line` and nothing follows it, so [`remove_lines`] can restore the
/// original bytes.
pub fn append_line(content: &str, line: &str) -> String {
    let mut appended = String::with_capacity(content.len() + line.len() + 1);
    appended.push_str(content);
    if content.is_empty() || content.ends_with('\n') {
        appended.push_str(line);
        appended.push('\n');
    } else {
        appended.push('\n');
        appended.push_str(line);
    }
    appended
}

/// Drop every whole line equal to `line`, ignoring surrounding whitespace
pub fn remove_lines(content: &str, line: &str) -> String {
    let mut kept = String::with_capacity(content.len());
    for candidate in content.split_inclusive('\n') {
        if !same_line(candidate, line) {
            kept.push_str(candidate);
        } else if !candidate.ends_with('\n') && kept.ends_with('\n') {
            // Unterminated last line: its separator was added by append_line.
            kept.pop();
        }
    }
    kept
}

/// Applies maintenance mode to controller nodes
#[derive(Debug)]
pub struct MaintenanceMode<'a> {
    executor: &'a dyn RemoteExecutor,
    rewriter: MaintenanceRewriter,
}

impl<'a> MaintenanceMode<'a> {
    pub fn new(executor: &'a dyn RemoteExecutor, config: &HaproxyConfig) -> Result<Self> {
        Ok(Self {
            executor,
            rewriter: MaintenanceRewriter::new(config)?,
        })
    }

    fn config(&self) -> &HaproxyConfig {
        &self.rewriter.config
    }

    async fn fragments(&self, fs: &RemoteFs<'_>) -> Result<Vec<(String, String)>> {
        let mut fragments = Vec::new();
        for name in fs.list(&self.config().fragments_dir).await? {
            let path = join(&self.config().fragments_dir, &name);
            let content = fs.read(&path).await?;
            fragments.push((path, content));
        }
        Ok(fragments)
    }

    async fn restart_balancer(&self, node: &Node) -> Result<()> {
        self.executor
            .call(
                &node.target(),
                &argv(["crm", "resource", "restart", self.config().resource.as_str()]),
            )
            .await?;
        Ok(())
    }

    /// Route all API traffic of `node` to the maintenance backend
    pub async fn disable_apis(&self, node: &Node) -> Result<()> {
        let target = node.target();
        let fs = RemoteFs::new(self.executor, &target);

        let main_path = self.config().main_config.clone();
        let main = fs.read(&main_path).await?;
        let fragments = self.fragments(&fs).await?;

        // Validate everything before the first write.
        for (path, content) in &fragments {
            if !self.rewriter.fragment_is_tcp(content) {
                return Err(ClusterError::PreconditionFailed {
                    node: node.to_string(),
                    path: path.clone(),
                    reason: "backend is not in mode tcp".to_string(),
                });
            }
        }

        let rewritten = self.rewriter.disable_main(&main);
        if rewritten != main {
            fs.write_atomic(&main_path, &rewritten).await?;
        }
        for (path, content) in &fragments {
            let rewritten = self.rewriter.disable_fragment(content);
            if &rewritten != content {
                debug!("Routing {} on {} to maintenance", path, node);
                fs.write_atomic(path, &rewritten).await?;
            }
        }

        info!("APIs disabled on {}", node);
        self.restart_balancer(node).await
    }

    /// Undo [`MaintenanceMode::disable_apis`] on `node`
    pub async fn enable_apis(&self, node: &Node) -> Result<()> {
        let target = node.target();
        let fs = RemoteFs::new(self.executor, &target);

        let main_path = self.config().main_config.clone();
        let main = fs.read(&main_path).await?;
        let rewritten = self.rewriter.enable_main(&main);
        if rewritten != main {
            fs.write_atomic(&main_path, &rewritten).await?;
        }

        for (path, content) in self.fragments(&fs).await? {
            let rewritten = self.rewriter.enable_fragment(&content);
            if rewritten != content {
                debug!("Restoring routing of {} on {}", path, node);
                fs.write_atomic(&path, &rewritten).await?;
            }
        }

        info!("APIs enabled on {}", node);
        self.restart_balancer(node).await
    }
}
