/*
 * SPDX-FileCopyrightText: 2020 Stalwart Labs Ltd <hello@stalw.art>
 *
 * SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-SEL
 */

//! In-memory cluster for tests
//!
//! Wraps a [`ScriptedExecutor`] whose fallback handler emulates the handful
//! of file commands the orchestrator runs on nodes. Scripted rules still take
//! priority, so tests can answer `crm`, `initctl` and friends explicitly.

use std::{collections::BTreeMap, sync::Arc};

use common::{testing::ScriptedExecutor, CommandOutput, Target};
use parking_lot::Mutex;

type Files = Arc<Mutex<BTreeMap<(String, String), String>>>;

pub struct FakeCluster {
    pub executor: ScriptedExecutor,
    files: Files,
}

impl FakeCluster {
    pub fn new() -> Self {
        let executor = ScriptedExecutor::new();
        let files: Files = Arc::default();

        let handler_files = files.clone();
        executor.set_handler(move |invocation| {
            let Target::Node(node) = &invocation.target else {
                return None;
            };
            let args: Vec<&str> = invocation.argv.iter().map(String::as_str).collect();
            let mut files = handler_files.lock();
            let key = |path: &str| (node.clone(), path.to_string());

            match *args.as_slice() {
                ["cat", path] => Some(match files.get(&key(path)) {
                    Some(content) => CommandOutput::ok(content.clone()),
                    None => CommandOutput::failed(
                        1,
                        format!("cat: {}: No such file or directory", path),
                    ),
                }),
                ["test", "-e", path] => Some(if files.contains_key(&key(path)) {
                    CommandOutput::ok("")
                } else {
                    CommandOutput::failed(1, "")
                }),
                ["ls", "-1", dir] => {
                    let prefix = format!("{}/", dir.trim_end_matches('/'));
                    let names: Vec<String> = files
                        .keys()
                        .filter(|(owner, path)| owner == node && path.starts_with(&prefix))
                        .map(|(_, path)| path[prefix.len()..].to_string())
                        .filter(|name| !name.contains('/'))
                        .collect();
                    Some(CommandOutput::ok(names.join("\n")))
                }
                ["tee", path] => {
                    let content =
                        String::from_utf8_lossy(invocation.stdin.as_deref().unwrap_or_default())
                            .into_owned();
                    files.insert(key(path), content.clone());
                    Some(CommandOutput::ok(content))
                }
                ["mv", "-f", from, to] => Some(match files.remove(&key(from)) {
                    Some(content) => {
                        files.insert(key(to), content);
                        CommandOutput::ok("")
                    }
                    None => CommandOutput::failed(1, format!("mv: cannot stat '{}'", from)),
                }),
                ["rm", "-f", path] => {
                    files.remove(&key(path));
                    Some(CommandOutput::ok(""))
                }
                _ => None,
            }
        });

        Self { executor, files }
    }

    pub fn put(&self, node: &str, path: &str, content: &str) {
        self.files
            .lock()
            .insert((node.to_string(), path.to_string()), content.to_string());
    }

    pub fn get(&self, node: &str, path: &str) -> Option<String> {
        self.files
            .lock()
            .get(&(node.to_string(), path.to_string()))
            .cloned()
    }
}
