/*
 * SPDX-FileCopyrightText: 2024 A3Mailer Project
 *
 * SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-SEL
 */

//! Scripted executor for tests
//!
//! Records every invocation and answers from canned responses, falling back
//! to a dynamic handler and finally to an empty successful output.

use std::{collections::VecDeque, fmt, io::Cursor, sync::Arc};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::io::{AsyncRead, AsyncWrite};

use crate::{
    error::Result,
    executor::{command_line, CommandOutput, RemoteExecutor, RemoteProcess, Target},
};

/// One recorded command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub target: Target,
    pub argv: Vec<String>,
    pub stdin: Option<Vec<u8>>,
}

impl fmt::Display for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.target, command_line(&self.argv))
    }
}

type Handler = Box<dyn Fn(&Invocation) -> Option<CommandOutput> + Send + Sync>;

struct Rule {
    target: Option<Target>,
    prefix: Vec<String>,
    once: VecDeque<CommandOutput>,
    sticky: Option<CommandOutput>,
}

impl Rule {
    fn matches(&self, invocation: &Invocation) -> bool {
        self.target
            .as_ref()
            .map_or(true, |target| target == &invocation.target)
            && invocation.argv.starts_with(&self.prefix)
    }
}

#[derive(Default)]
struct Inner {
    rules: Vec<Rule>,
    handler: Option<Handler>,
    invocations: Vec<Invocation>,
}

impl Inner {
    fn rule_mut(&mut self, target: Option<Target>, prefix: Vec<String>) -> &mut Rule {
        let position = self
            .rules
            .iter()
            .position(|rule| rule.target == target && rule.prefix == prefix);
        let index = match position {
            Some(index) => index,
            None => {
                self.rules.push(Rule {
                    target,
                    prefix,
                    once: VecDeque::new(),
                    sticky: None,
                });
                self.rules.len() - 1
            }
        };
        &mut self.rules[index]
    }

    fn answer(&mut self, invocation: Invocation) -> CommandOutput {
        // Longest matching prefix wins so specific scripts shadow generic ones.
        let mut best: Option<usize> = None;
        for (index, rule) in self.rules.iter().enumerate() {
            let usable = !rule.once.is_empty() || rule.sticky.is_some();
            if usable && rule.matches(&invocation) {
                let longer = best.map_or(true, |b| self.rules[b].prefix.len() < rule.prefix.len());
                if longer {
                    best = Some(index);
                }
            }
        }

        let output = match best {
            Some(index) => {
                let rule = &mut self.rules[index];
                match rule.once.pop_front() {
                    Some(output) => output,
                    None => rule.sticky.clone().unwrap_or_default(),
                }
            }
            None => self
                .handler
                .as_ref()
                .and_then(|handler| handler(&invocation))
                .unwrap_or_else(|| CommandOutput::ok(Vec::new())),
        };

        self.invocations.push(invocation);
        output
    }
}

/// Executor double that never touches a real process
#[derive(Clone, Default)]
pub struct ScriptedExecutor {
    inner: Arc<Mutex<Inner>>,
}

impl fmt::Debug for ScriptedExecutor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScriptedExecutor")
            .field("invocations", &self.inner.lock().invocations.len())
            .finish()
    }
}

fn owned(prefix: &[&str]) -> Vec<String> {
    prefix.iter().map(|part| part.to_string()).collect()
}

impl ScriptedExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer every matching command with `output`
    pub fn respond(&self, target: Target, prefix: &[&str], output: CommandOutput) {
        self.inner.lock().rule_mut(Some(target), owned(prefix)).sticky = Some(output);
    }

    /// Answer every matching command on any target with `output`
    pub fn respond_anywhere(&self, prefix: &[&str], output: CommandOutput) {
        self.inner.lock().rule_mut(None, owned(prefix)).sticky = Some(output);
    }

    /// Queue a one-shot answer, consumed before any sticky answer
    pub fn respond_once(&self, target: Target, prefix: &[&str], output: CommandOutput) {
        self.inner
            .lock()
            .rule_mut(Some(target), owned(prefix))
            .once
            .push_back(output);
    }

    /// Dynamic answers for commands no rule matches
    pub fn set_handler<F>(&self, handler: F)
    where
        F: Fn(&Invocation) -> Option<CommandOutput> + Send + Sync + 'static,
    {
        self.inner.lock().handler = Some(Box::new(handler));
    }

    pub fn invocations(&self) -> Vec<Invocation> {
        self.inner.lock().invocations.clone()
    }

    /// Invocations rendered as `"<target>: <command line>"`
    pub fn commands(&self) -> Vec<String> {
        self.inner
            .lock()
            .invocations
            .iter()
            .map(ToString::to_string)
            .collect()
    }

    /// Number of recorded invocations starting with `prefix`
    pub fn count(&self, prefix: &[&str]) -> usize {
        let prefix = owned(prefix);
        self.inner
            .lock()
            .invocations
            .iter()
            .filter(|invocation| invocation.argv.starts_with(&prefix))
            .count()
    }
}

#[async_trait]
impl RemoteExecutor for ScriptedExecutor {
    async fn run(
        &self,
        target: &Target,
        argv: &[String],
        stdin: Option<&[u8]>,
    ) -> Result<CommandOutput> {
        Ok(self.inner.lock().answer(Invocation {
            target: target.clone(),
            argv: argv.to_vec(),
            stdin: stdin.map(<[u8]>::to_vec),
        }))
    }

    async fn spawn(&self, target: &Target, argv: &[String]) -> Result<Box<dyn RemoteProcess>> {
        Ok(Box::new(ScriptedProcess {
            inner: self.inner.clone(),
            target: target.clone(),
            argv: argv.to_vec(),
            stdin: Vec::new(),
            stdout: Cursor::new(Vec::new()),
        }))
    }
}

/// Spawned scripted command; the scripted answer is produced by `wait`
struct ScriptedProcess {
    inner: Arc<Mutex<Inner>>,
    target: Target,
    argv: Vec<String>,
    stdin: Vec<u8>,
    stdout: Cursor<Vec<u8>>,
}

#[async_trait]
impl RemoteProcess for ScriptedProcess {
    fn stdin(&mut self) -> Option<&mut (dyn AsyncWrite + Send + Unpin)> {
        Some(&mut self.stdin)
    }

    fn stdout(&mut self) -> Option<&mut (dyn AsyncRead + Send + Unpin)> {
        Some(&mut self.stdout)
    }

    async fn wait(self: Box<Self>) -> Result<CommandOutput> {
        let ScriptedProcess {
            inner,
            target,
            argv,
            stdin,
            ..
        } = *self;
        let output = inner.lock().answer(Invocation {
            target,
            argv,
            stdin: Some(stdin),
        });
        Ok(output)
    }
}
