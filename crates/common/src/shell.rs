/*
 * SPDX-FileCopyrightText: 2024 A3Mailer Project
 *
 * SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-SEL
 */

//! Process-backed executor
//!
//! Local commands are spawned directly, node commands go through the remote
//! shell client and container commands through the configured exec prefix.

use std::process::Stdio;

use async_trait::async_trait;
use tokio::{
    io::{AsyncRead, AsyncWrite, AsyncWriteExt},
    process::{Child, Command},
};
use tracing::debug;

use crate::{
    config::RemoteConfig,
    error::{ExecutionError, Result},
    executor::{command_line, CommandOutput, RemoteExecutor, RemoteProcess, Target},
};

/// Executor backed by local processes
#[derive(Debug, Clone, Default)]
pub struct ShellExecutor {
    config: RemoteConfig,
}

impl ShellExecutor {
    pub fn new(config: RemoteConfig) -> Self {
        Self { config }
    }

    /// Translate a target and argv into the process that has to be spawned
    pub fn build_command(&self, target: &Target, argv: &[String]) -> Result<Command> {
        let (program, args) = argv
            .split_first()
            .ok_or_else(|| ExecutionError::EmptyCommand(target.clone()))?;

        let command = match target {
            Target::Local => {
                let mut command = Command::new(program);
                command.args(args);
                command
            }
            Target::Node(address) => {
                let mut command = Command::new(&self.config.ssh_binary);
                command
                    .args(&self.config.ssh_options)
                    .arg(format!("{}@{}", self.config.ssh_user, address))
                    .arg("--")
                    .arg(shell_join(argv));
                command
            }
            Target::Container(name) => {
                let (exec, exec_args) = self
                    .config
                    .container_exec
                    .split_first()
                    .ok_or_else(|| ExecutionError::EmptyCommand(target.clone()))?;
                let mut command = Command::new(exec);
                command.args(exec_args).arg(name).args(argv);
                command
            }
        };

        Ok(command)
    }

    fn start(&self, target: &Target, argv: &[String], stdin: Stdio) -> Result<Child> {
        let mut command = self.build_command(target, argv)?;
        command
            .stdin(stdin)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(false);

        debug!("Running [{}] on {}", command_line(argv), target);

        command.spawn().map_err(|err| ExecutionError::ExecutionStart {
            target: target.clone(),
            command: command_line(argv),
            err,
        })
    }
}

#[async_trait]
impl RemoteExecutor for ShellExecutor {
    async fn run(
        &self,
        target: &Target,
        argv: &[String],
        stdin: Option<&[u8]>,
    ) -> Result<CommandOutput> {
        let stdin_mode = if stdin.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        };
        let mut child = self.start(target, argv, stdin_mode)?;
        let pipe = child.stdin.take();

        // Feed stdin while draining stdout/stderr so neither side blocks.
        let feed = async move {
            if let (Some(mut pipe), Some(bytes)) = (pipe, stdin) {
                pipe.write_all(bytes).await?;
                pipe.shutdown().await?;
            }
            Ok::<_, std::io::Error>(())
        };
        let (fed, output) = tokio::join!(feed, child.wait_with_output());

        let output = output.map_err(|err| ExecutionError::Stream {
            target: target.clone(),
            command: command_line(argv),
            err,
        })?;
        let output = CommandOutput {
            stdout: output.stdout,
            stderr: output.stderr,
            status: output.status.code(),
        };

        // A child that exits early closes its stdin; its own status explains more.
        if let Err(err) = fed {
            if output.success() {
                return Err(ExecutionError::Stream {
                    target: target.clone(),
                    command: command_line(argv),
                    err,
                });
            }
        }

        Ok(output)
    }

    async fn spawn(&self, target: &Target, argv: &[String]) -> Result<Box<dyn RemoteProcess>> {
        let child = self.start(target, argv, Stdio::piped())?;
        Ok(Box::new(ShellProcess {
            child,
            target: target.clone(),
            command: command_line(argv),
        }))
    }
}

struct ShellProcess {
    child: Child,
    target: Target,
    command: String,
}

#[async_trait]
impl RemoteProcess for ShellProcess {
    fn stdin(&mut self) -> Option<&mut (dyn AsyncWrite + Send + Unpin)> {
        self.child
            .stdin
            .as_mut()
            .map(|pipe| pipe as &mut (dyn AsyncWrite + Send + Unpin))
    }

    fn stdout(&mut self) -> Option<&mut (dyn AsyncRead + Send + Unpin)> {
        self.child
            .stdout
            .as_mut()
            .map(|pipe| pipe as &mut (dyn AsyncRead + Send + Unpin))
    }

    async fn wait(mut self: Box<Self>) -> Result<CommandOutput> {
        if let Some(mut pipe) = self.child.stdin.take() {
            pipe.shutdown().await.map_err(|err| ExecutionError::Stream {
                target: self.target.clone(),
                command: self.command.clone(),
                err,
            })?;
        }

        let ShellProcess {
            child,
            target,
            command,
        } = *self;
        let output = child
            .wait_with_output()
            .await
            .map_err(|err| ExecutionError::Stream {
                target,
                command,
                err,
            })?;

        Ok(CommandOutput {
            stdout: output.stdout,
            stderr: output.stderr,
            status: output.status.code(),
        })
    }
}

/// Quote an argv for a POSIX shell on the far side of the remote shell client
pub fn shell_join(argv: &[String]) -> String {
    argv.iter()
        .map(|arg| shell_quote(arg))
        .collect::<Vec<_>>()
        .join(" ")
}

fn shell_quote(arg: &str) -> String {
    let safe = !arg.is_empty()
        && arg
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "_-./=:,@%+".contains(c));
    if safe {
        arg.to_string()
    } else {
        format!("'{}'", arg.replace('\'', r"'\''"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::argv;

    #[test]
    fn test_shell_join_quotes_only_when_needed() {
        let line = shell_join(&argv([
            "sed",
            "-re",
            "s/^(nova_admin_tenant_id )=.*/\\1 = abc/",
            "-i",
            "/etc/neutron/neutron.conf",
        ]));
        assert_eq!(
            line,
            "sed -re 's/^(nova_admin_tenant_id )=.*/\\1 = abc/' -i /etc/neutron/neutron.conf"
        );
        assert_eq!(shell_join(&argv(["echo", "it's"])), r"echo 'it'\''s'");
        assert_eq!(shell_join(&argv(["printf", ""])), "printf ''");
    }

    #[test]
    fn test_build_command_for_node_uses_remote_shell() {
        let executor = ShellExecutor::default();
        let command = executor
            .build_command(&Target::node("10.20.0.3"), &argv(["initctl", "list"]))
            .unwrap();
        let std = command.as_std();

        assert_eq!(std.get_program(), "ssh");
        let args: Vec<_> = std.get_args().map(|a| a.to_string_lossy().into_owned()).collect();
        assert_eq!(
            args,
            vec![
                "-o",
                "BatchMode=yes",
                "-o",
                "StrictHostKeyChecking=no",
                "root@10.20.0.3",
                "--",
                "initctl list"
            ]
        );
    }

    #[test]
    fn test_build_command_for_container_uses_exec_prefix() {
        let executor = ShellExecutor::default();
        let command = executor
            .build_command(&Target::container("postgres"), &argv(["sudo", "-u", "postgres", "psql"]))
            .unwrap();
        let std = command.as_std();

        assert_eq!(std.get_program(), "dockerctl");
        let args: Vec<_> = std.get_args().map(|a| a.to_string_lossy().into_owned()).collect();
        assert_eq!(args, vec!["shell", "postgres", "sudo", "-u", "postgres", "psql"]);
    }

    #[test]
    fn test_empty_argv_is_rejected() {
        let executor = ShellExecutor::default();
        assert!(matches!(
            executor.build_command(&Target::Local, &[]),
            Err(ExecutionError::EmptyCommand(Target::Local))
        ));
    }

    #[tokio::test]
    async fn test_local_run_captures_output_and_stdin() {
        let executor = ShellExecutor::default();
        let output = executor
            .run(&Target::Local, &argv(["cat"]), Some(b"piped dump"))
            .await
            .unwrap();
        assert!(output.success());
        assert_eq!(output.stdout, b"piped dump");

        let failed = executor
            .call(&Target::Local, &argv(["sh", "-c", "echo boom >&2; exit 3"]))
            .await
            .unwrap_err();
        assert_eq!(failed.stderr(), Some("boom\n"));
    }
}
