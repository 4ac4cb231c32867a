/*
 * SPDX-FileCopyrightText: 2024 A3Mailer Project
 *
 * SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-SEL
 */

//! # Common
//!
//! Remote execution primitives shared by the archive and maintenance crates:
//!
//! - [`RemoteExecutor`] contract with plain, raising and streaming variants
//! - [`ShellExecutor`] backed by local processes, a remote shell client and
//!   the container runtime's exec command
//! - A scripted executor for tests behind the `test_mode` feature

pub mod config;
pub mod error;
pub mod executor;
pub mod shell;
#[cfg(any(test, feature = "test_mode"))]
pub mod testing;

pub use config::RemoteConfig;
pub use error::{CommandFailureInfo, ExecutionError, Result};
pub use executor::{argv, command_line, CommandOutput, RemoteExecutor, RemoteProcess, Target};
pub use shell::ShellExecutor;
