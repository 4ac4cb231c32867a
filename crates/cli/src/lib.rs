/*
 * SPDX-FileCopyrightText: 2024 A3Mailer Project
 *
 * SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-SEL
 */

//! Upgrade CLI Library
//!
//! Command definitions and handlers of the upgrade toolkit front end: archive
//! backup and restore, controller maintenance and the control plane switch.

pub mod modules;

pub use modules::{
    cli::{BackupCommand, Cli, Commands, Compression, MaintenanceCommands, RestoreCommand},
    Context,
};
