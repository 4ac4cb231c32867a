/*
 * SPDX-FileCopyrightText: 2020 Stalwart Labs Ltd <hello@stalw.art>
 *
 * SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-SEL
 */

//! Compression support for archives

use std::path::Path;

use serde::{Deserialize, Serialize};

/// Compression configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CompressionConfig {
    pub level: CompressionLevel,
}

/// Supported compression types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompressionType {
    None,
    Gzip,
    Bzip2,
}

/// Compression level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompressionLevel {
    Fast,
    Balanced,
    Best,
    Custom(u32),
}

impl Default for CompressionConfig {
    fn default() -> Self {
        Self {
            level: CompressionLevel::Balanced,
        }
    }
}

impl CompressionType {
    /// Pick the compression from an archive path's suffix: `.gz`, `.bz2` or none
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("gz") => CompressionType::Gzip,
            Some("bz2") => CompressionType::Bzip2,
            _ => CompressionType::None,
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            CompressionType::None => "",
            CompressionType::Gzip => ".gz",
            CompressionType::Bzip2 => ".bz2",
        }
    }
}

impl CompressionLevel {
    pub fn to_level(&self, compression_type: CompressionType) -> u32 {
        match (self, compression_type) {
            (_, CompressionType::None) => 0,
            (CompressionLevel::Fast, _) => 1,
            (CompressionLevel::Balanced, CompressionType::Gzip) => 6,
            (CompressionLevel::Balanced, CompressionType::Bzip2) => 6,
            (CompressionLevel::Best, _) => 9,
            (CompressionLevel::Custom(level), _) => (*level).clamp(1, 9),
        }
    }
}
