/*
 * SPDX-FileCopyrightText: 2020 Stalwart Labs Ltd <hello@stalw.art>
 *
 * SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-SEL
 */

//! Archive sink and reader
//!
//! A backup is a single tar stream, optionally gzip or bzip2 compressed,
//! holding named entries in the order archivators produced them. Entries are
//! looked up by name on restore.

use std::{
    collections::HashSet,
    fmt,
    fs::{self, File},
    io::{self, BufReader, BufWriter, Cursor, Read, Write},
    path::{Path, PathBuf},
    time::{SystemTime, UNIX_EPOCH},
};

use tracing::{debug, info};

use crate::{
    compression::{CompressionLevel, CompressionType},
    error::{BackupError, Result},
    metrics,
};

/// Readable stream over one extracted entry
pub type EntryReader = Cursor<Vec<u8>>;

/// Where a backup is written
pub enum ArchiveTarget {
    /// A file, compression picked from its suffix unless given explicitly
    Path(PathBuf),
    /// Standard output, uncompressed unless given explicitly
    Stdout,
    /// Any other byte sink
    Writer(Box<dyn Write + Send>),
}

impl fmt::Debug for ArchiveTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArchiveTarget::Path(path) => f.debug_tuple("Path").field(path).finish(),
            ArchiveTarget::Stdout => f.write_str("Stdout"),
            ArchiveTarget::Writer(_) => f.write_str("Writer(..)"),
        }
    }
}

impl ArchiveTarget {
    /// `Some(path)` writes to a file, `None` streams to stdout
    pub fn from_option(path: Option<PathBuf>) -> Self {
        match path {
            Some(path) => ArchiveTarget::Path(path),
            None => ArchiveTarget::Stdout,
        }
    }
}

enum Encoder {
    Plain(Box<dyn Write + Send>),
    Gzip(flate2::write::GzEncoder<Box<dyn Write + Send>>),
    Bzip2(bzip2::write::BzEncoder<Box<dyn Write + Send>>),
}

impl Encoder {
    fn new(inner: Box<dyn Write + Send>, compression: CompressionType, level: CompressionLevel) -> Self {
        let level = level.to_level(compression);
        match compression {
            CompressionType::None => Encoder::Plain(inner),
            CompressionType::Gzip => {
                Encoder::Gzip(flate2::write::GzEncoder::new(inner, flate2::Compression::new(level)))
            }
            CompressionType::Bzip2 => {
                Encoder::Bzip2(bzip2::write::BzEncoder::new(inner, bzip2::Compression::new(level)))
            }
        }
    }

    fn finish(self) -> io::Result<Box<dyn Write + Send>> {
        match self {
            Encoder::Plain(inner) => Ok(inner),
            Encoder::Gzip(encoder) => encoder.finish(),
            Encoder::Bzip2(encoder) => encoder.finish(),
        }
    }
}

impl Write for Encoder {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Encoder::Plain(inner) => inner.write(buf),
            Encoder::Gzip(encoder) => encoder.write(buf),
            Encoder::Bzip2(encoder) => encoder.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Encoder::Plain(inner) => inner.flush(),
            Encoder::Gzip(encoder) => encoder.flush(),
            Encoder::Bzip2(encoder) => encoder.flush(),
        }
    }
}

/// Append-only archive sink
///
/// Dropping the writer without calling [`ArchiveWriter::finish`] still
/// writes the tar footer and compression trailer on a best-effort basis, so
/// an aborted pass never leaves a dangling open handle.
pub struct ArchiveWriter {
    builder: tar::Builder<Encoder>,
    names: HashSet<String>,
    order: Vec<String>,
    description: String,
}

impl fmt::Debug for ArchiveWriter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ArchiveWriter")
            .field("target", &self.description)
            .field("entries", &self.order.len())
            .finish()
    }
}

impl ArchiveWriter {
    /// Open a sink; `compression` overrides the suffix-based choice
    pub fn open(target: ArchiveTarget, compression: Option<CompressionType>) -> Result<Self> {
        Self::open_with_level(target, compression, CompressionLevel::Balanced)
    }

    pub fn open_with_level(
        target: ArchiveTarget,
        compression: Option<CompressionType>,
        level: CompressionLevel,
    ) -> Result<Self> {
        let (inner, compression, description): (Box<dyn Write + Send>, _, _) = match target {
            ArchiveTarget::Path(path) => {
                let compression = compression.unwrap_or_else(|| CompressionType::from_path(&path));
                let file = File::create(&path)?;
                (Box::new(BufWriter::new(file)), compression, path.display().to_string())
            }
            ArchiveTarget::Stdout => (
                Box::new(BufWriter::new(io::stdout())),
                compression.unwrap_or(CompressionType::None),
                "<stdout>".to_string(),
            ),
            ArchiveTarget::Writer(writer) => (
                writer,
                compression.unwrap_or(CompressionType::None),
                "<stream>".to_string(),
            ),
        };

        info!("Opening archive {} ({:?} compression)", description, compression);

        let mut builder = tar::Builder::new(Encoder::new(inner, compression, level));
        builder.follow_symlinks(false);

        Ok(Self {
            builder,
            names: HashSet::new(),
            order: Vec::new(),
            description,
        })
    }

    fn register(&mut self, name: &str) -> Result<()> {
        if !self.names.insert(name.to_string()) {
            return Err(BackupError::DuplicateEntry(name.to_string()));
        }
        self.order.push(name.to_string());
        Ok(())
    }

    /// Append a file or a whole directory tree under `name`
    pub fn add_path(&mut self, path: &Path, name: &str) -> Result<()> {
        let name = normalize_name(name);
        let metadata = fs::symlink_metadata(path)?;
        self.register(&name)?;

        debug!("Adding {} as {}", path.display(), name);
        if metadata.is_dir() {
            self.builder.append_dir_all(&name, path)?;
        } else {
            self.builder.append_path_with_name(path, &name)?;
        }

        metrics::record_entry(metadata.len());
        Ok(())
    }

    /// Append an in-memory byte stream as one regular file entry
    pub fn add_bytes(&mut self, name: &str, data: &[u8]) -> Result<()> {
        let name = normalize_name(name);
        self.register(&name)?;

        let mut header = tar::Header::new_gnu();
        header.set_entry_type(tar::EntryType::Regular);
        header.set_size(data.len() as u64);
        header.set_mode(0o644);
        header.set_mtime(
            SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|elapsed| elapsed.as_secs())
                .unwrap_or_default(),
        );
        header.set_cksum();

        debug!("Adding {} bytes as {}", data.len(), name);
        self.builder.append_data(&mut header, &name, data)?;

        metrics::record_entry(data.len() as u64);
        Ok(())
    }

    /// Entry names in insertion order
    pub fn entry_names(&self) -> &[String] {
        &self.order
    }

    /// Write the tar footer, finish compression and flush the target
    pub fn finish(self) -> Result<Vec<String>> {
        let ArchiveWriter {
            builder,
            order,
            description,
            ..
        } = self;

        let encoder = builder.into_inner()?;
        let mut inner = encoder.finish()?;
        inner.flush()?;

        info!("Closed archive {} with {} entries", description, order.len());
        Ok(order)
    }
}

/// Read side of an archive
#[derive(Debug, Clone)]
pub struct ArchiveReader {
    path: PathBuf,
    compression: CompressionType,
}

impl ArchiveReader {
    /// Open an archive file; `compression` overrides the suffix-based choice
    pub fn open(path: impl Into<PathBuf>, compression: Option<CompressionType>) -> Result<Self> {
        let path = path.into();
        if !path.is_file() {
            return Err(BackupError::ArchiveNotFound(path));
        }
        let compression = compression.unwrap_or_else(|| CompressionType::from_path(&path));
        info!("Opening archive {} for reading ({:?} compression)", path.display(), compression);
        Ok(Self { path, compression })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn archive(&self) -> Result<tar::Archive<Box<dyn Read>>> {
        let file = BufReader::new(File::open(&self.path)?);
        let reader: Box<dyn Read> = match self.compression {
            CompressionType::None => Box::new(file),
            CompressionType::Gzip => Box::new(flate2::read::GzDecoder::new(file)),
            CompressionType::Bzip2 => Box::new(bzip2::read::BzDecoder::new(file)),
        };
        Ok(tar::Archive::new(reader))
    }

    /// Every entry name, in archive order
    pub fn names(&self) -> Result<Vec<String>> {
        let mut archive = self.archive()?;
        let mut names = Vec::new();
        for entry in archive.entries()? {
            names.push(entry_name(&entry?)?);
        }
        Ok(names)
    }

    pub fn contains(&self, name: &str) -> Result<bool> {
        let name = normalize_name(name);
        Ok(self.names()?.iter().any(|entry| entry == &name))
    }

    /// Read one regular-file entry by name
    pub fn extract(&self, name: &str) -> Result<EntryReader> {
        let name = normalize_name(name);
        let mut archive = self.archive()?;
        for entry in archive.entries()? {
            let mut entry = entry?;
            if entry.header().entry_type().is_file() && entry_name(&entry)? == name {
                let mut data = Vec::with_capacity(entry.size() as usize);
                entry.read_to_end(&mut data)?;
                return Ok(Cursor::new(data));
            }
        }
        Err(BackupError::EntryNotFound(name))
    }

    /// Unpack the entry `prefix` and everything below it into `dest`.
    ///
    /// Returns the number of unpacked entries.
    pub fn unpack(&self, prefix: &str, dest: &Path) -> Result<usize> {
        let prefix = normalize_name(prefix);
        let mut archive = self.archive()?;
        let mut unpacked = 0;

        for entry in archive.entries()? {
            let mut entry = entry?;
            let name = entry_name(&entry)?;
            let relative = if name == prefix {
                ""
            } else if let Some(rest) = name.strip_prefix(&format!("{}/", prefix)) {
                rest
            } else {
                continue;
            };

            let target = if relative.is_empty() {
                dest.to_path_buf()
            } else {
                dest.join(relative)
            };
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent)?;
            }
            entry.unpack(&target)?;
            unpacked += 1;
        }

        if unpacked == 0 {
            return Err(BackupError::EntryNotFound(prefix));
        }
        Ok(unpacked)
    }
}

fn entry_name<R: Read>(entry: &tar::Entry<'_, R>) -> Result<String> {
    Ok(normalize_name(&entry.path()?.to_string_lossy()))
}

fn normalize_name(name: &str) -> String {
    name.trim_start_matches("./")
        .trim_start_matches('/')
        .trim_end_matches('/')
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;
    use tempfile::TempDir;

    fn write_sample(path: &Path, compression: Option<CompressionType>) {
        let mut writer = ArchiveWriter::open(ArchiveTarget::Path(path.to_path_buf()), compression).unwrap();
        writer.add_bytes("databases/nailgun.sql", b"CREATE TABLE nodes;").unwrap();
        writer.add_bytes("astute/astute.yaml", b"ADMIN_NETWORK: {}").unwrap();
        writer.finish().unwrap();
    }

    #[test]
    fn test_entries_are_readable_by_name_for_every_compression() {
        let dir = TempDir::new().unwrap();
        for file in ["backup.tar", "backup.tar.gz", "backup.tar.bz2"] {
            let path = dir.path().join(file);
            write_sample(&path, None);

            let reader = ArchiveReader::open(&path, None).unwrap();
            assert_eq!(reader.names().unwrap(), vec!["databases/nailgun.sql", "astute/astute.yaml"]);

            let mut content = String::new();
            reader
                .extract("astute/astute.yaml")
                .unwrap()
                .read_to_string(&mut content)
                .unwrap();
            assert_eq!(content, "ADMIN_NETWORK: {}");
        }
    }

    #[test]
    fn test_suffix_selects_gzip_stream() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("backup.tar.gz");
        write_sample(&path, None);

        let raw = fs::read(&path).unwrap();
        assert_eq!(&raw[..2], &[0x1f, 0x8b]);
    }

    #[test]
    fn test_duplicate_names_are_rejected() {
        let dir = TempDir::new().unwrap();
        let mut writer =
            ArchiveWriter::open(ArchiveTarget::Path(dir.path().join("dup.tar")), None).unwrap();
        writer.add_bytes("ssh", b"key").unwrap();
        assert!(matches!(
            writer.add_bytes("/ssh", b"other"),
            Err(BackupError::DuplicateEntry(name)) if name == "ssh"
        ));
    }

    #[test]
    fn test_dropped_writer_still_closes_archive() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("aborted.tar");
        {
            let mut writer = ArchiveWriter::open(ArchiveTarget::Path(path.clone()), None).unwrap();
            writer.add_bytes("partial", b"data").unwrap();
        }
        let reader = ArchiveReader::open(&path, None).unwrap();
        assert_eq!(reader.names().unwrap(), vec!["partial"]);
    }

    #[test]
    fn test_directory_tree_round_trips_through_unpack() {
        let source = TempDir::new().unwrap();
        fs::create_dir_all(source.path().join("keys")).unwrap();
        fs::write(source.path().join("keys/id_rsa"), b"private").unwrap();
        fs::write(source.path().join("authorized_keys"), b"public").unwrap();

        let dir = TempDir::new().unwrap();
        let path = dir.path().join("tree.tar");
        let mut writer = ArchiveWriter::open(ArchiveTarget::Path(path.clone()), None).unwrap();
        writer.add_path(source.path(), "ssh").unwrap();
        writer.finish().unwrap();

        let restored = dir.path().join("restored");
        let reader = ArchiveReader::open(&path, None).unwrap();
        assert!(reader.unpack("ssh", &restored).unwrap() >= 3);
        assert_eq!(fs::read(restored.join("keys/id_rsa")).unwrap(), b"private");
        assert_eq!(fs::read(restored.join("authorized_keys")).unwrap(), b"public");
    }

    #[test]
    fn test_missing_entry_and_archive() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("backup.tar");
        write_sample(&path, None);

        let reader = ArchiveReader::open(&path, None).unwrap();
        assert!(matches!(reader.extract("nope"), Err(BackupError::EntryNotFound(_))));
        assert!(matches!(
            ArchiveReader::open(dir.path().join("absent.tar"), None),
            Err(BackupError::ArchiveNotFound(_))
        ));
    }
}
