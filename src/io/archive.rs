//! Output archive writers.
//!
//! Entries are written with the non-reentrant sequence
//! `start_entry` / `write_entry`* / `finish_entry`; `finish` seals the
//! archive. Two backends exist: a zip file (the normal APK output) and a
//! plain directory tree (`--output-to-dir`).

use std::fs;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

/// How an entry is stored in the archive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compression {
    /// Deflate-compressed.
    Deflate,
    /// Stored uncompressed.
    Store,
    /// Stored uncompressed and 4-byte aligned for mmap access.
    Aligned,
}

/// Sink for named archive entries.
pub trait ArchiveWriter {
    fn start_entry(&mut self, path: &str, compression: Compression) -> Result<()>;
    fn write_entry(&mut self, data: &[u8]) -> Result<()>;
    fn finish_entry(&mut self) -> Result<()>;

    /// Seal the archive. Must be called exactly once, after the last entry.
    fn finish(&mut self) -> Result<()>;
}

/// Write a complete entry in one call.
pub fn write_whole_entry(
    writer: &mut dyn ArchiveWriter,
    path: &str,
    compression: Compression,
    data: &[u8],
) -> Result<()> {
    writer.start_entry(path, compression)?;
    writer.write_entry(data)?;
    writer.finish_entry()
}

/// Writes entries into a zip file.
pub struct ZipArchiveWriter {
    path: PathBuf,
    writer: Option<ZipWriter<BufWriter<fs::File>>>,
    in_entry: bool,
}

impl ZipArchiveWriter {
    pub fn create(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            crate::util::fs::ensure_dir(parent)?;
        }
        let file = fs::File::create(path)
            .with_context(|| format!("failed to create archive {}", path.display()))?;
        Ok(ZipArchiveWriter {
            path: path.to_path_buf(),
            writer: Some(ZipWriter::new(BufWriter::new(file))),
            in_entry: false,
        })
    }

    fn writer(&mut self) -> Result<&mut ZipWriter<BufWriter<fs::File>>> {
        self.writer
            .as_mut()
            .with_context(|| format!("archive {} already finished", self.path.display()))
    }
}

impl ArchiveWriter for ZipArchiveWriter {
    fn start_entry(&mut self, path: &str, compression: Compression) -> Result<()> {
        if self.in_entry {
            bail!("previous entry not finished");
        }
        let options = match compression {
            Compression::Deflate => {
                SimpleFileOptions::default().compression_method(CompressionMethod::Deflated)
            }
            Compression::Store => {
                SimpleFileOptions::default().compression_method(CompressionMethod::Stored)
            }
            Compression::Aligned => SimpleFileOptions::default()
                .compression_method(CompressionMethod::Stored)
                .with_alignment(4),
        };
        let name = path.to_string();
        self.writer()?
            .start_file(name, options)
            .with_context(|| format!("failed to start archive entry {}", path))?;
        self.in_entry = true;
        Ok(())
    }

    fn write_entry(&mut self, data: &[u8]) -> Result<()> {
        if !self.in_entry {
            bail!("no entry started");
        }
        self.writer()?
            .write_all(data)
            .context("failed to write archive entry")
    }

    fn finish_entry(&mut self) -> Result<()> {
        if !self.in_entry {
            bail!("no entry started");
        }
        self.in_entry = false;
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        let writer = self
            .writer
            .take()
            .with_context(|| format!("archive {} already finished", self.path.display()))?;
        writer
            .finish()
            .with_context(|| format!("failed to finish archive {}", self.path.display()))?;
        Ok(())
    }
}

/// Writes entries as plain files under a directory.
pub struct DirectoryArchiveWriter {
    root: PathBuf,
    current: Option<fs::File>,
}

impl DirectoryArchiveWriter {
    pub fn create(root: &Path) -> Result<Self> {
        crate::util::fs::ensure_dir(root)?;
        Ok(DirectoryArchiveWriter {
            root: root.to_path_buf(),
            current: None,
        })
    }
}

impl ArchiveWriter for DirectoryArchiveWriter {
    fn start_entry(&mut self, path: &str, _compression: Compression) -> Result<()> {
        if self.current.is_some() {
            bail!("previous entry not finished");
        }
        let out_path = self.root.join(path);
        if let Some(parent) = out_path.parent() {
            crate::util::fs::ensure_dir(parent)?;
        }
        let file = fs::File::create(&out_path)
            .with_context(|| format!("failed to create {}", out_path.display()))?;
        self.current = Some(file);
        Ok(())
    }

    fn write_entry(&mut self, data: &[u8]) -> Result<()> {
        match &mut self.current {
            Some(file) => file.write_all(data).context("failed to write entry"),
            None => bail!("no entry started"),
        }
    }

    fn finish_entry(&mut self) -> Result<()> {
        if self.current.take().is_none() {
            bail!("no entry started");
        }
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_zip_writer_round_trip() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("out.apk");

        let mut writer = ZipArchiveWriter::create(&path).unwrap();
        write_whole_entry(&mut writer, "AndroidManifest.xml", Compression::Deflate, b"<m/>")
            .unwrap();
        write_whole_entry(&mut writer, "resources.arsc", Compression::Aligned, b"RES2")
            .unwrap();
        writer.finish().unwrap();

        let mut archive = zip::ZipArchive::new(fs::File::open(&path).unwrap()).unwrap();
        assert_eq!(archive.len(), 2);
        {
            let entry = archive.by_name("resources.arsc").unwrap();
            assert_eq!(entry.compression(), CompressionMethod::Stored);
        }
        let entry = archive.by_name("AndroidManifest.xml").unwrap();
        assert_eq!(entry.compression(), CompressionMethod::Deflated);
    }

    #[test]
    fn test_entry_sequence_is_enforced() {
        let tmp = TempDir::new().unwrap();
        let mut writer = ZipArchiveWriter::create(&tmp.path().join("out.apk")).unwrap();

        assert!(writer.write_entry(b"data").is_err());
        writer.start_entry("a.txt", Compression::Deflate).unwrap();
        assert!(writer.start_entry("b.txt", Compression::Deflate).is_err());
        writer.finish_entry().unwrap();
        assert!(writer.finish_entry().is_err());
    }

    #[test]
    fn test_directory_writer() {
        let tmp = TempDir::new().unwrap();
        let out = tmp.path().join("apk");

        let mut writer = DirectoryArchiveWriter::create(&out).unwrap();
        write_whole_entry(
            &mut writer,
            "res/layout/main.xml",
            Compression::Deflate,
            b"<x/>",
        )
        .unwrap();
        writer.finish().unwrap();

        assert_eq!(fs::read(out.join("res/layout/main.xml")).unwrap(), b"<x/>");
    }
}
