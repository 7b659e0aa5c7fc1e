//! Input files - WHERE resource payloads come from.
//!
//! An `InputFile` is a handle that can produce its bytes on demand. It
//! may be backed by a loose file on disk, an entry inside an opened zip
//! archive, or a segment (offset, length) of another input file. Handles
//! are reference counted so that values in the final table can keep
//! pointing at payloads inside input collections for the whole link.

use std::fmt;
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use zip::ZipArchive;

use crate::core::value::Source;

type SharedZip = Arc<Mutex<ZipArchive<fs::File>>>;

#[derive(Clone)]
enum Backing {
    Filesystem(PathBuf),
    ZipEntry {
        archive: SharedZip,
        entry_name: String,
    },
    Segment {
        parent: Arc<InputFile>,
        offset: u64,
        len: u64,
    },
}

impl fmt::Debug for Backing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Backing::Filesystem(path) => write!(f, "Filesystem({})", path.display()),
            Backing::ZipEntry { entry_name, .. } => write!(f, "ZipEntry({})", entry_name),
            Backing::Segment { offset, len, .. } => write!(f, "Segment({}+{})", offset, len),
        }
    }
}

/// A lazily-read input payload.
#[derive(Debug)]
pub struct InputFile {
    source: Source,
    backing: Backing,
}

impl InputFile {
    /// A handle backed by a loose file on disk.
    pub fn from_path(path: impl Into<PathBuf>) -> Arc<Self> {
        let path = path.into();
        Arc::new(InputFile {
            source: Source::new(path.clone()),
            backing: Backing::Filesystem(path),
        })
    }

    fn from_zip_entry(archive: SharedZip, archive_path: &Path, entry_name: String) -> Arc<Self> {
        Arc::new(InputFile {
            source: Source::new(format!("{}@{}", archive_path.display(), entry_name)),
            backing: Backing::ZipEntry {
                archive,
                entry_name,
            },
        })
    }

    /// A handle that reads `len` bytes at `offset` within this file.
    pub fn create_segment(self: &Arc<Self>, offset: u64, len: u64) -> Arc<InputFile> {
        Arc::new(InputFile {
            source: self.source.clone(),
            backing: Backing::Segment {
                parent: Arc::clone(self),
                offset,
                len,
            },
        })
    }

    /// Where this payload came from, for diagnostics.
    pub fn source(&self) -> &Source {
        &self.source
    }

    /// Read the whole payload.
    pub fn data(&self) -> Result<Vec<u8>> {
        match &self.backing {
            Backing::Filesystem(path) => {
                fs::read(path).with_context(|| format!("failed to read {}", path.display()))
            }
            Backing::ZipEntry {
                archive,
                entry_name,
            } => {
                let mut archive = archive.lock().unwrap();
                let mut entry = archive
                    .by_name(entry_name)
                    .with_context(|| format!("failed to open archive entry {}", entry_name))?;
                let mut data = Vec::with_capacity(entry.size() as usize);
                entry
                    .read_to_end(&mut data)
                    .with_context(|| format!("failed to read archive entry {}", entry_name))?;
                Ok(data)
            }
            Backing::Segment {
                parent,
                offset,
                len,
            } => {
                let data = parent.data()?;
                let start = *offset as usize;
                let end = start
                    .checked_add(*len as usize)
                    .filter(|&end| end <= data.len())
                    .with_context(|| {
                        format!("segment {}+{} out of bounds in {}", offset, len, parent.source)
                    })?;
                Ok(data[start..end].to_vec())
            }
        }
    }
}

/// Loose files registered from the command line.
#[derive(Debug, Default)]
pub struct FileCollection {
    files: Vec<Arc<InputFile>>,
}

impl FileCollection {
    pub fn new() -> Self {
        FileCollection::default()
    }

    /// Register a path and return its handle.
    pub fn insert_file(&mut self, path: impl Into<PathBuf>) -> Arc<InputFile> {
        let file = InputFile::from_path(path);
        self.files.push(Arc::clone(&file));
        file
    }
}

/// All entries of one opened zip archive.
#[derive(Debug)]
pub struct ZipFileCollection {
    files: Vec<Arc<InputFile>>,
}

impl ZipFileCollection {
    /// Open `path` and index every entry.
    pub fn open(path: &Path) -> Result<Self> {
        let file = fs::File::open(path)
            .with_context(|| format!("failed to open archive {}", path.display()))?;
        let archive = ZipArchive::new(file)
            .with_context(|| format!("malformed archive {}", path.display()))?;

        let entry_names: Vec<String> = archive.file_names().map(str::to_string).collect();
        let shared: SharedZip = Arc::new(Mutex::new(archive));

        let mut files = Vec::with_capacity(entry_names.len());
        for entry_name in entry_names {
            if entry_name.ends_with('/') {
                continue;
            }
            files.push(InputFile::from_zip_entry(
                Arc::clone(&shared),
                path,
                entry_name,
            ));
        }

        Ok(ZipFileCollection { files })
    }

    /// All file entries, in archive order.
    pub fn files(&self) -> &[Arc<InputFile>] {
        &self.files
    }

    /// Find an entry by its exact name.
    pub fn find_file(&self, entry_name: &str) -> Option<&Arc<InputFile>> {
        self.files.iter().find(|f| {
            f.source()
                .path
                .to_string_lossy()
                .ends_with(&format!("@{}", entry_name))
        })
    }
}
