//! Input collections and output archives.

pub mod archive;
pub mod file;

pub use archive::{ArchiveWriter, Compression, DirectoryArchiveWriter, ZipArchiveWriter};
pub use file::{FileCollection, InputFile, ZipFileCollection};
