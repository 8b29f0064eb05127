//! Lookup of a single named entry inside ZIP or TAR content.
//!
//! Entries are scanned in stored order and the first exact name match wins.
//! A missing entry is `Ok(None)`; a corrupt container is an `InvalidData` error.
//!
//! Seekable ZIP sources are read through the central directory, so only the matching
//! entry's data is touched. Sequential sources are scanned header by header; that path
//! cannot size entries written with trailing data descriptors and reports them as corrupt.

use std::io::{self, Read, Write};

use tracing::trace;
use zip::read::{read_zipfile_from_stream, ZipFile};
use zip::result::ZipError;
use zip::ZipArchive;

use crate::node::{SeekableRead, Source};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveFormat {
    Zip,
    Tar,
}

fn zip_err(e: ZipError) -> io::Error {
    match e {
        ZipError::Io(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
            io::Error::new(io::ErrorKind::InvalidData, format!("truncated zip content: {e}"))
        }
        ZipError::Io(e) => e,
        other => io::Error::new(io::ErrorKind::InvalidData, other),
    }
}

/// Find `name` through the central directory and run `f` over it.
fn zip_indexed<T>(
    src: &mut dyn SeekableRead,
    name: &str,
    f: impl FnOnce(&mut ZipFile<'_>) -> io::Result<T>,
) -> io::Result<Option<T>> {
    let mut archive = ZipArchive::new(src).map_err(zip_err)?;
    let index = (0..archive.len()).find(|&i| archive.name_for_index(i) == Some(name));
    match index {
        Some(i) => {
            let mut file = archive.by_index(i).map_err(zip_err)?;
            f(&mut file).map(Some)
        }
        None => Ok(None),
    }
}

/// Walk local headers from the start of the stream until `name` or the central directory.
fn zip_scan<T>(
    mut src: &mut dyn Read,
    name: &str,
    f: impl FnOnce(&mut ZipFile<'_>) -> io::Result<T>,
) -> io::Result<Option<T>> {
    loop {
        match read_zipfile_from_stream(&mut src).map_err(zip_err)? {
            Some(mut file) if file.name() == name => return f(&mut file).map(Some),
            Some(file) => trace!(target: "stowage::filter", skipped = file.name(), "zip entry skipped"),
            None => return Ok(None),
        }
    }
}

fn zip_lookup<T>(src: Source<'_>, name: &str, f: impl FnOnce(&mut ZipFile<'_>) -> io::Result<T>) -> io::Result<Option<T>> {
    match src {
        Source::Seekable(s) => zip_indexed(s, name, f),
        Source::Sequential(r) => zip_scan(r, name, f),
    }
}

impl ArchiveFormat {
    /// Filter type tag handled by this format.
    pub fn filter_type(&self) -> &'static str {
        match self {
            ArchiveFormat::Zip => "ZIP_ENTRY",
            ArchiveFormat::Tar => "TAR_ENTRY",
        }
    }

    /// Declared (uncompressed) size of `name`, read from the index/headers only.
    pub fn entry_size(&self, src: Source<'_>, name: &str) -> io::Result<Option<u64>> {
        match self {
            ArchiveFormat::Zip => zip_lookup(src, name, |file| Ok(file.size())),
            ArchiveFormat::Tar => {
                let mut archive = tar::Archive::new(src);
                for entry in archive.entries()? {
                    let entry = entry?;
                    if entry.path_bytes().as_ref() == name.as_bytes() {
                        return Ok(Some(entry.size()));
                    }
                }
                Ok(None)
            }
        }
    }

    /// Copy the uncompressed bytes of `name` to `out`; returns the count written.
    pub fn copy_entry(&self, src: Source<'_>, name: &str, out: &mut dyn Write) -> io::Result<Option<u64>> {
        match self {
            ArchiveFormat::Zip => {
                let copied = zip_lookup(src, name, |file| io::copy(file, out))?;
                if let Some(n) = copied {
                    trace!(target: "stowage::filter", entry = name, bytes = n, "copied zip entry");
                }
                Ok(copied)
            }
            ArchiveFormat::Tar => {
                let mut archive = tar::Archive::new(src);
                for entry in archive.entries()? {
                    let mut entry = entry?;
                    if entry.path_bytes().as_ref() == name.as_bytes() {
                        let n = io::copy(&mut entry, out)?;
                        trace!(target: "stowage::filter", entry = name, bytes = n, "copied tar entry");
                        return Ok(Some(n));
                    }
                }
                Ok(None)
            }
        }
    }
}
