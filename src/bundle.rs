//! Multi-node tar packaging.
//!
//! Entries are written strictly in input order, one node source open at a time.
//! Entry paths are shortened to the prefix shared by all nodes. The stream is
//! terminated with the two end-of-archive blocks and padded to the default tar
//! record size, so its length is a pure function of entry paths and sizes (see
//! [`estimate_archive_size`]).

use std::cmp::min;
use std::io::{self, Read, Write};

use tar::{Builder, EntryType, Header};
use tracing::{debug, info, warn};

use crate::error::ContentResult;
use crate::filters::NodeTransform;
use crate::node::ContentNode;
use crate::params::FilterParams;

pub const TAR_BLOCK_SIZE: u64 = 512;
/// Default record size (20 blocks).
pub const TAR_RECORD_SIZE: u64 = 10_240;
/// Longest path a GNU header stores inline; longer ones get a long-name entry.
const GNU_NAME_MAX: usize = 100;

#[inline]
fn round_up(n: u64, to: u64) -> u64 {
    n.div_ceil(to) * to
}

/// Longest run of leading `/`-separated components shared by every node prefix.
/// A node with fewer components ends the run at its length.
pub fn common_prefix(nodes: &[ContentNode]) -> String {
    let Some(first) = nodes.first() else { return String::new(); };
    let split: Vec<Vec<&str>> = nodes.iter().map(|n| n.prefix().split('/').collect()).collect();
    let mut shared: Vec<&str> = Vec::new();
    for (j, component) in split[0].iter().enumerate() {
        let all_match = split[1..].iter().all(|other| other.get(j) == Some(component));
        if !all_match { break; }
        shared.push(*component);
    }
    debug!(target: "stowage::bundle", first = %first.prefix(), nodes = nodes.len(), common = %shared.join("/"), "common prefix");
    shared.join("/")
}

fn clean_path(raw: &str) -> String {
    raw.split('/').filter(|s| !s.is_empty() && *s != ".").collect::<Vec<_>>().join("/")
}

/// Archive path for `node` given the shared prefix of the whole node set.
pub fn entry_path(common: &str, node: &ContentNode) -> String {
    let dir = if !common.is_empty() { common } else { node.prefix() };
    if dir.is_empty() {
        clean_path(node.name())
    } else {
        clean_path(&format!("{}/{}", dir, node.name()))
    }
}

/// Bytes one entry occupies in the archive: header, optional long-name entry and padded body.
pub fn entry_frame_size(path: &str, size: u64) -> u64 {
    let long_name = if path.len() > GNU_NAME_MAX {
        TAR_BLOCK_SIZE + round_up(path.len() as u64 + 1, TAR_BLOCK_SIZE)
    } else {
        0
    };
    TAR_BLOCK_SIZE + long_name + round_up(size, TAR_BLOCK_SIZE)
}

/// Exact size of the archive [`write_archive`] produces for these (path, size) entries.
pub fn estimate_archive_size<'a, I>(entries: I) -> u64
where
    I: IntoIterator<Item = (&'a str, u64)>,
{
    let body: u64 = entries.into_iter().map(|(p, s)| entry_frame_size(p, s)).sum();
    round_up(body + 2 * TAR_BLOCK_SIZE, TAR_RECORD_SIZE)
}

/// Counts bytes that reach the sink. Once abandoned it refuses every further write.
pub(crate) struct CountingWriter<W> {
    inner: W,
    written: u64,
    abandoned: bool,
}

impl<W: Write> CountingWriter<W> {
    pub(crate) fn new(inner: W) -> Self { Self { inner, written: 0, abandoned: false } }
    pub(crate) fn written(&self) -> u64 { self.written }

    pub(crate) fn abandon(&mut self) { self.abandoned = true; }
}

impl<W: Write> Write for CountingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.abandoned {
            return Err(io::Error::new(io::ErrorKind::Other, "archive abandoned after a failed entry"));
        }
        let n = self.inner.write(buf)?;
        self.written += n as u64;
        Ok(n)
    }
    fn flush(&mut self) -> io::Result<()> { self.inner.flush() }
}

/// Yields exactly `declared` bytes from `inner`, failing if the source is shorter or longer.
struct ExactReader<R> {
    inner: R,
    declared: u64,
    remaining: u64,
}

impl<R: Read> ExactReader<R> {
    fn new(inner: R, declared: u64) -> Self { Self { inner, declared, remaining: declared } }
}

impl<R: Read> Read for ExactReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        if self.remaining == 0 {
            let mut extra = [0u8; 1];
            return loop {
                match self.inner.read(&mut extra) {
                    Ok(0) => break Ok(0),
                    Ok(_) => break Err(io::Error::new(
                        io::ErrorKind::InvalidData,
                        format!("content longer than declared size {}", self.declared),
                    )),
                    Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                    Err(e) => break Err(e),
                }
            };
        }
        let max = min(buf.len() as u64, self.remaining) as usize;
        let n = self.inner.read(&mut buf[..max])?;
        if n == 0 {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("content ended {} bytes short of declared size {}", self.remaining, self.declared),
            ));
        }
        self.remaining -= n as u64;
        Ok(n)
    }
}

fn entry_header(node: &ContentNode, size: u64) -> Header {
    let mut header = Header::new_gnu();
    header.set_entry_type(EntryType::Regular);
    header.set_mode(0o644);
    header.set_mtime(node.last_modified().map(|t| t.timestamp().max(0) as u64).unwrap_or(0));
    header.set_size(size);
    header
}

fn append_entries<W: Write>(
    builder: &mut Builder<W>,
    transform: &dyn NodeTransform,
    params: &FilterParams,
    nodes: &[ContentNode],
    common: &str,
) -> ContentResult<()> {
    for node in nodes {
        let path = entry_path(common, node);
        match transform.exact_length(params, node) {
            Some(len) => {
                let mut header = entry_header(node, len);
                node.with_content(|src| builder.append_data(&mut header, &path, ExactReader::new(src, len)))?;
                debug!(target: "stowage::bundle", entry = %path, size = len, "streamed entry");
            }
            None => {
                let mut body: Vec<u8> = Vec::new();
                let len = transform.write_node(params, node, &mut body)?;
                let mut header = entry_header(node, len);
                builder.append_data(&mut header, &path, body.as_slice())?;
                debug!(target: "stowage::bundle", entry = %path, size = len, "buffered entry");
            }
        }
    }
    Ok(())
}

/// Write one tar entry per node, in order, with bodies produced by `transform`.
/// Returns the total number of bytes written to `out`.
///
/// On failure the sink keeps whatever was written so far, without end-of-archive
/// blocks, so a truncated archive is never mistaken for a complete one.
pub fn write_archive<W: Write>(
    transform: &dyn NodeTransform,
    params: &FilterParams,
    nodes: &[ContentNode],
    out: W,
) -> ContentResult<u64> {
    let common = common_prefix(nodes);
    let mut counter = CountingWriter::new(out);
    let mut builder = Builder::new(&mut counter);
    if let Err(e) = append_entries(&mut builder, transform, params, nodes, &common) {
        // the builder terminates the archive when dropped
        builder.get_mut().abandon();
        warn!(target: "stowage::bundle", error = %e, "archive abandoned");
        return Err(e);
    }
    let counter = builder.into_inner()?;
    let pad = round_up(counter.written(), TAR_RECORD_SIZE) - counter.written();
    if pad > 0 {
        io::copy(&mut io::repeat(0).take(pad), counter)?;
    }
    counter.flush()?;
    let total = counter.written();
    info!(target: "stowage::bundle", entries = nodes.len(), bytes = total, "archived content");
    Ok(total)
}

#[cfg(test)]
mod bundle_tests;
