//! Content filters and their dispatch.
//!
//! Node filters turn a set of resolved nodes into one output stream: a single node
//! is streamed directly, several nodes (or `alwaysArchive`) are bundled into a tar
//! archive. Stream filters wrap an already-open byte stream.
//!
//! Every per-node variant implements [`NodeTransform`], which only knows how to
//! transform one node; the shared [`apply_transform`] / [`estimate_transform`]
//! functions own the single-node vs. archive decision so the variants cannot drift.
//! Band merging is the exception: it folds the whole node set into one body.

use std::io::Write;

use crate::bundle::{common_prefix, entry_path, estimate_archive_size, write_archive, CountingWriter};
use crate::error::ContentResult;
use crate::node::ContentNode;
use crate::params::FilterParams;

pub mod archive_entry;
pub mod identity;
pub mod merge_bands;
pub mod registry;
pub mod region;
pub mod stream;

pub use archive_entry::ArchiveEntryFilter;
pub use identity::IdentityFilter;
pub use merge_bands::MergeBandsFilter;
pub use registry::FilterRegistry;
pub use region::RoiFilter;
pub use stream::{StreamFilter, TiffImageStreamFilter};

/// Per-node half of a node filter.
pub trait NodeTransform: Send + Sync {
    /// Write the transformed bytes of one node and return how many were written.
    fn write_node(&self, params: &FilterParams, node: &ContentNode, out: &mut dyn Write) -> ContentResult<u64>;

    /// Output length known without opening the node. When `Some`, the archive writer
    /// streams the body and fails if the content disagrees.
    fn exact_length(&self, _params: &FilterParams, _node: &ContentNode) -> Option<u64> {
        None
    }

    /// Size of the transformed node for estimation; `None` when it cannot be known cheaply.
    fn estimate_node(&self, _params: &FilterParams, _node: &ContentNode) -> ContentResult<Option<u64>> {
        Ok(None)
    }

    /// Validate filter-specific parameters. `false` means the request selects nothing
    /// and no node is opened.
    fn prepare(&self, _params: &FilterParams) -> ContentResult<bool> {
        Ok(true)
    }
}

/// Run `transform` over `nodes`: empty ⇒ 0, one node ⇒ direct, else tar archive.
pub fn apply_transform(
    transform: &dyn NodeTransform,
    params: &FilterParams,
    nodes: &[ContentNode],
    out: &mut dyn Write,
) -> ContentResult<u64> {
    if nodes.is_empty() || !transform.prepare(params)? {
        return Ok(0);
    }
    if nodes.len() == 1 && !params.always_archive() {
        let mut counter = CountingWriter::new(&mut *out);
        transform.write_node(params, &nodes[0], &mut counter)?;
        counter.flush()?;
        return Ok(counter.written());
    }
    write_archive(transform, params, nodes, out)
}

/// Size the output of [`apply_transform`] would have; 0 when it is unknown.
pub fn estimate_transform(transform: &dyn NodeTransform, params: &FilterParams, nodes: &[ContentNode]) -> ContentResult<u64> {
    if nodes.is_empty() || !transform.prepare(params)? {
        return Ok(0);
    }
    let mut sizes = Vec::with_capacity(nodes.len());
    for node in nodes {
        match transform.estimate_node(params, node)? {
            Some(size) => sizes.push(size),
            None => return Ok(0),
        }
    }
    if nodes.len() == 1 && !params.always_archive() {
        return Ok(sizes[0]);
    }
    let common = common_prefix(nodes);
    let paths: Vec<String> = nodes.iter().map(|n| entry_path(&common, n)).collect();
    Ok(estimate_archive_size(paths.iter().map(String::as_str).zip(sizes)))
}

/// Registered node filter variants.
pub enum NodeFilter {
    RegionOfInterest(RoiFilter),
    MergeBands(MergeBandsFilter),
    ArchiveEntry(ArchiveEntryFilter),
    Identity(IdentityFilter),
}

impl NodeFilter {
    pub fn name(&self) -> &'static str {
        match self {
            NodeFilter::RegionOfInterest(_) => region::FILTER_TYPE,
            NodeFilter::MergeBands(_) => merge_bands::FILTER_TYPE,
            NodeFilter::ArchiveEntry(f) => f.format().filter_type(),
            NodeFilter::Identity(_) => "IDENTITY",
        }
    }

    /// Case-insensitive; identity accepts every type.
    pub fn supports(&self, filter_type: &str) -> bool {
        match self {
            NodeFilter::Identity(_) => true,
            other => other.name().eq_ignore_ascii_case(filter_type.trim()),
        }
    }

    pub fn apply(&self, params: &FilterParams, nodes: &[ContentNode], out: &mut dyn Write) -> ContentResult<u64> {
        match self {
            NodeFilter::RegionOfInterest(f) => apply_transform(f, params, nodes, out),
            NodeFilter::MergeBands(f) => f.apply(params, nodes, out),
            NodeFilter::ArchiveEntry(f) => apply_transform(f, params, nodes, out),
            NodeFilter::Identity(f) => apply_transform(f, params, nodes, out),
        }
    }

    pub fn estimate_size(&self, params: &FilterParams, nodes: &[ContentNode]) -> ContentResult<u64> {
        match self {
            NodeFilter::RegionOfInterest(f) => estimate_transform(f, params, nodes),
            NodeFilter::MergeBands(f) => f.estimate_size(params, nodes),
            NodeFilter::ArchiveEntry(f) => estimate_transform(f, params, nodes),
            NodeFilter::Identity(f) => estimate_transform(f, params, nodes),
        }
    }
}

impl std::fmt::Debug for NodeFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("NodeFilter").field(&self.name()).finish()
    }
}
