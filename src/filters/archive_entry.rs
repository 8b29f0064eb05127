use std::io::Write;

use tracing::{debug, warn};

use super::NodeTransform;
use crate::archive::ArchiveFormat;
use crate::error::ContentResult;
use crate::node::ContentNode;
use crate::params::FilterParams;

pub const ENTRY_NAME: &str = "entryName";
/// Older clients send the ZIP-specific key.
pub const ZIP_ENTRY_NAME: &str = "zipEntryName";

/// Extracts one named entry from archive-format nodes.
#[derive(Debug, Clone, Copy)]
pub struct ArchiveEntryFilter {
    format: ArchiveFormat,
}

impl ArchiveEntryFilter {
    pub fn new(format: ArchiveFormat) -> Self { Self { format } }
    pub fn zip() -> Self { Self::new(ArchiveFormat::Zip) }
    pub fn tar() -> Self { Self::new(ArchiveFormat::Tar) }
    pub fn format(&self) -> ArchiveFormat { self.format }
}

fn entry_name(params: &FilterParams) -> &str {
    params.get_str(ENTRY_NAME, params.get_str(ZIP_ENTRY_NAME, "")).trim()
}

impl NodeTransform for ArchiveEntryFilter {
    fn write_node(&self, params: &FilterParams, node: &ContentNode, out: &mut dyn Write) -> ContentResult<u64> {
        let name = entry_name(params);
        match node.with_source(|src| self.format.copy_entry(src, name, out))? {
            Some(n) => {
                debug!(target: "stowage::filter", key = %node.object_key(), entry = name, bytes = n, "entry extracted");
                Ok(n)
            }
            None => {
                warn!(target: "stowage::filter", key = %node.object_key(), entry = name, "entry not found");
                Ok(0)
            }
        }
    }

    fn estimate_node(&self, params: &FilterParams, node: &ContentNode) -> ContentResult<Option<u64>> {
        let name = entry_name(params);
        let size = node.with_source(|src| self.format.entry_size(src, name))?;
        Ok(Some(size.unwrap_or(0)))
    }

    fn prepare(&self, params: &FilterParams) -> ContentResult<bool> {
        Ok(!entry_name(params).is_empty())
    }
}
