use std::io::{self, Write};

use tracing::debug;

use super::NodeTransform;
use crate::error::ContentResult;
use crate::node::ContentNode;
use crate::params::FilterParams;

/// Passes node content through unchanged. Registered last; it accepts every filter type.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityFilter;

impl NodeTransform for IdentityFilter {
    fn write_node(&self, _params: &FilterParams, node: &ContentNode, out: &mut dyn Write) -> ContentResult<u64> {
        let n = node.with_content(|src| io::copy(src, out))?;
        debug!(target: "stowage::filter", key = %node.object_key(), bytes = n, "identity copy");
        Ok(n)
    }

    // Only a length the reader vouches for; a stale declared size would truncate the archive.
    fn exact_length(&self, _params: &FilterParams, node: &ContentNode) -> Option<u64> {
        node.exact_size()
    }

    // Sizing unfiltered content is left to the caller, which knows the declared sizes.
    fn estimate_node(&self, _params: &FilterParams, _node: &ContentNode) -> ContentResult<Option<u64>> {
        Ok(None)
    }
}
