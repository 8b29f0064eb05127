use std::io::Write;
use std::sync::Arc;

use tracing::{debug, warn};

use super::NodeTransform;
use crate::codec::{Region, RegionDecoder};
use crate::error::ContentResult;
use crate::node::ContentNode;
use crate::params::FilterParams;

pub const FILTER_TYPE: &str = "TIFF_ROI_PIXELS";

/// Extracts a centered 3D pixel block from image stacks.
#[derive(Clone)]
pub struct RoiFilter {
    decoder: Arc<dyn RegionDecoder>,
}

impl RoiFilter {
    pub fn new(decoder: Arc<dyn RegionDecoder>) -> Self { Self { decoder } }
}

impl NodeTransform for RoiFilter {
    fn write_node(&self, params: &FilterParams, node: &ContentNode, out: &mut dyn Write) -> ContentResult<u64> {
        let region = Region::from_center_params(params)?;
        let block = node.with_content(|src| self.decoder.decode_region(src, &region))?;
        match block {
            Some(bytes) if !bytes.is_empty() => {
                out.write_all(&bytes)?;
                debug!(target: "stowage::filter", key = %node.object_key(), bytes = bytes.len(), "region extracted");
                Ok(bytes.len() as u64)
            }
            _ => {
                warn!(target: "stowage::filter", key = %node.object_key(), ?region, "no pixels in requested region");
                Ok(0)
            }
        }
    }

    // Region size depends on the image bounds, which are only known after decoding.
    fn estimate_node(&self, _params: &FilterParams, _node: &ContentNode) -> ContentResult<Option<u64>> {
        Ok(None)
    }

    fn prepare(&self, params: &FilterParams) -> ContentResult<bool> {
        Region::from_center_params(params)?;
        Ok(true)
    }
}
