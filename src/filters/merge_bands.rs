use std::io::{self, Write};

use tracing::{debug, warn};

use crate::codec::tiff_stack::{read_metadata_from, read_page_from, TiffPage};
use crate::error::ContentResult;
use crate::node::ContentNode;
use crate::params::FilterParams;

pub const FILTER_TYPE: &str = "TIFF_MERGE_BANDS";
/// Page taken from every node.
pub const PAGE: &str = "z";

/// Combines page `z` of every node into one multi-band block, pixel-interleaved in
/// node order. Unlike the other node filters it never archives: the whole node set
/// produces a single body.
#[derive(Debug, Clone, Copy, Default)]
pub struct MergeBandsFilter;

fn page_number(params: &FilterParams) -> ContentResult<Option<u64>> {
    let z = params.get_int(PAGE, 0)?;
    Ok(u64::try_from(z).ok())
}

fn bands(nodes: &[ContentNode]) -> Vec<&ContentNode> {
    nodes.iter().filter(|n| !n.is_collection()).collect()
}

/// Interleave equally shaped pages: for each pixel, band 0's bytes, then band 1's, and so on.
pub fn interleave(pages: &[TiffPage]) -> io::Result<Vec<u8>> {
    let Some(first) = pages.first() else { return Ok(Vec::new()); };
    let shape = (first.width, first.height, first.bytes_per_pixel);
    if let Some(odd) = pages.iter().find(|p| (p.width, p.height, p.bytes_per_pixel) != shape) {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!(
                "band of {}x{} at {} bytes/pixel does not match {}x{} at {} bytes/pixel",
                odd.width, odd.height, odd.bytes_per_pixel, shape.0, shape.1, shape.2
            ),
        ));
    }
    let bpp = first.bytes_per_pixel;
    let pixels = first.data.len() / bpp;
    let mut out = Vec::with_capacity(first.data.len() * pages.len());
    for px in 0..pixels {
        for page in pages {
            out.extend_from_slice(&page.data[px * bpp..(px + 1) * bpp]);
        }
    }
    Ok(out)
}

impl MergeBandsFilter {
    pub fn apply(&self, params: &FilterParams, nodes: &[ContentNode], out: &mut dyn Write) -> ContentResult<u64> {
        let z = page_number(params)?;
        let bands = bands(nodes);
        if bands.is_empty() {
            return Ok(0);
        }
        let Some(z) = z else {
            warn!(target: "stowage::filter", "negative page requested for band merge");
            return Ok(0);
        };
        let mut pages = Vec::with_capacity(bands.len());
        for node in &bands {
            match node.with_source(|src| read_page_from(src, z))? {
                Some(page) => pages.push(page),
                None => {
                    warn!(target: "stowage::filter", key = %node.object_key(), z, "page missing from band");
                    return Ok(0);
                }
            }
        }
        let merged = interleave(&pages)?;
        out.write_all(&merged)?;
        debug!(target: "stowage::filter", bands = pages.len(), z, bytes = merged.len(), "bands merged");
        Ok(merged.len() as u64)
    }

    /// Computed from page headers alone; 0 when a band lacks the page or bands differ in shape.
    pub fn estimate_size(&self, params: &FilterParams, nodes: &[ContentNode]) -> ContentResult<u64> {
        let bands = bands(nodes);
        let Some(z) = page_number(params)? else { return Ok(0); };
        let mut shape = None;
        for node in &bands {
            let meta = node.with_source(read_metadata_from)?;
            if z >= u64::from(meta.sz) {
                return Ok(0);
            }
            let this = (meta.sx, meta.sy, meta.bytes_per_pixel);
            if *shape.get_or_insert(this) != this {
                return Ok(0);
            }
        }
        Ok(shape
            .map(|(sx, sy, bpp)| u64::from(sx) * u64::from(sy) * u64::from(bpp) * bands.len() as u64)
            .unwrap_or(0))
    }
}
