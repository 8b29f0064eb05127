use std::io::{Cursor, Read};
use std::sync::Arc;

use tracing::{debug, warn};

use crate::codec::{Region, RegionDecoder};
use crate::error::ContentResult;
use crate::params::FilterParams;

pub const TIFF_IMAGE: &str = "TIFF_IMAGE";

pub type ByteStream = Box<dyn Read + Send>;

/// Renders a corner-anchored block of an image stack into a new stream.
#[derive(Clone)]
pub struct TiffImageStreamFilter {
    decoder: Arc<dyn RegionDecoder>,
}

impl TiffImageStreamFilter {
    pub fn new(decoder: Arc<dyn RegionDecoder>) -> Self { Self { decoder } }

    fn apply(&self, params: &FilterParams, mut src: ByteStream) -> ContentResult<ByteStream> {
        let region = Region::from_corner_params(params)?;
        let block = self.decoder.decode_region(&mut src, &region)?;
        drop(src);
        let bytes = match block {
            Some(bytes) => bytes,
            None => {
                warn!(target: "stowage::filter", ?region, "no pixels in requested image block");
                Vec::new()
            }
        };
        debug!(target: "stowage::filter", bytes = bytes.len(), "image block rendered");
        Ok(Box::new(Cursor::new(bytes)))
    }
}

/// Filters applied to an already opened stream rather than a node set.
#[derive(Clone)]
pub enum StreamFilter {
    TiffImage(TiffImageStreamFilter),
    Identity,
}

impl StreamFilter {
    pub fn name(&self) -> &'static str {
        match self {
            StreamFilter::TiffImage(_) => TIFF_IMAGE,
            StreamFilter::Identity => "IDENTITY",
        }
    }

    pub fn supports(&self, filter_type: &str) -> bool {
        match self {
            StreamFilter::Identity => true,
            other => other.name().eq_ignore_ascii_case(filter_type.trim()),
        }
    }

    pub fn apply(&self, params: &FilterParams, src: ByteStream) -> ContentResult<ByteStream> {
        match self {
            StreamFilter::TiffImage(f) => f.apply(params, src),
            StreamFilter::Identity => Ok(src),
        }
    }
}

impl std::fmt::Debug for StreamFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("StreamFilter").field(&self.name()).finish()
    }
}
