//! Image codec contract used by the region filters.
//!
//! A decoder receives the open node stream and a [`Region`] and answers with the raw
//! pixel bytes of that block, or `None` when the region does not intersect the data.

use std::io::{self, Read};
use std::ops::Range;

use crate::error::ContentResult;
use crate::params::FilterParams;

pub mod tiff_stack;

pub use self::tiff_stack::{TiffMetadata, TiffRegionDecoder};

/// How `x/y/z` of a [`Region`] are interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Anchor {
    /// The block is centered on the coordinates.
    Center,
    /// The coordinates are the block's lowest corner.
    Corner,
}

/// A 3D pixel block request. Negative extents mean "up to the data's natural bound".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Region {
    pub x: i64,
    pub y: i64,
    pub z: i64,
    pub dim_x: i64,
    pub dim_y: i64,
    pub dim_z: i64,
    pub anchor: Anchor,
}

impl Region {
    pub fn centered(x: i64, y: i64, z: i64, dim_x: i64, dim_y: i64, dim_z: i64) -> Self {
        Self { x, y, z, dim_x, dim_y, dim_z, anchor: Anchor::Center }
    }

    pub fn cornered(x: i64, y: i64, z: i64, dim_x: i64, dim_y: i64, dim_z: i64) -> Self {
        Self { x, y, z, dim_x, dim_y, dim_z, anchor: Anchor::Corner }
    }

    /// `xCenter,yCenter,zCenter` (default 0) and `dimX,dimY,dimZ` (default -1).
    pub fn from_center_params(params: &FilterParams) -> ContentResult<Self> {
        Ok(Self::centered(
            params.get_int("xCenter", 0)?,
            params.get_int("yCenter", 0)?,
            params.get_int("zCenter", 0)?,
            params.get_int("dimX", -1)?,
            params.get_int("dimY", -1)?,
            params.get_int("dimZ", -1)?,
        ))
    }

    /// `x0,y0,z0` (default 0) and `deltaX,deltaY,deltaZ` (default -1).
    pub fn from_corner_params(params: &FilterParams) -> ContentResult<Self> {
        Ok(Self::cornered(
            params.get_int("x0", 0)?,
            params.get_int("y0", 0)?,
            params.get_int("z0", 0)?,
            params.get_int("deltaX", -1)?,
            params.get_int("deltaY", -1)?,
            params.get_int("deltaZ", -1)?,
        ))
    }

    pub fn x_span(&self, len: u64) -> Option<Range<u64>> { axis_span(self.x, self.dim_x, len, self.anchor) }
    pub fn y_span(&self, len: u64) -> Option<Range<u64>> { axis_span(self.y, self.dim_y, len, self.anchor) }
    pub fn z_span(&self, len: u64) -> Option<Range<u64>> { axis_span(self.z, self.dim_z, len, self.anchor) }
}

/// Clamp one axis of a block to `[0, len)`. `None` when the position lies outside
/// the axis or the clamped span is empty.
pub fn axis_span(pos: i64, dim: i64, len: u64, anchor: Anchor) -> Option<Range<u64>> {
    let len = i64::try_from(len).ok()?;
    if pos < 0 || pos >= len {
        return None;
    }
    let (start, end) = match (anchor, dim < 0) {
        (Anchor::Center, true) => (0, len),
        (Anchor::Corner, true) => (pos, len),
        (Anchor::Center, false) => {
            let s = pos - dim / 2;
            (s, s.saturating_add(dim))
        }
        (Anchor::Corner, false) => (pos, pos.saturating_add(dim)),
    };
    let (start, end) = (start.max(0), end.min(len));
    if start >= end {
        None
    } else {
        Some(start as u64..end as u64)
    }
}

pub trait RegionDecoder: Send + Sync {
    /// Decode the requested block. `Ok(None)` is a miss, not a failure.
    fn decode_region(&self, src: &mut dyn Read, region: &Region) -> io::Result<Option<Vec<u8>>>;
}
