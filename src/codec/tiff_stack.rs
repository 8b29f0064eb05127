//! Region decoding over multi-page TIFF stacks.
//!
//! Each page is one z-slice. All pages must share the dimensions of the first.
//! Output is row-major, page by page, with every sample as little-endian bytes.
//! Stack metadata and single pages can also be read on their own; both only walk
//! the page directories they need when the source is seekable.

use std::io::{self, Cursor, Read, Seek};
use std::ops::Range;

use tiff::decoder::{Decoder, DecodingResult};
use tiff::{ColorType, TiffError};
use tracing::debug;

use super::{Region, RegionDecoder};
use crate::node::{SeekableRead, Source};

fn tiff_err(e: TiffError) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, e)
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TiffRegionDecoder;

impl TiffRegionDecoder {
    pub fn new() -> Self { Self }
}

fn count_pages<R: Read + Seek>(decoder: &mut Decoder<R>) -> io::Result<u64> {
    let mut pages = 1u64;
    while decoder.more_images() {
        decoder.next_image().map_err(tiff_err)?;
        pages += 1;
    }
    Ok(pages)
}

fn page_count(bytes: &[u8]) -> io::Result<u64> {
    let mut decoder = Decoder::new(Cursor::new(bytes)).map_err(tiff_err)?;
    count_pages(&mut decoder)
}

/// Stack geometry: `sx`×`sy` pixels per page, `sz` pages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TiffMetadata {
    pub sx: u32,
    pub sy: u32,
    pub sz: u32,
    pub bytes_per_pixel: u32,
}

impl TiffMetadata {
    /// Raw pixel bytes of the whole stack.
    pub fn size(&self) -> u64 {
        u64::from(self.sx) * u64::from(self.sy) * u64::from(self.sz) * u64::from(self.bytes_per_pixel)
    }
}

fn bits_per_pixel(color: ColorType) -> io::Result<u32> {
    #[allow(unreachable_patterns)]
    let bits = match color {
        ColorType::Gray(b) | ColorType::Palette(b) => u32::from(b),
        ColorType::GrayA(b) => 2 * u32::from(b),
        ColorType::RGB(b) | ColorType::YCbCr(b) => 3 * u32::from(b),
        ColorType::RGBA(b) | ColorType::CMYK(b) => 4 * u32::from(b),
        other => {
            return Err(io::Error::new(io::ErrorKind::Unsupported, format!("unsupported TIFF color type {:?}", other)))
        }
    };
    Ok(bits)
}

/// Read stack geometry from the first page directory and count the pages.
pub fn read_metadata<R: Read + Seek>(src: R) -> io::Result<TiffMetadata> {
    let mut decoder = Decoder::new(src).map_err(tiff_err)?;
    let (sx, sy) = decoder.dimensions().map_err(tiff_err)?;
    let bits = bits_per_pixel(decoder.colortype().map_err(tiff_err)?)?;
    let sz = count_pages(&mut decoder)?;
    Ok(TiffMetadata { sx, sy, sz: u32::try_from(sz).unwrap_or(u32::MAX), bytes_per_pixel: bits.div_ceil(8) })
}

/// One decoded page with its samples flattened to little-endian bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TiffPage {
    pub width: u32,
    pub height: u32,
    pub bytes_per_pixel: usize,
    pub data: Vec<u8>,
}

/// Decode page `z`; `None` when the stack has fewer pages.
pub fn read_page<R: Read + Seek>(src: R, z: u64) -> io::Result<Option<TiffPage>> {
    let mut decoder = Decoder::new(src).map_err(tiff_err)?;
    for _ in 0..z {
        if !decoder.more_images() {
            return Ok(None);
        }
        decoder.next_image().map_err(tiff_err)?;
    }
    let (width, height) = decoder.dimensions().map_err(tiff_err)?;
    let (data, _) = sample_bytes(decoder.read_image().map_err(tiff_err)?)?;
    let pixels = width as usize * height as usize;
    if pixels == 0 || data.len() % pixels != 0 {
        return Err(io::Error::new(io::ErrorKind::InvalidData, "TIFF page size does not match its dimensions"));
    }
    Ok(Some(TiffPage { width, height, bytes_per_pixel: data.len() / pixels, data }))
}

// TIFF directories are linked by offset, so sequential sources are buffered first.
fn with_seekable<T>(src: Source<'_>, f: impl FnOnce(&mut dyn SeekableRead) -> io::Result<T>) -> io::Result<T> {
    match src {
        Source::Seekable(s) => f(s),
        Source::Sequential(r) => {
            let mut bytes = Vec::new();
            r.read_to_end(&mut bytes)?;
            f(&mut Cursor::new(bytes))
        }
    }
}

pub fn read_metadata_from(src: Source<'_>) -> io::Result<TiffMetadata> {
    with_seekable(src, |s| read_metadata(s))
}

pub fn read_page_from(src: Source<'_>, z: u64) -> io::Result<Option<TiffPage>> {
    with_seekable(src, |s| read_page(s, z))
}

/// Flatten decoded samples into little-endian bytes, returning the width of one sample.
fn sample_bytes(image: DecodingResult) -> io::Result<(Vec<u8>, usize)> {
    fn le<T: Copy, const N: usize>(v: Vec<T>, f: fn(T) -> [u8; N]) -> (Vec<u8>, usize) {
        (v.into_iter().flat_map(f).collect(), N)
    }
    #[allow(unreachable_patterns)]
    let out = match image {
        DecodingResult::U8(v) => (v, 1),
        DecodingResult::I8(v) => (v.into_iter().map(|s| s as u8).collect(), 1),
        DecodingResult::U16(v) => le(v, u16::to_le_bytes),
        DecodingResult::I16(v) => le(v, i16::to_le_bytes),
        DecodingResult::U32(v) => le(v, u32::to_le_bytes),
        DecodingResult::I32(v) => le(v, i32::to_le_bytes),
        DecodingResult::F32(v) => le(v, f32::to_le_bytes),
        DecodingResult::U64(v) => le(v, u64::to_le_bytes),
        DecodingResult::I64(v) => le(v, i64::to_le_bytes),
        DecodingResult::F64(v) => le(v, f64::to_le_bytes),
        _ => return Err(io::Error::new(io::ErrorKind::Unsupported, "unsupported TIFF sample format")),
    };
    Ok(out)
}

fn crop_page(
    samples: &[u8],
    width: u64,
    height: u64,
    xs: &Range<u64>,
    ys: &Range<u64>,
    out: &mut Vec<u8>,
) -> io::Result<()> {
    let pixels = (width * height) as usize;
    if pixels == 0 || samples.len() % pixels != 0 {
        return Err(io::Error::new(io::ErrorKind::InvalidData, "TIFF page size does not match its dimensions"));
    }
    let bpp = samples.len() / pixels;
    let stride = width as usize * bpp;
    for y in ys.clone() {
        let row = &samples[y as usize * stride..(y as usize + 1) * stride];
        out.extend_from_slice(&row[xs.start as usize * bpp..xs.end as usize * bpp]);
    }
    Ok(())
}

impl RegionDecoder for TiffRegionDecoder {
    fn decode_region(&self, src: &mut dyn Read, region: &Region) -> io::Result<Option<Vec<u8>>> {
        let mut bytes = Vec::new();
        src.read_to_end(&mut bytes)?;
        let pages = page_count(&bytes)?;

        let mut decoder = Decoder::new(Cursor::new(bytes.as_slice())).map_err(tiff_err)?;
        let (width, height) = decoder.dimensions().map_err(tiff_err)?;
        let (width, height) = (u64::from(width), u64::from(height));
        let (Some(xs), Some(ys), Some(zs)) = (region.x_span(width), region.y_span(height), region.z_span(pages)) else {
            debug!(target: "stowage::filter", ?region, width, height, pages, "region outside image stack");
            return Ok(None);
        };

        let mut out: Vec<u8> = Vec::new();
        let mut sample_width = 0;
        for z in 0..zs.end {
            if z > 0 {
                decoder.next_image().map_err(tiff_err)?;
            }
            if z < zs.start {
                continue;
            }
            let (w, h) = decoder.dimensions().map_err(tiff_err)?;
            if (u64::from(w), u64::from(h)) != (width, height) {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("page {} is {}x{}, expected {}x{}", z, w, h, width, height),
                ));
            }
            let (samples, sw) = sample_bytes(decoder.read_image().map_err(tiff_err)?)?;
            sample_width = sw;
            crop_page(&samples, width, height, &xs, &ys, &mut out)?;
        }
        debug!(target: "stowage::filter", x = ?xs, y = ?ys, z = ?zs, sample_width, bytes = out.len(), "decoded region");
        Ok(Some(out))
    }
}
