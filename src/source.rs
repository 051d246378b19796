//! Page source adapter: turns an input path into an ordered page sequence.
//!
//! Two container formats are understood, selected once per path by
//! [`SourceFormat::from_path`]:
//!   - multi-frame TIFF stacks (uncompressed, LZW, deflate, packbits or CCITT
//!     Group 4), decoded frame by frame with their embedded resolution,
//!   - PDF documents, rasterised at a fixed 300 DPI through a
//!     [`PageRasterizer`].
//!
//! # Resolution fallback
//! A TIFF without `XResolution`/`YResolution` tags, or whose resolution unit
//! is "none", is treated as [`FALLBACK_DPI`] in both directions and a warning
//! is logged.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use image::{DynamicImage, GrayImage, ImageBuffer};
use tiff::decoder::{Decoder, DecodingResult, Limits};
use tiff::tags::Tag;
use tiff::ColorType;
use tracing::{debug, error, info, warn};

use crate::contract::PageRasterizer;
use crate::error::SourceError;

/// Resolution used when a TIFF carries no DPI metadata.
pub const FALLBACK_DPI: f64 = 96.0;
/// Resolution PDF pages are rasterised at.
pub const PDF_RENDER_DPI: u32 = 300;
/// Maximum number of pages accepted from a single PDF.
pub const PDF_PAGE_LIMIT: usize = 100;

/// Normalised input format class. `.tif` and `.tiff` are the same class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceFormat {
    Tiff,
    Pdf,
}

impl SourceFormat {
    /// Classifies a path by its (case-insensitive) extension.
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "tif" | "tiff" => Some(SourceFormat::Tiff),
            "pdf" => Some(SourceFormat::Pdf),
            _ => None,
        }
    }
}

/// Horizontal and vertical pixel density in dots per inch.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Resolution {
    pub horizontal: f64,
    pub vertical: f64,
}

impl Resolution {
    pub fn uniform(dpi: f64) -> Self {
        Self {
            horizontal: dpi,
            vertical: dpi,
        }
    }
}

/// The decoded pages of one input file plus their shared resolution.
#[derive(Debug, Clone)]
pub struct PageContainer {
    pages: Vec<DynamicImage>,
    resolution: Resolution,
}

impl PageContainer {
    pub fn new(pages: Vec<DynamicImage>, resolution: Resolution) -> Self {
        Self { pages, resolution }
    }

    pub fn pages(&self) -> &[DynamicImage] {
        &self.pages
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    pub fn resolution(&self) -> Resolution {
        self.resolution
    }
}

/// Loads page containers, delegating PDF rasterisation to `R`.
pub struct PageLoader<R> {
    rasterizer: R,
    page_limit: usize,
}

impl<R: PageRasterizer> PageLoader<R> {
    pub fn new(rasterizer: R) -> Self {
        Self {
            rasterizer,
            page_limit: PDF_PAGE_LIMIT,
        }
    }

    pub fn with_page_limit(mut self, page_limit: usize) -> Self {
        self.page_limit = page_limit;
        self
    }

    /// Loads `path`, choosing the decode path from its extension.
    pub fn load(&self, path: &Path) -> Result<PageContainer, SourceError> {
        let format = SourceFormat::from_path(path).ok_or_else(|| SourceError::Decode {
            path: path.to_path_buf(),
            reason: "not a TIFF or PDF file".into(),
        })?;
        self.load_as(path, format)
    }

    /// Loads `path` as an already-resolved `format`.
    pub fn load_as(&self, path: &Path, format: SourceFormat) -> Result<PageContainer, SourceError> {
        info!(path = %path.display(), ?format, "[LOAD] Loading page container");
        let result = match format {
            SourceFormat::Tiff => read_tiff_stack(path),
            SourceFormat::Pdf => self.load_pdf(path),
        };
        match &result {
            Ok(container) => info!(
                path = %path.display(),
                pages = container.page_count(),
                dpi_x = container.resolution.horizontal,
                dpi_y = container.resolution.vertical,
                "[LOAD] Page container ready"
            ),
            Err(e) => error!(path = %path.display(), error = %e, "[LOAD] Failed to load page container"),
        }
        result
    }

    fn load_pdf(&self, path: &Path) -> Result<PageContainer, SourceError> {
        let pages = self.rasterizer.page_count(path)?;
        if pages > self.page_limit {
            return Err(SourceError::PageLimitExceeded {
                path: path.to_path_buf(),
                pages,
                limit: self.page_limit,
            });
        }
        let rendered = self.rasterizer.render(path, PDF_RENDER_DPI)?;
        if rendered.len() > self.page_limit {
            return Err(SourceError::PageLimitExceeded {
                path: path.to_path_buf(),
                pages: rendered.len(),
                limit: self.page_limit,
            });
        }
        if rendered.is_empty() {
            return Err(SourceError::Decode {
                path: path.to_path_buf(),
                reason: "document has no pages".into(),
            });
        }
        Ok(PageContainer::new(
            rendered,
            Resolution::uniform(PDF_RENDER_DPI as f64),
        ))
    }
}

/// Decodes every frame of a multi-page TIFF, in file order.
pub fn read_tiff_stack(path: &Path) -> Result<PageContainer, SourceError> {
    let decode_err = |e: tiff::TiffError| SourceError::Decode {
        path: path.to_path_buf(),
        reason: e.to_string(),
    };

    let file = File::open(path).map_err(|source| SourceError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let mut decoder = Decoder::new(BufReader::new(file))
        .map_err(decode_err)?
        .with_limits(Limits::unlimited());

    let resolution = read_resolution(&mut decoder).map_err(decode_err)?.unwrap_or_else(|| {
        warn!(
            path = %path.display(),
            fallback_dpi = FALLBACK_DPI,
            "[LOAD] TIFF has no resolution metadata, using fallback"
        );
        Resolution::uniform(FALLBACK_DPI)
    });

    let mut pages = Vec::new();
    loop {
        let (width, height) = decoder.dimensions().map_err(decode_err)?;
        let color = decoder.colortype().map_err(decode_err)?;
        let data = decoder.read_image().map_err(decode_err)?;
        debug!(frame = pages.len(), width, height, ?color, "[LOAD] Decoded TIFF frame");
        let page = frame_to_image(width, height, color, data).ok_or_else(|| SourceError::Decode {
            path: path.to_path_buf(),
            reason: format!("unsupported TIFF sample layout {color:?}"),
        })?;
        pages.push(page);

        if !decoder.more_images() {
            break;
        }
        decoder.next_image().map_err(decode_err)?;
    }

    Ok(PageContainer::new(pages, resolution))
}

fn read_resolution<R: std::io::Read + std::io::Seek>(
    decoder: &mut Decoder<R>,
) -> tiff::TiffResult<Option<Resolution>> {
    let x = decoder.find_tag(Tag::XResolution)?.and_then(rational);
    let y = decoder.find_tag(Tag::YResolution)?.and_then(rational);
    // ResolutionUnit: 1 = none, 2 = inch (default), 3 = centimetre.
    let unit = decoder
        .find_tag(Tag::ResolutionUnit)?
        .and_then(|v| v.into_u16().ok())
        .unwrap_or(2);
    if unit == 1 {
        // Unitless values are an aspect ratio, not a density.
        return Ok(None);
    }
    let scale = if unit == 3 { 2.54 } else { 1.0 };

    Ok(match (x, y) {
        (Some(x), Some(y)) => Some(Resolution {
            horizontal: x * scale,
            vertical: y * scale,
        }),
        (Some(x), None) => Some(Resolution::uniform(x * scale)),
        (None, Some(y)) => Some(Resolution::uniform(y * scale)),
        (None, None) => None,
    })
}

fn rational(value: tiff::decoder::ifd::Value) -> Option<f64> {
    use tiff::decoder::ifd::Value;
    match value {
        Value::Rational(n, d) if d != 0 && n != 0 => Some(n as f64 / d as f64),
        Value::Short(v) if v != 0 => Some(v as f64),
        Value::Unsigned(v) if v != 0 => Some(v as f64),
        _ => None,
    }
}

fn frame_to_image(
    width: u32,
    height: u32,
    color: ColorType,
    data: DecodingResult,
) -> Option<DynamicImage> {
    match (color, data) {
        (ColorType::Gray(1), DecodingResult::U8(packed)) => {
            unpack_bilevel(width, height, &packed).map(DynamicImage::ImageLuma8)
        }
        (ColorType::Gray(8), DecodingResult::U8(buf)) => {
            ImageBuffer::from_raw(width, height, buf).map(DynamicImage::ImageLuma8)
        }
        (ColorType::Gray(16), DecodingResult::U16(buf)) => {
            ImageBuffer::from_raw(width, height, buf).map(DynamicImage::ImageLuma16)
        }
        (ColorType::GrayA(8), DecodingResult::U8(buf)) => {
            ImageBuffer::from_raw(width, height, buf).map(DynamicImage::ImageLumaA8)
        }
        (ColorType::RGB(8), DecodingResult::U8(buf)) => {
            ImageBuffer::from_raw(width, height, buf).map(DynamicImage::ImageRgb8)
        }
        (ColorType::RGB(16), DecodingResult::U16(buf)) => {
            ImageBuffer::from_raw(width, height, buf).map(DynamicImage::ImageRgb16)
        }
        (ColorType::RGBA(8), DecodingResult::U8(buf)) => {
            ImageBuffer::from_raw(width, height, buf).map(DynamicImage::ImageRgba8)
        }
        (ColorType::RGBA(16), DecodingResult::U16(buf)) => {
            ImageBuffer::from_raw(width, height, buf).map(DynamicImage::ImageRgba16)
        }
        _ => None,
    }
}

// 1-bit rows are byte aligned. The decoder normalises WhiteIsZero, so a set
// bit is white for both photometric interpretations.
fn unpack_bilevel(width: u32, height: u32, packed: &[u8]) -> Option<GrayImage> {
    let stride = (width as usize).div_ceil(8);
    if packed.len() < stride * height as usize {
        return None;
    }
    Some(GrayImage::from_fn(width, height, |x, y| {
        let byte = packed[y as usize * stride + x as usize / 8];
        let bit = (byte >> (7 - (x % 8))) & 1;
        image::Luma([if bit == 1 { 255 } else { 0 }])
    }))
}
