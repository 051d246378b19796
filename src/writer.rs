//! # writer: stack and document persistence
//!
//! Diff pages for one file pair are always written as a deflate-compressed
//! multi-page TIFF first. A PDF, when requested, is derived from that stack
//! on disk, never from the in-memory pages. If only the PDF was requested the
//! stack is removed again afterwards.
//!
//! # Responsibilities
//! - Deterministic artifact naming (`Output_<new stem>.tif` / `.pdf`)
//! - Destination-lock checks before every write and delete
//! - Embedding the source resolution in both artifacts
//!
//! # Errors
//! Every failure surfaces as [`WriteError`]. A destination that stays locked
//! after the [`LockResolver`] declines to retry is reported as
//! [`WriteError::DestinationLocked`].

use std::fs::{self, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use fs2::FileExt;
use printpdf::{
    Mm, Op, PdfDocument, PdfPage, PdfSaveOptions, RawImage, RawImageData, RawImageFormat,
    XObjectTransform,
};
use tempfile::NamedTempFile;
use tiff::encoder::compression::DeflateLevel;
use tiff::encoder::{colortype, Compression, Rational, TiffEncoder};
use tiff::tags::ResolutionUnit;
use tracing::{debug, error, info, warn};

use crate::contract::{LockDecision, LockResolver};
use crate::differ::DiffPage;
use crate::error::WriteError;
use crate::source::{read_tiff_stack, Resolution};

/// Which artifacts a job should leave in the output directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutputFormats {
    pub tiff: bool,
    pub pdf: bool,
}

impl OutputFormats {
    pub fn any(&self) -> bool {
        self.tiff || self.pdf
    }
}

/// `<output_dir>/Output_<stem of new_path>.<extension>`
pub fn output_path(output_dir: &Path, new_path: &Path, extension: &str) -> PathBuf {
    let stem = new_path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    output_dir.join(format!("Output_{stem}.{extension}"))
}

fn to_rational(dpi: f64) -> Rational {
    if dpi.fract() == 0.0 {
        Rational {
            n: dpi as u32,
            d: 1,
        }
    } else {
        Rational {
            n: (dpi * 100.0).round() as u32,
            d: 100,
        }
    }
}

/// Writes `pages` as one deflate-compressed RGB TIFF stack carrying `resolution`.
///
/// The stack is encoded into a temporary file next to `path` and moved into
/// place once complete.
pub fn write_tiff_stack(
    path: &Path,
    pages: &[DiffPage],
    resolution: Resolution,
) -> Result<(), WriteError> {
    let encode_err = |e: tiff::TiffError| WriteError::Encode {
        path: path.to_path_buf(),
        reason: e.to_string(),
    };
    if pages.is_empty() {
        return Err(WriteError::Encode {
            path: path.to_path_buf(),
            reason: "no pages to write".into(),
        });
    }

    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let mut tmp = NamedTempFile::new_in(dir).map_err(|e| WriteError::io(path, e))?;
    {
        let mut writer = BufWriter::new(tmp.as_file_mut());
        let mut encoder = TiffEncoder::new(&mut writer)
            .map_err(encode_err)?
            .with_compression(Compression::Deflate(DeflateLevel::Balanced));
        for (index, page) in pages.iter().enumerate() {
            let (width, height) = page.dimensions();
            let mut image = encoder
                .new_image::<colortype::RGB8>(width, height)
                .map_err(encode_err)?;
            image.resolution_unit(ResolutionUnit::Inch);
            image.x_resolution(to_rational(resolution.horizontal));
            image.y_resolution(to_rational(resolution.vertical));
            image.write_data(page.image().as_raw()).map_err(encode_err)?;
            debug!(page = index + 1, width, height, "[SAVE] Encoded TIFF frame");
        }
        writer.flush().map_err(|e| WriteError::io(path, e))?;
    }
    tmp.persist(path).map_err(|e| WriteError::io(path, e.error))?;

    info!(path = %path.display(), pages = pages.len(), "[SAVE] Wrote TIFF stack");
    Ok(())
}

fn px_to_mm(px: u32, dpi: f64) -> Mm {
    Mm((px as f64 / dpi * 25.4) as f32)
}

/// Re-reads the TIFF stack at `tiff_path` frame by frame and writes one PDF
/// page per frame to `pdf_path`. Pages are sized from the stack resolution.
pub fn derive_pdf(tiff_path: &Path, pdf_path: &Path) -> Result<(), WriteError> {
    let pdf_err = |reason: String| WriteError::Pdf {
        path: pdf_path.to_path_buf(),
        reason,
    };
    let stack = read_tiff_stack(tiff_path).map_err(|e| pdf_err(e.to_string()))?;
    let resolution = stack.resolution();

    let title = pdf_path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let mut doc = PdfDocument::new(&title);
    let mut pages = Vec::with_capacity(stack.page_count());

    for frame in stack.pages() {
        let rgb = frame.to_rgb8();
        let (width, height) = rgb.dimensions();
        let raw = RawImage {
            pixels: RawImageData::U8(rgb.into_raw()),
            width: width as usize,
            height: height as usize,
            data_format: RawImageFormat::RGB8,
            tag: Vec::new(),
        };
        let id = doc.add_image(&raw);
        let transform = XObjectTransform {
            dpi: Some(resolution.horizontal as f32),
            scale_y: Some((resolution.horizontal / resolution.vertical) as f32),
            ..Default::default()
        };
        pages.push(PdfPage::new(
            px_to_mm(width, resolution.horizontal),
            px_to_mm(height, resolution.vertical),
            vec![Op::UseXobject { id, transform }],
        ));
    }

    let options = PdfSaveOptions {
        image_optimization: None,
        ..Default::default()
    };
    let mut warnings = Vec::new();
    let bytes = doc.with_pages(pages).save(&options, &mut warnings);
    if !warnings.is_empty() {
        debug!(count = warnings.len(), "[SAVE] PDF writer reported warnings");
    }
    fs::write(pdf_path, bytes).map_err(|e| WriteError::io(pdf_path, e))?;

    info!(
        tiff = %tiff_path.display(),
        pdf = %pdf_path.display(),
        pages = stack.page_count(),
        "[SAVE] Derived PDF from TIFF stack"
    );
    Ok(())
}

/// True when `path` exists and is held by another process.
///
/// Renames the file onto itself, then tries a non-blocking exclusive lock on
/// a write handle. Either failing counts as locked.
pub fn is_locked(path: &Path) -> bool {
    if !path.is_file() {
        return false;
    }
    if fs::rename(path, path).is_err() {
        return true;
    }
    match OpenOptions::new().write(true).open(path) {
        Ok(file) => match file.try_lock_exclusive() {
            Ok(()) => {
                let _ = FileExt::unlock(&file);
                false
            }
            Err(_) => true,
        },
        Err(_) => true,
    }
}

/// Persists diff pages for one file pair, with lock checks around each write.
pub struct OutputWriter<L> {
    locks: L,
}

impl<L: LockResolver> OutputWriter<L> {
    pub fn new(locks: L) -> Self {
        Self { locks }
    }

    /// Waits out a locked destination as long as the resolver says to retry.
    pub fn ensure_unlocked(&self, path: &Path) -> Result<(), WriteError> {
        let mut attempt = 0;
        while is_locked(path) {
            attempt += 1;
            match self.locks.on_locked(path, attempt) {
                LockDecision::Retry => continue,
                LockDecision::Abort => {
                    error!(path = %path.display(), attempt, "[SAVE] Destination locked, write abandoned");
                    return Err(WriteError::DestinationLocked {
                        path: path.to_path_buf(),
                    });
                }
            }
        }
        Ok(())
    }

    /// Writes the artifacts selected by `formats` for the pair whose new file
    /// is `new_path`. Returns the paths left on disk.
    pub fn persist(
        &self,
        output_dir: &Path,
        new_path: &Path,
        pages: &[DiffPage],
        resolution: Resolution,
        formats: OutputFormats,
    ) -> Result<Vec<PathBuf>, WriteError> {
        let tiff_path = output_path(output_dir, new_path, "tif");
        let mut written = Vec::new();

        self.ensure_unlocked(&tiff_path)?;
        write_tiff_stack(&tiff_path, pages, resolution)?;
        if formats.tiff {
            written.push(tiff_path.clone());
        }

        let pdf_result = if formats.pdf {
            let pdf_path = output_path(output_dir, new_path, "pdf");
            let result = self
                .ensure_unlocked(&pdf_path)
                .and_then(|()| derive_pdf(&tiff_path, &pdf_path));
            if result.is_ok() {
                written.push(pdf_path);
            }
            result
        } else {
            Ok(())
        };

        // A PDF-only job never leaves the stack behind, even when the PDF failed.
        if !formats.tiff {
            let removed = self.ensure_unlocked(&tiff_path).and_then(|()| {
                fs::remove_file(&tiff_path).map_err(|e| WriteError::io(&tiff_path, e))
            });
            match removed {
                Ok(()) => debug!(path = %tiff_path.display(), "[SAVE] Removed intermediate TIFF stack"),
                Err(e) if pdf_result.is_ok() => return Err(e),
                Err(e) => warn!(
                    path = %tiff_path.display(),
                    error = %e,
                    "[SAVE] Could not remove intermediate TIFF stack"
                ),
            }
        }

        pdf_result?;
        Ok(written)
    }
}
