//! PDF rasterisation backed by pdfium.
//!
//! libpdfium is bound at runtime. Search order:
//! 1. the configured library directory, if any
//! 2. the current directory (`./libpdfium.so` or platform equivalent)
//! 3. system library paths

use std::path::{Path, PathBuf};

use image::DynamicImage;
use pdfium_render::prelude::*;
use tracing::{debug, info};

use crate::contract::PageRasterizer;
use crate::error::SourceError;

/// [`PageRasterizer`] that renders through a dynamically bound pdfium.
#[derive(Debug, Clone, Default)]
pub struct PdfiumRasterizer {
    library_dir: Option<PathBuf>,
}

impl PdfiumRasterizer {
    pub fn new(library_dir: Option<PathBuf>) -> Self {
        Self { library_dir }
    }

    fn bind(&self) -> Result<Pdfium, SourceError> {
        let mut candidates = Vec::new();
        if let Some(dir) = &self.library_dir {
            candidates.push(Pdfium::pdfium_platform_library_name_at_path(dir));
        }
        candidates.push(Pdfium::pdfium_platform_library_name_at_path("./"));

        let bindings = match candidates
            .iter()
            .find_map(|lib| Pdfium::bind_to_library(lib).ok())
        {
            Some(bindings) => bindings,
            None => Pdfium::bind_to_system_library().map_err(|e| {
                SourceError::Rasterizer(format!(
                    "failed to load the pdfium library; install libpdfium or set a library directory: {e:?}"
                ))
            })?,
        };
        debug!("[LOAD] Bound pdfium library");
        Ok(Pdfium::new(bindings))
    }
}

fn decode_err(path: &Path, e: PdfiumError) -> SourceError {
    SourceError::Decode {
        path: path.to_path_buf(),
        reason: format!("{e:?}"),
    }
}

impl PageRasterizer for PdfiumRasterizer {
    fn page_count(&self, path: &Path) -> Result<usize, SourceError> {
        let pdfium = self.bind()?;
        let document = pdfium
            .load_pdf_from_file(path, None)
            .map_err(|e| decode_err(path, e))?;
        Ok(document.pages().len() as usize)
    }

    fn render(&self, path: &Path, dpi: u32) -> Result<Vec<DynamicImage>, SourceError> {
        let pdfium = self.bind()?;
        let document = pdfium
            .load_pdf_from_file(path, None)
            .map_err(|e| decode_err(path, e))?;

        // PDF user space is 72 points per inch.
        let config = PdfRenderConfig::new()
            .scale_page_by_factor(dpi as f32 / 72.0)
            .render_form_data(true)
            .render_annotations(true);

        let mut pages = Vec::new();
        for (index, page) in document.pages().iter().enumerate() {
            let bitmap = page
                .render_with_config(&config)
                .map_err(|e| decode_err(path, e))?;
            let image = bitmap.as_image();
            debug!(
                page = index + 1,
                width = image.width(),
                height = image.height(),
                "[LOAD] Rasterised PDF page"
            );
            pages.push(image);
        }
        info!(path = %path.display(), pages = pages.len(), dpi, "[LOAD] Rasterised PDF");
        Ok(pages)
    }
}
