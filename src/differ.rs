//! Page differ: luminance diff of two same-sized pages.
//!
//! The new page is the grayscale baseline. Pixels darker in the old page
//! (content removed) are painted red, pixels darker in the new page (content
//! added) are painted blue. Red is painted first, so blue wins where both
//! masks are set.

use image::{DynamicImage, GrayImage, Luma, Rgb, RgbImage};
use tracing::debug;

use crate::error::DiffError;
use crate::label::{burn_label, LabelFont};

pub const REMOVED_COLOR: Rgb<u8> = Rgb([255, 0, 0]);
pub const ADDED_COLOR: Rgb<u8> = Rgb([0, 0, 255]);

/// One composited output page.
#[derive(Debug, Clone, PartialEq)]
pub struct DiffPage {
    image: RgbImage,
}

impl DiffPage {
    pub fn image(&self) -> &RgbImage {
        &self.image
    }

    pub fn into_image(self) -> RgbImage {
        self.image
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.image.dimensions()
    }
}

/// Single-channel luminance, ITU-R 601 weights in 16-bit fixed point.
/// Alpha is dropped.
pub fn luminance(image: &DynamicImage) -> GrayImage {
    if let DynamicImage::ImageLuma8(gray) = image {
        return gray.clone();
    }
    let rgb = image.to_rgb8();
    GrayImage::from_fn(rgb.width(), rgb.height(), |x, y| {
        let [r, g, b] = rgb.get_pixel(x, y).0;
        let l = (r as u32 * 19595 + g as u32 * 38470 + b as u32 * 7471 + 0x8000) >> 16;
        Luma([l as u8])
    })
}

/// Clamped pixelwise `a - b`.
pub fn subtract(a: &GrayImage, b: &GrayImage) -> GrayImage {
    GrayImage::from_fn(a.width(), a.height(), |x, y| {
        Luma([a.get_pixel(x, y)[0].saturating_sub(b.get_pixel(x, y)[0])])
    })
}

/// Composites diff pages, optionally burning in a provenance label.
#[derive(Debug, Default)]
pub struct PageDiffer {
    font: Option<LabelFont>,
}

impl PageDiffer {
    pub fn new(font: Option<LabelFont>) -> Self {
        Self { font }
    }

    pub fn has_label_font(&self) -> bool {
        self.font.is_some()
    }

    pub fn diff_page(
        &self,
        old_page: &DynamicImage,
        new_page: &DynamicImage,
        old_label: &str,
        new_label: &str,
    ) -> Result<DiffPage, DiffError> {
        let old_gray = luminance(old_page);
        let new_gray = luminance(new_page);

        if old_gray.dimensions() != new_gray.dimensions() {
            return Err(DiffError::SizeMismatch {
                old: old_gray.dimensions(),
                new: new_gray.dimensions(),
            });
        }

        let mut canvas = DynamicImage::ImageLuma8(new_gray.clone()).to_rgb8();

        let removed = subtract(&old_gray, &new_gray);
        let added = subtract(&new_gray, &old_gray);
        paint(&mut canvas, &removed, REMOVED_COLOR);
        paint(&mut canvas, &added, ADDED_COLOR);

        if let Some(font) = &self.font {
            burn_label(&mut canvas, font, old_label, new_label);
        }

        debug!(
            width = canvas.width(),
            height = canvas.height(),
            old = old_label,
            new = new_label,
            "[DIFF] Composited page"
        );
        Ok(DiffPage { image: canvas })
    }
}

fn paint(canvas: &mut RgbImage, mask: &GrayImage, color: Rgb<u8>) {
    for (pixel, m) in canvas.pixels_mut().zip(mask.pixels()) {
        if m[0] != 0 {
            *pixel = color;
        }
    }
}
