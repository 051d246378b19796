//! Provenance label burned into the top-left corner of every diff page.

use std::path::{Path, PathBuf};

use ab_glyph::{FontVec, PxScale};
use image::{Rgb, RgbImage};
use imageproc::drawing::draw_text_mut;
use tracing::{debug, warn};

/// Top-left anchor of the label, in pixels.
pub const LABEL_ANCHOR: (i32, i32) = (50, 50);

/// Fonts tried, in order, when no font is configured.
pub const SYSTEM_FONT_CANDIDATES: &[&str] = &[
    "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/TTF/DejaVuSans.ttf",
    "/usr/share/fonts/truetype/liberation/LiberationSans-Regular.ttf",
    "C:\\Windows\\Fonts\\msgothic.ttc",
    "C:\\Windows\\Fonts\\arial.ttf",
    "/System/Library/Fonts/Supplemental/Arial.ttf",
    "/Library/Fonts/Arial.ttf",
];

/// A loaded TrueType/OpenType font used for labels.
pub struct LabelFont {
    font: FontVec,
    path: PathBuf,
}

impl std::fmt::Debug for LabelFont {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LabelFont").field("path", &self.path).finish()
    }
}

impl LabelFont {
    pub fn load(path: &Path) -> std::io::Result<Self> {
        let bytes = std::fs::read(path)?;
        let font = FontVec::try_from_vec(bytes).map_err(|e| {
            std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("{}: {e}", path.display()),
            )
        })?;
        Ok(Self {
            font,
            path: path.to_path_buf(),
        })
    }

    /// Loads the configured font, falling back to [`SYSTEM_FONT_CANDIDATES`].
    pub fn discover(configured: Option<&Path>) -> Option<Self> {
        if let Some(path) = configured {
            match Self::load(path) {
                Ok(font) => return Some(font),
                Err(e) => warn!(path = %path.display(), error = %e, "[DIFF] Configured label font unusable"),
            }
        }
        let found = SYSTEM_FONT_CANDIDATES
            .iter()
            .map(Path::new)
            .filter(|p| p.is_file())
            .find_map(|p| Self::load(p).ok());
        match &found {
            Some(font) => debug!(path = %font.path.display(), "[DIFF] Using label font"),
            None => warn!("[DIFF] No label font found; diff pages will carry no label"),
        }
        found
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Label pixel size for a page of the given height.
pub fn font_px(height: u32) -> f32 {
    (height / 60).max(1) as f32
}

pub fn label_text(old_label: &str, new_label: &str) -> String {
    format!("{old_label} => {new_label}")
}

/// Draws `"<old> => <new>"` three times at the same anchor: the full text in
/// red, then `"<old> => "` in black, then `"<old>"` in blue. The result reads
/// blue / black / red from left to right.
pub fn burn_label(canvas: &mut RgbImage, font: &LabelFont, old_label: &str, new_label: &str) {
    let scale = PxScale::from(font_px(canvas.height()));
    let (x, y) = LABEL_ANCHOR;
    let layers = [
        (Rgb([255, 0, 0]), label_text(old_label, new_label)),
        (Rgb([0, 0, 0]), format!("{old_label} => ")),
        (Rgb([0, 0, 255]), old_label.to_string()),
    ];
    for (color, text) in layers {
        draw_text_mut(canvas, color, x, y, scale, &font.font, &text);
    }
}
