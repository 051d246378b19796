#![allow(dead_code)]

use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use image::{DynamicImage, GrayImage, Luma};
use imgcomp::contract::{CancellationToken, ProgressEvent, ProgressSink};
use tiff::encoder::{colortype, Rational, TiffEncoder};
use tiff::tags::ResolutionUnit;

/// A white page with black squares at the given top-left corners.
pub fn page_with_marks(width: u32, height: u32, marks: &[(u32, u32)]) -> GrayImage {
    let mut page = GrayImage::from_pixel(width, height, Luma([255]));
    for &(mx, my) in marks {
        for y in my..(my + 4).min(height) {
            for x in mx..(mx + 4).min(width) {
                page.put_pixel(x, y, Luma([0]));
            }
        }
    }
    page
}

/// Writes an uncompressed 8-bit grayscale multi-page TIFF.
pub fn write_gray_stack(path: &Path, pages: &[GrayImage], dpi: Option<u32>) {
    let file = File::create(path).expect("create fixture");
    let mut writer = BufWriter::new(file);
    let mut encoder = TiffEncoder::new(&mut writer).expect("tiff encoder");
    for page in pages {
        let mut image = encoder
            .new_image::<colortype::Gray8>(page.width(), page.height())
            .expect("new tiff frame");
        if let Some(dpi) = dpi {
            image.resolution(ResolutionUnit::Inch, Rational { n: dpi, d: 1 });
        }
        image.write_data(page.as_raw()).expect("write tiff frame");
    }
}

/// Path of a committed file under `tests/fixtures`.
pub fn fixture(name: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures").join(name)
}

pub fn dynamic(page: &GrayImage) -> DynamicImage {
    DynamicImage::ImageLuma8(page.clone())
}

/// Records every event; optionally cancels once a given event has been seen.
pub struct RecordingSink {
    pub events: Mutex<Vec<ProgressEvent>>,
    cancel_on: Option<(ProgressEvent, CancellationToken)>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self {
            events: Mutex::new(Vec::new()),
            cancel_on: None,
        }
    }

    pub fn cancelling_on(event: ProgressEvent, token: CancellationToken) -> Self {
        Self {
            events: Mutex::new(Vec::new()),
            cancel_on: Some((event, token)),
        }
    }

    pub fn events(&self) -> Vec<ProgressEvent> {
        self.events.lock().unwrap().clone()
    }
}

impl ProgressSink for RecordingSink {
    fn emit(&self, event: ProgressEvent) {
        if let Some((trigger, token)) = &self.cancel_on {
            if *trigger == event {
                token.cancel();
            }
        }
        self.events.lock().unwrap().push(event);
    }
}

/// Names of the files in `dir`, sorted.
pub fn file_names(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .expect("read dir")
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}
