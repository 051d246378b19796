mod common;

use common::{dynamic, fixture, page_with_marks};
use image::{DynamicImage, GrayImage, Luma, Rgb, RgbImage};
use imgcomp::differ::{luminance, PageDiffer, ADDED_COLOR, REMOVED_COLOR};
use imgcomp::error::DiffError;
use imgcomp::label::{font_px, label_text, LabelFont, LABEL_ANCHOR};

const WHITE: Rgb<u8> = Rgb([255, 255, 255]);

#[test]
fn test_identical_pages_give_plain_grayscale_canvas() {
    let page = page_with_marks(64, 48, &[(10, 10), (30, 20)]);
    let differ = PageDiffer::default();

    let out = differ
        .diff_page(&dynamic(&page), &dynamic(&page), "A", "A")
        .expect("Same-sized pages should diff");

    let expected = DynamicImage::ImageLuma8(page).to_rgb8();
    assert_eq!(out.image(), &expected);
}

#[test]
fn test_removed_content_is_red_and_added_content_is_blue() {
    let old = page_with_marks(40, 40, &[(2, 2)]);
    let new = page_with_marks(40, 40, &[(20, 20)]);
    let differ = PageDiffer::default();

    let out = differ
        .diff_page(&dynamic(&old), &dynamic(&new), "old", "new")
        .expect("Should diff");
    let img = out.image();

    assert_eq!(*img.get_pixel(3, 3), REMOVED_COLOR, "only in old: red");
    assert_eq!(*img.get_pixel(21, 21), ADDED_COLOR, "only in new: blue");
    assert_eq!(*img.get_pixel(35, 5), WHITE, "unchanged background stays");
}

#[test]
fn test_shared_content_stays_gray() {
    let old = page_with_marks(32, 32, &[(8, 8)]);
    let new = page_with_marks(32, 32, &[(8, 8), (20, 20)]);

    let out = PageDiffer::default()
        .diff_page(&dynamic(&old), &dynamic(&new), "o", "n")
        .unwrap();

    assert_eq!(*out.image().get_pixel(9, 9), Rgb([0, 0, 0]));
    assert_eq!(*out.image().get_pixel(21, 21), ADDED_COLOR);
}

#[test]
fn test_any_nonzero_difference_is_painted() {
    let old = GrayImage::from_pixel(4, 1, Luma([200]));
    let mut new = old.clone();
    new.put_pixel(0, 0, Luma([199])); // new darker by one step: added
    new.put_pixel(1, 0, Luma([250])); // new lighter: removed

    let out = PageDiffer::default()
        .diff_page(&dynamic(&old), &dynamic(&new), "o", "n")
        .unwrap();

    assert_eq!(*out.image().get_pixel(0, 0), ADDED_COLOR);
    assert_eq!(*out.image().get_pixel(1, 0), REMOVED_COLOR);
    assert_eq!(*out.image().get_pixel(2, 0), Rgb([200, 200, 200]));
}

#[test]
fn test_size_mismatch_fails_without_touching_inputs() {
    let old = dynamic(&page_with_marks(40, 30, &[(1, 1)]));
    let new = dynamic(&page_with_marks(30, 40, &[(1, 1)]));
    let (old_before, new_before) = (old.clone(), new.clone());

    let err = PageDiffer::default()
        .diff_page(&old, &new, "o", "n")
        .expect_err("Different sizes must fail");

    match err {
        DiffError::SizeMismatch { old: o, new: n } => {
            assert_eq!(o, (40, 30));
            assert_eq!(n, (30, 40));
        }
    }
    assert_eq!(old, old_before);
    assert_eq!(new, new_before);
}

#[test]
fn test_diff_is_deterministic() {
    let old = dynamic(&page_with_marks(120, 90, &[(5, 5), (60, 40)]));
    let new = dynamic(&page_with_marks(120, 90, &[(5, 5), (80, 70)]));
    let differ = PageDiffer::new(Some(fixture_font()));

    let first = differ.diff_page(&old, &new, "rev1", "rev2").unwrap();
    let second = differ.diff_page(&old, &new, "rev1", "rev2").unwrap();

    assert_eq!(first.image().as_raw(), second.image().as_raw());
}

#[test]
fn test_luminance_uses_rec601_weights_and_ignores_alpha() {
    let mut rgb = RgbImage::new(4, 1);
    rgb.put_pixel(0, 0, Rgb([255, 0, 0]));
    rgb.put_pixel(1, 0, Rgb([0, 255, 0]));
    rgb.put_pixel(2, 0, Rgb([0, 0, 255]));
    rgb.put_pixel(3, 0, Rgb([255, 255, 255]));

    let gray = luminance(&DynamicImage::ImageRgb8(rgb));
    let values: Vec<u8> = gray.pixels().map(|p| p[0]).collect();
    assert_eq!(values, vec![76, 150, 29, 255]);

    let rgba = DynamicImage::ImageRgba8(image::RgbaImage::from_pixel(
        1,
        1,
        image::Rgba([255, 255, 255, 0]),
    ));
    assert_eq!(luminance(&rgba).get_pixel(0, 0)[0], 255);
}

#[test]
fn test_font_size_scales_with_page_height() {
    assert_eq!(font_px(6000), 100.0);
    assert_eq!(font_px(600), 10.0);
    assert_eq!(font_px(30), 1.0, "never below one pixel");
    assert_eq!(label_text("A", "A_rev"), "A => A_rev");
}

fn fixture_font() -> LabelFont {
    LabelFont::load(&fixture("DejaVuSansMono-Bold.ttf")).expect("fixture font should load")
}

/// Mean x of the pixels in `region` that are within 5 of `color` per channel.
fn mean_x_of(img: &RgbImage, region: (u32, u32, u32, u32), color: Rgb<u8>) -> Option<f64> {
    let (x0, y0, x1, y1) = region;
    let xs: Vec<u32> = (y0..y1)
        .flat_map(|y| (x0..x1).map(move |x| (x, y)))
        .filter(|&(x, y)| {
            let p = img.get_pixel(x, y);
            p.0.iter().zip(color.0).all(|(&a, b)| a.abs_diff(b) <= 5)
        })
        .map(|(x, _)| x)
        .collect();
    (!xs.is_empty()).then(|| xs.iter().map(|&x| x as f64).sum::<f64>() / xs.len() as f64)
}

#[test]
fn test_label_reads_blue_black_red_from_the_anchor() {
    // 1800 rows give a 30 px label.
    let page = dynamic(&GrayImage::from_pixel(800, 1800, Luma([255])));
    let out = PageDiffer::new(Some(fixture_font()))
        .diff_page(&page, &page, "old_rev", "new_rev")
        .unwrap();
    let img = out.image();

    let (ax, ay) = (LABEL_ANCHOR.0 as u32, LABEL_ANCHOR.1 as u32);
    let region = (ax, ay, 800, ay + 60);
    let blue = mean_x_of(img, region, Rgb([0, 0, 255])).expect("old label drawn in blue");
    let black = mean_x_of(img, region, Rgb([0, 0, 0])).expect("separator drawn in black");
    let red = mean_x_of(img, region, Rgb([255, 0, 0])).expect("new label drawn in red");
    assert!(blue < black, "blue at {blue}, black at {black}");
    assert!(black < red, "black at {black}, red at {red}");

    for y in 0..1800 {
        for x in 0..800 {
            let in_label = (ay..ay + 60).contains(&y) && x >= ax;
            if !in_label {
                assert_eq!(*img.get_pixel(x, y), WHITE, "pixel ({x},{y}) outside the label changed");
            }
        }
    }
}
