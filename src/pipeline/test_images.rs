//! Synthetic test images.

use std::io::Cursor;

use image::{DynamicImage, ImageOutputFormat, Rgb, RgbImage};

pub fn solid(width: u32, height: u32, color: [u8; 3]) -> RgbImage {
    RgbImage::from_pixel(width, height, Rgb(color))
}

/// Columns `< split` get `left`, the rest `right`.
pub fn left_right(width: u32, height: u32, left: [u8; 3], right: [u8; 3], split: u32) -> RgbImage {
    RgbImage::from_fn(width, height, |x, _| if x < split { Rgb(left) } else { Rgb(right) })
}

/// Horizontal bands, top to bottom, each `(color, rows)`. Leftover rows take the last color.
pub fn bands(width: u32, height: u32, layout: &[([u8; 3], u32)]) -> RgbImage {
    RgbImage::from_fn(width, height, |_, y| {
        let mut start = 0;
        for &(color, rows) in layout {
            if y < start + rows {
                return Rgb(color);
            }
            start += rows;
        }
        Rgb(layout.last().map(|(c, _)| *c).unwrap_or([0, 0, 0]))
    })
}

pub fn encode_png(img: &RgbImage) -> Vec<u8> {
    let dynamic = DynamicImage::ImageRgb8(img.clone());
    let mut cursor = Cursor::new(Vec::new());
    dynamic
        .write_to(&mut cursor, ImageOutputFormat::Png)
        .unwrap();
    cursor.into_inner()
}
