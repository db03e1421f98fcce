//! Display-only contrast and preview rendering.
//!
//! Nothing here alters the pixel data used for measurement.

use image::{GrayImage, Luma, Rgb, RgbImage};
use ndarray::{Array2, ArrayView2};
use serde::{Deserialize, Serialize};

use super::roi::Roi;

/// Intensity window mapped to black..white for display
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DisplayRange {
    pub min: f64,
    pub max: f64,
}

impl DisplayRange {
    /// Map a sample to 0..=255
    pub fn to_u8(&self, value: f64) -> u8 {
        if self.max <= self.min {
            return if value >= self.max { 255 } else { 0 };
        }
        let scaled = (value - self.min) / (self.max - self.min) * 255.0;
        scaled.round().clamp(0.0, 255.0) as u8
    }
}

/// Contrast window that saturates `saturated_percent` of the pixels,
/// split evenly between the dark and bright tails.
pub fn enhance_contrast(image: ArrayView2<f64>, saturated_percent: f64) -> DisplayRange {
    let mut samples: Vec<f64> = image.iter().copied().filter(|v| v.is_finite()).collect();
    if samples.is_empty() {
        return DisplayRange { min: 0.0, max: 0.0 };
    }
    samples.sort_by(|a, b| a.total_cmp(b));

    let n = samples.len();
    let tail = ((n as f64) * saturated_percent / 200.0).floor() as usize;
    let tail = tail.min((n - 1) / 2);
    DisplayRange {
        min: samples[tail],
        max: samples[n - 1 - tail],
    }
}

/// Convert a plane to 8-bit through a display range
pub fn to_display_u8(image: ArrayView2<f64>, range: &DisplayRange) -> Array2<u8> {
    image.mapv(|v| range.to_u8(v))
}

/// Converts an ndarray Array2<u8> to an image::GrayImage
///
/// Array indices [y, x] map to pixel coordinates (x, y).
pub fn array2_to_gray_image(arr: &Array2<u8>) -> GrayImage {
    let (height, width) = arr.dim();
    GrayImage::from_fn(width as u32, height as u32, |x, y| {
        Luma([arr[[y as usize, x as usize]]])
    })
}

/// Render a channel as an 8-bit grayscale preview
pub fn render_preview(image: ArrayView2<f64>, range: &DisplayRange) -> GrayImage {
    array2_to_gray_image(&to_display_u8(image, range))
}

const OVERLAY_COLORS: [[u8; 3]; 6] = [
    [255, 64, 64],
    [64, 255, 64],
    [64, 160, 255],
    [255, 220, 0],
    [255, 0, 255],
    [0, 255, 255],
];

/// Grayscale preview with the outline of each region drawn in a cycling colour.
///
/// Region `i` uses colour `i % 6`; callers log the index-to-colour mapping.
pub fn render_outlines(image: ArrayView2<f64>, range: &DisplayRange, rois: &[Roi]) -> RgbImage {
    let (height, width) = image.dim();
    let mut canvas = RgbImage::from_fn(width as u32, height as u32, |x, y| {
        let v = range.to_u8(image[[y as usize, x as usize]]);
        Rgb([v, v, v])
    });

    for (index, roi) in rois.iter().enumerate() {
        let color = Rgb(OVERLAY_COLORS[index % OVERLAY_COLORS.len()]);
        for (row, col) in roi.pixels() {
            let on_boundary = [(-1i64, 0i64), (1, 0), (0, -1), (0, 1)]
                .iter()
                .any(|&(dr, dc)| {
                    let r = row as i64 + dr;
                    let c = col as i64 + dc;
                    r < 0 || c < 0 || !roi.contains(r as usize, c as usize)
                });
            if on_boundary && row < height && col < width {
                canvas.put_pixel(col as u32, row as u32, color);
            }
        }
    }

    canvas
}

/// Name of the colour used for region `index` in `render_outlines`
pub fn outline_color_name(index: usize) -> &'static str {
    const NAMES: [&str; 6] = ["red", "green", "blue", "yellow", "magenta", "cyan"];
    NAMES[index % NAMES.len()]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_enhance_contrast_clips_tails() {
        let mut image = Array2::from_shape_fn((100, 100), |(r, c)| (r * 100 + c) as f64);
        image[[0, 0]] = -5000.0;
        image[[99, 99]] = 1.0e6;

        let range = enhance_contrast(image.view(), 0.35);

        // 10000 pixels, 0.175% per tail = 17 pixels
        assert!(range.min > -5000.0);
        assert!(range.max < 1.0e6);
        assert_eq!(range.min, 17.0);
        assert_eq!(range.max, 9982.0);
    }

    #[test]
    fn test_display_mapping() {
        let range = DisplayRange {
            min: 100.0,
            max: 200.0,
        };
        assert_eq!(range.to_u8(50.0), 0);
        assert_eq!(range.to_u8(150.0), 128);
        assert_eq!(range.to_u8(500.0), 255);

        let flat = DisplayRange {
            min: 7.0,
            max: 7.0,
        };
        assert_eq!(flat.to_u8(7.0), 255);
        assert_eq!(flat.to_u8(6.0), 0);
    }

    #[test]
    fn test_array2_to_gray_image_orientation() {
        let arr = Array2::from_shape_fn((2, 3), |(y, x)| (y * 10 + x) as u8);
        let img = array2_to_gray_image(&arr);
        assert_eq!(img.dimensions(), (3, 2));
        assert_eq!(img.get_pixel(2, 1)[0], 12);
    }

    #[test]
    fn test_outline_overlay_colours_region_border() {
        let image = Array2::from_elem((10, 10), 0.0);
        let range = DisplayRange { min: 0.0, max: 1.0 };
        let pixels: Vec<_> = (2..7).flat_map(|r| (2..7).map(move |c| (r, c))).collect();
        let roi = Roi::from_pixels(&pixels).unwrap();

        let overlay = render_outlines(image.view(), &range, &[roi]);

        assert_eq!(overlay.get_pixel(2, 2), &Rgb(OVERLAY_COLORS[0]));
        assert_eq!(overlay.get_pixel(4, 4), &Rgb([0, 0, 0]));
        assert_eq!(outline_color_name(7), "green");
    }
}
