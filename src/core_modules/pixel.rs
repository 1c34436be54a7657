// THEORY (single-pixel heuristics):
// This module holds the per-pixel math shared by the quality and feature
// stages: Rec. 601 luminance and a numerically stable running mean/std. It
// never looks at neighbors; anything spatial (Laplacian, smoothing) belongs in
// the stage that needs it.

use image::{DynamicImage, GrayImage, Luma};

pub type Channel = u8;
pub type Luminance = f64;

/// Rec. 601 luma weights.
const LUMA_RED: f64 = 0.299;
const LUMA_GREEN: f64 = 0.587;
const LUMA_BLUE: f64 = 0.114;

/// Perceived brightness of one RGB pixel on the 0..255 scale.
#[inline]
pub fn luminance(red: Channel, green: Channel, blue: Channel) -> Luminance {
    LUMA_RED * red as f64 + LUMA_GREEN * green as f64 + LUMA_BLUE * blue as f64
}

/// Converts any image to an 8-bit luminance plane.
///
/// Color inputs are weighted with Rec. 601 and rounded to the nearest level;
/// grayscale inputs are copied through unchanged.
pub fn to_luminance_plane(image: &DynamicImage) -> GrayImage {
    match image {
        DynamicImage::ImageLuma8(gray) => gray.clone(),
        DynamicImage::ImageLumaA8(_) => image.to_luma8(),
        _ => {
            let rgb = image.to_rgb8();
            let mut gray = GrayImage::new(rgb.width(), rgb.height());
            for (x, y, p) in rgb.enumerate_pixels() {
                let luma = luminance(p.0[0], p.0[1], p.0[2]).round().clamp(0.0, 255.0) as u8;
                gray.put_pixel(x, y, Luma([luma]));
            }
            gray
        }
    }
}

/// Running population mean and standard deviation (Welford).
#[derive(Debug, Clone, Copy, Default)]
pub struct RunningStats {
    count: u64,
    mean: f64,
    m2: f64,
}

impl RunningStats {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn push(&mut self, value: f64) {
        self.count += 1;
        let delta = value - self.mean;
        self.mean += delta / self.count as f64;
        self.m2 += delta * (value - self.mean);
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn mean(&self) -> f64 {
        self.mean
    }

    pub fn variance(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            (self.m2 / self.count as f64).max(0.0)
        }
    }

    pub fn std_dev(&self) -> f64 {
        self.variance().sqrt()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    #[test]
    fn luminance_weights_sum_to_white() {
        assert!((luminance(255, 255, 255) - 255.0).abs() < 1e-9);
        assert_eq!(luminance(0, 0, 0), 0.0);
        assert!(luminance(0, 255, 0) > luminance(255, 0, 0));
    }

    #[test]
    fn luminance_plane_matches_gray_input() {
        let rgb = RgbImage::from_pixel(3, 2, Rgb([90, 90, 90]));
        let gray = to_luminance_plane(&DynamicImage::ImageRgb8(rgb));
        assert!(gray.pixels().all(|p| p.0[0] == 90));
    }

    #[test]
    fn running_stats_matches_closed_form() {
        let mut stats = RunningStats::new();
        for v in [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0] {
            stats.push(v);
        }
        assert_eq!(stats.count(), 8);
        assert!((stats.mean() - 5.0).abs() < 1e-12);
        assert!((stats.std_dev() - 2.0).abs() < 1e-12);
    }

    #[test]
    fn empty_stats_are_zero() {
        let stats = RunningStats::new();
        assert_eq!(stats.mean(), 0.0);
        assert_eq!(stats.std_dev(), 0.0);
    }
}
