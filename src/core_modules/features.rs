// THEORY:
// The `FeatureExtractor` reduces a whole image to a handful of scalars:
// overall brightness, overall contrast and the mean of each color channel, all
// on the [0,1] scale. They feed the rule-based classifier and are handy for
// diagnostics. It is a "dumb" summarizer: no thresholds, no opinions.
//
// Brightness and contrast are taken over every color sample (all channels of
// all pixels), matching a flat mean/std of the pixel array. Alpha is ignored.

use crate::core_modules::normalizer::NormalizedImage;
use crate::core_modules::pixel::RunningStats;
use crate::core_modules::raw_image::RawImage;
use crate::error::PipelineError;
use image::DynamicImage;
use serde::Serialize;

/// Neutral value used for every field that cannot be measured.
pub const NEUTRAL_FEATURE: f32 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FeatureVector {
    /// Mean of all color samples, 0..1.
    pub brightness: f32,
    /// Standard deviation of all color samples, 0..1.
    pub contrast: f32,
    /// Mean of the red, green and blue channels, 0..1.
    pub channel_means: [f32; 3],
}

impl Default for FeatureVector {
    fn default() -> Self {
        Self {
            brightness: NEUTRAL_FEATURE,
            contrast: NEUTRAL_FEATURE,
            channel_means: [NEUTRAL_FEATURE; 3],
        }
    }
}

impl FeatureVector {
    pub fn red_mean(&self) -> f32 {
        self.channel_means[0]
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct FeatureExtractor;

impl FeatureExtractor {
    pub fn new() -> Self {
        Self
    }

    /// Extracts features, falling back to neutral defaults if the image cannot be measured.
    pub fn extract(&self, image: &RawImage) -> FeatureVector {
        self.try_extract(image).unwrap_or_else(|err| {
            tracing::warn!(error = %err, "feature extraction failed, using neutral defaults");
            FeatureVector::default()
        })
    }

    pub fn try_extract(&self, image: &RawImage) -> Result<FeatureVector, PipelineError> {
        match image.as_dynamic() {
            DynamicImage::ImageLuma8(buf) => summarize(buf.as_raw(), 1, 1),
            DynamicImage::ImageLumaA8(buf) => summarize(buf.as_raw(), 2, 1),
            DynamicImage::ImageRgb8(buf) => summarize(buf.as_raw(), 3, 3),
            DynamicImage::ImageRgba8(buf) => summarize(buf.as_raw(), 4, 3),
            other if other.color().has_color() => summarize(other.to_rgb8().as_raw(), 3, 3),
            other => summarize(other.to_luma8().as_raw(), 1, 1),
        }
    }

    /// Features of the classifier input canvas.
    pub fn extract_normalized(&self, image: &NormalizedImage) -> FeatureVector {
        summarize(image.as_rgb().as_raw(), 3, 3).unwrap_or_else(|err| {
            tracing::warn!(error = %err, "feature extraction failed, using neutral defaults");
            FeatureVector::default()
        })
    }
}

/// `stride` is samples per pixel, `colors` how many leading samples are color.
fn summarize(samples: &[u8], stride: usize, colors: usize) -> Result<FeatureVector, PipelineError> {
    if samples.len() < stride {
        return Err(PipelineError::EmptyImage);
    }

    let mut overall = RunningStats::new();
    let mut per_channel = [RunningStats::new(); 3];
    for pixel in samples.chunks_exact(stride) {
        for (c, &value) in pixel.iter().take(colors).enumerate() {
            let unit = value as f64 / 255.0;
            overall.push(unit);
            per_channel[c].push(unit);
        }
    }

    let channel_means = if colors == 3 {
        [
            per_channel[0].mean() as f32,
            per_channel[1].mean() as f32,
            per_channel[2].mean() as f32,
        ]
    } else {
        [NEUTRAL_FEATURE; 3]
    };

    Ok(FeatureVector {
        brightness: overall.mean() as f32,
        contrast: overall.std_dev() as f32,
        channel_means,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, Luma, Rgb, RgbImage, Rgba, RgbaImage};

    fn approx(a: f32, b: f32) -> bool {
        (a - b).abs() < 1e-4
    }

    #[test]
    fn solid_red_image() {
        let img = RgbImage::from_pixel(10, 10, Rgb([255, 0, 0]));
        let f = FeatureExtractor::new().extract(&RawImage::new(DynamicImage::ImageRgb8(img)));
        assert!(approx(f.brightness, 1.0 / 3.0));
        assert!(approx(f.channel_means[0], 1.0));
        assert!(approx(f.channel_means[1], 0.0));
        // Samples are {1, 0, 0} repeated: std = sqrt(2)/3.
        assert!(approx(f.contrast, 2.0f32.sqrt() / 3.0));
    }

    #[test]
    fn grayscale_channels_default_to_neutral() {
        let gray = GrayImage::from_pixel(8, 8, Luma([51]));
        let f = FeatureExtractor::new().extract(&RawImage::new(DynamicImage::ImageLuma8(gray)));
        assert!(approx(f.brightness, 0.2));
        assert_eq!(f.contrast, 0.0);
        assert_eq!(f.channel_means, [0.5; 3]);
    }

    #[test]
    fn alpha_does_not_count() {
        let img = RgbaImage::from_pixel(4, 4, Rgba([102, 102, 102, 0]));
        let f = FeatureExtractor::new().extract(&RawImage::new(DynamicImage::ImageRgba8(img)));
        assert!(approx(f.brightness, 0.4));
        assert_eq!(f.contrast, 0.0);
    }

    #[test]
    fn empty_image_yields_defaults() {
        let empty = RawImage::new(DynamicImage::new_rgb8(0, 0));
        let extractor = FeatureExtractor::new();
        assert_eq!(extractor.try_extract(&empty), Err(PipelineError::EmptyImage));
        assert_eq!(extractor.extract(&empty), FeatureVector::default());
    }

    #[test]
    fn wide_color_images_are_converted() {
        let wide = DynamicImage::new_rgb16(6, 6);
        let f = FeatureExtractor::new().extract(&RawImage::new(wide));
        assert_eq!(f.brightness, 0.0);
        assert_eq!(f.channel_means, [0.0; 3]);
    }
}
