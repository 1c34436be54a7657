// THEORY:
// The `Normalizer` turns an arbitrary photo into the fixed canvas the
// classifier expects. Two rules matter for disease cues like swelling shape or
// lesion size:
//
// 1.  **Never crop**: the whole animal must stay in frame, so the image is
//     scaled until its longer side fits and the rest is padded.
// 2.  **Never distort**: one scale factor for both axes.
//
// After resize-and-pad, pixels go through a fixed statistical filter: scale to
// [0,1], standardize with the reference channel statistics, then undo the
// standardization and return to bytes. Values are rounded, not truncated, so
// the filter is reproducible and a normalized image normalizes to itself.
//
// If the aspect-preserving path fails, `normalize` falls back to a plain
// stretch to the canvas size and marks the result as degraded.

use crate::config::{NormalizationConfig, PipelineConfig, TensorLayout};
use crate::core_modules::raw_image::RawImage;
use crate::error::PipelineError;
use image::imageops::{self, FilterType};
use image::{DynamicImage, Rgb, RgbImage};

/// A fixed-size RGB canvas ready for classification.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedImage {
    image: RgbImage,
    /// Size of the source image before normalization.
    pub original_width: u32,
    pub original_height: u32,
    /// Size of the resized content inside the padded canvas.
    pub content_width: u32,
    pub content_height: u32,
    /// True when the aspect-preserving path failed and a plain resize was used.
    pub degraded: bool,
}

impl NormalizedImage {
    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn as_rgb(&self) -> &RgbImage {
        &self.image
    }

    /// Wraps the canvas as a `RawImage`, e.g. to run it through the pipeline again.
    pub fn to_raw(&self) -> RawImage {
        RawImage::new(DynamicImage::ImageRgb8(self.image.clone()))
    }

    /// Batch-of-one f32 tensor with pixels scaled to [0,1]. Returns `(shape, data)`.
    pub fn to_tensor(&self, layout: TensorLayout) -> ([usize; 4], Vec<f32>) {
        let (w, h) = (self.image.width() as usize, self.image.height() as usize);
        let raw = self.image.as_raw();
        match layout {
            TensorLayout::Nhwc => {
                let data = raw.iter().map(|&v| v as f32 / 255.0).collect();
                ([1, h, w, 3], data)
            }
            TensorLayout::Nchw => {
                let plane = w * h;
                let mut data = vec![0.0f32; plane * 3];
                for (i, px) in raw.chunks_exact(3).enumerate() {
                    for c in 0..3 {
                        data[c * plane + i] = px[c] as f32 / 255.0;
                    }
                }
                ([1, 3, h, w], data)
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct Normalizer {
    target_width: u32,
    target_height: u32,
    stats: NormalizationConfig,
}

impl Default for Normalizer {
    fn default() -> Self {
        Self::new(224, 224, NormalizationConfig::default())
    }
}

impl Normalizer {
    pub fn new(target_width: u32, target_height: u32, stats: NormalizationConfig) -> Self {
        Self {
            target_width,
            target_height,
            stats,
        }
    }

    pub fn from_config(config: &PipelineConfig) -> Self {
        Self::new(config.target_width, config.target_height, config.normalization.clone())
    }

    /// Normalizes the image. Never fails: on error, a plain resize is returned
    /// with `degraded` set.
    pub fn normalize(&self, image: &RawImage) -> NormalizedImage {
        match self.try_normalize(image) {
            Ok(normalized) => normalized,
            Err(err) => {
                tracing::warn!(error = %err, "aspect-preserving normalization failed, stretching to canvas");
                self.plain_resize(image)
            }
        }
    }

    pub fn try_normalize(&self, image: &RawImage) -> Result<NormalizedImage, PipelineError> {
        let (orig_w, orig_h) = image.dimensions();
        if orig_w == 0 || orig_h == 0 {
            return Err(PipelineError::EmptyImage);
        }
        if self.target_width == 0 || self.target_height == 0 {
            return Err(PipelineError::InvalidConfig("normalization canvas is empty".into()));
        }

        let rgb = image.as_dynamic().to_rgb8();
        let (content_w, content_h) = fit_dimensions(orig_w, orig_h, self.target_width, self.target_height);

        let resized = if (content_w, content_h) == (orig_w, orig_h) {
            rgb
        } else {
            imageops::resize(&rgb, content_w, content_h, FilterType::Lanczos3)
        };

        let mut canvas = RgbImage::from_pixel(
            self.target_width,
            self.target_height,
            Rgb(self.stats.padding_color),
        );
        let offset_x = (self.target_width - content_w) / 2;
        let offset_y = (self.target_height - content_h) / 2;
        imageops::replace(&mut canvas, &resized, offset_x as i64, offset_y as i64);

        self.apply_statistical_filter(&mut canvas)?;

        tracing::debug!(
            original = format!("{orig_w}x{orig_h}"),
            content = format!("{content_w}x{content_h}"),
            "image normalized"
        );

        Ok(NormalizedImage {
            image: canvas,
            original_width: orig_w,
            original_height: orig_h,
            content_width: content_w,
            content_height: content_h,
            degraded: false,
        })
    }

    /// Standardize-then-restore pass over every channel value.
    fn apply_statistical_filter(&self, canvas: &mut RgbImage) -> Result<(), PipelineError> {
        let NormalizationConfig { mean, std, .. } = &self.stats;
        if std.iter().any(|s| !s.is_finite() || *s <= 0.0) {
            return Err(PipelineError::InvalidConfig(format!(
                "normalization std must be positive, got {std:?}"
            )));
        }
        for pixel in canvas.pixels_mut() {
            for c in 0..3 {
                let unit = pixel.0[c] as f32 / 255.0;
                let standardized = (unit - mean[c]) / std[c];
                let restored = standardized * std[c] + mean[c];
                pixel.0[c] = (restored * 255.0).round().clamp(0.0, 255.0) as u8;
            }
        }
        Ok(())
    }

    /// Stretches the image to the canvas without padding or filtering. The
    /// result is marked `degraded`.
    pub fn plain_resize(&self, image: &RawImage) -> NormalizedImage {
        let (orig_w, orig_h) = image.dimensions();
        let (tw, th) = (self.target_width, self.target_height);
        let canvas = if image.is_empty() {
            RgbImage::from_pixel(tw, th, Rgb(self.stats.padding_color))
        } else {
            imageops::resize(&image.as_dynamic().to_rgb8(), tw, th, FilterType::Lanczos3)
        };
        NormalizedImage {
            image: canvas,
            original_width: orig_w,
            original_height: orig_h,
            content_width: tw,
            content_height: th,
            degraded: true,
        }
    }
}

/// Largest size with the source aspect ratio that fits inside the target.
/// Each side is at least one pixel.
pub fn fit_dimensions(width: u32, height: u32, target_width: u32, target_height: u32) -> (u32, u32) {
    let scale = f64::min(
        target_width as f64 / width as f64,
        target_height as f64 / height as f64,
    );
    let w = ((width as f64 * scale).round() as u32).clamp(1, target_width);
    let h = ((height as f64 * scale).round() as u32).clamp(1, target_height);
    (w, h)
}
