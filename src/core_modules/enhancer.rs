// THEORY:
// The `ImageEnhancer` is a quality-of-life stage. Field photos of livestock are
// often flat and slightly soft, so before normalization we:
//
// 1.  Stretch contrast around the mean luminance (blend away from a flat gray).
// 2.  Sharpen by blending away from a 3x3 smoothed copy.
// 3.  Knock down sensor noise with a very light Gaussian blur.
//
// Steps 1 and 2 are "enhance by extrapolation": `out = base + factor * (img - base)`,
// so a factor of 1.0 is the identity. Alpha channels pass through untouched.
//
// Nothing downstream depends on enhancement for correctness. `try_enhance`
// reports why it could not run; `enhance` swallows that and hands back the
// input unchanged.

use crate::config::EnhancementConfig;
use crate::core_modules::pixel::to_luminance_plane;
use crate::core_modules::raw_image::RawImage;
use crate::error::PipelineError;
use image::{DynamicImage, ImageBuffer, Pixel, imageops};

/// Weights of the smoothing kernel used as the sharpness baseline (sum 13).
const SMOOTH_KERNEL: [f32; 9] = [1.0, 1.0, 1.0, 1.0, 5.0, 1.0, 1.0, 1.0, 1.0];
const SMOOTH_KERNEL_SUM: f32 = 13.0;

#[derive(Debug, Clone, Default)]
pub struct ImageEnhancer {
    config: EnhancementConfig,
}

impl ImageEnhancer {
    pub fn new(config: EnhancementConfig) -> Self {
        Self { config }
    }

    /// Enhances the image, or returns a copy of the input if enhancement fails.
    pub fn enhance(&self, image: &RawImage) -> RawImage {
        match self.try_enhance(image) {
            Ok(enhanced) => enhanced,
            Err(err) => {
                tracing::debug!(error = %err, "enhancement skipped, using original image");
                image.clone()
            }
        }
    }

    pub fn try_enhance(&self, image: &RawImage) -> Result<RawImage, PipelineError> {
        if image.is_empty() {
            return Err(PipelineError::EmptyImage);
        }
        let source = image.as_dynamic();
        let mean = mean_luminance_level(source);

        let enhanced = match source {
            DynamicImage::ImageLuma8(buf) => DynamicImage::ImageLuma8(self.enhance_buffer(buf, mean)),
            DynamicImage::ImageLumaA8(buf) => DynamicImage::ImageLumaA8(self.enhance_buffer(buf, mean)),
            DynamicImage::ImageRgb8(buf) => DynamicImage::ImageRgb8(self.enhance_buffer(buf, mean)),
            DynamicImage::ImageRgba8(buf) => DynamicImage::ImageRgba8(self.enhance_buffer(buf, mean)),
            _ => return Err(PipelineError::UnsupportedColorMode(image.color_mode())),
        };
        Ok(RawImage::new(enhanced))
    }

    fn enhance_buffer<P>(&self, buf: &ImageBuffer<P, Vec<u8>>, mean: f32) -> ImageBuffer<P, Vec<u8>>
    where
        P: Pixel<Subpixel = u8> + 'static,
    {
        let contrasted = adjust_contrast(buf, mean, self.config.contrast_factor);
        let sharpened = adjust_sharpness(&contrasted, self.config.sharpness_factor);
        if self.config.denoise_sigma > 0.0 {
            imageops::blur(&sharpened, self.config.denoise_sigma)
        } else {
            sharpened
        }
    }
}

/// Mean luminance of the whole image, rounded to a whole gray level.
fn mean_luminance_level(image: &DynamicImage) -> f32 {
    let gray = to_luminance_plane(image);
    let count = gray.as_raw().len();
    if count == 0 {
        return 0.0;
    }
    let sum: u64 = gray.as_raw().iter().map(|&v| v as u64).sum();
    (sum as f64 / count as f64).round() as f32
}

#[inline]
fn blend(base: f32, value: f32, factor: f32) -> u8 {
    (base + factor * (value - base)).round().clamp(0.0, 255.0) as u8
}

#[inline]
fn color_channels<P: Pixel>() -> usize {
    P::CHANNEL_COUNT as usize - usize::from(P::HAS_ALPHA)
}

/// Blends every color channel away from a flat image at `mean`.
fn adjust_contrast<P>(buf: &ImageBuffer<P, Vec<u8>>, mean: f32, factor: f32) -> ImageBuffer<P, Vec<u8>>
where
    P: Pixel<Subpixel = u8>,
{
    let colors = color_channels::<P>();
    let mut out = buf.clone();
    for pixel in out.pixels_mut() {
        for channel in pixel.channels_mut().iter_mut().take(colors) {
            *channel = blend(mean, *channel as f32, factor);
        }
    }
    out
}

/// Blends every interior pixel away from its 3x3 smoothed value. Border pixels are kept.
fn adjust_sharpness<P>(buf: &ImageBuffer<P, Vec<u8>>, factor: f32) -> ImageBuffer<P, Vec<u8>>
where
    P: Pixel<Subpixel = u8>,
{
    let (w, h) = buf.dimensions();
    let mut out = buf.clone();
    if w < 3 || h < 3 {
        return out;
    }
    let colors = color_channels::<P>();
    for y in 1..h - 1 {
        for x in 1..w - 1 {
            let mut smoothed = [0.0f32; 4];
            for (k, weight) in SMOOTH_KERNEL.iter().enumerate() {
                let nx = x + k as u32 % 3 - 1;
                let ny = y + k as u32 / 3 - 1;
                let neighbor = buf.get_pixel(nx, ny).channels();
                for c in 0..colors {
                    smoothed[c] += weight * neighbor[c] as f32;
                }
            }
            let original = buf.get_pixel(x, y).channels();
            let target = out.get_pixel_mut(x, y).channels_mut();
            for c in 0..colors {
                target[c] = blend(smoothed[c] / SMOOTH_KERNEL_SUM, original[c] as f32, factor);
            }
        }
    }
    out
}
