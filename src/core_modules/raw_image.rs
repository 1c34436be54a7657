// THEORY:
// `RawImage` is the caller-owned input to the whole engine. It is a "dumb"
// container around a decoded pixel buffer: it knows its size and color mode
// and how to decode itself from an upload, nothing more. Every stage borrows it
// and returns new images, so the caller's photo is never modified.

use crate::error::PipelineError;
use image::{DynamicImage, ImageFormat};
use std::fmt;

/// The channel layout of a decoded image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ColorMode {
    Grayscale,
    GrayscaleAlpha,
    Rgb,
    Rgba,
    /// Any other layout (16-bit, float), named by its `image` color type.
    Other(String),
}

impl fmt::Display for ColorMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ColorMode::Grayscale => write!(f, "L"),
            ColorMode::GrayscaleAlpha => write!(f, "LA"),
            ColorMode::Rgb => write!(f, "RGB"),
            ColorMode::Rgba => write!(f, "RGBA"),
            ColorMode::Other(name) => write!(f, "{name}"),
        }
    }
}

/// Upload formats accepted from the UI layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeclaredFormat {
    Png,
    Jpeg,
}

impl DeclaredFormat {
    /// Maps a file extension (`png`, `jpg`, `jpeg`, any case) to a format.
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "png" => Some(DeclaredFormat::Png),
            "jpg" | "jpeg" => Some(DeclaredFormat::Jpeg),
            _ => None,
        }
    }

    fn image_format(self) -> ImageFormat {
        match self {
            DeclaredFormat::Png => ImageFormat::Png,
            DeclaredFormat::Jpeg => ImageFormat::Jpeg,
        }
    }
}

/// A decoded photograph as handed over by the caller.
#[derive(Debug, Clone, PartialEq)]
pub struct RawImage {
    image: DynamicImage,
}

impl RawImage {
    pub fn new(image: DynamicImage) -> Self {
        Self { image }
    }

    /// Decodes an upload, rejecting payloads over `max_bytes` before touching the decoder.
    pub fn decode(bytes: &[u8], format: DeclaredFormat, max_bytes: usize) -> Result<Self, PipelineError> {
        if bytes.len() > max_bytes {
            return Err(PipelineError::PayloadTooLarge {
                size: bytes.len(),
                limit: max_bytes,
            });
        }
        let image = image::load_from_memory_with_format(bytes, format.image_format())
            .map_err(|e| PipelineError::Decode(e.to_string()))?;
        Ok(Self { image })
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.image.width(), self.image.height())
    }

    pub fn is_empty(&self) -> bool {
        self.image.width() == 0 || self.image.height() == 0
    }

    pub fn color_mode(&self) -> ColorMode {
        match &self.image {
            DynamicImage::ImageLuma8(_) => ColorMode::Grayscale,
            DynamicImage::ImageLumaA8(_) => ColorMode::GrayscaleAlpha,
            DynamicImage::ImageRgb8(_) => ColorMode::Rgb,
            DynamicImage::ImageRgba8(_) => ColorMode::Rgba,
            other => ColorMode::Other(format!("{:?}", other.color())),
        }
    }

    pub fn as_dynamic(&self) -> &DynamicImage {
        &self.image
    }
}

impl From<DynamicImage> for RawImage {
    fn from(image: DynamicImage) -> Self {
        Self::new(image)
    }
}
