// THEORY:
// The validator is the gate in front of every other stage. Degenerate
// thumbnails carry no usable detail and very large photos would make the
// resampling stages expensive, so both are turned away before any pixel work.
// It only reads dimensions.

use crate::config::PipelineConfig;
use crate::core_modules::raw_image::RawImage;
use crate::error::PipelineError;

/// Accepts images whose width and height both lie in `[min_dimension, max_dimension]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageValidator {
    pub min_dimension: u32,
    pub max_dimension: u32,
}

impl Default for ImageValidator {
    fn default() -> Self {
        Self {
            min_dimension: 50,
            max_dimension: 4000,
        }
    }
}

impl ImageValidator {
    pub fn new(min_dimension: u32, max_dimension: u32) -> Self {
        Self {
            min_dimension,
            max_dimension,
        }
    }

    pub fn from_config(config: &PipelineConfig) -> Self {
        Self::new(config.min_dimension, config.max_dimension)
    }

    pub fn validate(&self, image: &RawImage) -> bool {
        self.check(image).is_ok()
    }

    /// Same decision as `validate`, with the rejected dimensions attached.
    pub fn check(&self, image: &RawImage) -> Result<(), PipelineError> {
        let (width, height) = image.dimensions();
        if self.accepts(width, height) {
            Ok(())
        } else {
            Err(PipelineError::InvalidDimensions {
                width,
                height,
                min: self.min_dimension,
                max: self.max_dimension,
            })
        }
    }

    pub fn accepts(&self, width: u32, height: u32) -> bool {
        let range = self.min_dimension..=self.max_dimension;
        range.contains(&width) && range.contains(&height)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::DynamicImage;

    fn blank(width: u32, height: u32) -> RawImage {
        RawImage::new(DynamicImage::new_rgb8(width, height))
    }

    #[test]
    fn boundary_values_are_exact() {
        let validator = ImageValidator::default();
        assert!(!validator.validate(&blank(49, 100)));
        assert!(validator.validate(&blank(50, 100)));
        assert!(validator.validate(&blank(4000, 100)));
        assert!(!validator.validate(&blank(4001, 100)));

        assert!(!validator.validate(&blank(100, 49)));
        assert!(validator.validate(&blank(100, 50)));
        assert!(validator.validate(&blank(100, 4000)));
        assert!(!validator.validate(&blank(100, 4001)));
    }

    #[test]
    fn both_sides_must_be_in_range() {
        let validator = ImageValidator::default();
        assert!(validator.validate(&blank(50, 50)));
        assert!(!validator.validate(&blank(49, 4001)));
        assert!(!validator.validate(&blank(0, 0)));
    }

    #[test]
    fn check_reports_the_rejected_size() {
        let err = ImageValidator::default().check(&blank(30, 60)).unwrap_err();
        assert_eq!(
            err,
            PipelineError::InvalidDimensions {
                width: 30,
                height: 60,
                min: 50,
                max: 4000
            }
        );
    }
}
