// THEORY:
// Every stage of the engine reports failure through one error type. Most of
// these errors never reach the caller as a hard failure: the pipeline absorbs
// enhancement, normalization and prediction errors into per-image diagnostics
// and only input errors cause an image to be skipped. `category()` gives each
// variant a stable code so a caller can tell the two apart without matching on
// message text.

use crate::core_modules::raw_image::ColorMode;
use serde::Serialize;
use thiserror::Error;

/// Errors that can occur while analyzing an image or a batch of images.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PipelineError {
    #[error("image rejected: {width}x{height} is outside the accepted {min}..={max} pixel range")]
    InvalidDimensions {
        width: u32,
        height: u32,
        min: u32,
        max: u32,
    },

    #[error("image payload of {size} bytes exceeds the {limit} byte limit")]
    PayloadTooLarge { size: usize, limit: usize },

    #[error("unreadable image bytes: {0}")]
    Decode(String),

    #[error("image has no pixels")]
    EmptyImage,

    #[error("unsupported color mode: {0}")]
    UnsupportedColorMode(ColorMode),

    #[error("model unavailable: {0}")]
    ModelUnavailable(String),

    #[error("prediction failed: {0}")]
    PredictionFailure(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("batch of {size} images exceeds the cap of {cap}")]
    BatchTooLarge { size: usize, cap: usize },

    #[error("worker failure: {0}")]
    Worker(String),
}

/// Coarse classification of a `PipelineError`, used as a diagnostic code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// The image itself is unusable. The image is skipped.
    Input,
    /// Enhancement failed. The unmodified image is used instead.
    Enhancement,
    /// Aspect-preserving normalization failed. A plain resize is used instead.
    Normalization,
    /// The trained model could not be loaded. The rule-based classifier is used.
    ModelUnavailable,
    /// A classifier failed on one image. The image gets no predictions.
    Prediction,
    /// The configuration was rejected at construction time.
    Configuration,
    /// The async runtime lost a task.
    Runtime,
}

impl PipelineError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            PipelineError::InvalidDimensions { .. }
            | PipelineError::PayloadTooLarge { .. }
            | PipelineError::Decode(_)
            | PipelineError::EmptyImage => ErrorCategory::Input,
            PipelineError::UnsupportedColorMode(_) => ErrorCategory::Enhancement,
            PipelineError::ModelUnavailable(_) => ErrorCategory::ModelUnavailable,
            PipelineError::PredictionFailure(_) => ErrorCategory::Prediction,
            PipelineError::InvalidConfig(_) | PipelineError::BatchTooLarge { .. } => {
                ErrorCategory::Configuration
            }
            PipelineError::Worker(_) => ErrorCategory::Runtime,
        }
    }

    /// True when the failure means the image was skipped rather than degraded.
    pub fn is_input_error(&self) -> bool {
        self.category() == ErrorCategory::Input
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn input_errors_are_categorized_as_input() {
        let err = PipelineError::InvalidDimensions {
            width: 10,
            height: 10,
            min: 50,
            max: 4000,
        };
        assert!(err.is_input_error());
        assert!(PipelineError::Decode("bad header".into()).is_input_error());
        assert!(!PipelineError::PredictionFailure("nan".into()).is_input_error());
    }

    #[test]
    fn display_names_the_offending_dimensions() {
        let err = PipelineError::InvalidDimensions {
            width: 49,
            height: 120,
            min: 50,
            max: 4000,
        };
        assert_eq!(
            err.to_string(),
            "image rejected: 49x120 is outside the accepted 50..=4000 pixel range"
        );
    }
}
