//! Configuration for the diagnosis pipeline.
//!
//! Every constant the stages rely on lives here so that it can be tuned
//! without touching the algorithms. `PipelineConfig::default()` reproduces
//! the reference behavior.

use crate::error::PipelineError;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::PathBuf;

/// Environment variable that points at the trained model artifact.
pub const MODEL_PATH_ENV: &str = "COW_DISEASE_MODEL_PATH";

/// Where the trained model is looked for when the environment does not say.
pub const DEFAULT_MODEL_PATH: &str = "cow_disease_model/model/trained_model.onnx";

/// Output classes of the trained model, in training order.
pub const DEFAULT_MODEL_CLASSES: [&str; 10] = [
    "Actinomycosis",
    "Anthrax",
    "BovinePapillomatosis",
    "Brucellosis",
    "Footrot",
    "LumpySkinDisease",
    "Mastitis",
    "Pinkeye",
    "Ringworm",
    "TickInfestation",
];

/// Top-level configuration for `DiagnosisPipeline`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Width of the normalized canvas fed to the classifier.
    pub target_width: u32,
    /// Height of the normalized canvas fed to the classifier.
    pub target_height: u32,
    /// Smallest accepted width or height, inclusive.
    pub min_dimension: u32,
    /// Largest accepted width or height, inclusive.
    pub max_dimension: u32,
    /// Largest encoded upload accepted by the decoder, in bytes.
    pub max_payload_bytes: usize,
    /// Predictions below this confidence are dropped.
    pub confidence_threshold: f32,
    /// How many ranked predictions a classifier returns per image.
    pub max_predictions: usize,
    /// Upper bound on images per batch request.
    pub max_batch_size: usize,
    /// Worker tasks for parallel batches. `None` uses the number of CPUs.
    pub worker_count: Option<usize>,
    pub enhancement: EnhancementConfig,
    pub normalization: NormalizationConfig,
    pub quality: QualityThresholds,
    pub rules: RuleThresholds,
    pub model: ModelConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            target_width: 224,
            target_height: 224,
            min_dimension: 50,
            max_dimension: 4000,
            max_payload_bytes: 10 * 1024 * 1024,
            confidence_threshold: 0.3,
            max_predictions: 3,
            max_batch_size: 32,
            worker_count: None,
            enhancement: EnhancementConfig::default(),
            normalization: NormalizationConfig::default(),
            quality: QualityThresholds::default(),
            rules: RuleThresholds::default(),
            model: ModelConfig::default(),
        }
    }
}

/// Contrast, sharpness and denoising strengths for `ImageEnhancer`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnhancementConfig {
    /// 1.0 leaves contrast unchanged.
    pub contrast_factor: f32,
    /// 1.0 leaves sharpness unchanged.
    pub sharpness_factor: f32,
    /// Gaussian sigma of the denoising blur. 0.0 disables it.
    pub denoise_sigma: f32,
}

impl Default for EnhancementConfig {
    fn default() -> Self {
        Self {
            contrast_factor: 1.2,
            sharpness_factor: 1.1,
            denoise_sigma: 0.5,
        }
    }
}

/// Per-channel statistics and padding used by `Normalizer`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NormalizationConfig {
    /// Reference channel means on the [0,1] scale (ImageNet).
    pub mean: [f32; 3],
    /// Reference channel standard deviations on the [0,1] scale (ImageNet).
    pub std: [f32; 3],
    /// Neutral color used to pad the canvas.
    pub padding_color: [u8; 3],
}

impl Default for NormalizationConfig {
    fn default() -> Self {
        Self {
            mean: [0.485, 0.456, 0.406],
            std: [0.229, 0.224, 0.225],
            padding_color: [128, 128, 128],
        }
    }
}

/// Limits used by `QualityAssessor`, all on the 0..255 luminance scale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QualityThresholds {
    /// Laplacian variance below this is blurry.
    pub blur: f64,
    /// Mean luminance below this is too dark.
    pub too_dark: f64,
    /// Mean luminance above this is too bright.
    pub too_bright: f64,
    /// Luminance standard deviation below this is low contrast.
    pub low_contrast: f64,
}

impl Default for QualityThresholds {
    fn default() -> Self {
        Self {
            blur: 100.0,
            too_dark: 50.0,
            too_bright: 200.0,
            low_contrast: 30.0,
        }
    }
}

/// Decision boundaries of the rule-based classifier, on the [0,1] feature scale.
///
/// These are uncalibrated placeholders kept configurable for that reason.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuleThresholds {
    /// Red-channel mean above which inflammation is suspected.
    pub red_intensity: f32,
    /// Minimum brightness for the inflammation rule.
    pub inflammation_brightness: f32,
    /// Brightness below which the dark-image rule fires.
    pub dark_brightness: f32,
    /// Contrast above which the visible-symptom rule fires.
    pub high_contrast: f32,
}

impl Default for RuleThresholds {
    fn default() -> Self {
        Self {
            red_intensity: 0.6,
            inflammation_brightness: 0.4,
            dark_brightness: 0.3,
            high_contrast: 0.7,
        }
    }
}

/// Memory order of the tensor handed to a trained model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TensorLayout {
    /// `[1, height, width, 3]`, the layout the model was trained with.
    #[default]
    Nhwc,
    /// `[1, 3, height, width]`.
    Nchw,
}

/// Trained model artifact settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Path to the model artifact. `None` goes straight to the rule-based classifier.
    pub path: Option<PathBuf>,
    /// Class labels, index-aligned with the model's output vector.
    pub labels: Vec<String>,
    pub layout: TensorLayout,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            path: None,
            labels: DEFAULT_MODEL_CLASSES.iter().map(|c| c.to_string()).collect(),
            layout: TensorLayout::default(),
        }
    }
}

impl PipelineConfig {
    /// Defaults, with the model path taken from `COW_DISEASE_MODEL_PATH`
    /// or `DEFAULT_MODEL_PATH` when it is unset.
    pub fn from_env() -> Self {
        let path = std::env::var_os(MODEL_PATH_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_MODEL_PATH));
        let mut config = Self::default();
        config.model.path = Some(path);
        config
    }

    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.target_width == 0 || self.target_height == 0 {
            return Err(PipelineError::InvalidConfig(format!(
                "target canvas must be non-empty, got {}x{}",
                self.target_width, self.target_height
            )));
        }
        if self.min_dimension > self.max_dimension {
            return Err(PipelineError::InvalidConfig(format!(
                "min_dimension {} exceeds max_dimension {}",
                self.min_dimension, self.max_dimension
            )));
        }
        if !(0.0..=1.0).contains(&self.confidence_threshold) {
            return Err(PipelineError::InvalidConfig(format!(
                "confidence_threshold {} is outside [0, 1]",
                self.confidence_threshold
            )));
        }
        if self.max_predictions == 0 {
            return Err(PipelineError::InvalidConfig("max_predictions must be at least 1".into()));
        }
        if self.max_batch_size == 0 {
            return Err(PipelineError::InvalidConfig("max_batch_size must be at least 1".into()));
        }
        if self.worker_count == Some(0) {
            return Err(PipelineError::InvalidConfig("worker_count must be at least 1".into()));
        }
        if self.model.labels.is_empty() {
            return Err(PipelineError::InvalidConfig("model.labels must not be empty".into()));
        }
        let mut seen = HashSet::new();
        if let Some(dup) = self.model.labels.iter().find(|label| !seen.insert(label.as_str())) {
            return Err(PipelineError::InvalidConfig(format!("duplicate model label {dup:?}")));
        }
        if self.normalization.std.iter().any(|s| !s.is_finite() || *s <= 0.0) {
            return Err(PipelineError::InvalidConfig(format!(
                "normalization std must be positive, got {:?}",
                self.normalization.std
            )));
        }
        let e = &self.enhancement;
        if [e.contrast_factor, e.sharpness_factor, e.denoise_sigma]
            .iter()
            .any(|v| !v.is_finite() || *v < 0.0)
        {
            return Err(PipelineError::InvalidConfig(format!(
                "enhancement factors must be finite and non-negative, got {e:?}"
            )));
        }
        Ok(())
    }

    /// Number of worker tasks for parallel batches.
    pub fn effective_worker_count(&self) -> usize {
        self.worker_count.unwrap_or_else(num_cpus::get).max(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_reference_constants() {
        let config = PipelineConfig::default();
        assert_eq!((config.target_width, config.target_height), (224, 224));
        assert_eq!((config.min_dimension, config.max_dimension), (50, 4000));
        assert_eq!(config.confidence_threshold, 0.3);
        assert_eq!(config.max_predictions, 3);
        assert_eq!(config.rules.red_intensity, 0.6);
        assert_eq!(config.model.labels.len(), 10);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn partial_config_fills_in_defaults() {
        let config: PipelineConfig =
            serde_json::from_str(r#"{ "confidence_threshold": 0.5, "rules": { "dark_brightness": 0.2 } }"#)
                .expect("config should parse");
        assert_eq!(config.confidence_threshold, 0.5);
        assert_eq!(config.rules.dark_brightness, 0.2);
        assert_eq!(config.rules.high_contrast, 0.7);
        assert_eq!(config.target_width, 224);
    }

    #[test]
    fn rejects_zero_std_and_empty_canvas() {
        let mut config = PipelineConfig::default();
        config.normalization.std = [0.2, 0.0, 0.2];
        assert!(matches!(config.validate(), Err(PipelineError::InvalidConfig(_))));

        let mut config = PipelineConfig::default();
        config.target_height = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_threshold_outside_unit_range() {
        let mut config = PipelineConfig::default();
        config.confidence_threshold = 1.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_empty_or_repeated_model_labels() {
        let mut config = PipelineConfig::default();
        config.model.labels = ["Mastitis", "Mastitis", "Anthrax"].map(String::from).to_vec();
        assert!(matches!(config.validate(), Err(PipelineError::InvalidConfig(msg)) if msg.contains("Mastitis")));

        config.model.labels.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn explicit_worker_count_wins() {
        let mut config = PipelineConfig::default();
        config.worker_count = Some(3);
        assert_eq!(config.effective_worker_count(), 3);
    }
}
