// THEORY:
// Classification is a strategy chosen once, when the process starts:
//
// - `ModelBackedClassifier` when a trained artifact loads.
// - `RuleBasedClassifier` otherwise.
//
// Both satisfy the same contract: a normalized canvas in, at most `k`
// `Prediction`s out, confidences in [0,1], descending, ties in input order.
//
// `ClassifierContext` owns the active strategy for the life of the process.
// It is built once, shared by reference (`Arc`) across concurrent pipeline
// invocations and never mutated by inference. The only writer is
// `replace_strategy`, which swaps the whole strategy under a short write lock;
// readers clone the `Arc` and release the lock before running inference.

pub mod model_backed;
pub mod rule_based;

pub use model_backed::{InferenceBackend, ModelBackedClassifier};
pub use rule_based::{RULE_BASED_CLASSES, RuleBasedClassifier};

use crate::config::PipelineConfig;
use crate::core_modules::features::FeatureExtractor;
use crate::core_modules::normalizer::NormalizedImage;
use crate::error::PipelineError;
use serde::Serialize;
use std::sync::{Arc, PoisonError, RwLock};

/// A disease label with the classifier's confidence in it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Prediction {
    pub disease: String,
    /// Always within [0,1].
    pub confidence: f32,
}

impl Prediction {
    /// Creates a prediction, clamping the confidence into [0,1]. NaN becomes 0.
    pub fn new(disease: impl Into<String>, confidence: f32) -> Self {
        let confidence = if confidence.is_nan() { 0.0 } else { confidence.clamp(0.0, 1.0) };
        Self {
            disease: disease.into(),
            confidence,
        }
    }
}

/// Stable sort by descending confidence, then keep the first `top_k`.
pub fn rank_predictions(mut predictions: Vec<Prediction>, top_k: usize) -> Vec<Prediction> {
    predictions.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
    predictions.truncate(top_k);
    predictions
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ClassifierKind {
    ModelBacked,
    RuleBased,
}

/// The active inference strategy.
#[derive(Debug)]
pub enum ClassifierStrategy {
    ModelBacked(ModelBackedClassifier),
    RuleBased(RuleBasedClassifier),
}

impl ClassifierStrategy {
    pub fn kind(&self) -> ClassifierKind {
        match self {
            ClassifierStrategy::ModelBacked(_) => ClassifierKind::ModelBacked,
            ClassifierStrategy::RuleBased(_) => ClassifierKind::RuleBased,
        }
    }

    pub fn classes(&self) -> Vec<String> {
        match self {
            ClassifierStrategy::ModelBacked(model) => model.labels().to_vec(),
            ClassifierStrategy::RuleBased(rules) => rules.classes(),
        }
    }

    /// Ranked predictions for one canvas. The rule-based path summarizes the
    /// canvas with `FeatureExtractor` first.
    pub fn predict(&self, image: &NormalizedImage) -> Result<Vec<Prediction>, PipelineError> {
        match self {
            ClassifierStrategy::ModelBacked(model) => model.predict(image),
            ClassifierStrategy::RuleBased(rules) => {
                let features = FeatureExtractor::new().extract_normalized(image);
                Ok(rules.predict(&features))
            }
        }
    }
}

/// Description of the active classifier, for display and diagnostics.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassifierInfo {
    pub kind: ClassifierKind,
    pub model_available: bool,
    pub classes: Vec<String>,
    pub confidence_threshold: f32,
    /// Why the trained model is not in use, if it is not.
    pub unavailable_reason: Option<String>,
}

/// Process-wide classifier state: initialized once, read-only during inference.
#[derive(Debug)]
pub struct ClassifierContext {
    strategy: RwLock<Arc<ClassifierStrategy>>,
    unavailable_reason: RwLock<Option<String>>,
    confidence_threshold: f32,
}

impl ClassifierContext {
    /// Resolves the strategy from the configured model artifact.
    ///
    /// A missing or unloadable model is not an error: it is logged once here and
    /// every later prediction goes to the rule-based classifier.
    pub fn initialize(config: &PipelineConfig) -> Self {
        let rules = || RuleBasedClassifier::new(config.rules.clone(), config.max_predictions);

        let (strategy, reason) = match config.model.path.as_deref() {
            None => (
                ClassifierStrategy::RuleBased(rules()),
                Some("no model artifact configured".to_string()),
            ),
            Some(path) => match ModelBackedClassifier::load(path, &config.model, config.max_predictions) {
                Ok(model) => {
                    tracing::info!(path = %path.display(), classes = model.labels().len(), "using model-backed classifier");
                    (ClassifierStrategy::ModelBacked(model), None)
                }
                Err(err) => (ClassifierStrategy::RuleBased(rules()), Some(err.to_string())),
            },
        };

        if let Some(reason) = &reason {
            tracing::warn!(reason = %reason, "trained model unavailable, using rule-based classifier");
        }

        Self {
            strategy: RwLock::new(Arc::new(strategy)),
            unavailable_reason: RwLock::new(reason),
            confidence_threshold: config.confidence_threshold,
        }
    }

    /// Wraps an already-built strategy.
    pub fn with_strategy(strategy: ClassifierStrategy, confidence_threshold: f32) -> Self {
        let reason = match strategy.kind() {
            ClassifierKind::ModelBacked => None,
            ClassifierKind::RuleBased => Some("rule-based classifier selected explicitly".to_string()),
        };
        Self {
            strategy: RwLock::new(Arc::new(strategy)),
            unavailable_reason: RwLock::new(reason),
            confidence_threshold,
        }
    }

    /// The active strategy. The lock is held only long enough to clone the `Arc`.
    pub fn strategy(&self) -> Arc<ClassifierStrategy> {
        self.strategy.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn kind(&self) -> ClassifierKind {
        self.strategy().kind()
    }

    pub fn predict(&self, image: &NormalizedImage) -> Result<Vec<Prediction>, PipelineError> {
        self.strategy().predict(image)
    }

    /// Swaps in a new strategy, e.g. after a model has been retrained.
    /// In-flight predictions finish on the strategy they started with.
    pub fn replace_strategy(&self, strategy: ClassifierStrategy) {
        let kind = strategy.kind();
        let reason = match kind {
            ClassifierKind::ModelBacked => None,
            ClassifierKind::RuleBased => Some("rule-based classifier swapped in".to_string()),
        };
        *self.strategy.write().unwrap_or_else(PoisonError::into_inner) = Arc::new(strategy);
        *self.unavailable_reason.write().unwrap_or_else(PoisonError::into_inner) = reason;
        tracing::info!(?kind, "classifier strategy replaced");
    }

    pub fn info(&self) -> ClassifierInfo {
        let strategy = self.strategy();
        let kind = strategy.kind();
        ClassifierInfo {
            kind,
            model_available: kind == ClassifierKind::ModelBacked,
            classes: strategy.classes(),
            confidence_threshold: self.confidence_threshold,
            unavailable_reason: self
                .unavailable_reason
                .read()
                .unwrap_or_else(PoisonError::into_inner)
                .clone(),
        }
    }
}
