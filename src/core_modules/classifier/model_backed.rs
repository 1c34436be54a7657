// THEORY:
// `ModelBackedClassifier` adapts a trained network to the classifier contract.
// The network itself sits behind the `InferenceBackend` trait so the contract
// (normalized canvas in, top-k labelled probabilities out) is independent of
// the runtime. The ONNX backend is compiled in with the `onnx` feature; without
// it, loading reports the model as unavailable and the caller falls back to
// the rule-based classifier.

use super::{Prediction, rank_predictions};
use crate::config::{ModelConfig, TensorLayout};
use crate::core_modules::normalizer::NormalizedImage;
use crate::error::PipelineError;
use std::path::Path;

/// Runs a trained network on one input tensor and returns its class scores.
pub trait InferenceBackend: Send + Sync {
    /// `shape` is the batch-of-one tensor shape, `data` its values in that order.
    fn infer(&self, shape: [usize; 4], data: &[f32]) -> Result<Vec<f32>, PipelineError>;
}

pub struct ModelBackedClassifier {
    backend: Box<dyn InferenceBackend>,
    labels: Vec<String>,
    layout: TensorLayout,
    max_predictions: usize,
}

impl std::fmt::Debug for ModelBackedClassifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelBackedClassifier")
            .field("labels", &self.labels)
            .field("layout", &self.layout)
            .field("max_predictions", &self.max_predictions)
            .finish_non_exhaustive()
    }
}

impl ModelBackedClassifier {
    pub fn new(
        backend: Box<dyn InferenceBackend>,
        labels: Vec<String>,
        layout: TensorLayout,
        max_predictions: usize,
    ) -> Self {
        Self {
            backend,
            labels,
            layout,
            max_predictions,
        }
    }

    /// Loads the artifact at `path`. Fails with `ModelUnavailable` if the file is
    /// missing, the runtime rejects it, or no runtime is compiled in.
    pub fn load(path: &Path, config: &ModelConfig, max_predictions: usize) -> Result<Self, PipelineError> {
        if !path.exists() {
            return Err(PipelineError::ModelUnavailable(format!(
                "no model artifact at {}",
                path.display()
            )));
        }
        if config.labels.is_empty() {
            return Err(PipelineError::ModelUnavailable("model has no class labels".into()));
        }
        let backend = load_backend(path)?;
        Ok(Self::new(backend, config.labels.clone(), config.layout, max_predictions))
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    pub fn predict(&self, image: &NormalizedImage) -> Result<Vec<Prediction>, PipelineError> {
        let (shape, data) = image.to_tensor(self.layout);
        let scores = self.backend.infer(shape, &data)?;

        if scores.len() != self.labels.len() {
            return Err(PipelineError::PredictionFailure(format!(
                "model returned {} scores for {} labels",
                scores.len(),
                self.labels.len()
            )));
        }
        if let Some(bad) = scores.iter().find(|s| !s.is_finite()) {
            return Err(PipelineError::PredictionFailure(format!("model returned non-finite score {bad}")));
        }

        let predictions = self
            .labels
            .iter()
            .zip(scores)
            .map(|(label, score)| Prediction::new(label.clone(), score))
            .collect();
        Ok(rank_predictions(predictions, self.max_predictions))
    }
}

#[cfg(feature = "onnx")]
fn load_backend(path: &Path) -> Result<Box<dyn InferenceBackend>, PipelineError> {
    Ok(Box::new(onnx::OnnxBackend::load(path)?))
}

#[cfg(not(feature = "onnx"))]
fn load_backend(path: &Path) -> Result<Box<dyn InferenceBackend>, PipelineError> {
    Err(PipelineError::ModelUnavailable(format!(
        "{} found but this build has no model runtime (enable the `onnx` feature)",
        path.display()
    )))
}

#[cfg(feature = "onnx")]
mod onnx {
    use super::InferenceBackend;
    use crate::error::PipelineError;
    use ort::session::Session;
    use ort::value::TensorRef;
    use std::path::Path;
    use std::sync::Mutex;

    /// ONNX Runtime session. `Session::run` needs `&mut`, hence the mutex.
    pub struct OnnxBackend {
        session: Mutex<Session>,
    }

    impl OnnxBackend {
        pub fn load(path: &Path) -> Result<Self, PipelineError> {
            let session = Session::builder()
                .map_err(|e: ort::Error| PipelineError::ModelUnavailable(e.to_string()))?
                .commit_from_file(path)
                .map_err(|e: ort::Error| PipelineError::ModelUnavailable(format!("ONNX load failed: {e}")))?;
            tracing::info!(path = %path.display(), "ONNX disease model loaded");
            Ok(Self {
                session: Mutex::new(session),
            })
        }
    }

    impl InferenceBackend for OnnxBackend {
        fn infer(&self, shape: [usize; 4], data: &[f32]) -> Result<Vec<f32>, PipelineError> {
            let input = ndarray::Array4::from_shape_vec(
                (shape[0], shape[1], shape[2], shape[3]),
                data.to_vec(),
            )
            .map_err(|e| PipelineError::PredictionFailure(e.to_string()))?;
            let tensor = TensorRef::from_array_view(&input)
                .map_err(|e| PipelineError::PredictionFailure(e.to_string()))?;

            let mut session = self
                .session
                .lock()
                .map_err(|_| PipelineError::PredictionFailure("model session lock poisoned".into()))?;
            let outputs = session
                .run(ort::inputs![tensor])
                .map_err(|e| PipelineError::PredictionFailure(format!("ONNX inference failed: {e}")))?;

            let (_, scores) = outputs[0]
                .try_extract_tensor::<f32>()
                .map_err(|e| PipelineError::PredictionFailure(format!("output extraction: {e}")))?;
            Ok(scores.to_vec())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_modules::normalizer::Normalizer;
    use crate::core_modules::raw_image::RawImage;
    use image::DynamicImage;

    struct FixedScores(Vec<f32>);

    impl InferenceBackend for FixedScores {
        fn infer(&self, shape: [usize; 4], data: &[f32]) -> Result<Vec<f32>, PipelineError> {
            assert_eq!(shape.iter().product::<usize>(), data.len());
            Ok(self.0.clone())
        }
    }

    fn canvas() -> NormalizedImage {
        Normalizer::default().normalize(&RawImage::new(DynamicImage::new_rgb8(100, 100)))
    }

    fn classifier(scores: Vec<f32>, labels: &[&str]) -> ModelBackedClassifier {
        ModelBackedClassifier::new(
            Box::new(FixedScores(scores)),
            labels.iter().map(|l| l.to_string()).collect(),
            TensorLayout::Nhwc,
            3,
        )
    }

    #[test]
    fn returns_top_three_by_probability() {
        let model = classifier(vec![0.05, 0.5, 0.1, 0.3, 0.05], &["A", "B", "C", "D", "E"]);
        let out = model.predict(&canvas()).expect("predicts");
        assert_eq!(
            out,
            vec![
                Prediction::new("B", 0.5),
                Prediction::new("D", 0.3),
                Prediction::new("C", 0.1),
            ]
        );
    }

    #[test]
    fn ties_keep_label_order() {
        let model = classifier(vec![0.2, 0.4, 0.4, 0.0], &["A", "B", "C", "D"]);
        let out = model.predict(&canvas()).expect("predicts");
        let labels: Vec<_> = out.iter().map(|p| p.disease.as_str()).collect();
        assert_eq!(labels, ["B", "C", "A"]);
    }

    #[test]
    fn label_count_mismatch_is_a_prediction_failure() {
        let model = classifier(vec![0.5, 0.5], &["A", "B", "C"]);
        assert!(matches!(model.predict(&canvas()), Err(PipelineError::PredictionFailure(_))));
    }

    #[test]
    fn non_finite_scores_are_rejected() {
        let model = classifier(vec![f32::NAN, 0.5], &["A", "B"]);
        assert!(matches!(model.predict(&canvas()), Err(PipelineError::PredictionFailure(_))));
    }

    #[test]
    fn scores_outside_unit_range_are_clamped() {
        let model = classifier(vec![1.7, -0.2], &["A", "B"]);
        let out = model.predict(&canvas()).expect("predicts");
        assert_eq!(out[0].confidence, 1.0);
        assert_eq!(out[1].confidence, 0.0);
    }

    #[test]
    fn missing_artifact_is_unavailable() {
        let err = ModelBackedClassifier::load(
            Path::new("/nonexistent/cow_disease.onnx"),
            &ModelConfig::default(),
            3,
        )
        .unwrap_err();
        assert!(matches!(err, PipelineError::ModelUnavailable(_)));
    }
}
