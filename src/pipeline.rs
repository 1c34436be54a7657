// THEORY:
// The `pipeline` module is the top-level API of the engine. It wires the stages
// into one call per image:
//
//   validate -> assess (advisory) -> enhance -> normalize -> classify -> filter
//
// and, for batches, folds the per-image results into an aggregated summary.
//
// Key architectural principles:
// 1.  **Only input errors skip an image.** A rejected or undecodable image is
//     reported by index and the batch carries on. Every later failure is
//     absorbed into a documented fallback (original image, plain resize, empty
//     prediction list) and recorded as a `Diagnostic` on the result.
// 2.  **Stateless per invocation.** `analyze_image` takes `&self` and touches
//     no shared mutable state. The classifier context is the only shared
//     resource and is read-only during inference, so one pipeline can serve
//     any number of concurrent callers.
// 3.  **Counts, not silence.** A `BatchReport` always says how many images
//     were uploaded and how many were analyzed.

use crate::config::PipelineConfig;
use crate::core_modules::aggregator::{AggregatedPrediction, MultiImageAggregator};
use crate::core_modules::classifier::{ClassifierContext, ClassifierInfo, ClassifierKind, Prediction};
use crate::core_modules::confidence::ConfidenceFilter;
use crate::core_modules::enhancer::ImageEnhancer;
use crate::core_modules::normalizer::Normalizer;
use crate::core_modules::quality::{QualityAssessor, QualityReport};
use crate::core_modules::raw_image::{DeclaredFormat, RawImage};
use crate::core_modules::validator::ImageValidator;
use crate::error::{ErrorCategory, PipelineError};
use serde::Serialize;
use std::borrow::Cow;
use std::sync::Arc;

/// The stage at which a failure was absorbed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStage {
    Enhancement,
    Normalization,
    Prediction,
}

/// A failure the pipeline recovered from while analyzing one image.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Diagnostic {
    pub stage: PipelineStage,
    pub category: ErrorCategory,
    pub message: String,
}

impl Diagnostic {
    fn new(stage: PipelineStage, error: &PipelineError) -> Self {
        Self {
            stage,
            category: error.category(),
            message: error.to_string(),
        }
    }
}

/// Everything the pipeline has to say about one image.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImageAnalysis {
    pub quality: QualityReport,
    /// Ranked and confidence-filtered.
    pub predictions: Vec<Prediction>,
    pub classifier: ClassifierKind,
    pub diagnostics: Vec<Diagnostic>,
}

impl ImageAnalysis {
    /// True when any stage had to fall back.
    pub fn is_degraded(&self) -> bool {
        !self.diagnostics.is_empty()
    }
}

/// The result for one image of a batch, tagged with its upload position.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageOutcome {
    pub index: usize,
    pub result: Result<ImageAnalysis, PipelineError>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BatchReport {
    /// One entry per uploaded image, in upload order.
    pub outcomes: Vec<ImageOutcome>,
    /// Cross-image ranking. Present when more than one image was uploaded
    /// and at least one was analyzed.
    pub summary: Option<Vec<AggregatedPrediction>>,
    pub uploaded: usize,
    pub analyzed: usize,
}

impl BatchReport {
    pub fn failed_indices(&self) -> Vec<usize> {
        self.outcomes
            .iter()
            .filter(|o| o.result.is_err())
            .map(|o| o.index)
            .collect()
    }

    pub fn failed(&self) -> usize {
        self.uploaded - self.analyzed
    }

    /// Successfully analyzed images with their upload index.
    pub fn analyses(&self) -> impl Iterator<Item = (usize, &ImageAnalysis)> {
        self.outcomes
            .iter()
            .filter_map(|o| o.result.as_ref().ok().map(|analysis| (o.index, analysis)))
    }
}

/// An encoded upload as received from the UI layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedImage {
    pub bytes: Vec<u8>,
    pub format: DeclaredFormat,
}

impl EncodedImage {
    pub fn new(bytes: Vec<u8>, format: DeclaredFormat) -> Self {
        Self { bytes, format }
    }
}

/// The main, top-level struct for the diagnosis engine.
#[derive(Debug)]
pub struct DiagnosisPipeline {
    config: PipelineConfig,
    validator: ImageValidator,
    assessor: QualityAssessor,
    enhancer: ImageEnhancer,
    normalizer: Normalizer,
    filter: ConfidenceFilter,
    aggregator: MultiImageAggregator,
    context: Arc<ClassifierContext>,
}

impl DiagnosisPipeline {
    /// Validates the config and resolves the classifier strategy once.
    pub fn new(config: PipelineConfig) -> Result<Self, PipelineError> {
        config.validate()?;
        let context = Arc::new(ClassifierContext::initialize(&config));
        Self::with_context(config, context)
    }

    /// Builds a pipeline around an existing classifier context, e.g. one shared
    /// with other pipelines.
    pub fn with_context(config: PipelineConfig, context: Arc<ClassifierContext>) -> Result<Self, PipelineError> {
        config.validate()?;
        Ok(Self {
            validator: ImageValidator::from_config(&config),
            assessor: QualityAssessor::new(config.quality.clone()),
            enhancer: ImageEnhancer::new(config.enhancement.clone()),
            normalizer: Normalizer::from_config(&config),
            filter: ConfidenceFilter::new(config.confidence_threshold),
            aggregator: MultiImageAggregator::new(),
            context,
            config,
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn context(&self) -> &Arc<ClassifierContext> {
        &self.context
    }

    pub fn classifier_info(&self) -> ClassifierInfo {
        self.context.info()
    }

    /// Runs one image through every stage. Fails only on input errors.
    pub fn analyze_image(&self, image: &RawImage) -> Result<ImageAnalysis, PipelineError> {
        self.validator.check(image)?;

        let quality = self.assessor.assess(image);
        let mut diagnostics = Vec::new();

        let enhanced = match self.enhancer.try_enhance(image) {
            Ok(enhanced) => Cow::Owned(enhanced),
            Err(err) => {
                tracing::debug!(error = %err, "enhancement skipped");
                diagnostics.push(Diagnostic::new(PipelineStage::Enhancement, &err));
                Cow::Borrowed(image)
            }
        };

        let normalized = match self.normalizer.try_normalize(&enhanced) {
            Ok(normalized) => normalized,
            Err(err) => {
                tracing::warn!(error = %err, "normalization fell back to plain resize");
                diagnostics.push(Diagnostic::new(PipelineStage::Normalization, &err));
                self.normalizer.plain_resize(&enhanced)
            }
        };

        let strategy = self.context.strategy();
        let predictions = match strategy.predict(&normalized) {
            Ok(predictions) => self.filter.apply(predictions),
            Err(err) => {
                tracing::warn!(error = %err, classifier = ?strategy.kind(), "prediction failed");
                diagnostics.push(Diagnostic::new(PipelineStage::Prediction, &err));
                Vec::new()
            }
        };

        tracing::debug!(
            overall = ?quality.overall,
            predictions = predictions.len(),
            diagnostics = diagnostics.len(),
            "image analyzed"
        );

        Ok(ImageAnalysis {
            quality,
            predictions,
            classifier: strategy.kind(),
            diagnostics,
        })
    }

    /// Decodes an upload and analyzes it.
    pub fn analyze_encoded(&self, bytes: &[u8], format: DeclaredFormat) -> Result<ImageAnalysis, PipelineError> {
        let image = RawImage::decode(bytes, format, self.config.max_payload_bytes)?;
        self.analyze_image(&image)
    }

    /// Analyzes every image in turn. A failing image is reported, not fatal;
    /// only an oversized batch is rejected outright.
    pub fn analyze_batch(&self, images: &[RawImage]) -> Result<BatchReport, PipelineError> {
        self.check_batch_size(images.len())?;
        let outcomes = images
            .iter()
            .enumerate()
            .map(|(index, image)| ImageOutcome {
                index,
                result: self.analyze_image(image),
            })
            .collect();
        Ok(self.build_report(outcomes))
    }

    pub fn analyze_encoded_batch(&self, uploads: &[EncodedImage]) -> Result<BatchReport, PipelineError> {
        self.check_batch_size(uploads.len())?;
        let outcomes = uploads
            .iter()
            .enumerate()
            .map(|(index, upload)| ImageOutcome {
                index,
                result: self.analyze_encoded(&upload.bytes, upload.format),
            })
            .collect();
        Ok(self.build_report(outcomes))
    }

    pub fn check_batch_size(&self, size: usize) -> Result<(), PipelineError> {
        if size > self.config.max_batch_size {
            return Err(PipelineError::BatchTooLarge {
                size,
                cap: self.config.max_batch_size,
            });
        }
        Ok(())
    }

    /// Counts outcomes and aggregates the successful ones. Callers that reject
    /// some uploads themselves can merge those failures in here.
    pub fn build_report(&self, outcomes: Vec<ImageOutcome>) -> BatchReport {
        for outcome in &outcomes {
            if let Err(err) = &outcome.result {
                tracing::warn!(index = outcome.index, error = %err, "image skipped");
            }
        }

        let per_image: Vec<Vec<Prediction>> = outcomes
            .iter()
            .filter_map(|o| o.result.as_ref().ok())
            .map(|analysis| analysis.predictions.clone())
            .collect();

        let uploaded = outcomes.len();
        let analyzed = per_image.len();
        let summary = (uploaded > 1 && analyzed > 0).then(|| self.aggregator.aggregate(&per_image));

        tracing::info!(uploaded, analyzed, "batch analyzed");

        BatchReport {
            outcomes,
            summary,
            uploaded,
            analyzed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_modules::classifier::{ClassifierStrategy, InferenceBackend, ModelBackedClassifier};
    use crate::config::TensorLayout;
    use image::{DynamicImage, Rgb, RgbImage};

    fn dark(width: u32, height: u32) -> RawImage {
        RawImage::new(DynamicImage::ImageRgb8(RgbImage::from_pixel(width, height, Rgb([20, 20, 20]))))
    }

    fn pipeline() -> DiagnosisPipeline {
        DiagnosisPipeline::new(PipelineConfig::default()).expect("default config is valid")
    }

    struct Failing;

    impl InferenceBackend for Failing {
        fn infer(&self, _shape: [usize; 4], _data: &[f32]) -> Result<Vec<f32>, PipelineError> {
            Err(PipelineError::PredictionFailure("backend exploded".into()))
        }
    }

    #[test]
    fn dark_photo_gets_foot_and_mouth() {
        let analysis = pipeline().analyze_image(&dark(300, 200)).expect("valid image");
        assert_eq!(analysis.classifier, ClassifierKind::RuleBased);
        assert_eq!(analysis.predictions, vec![Prediction::new("Foot and Mouth Disease", 0.55)]);
        assert!(!analysis.quality.issues.is_empty());
        assert!(analysis.diagnostics.is_empty());
    }

    #[test]
    fn undersized_image_is_an_input_error() {
        let err = pipeline().analyze_image(&dark(49, 300)).unwrap_err();
        assert!(err.is_input_error());
    }

    #[test]
    fn wide_color_image_records_enhancement_diagnostic() {
        let wide = RawImage::new(DynamicImage::new_rgb16(100, 100));
        let analysis = pipeline().analyze_image(&wide).expect("valid image");
        assert_eq!(analysis.diagnostics.len(), 1);
        assert_eq!(analysis.diagnostics[0].stage, PipelineStage::Enhancement);
        assert!(!analysis.predictions.is_empty());
    }

    #[test]
    fn prediction_failure_yields_empty_list_and_diagnostic() {
        let config = PipelineConfig::default();
        let model = ModelBackedClassifier::new(Box::new(Failing), vec!["A".into()], TensorLayout::Nhwc, 3);
        let context = Arc::new(ClassifierContext::with_strategy(
            ClassifierStrategy::ModelBacked(model),
            config.confidence_threshold,
        ));
        let pipeline = DiagnosisPipeline::with_context(config, context).expect("valid config");

        let analysis = pipeline.analyze_image(&dark(100, 100)).expect("input is fine");
        assert!(analysis.predictions.is_empty());
        assert_eq!(analysis.classifier, ClassifierKind::ModelBacked);
        assert_eq!(analysis.diagnostics[0].category, ErrorCategory::Prediction);
    }

    #[test]
    fn batch_reports_failed_indices_and_counts() {
        let images = vec![dark(100, 100), dark(10, 10), dark(150, 100)];
        let report = pipeline().analyze_batch(&images).expect("batch within cap");
        assert_eq!((report.uploaded, report.analyzed), (3, 2));
        assert_eq!(report.failed_indices(), vec![1]);
        assert_eq!(report.failed(), 1);

        let summary = report.summary.expect("two images analyzed");
        assert_eq!(summary[0].disease, "Foot and Mouth Disease");
        assert_eq!((summary[0].occurrence_count, summary[0].image_total), (2, 2));
    }

    #[test]
    fn single_image_batch_has_no_summary() {
        let report = pipeline().analyze_batch(&[dark(100, 100)]).expect("batch within cap");
        assert!(report.summary.is_none());
        assert_eq!(report.analyzed, 1);
    }

    #[test]
    fn all_failed_batch_has_no_summary() {
        let report = pipeline().analyze_batch(&[dark(5, 5), dark(6, 6)]).expect("batch within cap");
        assert!(report.summary.is_none());
        assert_eq!(report.failed_indices(), vec![0, 1]);
    }

    #[test]
    fn oversized_batch_is_rejected() {
        let config = PipelineConfig {
            max_batch_size: 2,
            ..PipelineConfig::default()
        };
        let pipeline = DiagnosisPipeline::new(config).expect("valid config");
        let images = vec![dark(60, 60); 3];
        assert_eq!(
            pipeline.analyze_batch(&images),
            Err(PipelineError::BatchTooLarge { size: 3, cap: 2 })
        );
    }

    #[test]
    fn invalid_config_is_rejected_at_construction() {
        let config = PipelineConfig {
            max_predictions: 0,
            ..PipelineConfig::default()
        };
        assert!(matches!(DiagnosisPipeline::new(config), Err(PipelineError::InvalidConfig(_))));
    }

    #[test]
    fn undecodable_upload_is_skipped() {
        let uploads = vec![EncodedImage::new(b"not a png".to_vec(), DeclaredFormat::Png)];
        let report = pipeline().analyze_encoded_batch(&uploads).expect("batch within cap");
        assert_eq!(report.analyzed, 0);
        assert!(matches!(report.outcomes[0].result, Err(PipelineError::Decode(_))));
    }
}
