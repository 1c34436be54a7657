// THEORY:
// This file is the main entry point for the `bovine_vision` library crate.
// It exports `DiagnosisPipeline` (and its parallel counterpart) together with
// the data structures a caller needs: `PipelineConfig`, `RawImage`,
// `ImageAnalysis`, `BatchReport` and friends.
//
// The stages themselves live in `core_modules`, one file per stage. They are
// public so each can be used and tested on its own, but a typical consumer
// only ever talks to the pipeline.

pub mod config;
pub mod core_modules;
pub mod error;
pub mod parallel_pipeline;
pub mod pipeline;

pub use config::PipelineConfig;
pub use core_modules::aggregator::AggregatedPrediction;
pub use core_modules::classifier::{
    ClassifierContext, ClassifierInfo, ClassifierKind, ClassifierStrategy, InferenceBackend, Prediction,
};
pub use core_modules::quality::{OverallQuality, QualityIssue, QualityReport};
pub use core_modules::raw_image::{ColorMode, DeclaredFormat, RawImage};
pub use error::{ErrorCategory, PipelineError};
pub use parallel_pipeline::ParallelDiagnosisPipeline;
pub use pipeline::{
    BatchReport, DiagnosisPipeline, Diagnostic, EncodedImage, ImageAnalysis, ImageOutcome, PipelineStage,
};
