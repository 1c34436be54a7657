// Example runner: analyzes the image files given on the command line and
// prints the per-image quality, predictions and batch summary.

use anyhow::{Context, Result};
use bovine_vision::config::PipelineConfig;
use bovine_vision::{
    BatchReport, DeclaredFormat, DiagnosisPipeline, EncodedImage, ImageOutcome, ParallelDiagnosisPipeline, PipelineError,
};
use clap::Parser;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// Rank likely cattle diseases from photographs
#[derive(Parser, Debug)]
#[command(name = "bovine_vision", version)]
struct Args {
    /// PNG or JPEG files to analyze
    #[arg(required = true, value_name = "FILE")]
    images: Vec<PathBuf>,

    /// Trained model artifact (overrides COW_DISEASE_MODEL_PATH)
    #[arg(long, value_name = "PATH")]
    model: Option<PathBuf>,

    /// Minimum confidence for a prediction to be reported
    #[arg(long, value_name = "T")]
    threshold: Option<f32>,

    /// Analyze the images on the worker pool
    #[arg(long)]
    parallel: bool,
}

/// Reads one file. Unknown extensions and unreadable files are input errors
/// for that file only.
fn read_upload(path: &Path) -> Result<EncodedImage, PipelineError> {
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or_default();
    let Some(format) = DeclaredFormat::from_extension(ext) else {
        return Err(PipelineError::Decode(format!(
            "{}: unsupported file type (expected .png, .jpg or .jpeg)",
            path.display()
        )));
    };
    let bytes = std::fs::read(path)
        .map_err(|e| PipelineError::Decode(format!("failed to read {}: {e}", path.display())))?;
    Ok(EncodedImage::new(bytes, format))
}

/// The command-line files split into readable uploads and early failures.
#[derive(Debug, Default)]
struct Uploads {
    readable: Vec<EncodedImage>,
    /// Command-line index of each readable upload.
    positions: Vec<usize>,
    failed: Vec<ImageOutcome>,
}

impl Uploads {
    fn read(paths: &[PathBuf]) -> Self {
        let mut uploads = Self::default();
        for (index, path) in paths.iter().enumerate() {
            match read_upload(path) {
                Ok(upload) => {
                    uploads.positions.push(index);
                    uploads.readable.push(upload);
                }
                Err(err) => uploads.failed.push(ImageOutcome {
                    index,
                    result: Err(err),
                }),
            }
        }
        uploads
    }

    /// Maps the readable uploads' report back to command-line indices and
    /// merges in the files that could not be read.
    fn into_report(self, pipeline: &DiagnosisPipeline, analyzed: BatchReport) -> BatchReport {
        let Self { positions, mut failed, .. } = self;
        failed.extend(analyzed.outcomes.into_iter().map(|outcome| ImageOutcome {
            index: positions.get(outcome.index).copied().unwrap_or(outcome.index),
            result: outcome.result,
        }));
        failed.sort_by_key(|outcome| outcome.index);
        pipeline.build_report(failed)
    }
}

fn print_report(paths: &[PathBuf], report: &BatchReport) {
    for outcome in &report.outcomes {
        let name = paths[outcome.index].display();
        match &outcome.result {
            Ok(analysis) => {
                let quality = &analysis.quality;
                println!(
                    "{name}: quality {:?} (blur {:.1}, brightness {:.1}, contrast {:.1}) issues {:?}",
                    quality.overall, quality.blur_score, quality.brightness, quality.contrast, quality.issues
                );
                if analysis.predictions.is_empty() {
                    println!("  no confident predictions");
                }
                for prediction in &analysis.predictions {
                    println!("  {:<28} {:>5.1}%", prediction.disease, prediction.confidence * 100.0);
                }
                for diagnostic in &analysis.diagnostics {
                    println!("  note [{:?}]: {}", diagnostic.stage, diagnostic.message);
                }
            }
            Err(err) => println!("{name}: skipped: {err}"),
        }
    }

    println!("analyzed {} of {} images", report.analyzed, report.uploaded);
    if let Some(summary) = &report.summary {
        println!("summary:");
        for entry in summary {
            println!(
                "  {:<28} seen in {}/{} images, average {:.1}%",
                entry.disease,
                entry.occurrence_count,
                entry.image_total,
                entry.average_confidence * 100.0
            );
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();

    let mut config = PipelineConfig::from_env();
    if let Some(path) = args.model {
        config.model.path = Some(path);
    }
    if let Some(threshold) = args.threshold {
        config.confidence_threshold = threshold;
    }

    let pipeline = Arc::new(DiagnosisPipeline::new(config).context("invalid pipeline configuration")?);
    let info = pipeline.classifier_info();
    tracing::info!(classifier = ?info.kind, classes = info.classes.len(), "pipeline ready");

    pipeline.check_batch_size(args.images.len())?;
    let mut uploads = Uploads::read(&args.images);
    let readable = std::mem::take(&mut uploads.readable);

    let analyzed = if args.parallel {
        ParallelDiagnosisPipeline::new(Arc::clone(&pipeline))
            .analyze_encoded_batch(readable)
            .await?
    } else {
        pipeline.analyze_encoded_batch(&readable)?
    };
    let report = uploads.into_report(&pipeline, analyzed);

    print_report(&args.images, &report);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, ImageFormat, Rgb, RgbImage};

    fn write_png(name: &str) -> PathBuf {
        let path = std::env::temp_dir().join(format!("bovine_vision_{}_{name}", std::process::id()));
        DynamicImage::ImageRgb8(RgbImage::from_pixel(120, 120, Rgb([20, 20, 20])))
            .save_with_format(&path, ImageFormat::Png)
            .expect("png written");
        path
    }

    #[test]
    fn unreadable_files_do_not_abort_the_batch() {
        let good = write_png("good.png");
        let other = write_png("other.png");
        let paths = vec![
            good.clone(),
            PathBuf::from("/nonexistent/missing.png"),
            PathBuf::from("notes.txt"),
            other.clone(),
        ];
        let pipeline = DiagnosisPipeline::new(PipelineConfig::default()).expect("valid config");

        let mut uploads = Uploads::read(&paths);
        let readable = std::mem::take(&mut uploads.readable);
        assert_eq!(readable.len(), 2);
        let analyzed = pipeline.analyze_encoded_batch(&readable).expect("within cap");
        let report = uploads.into_report(&pipeline, analyzed);

        let indices: Vec<_> = report.outcomes.iter().map(|o| o.index).collect();
        assert_eq!(indices, [0, 1, 2, 3]);
        assert_eq!(report.failed_indices(), vec![1, 2]);
        assert_eq!((report.uploaded, report.analyzed), (4, 2));
        assert!(matches!(report.outcomes[1].result, Err(PipelineError::Decode(_))));
        let summary = report.summary.expect("two files analyzed");
        assert_eq!(summary[0].image_total, 2);

        let _ = std::fs::remove_file(good);
        let _ = std::fs::remove_file(other);
    }
}
