// THEORY:
// The `MultiImageAggregator` folds the per-image prediction lists of one batch
// into a single ranked summary. It is a pure fold over completed results, so
// it can run only once every image has finished (or failed).
//
// Key architectural principles:
// 1.  **Frequency first**: a disease flagged in more images outranks a single
//     high-confidence outlier. Ranking is by occurrence count, then by average
//     confidence, both descending.
// 2.  **Deterministic ties**: labels are kept in first-seen order and the sort
//     is stable, so equal entries come out in the order they first appeared.
// 3.  **Honest totals**: `image_total` is the number of images that were
//     actually analyzed, never the number uploaded.

use crate::core_modules::classifier::Prediction;
use serde::Serialize;
use std::collections::HashMap;

/// One disease summarized over a batch.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregatedPrediction {
    pub disease: String,
    pub average_confidence: f32,
    /// Number of images naming this disease. Never above `image_total`.
    pub occurrence_count: usize,
    pub image_total: usize,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct MultiImageAggregator;

impl MultiImageAggregator {
    pub fn new() -> Self {
        Self
    }

    /// `batch` holds one prediction list per successfully analyzed image.
    /// A disease named more than once by the same image counts once for that
    /// image, with its highest confidence.
    pub fn aggregate(&self, batch: &[Vec<Prediction>]) -> Vec<AggregatedPrediction> {
        let mut order: Vec<&str> = Vec::new();
        let mut tally: HashMap<&str, (usize, f64)> = HashMap::new();

        for image in batch {
            let mut image_order: Vec<&str> = Vec::new();
            let mut best: HashMap<&str, f32> = HashMap::new();
            for prediction in image {
                let label = prediction.disease.as_str();
                best.entry(label)
                    .and_modify(|c| *c = c.max(prediction.confidence))
                    .or_insert_with(|| {
                        image_order.push(label);
                        prediction.confidence
                    });
            }

            for label in image_order {
                let confidence = best.get(label).copied().unwrap_or_default();
                let entry = tally.entry(label).or_insert_with(|| {
                    order.push(label);
                    (0, 0.0)
                });
                entry.0 += 1;
                entry.1 += confidence as f64;
            }
        }

        let mut summary: Vec<AggregatedPrediction> = order
            .into_iter()
            .filter_map(|label| {
                let (count, sum) = tally.get(label)?;
                Some(AggregatedPrediction {
                    disease: label.to_string(),
                    average_confidence: (sum / *count as f64) as f32,
                    occurrence_count: *count,
                    image_total: batch.len(),
                })
            })
            .collect();

        summary.sort_by(|a, b| {
            b.occurrence_count
                .cmp(&a.occurrence_count)
                .then_with(|| b.average_confidence.total_cmp(&a.average_confidence))
        });

        tracing::debug!(images = batch.len(), diseases = summary.len(), "batch aggregated");
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn image(items: &[(&str, f32)]) -> Vec<Prediction> {
        items.iter().map(|(d, c)| Prediction::new(*d, *c)).collect()
    }

    #[test]
    fn frequency_outranks_confidence() {
        let batch = vec![
            image(&[("Mastitis", 0.6)]),
            image(&[("Mastitis", 0.8), ("Lameness", 0.5)]),
        ];
        let out = MultiImageAggregator::new().aggregate(&batch);

        assert_eq!(out.len(), 2);
        assert_eq!(out[0].disease, "Mastitis");
        assert!((out[0].average_confidence - 0.7).abs() < 1e-6);
        assert_eq!((out[0].occurrence_count, out[0].image_total), (2, 2));
        assert_eq!(
            out[1],
            AggregatedPrediction {
                disease: "Lameness".into(),
                average_confidence: 0.5,
                occurrence_count: 1,
                image_total: 2,
            }
        );
    }

    #[test]
    fn equal_counts_rank_by_average() {
        let batch = vec![
            image(&[("Bloat", 0.4), ("Scours", 0.9)]),
            image(&[("Bloat", 0.4), ("Scours", 0.7)]),
        ];
        let out = MultiImageAggregator::new().aggregate(&batch);
        assert_eq!(out[0].disease, "Scours");
        assert_eq!(out[1].disease, "Bloat");
    }

    #[test]
    fn full_ties_keep_first_seen_order() {
        let batch = vec![image(&[("B", 0.5)]), image(&[("A", 0.5)])];
        let out = MultiImageAggregator::new().aggregate(&batch);
        let labels: Vec<_> = out.iter().map(|a| a.disease.as_str()).collect();
        assert_eq!(labels, ["B", "A"]);
    }

    #[test]
    fn images_without_predictions_still_count() {
        let batch = vec![image(&[("Ketosis", 0.5)]), Vec::new(), Vec::new()];
        let out = MultiImageAggregator::new().aggregate(&batch);
        assert_eq!(out[0].image_total, 3);
        assert!(out.iter().all(|a| a.occurrence_count <= a.image_total));
    }

    #[test]
    fn repeated_label_counts_once_per_image() {
        let batch = vec![
            image(&[("Mastitis", 0.6), ("Mastitis", 0.5), ("Anthrax", 0.1)]),
            image(&[("Mastitis", 0.5), ("Mastitis", 0.6), ("Anthrax", 0.1)]),
        ];
        let out = MultiImageAggregator::new().aggregate(&batch);

        assert_eq!(out[0].disease, "Mastitis");
        assert_eq!((out[0].occurrence_count, out[0].image_total), (2, 2));
        assert!((out[0].average_confidence - 0.6).abs() < 1e-6);
        assert!(out.iter().all(|a| a.occurrence_count <= a.image_total));
    }

    #[test]
    fn empty_batch_yields_empty_summary() {
        assert!(MultiImageAggregator::new().aggregate(&[]).is_empty());
    }
}
