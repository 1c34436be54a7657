// THEORY:
// The `ConfidenceFilter` is the last per-image stage. It only removes: every
// prediction below the threshold is dropped and the survivors keep their
// relative order. The threshold is inclusive, so a prediction exactly at the
// threshold survives.

use crate::core_modules::classifier::Prediction;

pub const DEFAULT_CONFIDENCE_THRESHOLD: f32 = 0.3;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConfidenceFilter {
    threshold: f32,
}

impl Default for ConfidenceFilter {
    fn default() -> Self {
        Self::new(DEFAULT_CONFIDENCE_THRESHOLD)
    }
}

impl ConfidenceFilter {
    pub fn new(threshold: f32) -> Self {
        Self { threshold }
    }

    /// Applies the configured threshold.
    pub fn apply(&self, predictions: Vec<Prediction>) -> Vec<Prediction> {
        Self::filter(predictions, self.threshold)
    }

    /// Keeps predictions with `confidence >= threshold`, in their original order.
    pub fn filter(mut predictions: Vec<Prediction>, threshold: f32) -> Vec<Prediction> {
        predictions.retain(|p| p.confidence >= threshold);
        predictions
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn preds(items: &[(&str, f32)]) -> Vec<Prediction> {
        items.iter().map(|(d, c)| Prediction::new(*d, *c)).collect()
    }

    #[test]
    fn threshold_is_inclusive() {
        let out = ConfidenceFilter::filter(preds(&[("A", 0.65), ("B", 0.25), ("C", 0.3)]), 0.3);
        assert_eq!(out, preds(&[("A", 0.65), ("C", 0.3)]));
    }

    #[test]
    fn survivors_keep_their_order() {
        // Input deliberately not sorted: the filter must not sort it.
        let input = preds(&[("low", 0.31), ("high", 0.9), ("drop", 0.1), ("mid", 0.5)]);
        let out = ConfidenceFilter::default().apply(input);
        let labels: Vec<_> = out.iter().map(|p| p.disease.as_str()).collect();
        assert_eq!(labels, ["low", "high", "mid"]);
    }

    #[test]
    fn zero_threshold_keeps_everything() {
        let input = preds(&[("A", 0.0), ("B", 0.01)]);
        assert_eq!(ConfidenceFilter::new(0.0).apply(input.clone()), input);
    }

    #[test]
    fn empty_input_stays_empty() {
        assert!(ConfidenceFilter::default().apply(Vec::new()).is_empty());
    }
}
