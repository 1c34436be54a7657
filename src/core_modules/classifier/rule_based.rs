// THEORY:
// PLACEHOLDER INFERENCE, NOT A MEDICAL CLASSIFIER.
//
// When no trained model is available the engine still has to return a ranked
// list, so this module maps a `FeatureVector` to diseases with a few
// independent rules. The rules encode loose visual intuitions (reddened skin,
// very dark footage, harsh contrast) and their thresholds are uncalibrated.
// Their only guarantees are determinism and the output contract: confidences
// in [0,1], sorted descending, ties in rule order, at most `max_predictions`.

use super::{Prediction, rank_predictions};
use crate::config::RuleThresholds;
use crate::core_modules::features::FeatureVector;

/// Every condition the rule-based system can name.
pub const RULE_BASED_CLASSES: [&str; 10] = [
    "Mastitis",
    "Foot and Mouth Disease",
    "Bovine Respiratory Disease",
    "Lameness",
    "Milk Fever",
    "Ketosis",
    "Bloat",
    "Pink Eye",
    "Scours",
    "Hardware Disease",
];

/// Emitted when no rule fires.
const DEFAULT_SUGGESTIONS: [(&str, f32); 3] = [
    ("Mastitis", 0.35),
    ("Bovine Respiratory Disease", 0.30),
    ("Lameness", 0.25),
];

#[derive(Debug, Clone)]
pub struct RuleBasedClassifier {
    thresholds: RuleThresholds,
    max_predictions: usize,
}

impl Default for RuleBasedClassifier {
    fn default() -> Self {
        Self::new(RuleThresholds::default(), 3)
    }
}

impl RuleBasedClassifier {
    pub fn new(thresholds: RuleThresholds, max_predictions: usize) -> Self {
        Self {
            thresholds,
            max_predictions,
        }
    }

    pub fn classes(&self) -> Vec<String> {
        RULE_BASED_CLASSES.iter().map(|c| c.to_string()).collect()
    }

    pub fn predict(&self, features: &FeatureVector) -> Vec<Prediction> {
        let t = &self.thresholds;
        let mut predictions = Vec::new();

        // Reddened, well-lit skin: inflammation.
        if features.red_mean() > t.red_intensity && features.brightness > t.inflammation_brightness {
            predictions.push(Prediction::new("Mastitis", 0.65));
            predictions.push(Prediction::new("Pink Eye", 0.45));
        }

        if features.brightness < t.dark_brightness {
            predictions.push(Prediction::new("Foot and Mouth Disease", 0.55));
        }

        if features.contrast > t.high_contrast {
            predictions.push(Prediction::new("Lameness", 0.50));
            predictions.push(Prediction::new("Bovine Respiratory Disease", 0.40));
        }

        if predictions.is_empty() {
            predictions = DEFAULT_SUGGESTIONS
                .iter()
                .map(|(disease, confidence)| Prediction::new(*disease, *confidence))
                .collect();
        }

        rank_predictions(predictions, self.max_predictions)
    }
}
