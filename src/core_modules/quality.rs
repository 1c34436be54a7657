// THEORY:
// The `QualityAssessor` answers one question for the user: "how much should I
// trust what the classifier says about this photo?" It inspects the raw upload
// on a single luminance plane and measures three things:
//
// 1.  **Sharpness**: variance of a discrete Laplacian. Edges produce large
//     second derivatives; a defocused or shaken photo has almost none.
// 2.  **Exposure**: mean luminance, flagged when too dark or too bright.
// 3.  **Contrast**: luminance standard deviation, flagged when flat.
//
// The report is advisory. The pipeline attaches it to the result but never
// refuses to classify because of it.

use crate::config::QualityThresholds;
use crate::core_modules::pixel::{RunningStats, to_luminance_plane};
use crate::core_modules::raw_image::RawImage;
use image::GrayImage;
use serde::Serialize;
use std::collections::BTreeSet;

/// A single quality problem detected in an image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum QualityIssue {
    Blurry,
    TooDark,
    TooBright,
    LowContrast,
}

/// Overall verdict derived from the number of issues.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OverallQuality {
    Good,
    Fair,
    Poor,
}

impl OverallQuality {
    fn from_issue_count(count: usize) -> Self {
        match count {
            0 => OverallQuality::Good,
            1 | 2 => OverallQuality::Fair,
            _ => OverallQuality::Poor,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QualityReport {
    /// Laplacian variance. Higher is sharper.
    pub blur_score: f64,
    /// Mean luminance, 0..255.
    pub brightness: f64,
    /// Luminance standard deviation, 0..255.
    pub contrast: f64,
    pub issues: BTreeSet<QualityIssue>,
    pub overall: OverallQuality,
}

impl QualityReport {
    pub fn has_issue(&self, issue: QualityIssue) -> bool {
        self.issues.contains(&issue)
    }
}

#[derive(Debug, Clone, Default)]
pub struct QualityAssessor {
    thresholds: QualityThresholds,
}

impl QualityAssessor {
    pub fn new(thresholds: QualityThresholds) -> Self {
        Self { thresholds }
    }

    pub fn assess(&self, image: &RawImage) -> QualityReport {
        let gray = to_luminance_plane(image.as_dynamic());
        let blur_score = laplacian_variance(&gray);

        let mut stats = RunningStats::new();
        for p in gray.pixels() {
            stats.push(p.0[0] as f64);
        }
        let brightness = stats.mean();
        let contrast = stats.std_dev();

        let t = &self.thresholds;
        let mut issues = BTreeSet::new();
        if blur_score < t.blur {
            issues.insert(QualityIssue::Blurry);
        }
        if brightness < t.too_dark {
            issues.insert(QualityIssue::TooDark);
        }
        if brightness > t.too_bright {
            issues.insert(QualityIssue::TooBright);
        }
        if contrast < t.low_contrast {
            issues.insert(QualityIssue::LowContrast);
        }

        let overall = OverallQuality::from_issue_count(issues.len());
        tracing::debug!(blur_score, brightness, contrast, issues = issues.len(), "quality assessed");

        QualityReport {
            blur_score,
            brightness,
            contrast,
            issues,
            overall,
        }
    }
}

/// Reflects an out-of-range index back into `0..len` without repeating the edge.
#[inline]
fn reflect_101(index: i64, len: i64) -> u32 {
    if len == 1 {
        return 0;
    }
    let mut i = index;
    if i < 0 {
        i = -i;
    }
    if i >= len {
        i = 2 * (len - 1) - i;
    }
    i.clamp(0, len - 1) as u32
}

/// Variance of the 4-neighbor Laplacian `[0 1 0; 1 -4 1; 0 1 0]` over every pixel,
/// with reflect-101 borders.
pub fn laplacian_variance(gray: &GrayImage) -> f64 {
    let (w, h) = (gray.width() as i64, gray.height() as i64);
    if w == 0 || h == 0 {
        return 0.0;
    }

    let at = |x: i64, y: i64| gray.get_pixel(reflect_101(x, w), reflect_101(y, h)).0[0] as f64;

    let mut stats = RunningStats::new();
    for y in 0..h {
        for x in 0..w {
            let laplacian = at(x, y - 1) + at(x, y + 1) + at(x - 1, y) + at(x + 1, y) - 4.0 * at(x, y);
            stats.push(laplacian);
        }
    }
    stats.variance()
}
