//! Per-section quality gating.

use std::sync::Arc;

use quillforge_core::{DetectionScores, Severity};
use serde::{Deserialize, Serialize};

use crate::client::{detect_with_retry, Detector, DetectorPolicy};

/// Score bounds that place content at or above one severity level.
///
/// Crossing any single bound is enough to land in the band.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SeverityBand {
    /// AI likelihood strictly above this lands in the band.
    pub ai_likelihood_over: f64,
    /// Plagiarism strictly above this lands in the band.
    pub plagiarism_over: f64,
    /// Originality strictly below this lands in the band.
    pub originality_under: f64,
}

impl SeverityBand {
    fn matches(&self, scores: &DetectionScores) -> bool {
        scores.ai_likelihood > self.ai_likelihood_over
            || scores.plagiarism > self.plagiarism_over
            || scores.originality < self.originality_under
    }
}

/// Severity cutoffs, checked from worst band down.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SeverityThresholds {
    /// Band that calls for full regeneration.
    pub high: SeverityBand,
    /// Band that calls for a targeted rewrite.
    pub medium: SeverityBand,
    /// Band accepted with degraded scores on record.
    pub low: SeverityBand,
}

impl Default for SeverityThresholds {
    fn default() -> Self {
        Self {
            high: SeverityBand {
                ai_likelihood_over: 80.0,
                plagiarism_over: 50.0,
                originality_under: 60.0,
            },
            medium: SeverityBand {
                ai_likelihood_over: 60.0,
                plagiarism_over: 30.0,
                originality_under: 70.0,
            },
            low: SeverityBand {
                ai_likelihood_over: 40.0,
                plagiarism_over: 15.0,
                originality_under: 80.0,
            },
        }
    }
}

impl SeverityThresholds {
    /// Classify detector scores into a severity level.
    #[must_use]
    pub fn classify(&self, scores: &DetectionScores) -> Severity {
        if self.high.matches(scores) {
            Severity::High
        } else if self.medium.matches(scores) {
            Severity::Medium
        } else if self.low.matches(scores) {
            Severity::Low
        } else {
            Severity::Minimal
        }
    }
}

/// What the pipeline should do with a gated section.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RefinementStrategy {
    /// Regenerate the section from scratch under negative constraints.
    Regenerate,
    /// Rewrite the flagged passages, keeping the structure.
    Rewrite,
    /// Keep the section as generated.
    Accept,
}

impl RefinementStrategy {
    /// The strategy a severity level calls for.
    #[must_use]
    pub const fn for_severity(severity: Severity) -> Self {
        match severity {
            Severity::High => Self::Regenerate,
            Severity::Medium => Self::Rewrite,
            Severity::Low | Severity::Minimal => Self::Accept,
        }
    }
}

/// The gate's findings for one piece of content.
#[derive(Debug, Clone, PartialEq)]
pub struct GateReport {
    /// Detector scores, real or fallback.
    pub scores: DetectionScores,
    /// Severity the scores classify into.
    pub severity: Severity,
    /// What the pipeline should do next with the section.
    pub strategy: RefinementStrategy,
    /// Set when the detector was unavailable and fallback scores were used.
    pub degraded: bool,
}

/// Scores generated content and picks a refinement strategy.
pub struct QualityGate {
    detector: Arc<dyn Detector>,
    thresholds: SeverityThresholds,
    policy: DetectorPolicy,
}

impl QualityGate {
    /// Create a gate over the given detector.
    #[must_use]
    pub fn new(
        detector: Arc<dyn Detector>,
        thresholds: SeverityThresholds,
        policy: DetectorPolicy,
    ) -> Self {
        Self {
            detector,
            thresholds,
            policy,
        }
    }

    /// Score `content` and classify it.
    ///
    /// Detector failure is absorbed: once the bounded retries are spent the
    /// gate substitutes [`DetectionScores::conservative_fallback`] and marks
    /// the report degraded rather than failing the section.
    pub async fn evaluate(&self, content: &str) -> GateReport {
        let (scores, degraded) =
            match detect_with_retry(self.detector.as_ref(), content, &self.policy).await {
                Ok(scores) => (scores, false),
                Err(e) => {
                    tracing::warn!(error = %e, "detector unavailable, using fallback scores");
                    (DetectionScores::conservative_fallback(), true)
                }
            };

        let severity = self.thresholds.classify(&scores);
        GateReport {
            scores,
            severity,
            strategy: RefinementStrategy::for_severity(severity),
            degraded,
        }
    }
}

impl std::fmt::Debug for QualityGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QualityGate")
            .field("thresholds", &self.thresholds)
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}
