//! Merges per-section findings with a whole-document detection pass.

use std::sync::Arc;

use quillforge_core::verdict::{
    MAX_ACCEPTABLE_AI_LIKELIHOOD, MAX_ACCEPTABLE_PLAGIARISM, MIN_ACCEPTABLE_ORIGINALITY,
};
use quillforge_core::{DetectionScores, Document, FinalVerdict};

use crate::client::{detect_with_retry, Detector, DetectorPolicy};
use crate::gate::SeverityThresholds;

/// Largest AI-likelihood gap at which the whole-document pass and the
/// section average are considered to agree.
const AGREEMENT_TOLERANCE: f64 = 20.0;

/// Confidence added when the two passes agree.
const AGREEMENT_BONUS: f64 = 10.0;

/// Confidence removed when the two passes disagree.
const DISAGREEMENT_PENALTY: f64 = 15.0;

/// Confidence removed when the whole-document pass was unavailable and the
/// section average stands in.
const FALLBACK_PENALTY: f64 = 25.0;

/// Produces the final verdict for an assembled document.
///
/// The whole-document pass always runs: combined text can exhibit seams or
/// aggregate properties no single section shows. Its scores are primary; the
/// per-section average is the fallback when the detector is unavailable, and
/// the two together set the confidence.
pub struct Reconciler {
    detector: Arc<dyn Detector>,
    thresholds: SeverityThresholds,
    policy: DetectorPolicy,
}

impl Reconciler {
    /// Create a reconciler over the given detector.
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

    /// Reconcile section findings into one confidence-rated verdict.
    ///
    /// Never fails: detector unavailability degrades the confidence and
    /// shows up in the recommendations, not as an error.
    pub async fn reconcile(&self, document: &Document, requested_words: i64) -> FinalVerdict {
        let section_avg = section_average(document);
        let mut recommendations = Vec::new();

        let (scores, confidence) =
            match detect_with_retry(self.detector.as_ref(), &document.content, &self.policy).await
            {
                Ok(whole) => {
                    let gap = (whole.ai_likelihood - section_avg.ai_likelihood).abs();
                    let confidence = if gap <= AGREEMENT_TOLERANCE {
                        (whole.confidence + AGREEMENT_BONUS).min(100.0)
                    } else {
                        (whole.confidence - DISAGREEMENT_PENALTY).max(0.0)
                    };
                    (whole, confidence)
                }
                Err(e) => {
                    tracing::warn!(
                        error = %e,
                        "whole-document detection unavailable, using section average"
                    );
                    recommendations.push(
                        "Whole-document detection was unavailable; the verdict is based on \
                         per-section scores only."
                            .to_string(),
                    );
                    (
                        section_avg,
                        (section_avg.confidence - FALLBACK_PENALTY).max(0.0),
                    )
                }
            };

        let adequacy = length_adequacy(document.word_count, requested_words);
        let quality_score = 0.4 * scores.originality
            + 0.3 * (100.0 - scores.ai_likelihood)
            + 0.2 * (100.0 - scores.plagiarism)
            + 0.1 * adequacy;

        let severity = self.thresholds.classify(&scores);
        let sections_need_review = document.any_section_requires_review();
        push_threshold_recommendations(
            &mut recommendations,
            &scores,
            sections_need_review,
            document,
        );

        let verdict = FinalVerdict::from_scores(
            scores,
            quality_score,
            severity,
            confidence,
            sections_need_review,
            recommendations,
        );
        tracing::info!(
            quality = verdict.quality_score,
            acceptable = verdict.is_acceptable,
            needs_review = verdict.requires_review,
            confidence = verdict.confidence,
            "document reconciled"
        );
        verdict
    }
}

impl std::fmt::Debug for Reconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reconciler")
            .field("thresholds", &self.thresholds)
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

/// Average the per-section scores, weighting each section equally.
#[allow(clippy::cast_precision_loss)]
fn section_average(document: &Document) -> DetectionScores {
    let scored: Vec<&DetectionScores> = document
        .sections
        .iter()
        .filter_map(|s| s.scores.as_ref())
        .collect();
    if scored.is_empty() {
        return DetectionScores::conservative_fallback();
    }

    let n = scored.len() as f64;
    DetectionScores {
        originality: scored.iter().map(|s| s.originality).sum::<f64>() / n,
        ai_likelihood: scored.iter().map(|s| s.ai_likelihood).sum::<f64>() / n,
        plagiarism: scored.iter().map(|s| s.plagiarism).sum::<f64>() / n,
        confidence: scored.iter().map(|s| s.confidence).sum::<f64>() / n,
    }
}

/// How close the delivered length came to the requested one, as a 0 to 100
/// bonus. Overshooting is not penalized.
#[allow(clippy::cast_precision_loss)]
fn length_adequacy(actual_words: i64, requested_words: i64) -> f64 {
    if requested_words <= 0 {
        return 100.0;
    }
    (actual_words as f64 / requested_words as f64).min(1.0) * 100.0
}

fn push_threshold_recommendations(
    recommendations: &mut Vec<String>,
    scores: &DetectionScores,
    sections_need_review: bool,
    document: &Document,
) {
    if scores.ai_likelihood > MAX_ACCEPTABLE_AI_LIKELIHOOD {
        recommendations.push(format!(
            "AI likelihood {:.0} is above the acceptance threshold of \
             {MAX_ACCEPTABLE_AI_LIKELIHOOD:.0}; rework the most formulaic passages.",
            scores.ai_likelihood
        ));
    }
    if scores.plagiarism > MAX_ACCEPTABLE_PLAGIARISM {
        recommendations.push(format!(
            "Plagiarism score {:.0} is above the acceptance threshold of \
             {MAX_ACCEPTABLE_PLAGIARISM:.0}; quote or paraphrase the overlapping passages.",
            scores.plagiarism
        ));
    }
    if scores.originality < MIN_ACCEPTABLE_ORIGINALITY {
        recommendations.push(format!(
            "Originality {:.0} is below the acceptance threshold of \
             {MIN_ACCEPTABLE_ORIGINALITY:.0}; add original analysis or examples.",
            scores.originality
        ));
    }
    if sections_need_review {
        let count = document
            .sections
            .iter()
            .filter(|s| s.requires_review)
            .count();
        recommendations.push(format!(
            "{count} section(s) stayed at high severity after refinement; manual review \
             recommended."
        ));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::DetectorError;
    use async_trait::async_trait;
    use quillforge_core::{Section, SectionRole, Severity};
    use std::time::Duration;

    struct FixedDetector(DetectionScores);

    #[async_trait]
    impl Detector for FixedDetector {
        async fn detect(&self, _text: &str) -> Result<DetectionScores, DetectorError> {
            Ok(self.0)
        }
    }

    struct DownDetector;

    #[async_trait]
    impl Detector for DownDetector {
        async fn detect(&self, _text: &str) -> Result<DetectionScores, DetectorError> {
            Err(DetectorError::Api {
                status: 503,
                message: "unavailable".to_string(),
            })
        }
    }

    fn fast_policy() -> DetectorPolicy {
        DetectorPolicy {
            call_timeout: Duration::from_secs(1),
            max_attempts: 2,
            base_backoff: Duration::from_millis(1),
        }
    }

    fn scored_section(index: usize, words: usize, scores: DetectionScores) -> Section {
        let mut section = Section::planned(index, SectionRole::Body, 100);
        section.content = vec!["word"; words].join(" ");
        section.scores = Some(scores);
        section.severity = Some(Severity::Minimal);
        section
    }

    fn good_scores() -> DetectionScores {
        DetectionScores {
            originality: 95.0,
            ai_likelihood: 10.0,
            plagiarism: 2.0,
            confidence: 85.0,
        }
    }

    fn good_document(total_words: usize) -> Document {
        let per_section = total_words / 2;
        Document::assemble(vec![
            scored_section(0, per_section, good_scores()),
            scored_section(1, total_words - per_section, good_scores()),
        ])
    }

    fn reconciler(detector: Arc<dyn Detector>) -> Reconciler {
        Reconciler::new(detector, SeverityThresholds::default(), fast_policy())
    }

    #[tokio::test]
    async fn clean_document_scores_high() {
        let r = reconciler(Arc::new(FixedDetector(good_scores())));
        let verdict = r.reconcile(&good_document(1_000), 1_000).await;

        assert!(verdict.is_acceptable);
        assert!(!verdict.requires_review);
        // 0.4*95 + 0.3*90 + 0.2*98 + 0.1*100 = 94.6
        assert!(verdict.quality_score >= 90.0);
        assert!(verdict.recommendations.is_empty());
    }

    #[tokio::test]
    async fn agreement_raises_confidence() {
        // Whole-document AI likelihood within 20 points of the section
        // average.
        let r = reconciler(Arc::new(FixedDetector(good_scores())));
        let verdict = r.reconcile(&good_document(100), 100).await;
        assert_eq!(verdict.confidence, 95.0);
    }

    #[tokio::test]
    async fn disagreement_lowers_confidence() {
        let whole = DetectionScores {
            originality: 80.0,
            ai_likelihood: 60.0,
            plagiarism: 5.0,
            confidence: 85.0,
        };
        // Sections averaged ai 10, whole pass says 60: a 50-point gap.
        let r = reconciler(Arc::new(FixedDetector(whole)));
        let verdict = r.reconcile(&good_document(100), 100).await;
        assert_eq!(verdict.confidence, 70.0);
    }

    #[tokio::test]
    async fn detector_outage_falls_back_to_section_average() {
        let r = reconciler(Arc::new(DownDetector));
        let verdict = r.reconcile(&good_document(1_000), 1_000).await;

        // Section averages carry the verdict.
        assert_eq!(verdict.originality_score, 95.0);
        assert_eq!(verdict.ai_detection_score, 10.0);
        // Average confidence 85 minus the fallback penalty.
        assert_eq!(verdict.confidence, 60.0);
        assert!(verdict.is_acceptable);
        assert!(verdict
            .recommendations
            .iter()
            .any(|r| r.contains("unavailable")));
    }

    #[tokio::test]
    async fn short_documents_lose_the_length_bonus() {
        let r = reconciler(Arc::new(FixedDetector(good_scores())));
        let full = r.reconcile(&good_document(1_000), 1_000).await;
        let half = r.reconcile(&good_document(500), 1_000).await;

        // Only the 10% length-adequacy term differs: 100 vs 50.
        let diff = full.quality_score - half.quality_score;
        assert!((diff - 5.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn crossed_thresholds_produce_recommendations() {
        let poor = DetectionScores {
            originality: 50.0,
            ai_likelihood: 85.0,
            plagiarism: 30.0,
            confidence: 90.0,
        };
        let r = reconciler(Arc::new(FixedDetector(poor)));
        let verdict = r.reconcile(&good_document(100), 100).await;

        assert!(!verdict.is_acceptable);
        assert!(verdict.requires_review);
        assert_eq!(verdict.severity, Severity::High);
        assert_eq!(verdict.recommendations.len(), 3);
    }

    #[tokio::test]
    async fn review_sections_are_counted() {
        let mut document = good_document(100);
        document.sections[1].requires_review = true;
        let r = reconciler(Arc::new(FixedDetector(good_scores())));
        let verdict = r.reconcile(&document, 100).await;

        assert!(verdict.requires_review);
        assert!(verdict
            .recommendations
            .iter()
            .any(|r| r.contains("1 section(s)")));
    }

    #[test]
    fn adequacy_is_capped_at_full() {
        assert_eq!(length_adequacy(2_000, 1_000), 100.0);
        assert_eq!(length_adequacy(500, 1_000), 50.0);
        assert_eq!(length_adequacy(0, 1_000), 0.0);
        assert_eq!(length_adequacy(100, 0), 100.0);
    }

    #[test]
    fn empty_documents_average_to_the_fallback() {
        let document = Document::assemble(vec![]);
        assert_eq!(
            section_average(&document),
            DetectionScores::conservative_fallback()
        );
    }
}
