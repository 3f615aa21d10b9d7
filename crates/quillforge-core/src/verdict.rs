//! Assembled documents and the final quality verdict delivered with them.

use crate::section::{count_words, DetectionScores, Section, Severity};
use serde::{Deserialize, Serialize};

/// Separator placed between section contents when assembling a document.
pub const SECTION_SEPARATOR: &str = "\n\n";

/// Highest AI-likelihood score an acceptable document may carry.
pub const MAX_ACCEPTABLE_AI_LIKELIHOOD: f64 = 70.0;

/// Highest plagiarism score an acceptable document may carry.
pub const MAX_ACCEPTABLE_PLAGIARISM: f64 = 20.0;

/// Lowest originality score an acceptable document may carry.
pub const MIN_ACCEPTABLE_ORIGINALITY: f64 = 70.0;

/// AI-likelihood score above which human review is required.
pub const REVIEW_AI_LIKELIHOOD: f64 = 80.0;

/// Plagiarism score above which human review is required.
pub const REVIEW_PLAGIARISM: f64 = 25.0;

/// Originality score below which human review is required.
pub const REVIEW_MIN_ORIGINALITY: f64 = 60.0;

/// A fully assembled document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    /// The sections in document order, with their quality findings.
    pub sections: Vec<Section>,
    /// The joined text of all sections.
    pub content: String,
    /// Whitespace-separated word count of `content`.
    pub word_count: i64,
}

impl Document {
    /// Assemble a document by joining section contents in order.
    #[must_use]
    pub fn assemble(mut sections: Vec<Section>) -> Self {
        sections.sort_by_key(|s| s.index);
        let content = sections
            .iter()
            .map(|s| s.content.as_str())
            .collect::<Vec<_>>()
            .join(SECTION_SEPARATOR);
        let word_count = count_words(&content);
        Self {
            sections,
            content,
            word_count,
        }
    }

    /// Whether any section exhausted refinement while still above thresholds.
    #[must_use]
    pub fn any_section_requires_review(&self) -> bool {
        self.sections.iter().any(|s| s.requires_review)
    }
}

/// The quality verdict attached to a delivered document.
///
/// `is_acceptable` and `requires_review` are derived from the score fields by
/// the constructor and cannot drift out of sync with them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinalVerdict {
    /// Whole-document originality score (0 to 100, higher is better).
    pub originality_score: f64,
    /// Whole-document AI-likelihood score (0 to 100, lower is better).
    pub ai_detection_score: f64,
    /// Whole-document plagiarism score (0 to 100, lower is better).
    pub plagiarism_score: f64,
    /// Composite quality score (0 to 100).
    pub quality_score: f64,
    /// Worst severity observed across the document.
    pub severity: Severity,
    /// Confidence in the verdict (0 to 100).
    pub confidence: f64,
    /// Whether the document needs human review before use.
    pub requires_review: bool,
    /// Whether the document clears the acceptance thresholds.
    pub is_acceptable: bool,
    /// Deterministic, operator-facing guidance derived from the scores.
    pub recommendations: Vec<String>,
}

impl FinalVerdict {
    /// Build a verdict from detector scores plus the composite quality score.
    ///
    /// Acceptance requires AI likelihood at or below
    /// [`MAX_ACCEPTABLE_AI_LIKELIHOOD`], plagiarism at or below
    /// [`MAX_ACCEPTABLE_PLAGIARISM`], and originality at or above
    /// [`MIN_ACCEPTABLE_ORIGINALITY`]. Review is required when any score
    /// crosses its review threshold, or when `sections_need_review` is set
    /// because a section exhausted its refinement budget.
    #[must_use]
    pub fn from_scores(
        scores: DetectionScores,
        quality_score: f64,
        severity: Severity,
        confidence: f64,
        sections_need_review: bool,
        recommendations: Vec<String>,
    ) -> Self {
        let is_acceptable = scores.ai_likelihood <= MAX_ACCEPTABLE_AI_LIKELIHOOD
            && scores.plagiarism <= MAX_ACCEPTABLE_PLAGIARISM
            && scores.originality >= MIN_ACCEPTABLE_ORIGINALITY;
        let requires_review = sections_need_review
            || scores.ai_likelihood > REVIEW_AI_LIKELIHOOD
            || scores.plagiarism > REVIEW_PLAGIARISM
            || scores.originality < REVIEW_MIN_ORIGINALITY;
        Self {
            originality_score: scores.originality,
            ai_detection_score: scores.ai_likelihood,
            plagiarism_score: scores.plagiarism,
            quality_score,
            severity,
            confidence,
            requires_review,
            is_acceptable,
            recommendations,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::section::SectionRole;

    fn section(index: usize, content: &str) -> Section {
        let mut s = Section::planned(index, SectionRole::Body, 100);
        s.content = content.to_string();
        s
    }

    #[test]
    fn assemble_joins_in_index_order() {
        let doc = Document::assemble(vec![
            section(2, "three"),
            section(0, "one"),
            section(1, "two"),
        ]);
        assert_eq!(doc.content, "one\n\ntwo\n\nthree");
        assert_eq!(doc.word_count, 3);
    }

    #[test]
    fn assemble_counts_words_across_separators() {
        let doc = Document::assemble(vec![section(0, "a b c"), section(1, "d e")]);
        assert_eq!(doc.word_count, 5);
    }

    fn clean_scores() -> DetectionScores {
        DetectionScores {
            originality: 90.0,
            ai_likelihood: 20.0,
            plagiarism: 5.0,
            confidence: 85.0,
        }
    }

    #[test]
    fn verdict_accepts_clean_scores() {
        let verdict = FinalVerdict::from_scores(
            clean_scores(),
            88.0,
            Severity::Minimal,
            85.0,
            false,
            vec![],
        );
        assert!(verdict.is_acceptable);
        assert!(!verdict.requires_review);
    }

    #[test]
    fn verdict_rejects_high_ai_likelihood() {
        let mut scores = clean_scores();
        scores.ai_likelihood = 71.0;
        let verdict =
            FinalVerdict::from_scores(scores, 50.0, Severity::Medium, 85.0, false, vec![]);
        assert!(!verdict.is_acceptable);
        // Review kicks in only past the higher review threshold.
        assert!(!verdict.requires_review);

        scores.ai_likelihood = 81.0;
        let verdict = FinalVerdict::from_scores(scores, 40.0, Severity::High, 85.0, false, vec![]);
        assert!(!verdict.is_acceptable);
        assert!(verdict.requires_review);
    }

    #[test]
    fn verdict_boundary_values_are_acceptable() {
        let scores = DetectionScores {
            originality: 70.0,
            ai_likelihood: 70.0,
            plagiarism: 20.0,
            confidence: 80.0,
        };
        let verdict = FinalVerdict::from_scores(scores, 60.0, Severity::Low, 80.0, false, vec![]);
        assert!(verdict.is_acceptable);
    }

    #[test]
    fn section_review_flag_forces_review() {
        let verdict = FinalVerdict::from_scores(
            clean_scores(),
            88.0,
            Severity::Minimal,
            85.0,
            true,
            vec![],
        );
        assert!(verdict.requires_review);
        // Acceptance is score-driven and unaffected by the section flag.
        assert!(verdict.is_acceptable);
    }

    #[test]
    fn verdict_rejects_plagiarism_and_low_originality() {
        let mut scores = clean_scores();
        scores.plagiarism = 26.0;
        let v = FinalVerdict::from_scores(scores, 50.0, Severity::High, 85.0, false, vec![]);
        assert!(!v.is_acceptable);
        assert!(v.requires_review);

        let mut scores = clean_scores();
        scores.originality = 59.0;
        let v = FinalVerdict::from_scores(scores, 50.0, Severity::High, 85.0, false, vec![]);
        assert!(!v.is_acceptable);
        assert!(v.requires_review);
    }
}
