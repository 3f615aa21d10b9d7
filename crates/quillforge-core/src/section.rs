//! Document sections and per-section quality findings.

use serde::{Deserialize, Serialize};

/// The structural role a section plays in the document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SectionRole {
    /// Opening section.
    Intro,
    /// Main body.
    Body,
    /// Closing section.
    Conclusion,
}

impl SectionRole {
    /// Human-readable label used in prompts and logs.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Intro => "introduction",
            Self::Body => "body",
            Self::Conclusion => "conclusion",
        }
    }
}

/// Scores reported by the content detector, each on a 0 to 100 scale.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DetectionScores {
    /// How original the text reads; higher is better.
    pub originality: f64,
    /// Likelihood the text is machine-generated; lower is better.
    pub ai_likelihood: f64,
    /// Overlap with known sources; lower is better.
    pub plagiarism: f64,
    /// The detector's confidence in its own scores.
    pub confidence: f64,
}

impl DetectionScores {
    /// Scores substituted when the detector is unavailable.
    ///
    /// The fallback is deliberately permissive on content quality but carries
    /// a reduced confidence, so downstream consumers can tell a degraded
    /// verdict from a clean one. An unavailable detector must never block
    /// delivery.
    #[must_use]
    pub const fn conservative_fallback() -> Self {
        Self {
            originality: 100.0,
            ai_likelihood: 15.0,
            plagiarism: 0.0,
            confidence: 50.0,
        }
    }
}

/// How badly a section's scores miss the quality bar.
///
/// Ordered from least to most severe so that severities can be compared and
/// the worst across sections selected with `max`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// Scores are comfortably within bounds.
    Minimal,
    /// Scores drift but need no action.
    Low,
    /// Scores warrant a targeted rewrite.
    Medium,
    /// Scores warrant full regeneration.
    High,
}

/// One planned and generated section of a document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Section {
    /// Position within the document, starting at zero.
    pub index: usize,
    /// Structural role.
    pub role: SectionRole,
    /// Word count the planner assigned.
    pub target_word_count: i64,
    /// Generated text, empty until generation completes.
    pub content: String,
    /// Latest detector scores, if the section has been gated.
    pub scores: Option<DetectionScores>,
    /// Severity derived from the latest scores.
    pub severity: Option<Severity>,
    /// Refinement cycles spent on this section.
    pub refinement_cycles: u32,
    /// Set when refinement was exhausted while still above thresholds.
    pub requires_review: bool,
}

impl Section {
    /// Create an empty section from its plan entry.
    #[must_use]
    pub fn planned(index: usize, role: SectionRole, target_word_count: i64) -> Self {
        Self {
            index,
            role,
            target_word_count,
            content: String::new(),
            scores: None,
            severity: None,
            refinement_cycles: 0,
            requires_review: false,
        }
    }

    /// Count whitespace-separated words in the section content.
    #[must_use]
    pub fn word_count(&self) -> i64 {
        count_words(&self.content)
    }
}

/// Count whitespace-separated words in a string.
#[must_use]
#[allow(clippy::cast_possible_wrap)]
pub fn count_words(text: &str) -> i64 {
    text.split_whitespace().count() as i64
}
