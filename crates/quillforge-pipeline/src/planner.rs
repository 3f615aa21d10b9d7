//! Splits a target length into weighted sections.

use quillforge_core::SectionRole;
use serde::{Deserialize, Serialize};

use crate::error::PipelineError;

/// Relative share of the total length each structural role receives.
///
/// Weights are treated as plain multipliers; they are not normalized, so a
/// set summing below 1.0 simply plans a shorter document.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SectionWeights {
    /// Share for the introduction.
    pub intro: f64,
    /// Share for the body.
    pub body: f64,
    /// Share for the conclusion.
    pub conclusion: f64,
}

impl Default for SectionWeights {
    fn default() -> Self {
        Self {
            intro: 0.15,
            body: 0.70,
            conclusion: 0.15,
        }
    }
}

/// One planned section: a role and the length assigned to it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SectionPlan {
    /// Structural role.
    pub role: SectionRole,
    /// Words this section should contain.
    pub target_word_count: i64,
}

/// Split `total_word_count` into weighted sections.
///
/// Each target is `floor(total × weight)`, so the targets sum to at most the
/// requested total. Pure and stateless.
///
/// # Errors
///
/// Returns [`PipelineError::InvalidWordCount`] when `total_word_count` is not
/// positive.
#[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation)]
pub fn plan(
    total_word_count: i64,
    weights: &SectionWeights,
) -> Result<Vec<SectionPlan>, PipelineError> {
    if total_word_count <= 0 {
        return Err(PipelineError::InvalidWordCount {
            requested: total_word_count,
        });
    }

    let total = total_word_count as f64;
    let target = |weight: f64| (total * weight).floor() as i64;

    Ok(vec![
        SectionPlan {
            role: SectionRole::Intro,
            target_word_count: target(weights.intro),
        },
        SectionPlan {
            role: SectionRole::Body,
            target_word_count: target(weights.body),
        },
        SectionPlan {
            role: SectionRole::Conclusion,
            target_word_count: target(weights.conclusion),
        },
    ])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_weights_split_a_thousand_words() {
        let plans = plan(1_000, &SectionWeights::default()).unwrap();
        let targets: Vec<i64> = plans.iter().map(|p| p.target_word_count).collect();
        assert_eq!(targets, vec![150, 700, 150]);
        assert_eq!(plans[0].role, SectionRole::Intro);
        assert_eq!(plans[1].role, SectionRole::Body);
        assert_eq!(plans[2].role, SectionRole::Conclusion);
    }

    #[test]
    fn floor_keeps_the_sum_at_or_below_the_total() {
        for total in [1, 7, 333, 999, 1_001, 12_345] {
            let plans = plan(total, &SectionWeights::default()).unwrap();
            let sum: i64 = plans.iter().map(|p| p.target_word_count).sum();
            assert!(sum <= total, "sum {sum} exceeds total {total}");
        }
    }

    #[test]
    fn non_positive_totals_are_rejected() {
        assert!(matches!(
            plan(0, &SectionWeights::default()),
            Err(PipelineError::InvalidWordCount { requested: 0 })
        ));
        assert!(matches!(
            plan(-100, &SectionWeights::default()),
            Err(PipelineError::InvalidWordCount { requested: -100 })
        ));
    }

    #[test]
    fn custom_weights_apply() {
        let weights = SectionWeights {
            intro: 0.25,
            body: 0.50,
            conclusion: 0.25,
        };
        let plans = plan(400, &weights).unwrap();
        let targets: Vec<i64> = plans.iter().map(|p| p.target_word_count).collect();
        assert_eq!(targets, vec![100, 200, 100]);
    }
}
