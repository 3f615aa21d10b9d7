//! Credit pricing for generation work.
//!
//! All pricing flows through one [`CostTable`] so that the conversion between
//! words and credits lives in exactly one place. The conversion always rounds
//! up and never quotes below one credit.

use crate::reservation::{QualityTier, ToolKind};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Words covered by one credit when a tool has no explicit entry.
pub const DEFAULT_WORDS_PER_CREDIT: i64 = 3;

/// Cost multiplier applied to premium-tier requests.
pub const DEFAULT_PREMIUM_COST_MULTIPLIER: i64 = 2;

/// Monthly word cap applied to free-plan accounts.
pub const DEFAULT_FREE_MONTHLY_WORD_CAP: i64 = 1_000;

/// Credits granted to a new account at signup.
pub const DEFAULT_SIGNUP_GRANT_CREDITS: i64 = 50;

/// The pricing table for generation requests.
///
/// Maps each [`ToolKind`] to a words-per-credit rate and holds the tier
/// multiplier and free-plan caps alongside, so operators can adjust pricing
/// from configuration without touching call sites.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CostTable {
    /// Words covered by one credit, per tool.
    pub words_per_credit: HashMap<ToolKind, i64>,
    /// Fallback rate for tools missing from the map.
    pub default_words_per_credit: i64,
    /// Multiplier applied to premium-tier quotes.
    pub premium_cost_multiplier: i64,
    /// Monthly word cap for free-plan accounts.
    pub free_monthly_word_cap: i64,
    /// Credits granted at signup.
    pub signup_grant_credits: i64,
}

impl Default for CostTable {
    fn default() -> Self {
        let mut words_per_credit = HashMap::new();
        words_per_credit.insert(ToolKind::Essay, 3);
        words_per_credit.insert(ToolKind::Article, 3);
        words_per_credit.insert(ToolKind::Report, 2);
        words_per_credit.insert(ToolKind::Rewrite, 4);
        Self {
            words_per_credit,
            default_words_per_credit: DEFAULT_WORDS_PER_CREDIT,
            premium_cost_multiplier: DEFAULT_PREMIUM_COST_MULTIPLIER,
            free_monthly_word_cap: DEFAULT_FREE_MONTHLY_WORD_CAP,
            signup_grant_credits: DEFAULT_SIGNUP_GRANT_CREDITS,
        }
    }
}

impl CostTable {
    /// The words-per-credit rate for a tool.
    #[must_use]
    pub fn rate_for(&self, tool: ToolKind) -> i64 {
        self.words_per_credit
            .get(&tool)
            .copied()
            .unwrap_or(self.default_words_per_credit)
            .max(1)
    }

    /// Quote the credit cost of generating `word_count` words.
    ///
    /// Rounds up to whole credits and never quotes below one credit, so a
    /// one-word request still costs something. Premium-tier quotes apply the
    /// configured multiplier after rounding.
    #[must_use]
    pub fn quote(&self, word_count: i64, tool: ToolKind, quality: QualityTier) -> i64 {
        let rate = self.rate_for(tool);
        let words = word_count.max(1);
        let base = (words + rate - 1) / rate;
        match quality {
            QualityTier::Standard => base,
            QualityTier::Premium => base * self.premium_cost_multiplier,
        }
    }
}
