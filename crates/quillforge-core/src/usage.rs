//! Monthly usage records for free-tier quota enforcement.

use crate::ids::UserId;
use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Serialize};

/// Format a month key as `YYYY-MM` from year and month components.
#[must_use]
pub fn month_key(year: i32, month: u32) -> String {
    format!("{year:04}-{month:02}")
}

/// The month key for the current UTC month.
#[must_use]
pub fn current_month_key() -> String {
    let now = Utc::now();
    month_key(now.year(), now.month())
}

/// Per-user, per-month usage counters.
///
/// Records are created lazily on first reservation in a month; a user with
/// no activity has no record. Words accrue when a reservation is made and
/// are reverted (floored at zero) only when a reservation is rolled back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonthlyUsage {
    /// The user the counters belong to.
    pub user_id: UserId,
    /// The month the counters cover, formatted `YYYY-MM`.
    pub month: String,
    /// Words reserved or delivered this month.
    pub words_generated: i64,
    /// Credits reserved or spent this month.
    pub credits_used: i64,
    /// Number of reservations made this month.
    pub request_count: i64,
    /// When the record was last modified.
    pub updated_at: DateTime<Utc>,
}

impl MonthlyUsage {
    /// Create an empty usage record for the given user and month.
    #[must_use]
    pub fn new(user_id: UserId, month: String) -> Self {
        Self {
            user_id,
            month,
            words_generated: 0,
            credits_used: 0,
            request_count: 0,
            updated_at: Utc::now(),
        }
    }

    /// Accrue a new reservation's words and credits.
    pub fn record(&mut self, words: i64, credits: i64) {
        self.words_generated += words;
        self.credits_used += credits;
        self.request_count += 1;
        self.updated_at = Utc::now();
    }

    /// Revert a rolled-back reservation, flooring counters at zero.
    ///
    /// Flooring protects against a revert racing ahead of a record, or a
    /// double revert slipping through; the counters never go negative.
    pub fn revert(&mut self, words: i64, credits: i64) {
        self.words_generated = (self.words_generated - words).max(0);
        self.credits_used = (self.credits_used - credits).max(0);
        self.request_count = (self.request_count - 1).max(0);
        self.updated_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn month_key_is_zero_padded() {
        assert_eq!(month_key(2025, 3), "2025-03");
        assert_eq!(month_key(2025, 11), "2025-11");
    }

    #[test]
    fn current_month_key_shape() {
        let key = current_month_key();
        assert_eq!(key.len(), 7);
        assert_eq!(key.as_bytes()[4], b'-');
    }

    #[test]
    fn record_accrues() {
        let mut usage = MonthlyUsage::new(UserId::generate(), "2025-06".to_string());
        usage.record(300, 100);
        usage.record(150, 50);
        assert_eq!(usage.words_generated, 450);
        assert_eq!(usage.credits_used, 150);
        assert_eq!(usage.request_count, 2);
    }

    #[test]
    fn revert_decrements() {
        let mut usage = MonthlyUsage::new(UserId::generate(), "2025-06".to_string());
        usage.record(300, 100);
        usage.revert(300, 100);
        assert_eq!(usage.words_generated, 0);
        assert_eq!(usage.credits_used, 0);
        assert_eq!(usage.request_count, 0);
    }

    #[test]
    fn revert_floors_at_zero() {
        let mut usage = MonthlyUsage::new(UserId::generate(), "2025-06".to_string());
        usage.record(100, 30);
        usage.revert(500, 90);
        assert_eq!(usage.words_generated, 0);
        assert_eq!(usage.credits_used, 0);
        assert_eq!(usage.request_count, 0);
        // A second revert on an empty record stays at zero.
        usage.revert(100, 30);
        assert_eq!(usage.words_generated, 0);
        assert_eq!(usage.request_count, 0);
    }
}
