//! Account balance records and subscription plans.

use crate::error::LedgerError;
use crate::ids::UserId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Monthly credit grant for the standard plan.
pub const STANDARD_PLAN_MONTHLY_CREDITS: i64 = 2_000;

/// Monthly credit grant for the pro plan.
pub const PRO_PLAN_MONTHLY_CREDITS: i64 = 6_000;

/// Subscription plan assigned to an account.
///
/// The plan determines the monthly credit grant and whether the account is
/// subject to the free-tier word cap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanType {
    /// Free tier: signup grant only, word usage capped per month.
    Free,
    /// Standard paid plan.
    Standard,
    /// Pro paid plan.
    Pro,
}

impl PlanType {
    /// Whether this plan is the free tier.
    #[must_use]
    pub const fn is_free(&self) -> bool {
        matches!(self, Self::Free)
    }

    /// The credit grant issued at the start of each billing month.
    ///
    /// Free accounts receive no recurring grant; they draw down the signup
    /// grant and are bounded by the monthly word cap instead.
    #[must_use]
    pub const fn monthly_credit_grant(&self) -> i64 {
        match self {
            Self::Free => 0,
            Self::Standard => STANDARD_PLAN_MONTHLY_CREDITS,
            Self::Pro => PRO_PLAN_MONTHLY_CREDITS,
        }
    }
}

impl Default for PlanType {
    fn default() -> Self {
        Self::Free
    }
}

/// A user's credit balance record.
///
/// The `version` field implements optimistic concurrency: every mutation of
/// the record increments it, and a writer that observed a stale version must
/// retry from a fresh read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountBalance {
    /// The user this balance belongs to.
    pub user_id: UserId,
    /// Available credits.
    pub credit_balance: i64,
    /// Subscription plan.
    pub plan: PlanType,
    /// Lifetime credits consumed by committed reservations.
    pub total_credits_used: i64,
    /// Lifetime words delivered by committed reservations.
    pub total_words_used: i64,
    /// Optimistic concurrency version; incremented on every mutation.
    pub version: u64,
    /// When the account was created.
    pub created_at: DateTime<Utc>,
    /// When the record was last modified.
    pub updated_at: DateTime<Utc>,
}

impl AccountBalance {
    /// Create a new account with an initial credit grant.
    #[must_use]
    pub fn new(user_id: UserId, plan: PlanType, initial_credits: i64) -> Self {
        let now = Utc::now();
        Self {
            user_id,
            credit_balance: initial_credits,
            plan,
            total_credits_used: 0,
            total_words_used: 0,
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Whether the account can cover `amount` credits.
    #[must_use]
    pub const fn has_sufficient_credits(&self, amount: i64) -> bool {
        self.credit_balance >= amount
    }

    /// Deduct `amount` credits from the balance.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::InsufficientCredits`] if the balance cannot
    /// cover the amount.
    pub fn debit(&mut self, amount: i64) -> Result<(), LedgerError> {
        if !self.has_sufficient_credits(amount) {
            return Err(LedgerError::InsufficientCredits {
                balance: self.credit_balance,
                required: amount,
            });
        }
        self.credit_balance -= amount;
        self.touch();
        Ok(())
    }

    /// Return `amount` credits to the balance.
    pub fn refund(&mut self, amount: i64) {
        self.credit_balance += amount;
        self.touch();
    }

    /// Record the consumption totals of a committed reservation.
    pub fn record_usage(&mut self, credits: i64, words: i64) {
        self.total_credits_used += credits;
        self.total_words_used += words;
        self.touch();
    }

    fn touch(&mut self) {
        self.version += 1;
        self.updated_at = Utc::now();
    }
}
