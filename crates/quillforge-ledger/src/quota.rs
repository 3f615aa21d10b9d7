//! Monthly quota tracking for free-tier accounts.

use std::sync::Arc;

use quillforge_core::{LedgerError, MonthlyUsage, PlanType, Result, UserId};
use quillforge_store::AccountStore;

/// Check a reservation against the free-tier monthly word cap.
///
/// Paid plans pass unconditionally. The check is pure; the ledger calls it
/// inside its store transaction so the read it depends on cannot go stale.
///
/// # Errors
///
/// Returns [`LedgerError::MonthlyLimitExceeded`] if a free-plan reservation
/// would push the month's words past the cap.
pub fn check_word_cap(
    plan: PlanType,
    words_used: i64,
    requested_words: i64,
    cap: i64,
) -> Result<()> {
    if !plan.is_free() {
        return Ok(());
    }
    if words_used + requested_words > cap {
        return Err(LedgerError::MonthlyLimitExceeded {
            used: words_used,
            cap,
            requested: requested_words,
        });
    }
    Ok(())
}

/// Read-side view of per-user monthly consumption.
///
/// Mutations happen inside ledger transactions; this type serves callers that
/// only need to inspect usage, such as request validation.
#[derive(Clone)]
pub struct QuotaTracker {
    store: Arc<dyn AccountStore>,
}

impl QuotaTracker {
    /// Create a tracker over the given store.
    #[must_use]
    pub fn new(store: Arc<dyn AccountStore>) -> Self {
        Self { store }
    }

    /// The user's usage counters for a month, zeroed if the month has no
    /// activity yet.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub async fn usage_for(&self, user_id: &UserId, month: &str) -> Result<MonthlyUsage> {
        Ok(self
            .store
            .get_monthly_usage(user_id, month)
            .await?
            .unwrap_or_else(|| MonthlyUsage::new(*user_id, month.to_string())))
    }

    /// Words still available to a free-plan user this month, or `None` when
    /// the plan is not capped.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub async fn remaining_words(
        &self,
        user_id: &UserId,
        plan: PlanType,
        month: &str,
        cap: i64,
    ) -> Result<Option<i64>> {
        if !plan.is_free() {
            return Ok(None);
        }
        let usage = self.usage_for(user_id, month).await?;
        Ok(Some((cap - usage.words_generated).max(0)))
    }
}

impl std::fmt::Debug for QuotaTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QuotaTracker").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quillforge_core::AccountBalance;
    use quillforge_store::MemoryStore;

    #[test]
    fn paid_plans_skip_the_cap() {
        assert!(check_word_cap(PlanType::Standard, 10_000, 5_000, 1_000).is_ok());
        assert!(check_word_cap(PlanType::Pro, 10_000, 5_000, 1_000).is_ok());
    }

    #[test]
    fn free_plan_enforces_the_cap() {
        assert!(check_word_cap(PlanType::Free, 700, 300, 1_000).is_ok());
        let err = check_word_cap(PlanType::Free, 800, 300, 1_000).unwrap_err();
        assert!(matches!(
            err,
            LedgerError::MonthlyLimitExceeded {
                used: 800,
                cap: 1_000,
                requested: 300
            }
        ));
    }

    #[tokio::test]
    async fn usage_for_is_zeroed_when_absent() {
        let store = Arc::new(MemoryStore::new());
        let tracker = QuotaTracker::new(store);
        let usage = tracker
            .usage_for(&UserId::generate(), "2025-06")
            .await
            .unwrap();
        assert_eq!(usage.words_generated, 0);
        assert_eq!(usage.request_count, 0);
    }

    #[tokio::test]
    async fn remaining_words_reflects_recorded_usage() {
        let store = Arc::new(MemoryStore::new());
        let user_id = UserId::generate();
        store
            .put_balance(&AccountBalance::new(user_id, PlanType::Free, 50))
            .await
            .unwrap();
        store
            .run_transaction(&user_id, "2025-06", None, &|records| {
                records.usage.record(800, 20);
                Ok(())
            })
            .await
            .unwrap();

        let tracker = QuotaTracker::new(store);
        let remaining = tracker
            .remaining_words(&user_id, PlanType::Free, "2025-06", 1_000)
            .await
            .unwrap();
        assert_eq!(remaining, Some(200));

        let unlimited = tracker
            .remaining_words(&user_id, PlanType::Pro, "2025-06", 1_000)
            .await
            .unwrap();
        assert_eq!(unlimited, None);
    }

    #[tokio::test]
    async fn remaining_words_floors_at_zero() {
        let store = Arc::new(MemoryStore::new());
        let user_id = UserId::generate();
        store
            .put_balance(&AccountBalance::new(user_id, PlanType::Free, 50))
            .await
            .unwrap();
        store
            .run_transaction(&user_id, "2025-06", None, &|records| {
                records.usage.record(1_400, 40);
                Ok(())
            })
            .await
            .unwrap();

        let tracker = QuotaTracker::new(store);
        let remaining = tracker
            .remaining_words(&user_id, PlanType::Free, "2025-06", 1_000)
            .await
            .unwrap();
        assert_eq!(remaining, Some(0));
    }
}
