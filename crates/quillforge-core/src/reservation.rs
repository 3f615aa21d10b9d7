//! Reservation records and the request attributes that price them.

use crate::ids::{TransactionId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The kind of content a generation request produces.
///
/// Each kind has its own words-per-credit rate in the cost table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolKind {
    /// Long-form essay generation.
    Essay,
    /// Article generation.
    Article,
    /// Structured report generation.
    Report,
    /// Rewrite of user-supplied text.
    Rewrite,
}

impl ToolKind {
    /// All tool kinds, for cost-table seeding.
    pub const ALL: [Self; 4] = [Self::Essay, Self::Article, Self::Report, Self::Rewrite];
}

/// Output quality tier a request is priced at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QualityTier {
    /// Default tier, base cost.
    Standard,
    /// Premium tier, costed at a multiplier over base.
    Premium,
}

impl Default for QualityTier {
    fn default() -> Self {
        Self::Standard
    }
}

/// Lifecycle state of a reservation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReservationStatus {
    /// Credits held, outcome pending.
    Reserved,
    /// Reservation settled; the hold became a charge.
    Committed,
    /// Reservation compensated; credits returned.
    RolledBack,
}

/// A credit hold created before generation work begins.
///
/// Reservations are immutable once written apart from the status transitions
/// Reserved→Committed and Reserved→RolledBack, both performed through the
/// ledger. The `transaction_id` is caller-supplied (or generated once before
/// the first attempt) so that a retried reserve can be recognized as a replay
/// of the same logical operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reservation {
    /// Idempotency key for this reservation.
    pub transaction_id: TransactionId,
    /// The user whose credits are held.
    pub user_id: UserId,
    /// Credits held by this reservation.
    pub credits_reserved: i64,
    /// Words the reservation covers.
    pub words_reserved: i64,
    /// The tool the request targets.
    pub tool: ToolKind,
    /// The quality tier the request was priced at.
    pub quality: QualityTier,
    /// Current lifecycle state.
    pub status: ReservationStatus,
    /// The usage month (`YYYY-MM`) this reservation accrued into.
    pub month: String,
    /// Balance before the hold was taken.
    pub previous_balance: i64,
    /// Balance after the hold was taken.
    pub new_balance: i64,
    /// When the reservation was created.
    pub created_at: DateTime<Utc>,
    /// When the status last changed.
    pub updated_at: DateTime<Utc>,
}

impl Reservation {
    /// Create a new reservation in the `Reserved` state.
    #[must_use]
    #[allow(clippy::too_many_arguments)]
    pub fn reserve(
        transaction_id: TransactionId,
        user_id: UserId,
        credits_reserved: i64,
        words_reserved: i64,
        tool: ToolKind,
        quality: QualityTier,
        month: String,
        previous_balance: i64,
    ) -> Self {
        let now = Utc::now();
        Self {
            transaction_id,
            user_id,
            credits_reserved,
            words_reserved,
            tool,
            quality,
            status: ReservationStatus::Reserved,
            month,
            previous_balance,
            new_balance: previous_balance - credits_reserved,
            created_at: now,
            updated_at: now,
        }
    }

    /// Whether the reservation is still holding credits.
    #[must_use]
    pub const fn is_open(&self) -> bool {
        matches!(self.status, ReservationStatus::Reserved)
    }

    /// Transition to `Committed`.
    pub fn mark_committed(&mut self) {
        self.status = ReservationStatus::Committed;
        self.updated_at = Utc::now();
    }

    /// Transition to `RolledBack`.
    pub fn mark_rolled_back(&mut self) {
        self.status = ReservationStatus::RolledBack;
        self.updated_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reserve_records_balances() {
        let res = Reservation::reserve(
            TransactionId::generate(),
            UserId::generate(),
            100,
            300,
            ToolKind::Essay,
            QualityTier::Standard,
            "2025-06".to_string(),
            500,
        );
        assert_eq!(res.previous_balance, 500);
        assert_eq!(res.new_balance, 400);
        assert_eq!(res.status, ReservationStatus::Reserved);
        assert!(res.is_open());
    }

    #[test]
    fn status_transitions() {
        let mut res = Reservation::reserve(
            TransactionId::generate(),
            UserId::generate(),
            10,
            30,
            ToolKind::Rewrite,
            QualityTier::Premium,
            "2025-06".to_string(),
            50,
        );
        res.mark_committed();
        assert_eq!(res.status, ReservationStatus::Committed);
        assert!(!res.is_open());
        res.mark_rolled_back();
        assert_eq!(res.status, ReservationStatus::RolledBack);
    }

    #[test]
    fn tool_kind_serializes_snake_case() {
        let json = serde_json::to_string(&ToolKind::Essay).unwrap();
        assert_eq!(json, "\"essay\"");
        let json = serde_json::to_string(&ReservationStatus::RolledBack).unwrap();
        assert_eq!(json, "\"rolled_back\"");
    }
}
