//! Error taxonomy for ledger and store operations.

use crate::ids::{IdError, TransactionId, UserId};
use thiserror::Error;

/// Convenience alias for ledger results.
pub type Result<T> = std::result::Result<T, LedgerError>;

/// Errors produced by ledger operations and the stores beneath them.
///
/// Business-rule failures (insufficient credits, quota exceeded, concurrency
/// limits) are terminal for the request that hit them; only infrastructure
/// failures are retried, as reported by [`LedgerError::is_retryable`].
#[derive(Debug, Clone, Error)]
pub enum LedgerError {
    /// The account balance cannot cover the requested reservation.
    #[error("insufficient credits: balance {balance}, required {required}")]
    InsufficientCredits {
        /// Credits currently available.
        balance: i64,
        /// Credits the reservation needs.
        required: i64,
    },

    /// A free-plan account would exceed its monthly word cap.
    #[error("monthly word limit exceeded: used {used} of {cap}, requested {requested}")]
    MonthlyLimitExceeded {
        /// Words already used this month.
        used: i64,
        /// The monthly cap.
        cap: i64,
        /// Words the reservation would add.
        requested: i64,
    },

    /// The user already has the maximum number of reservations in flight.
    #[error("too many concurrent requests: {in_flight} in flight, limit {max}")]
    TooManyConcurrentRequests {
        /// Reservations currently in flight for the user.
        in_flight: usize,
        /// The configured limit.
        max: usize,
    },

    /// The operation could not complete within the overall deadline.
    #[error("ledger operation timed out after {attempts} attempts ({elapsed_ms}ms)")]
    LedgerTimeout {
        /// Attempts made before giving up.
        attempts: u32,
        /// Wall time spent, in milliseconds.
        elapsed_ms: u64,
    },

    /// No reservation exists under the given transaction id.
    #[error("transaction not found: {transaction_id}")]
    TransactionNotFound {
        /// The id that was looked up.
        transaction_id: TransactionId,
    },

    /// The reservation was already rolled back and cannot change again.
    #[error("transaction already rolled back: {transaction_id}")]
    AlreadyRolledBack {
        /// The reservation's transaction id.
        transaction_id: TransactionId,
    },

    /// No account exists for the given user.
    #[error("user not found: {user_id}")]
    UserNotFound {
        /// The user that was looked up.
        user_id: UserId,
    },

    /// Another writer committed first; the transaction should be retried
    /// from a fresh read.
    #[error("version conflict, concurrent modification detected")]
    Conflict,

    /// The storage backend failed.
    #[error("storage error: {0}")]
    Storage(String),

    /// The request was malformed before any store access.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// An identifier failed to parse.
    #[error("invalid identifier: {0}")]
    InvalidId(#[from] IdError),
}

impl LedgerError {
    /// Whether retrying the operation could succeed.
    ///
    /// Version conflicts and storage failures are transient; every
    /// business-rule failure is terminal and must not be retried.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Conflict | Self::Storage(_))
    }
}
