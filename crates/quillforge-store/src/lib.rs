//! Account storage layer for the quillforge generation engine.
//!
//! This crate stores account balances, credit reservations, and monthly usage
//! counters, and exposes the serializable transaction primitive the credit
//! ledger is built on.
//!
//! # Backends
//!
//! - [`MemoryStore`]: always available, used by tests and single-process
//!   deployments. A mutex serializes transactions.
//! - `RocksStore` (behind the `rocksdb-backend` feature): persistent storage
//!   using `RocksDB` column families:
//!   - `balances`: account balance records, keyed by `user_id`
//!   - `reservations`: reservation records, keyed by `transaction_id` (ULID)
//!   - `reservations_by_user`: index for listing reservations by user
//!   - `monthly_usage`: usage counters, keyed by `user_id || month`
//!
//! # Example
//!
//! ```no_run
//! use quillforge_core::{AccountBalance, PlanType, UserId};
//! use quillforge_store::{AccountStore, MemoryStore};
//!
//! # async fn demo() -> quillforge_core::Result<()> {
//! let store = MemoryStore::new();
//!
//! let user_id = UserId::generate();
//! store
//!     .put_balance(&AccountBalance::new(user_id, PlanType::Free, 50))
//!     .await?;
//!
//! let balance = store.get_balance(&user_id).await?;
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod memory;

#[cfg(feature = "rocksdb-backend")]
pub mod keys;
#[cfg(feature = "rocksdb-backend")]
pub mod rocks;
#[cfg(feature = "rocksdb-backend")]
pub mod schema;

pub use memory::MemoryStore;
#[cfg(feature = "rocksdb-backend")]
pub use rocks::RocksStore;

use async_trait::async_trait;
use quillforge_core::{
    AccountBalance, LedgerError, MonthlyUsage, Reservation, Result, TransactionId, UserId,
};

/// The records a ledger transaction may read and mutate.
///
/// A transaction covers exactly one user: their balance, their usage counters
/// for one month (materialized lazily if absent), and optionally one
/// reservation record. The closure passed to
/// [`AccountStore::run_transaction`] receives these records after a
/// consistent read and mutates them in place; the store persists the whole
/// set atomically on success.
#[derive(Debug, Clone)]
pub struct TxnRecords {
    /// The user's balance record.
    pub balance: AccountBalance,
    /// The user's usage counters for the requested month.
    pub usage: MonthlyUsage,
    /// The requested reservation, if an id was supplied and a record exists.
    /// The closure may replace `None` with a new record to insert it.
    pub reservation: Option<Reservation>,
}

/// A transaction body: checks and mutates the records, or aborts with an
/// error. Called once per attempt; the ledger may retry it.
pub type TxnFn<'a> =
    &'a (dyn Fn(&mut TxnRecords) -> std::result::Result<(), LedgerError> + Send + Sync);

/// Storage operations for accounts, reservations, and usage counters.
///
/// All errors surface as [`LedgerError`]: backend failures map to
/// `Storage`, a detected concurrent modification maps to `Conflict`
/// (retryable), and a missing account maps to `UserNotFound`. Both provided
/// backends serialize transactions with a lock, so they never report
/// `Conflict` themselves; the variant exists for backends that resolve races
/// after the fact.
#[async_trait]
pub trait AccountStore: Send + Sync {
    /// Get an account balance by user id.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails.
    async fn get_balance(&self, user_id: &UserId) -> Result<Option<AccountBalance>>;

    /// Insert or replace an account balance record.
    ///
    /// This is the provisioning path; ledger mutations go through
    /// [`run_transaction`](AccountStore::run_transaction) instead.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails.
    async fn put_balance(&self, balance: &AccountBalance) -> Result<()>;

    /// Get a reservation by transaction id.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails.
    async fn get_reservation(&self, transaction_id: &TransactionId) -> Result<Option<Reservation>>;

    /// List a user's reservations, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails.
    async fn list_reservations(
        &self,
        user_id: &UserId,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Reservation>>;

    /// Get a user's usage counters for a month (`YYYY-MM`).
    ///
    /// Returns `None` for months with no activity; counters are created
    /// lazily by the first transaction that touches them.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails.
    async fn get_monthly_usage(&self, user_id: &UserId, month: &str) -> Result<Option<MonthlyUsage>>;

    /// Run a serializable read-modify-write transaction over one user's
    /// records.
    ///
    /// The store reads the balance, the month's usage counters (a fresh
    /// zeroed record if none exists yet), and the reservation under
    /// `transaction_id` if one was supplied, then invokes `apply`. If `apply`
    /// returns `Ok`, every record it mutated is persisted atomically,
    /// including a reservation it inserted; if it returns `Err`, nothing is
    /// written and the error is passed through.
    ///
    /// Returns the records as committed.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::UserNotFound`] if no balance record exists.
    /// - [`LedgerError::Conflict`] if the backend detected a concurrent
    ///   modification; the caller should retry from a fresh read.
    /// - [`LedgerError::Storage`] if the backend fails.
    /// - Any error returned by `apply`, with no writes performed.
    async fn run_transaction(
        &self,
        user_id: &UserId,
        month: &str,
        transaction_id: Option<&TransactionId>,
        apply: TxnFn<'_>,
    ) -> Result<TxnRecords>;
}
