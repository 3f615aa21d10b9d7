//! Credit reservation ledger for the quillforge generation engine.
//!
//! The ledger moves credits through the reserve, commit, and compensate
//! lifecycle against an [`AccountStore`](quillforge_store::AccountStore).
//! Every mutation runs as one serializable store transaction, retried with
//! exponential backoff on transient failures, so concurrent requests can
//! never overspend a balance or double-refund a rollback.
//!
//! # Lifecycle
//!
//! 1. [`CreditLedger::reserve`] converts requested words to credits, checks
//!    the free-tier monthly cap, debits the balance, and records a
//!    reservation. Replaying a transaction id returns the original outcome.
//! 2. [`CreditLedger::commit`] settles a reservation after delivery.
//! 3. [`CreditLedger::compensate`] rolls a reservation back, restoring the
//!    balance and monthly usage. A second compensation is rejected.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod config;
pub mod ledger;
pub mod quota;

pub use config::LedgerConfig;
pub use ledger::{
    CommitOutcome, CompensateOutcome, CreditLedger, ReserveOutcome, ReserveRequest,
};
pub use quota::{check_word_cap, QuotaTracker};
