//! The credit ledger: reserve, commit, and compensate.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use quillforge_core::{
    current_month_key, LedgerError, QualityTier, Reservation, ReservationStatus, Result,
    ToolKind, TransactionId, UserId,
};
use quillforge_core::{AccountBalance, PlanType};
use quillforge_store::{AccountStore, TxnFn, TxnRecords};
use rand::Rng;
use tokio::time::Instant;

use crate::config::LedgerConfig;
use crate::quota;

/// A request to reserve credits ahead of generation work.
#[derive(Debug, Clone)]
pub struct ReserveRequest {
    /// The user paying for the work.
    pub user_id: UserId,
    /// Words the request will generate.
    pub word_count: i64,
    /// The plan the request is billed under.
    pub plan: PlanType,
    /// The tool producing the content.
    pub tool: ToolKind,
    /// The quality tier the request is priced at.
    pub quality: QualityTier,
    /// Idempotency key; generated once before the first attempt when absent.
    pub transaction_id: Option<TransactionId>,
}

/// The result of a successful reservation.
///
/// Holds the user's in-flight slot: dropping the outcome releases the slot,
/// so a request abandoned mid-saga cannot pin the user's concurrency budget.
#[derive(Debug)]
pub struct ReserveOutcome {
    /// The reservation's idempotency key.
    pub transaction_id: TransactionId,
    /// Credits held.
    pub credits_reserved: i64,
    /// Words the hold covers.
    pub words_reserved: i64,
    /// Balance after the hold.
    pub new_balance: i64,
    /// True when an existing reservation was replayed instead of re-reserved.
    pub replayed: bool,
    _slot: InFlightSlot,
}

/// The result of settling a reservation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitOutcome {
    /// The settled reservation's key.
    pub transaction_id: TransactionId,
    /// Credits charged.
    pub credits_used: i64,
    /// Words delivered.
    pub words_delivered: i64,
    /// Balance after settlement (unchanged by commit itself).
    pub new_balance: i64,
}

/// The result of rolling a reservation back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompensateOutcome {
    /// The rolled-back reservation's key.
    pub transaction_id: TransactionId,
    /// Balance after restoration.
    pub new_balance: i64,
}

/// Releases one unit of the per-user in-flight budget on drop.
#[derive(Debug)]
struct InFlightSlot {
    counts: Arc<Mutex<HashMap<UserId, usize>>>,
    user_id: UserId,
}

impl Drop for InFlightSlot {
    fn drop(&mut self) {
        if let Ok(mut counts) = self.counts.lock() {
            if let Some(count) = counts.get_mut(&self.user_id) {
                *count = count.saturating_sub(1);
                if *count == 0 {
                    counts.remove(&self.user_id);
                }
            }
        }
    }
}

/// Atomic reserve/commit/compensate of credits against user balances.
///
/// Every mutation runs as one serializable transaction through the store,
/// retried with exponential backoff and jitter on transient failures only,
/// within an overall deadline. Business-rule failures short-circuit.
pub struct CreditLedger {
    store: Arc<dyn AccountStore>,
    config: LedgerConfig,
    in_flight: Arc<Mutex<HashMap<UserId, usize>>>,
}

impl CreditLedger {
    /// Create a ledger over the given store.
    #[must_use]
    pub fn new(store: Arc<dyn AccountStore>, config: LedgerConfig) -> Self {
        Self {
            store,
            config,
            in_flight: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// The ledger's configuration.
    #[must_use]
    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    /// Reserve credits for `word_count` words of generation work.
    ///
    /// Pricing goes through the configured cost table; free plans are also
    /// checked against the monthly word cap. The balance debit, usage
    /// accrual, and reservation insert commit atomically. Replaying a
    /// `transaction_id` that already has a reservation returns the original
    /// outcome without mutating anything.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::InvalidRequest`] for a non-positive word count.
    /// - [`LedgerError::TooManyConcurrentRequests`] when the user is at the
    ///   in-flight limit; the store is not touched.
    /// - [`LedgerError::InsufficientCredits`] when the balance cannot cover
    ///   the quote; nothing is recorded.
    /// - [`LedgerError::MonthlyLimitExceeded`] when a free plan would exceed
    ///   its cap; nothing is recorded.
    /// - [`LedgerError::UserNotFound`] when no account exists.
    /// - [`LedgerError::LedgerTimeout`] when retries exhaust the deadline.
    pub async fn reserve(&self, request: ReserveRequest) -> Result<ReserveOutcome> {
        if request.word_count <= 0 {
            return Err(LedgerError::InvalidRequest(format!(
                "word count must be positive, got {}",
                request.word_count
            )));
        }

        let slot = self.acquire_slot(request.user_id)?;

        // Generated once, before the first attempt, and reused across
        // retries so a replay can be recognized.
        let transaction_id = request
            .transaction_id
            .unwrap_or_else(TransactionId::generate);
        let credits = self
            .config
            .cost_table
            .quote(request.word_count, request.tool, request.quality);
        let cap = self.config.cost_table.free_monthly_word_cap;
        let month = current_month_key();
        let replay_seen = AtomicBool::new(false);
        let replay_flag = &replay_seen;

        let user_id = request.user_id;
        let words = request.word_count;
        let plan = request.plan;
        let tool = request.tool;
        let quality = request.quality;
        let month_for_record = month.clone();
        let apply = move |records: &mut TxnRecords| -> std::result::Result<(), LedgerError> {
            if records.reservation.is_some() {
                replay_flag.store(true, Ordering::Relaxed);
                return Ok(());
            }
            quota::check_word_cap(plan, records.usage.words_generated, words, cap)?;
            let previous_balance = records.balance.credit_balance;
            records.balance.debit(credits)?;
            records.usage.record(words, credits);
            records.reservation = Some(Reservation::reserve(
                transaction_id,
                user_id,
                credits,
                words,
                tool,
                quality,
                month_for_record.clone(),
                previous_balance,
            ));
            Ok(())
        };

        let records = self
            .run_with_retry(&user_id, &month, Some(&transaction_id), &apply)
            .await?;
        let replayed = replay_seen.load(Ordering::Relaxed);

        // The record is authoritative for the amounts; on replay it carries
        // the original quote and balance even if pricing or activity has
        // moved since.
        let reservation = records
            .reservation
            .as_ref()
            .ok_or(LedgerError::TransactionNotFound { transaction_id })?;

        tracing::info!(
            user_id = %user_id,
            transaction_id = %transaction_id,
            credits = reservation.credits_reserved,
            words = reservation.words_reserved,
            balance = reservation.new_balance,
            replayed,
            "credits reserved"
        );

        Ok(ReserveOutcome {
            transaction_id,
            credits_reserved: reservation.credits_reserved,
            words_reserved: reservation.words_reserved,
            new_balance: reservation.new_balance,
            replayed,
            _slot: slot,
        })
    }

    /// Settle a reservation after the work was delivered.
    ///
    /// Flips the reservation to `Committed` and folds its amounts into the
    /// account's lifetime totals. Committing an already-committed reservation
    /// is a no-op returning the original outcome.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::TransactionNotFound`] when no reservation exists.
    /// - [`LedgerError::AlreadyRolledBack`] when it was compensated first.
    pub async fn commit(
        &self,
        user_id: &UserId,
        transaction_id: &TransactionId,
    ) -> Result<CommitOutcome> {
        let month = self.reservation_month(transaction_id).await?;

        let txn_id = *transaction_id;
        let apply = move |records: &mut TxnRecords| -> std::result::Result<(), LedgerError> {
            let reservation = records
                .reservation
                .as_mut()
                .ok_or(LedgerError::TransactionNotFound {
                    transaction_id: txn_id,
                })?;
            match reservation.status {
                ReservationStatus::Reserved => {
                    let credits = reservation.credits_reserved;
                    let words = reservation.words_reserved;
                    reservation.mark_committed();
                    records.balance.record_usage(credits, words);
                    Ok(())
                }
                ReservationStatus::Committed => Ok(()),
                ReservationStatus::RolledBack => Err(LedgerError::AlreadyRolledBack {
                    transaction_id: txn_id,
                }),
            }
        };

        let records = self
            .run_with_retry(user_id, &month, Some(transaction_id), &apply)
            .await?;
        let reservation = records
            .reservation
            .as_ref()
            .ok_or(LedgerError::TransactionNotFound {
                transaction_id: *transaction_id,
            })?;

        tracing::info!(
            user_id = %user_id,
            transaction_id = %transaction_id,
            credits = reservation.credits_reserved,
            "reservation committed"
        );

        Ok(CommitOutcome {
            transaction_id: *transaction_id,
            credits_used: reservation.credits_reserved,
            words_delivered: reservation.words_reserved,
            new_balance: records.balance.credit_balance,
        })
    }

    /// Roll a reservation back, restoring balance and monthly usage.
    ///
    /// The restoration amounts are caller-supplied so compensation mirrors
    /// what the caller believes it reserved; monthly counters floor at zero.
    /// Usage is reverted against the month the reservation accrued into, not
    /// the current month.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::TransactionNotFound`] when no reservation exists.
    /// - [`LedgerError::AlreadyRolledBack`] on a second compensation; the
    ///   balance is not changed again.
    pub async fn compensate(
        &self,
        user_id: &UserId,
        transaction_id: &TransactionId,
        credits_to_restore: i64,
        words_to_restore: i64,
    ) -> Result<CompensateOutcome> {
        let month = self.reservation_month(transaction_id).await?;

        let txn_id = *transaction_id;
        let apply = move |records: &mut TxnRecords| -> std::result::Result<(), LedgerError> {
            let reservation = records
                .reservation
                .as_mut()
                .ok_or(LedgerError::TransactionNotFound {
                    transaction_id: txn_id,
                })?;
            match reservation.status {
                ReservationStatus::RolledBack => Err(LedgerError::AlreadyRolledBack {
                    transaction_id: txn_id,
                }),
                ReservationStatus::Reserved | ReservationStatus::Committed => {
                    reservation.mark_rolled_back();
                    records.balance.refund(credits_to_restore);
                    records.usage.revert(words_to_restore, credits_to_restore);
                    Ok(())
                }
            }
        };

        let records = self
            .run_with_retry(user_id, &month, Some(transaction_id), &apply)
            .await?;

        tracing::info!(
            user_id = %user_id,
            transaction_id = %transaction_id,
            credits_restored = credits_to_restore,
            balance = records.balance.credit_balance,
            "reservation rolled back"
        );

        Ok(CompensateOutcome {
            transaction_id: *transaction_id,
            new_balance: records.balance.credit_balance,
        })
    }

    /// Get a user's balance record.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::UserNotFound`] if no account exists, or an
    /// error if the store fails.
    pub async fn balance_of(&self, user_id: &UserId) -> Result<AccountBalance> {
        self.store
            .get_balance(user_id)
            .await?
            .ok_or(LedgerError::UserNotFound { user_id: *user_id })
    }

    /// List a user's reservations, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub async fn list_reservations(
        &self,
        user_id: &UserId,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Reservation>> {
        self.store.list_reservations(user_id, limit, offset).await
    }

    /// Number of reservations the user currently holds open.
    #[must_use]
    pub fn in_flight_count(&self, user_id: &UserId) -> usize {
        self.in_flight
            .lock()
            .map(|counts| counts.get(user_id).copied().unwrap_or(0))
            .unwrap_or(0)
    }

    fn acquire_slot(&self, user_id: UserId) -> Result<InFlightSlot> {
        let mut counts = self
            .in_flight
            .lock()
            .map_err(|_| LedgerError::Storage("in-flight counter poisoned".to_string()))?;
        let current = counts.get(&user_id).copied().unwrap_or(0);
        if current >= self.config.max_in_flight {
            return Err(LedgerError::TooManyConcurrentRequests {
                in_flight: current,
                max: self.config.max_in_flight,
            });
        }
        counts.insert(user_id, current + 1);
        Ok(InFlightSlot {
            counts: Arc::clone(&self.in_flight),
            user_id,
        })
    }

    /// The month a reservation accrued into; compensation and commit address
    /// that month's counters even across a month boundary.
    async fn reservation_month(&self, transaction_id: &TransactionId) -> Result<String> {
        let reservation = self
            .store
            .get_reservation(transaction_id)
            .await?
            .ok_or(LedgerError::TransactionNotFound {
                transaction_id: *transaction_id,
            })?;
        Ok(reservation.month)
    }

    async fn run_with_retry(
        &self,
        user_id: &UserId,
        month: &str,
        transaction_id: Option<&TransactionId>,
        apply: TxnFn<'_>,
    ) -> Result<TxnRecords> {
        let started = Instant::now();
        let deadline = started + self.config.overall_timeout;
        let mut last_error = None;

        for attempt in 1..=self.config.max_attempts {
            if attempt > 1 {
                let delay = self.backoff_delay(attempt);
                if Instant::now() + delay >= deadline {
                    return Err(LedgerError::LedgerTimeout {
                        attempts: attempt - 1,
                        elapsed_ms: elapsed_ms(started),
                    });
                }
                tokio::time::sleep(delay).await;
            }

            match self
                .store
                .run_transaction(user_id, month, transaction_id, apply)
                .await
            {
                Ok(records) => return Ok(records),
                Err(e) if e.is_retryable() => {
                    tracing::warn!(
                        user_id = %user_id,
                        attempt,
                        error = %e,
                        "ledger transaction attempt failed"
                    );
                    last_error = Some(e);
                }
                Err(e) => return Err(e),
            }
        }

        Err(last_error.unwrap_or(LedgerError::LedgerTimeout {
            attempts: self.config.max_attempts,
            elapsed_ms: elapsed_ms(started),
        }))
    }

    /// Delay before attempt `n`: exponential in the attempt number with a
    /// ±10% jitter, capped at the configured maximum.
    fn backoff_delay(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(2).min(16);
        let base = self
            .config
            .base_backoff
            .saturating_mul(2_u32.saturating_pow(exp))
            .min(self.config.max_backoff);
        let jitter: f64 = rand::rng().random_range(0.9..1.1);
        base.mul_f64(jitter)
    }
}

impl std::fmt::Debug for CreditLedger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CreditLedger")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}
