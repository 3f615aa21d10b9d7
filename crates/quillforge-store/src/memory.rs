//! In-memory storage implementation.
//!
//! This module provides the [`MemoryStore`] implementation of the
//! [`AccountStore`] trait, backed by hash maps behind a single mutex. The
//! mutex serializes transactions, which makes this backend trivially
//! serializable and the reference for the others.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use quillforge_core::{
    AccountBalance, LedgerError, MonthlyUsage, Reservation, Result, TransactionId, UserId,
};

use crate::{AccountStore, TxnFn, TxnRecords};

#[derive(Debug, Default)]
struct MemoryState {
    balances: HashMap<UserId, AccountBalance>,
    reservations: HashMap<TransactionId, Reservation>,
    by_user: HashMap<UserId, Vec<TransactionId>>,
    usage: HashMap<(UserId, String), MonthlyUsage>,
}

/// In-memory store backed by hash maps behind a mutex.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, MemoryState>> {
        self.state
            .lock()
            .map_err(|_| LedgerError::Storage("store mutex poisoned".to_string()))
    }
}

#[async_trait::async_trait]
impl AccountStore for MemoryStore {
    async fn get_balance(&self, user_id: &UserId) -> Result<Option<AccountBalance>> {
        Ok(self.lock()?.balances.get(user_id).cloned())
    }

    async fn put_balance(&self, balance: &AccountBalance) -> Result<()> {
        self.lock()?
            .balances
            .insert(balance.user_id, balance.clone());
        Ok(())
    }

    async fn get_reservation(&self, transaction_id: &TransactionId) -> Result<Option<Reservation>> {
        Ok(self.lock()?.reservations.get(transaction_id).cloned())
    }

    async fn list_reservations(
        &self,
        user_id: &UserId,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Reservation>> {
        let state = self.lock()?;
        let mut ids = state.by_user.get(user_id).cloned().unwrap_or_default();
        // ULIDs are time-ordered, so sorting gives chronological order.
        ids.sort_unstable();
        let reservations = ids
            .iter()
            .rev()
            .skip(offset)
            .take(limit)
            .filter_map(|id| state.reservations.get(id).cloned())
            .collect();
        Ok(reservations)
    }

    async fn get_monthly_usage(
        &self,
        user_id: &UserId,
        month: &str,
    ) -> Result<Option<MonthlyUsage>> {
        Ok(self
            .lock()?
            .usage
            .get(&(*user_id, month.to_string()))
            .cloned())
    }

    async fn run_transaction(
        &self,
        user_id: &UserId,
        month: &str,
        transaction_id: Option<&TransactionId>,
        apply: TxnFn<'_>,
    ) -> Result<TxnRecords> {
        let mut state = self.lock()?;

        let balance = state
            .balances
            .get(user_id)
            .cloned()
            .ok_or(LedgerError::UserNotFound { user_id: *user_id })?;
        let usage = state
            .usage
            .get(&(*user_id, month.to_string()))
            .cloned()
            .unwrap_or_else(|| MonthlyUsage::new(*user_id, month.to_string()));
        let reservation = transaction_id.and_then(|id| state.reservations.get(id).cloned());

        let before_balance = balance.clone();
        let before_usage = usage.clone();
        let had_reservation = reservation.is_some();

        let mut records = TxnRecords {
            balance,
            usage,
            reservation,
        };
        apply(&mut records)?;

        // Persist only what the closure actually changed.
        if records.balance != before_balance {
            state.balances.insert(*user_id, records.balance.clone());
        }
        if records.usage != before_usage {
            state
                .usage
                .insert((*user_id, month.to_string()), records.usage.clone());
        }
        if let Some(res) = &records.reservation {
            state.reservations.insert(res.transaction_id, res.clone());
            if !had_reservation {
                state
                    .by_user
                    .entry(res.user_id)
                    .or_default()
                    .push(res.transaction_id);
            }
        }

        Ok(records)
    }
}
