//! `RocksDB` storage implementation.
//!
//! This module provides the `RocksStore` implementation of the
//! [`AccountStore`] trait. Values are CBOR-encoded. A write lock serializes
//! `run_transaction` and `put_balance`; reads stay lock-free.

use std::path::Path;
use std::sync::{Arc, Mutex};

use rocksdb::{
    BoundColumnFamily, ColumnFamilyDescriptor, DBWithThreadMode, IteratorMode, MultiThreaded,
    Options, WriteBatch,
};

use quillforge_core::{
    AccountBalance, LedgerError, MonthlyUsage, Reservation, Result, TransactionId, UserId,
};

use crate::keys;
use crate::schema::{all_column_families, cf};
use crate::{AccountStore, TxnFn, TxnRecords};

/// `RocksDB`-backed storage implementation.
pub struct RocksStore {
    db: Arc<DBWithThreadMode<MultiThreaded>>,
    write_lock: Mutex<()>,
}

impl RocksStore {
    /// Open or create a `RocksDB` database at the given path.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or created.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let cf_descriptors: Vec<_> = all_column_families()
            .into_iter()
            .map(|name| ColumnFamilyDescriptor::new(name, Options::default()))
            .collect();

        let db = DBWithThreadMode::open_cf_descriptors(&opts, path, cf_descriptors)
            .map_err(|e| LedgerError::Storage(e.to_string()))?;
        tracing::debug!("opened rocksdb account store");

        Ok(Self {
            db: Arc::new(db),
            write_lock: Mutex::new(()),
        })
    }

    /// Get a column family handle.
    fn cf(&self, name: &str) -> Result<Arc<BoundColumnFamily<'_>>> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| LedgerError::Storage(format!("column family not found: {name}")))
    }

    /// Serialize a value using CBOR.
    fn serialize<T: serde::Serialize>(value: &T) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        ciborium::into_writer(value, &mut buf)
            .map_err(|e| LedgerError::Storage(format!("serialization: {e}")))?;
        Ok(buf)
    }

    /// Deserialize a value from CBOR.
    fn deserialize<T: serde::de::DeserializeOwned>(data: &[u8]) -> Result<T> {
        ciborium::from_reader(data).map_err(|e| LedgerError::Storage(format!("serialization: {e}")))
    }

    fn read_balance(&self, user_id: &UserId) -> Result<Option<AccountBalance>> {
        let cf = self.cf(cf::BALANCES)?;
        self.db
            .get_cf(&cf, keys::balance_key(user_id))
            .map_err(|e| LedgerError::Storage(e.to_string()))?
            .map(|data| Self::deserialize(&data))
            .transpose()
    }

    fn read_reservation(&self, transaction_id: &TransactionId) -> Result<Option<Reservation>> {
        let cf = self.cf(cf::RESERVATIONS)?;
        self.db
            .get_cf(&cf, keys::reservation_key(transaction_id))
            .map_err(|e| LedgerError::Storage(e.to_string()))?
            .map(|data| Self::deserialize(&data))
            .transpose()
    }

    fn read_usage(&self, user_id: &UserId, month: &str) -> Result<Option<MonthlyUsage>> {
        let cf = self.cf(cf::MONTHLY_USAGE)?;
        self.db
            .get_cf(&cf, keys::usage_key(user_id, month))
            .map_err(|e| LedgerError::Storage(e.to_string()))?
            .map(|data| Self::deserialize(&data))
            .transpose()
    }
}

#[async_trait::async_trait]
impl AccountStore for RocksStore {
    async fn get_balance(&self, user_id: &UserId) -> Result<Option<AccountBalance>> {
        self.read_balance(user_id)
    }

    async fn put_balance(&self, balance: &AccountBalance) -> Result<()> {
        let _guard = self
            .write_lock
            .lock()
            .map_err(|_| LedgerError::Storage("write lock poisoned".to_string()))?;
        let cf = self.cf(cf::BALANCES)?;
        let value = Self::serialize(balance)?;
        self.db
            .put_cf(&cf, keys::balance_key(&balance.user_id), value)
            .map_err(|e| LedgerError::Storage(e.to_string()))?;
        Ok(())
    }

    async fn get_reservation(&self, transaction_id: &TransactionId) -> Result<Option<Reservation>> {
        self.read_reservation(transaction_id)
    }

    async fn list_reservations(
        &self,
        user_id: &UserId,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Reservation>> {
        let cf_by_user = self.cf(cf::RESERVATIONS_BY_USER)?;
        let prefix = keys::user_reservations_prefix(user_id);

        let iter = self.db.iterator_cf(
            &cf_by_user,
            IteratorMode::From(&prefix, rocksdb::Direction::Forward),
        );

        // Collect matching keys first; ULIDs are naturally time-ordered.
        let mut all_keys: Vec<Vec<u8>> = Vec::new();
        for item in iter {
            let (key, _) = item.map_err(|e| LedgerError::Storage(e.to_string()))?;
            if !key.starts_with(&prefix) {
                break;
            }
            all_keys.push(key.to_vec());
        }

        // Reverse to get newest first.
        all_keys.reverse();

        let mut reservations = Vec::new();
        for key in all_keys.into_iter().skip(offset) {
            if reservations.len() >= limit {
                break;
            }
            let txn_id = keys::extract_transaction_id_from_user_key(&key);
            if let Some(reservation) = self.read_reservation(&txn_id)? {
                reservations.push(reservation);
            }
        }

        Ok(reservations)
    }

    async fn get_monthly_usage(
        &self,
        user_id: &UserId,
        month: &str,
    ) -> Result<Option<MonthlyUsage>> {
        self.read_usage(user_id, month)
    }

    async fn run_transaction(
        &self,
        user_id: &UserId,
        month: &str,
        transaction_id: Option<&TransactionId>,
        apply: TxnFn<'_>,
    ) -> Result<TxnRecords> {
        let _guard = self
            .write_lock
            .lock()
            .map_err(|_| LedgerError::Storage("write lock poisoned".to_string()))?;

        let balance = self
            .read_balance(user_id)?
            .ok_or(LedgerError::UserNotFound { user_id: *user_id })?;
        let usage = self
            .read_usage(user_id, month)?
            .unwrap_or_else(|| MonthlyUsage::new(*user_id, month.to_string()));
        let reservation = match transaction_id {
            Some(id) => self.read_reservation(id)?,
            None => None,
        };

        let before_balance = balance.clone();
        let before_usage = usage.clone();
        let had_reservation = reservation.is_some();

        let mut records = TxnRecords {
            balance,
            usage,
            reservation,
        };
        apply(&mut records)?;

        let mut batch = WriteBatch::default();
        if records.balance != before_balance {
            let cf = self.cf(cf::BALANCES)?;
            batch.put_cf(
                &cf,
                keys::balance_key(user_id),
                Self::serialize(&records.balance)?,
            );
        }
        if records.usage != before_usage {
            let cf = self.cf(cf::MONTHLY_USAGE)?;
            batch.put_cf(
                &cf,
                keys::usage_key(user_id, month),
                Self::serialize(&records.usage)?,
            );
        }
        if let Some(res) = &records.reservation {
            let cf_res = self.cf(cf::RESERVATIONS)?;
            batch.put_cf(
                &cf_res,
                keys::reservation_key(&res.transaction_id),
                Self::serialize(res)?,
            );
            if !had_reservation {
                let cf_index = self.cf(cf::RESERVATIONS_BY_USER)?;
                batch.put_cf(
                    &cf_index,
                    keys::user_reservation_key(&res.user_id, &res.transaction_id),
                    [],
                );
            }
        }

        if !batch.is_empty() {
            self.db
                .write(batch)
                .map_err(|e| LedgerError::Storage(e.to_string()))?;
        }

        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quillforge_core::{PlanType, QualityTier, ReservationStatus, ToolKind};
    use tempfile::TempDir;

    fn create_test_store() -> (RocksStore, TempDir) {
        let dir = TempDir::new().unwrap();
        let store = RocksStore::open(dir.path()).unwrap();
        (store, dir)
    }

    fn reservation(user_id: UserId, credits: i64) -> Reservation {
        Reservation::reserve(
            TransactionId::generate(),
            user_id,
            credits,
            credits * 3,
            ToolKind::Essay,
            QualityTier::Standard,
            "2025-06".to_string(),
            100,
        )
    }

    #[tokio::test]
    async fn balance_roundtrip() {
        let (store, _dir) = create_test_store();
        let user_id = UserId::generate();
        let balance = AccountBalance::new(user_id, PlanType::Standard, 5000);

        store.put_balance(&balance).await.unwrap();

        let loaded = store.get_balance(&user_id).await.unwrap().unwrap();
        assert_eq!(loaded, balance);
        assert!(store
            .get_balance(&UserId::generate())
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn transaction_commits_all_records() {
        let (store, _dir) = create_test_store();
        let user_id = UserId::generate();
        store
            .put_balance(&AccountBalance::new(user_id, PlanType::Free, 100))
            .await
            .unwrap();

        let res = reservation(user_id, 30);
        let txn_id = res.transaction_id;
        store
            .run_transaction(&user_id, "2025-06", Some(&txn_id), &move |records| {
                records.balance.debit(30)?;
                records.usage.record(90, 30);
                records.reservation = Some(res.clone());
                Ok(())
            })
            .await
            .unwrap();

        let balance = store.get_balance(&user_id).await.unwrap().unwrap();
        assert_eq!(balance.credit_balance, 70);

        let usage = store
            .get_monthly_usage(&user_id, "2025-06")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(usage.words_generated, 90);

        let loaded = store.get_reservation(&txn_id).await.unwrap().unwrap();
        assert_eq!(loaded.status, ReservationStatus::Reserved);
    }

    #[tokio::test]
    async fn failed_transaction_writes_nothing() {
        let (store, _dir) = create_test_store();
        let user_id = UserId::generate();
        store
            .put_balance(&AccountBalance::new(user_id, PlanType::Free, 10))
            .await
            .unwrap();

        let res = reservation(user_id, 30);
        let err = store
            .run_transaction(&user_id, "2025-06", None, &move |records| {
                records.usage.record(90, 30);
                records.reservation = Some(res.clone());
                records.balance.debit(30)
            })
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::InsufficientCredits { .. }));

        let balance = store.get_balance(&user_id).await.unwrap().unwrap();
        assert_eq!(balance.credit_balance, 10);
        assert!(store
            .get_monthly_usage(&user_id, "2025-06")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn missing_account_fails() {
        let (store, _dir) = create_test_store();
        let err = store
            .run_transaction(&UserId::generate(), "2025-06", None, &|_| Ok(()))
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::UserNotFound { .. }));
    }

    #[tokio::test]
    async fn listing_is_newest_first_with_pagination() {
        let (store, _dir) = create_test_store();
        let user_id = UserId::generate();
        store
            .put_balance(&AccountBalance::new(user_id, PlanType::Free, 100))
            .await
            .unwrap();

        let mut ids = Vec::new();
        for _ in 0..3 {
            // Spaced out so the ULIDs land on distinct timestamps.
            std::thread::sleep(std::time::Duration::from_millis(2));
            let res = reservation(user_id, 5);
            ids.push(res.transaction_id);
            store
                .run_transaction(&user_id, "2025-06", Some(&res.transaction_id), &move |r| {
                    r.reservation = Some(res.clone());
                    Ok(())
                })
                .await
                .unwrap();
        }

        let all = store.list_reservations(&user_id, 10, 0).await.unwrap();
        assert_eq!(all.len(), 3);
        assert_eq!(all[0].transaction_id, ids[2]);
        assert_eq!(all[2].transaction_id, ids[0]);

        let page1 = store.list_reservations(&user_id, 1, 0).await.unwrap();
        let page2 = store.list_reservations(&user_id, 1, 1).await.unwrap();
        assert_eq!(page1[0].transaction_id, ids[2]);
        assert_eq!(page2[0].transaction_id, ids[1]);
    }

    #[tokio::test]
    async fn reopen_preserves_records() {
        let dir = TempDir::new().unwrap();
        let user_id = UserId::generate();
        {
            let store = RocksStore::open(dir.path()).unwrap();
            store
                .put_balance(&AccountBalance::new(user_id, PlanType::Pro, 9000))
                .await
                .unwrap();
        }
        let store = RocksStore::open(dir.path()).unwrap();
        let balance = store.get_balance(&user_id).await.unwrap().unwrap();
        assert_eq!(balance.credit_balance, 9000);
        assert_eq!(balance.plan, PlanType::Pro);
    }
}
