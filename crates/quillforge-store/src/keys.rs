//! Key encoding utilities for `RocksDB`.
//!
//! This module provides functions for encoding and decoding keys used in
//! column families.

use quillforge_core::{TransactionId, UserId};

/// Create a balance key from a user ID.
#[must_use]
pub fn balance_key(user_id: &UserId) -> Vec<u8> {
    user_id.as_bytes().to_vec()
}

/// Create a reservation key from a transaction ID.
#[must_use]
pub fn reservation_key(transaction_id: &TransactionId) -> Vec<u8> {
    transaction_id.to_bytes().to_vec()
}

/// Create a user-reservation index key.
///
/// Format: `user_id (16 bytes) || transaction_id (16 bytes)`
///
/// Since ULIDs are time-ordered, a user's reservations sort by creation time.
#[must_use]
pub fn user_reservation_key(user_id: &UserId, transaction_id: &TransactionId) -> Vec<u8> {
    let mut key = Vec::with_capacity(32);
    key.extend_from_slice(user_id.as_bytes());
    key.extend_from_slice(&transaction_id.to_bytes());
    key
}

/// Create a prefix for iterating all reservations for a user.
#[must_use]
pub fn user_reservations_prefix(user_id: &UserId) -> Vec<u8> {
    user_id.as_bytes().to_vec()
}

/// Extract the transaction ID from a user-reservation index key.
///
/// # Panics
///
/// Panics if the key is not at least 32 bytes.
#[must_use]
pub fn extract_transaction_id_from_user_key(key: &[u8]) -> TransactionId {
    let mut bytes = [0u8; 16];
    bytes.copy_from_slice(&key[16..32]);
    TransactionId::from_bytes(bytes).expect("valid ULID bytes")
}

/// Create a monthly usage key from a user ID and month.
///
/// Format: `user_id (16 bytes) || month ("YYYY-MM", 7 bytes)`
#[must_use]
pub fn usage_key(user_id: &UserId, month: &str) -> Vec<u8> {
    let mut key = Vec::with_capacity(16 + month.len());
    key.extend_from_slice(user_id.as_bytes());
    key.extend_from_slice(month.as_bytes());
    key
}
