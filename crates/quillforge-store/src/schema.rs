//! Database schema definitions and column families.
//!
//! This module defines the column families used in `RocksDB` storage.

/// Column family names for the `RocksDB` database.
pub mod cf {
    /// Account balance records, keyed by `user_id`.
    pub const BALANCES: &str = "balances";

    /// Reservation records, keyed by `transaction_id` (ULID).
    pub const RESERVATIONS: &str = "reservations";

    /// Index: reservations by user, keyed by `user_id || transaction_id`.
    /// Value is empty (index only).
    pub const RESERVATIONS_BY_USER: &str = "reservations_by_user";

    /// Monthly usage counters, keyed by `user_id || month`.
    pub const MONTHLY_USAGE: &str = "monthly_usage";
}

/// Returns all column family names for database initialization.
#[must_use]
pub fn all_column_families() -> Vec<&'static str> {
    vec![
        cf::BALANCES,
        cf::RESERVATIONS,
        cf::RESERVATIONS_BY_USER,
        cf::MONTHLY_USAGE,
    ]
}
