//! Ledger tuning parameters.

use quillforge_core::CostTable;
use std::time::Duration;

/// Default cap on in-flight reservations per user.
pub const DEFAULT_MAX_IN_FLIGHT: usize = 3;

/// Default number of transaction attempts before giving up.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

/// Default base delay for exponential backoff between attempts.
pub const DEFAULT_BASE_BACKOFF: Duration = Duration::from_millis(50);

/// Default ceiling on a single backoff delay.
pub const DEFAULT_MAX_BACKOFF: Duration = Duration::from_secs(2);

/// Default wall-clock budget for one ledger operation across all attempts.
pub const DEFAULT_OVERALL_TIMEOUT: Duration = Duration::from_secs(30);

/// Configuration for the credit ledger.
#[derive(Debug, Clone)]
pub struct LedgerConfig {
    /// Pricing table used to convert words to credits.
    pub cost_table: CostTable,
    /// Reservations a single user may hold open at once.
    pub max_in_flight: usize,
    /// Transaction attempts before a retryable failure becomes terminal.
    pub max_attempts: u32,
    /// Base delay for exponential backoff; attempt `n` waits roughly
    /// `base * 2^(n-2)` with jitter.
    pub base_backoff: Duration,
    /// Ceiling on a single backoff delay.
    pub max_backoff: Duration,
    /// Wall-clock budget for one operation across all attempts; exceeding it
    /// fails with `LedgerTimeout`.
    pub overall_timeout: Duration,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            cost_table: CostTable::default(),
            max_in_flight: DEFAULT_MAX_IN_FLIGHT,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_backoff: DEFAULT_BASE_BACKOFF,
            max_backoff: DEFAULT_MAX_BACKOFF,
            overall_timeout: DEFAULT_OVERALL_TIMEOUT,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = LedgerConfig::default();
        assert_eq!(config.max_in_flight, 3);
        assert_eq!(config.max_attempts, 5);
        assert_eq!(config.base_backoff, Duration::from_millis(50));
        assert_eq!(config.overall_timeout, Duration::from_secs(30));
    }
}
