//! Plan validation and usage reporting collaborators.
//!
//! Both are consumed through traits. The HTTP implementations talk to the
//! surrounding platform's services; [`StoreValidator`] and [`NullReporter`]
//! are the fallbacks wired in when no URL is configured, so the engine works
//! standalone.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use quillforge_core::{
    current_month_key, LedgerError, PlanType, ToolKind, TransactionId, UserId,
};
use quillforge_ledger::QuotaTracker;
use quillforge_store::AccountStore;
use reqwest::Client;
use serde::{Deserialize, Serialize};

/// Delay before the single retry of a transient validator failure.
const VALIDATOR_RETRY_DELAY: Duration = Duration::from_millis(200);

/// A request to validate before any credits are reserved.
#[derive(Debug, Clone)]
pub struct ValidationRequest {
    /// The requesting user.
    pub user_id: UserId,
    /// Prompt length in characters.
    pub prompt_chars: usize,
    /// Words the request asks for.
    pub requested_words: i64,
    /// The tool the request targets.
    pub tool: ToolKind,
}

/// A passed validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Validation {
    /// The plan the request will be billed under.
    pub plan: PlanType,
}

/// Error type for plan validation.
#[derive(Debug, thiserror::Error)]
pub enum ValidatorError {
    /// HTTP transport failure.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The validation service returned an error response.
    #[error("validator API error: {status} - {message}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Error message from the service.
        message: String,
    },

    /// The request was rejected by policy.
    #[error("{reason}")]
    Rejected {
        /// Why the request was rejected.
        reason: String,
    },

    /// The account store failed while validating locally.
    #[error("store error during validation: {0}")]
    Store(#[from] LedgerError),
}

impl ValidatorError {
    /// Whether retrying the call could reasonably succeed.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Http(e) => e.is_timeout() || e.is_connect(),
            Self::Api { status, .. } => *status == 429 || *status >= 500,
            Self::Rejected { .. } => false,
            Self::Store(e) => e.is_retryable(),
        }
    }
}

/// Gatekeeper consulted before any credits are reserved.
#[async_trait]
pub trait PlanValidator: Send + Sync {
    /// Validate a request and resolve the plan it bills under.
    ///
    /// # Errors
    ///
    /// Returns [`ValidatorError::Rejected`] when the request violates policy,
    /// or another variant when the validator itself fails.
    async fn validate(&self, request: &ValidationRequest) -> Result<Validation, ValidatorError>;
}

/// Sink for usage events after a reservation commits.
#[async_trait]
pub trait UsageReporter: Send + Sync {
    /// Record one committed reservation's usage. Best-effort; the engine
    /// logs failures and never fails the request over them.
    ///
    /// # Errors
    ///
    /// Returns [`ReporterError`] when the sink is unreachable or rejects the
    /// event.
    async fn record(&self, report: &UsageReport) -> Result<(), ReporterError>;
}

/// Usage attached to a committed reservation.
#[derive(Debug, Clone)]
pub struct UsageReport {
    /// The billed user.
    pub user_id: UserId,
    /// The committed reservation; doubles as the event's idempotency key.
    pub transaction_id: TransactionId,
    /// The tool that produced the content.
    pub tool: ToolKind,
    /// Words delivered.
    pub words: i64,
    /// Credits charged.
    pub credits: i64,
}

/// Error type for usage reporting.
#[derive(Debug, thiserror::Error)]
pub enum ReporterError {
    /// HTTP transport failure.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The reporting service returned an error response.
    #[error("reporter API error: {status} - {message}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Error message from the service.
        message: String,
    },
}

#[derive(Debug, Serialize)]
struct ValidateApiRequest<'a> {
    user_id: &'a UserId,
    prompt_chars: usize,
    requested_words: i64,
    tool: ToolKind,
}

#[derive(Debug, Deserialize)]
struct ValidateApiResponse {
    plan: PlanType,
}

#[derive(Debug, Serialize)]
struct UsageEventRequest<'a> {
    event: UsageEvent<'a>,
}

#[derive(Debug, Serialize)]
struct UsageEvent<'a> {
    transaction_id: String,
    user_id: &'a UserId,
    tool: ToolKind,
    words: i64,
    credits: i64,
    timestamp: i64,
}

#[derive(Debug, Deserialize)]
struct ApiErrorResponse {
    error: String,
}

/// Read the status and error message out of a failed response, falling back
/// to the bare status line when the body is not the expected shape.
async fn read_error_body(response: reqwest::Response) -> (u16, String) {
    let status = response.status();
    match response.json::<ApiErrorResponse>().await {
        Ok(body) => (status.as_u16(), body.error),
        Err(_) => (status.as_u16(), format!("HTTP {status}")),
    }
}

/// Validation service client.
#[derive(Debug, Clone)]
pub struct HttpValidator {
    client: Client,
    base_url: String,
    api_key: String,
    timeout: Duration,
}

impl HttpValidator {
    /// Default per-call deadline for validation requests.
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

    /// Create a new validator client.
    ///
    /// # Panics
    ///
    /// Panics if the HTTP client cannot be built (should not happen with
    /// default settings).
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        let client = Client::builder()
            .timeout(Self::DEFAULT_TIMEOUT)
            .build()
            .expect("Failed to build HTTP client");

        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            timeout: Self::DEFAULT_TIMEOUT,
        }
    }

    /// Override the per-call timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    async fn try_validate(
        &self,
        request: &ValidationRequest,
    ) -> Result<Validation, ValidatorError> {
        let url = format!("{}/v1/validate", self.base_url);
        let payload = ValidateApiRequest {
            user_id: &request.user_id,
            prompt_chars: request.prompt_chars,
            requested_words: request.requested_words,
            tool: request.tool,
        };

        let response = self
            .client
            .post(&url)
            .timeout(self.timeout)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&payload)
            .send()
            .await?;

        if response.status().is_success() {
            let body: ValidateApiResponse = response.json().await?;
            return Ok(Validation { plan: body.plan });
        }

        let (status, message) = read_error_body(response).await;
        // Client errors are policy rejections; everything else is the
        // validator misbehaving.
        if (400..500).contains(&status) && status != 429 {
            Err(ValidatorError::Rejected { reason: message })
        } else {
            Err(ValidatorError::Api { status, message })
        }
    }
}

#[async_trait]
impl PlanValidator for HttpValidator {
    async fn validate(&self, request: &ValidationRequest) -> Result<Validation, ValidatorError> {
        match self.try_validate(request).await {
            Err(e) if e.is_transient() => {
                tracing::warn!(error = %e, "validator call failed, retrying once");
                tokio::time::sleep(VALIDATOR_RETRY_DELAY).await;
                self.try_validate(request).await
            }
            other => other,
        }
    }
}

/// Fallback validator backed by the account store.
///
/// Used when no validation service is configured: resolves the plan from the
/// account record, applies request-size sanity checks, and pre-checks the
/// free-tier word budget. The budget check is advisory; the ledger re-checks
/// it atomically inside the reservation transaction.
pub struct StoreValidator {
    store: Arc<dyn AccountStore>,
    quota: QuotaTracker,
    max_request_words: i64,
    max_prompt_chars: usize,
    free_word_cap: i64,
}

impl StoreValidator {
    /// Create a validator over the given store.
    #[must_use]
    pub fn new(
        store: Arc<dyn AccountStore>,
        max_request_words: i64,
        max_prompt_chars: usize,
        free_word_cap: i64,
    ) -> Self {
        let quota = QuotaTracker::new(Arc::clone(&store));
        Self {
            store,
            quota,
            max_request_words,
            max_prompt_chars,
            free_word_cap,
        }
    }
}

#[async_trait]
impl PlanValidator for StoreValidator {
    async fn validate(&self, request: &ValidationRequest) -> Result<Validation, ValidatorError> {
        if request.prompt_chars == 0 {
            return Err(ValidatorError::Rejected {
                reason: "prompt is empty".to_string(),
            });
        }
        if request.prompt_chars > self.max_prompt_chars {
            return Err(ValidatorError::Rejected {
                reason: format!(
                    "prompt too long: {} characters, limit {}",
                    request.prompt_chars, self.max_prompt_chars
                ),
            });
        }
        if request.requested_words <= 0 {
            return Err(ValidatorError::Rejected {
                reason: format!(
                    "word count must be positive, got {}",
                    request.requested_words
                ),
            });
        }
        if request.requested_words > self.max_request_words {
            return Err(ValidatorError::Rejected {
                reason: format!(
                    "requested {} words, limit {}",
                    request.requested_words, self.max_request_words
                ),
            });
        }

        let account = self
            .store
            .get_balance(&request.user_id)
            .await?
            .ok_or_else(|| ValidatorError::Rejected {
                reason: format!("no account for user {}", request.user_id),
            })?;

        let month = current_month_key();
        if let Some(remaining) = self
            .quota
            .remaining_words(&request.user_id, account.plan, &month, self.free_word_cap)
            .await?
        {
            if request.requested_words > remaining {
                return Err(ValidatorError::Rejected {
                    reason: format!(
                        "monthly word budget exhausted: {remaining} of {} words remaining",
                        self.free_word_cap
                    ),
                });
            }
        }

        Ok(Validation { plan: account.plan })
    }
}

impl std::fmt::Debug for StoreValidator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreValidator")
            .field("max_request_words", &self.max_request_words)
            .field("max_prompt_chars", &self.max_prompt_chars)
            .field("free_word_cap", &self.free_word_cap)
            .finish_non_exhaustive()
    }
}

/// Usage reporting client.
#[derive(Debug, Clone)]
pub struct HttpReporter {
    client: Client,
    base_url: String,
    api_key: String,
    timeout: Duration,
}

impl HttpReporter {
    /// Default per-call deadline for usage events.
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

    /// Create a new reporter client.
    ///
    /// # Panics
    ///
    /// Panics if the HTTP client cannot be built (should not happen with
    /// default settings).
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        let client = Client::builder()
            .timeout(Self::DEFAULT_TIMEOUT)
            .build()
            .expect("Failed to build HTTP client");

        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            timeout: Self::DEFAULT_TIMEOUT,
        }
    }

    /// Override the per-call timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl UsageReporter for HttpReporter {
    async fn record(&self, report: &UsageReport) -> Result<(), ReporterError> {
        let url = format!("{}/v1/usage_events", self.base_url);
        let payload = UsageEventRequest {
            event: UsageEvent {
                transaction_id: report.transaction_id.to_string(),
                user_id: &report.user_id,
                tool: report.tool,
                words: report.words,
                credits: report.credits,
                timestamp: chrono::Utc::now().timestamp(),
            },
        };

        let response = self
            .client
            .post(&url)
            .timeout(self.timeout)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&payload)
            .send()
            .await?;

        if !response.status().is_success() {
            let (status, message) = read_error_body(response).await;
            return Err(ReporterError::Api { status, message });
        }

        tracing::debug!(
            transaction_id = %report.transaction_id,
            words = report.words,
            credits = report.credits,
            "usage event recorded"
        );
        Ok(())
    }
}

/// Reporter wired in when no usage sink is configured; events are dropped.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullReporter;

#[async_trait]
impl UsageReporter for NullReporter {
    async fn record(&self, report: &UsageReport) -> Result<(), ReporterError> {
        tracing::debug!(
            transaction_id = %report.transaction_id,
            "usage reporting disabled, dropping event"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quillforge_core::AccountBalance;
    use quillforge_store::MemoryStore;

    fn request(user_id: UserId, prompt_chars: usize, words: i64) -> ValidationRequest {
        ValidationRequest {
            user_id,
            prompt_chars,
            requested_words: words,
            tool: ToolKind::Essay,
        }
    }

    async fn validator_with_account(plan: PlanType) -> (StoreValidator, UserId) {
        let store = Arc::new(MemoryStore::new());
        let user_id = UserId::generate();
        store
            .put_balance(&AccountBalance::new(user_id, plan, 500))
            .await
            .unwrap();
        let validator = StoreValidator::new(store, 10_000, 10_000, 1_000);
        (validator, user_id)
    }

    #[tokio::test]
    async fn store_validator_resolves_the_plan() {
        let (validator, user_id) = validator_with_account(PlanType::Standard).await;
        let validation = validator.validate(&request(user_id, 40, 300)).await.unwrap();
        assert_eq!(validation.plan, PlanType::Standard);
    }

    #[tokio::test]
    async fn store_validator_rejects_malformed_requests() {
        let (validator, user_id) = validator_with_account(PlanType::Free).await;

        let err = validator.validate(&request(user_id, 0, 300)).await.unwrap_err();
        assert!(matches!(err, ValidatorError::Rejected { .. }));

        let err = validator
            .validate(&request(user_id, 20_000, 300))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("prompt too long"));

        let err = validator.validate(&request(user_id, 40, 0)).await.unwrap_err();
        assert!(err.to_string().contains("must be positive"));

        let err = validator
            .validate(&request(user_id, 40, 50_000))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("limit 10000"));
    }

    #[tokio::test]
    async fn store_validator_rejects_unknown_users() {
        let store = Arc::new(MemoryStore::new());
        let validator = StoreValidator::new(store, 10_000, 10_000, 1_000);
        let err = validator
            .validate(&request(UserId::generate(), 40, 300))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("no account"));
    }

    #[tokio::test]
    async fn store_validator_pre_checks_the_free_budget() {
        let store = Arc::new(MemoryStore::new());
        let user_id = UserId::generate();
        store
            .put_balance(&AccountBalance::new(user_id, PlanType::Free, 500))
            .await
            .unwrap();
        store
            .run_transaction(&user_id, &current_month_key(), None, &|records| {
                records.usage.record(950, 20);
                Ok(())
            })
            .await
            .unwrap();

        let validator = StoreValidator::new(store, 10_000, 10_000, 1_000);
        let err = validator.validate(&request(user_id, 40, 300)).await.unwrap_err();
        assert!(err.to_string().contains("monthly word budget exhausted"));
        assert!(!err.is_transient());
    }

    #[tokio::test]
    async fn store_validator_skips_the_budget_for_paid_plans() {
        let store = Arc::new(MemoryStore::new());
        let user_id = UserId::generate();
        store
            .put_balance(&AccountBalance::new(user_id, PlanType::Pro, 5_000))
            .await
            .unwrap();
        store
            .run_transaction(&user_id, &current_month_key(), None, &|records| {
                records.usage.record(9_000, 300);
                Ok(())
            })
            .await
            .unwrap();

        let validator = StoreValidator::new(store, 10_000, 10_000, 1_000);
        let validation = validator.validate(&request(user_id, 40, 300)).await.unwrap();
        assert_eq!(validation.plan, PlanType::Pro);
    }

    #[test]
    fn http_clients_trim_trailing_slashes() {
        let validator = HttpValidator::new("http://localhost:7000/", "key");
        assert_eq!(validator.base_url, "http://localhost:7000");

        let reporter = HttpReporter::new("http://localhost:7001/", "key");
        assert_eq!(reporter.base_url, "http://localhost:7001");
    }

    #[test]
    fn validator_error_transience() {
        let rejected = ValidatorError::Rejected {
            reason: "nope".to_string(),
        };
        let overloaded = ValidatorError::Api {
            status: 503,
            message: "busy".to_string(),
        };
        assert!(!rejected.is_transient());
        assert!(overloaded.is_transient());
    }

    #[tokio::test]
    async fn null_reporter_swallows_events() {
        let report = UsageReport {
            user_id: UserId::generate(),
            transaction_id: TransactionId::generate(),
            tool: ToolKind::Essay,
            words: 300,
            credits: 100,
        };
        NullReporter.record(&report).await.unwrap();
    }
}
