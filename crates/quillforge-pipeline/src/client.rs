//! External generator and detector collaborators.
//!
//! Both services are consumed through traits so tests and embedders can
//! substitute their own transports; [`HttpGenerator`] and [`HttpDetector`]
//! are the production `reqwest` implementations.

use std::time::Duration;

use async_trait::async_trait;
use quillforge_core::DetectionScores;
use rand::Rng;
use reqwest::Client;
use serde::{Deserialize, Serialize};

/// Largest backoff between retries of one external call.
const MAX_EXTERNAL_BACKOFF: Duration = Duration::from_secs(5);

/// A request to the external text generator.
#[derive(Debug, Clone)]
pub struct GeneratorRequest {
    /// The full prompt, including any refinement constraints.
    pub prompt: String,
    /// Words the generated text should contain.
    pub target_word_count: i64,
    /// Writing style hint passed through to the service.
    pub style: Option<String>,
    /// Tone hint passed through to the service.
    pub tone: Option<String>,
}

/// Text returned by the generator.
#[derive(Debug, Clone)]
pub struct GeneratedText {
    /// The generated content.
    pub text: String,
    /// The model that produced it, when the service reports one.
    pub model: Option<String>,
}

/// Error type for generator calls.
#[derive(Debug, thiserror::Error)]
pub enum GeneratorError {
    /// HTTP transport failure.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The generation service returned an error response.
    #[error("generator API error: {status} - {message}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Error message from the service.
        message: String,
    },

    /// The call did not finish within its per-call budget.
    #[error("generator call timed out after {0:?}")]
    Timeout(Duration),
}

impl GeneratorError {
    /// Whether retrying the call could reasonably succeed.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Http(e) => e.is_timeout() || e.is_connect(),
            Self::Api { status, .. } => *status == 429 || *status >= 500,
            Self::Timeout(_) => true,
        }
    }
}

/// Error type for detector calls.
///
/// Never surfaced to pipeline callers; the gate and the reconciler absorb
/// detector failures with fallback scores.
#[derive(Debug, thiserror::Error)]
pub enum DetectorError {
    /// HTTP transport failure.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The detection service returned an error response.
    #[error("detector API error: {status} - {message}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Error message from the service.
        message: String,
    },

    /// The call did not finish within its per-call budget.
    #[error("detector call timed out after {0:?}")]
    Timeout(Duration),
}

impl DetectorError {
    /// Whether retrying the call could reasonably succeed.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Http(e) => e.is_timeout() || e.is_connect(),
            Self::Api { status, .. } => *status == 429 || *status >= 500,
            Self::Timeout(_) => true,
        }
    }
}

/// The external text-generation service.
#[async_trait]
pub trait Generator: Send + Sync {
    /// Generate text for one section-sized request.
    ///
    /// # Errors
    ///
    /// Returns [`GeneratorError`] when the service is unreachable or rejects
    /// the request.
    async fn generate(&self, request: &GeneratorRequest) -> Result<GeneratedText, GeneratorError>;
}

/// The external quality-detection service.
#[async_trait]
pub trait Detector: Send + Sync {
    /// Score a piece of text for originality, AI likelihood, and plagiarism.
    ///
    /// # Errors
    ///
    /// Returns [`DetectorError`] when the service is unreachable or rejects
    /// the request.
    async fn detect(&self, text: &str) -> Result<DetectionScores, DetectorError>;
}

/// Timeout and retry budget for detector calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DetectorPolicy {
    /// Per-call deadline.
    pub call_timeout: Duration,
    /// Attempts before the caller falls back.
    pub max_attempts: u32,
    /// Base delay of the exponential backoff between attempts.
    pub base_backoff: Duration,
}

impl Default for DetectorPolicy {
    fn default() -> Self {
        Self {
            call_timeout: Duration::from_secs(15),
            max_attempts: 2,
            base_backoff: Duration::from_millis(200),
        }
    }
}

/// Call the detector under `policy`: per-call timeout plus bounded retry on
/// transient failures only. Returns the last error once attempts or patience
/// run out; callers substitute fallback scores.
pub(crate) async fn detect_with_retry(
    detector: &dyn Detector,
    text: &str,
    policy: &DetectorPolicy,
) -> Result<DetectionScores, DetectorError> {
    let mut last_error = None;

    for attempt in 1..=policy.max_attempts {
        if attempt > 1 {
            tokio::time::sleep(retry_backoff(policy.base_backoff, attempt)).await;
        }

        let outcome = match tokio::time::timeout(policy.call_timeout, detector.detect(text)).await {
            Ok(result) => result,
            Err(_) => Err(DetectorError::Timeout(policy.call_timeout)),
        };

        match outcome {
            Ok(scores) => return Ok(scores),
            Err(e) if e.is_transient() => {
                tracing::warn!(attempt, error = %e, "detector call failed");
                last_error = Some(e);
            }
            Err(e) => return Err(e),
        }
    }

    Err(last_error.unwrap_or(DetectorError::Timeout(policy.call_timeout)))
}

/// Delay before attempt `n` of an external call: exponential with ±10%
/// jitter, capped at [`MAX_EXTERNAL_BACKOFF`].
pub(crate) fn retry_backoff(base: Duration, attempt: u32) -> Duration {
    let exp = attempt.saturating_sub(2).min(8);
    let delay = base
        .saturating_mul(2_u32.saturating_pow(exp))
        .min(MAX_EXTERNAL_BACKOFF);
    let jitter: f64 = rand::rng().random_range(0.9..1.1);
    delay.mul_f64(jitter)
}

#[derive(Debug, Serialize)]
struct GenerateApiRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    target_word_count: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    style: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tone: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct GenerateApiResponse {
    text: String,
    model: Option<String>,
}

#[derive(Debug, Serialize)]
struct DetectApiRequest<'a> {
    text: &'a str,
}

#[derive(Debug, Deserialize)]
struct DetectApiResponse {
    originality: f64,
    ai_likelihood: f64,
    plagiarism: f64,
    confidence: f64,
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

/// Generation service client.
#[derive(Debug, Clone)]
pub struct HttpGenerator {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
    timeout: Duration,
}

impl HttpGenerator {
    /// Default per-call deadline for generation requests.
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

    /// Create a new generator client.
    ///
    /// # Arguments
    ///
    /// * `base_url` - Generation service URL (e.g., `"http://localhost:8080"`)
    /// * `api_key` - Service API key
    /// * `model` - Model name sent with every request
    ///
    /// # Panics
    ///
    /// Panics if the HTTP client cannot be built (should not happen with
    /// default settings).
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        let client = Client::builder()
            .timeout(Self::DEFAULT_TIMEOUT)
            .build()
            .expect("Failed to build HTTP client");

        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            model: model.into(),
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
impl Generator for HttpGenerator {
    async fn generate(&self, request: &GeneratorRequest) -> Result<GeneratedText, GeneratorError> {
        let url = format!("{}/v1/generate", self.base_url);
        let payload = GenerateApiRequest {
            model: &self.model,
            prompt: &request.prompt,
            target_word_count: request.target_word_count,
            style: request.style.as_deref(),
            tone: request.tone.as_deref(),
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
            return Err(GeneratorError::Api { status, message });
        }

        let body: GenerateApiResponse = response.json().await?;
        Ok(GeneratedText {
            text: body.text,
            model: body.model,
        })
    }
}

/// Detection service client.
#[derive(Debug, Clone)]
pub struct HttpDetector {
    client: Client,
    base_url: String,
    api_key: String,
    timeout: Duration,
}

impl HttpDetector {
    /// Default per-call deadline for detection requests.
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(15);

    /// Create a new detector client.
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
impl Detector for HttpDetector {
    async fn detect(&self, text: &str) -> Result<DetectionScores, DetectorError> {
        let url = format!("{}/v1/detect", self.base_url);

        let response = self
            .client
            .post(&url)
            .timeout(self.timeout)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&DetectApiRequest { text })
            .send()
            .await?;

        if !response.status().is_success() {
            let (status, message) = read_error_body(response).await;
            return Err(DetectorError::Api { status, message });
        }

        let body: DetectApiResponse = response.json().await?;
        Ok(DetectionScores {
            originality: body.originality,
            ai_likelihood: body.ai_likelihood,
            plagiarism: body.plagiarism,
            confidence: body.confidence,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generator_client_trims_trailing_slash() {
        let client = HttpGenerator::new("http://localhost:8080/", "key", "quill-large");
        assert_eq!(client.base_url, "http://localhost:8080");
    }

    #[test]
    fn detector_client_trims_trailing_slash() {
        let client = HttpDetector::new("http://localhost:9090/", "key");
        assert_eq!(client.base_url, "http://localhost:9090");
    }

    #[test]
    fn generator_error_transience() {
        let rate_limited = GeneratorError::Api {
            status: 429,
            message: "slow down".to_string(),
        };
        let server_error = GeneratorError::Api {
            status: 503,
            message: "unavailable".to_string(),
        };
        let bad_request = GeneratorError::Api {
            status: 400,
            message: "bad prompt".to_string(),
        };
        let timed_out = GeneratorError::Timeout(Duration::from_secs(1));

        assert!(rate_limited.is_transient());
        assert!(server_error.is_transient());
        assert!(!bad_request.is_transient());
        assert!(timed_out.is_transient());
    }

    #[test]
    fn detector_error_transience() {
        let server_error = DetectorError::Api {
            status: 500,
            message: "boom".to_string(),
        };
        let unauthorized = DetectorError::Api {
            status: 401,
            message: "bad key".to_string(),
        };
        assert!(server_error.is_transient());
        assert!(!unauthorized.is_transient());
    }

    #[test]
    fn backoff_grows_with_attempts() {
        let base = Duration::from_millis(200);
        let second = retry_backoff(base, 2);
        let third = retry_backoff(base, 3);

        assert!(second >= Duration::from_millis(180) && second <= Duration::from_millis(220));
        assert!(third >= Duration::from_millis(360) && third <= Duration::from_millis(440));
        assert!(retry_backoff(base, 30) <= Duration::from_millis(5_500));
    }
}
