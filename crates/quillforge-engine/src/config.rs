//! Engine configuration.

use std::time::Duration;

use quillforge_ledger::LedgerConfig;
use quillforge_pipeline::PipelineConfig;

/// Default cap on the words a single request may ask for.
pub const DEFAULT_MAX_REQUEST_WORDS: i64 = 10_000;

/// Default cap on prompt length, in characters.
pub const DEFAULT_MAX_PROMPT_CHARS: usize = 10_000;

/// Default deadline for a detached compensation task.
pub const DEFAULT_COMPENSATION_TIMEOUT: Duration = Duration::from_secs(60);

/// Engine configuration loaded from environment variables.
///
/// The validator and reporter collaborators are optional: without a URL and
/// key the engine validates against account records directly and drops usage
/// events, logging the fallback at startup.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Generation service base URL (default: `http://localhost:8080`).
    pub generator_url: String,

    /// Generation service API key.
    pub generator_api_key: String,

    /// Model name sent with every generation request.
    pub generator_model: String,

    /// Detection service base URL (default: `http://localhost:8081`).
    pub detector_url: String,

    /// Detection service API key.
    pub detector_api_key: String,

    /// Plan validator base URL (optional).
    pub validator_url: Option<String>,

    /// Plan validator API key (optional).
    pub validator_api_key: Option<String>,

    /// Usage reporter base URL (optional).
    pub reporter_url: Option<String>,

    /// Usage reporter API key (optional).
    pub reporter_api_key: Option<String>,

    /// Largest word count a single request may ask for.
    pub max_request_words: i64,

    /// Largest prompt accepted, in characters.
    pub max_prompt_chars: usize,

    /// Deadline for the detached compensation task after a failed generation.
    pub compensation_timeout: Duration,

    /// Credit ledger configuration, including the cost table.
    pub ledger: LedgerConfig,

    /// Generation pipeline configuration.
    pub pipeline: PipelineConfig,
}

impl EngineConfig {
    /// Load configuration from environment variables, defaulting anything
    /// unset.
    #[must_use]
    pub fn from_env() -> Self {
        Self {
            generator_url: std::env::var("QUILLFORGE_GENERATOR_URL")
                .unwrap_or_else(|_| "http://localhost:8080".into()),
            generator_api_key: std::env::var("QUILLFORGE_GENERATOR_API_KEY").unwrap_or_default(),
            generator_model: std::env::var("QUILLFORGE_GENERATOR_MODEL")
                .unwrap_or_else(|_| "quill-standard".into()),
            detector_url: std::env::var("QUILLFORGE_DETECTOR_URL")
                .unwrap_or_else(|_| "http://localhost:8081".into()),
            detector_api_key: std::env::var("QUILLFORGE_DETECTOR_API_KEY").unwrap_or_default(),
            validator_url: std::env::var("QUILLFORGE_VALIDATOR_URL").ok(),
            validator_api_key: std::env::var("QUILLFORGE_VALIDATOR_API_KEY").ok(),
            reporter_url: std::env::var("QUILLFORGE_REPORTER_URL").ok(),
            reporter_api_key: std::env::var("QUILLFORGE_REPORTER_API_KEY").ok(),
            max_request_words: std::env::var("QUILLFORGE_MAX_REQUEST_WORDS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_MAX_REQUEST_WORDS),
            max_prompt_chars: std::env::var("QUILLFORGE_MAX_PROMPT_CHARS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_MAX_PROMPT_CHARS),
            compensation_timeout: std::env::var("QUILLFORGE_COMPENSATION_TIMEOUT_SECONDS")
                .ok()
                .and_then(|s| s.parse().ok())
                .map_or(DEFAULT_COMPENSATION_TIMEOUT, Duration::from_secs),
            ledger: LedgerConfig::default(),
            pipeline: PipelineConfig::default(),
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            generator_url: "http://localhost:8080".into(),
            generator_api_key: String::new(),
            generator_model: "quill-standard".into(),
            detector_url: "http://localhost:8081".into(),
            detector_api_key: String::new(),
            validator_url: None,
            validator_api_key: None,
            reporter_url: None,
            reporter_api_key: None,
            max_request_words: DEFAULT_MAX_REQUEST_WORDS,
            max_prompt_chars: DEFAULT_MAX_PROMPT_CHARS,
            compensation_timeout: DEFAULT_COMPENSATION_TIMEOUT,
            ledger: LedgerConfig::default(),
            pipeline: PipelineConfig::default(),
        }
    }
}
