//! Error types surfaced by the generation pipeline.

use thiserror::Error;

/// Errors a pipeline call can surface to its caller.
///
/// Detector failures never appear here; the gate and the reconciler absorb
/// them with fallback scores.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The requested total word count is not positive.
    #[error("invalid word count: {requested}")]
    InvalidWordCount {
        /// The rejected word count.
        requested: i64,
    },

    /// The generator cannot currently serve requests.
    ///
    /// Raised when the circuit breaker is open or when a call exhausted its
    /// bounded retries on transient failures.
    #[error("generator unavailable: {reason}")]
    GenerationUnavailable {
        /// Why the generator was unreachable.
        reason: String,
    },

    /// A section failed fatally; no partial document is returned.
    #[error("generation failed on section {section}: {reason}")]
    GenerationFailed {
        /// Index of the section that failed.
        section: usize,
        /// The underlying failure.
        reason: String,
    },
}
