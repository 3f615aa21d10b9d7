//! The error taxonomy the engine surfaces to its embedder.

use quillforge_core::LedgerError;
use quillforge_pipeline::PipelineError;
use thiserror::Error;

/// Errors a generation request can fail with.
///
/// The embedding service maps these onto its own response codes: validation
/// failures are the caller's fault, ledger failures describe the account
/// state, and generation failures describe the external generator. Detector
/// problems never appear here; they degrade the verdict instead.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The request was rejected before any credits were touched.
    #[error("validation failed: {reason}")]
    ValidationFailed {
        /// Why the request was rejected.
        reason: String,
    },

    /// A ledger operation failed; see the inner error for whether the
    /// account lacked credits, hit a quota, or the store misbehaved.
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    /// Generation failed after credits were reserved; the reservation is
    /// rolled back before this surfaces.
    #[error(transparent)]
    Generation(#[from] PipelineError),
}
