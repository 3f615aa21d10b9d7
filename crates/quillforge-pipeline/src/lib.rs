//! Sectioned generation with per-section quality gating.
//!
//! The pipeline turns one request into a complete document:
//!
//! 1. **Plan**: split the target length into weighted sections
//!    ([`planner`]).
//! 2. **Generate**: request each section from the external generator, with
//!    a per-call timeout, bounded retry, and a circuit breaker ([`client`],
//!    [`breaker`]).
//! 3. **Gate**: score each section through the external detector and pick a
//!    refinement strategy per severity ([`gate`]).
//! 4. **Refine**: regenerate or rewrite flagged sections, up to a bounded
//!    number of cycles.
//! 5. **Assemble**: join accepted sections into a [`quillforge_core::Document`].
//! 6. **Reconcile**: merge section findings with a whole-document detection
//!    pass into one confidence-rated verdict ([`reconcile`]).
//!
//! Detector failures never fail a request; fallback scores stand in and the
//! degradation is recorded. Generator failures, once retries are spent, fail
//! the whole request: partial documents are never returned as success.
//!
//! ```no_run
//! use std::sync::Arc;
//! use quillforge_pipeline::{
//!     GenerationPipeline, HttpDetector, HttpGenerator, PipelineConfig, PipelineRequest,
//! };
//!
//! # async fn demo() -> Result<(), quillforge_pipeline::PipelineError> {
//! let generator = Arc::new(HttpGenerator::new("https://gen.internal", "api-key", "quill-large"));
//! let detector = Arc::new(HttpDetector::new("https://detect.internal", "api-key"));
//! let pipeline = GenerationPipeline::new(generator, detector, PipelineConfig::default());
//!
//! let document = pipeline
//!     .generate(&PipelineRequest {
//!         prompt: "The economics of urban rooftop farming".to_string(),
//!         total_word_count: 1_000,
//!         style: Some("persuasive".to_string()),
//!         tone: None,
//!     })
//!     .await?;
//! println!("{} words in {} sections", document.word_count, document.sections.len());
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod breaker;
pub mod client;
pub mod error;
pub mod gate;
pub mod pipeline;
pub mod planner;
pub mod reconcile;

pub use breaker::GeneratorBreaker;
pub use client::{
    Detector, DetectorError, DetectorPolicy, GeneratedText, Generator, GeneratorError,
    GeneratorRequest, HttpDetector, HttpGenerator,
};
pub use error::PipelineError;
pub use gate::{GateReport, QualityGate, RefinementStrategy, SeverityBand, SeverityThresholds};
pub use pipeline::{GenerationPipeline, PipelineConfig, PipelineRequest};
pub use planner::{plan, SectionPlan, SectionWeights};
pub use reconcile::Reconciler;
