//! Credit-safe document generation.
//!
//! The engine fronts the whole system: callers provision accounts, submit
//! generation requests, and read balances and history through [`Engine`].
//! Each request runs as a saga ([`orchestrator`]): validate, reserve credits,
//! generate and quality-gate the document, reconcile a verdict, then commit
//! the reservation. Any failure after the reservation compensates it, even
//! when the caller has already gone away.
//!
//! External collaborators are configured through [`EngineConfig`]: the
//! generator and detector are required, while the plan validator and usage
//! reporter are optional with built-in fallbacks ([`collab`]).
//!
//! ```no_run
//! use std::sync::Arc;
//! use quillforge_core::{PlanType, QualityTier, ToolKind, UserId};
//! use quillforge_engine::{Engine, EngineConfig, GenerationRequest};
//! use quillforge_store::MemoryStore;
//!
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! let engine = Engine::new(Arc::new(MemoryStore::new()), EngineConfig::from_env());
//!
//! let user_id = UserId::generate();
//! engine.provision_account(user_id, PlanType::Standard).await?;
//!
//! let result = engine
//!     .generate(GenerationRequest {
//!         user_id,
//!         prompt: "The ethics of autonomous shipping".to_string(),
//!         word_count: 1_200,
//!         tool: ToolKind::Essay,
//!         quality: QualityTier::Standard,
//!         style: None,
//!         tone: None,
//!     })
//!     .await?;
//! println!(
//!     "{} words, quality {:.1}",
//!     result.document.word_count, result.verdict.quality_score
//! );
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod collab;
pub mod config;
pub mod engine;
pub mod error;
pub mod orchestrator;

pub use collab::{
    HttpReporter, HttpValidator, NullReporter, PlanValidator, ReporterError, StoreValidator,
    UsageReport, UsageReporter, Validation, ValidationRequest, ValidatorError,
};
pub use config::EngineConfig;
pub use engine::{Engine, GenerationRequest, GenerationResult, GenerationStats};
pub use error::EngineError;
pub use orchestrator::Orchestrator;
