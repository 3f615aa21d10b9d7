//! The engine facade: collaborator wiring, account provisioning, and the
//! generation entry point.

use std::sync::Arc;
use std::time::Duration;

use quillforge_core::{
    AccountBalance, Document, FinalVerdict, LedgerError, PlanType, QualityTier, Reservation,
    ToolKind, UserId,
};
use quillforge_ledger::{CreditLedger, QuotaTracker};
use quillforge_pipeline::{
    Detector, GenerationPipeline, Generator, HttpDetector, HttpGenerator, Reconciler,
};
use quillforge_store::AccountStore;

use crate::collab::{
    HttpReporter, HttpValidator, NullReporter, PlanValidator, StoreValidator, UsageReporter,
};
use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::orchestrator::Orchestrator;

/// One generation request as submitted by a caller.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    /// The requesting user.
    pub user_id: UserId,
    /// What the document should be about.
    pub prompt: String,
    /// Requested length in words.
    pub word_count: i64,
    /// The tool the request targets.
    pub tool: ToolKind,
    /// Quality tier the request is billed at.
    pub quality: QualityTier,
    /// Writing style hint.
    pub style: Option<String>,
    /// Tone hint.
    pub tone: Option<String>,
}

/// A delivered document with its quality verdict and run statistics.
#[derive(Debug, Clone)]
pub struct GenerationResult {
    /// The assembled document.
    pub document: Document,
    /// The reconciled quality verdict.
    pub verdict: FinalVerdict,
    /// Run statistics.
    pub stats: GenerationStats,
}

/// Statistics for one completed run.
#[derive(Debug, Clone)]
pub struct GenerationStats {
    /// Sections the document was planned into.
    pub section_count: usize,
    /// Refinement cycles spent across all sections.
    pub refinement_cycles: u32,
    /// Credits charged for the run.
    pub credits_used: i64,
    /// Wall-clock duration of the run.
    pub elapsed: Duration,
}

/// The generation engine.
///
/// Owns the ledger, the pipeline, and the saga orchestrator, and exposes the
/// operations callers need: provisioning, generation, balance and history
/// reads.
pub struct Engine {
    store: Arc<dyn AccountStore>,
    ledger: Arc<CreditLedger>,
    quota: QuotaTracker,
    orchestrator: Orchestrator,
    config: EngineConfig,
}

impl Engine {
    /// Build an engine over the given store, wiring HTTP collaborators from
    /// the configuration.
    ///
    /// The validator and reporter are optional: without a URL and key the
    /// engine validates against the account store and drops usage events,
    /// logging each fallback once at startup.
    #[must_use]
    pub fn new(store: Arc<dyn AccountStore>, config: EngineConfig) -> Self {
        let generator: Arc<dyn Generator> = Arc::new(HttpGenerator::new(
            config.generator_url.clone(),
            config.generator_api_key.clone(),
            config.generator_model.clone(),
        ));
        let detector: Arc<dyn Detector> = Arc::new(HttpDetector::new(
            config.detector_url.clone(),
            config.detector_api_key.clone(),
        ));

        let validator: Arc<dyn PlanValidator> = match config
            .validator_url
            .clone()
            .zip(config.validator_api_key.clone())
        {
            Some((url, key)) => {
                tracing::info!(url = %url, "plan validator enabled");
                Arc::new(HttpValidator::new(url, key))
            }
            None => {
                tracing::warn!(
                    "plan validator not configured - validating against the account store"
                );
                Arc::new(StoreValidator::new(
                    Arc::clone(&store),
                    config.max_request_words,
                    config.max_prompt_chars,
                    config.ledger.cost_table.free_monthly_word_cap,
                ))
            }
        };

        let reporter: Arc<dyn UsageReporter> = match config
            .reporter_url
            .clone()
            .zip(config.reporter_api_key.clone())
        {
            Some((url, key)) => {
                tracing::info!(url = %url, "usage reporter enabled");
                Arc::new(HttpReporter::new(url, key))
            }
            None => {
                tracing::warn!(
                    "usage reporter not configured - usage events will not be forwarded"
                );
                Arc::new(NullReporter)
            }
        };

        Self::with_collaborators(store, generator, detector, validator, reporter, config)
    }

    /// Build an engine with explicit collaborators.
    ///
    /// [`Engine::new`] routes through this after constructing the HTTP
    /// clients; tests inject fakes here.
    #[must_use]
    pub fn with_collaborators(
        store: Arc<dyn AccountStore>,
        generator: Arc<dyn Generator>,
        detector: Arc<dyn Detector>,
        validator: Arc<dyn PlanValidator>,
        reporter: Arc<dyn UsageReporter>,
        config: EngineConfig,
    ) -> Self {
        let ledger = Arc::new(CreditLedger::new(
            Arc::clone(&store),
            config.ledger.clone(),
        ));
        let pipeline = GenerationPipeline::new(
            generator,
            Arc::clone(&detector),
            config.pipeline.clone(),
        );
        let reconciler = Reconciler::new(
            detector,
            config.pipeline.thresholds,
            config.pipeline.detector,
        );
        let orchestrator = Orchestrator::new(
            Arc::clone(&ledger),
            pipeline,
            reconciler,
            validator,
            reporter,
            config.compensation_timeout,
        );
        let quota = QuotaTracker::new(Arc::clone(&store));

        Self {
            store,
            ledger,
            quota,
            orchestrator,
            config,
        }
    }

    /// Generate one document, charging the user's balance.
    ///
    /// Runs the full saga: validation, credit reservation, sectioned
    /// generation with quality gating, reconciliation, and settlement. A
    /// failure after the reservation rolls the credits back before this
    /// returns.
    ///
    /// # Errors
    ///
    /// See [`EngineError`] for the failure taxonomy.
    pub async fn generate(
        &self,
        request: GenerationRequest,
    ) -> Result<GenerationResult, EngineError> {
        self.orchestrator.run(request).await
    }

    /// Create an account with its signup grant plus the plan's first monthly
    /// grant.
    ///
    /// Provisioning an existing user returns the current record unchanged.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub async fn provision_account(
        &self,
        user_id: UserId,
        plan: PlanType,
    ) -> Result<AccountBalance, LedgerError> {
        if let Some(existing) = self.store.get_balance(&user_id).await? {
            tracing::debug!(user_id = %user_id, "account already provisioned");
            return Ok(existing);
        }

        let initial_credits =
            self.config.ledger.cost_table.signup_grant_credits + plan.monthly_credit_grant();
        let account = AccountBalance::new(user_id, plan, initial_credits);
        self.store.put_balance(&account).await?;
        tracing::info!(
            user_id = %user_id,
            plan = ?plan,
            credits = initial_credits,
            "account provisioned"
        );
        Ok(account)
    }

    /// Get a user's balance record.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::UserNotFound`] if no account exists, or an
    /// error if the store fails.
    pub async fn balance_of(&self, user_id: &UserId) -> Result<AccountBalance, LedgerError> {
        self.ledger.balance_of(user_id).await
    }

    /// List a user's reservations, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub async fn history(
        &self,
        user_id: &UserId,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Reservation>, LedgerError> {
        self.ledger.list_reservations(user_id, limit, offset).await
    }

    /// Read-side view of monthly usage counters.
    #[must_use]
    pub fn quota(&self) -> &QuotaTracker {
        &self.quota
    }

    /// The ledger the engine settles against.
    #[must_use]
    pub fn ledger(&self) -> &CreditLedger {
        &self.ledger
    }

    /// The engine's configuration.
    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
