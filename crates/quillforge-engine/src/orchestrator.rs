//! The saga that drives one generation request end to end.
//!
//! A request moves through validation, credit reservation, generation,
//! reconciliation, and settlement. Once credits are held, every exit that is
//! not a commit rolls them back: failures spawn a detached compensation with
//! its own deadline, and so does the caller dropping the future mid-flight.

use std::sync::Arc;
use std::time::Duration;

use quillforge_core::{LedgerError, RequestId, UserId};
use quillforge_ledger::{CreditLedger, ReserveOutcome, ReserveRequest};
use quillforge_pipeline::{GenerationPipeline, PipelineRequest, Reconciler};

use crate::collab::{PlanValidator, UsageReport, UsageReporter, ValidationRequest};
use crate::engine::{GenerationRequest, GenerationResult, GenerationStats};
use crate::error::EngineError;

/// Saga phases, logged at every transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SagaState {
    Validating,
    Reserving,
    Generating,
    Reconciling,
    Committed,
    CompensatingRollback,
    Failed,
}

fn transition(request_id: RequestId, state: SagaState) {
    tracing::debug!(request_id = %request_id, state = ?state, "saga state");
}

fn elapsed_ms(elapsed: Duration) -> u64 {
    u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX)
}

/// Rolls the reservation back unless disarmed.
///
/// Armed right after a reserve succeeds and disarmed just before commit.
/// Dropping it while armed spawns the compensation on the current runtime,
/// detached from the request, so caller cancellation cannot strand credits.
/// The reservation's in-flight slot travels with it and is released only
/// when compensation finishes.
struct CompensationGuard {
    ledger: Arc<CreditLedger>,
    request_id: RequestId,
    user_id: UserId,
    outcome: Option<ReserveOutcome>,
    timeout: Duration,
}

impl CompensationGuard {
    fn arm(
        ledger: Arc<CreditLedger>,
        request_id: RequestId,
        user_id: UserId,
        outcome: ReserveOutcome,
        timeout: Duration,
    ) -> Self {
        Self {
            ledger,
            request_id,
            user_id,
            outcome: Some(outcome),
            timeout,
        }
    }

    /// Hand the reservation over to the commit path.
    fn disarm(&mut self) {
        self.outcome = None;
    }
}

impl Drop for CompensationGuard {
    fn drop(&mut self) {
        let Some(outcome) = self.outcome.take() else {
            return;
        };
        let ledger = Arc::clone(&self.ledger);
        let request_id = self.request_id;
        let user_id = self.user_id;
        let timeout = self.timeout;

        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            tracing::error!(
                request_id = %request_id,
                transaction_id = %outcome.transaction_id,
                "no runtime for compensation, reservation needs manual reconciliation"
            );
            return;
        };

        handle.spawn(async move {
            transition(request_id, SagaState::CompensatingRollback);
            let result = tokio::time::timeout(
                timeout,
                ledger.compensate(
                    &user_id,
                    &outcome.transaction_id,
                    outcome.credits_reserved,
                    outcome.words_reserved,
                ),
            )
            .await;

            match result {
                Ok(Ok(restored)) => tracing::info!(
                    request_id = %request_id,
                    transaction_id = %outcome.transaction_id,
                    balance = restored.new_balance,
                    "credits restored after failed generation"
                ),
                Ok(Err(LedgerError::AlreadyRolledBack { .. })) => tracing::debug!(
                    request_id = %request_id,
                    transaction_id = %outcome.transaction_id,
                    "reservation was already rolled back"
                ),
                Ok(Err(e)) => tracing::error!(
                    request_id = %request_id,
                    transaction_id = %outcome.transaction_id,
                    error = %e,
                    "compensation failed, reservation needs manual reconciliation"
                ),
                Err(_) => tracing::error!(
                    request_id = %request_id,
                    transaction_id = %outcome.transaction_id,
                    "compensation timed out, reservation needs manual reconciliation"
                ),
            }

            // Holds the in-flight slot until compensation finishes.
            drop(outcome);
        });
    }
}

/// Drives generation requests through the reserve, generate, reconcile,
/// commit lifecycle.
pub struct Orchestrator {
    ledger: Arc<CreditLedger>,
    pipeline: GenerationPipeline,
    reconciler: Reconciler,
    validator: Arc<dyn PlanValidator>,
    reporter: Arc<dyn UsageReporter>,
    compensation_timeout: Duration,
}

impl Orchestrator {
    /// Create an orchestrator over the given collaborators.
    pub fn new(
        ledger: Arc<CreditLedger>,
        pipeline: GenerationPipeline,
        reconciler: Reconciler,
        validator: Arc<dyn PlanValidator>,
        reporter: Arc<dyn UsageReporter>,
        compensation_timeout: Duration,
    ) -> Self {
        Self {
            ledger,
            pipeline,
            reconciler,
            validator,
            reporter,
            compensation_timeout,
        }
    }

    /// Run one request through the saga.
    ///
    /// # Errors
    ///
    /// - [`EngineError::ValidationFailed`] before any credits are touched.
    /// - [`EngineError::Ledger`] when the reservation is refused; there is
    ///   nothing to undo.
    /// - [`EngineError::Generation`] after a failed generation; the
    ///   reservation is rolled back before the error is returned to the
    ///   caller, with the rollback itself detached and deadline-bounded.
    pub async fn run(&self, request: GenerationRequest) -> Result<GenerationResult, EngineError> {
        let request_id = RequestId::generate();
        let started = std::time::Instant::now();

        transition(request_id, SagaState::Validating);
        let validation = self
            .validator
            .validate(&ValidationRequest {
                user_id: request.user_id,
                prompt_chars: request.prompt.chars().count(),
                requested_words: request.word_count,
                tool: request.tool,
            })
            .await
            .map_err(|e| EngineError::ValidationFailed {
                reason: e.to_string(),
            })?;

        transition(request_id, SagaState::Reserving);
        let reserve = self
            .ledger
            .reserve(ReserveRequest {
                user_id: request.user_id,
                word_count: request.word_count,
                plan: validation.plan,
                tool: request.tool,
                quality: request.quality,
                transaction_id: None,
            })
            .await?;
        let transaction_id = reserve.transaction_id;
        let credits_reserved = reserve.credits_reserved;
        let mut guard = CompensationGuard::arm(
            Arc::clone(&self.ledger),
            request_id,
            request.user_id,
            reserve,
            self.compensation_timeout,
        );

        transition(request_id, SagaState::Generating);
        let pipeline_request = PipelineRequest {
            prompt: request.prompt.clone(),
            total_word_count: request.word_count,
            style: request.style.clone(),
            tone: request.tone.clone(),
        };
        let document = match self.pipeline.generate(&pipeline_request).await {
            Ok(document) => document,
            Err(e) => {
                tracing::warn!(
                    request_id = %request_id,
                    transaction_id = %transaction_id,
                    error = %e,
                    "generation failed, rolling back reservation"
                );
                drop(guard);
                transition(request_id, SagaState::Failed);
                return Err(e.into());
            }
        };

        // Reconciliation never fails the request; a degraded verdict says so
        // in its confidence and recommendations.
        transition(request_id, SagaState::Reconciling);
        let verdict = self
            .reconciler
            .reconcile(&document, request.word_count)
            .await;

        guard.disarm();
        match self.ledger.commit(&request.user_id, &transaction_id).await {
            Ok(commit) => {
                transition(request_id, SagaState::Committed);
                let report = UsageReport {
                    user_id: request.user_id,
                    transaction_id,
                    tool: request.tool,
                    words: commit.words_delivered,
                    credits: commit.credits_used,
                };
                if let Err(e) = self.reporter.record(&report).await {
                    tracing::warn!(
                        request_id = %request_id,
                        transaction_id = %transaction_id,
                        error = %e,
                        "usage report failed"
                    );
                }
            }
            Err(e) => {
                // The document was delivered; an unsettled hold is operator
                // debt, not a caller-visible failure.
                tracing::error!(
                    request_id = %request_id,
                    transaction_id = %transaction_id,
                    error = %e,
                    "commit failed, reservation left unsettled"
                );
            }
        }

        let stats = GenerationStats {
            section_count: document.sections.len(),
            refinement_cycles: document.sections.iter().map(|s| s.refinement_cycles).sum(),
            credits_used: credits_reserved,
            elapsed: started.elapsed(),
        };
        tracing::info!(
            request_id = %request_id,
            transaction_id = %transaction_id,
            words = document.word_count,
            credits = stats.credits_used,
            quality = verdict.quality_score,
            acceptable = verdict.is_acceptable,
            review = verdict.requires_review,
            elapsed_ms = elapsed_ms(stats.elapsed),
            "generation complete"
        );

        Ok(GenerationResult {
            document,
            verdict,
            stats,
        })
    }
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("compensation_timeout", &self.compensation_timeout)
            .finish_non_exhaustive()
    }
}
