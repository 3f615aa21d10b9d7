//! Plans, generates, gates, and assembles documents.

use std::sync::Arc;
use std::time::Duration;

use quillforge_core::{Document, Section, SectionRole, Severity};

use crate::breaker::GeneratorBreaker;
use crate::client::{
    retry_backoff, Detector, DetectorPolicy, GeneratedText, Generator, GeneratorError,
    GeneratorRequest,
};
use crate::error::PipelineError;
use crate::gate::{QualityGate, RefinementStrategy, SeverityThresholds};
use crate::planner::{self, SectionPlan, SectionWeights};

/// Tuning for one pipeline instance.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    /// Section weights handed to the planner.
    pub weights: SectionWeights,
    /// Severity cutoffs for the quality gate.
    pub thresholds: SeverityThresholds,
    /// Refinement cycles allowed per section before it passes through.
    pub max_refinement_cycles: u32,
    /// Per-call deadline for generator calls.
    pub generator_call_timeout: Duration,
    /// Generator attempts per section call, including the first.
    pub generator_max_attempts: u32,
    /// Base delay of the generator retry backoff.
    pub generator_base_backoff: Duration,
    /// Timeout and retry budget for detector calls.
    pub detector: DetectorPolicy,
    /// Consecutive generator failures that open the circuit breaker.
    pub breaker_failure_threshold: u32,
    /// How long the breaker stays open before admitting a probe.
    pub breaker_cooldown: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            weights: SectionWeights::default(),
            thresholds: SeverityThresholds::default(),
            max_refinement_cycles: 2,
            generator_call_timeout: Duration::from_secs(60),
            generator_max_attempts: 3,
            generator_base_backoff: Duration::from_millis(500),
            detector: DetectorPolicy::default(),
            breaker_failure_threshold: 5,
            breaker_cooldown: Duration::from_secs(30),
        }
    }
}

/// A request for one generated document.
#[derive(Debug, Clone)]
pub struct PipelineRequest {
    /// What the document should be about.
    pub prompt: String,
    /// Requested total length in words.
    pub total_word_count: i64,
    /// Writing style hint.
    pub style: Option<String>,
    /// Tone hint.
    pub tone: Option<String>,
}

/// Drives planning, generation, gating, refinement, and assembly.
///
/// Sections own disjoint state and are generated concurrently; assembly
/// waits for all of them. A section whose generator call fails after its
/// bounded retries fails the whole call. Partial documents are never
/// returned as success.
pub struct GenerationPipeline {
    generator: Arc<dyn Generator>,
    gate: QualityGate,
    breaker: GeneratorBreaker,
    config: PipelineConfig,
}

impl GenerationPipeline {
    /// Create a pipeline over the given generator and detector.
    #[must_use]
    pub fn new(
        generator: Arc<dyn Generator>,
        detector: Arc<dyn Detector>,
        config: PipelineConfig,
    ) -> Self {
        let gate = QualityGate::new(detector, config.thresholds, config.detector);
        let breaker =
            GeneratorBreaker::new(config.breaker_failure_threshold, config.breaker_cooldown);
        Self {
            generator,
            gate,
            breaker,
            config,
        }
    }

    /// Generate a complete document for `request`.
    ///
    /// # Errors
    ///
    /// - [`PipelineError::InvalidWordCount`] when the total is not positive.
    /// - [`PipelineError::GenerationUnavailable`] when the breaker is open
    ///   or a generator call exhausted its retries on transient failures.
    /// - [`PipelineError::GenerationFailed`] when the generator rejected a
    ///   section outright.
    pub async fn generate(&self, request: &PipelineRequest) -> Result<Document, PipelineError> {
        let plans = planner::plan(request.total_word_count, &self.config.weights)?;
        tracing::debug!(
            total_words = request.total_word_count,
            sections = plans.len(),
            "planned document sections"
        );

        let work = plans
            .into_iter()
            .enumerate()
            .map(|(index, plan)| self.build_section(index, plan, request));
        let sections = futures::future::try_join_all(work).await?;

        let document = Document::assemble(sections);
        tracing::info!(
            words = document.word_count,
            sections = document.sections.len(),
            needs_review = document.any_section_requires_review(),
            "document assembled"
        );
        Ok(document)
    }

    async fn build_section(
        &self,
        index: usize,
        plan: SectionPlan,
        request: &PipelineRequest,
    ) -> Result<Section, PipelineError> {
        let mut section = Section::planned(index, plan.role, plan.target_word_count);

        let first_prompt = section_prompt(request, plan.role, plan.target_word_count);
        let generated = self
            .call_generator(index, &self.generator_request(first_prompt, plan, request))
            .await?;
        section.content = generated.text;

        let mut report = self.gate.evaluate(&section.content).await;
        while section.refinement_cycles < self.config.max_refinement_cycles {
            let prompt = match report.strategy {
                RefinementStrategy::Accept => break,
                RefinementStrategy::Regenerate => {
                    regeneration_prompt(request, plan.role, plan.target_word_count)
                }
                RefinementStrategy::Rewrite => {
                    rewrite_prompt(&section.content, plan.target_word_count)
                }
            };
            tracing::debug!(
                section = index,
                cycle = section.refinement_cycles + 1,
                severity = ?report.severity,
                "refining section"
            );

            let refined = self
                .call_generator(index, &self.generator_request(prompt, plan, request))
                .await?;
            section.content = refined.text;
            section.refinement_cycles += 1;
            report = self.gate.evaluate(&section.content).await;
        }

        if report.severity == Severity::High {
            // Refinement budget spent with scores still in the worst band.
            section.requires_review = true;
            tracing::warn!(
                section = index,
                cycles = section.refinement_cycles,
                "refinement exhausted, flagging section for review"
            );
        }
        section.scores = Some(report.scores);
        section.severity = Some(report.severity);
        Ok(section)
    }

    fn generator_request(
        &self,
        prompt: String,
        plan: SectionPlan,
        request: &PipelineRequest,
    ) -> GeneratorRequest {
        GeneratorRequest {
            prompt,
            target_word_count: plan.target_word_count,
            style: request.style.clone(),
            tone: request.tone.clone(),
        }
    }

    /// One generator call under the breaker, the per-call timeout, and
    /// bounded retry on transient failures.
    async fn call_generator(
        &self,
        section_index: usize,
        request: &GeneratorRequest,
    ) -> Result<GeneratedText, PipelineError> {
        let mut last_error: Option<GeneratorError> = None;

        for attempt in 1..=self.config.generator_max_attempts {
            if attempt > 1 {
                tokio::time::sleep(retry_backoff(self.config.generator_base_backoff, attempt))
                    .await;
            }

            if !self.breaker.try_acquire() {
                tracing::warn!(section = section_index, "generator breaker open, refusing call");
                return Err(PipelineError::GenerationUnavailable {
                    reason: "generator circuit breaker is open".to_string(),
                });
            }

            let outcome = match tokio::time::timeout(
                self.config.generator_call_timeout,
                self.generator.generate(request),
            )
            .await
            {
                Ok(result) => result,
                Err(_) => Err(GeneratorError::Timeout(self.config.generator_call_timeout)),
            };

            match outcome {
                Ok(text) => {
                    self.breaker.record_success();
                    return Ok(text);
                }
                Err(e) if e.is_transient() => {
                    self.breaker.record_failure();
                    tracing::warn!(
                        section = section_index,
                        attempt,
                        error = %e,
                        "generator call failed"
                    );
                    last_error = Some(e);
                }
                Err(e) => {
                    self.breaker.record_failure();
                    tracing::error!(
                        section = section_index,
                        error = %e,
                        "generator call failed fatally"
                    );
                    return Err(PipelineError::GenerationFailed {
                        section: section_index,
                        reason: e.to_string(),
                    });
                }
            }
        }

        let reason = last_error.map_or_else(
            || "generator retries exhausted".to_string(),
            |e| e.to_string(),
        );
        Err(PipelineError::GenerationUnavailable { reason })
    }
}

impl std::fmt::Debug for GenerationPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GenerationPipeline")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

fn section_prompt(request: &PipelineRequest, role: SectionRole, target_words: i64) -> String {
    format!(
        "Write the {} of the following piece in approximately {target_words} words.\n\n{}",
        role.label(),
        request.prompt
    )
}

fn regeneration_prompt(request: &PipelineRequest, role: SectionRole, target_words: i64) -> String {
    format!(
        "{}\n\nThe previous draft read as machine-generated. Write a completely new draft. \
         Avoid formulaic openers, repetitive sentence rhythm, stock transitions, and generic \
         summarizing phrases. Vary sentence length and use concrete detail.",
        section_prompt(request, role, target_words)
    )
}

fn rewrite_prompt(content: &str, target_words: i64) -> String {
    format!(
        "Rewrite the following text in approximately {target_words} words, keeping its \
         structure and argument. Rephrase the passages that read as generic or derivative; \
         leave the rest intact.\n\n{content}"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> PipelineRequest {
        PipelineRequest {
            prompt: "The history of tea".to_string(),
            total_word_count: 1_000,
            style: None,
            tone: None,
        }
    }

    #[test]
    fn section_prompts_carry_role_and_length() {
        let prompt = section_prompt(&request(), SectionRole::Intro, 150);
        assert!(prompt.contains("introduction"));
        assert!(prompt.contains("150 words"));
        assert!(prompt.contains("The history of tea"));
    }

    #[test]
    fn regeneration_prompt_adds_negative_constraints() {
        let prompt = regeneration_prompt(&request(), SectionRole::Body, 700);
        assert!(prompt.contains("completely new draft"));
        assert!(prompt.contains("Avoid"));
    }

    #[test]
    fn rewrite_prompt_keeps_the_draft() {
        let prompt = rewrite_prompt("the existing draft text", 700);
        assert!(prompt.contains("the existing draft text"));
        assert!(prompt.contains("keeping its"));
    }
}
