//! Resilient controller for one persona run.
//!
//! Stages: health check, then agent attempts (create, run) with failover
//! between chain entries, then extraction, evaluation and report writing.
//! Every run ends in a [`TestRunResult`]; errors never escape to the caller.

use persona_core::backoff::backoff_delay;
use persona_core::chain::build_chain;
use persona_core::events::{EventType, FailoverPayload, RunEvent};
use persona_core::extract;
use persona_core::{
    AgentHistory, Guidance, LoopDetector, PersonaDefinition, PhaseTracker, Provider, RunStatus,
    TestRunResult,
};
use serde_json::json;
use thiserror::Error;
use tokio::time::timeout;
use tracing::{error, info, warn};

use crate::agent::{AgentError, AgentRequest, ModelBinding};
use crate::failover::{classify_failure, needs_failover, FailoverState, FailureKind};
use crate::health::{self, HealthCheckPolicy, HealthError};
use crate::hooks::SessionHooks;
use crate::llm::LlmError;
use crate::pacing::StepPacer;
use crate::Orchestrator;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("health check failed: {0}")]
    Health(#[from] HealthError),
    #[error("model chain is empty")]
    EmptyChain,
    #[error("all providers exhausted: {last_error}")]
    Exhausted { last_error: String },
    #[error("timed out after {0}s")]
    Timeout(u64),
    #[error(transparent)]
    Agent(#[from] AgentError),
}

pub type Result<T> = std::result::Result<T, SessionError>;

/// Identity of the run, threaded through logging and events.
#[derive(Debug, Clone, Copy)]
struct RunScope<'a> {
    persona: &'a PersonaDefinition,
    batch_id: Option<&'a str>,
    run_id: &'a str,
}

/// What the attempts produced, kept even when the run fails or times out.
#[derive(Debug, Default)]
struct Progress {
    attempts: u32,
    model: Option<String>,
    history: Option<AgentHistory>,
    steps_seen: u32,
    thoughts: Vec<String>,
}

impl Orchestrator {
    /// Run one persona to a terminal status and persist its report.
    ///
    /// `start_model` picks the first primary when it names a chain entry;
    /// otherwise the chain head is used.
    pub async fn run_persona(
        &self,
        persona: &PersonaDefinition,
        batch_id: Option<&str>,
        start_model: Option<&str>,
    ) -> TestRunResult {
        let mut result = TestRunResult::started(persona, batch_id);
        result.config_snapshot = serde_json::to_value(&self.config).ok();
        let run_id = result.run_id.clone();
        let scope = RunScope {
            persona,
            batch_id,
            run_id: &run_id,
        };
        info!(persona_id = %persona.id, run_id = %run_id, "persona run started");

        let chain = build_chain(&self.settings);
        let mut failover = FailoverState::new(&chain, &self.settings);
        let mut tracker = PhaseTracker::new(persona.conversation_goals.len());
        let mut progress = Progress::default();

        let outcome = self
            .drive(
                scope,
                &chain,
                start_model,
                &mut tracker,
                &mut failover,
                &mut progress,
            )
            .await;

        result.exhausted_providers = failover.exhausted_providers();
        result.llm_model_used = progress.model.clone();

        if progress.attempts > 0 {
            self.emit(scope, RunEvent::new(EventType::StageExtractResults));
            fill_execution(&mut result, persona, &tracker, progress);
        }

        let (status, message) = match outcome {
            Ok(()) => (RunStatus::Completed, None),
            Err(e @ SessionError::Timeout(_)) => (RunStatus::Timeout, Some(e.to_string())),
            Err(e) => (RunStatus::Failed, Some(e.to_string())),
        };
        result.finish(status, message);

        match result.status {
            RunStatus::Completed => info!(
                persona_id = %persona.id,
                run_id = %run_id,
                steps = result.total_steps.unwrap_or_default(),
                phase_furthest = result.phase_furthest.as_deref().unwrap_or("none"),
                "persona run completed"
            ),
            _ => error!(
                persona_id = %persona.id,
                run_id = %run_id,
                status = result.status.as_str(),
                error = result.error_message.as_deref().unwrap_or_default(),
                "persona run did not complete"
            ),
        }

        if should_evaluate(&result) {
            self.evaluate(scope, &mut result).await;
        }

        self.emit(scope, RunEvent::new(EventType::StageWriteReport));
        self.write_report(&result);

        let terminal = match result.status {
            RunStatus::Completed => EventType::PersonaCompleted,
            RunStatus::Timeout => EventType::PersonaTimeout,
            RunStatus::Failed | RunStatus::Running => EventType::PersonaFailed,
        };
        self.emit(
            scope,
            RunEvent::new(terminal).data(json!({
                "run_id": run_id,
                "status": result.status.as_str(),
                "error": result.error_message,
                "duration_seconds": result.duration_seconds,
                "phase_furthest": result.phase_furthest,
                "exhausted_providers": result.exhausted_providers,
            })),
        );
        result
    }

    async fn drive<'c>(
        &self,
        scope: RunScope<'_>,
        chain: &'c [String],
        start_model: Option<&str>,
        tracker: &mut PhaseTracker,
        failover: &mut FailoverState<'c>,
        progress: &mut Progress,
    ) -> Result<()> {
        let persona = scope.persona;

        self.emit(scope, RunEvent::new(EventType::StageHealthCheck));
        let policy = HealthCheckPolicy::from_config(&self.config);
        health::check(&self.settings, self.chat.as_ref(), policy).await?;

        let mut model = start_model
            .and_then(|m| chain.iter().find(|entry| *entry == m))
            .or_else(|| chain.first())
            .map(String::as_str)
            .ok_or(SessionError::EmptyChain)?;

        let guidance = Guidance::new(persona.language, self.config.feedback_link_label.as_str());
        let task = self.task_for(persona);

        loop {
            progress.attempts += 1;
            progress.model = Some(model.to_string());
            let provider = failover.provider_of(model);

            self.emit(scope, RunEvent::new(EventType::StageCreateAgent));
            info!(
                persona_id = %persona.id,
                run_id = scope.run_id,
                model,
                provider = %provider,
                attempt = progress.attempts,
                "creating agent"
            );

            let primary = match self.bind(model, provider) {
                Ok(binding) => binding,
                Err(e) => {
                    let error = e.to_string();
                    match self
                        .fail_over(scope, failover, model, FailureKind::ModelFailure, &error)
                        .await
                    {
                        Some(next) => {
                            model = next;
                            continue;
                        }
                        None => return Err(SessionError::Exhausted { last_error: error }),
                    }
                }
            };
            let fallback = failover.select_fallback(model).and_then(|m| {
                let provider = failover.provider_of(m);
                match self.bind(m, provider) {
                    Ok(binding) => Some(binding),
                    Err(e) => {
                        warn!(
                            model = m,
                            provider = %provider,
                            error = %e,
                            "fallback model unavailable"
                        );
                        None
                    }
                }
            });

            let mut session = self
                .agents
                .create(AgentRequest {
                    persona,
                    config: &self.config,
                    run_id: scope.run_id,
                    task: &task,
                    primary,
                    fallback,
                })
                .await?;

            self.emit(scope, RunEvent::new(EventType::StageRunAgent));
            info!(
                persona_id = %persona.id,
                run_id = scope.run_id,
                model,
                max_steps = self.config.max_steps,
                timeout_sec = self.config.timeout_per_persona_sec,
                "running agent"
            );

            let pacer = StepPacer::new(
                self.config.min_step_interval(),
                self.config.failure_backoff_base(),
                self.config.failure_backoff_cap(),
            );
            let mut hooks = SessionHooks::new(
                persona,
                tracker,
                LoopDetector::new(self.config.loop_detector()),
                pacer,
                &guidance,
            )
            .with_events(self.events.as_deref(), scope.batch_id);

            let outcome = timeout(
                self.config.persona_timeout(),
                session.run(self.config.max_steps, &mut hooks),
            )
            .await;

            progress.steps_seen = hooks.steps_seen();
            let loops = hooks.loops_detected();
            progress.thoughts = hooks.into_thoughts();

            if let Err(e) = session.close().await {
                warn!(
                    persona_id = %persona.id,
                    run_id = scope.run_id,
                    error = %e,
                    "failed to close browser session"
                );
            }

            let history = match outcome {
                Err(_) => return Err(SessionError::Timeout(self.config.timeout_per_persona_sec)),
                Ok(Err(e)) => return Err(e.into()),
                Ok(Ok(history)) => history,
            };

            let retry = needs_failover(
                history.num_actions(),
                history.is_done,
                history.has_errors(),
                self.config.min_useful_steps,
            );
            info!(
                persona_id = %persona.id,
                run_id = scope.run_id,
                model,
                actions = history.num_actions(),
                is_done = history.is_done,
                loops_detected = loops,
                "attempt finished"
            );

            let error = history.first_error().unwrap_or("unknown error").to_string();
            progress.history = Some(history);
            if !retry {
                return Ok(());
            }

            let kind = classify_failure(&error);
            match self.fail_over(scope, failover, model, kind, &error).await {
                Some(next) => model = next,
                None => return Err(SessionError::Exhausted { last_error: error }),
            }
        }
    }

    fn bind(&self, model: &str, provider: Provider) -> std::result::Result<ModelBinding, LlmError> {
        let api_key = self.settings.api_key(provider).unwrap_or_default();
        let client = self.chat.create(provider, model, api_key)?;
        Ok(ModelBinding {
            model: model.to_string(),
            provider,
            client,
        })
    }

    /// Record a failed attempt and pick the next primary, cooling down first
    /// when the failure was a rate limit.
    async fn fail_over<'c>(
        &self,
        scope: RunScope<'_>,
        failover: &mut FailoverState<'c>,
        model: &str,
        kind: FailureKind,
        error: &str,
    ) -> Option<&'c str> {
        let provider = failover.provider_of(model);
        failover.record_failure(model, kind);
        warn!(
            persona_id = %scope.persona.id,
            run_id = scope.run_id,
            model,
            provider = %provider,
            kind = kind.as_str(),
            error,
            "attempt failed"
        );

        if failover.is_provider_exhausted(provider) {
            self.emit(
                scope,
                RunEvent::new(EventType::ProviderExhausted).data(json!({
                    "provider": provider.as_str(),
                    "model": model,
                    "reason": kind.as_str(),
                })),
            );
        }

        let Some(next) = failover.next_candidate() else {
            error!(
                persona_id = %scope.persona.id,
                run_id = scope.run_id,
                exhausted = ?failover.exhausted_providers(),
                "model chain exhausted"
            );
            return None;
        };

        if kind == FailureKind::RateLimit {
            let pause = self.config.rate_limit_cooldown();
            let cooldown = backoff_delay(1, pause, pause);
            info!(
                persona_id = %scope.persona.id,
                provider = %provider,
                cooldown_sec = cooldown.as_secs(),
                "rate limited, cooling down before backup"
            );
            tokio::time::sleep(cooldown).await;
        }

        let to_provider = failover.provider_of(next);
        info!(
            persona_id = %scope.persona.id,
            run_id = scope.run_id,
            from = model,
            to = next,
            to_provider = %to_provider,
            "failing over"
        );
        self.emit(
            scope,
            RunEvent::new(EventType::Failover).payload(&FailoverPayload {
                from_model: model.to_string(),
                from_provider: provider,
                to_model: next.to_string(),
                to_provider,
                reason: kind.as_str().to_string(),
            }),
        );
        Some(next)
    }

    async fn evaluate(&self, scope: RunScope<'_>, result: &mut TestRunResult) {
        let Some(evaluator) = &self.evaluator else {
            return;
        };
        self.emit(scope, RunEvent::new(EventType::StageEvaluate));
        match evaluator.evaluate(result, scope.persona).await {
            Ok(evaluation) => {
                result.merge_evaluation(&evaluation);
                info!(
                    persona_id = %scope.persona.id,
                    run_id = scope.run_id,
                    overall = result.score_overall,
                    "evaluation merged"
                );
            }
            Err(e) => warn!(
                persona_id = %scope.persona.id,
                run_id = scope.run_id,
                error = %e,
                "evaluation failed"
            ),
        }
    }

    fn emit(&self, scope: RunScope<'_>, event: RunEvent) {
        let event = event.persona(scope.persona.id.as_str());
        let event = match scope.batch_id {
            Some(batch_id) => event.batch(batch_id),
            None => event,
        };
        self.publish(event);
    }
}

/// Timeouts are worth evaluating only when some phase was reached.
fn should_evaluate(result: &TestRunResult) -> bool {
    match result.status {
        RunStatus::Completed => true,
        RunStatus::Timeout => !result.phases_reached.is_empty(),
        RunStatus::Failed | RunStatus::Running => false,
    }
}

fn fill_execution(
    result: &mut TestRunResult,
    persona: &PersonaDefinition,
    tracker: &PhaseTracker,
    progress: Progress,
) {
    let history = progress.history.unwrap_or_default();

    result.phases_reached = extract::phases_reached(&history, persona, Some(tracker));
    result.phase_furthest = Some(extract::phase_furthest(&result.phases_reached));
    result.total_steps = Some(if history.num_actions() > 0 {
        history.num_actions() as u32
    } else {
        progress.steps_seen
    });
    result.total_messages = Some(extract::count_messages(&history));
    result.widgets_interacted = extract::detect_widgets(&history);
    result.conversation_log = history
        .extracted_content
        .iter()
        .flatten()
        .filter(|c| !c.is_empty())
        .cloned()
        .collect();
    result.agent_thoughts = if history.thoughts.is_empty() {
        progress.thoughts
    } else {
        history.thoughts
    };
    result.screenshot_paths = history.screenshots;
}
