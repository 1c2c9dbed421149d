//! Sequential batch execution.
//!
//! Personas run one at a time with a cooldown between runs. When a run
//! leaves every configured provider exhausted, the rest of the batch is
//! recorded as skipped instead of being attempted.

use persona_core::chain::{build_chain, first_model_for, provider_pool};
use persona_core::events::{EventType, RunEvent};
use persona_core::{Id, PersonaDefinition, Provider, RunStatus, TestRunResult};
use serde_json::json;
use tracing::{info, warn};

use crate::Orchestrator;

/// The previous run exhausted every provider in the pool.
pub fn pool_exhausted(previous: &TestRunResult, pool: &[Provider]) -> bool {
    !pool.is_empty() && pool.iter().all(|p| previous.exhausted_providers.contains(p))
}

impl Orchestrator {
    /// Run `personas` in order. Returns exactly one result per persona.
    pub async fn run_batch(&self, personas: &[PersonaDefinition]) -> Vec<TestRunResult> {
        let batch_id = format!("batch-{}", Id::short());
        let chain = build_chain(&self.settings);
        let pool = provider_pool(&chain, &self.settings);

        info!(
            batch_id = %batch_id,
            personas = personas.len(),
            providers = pool.len(),
            rotate = self.config.rotate_providers,
            "batch started"
        );
        self.publish(RunEvent::new(EventType::BatchStarted).batch(batch_id.as_str()).data(json!({
            "personas": personas.iter().map(|p| p.id.as_str()).collect::<Vec<_>>(),
            "providers": pool.iter().map(Provider::as_str).collect::<Vec<_>>(),
        })));

        let mut results: Vec<TestRunResult> = Vec::with_capacity(personas.len());
        for (index, persona) in personas.iter().enumerate() {
            let abort = results.last().is_some_and(|prev| pool_exhausted(prev, &pool));
            if abort {
                let remaining = &personas[index..];
                warn!(
                    batch_id = %batch_id,
                    skipped = remaining.len(),
                    "all providers exhausted, skipping remaining personas"
                );
                for skipped in remaining {
                    let result = TestRunResult::skipped(skipped, Some(&batch_id));
                    self.write_report(&result);
                    self.publish(
                        RunEvent::new(EventType::PersonaFailed)
                            .persona(skipped.id.as_str())
                            .batch(batch_id.as_str())
                            .data(json!({
                                "run_id": result.run_id,
                                "status": result.status.as_str(),
                                "error": result.error_message,
                            })),
                    );
                    results.push(result);
                }
                break;
            }

            if index > 0 {
                let cooldown = self.config.cooldown_between_runs();
                if !cooldown.is_zero() {
                    info!(
                        batch_id = %batch_id,
                        cooldown_sec = cooldown.as_secs(),
                        "cooling down between runs"
                    );
                    tokio::time::sleep(cooldown).await;
                }
            }

            let start_model = if self.config.rotate_providers && !pool.is_empty() {
                first_model_for(&chain, pool[index % pool.len()], &self.settings)
            } else {
                None
            };
            info!(
                batch_id = %batch_id,
                persona_id = %persona.id,
                position = index + 1,
                total = personas.len(),
                start_model = start_model.unwrap_or("chain head"),
                "starting persona"
            );
            results.push(self.run_persona(persona, Some(&batch_id), start_model).await);
        }

        let count = |status: RunStatus| results.iter().filter(|r| r.status == status).count();
        let (completed, failed, timeout) = (
            count(RunStatus::Completed),
            count(RunStatus::Failed),
            count(RunStatus::Timeout),
        );
        info!(batch_id = %batch_id, completed, failed, timeout, "batch completed");
        self.publish(RunEvent::new(EventType::BatchCompleted).batch(batch_id.as_str()).data(json!({
            "total": results.len(),
            "completed": completed,
            "failed": failed,
            "timeout": timeout,
        })));
        results
    }
}
