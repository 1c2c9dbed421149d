//! Async orchestration of persona runs against a browser-automation engine.
//!
//! [`Orchestrator`] owns the run configuration, provider settings and the
//! collaborator factories. [`Orchestrator::run_persona`] drives one persona
//! through health check, attempts with failover, extraction, evaluation and
//! report writing. [`Orchestrator::run_batch`] sequences several personas.

pub mod agent;
pub mod batch;
pub mod evaluator;
pub mod events;
pub mod failover;
pub mod health;
pub mod hooks;
pub mod llm;
pub mod pacing;
pub mod session;

use std::sync::Arc;

use persona_core::events::RunEvent;
use persona_core::{
    Config, PersonaDefinition, ProviderSettings, ReportWriter, TaskBuilder, TestRunResult,
};
use tracing::{error, info};

use crate::agent::AgentFactory;
use crate::evaluator::Evaluator;
use crate::events::EventBus;
use crate::llm::ChatModelFactory;

pub use crate::session::SessionError;

pub struct Orchestrator {
    config: Config,
    settings: ProviderSettings,
    agents: Arc<dyn AgentFactory>,
    chat: Arc<dyn ChatModelFactory>,
    evaluator: Option<Arc<dyn Evaluator>>,
    reports: ReportWriter,
    events: Option<Arc<EventBus>>,
    site_preamble: Option<String>,
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("config", &self.config)
            .field("reports", &self.reports)
            .field("has_evaluator", &self.evaluator.is_some())
            .field("has_event_bus", &self.events.is_some())
            .field("has_site_preamble", &self.site_preamble.is_some())
            .finish_non_exhaustive()
    }
}

impl Orchestrator {
    pub fn new(
        config: Config,
        settings: ProviderSettings,
        agents: Arc<dyn AgentFactory>,
        chat: Arc<dyn ChatModelFactory>,
    ) -> Self {
        let reports = ReportWriter::new(config.results_dir.clone());
        Self {
            config,
            settings,
            agents,
            chat,
            evaluator: None,
            reports,
            events: None,
            site_preamble: None,
        }
    }

    pub fn with_evaluator(mut self, evaluator: Arc<dyn Evaluator>) -> Self {
        self.evaluator = Some(evaluator);
        self
    }

    pub fn with_event_bus(mut self, events: Arc<EventBus>) -> Self {
        self.events = Some(events);
        self
    }

    /// Site description placed at the top of every agent task.
    /// `{planner_url}` inside it is replaced with the configured URL.
    pub fn with_site_preamble(mut self, preamble: impl Into<String>) -> Self {
        self.site_preamble = Some(preamble.into());
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn settings(&self) -> &ProviderSettings {
        &self.settings
    }

    /// Task prompt for one persona.
    pub fn task_for(&self, persona: &PersonaDefinition) -> String {
        let mut builder = TaskBuilder::new(persona, &self.config.planner_url)
            .with_feedback_label(&self.config.feedback_link_label);
        if let Some(preamble) = &self.site_preamble {
            builder = builder.with_site_preamble(preamble);
        }
        builder.build()
    }

    fn publish(&self, event: RunEvent) {
        if let Some(bus) = &self.events {
            bus.publish(event);
        }
    }

    /// Persist `result`. Failures are logged, never raised.
    fn write_report(&self, result: &TestRunResult) {
        match self.reports.write(result) {
            Ok(path) => info!(
                persona_id = %result.persona_id,
                run_id = %result.run_id,
                path = %path.display(),
                "report saved"
            ),
            Err(e) => error!(
                persona_id = %result.persona_id,
                run_id = %result.run_id,
                error = %e,
                "failed to write report"
            ),
        }
    }
}
