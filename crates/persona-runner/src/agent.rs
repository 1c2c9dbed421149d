//! Contracts with the browser-automation engine.
//!
//! The engine drives the page and the model. The runner only supplies the
//! chat clients, observes every step and gets two override points: a
//! pre-step guidance hook and a last-step forced-done hook.

use std::sync::Arc;

use async_trait::async_trait;
use persona_core::{AgentHistory, Config, ModelAction, PersonaDefinition, Provider};
use thiserror::Error;

use crate::llm::{ChatClient, LlmError};

#[derive(Debug, Error)]
pub enum AgentError {
    #[error("failed to create agent: {0}")]
    Create(String),
    #[error("agent step failed: {0}")]
    Step(String),
    #[error("browser error: {0}")]
    Browser(String),
    #[error(transparent)]
    Llm(#[from] LlmError),
}

pub type Result<T> = std::result::Result<T, AgentError>;

/// What the engine reports after each step, including failed ones.
#[derive(Debug, Clone, Default)]
pub struct StepTelemetry {
    /// 1-based.
    pub step_number: u32,
    pub url: Option<String>,
    pub actions: Vec<ModelAction>,
    pub thinking: Option<String>,
    pub extracted_content: Option<String>,
    pub error: Option<String>,
    /// Consecutive failed steps up to and including this one.
    pub consecutive_failures: u32,
}

impl StepTelemetry {
    pub fn action_names(&self) -> Vec<String> {
        self.actions.iter().map(|a| a.name.clone()).collect()
    }
}

/// Budget position passed to the override hooks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepInfo {
    /// 0-based.
    pub step_number: u32,
    pub max_steps: u32,
}

impl StepInfo {
    pub fn is_last_step(&self) -> bool {
        self.step_number + 1 >= self.max_steps
    }

    /// Fraction of the step allowance used once this step runs.
    pub fn budget_ratio(&self) -> f64 {
        if self.max_steps == 0 {
            return 1.0;
        }
        f64::from(self.step_number + 1) / f64::from(self.max_steps)
    }
}

/// Answer of the forced-done hook.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ForcedDone {
    /// Let the engine switch to its terminal-only action schema.
    Allow,
    /// Keep every action available and inject `message`.
    KeepFullActions { message: String },
}

/// Step hooks the engine must call.
///
/// `on_budget_warning` runs before every model call, at the point where the
/// engine would add its own budget warning. `on_forced_done` runs only on the
/// final step, before the terminal schema swap. `on_step_end` is awaited
/// before the next step starts.
#[async_trait]
pub trait StepHookSet: Send {
    async fn on_step_end(&mut self, step: &StepTelemetry);

    /// Messages to inject ahead of the model call, highest priority first.
    fn on_budget_warning(&mut self, info: &StepInfo) -> Vec<String>;

    fn on_forced_done(&mut self, info: &StepInfo) -> ForcedDone;
}

/// One live agent with its own browser session.
#[async_trait]
pub trait AgentSession: Send {
    async fn run(&mut self, max_steps: u32, hooks: &mut dyn StepHookSet) -> Result<AgentHistory>;

    /// Release the browser. Called after every attempt, including timeouts.
    async fn close(&mut self) -> Result<()>;
}

/// A chat client bound to the chain entry it was built for.
#[derive(Clone)]
pub struct ModelBinding {
    pub model: String,
    pub provider: Provider,
    pub client: Arc<dyn ChatClient>,
}

impl std::fmt::Debug for ModelBinding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelBinding")
            .field("model", &self.model)
            .field("provider", &self.provider)
            .finish_non_exhaustive()
    }
}

/// Everything the engine needs to build one attempt's agent.
#[derive(Debug)]
pub struct AgentRequest<'a> {
    pub persona: &'a PersonaDefinition,
    pub config: &'a Config,
    pub run_id: &'a str,
    /// Full task prompt the agent starts from.
    pub task: &'a str,
    pub primary: ModelBinding,
    /// Hot-swap target for transient mid-run failures, handled by the engine.
    pub fallback: Option<ModelBinding>,
}

#[async_trait]
pub trait AgentFactory: Send + Sync {
    async fn create(&self, request: AgentRequest<'_>) -> Result<Box<dyn AgentSession>>;
}
