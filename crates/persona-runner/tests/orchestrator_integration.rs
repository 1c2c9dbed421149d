//! Integration tests for the persona run controller and batch sequencer.
//!
//! The browser engine, chat providers and evaluator are scripted fakes.
//! Time is paused so cooldowns and backoffs complete instantly.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use persona_core::events::{EventType, RunEvent};
use persona_core::{
    AgentHistory, Config, Language, ModelAction, PersonaDefinition, Provider, ProviderSettings,
    RunStatus, TestRunResult,
};
use persona_runner::agent::{
    self, AgentError, AgentFactory, AgentRequest, AgentSession, ForcedDone, StepHookSet, StepInfo,
    StepTelemetry,
};
use persona_runner::evaluator::{self, Evaluator};
use persona_runner::events::EventBus;
use persona_runner::llm::{self, ChatClient, ChatModelFactory, LlmError};
use persona_runner::Orchestrator;
use serde_json::{json, Value};
use tempfile::TempDir;
use tokio::sync::mpsc;

const PHASES: [&str; 9] = [
    "greeting",
    "preferences",
    "destination",
    "dates",
    "travelers",
    "logistics",
    "deep_conversation",
    "completion",
    "send_logs",
];

// --- Fakes ---

#[derive(Debug, Clone)]
enum Script {
    /// Play these steps and return.
    Steps { steps: Vec<StepTelemetry>, done: bool },
    /// One failed step with no actions.
    Fail(String),
    /// Play these steps, then never return.
    Hang(Vec<StepTelemetry>),
}

#[derive(Debug, Default)]
struct Record {
    created: Vec<String>,
    tasks: Vec<String>,
    fallbacks: Vec<Option<String>>,
    closed: u32,
    injected: Vec<String>,
    forced_done: Vec<ForcedDone>,
}

#[derive(Debug)]
struct ScriptedAgents {
    scripts: Mutex<VecDeque<Script>>,
    record: Arc<Mutex<Record>>,
}

impl ScriptedAgents {
    fn new(scripts: Vec<Script>) -> (Arc<Self>, Arc<Mutex<Record>>) {
        let record = Arc::new(Mutex::new(Record::default()));
        let agents = Arc::new(Self {
            scripts: Mutex::new(scripts.into()),
            record: Arc::clone(&record),
        });
        (agents, record)
    }
}

#[async_trait]
impl AgentFactory for ScriptedAgents {
    async fn create(&self, request: AgentRequest<'_>) -> agent::Result<Box<dyn AgentSession>> {
        let script = self
            .scripts
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| AgentError::Create("no script left".into()))?;
        {
            let mut record = self.record.lock().unwrap();
            record.created.push(request.primary.model.clone());
            record.tasks.push(request.task.to_string());
            record
                .fallbacks
                .push(request.fallback.as_ref().map(|b| b.model.clone()));
        }
        Ok(Box::new(ScriptedSession {
            script,
            record: Arc::clone(&self.record),
        }))
    }
}

#[derive(Debug)]
struct ScriptedSession {
    script: Script,
    record: Arc<Mutex<Record>>,
}

async fn play(
    steps: &[StepTelemetry],
    max_steps: u32,
    hooks: &mut dyn StepHookSet,
    history: &mut AgentHistory,
    record: &Mutex<Record>,
) {
    for (index, step) in steps.iter().enumerate() {
        let info = StepInfo {
            step_number: index as u32,
            max_steps,
        };
        let injected = hooks.on_budget_warning(&info);
        record.lock().unwrap().injected.extend(injected);
        if info.is_last_step() {
            let answer = hooks.on_forced_done(&info);
            record.lock().unwrap().forced_done.push(answer);
        }

        hooks.on_step_end(step).await;

        history.model_actions.extend(step.actions.iter().cloned());
        history.thoughts.extend(step.thinking.iter().cloned());
        history.extracted_content.push(step.extracted_content.clone());
        history.urls.push(step.url.clone());
        history.errors.push(step.error.clone());
    }
}

#[async_trait]
impl AgentSession for ScriptedSession {
    async fn run(
        &mut self,
        max_steps: u32,
        hooks: &mut dyn StepHookSet,
    ) -> agent::Result<AgentHistory> {
        let mut history = AgentHistory::default();
        match self.script.clone() {
            Script::Steps { steps, done } => {
                play(&steps, max_steps, hooks, &mut history, &self.record).await;
                history.is_done = done;
            }
            Script::Fail(error) => {
                let step = StepTelemetry {
                    step_number: 1,
                    error: Some(error.clone()),
                    consecutive_failures: 1,
                    ..Default::default()
                };
                hooks.on_step_end(&step).await;
                history.errors.push(Some(error));
            }
            Script::Hang(steps) => {
                play(&steps, max_steps, hooks, &mut history, &self.record).await;
                tokio::time::sleep(Duration::from_secs(86_400)).await;
            }
        }
        Ok(history)
    }

    async fn close(&mut self) -> agent::Result<()> {
        self.record.lock().unwrap().closed += 1;
        Ok(())
    }
}

#[derive(Debug)]
struct FakeChat {
    healthy: bool,
    completions: Arc<AtomicU32>,
}

#[derive(Debug)]
struct FakeClient {
    provider: Provider,
    model: String,
    healthy: bool,
    completions: Arc<AtomicU32>,
}

#[async_trait]
impl ChatClient for FakeClient {
    fn model(&self) -> &str {
        &self.model
    }

    fn provider(&self) -> Provider {
        self.provider
    }

    async fn complete(&self, _prompt: &str) -> llm::Result<String> {
        self.completions.fetch_add(1, Ordering::SeqCst);
        if self.healthy {
            Ok("OK".into())
        } else {
            Err(LlmError::Http {
                status: 503,
                message: "service unavailable".into(),
            })
        }
    }
}

impl ChatModelFactory for FakeChat {
    fn create(
        &self,
        provider: Provider,
        model: &str,
        _api_key: &str,
    ) -> llm::Result<Arc<dyn ChatClient>> {
        Ok(Arc::new(FakeClient {
            provider,
            model: model.to_string(),
            healthy: self.healthy,
            completions: Arc::clone(&self.completions),
        }))
    }
}

#[derive(Debug, Default)]
struct RecordingEvaluator {
    calls: AtomicU32,
}

#[async_trait]
impl Evaluator for RecordingEvaluator {
    async fn evaluate(
        &self,
        _result: &TestRunResult,
        _persona: &PersonaDefinition,
    ) -> evaluator::Result<Value> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(json!({
            "scores": { "fluidity": { "score": 8.0, "justification": "smooth" } },
            "overall_score": 7.5,
            "evaluation_summary": "Pleasant overall.",
        }))
    }
}

// --- Helpers ---

struct Harness {
    orchestrator: Orchestrator,
    record: Arc<Mutex<Record>>,
    completions: Arc<AtomicU32>,
    evaluator: Arc<RecordingEvaluator>,
    events: mpsc::Receiver<RunEvent>,
    dir: TempDir,
}

fn settings() -> ProviderSettings {
    ProviderSettings::default()
        .with_provider(Provider::Groq, "gk", Some("groq-llama"))
        .with_provider(Provider::Cerebras, "ck", Some("cerebras-llama"))
}

fn harness(
    settings: ProviderSettings,
    config: Config,
    scripts: Vec<Script>,
    healthy: bool,
) -> Harness {
    let dir = TempDir::new().unwrap();
    let config = Config {
        results_dir: dir.path().to_path_buf(),
        ..config
    };
    let (agents, record) = ScriptedAgents::new(scripts);
    let completions = Arc::new(AtomicU32::new(0));
    let chat = Arc::new(FakeChat {
        healthy,
        completions: Arc::clone(&completions),
    });
    let evaluator = Arc::new(RecordingEvaluator::default());
    let bus = Arc::new(EventBus::new());
    let events = bus.subscribe();

    let orchestrator = Orchestrator::new(config, settings, agents, chat)
        .with_evaluator(Arc::clone(&evaluator) as Arc<dyn Evaluator>)
        .with_event_bus(bus);

    Harness {
        orchestrator,
        record,
        completions,
        evaluator,
        events,
        dir,
    }
}

fn persona(id: &str) -> PersonaDefinition {
    PersonaDefinition::with_phases(id, Language::En, &PHASES)
}

fn step(n: u32, action: &str, thinking: &str) -> StepTelemetry {
    StepTelemetry {
        step_number: n,
        actions: vec![ModelAction::new(action)],
        thinking: Some(thinking.to_string()),
        ..Default::default()
    }
}

/// A full conversation reaching the feedback click on its ninth step.
fn full_conversation() -> Vec<StepTelemetry> {
    let mut first = step(1, "input_text", "Introduce myself");
    first.extracted_content = Some("Hello! Where would you like to go?".into());
    vec![
        first,
        step(2, "click_element", "pick my preference for culture"),
        step(3, "input_text", "enter the destination city"),
        step(4, "datepicker", "choose the dates"),
        step(5, "travelersselector", "two adults"),
        step(6, "click_element", "confirm the airport"),
        step(7, "scroll", "ask about local food"),
        step(8, "click_element", "read the recap"),
        step(9, "click_element", "click the feedback link"),
    ]
}

fn useful_steps(count: u32) -> Vec<StepTelemetry> {
    (1..=count)
        .map(|n| step(n, if n % 2 == 0 { "scroll" } else { "input_text" }, "chatting"))
        .collect()
}

fn drain(rx: &mut mpsc::Receiver<RunEvent>) -> Vec<RunEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

fn report_count(dir: &TempDir) -> usize {
    std::fs::read_dir(dir.path()).map_or(0, Iterator::count)
}

// --- Session Tests ---

#[tokio::test(start_paused = true)]
async fn full_run_reaches_feedback_and_is_evaluated() {
    let config = Config {
        max_steps: 9,
        ..Config::default()
    };
    let script = Script::Steps {
        steps: full_conversation(),
        done: true,
    };
    let mut h = harness(settings(), config, vec![script], true);

    let result = h.orchestrator.run_persona(&persona("alice"), None, None).await;

    assert_eq!(result.status, RunStatus::Completed);
    assert_eq!(result.phase_furthest.as_deref(), Some("send_logs"));
    assert_eq!(result.phases_reached.len(), PHASES.len());
    assert_eq!(result.total_steps, Some(9));
    assert_eq!(result.total_messages, Some(1));
    assert_eq!(result.llm_model_used.as_deref(), Some("groq-llama"));
    assert!(result.exhausted_providers.is_empty());
    assert_eq!(h.evaluator.calls.load(Ordering::SeqCst), 1);
    assert_eq!(result.score_overall, Some(7.5));

    let record = h.record.lock().unwrap();
    assert_eq!(record.created, vec!["groq-llama"]);
    assert_eq!(record.fallbacks, vec![Some("cerebras-llama".to_string())]);
    let task = &record.tasks[0];
    assert!(task.contains("FIRST ACTION: Navigate to https://travliaq.com/planner"));
    assert!(task.contains("Phase 9 - SEND_LOGS"));
    assert!(task.contains("as alice"));
    assert_eq!(record.closed, 1);
    assert!(record
        .injected
        .iter()
        .any(|m| m.starts_with("OVERRIDE THE BUDGET WARNING")));
    assert!(matches!(
        record.forced_done.as_slice(),
        [ForcedDone::KeepFullActions { .. }]
    ));
    drop(record);

    let types: Vec<EventType> = drain(&mut h.events).into_iter().map(|e| e.event_type).collect();
    assert_eq!(types.first(), Some(&EventType::StageHealthCheck));
    assert!(types.contains(&EventType::StageEvaluate));
    assert_eq!(types.last(), Some(&EventType::PersonaCompleted));
    assert_eq!(report_count(&h.dir), 1);
}

#[tokio::test(start_paused = true)]
async fn rate_limit_cools_down_then_switches_provider() {
    let scripts = vec![
        Script::Fail("HTTP 429: rate limit exceeded".into()),
        Script::Steps {
            steps: useful_steps(12),
            done: true,
        },
    ];
    let mut h = harness(settings(), Config::default(), scripts, true);
    let start = tokio::time::Instant::now();

    let result = h.orchestrator.run_persona(&persona("bob"), None, None).await;

    assert_eq!(result.status, RunStatus::Completed);
    assert_eq!(result.llm_model_used.as_deref(), Some("cerebras-llama"));
    assert_eq!(result.exhausted_providers, vec![Provider::Groq]);
    assert!(start.elapsed() >= Duration::from_secs(60));

    let record = h.record.lock().unwrap();
    assert_eq!(record.created, vec!["groq-llama", "cerebras-llama"]);
    // Groq is out, nothing left to hot-swap to.
    assert_eq!(record.fallbacks[1], None);
    assert_eq!(record.closed, 2);
    drop(record);

    let events = drain(&mut h.events);
    let failover = events
        .iter()
        .find(|e| e.event_type == EventType::Failover)
        .expect("failover event");
    assert_eq!(failover.data["from_model"], "groq-llama");
    assert_eq!(failover.data["to_model"], "cerebras-llama");
    assert_eq!(failover.data["reason"], "rate_limit");
    assert!(events.iter().any(|e| e.event_type == EventType::ProviderExhausted));
}

#[tokio::test(start_paused = true)]
async fn exhausted_chain_fails_with_provider_list() {
    let scripts = vec![
        Script::Fail("model not found (404): unknown model".into()),
        Script::Fail("Failed to parse JSON from model output".into()),
    ];
    let h = harness(settings(), Config::default(), scripts, true);

    let result = h.orchestrator.run_persona(&persona("carol"), None, None).await;

    assert_eq!(result.status, RunStatus::Failed);
    assert_eq!(
        result.exhausted_providers,
        vec![Provider::Groq, Provider::Cerebras]
    );
    let message = result.error_message.as_deref().unwrap();
    assert!(message.starts_with("all providers exhausted"));
    assert!(message.contains("parse JSON"));
    assert_eq!(h.evaluator.calls.load(Ordering::SeqCst), 0);
    assert_eq!(h.record.lock().unwrap().closed, 2);
    assert_eq!(report_count(&h.dir), 1);
}

#[tokio::test(start_paused = true)]
async fn limping_backend_triggers_soft_failover() {
    let mut limping = useful_steps(3);
    limping[2].error = Some("Invalid model output".into());
    let scripts = vec![
        Script::Steps {
            steps: limping,
            done: false,
        },
        Script::Steps {
            steps: useful_steps(10),
            done: false,
        },
    ];
    let h = harness(settings(), Config::default(), scripts, true);

    let result = h.orchestrator.run_persona(&persona("dan"), None, None).await;

    assert_eq!(result.status, RunStatus::Completed);
    assert_eq!(result.llm_model_used.as_deref(), Some("cerebras-llama"));
    // A model failure excludes the model only; groq has no other entry.
    assert_eq!(result.exhausted_providers, vec![Provider::Groq]);
}

#[tokio::test(start_paused = true)]
async fn phase_progress_survives_failover() {
    let mut limping = vec![
        step(1, "input_text", "Introduce myself"),
        step(2, "datepicker", "choose the dates"),
        step(3, "scroll", "waiting for the reply"),
    ];
    limping[2].error = Some("Invalid model output".into());
    let scripts = vec![
        Script::Steps {
            steps: limping,
            done: false,
        },
        Script::Steps {
            steps: useful_steps(10),
            done: false,
        },
    ];
    let mut h = harness(settings(), Config::default(), scripts, true);

    let result = h.orchestrator.run_persona(&persona("dora"), None, None).await;

    assert_eq!(result.status, RunStatus::Completed);
    assert_eq!(h.record.lock().unwrap().created, vec!["groq-llama", "cerebras-llama"]);
    // The second attempt's history carries no date evidence of its own.
    assert!(result.phases_reached.iter().any(|p| p == "dates"));
    assert_eq!(result.phase_furthest.as_deref(), Some("dates"));

    let steps: Vec<RunEvent> = drain(&mut h.events)
        .into_iter()
        .filter(|e| e.event_type == EventType::AgentStep)
        .collect();
    assert_eq!(steps.len(), 13);
    assert_eq!(steps[1].data["phase_index"], 3);
    // First step of the second attempt starts where the first attempt stopped.
    assert!(steps[3].data["phase_index"].as_u64().unwrap() >= 3);
}

#[tokio::test(start_paused = true)]
async fn every_attempt_gets_the_same_task() {
    let scripts = vec![
        Script::Fail("model not found (404): unknown model".into()),
        Script::Steps {
            steps: useful_steps(10),
            done: true,
        },
    ];
    let mut h = harness(settings(), Config::default(), scripts, true);
    h.orchestrator = h
        .orchestrator
        .with_site_preamble("=== STAGING SITE ===\nOpen {planner_url} first.\n");

    let result = h.orchestrator.run_persona(&persona("ivy"), None, None).await;

    assert_eq!(result.status, RunStatus::Completed);
    let record = h.record.lock().unwrap();
    assert_eq!(record.tasks.len(), 2);
    assert_eq!(record.tasks[0], record.tasks[1]);
    assert!(record.tasks[0]
        .starts_with("=== STAGING SITE ===\nOpen https://travliaq.com/planner first."));
    assert!(!record.tasks[0].contains("SITE KNOWLEDGE"));
}

#[tokio::test(start_paused = true)]
async fn failed_health_check_never_opens_a_browser() {
    let h = harness(settings(), Config::default(), Vec::new(), false);

    let result = h.orchestrator.run_persona(&persona("erin"), None, None).await;

    assert_eq!(result.status, RunStatus::Failed);
    assert!(result
        .error_message
        .as_deref()
        .unwrap()
        .starts_with("health check failed"));
    assert_eq!(h.completions.load(Ordering::SeqCst), 3);
    assert!(h.record.lock().unwrap().created.is_empty());
    assert_eq!(result.total_steps, None);
    assert_eq!(report_count(&h.dir), 1);
}

#[tokio::test(start_paused = true)]
async fn timeout_keeps_partial_progress() {
    let config = Config {
        timeout_per_persona_sec: 30,
        ..Config::default()
    };
    let scripts = vec![Script::Hang(vec![
        step(1, "input_text", "say hello"),
        step(2, "input_text", "enter the destination city"),
    ])];
    let h = harness(settings(), config, scripts, true);

    let result = h.orchestrator.run_persona(&persona("fay"), None, None).await;

    assert_eq!(result.status, RunStatus::Timeout);
    assert_eq!(result.error_message.as_deref(), Some("timed out after 30s"));
    assert_eq!(result.total_steps, Some(2));
    assert_eq!(result.phase_furthest.as_deref(), Some("destination"));
    assert_eq!(h.record.lock().unwrap().closed, 1);
    assert_eq!(h.evaluator.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn start_model_override_picks_the_primary() {
    let scripts = vec![Script::Steps {
        steps: useful_steps(10),
        done: true,
    }];
    let h = harness(settings(), Config::default(), scripts, true);

    let result = h
        .orchestrator
        .run_persona(&persona("gus"), Some("batch-x"), Some("cerebras-llama"))
        .await;

    assert_eq!(result.batch_id.as_deref(), Some("batch-x"));
    assert_eq!(h.record.lock().unwrap().created, vec!["cerebras-llama"]);
    assert_eq!(
        h.record.lock().unwrap().fallbacks,
        vec![Some("groq-llama".to_string())]
    );
}

// --- Batch Tests ---

#[tokio::test(start_paused = true)]
async fn batch_aborts_once_every_provider_is_exhausted() {
    let single =
        ProviderSettings::default().with_provider(Provider::Groq, "gk", Some("groq-llama"));
    let scripts = vec![Script::Fail("429 Too Many Requests".into())];
    let mut h = harness(single, Config::default(), scripts, true);
    let personas = [persona("p1"), persona("p2"), persona("p3")];

    let results = h.orchestrator.run_batch(&personas).await;

    assert_eq!(results.len(), 3);
    assert_eq!(results[0].exhausted_providers, vec![Provider::Groq]);
    for skipped in &results[1..] {
        assert_eq!(skipped.status, RunStatus::Failed);
        assert_eq!(skipped.duration_seconds, Some(0.0));
        assert!(skipped.error_message.as_deref().unwrap().contains("skipped"));
    }
    // Only the first persona ran a health check.
    assert_eq!(h.completions.load(Ordering::SeqCst), 1);
    assert_eq!(h.record.lock().unwrap().created.len(), 1);
    assert_eq!(report_count(&h.dir), 3);

    let batch_ids: Vec<&str> = results.iter().filter_map(|r| r.batch_id.as_deref()).collect();
    assert_eq!(batch_ids.len(), 3);
    assert!(batch_ids.iter().all(|id| *id == batch_ids[0]));

    let types: Vec<EventType> = drain(&mut h.events).into_iter().map(|e| e.event_type).collect();
    assert_eq!(types.first(), Some(&EventType::BatchStarted));
    assert_eq!(types.last(), Some(&EventType::BatchCompleted));
    assert_eq!(
        types.iter().filter(|t| **t == EventType::PersonaFailed).count(),
        3
    );
}

#[tokio::test(start_paused = true)]
async fn batch_rotates_start_provider_with_cooldown() {
    let config = Config {
        rotate_providers: true,
        ..Config::default()
    };
    let scripts = vec![
        Script::Steps {
            steps: useful_steps(10),
            done: true,
        },
        Script::Steps {
            steps: useful_steps(10),
            done: true,
        },
    ];
    let h = harness(settings(), config, scripts, true);
    let start = tokio::time::Instant::now();

    let results = h.orchestrator.run_batch(&[persona("a"), persona("b")]).await;

    assert!(results.iter().all(|r| r.status == RunStatus::Completed));
    assert_eq!(
        h.record.lock().unwrap().created,
        vec!["groq-llama", "cerebras-llama"]
    );
    assert!(start.elapsed() >= Duration::from_secs(30));
}

#[tokio::test(start_paused = true)]
async fn batch_continues_after_partial_exhaustion() {
    let scripts = vec![
        Script::Fail("429 rate limit".into()),
        Script::Steps {
            steps: useful_steps(10),
            done: true,
        },
        Script::Steps {
            steps: useful_steps(10),
            done: true,
        },
    ];
    let h = harness(settings(), Config::default(), scripts, true);

    let results = h.orchestrator.run_batch(&[persona("a"), persona("b")]).await;

    assert_eq!(results[0].status, RunStatus::Completed);
    assert_eq!(results[0].exhausted_providers, vec![Provider::Groq]);
    assert_eq!(results[1].status, RunStatus::Completed);
    // Exclusions are per run: the second persona starts on the chain head again.
    assert_eq!(
        h.record.lock().unwrap().created,
        vec!["groq-llama", "cerebras-llama", "groq-llama"]
    );
}
