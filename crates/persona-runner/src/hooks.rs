//! Step instrumentation and anti-abandonment guidance for one attempt.
//!
//! The engine nudges the model to call `done` near the end of its budget
//! and swaps to a terminal-only schema on the last step. Both would stop
//! the persona before the mandatory feedback phase, so these hooks
//! counteract them based on the phase tracker.

use async_trait::async_trait;
use persona_core::events::{AgentStepPayload, EventType, LoopDetectedPayload, RunEvent};
use persona_core::phase;
use persona_core::{Guidance, LoopDetector, PersonaDefinition, PhaseTracker};
use tracing::{debug, info, warn};

use crate::agent::{ForcedDone, StepHookSet, StepInfo, StepTelemetry};
use crate::events::EventBus;
use crate::pacing::{PaceDelay, StepPacer};

const BUDGET_OVERRIDE_RATIO: f64 = 0.75;
const PROGRESS_REMINDER_RATIO: f64 = 0.5;
/// Loop-break nudges fire on the first stuck step, then every Nth.
const LOOP_NUDGE_EVERY: u32 = 5;

#[derive(Debug)]
pub struct SessionHooks<'a> {
    persona: &'a PersonaDefinition,
    tracker: &'a mut PhaseTracker,
    detector: LoopDetector,
    pacer: StepPacer,
    guidance: &'a Guidance,
    events: Option<&'a EventBus>,
    batch_id: Option<&'a str>,
    steps_seen: u32,
    thoughts: Vec<String>,
}

impl<'a> SessionHooks<'a> {
    pub fn new(
        persona: &'a PersonaDefinition,
        tracker: &'a mut PhaseTracker,
        detector: LoopDetector,
        pacer: StepPacer,
        guidance: &'a Guidance,
    ) -> Self {
        Self {
            persona,
            tracker,
            detector,
            pacer,
            guidance,
            events: None,
            batch_id: None,
            steps_seen: 0,
            thoughts: Vec::new(),
        }
    }

    pub fn with_events(mut self, events: Option<&'a EventBus>, batch_id: Option<&'a str>) -> Self {
        self.events = events;
        self.batch_id = batch_id;
        self
    }

    /// Steps observed so far. Survives a timeout that drops the history.
    pub fn steps_seen(&self) -> u32 {
        self.steps_seen
    }

    pub fn loops_detected(&self) -> u32 {
        self.detector.detected_count()
    }

    pub fn into_thoughts(self) -> Vec<String> {
        self.thoughts
    }

    fn publish(&self, event: RunEvent) {
        if let Some(bus) = self.events {
            let event = event.persona(self.persona.id.as_str());
            let event = match self.batch_id {
                Some(batch_id) => event.batch(batch_id),
                None => event,
            };
            bus.publish(event);
        }
    }
}

#[async_trait]
impl StepHookSet for SessionHooks<'_> {
    async fn on_step_end(&mut self, step: &StepTelemetry) {
        self.steps_seen += 1;
        let names = step.action_names();
        if let Some(thinking) = &step.thinking {
            self.thoughts.push(thinking.clone());
        }

        phase::update(
            self.tracker,
            &self.persona.conversation_goals,
            step.thinking.as_deref(),
            &names,
        );

        for name in &names {
            let detection = self.detector.push(name.as_str());
            if !detection.detected {
                continue;
            }
            let (Some(pattern_type), Some(pattern)) = (detection.pattern_type, detection.pattern)
            else {
                continue;
            };
            warn!(
                persona_id = %self.persona.id,
                step = step.step_number,
                pattern_type = pattern_type.as_str(),
                pattern = %pattern,
                "action loop detected"
            );
            self.publish(RunEvent::new(EventType::LoopDetected).payload(&LoopDetectedPayload {
                step: step.step_number,
                pattern_type,
                pattern,
                window: detection.window,
            }));
        }

        if let Some(error) = &step.error {
            debug!(
                persona_id = %self.persona.id,
                step = step.step_number,
                consecutive_failures = step.consecutive_failures,
                error = %error,
                "step reported an error"
            );
        }

        self.publish(RunEvent::new(EventType::AgentStep).payload(&AgentStepPayload {
            step: step.step_number,
            url: step.url.clone(),
            actions: names,
            phase_index: self.tracker.current_phase_index(),
            feedback_submitted: self.tracker.feedback_submitted(),
        }));

        match self.pacer.pace(step.consecutive_failures).await {
            PaceDelay::None => {}
            PaceDelay::Throttle(d) => {
                debug!(step = step.step_number, delay_ms = d.as_millis() as u64, "step throttled");
            }
            PaceDelay::FailureBackoff(d) => {
                info!(
                    step = step.step_number,
                    consecutive_failures = step.consecutive_failures,
                    delay_sec = d.as_secs(),
                    "backing off after step failures"
                );
            }
        }
    }

    fn on_budget_warning(&mut self, info: &StepInfo) -> Vec<String> {
        let mut messages = Vec::new();
        let ratio = info.budget_ratio();

        if ratio >= BUDGET_OVERRIDE_RATIO && !self.tracker.feedback_submitted() {
            info!(
                persona_id = %self.persona.id,
                step = info.step_number + 1,
                max_steps = info.max_steps,
                "budget override injected"
            );
            messages.push(self.guidance.budget_override(self.tracker));
        } else if ratio >= PROGRESS_REMINDER_RATIO && !self.tracker.is_feedback_reached() {
            messages.push(self.guidance.progress_reminder(self.tracker));
        }

        if self.tracker.is_stuck_in_loop() {
            let count = self.tracker.record_stuck();
            if count == 1 || count % LOOP_NUDGE_EVERY == 0 {
                info!(
                    persona_id = %self.persona.id,
                    stuck_count = count,
                    "loop-break guidance injected"
                );
                messages.push(self.guidance.loop_break(self.tracker));
            }
        } else {
            self.tracker.reset_stuck();
        }

        messages
    }

    fn on_forced_done(&mut self, info: &StepInfo) -> ForcedDone {
        if !info.is_last_step() || self.tracker.feedback_submitted() {
            return ForcedDone::Allow;
        }
        info!(
            persona_id = %self.persona.id,
            "last step with feedback pending, keeping full action set"
        );
        ForcedDone::KeepFullActions {
            message: self.guidance.last_step_feedback(),
        }
    }
}
