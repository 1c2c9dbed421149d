//! Post-run evaluation.
//!
//! The evaluator receives the finished result and the persona and returns a
//! JSON document that [`TestRunResult::merge_evaluation`] understands.

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::sync::Arc;

use async_trait::async_trait;
use persona_core::result::AXES;
use persona_core::{PersonaDefinition, TestRunResult};
use serde_json::Value;
use thiserror::Error;

use crate::llm::{ChatClient, LlmError};

/// Thought lines included in the evaluation prompt.
const MAX_THOUGHTS: usize = 20;

#[derive(Debug, Error)]
pub enum EvaluationError {
    #[error(transparent)]
    Llm(#[from] LlmError),
    #[error("evaluator returned no JSON object")]
    NoJson,
    #[error("evaluator returned invalid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, EvaluationError>;

#[async_trait]
pub trait Evaluator: Send + Sync {
    async fn evaluate(&self, result: &TestRunResult, persona: &PersonaDefinition) -> Result<Value>;
}

/// Scores a run by asking a chat model to role-play the persona.
pub struct ChatEvaluator {
    client: Arc<dyn ChatClient>,
}

impl std::fmt::Debug for ChatEvaluator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatEvaluator")
            .field("model", &self.client.model())
            .finish()
    }
}

impl ChatEvaluator {
    pub fn new(client: Arc<dyn ChatClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Evaluator for ChatEvaluator {
    async fn evaluate(&self, result: &TestRunResult, persona: &PersonaDefinition) -> Result<Value> {
        let prompt = build_prompt(result, persona);
        let reply = self.client.complete(&prompt).await?;
        let mut evaluation = parse_reply(&reply)?;
        let overall = weighted_overall(&evaluation, &persona.evaluation_weight_overrides);
        if let Value::Object(map) = &mut evaluation {
            map.insert("overall_score".to_string(), Value::from(overall));
        }
        Ok(evaluation)
    }
}

pub fn build_prompt(result: &TestRunResult, persona: &PersonaDefinition) -> String {
    let mut out = String::new();
    out.push_str(
        "You are a UX expert evaluating a travel-planning chatbot from the point of view \
         of the persona below. Score each axis from 0.0 to 10.0 with a short justification, \
         then write a short first-person summary and list strengths, frustration points and \
         improvement suggestions.\n",
    );
    let _ = writeln!(out, "Axes: {}", AXES.join(", "));
    out.push_str(
        "Reply with JSON only: {\"scores\": {\"<axis>\": \
         {\"score\": n, \"justification\": \"...\"}}, \
         \"evaluation_summary\": \"...\", \"strengths\": [], \"frustration_points\": [], \
         \"improvement_suggestions\": []}\n",
    );

    out.push_str("\n=== PERSONA ===\n");
    let _ = writeln!(out, "Name: {}", persona.name);
    if let Some(age) = persona.age {
        let _ = writeln!(out, "Age: {age}");
    }
    let _ = writeln!(out, "Role: {}", persona.role);
    let _ = writeln!(out, "Language: {}", persona.language.as_str());
    let _ = writeln!(out, "Traits: {}", persona.personality_traits.join(", "));
    let _ = writeln!(out, "Group: {}", persona.travel_profile.group_type);
    let _ = writeln!(out, "Budget: {}", persona.travel_profile.budget_range);

    out.push_str("\n=== EXECUTION ===\n");
    let _ = writeln!(out, "Status: {}", result.status.as_str());
    if let Some(duration) = result.duration_seconds {
        let _ = writeln!(out, "Duration: {duration:.1}s");
    }
    let _ = writeln!(out, "Steps: {}", result.total_steps.unwrap_or_default());
    let _ = writeln!(out, "Phases reached: {}", join_or(&result.phases_reached, "none"));
    let _ = writeln!(out, "Widgets used: {}", join_or(&result.widgets_interacted, "none"));

    out.push_str("\n=== CONVERSATION ===\n");
    if result.conversation_log.is_empty() {
        out.push_str("(no log)\n");
    }
    for entry in &result.conversation_log {
        let _ = writeln!(out, "{entry}");
    }

    if !result.agent_thoughts.is_empty() {
        out.push_str("\n=== AGENT OBSERVATIONS ===\n");
        for thought in result.agent_thoughts.iter().take(MAX_THOUGHTS) {
            let _ = writeln!(out, "- {thought}");
        }
    }
    out
}

fn join_or(items: &[String], empty: &str) -> String {
    if items.is_empty() {
        empty.to_string()
    } else {
        items.join(", ")
    }
}

/// Extract the JSON object from a reply that may be wrapped in prose or code fences.
pub fn parse_reply(reply: &str) -> Result<Value> {
    let start = reply.find('{').ok_or(EvaluationError::NoJson)?;
    let end = reply.rfind('}').ok_or(EvaluationError::NoJson)?;
    if end < start {
        return Err(EvaluationError::NoJson);
    }
    Ok(serde_json::from_str(&reply[start..=end])?)
}

/// Mean of the axis scores, weighted by the persona's overrides (default weight 1).
pub fn weighted_overall(evaluation: &Value, weights: &BTreeMap<String, f64>) -> f64 {
    let scores = evaluation.get("scores");
    let mut weighted_sum = 0.0;
    let mut total_weight = 0.0;
    for axis in AXES {
        let score = scores
            .and_then(|s| s.get(axis))
            .and_then(|d| d.get("score").and_then(Value::as_f64).or_else(|| d.as_f64()))
            .unwrap_or(0.0);
        let weight = weights.get(axis).copied().unwrap_or(1.0);
        weighted_sum += score * weight;
        total_weight += weight;
    }
    if total_weight > 0.0 {
        (weighted_sum / total_weight * 100.0).round() / 100.0
    } else {
        0.0
    }
}
