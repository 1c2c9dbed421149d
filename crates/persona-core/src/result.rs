//! Test run result model and its persisted JSON shape.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::persona::PersonaDefinition;
use crate::types::{Id, Language, Provider, RunStatus};

pub const SKIPPED_MESSAGE: &str = "skipped: all providers exhausted";

/// Evaluation axes in report order.
pub const AXES: [&str; 9] = [
    "fluidity",
    "relevance",
    "visual_clarity",
    "error_handling",
    "conversation_memory",
    "widget_usability",
    "map_interaction",
    "response_speed",
    "personality_match",
];

/// Nine-axis UX scores, 0 to 10 each.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct EvaluationScores {
    pub fluidity: f64,
    pub relevance: f64,
    pub visual_clarity: f64,
    pub error_handling: f64,
    pub conversation_memory: f64,
    pub widget_usability: f64,
    pub map_interaction: f64,
    pub response_speed: f64,
    pub personality_match: f64,
}

impl EvaluationScores {
    pub fn get(&self, axis: &str) -> Option<f64> {
        Some(match axis {
            "fluidity" => self.fluidity,
            "relevance" => self.relevance,
            "visual_clarity" => self.visual_clarity,
            "error_handling" => self.error_handling,
            "conversation_memory" => self.conversation_memory,
            "widget_usability" => self.widget_usability,
            "map_interaction" => self.map_interaction,
            "response_speed" => self.response_speed,
            "personality_match" => self.personality_match,
            _ => return None,
        })
    }

    fn slot(&mut self, axis: &str) -> Option<&mut f64> {
        Some(match axis {
            "fluidity" => &mut self.fluidity,
            "relevance" => &mut self.relevance,
            "visual_clarity" => &mut self.visual_clarity,
            "error_handling" => &mut self.error_handling,
            "conversation_memory" => &mut self.conversation_memory,
            "widget_usability" => &mut self.widget_usability,
            "map_interaction" => &mut self.map_interaction,
            "response_speed" => &mut self.response_speed,
            "personality_match" => &mut self.personality_match,
            _ => return None,
        })
    }
}

/// Full result of a single persona run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestRunResult {
    pub run_id: String,
    pub batch_id: Option<String>,
    pub persona_id: String,
    pub persona_name: String,
    pub persona_language: Language,

    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub duration_seconds: Option<f64>,

    pub status: RunStatus,
    pub error_message: Option<String>,

    pub total_steps: Option<u32>,
    pub total_messages: Option<u32>,
    pub phases_reached: Vec<String>,
    pub phase_furthest: Option<String>,
    pub widgets_interacted: Vec<String>,

    pub conversation_log: Vec<String>,
    pub agent_thoughts: Vec<String>,
    pub screenshot_paths: Vec<String>,

    pub scores: EvaluationScores,
    pub score_justifications: BTreeMap<String, String>,
    pub score_overall: Option<f64>,
    pub evaluation_summary: Option<String>,
    pub strengths: Vec<String>,
    pub frustration_points: Vec<String>,
    pub improvement_suggestions: Vec<String>,
    pub threats: Vec<String>,

    pub config_snapshot: Option<Value>,
    pub llm_model_used: Option<String>,
    /// Providers tried and failed or rate-limited during this run.
    pub exhausted_providers: Vec<Provider>,
}

impl TestRunResult {
    /// A fresh `running` result for `persona`.
    pub fn started(persona: &PersonaDefinition, batch_id: Option<&str>) -> Self {
        Self {
            run_id: format!("{}-{}", persona.id, Id::short()),
            batch_id: batch_id.map(str::to_string),
            persona_id: persona.id.clone(),
            persona_name: persona.name.clone(),
            persona_language: persona.language,
            started_at: Utc::now(),
            finished_at: None,
            duration_seconds: None,
            status: RunStatus::Running,
            error_message: None,
            total_steps: None,
            total_messages: None,
            phases_reached: Vec::new(),
            phase_furthest: None,
            widgets_interacted: Vec::new(),
            conversation_log: Vec::new(),
            agent_thoughts: Vec::new(),
            screenshot_paths: Vec::new(),
            scores: EvaluationScores::default(),
            score_justifications: BTreeMap::new(),
            score_overall: None,
            evaluation_summary: None,
            strengths: Vec::new(),
            frustration_points: Vec::new(),
            improvement_suggestions: Vec::new(),
            threats: Vec::new(),
            config_snapshot: None,
            llm_model_used: None,
            exhausted_providers: Vec::new(),
        }
    }

    /// Result for a persona never started because the batch ran out of providers.
    pub fn skipped(persona: &PersonaDefinition, batch_id: Option<&str>) -> Self {
        let mut result = Self::started(persona, batch_id);
        result.status = RunStatus::Failed;
        result.error_message = Some(SKIPPED_MESSAGE.to_string());
        result.finished_at = Some(result.started_at);
        result.duration_seconds = Some(0.0);
        result
    }

    /// Set the terminal status and timing.
    pub fn finish(&mut self, status: RunStatus, error_message: Option<String>) {
        let finished_at = Utc::now();
        self.status = status;
        if error_message.is_some() {
            self.error_message = error_message;
        }
        self.duration_seconds =
            Some((finished_at - self.started_at).num_milliseconds().max(0) as f64 / 1000.0);
        self.finished_at = Some(finished_at);
    }

    /// Merge evaluator output.
    ///
    /// Each axis under `scores` may be `{"score": n, "justification": "..."}`
    /// or a bare number. Unknown axes are ignored.
    pub fn merge_evaluation(&mut self, evaluation: &Value) {
        if let Some(scores) = evaluation.get("scores").and_then(Value::as_object) {
            for (axis, data) in scores {
                let Some(slot) = self.scores.slot(axis) else {
                    continue;
                };
                let score = match data {
                    Value::Object(obj) => {
                        if let Some(text) = obj.get("justification").and_then(Value::as_str) {
                            if !text.is_empty() {
                                self.score_justifications
                                    .insert(axis.clone(), text.to_string());
                            }
                        }
                        obj.get("score").and_then(Value::as_f64).unwrap_or(0.0)
                    }
                    other => other.as_f64().unwrap_or(0.0),
                };
                *slot = score;
            }
        }

        self.score_overall = evaluation.get("overall_score").and_then(Value::as_f64);
        self.evaluation_summary = evaluation
            .get("evaluation_summary")
            .and_then(Value::as_str)
            .map(str::to_string);
        self.strengths = string_list(evaluation, "strengths");
        self.frustration_points = string_list(evaluation, "frustration_points");
        self.improvement_suggestions = string_list(evaluation, "improvement_suggestions");
        self.threats = string_list(evaluation, "threats");
    }

    /// Nested JSON document written to disk.
    pub fn to_report(&self) -> Value {
        let scores: serde_json::Map<String, Value> = AXES
            .iter()
            .map(|axis| {
                let justification = self
                    .score_justifications
                    .get(*axis)
                    .cloned()
                    .unwrap_or_default();
                (
                    (*axis).to_string(),
                    json!({
                        "score": self.scores.get(axis).unwrap_or_default(),
                        "justification": justification,
                    }),
                )
            })
            .collect();

        json!({
            "run_id": self.run_id,
            "batch_id": self.batch_id,
            "persona": {
                "id": self.persona_id,
                "name": self.persona_name,
                "language": self.persona_language,
            },
            "timing": {
                "started_at": self.started_at.to_rfc3339(),
                "finished_at": self.finished_at.map(|t| t.to_rfc3339()),
                "duration_seconds": self.duration_seconds,
            },
            "status": self.status.as_str(),
            "error_message": self.error_message,
            "execution": {
                "total_steps": self.total_steps,
                "total_messages": self.total_messages,
                "phases_reached": self.phases_reached,
                "phase_furthest": self.phase_furthest,
                "widgets_interacted": self.widgets_interacted,
            },
            "evaluation": {
                "overall_score": self.score_overall,
                "scores": scores,
                "summary": self.evaluation_summary,
                "strengths": self.strengths,
                "frustration_points": self.frustration_points,
                "improvement_suggestions": self.improvement_suggestions,
                "threats": self.threats,
            },
            "logs": {
                "conversation": self.conversation_log,
                "agent_thoughts": self.agent_thoughts,
                "screenshot_paths": self.screenshot_paths,
            },
            "meta": {
                "config_snapshot": self.config_snapshot,
                "llm_model_used": self.llm_model_used,
                "exhausted_providers": self.exhausted_providers,
            },
        })
    }
}

fn string_list(value: &Value, key: &str) -> Vec<String> {
    value
        .get(key)
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}
