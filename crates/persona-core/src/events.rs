//! Event types for live run notification.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{PatternType, Provider};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    BatchStarted,
    BatchCompleted,
    StageHealthCheck,
    StageCreateAgent,
    StageRunAgent,
    StageExtractResults,
    StageEvaluate,
    StageWriteReport,
    PersonaCompleted,
    PersonaFailed,
    PersonaTimeout,
    AgentStep,
    LoopDetected,
    Failover,
    ProviderExhausted,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BatchStarted => "batch_started",
            Self::BatchCompleted => "batch_completed",
            Self::StageHealthCheck => "stage_health_check",
            Self::StageCreateAgent => "stage_create_agent",
            Self::StageRunAgent => "stage_run_agent",
            Self::StageExtractResults => "stage_extract_results",
            Self::StageEvaluate => "stage_evaluate",
            Self::StageWriteReport => "stage_write_report",
            Self::PersonaCompleted => "persona_completed",
            Self::PersonaFailed => "persona_failed",
            Self::PersonaTimeout => "persona_timeout",
            Self::AgentStep => "agent_step",
            Self::LoopDetected => "loop_detected",
            Self::Failover => "failover",
            Self::ProviderExhausted => "provider_exhausted",
        }
    }

    /// Progress label for stage events, `0/5` through `5/5`.
    pub fn stage(&self) -> Option<&'static str> {
        match self {
            Self::StageHealthCheck => Some("0/5"),
            Self::StageCreateAgent => Some("1/5"),
            Self::StageRunAgent => Some("2/5"),
            Self::StageExtractResults => Some("3/5"),
            Self::StageEvaluate => Some("4/5"),
            Self::StageWriteReport => Some("5/5"),
            _ => None,
        }
    }
}

/// One notification published on the event bus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunEvent {
    #[serde(rename = "type")]
    pub event_type: EventType,
    pub timestamp: DateTime<Utc>,
    pub persona_id: Option<String>,
    pub batch_id: Option<String>,
    pub stage: Option<String>,
    pub data: serde_json::Value,
}

impl RunEvent {
    pub fn new(event_type: EventType) -> Self {
        Self {
            event_type,
            timestamp: Utc::now(),
            persona_id: None,
            batch_id: None,
            stage: event_type.stage().map(str::to_string),
            data: serde_json::Value::Object(serde_json::Map::new()),
        }
    }

    pub fn persona(mut self, persona_id: impl Into<String>) -> Self {
        self.persona_id = Some(persona_id.into());
        self
    }

    pub fn batch(mut self, batch_id: impl Into<String>) -> Self {
        self.batch_id = Some(batch_id.into());
        self
    }

    pub fn data(mut self, data: serde_json::Value) -> Self {
        self.data = data;
        self
    }

    /// Serialize a typed payload into `data`. Unserializable payloads leave it empty.
    pub fn payload<T: Serialize>(self, payload: &T) -> Self {
        match serde_json::to_value(payload) {
            Ok(value) => self.data(value),
            Err(_) => self,
        }
    }
}

/// Payload for `agent_step`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentStepPayload {
    pub step: u32,
    pub url: Option<String>,
    pub actions: Vec<String>,
    pub phase_index: usize,
    pub feedback_submitted: bool,
}

/// Payload for `loop_detected`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoopDetectedPayload {
    pub step: u32,
    pub pattern_type: PatternType,
    pub pattern: String,
    pub window: Vec<String>,
}

/// Payload for `failover`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailoverPayload {
    pub from_model: String,
    pub from_provider: Provider,
    pub to_model: String,
    pub to_provider: Provider,
    pub reason: String,
}
