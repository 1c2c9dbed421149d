//! Step history produced by one agent-run attempt.

use serde::{Deserialize, Serialize};

/// An action chosen by the model, e.g. `click_element {"index": 12}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelAction {
    pub name: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

impl ModelAction {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            params: serde_json::Value::Null,
        }
    }

    pub fn with_params(name: impl Into<String>, params: serde_json::Value) -> Self {
        Self {
            name: name.into(),
            params,
        }
    }
}

impl std::fmt::Display for ModelAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.params.is_null() {
            f.write_str(&self.name)
        } else {
            write!(f, "{} {}", self.name, self.params)
        }
    }
}

/// Ordered record of what an attempt did. Per-step vectors are indexed by step.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentHistory {
    pub model_actions: Vec<ModelAction>,
    pub thoughts: Vec<String>,
    pub extracted_content: Vec<Option<String>>,
    pub screenshots: Vec<String>,
    pub urls: Vec<Option<String>>,
    pub errors: Vec<Option<String>>,
    pub is_done: bool,
}

impl AgentHistory {
    pub fn num_actions(&self) -> usize {
        self.model_actions.len()
    }

    pub fn has_errors(&self) -> bool {
        self.errors.iter().any(Option::is_some)
    }

    pub fn first_error(&self) -> Option<&str> {
        self.errors.iter().flatten().map(String::as_str).next()
    }

    /// Lowercased action text joined by spaces.
    pub fn actions_text(&self) -> String {
        self.model_actions
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(" ")
            .to_lowercase()
    }

    /// Lowercased non-empty extracted content joined by spaces.
    pub fn content_text(&self) -> String {
        self.extracted_content
            .iter()
            .flatten()
            .filter(|c| !c.is_empty())
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join(" ")
            .to_lowercase()
    }
}
