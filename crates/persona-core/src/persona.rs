//! Persona definitions loaded from JSON files.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::Language;

#[derive(Debug, Error)]
pub enum PersonaError {
    #[error("persona not found: {0}")]
    NotFound(PathBuf),
    #[error("failed to read persona file: {0}")]
    Read(#[from] std::io::Error),
    #[error("invalid persona file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
}

pub type Result<T> = std::result::Result<T, PersonaError>;

/// A single scripted phase in the persona's conversation flow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationGoal {
    pub phase: String,
    #[serde(default)]
    pub goal: String,
    #[serde(default)]
    pub example_message: Option<String>,
    /// Entries like `"datePicker: pick a week in July"`.
    #[serde(default)]
    pub widget_interactions: Vec<String>,
    #[serde(default)]
    pub min_messages: Option<u32>,
    #[serde(default)]
    pub success_indicator: Option<String>,
}

impl ConversationGoal {
    pub fn new(phase: impl Into<String>) -> Self {
        Self {
            phase: phase.into(),
            goal: String::new(),
            example_message: None,
            widget_interactions: Vec::new(),
            min_messages: None,
            success_indicator: None,
        }
    }

    /// Lowercased widget type names (text before the first `:`).
    pub fn widget_types(&self) -> Vec<String> {
        self.widget_interactions
            .iter()
            .filter_map(|wi| wi.split(':').next())
            .map(|t| t.trim().to_lowercase())
            .filter(|t| !t.is_empty())
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConversationStyle {
    pub verbosity: String,
    pub formality: String,
    pub asks_questions: bool,
    pub expresses_frustration: bool,
    pub changes_mind: bool,
}

impl Default for ConversationStyle {
    fn default() -> Self {
        Self {
            verbosity: "medium".to_string(),
            formality: "casual".to_string(),
            asks_questions: true,
            expresses_frustration: false,
            changes_mind: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TravelProfile {
    #[serde(default)]
    pub group_type: String,
    #[serde(default)]
    pub travelers: BTreeMap<String, u32>,
    #[serde(default)]
    pub budget_range: String,
    #[serde(default)]
    pub preferred_destinations: Vec<String>,
    #[serde(default)]
    pub avoided: Vec<String>,
    #[serde(default)]
    pub trip_type: Option<String>,
    #[serde(default)]
    pub flexibility: Option<String>,
    #[serde(default)]
    pub preferred_month: Option<String>,
    #[serde(default)]
    pub trip_duration: Option<String>,
}

/// Full persona definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersonaDefinition {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub age: Option<u32>,
    #[serde(default)]
    pub language: Language,
    #[serde(default)]
    pub role: String,
    #[serde(default)]
    pub personality_traits: Vec<String>,
    #[serde(default)]
    pub conversation_style: ConversationStyle,
    #[serde(default)]
    pub travel_profile: TravelProfile,
    /// Ordered phases. The last one is always feedback submission.
    #[serde(default)]
    pub conversation_goals: Vec<ConversationGoal>,
    #[serde(default)]
    pub evaluation_weight_overrides: BTreeMap<String, f64>,
}

impl PersonaDefinition {
    /// Minimal persona with the given phase names, mostly for tests and demos.
    pub fn with_phases(id: &str, language: Language, phases: &[&str]) -> Self {
        Self {
            id: id.to_string(),
            name: id.to_string(),
            age: None,
            language,
            role: String::new(),
            personality_traits: Vec::new(),
            conversation_style: ConversationStyle::default(),
            travel_profile: TravelProfile::default(),
            conversation_goals: phases.iter().map(|p| ConversationGoal::new(*p)).collect(),
            evaluation_weight_overrides: BTreeMap::new(),
        }
    }

    pub fn phase_names(&self) -> Vec<&str> {
        self.conversation_goals
            .iter()
            .map(|g| g.phase.as_str())
            .collect()
    }
}

/// Load `<dir>/<id>.json`.
pub fn load_persona(dir: &Path, id: &str) -> Result<PersonaDefinition> {
    let path = dir.join(format!("{id}.json"));
    if !path.exists() {
        return Err(PersonaError::NotFound(path));
    }
    parse_file(&path)
}

/// Load every `*.json` in `dir`, sorted by file name, skipping `_`-prefixed files.
pub fn load_all(dir: &Path) -> Result<Vec<PersonaDefinition>> {
    let mut paths: Vec<PathBuf> = std::fs::read_dir(dir)?
        .filter_map(std::result::Result::ok)
        .map(|entry| entry.path())
        .filter(|path| {
            path.extension().is_some_and(|ext| ext == "json")
                && path
                    .file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| !n.starts_with('_'))
        })
        .collect();
    paths.sort();
    paths.iter().map(|p| parse_file(p)).collect()
}

fn parse_file(path: &Path) -> Result<PersonaDefinition> {
    let content = std::fs::read_to_string(path)?;
    serde_json::from_str(&content).map_err(|source| PersonaError::Parse {
        path: path.to_path_buf(),
        source,
    })
}
