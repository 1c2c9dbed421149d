//! Core types shared by the persona runner.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for runs and batches.
/// Uses `UUIDv7` for time-ordered lexicographic sorting.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Id(pub String);

impl Id {
    pub fn new() -> Self {
        Self(Uuid::now_v7().to_string())
    }

    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Eight hex characters taken from the random tail of a fresh `UUIDv7`.
    ///
    /// Used for human-readable run ids such as `family_with_kids-3f9a01bc`.
    pub fn short() -> String {
        let simple = Uuid::now_v7().simple().to_string();
        simple[simple.len() - 8..].to_string()
    }
}

impl Default for Id {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for Id {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for Id {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Persona run lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    #[default]
    Running,
    Completed,
    Failed,
    Timeout,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Timeout => "timeout",
        }
    }
}

/// Service owning an LLM identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Google,
    Groq,
    Sambanova,
    Cerebras,
    Openrouter,
}

impl Provider {
    /// Chain precedence order.
    pub const ALL: [Provider; 5] = [
        Self::Google,
        Self::Groq,
        Self::Sambanova,
        Self::Cerebras,
        Self::Openrouter,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Google => "google",
            Self::Groq => "groq",
            Self::Sambanova => "sambanova",
            Self::Cerebras => "cerebras",
            Self::Openrouter => "openrouter",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "google" | "gemini" => Some(Self::Google),
            "groq" => Some(Self::Groq),
            "sambanova" => Some(Self::Sambanova),
            "cerebras" => Some(Self::Cerebras),
            "openrouter" => Some(Self::Openrouter),
            _ => None,
        }
    }
}

impl std::fmt::Display for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.pad(self.as_str())
    }
}

/// Language a persona converses in. Drives the wording of injected guidance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    #[default]
    Fr,
    En,
}

impl Language {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Fr => "fr",
            Self::En => "en",
        }
    }

    /// English name of the language, used inside prompts.
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Fr => "French",
            Self::En => "English",
        }
    }
}

/// Kind of stuck action sequence reported by the loop detector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PatternType {
    /// `A A A`
    Repeat,
    /// `A B A B`
    Alternating,
}

impl PatternType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Repeat => "repeat",
            Self::Alternating => "alternating",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_status_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&RunStatus::Completed).unwrap(),
            "\"completed\""
        );
        assert_eq!(
            serde_json::to_string(&RunStatus::Timeout).unwrap(),
            "\"timeout\""
        );
        assert_eq!(RunStatus::default(), RunStatus::Running);
    }

    #[test]
    fn provider_round_trips_through_parse() {
        for provider in Provider::ALL {
            assert_eq!(Provider::parse(provider.as_str()), Some(provider));
        }
        assert_eq!(Provider::parse("GEMINI"), Some(Provider::Google));
        assert_eq!(Provider::parse("azure"), None);
    }

    #[test]
    fn short_id_is_eight_hex_chars() {
        let short = Id::short();
        assert_eq!(short.len(), 8);
        assert!(short.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn language_defaults_to_french() {
        assert_eq!(Language::default(), Language::Fr);
        let lang: Language = serde_json::from_str("\"en\"").unwrap();
        assert_eq!(lang, Language::En);
    }
}
