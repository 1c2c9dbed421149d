//! Provider credentials and model identifiers.
//!
//! Read from environment variables through an injectable lookup so that
//! tests never touch the process environment. Empty values count as absent.

use crate::types::Provider;

pub const DEFAULT_GOOGLE_MODEL: &str = "gemini-2.0-flash";
pub const DEFAULT_GROQ_MODEL: &str = "llama-3.3-70b-versatile";
pub const DEFAULT_SAMBANOVA_MODEL: &str = "Meta-Llama-3.3-70B-Instruct";
pub const DEFAULT_CEREBRAS_MODEL: &str = "llama-3.3-70b";
pub const DEFAULT_OPENROUTER_MODEL: &str = "google/gemini-2.0-flash-exp:free";
pub const DEFAULT_OPENROUTER_BACKUPS: &[&str] = &[
    "meta-llama/llama-3.3-70b-instruct:free",
    "qwen/qwen-2.5-72b-instruct:free",
];

/// Credential and model name for one provider.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProviderEntry {
    pub api_key: Option<String>,
    pub model: String,
}

impl ProviderEntry {
    fn new(api_key: Option<String>, model: impl Into<String>) -> Self {
        Self {
            api_key: api_key.filter(|k| !k.trim().is_empty()),
            model: model.into(),
        }
    }
}

/// Credentials and models for every supported provider.
///
/// `Default` has no credentials and the built-in model names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderSettings {
    pub google: ProviderEntry,
    pub groq: ProviderEntry,
    pub sambanova: ProviderEntry,
    pub cerebras: ProviderEntry,
    pub openrouter: ProviderEntry,
    /// OpenRouter is the only provider with a multi-entry backup list.
    pub openrouter_backups: Vec<String>,
}

impl Default for ProviderSettings {
    fn default() -> Self {
        Self::from_lookup(|_| None)
    }
}

impl ProviderSettings {
    /// Load from the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load using an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let model = |name: &str, default: &str| {
            lookup(name)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .unwrap_or_else(|| default.to_string())
        };

        let openrouter_backups = lookup("OPENROUTER_BACKUP_MODELS").map_or_else(
            || {
                DEFAULT_OPENROUTER_BACKUPS
                    .iter()
                    .map(|s| (*s).to_string())
                    .collect()
            },
            |list| {
                list.split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect()
            },
        );

        Self {
            google: ProviderEntry::new(
                lookup("GOOGLE_API_KEY"),
                model("GOOGLE_MODEL", DEFAULT_GOOGLE_MODEL),
            ),
            groq: ProviderEntry::new(
                lookup("GROQ_API_KEY"),
                model("GROQ_MODEL", DEFAULT_GROQ_MODEL),
            ),
            sambanova: ProviderEntry::new(
                lookup("SAMBANOVA_API_KEY"),
                model("SAMBANOVA_MODEL", DEFAULT_SAMBANOVA_MODEL),
            ),
            cerebras: ProviderEntry::new(
                lookup("CEREBRAS_API_KEY"),
                model("CEREBRAS_MODEL", DEFAULT_CEREBRAS_MODEL),
            ),
            openrouter: ProviderEntry::new(
                lookup("OPENROUTER_API_KEY"),
                model("OPENROUTER_MODEL", DEFAULT_OPENROUTER_MODEL),
            ),
            openrouter_backups,
        }
    }

    pub fn entry(&self, provider: Provider) -> &ProviderEntry {
        match provider {
            Provider::Google => &self.google,
            Provider::Groq => &self.groq,
            Provider::Sambanova => &self.sambanova,
            Provider::Cerebras => &self.cerebras,
            Provider::Openrouter => &self.openrouter,
        }
    }

    pub fn entry_mut(&mut self, provider: Provider) -> &mut ProviderEntry {
        match provider {
            Provider::Google => &mut self.google,
            Provider::Groq => &mut self.groq,
            Provider::Sambanova => &mut self.sambanova,
            Provider::Cerebras => &mut self.cerebras,
            Provider::Openrouter => &mut self.openrouter,
        }
    }

    pub fn api_key(&self, provider: Provider) -> Option<&str> {
        self.entry(provider).api_key.as_deref()
    }

    pub fn has_credential(&self, provider: Provider) -> bool {
        self.api_key(provider).is_some()
    }

    pub fn model(&self, provider: Provider) -> &str {
        &self.entry(provider).model
    }

    /// Builder used by tests and embedders: set a credential (and optionally the model).
    pub fn with_provider(mut self, provider: Provider, api_key: &str, model: Option<&str>) -> Self {
        let entry = self.entry_mut(provider);
        entry.api_key = Some(api_key.to_string()).filter(|k| !k.trim().is_empty());
        if let Some(model) = model {
            entry.model = model.to_string();
        }
        self
    }

    pub fn with_openrouter_backups(mut self, backups: &[&str]) -> Self {
        self.openrouter_backups = backups.iter().map(|s| (*s).to_string()).collect();
        self
    }

    /// Provider used for the pre-run connectivity check.
    ///
    /// Preference differs from chain order: `groq > openrouter > google >
    /// sambanova > cerebras`.
    pub fn health_check_provider(&self) -> Option<Provider> {
        [
            Provider::Groq,
            Provider::Openrouter,
            Provider::Google,
            Provider::Sambanova,
            Provider::Cerebras,
        ]
        .into_iter()
        .find(|p| self.has_credential(*p))
    }
}
