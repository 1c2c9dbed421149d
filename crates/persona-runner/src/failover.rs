//! Failover bookkeeping across agent-run attempts of one persona run.
//!
//! A model failure excludes only the failing model, so a provider's backup
//! entries stay eligible. A rate limit excludes the whole provider.

use std::collections::{BTreeSet, HashSet};

use persona_core::chain::classify;
use persona_core::{Provider, ProviderSettings};

const RATE_LIMIT_KEYWORDS: &[&str] = &[
    "429",
    "rate limit",
    "rate_limit",
    "ratelimit",
    "too many requests",
    "quota",
    "resource_exhausted",
];

/// How a failed attempt should be recovered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Bad model id, vision unsupported, malformed output, endpoint errors.
    ModelFailure,
    /// Cool down, then switch providers.
    RateLimit,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ModelFailure => "model_failure",
            Self::RateLimit => "rate_limit",
        }
    }
}

/// Classify an attempt's first step error by keyword.
///
/// Anything that is not a rate limit is treated as a model failure, which
/// is the cheaper recovery (switch model, no cooldown).
pub fn classify_failure(error: &str) -> FailureKind {
    let lower = error.to_lowercase();
    if RATE_LIMIT_KEYWORDS.iter().any(|k| lower.contains(k)) {
        FailureKind::RateLimit
    } else {
        FailureKind::ModelFailure
    }
}

/// Whether an attempt was useless enough to retry on another model.
///
/// Covers both the zero-action case and backends that limp along with a
/// few actions and errors without finishing.
pub fn needs_failover(
    num_actions: usize,
    is_done: bool,
    has_errors: bool,
    min_useful_steps: u32,
) -> bool {
    has_errors && !is_done && num_actions < min_useful_steps.max(1) as usize
}

#[derive(Debug)]
pub struct FailoverState<'a> {
    chain: &'a [String],
    settings: &'a ProviderSettings,
    failed_models: HashSet<String>,
    rate_limited: BTreeSet<Provider>,
}

impl<'a> FailoverState<'a> {
    pub fn new(chain: &'a [String], settings: &'a ProviderSettings) -> Self {
        Self {
            chain,
            settings,
            failed_models: HashSet::new(),
            rate_limited: BTreeSet::new(),
        }
    }

    pub fn provider_of(&self, model: &str) -> Provider {
        classify(model, self.settings)
    }

    pub fn record_failure(&mut self, model: &str, kind: FailureKind) {
        self.failed_models.insert(model.to_string());
        if kind == FailureKind::RateLimit {
            self.rate_limited.insert(self.provider_of(model));
        }
    }

    pub fn is_rate_limited(&self, provider: Provider) -> bool {
        self.rate_limited.contains(&provider)
    }

    fn is_model_excluded(&self, model: &str) -> bool {
        self.failed_models.contains(model) || self.is_rate_limited(self.provider_of(model))
    }

    /// Rate-limited, or every chain entry it owns has failed.
    pub fn is_provider_exhausted(&self, provider: Provider) -> bool {
        if self.is_rate_limited(provider) {
            return true;
        }
        let mut owned = self
            .chain
            .iter()
            .filter(|m| self.provider_of(m) == provider)
            .peekable();
        owned.peek().is_some() && owned.all(|m| self.failed_models.contains(m))
    }

    /// Exhausted providers in chain order.
    pub fn exhausted_providers(&self) -> Vec<Provider> {
        let mut exhausted = Vec::new();
        for model in self.chain {
            let provider = self.provider_of(model);
            if !exhausted.contains(&provider) && self.is_provider_exhausted(provider) {
                exhausted.push(provider);
            }
        }
        exhausted
    }

    /// First chain entry still eligible as a primary.
    pub fn next_candidate(&self) -> Option<&'a str> {
        self.chain
            .iter()
            .find(|m| !self.is_model_excluded(m))
            .map(String::as_str)
    }

    /// In-attempt fallback for `primary`: a different, non-exhausted provider.
    pub fn select_fallback(&self, primary: &str) -> Option<&'a str> {
        let primary_provider = self.provider_of(primary);
        self.chain
            .iter()
            .find(|m| {
                let provider = self.provider_of(m);
                provider != primary_provider
                    && !self.is_provider_exhausted(provider)
                    && !self.is_model_excluded(m)
            })
            .map(String::as_str)
    }
}
