//! Model chain construction and provider classification.
//!
//! The chain is the priority-ordered list of candidate model identifiers for
//! one persona run. Only providers with a credential contribute, and each
//! contributes only its own configured identifiers.

use crate::settings::ProviderSettings;
use crate::types::Provider;

/// Build the candidate chain from the configured credentials.
///
/// Order: every credentialed provider's primary in [`Provider::ALL`] order,
/// then the OpenRouter backups (deduplicated, never repeating the OpenRouter
/// primary).
pub fn build_chain(settings: &ProviderSettings) -> Vec<String> {
    let mut chain: Vec<String> = Vec::new();

    for provider in Provider::ALL {
        if !settings.has_credential(provider) {
            continue;
        }
        let model = settings.model(provider);
        if !model.is_empty() && !chain.iter().any(|m| m == model) {
            chain.push(model.to_string());
        }
    }

    if settings.has_credential(Provider::Openrouter) {
        for backup in &settings.openrouter_backups {
            if !backup.is_empty() && !chain.contains(backup) {
                chain.push(backup.clone());
            }
        }
    }

    chain
}

/// Owning provider of a model identifier.
///
/// Exact matches against configured names win. Groq, SambaNova and Cerebras
/// are never matched by prefix: their model names look like generic
/// OpenRouter ids (`meta-llama/llama-3.3-70b`) and would be misrouted.
pub fn classify(model: &str, settings: &ProviderSettings) -> Provider {
    for provider in [
        Provider::Google,
        Provider::Groq,
        Provider::Sambanova,
        Provider::Cerebras,
    ] {
        if settings.model(provider) == model {
            return provider;
        }
    }

    if settings.model(Provider::Openrouter) == model
        || settings.openrouter_backups.iter().any(|b| b == model)
    {
        return Provider::Openrouter;
    }

    if !model.contains('/') && model.to_lowercase().starts_with("gemini") {
        return Provider::Google;
    }

    Provider::Openrouter
}

/// Distinct providers of a chain, in chain order.
pub fn provider_pool(chain: &[String], settings: &ProviderSettings) -> Vec<Provider> {
    let mut pool = Vec::new();
    for model in chain {
        let provider = classify(model, settings);
        if !pool.contains(&provider) {
            pool.push(provider);
        }
    }
    pool
}

/// First chain entry owned by `provider`.
pub fn first_model_for<'a>(
    chain: &'a [String],
    provider: Provider,
    settings: &ProviderSettings,
) -> Option<&'a str> {
    chain
        .iter()
        .find(|m| classify(m, settings) == provider)
        .map(String::as_str)
}
