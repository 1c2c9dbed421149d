//! Pre-run connectivity check.
//!
//! One minimal completion against the preferred credentialed provider,
//! retried with exponential backoff. No browser session is opened until
//! this succeeds.

use std::time::Duration;

use persona_core::backoff::backoff_delay;
use persona_core::{Provider, ProviderSettings};
use thiserror::Error;
use tracing::{info, warn};

use crate::llm::ChatModelFactory;

const PING_PROMPT: &str = "Reply with OK.";

#[derive(Debug, Error)]
pub enum HealthError {
    #[error("no provider credential configured")]
    NoProvider,
    #[error("{provider} unreachable after {attempts} attempt(s): {last_error}")]
    Unreachable {
        provider: Provider,
        attempts: u32,
        last_error: String,
    },
}

pub type Result<T> = std::result::Result<T, HealthError>;

#[derive(Debug, Clone, Copy)]
pub struct HealthCheckPolicy {
    /// Total attempts, including the first.
    pub attempts: u32,
    pub backoff_base: Duration,
    pub backoff_cap: Duration,
}

impl Default for HealthCheckPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            backoff_base: Duration::from_secs(10),
            backoff_cap: Duration::from_secs(60),
        }
    }
}

impl HealthCheckPolicy {
    pub fn from_config(config: &persona_core::Config) -> Self {
        Self {
            attempts: config.health_check_retries,
            backoff_base: config.health_check_backoff_base(),
            backoff_cap: config.health_check_backoff_cap(),
        }
    }
}

/// Ping the health-check provider. Returns the provider that answered.
pub async fn check(
    settings: &ProviderSettings,
    factory: &dyn ChatModelFactory,
    policy: HealthCheckPolicy,
) -> Result<Provider> {
    let provider = settings
        .health_check_provider()
        .ok_or(HealthError::NoProvider)?;
    let api_key = settings.api_key(provider).unwrap_or_default();
    let model = settings.model(provider);
    let attempts = policy.attempts.max(1);
    let mut last_error = String::new();

    for attempt in 1..=attempts {
        let outcome = match factory.create(provider, model, api_key) {
            Ok(client) => client.complete(PING_PROMPT).await.map(|_| ()),
            Err(e) => Err(e),
        };

        match outcome {
            Ok(()) => {
                info!(provider = %provider, model, attempt, "health check passed");
                return Ok(provider);
            }
            Err(e) => {
                warn!(provider = %provider, model, attempt, error = %e, "health check failed");
                last_error = e.to_string();
                if attempt < attempts {
                    let delay = backoff_delay(attempt, policy.backoff_base, policy.backoff_cap);
                    info!(delay_sec = delay.as_secs(), "retrying health check after backoff");
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    Err(HealthError::Unreachable {
        provider,
        attempts,
        last_error,
    })
}
