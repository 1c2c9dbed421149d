//! Per-step throttling and failure backoff.

use std::time::Duration;

use persona_core::backoff::backoff_delay;
use tokio::time::Instant;

/// Pause chosen for one step boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaceDelay {
    None,
    /// Remainder of the minimum interval since the previous step.
    Throttle(Duration),
    /// Exponential backoff after consecutive step failures.
    FailureBackoff(Duration),
}

impl PaceDelay {
    pub fn duration(&self) -> Duration {
        match self {
            Self::None => Duration::ZERO,
            Self::Throttle(d) | Self::FailureBackoff(d) => *d,
        }
    }
}

#[derive(Debug, Clone)]
pub struct StepPacer {
    min_interval: Duration,
    backoff_base: Duration,
    backoff_cap: Duration,
    last_step_end: Option<Instant>,
}

impl StepPacer {
    pub fn new(min_interval: Duration, backoff_base: Duration, backoff_cap: Duration) -> Self {
        Self {
            min_interval,
            backoff_base,
            backoff_cap,
            last_step_end: None,
        }
    }

    /// Delay owed at `now`. A failure backoff replaces the throttle.
    pub fn delay_for(&self, now: Instant, consecutive_failures: u32) -> PaceDelay {
        if consecutive_failures > 0 {
            return PaceDelay::FailureBackoff(backoff_delay(
                consecutive_failures,
                self.backoff_base,
                self.backoff_cap,
            ));
        }
        let Some(last) = self.last_step_end else {
            return PaceDelay::None;
        };
        let elapsed = now.saturating_duration_since(last);
        if elapsed >= self.min_interval {
            PaceDelay::None
        } else {
            PaceDelay::Throttle(self.min_interval - elapsed)
        }
    }

    pub fn mark_step_end(&mut self, at: Instant) {
        self.last_step_end = Some(at);
    }

    /// Sleep whatever is owed, then record the step boundary.
    pub async fn pace(&mut self, consecutive_failures: u32) -> PaceDelay {
        let delay = self.delay_for(Instant::now(), consecutive_failures);
        let wait = delay.duration();
        if !wait.is_zero() {
            tokio::time::sleep(wait).await;
        }
        self.mark_step_end(Instant::now());
        delay
    }
}
