// =============================================================================
// Ingestion Loop — fixed-interval price polling
// =============================================================================
//
// Runs as a background Tokio task for the whole process lifetime:
//   1. Wait for the next tick.
//   2. Poll the price source (bounded by the request timeout and by the tick
//      interval, whichever is shorter).
//   3. On success: overwrite the latest price and offer it to the history.
//   4. On failure: log + record the error and try again on the next tick.
//
// The loop never returns and never propagates an error. With backoff enabled
// in the config, an extra delay (doubling per consecutive failure, capped) is
// inserted while the source keeps failing; the baseline is a plain retry on
// every tick.
// =============================================================================

use std::sync::Arc;
use std::time::Duration;

use tokio::time::{interval, timeout, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::app_state::AppState;
use crate::market_data::{PriceSource, SourceError};
use crate::runtime_config::BackoffConfig;

/// Result of a single tick.
#[derive(Debug, Clone, PartialEq)]
pub enum TickOutcome {
    /// New distinct price, appended to the history.
    Appended(f64),
    /// Same price as the last history entry; only the latest cell changed.
    Unchanged(f64),
    Failed(SourceError),
}

pub struct IngestionLoop {
    state: Arc<AppState>,
    source: Arc<dyn PriceSource>,
    poll_interval: Duration,
    poll_deadline: Duration,
    backoff: BackoffConfig,
}

impl IngestionLoop {
    pub fn new(state: Arc<AppState>, source: Arc<dyn PriceSource>) -> Self {
        let config = &state.runtime_config;
        let poll_interval = config.poll_interval();
        let poll_deadline = config.poll_deadline();
        let backoff = config.backoff.clone();

        state.set_source(source.describe());

        Self {
            state,
            source,
            poll_interval,
            poll_deadline,
            backoff,
        }
    }

    /// Poll once and apply the result to the shared state.
    pub async fn tick(&self) -> TickOutcome {
        let polled = match timeout(self.poll_deadline, self.source.poll()).await {
            Ok(result) => result,
            Err(_) => Err(SourceError::Unavailable(format!(
                "poll timed out after {}ms",
                self.poll_deadline.as_millis()
            ))),
        };

        match polled {
            Ok(price) => {
                let previous = self.state.history.last();
                let appended = self.state.apply_sample(price);

                let streak = self.state.clear_failures();
                if streak > 0 {
                    info!(failed_polls = streak, price, "price source recovered");
                }

                if appended {
                    let change = previous.map(|p| price - p);
                    info!(price, change = ?change, history_len = self.state.history.len(), "price changed");
                    TickOutcome::Appended(price)
                } else {
                    debug!(price, "price unchanged");
                    TickOutcome::Unchanged(price)
                }
            }
            Err(e) => {
                let streak = self.state.record_failure(&e);
                warn!(error = %e, consecutive_failures = streak, "price poll failed");
                TickOutcome::Failed(e)
            }
        }
    }

    /// Run forever. Intended to be `tokio::spawn`ed once at startup.
    pub async fn run(self) {
        info!(
            source = %self.source.describe(),
            interval_ms = self.poll_interval.as_millis() as u64,
            backoff = self.backoff.enabled,
            "ingestion loop starting"
        );

        let mut ticker = interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;

            if let TickOutcome::Failed(_) = self.tick().await {
                if let Some(delay) = self.retry_delay() {
                    debug!(delay_ms = delay.as_millis() as u64, "backing off");
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    /// Extra delay before the next poll while the source is failing.
    fn retry_delay(&self) -> Option<Duration> {
        if !self.backoff.enabled {
            return None;
        }
        backoff_delay(
            self.state.consecutive_failures(),
            self.poll_interval,
            Duration::from_millis(self.backoff.max_delay_ms),
        )
    }
}

/// `base * 2^(failures - 1)`, capped at `max`. `None` when nothing has
/// failed.
fn backoff_delay(failures: u64, base: Duration, max: Duration) -> Option<Duration> {
    if failures == 0 {
        return None;
    }
    let exp = (failures - 1).min(16) as u32;
    let delay = base.saturating_mul(1u32 << exp);
    Some(delay.min(max))
}
