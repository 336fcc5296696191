use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::time::Duration;

/// Window for the first retry after a healthy connection
///
/// The delay is drawn uniformly from `[0, FIRST_RETRY_WINDOW)` so that many
/// clients dropped at once do not reconnect in lockstep.
pub const FIRST_RETRY_WINDOW: Duration = Duration::from_millis(5000);

/// Largest backoff, in seconds, a strategy will wait between retries
pub const MAX_BACKOFF_SECS: f64 = 86_400.0;

/// Trait for defining reconnection strategies
///
/// Implement this trait to control how long the client waits before
/// reconnecting after an abnormal disconnection. Strategies never give up;
/// the lifecycle retries until it is closed explicitly.
pub trait ReconnectionStrategy: Send {
    /// Get the delay before the next reconnection attempt
    ///
    /// Each call consumes one retry and advances the strategy's state.
    fn next_delay(&mut self) -> Duration;

    /// Reset the strategy state (called after successful authentication)
    fn reset(&mut self);

    /// Number of retries consumed since the last reset
    fn retry_count(&self) -> u32;
}

/// Jittered exponential backoff
///
/// - retry 0: uniform in `[0, 5000)` ms
/// - retry n ≥ 1: `1000 × (backoff + uniform[0, 1))` ms, after which
///   `backoff` doubles, capped at `max_backoff`
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    initial_backoff: f64,
    max_backoff: f64,
    current_backoff: f64,
    retry_count: u32,
    rng: StdRng,
}

impl ExponentialBackoff {
    /// Create a new exponential backoff strategy
    ///
    /// # Arguments
    /// * `initial_backoff` - Backoff seconds used by the second retry
    /// * `max_backoff` - Cap for the backoff seconds
    pub fn new(initial_backoff: f64, max_backoff: f64) -> Self {
        Self::with_rng(initial_backoff, max_backoff, StdRng::from_entropy())
    }

    /// Same as [`ExponentialBackoff::new`] with a reproducible jitter source
    pub fn seeded(initial_backoff: f64, max_backoff: f64, seed: u64) -> Self {
        Self::with_rng(initial_backoff, max_backoff, StdRng::seed_from_u64(seed))
    }

    fn with_rng(initial_backoff: f64, max_backoff: f64, rng: StdRng) -> Self {
        let initial_backoff = bounded_secs(initial_backoff, 1.0);
        let max_backoff = bounded_secs(max_backoff, 32.0).max(initial_backoff);
        Self {
            initial_backoff,
            max_backoff,
            current_backoff: initial_backoff,
            retry_count: 0,
            rng,
        }
    }

    /// Backoff seconds the next non-first retry will use
    pub fn current_backoff(&self) -> f64 {
        self.current_backoff
    }
}

/// Clamp to `[0, MAX_BACKOFF_SECS]`, NaN falls back to `fallback`
fn bounded_secs(secs: f64, fallback: f64) -> f64 {
    if secs.is_nan() {
        fallback
    } else {
        secs.clamp(0.0, MAX_BACKOFF_SECS)
    }
}

impl Default for ExponentialBackoff {
    fn default() -> Self {
        Self::new(1.0, 32.0)
    }
}

impl ReconnectionStrategy for ExponentialBackoff {
    fn next_delay(&mut self) -> Duration {
        let delay_ms = if self.retry_count == 0 {
            self.rng.gen_range(0.0..FIRST_RETRY_WINDOW.as_millis() as f64)
        } else {
            let delay_ms = 1000.0 * (self.current_backoff + self.rng.gen::<f64>());
            self.current_backoff = (self.current_backoff * 2.0).min(self.max_backoff);
            delay_ms
        };

        self.retry_count = self.retry_count.saturating_add(1);
        Duration::from_secs_f64(delay_ms / 1000.0)
    }

    fn reset(&mut self) {
        self.current_backoff = self.initial_backoff;
        self.retry_count = 0;
    }

    fn retry_count(&self) -> u32 {
        self.retry_count
    }
}
