//! Liveness state
//!
//! Tracks when the peer last acknowledged a liveness probe. A connection is
//! considered idle once more than the configured threshold has passed since
//! that acknowledgment.

use std::time::Duration;
use tokio::time::Instant;

/// Last-pong bookkeeping for one connection segment
#[derive(Debug, Clone)]
pub struct LivenessTracker {
    /// Last PONG received (or the moment tracking started)
    last_pong_at: Instant,
    /// Idle threshold
    idle_timeout: Duration,
}

impl LivenessTracker {
    /// Create a tracker that counts idleness from `now`
    pub fn new(idle_timeout: Duration, now: Instant) -> Self {
        Self {
            last_pong_at: now,
            idle_timeout,
        }
    }

    /// Record that a PONG was just received
    pub fn record_pong(&mut self, now: Instant) {
        self.last_pong_at = now;
    }

    pub fn last_pong_at(&self) -> Instant {
        self.last_pong_at
    }

    /// Time since the last PONG
    pub fn idle_for(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.last_pong_at)
    }

    /// Returns the idle duration if it exceeds the threshold
    pub fn check(&self, now: Instant) -> Option<Duration> {
        let idle = self.idle_for(now);
        (idle > self.idle_timeout).then_some(idle)
    }
}
