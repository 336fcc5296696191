//! Keepalive monitor
//!
//! # Architecture
//!
//! The monitor does not own a task or a socket. It keeps the deadline of the
//! next probe and the liveness state; the lifecycle task sleeps until
//! [`KeepaliveMonitor::next_probe_at`] and then calls
//! [`KeepaliveMonitor::on_tick`]:
//!
//! ```text
//! ┌──────────────────────┐
//! │  Lifecycle task      │
//! │                      │   on_tick(now)
//! │  sleep_until(next) ──┼──────────────> KeepaliveMonitor
//! │                      │ <── Probe { idle_timeout } ──┘
//! │  handle.ping()       │
//! └──────────────────────┘
//! ```
//!
//! A liveness timeout is only reported. Whether the connection is dropped is
//! left to the transport, which eventually errors or closes on its own.

use super::liveness::LivenessTracker;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Default probe interval
pub const DEFAULT_KEEPALIVE_INTERVAL: Duration = Duration::from_secs(15);

/// Default idle threshold before a liveness timeout is reported
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(300);

/// Result of [`KeepaliveMonitor::start`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeepaliveStart {
    Started,
    AlreadyRunning,
    /// The transport has no liveness probe primitive
    Unsupported,
}

/// What the lifecycle must do on a probe tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Probe {
    /// Set when the last acknowledgment is older than the idle threshold
    pub idle_timeout: Option<Duration>,
}

/// Periodic liveness probing for one connection segment
#[derive(Debug)]
pub struct KeepaliveMonitor {
    interval: Duration,
    idle_timeout: Duration,
    next_probe_at: Option<Instant>,
    liveness: Option<LivenessTracker>,
}

impl KeepaliveMonitor {
    pub fn new(interval: Duration, idle_timeout: Duration) -> Self {
        Self {
            interval,
            idle_timeout,
            next_probe_at: None,
            liveness: None,
        }
    }

    /// Start probing
    ///
    /// Idempotent while running. Does nothing when the transport cannot probe.
    pub fn start(&mut self, supports_ping: bool, now: Instant) -> KeepaliveStart {
        if self.is_running() {
            return KeepaliveStart::AlreadyRunning;
        }
        if !supports_ping {
            return KeepaliveStart::Unsupported;
        }

        debug!("Keepalive started with interval: {:?}", self.interval);
        self.liveness = Some(LivenessTracker::new(self.idle_timeout, now));
        self.next_probe_at = Some(now + self.interval);
        KeepaliveStart::Started
    }

    /// Stop probing and forget the liveness state
    pub fn stop(&mut self) {
        if self.next_probe_at.take().is_some() {
            debug!("Keepalive stopped");
        }
        self.liveness = None;
    }

    pub fn is_running(&self) -> bool {
        self.next_probe_at.is_some()
    }

    /// When the next probe is due, if running
    pub fn next_probe_at(&self) -> Option<Instant> {
        self.next_probe_at
    }

    /// Time of the most recent acknowledgment, if running
    pub fn last_pong_at(&self) -> Option<Instant> {
        self.liveness.as_ref().map(LivenessTracker::last_pong_at)
    }

    /// Record a liveness acknowledgment
    pub fn record_pong(&mut self, now: Instant) {
        if let Some(liveness) = self.liveness.as_mut() {
            liveness.record_pong(now);
        }
    }

    /// Advance to the next probe
    ///
    /// Returns `None` when not running.
    pub fn on_tick(&mut self, now: Instant) -> Option<Probe> {
        let due = self.next_probe_at?;
        // Skip missed ticks rather than bursting
        let mut next = due + self.interval;
        while next <= now {
            next += self.interval;
        }
        self.next_probe_at = Some(next);

        let idle_timeout = self.liveness.as_ref().and_then(|liveness| liveness.check(now));
        if let Some(idle) = idle_timeout {
            warn!("No pong received for {:?}", idle);
        }
        debug!("Keepalive tick - sending ping");
        Some(Probe { idle_timeout })
    }
}

impl Default for KeepaliveMonitor {
    fn default() -> Self {
        Self::new(DEFAULT_KEEPALIVE_INTERVAL, DEFAULT_IDLE_TIMEOUT)
    }
}
