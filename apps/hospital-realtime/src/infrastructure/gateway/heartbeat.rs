//! Heartbeat Liveness
//!
//! The gateway sends `heartbeat` frames; every inbound frame also counts as
//! activity. When nothing arrives for the liveness window the connection is
//! flagged degraded. Degraded is a signal only: the socket stays open and the
//! flag clears on the next inbound frame.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::infrastructure::config::GatewaySettings;

/// Configuration for liveness checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeartbeatConfig {
    /// How often to check for silence.
    pub check_interval: Duration,
    /// Silence longer than this marks the connection degraded.
    pub timeout: Duration,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            check_interval: Duration::from_secs(5),
            timeout: Duration::from_secs(60),
        }
    }
}

impl HeartbeatConfig {
    /// Build from gateway settings.
    #[must_use]
    pub const fn from_gateway_settings(settings: &GatewaySettings) -> Self {
        Self {
            check_interval: settings.heartbeat_check_interval,
            timeout: settings.heartbeat_timeout,
        }
    }
}

/// Events emitted by the monitor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HeartbeatEvent {
    /// No activity for longer than the window.
    Degraded {
        /// Time since the last activity.
        silent_for: Duration,
    },
}

/// Liveness state shared between the read loop and the monitor.
#[derive(Debug)]
pub struct HeartbeatState {
    last_activity: RwLock<Instant>,
    degraded: AtomicBool,
}

impl Default for HeartbeatState {
    fn default() -> Self {
        Self::new()
    }
}

impl HeartbeatState {
    /// Fresh state stamped now.
    #[must_use]
    pub fn new() -> Self {
        Self {
            last_activity: RwLock::new(Instant::now()),
            degraded: AtomicBool::new(false),
        }
    }

    /// Record inbound activity. Returns `true` if this cleared a degraded flag.
    pub fn record_activity(&self) -> bool {
        *self.last_activity.write() = Instant::now();
        self.degraded.swap(false, Ordering::SeqCst)
    }

    /// Time since the last activity.
    #[must_use]
    pub fn silent_for(&self) -> Duration {
        self.last_activity.read().elapsed()
    }

    /// Whether the connection is flagged degraded.
    #[must_use]
    pub fn is_degraded(&self) -> bool {
        self.degraded.load(Ordering::SeqCst)
    }

    /// Flag degraded. Returns `true` if the flag was newly set.
    fn mark_degraded(&self) -> bool {
        !self.degraded.swap(true, Ordering::SeqCst)
    }
}

/// Periodic liveness checker for one connection.
pub struct HeartbeatMonitor {
    config: HeartbeatConfig,
    state: Arc<HeartbeatState>,
    event_tx: mpsc::Sender<HeartbeatEvent>,
    cancel: CancellationToken,
}

impl HeartbeatMonitor {
    /// Create a monitor.
    #[must_use]
    pub const fn new(
        config: HeartbeatConfig,
        state: Arc<HeartbeatState>,
        event_tx: mpsc::Sender<HeartbeatEvent>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            config,
            state,
            event_tx,
            cancel,
        }
    }

    /// Run until cancelled or the event receiver goes away.
    pub async fn run(self) {
        let mut interval = tokio::time::interval(self.config.check_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                () = self.cancel.cancelled() => {
                    tracing::debug!("Heartbeat monitor cancelled");
                    break;
                }
                _ = interval.tick() => {
                    let silent_for = self.state.silent_for();
                    if silent_for > self.config.timeout && self.state.mark_degraded() {
                        tracing::warn!(
                            silent_secs = silent_for.as_secs(),
                            timeout_secs = self.config.timeout.as_secs(),
                            "No gateway activity, connection degraded"
                        );
                        if self.event_tx.send(HeartbeatEvent::Degraded { silent_for }).await.is_err() {
                            break;
                        }
                    }
                }
            }
        }
    }
}
