//! Prometheus Metrics Module
//!
//! Exposes client metrics in Prometheus format.
//!
//! # Metrics Categories
//!
//! - **Frames**: inbound frames by event name, ack timeouts
//! - **Events**: normalized events dispatched by kind, events dropped by reason
//! - **Connection**: connection state gauge, reconnect attempts
//! - **Subscriptions**: active topic count
//! - **Callbacks**: callback panics
//!
//! # Integration
//!
//! When a port is configured the exporter serves `/metrics` on it; otherwise
//! the recorder is installed and the handle can render on demand.

use std::net::SocketAddr;
use std::sync::OnceLock;

use metrics::{counter, describe_counter, describe_gauge, gauge};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};

use crate::domain::events::EventKind;

// =============================================================================
// Global Metrics Handle
// =============================================================================

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Metrics initialization errors.
#[derive(Debug, thiserror::Error)]
pub enum MetricsError {
    /// The exporter could not be built.
    #[error("failed to build Prometheus exporter: {0}")]
    Build(#[from] BuildError),

    /// Another recorder is already installed.
    #[error("failed to install metrics recorder: {0}")]
    Install(String),
}

/// Install the Prometheus recorder, serving `/metrics` on `port` when non-zero.
///
/// Calling this again returns the handle installed first. The HTTP listener
/// is spawned on the current Tokio runtime.
///
/// # Errors
///
/// Returns an error if the exporter cannot be built or a different recorder
/// is already installed.
pub fn init_metrics(port: u16) -> Result<PrometheusHandle, MetricsError> {
    if let Some(handle) = PROMETHEUS_HANDLE.get() {
        return Ok(handle.clone());
    }

    let handle = if port == 0 {
        PrometheusBuilder::new().install_recorder()?
    } else {
        let addr = SocketAddr::from(([0, 0, 0, 0], port));
        let (recorder, exporter) = PrometheusBuilder::new().with_http_listener(addr).build()?;
        let handle = recorder.handle();
        metrics::set_global_recorder(recorder).map_err(|e| MetricsError::Install(e.to_string()))?;
        tokio::spawn(async move {
            if exporter.await.is_err() {
                tracing::warn!("Prometheus exporter stopped");
            }
        });
        tracing::info!(%addr, "Prometheus exporter listening");
        handle
    };

    register_metrics();
    Ok(PROMETHEUS_HANDLE.get_or_init(|| handle).clone())
}

/// Get the Prometheus handle for rendering metrics.
///
/// Returns `None` if metrics have not been initialized.
#[must_use]
pub fn get_metrics_handle() -> Option<PrometheusHandle> {
    PROMETHEUS_HANDLE.get().cloned()
}

// =============================================================================
// Metric Registration
// =============================================================================

fn register_metrics() {
    describe_counter!(
        "hospital_realtime_frames_received_total",
        "Inbound gateway frames by event name"
    );
    describe_counter!(
        "hospital_realtime_events_dispatched_total",
        "Normalized events dispatched to callbacks by kind"
    );
    describe_counter!(
        "hospital_realtime_events_dropped_total",
        "Inbound events dropped by reason"
    );
    describe_counter!(
        "hospital_realtime_reconnects_total",
        "Reconnection attempts"
    );
    describe_counter!(
        "hospital_realtime_callback_panics_total",
        "Event callbacks that panicked"
    );
    describe_counter!(
        "hospital_realtime_ack_timeouts_total",
        "Acknowledgments that never arrived, by event"
    );
    describe_gauge!(
        "hospital_realtime_connection_state",
        "Connection state (0 disconnected, 1 connecting, 2 connected, 3 reconnecting, 4 failed)"
    );
    describe_gauge!(
        "hospital_realtime_active_topics",
        "Topics in the subscription registry"
    );
}

// =============================================================================
// Metric Recording Functions
// =============================================================================

/// Reasons an inbound frame or event is dropped.
#[derive(Debug, Clone, Copy)]
pub enum DropReason {
    /// The frame was not a valid envelope.
    UndecodableFrame,
    /// No entity could be extracted.
    MalformedPayload,
    /// An acknowledgment arrived for an unknown id.
    UnmatchedAck,
}

impl DropReason {
    const fn as_str(self) -> &'static str {
        match self {
            Self::UndecodableFrame => "undecodable_frame",
            Self::MalformedPayload => "malformed_payload",
            Self::UnmatchedAck => "unmatched_ack",
        }
    }
}

/// Record an inbound frame.
pub fn record_frame_received(event: &str) {
    counter!(
        "hospital_realtime_frames_received_total",
        "event" => event.to_string()
    )
    .increment(1);
}

/// Record a dispatched event.
pub fn record_event_dispatched(kind: EventKind) {
    counter!(
        "hospital_realtime_events_dispatched_total",
        "kind" => kind.as_str()
    )
    .increment(1);
}

/// Record a dropped frame or event.
pub fn record_event_dropped(reason: DropReason) {
    counter!(
        "hospital_realtime_events_dropped_total",
        "reason" => reason.as_str()
    )
    .increment(1);
}

/// Record a reconnection attempt.
pub fn record_reconnect() {
    counter!("hospital_realtime_reconnects_total").increment(1);
}

/// Record callbacks that panicked.
pub fn record_callback_panics(count: u64) {
    if count > 0 {
        counter!("hospital_realtime_callback_panics_total").increment(count);
    }
}

/// Record an acknowledgment timeout.
pub fn record_ack_timeout(event: &str) {
    counter!(
        "hospital_realtime_ack_timeouts_total",
        "event" => event.to_string()
    )
    .increment(1);
}

/// Set the connection state gauge.
pub fn set_connection_state(code: f64) {
    gauge!("hospital_realtime_connection_state").set(code);
}

/// Set the active topic gauge.
#[allow(clippy::cast_precision_loss)]
pub fn set_active_topics(count: usize) {
    gauge!("hospital_realtime_active_topics").set(count as f64);
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drop_reason_as_str() {
        assert_eq!(DropReason::UndecodableFrame.as_str(), "undecodable_frame");
        assert_eq!(DropReason::MalformedPayload.as_str(), "malformed_payload");
        assert_eq!(DropReason::UnmatchedAck.as_str(), "unmatched_ack");
    }

    #[test]
    fn recording_without_recorder_is_harmless() {
        record_frame_received("surge_created");
        record_event_dispatched(EventKind::Created);
        record_event_dropped(DropReason::MalformedPayload);
        record_callback_panics(0);
        set_active_topics(3);
    }
}
