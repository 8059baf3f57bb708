//! Port Interfaces
//!
//! Contracts between the application services and the gateway adapters,
//! following the Hexagonal Architecture pattern.
//!
//! ## Driven Ports (Outbound)
//!
//! - [`Connector`]: opens one transport link to the gateway
//! - [`SubscriptionPort`]: issues topic registration requests on the live link
//!
//! The typed failures every public operation can return live here too, so
//! services and adapters agree on one error taxonomy.

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::mpsc;

use crate::domain::events::NormalizeError;
use crate::domain::subscription::Topic;

// =============================================================================
// Errors
// =============================================================================

/// Transport-level failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// The endpoint could not be turned into a WebSocket URL.
    #[error("invalid endpoint: {0}")]
    InvalidEndpoint(String),

    /// The connection or handshake failed.
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    /// The link was closed while sending.
    #[error("connection closed")]
    Closed,
}

/// Failures surfaced by gateway operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GatewayError {
    /// Operation attempted while the transport is not connected.
    #[error("not connected to gateway")]
    NotConnected,

    /// The client was disconnected or closed while the operation was pending.
    #[error("client disconnected")]
    Disconnected,

    /// No acknowledgment arrived in time and no fallback applies.
    #[error("timed out waiting for '{event}' acknowledgment")]
    Timeout {
        /// Outbound event name.
        event: String,
    },

    /// The gateway answered with an explicit failure.
    #[error("gateway rejected '{event}': {reason}")]
    ServerRejected {
        /// Outbound event name.
        event: String,
        /// Reason given by the gateway.
        reason: String,
    },

    /// A payload could not be interpreted.
    #[error("malformed payload: {0}")]
    MalformedPayload(String),

    /// Automatic reconnection gave up.
    #[error("reconnection attempts exhausted after {attempts} attempts")]
    ReconnectExhausted {
        /// Attempts made before giving up.
        attempts: u32,
    },

    /// Transport failure.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),
}

impl From<NormalizeError> for GatewayError {
    fn from(err: NormalizeError) -> Self {
        Self::MalformedPayload(err.to_string())
    }
}

// =============================================================================
// Connector Port
// =============================================================================

/// Channels bridging one live transport connection.
///
/// Text frames go out through `outbound` and arrive on `inbound`. The inbound
/// channel closing means the transport disconnected; dropping `outbound`
/// closes the connection.
#[derive(Debug)]
pub struct TransportLink {
    /// Frames to send.
    pub outbound: mpsc::Sender<String>,
    /// Frames received.
    pub inbound: mpsc::Receiver<String>,
}

/// Opens transport links to the gateway.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    /// Connect to `endpoint`, authenticating with the bearer `token`.
    async fn connect(&self, endpoint: &str, token: &str) -> Result<TransportLink, TransportError>;
}

// =============================================================================
// Subscription Port
// =============================================================================

/// Result of waiting for an acknowledgment.
#[derive(Debug, Clone, PartialEq)]
pub enum AckOutcome {
    /// The gateway acknowledged with this body.
    Acked(Value),
    /// No acknowledgment arrived within the configured window.
    TimedOut,
}

/// Topic registration on the live connection.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SubscriptionPort: Send + Sync {
    /// Whether the transport is currently connected.
    fn is_connected(&self) -> bool;

    /// Send the registration request for `topic` and wait for its ack.
    async fn subscribe_topic(&self, topic: &Topic) -> Result<AckOutcome, GatewayError>;

    /// Send the removal request for `topic` and wait for its ack.
    async fn unsubscribe_topic(&self, topic: &Topic) -> Result<AckOutcome, GatewayError>;
}
