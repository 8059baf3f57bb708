//! Hospital Operations Gateway
//!
//! WebSocket client for the gateway: transport, framing, message catalogue,
//! liveness, backoff, and the [`GatewayClient`] that ties them to the
//! subscription registry, normalizer, entity store and dispatcher.

pub mod auth;
pub mod client;
pub mod codec;
pub mod heartbeat;
pub mod messages;
pub mod reconnect;
pub mod transport;

pub use auth::{ANONYMOUS_TOKEN, AuthToken};
pub use client::{ConnectionState, ConnectionStatus, GatewayClient, PingResult};
pub use codec::{CodecError, FrameCodec, InboundFrame, OutboundFrame};
pub use heartbeat::{HeartbeatConfig, HeartbeatEvent, HeartbeatMonitor, HeartbeatState};
pub use messages::{
    AckRule, ChannelMessage, ClientConnected, ControlFrame, CreateSurgeRequest,
    EmergencyNotification, UpdateBedSpaceRequest,
};
pub use reconnect::{ReconnectConfig, ReconnectPolicy};
pub use transport::WebSocketConnector;
