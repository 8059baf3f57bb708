#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::float_cmp,
        clippy::significant_drop_tightening,
        clippy::too_many_lines,
        clippy::match_same_arms,
        clippy::needless_pass_by_value,
        clippy::needless_collect,
        clippy::option_if_let_else,
        clippy::default_trait_access,
        clippy::items_after_statements,
        clippy::or_fun_call
    )
)]

//! Hospital Realtime - Surge and Bed-space Reconciliation Client
//!
//! Maintains one connection to the hospital operations WebSocket gateway,
//! keeps topic subscriptions alive across reconnects, normalizes the
//! gateway's loosely named push events and reconciles them into local
//! surge and bed-space collections.
//!
//! # Layers (inside -> outside)
//!
//! - **Domain**: Pure types and rules
//!   - `subscription`: Topics and their identity keys
//!   - `entity`: Records, collections and the active-status policy
//!   - `events`: Canonical event kinds and the alias normalizer
//!
//! - **Application**: Use cases and port definitions
//!   - `ports`: Transport and subscription ports, gateway errors
//!   - `services`: Subscription registry, callback dispatcher
//!
//! - **Infrastructure**: Adapters and external integrations
//!   - `gateway`: WebSocket transport and the `GatewayClient`
//!   - `rest`: Hospital REST API client
//!   - `config`: Environment configuration
//!   - `metrics`, `telemetry`: Observability
//!
//! # Data Flow
//!
//! ```text
//!                    +-----------+     +------------+     +-------------+
//! Gateway WS ------> |   Codec   | --> | Normalizer | --> | EntityStore |
//!      ^             +-----------+     +------------+     +-------------+
//!      |                   |                                     |
//!      |              acks, heartbeats                           v
//!      |                                                   +------------+
//!  subscribe / replay <---- SubscriptionRegistry           | Dispatcher | --> callbacks
//!                                                          +------------+
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

// =============================================================================
// Module Declarations
// =============================================================================

/// Domain layer - Topics, entities and normalization with no I/O.
pub mod domain;

/// Application layer - Use cases and port definitions.
pub mod application;

/// Infrastructure layer - Adapters and external integrations.
pub mod infrastructure;

// =============================================================================
// Re-exports
// =============================================================================

// Domain types
pub use domain::entity::{ActiveStatusPolicy, Entity, EntityFamily, EntityStore};
pub use domain::events::{EventKind, EventNormalizer, NormalizeError, NormalizedEvent};
pub use domain::subscription::{Distance, HospitalFeed, Topic};

// Application
pub use application::ports::{
    AckOutcome, Connector, GatewayError, SubscriptionPort, TransportError, TransportLink,
};
pub use application::services::{CallbackHandle, DispatchReport, Dispatcher, SubscriptionRegistry};

// Gateway client
pub use infrastructure::gateway::{
    AuthToken, ConnectionState, ConnectionStatus, CreateSurgeRequest, EmergencyNotification,
    GatewayClient, PingResult, UpdateBedSpaceRequest, WebSocketConnector,
};

// REST client
pub use infrastructure::rest::{ApiClient, ApiError};

// Infrastructure config
pub use infrastructure::config::{ClientConfig, ConfigError, GatewaySettings, StartupTopics};

// Metrics
pub use infrastructure::metrics::{MetricsError, init_metrics};

// Telemetry
pub use infrastructure::telemetry::{TelemetryConfig, TelemetryGuard, init as init_telemetry};
