//! Application Layer - Use cases and port definitions.
//!
//! This layer holds the subscription registry and callback dispatcher, and
//! the port interfaces the gateway adapter implements for them.

/// Port interfaces and the gateway error taxonomy.
pub mod ports;

/// Subscription registry and callback dispatcher.
pub mod services;
