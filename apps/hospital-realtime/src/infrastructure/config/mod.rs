//! Configuration Module
//!
//! Environment-driven configuration for the gateway client and the binary.

mod settings;

pub use settings::{ClientConfig, ConfigError, GatewaySettings, RegionSetting, StartupTopics};
