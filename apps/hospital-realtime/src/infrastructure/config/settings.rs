//! Client Configuration Settings
//!
//! Configuration types for the gateway client, loaded from environment
//! variables. Numeric values that fail to parse fall back to their defaults;
//! a malformed region is an error.

use std::time::Duration;

use crate::domain::entity::ActiveStatusPolicy;
use crate::domain::subscription::{Distance, Topic};
use crate::infrastructure::gateway::AuthToken;

const DEFAULT_GATEWAY_URL: &str = "http://localhost:3000";
const DEFAULT_API_BASE_URL: &str = "http://localhost:3000";

/// Gateway connection settings.
#[derive(Debug, Clone, PartialEq)]
pub struct GatewaySettings {
    /// Gateway endpoint (`http`, `https`, `ws` or `wss`).
    pub url: String,
    /// Timeout for a single connection attempt.
    pub connect_timeout: Duration,
    /// Subscribe/unsubscribe acknowledgment timeout (optimistic acceptance).
    pub subscribe_timeout: Duration,
    /// Acknowledgment timeout for requests.
    pub request_timeout: Duration,
    /// Silence longer than this marks the connection degraded.
    pub heartbeat_timeout: Duration,
    /// How often liveness is checked.
    pub heartbeat_check_interval: Duration,
    /// Initial reconnection delay.
    pub reconnect_delay_initial: Duration,
    /// Maximum reconnection delay.
    pub reconnect_delay_max: Duration,
    /// Reconnection delay multiplier for exponential backoff.
    pub reconnect_delay_multiplier: f64,
    /// Maximum reconnection attempts before giving up (0 = unlimited).
    pub max_reconnect_attempts: u32,
}

impl Default for GatewaySettings {
    fn default() -> Self {
        Self {
            url: DEFAULT_GATEWAY_URL.to_string(),
            connect_timeout: Duration::from_secs(20),
            subscribe_timeout: Duration::from_secs(15),
            request_timeout: Duration::from_secs(15),
            heartbeat_timeout: Duration::from_secs(60),
            heartbeat_check_interval: Duration::from_secs(5),
            reconnect_delay_initial: Duration::from_millis(1000),
            reconnect_delay_max: Duration::from_secs(5),
            reconnect_delay_multiplier: 2.0,
            max_reconnect_attempts: 10,
        }
    }
}

/// Region subscription taken from configuration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RegionSetting {
    /// Centre latitude.
    pub latitude: f64,
    /// Centre longitude.
    pub longitude: f64,
    /// Radius in kilometres.
    pub radius_km: f64,
}

impl RegionSetting {
    /// Parse `lat,lng,radiusKm`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidRegion`] unless the value has exactly
    /// three finite numbers, a valid coordinate pair and a positive radius.
    pub fn parse(raw: &str) -> Result<Self, ConfigError> {
        let invalid = || ConfigError::InvalidRegion(raw.to_string());

        let parts: Vec<f64> = raw
            .split(',')
            .map(|p| p.trim().parse::<f64>())
            .collect::<Result<_, _>>()
            .map_err(|_| invalid())?;
        let [latitude, longitude, radius_km] = parts.as_slice() else {
            return Err(invalid());
        };

        let valid = parts.iter().all(|v| v.is_finite())
            && (-90.0..=90.0).contains(latitude)
            && (-180.0..=180.0).contains(longitude)
            && *radius_km > 0.0;
        if !valid {
            return Err(invalid());
        }

        Ok(Self {
            latitude: *latitude,
            longitude: *longitude,
            radius_km: *radius_km,
        })
    }
}

/// Topics to subscribe to once connected.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StartupTopics {
    /// Hospital whose surge and bedspace feeds are followed.
    pub hospital_id: Option<String>,
    /// Region to watch.
    pub region: Option<RegionSetting>,
    /// Named channels.
    pub channels: Vec<String>,
}

impl StartupTopics {
    /// Expand into topics: both feeds of the hospital, the region, then the
    /// channels.
    #[must_use]
    pub fn to_topics(&self) -> Vec<Topic> {
        let mut topics = Vec::new();
        if let Some(hospital_id) = &self.hospital_id {
            topics.push(Topic::hospital_surges(hospital_id.clone()));
            topics.push(Topic::hospital_bedspace(hospital_id.clone()));
        }
        if let Some(region) = self.region {
            topics.push(Topic::region(
                region.latitude,
                region.longitude,
                Distance::Kilometers(region.radius_km),
            ));
        }
        topics.extend(self.channels.iter().cloned().map(Topic::channel));
        topics
    }

    /// Whether nothing is configured.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.hospital_id.is_none() && self.region.is_none() && self.channels.is_empty()
    }
}

/// Complete client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Gateway connection settings.
    pub gateway: GatewaySettings,
    /// REST API base URL (without `/api/v1`).
    pub api_base_url: String,
    /// Bearer token; anonymous when unset.
    pub token: AuthToken,
    /// Startup subscriptions.
    pub topics: StartupTopics,
    /// Status values counted as active.
    pub active_statuses: ActiveStatusPolicy,
    /// Prometheus metrics port (0 = disabled).
    pub metrics_port: u16,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            gateway: GatewaySettings::default(),
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            token: AuthToken::anonymous(),
            topics: StartupTopics::default(),
            active_statuses: ActiveStatusPolicy::default(),
            metrics_port: 9090,
        }
    }
}

impl ClientConfig {
    /// Create configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if `HOSPITAL_REGION` is set but malformed.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create configuration through `lookup`, which maps a variable name to
    /// its value.
    ///
    /// # Errors
    ///
    /// Returns an error if `HOSPITAL_REGION` is set but malformed.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Env(&lookup);
        let defaults = Self::default();
        let gateway_defaults = defaults.gateway;

        let gateway = GatewaySettings {
            url: env
                .string("HOSPITAL_GATEWAY_URL")
                .unwrap_or(gateway_defaults.url),
            connect_timeout: env.duration_secs(
                "HOSPITAL_CONNECT_TIMEOUT_SECS",
                gateway_defaults.connect_timeout,
            ),
            subscribe_timeout: env.duration_secs(
                "HOSPITAL_SUBSCRIBE_TIMEOUT_SECS",
                gateway_defaults.subscribe_timeout,
            ),
            request_timeout: env.duration_secs(
                "HOSPITAL_REQUEST_TIMEOUT_SECS",
                gateway_defaults.request_timeout,
            ),
            heartbeat_timeout: env.duration_secs(
                "HOSPITAL_HEARTBEAT_TIMEOUT_SECS",
                gateway_defaults.heartbeat_timeout,
            ),
            heartbeat_check_interval: gateway_defaults.heartbeat_check_interval,
            reconnect_delay_initial: env.duration_millis(
                "HOSPITAL_RECONNECT_DELAY_INITIAL_MS",
                gateway_defaults.reconnect_delay_initial,
            ),
            reconnect_delay_max: env.duration_millis(
                "HOSPITAL_RECONNECT_DELAY_MAX_MS",
                gateway_defaults.reconnect_delay_max,
            ),
            reconnect_delay_multiplier: env.f64(
                "HOSPITAL_RECONNECT_DELAY_MULTIPLIER",
                gateway_defaults.reconnect_delay_multiplier,
            ),
            max_reconnect_attempts: env.u32(
                "HOSPITAL_RECONNECT_MAX_ATTEMPTS",
                gateway_defaults.max_reconnect_attempts,
            ),
        };

        let region = env
            .string("HOSPITAL_REGION")
            .map(|raw| RegionSetting::parse(&raw))
            .transpose()?;

        let topics = StartupTopics {
            hospital_id: env.string("HOSPITAL_ID"),
            region,
            channels: env.list("HOSPITAL_CHANNELS").unwrap_or_default(),
        };

        let active_statuses = env
            .list("HOSPITAL_ACTIVE_STATUSES")
            .map_or(defaults.active_statuses, ActiveStatusPolicy::new);

        Ok(Self {
            gateway,
            api_base_url: env
                .string("HOSPITAL_API_BASE_URL")
                .unwrap_or(defaults.api_base_url),
            token: env
                .string("HOSPITAL_AUTH_TOKEN")
                .map_or_else(AuthToken::anonymous, AuthToken::new),
            topics,
            active_statuses,
            metrics_port: env.u16("HOSPITAL_METRICS_PORT", defaults.metrics_port),
        })
    }
}

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Region is not `lat,lng,radiusKm`.
    #[error("invalid HOSPITAL_REGION {0:?}: expected \"lat,lng,radiusKm\"")]
    InvalidRegion(String),
}

/// Typed reads over a variable lookup.
struct Env<'a, F>(&'a F);

impl<F> Env<'_, F>
where
    F: Fn(&str) -> Option<String>,
{
    fn string(&self, key: &str) -> Option<String> {
        (self.0)(key)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn list(&self, key: &str) -> Option<Vec<String>> {
        let items: Vec<String> = self
            .string(key)?
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(ToString::to_string)
            .collect();
        (!items.is_empty()).then_some(items)
    }

    fn u16(&self, key: &str, default: u16) -> u16 {
        self.string(key)
            .and_then(|v| v.parse().ok())
            .unwrap_or(default)
    }

    fn u32(&self, key: &str, default: u32) -> u32 {
        self.string(key)
            .and_then(|v| v.parse().ok())
            .unwrap_or(default)
    }

    fn f64(&self, key: &str, default: f64) -> f64 {
        self.string(key)
            .and_then(|v| v.parse::<f64>().ok())
            .filter(|v| v.is_finite() && *v >= 1.0)
            .unwrap_or(default)
    }

    fn duration_secs(&self, key: &str, default: Duration) -> Duration {
        self.string(key)
            .and_then(|v| v.parse::<u64>().ok())
            .map_or(default, Duration::from_secs)
    }

    fn duration_millis(&self, key: &str, default: Duration) -> Duration {
        self.string(key)
            .and_then(|v| v.parse::<u64>().ok())
            .map_or(default, Duration::from_millis)
    }
}
