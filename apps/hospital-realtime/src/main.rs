//! Hospital Realtime Binary
//!
//! Connects to the gateway, follows the configured topics and logs every
//! normalized event until interrupted.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin hospital-realtime
//! ```
//!
//! # Environment Variables
//!
//! - `HOSPITAL_GATEWAY_URL`: Gateway endpoint (default: <http://localhost:3000>)
//! - `HOSPITAL_AUTH_TOKEN`: Bearer token (default: anonymous)
//! - `HOSPITAL_ID`: Hospital whose surge and bed-space feeds are followed
//! - `HOSPITAL_REGION`: `lat,lng,radiusKm` region to watch
//! - `HOSPITAL_CHANNELS`: Comma-separated channel names
//! - `HOSPITAL_METRICS_PORT`: Prometheus metrics port (default: 9090, 0 = disabled)
//! - `OTEL_ENABLED`: Enable OpenTelemetry (default: true)
//! - `OTEL_EXPORTER_OTLP_ENDPOINT`: OTLP endpoint (default: <http://localhost:4317>)
//! - `RUST_LOG`: Log level (default: info)
//!
//! See `ClientConfig` for the reconnect and timeout settings.

use anyhow::Context;
use hospital_realtime::infrastructure::telemetry;
use hospital_realtime::{ClientConfig, EventKind, GatewayClient, NormalizedEvent, init_metrics};
use tokio::signal;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Err only if a provider is already installed.
    let _ = rustls::crypto::ring::default_provider().install_default();

    load_dotenv();

    let _telemetry_guard = telemetry::init();

    tracing::info!("Starting hospital realtime client");

    let config = ClientConfig::from_env().context("invalid configuration")?;
    log_config(&config);

    let _metrics_handle = if config.metrics_port == 0 {
        None
    } else {
        match init_metrics(config.metrics_port) {
            Ok(handle) => Some(handle),
            Err(e) => {
                tracing::warn!(error = %e, "Metrics exporter unavailable");
                None
            }
        }
    };

    let client = GatewayClient::new(config.gateway.clone(), config.active_statuses.clone());
    for kind in EventKind::ALL {
        client.on(kind, log_event);
    }

    client.connect(config.gateway.url.clone(), config.token.expose());

    client
        .ready()
        .await
        .context("gateway connection failed")?;
    tracing::info!(client_id = client.client_id(), "Gateway client ready");

    for topic in config.topics.to_topics() {
        match client.subscribe(topic.clone()).await {
            Ok(()) => tracing::info!(topic = %topic, "Subscribed"),
            Err(e) => tracing::warn!(topic = %topic, error = %e, "Subscribe failed"),
        }
    }

    await_shutdown().await;

    client.close();
    tracing::info!("Hospital realtime client stopped");
    Ok(())
}

fn log_event(event: &NormalizedEvent) {
    tracing::info!(
        kind = event.kind.as_str(),
        event = %event.raw_event_name,
        family = ?event.family.map(|f| f.as_str()),
        hospital_id = ?event.hospital_id,
        entities = event.entities.len(),
        "Gateway event"
    );
}

/// Load .env file from current or ancestor directories.
fn load_dotenv() {
    if dotenvy::dotenv().is_ok() {
        return;
    }

    if let Ok(cwd) = std::env::current_dir() {
        let mut dir = cwd.as_path();
        while let Some(parent) = dir.parent() {
            let env_path = parent.join(".env");
            if env_path.exists() {
                let _ = dotenvy::from_path(&env_path);
                return;
            }
            dir = parent;
        }
    }
}

/// Log the parsed configuration.
fn log_config(config: &ClientConfig) {
    tracing::info!(
        gateway_url = %config.gateway.url,
        api_base_url = %config.api_base_url,
        anonymous = config.token.is_anonymous(),
        topics = config.topics.to_topics().len(),
        metrics_port = config.metrics_port,
        "Configuration loaded"
    );
    tracing::debug!(
        max_reconnect_attempts = config.gateway.max_reconnect_attempts,
        connect_timeout_secs = config.gateway.connect_timeout.as_secs(),
        heartbeat_timeout_secs = config.gateway.heartbeat_timeout.as_secs(),
        "Gateway settings"
    );
}

/// Wait for shutdown signal (SIGTERM or SIGINT).
#[allow(clippy::expect_used)]
async fn await_shutdown() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("signal handler installation is critical for graceful shutdown");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("SIGTERM handler installation is critical for graceful shutdown")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, initiating shutdown");
        }
    }
}
