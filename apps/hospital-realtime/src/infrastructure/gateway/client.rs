//! Gateway Client
//!
//! Owns the single transport connection to the hospital operations gateway
//! and wires the rest of the crate to it.
//!
//! # Lifecycle
//!
//! ```text
//! Disconnected --connect()--> Connecting --ok--> Connected --link lost--> Reconnecting
//!                                  |                 ^                        |
//!                                  +------fail------>+<-------retry-----------+
//!                                                                             |
//!                                                                       budget spent
//!                                                                             v
//!                                                                          Failed
//! ```
//!
//! `disconnect()` returns to `Disconnected` from any state. On every
//! successful connect the client announces itself with `client_connected`,
//! replays the subscription registry, and only then reports `ready`.
//! Degraded liveness is a flag on the status, not a state.
//!
//! # Inbound path
//!
//! Frame -> codec -> acknowledgment, control frame or normalizer -> entity
//! store -> callbacks. Malformed events are logged and dropped.
//!
//! # Outbound path
//!
//! Every outbound operation fails fast with `NotConnected` unless the state
//! is `Connected`. Requests waiting for an acknowledgment settle when the ack
//! arrives, when their timeout fires, or with `NotConnected`/`Disconnected`
//! when the link is lost or the client is shut down.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde_json::{Value, json};
use tokio::sync::{mpsc, oneshot, watch};
use tokio_util::sync::CancellationToken;

use super::codec::{FrameCodec, InboundFrame, OutboundFrame};
use super::heartbeat::{HeartbeatConfig, HeartbeatEvent, HeartbeatMonitor, HeartbeatState};
use super::messages::{
    AckRule, CLIENT_CONNECTED, CREATE_SURGE, ChannelMessage, ClientConnected, ControlFrame,
    CreateSurgeRequest, EMERGENCY_NOTIFICATION, EmergencyNotification, GET_CONNECTION_STATS,
    HEARTBEAT_RESPONSE, PING, SEND_MESSAGE, TopicRequest, UPDATE_BED_SPACE, UpdateBedSpaceRequest,
    legacy_room_request, subscribe_request, unsubscribe_request,
};
use super::reconnect::{ReconnectConfig, ReconnectPolicy};
use super::transport::WebSocketConnector;
use crate::application::ports::{
    AckOutcome, Connector, GatewayError, SubscriptionPort, TransportLink,
};
use crate::application::services::{CallbackHandle, Dispatcher, SubscriptionRegistry};
use crate::domain::entity::{ActiveStatusPolicy, Entity, EntityFamily, EntityStore};
use crate::domain::events::{EventKind, EventNormalizer, NormalizedEvent};
use crate::domain::subscription::Topic;
use crate::infrastructure::config::GatewaySettings;
use crate::infrastructure::metrics::{self, DropReason};

// =============================================================================
// Connection Status
// =============================================================================

/// Lifecycle state of the connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    /// Not connected and not trying.
    #[default]
    Disconnected,
    /// First connection attempt in progress.
    Connecting,
    /// Transport is up.
    Connected,
    /// Waiting to retry after a failure or lost link.
    Reconnecting,
    /// Retry budget spent; a fresh `connect` is required.
    Failed,
}

impl ConnectionState {
    /// Get the state name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Reconnecting => "reconnecting",
            Self::Failed => "failed",
        }
    }

    const fn gauge_value(self) -> f64 {
        match self {
            Self::Disconnected => 0.0,
            Self::Connecting => 1.0,
            Self::Connected => 2.0,
            Self::Reconnecting => 3.0,
            Self::Failed => 4.0,
        }
    }
}

/// Observable connection status.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ConnectionStatus {
    /// Lifecycle state.
    pub state: ConnectionState,
    /// Last inbound activity.
    pub last_activity: Option<DateTime<Utc>>,
    /// Last connection error.
    pub last_error: Option<String>,
    /// No activity within the liveness window.
    pub degraded: bool,
    /// Connected and the subscription registry has been replayed.
    pub ready: bool,
    /// Current reconnection attempt (0 when connected).
    pub reconnect_attempt: u32,
}

/// Result of [`GatewayClient::ping`].
#[derive(Debug, Clone, PartialEq)]
pub struct PingResult {
    /// Round-trip time measured locally.
    pub latency: Duration,
    /// Acknowledgment body.
    pub response: Value,
}

// =============================================================================
// Internal State
// =============================================================================

type PendingAck = oneshot::Sender<Result<Value, GatewayError>>;

struct LinkHandle {
    generation: u64,
    sender: mpsc::Sender<String>,
}

struct Inner {
    settings: GatewaySettings,
    connector: Arc<dyn Connector>,
    client_id: String,
    codec: FrameCodec,
    normalizer: EventNormalizer,
    registry: SubscriptionRegistry,
    store: EntityStore,
    dispatcher: Dispatcher,
    status: watch::Sender<ConnectionStatus>,
    outbound: RwLock<Option<LinkHandle>>,
    pending: Mutex<HashMap<u64, PendingAck>>,
    next_ack_id: AtomicU64,
    generation: AtomicU64,
    link_seq: AtomicU64,
    session: Mutex<Option<CancellationToken>>,
}

/// Removes a pending ack entry however the request ends.
struct PendingGuard<'a> {
    pending: &'a Mutex<HashMap<u64, PendingAck>>,
    id: u64,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.pending.lock().remove(&self.id);
    }
}

// =============================================================================
// Gateway Client
// =============================================================================

/// Connection manager for the hospital operations gateway.
///
/// One instance owns one transport. Dropping it is equivalent to
/// [`GatewayClient::disconnect`].
pub struct GatewayClient {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for GatewayClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayClient")
            .field("client_id", &self.inner.client_id)
            .field("status", &*self.inner.status.borrow())
            .field("active_topics", &self.inner.registry.len())
            .finish_non_exhaustive()
    }
}

impl GatewayClient {
    /// Create a client using the WebSocket transport.
    #[must_use]
    pub fn new(settings: GatewaySettings, policy: ActiveStatusPolicy) -> Self {
        Self::with_connector(settings, policy, Arc::new(WebSocketConnector::default()))
    }

    /// Create a client over any [`Connector`].
    #[must_use]
    pub fn with_connector(
        settings: GatewaySettings,
        policy: ActiveStatusPolicy,
        connector: Arc<dyn Connector>,
    ) -> Self {
        let (status, _) = watch::channel(ConnectionStatus::default());
        Self {
            inner: Arc::new(Inner {
                settings,
                connector,
                client_id: uuid::Uuid::new_v4().to_string(),
                codec: FrameCodec::new(),
                normalizer: EventNormalizer::default(),
                registry: SubscriptionRegistry::new(),
                store: EntityStore::new(policy),
                dispatcher: Dispatcher::new(),
                status,
                outbound: RwLock::new(None),
                pending: Mutex::new(HashMap::new()),
                next_ack_id: AtomicU64::new(1),
                generation: AtomicU64::new(0),
                link_seq: AtomicU64::new(0),
                session: Mutex::new(None),
            }),
        }
    }

    /// Id announced in `client_connected`.
    #[must_use]
    pub fn client_id(&self) -> &str {
        &self.inner.client_id
    }

    // -------------------------------------------------------------------------
    // Lifecycle
    // -------------------------------------------------------------------------

    /// Start connecting to `endpoint` with the bearer `token`.
    ///
    /// Returns immediately; use [`GatewayClient::ready`] or
    /// [`GatewayClient::watch_status`] to follow progress. Calling this while
    /// a session is running replaces it, which is how a `Failed` client is
    /// restarted.
    pub fn connect(&self, endpoint: impl Into<String>, token: impl Into<String>) {
        let endpoint = endpoint.into();
        let token = token.into();

        let cancel = CancellationToken::new();
        if let Some(previous) = self.inner.session.lock().replace(cancel.clone()) {
            previous.cancel();
        }
        let generation = self.inner.generation.fetch_add(1, Ordering::SeqCst) + 1;
        self.inner.fail_pending(&GatewayError::NotConnected);

        self.inner.status.send_modify(|s| {
            *s = ConnectionStatus {
                state: ConnectionState::Connecting,
                last_activity: s.last_activity,
                ..ConnectionStatus::default()
            };
        });
        metrics::set_connection_state(ConnectionState::Connecting.gauge_value());
        tracing::info!(endpoint = %endpoint, client_id = %self.inner.client_id, "Starting gateway session");

        tokio::spawn(Arc::clone(&self.inner).run_session(endpoint, token, generation, cancel));
    }

    /// Stop the session, stop all timers, and fail pending requests with
    /// `Disconnected`. Subscription intent is kept for the next `connect`.
    pub fn disconnect(&self) {
        self.inner.shutdown();
    }

    /// Disconnect and clear subscriptions, collections and callbacks.
    pub fn close(&self) {
        self.inner.shutdown();
        self.inner.registry.clear();
        self.inner.store.clear();
        self.inner.dispatcher.clear();
        metrics::set_active_topics(0);
        tracing::info!("Gateway client closed");
    }

    /// Wait until connected with subscriptions replayed.
    ///
    /// # Errors
    ///
    /// - [`GatewayError::ReconnectExhausted`] if the session gave up
    /// - [`GatewayError::NotConnected`] if no session is running
    pub async fn ready(&self) -> Result<(), GatewayError> {
        let mut rx = self.inner.status.subscribe();
        let status = rx
            .wait_for(|s| {
                s.ready
                    || matches!(
                        s.state,
                        ConnectionState::Failed | ConnectionState::Disconnected
                    )
            })
            .await
            .map_err(|_| GatewayError::Disconnected)?
            .clone();

        match status.state {
            _ if status.ready => Ok(()),
            ConnectionState::Failed => Err(GatewayError::ReconnectExhausted {
                attempts: status.reconnect_attempt,
            }),
            _ => Err(GatewayError::NotConnected),
        }
    }

    /// Current status snapshot.
    #[must_use]
    pub fn status(&self) -> ConnectionStatus {
        self.inner.status.borrow().clone()
    }

    /// Receiver notified on every status change.
    #[must_use]
    pub fn watch_status(&self) -> watch::Receiver<ConnectionStatus> {
        self.inner.status.subscribe()
    }

    /// Whether the liveness window has been exceeded.
    #[must_use]
    pub fn is_degraded(&self) -> bool {
        self.inner.status.borrow().degraded
    }

    // -------------------------------------------------------------------------
    // Subscriptions
    // -------------------------------------------------------------------------

    /// Subscribe to a topic. An unacknowledged subscribe is accepted after
    /// the subscribe timeout.
    ///
    /// # Errors
    ///
    /// [`GatewayError::NotConnected`] or [`GatewayError::ServerRejected`].
    pub async fn subscribe(&self, topic: Topic) -> Result<(), GatewayError> {
        let result = self
            .inner
            .registry
            .subscribe(self.inner.as_ref(), topic)
            .await;
        metrics::set_active_topics(self.inner.registry.len());
        result
    }

    /// Unsubscribe from a topic. Inactive topics are a no-op.
    ///
    /// # Errors
    ///
    /// [`GatewayError::NotConnected`] or [`GatewayError::ServerRejected`];
    /// on rejection the topic stays active.
    pub async fn unsubscribe(&self, topic: &Topic) -> Result<(), GatewayError> {
        let result = self
            .inner
            .registry
            .unsubscribe(self.inner.as_ref(), topic)
            .await;
        metrics::set_active_topics(self.inner.registry.len());
        result
    }

    /// Topics the client should be subscribed to.
    #[must_use]
    pub fn active_topics(&self) -> HashSet<Topic> {
        self.inner.registry.active_topics()
    }

    // -------------------------------------------------------------------------
    // Outbound Operations
    // -------------------------------------------------------------------------

    /// Create a surge; resolves to the surge record the gateway stored.
    ///
    /// # Errors
    ///
    /// `NotConnected`, `Timeout`, `ServerRejected`, or `MalformedPayload` when
    /// the acknowledgment carries no surge.
    pub async fn create_surge(&self, request: CreateSurgeRequest) -> Result<Entity, GatewayError> {
        let body = self
            .inner
            .call(
                CREATE_SURGE,
                to_payload(&request)?,
                AckRule::RequireSuccess {
                    reason_key: "message",
                },
            )
            .await?;
        body.get("surge")
            .and_then(Entity::from_value)
            .ok_or_else(|| {
                GatewayError::MalformedPayload("create_surge ack carried no surge".to_string())
            })
    }

    /// Update bed availability; resolves to the ack's `data`.
    ///
    /// # Errors
    ///
    /// `NotConnected`, `Timeout` or `ServerRejected`.
    pub async fn update_bed_space(
        &self,
        request: UpdateBedSpaceRequest,
    ) -> Result<Value, GatewayError> {
        let body = self
            .inner
            .call(
                UPDATE_BED_SPACE,
                to_payload(&request)?,
                AckRule::RequireSuccess { reason_key: "error" },
            )
            .await?;
        Ok(body.get("data").cloned().unwrap_or(Value::Null))
    }

    /// Notify a hospital of an incoming emergency; resolves to the ack's `data`.
    ///
    /// # Errors
    ///
    /// `NotConnected`, `Timeout` or `ServerRejected`.
    pub async fn send_emergency_notification(
        &self,
        notification: EmergencyNotification,
    ) -> Result<Value, GatewayError> {
        let body = self
            .inner
            .call(
                EMERGENCY_NOTIFICATION,
                to_payload(&notification)?,
                AckRule::RequireSuccess { reason_key: "error" },
            )
            .await?;
        Ok(body.get("data").cloned().unwrap_or(Value::Null))
    }

    /// Send a message to a channel.
    ///
    /// # Errors
    ///
    /// `NotConnected`, `Timeout` or `ServerRejected`.
    pub async fn send_message(
        &self,
        channel: impl Into<String>,
        message: Value,
    ) -> Result<Value, GatewayError> {
        let payload = to_payload(&ChannelMessage {
            channel: channel.into(),
            message,
        })?;
        self.inner
            .call(SEND_MESSAGE, payload, AckRule::AcceptUnlessFailed)
            .await
    }

    /// Emit an arbitrary event and wait for its acknowledgment.
    ///
    /// # Errors
    ///
    /// `NotConnected`, `Timeout` or `ServerRejected` (`success == false`).
    pub async fn emit_with_ack(&self, event: &str, data: Value) -> Result<Value, GatewayError> {
        self.inner
            .call(event, data, AckRule::AcceptUnlessFailed)
            .await
    }

    /// Measure a round trip.
    ///
    /// # Errors
    ///
    /// `NotConnected` or `Timeout`.
    pub async fn ping(&self) -> Result<PingResult, GatewayError> {
        let started = Instant::now();
        let response = self
            .inner
            .call(PING, json!({}), AckRule::AcceptAny)
            .await?;
        Ok(PingResult {
            latency: started.elapsed(),
            response,
        })
    }

    /// Gateway connection statistics, as returned.
    ///
    /// # Errors
    ///
    /// `NotConnected` or `Timeout`.
    pub async fn connection_stats(&self) -> Result<Value, GatewayError> {
        self.inner
            .call(GET_CONNECTION_STATS, json!({}), AckRule::AcceptAny)
            .await
    }

    // -------------------------------------------------------------------------
    // Events and Collections
    // -------------------------------------------------------------------------

    /// Register a callback for normalized events of `kind`.
    pub fn on<F>(&self, kind: EventKind, callback: F) -> CallbackHandle
    where
        F: Fn(&NormalizedEvent) + Send + Sync + 'static,
    {
        self.inner.dispatcher.on(kind, callback)
    }

    /// Surge collection in arrival order.
    #[must_use]
    pub fn surges(&self) -> Arc<Vec<Entity>> {
        self.inner.store.family(EntityFamily::Surge).collection()
    }

    /// Surges whose status is active under the configured policy.
    #[must_use]
    pub fn active_surges(&self) -> Vec<Entity> {
        self.inner.store.active(EntityFamily::Surge)
    }

    /// Bed-space collection in arrival order.
    #[must_use]
    pub fn bedspaces(&self) -> Arc<Vec<Entity>> {
        self.inner.store.family(EntityFamily::Bedspace).collection()
    }
}

impl Drop for GatewayClient {
    fn drop(&mut self) {
        self.inner.shutdown();
    }
}

fn to_payload<T: serde::Serialize>(value: &T) -> Result<Value, GatewayError> {
    serde_json::to_value(value).map_err(|e| GatewayError::MalformedPayload(e.to_string()))
}

// =============================================================================
// Session
// =============================================================================

impl Inner {
    async fn run_session(
        self: Arc<Self>,
        endpoint: String,
        token: String,
        generation: u64,
        cancel: CancellationToken,
    ) {
        let mut policy =
            ReconnectPolicy::new(ReconnectConfig::from_gateway_settings(&self.settings));

        loop {
            let attempt = tokio::select! {
                () = cancel.cancelled() => return,
                result = tokio::time::timeout(
                    self.settings.connect_timeout,
                    self.connector.connect(&endpoint, &token),
                ) => result,
            };

            let error = match attempt {
                Ok(Ok(link)) => {
                    policy.reset();
                    self.drive_link(link, generation, &cancel).await;
                    if cancel.is_cancelled() {
                        return;
                    }
                    self.fail_pending(&GatewayError::NotConnected);
                    "connection lost".to_string()
                }
                Ok(Err(e)) => e.to_string(),
                Err(_) => format!(
                    "connect timed out after {}s",
                    self.settings.connect_timeout.as_secs_f64()
                ),
            };
            tracing::warn!(error = %error, "Gateway connection unavailable");

            let Some(delay) = policy.next_delay() else {
                let exhausted = GatewayError::ReconnectExhausted {
                    attempts: policy.attempt_count(),
                };
                tracing::error!(error = %exhausted, "Giving up on gateway connection");
                let attempts = policy.attempt_count();
                self.update_status(generation, |s| {
                    s.state = ConnectionState::Failed;
                    s.ready = false;
                    s.degraded = false;
                    s.reconnect_attempt = attempts;
                    s.last_error = Some(exhausted.to_string());
                });
                return;
            };

            let attempt = policy.attempt_count();
            metrics::record_reconnect();
            tracing::info!(
                attempt,
                delay_ms = delay.as_millis(),
                "Reconnecting to gateway"
            );
            self.update_status(generation, |s| {
                s.state = ConnectionState::Reconnecting;
                s.ready = false;
                s.degraded = false;
                s.reconnect_attempt = attempt;
                s.last_error = Some(error);
            });

            tokio::select! {
                () = cancel.cancelled() => return,
                () = tokio::time::sleep(delay) => {}
            }
        }
    }

    async fn drive_link(
        self: &Arc<Self>,
        link: TransportLink,
        generation: u64,
        cancel: &CancellationToken,
    ) {
        let TransportLink {
            outbound,
            mut inbound,
        } = link;
        let link_id = self.link_seq.fetch_add(1, Ordering::SeqCst) + 1;
        *self.outbound.write() = Some(LinkHandle {
            generation,
            sender: outbound,
        });

        let heartbeat = Arc::new(HeartbeatState::new());
        let (heartbeat_tx, mut heartbeat_rx) = mpsc::channel::<HeartbeatEvent>(4);
        // Scopes the heartbeat monitor and the replay task to this link.
        let link_cancel = cancel.child_token();
        tokio::spawn(
            HeartbeatMonitor::new(
                HeartbeatConfig::from_gateway_settings(&self.settings),
                Arc::clone(&heartbeat),
                heartbeat_tx,
                link_cancel.clone(),
            )
            .run(),
        );

        self.update_status(generation, |s| {
            s.state = ConnectionState::Connected;
            s.ready = false;
            s.degraded = false;
            s.reconnect_attempt = 0;
            s.last_error = None;
            s.last_activity = Some(Utc::now());
        });
        tracing::info!(client_id = %self.client_id, "Connected to gateway");

        let announce = serde_json::to_value(ClientConnected::new(self.client_id.clone()))
            .unwrap_or(Value::Null);
        if let Err(e) = self.send_event(CLIENT_CONNECTED, announce).await {
            tracing::warn!(error = %e, "Failed to announce client");
        }

        let replay = Arc::clone(self);
        let replay_cancel = link_cancel.clone();
        tokio::spawn(async move {
            let report = tokio::select! {
                () = replay_cancel.cancelled() => {
                    tracing::debug!("Link ended before subscription replay finished");
                    return;
                }
                report = replay.registry.replay_all(replay.as_ref()) => report,
            };
            metrics::set_active_topics(replay.registry.len());
            tracing::info!(
                replayed = report.replayed,
                failed = report.failed,
                "Subscription replay finished"
            );
            let current = replay.link_seq.load(Ordering::SeqCst) == link_id;
            replay.update_status(generation, |s| {
                if current && s.state == ConnectionState::Connected {
                    s.ready = true;
                }
            });
        });

        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                Some(HeartbeatEvent::Degraded { .. }) = heartbeat_rx.recv() => {
                    self.update_status(generation, |s| s.degraded = true);
                }
                frame = inbound.recv() => {
                    let Some(text) = frame else {
                        tracing::info!("Gateway link closed");
                        break;
                    };
                    if heartbeat.record_activity() {
                        tracing::info!("Gateway activity resumed");
                        self.update_status(generation, |s| s.degraded = false);
                    }
                    self.touch_activity();
                    self.handle_frame(&text).await;
                }
            }
        }

        link_cancel.cancel();
        let mut outbound = self.outbound.write();
        if outbound.as_ref().is_some_and(|l| l.generation == generation) {
            *outbound = None;
        }
    }

    async fn handle_frame(&self, text: &str) {
        let frame = match self.codec.decode(text) {
            Ok(frame) => frame,
            Err(e) => {
                tracing::warn!(error = %e, "Ignoring undecodable frame");
                metrics::record_event_dropped(DropReason::UndecodableFrame);
                return;
            }
        };

        match frame {
            InboundFrame::Ack { id, data } => {
                let waiter = self.pending.lock().remove(&id);
                if let Some(tx) = waiter {
                    let _ = tx.send(Ok(data));
                } else {
                    tracing::debug!(id, "Acknowledgment for unknown request");
                    metrics::record_event_dropped(DropReason::UnmatchedAck);
                }
            }
            InboundFrame::Event { event, data } => {
                metrics::record_frame_received(&event);
                match ControlFrame::from_event(&event) {
                    Some(ControlFrame::Heartbeat) => {
                        tracing::debug!(event = %event, "Heartbeat received");
                        let reply = json!({
                            "clientId": self.client_id,
                            "timestamp": Utc::now().to_rfc3339(),
                        });
                        if let Err(e) = self.send_event(HEARTBEAT_RESPONSE, reply).await {
                            tracing::debug!(error = %e, "Failed to answer heartbeat");
                        }
                    }
                    Some(ControlFrame::SubscriptionConfirmed) => {
                        tracing::info!(event = %event, payload = %data, "Subscription confirmed");
                    }
                    None => self.process_event(&event, data),
                }
            }
        }
    }

    fn process_event(&self, event: &str, data: Value) {
        match self.normalizer.classify(event, data) {
            Ok(normalized) => {
                tracing::debug!(
                    event = %event,
                    kind = normalized.kind.as_str(),
                    entities = normalized.entities.len(),
                    hospital_id = ?normalized.hospital_id,
                    "Event normalized"
                );
                self.store.reconcile(&normalized);
                let report = self.dispatcher.emit(&normalized);
                metrics::record_event_dispatched(normalized.kind);
                metrics::record_callback_panics(u64::try_from(report.panicked).unwrap_or(u64::MAX));
            }
            Err(e) => {
                let error = GatewayError::from(e);
                tracing::warn!(event = %event, error = %error, "Dropping event");
                metrics::record_event_dropped(DropReason::MalformedPayload);
            }
        }
    }

    // -------------------------------------------------------------------------
    // Outbound Plumbing
    // -------------------------------------------------------------------------

    fn ensure_connected(&self) -> Result<(), GatewayError> {
        if self.status.borrow().state == ConnectionState::Connected {
            Ok(())
        } else {
            Err(GatewayError::NotConnected)
        }
    }

    async fn send_event(&self, event: &str, data: Value) -> Result<(), GatewayError> {
        self.send_frame(&OutboundFrame::event(event, data)).await
    }

    async fn send_frame(&self, frame: &OutboundFrame) -> Result<(), GatewayError> {
        let text = self
            .codec
            .encode(frame)
            .map_err(|e| GatewayError::MalformedPayload(e.to_string()))?;
        let sender = self.outbound.read().as_ref().map(|l| l.sender.clone());
        let Some(sender) = sender else {
            return Err(GatewayError::NotConnected);
        };
        tracing::debug!(event = %frame.event, id = ?frame.id, "Sending frame");
        sender
            .send(text)
            .await
            .map_err(|_| GatewayError::NotConnected)
    }

    async fn request(
        &self,
        event: &str,
        data: Value,
        timeout: Duration,
    ) -> Result<AckOutcome, GatewayError> {
        self.ensure_connected()?;

        let id = self.next_ack_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        self.pending.lock().insert(id, tx);
        let _guard = PendingGuard {
            pending: &self.pending,
            id,
        };

        self.send_frame(&OutboundFrame::with_ack(event, data, id))
            .await?;

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(result)) => result.map(AckOutcome::Acked),
            Ok(Err(_)) => Err(GatewayError::Disconnected),
            Err(_) => {
                tracing::warn!(event, id, "Acknowledgment timed out");
                metrics::record_ack_timeout(event);
                Ok(AckOutcome::TimedOut)
            }
        }
    }

    async fn call(&self, event: &str, data: Value, rule: AckRule) -> Result<Value, GatewayError> {
        match self
            .request(event, data, self.settings.request_timeout)
            .await?
        {
            AckOutcome::Acked(body) => rule.apply(event, body),
            AckOutcome::TimedOut => Err(GatewayError::Timeout {
                event: event.to_string(),
            }),
        }
    }

    async fn topic_request(
        &self,
        topic: &Topic,
        request: TopicRequest,
        subscribe: bool,
    ) -> Result<AckOutcome, GatewayError> {
        let timeout = self.settings.subscribe_timeout;
        let body = match self.request(request.event, request.data, timeout).await? {
            AckOutcome::TimedOut => return Ok(AckOutcome::TimedOut),
            AckOutcome::Acked(body) => body,
        };

        let rejected = match AckRule::AcceptUnlessFailed.apply(request.event, body) {
            Ok(body) => return Ok(AckOutcome::Acked(body)),
            Err(rejected) => rejected,
        };

        let Some(legacy) = legacy_room_request(topic, subscribe) else {
            return Err(rejected);
        };
        tracing::info!(topic = %topic, event = legacy.event, "Retrying with legacy room event");
        match self.request(legacy.event, legacy.data, timeout).await? {
            AckOutcome::TimedOut => Ok(AckOutcome::TimedOut),
            AckOutcome::Acked(body) => AckRule::AcceptUnlessFailed
                .apply(legacy.event, body)
                .map(AckOutcome::Acked),
        }
    }

    // -------------------------------------------------------------------------
    // State Helpers
    // -------------------------------------------------------------------------

    /// Apply `f` to the status if `generation` is still the current session.
    fn update_status<F>(&self, generation: u64, f: F) -> bool
    where
        F: FnOnce(&mut ConnectionStatus),
    {
        self.status.send_if_modified(|status| {
            if self.generation.load(Ordering::SeqCst) != generation {
                return false;
            }
            let before = status.clone();
            f(status);
            metrics::set_connection_state(status.state.gauge_value());
            *status != before
        })
    }

    fn touch_activity(&self) {
        // Silent update: watchers are not woken for every frame.
        self.status.send_if_modified(|status| {
            status.last_activity = Some(Utc::now());
            false
        });
    }

    fn fail_pending(&self, error: &GatewayError) {
        let drained: Vec<PendingAck> = self.pending.lock().drain().map(|(_, tx)| tx).collect();
        if !drained.is_empty() {
            tracing::debug!(count = drained.len(), error = %error, "Failing pending requests");
        }
        for tx in drained {
            let _ = tx.send(Err(error.clone()));
        }
    }

    fn shutdown(&self) {
        if let Some(cancel) = self.session.lock().take() {
            cancel.cancel();
        }
        self.generation.fetch_add(1, Ordering::SeqCst);
        *self.outbound.write() = None;
        self.fail_pending(&GatewayError::Disconnected);
        self.status.send_modify(|s| {
            s.state = ConnectionState::Disconnected;
            s.ready = false;
            s.degraded = false;
            s.reconnect_attempt = 0;
        });
        metrics::set_connection_state(ConnectionState::Disconnected.gauge_value());
    }
}

#[async_trait]
impl SubscriptionPort for Inner {
    fn is_connected(&self) -> bool {
        self.ensure_connected().is_ok()
    }

    async fn subscribe_topic(&self, topic: &Topic) -> Result<AckOutcome, GatewayError> {
        self.topic_request(topic, subscribe_request(topic), true)
            .await
    }

    async fn unsubscribe_topic(&self, topic: &Topic) -> Result<AckOutcome, GatewayError> {
        self.topic_request(topic, unsubscribe_request(topic), false)
            .await
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use super::*;
    use crate::application::ports::TransportError;

    struct RefusingConnector {
        attempts: AtomicUsize,
    }

    #[async_trait]
    impl Connector for RefusingConnector {
        async fn connect(
            &self,
            _endpoint: &str,
            _token: &str,
        ) -> Result<TransportLink, TransportError> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            Err(TransportError::ConnectionFailed("refused".to_string()))
        }
    }

    fn fast_settings(max_attempts: u32) -> GatewaySettings {
        GatewaySettings {
            reconnect_delay_initial: Duration::from_millis(5),
            reconnect_delay_max: Duration::from_millis(10),
            max_reconnect_attempts: max_attempts,
            ..GatewaySettings::default()
        }
    }

    #[test]
    fn state_names() {
        assert_eq!(ConnectionState::default(), ConnectionState::Disconnected);
        assert_eq!(ConnectionState::Reconnecting.as_str(), "reconnecting");
    }

    #[tokio::test]
    async fn operations_fail_fast_when_not_connected() {
        let client = GatewayClient::with_connector(
            GatewaySettings::default(),
            ActiveStatusPolicy::default(),
            Arc::new(RefusingConnector {
                attempts: AtomicUsize::new(0),
            }),
        );

        assert_eq!(
            client.subscribe(Topic::channel("ops")).await,
            Err(GatewayError::NotConnected)
        );
        assert_eq!(client.ping().await, Err(GatewayError::NotConnected));
        assert_eq!(
            client.send_message("ops", json!({})).await,
            Err(GatewayError::NotConnected)
        );
        assert_eq!(client.ready().await, Err(GatewayError::NotConnected));
    }

    #[tokio::test]
    async fn exhausted_reconnects_end_in_failed() {
        let connector = Arc::new(RefusingConnector {
            attempts: AtomicUsize::new(0),
        });
        let client = GatewayClient::with_connector(
            fast_settings(3),
            ActiveStatusPolicy::default(),
            connector.clone(),
        );

        client.connect("ws://localhost:1", "token");
        let result = tokio::time::timeout(Duration::from_secs(2), client.ready())
            .await
            .unwrap();

        assert_eq!(result, Err(GatewayError::ReconnectExhausted { attempts: 3 }));
        let status = client.status();
        assert_eq!(status.state, ConnectionState::Failed);
        assert!(status.last_error.unwrap().contains("exhausted"));
        // Initial attempt plus three retries.
        assert_eq!(connector.attempts.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn disconnect_stops_retrying() {
        let connector = Arc::new(RefusingConnector {
            attempts: AtomicUsize::new(0),
        });
        let client = GatewayClient::with_connector(
            GatewaySettings {
                reconnect_delay_initial: Duration::from_millis(50),
                reconnect_delay_max: Duration::from_millis(50),
                ..GatewaySettings::default()
            },
            ActiveStatusPolicy::default(),
            connector.clone(),
        );

        client.connect("ws://localhost:1", "token");
        tokio::time::sleep(Duration::from_millis(20)).await;
        client.disconnect();
        assert_eq!(client.status().state, ConnectionState::Disconnected);

        let seen = connector.attempts.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(connector.attempts.load(Ordering::SeqCst), seen);
        assert_eq!(client.status().state, ConnectionState::Disconnected);
    }
}
