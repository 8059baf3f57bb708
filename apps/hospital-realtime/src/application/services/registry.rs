//! Subscription Registry
//!
//! Single source of truth for which topics should be active. The connection
//! manager never remembers subscription intent itself; after every reconnect
//! it asks the registry to replay what is recorded here.
//!
//! # Semantics
//!
//! - `subscribe` on an active topic resolves immediately
//! - concurrent `subscribe` calls for the same topic share one request
//! - an ack timeout is accepted optimistically
//! - `unsubscribe` on an inactive topic is a no-op
//! - `unsubscribe` during an in-flight `subscribe` waits for it, then unsubscribes
//! - a rejected `unsubscribe` leaves the topic active
//! - `clear` wins over any subscribe still waiting for its ack

use std::collections::{HashMap, HashSet};

use futures::future::join_all;
use parking_lot::Mutex;
use tokio::sync::watch;

use crate::application::ports::{AckOutcome, GatewayError, SubscriptionPort};
use crate::domain::subscription::Topic;

type SharedResult = Option<Result<(), GatewayError>>;

#[derive(Debug, Default)]
struct RegistryState {
    active: HashSet<Topic>,
    inflight: HashMap<Topic, watch::Sender<SharedResult>>,
    /// Bumped by `clear`; requests started in an older epoch never record.
    epoch: u64,
}

/// Outcome of replaying the active set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplayReport {
    /// Topics re-issued.
    pub replayed: usize,
    /// Topics whose replay failed.
    pub failed: usize,
}

/// Tracks active topics and replays them after reconnects.
#[derive(Debug, Default)]
pub struct SubscriptionRegistry {
    state: Mutex<RegistryState>,
}

impl SubscriptionRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe to `topic`.
    ///
    /// # Errors
    ///
    /// - [`GatewayError::NotConnected`] if the transport is down
    /// - [`GatewayError::ServerRejected`] if the gateway refuses the topic
    /// - [`GatewayError::Disconnected`] if a shared request was abandoned
    pub async fn subscribe<P>(&self, port: &P, topic: Topic) -> Result<(), GatewayError>
    where
        P: SubscriptionPort + ?Sized,
    {
        let (waiter, epoch) = {
            let mut state = self.state.lock();
            if state.active.contains(&topic) {
                return Ok(());
            }
            let epoch = state.epoch;
            match state.inflight.get(&topic) {
                Some(tx) => (Some(tx.subscribe()), epoch),
                None => {
                    let (tx, _rx) = watch::channel(None);
                    state.inflight.insert(topic.clone(), tx);
                    (None, epoch)
                }
            }
        };

        if let Some(rx) = waiter {
            tracing::debug!(topic = %topic, "Joining in-flight subscribe");
            return wait_inflight(rx).await;
        }

        let mut guard = InflightGuard {
            registry: self,
            topic: topic.clone(),
            epoch,
            result: None,
        };
        let result = self.register(port, &topic, epoch).await;
        guard.result = Some(result.clone());
        result
    }

    async fn register<P>(&self, port: &P, topic: &Topic, epoch: u64) -> Result<(), GatewayError>
    where
        P: SubscriptionPort + ?Sized,
    {
        if !port.is_connected() {
            return Err(GatewayError::NotConnected);
        }

        let outcome = port.subscribe_topic(topic).await?;

        let mut state = self.state.lock();
        if state.epoch != epoch {
            tracing::debug!(topic = %topic, "Registry cleared while subscribing, dropping topic");
            return Err(GatewayError::Disconnected);
        }
        match outcome {
            AckOutcome::Acked(_) => {
                tracing::info!(topic = %topic, "Subscribed");
            }
            AckOutcome::TimedOut => {
                tracing::warn!(topic = %topic, "Subscribe ack timed out, accepting optimistically");
            }
        }
        state.active.insert(topic.clone());
        Ok(())
    }

    /// Unsubscribe from `topic`.
    ///
    /// # Errors
    ///
    /// - [`GatewayError::NotConnected`] if the transport is down
    /// - [`GatewayError::ServerRejected`] if the gateway refuses; the topic stays active
    pub async fn unsubscribe<P>(&self, port: &P, topic: &Topic) -> Result<(), GatewayError>
    where
        P: SubscriptionPort + ?Sized,
    {
        let inflight = self.state.lock().inflight.get(topic).map(watch::Sender::subscribe);
        if let Some(rx) = inflight {
            tracing::debug!(topic = %topic, "Waiting for in-flight subscribe before unsubscribing");
            // Whatever the subscribe outcome, the active set decides below.
            let _ = wait_inflight(rx).await;
        }

        if !self.is_active(topic) {
            return Ok(());
        }
        if !port.is_connected() {
            return Err(GatewayError::NotConnected);
        }

        if port.unsubscribe_topic(topic).await? == AckOutcome::TimedOut {
            tracing::warn!(topic = %topic, "Unsubscribe ack timed out, removing anyway");
        }
        self.state.lock().active.remove(topic);
        tracing::info!(topic = %topic, "Unsubscribed");
        Ok(())
    }

    /// Re-issue every active topic. Failures are logged and do not stop the others.
    pub async fn replay_all<P>(&self, port: &P) -> ReplayReport
    where
        P: SubscriptionPort + ?Sized,
    {
        let topics = self.active_topics();
        if topics.is_empty() {
            return ReplayReport::default();
        }

        tracing::info!(count = topics.len(), "Replaying subscriptions");
        let results = join_all(topics.iter().map(|topic| port.subscribe_topic(topic))).await;

        let mut report = ReplayReport::default();
        for (topic, result) in topics.iter().zip(results) {
            match result {
                Ok(_) => report.replayed += 1,
                Err(e) => {
                    report.failed += 1;
                    tracing::warn!(topic = %topic, error = %e, "Subscription replay failed");
                }
            }
        }
        report
    }

    /// Snapshot of the active set.
    #[must_use]
    pub fn active_topics(&self) -> HashSet<Topic> {
        self.state.lock().active.clone()
    }

    /// Whether `topic` is active.
    #[must_use]
    pub fn is_active(&self, topic: &Topic) -> bool {
        self.state.lock().active.contains(topic)
    }

    /// Number of active topics.
    #[must_use]
    pub fn len(&self) -> usize {
        self.state.lock().active.len()
    }

    /// Whether no topic is active.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Forget every topic; pending subscribe callers resolve with `Disconnected`.
    pub fn clear(&self) {
        let mut state = self.state.lock();
        state.epoch = state.epoch.wrapping_add(1);
        state.active.clear();
        for (_, tx) in state.inflight.drain() {
            tx.send_replace(Some(Err(GatewayError::Disconnected)));
        }
    }
}

async fn wait_inflight(mut rx: watch::Receiver<SharedResult>) -> Result<(), GatewayError> {
    match rx.wait_for(Option::is_some).await {
        Ok(result) => result.clone().unwrap_or(Err(GatewayError::Disconnected)),
        Err(_) => Err(GatewayError::Disconnected),
    }
}

/// Publishes the leader's result to joined callers, even if the leader is dropped.
struct InflightGuard<'a> {
    registry: &'a SubscriptionRegistry,
    topic: Topic,
    epoch: u64,
    result: Option<Result<(), GatewayError>>,
}

impl Drop for InflightGuard<'_> {
    fn drop(&mut self) {
        let mut state = self.registry.state.lock();
        // After a clear the entry under this topic belongs to a newer request.
        if state.epoch != self.epoch {
            return;
        }
        let result = self.result.take().unwrap_or(Err(GatewayError::Disconnected));
        if let Some(tx) = state.inflight.remove(&self.topic) {
            tx.send_replace(Some(result));
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
