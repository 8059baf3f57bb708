//! Callback Dispatcher
//!
//! Multi-subscriber fan-out of normalized events. Callbacks registered for a
//! kind run synchronously, in registration order. A panicking callback is
//! caught and logged, and the remaining callbacks still run.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::RwLock;

use crate::domain::events::{EventKind, NormalizedEvent};

type Callback = Arc<dyn Fn(&NormalizedEvent) + Send + Sync>;

struct Registration {
    id: u64,
    kind: EventKind,
    callback: Callback,
}

#[derive(Default)]
struct DispatcherInner {
    next_id: AtomicU64,
    registrations: RwLock<Vec<Registration>>,
}

impl DispatcherInner {
    fn remove(&self, id: u64) -> bool {
        let mut registrations = self.registrations.write();
        let before = registrations.len();
        registrations.retain(|r| r.id != id);
        registrations.len() != before
    }
}

/// Outcome of one [`Dispatcher::emit`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchReport {
    /// Callbacks that returned normally.
    pub delivered: usize,
    /// Callbacks that panicked.
    pub panicked: usize,
}

/// Fans normalized events out to registered callbacks.
#[derive(Default, Clone)]
pub struct Dispatcher {
    inner: Arc<DispatcherInner>,
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("callbacks", &self.len())
            .finish()
    }
}

impl Dispatcher {
    /// Create a dispatcher with no callbacks.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `callback` for events of `kind`.
    ///
    /// Registering the same function twice yields two independent handles.
    pub fn on<F>(&self, kind: EventKind, callback: F) -> CallbackHandle
    where
        F: Fn(&NormalizedEvent) + Send + Sync + 'static,
    {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        self.inner.registrations.write().push(Registration {
            id,
            kind,
            callback: Arc::new(callback),
        });
        CallbackHandle {
            id,
            dispatcher: Arc::downgrade(&self.inner),
        }
    }

    /// Invoke every callback registered for the event's kind.
    pub fn emit(&self, event: &NormalizedEvent) -> DispatchReport {
        // Clone out so callbacks can register or unsubscribe without deadlocking.
        let callbacks: Vec<(u64, Callback)> = self
            .inner
            .registrations
            .read()
            .iter()
            .filter(|r| r.kind == event.kind)
            .map(|r| (r.id, Arc::clone(&r.callback)))
            .collect();

        let mut report = DispatchReport::default();
        for (id, callback) in callbacks {
            match catch_unwind(AssertUnwindSafe(|| callback(event))) {
                Ok(()) => report.delivered += 1,
                Err(panic) => {
                    report.panicked += 1;
                    let message = panic
                        .downcast_ref::<&str>()
                        .map(ToString::to_string)
                        .or_else(|| panic.downcast_ref::<String>().cloned())
                        .unwrap_or_else(|| "unknown panic".to_string());
                    tracing::error!(
                        callback_id = id,
                        kind = event.kind.as_str(),
                        event = %event.raw_event_name,
                        panic = %message,
                        "Event callback panicked"
                    );
                }
            }
        }
        report
    }

    /// Number of registered callbacks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.registrations.read().len()
    }

    /// Whether no callbacks are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remove every callback.
    pub fn clear(&self) {
        self.inner.registrations.write().clear();
    }
}

/// Handle to one registration.
#[derive(Debug)]
pub struct CallbackHandle {
    id: u64,
    dispatcher: Weak<DispatcherInner>,
}

impl CallbackHandle {
    /// Remove exactly this registration. Returns `false` if it was already gone.
    pub fn unsubscribe(self) -> bool {
        self.dispatcher
            .upgrade()
            .is_some_and(|inner| inner.remove(self.id))
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use chrono::Utc;
    use serde_json::json;

    use super::*;

    fn event(kind: EventKind) -> NormalizedEvent {
        NormalizedEvent {
            kind,
            family: None,
            entities: Vec::new(),
            hospital_id: None,
            raw_event_name: "test".to_string(),
            payload: json!({}),
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn callbacks_run_in_registration_order() {
        let dispatcher = Dispatcher::new();
        let order = Arc::new(Mutex::new(Vec::new()));

        for n in 0..3 {
            let order = Arc::clone(&order);
            dispatcher.on(EventKind::Created, move |_| order.lock().unwrap().push(n));
        }

        let report = dispatcher.emit(&event(EventKind::Created));
        assert_eq!(report.delivered, 3);
        assert_eq!(*order.lock().unwrap(), vec![0, 1, 2]);
    }

    #[test]
    fn only_matching_kind_is_invoked() {
        let dispatcher = Dispatcher::new();
        let hits = Arc::new(AtomicU64::new(0));
        let counter = Arc::clone(&hits);
        dispatcher.on(EventKind::Updated, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        dispatcher.emit(&event(EventKind::Created));
        assert_eq!(hits.load(Ordering::SeqCst), 0);
        dispatcher.emit(&event(EventKind::Updated));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn panicking_callback_does_not_block_others() {
        let dispatcher = Dispatcher::new();
        let reached = Arc::new(AtomicU64::new(0));

        dispatcher.on(EventKind::Broadcast, |_| panic!("boom"));
        let counter = Arc::clone(&reached);
        dispatcher.on(EventKind::Broadcast, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        let report = dispatcher.emit(&event(EventKind::Broadcast));
        assert_eq!(report, DispatchReport { delivered: 1, panicked: 1 });
        assert_eq!(reached.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn unsubscribe_removes_only_one_registration() {
        let dispatcher = Dispatcher::new();
        let hits = Arc::new(AtomicU64::new(0));

        let callback = {
            let hits = Arc::clone(&hits);
            move |_: &NormalizedEvent| {
                hits.fetch_add(1, Ordering::SeqCst);
            }
        };
        let first = dispatcher.on(EventKind::Created, callback.clone());
        let _second = dispatcher.on(EventKind::Created, callback);

        assert!(first.unsubscribe());
        dispatcher.emit(&event(EventKind::Created));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(dispatcher.len(), 1);
    }

    #[test]
    fn unsubscribe_after_clear_reports_missing() {
        let dispatcher = Dispatcher::new();
        let handle = dispatcher.on(EventKind::Created, |_| {});
        dispatcher.clear();
        assert!(!handle.unsubscribe());
        assert!(dispatcher.is_empty());
    }

    #[test]
    fn callback_may_unsubscribe_during_emit() {
        let dispatcher = Dispatcher::new();
        let slot: Arc<Mutex<Option<CallbackHandle>>> = Arc::new(Mutex::new(None));

        let inner_slot = Arc::clone(&slot);
        let handle = dispatcher.on(EventKind::Created, move |_| {
            if let Some(handle) = inner_slot.lock().unwrap().take() {
                handle.unsubscribe();
            }
        });
        *slot.lock().unwrap() = Some(handle);

        dispatcher.emit(&event(EventKind::Created));
        assert!(dispatcher.is_empty());
    }
}
