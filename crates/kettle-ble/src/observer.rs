//! Status and availability observers
//!
//! Observers are invoked synchronously in registration order. A failing or
//! panicking observer is logged and skipped; the others still run.

use std::collections::BTreeMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::error;

use kettle_core::StatusSnapshot;

/// Error type observers may return
pub type ObserverError = Box<dyn std::error::Error + Send + Sync>;
pub type ObserverResult = Result<(), ObserverError>;

/// Receives every parsed status snapshot
pub type StatusObserver = Arc<dyn Fn(&StatusSnapshot) -> ObserverResult + Send + Sync>;

/// Receives availability changes
pub type AvailabilityObserver =
    Arc<dyn Fn(&AvailabilityEvent) -> ObserverResult + Send + Sync>;

/// Handle returned by registration, used to unregister
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ObserverId(u64);

/// Availability change published to the host
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AvailabilityEvent {
    pub session_id: String,
    pub available: bool,
    pub authenticated: bool,
    /// Unknown until the first status after login
    pub control_capable: Option<bool>,
}

// ----------------------------------------------------------------------------
// Registry
// ----------------------------------------------------------------------------

#[derive(Default)]
struct Registry {
    status: BTreeMap<ObserverId, StatusObserver>,
    availability: BTreeMap<ObserverId, AvailabilityObserver>,
}

/// Observer registry owned by one session
#[derive(Default)]
pub struct Observers {
    next_id: AtomicU64,
    registry: Mutex<Registry>,
}

impl Observers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_status<F>(&self, observer: F) -> ObserverId
    where
        F: Fn(&StatusSnapshot) -> ObserverResult + Send + Sync + 'static,
    {
        let id = self.next_id();
        self.lock().status.insert(id, Arc::new(observer));
        id
    }

    pub fn register_availability<F>(&self, observer: F) -> ObserverId
    where
        F: Fn(&AvailabilityEvent) -> ObserverResult + Send + Sync + 'static,
    {
        let id = self.next_id();
        self.lock().availability.insert(id, Arc::new(observer));
        id
    }

    /// Remove an observer of either kind; false if the id is unknown
    pub fn unregister(&self, id: ObserverId) -> bool {
        let mut registry = self.lock();
        registry.status.remove(&id).is_some() || registry.availability.remove(&id).is_some()
    }

    pub fn notify_status(&self, snapshot: &StatusSnapshot) {
        let observers: Vec<_> = self.lock().status.values().cloned().collect();
        for observer in observers {
            isolate("status", || observer(snapshot));
        }
    }

    pub fn notify_availability(&self, event: &AvailabilityEvent) {
        let observers: Vec<_> = self.lock().availability.values().cloned().collect();
        for observer in observers {
            isolate("availability", || observer(event));
        }
    }

    fn next_id(&self) -> ObserverId {
        ObserverId(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    fn lock(&self) -> MutexGuard<'_, Registry> {
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn isolate(kind: &str, call: impl FnOnce() -> ObserverResult) {
    match catch_unwind(AssertUnwindSafe(call)) {
        Ok(Ok(())) => {}
        Ok(Err(e)) => error!("Error in {} observer: {}", kind, e),
        Err(_) => error!("Panic in {} observer", kind),
    }
}
