use crate::prelude::*;
use crate::simpleip::message::Message;

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

/// Callbacks a subscriber implements to observe the link.
///
/// Both callbacks run on the client's dispatch path; they should hand
/// anything slow off to their own task.
pub trait SimpleIpListener: Send + Sync {
    /// A message was decoded off the wire.
    fn on_message(&self, peer: &str, message: &Message);

    /// The link became unusable (connect failure, exhausted retries).
    fn on_connection_error(&self, peer: &str, reason: &str);
}

/// Handle returned by [`ListenerSet::add`], used to unregister.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct ListenerId(u64);

/// The set of registered listeners plus the serialized dispatch path.
///
/// Dispatch iterates a snapshot of the set, so listeners may register or
/// unregister at any time, including from inside a callback. A panicking
/// callback is caught and logged; delivery to the remaining listeners
/// continues.
#[derive(Default)]
pub struct ListenerSet {
    listeners: Mutex<Vec<(ListenerId, Arc<dyn SimpleIpListener>)>>,
    dispatch: Mutex<()>,
    next_id: AtomicU64,
}

impl ListenerSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, listener: Arc<dyn SimpleIpListener>) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.with_listeners(|listeners| listeners.push((id, listener)));
        id
    }

    /// Returns true if the listener was still registered.
    pub fn remove(&self, id: ListenerId) -> bool {
        let mut removed = false;
        self.with_listeners(|listeners| {
            let before = listeners.len();
            listeners.retain(|(registered, _)| *registered != id);
            removed = listeners.len() != before;
        });
        removed
    }

    pub fn dispatch_message(&self, peer: &str, message: &Message) {
        self.for_each(|listener| listener.on_message(peer, message));
    }

    pub fn dispatch_connection_error(&self, peer: &str, reason: &str) {
        self.for_each(|listener| listener.on_connection_error(peer, reason));
    }

    fn with_listeners(&self, f: impl FnOnce(&mut Vec<(ListenerId, Arc<dyn SimpleIpListener>)>)) {
        match self.listeners.lock() {
            Ok(mut listeners) => f(&mut listeners),
            Err(poisoned) => f(&mut poisoned.into_inner()),
        }
    }

    /// Single-threaded dispatch: two dispatch calls never run concurrently,
    /// so listeners observe events in the order they were produced.
    fn for_each(&self, f: impl Fn(&dyn SimpleIpListener)) {
        let _serialized = match self.dispatch.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        let mut snapshot = Vec::new();
        self.with_listeners(|listeners| snapshot = listeners.clone());

        for (id, listener) in snapshot {
            if catch_unwind(AssertUnwindSafe(|| f(listener.as_ref()))).is_err() {
                warn!("listener {:?} panicked during dispatch, continuing with remaining listeners", id);
            }
        }
    }
}
