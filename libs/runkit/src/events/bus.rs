//! # Synchronous lifecycle event bus.
//!
//! [`EventBus`] maps every [`EventKind`] to an insertion-ordered list of
//! callbacks. `emit` fans an event out to the callbacks registered for its
//! kind, in subscription order, on the caller's task.
//!
//! ## Rules
//! - **Snapshot fan-out**: the subscriber list is copied under the lock at the
//!   start of `emit`; callbacks subscribed while a fan-out is running are not
//!   part of it.
//! - **Lock-free callbacks**: no lock is held while a callback runs, so a
//!   callback may subscribe or emit itself.
//! - **Isolation**: a panicking callback is caught and logged; the remaining
//!   callbacks still run.
//! - **No deduplication**: subscribing the same callback twice runs it twice.

use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

use super::event::{Event, EventKind};

/// Callback invoked for each emitted event of a subscribed kind.
pub type EventCallback = Arc<dyn Fn(&Event) + Send + Sync>;

/// Handle returned by [`EventBus::subscribe`], used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

#[derive(Clone)]
struct Subscriber {
    id: SubscriptionId,
    callback: EventCallback,
}

#[derive(Default)]
struct BusInner {
    subscribers: RwLock<HashMap<EventKind, Vec<Subscriber>>>,
    next_id: AtomicU64,
}

/// Publish/subscribe bus keyed by [`EventKind`].
///
/// Cheap to clone; clones share the same subscriber table.
#[derive(Clone, Default)]
pub struct EventBus {
    inner: Arc<BusInner>,
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let subs = self.inner.subscribers.read();
        let counts: HashMap<EventKind, usize> = subs.iter().map(|(k, v)| (*k, v.len())).collect();
        f.debug_struct("EventBus").field("subscribers", &counts).finish()
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `callback` to the subscriber list of `kind`.
    pub fn subscribe<F>(&self, kind: EventKind, callback: F) -> SubscriptionId
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.inner.next_id.fetch_add(1, Ordering::Relaxed));
        self.inner
            .subscribers
            .write()
            .entry(kind)
            .or_default()
            .push(Subscriber {
                id,
                callback: Arc::new(callback),
            });
        id
    }

    /// Removes a subscription. Returns `false` if it was already gone.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subs = self.inner.subscribers.write();
        for list in subs.values_mut() {
            if let Some(pos) = list.iter().position(|s| s.id == id) {
                list.remove(pos);
                return true;
            }
        }
        false
    }

    pub fn subscriber_count(&self, kind: EventKind) -> usize {
        self.inner
            .subscribers
            .read()
            .get(&kind)
            .map_or(0, Vec::len)
    }

    /// Invokes every callback subscribed to `event.kind()` when the call begins.
    ///
    /// Returns the number of callbacks invoked (including ones that panicked).
    pub fn emit(&self, event: &Event) -> usize {
        let kind = event.kind();
        let snapshot: Vec<Subscriber> = match self.inner.subscribers.read().get(&kind) {
            Some(list) => list.clone(),
            None => return 0,
        };

        for sub in &snapshot {
            let callback = &sub.callback;
            if let Err(panic) = catch_unwind(AssertUnwindSafe(|| callback(event))) {
                tracing::error!(
                    kind = %kind,
                    subscription = sub.id.0,
                    panic = %crate::error::panic_message(panic.as_ref()),
                    "event subscriber panicked"
                );
            }
        }
        snapshot.len()
    }
}
