//! Connection handles and the registry that maps kernel tags back to them.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};

use tracing::trace;

struct IdShared {
    token: u64,
    handle: AtomicU32,
    /// Set once the kernel identifier is known; 0 is a valid identifier.
    assigned: AtomicBool,
    context: u64,
    /// Events released against this handle.
    completed: Mutex<u32>,
    cond: Condvar,
}

/// One connection endpoint.
///
/// Cloning a `CmId` yields another reference to the same endpoint; equality
/// is identity. The kernel identifier is assigned once, when the handle is
/// created or materialized for an inbound request.
#[derive(Clone)]
pub struct CmId {
    inner: Arc<IdShared>,
}

impl CmId {
    fn new(token: u64, context: u64) -> Self {
        Self {
            inner: Arc::new(IdShared {
                token,
                handle: AtomicU32::new(0),
                assigned: AtomicBool::new(false),
                context,
                completed: Mutex::new(0),
                cond: Condvar::new(),
            }),
        }
    }

    /// Kernel-assigned identifier.
    pub fn handle(&self) -> u32 {
        self.inner.handle.load(Ordering::Acquire)
    }

    /// Application context supplied at creation (inherited by children).
    pub fn context(&self) -> u64 {
        self.inner.context
    }

    /// Opaque tag the kernel echoes back in notifications for this handle.
    pub fn token(&self) -> u64 {
        self.inner.token
    }

    /// Number of events released against this handle so far.
    pub fn events_completed(&self) -> u32 {
        *self.completed()
    }

    pub(crate) fn set_handle(&self, handle: u32) {
        self.inner.handle.store(handle, Ordering::Release);
        self.inner.assigned.store(true, Ordering::Release);
    }

    fn has_handle(&self, handle: u32) -> bool {
        self.inner.assigned.load(Ordering::Acquire) && self.handle() == handle
    }

    fn completed(&self) -> MutexGuard<'_, u32> {
        self.inner
            .completed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Count one released event and wake a pending destroy.
    pub(crate) fn complete_event(&self) {
        let mut completed = self.completed();
        *completed = completed.wrapping_add(1);
        trace!(handle = self.handle(), completed = *completed, "event released");
        self.inner.cond.notify_all();
    }

    /// Block until `reported` events have been released. No timeout.
    pub(crate) fn wait_for_events(&self, reported: u32) {
        let mut completed = self.completed();
        while *completed < reported {
            completed = self
                .inner
                .cond
                .wait(completed)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }
}

impl PartialEq for CmId {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for CmId {}

impl fmt::Debug for CmId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CmId")
            .field("handle", &self.handle())
            .field("token", &self.inner.token)
            .field("context", &self.inner.context)
            .finish()
    }
}

/// Live handles keyed by their token.
pub(crate) struct Registry {
    next_token: AtomicU64,
    ids: Mutex<HashMap<u64, CmId>>,
}

impl Registry {
    pub(crate) fn new() -> Self {
        Self {
            // 0 means "no tag" on the wire.
            next_token: AtomicU64::new(1),
            ids: Mutex::new(HashMap::new()),
        }
    }

    fn ids(&self) -> MutexGuard<'_, HashMap<u64, CmId>> {
        self.ids.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Allocate and register a handle with a fresh token.
    pub(crate) fn allocate(&self, context: u64) -> CmId {
        let token = self.next_token.fetch_add(1, Ordering::Relaxed);
        let id = CmId::new(token, context);
        self.ids().insert(token, id.clone());
        id
    }

    pub(crate) fn remove(&self, id: &CmId) {
        self.ids().remove(&id.token());
    }

    /// Find the handle a notification refers to.
    ///
    /// Tagged notifications are matched by token. Untagged ones are matched
    /// by kernel identifier unless `by_handle` is false (request kinds,
    /// whose identifier names a child that does not exist yet).
    pub(crate) fn resolve(&self, uid: u64, handle: u32, by_handle: bool) -> Option<CmId> {
        let ids = self.ids();
        if uid != 0 {
            return ids.get(&uid).cloned();
        }
        if !by_handle {
            return None;
        }
        ids.values().find(|id| id.has_handle(handle)).cloned()
    }

    pub(crate) fn len(&self) -> usize {
        self.ids().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn clones_compare_by_identity() {
        let registry = Registry::new();
        let a = registry.allocate(1);
        let b = registry.allocate(1);
        assert_eq!(a, a.clone());
        assert_ne!(a, b);
        assert_ne!(a.token(), b.token());
        assert_ne!(a.token(), 0);
    }

    #[test]
    fn resolve_by_token_then_handle() {
        let registry = Registry::new();
        let id = registry.allocate(5);
        id.set_handle(42);

        assert_eq!(registry.resolve(id.token(), 0, false), Some(id.clone()));
        assert_eq!(registry.resolve(0, 42, true), Some(id.clone()));
        assert_eq!(registry.resolve(0, 42, false), None);
        assert_eq!(registry.resolve(999, 42, true), None);

        registry.remove(&id);
        assert_eq!(registry.len(), 0);
        assert_eq!(registry.resolve(id.token(), 0, true), None);
    }

    #[test]
    fn pending_create_never_matches_untagged_events() {
        let registry = Registry::new();
        let pending = registry.allocate(0);
        assert_eq!(registry.resolve(0, 0, true), None);

        pending.set_handle(0);
        assert_eq!(registry.resolve(0, 0, true), Some(pending));
    }

    #[test]
    fn wait_returns_immediately_when_nothing_outstanding() {
        let registry = Registry::new();
        let id = registry.allocate(0);
        id.wait_for_events(0);
        id.complete_event();
        id.wait_for_events(1);
        assert_eq!(id.events_completed(), 1);
    }

    #[test]
    fn wait_blocks_until_count_reached() {
        let registry = Registry::new();
        let id = registry.allocate(0);
        let (tx, rx) = mpsc::channel();

        let waiter = {
            let id = id.clone();
            thread::spawn(move || {
                id.wait_for_events(2);
                tx.send(()).unwrap();
            })
        };

        id.complete_event();
        assert!(rx.recv_timeout(Duration::from_millis(100)).is_err());

        id.complete_event();
        rx.recv_timeout(Duration::from_secs(5)).unwrap();
        waiter.join().unwrap();
    }
}
