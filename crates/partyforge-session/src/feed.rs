//! Live session snapshots pushed to subscribers.
//!
//! Each [`Subscription`] owns one forwarding task that drains a store
//! watch and calls the subscriber's callback with a full
//! [`SessionSnapshot`] per change, in store order.
//!
//! # Unsubscribe guarantee
//!
//! The callback lives in a per-subscription slot guarded by a mutex and
//! is only ever called with that mutex held. [`Subscription::unsubscribe`]
//! flips a closed flag and then empties the slot under the same mutex, so
//! once it returns the callback is gone: updates already queued in the
//! watch are dropped, and a delivery running on another thread has
//! finished. A callback may unsubscribe itself; that path skips the mutex
//! (it is already held) and the forwarder drops the callback as soon as
//! the call returns.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, ThreadId};

use partyforge_protocol::{SessionCode, SessionSnapshot, SessionStatus};
use partyforge_store::{DocumentWatch, SessionStore, StoreEvent};
use tokio::task::AbortHandle;
use tracing::{debug, info};

use crate::SessionError;

/// What a subscriber is told.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionUpdate {
    /// The session was written. Carries its full current state.
    Changed(SessionSnapshot),
    /// The session was deleted. This is the last update.
    Removed(SessionCode),
}

impl SessionUpdate {
    pub fn snapshot(&self) -> Option<&SessionSnapshot> {
        match self {
            Self::Changed(snapshot) => Some(snapshot),
            Self::Removed(_) => None,
        }
    }

    pub fn status(&self) -> Option<SessionStatus> {
        self.snapshot().map(SessionSnapshot::status)
    }

    pub fn code(&self) -> &SessionCode {
        match self {
            Self::Changed(snapshot) => &snapshot.code,
            Self::Removed(code) => code,
        }
    }
}

/// Identifies one subscription within its [`ChangeFeed`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

type Callback = Box<dyn FnMut(SessionUpdate) + Send>;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// ---------------------------------------------------------------------------
// Per-subscription state
// ---------------------------------------------------------------------------

struct SubscriptionState {
    callback: Mutex<Option<Callback>>,
    delivering_on: Mutex<Option<ThreadId>>,
    closed: AtomicBool,
    task: Mutex<Option<AbortHandle>>,
}

impl SubscriptionState {
    fn new(callback: Callback) -> Self {
        Self {
            callback: Mutex::new(Some(callback)),
            delivering_on: Mutex::new(None),
            closed: AtomicBool::new(false),
            task: Mutex::new(None),
        }
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Calls the callback once. Returns `false` when the subscription is
    /// over and the forwarder should stop.
    fn deliver(&self, update: SessionUpdate) -> bool {
        let mut slot = lock(&self.callback);
        if self.is_closed() {
            *slot = None;
            return false;
        }
        let Some(callback) = slot.as_mut() else {
            return false;
        };

        *lock(&self.delivering_on) = Some(thread::current().id());
        callback(update);
        *lock(&self.delivering_on) = None;

        if self.is_closed() {
            *slot = None;
            return false;
        }
        true
    }

    fn close(&self) {
        self.closed.store(true, Ordering::Release);
        if let Some(task) = lock(&self.task).take() {
            task.abort();
        }

        let reentrant = *lock(&self.delivering_on) == Some(thread::current().id());
        if !reentrant {
            // Blocks until a delivery in flight on another thread returns.
            lock(&self.callback).take();
        }
    }
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

#[derive(Default)]
struct Registry {
    next_id: AtomicU64,
    active: Mutex<HashMap<SubscriptionId, Arc<SubscriptionState>>>,
}

impl Registry {
    fn next_id(&self) -> SubscriptionId {
        SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed) + 1)
    }

    fn insert(&self, id: SubscriptionId, state: Arc<SubscriptionState>) {
        lock(&self.active).insert(id, state);
    }

    fn remove(&self, id: SubscriptionId) -> bool {
        lock(&self.active).remove(&id).is_some()
    }

    fn len(&self) -> usize {
        lock(&self.active).len()
    }

    fn drain(&self) -> Vec<Arc<SubscriptionState>> {
        lock(&self.active).drain().map(|(_, state)| state).collect()
    }
}

// ---------------------------------------------------------------------------
// ChangeFeed
// ---------------------------------------------------------------------------

/// Hands out subscriptions to session changes.
pub struct ChangeFeed<S> {
    store: Arc<S>,
    registry: Arc<Registry>,
}

impl<S> Clone for ChangeFeed<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            registry: Arc::clone(&self.registry),
        }
    }
}

impl<S: SessionStore> ChangeFeed<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self {
            store,
            registry: Arc::new(Registry::default()),
        }
    }

    /// Starts delivering updates for `code` to `on_update`.
    ///
    /// The first update is the session's current state, if it exists. A
    /// code with no document yet is not an error; updates start when it
    /// is written. Must be called inside a Tokio runtime.
    ///
    /// The subscription keeps running until [`Subscription::unsubscribe`],
    /// [`ChangeFeed::close_all`], or the document is deleted. Dropping the
    /// handle does not stop it.
    pub async fn subscribe<F>(
        &self,
        code: &SessionCode,
        on_update: F,
    ) -> Result<Subscription, SessionError>
    where
        F: FnMut(SessionUpdate) + Send + 'static,
    {
        let watch = self
            .store
            .subscribe(code)
            .await
            .map_err(SessionError::StoreRead)?;

        let id = self.registry.next_id();
        let state = Arc::new(SubscriptionState::new(Box::new(on_update)));
        self.registry.insert(id, Arc::clone(&state));

        let handle = tokio::spawn(forward(
            watch,
            code.clone(),
            id,
            Arc::clone(&state),
            Arc::clone(&self.registry),
        ));
        *lock(&state.task) = Some(handle.abort_handle());
        if state.is_closed() {
            // close_all() ran before the handle was stored.
            handle.abort();
        }

        info!(%code, %id, "subscribed");
        Ok(Subscription {
            id,
            code: code.clone(),
            state,
            registry: Arc::clone(&self.registry),
        })
    }

    /// Number of subscriptions still delivering.
    pub fn active_count(&self) -> usize {
        self.registry.len()
    }

    /// Unsubscribes everyone.
    pub fn close_all(&self) {
        let states = self.registry.drain();
        let closed = states.len();
        for state in states {
            state.close();
        }
        if closed > 0 {
            info!(closed, "all subscriptions closed");
        }
    }
}

async fn forward(
    mut watch: DocumentWatch,
    code: SessionCode,
    id: SubscriptionId,
    state: Arc<SubscriptionState>,
    registry: Arc<Registry>,
) {
    while let Some(event) = watch.recv().await {
        let (update, last) = match event {
            StoreEvent::Changed(document) => (
                SessionUpdate::Changed(SessionSnapshot::new(code.clone(), document)),
                false,
            ),
            StoreEvent::Deleted => (SessionUpdate::Removed(code.clone()), true),
        };
        if !state.deliver(update) || last {
            break;
        }
    }

    state.closed.store(true, Ordering::Release);
    lock(&state.callback).take();
    registry.remove(id);
    debug!(%code, %id, "subscription ended");
}

// ---------------------------------------------------------------------------
// Subscription
// ---------------------------------------------------------------------------

/// Handle to a running subscription.
#[must_use = "a subscription keeps delivering until unsubscribed; keep the handle to stop it"]
pub struct Subscription {
    id: SubscriptionId,
    code: SessionCode,
    state: Arc<SubscriptionState>,
    registry: Arc<Registry>,
}

impl Subscription {
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    pub fn code(&self) -> &SessionCode {
        &self.code
    }

    /// `false` once unsubscribed or once the session was deleted.
    pub fn is_active(&self) -> bool {
        !self.state.is_closed()
    }

    /// Stops delivery. Idempotent.
    ///
    /// When this returns, the callback will not be called again. Safe to
    /// call from inside the callback.
    pub fn unsubscribe(&self) {
        self.state.close();
        if self.registry.remove(self.id) {
            info!(code = %self.code, id = %self.id, "unsubscribed");
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("code", &self.code)
            .field("active", &self.is_active())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn code() -> SessionCode {
        SessionCode::parse("31337").unwrap()
    }

    fn counting_state() -> (Arc<SubscriptionState>, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&calls);
        let state = SubscriptionState::new(Box::new(move |_| {
            seen.fetch_add(1, Ordering::SeqCst);
        }));
        (Arc::new(state), calls)
    }

    #[test]
    fn test_deliver_after_close_is_dropped() {
        let (state, calls) = counting_state();
        assert!(state.deliver(SessionUpdate::Removed(code())));
        state.close();
        assert!(!state.deliver(SessionUpdate::Removed(code())));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(lock(&state.callback).is_none());
    }

    #[test]
    fn test_close_is_idempotent() {
        let (state, _) = counting_state();
        state.close();
        state.close();
        assert!(state.is_closed());
    }

    #[test]
    fn test_close_from_inside_callback_does_not_deadlock() {
        let holder: Arc<Mutex<Option<Arc<SubscriptionState>>>> = Arc::new(Mutex::new(None));
        let inner = Arc::clone(&holder);
        let state = Arc::new(SubscriptionState::new(Box::new(move |_| {
            if let Some(me) = lock(&inner).as_ref() {
                me.close();
            }
        })));
        *lock(&holder) = Some(Arc::clone(&state));

        assert!(!state.deliver(SessionUpdate::Removed(code())));
        assert!(state.is_closed());
        assert!(lock(&state.callback).is_none());
    }

    #[test]
    fn test_registry_ids_are_unique() {
        let registry = Registry::default();
        let a = registry.next_id();
        let b = registry.next_id();
        assert_ne!(a, b);
        assert_eq!(a.to_string(), "sub-1");
    }

    #[test]
    fn test_update_accessors() {
        let removed = SessionUpdate::Removed(code());
        assert_eq!(removed.code(), &code());
        assert!(removed.snapshot().is_none());
        assert!(removed.status().is_none());
    }
}
