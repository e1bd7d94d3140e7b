//! In-process [`SessionStore`] backed by a mutex-guarded map.
//!
//! Documents are kept in their JSON form so partial updates can be applied
//! by [`FieldPath`] exactly the way a document database would. Every
//! mutation runs under one lock and notifies that document's watchers
//! before the lock is released, which gives each watcher the writes in
//! the order they were applied.

use std::collections::HashMap;
use std::sync::Arc;

use partyforge_protocol::{
    FieldCondition, FieldPath, FieldUpdate, ProtocolError, SessionCode, SessionDocument,
};
use serde_json::Value;
use tokio::sync::{Mutex, mpsc};

use crate::{DocumentWatch, SessionStore, StoreError, StoreEvent};

/// An in-memory session store.
///
/// Cheap to clone: clones share the same underlying map.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<Inner>>,
}

#[derive(Debug, Default)]
struct Inner {
    docs: HashMap<SessionCode, Value>,
    watchers: HashMap<SessionCode, Vec<mpsc::UnboundedSender<StoreEvent>>>,
}

impl Inner {
    /// Validates `candidate` as a session document, stores it, and
    /// notifies watchers. Nothing is stored if validation fails.
    fn commit(&mut self, code: &SessionCode, candidate: Value) -> Result<(), StoreError> {
        let document = SessionDocument::from_value(candidate.clone())?;
        self.docs.insert(code.clone(), candidate);
        self.notify(code, StoreEvent::Changed(document));
        Ok(())
    }

    /// Sends an event to every live watcher of `code`, pruning the ones
    /// whose receiver has been dropped.
    fn notify(&mut self, code: &SessionCode, event: StoreEvent) {
        if let Some(watchers) = self.watchers.get_mut(code) {
            watchers.retain(|tx| tx.send(event.clone()).is_ok());
            if watchers.is_empty() {
                self.watchers.remove(code);
            }
        }
    }

    /// Drops every closed watcher, and every code left with none.
    fn prune_watchers(&mut self) {
        self.watchers.retain(|_, watchers| {
            watchers.retain(|tx| !tx.is_closed());
            !watchers.is_empty()
        });
    }

    fn document_mut(&mut self, code: &SessionCode) -> Result<&mut Value, StoreError> {
        self.docs
            .get_mut(code)
            .ok_or_else(|| StoreError::NotFound(code.clone()))
    }

    /// Applies updates to a copy of the stored document and returns the
    /// copy. The stored document is untouched until `commit`.
    fn apply(&mut self, code: &SessionCode, updates: &[FieldUpdate]) -> Result<Value, StoreError> {
        let mut candidate = self.document_mut(code)?.clone();
        for update in updates {
            update.apply(&mut candidate)?;
        }
        Ok(candidate)
    }

    fn conditions_hold(
        &mut self,
        code: &SessionCode,
        conditions: &[FieldCondition],
    ) -> Result<bool, StoreError> {
        let current: &Value = self.document_mut(code)?;
        match conditions.iter().find(|condition| !condition.holds(current)) {
            Some(failed) => {
                tracing::debug!(%code, condition = %failed, "conditional update skipped");
                Ok(false)
            }
            None => Ok(true),
        }
    }
}

/// Adds `delta` to the integer at `path`, treating absent or `null` as 0.
fn increment(candidate: &mut Value, path: &FieldPath, delta: i64) -> Result<i64, StoreError> {
    let current = match path.get(candidate) {
        None | Some(Value::Null) => 0,
        Some(value) => value
            .as_i64()
            .ok_or_else(|| StoreError::Write(format!("{path} is not an integer: {value}")))?,
    };
    let next = current
        .checked_add(delta)
        .ok_or_else(|| StoreError::Write(format!("{path} overflowed")))?;
    path.set(candidate, Value::from(next))?;
    Ok(next)
}

impl MemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Removes a document. Watchers receive [`StoreEvent::Deleted`] and
    /// are dropped.
    ///
    /// Returns `true` if a document was removed.
    pub async fn delete(&self, code: &SessionCode) -> bool {
        let mut inner = self.inner.lock().await;
        let existed = inner.docs.remove(code).is_some();
        inner.notify(code, StoreEvent::Deleted);
        inner.watchers.remove(code);
        if existed {
            tracing::debug!(%code, "document deleted");
        }
        existed
    }

    /// Returns `true` if a document exists under `code`.
    pub async fn contains(&self, code: &SessionCode) -> bool {
        self.inner.lock().await.docs.contains_key(code)
    }

    /// Number of stored documents.
    pub async fn len(&self) -> usize {
        self.inner.lock().await.docs.len()
    }

    /// Returns `true` if no documents are stored.
    pub async fn is_empty(&self) -> bool {
        self.inner.lock().await.docs.is_empty()
    }

    /// Number of codes with at least one registered watcher, closed or not.
    pub async fn watched_codes(&self) -> usize {
        self.inner.lock().await.watchers.len()
    }

    /// Number of watchers of `code` whose receiver is still alive.
    pub async fn watcher_count(&self, code: &SessionCode) -> usize {
        self.inner
            .lock()
            .await
            .watchers
            .get(code)
            .map(|w| w.iter().filter(|tx| !tx.is_closed()).count())
            .unwrap_or(0)
    }

    /// Returns the raw stored JSON for `code`.
    pub async fn raw(&self, code: &SessionCode) -> Option<Value> {
        self.inner.lock().await.docs.get(code).cloned()
    }
}

impl SessionStore for MemoryStore {
    async fn get(&self, code: &SessionCode) -> Result<Option<SessionDocument>, StoreError> {
        let raw = self.inner.lock().await.docs.get(code).cloned();
        match raw {
            Some(value) => Ok(Some(SessionDocument::from_value(value)?)),
            None => Ok(None),
        }
    }

    async fn put(&self, code: &SessionCode, document: &SessionDocument) -> Result<(), StoreError> {
        let value = document.to_value()?;
        self.inner.lock().await.commit(code, value)
    }

    async fn create(
        &self,
        code: &SessionCode,
        document: &SessionDocument,
    ) -> Result<(), StoreError> {
        let value = document.to_value()?;
        let mut inner = self.inner.lock().await;
        if inner.docs.contains_key(code) {
            return Err(StoreError::AlreadyExists(code.clone()));
        }
        inner.commit(code, value)
    }

    async fn update_fields(
        &self,
        code: &SessionCode,
        updates: &[FieldUpdate],
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;
        let candidate = inner.apply(code, updates)?;
        inner.commit(code, candidate)
    }

    async fn update_fields_if(
        &self,
        code: &SessionCode,
        conditions: &[FieldCondition],
        updates: &[FieldUpdate],
    ) -> Result<bool, StoreError> {
        let mut inner = self.inner.lock().await;
        if !inner.conditions_hold(code, conditions)? {
            return Ok(false);
        }
        let candidate = inner.apply(code, updates)?;
        inner.commit(code, candidate)?;
        Ok(true)
    }

    async fn atomic_increment(
        &self,
        code: &SessionCode,
        path: &FieldPath,
        delta: i64,
    ) -> Result<i64, StoreError> {
        let mut inner = self.inner.lock().await;
        let mut candidate = inner.document_mut(code)?.clone();
        let next = increment(&mut candidate, path, delta)?;
        inner.commit(code, candidate)?;
        Ok(next)
    }

    async fn increment_and_update<F>(
        &self,
        code: &SessionCode,
        counter: &FieldPath,
        delta: i64,
        conditions: &[FieldCondition],
        then: F,
    ) -> Result<Option<i64>, StoreError>
    where
        F: FnOnce(i64) -> Result<Vec<FieldUpdate>, ProtocolError> + Send,
    {
        let mut inner = self.inner.lock().await;
        if !inner.conditions_hold(code, conditions)? {
            return Ok(None);
        }
        let mut candidate = inner.document_mut(code)?.clone();
        let next = increment(&mut candidate, counter, delta)?;
        for update in then(next)? {
            update.apply(&mut candidate)?;
        }
        inner.commit(code, candidate)?;
        Ok(Some(next))
    }

    async fn subscribe(&self, code: &SessionCode) -> Result<DocumentWatch, StoreError> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut inner = self.inner.lock().await;
        inner.prune_watchers();
        if let Some(value) = inner.docs.get(code) {
            let document = SessionDocument::from_value(value.clone())?;
            // The receiver is alive in this scope, so this can't fail.
            let _ = tx.send(StoreEvent::Changed(document));
        }
        inner.watchers.entry(code.clone()).or_default().push(tx);
        Ok(rx)
    }
}
