//! Store abstraction layer for Partyforge.
//!
//! The session engine keeps no durable state of its own. Everything lives
//! in a keyed document store behind the [`SessionStore`] trait, and that
//! store is the only synchronization point between independent clients.
//!
//! # Feature Flags
//!
//! - `memory` (default): [`MemoryStore`], an in-process store used by
//!   tests, demos and single-process deployments.

#![allow(async_fn_in_trait)]

mod error;
#[cfg(feature = "memory")]
mod memory;

pub use error::StoreError;
#[cfg(feature = "memory")]
pub use memory::MemoryStore;

use std::future::Future;

use partyforge_protocol::{
    FieldCondition, FieldPath, FieldUpdate, ProtocolError, SessionCode, SessionDocument,
};
use tokio::sync::mpsc;

/// A change notification for one watched document.
#[derive(Debug, Clone, PartialEq)]
pub enum StoreEvent {
    /// The document was written. Carries the full current document.
    Changed(SessionDocument),
    /// The document was removed. Nothing follows this event.
    Deleted,
}

/// Receiving end of a document watch. Dropping it unsubscribes.
pub type DocumentWatch = mpsc::UnboundedReceiver<StoreEvent>;

/// A durable keyed document store.
///
/// Every method returns a `Send` future so callers can drive store
/// operations from spawned Tokio tasks.
///
/// # Contract
///
/// - Partial updates (`update_fields`, `update_fields_if`,
///   `atomic_increment`, `increment_and_update`) never create a document;
///   on a missing document they fail with [`StoreError::NotFound`].
/// - `atomic_increment` and `increment_and_update` are single
///   read-modify-writes: two concurrent increments of the same field
///   always return distinct values.
/// - A write that fails, or whose conditions don't hold, leaves the
///   document exactly as it was.
/// - A watch receives the current document first (if one exists), then
///   one [`StoreEvent::Changed`] per successful write, in write order.
pub trait SessionStore: Send + Sync + 'static {
    /// Reads a document. `Ok(None)` means it doesn't exist.
    fn get(
        &self,
        code: &SessionCode,
    ) -> impl Future<Output = Result<Option<SessionDocument>, StoreError>> + Send;

    /// Creates or fully replaces a document.
    fn put(
        &self,
        code: &SessionCode,
        document: &SessionDocument,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Creates a document only if the code is free.
    ///
    /// # Errors
    /// [`StoreError::AlreadyExists`] when the code is taken.
    fn create(
        &self,
        code: &SessionCode,
        document: &SessionDocument,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Applies partial updates addressed by dotted path, all at once.
    fn update_fields(
        &self,
        code: &SessionCode,
        updates: &[FieldUpdate],
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Applies `updates` only if every condition holds.
    ///
    /// Returns `Ok(false)` when a condition failed and nothing was
    /// written.
    fn update_fields_if(
        &self,
        code: &SessionCode,
        conditions: &[FieldCondition],
        updates: &[FieldUpdate],
    ) -> impl Future<Output = Result<bool, StoreError>> + Send;

    /// Adds `delta` to the integer at `path` and returns the new value.
    /// An absent field counts as 0.
    fn atomic_increment(
        &self,
        code: &SessionCode,
        path: &FieldPath,
        delta: i64,
    ) -> impl Future<Output = Result<i64, StoreError>> + Send;

    /// Increments the integer at `counter` and, in the same atomic step,
    /// applies the updates `then` builds from the new value.
    ///
    /// Returns `Ok(None)` without writing when a condition failed. If
    /// `then` or any of its updates fails, the counter is not advanced.
    fn increment_and_update<F>(
        &self,
        code: &SessionCode,
        counter: &FieldPath,
        delta: i64,
        conditions: &[FieldCondition],
        then: F,
    ) -> impl Future<Output = Result<Option<i64>, StoreError>> + Send
    where
        F: FnOnce(i64) -> Result<Vec<FieldUpdate>, ProtocolError> + Send;

    /// Starts watching a document.
    fn subscribe(
        &self,
        code: &SessionCode,
    ) -> impl Future<Output = Result<DocumentWatch, StoreError>> + Send;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_error_display() {
        let code = SessionCode::parse("12345").unwrap();
        assert_eq!(
            StoreError::NotFound(code.clone()).to_string(),
            "no document for session 12345"
        );
        assert_eq!(
            StoreError::Write("disk full".into()).to_string(),
            "write failed: disk full"
        );
    }

    #[test]
    fn test_store_error_from_protocol_error() {
        let err: StoreError =
            partyforge_protocol::ProtocolError::InvalidPath(String::new()).into();
        assert!(matches!(err, StoreError::Protocol(_)));
    }
}
