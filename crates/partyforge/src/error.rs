//! Unified error type for Partyforge.

use partyforge_protocol::ProtocolError;
use partyforge_session::SessionError;
use partyforge_shuffle::ShuffleError;
use partyforge_store::StoreError;

/// Top-level error that wraps all crate-specific errors.
///
/// Lobby operations return this, and `?` converts any sub-crate error
/// into it.
#[derive(Debug, thiserror::Error)]
pub enum PartyforgeError {
    /// A lifecycle error (not found, closed, bad transition).
    #[error(transparent)]
    Session(#[from] SessionError),

    /// A store error raised outside a lifecycle operation.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// A shuffle that could not be completed.
    #[error(transparent)]
    Shuffle(#[from] ShuffleError),

    /// A malformed code, slot key or document.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

impl PartyforgeError {
    /// The session-layer error, if this is one.
    pub fn as_session(&self) -> Option<&SessionError> {
        match self {
            Self::Session(err) => Some(err),
            _ => None,
        }
    }
}
