use partyforge_protocol::{ProtocolError, SessionCode};

/// Errors that can occur in the store layer.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// No document exists under this code.
    #[error("no document for session {0}")]
    NotFound(SessionCode),

    /// `create` found a document already stored under this code.
    #[error("a document already exists for session {0}")]
    AlreadyExists(SessionCode),

    /// The backing store failed while reading.
    #[error("read failed: {0}")]
    Read(String),

    /// The backing store failed while writing.
    #[error("write failed: {0}")]
    Write(String),

    /// A stored document or a requested update is malformed.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}
