//! Error types for the session layer.

use partyforge_protocol::{ProtocolError, SessionCode, SessionStatus, SlotKey};
use partyforge_shuffle::ShuffleError;
use partyforge_store::StoreError;

/// Errors that can occur during session operations.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// No session is stored under this code.
    #[error("session {0} not found")]
    NotFound(SessionCode),

    /// The slot has no player record in this session.
    #[error("player {slot} not found in session {code}")]
    PlayerNotFound { code: SessionCode, slot: SlotKey },

    /// The session no longer accepts joins or registrations.
    #[error("session {code} is closed ({status})")]
    SessionClosed {
        code: SessionCode,
        status: SessionStatus,
    },

    /// The requested lifecycle transition is not allowed.
    #[error("session {code} cannot move from {from} to {to}")]
    InvalidTransition {
        code: SessionCode,
        from: SessionStatus,
        to: SessionStatus,
    },

    /// `require_all_ready` is set and some players haven't readied up.
    #[error("session {code} has {waiting} player(s) not ready")]
    PlayersNotReady { code: SessionCode, waiting: usize },

    /// Player names must contain something besides whitespace.
    #[error("player name must not be empty")]
    InvalidName,

    /// An assignment needed a per-player field that wasn't there.
    #[error("player {slot} has no `{field}` field")]
    MissingField { slot: SlotKey, field: String },

    /// Every generated code was already taken.
    #[error("no free session code after {attempts} attempts")]
    CodeSpaceExhausted { attempts: u32 },

    /// Reading from the store failed.
    #[error("store read failed")]
    StoreRead(#[source] StoreError),

    /// Writing to the store failed.
    #[error("store write failed")]
    StoreWrite(#[source] StoreError),

    /// The shuffler could not produce an assignment.
    #[error(transparent)]
    Shuffle(#[from] ShuffleError),

    /// A document or path could not be encoded.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// A caller-supplied continuation failed.
    #[error("session hook failed: {0}")]
    Hook(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl SessionError {
    /// Maps a failed store write. A document that disappeared mid-operation
    /// surfaces as [`SessionError::NotFound`].
    pub(crate) fn from_write(code: &SessionCode, err: StoreError) -> Self {
        match err {
            StoreError::NotFound(_) => Self::NotFound(code.clone()),
            other => Self::StoreWrite(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn code() -> SessionCode {
        SessionCode::parse("48213").unwrap()
    }

    #[test]
    fn test_session_error_display() {
        assert_eq!(
            SessionError::NotFound(code()).to_string(),
            "session 48213 not found"
        );
        assert_eq!(
            SessionError::InvalidTransition {
                code: code(),
                from: SessionStatus::Finished,
                to: SessionStatus::InProgress,
            }
            .to_string(),
            "session 48213 cannot move from Finished to InProgress"
        );
        assert_eq!(
            SessionError::MissingField {
                slot: SlotKey::joiner(2),
                field: "celebrity".into(),
            }
            .to_string(),
            "player joiner2 has no `celebrity` field"
        );
    }

    #[test]
    fn test_from_write_maps_missing_document_to_not_found() {
        let err = SessionError::from_write(&code(), StoreError::NotFound(code()));
        assert!(matches!(err, SessionError::NotFound(c) if c == code()));

        let err = SessionError::from_write(&code(), StoreError::Write("timeout".into()));
        assert!(matches!(err, SessionError::StoreWrite(StoreError::Write(_))));
    }

    #[test]
    fn test_store_errors_keep_their_source() {
        use std::error::Error;

        let err = SessionError::StoreRead(StoreError::Read("connection reset".into()));
        let source = err.source().map(|s| s.to_string());
        assert_eq!(source.as_deref(), Some("read failed: connection reset"));
    }
}
