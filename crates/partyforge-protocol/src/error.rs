//! Error types for the protocol layer.
//!
//! Each crate in Partyforge defines its own error enum. A `ProtocolError`
//! always means the data itself was malformed: a code that isn't numeric,
//! a slot key the engine would never mint, or a document that doesn't
//! match the persisted shape.

/// Errors that can occur while parsing identifiers or converting
/// session documents to and from their JSON form.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// A session code must be a non-empty string of ASCII digits.
    #[error("invalid session code: {0:?}")]
    InvalidCode(String),

    /// A slot key must be `creator` or `joiner{N}` with N >= 1.
    #[error("invalid slot key: {0:?}")]
    InvalidSlotKey(String),

    /// A field path was empty or contained an empty segment.
    #[error("invalid field path: {0:?}")]
    InvalidPath(String),

    /// A field path walks through a value that isn't an object,
    /// e.g. `status.foo` when `status` is a string.
    #[error("field path {0} crosses a non-object value")]
    PathConflict(String),

    /// Serializing a document into its JSON value failed.
    #[error("encode failed: {0}")]
    Encode(serde_json::Error),

    /// A stored JSON value doesn't have the shape of a session document.
    ///
    /// Common causes: a missing `status`, a player without a `name`, or a
    /// `playerCount` that isn't an unsigned integer.
    #[error("decode failed: {0}")]
    Decode(serde_json::Error),
}
