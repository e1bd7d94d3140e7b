//! Session data model for Partyforge.
//!
//! This crate defines the values every other layer agrees on:
//!
//! - **Identifiers** ([`SessionCode`], [`SlotKey`]): the join code and the
//!   key a player occupies inside a session.
//! - **State** ([`SessionStatus`], [`SessionDocument`], [`Player`]): the
//!   persisted shape of a session.
//! - **Paths** ([`FieldPath`], [`FieldUpdate`], [`FieldCondition`]): how
//!   partial and conditional updates are addressed at the store boundary.
//! - **Errors** ([`ProtocolError`]): malformed identifiers or documents.
//!
//! # Architecture
//!
//! ```text
//! Session layer (manager, feed) → Protocol (documents, paths) → Store (persistence)
//! ```

mod document;
mod error;
mod path;
mod types;

pub use document::{Fields, Player, RESERVED_FIELDS, SessionDocument, SessionSnapshot, unix_millis};
pub use error::ProtocolError;
pub use path::{FieldChange, FieldCondition, FieldPath, FieldUpdate};
pub use types::{SessionCode, SessionStatus, SlotKey};
