//! The persisted session document.
//!
//! Logical shape (camelCase on the wire):
//!
//! ```text
//! {
//!   "status": "notStarted",
//!   "createdAt": 1760000000000,
//!   "metadata": { ...game-specific... },
//!   "players": {
//!     "creator": { "name": "Alice", "isReady": true,  ...extra },
//!     "joiner1": { "name": "Bob",   "isReady": false, ...extra }
//!   },
//!   "playerCount": 2,
//!   ...initial fields...
//! }
//! ```
//!
//! `playerCount` is absent until the first registration. Anything at the
//! top level that isn't one of the named fields lands in
//! [`SessionDocument::fields`].

use std::collections::BTreeMap;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{ProtocolError, SessionCode, SessionStatus, SlotKey};

/// An open mapping of game-specific fields.
pub type Fields = Map<String, Value>;

// ---------------------------------------------------------------------------
// Player
// ---------------------------------------------------------------------------

/// One registered participant, owned by its session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Player {
    /// Display name, fixed at registration.
    pub name: String,

    /// Starts `true` for the creator and `false` for everyone else.
    /// Only ever flips to `true`.
    #[serde(default)]
    pub is_ready: bool,

    /// Game-specific per-player fields (a submitted secret, an assigned
    /// role). Stored inline next to `name` and `isReady`.
    #[serde(flatten)]
    pub extra: Fields,
}

impl Player {
    /// Builds the record written when `slot` registers.
    ///
    /// `name` and `isReady` keys in `extra` are dropped; they would
    /// otherwise shadow the real fields once flattened.
    pub fn new(name: impl Into<String>, slot: &SlotKey, mut extra: Fields) -> Self {
        extra.remove("name");
        extra.remove("isReady");
        Self {
            name: name.into(),
            is_ready: slot.is_creator(),
            extra,
        }
    }

    /// Looks up one game-specific field.
    pub fn field(&self, key: &str) -> Option<&Value> {
        self.extra.get(key)
    }
}

// ---------------------------------------------------------------------------
// SessionDocument
// ---------------------------------------------------------------------------

/// The full state of one session as the store holds it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionDocument {
    /// Lifecycle phase. Never regresses.
    pub status: SessionStatus,

    /// Creation time in Unix milliseconds. Set once.
    pub created_at: u64,

    /// Game-level settings supplied at creation.
    #[serde(default)]
    pub metadata: Fields,

    /// Registered players keyed by slot, in registration order.
    #[serde(default)]
    pub players: BTreeMap<SlotKey, Player>,

    /// The slot allocator. `None` before anyone has registered.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub player_count: Option<u64>,

    /// Caller-supplied top-level fields merged in at creation.
    #[serde(flatten)]
    pub fields: Fields,
}

impl SessionDocument {
    /// A fresh `NotStarted` document with no players.
    ///
    /// Initial fields that collide with a named field (`status`,
    /// `players`, ...) are dropped so they can't shadow the engine's own
    /// state when the document is flattened.
    pub fn new(metadata: Fields, mut fields: Fields, created_at: u64) -> Self {
        for reserved in RESERVED_FIELDS {
            fields.remove(*reserved);
        }
        Self {
            status: SessionStatus::NotStarted,
            created_at,
            metadata,
            players: BTreeMap::new(),
            player_count: None,
            fields,
        }
    }

    /// Looks up a player by slot.
    pub fn player(&self, slot: &SlotKey) -> Option<&Player> {
        self.players.get(slot)
    }

    /// The creator's record, once they've registered.
    pub fn creator(&self) -> Option<&Player> {
        self.players.get(&SlotKey::creator())
    }

    /// Players in registration order.
    pub fn players_in_order(&self) -> impl Iterator<Item = (&SlotKey, &Player)> {
        self.players.iter()
    }

    /// How many players have marked themselves ready (creator included).
    pub fn ready_count(&self) -> usize {
        self.players.values().filter(|p| p.is_ready).count()
    }

    /// `true` when at least one player exists and all of them are ready.
    pub fn all_ready(&self) -> bool {
        !self.players.is_empty() && self.players.values().all(|p| p.is_ready)
    }

    /// Converts the document into its stored JSON form.
    pub fn to_value(&self) -> Result<Value, ProtocolError> {
        serde_json::to_value(self).map_err(ProtocolError::Encode)
    }

    /// Reads a document back from its stored JSON form.
    pub fn from_value(value: Value) -> Result<Self, ProtocolError> {
        serde_json::from_value(value).map_err(ProtocolError::Decode)
    }
}

/// Top-level keys owned by the engine.
pub const RESERVED_FIELDS: &[&str] = &["status", "createdAt", "metadata", "players", "playerCount"];

/// Current wall-clock time in Unix milliseconds.
pub fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

// ---------------------------------------------------------------------------
// SessionSnapshot
// ---------------------------------------------------------------------------

/// A document together with the code it lives under.
///
/// Every read the engine hands back to a caller is a snapshot: a copy of
/// the state at one moment, not a live view.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSnapshot {
    pub code: SessionCode,
    pub document: SessionDocument,
}

impl SessionSnapshot {
    pub fn new(code: SessionCode, document: SessionDocument) -> Self {
        Self { code, document }
    }

    /// Shorthand for `self.document.status`.
    pub fn status(&self) -> SessionStatus {
        self.document.status
    }
}
