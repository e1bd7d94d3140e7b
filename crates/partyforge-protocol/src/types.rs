//! Identity and state types shared by every Partyforge layer.
//!
//! These are the small values that travel between the session manager,
//! the store, and the caller: the join code, the player slot key, and the
//! session status.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::ProtocolError;

// ---------------------------------------------------------------------------
// SessionCode
// ---------------------------------------------------------------------------

/// The short numeric code players type in to join a session.
///
/// Newtype wrapper around the digit string. Codes generated by the engine
/// are always fixed width (five digits by default), but any non-empty digit
/// string can be *looked up*, so `"00000"` parses fine and simply isn't
/// found.
///
/// The code is a convenience identifier, not a secret.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SessionCode(String);

impl SessionCode {
    /// Parses a user-supplied code.
    ///
    /// Surrounding whitespace is trimmed, since codes are usually typed
    /// by hand.
    ///
    /// # Errors
    /// Returns [`ProtocolError::InvalidCode`] if the input is empty or
    /// contains anything other than ASCII digits.
    pub fn parse(input: &str) -> Result<Self, ProtocolError> {
        let trimmed = input.trim();
        if trimmed.is_empty() || !trimmed.bytes().all(|b| b.is_ascii_digit()) {
            return Err(ProtocolError::InvalidCode(input.to_string()));
        }
        Ok(Self(trimmed.to_string()))
    }

    /// Builds a code from a number, zero-padded to `width` digits.
    pub fn from_number(value: u64, width: usize) -> Self {
        Self(format!("{value:0width$}"))
    }

    /// Returns the code as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for SessionCode {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for SessionCode {
    type Error = ProtocolError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<SessionCode> for String {
    fn from(code: SessionCode) -> Self {
        code.0
    }
}

// ---------------------------------------------------------------------------
// SlotKey
// ---------------------------------------------------------------------------

const CREATOR: &str = "creator";
const JOINER_PREFIX: &str = "joiner";

/// The key a player occupies inside a session's `players` map.
///
/// The first registrant is always `creator`; the Nth registrant after
/// that is `joiner{N}`. Keys are minted from the session's player counter
/// and never change afterwards.
///
/// Because only these two shapes parse, a `SlotKey` is always safe to
/// embed in a dotted field path like `players.joiner2.isReady`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SlotKey(String);

impl SlotKey {
    /// The slot of the first registrant.
    pub fn creator() -> Self {
        Self(CREATOR.to_string())
    }

    /// The slot of the `n`th registrant after the creator.
    ///
    /// `n` must be at least 1; `joiner(0)` would collide with nothing the
    /// allocator produces, so it is clamped to 1.
    pub fn joiner(n: u64) -> Self {
        Self(format!("{JOINER_PREFIX}{}", n.max(1)))
    }

    /// Maps the player counter value returned by an atomic increment to
    /// the slot it allocates.
    ///
    /// The counter goes from absent to 1 on the first registration, so
    /// `1 → creator`, `2 → joiner1`, `3 → joiner2`, and so on.
    pub fn from_allocation(counter: u64) -> Self {
        if counter <= 1 {
            Self::creator()
        } else {
            Self::joiner(counter - 1)
        }
    }

    /// Parses a slot key supplied by a caller.
    ///
    /// # Errors
    /// Returns [`ProtocolError::InvalidSlotKey`] for anything other than
    /// `creator` or `joiner{N}` with N >= 1 and no leading zeros.
    pub fn parse(input: &str) -> Result<Self, ProtocolError> {
        if input == CREATOR {
            return Ok(Self::creator());
        }
        let invalid = || ProtocolError::InvalidSlotKey(input.to_string());
        let digits = input.strip_prefix(JOINER_PREFIX).ok_or_else(invalid)?;
        if digits.is_empty()
            || digits.starts_with('0')
            || !digits.bytes().all(|b| b.is_ascii_digit())
        {
            return Err(invalid());
        }
        let n: u64 = digits.parse().map_err(|_| invalid())?;
        Ok(Self::joiner(n))
    }

    /// Returns `true` for the creator slot.
    pub fn is_creator(&self) -> bool {
        self.0 == CREATOR
    }

    /// Registration order of this slot: 0 for the creator, N for `joinerN`.
    pub fn ordinal(&self) -> u64 {
        self.0
            .strip_prefix(JOINER_PREFIX)
            .and_then(|n| n.parse().ok())
            .unwrap_or(0)
    }

    /// Returns the key as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Slots order by registration, so `joiner10` sorts after `joiner9`
/// rather than after `joiner1`.
impl Ord for SlotKey {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.ordinal()
            .cmp(&other.ordinal())
            .then_with(|| self.0.cmp(&other.0))
    }
}

impl PartialOrd for SlotKey {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for SlotKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for SlotKey {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for SlotKey {
    type Error = ProtocolError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<SlotKey> for String {
    fn from(slot: SlotKey) -> Self {
        slot.0
    }
}

// ---------------------------------------------------------------------------
// SessionStatus
// ---------------------------------------------------------------------------

/// The lifecycle state of a session.
///
/// Transitions only move forward:
///
/// ```text
/// NotStarted ──start──→ InProgress ──end──→ Finished
///      └──────────────────end──────────────────┘
/// ```
///
/// Ending a lobby that never started is allowed (the host walked away);
/// going backwards never is. The derived ordering follows the lifecycle,
/// so `a <= b` means "b is not a regression from a".
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "camelCase")]
pub enum SessionStatus {
    /// Lobby phase: players register and mark themselves ready.
    #[default]
    NotStarted,
    /// The creator started the game.
    InProgress,
    /// The game is over. Terminal.
    Finished,
}

impl SessionStatus {
    /// The state `start` moves to, if any.
    pub fn next(self) -> Option<Self> {
        match self {
            Self::NotStarted => Some(Self::InProgress),
            Self::InProgress => Some(Self::Finished),
            Self::Finished => None,
        }
    }

    /// Returns `true` if moving to `target` is a legal forward transition.
    pub fn can_transition_to(self, target: Self) -> bool {
        match target {
            Self::InProgress => self == Self::NotStarted,
            Self::Finished => self != Self::Finished,
            Self::NotStarted => false,
        }
    }

    /// Returns `true` once the session can no longer change phase.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Finished)
    }

    /// The persisted string form (`"notStarted"`, `"inProgress"`, `"finished"`).
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NotStarted => "notStarted",
            Self::InProgress => "inProgress",
            Self::Finished => "finished",
        }
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotStarted => write!(f, "NotStarted"),
            Self::InProgress => write!(f, "InProgress"),
            Self::Finished => write!(f, "Finished"),
        }
    }
}
