//! Game-specific reshaping of a session at start time.

use partyforge_protocol::SessionDocument;
use partyforge_shuffle::Shuffler;
use tracing::debug;

use crate::SessionError;

/// Transforms a session document right before it goes in progress.
///
/// `start_session` reads the lobby, hands the document to `assign`, and
/// persists whatever comes back (metadata, players and top-level fields).
/// `status`, `createdAt` and `playerCount` are owned by the engine and any
/// change an assignment makes to them is ignored.
///
/// Closures with the matching signature implement this trait:
///
/// ```
/// use partyforge_protocol::SessionDocument;
/// use partyforge_session::{Assignment, SessionError};
///
/// let add_round = |mut doc: SessionDocument| -> Result<SessionDocument, SessionError> {
///     doc.fields.insert("round".into(), 1.into());
///     Ok(doc)
/// };
/// let doc = add_round.assign(SessionDocument::default()).unwrap();
/// assert_eq!(doc.fields["round"], 1);
/// ```
pub trait Assignment: Send + Sync {
    fn assign(&self, session: SessionDocument) -> Result<SessionDocument, SessionError>;
}

impl<F> Assignment for F
where
    F: Fn(SessionDocument) -> Result<SessionDocument, SessionError> + Send + Sync,
{
    fn assign(&self, session: SessionDocument) -> Result<SessionDocument, SessionError> {
        self(session)
    }
}

/// Starts the session as-is.
#[derive(Debug, Clone, Copy, Default)]
pub struct Identity;

impl Assignment for Identity {
    fn assign(&self, session: SessionDocument) -> Result<SessionDocument, SessionError> {
        Ok(session)
    }
}

/// Hands every player somebody else's secret.
///
/// Each player's `source` field is collected in slot order, the positions
/// are deranged, and the value that lands on a player is written to their
/// `target` field. Nobody receives their own entry back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecretSwap {
    pub source: String,
    pub target: String,
}

impl SecretSwap {
    pub fn new(source: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
        }
    }
}

impl Assignment for SecretSwap {
    fn assign(&self, mut session: SessionDocument) -> Result<SessionDocument, SessionError> {
        let mut slots = Vec::with_capacity(session.players.len());
        let mut secrets = Vec::with_capacity(session.players.len());
        for (slot, player) in session.players_in_order() {
            let secret = player
                .field(&self.source)
                .cloned()
                .ok_or_else(|| SessionError::MissingField {
                    slot: slot.clone(),
                    field: self.source.clone(),
                })?;
            slots.push(slot.clone());
            secrets.push(secret);
        }

        let handed_out = Shuffler::new().shuffle(&secrets, false)?;
        for (slot, secret) in slots.iter().zip(handed_out) {
            if let Some(player) = session.players.get_mut(slot) {
                player.extra.insert(self.target.clone(), secret);
            }
        }

        debug!(
            players = slots.len(),
            source = %self.source,
            target = %self.target,
            "secrets swapped"
        );
        Ok(session)
    }
}
