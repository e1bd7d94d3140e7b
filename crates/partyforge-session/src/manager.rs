//! The session manager: drives a session through its lifecycle.
//!
//! ```text
//! create_session() ──→ [NotStarted] ──start_session()──→ [InProgress]
//!                           │  ▲                              │
//!          register_player()│  │mark_ready()                  │ end_session()
//!                           ▼  │                              ▼
//!                        players.<slot>                   [Finished]
//! ```
//!
//! `end_session` is legal from `NotStarted` too. Nothing ever moves a
//! session backwards.
//!
//! # Concurrency
//!
//! The manager holds no session state of its own. Registration increments
//! `playerCount` and writes the new player in one atomic step, guarded on
//! the status it read. `start_session` commits with a write guarded on
//! `status == "notStarted"`. Any number of managers (on any number of
//! hosts) can therefore share one store.

use std::future::Future;
use std::sync::Arc;

use partyforge_protocol::{
    FieldCondition, FieldPath, FieldUpdate, Fields, Player, ProtocolError, SessionCode,
    SessionDocument, SessionSnapshot, SessionStatus, SlotKey, unix_millis,
};
use partyforge_store::{SessionStore, StoreError};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::{Assignment, CodeGenerator, SessionConfig, SessionError};

/// Runs lifecycle operations against a [`SessionStore`].
pub struct SessionManager<S> {
    store: Arc<S>,
    config: SessionConfig,
    codes: CodeGenerator,
}

impl<S: SessionStore> SessionManager<S> {
    /// Creates a manager. `config` is validated first.
    pub fn new(store: Arc<S>, config: SessionConfig) -> Self {
        let config = config.validated();
        let codes = CodeGenerator::new(config.code_digits);
        Self {
            store,
            config,
            codes,
        }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    // -----------------------------------------------------------------------
    // Reads
    // -----------------------------------------------------------------------

    /// Reads the current state of a session.
    ///
    /// # Errors
    /// [`SessionError::NotFound`] if no document exists for `code`.
    pub async fn session(&self, code: &SessionCode) -> Result<SessionSnapshot, SessionError> {
        let document = self
            .store
            .get(code)
            .await
            .map_err(SessionError::StoreRead)?
            .ok_or_else(|| SessionError::NotFound(code.clone()))?;
        Ok(SessionSnapshot::new(code.clone(), document))
    }

    /// Looks a session up for a player who typed in its code.
    ///
    /// # Errors
    /// - [`SessionError::NotFound`] for an unknown code.
    /// - [`SessionError::SessionClosed`] once the session has finished.
    pub async fn join_session(&self, code: &SessionCode) -> Result<SessionSnapshot, SessionError> {
        let snapshot = self.session(code).await?;
        if snapshot.status().is_terminal() {
            debug!(%code, "join refused, session finished");
            return Err(SessionError::SessionClosed {
                code: code.clone(),
                status: snapshot.status(),
            });
        }
        debug!(%code, status = %snapshot.status(), "session joined");
        Ok(snapshot)
    }

    // -----------------------------------------------------------------------
    // Lobby
    // -----------------------------------------------------------------------

    /// Writes a fresh `NotStarted` session under a newly drawn code.
    ///
    /// Codes that are already taken are redrawn, up to
    /// `max_code_attempts` times.
    ///
    /// # Errors
    /// - [`SessionError::CodeSpaceExhausted`] when every draw collided.
    /// - [`SessionError::StoreWrite`] when the store rejects the write.
    pub async fn create_session(
        &self,
        metadata: Fields,
        initial_fields: Fields,
    ) -> Result<SessionCode, SessionError> {
        let document = SessionDocument::new(metadata, initial_fields, unix_millis());
        let attempts = self.config.max_code_attempts;

        for attempt in 1..=attempts {
            let code = self.codes.generate();
            match self.store.create(&code, &document).await {
                Ok(()) => {
                    info!(%code, attempt, "session created");
                    return Ok(code);
                }
                Err(StoreError::AlreadyExists(_)) => {
                    debug!(%code, attempt, "session code taken, redrawing");
                }
                Err(e) => return Err(SessionError::StoreWrite(e)),
            }
        }

        warn!(
            attempts,
            capacity = self.codes.capacity(),
            "no free session code"
        );
        Err(SessionError::CodeSpaceExhausted { attempts })
    }

    /// Adds a player and returns the slot they were given.
    ///
    /// The first player to register becomes `creator` (and starts ready);
    /// everyone after gets `joiner1`, `joiner2`, ... in allocation order.
    /// Concurrent registrations always get distinct slots.
    ///
    /// # Errors
    /// - [`SessionError::InvalidName`] for a blank name.
    /// - [`SessionError::NotFound`] for an unknown code.
    /// - [`SessionError::SessionClosed`] once finished, or once started
    ///   unless `allow_late_registration` is set.
    pub async fn register_player(
        &self,
        code: &SessionCode,
        name: &str,
        extra: Fields,
    ) -> Result<SlotKey, SessionError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(SessionError::InvalidName);
        }

        let mut snapshot = self.session(code).await?;
        // Status only moves forward, so a lost guard is retried at most twice.
        loop {
            self.check_registration_open(&snapshot)?;
            let unchanged = FieldCondition::new(FieldPath::status(), snapshot.status().as_str());

            let write_player = |counter: i64| -> Result<Vec<FieldUpdate>, ProtocolError> {
                let slot = allocated_slot(counter);
                let player = Player::new(name, &slot, extra.clone());
                let record = serde_json::to_value(&player).map_err(ProtocolError::Encode)?;
                Ok(vec![FieldUpdate::new(FieldPath::player(&slot), record)])
            };
            let allocated = self
                .store
                .increment_and_update(
                    code,
                    &FieldPath::player_count(),
                    1,
                    &[unchanged],
                    write_player,
                )
                .await
                .map_err(|e| SessionError::from_write(code, e))?;

            match allocated {
                Some(counter) => {
                    let slot = allocated_slot(counter);
                    info!(%code, %slot, name, "player registered");
                    return Ok(slot);
                }
                None => {
                    debug!(%code, "status changed during registration, re-reading");
                    snapshot = self.session(code).await?;
                }
            }
        }
    }

    fn check_registration_open(&self, snapshot: &SessionSnapshot) -> Result<(), SessionError> {
        let open = match snapshot.status() {
            SessionStatus::NotStarted => true,
            SessionStatus::InProgress => self.config.allow_late_registration,
            SessionStatus::Finished => false,
        };
        if open {
            Ok(())
        } else {
            debug!(code = %snapshot.code, status = %snapshot.status(), "registration refused");
            Err(SessionError::SessionClosed {
                code: snapshot.code.clone(),
                status: snapshot.status(),
            })
        }
    }

    /// Marks a player ready. Already-ready players are left alone.
    ///
    /// # Errors
    /// [`SessionError::NotFound`] or [`SessionError::PlayerNotFound`].
    pub async fn mark_ready(&self, code: &SessionCode, slot: &SlotKey) -> Result<(), SessionError> {
        let snapshot = self.session(code).await?;
        let player =
            snapshot
                .document
                .player(slot)
                .ok_or_else(|| SessionError::PlayerNotFound {
                    code: code.clone(),
                    slot: slot.clone(),
                })?;

        if player.is_ready {
            debug!(%code, %slot, "player already ready");
            return Ok(());
        }

        self.store
            .update_fields(code, &[FieldUpdate::new(FieldPath::player_ready(slot), true)])
            .await
            .map_err(|e| SessionError::from_write(code, e))?;

        info!(%code, %slot, "player ready");
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Transitions
    // -----------------------------------------------------------------------

    /// Moves a lobby to `InProgress`, running `assignment` on the way.
    ///
    /// Starting a session that is already in progress is a no-op that
    /// returns its current state; the assignment does not run again.
    ///
    /// # Errors
    /// - [`SessionError::NotFound`] for an unknown code.
    /// - [`SessionError::InvalidTransition`] for a finished session.
    /// - [`SessionError::PlayersNotReady`] when `require_all_ready` is set
    ///   and someone hasn't readied up.
    /// - Whatever `assignment` returns.
    pub async fn start_session<A>(
        &self,
        code: &SessionCode,
        assignment: &A,
    ) -> Result<SessionSnapshot, SessionError>
    where
        A: Assignment + ?Sized,
    {
        let snapshot = self.session(code).await?;
        match snapshot.status() {
            SessionStatus::NotStarted => {}
            SessionStatus::InProgress => {
                debug!(%code, "session already in progress");
                return Ok(snapshot);
            }
            status @ SessionStatus::Finished => {
                return Err(SessionError::InvalidTransition {
                    code: code.clone(),
                    from: status,
                    to: SessionStatus::InProgress,
                });
            }
        }

        if self.config.require_all_ready && !snapshot.document.all_ready() {
            let waiting = snapshot.document.players.len() - snapshot.document.ready_count();
            return Err(SessionError::PlayersNotReady {
                code: code.clone(),
                waiting,
            });
        }

        let before = snapshot.document;
        let assigned = assignment.assign(before.clone())?;
        let players = assigned.players.len();
        let updates = start_updates(&before, &assigned)?;
        let not_started =
            FieldCondition::new(FieldPath::status(), SessionStatus::NotStarted.as_str());

        let applied = self
            .store
            .update_fields_if(code, &[not_started], &updates)
            .await
            .map_err(|e| SessionError::from_write(code, e))?;

        if !applied {
            // Someone else moved the session between our read and write.
            let current = self.session(code).await?;
            return match current.status() {
                SessionStatus::InProgress => {
                    debug!(%code, "session started concurrently");
                    Ok(current)
                }
                from => Err(SessionError::InvalidTransition {
                    code: code.clone(),
                    from,
                    to: SessionStatus::InProgress,
                }),
            };
        }

        info!(%code, players, "session started");
        self.session(code).await
    }

    /// Marks a session finished and returns its final state.
    ///
    /// Legal from any state. Ending an already finished session rewrites
    /// the same status and succeeds.
    pub async fn end_session(&self, code: &SessionCode) -> Result<SessionSnapshot, SessionError> {
        let finished = Value::from(SessionStatus::Finished.as_str());
        self.store
            .update_fields(code, &[FieldUpdate::new(FieldPath::status(), finished)])
            .await
            .map_err(|e| SessionError::from_write(code, e))?;

        info!(%code, "session finished");
        self.session(code).await
    }

    /// Ends the session, then hands the final snapshot to `on_end`.
    ///
    /// The session stays finished even if `on_end` fails; its error comes
    /// back as [`SessionError::Hook`].
    pub async fn end_session_with<F, Fut, E>(
        &self,
        code: &SessionCode,
        on_end: F,
    ) -> Result<SessionSnapshot, SessionError>
    where
        F: FnOnce(SessionSnapshot) -> Fut,
        Fut: Future<Output = Result<(), E>>,
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        let snapshot = self.end_session(code).await?;
        if let Err(e) = on_end(snapshot.clone()).await {
            let err = e.into();
            warn!(%code, error = %err, "end-of-session hook failed");
            return Err(SessionError::Hook(err));
        }
        Ok(snapshot)
    }
}

/// The slot minted by the `counter`-th registration.
fn allocated_slot(counter: i64) -> SlotKey {
    // Stored counts are unsigned, so a committed counter is at least 1.
    SlotKey::from_allocation(u64::try_from(counter).unwrap_or(0))
}

/// The writes that commit a start: whatever the assignment changed between
/// `before` and `after`, plus the new status.
///
/// Fields and players the assignment dropped are removed. Surviving players
/// are written key by key, so a registration or `mark_ready` racing with
/// the start is not erased, and `isReady` is never written back to `false`.
/// `createdAt` and `playerCount` are engine-owned and never written here.
fn start_updates(
    before: &SessionDocument,
    after: &SessionDocument,
) -> Result<Vec<FieldUpdate>, SessionError> {
    let mut updates = Vec::new();

    if after.metadata != before.metadata {
        updates.push(FieldUpdate::new(
            FieldPath::metadata(),
            Value::Object(after.metadata.clone()),
        ));
    }

    for (slot, player) in &after.players {
        match before.players.get(slot) {
            Some(previous) => player_updates(slot, previous, player, &mut updates),
            None => {
                let record = serde_json::to_value(player).map_err(ProtocolError::Encode)?;
                updates.push(FieldUpdate::new(FieldPath::player(slot), record));
            }
        }
    }
    for slot in before.players.keys() {
        if !after.players.contains_key(slot) {
            updates.push(FieldUpdate::remove(FieldPath::player(slot)));
        }
    }

    for (key, value) in &after.fields {
        if before.fields.get(key) != Some(value) {
            updates.push(FieldUpdate::new(FieldPath::field(key.clone()), value.clone()));
        }
    }
    for key in before.fields.keys() {
        if !after.fields.contains_key(key) {
            updates.push(FieldUpdate::remove(FieldPath::field(key.clone())));
        }
    }

    updates.push(FieldUpdate::new(
        FieldPath::status(),
        SessionStatus::InProgress.as_str(),
    ));
    Ok(updates)
}

fn player_updates(
    slot: &SlotKey,
    before: &Player,
    after: &Player,
    updates: &mut Vec<FieldUpdate>,
) {
    let record = FieldPath::player(slot);
    if after.name != before.name {
        updates.push(FieldUpdate::new(record.clone().child("name"), after.name.clone()));
    }
    if after.is_ready && !before.is_ready {
        updates.push(FieldUpdate::new(FieldPath::player_ready(slot), true));
    }
    for (key, value) in &after.extra {
        if before.extra.get(key) != Some(value) {
            updates.push(FieldUpdate::new(record.clone().child(key.clone()), value.clone()));
        }
    }
    for key in before.extra.keys() {
        if !after.extra.contains_key(key) {
            updates.push(FieldUpdate::remove(record.clone().child(key.clone())));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn lobby() -> SessionDocument {
        let mut doc = SessionDocument::new(Fields::new(), Fields::new(), 42);
        doc.players.insert(
            SlotKey::creator(),
            Player::new("Ada", &SlotKey::creator(), Fields::new()),
        );
        let mut extra = Fields::new();
        extra.insert("celebrity".into(), json!("Cher"));
        doc.players.insert(
            SlotKey::joiner(1),
            Player::new("Bob", &SlotKey::joiner(1), extra),
        );
        doc.fields.insert("round".into(), json!(0));
        doc.player_count = Some(2);
        doc
    }

    fn paths(updates: &[FieldUpdate]) -> Vec<String> {
        updates.iter().map(|u| u.path.to_string()).collect()
    }

    #[test]
    fn test_start_updates_skip_engine_owned_fields() {
        let before = lobby();
        let mut after = before.clone();
        after.metadata.insert("deck".into(), json!("red"));
        after.fields.insert("round".into(), json!(1));
        after.created_at = 0;
        after.player_count = Some(99);

        let updates = start_updates(&before, &after).unwrap();
        assert_eq!(paths(&updates), ["metadata", "round", "status"]);
        assert_eq!(updates.last().unwrap().value(), Some(&json!("inProgress")));
    }

    #[test]
    fn test_start_updates_remove_dropped_fields_and_players() {
        let before = lobby();
        let mut after = before.clone();
        after.fields.remove("round");
        after.players.remove(&SlotKey::joiner(1));

        let updates = start_updates(&before, &after).unwrap();
        assert_eq!(paths(&updates), ["players.joiner1", "round", "status"]);
        assert_eq!(updates[0], FieldUpdate::remove(FieldPath::player(&SlotKey::joiner(1))));
        assert_eq!(updates[1], FieldUpdate::remove(FieldPath::field("round")));
    }

    #[test]
    fn test_start_updates_write_player_keys_not_records() {
        let before = lobby();
        let mut after = before.clone();
        let bob = after.players.get_mut(&SlotKey::joiner(1)).unwrap();
        bob.extra.insert("assignedCelebrity".into(), json!("Prince"));
        bob.extra.remove("celebrity");
        // An assignment that clears a ready flag must not un-ready anyone.
        after.players.get_mut(&SlotKey::creator()).unwrap().is_ready = false;

        let updates = start_updates(&before, &after).unwrap();
        assert_eq!(
            paths(&updates),
            [
                "players.joiner1.assignedCelebrity",
                "players.joiner1.celebrity",
                "status"
            ]
        );
        assert_eq!(updates[1].value(), None);
        assert!(!updates.iter().any(|u| u.path.segments().last().is_some_and(|s| s == "isReady")));
    }

    #[test]
    fn test_start_updates_add_new_players_whole() {
        let before = lobby();
        let mut after = before.clone();
        after.players.insert(
            SlotKey::joiner(5),
            Player::new("Extra", &SlotKey::joiner(5), Fields::new()),
        );

        let updates = start_updates(&before, &after).unwrap();
        assert_eq!(paths(&updates), ["players.joiner5", "status"]);
        assert_eq!(
            updates[0].value(),
            Some(&json!({"name": "Extra", "isReady": false}))
        );
    }

    #[test]
    fn test_allocated_slot_follows_counter() {
        assert_eq!(allocated_slot(1), SlotKey::creator());
        assert_eq!(allocated_slot(3), SlotKey::joiner(2));
    }
}
