//! `Lobby` builder and facade.
//!
//! This is the entry point game code talks to. It ties the session
//! manager and the change feed to one shared store.

use std::future::Future;
use std::sync::Arc;

use partyforge_protocol::{Fields, SessionCode, SessionSnapshot, SlotKey};
use partyforge_session::{
    Assignment, ChangeFeed, SessionConfig, SessionManager, SessionUpdate, Subscription,
};
use partyforge_store::{MemoryStore, SessionStore};
use tracing::info;

use crate::PartyforgeError;

/// Builder for configuring a [`Lobby`].
///
/// # Example
///
/// ```rust
/// use partyforge::prelude::*;
///
/// let lobby = Lobby::builder()
///     .code_digits(6)
///     .require_all_ready(true)
///     .build(MemoryStore::new());
/// assert_eq!(lobby.config().code_digits, 6);
/// ```
#[derive(Debug, Clone, Default)]
pub struct LobbyBuilder {
    config: SessionConfig,
}

impl LobbyBuilder {
    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the whole session configuration.
    pub fn config(mut self, config: SessionConfig) -> Self {
        self.config = config;
        self
    }

    pub fn code_digits(mut self, digits: u32) -> Self {
        self.config.code_digits = digits;
        self
    }

    pub fn max_code_attempts(mut self, attempts: u32) -> Self {
        self.config.max_code_attempts = attempts;
        self
    }

    pub fn allow_late_registration(mut self, allow: bool) -> Self {
        self.config.allow_late_registration = allow;
        self
    }

    pub fn require_all_ready(mut self, require: bool) -> Self {
        self.config.require_all_ready = require;
        self
    }

    /// Builds a lobby that owns `store`.
    pub fn build<S: SessionStore>(self, store: S) -> Lobby<S> {
        self.build_shared(Arc::new(store))
    }

    /// Builds a lobby over a store that is shared with other code.
    pub fn build_shared<S: SessionStore>(self, store: Arc<S>) -> Lobby<S> {
        let manager = SessionManager::new(Arc::clone(&store), self.config);
        let feed = ChangeFeed::new(store);
        info!(
            code_digits = manager.config().code_digits,
            late_registration = manager.config().allow_late_registration,
            require_all_ready = manager.config().require_all_ready,
            "lobby ready"
        );
        Lobby { manager, feed }
    }
}

/// The caller-facing session engine.
///
/// Every method is a thin wrapper over [`SessionManager`] or
/// [`ChangeFeed`] that converts errors into [`PartyforgeError`]. Lobbies
/// hold no session state, so several lobbies (or processes) over the
/// same store see the same sessions.
pub struct Lobby<S> {
    manager: SessionManager<S>,
    feed: ChangeFeed<S>,
}

impl Lobby<MemoryStore> {
    /// Creates a new builder. It can build a lobby over any store.
    pub fn builder() -> LobbyBuilder {
        LobbyBuilder::new()
    }

    /// A lobby over a fresh in-memory store with default settings.
    pub fn in_memory() -> Self {
        LobbyBuilder::new().build(MemoryStore::new())
    }
}

impl<S: SessionStore> Lobby<S> {
    pub fn config(&self) -> &SessionConfig {
        self.manager.config()
    }

    pub fn store(&self) -> &Arc<S> {
        self.manager.store()
    }

    pub fn manager(&self) -> &SessionManager<S> {
        &self.manager
    }

    pub fn feed(&self) -> &ChangeFeed<S> {
        &self.feed
    }

    /// Opens a new lobby and returns its join code.
    pub async fn create_session(
        &self,
        metadata: Fields,
        initial_fields: Fields,
    ) -> Result<SessionCode, PartyforgeError> {
        Ok(self.manager.create_session(metadata, initial_fields).await?)
    }

    /// Looks up a session by the code a player typed in.
    pub async fn join_session(&self, code: &SessionCode) -> Result<SessionSnapshot, PartyforgeError> {
        Ok(self.manager.join_session(code).await?)
    }

    /// Adds a player; the first one becomes the creator.
    pub async fn register_player(
        &self,
        code: &SessionCode,
        name: &str,
        extra: Fields,
    ) -> Result<SlotKey, PartyforgeError> {
        Ok(self.manager.register_player(code, name, extra).await?)
    }

    pub async fn mark_ready(&self, code: &SessionCode, slot: &SlotKey) -> Result<(), PartyforgeError> {
        Ok(self.manager.mark_ready(code, slot).await?)
    }

    /// Starts the game, running `assignment` over the lobby first.
    pub async fn start_session<A>(
        &self,
        code: &SessionCode,
        assignment: &A,
    ) -> Result<SessionSnapshot, PartyforgeError>
    where
        A: Assignment + ?Sized,
    {
        Ok(self.manager.start_session(code, assignment).await?)
    }

    pub async fn end_session(&self, code: &SessionCode) -> Result<SessionSnapshot, PartyforgeError> {
        Ok(self.manager.end_session(code).await?)
    }

    /// Ends the session and then runs `on_end` with its final state.
    pub async fn end_session_with<F, Fut, E>(
        &self,
        code: &SessionCode,
        on_end: F,
    ) -> Result<SessionSnapshot, PartyforgeError>
    where
        F: FnOnce(SessionSnapshot) -> Fut,
        Fut: Future<Output = Result<(), E>>,
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Ok(self.manager.end_session_with(code, on_end).await?)
    }

    /// Reads the current state without any status checks.
    pub async fn session(&self, code: &SessionCode) -> Result<SessionSnapshot, PartyforgeError> {
        Ok(self.manager.session(code).await?)
    }

    /// Pushes every change of `code` to `on_update` until unsubscribed.
    pub async fn subscribe<F>(
        &self,
        code: &SessionCode,
        on_update: F,
    ) -> Result<Subscription, PartyforgeError>
    where
        F: FnMut(SessionUpdate) + Send + 'static,
    {
        Ok(self.feed.subscribe(code, on_update).await?)
    }
}
