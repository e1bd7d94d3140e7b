//! # Partyforge
//!
//! Lobby and session engine for multiplayer party games.
//!
//! A host creates a session and shares its short numeric code; players
//! join with the code, register under a name, and mark themselves ready;
//! the host starts the game, optionally reshaping the session on the way
//! (dealing roles, swapping secrets); eventually someone ends it. All of
//! that state lives in a [`SessionStore`](partyforge_store::SessionStore),
//! and every client can watch it change through a subscription.
//!
//! ## Quick Start
//!
//! ```rust
//! use partyforge::prelude::*;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), PartyforgeError> {
//! let lobby = Lobby::in_memory();
//! let code = lobby.create_session(Fields::new(), Fields::new()).await?;
//!
//! let host = lobby.register_player(&code, "Alice", Fields::new()).await?;
//! let guest = lobby.register_player(&code, "Bob", Fields::new()).await?;
//! assert!(host.is_creator());
//!
//! lobby.mark_ready(&code, &guest).await?;
//! let started = lobby.start_session(&code, &Identity).await?;
//! assert_eq!(started.status(), SessionStatus::InProgress);
//! # Ok(())
//! # }
//! ```

mod error;
mod lobby;

pub use error::PartyforgeError;
pub use lobby::{Lobby, LobbyBuilder};

pub use partyforge_protocol as protocol;
pub use partyforge_session as session;
pub use partyforge_shuffle as shuffle;
pub use partyforge_store as store;

pub mod prelude {
    pub use crate::{Lobby, LobbyBuilder, PartyforgeError};
    pub use partyforge_protocol::{
        Fields, Player, SessionCode, SessionDocument, SessionSnapshot, SessionStatus, SlotKey,
    };
    pub use partyforge_session::{
        Assignment, Identity, SecretSwap, SessionConfig, SessionError, SessionUpdate,
        Subscription,
    };
    pub use partyforge_shuffle::{ShuffleError, Shuffler};
    pub use partyforge_store::{MemoryStore, SessionStore, StoreError};
}
