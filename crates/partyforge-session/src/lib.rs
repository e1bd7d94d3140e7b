//! Session lifecycle for Partyforge.
//!
//! This crate is the engine that sits between game code and the store:
//!
//! 1. **Codes**: short numeric join codes ([`CodeGenerator`])
//! 2. **Lifecycle**: create, join, register, ready, start, end
//!    ([`SessionManager`])
//! 3. **Assignment**: game-specific reshaping of the session when it
//!    starts ([`Assignment`], [`SecretSwap`])
//! 4. **Change feed**: live snapshots pushed to subscribers
//!    ([`ChangeFeed`])
//!
//! # How it fits in the stack
//!
//! ```text
//! Lobby facade (above)  ← one handle for game code
//!     ↕
//! Session layer (this crate)  ← state machine, slot allocation, feeds
//!     ↕
//! Store layer (below)  ← durable documents, atomic counters, watches
//! ```
//!
//! The engine holds no per-session state in memory. Every operation reads
//! and writes through the store, so any number of managers pointed at the
//! same store agree on what a session looks like.

mod assignment;
mod code;
mod config;
mod error;
mod feed;
mod manager;

pub use assignment::{Assignment, Identity, SecretSwap};
pub use code::CodeGenerator;
pub use config::SessionConfig;
pub use error::SessionError;
pub use feed::{ChangeFeed, SessionUpdate, Subscription, SubscriptionId};
pub use manager::SessionManager;
