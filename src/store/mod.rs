//! Storage seams.
//!
//! The engine talks to two collaborators: a durable [`UserStore`] holding
//! the user aggregate, and an ephemeral [`TurnStore`] buffering turns per
//! user until a session is finalized.

pub mod memory;
pub mod snapshot;

pub use memory::{MemoryTurnStore, MemoryUserStore};
pub use snapshot::Snapshot;

use crate::error::Result;
use crate::models::{Turn, User, UserId};
use async_trait::async_trait;

/// Durable store for user aggregates.
///
/// `save` replaces the whole aggregate, so every mutation made between a
/// `find_user` and the following `save` lands together.
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Returns `NotFound` when the user does not exist.
    async fn find_user(&self, id: UserId) -> Result<User>;

    async fn save_user(&self, user: &User) -> Result<()>;
}

/// Ephemeral per-user turn buffer.
#[async_trait]
pub trait TurnStore: Send + Sync {
    /// Appends to the end of the user's buffer. No validation.
    async fn append(&self, user_id: UserId, turn: Turn) -> Result<()>;

    /// All buffered turns in insertion order. Does not clear.
    async fn drain_all(&self, user_id: UserId) -> Result<Vec<Turn>>;

    async fn clear(&self, user_id: UserId) -> Result<()>;
}
