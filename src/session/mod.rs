//! Conversation session lifecycle.
//!
//! Question tracking, per-user locking, finalization of buffered turns,
//! and read-side history queries.

pub mod finalizer;
pub mod history;
pub mod locks;
pub mod tracker;

pub use finalizer::{FinalizeOutcome, NoOpReason, SessionFinalizer};
pub use history::ConversationHistory;
pub use locks::UserLocks;
pub use tracker::QuestionService;
