//! JSON snapshot of the in-process stores.
//!
//! The CLI runs one command per process, so state between invocations is
//! loaded from and written back to a single JSON file.

use super::{MemoryTurnStore, MemoryUserStore};
use crate::models::{Turn, User, UserId};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use tracing::debug;

/// Everything the stores hold, in serializable form.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Snapshot {
    #[serde(default)]
    pub users: Vec<User>,
    #[serde(default)]
    pub turns: HashMap<UserId, Vec<Turn>>,
}

impl Snapshot {
    /// Load a snapshot, or an empty one when the file does not exist.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!("No state file at {}, starting empty", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read state file: {}", path.display()))?;

        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse state file: {}", path.display()))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let content =
            serde_json::to_string_pretty(self).context("Failed to serialize state snapshot")?;

        std::fs::write(path, content)
            .with_context(|| format!("Failed to write state file: {}", path.display()))
    }

    pub fn into_stores(self) -> (MemoryUserStore, MemoryTurnStore) {
        (
            MemoryUserStore::with_users(self.users),
            MemoryTurnStore::with_buffers(self.turns),
        )
    }

    pub async fn capture(users: &MemoryUserStore, turns: &MemoryTurnStore) -> Self {
        Self {
            users: users.users().await,
            turns: turns.buffers().await,
        }
    }
}
