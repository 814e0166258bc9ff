//! In-process store implementations.

use super::{TurnStore, UserStore};
use crate::error::{Result, TalkieError};
use crate::models::{Turn, User, UserId};
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

/// User aggregates kept in a map.
#[derive(Debug, Default)]
pub struct MemoryUserStore {
    users: RwLock<HashMap<UserId, User>>,
}

impl MemoryUserStore {
    pub fn with_users(users: impl IntoIterator<Item = User>) -> Self {
        Self {
            users: RwLock::new(users.into_iter().map(|u| (u.id, u)).collect()),
        }
    }

    /// All users ordered by id.
    pub async fn users(&self) -> Vec<User> {
        let users = self.users.read().await;
        let mut all: Vec<User> = users.values().cloned().collect();
        all.sort_by_key(|u| u.id);
        all
    }
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn find_user(&self, id: UserId) -> Result<User> {
        self.users
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or_else(|| TalkieError::not_found("user", id))
    }

    async fn save_user(&self, user: &User) -> Result<()> {
        self.users.write().await.insert(user.id, user.clone());
        Ok(())
    }
}

/// Turn buffers kept in a map, one `Vec` per user.
#[derive(Debug, Default)]
pub struct MemoryTurnStore {
    buffers: RwLock<HashMap<UserId, Vec<Turn>>>,
}

impl MemoryTurnStore {
    pub fn with_buffers(buffers: HashMap<UserId, Vec<Turn>>) -> Self {
        Self {
            buffers: RwLock::new(buffers),
        }
    }

    /// Non-empty buffers, for persisting between runs.
    pub async fn buffers(&self) -> HashMap<UserId, Vec<Turn>> {
        self.buffers
            .read()
            .await
            .iter()
            .filter(|(_, turns)| !turns.is_empty())
            .map(|(id, turns)| (*id, turns.clone()))
            .collect()
    }

    /// Number of turns currently buffered for a user.
    pub async fn len(&self, user_id: UserId) -> usize {
        self.buffers
            .read()
            .await
            .get(&user_id)
            .map_or(0, Vec::len)
    }
}

#[async_trait]
impl TurnStore for MemoryTurnStore {
    async fn append(&self, user_id: UserId, turn: Turn) -> Result<()> {
        self.buffers
            .write()
            .await
            .entry(user_id)
            .or_default()
            .push(turn);
        Ok(())
    }

    async fn drain_all(&self, user_id: UserId) -> Result<Vec<Turn>> {
        Ok(self
            .buffers
            .read()
            .await
            .get(&user_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn clear(&self, user_id: UserId) -> Result<()> {
        self.buffers.write().await.remove(&user_id);
        Ok(())
    }
}
