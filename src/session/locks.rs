//! Per-user serialization.
//!
//! Every read-modify-write of a user's aggregate or turn buffer holds that
//! user's guard. Different users never contend.

use crate::models::UserId;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Registry of one async mutex per user id. Cheap to clone; clones share locks.
#[derive(Debug, Clone, Default)]
pub struct UserLocks {
    inner: Arc<Mutex<HashMap<UserId, Arc<Mutex<()>>>>>,
}

impl UserLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits for and holds the user's lock until the guard is dropped.
    pub async fn lock(&self, user_id: UserId) -> OwnedMutexGuard<()> {
        let user_lock = {
            let mut locks = self.inner.lock().await;
            locks.entry(user_id).or_default().clone()
        };
        user_lock.lock_owned().await
    }
}
