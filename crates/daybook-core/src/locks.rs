use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use uuid::Uuid;

/// One async lock per user, created on demand and dropped once nobody holds
/// or waits on it.
#[derive(Default)]
pub struct UserLocks {
    inner: Mutex<HashMap<Uuid, Arc<AsyncMutex<()>>>>,
}

pub struct UserLockGuard<'a> {
    locks: &'a UserLocks,
    owner: Uuid,
    guard: Option<OwnedMutexGuard<()>>,
}

impl UserLocks {
    pub async fn lock(&self, owner: Uuid) -> UserLockGuard<'_> {
        let mutex = {
            let mut map = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
            map.entry(owner).or_default().clone()
        };
        let guard = mutex.lock_owned().await;

        UserLockGuard {
            locks: self,
            owner,
            guard: Some(guard),
        }
    }

    /// Number of users with a run in flight or queued.
    #[cfg(test)]
    fn active(&self) -> usize {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

impl Drop for UserLockGuard<'_> {
    fn drop(&mut self) {
        // Release the user's lock before deciding whether the entry is idle.
        self.guard.take();

        let mut map = self.locks.inner.lock().unwrap_or_else(PoisonError::into_inner);
        let idle = map
            .get(&self.owner)
            .is_some_and(|m| Arc::strong_count(m) == 1);
        if idle {
            map.remove(&self.owner);
        }
    }
}
