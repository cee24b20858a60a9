//! Per-target publication locks
//!
//! An in-process mutex keyed by `(repository, target)`, held only for
//! the atomic artifact swap. Two targets of the same repository can
//! publish concurrently; two builds of one target cannot. The
//! single-process deployment assumption is part of the contract.

use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};

use tokio::sync::{Mutex, OwnedMutexGuard};

/// Shared registry of per-target publication mutexes
#[derive(Clone, Default)]
pub struct PublishLocks {
    inner: Arc<StdMutex<HashMap<(i64, i64), Arc<Mutex<()>>>>>,
}

impl PublishLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Await the publication lock for one target
    pub async fn acquire(&self, repository_id: i64, target_id: i64) -> OwnedMutexGuard<()> {
        let lock = {
            let mut map = self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            Arc::clone(
                map.entry((repository_id, target_id)).or_insert_with(|| Arc::new(Mutex::new(()))),
            )
        };
        lock.lock_owned().await
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn same_target_is_mutually_exclusive() {
        let locks = PublishLocks::new();
        let guard = locks.acquire(1, 1).await;

        let locks2 = locks.clone();
        let contended =
            tokio::time::timeout(Duration::from_millis(50), locks2.acquire(1, 1)).await;
        assert!(contended.is_err());

        drop(guard);
        tokio::time::timeout(Duration::from_millis(50), locks.acquire(1, 1))
            .await
            .expect("lock should be free after release");
    }

    #[tokio::test]
    async fn different_targets_do_not_contend() {
        let locks = PublishLocks::new();
        let _a = locks.acquire(1, 1).await;
        tokio::time::timeout(Duration::from_millis(50), locks.acquire(1, 2))
            .await
            .expect("other target must not block");
    }
}
