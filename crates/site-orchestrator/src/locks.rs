//! Per-site mutual exclusion
//!
//! At most one orchestration operation runs against a site at a time.
//! Operations on different sites never contend.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// Site-keyed async locks
#[derive(Default)]
pub struct SiteLocks {
    locks: Mutex<HashMap<u64, Arc<AsyncMutex<()>>>>,
}

/// Held for the duration of one operation on one site
pub struct SiteGuard {
    site_id: u64,
    _guard: OwnedMutexGuard<()>,
}

impl SiteGuard {
    pub fn site_id(&self) -> u64 {
        self.site_id
    }
}

impl SiteLocks {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock_for(&self, site_id: u64) -> Arc<AsyncMutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        locks.entry(site_id).or_default().clone()
    }

    /// Wait until no other operation holds `site_id`, then hold it.
    pub async fn acquire(&self, site_id: u64) -> SiteGuard {
        let guard = self.lock_for(site_id).lock_owned().await;
        SiteGuard {
            site_id,
            _guard: guard,
        }
    }

    /// Hold `site_id` only if it is free right now.
    pub fn try_acquire(&self, site_id: u64) -> Option<SiteGuard> {
        let guard = self.lock_for(site_id).try_lock_owned().ok()?;
        Some(SiteGuard {
            site_id,
            _guard: guard,
        })
    }

    /// Drop the lock entry of a site that no longer exists.
    pub fn forget(&self, site_id: u64) {
        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        locks.remove(&site_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_same_site_is_exclusive() {
        let locks = SiteLocks::new();
        let held = locks.acquire(1).await;

        assert!(locks.try_acquire(1).is_none());
        drop(held);
        assert!(locks.try_acquire(1).is_some());
    }

    #[tokio::test]
    async fn test_different_sites_do_not_contend() {
        let locks = SiteLocks::new();
        let _one = locks.acquire(1).await;

        let two = tokio::time::timeout(Duration::from_millis(100), locks.acquire(2)).await;
        assert_eq!(two.expect("site 2 should not wait on site 1").site_id(), 2);
    }

    #[tokio::test]
    async fn test_waiter_proceeds_after_release() {
        let locks = Arc::new(SiteLocks::new());
        let held = locks.acquire(7).await;

        let waiter = {
            let locks = locks.clone();
            tokio::spawn(async move { locks.acquire(7).await.site_id() })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        drop(held);
        assert_eq!(waiter.await.unwrap(), 7);
    }
}
