//! Scoped acquisitions.
//!
//! Prefer the explicit `release` methods: they run on the caller's task and
//! report errors. Dropping an unreleased guard spawns the release onto the
//! current runtime, which is best effort only.

use std::sync::Arc;

use tracing::warn;

use super::DistributedSemaphore;
use super::ReentrantLock;
use crate::Result;

/// One hold of a [`ReentrantLock`].
pub struct LockGuard {
    lock: Arc<ReentrantLock>,
    released: bool,
}

impl LockGuard {
    pub(crate) fn new(lock: Arc<ReentrantLock>) -> Self {
        Self {
            lock,
            released: false,
        }
    }

    pub fn lock(&self) -> &Arc<ReentrantLock> {
        &self.lock
    }

    pub async fn release(mut self) -> Result<()> {
        self.released = true;
        self.lock.unlock().await
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!(path = ?self.lock.lock_id(), "lock guard dropped outside a runtime");
            return;
        };
        let lock = self.lock.clone();
        runtime.spawn(async move {
            if let Err(e) = lock.unlock().await {
                warn!("lock guard release failed: {}", e);
            }
        });
    }
}

/// Permits taken from a [`DistributedSemaphore`] by one scoped acquisition.
pub struct PermitGuard {
    semaphore: Arc<DistributedSemaphore>,
    paths: Vec<String>,
}

impl PermitGuard {
    pub(crate) fn new(
        semaphore: Arc<DistributedSemaphore>,
        paths: Vec<String>,
    ) -> Self {
        Self { semaphore, paths }
    }

    pub fn permits(&self) -> usize {
        self.paths.len()
    }

    pub fn semaphore(&self) -> &Arc<DistributedSemaphore> {
        &self.semaphore
    }

    /// Returns the number of permits released.
    pub async fn release(mut self) -> usize {
        let paths = std::mem::take(&mut self.paths);
        self.semaphore.release_paths(&paths).await
    }
}

impl Drop for PermitGuard {
    fn drop(&mut self) {
        if self.paths.is_empty() {
            return;
        }
        let paths = std::mem::take(&mut self.paths);
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!(permits = paths.len(), "permit guard dropped outside a runtime");
            return;
        };
        let semaphore = self.semaphore.clone();
        runtime.spawn(async move {
            semaphore.release_paths(&paths).await;
        });
    }
}
