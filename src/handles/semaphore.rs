use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::future::join_all;
use parking_lot::Mutex;
use serde::Deserialize;
use serde::Serialize;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::info;
use tracing::warn;

use super::new_handle_id;
use super::HandleContext;
use super::LockGuard;
use super::PermitGuard;
use super::ReentrantLock;
use super::ReservationHandle;
use crate::constants::ANY_VERSION;
use crate::CoordinationError;
use crate::Error;
use crate::PathScheme;
use crate::ReservationKind;
use crate::ReservationManager;
use crate::Result;
use crate::StoreError;
use crate::WaitTimeout;
use crate::Watch;

/// Capacity of a semaphore entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermitPoolSize {
    /// Supplied by the caller that built the handle
    Constant(u32),
    /// Read from the semaphore entity node
    Configured(u32),
}

impl PermitPoolSize {
    pub fn size(&self) -> u32 {
        match self {
            PermitPoolSize::Constant(n) | PermitPoolSize::Configured(n) => *n,
        }
    }

    pub fn is_configured(&self) -> bool {
        matches!(self, PermitPoolSize::Configured(_))
    }
}

/// Payload of a configured semaphore's entity node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PermitPoolData {
    pub permit_pool_size: u32,
}

/// Writes the pool size of a configured semaphore, creating the entity
/// path if needed.
pub async fn write_permit_pool_size(
    manager: &ReservationManager,
    entity_path: &str,
    permit_pool_size: u32,
    acl: &[crate::Acl],
) -> Result<()> {
    if permit_pool_size == 0 {
        return Err(CoordinationError::InvalidPermits {
            entity_path: entity_path.to_string(),
            permits: permit_pool_size,
        }
        .into());
    }
    manager.ensure_path(entity_path, acl).await?;
    let data = serde_json::to_vec(&PermitPoolData { permit_pool_size })?;
    manager.store().set_data(entity_path, data, ANY_VERSION).await?;
    info!(entity_path, permit_pool_size, "configured semaphore");
    Ok(())
}

/// Reads the pool size of a configured semaphore; `None` if it was never
/// written.
pub async fn read_permit_pool_size(
    manager: &ReservationManager,
    entity_path: &str,
) -> Result<Option<u32>> {
    let data = match manager.store().get_data(entity_path, Watch::None).await {
        Ok((data, _)) => data,
        Err(StoreError::NoNode(_)) => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    if data.is_empty() {
        return Ok(None);
    }
    let parsed: PermitPoolData = serde_json::from_slice(&data)?;
    Ok(Some(parsed.permit_pool_size))
}

/// A distributed counting semaphore.
///
/// Each permit is one reservation node, so a handle holding `n` permits
/// occupies `n` places in the entity's queue.
pub struct DistributedSemaphore {
    id: String,
    ctx: HandleContext,
    entity_path: String,
    pool: PermitPoolSize,
    held: Mutex<Vec<String>>,
    destroyed: AtomicBool,
}

impl DistributedSemaphore {
    /// Builds a handle and registers it in the handle cache.
    ///
    /// The pool size is cached per entity path; when another handle already
    /// cached one, that size wins.
    pub fn new(
        ctx: HandleContext,
        entity_path: impl Into<String>,
        pool: PermitPoolSize,
    ) -> Result<Arc<Self>> {
        let entity_path = entity_path.into();
        if pool.size() == 0 {
            return Err(CoordinationError::InvalidPermits {
                entity_path,
                permits: 0,
            }
            .into());
        }
        let pool = ctx.cache.put_permit_pool_size_if_absent(&entity_path, pool);
        let semaphore = Arc::new(Self {
            id: new_handle_id(),
            ctx,
            entity_path,
            pool,
            held: Mutex::new(Vec::new()),
            destroyed: AtomicBool::new(false),
        });
        semaphore.ctx.register(&semaphore);
        Ok(semaphore)
    }

    /// Builds a handle whose pool size was written with
    /// [`write_permit_pool_size`]. The size is read once per entity path.
    ///
    /// # Errors
    /// [`CoordinationError::PermitPoolNotConfigured`] if no size was written.
    pub async fn configured(
        ctx: HandleContext,
        entity_path: impl Into<String>,
    ) -> Result<Arc<Self>> {
        let entity_path = entity_path.into();
        let pool = match ctx.cache.permit_pool_size(&entity_path) {
            Some(pool) => pool,
            None => match read_permit_pool_size(&ctx.manager, &entity_path).await? {
                Some(size) => PermitPoolSize::Configured(size),
                None => return Err(CoordinationError::PermitPoolNotConfigured(entity_path).into()),
            },
        };
        Self::new(ctx, entity_path, pool)
    }

    /// Waits for one permit using the configured default wait.
    pub async fn acquire(&self) -> Result<()> {
        self.acquire_permits(1).await
    }

    /// Waits for `permits` permits using the configured default wait.
    /// All or nothing.
    ///
    /// # Errors
    /// - [`CoordinationError::NotAcquired`] if the wait ends without them
    /// - [`CoordinationError::InvalidPermits`] if `permits` exceeds the pool
    pub async fn acquire_permits(
        &self,
        permits: usize,
    ) -> Result<()> {
        let wait = self.ctx.manager.default_wait_timeout();
        self.take_or_fail(permits, wait, false, &CancellationToken::new())
            .await
            .map(|_| ())
    }

    pub async fn acquire_permits_interruptibly(
        &self,
        permits: usize,
        interrupt: &CancellationToken,
    ) -> Result<()> {
        let wait = self.ctx.manager.default_wait_timeout();
        self.take_or_fail(permits, wait, true, interrupt)
            .await
            .map(|_| ())
    }

    /// One permit, one attempt.
    pub async fn try_acquire(&self) -> Result<bool> {
        Ok(self
            .take_permits(1, WaitTimeout::Millis(0), false, &CancellationToken::new())
            .await?
            .is_some())
    }

    /// Waits up to `wait` for `permits` permits; interruptible through
    /// `interrupt`. Permits taken before a failure are given back.
    pub async fn try_acquire_permits(
        &self,
        permits: usize,
        wait: Duration,
        interrupt: &CancellationToken,
    ) -> Result<bool> {
        Ok(self
            .take_permits(permits, WaitTimeout::from_duration(wait), true, interrupt)
            .await?
            .is_some())
    }

    /// Takes `permits` permits and returns a guard that gives back exactly
    /// those permits.
    pub async fn acquire_scoped(
        self: &Arc<Self>,
        permits: usize,
    ) -> Result<PermitGuard> {
        let wait = self.ctx.manager.default_wait_timeout();
        let paths = self
            .take_or_fail(permits, wait, false, &CancellationToken::new())
            .await?;
        Ok(PermitGuard::new(self.clone(), paths))
    }

    /// Gives back up to `permits` permits, oldest first. Returns how many
    /// were released.
    pub async fn release(
        &self,
        permits: usize,
    ) -> usize {
        let paths: Vec<String> = {
            let mut held = self.held.lock();
            let n = permits.min(held.len());
            held.drain(..n).collect()
        };
        self.relinquish_paths(&paths).await
    }

    pub(crate) async fn release_paths(
        &self,
        paths: &[String],
    ) -> usize {
        let owned: Vec<String> = {
            let mut held = self.held.lock();
            let before = held.clone();
            held.retain(|p| !paths.contains(p));
            before.into_iter().filter(|p| paths.contains(p)).collect()
        };
        self.relinquish_paths(&owned).await
    }

    pub fn acquired_permits(&self) -> usize {
        self.held.lock().len()
    }

    /// Pool size minus the live queue length (holders and waiters of every
    /// process), floored at zero.
    pub async fn available_permits(&self) -> Result<usize> {
        let in_use = self.ctx.manager.reservation_count(&self.entity_path).await?;
        Ok((self.pool.size() as usize).saturating_sub(in_use))
    }

    pub fn permit_pool_size(&self) -> PermitPoolSize {
        self.pool
    }

    pub fn owner_id(&self) -> &str {
        &self.ctx.owner_id
    }

    /// Releases every permit, removes the handle from the cache and drops
    /// the cached pool size of the entity. Idempotent.
    pub async fn destroy(&self) {
        if self.destroyed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.release_all().await;
        self.ctx.cache.remove(self);
        self.ctx.cache.remove_permit_pool_size(&self.entity_path);
        debug!(entity_path = %self.entity_path, "semaphore destroyed");
    }

    async fn take_or_fail(
        &self,
        permits: usize,
        wait: WaitTimeout,
        interruptible: bool,
        interrupt: &CancellationToken,
    ) -> Result<Vec<String>> {
        self.take_permits(permits, wait, interruptible, interrupt)
            .await?
            .ok_or_else(|| {
                Error::from(CoordinationError::NotAcquired {
                    entity_path: self.entity_path.clone(),
                    kind: ReservationKind::Semaphore,
                })
            })
    }

    /// All-or-nothing acquisition of `permits` permits.
    ///
    /// Takers of more than one permit first hold the entity's gate lock, so
    /// at most one handle at a time holds part of its permits while
    /// waiting for the rest.
    async fn take_permits(
        &self,
        permits: usize,
        wait: WaitTimeout,
        interruptible: bool,
        interrupt: &CancellationToken,
    ) -> Result<Option<Vec<String>>> {
        if self.destroyed.load(Ordering::SeqCst) {
            return Err(CoordinationError::HandleDestroyed {
                entity_path: self.entity_path.clone(),
            }
            .into());
        }
        let total = self.pool.size();
        if permits == 0 || permits > total as usize {
            return Err(CoordinationError::InvalidPermits {
                entity_path: self.entity_path.clone(),
                permits: u32::try_from(permits).unwrap_or(u32::MAX),
            }
            .into());
        }

        let start = Instant::now();
        let gate = if permits > 1 {
            match self.enter_gate(wait, interruptible, interrupt).await? {
                Some(gate) => Some(gate),
                None => return Ok(None),
            }
        } else {
            None
        };

        let taken = self
            .take_each(permits, total, wait, start, interruptible, interrupt)
            .await;
        if let Some(gate) = gate {
            if let Err(e) = gate.release().await {
                warn!(entity_path = %self.entity_path, "could not leave multi-permit gate: {}", e);
            }
        }
        taken
    }

    async fn enter_gate(
        &self,
        wait: WaitTimeout,
        interruptible: bool,
        interrupt: &CancellationToken,
    ) -> Result<Option<LockGuard>> {
        let gate = ReentrantLock::new(
            self.ctx.clone(),
            PathScheme::multi_permit_gate(&self.entity_path),
            ReservationKind::Exclusive,
        )?;
        if gate.acquire(wait, interruptible, interrupt).await? {
            Ok(Some(LockGuard::new(gate)))
        } else {
            debug!(entity_path = %self.entity_path, "multi-permit gate not acquired");
            Ok(None)
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn take_each(
        &self,
        permits: usize,
        total: u32,
        wait: WaitTimeout,
        start: Instant,
        interruptible: bool,
        interrupt: &CancellationToken,
    ) -> Result<Option<Vec<String>>> {
        let mut taken = Vec::with_capacity(permits);
        for _ in 0..permits {
            let remaining = match wait.remaining(start.elapsed()) {
                Some(d) => WaitTimeout::from_duration(d),
                None => WaitTimeout::Forever,
            };
            let result = self
                .ctx
                .manager
                .acquire_for_semaphore(
                    &self.ctx.owner_id,
                    &self.entity_path,
                    ReservationKind::Semaphore,
                    total,
                    &self.ctx.acl,
                    remaining,
                    interruptible,
                    interrupt,
                )
                .await;

            match result {
                Ok(Some(path)) => {
                    // Tracked immediately so a dropped future still leaves
                    // the permit releasable
                    self.held.lock().push(path.clone());
                    taken.push(path);
                }
                Ok(None) => {
                    self.release_paths(&taken).await;
                    return Ok(None);
                }
                Err(e) => {
                    self.release_paths(&taken).await;
                    return Err(e);
                }
            }
        }
        debug!(entity_path = %self.entity_path, permits, "acquired permits");
        Ok(Some(taken))
    }

    async fn relinquish_paths(
        &self,
        paths: &[String],
    ) -> usize {
        let results = join_all(paths.iter().map(|path| self.ctx.manager.relinquish(path))).await;
        for (path, ok) in paths.iter().zip(&results) {
            if !ok {
                warn!(%path, "could not relinquish permit");
            }
        }
        results.into_iter().filter(|ok| *ok).count()
    }
}

#[async_trait]
impl ReservationHandle for DistributedSemaphore {
    fn handle_id(&self) -> &str {
        &self.id
    }

    fn entity_path(&self) -> &str {
        &self.entity_path
    }

    fn kind(&self) -> ReservationKind {
        ReservationKind::Semaphore
    }

    fn held_paths(&self) -> Vec<String> {
        self.held.lock().clone()
    }

    async fn release_all(&self) -> usize {
        self.release(usize::MAX).await
    }

    fn mark_revoked(
        &self,
        reservation_path: &str,
    ) -> bool {
        let mut held = self.held.lock();
        let before = held.len();
        held.retain(|p| p != reservation_path);
        let revoked = held.len() < before;
        if revoked {
            warn!(
                entity_path = %self.entity_path,
                path = reservation_path,
                "held permit was deleted externally"
            );
        }
        revoked
    }
}
