use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::trace;
use tracing::warn;

use super::new_handle_id;
use super::HandleContext;
use super::LockGuard;
use super::ReservationHandle;
use crate::CoordinationError;
use crate::ReservationKind;
use crate::Result;
use crate::WaitTimeout;

/// Hold count and acquired path move together, so no caller ever sees a
/// positive count without a path or the reverse.
#[derive(Debug, Clone, PartialEq, Eq)]
enum LockState {
    Idle,
    /// One caller is inside the reservation manager; others wait for it
    Acquiring,
    Held { path: String, count: usize },
}

/// A distributed exclusive or shared lock that may be re-entered through
/// the same handle.
///
/// Only the first `lock` contacts the store and only the matching last
/// `unlock` relinquishes; nested calls adjust a local hold count. The count
/// belongs to the handle, not to a task: every task sharing the handle
/// shares the hold.
pub struct ReentrantLock {
    id: String,
    ctx: HandleContext,
    entity_path: String,
    kind: ReservationKind,
    state: Mutex<LockState>,
    changed: Notify,
    destroyed: AtomicBool,
}

/// Resets an in-flight acquisition if its future is dropped.
struct AcquiringReset<'a> {
    lock: &'a ReentrantLock,
    armed: bool,
}

impl Drop for AcquiringReset<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.lock.set_state(LockState::Idle);
        }
    }
}

impl ReentrantLock {
    /// Builds a handle for `entity_path` and registers it in the handle
    /// cache.
    ///
    /// # Errors
    /// [`CoordinationError::WrongReservationKind`] for
    /// [`ReservationKind::Semaphore`].
    pub fn new(
        ctx: HandleContext,
        entity_path: impl Into<String>,
        kind: ReservationKind,
    ) -> Result<Arc<Self>> {
        if kind == ReservationKind::Semaphore {
            return Err(CoordinationError::WrongReservationKind {
                expected: ReservationKind::Exclusive,
                actual: kind,
            }
            .into());
        }
        let lock = Arc::new(Self {
            id: new_handle_id(),
            ctx,
            entity_path: entity_path.into(),
            kind,
            state: Mutex::new(LockState::Idle),
            changed: Notify::new(),
            destroyed: AtomicBool::new(false),
        });
        lock.ctx.register(&lock);
        Ok(lock)
    }

    /// Waits for the lock using the configured default wait.
    ///
    /// # Errors
    /// [`CoordinationError::NotAcquired`] if the wait ends without the lock
    /// (default wait elapsed, client shut down, store failure).
    pub async fn lock(&self) -> Result<()> {
        let wait = self.ctx.manager.default_wait_timeout();
        self.lock_with(wait, false, &CancellationToken::new()).await
    }

    /// Like [`lock`](Self::lock), but a cancelled `interrupt` ends the wait
    /// with [`CoordinationError::Interrupted`].
    pub async fn lock_interruptibly(
        &self,
        interrupt: &CancellationToken,
    ) -> Result<()> {
        let wait = self.ctx.manager.default_wait_timeout();
        self.lock_with(wait, true, interrupt).await
    }

    /// One attempt, no waiting. A failed attempt leaves no reservation
    /// behind.
    pub async fn try_lock(&self) -> Result<bool> {
        self.acquire(WaitTimeout::Millis(0), false, &CancellationToken::new())
            .await
    }

    /// Waits up to `wait`; interruptible through `interrupt`.
    pub async fn try_lock_for(
        &self,
        wait: Duration,
        interrupt: &CancellationToken,
    ) -> Result<bool> {
        self.acquire(WaitTimeout::from_duration(wait), true, interrupt)
            .await
    }

    /// Locks and returns a guard that unlocks on [`LockGuard::release`] or,
    /// best effort, when dropped.
    pub async fn lock_scoped(self: &Arc<Self>) -> Result<LockGuard> {
        self.lock().await?;
        Ok(LockGuard::new(self.clone()))
    }

    /// Drops one hold. The last hold relinquishes the reservation node.
    ///
    /// # Errors
    /// [`CoordinationError::NotHeld`] if the handle holds nothing.
    pub async fn unlock(&self) -> Result<()> {
        let released = {
            let mut state = self.state.lock();
            match std::mem::replace(&mut *state, LockState::Idle) {
                LockState::Held { path, count } if count > 1 => {
                    *state = LockState::Held {
                        path,
                        count: count - 1,
                    };
                    None
                }
                LockState::Held { path, .. } => Some(path),
                other => {
                    *state = other;
                    return Err(CoordinationError::NotHeld {
                        entity_path: self.entity_path.clone(),
                    }
                    .into());
                }
            }
        };

        if let Some(path) = released {
            self.changed.notify_waiters();
            if !self.ctx.manager.relinquish(&path).await {
                warn!(%path, "unlock could not relinquish reservation");
            }
            debug!(entity_path = %self.entity_path, kind = %self.kind, "unlocked");
        }
        Ok(())
    }

    pub fn hold_count(&self) -> usize {
        match &*self.state.lock() {
            LockState::Held { count, .. } => *count,
            _ => 0,
        }
    }

    pub fn is_held(&self) -> bool {
        self.hold_count() > 0
    }

    /// Path of the held reservation node.
    pub fn lock_id(&self) -> Option<String> {
        match &*self.state.lock() {
            LockState::Held { path, .. } => Some(path.clone()),
            _ => None,
        }
    }

    pub fn owner_id(&self) -> &str {
        &self.ctx.owner_id
    }

    /// Relinquishes regardless of the hold count and removes the handle
    /// from the cache. Later acquisitions fail with
    /// [`CoordinationError::HandleDestroyed`]. Idempotent.
    pub async fn destroy(&self) {
        if self.destroyed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.release_all().await;
        self.ctx.cache.remove(self);
        debug!(entity_path = %self.entity_path, kind = %self.kind, "lock destroyed");
    }

    async fn lock_with(
        &self,
        wait: WaitTimeout,
        interruptible: bool,
        interrupt: &CancellationToken,
    ) -> Result<()> {
        if self.acquire(wait, interruptible, interrupt).await? {
            Ok(())
        } else {
            Err(CoordinationError::NotAcquired {
                entity_path: self.entity_path.clone(),
                kind: self.kind,
            }
            .into())
        }
    }

    pub(crate) async fn acquire(
        &self,
        wait: WaitTimeout,
        interruptible: bool,
        interrupt: &CancellationToken,
    ) -> Result<bool> {
        self.check_live()?;
        let start = Instant::now();

        loop {
            let notified = self.changed.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let mut state = self.state.lock();
                if let LockState::Held { count, .. } = &mut *state {
                    *count += 1;
                    trace!(entity_path = %self.entity_path, count = *count, "re-entered");
                    return Ok(true);
                }
                if *state == LockState::Idle {
                    *state = LockState::Acquiring;
                    break;
                }
            }

            // Another caller sharing this handle is acquiring
            let pause = match wait.remaining(start.elapsed()) {
                Some(d) if d.is_zero() => return Ok(false),
                Some(d) => d,
                None => self.ctx.manager.poll_ceiling(),
            };
            tokio::select! {
                _ = &mut notified => {}
                _ = tokio::time::sleep(pause) => {}
                _ = interrupt.cancelled(), if interruptible => {
                    return Err(CoordinationError::Interrupted {
                        owner_id: self.ctx.owner_id.clone(),
                        entity_path: self.entity_path.clone(),
                    }
                    .into());
                }
            }
        }

        let mut reset = AcquiringReset {
            lock: self,
            armed: true,
        };
        let remaining = match wait.remaining(start.elapsed()) {
            Some(d) => WaitTimeout::from_duration(d),
            None => WaitTimeout::Forever,
        };
        let result = self
            .ctx
            .manager
            .acquire(
                &self.ctx.owner_id,
                &self.entity_path,
                self.kind,
                &self.ctx.acl,
                remaining,
                interruptible,
                interrupt,
            )
            .await;
        reset.armed = false;

        match result {
            Ok(Some(path)) if self.destroyed.load(Ordering::SeqCst) => {
                self.set_state(LockState::Idle);
                self.ctx.manager.relinquish(&path).await;
                Err(CoordinationError::HandleDestroyed {
                    entity_path: self.entity_path.clone(),
                }
                .into())
            }
            Ok(Some(path)) => {
                self.set_state(LockState::Held { path, count: 1 });
                Ok(true)
            }
            Ok(None) => {
                self.set_state(LockState::Idle);
                Ok(false)
            }
            Err(e) => {
                self.set_state(LockState::Idle);
                Err(e)
            }
        }
    }

    fn set_state(
        &self,
        next: LockState,
    ) {
        *self.state.lock() = next;
        self.changed.notify_waiters();
    }

    fn check_live(&self) -> Result<()> {
        if self.destroyed.load(Ordering::SeqCst) {
            return Err(CoordinationError::HandleDestroyed {
                entity_path: self.entity_path.clone(),
            }
            .into());
        }
        Ok(())
    }
}

#[async_trait]
impl ReservationHandle for ReentrantLock {
    fn handle_id(&self) -> &str {
        &self.id
    }

    fn entity_path(&self) -> &str {
        &self.entity_path
    }

    fn kind(&self) -> ReservationKind {
        self.kind
    }

    fn held_paths(&self) -> Vec<String> {
        self.lock_id().into_iter().collect()
    }

    async fn release_all(&self) -> usize {
        let path = {
            let mut state = self.state.lock();
            match std::mem::replace(&mut *state, LockState::Idle) {
                LockState::Held { path, .. } => Some(path),
                other => {
                    *state = other;
                    None
                }
            }
        };
        let Some(path) = path else {
            return 0;
        };
        self.changed.notify_waiters();
        if !self.ctx.manager.relinquish(&path).await {
            warn!(%path, "could not relinquish reservation during release");
        }
        1
    }

    fn mark_revoked(
        &self,
        reservation_path: &str,
    ) -> bool {
        let revoked = {
            let mut state = self.state.lock();
            let holds = matches!(&*state, LockState::Held { path, .. } if path == reservation_path);
            if holds {
                *state = LockState::Idle;
            }
            holds
        };
        if revoked {
            warn!(
                entity_path = %self.entity_path,
                path = reservation_path,
                "held reservation was deleted externally"
            );
            self.changed.notify_waiters();
        }
        revoked
    }
}
