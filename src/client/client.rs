//! Coordination client
//!
//! [`CoordClient`] ties one store session to one [`ReservationManager`], one
//! [`HandleCache`] and the background event router, and hands out lock and
//! semaphore handles named relative to its [`PathScheme`].

use std::sync::Arc;

use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::info;

use super::CoordClientBuilder;
use super::ReservationEvent;
use crate::write_permit_pool_size;
use crate::CoordConfig;
use crate::CoordinationStore;
use crate::DistributedSemaphore;
use crate::HandleCache;
use crate::HandleContext;
use crate::PathScheme;
use crate::PermitPoolSize;
use crate::ReadWriteLock;
use crate::ReentrantLock;
use crate::ReservationKind;
use crate::ReservationManager;
use crate::Result;

/// Main entry point for distributed locks and semaphores
///
/// Cheap to clone; clones share the session, the handle cache and the
/// event stream. Created through [`builder()`](CoordClient::builder).
#[derive(Clone)]
pub struct CoordClient {
    pub(super) ctx: HandleContext,
    pub(super) scheme: PathScheme,
    pub(super) config: Arc<CoordConfig>,
    pub(super) events: broadcast::Sender<ReservationEvent>,
    pub(super) router_shutdown: CancellationToken,
}

impl CoordClient {
    /// Create a configured client builder over an open store session
    pub fn builder(store: Arc<dyn CoordinationStore>) -> CoordClientBuilder {
        CoordClientBuilder::new(store)
    }

    /// Owner id written into every reservation this client creates
    pub fn owner_id(&self) -> &str {
        &self.ctx.owner_id
    }

    pub fn config(&self) -> &CoordConfig {
        &self.config
    }

    pub fn path_scheme(&self) -> &PathScheme {
        &self.scheme
    }

    pub fn manager(&self) -> &Arc<ReservationManager> {
        &self.ctx.manager
    }

    pub fn cache(&self) -> &Arc<HandleCache> {
        &self.ctx.cache
    }

    /// Reentrant exclusive lock on entity `name`
    pub fn exclusive_lock(
        &self,
        name: &str,
    ) -> Result<Arc<ReentrantLock>> {
        self.lock(name, ReservationKind::Exclusive)
    }

    /// Reentrant shared lock on entity `name`. Shares its queue with
    /// [`exclusive_lock`](Self::exclusive_lock) of the same name.
    pub fn shared_lock(
        &self,
        name: &str,
    ) -> Result<Arc<ReentrantLock>> {
        self.lock(name, ReservationKind::Shared)
    }

    pub fn read_write_lock(
        &self,
        name: &str,
    ) -> Result<ReadWriteLock> {
        let entity_path = self.scheme.entity_path(ReservationKind::Exclusive, name)?;
        ReadWriteLock::new(self.ctx.clone(), entity_path)
    }

    /// Counting semaphore on entity `name` with a caller-supplied pool size.
    ///
    /// Every process must agree on `permits` for the entity; use
    /// [`configure_semaphore`](Self::configure_semaphore) to store it once
    /// instead.
    pub fn semaphore(
        &self,
        name: &str,
        permits: u32,
    ) -> Result<Arc<DistributedSemaphore>> {
        let entity_path = self.scheme.entity_path(ReservationKind::Semaphore, name)?;
        DistributedSemaphore::new(self.ctx.clone(), entity_path, PermitPoolSize::Constant(permits))
    }

    /// Counting semaphore on entity `name` whose pool size was stored with
    /// [`configure_semaphore`](Self::configure_semaphore).
    pub async fn configured_semaphore(
        &self,
        name: &str,
    ) -> Result<Arc<DistributedSemaphore>> {
        let entity_path = self.scheme.entity_path(ReservationKind::Semaphore, name)?;
        DistributedSemaphore::configured(self.ctx.clone(), entity_path).await
    }

    /// Stores the pool size of semaphore entity `name`.
    ///
    /// Handles already built keep the size they were built with; the local
    /// cached size is dropped so later handles read the new one.
    pub async fn configure_semaphore(
        &self,
        name: &str,
        permits: u32,
    ) -> Result<()> {
        let entity_path = self.scheme.entity_path(ReservationKind::Semaphore, name)?;
        write_permit_pool_size(&self.ctx.manager, &entity_path, permits, &self.ctx.acl).await?;
        self.ctx.cache.remove_permit_pool_size(&entity_path);
        Ok(())
    }

    /// Stream of revocations and connection changes.
    pub fn subscribe(&self) -> broadcast::Receiver<ReservationEvent> {
        self.events.subscribe()
    }

    /// Wakes every waiting acquisition, releases every held reservation and
    /// stops the event router. Returns the number of reservations released.
    pub async fn shutdown(&self) -> usize {
        self.ctx.manager.shutdown();
        let released = self.ctx.cache.release_all().await;
        self.router_shutdown.cancel();
        info!(owner_id = %self.ctx.owner_id, released, "coordination client shut down");
        released
    }

    pub fn is_shutdown(&self) -> bool {
        self.ctx.manager.is_shutdown()
    }

    fn lock(
        &self,
        name: &str,
        kind: ReservationKind,
    ) -> Result<Arc<ReentrantLock>> {
        let entity_path = self.scheme.entity_path(kind, name)?;
        ReentrantLock::new(self.ctx.clone(), entity_path, kind)
    }
}
