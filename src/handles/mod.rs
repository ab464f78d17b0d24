//! User-facing lock and semaphore handles.
//!
//! A handle wraps one or more reservation manager acquisitions with local
//! state: hold counts for reentrant locks, permit accounting for
//! semaphores. Every handle is registered in the [`crate::HandleCache`] so
//! the client can tear all of them down at once.

mod guard;
mod read_write_lock;
mod reentrant_lock;
mod semaphore;

pub use guard::*;
pub use read_write_lock::*;
pub use reentrant_lock::*;
pub use semaphore::*;


use std::sync::Arc;

use async_trait::async_trait;
use nanoid::nanoid;

use crate::constants::OWNER_ID_LENGTH;
use crate::Acl;
use crate::HandleCache;
use crate::ReservationKind;
use crate::ReservationManager;

/// What every handle of one client shares.
#[derive(Clone)]
pub struct HandleContext {
    pub owner_id: String,
    pub manager: Arc<ReservationManager>,
    pub cache: Arc<HandleCache>,
    pub acl: Vec<Acl>,
}

impl HandleContext {
    pub fn new(
        owner_id: impl Into<String>,
        manager: Arc<ReservationManager>,
        cache: Arc<HandleCache>,
    ) -> Self {
        Self {
            owner_id: owner_id.into(),
            manager,
            cache,
            acl: Acl::open_unsafe(),
        }
    }

    pub fn with_acl(
        mut self,
        acl: Vec<Acl>,
    ) -> Self {
        self.acl = acl;
        self
    }

    /// Registers a freshly built handle in the cache.
    pub(crate) fn register<H: ReservationHandle>(
        &self,
        handle: &Arc<H>,
    ) {
        let handle: Arc<dyn ReservationHandle> = handle.clone();
        self.cache.put(&handle);
    }
}

pub(crate) fn new_handle_id() -> String {
    nanoid!(OWNER_ID_LENGTH)
}

#[async_trait]
pub trait ReservationHandle: Send + Sync + 'static {
    /// Process-unique id of this handle
    fn handle_id(&self) -> &str;

    fn entity_path(&self) -> &str;

    fn kind(&self) -> ReservationKind;

    /// Reservation node paths this handle currently believes it holds
    fn held_paths(&self) -> Vec<String>;

    /// Relinquishes everything held, regardless of hold counts. Returns the
    /// number of reservations released.
    async fn release_all(&self) -> usize;

    /// Forgets `reservation_path` after it was deleted behind the handle's
    /// back. Returns `true` if the handle held it.
    fn mark_revoked(
        &self,
        reservation_path: &str,
    ) -> bool;
}
