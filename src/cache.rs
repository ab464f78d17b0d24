//! Process-local registry of live handles.
//!
//! The cache is bookkeeping for bulk teardown and permit-pool lookups only.
//! Acquisition order is always decided from the live store queue.

use std::sync::Arc;
use std::sync::Weak;

use dashmap::DashMap;
use futures::future::join_all;
use tracing::debug;
use tracing::info;

use crate::PermitPoolSize;
use crate::ReservationHandle;
use crate::ReservationKind;

type HandleKey = (String, ReservationKind);

/// Live handles per `(entity path, kind)` plus cached permit pool sizes per
/// semaphore entity.
///
/// Handles are held weakly: dropping the last strong reference to a handle
/// is enough to take it out of the cache, and dead entries are pruned on
/// the next access to their key.
#[derive(Default)]
pub struct HandleCache {
    handles: DashMap<HandleKey, Vec<Weak<dyn ReservationHandle>>>,
    permit_pool_sizes: DashMap<String, PermitPoolSize>,
}

impl HandleCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a handle under its own entity path and kind. Registering
    /// the same handle twice is a no-op.
    pub fn put(
        &self,
        handle: &Arc<dyn ReservationHandle>,
    ) {
        let key = (handle.entity_path().to_string(), handle.kind());
        let mut entry = self.handles.entry(key).or_default();
        entry.retain(|w| w.strong_count() > 0);
        let already = entry
            .iter()
            .filter_map(Weak::upgrade)
            .any(|h| h.handle_id() == handle.handle_id());
        if !already {
            entry.push(Arc::downgrade(handle));
        }
    }

    /// Returns `true` if the handle was registered.
    pub fn remove(
        &self,
        handle: &dyn ReservationHandle,
    ) -> bool {
        let key = (handle.entity_path().to_string(), handle.kind());
        let mut removed = false;
        let now_empty = match self.handles.get_mut(&key) {
            Some(mut entry) => {
                let before = entry.len();
                entry.retain(|w| match w.upgrade() {
                    Some(h) => h.handle_id() != handle.handle_id(),
                    None => false,
                });
                removed = entry.len() < before;
                entry.is_empty()
            }
            None => false,
        };
        if now_empty {
            self.handles.remove_if(&key, |_, v| v.is_empty());
        }
        removed
    }

    /// Live handles registered for `(entity_path, kind)`.
    pub fn get(
        &self,
        entity_path: &str,
        kind: ReservationKind,
    ) -> Vec<Arc<dyn ReservationHandle>> {
        let key = (entity_path.to_string(), kind);
        match self.handles.get_mut(&key) {
            Some(mut entry) => {
                entry.retain(|w| w.strong_count() > 0);
                entry.iter().filter_map(Weak::upgrade).collect()
            }
            None => Vec::new(),
        }
    }

    /// Every live handle.
    pub fn handles(&self) -> Vec<Arc<dyn ReservationHandle>> {
        self.handles
            .iter()
            .flat_map(|entry| entry.value().iter().filter_map(Weak::upgrade).collect::<Vec<_>>())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.handles().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The live handle that currently holds `reservation_path`, if any.
    pub fn find_holder(
        &self,
        reservation_path: &str,
    ) -> Option<Arc<dyn ReservationHandle>> {
        self.handles()
            .into_iter()
            .find(|h| h.held_paths().iter().any(|p| p == reservation_path))
    }

    /// Relinquishes everything every live handle holds. Returns the number
    /// of reservations released.
    pub async fn release_all(&self) -> usize {
        // Collected first so no map shard lock is held across an await
        let handles = self.handles();
        let released: usize = join_all(handles.iter().map(|h| h.release_all()))
            .await
            .into_iter()
            .sum();
        info!(released, "released all cached reservations");
        released
    }

    /// Forgets every held reservation without touching the store, for when
    /// the store already dropped them. Returns the number forgotten.
    pub fn revoke_all(&self) -> usize {
        let mut revoked = 0;
        for handle in self.handles() {
            for path in handle.held_paths() {
                if handle.mark_revoked(&path) {
                    revoked += 1;
                }
            }
        }
        revoked
    }

    pub fn permit_pool_size(
        &self,
        entity_path: &str,
    ) -> Option<PermitPoolSize> {
        self.permit_pool_sizes.get(entity_path).map(|e| *e.value())
    }

    /// Caches `size` unless a size is already cached; returns the cached
    /// value either way.
    pub fn put_permit_pool_size_if_absent(
        &self,
        entity_path: &str,
        size: PermitPoolSize,
    ) -> PermitPoolSize {
        *self
            .permit_pool_sizes
            .entry(entity_path.to_string())
            .or_insert_with(|| {
                debug!(entity_path, ?size, "caching permit pool size");
                size
            })
            .value()
    }

    pub fn remove_permit_pool_size(
        &self,
        entity_path: &str,
    ) -> Option<PermitPoolSize> {
        self.permit_pool_sizes.remove(entity_path).map(|(_, v)| v)
    }
}
