//! Remote store client facade.
//!
//! The reservation protocol only needs a narrow slice of a hierarchical,
//! versioned, watch-capable store: create (ephemeral / sequential) nodes,
//! list children, check existence, delete by version, and versioned data
//! access. [`CoordinationStore`] is that slice; a ZooKeeper session, or the
//! bundled [`InMemoryStore`], plugs in behind it.
//!
//! Watches are one-shot and edge-triggered. A notification is only a prod to
//! re-read real state, never a statement about it.

mod error;
mod memory;
mod types;

pub use error::*;
pub use memory::*;
pub use types::*;

#[cfg(test)]
mod memory_test;

use std::sync::Arc;

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;

#[cfg_attr(test, automock)]
#[async_trait]
pub trait CoordinationStore: Send + Sync + 'static {
    /// Creates a node and returns its realized path.
    ///
    /// Sequential modes append a unique, strictly increasing, 10-digit
    /// zero-padded suffix scoped to the parent path.
    ///
    /// # Errors
    /// - [`StoreError::NoNode`] if the parent does not exist
    /// - [`StoreError::NodeExists`] for a non-sequential path already taken
    /// - [`StoreError::NoChildrenForEphemerals`] if the parent is ephemeral
    async fn create_node(
        &self,
        path: &str,
        data: Vec<u8>,
        mode: CreateMode,
        acl: &[Acl],
    ) -> StoreResult<String>;

    /// Lists child names (not full paths) in no particular order.
    ///
    /// A watch, if requested, fires once on the next child create/delete or
    /// on deletion of the node itself.
    async fn list_children(
        &self,
        path: &str,
        watch: Watch,
    ) -> StoreResult<Vec<String>>;

    /// Returns node metadata, or `None` if absent.
    ///
    /// A watch, if requested, fires once on the next create, delete or data
    /// change affecting `path`, whether or not the node exists now.
    async fn exists(
        &self,
        path: &str,
        watch: Watch,
    ) -> StoreResult<Option<NodeStat>>;

    /// Deletes a node. `expected_version == ANY_VERSION` is unconditional.
    async fn delete(
        &self,
        path: &str,
        expected_version: i32,
    ) -> StoreResult<()>;

    async fn get_data(
        &self,
        path: &str,
        watch: Watch,
    ) -> StoreResult<(Vec<u8>, NodeStat)>;

    async fn set_data(
        &self,
        path: &str,
        data: Vec<u8>,
        expected_version: i32,
    ) -> StoreResult<NodeStat>;

    /// Drops the pending watches `listener` registered on `path`, in both
    /// the data and the child tables. Returns `true` if any was removed.
    async fn remove_watches(
        &self,
        path: &str,
        listener: Arc<dyn WatchListener>,
    ) -> StoreResult<bool>;

    /// Installs the session's default listener.
    ///
    /// It receives [`Watch::Default`] notifications and session state
    /// changes (`Disconnected`, `Expired`, `SyncConnected`).
    fn register(
        &self,
        listener: Arc<dyn WatchListener>,
    );
}

// Blanket implementation for Arc<T>
#[async_trait]
impl<T: CoordinationStore + ?Sized> CoordinationStore for Arc<T> {
    async fn create_node(
        &self,
        path: &str,
        data: Vec<u8>,
        mode: CreateMode,
        acl: &[Acl],
    ) -> StoreResult<String> {
        (**self).create_node(path, data, mode, acl).await
    }

    async fn list_children(
        &self,
        path: &str,
        watch: Watch,
    ) -> StoreResult<Vec<String>> {
        (**self).list_children(path, watch).await
    }

    async fn exists(
        &self,
        path: &str,
        watch: Watch,
    ) -> StoreResult<Option<NodeStat>> {
        (**self).exists(path, watch).await
    }

    async fn delete(
        &self,
        path: &str,
        expected_version: i32,
    ) -> StoreResult<()> {
        (**self).delete(path, expected_version).await
    }

    async fn get_data(
        &self,
        path: &str,
        watch: Watch,
    ) -> StoreResult<(Vec<u8>, NodeStat)> {
        (**self).get_data(path, watch).await
    }

    async fn set_data(
        &self,
        path: &str,
        data: Vec<u8>,
        expected_version: i32,
    ) -> StoreResult<NodeStat> {
        (**self).set_data(path, data, expected_version).await
    }

    async fn remove_watches(
        &self,
        path: &str,
        listener: Arc<dyn WatchListener>,
    ) -> StoreResult<bool> {
        (**self).remove_watches(path, listener).await
    }

    fn register(
        &self,
        listener: Arc<dyn WatchListener>,
    ) {
        (**self).register(listener)
    }
}
