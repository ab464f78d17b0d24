use std::sync::Arc;

use super::HandleContext;
use super::ReentrantLock;
use crate::ReservationKind;
use crate::Result;

/// A shared read lock and an exclusive write lock over one entity path.
///
/// Both sides queue in the same reservation directory, so readers behind a
/// waiting writer wait for it and the write side excludes everything.
pub struct ReadWriteLock {
    entity_path: String,
    read: Arc<ReentrantLock>,
    write: Arc<ReentrantLock>,
}

impl ReadWriteLock {
    pub fn new(
        ctx: HandleContext,
        entity_path: impl Into<String>,
    ) -> Result<Self> {
        let entity_path = entity_path.into();
        let read = ReentrantLock::new(ctx.clone(), entity_path.clone(), ReservationKind::Shared)?;
        let write = ReentrantLock::new(ctx, entity_path.clone(), ReservationKind::Exclusive)?;
        Ok(Self {
            entity_path,
            read,
            write,
        })
    }

    pub fn read_lock(&self) -> &Arc<ReentrantLock> {
        &self.read
    }

    pub fn write_lock(&self) -> &Arc<ReentrantLock> {
        &self.write
    }

    pub fn entity_path(&self) -> &str {
        &self.entity_path
    }

    /// Destroys both sides.
    pub async fn destroy(&self) {
        self.read.destroy().await;
        self.write.destroy().await;
    }
}
