use std::sync::Arc;

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use crate::CoordinationStore;
use crate::HandleCache;
use crate::HandleContext;
use crate::InMemoryStore;
use crate::MemorySession;
use crate::ReservationConfig;
use crate::ReservationManager;
use crate::RetryPolicies;
use crate::WatchListener;
use crate::WatchedEvent;

pub(crate) const TEST_ENTITY: &str = "/d-coord/coord/lock/jobs/export";
pub(crate) const TEST_SEMAPHORE: &str = "/d-coord/coord/semaphore/pool/x";

/// One simulated process: its own store session and manager.
pub(crate) struct TestProcess {
    pub session: Arc<MemorySession>,
    pub manager: Arc<ReservationManager>,
}

pub(crate) fn test_process(store: &InMemoryStore) -> TestProcess {
    let session = store.connect();
    let dyn_store: Arc<dyn CoordinationStore> = session.clone();
    TestProcess {
        session,
        manager: Arc::new(ReservationManager::new(
            dyn_store,
            ReservationConfig::default(),
            RetryPolicies::default(),
        )),
    }
}

pub(crate) fn manager_with_store(store: Arc<dyn CoordinationStore>) -> ReservationManager {
    ReservationManager::new(store, ReservationConfig::default(), RetryPolicies::default())
}

impl TestProcess {
    /// Handle context of `owner` on this process, with its own cache.
    pub(crate) fn context(
        &self,
        owner: &str,
    ) -> HandleContext {
        HandleContext::new(owner, self.manager.clone(), Arc::new(HandleCache::new()))
    }
}

pub(crate) fn context_with_store(
    owner: &str,
    store: Arc<dyn CoordinationStore>,
) -> HandleContext {
    HandleContext::new(owner, Arc::new(manager_with_store(store)), Arc::new(HandleCache::new()))
}

/// A token nobody cancels.
pub(crate) fn never() -> CancellationToken {
    CancellationToken::new()
}

#[derive(Default)]
pub(crate) struct RecordingListener {
    events: Mutex<Vec<WatchedEvent>>,
}

impl RecordingListener {
    pub(crate) fn events(&self) -> Vec<WatchedEvent> {
        self.events.lock().clone()
    }
}

impl WatchListener for RecordingListener {
    fn process(
        &self,
        event: WatchedEvent,
    ) {
        self.events.lock().push(event);
    }
}
