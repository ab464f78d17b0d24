use std::sync::Arc;
use std::time::Duration;

use d_coord::CoordClient;
use d_coord::CoordinationStore;
use d_coord::InMemoryStore;
use d_coord::MemorySession;

pub const JOBS_EXPORT: &str = "jobs/export";
pub const POOL_X: &str = "pool/x";

/// Upper bound on how long a woken waiter may take to notice; far below
/// the poll ceiling, so passing means the watch did the waking.
pub const WAKE_BOUND: Duration = Duration::from_secs(1);

/// One simulated process connected to the shared store.
pub struct Process {
    pub client: CoordClient,
    pub session: Arc<MemorySession>,
}

pub async fn connect(
    store: &InMemoryStore,
    owner: &str,
) -> Process {
    let session = store.connect();
    let dyn_store: Arc<dyn CoordinationStore> = session.clone();
    let client = CoordClient::builder(dyn_store)
        .owner_id(owner)
        .build()
        .await
        .expect("client builds");
    Process { client, session }
}

pub async fn connect_all(
    store: &InMemoryStore,
    owners: &[&str],
) -> Vec<Process> {
    let mut processes = Vec::with_capacity(owners.len());
    for owner in owners {
        processes.push(connect(store, owner).await);
    }
    processes
}
