//! Acquire / relinquish state machine over an entity path's reservation queue.
//!
//! Every acquisition creates one ephemeral sequential node and then loops:
//! read the live queue, decide the node's position, and park on a
//! [`ReservationWatcher`] until something ahead of it changes. The queue is
//! never cached between iterations.

use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use serde::Serialize;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::error;
use tracing::info;
use tracing::trace;
use tracing::warn;

use super::ordering::sort_queue;
use super::ordering::QueueEntry;
use super::path_scheme::ancestors;
use super::path_scheme::join_paths;
use super::path_scheme::leaf_name;
use super::PathScheme;
use super::ReservationKind;
use super::ReservationWatcher;
use crate::async_task::store_op_with_timeout_and_exponential_backoff;
use crate::constants::ANY_VERSION;
use crate::Acl;
use crate::CoordinationError;
use crate::CoordinationStore;
use crate::CreateMode;
use crate::Error;
use crate::ReservationConfig;
use crate::Result;
use crate::RetryPolicies;
use crate::StoreError;
use crate::Watch;
use crate::WatchEventType;
use crate::WatchListener;
use crate::WatchedEvent;

/// How long an acquisition may wait for its turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitTimeout {
    /// Wait until acquired, interrupted or shut down
    Forever,
    /// Give up once this many milliseconds have elapsed. `Millis(0)` makes
    /// exactly one attempt.
    Millis(u64),
}

impl WaitTimeout {
    /// Validates the `-1` (no limit) or `>= 0` convention.
    pub fn from_millis(millis: i64) -> Result<Self> {
        match millis {
            -1 => Ok(WaitTimeout::Forever),
            m if m >= 0 => Ok(WaitTimeout::Millis(m as u64)),
            other => Err(CoordinationError::InvalidWaitTimeout(other).into()),
        }
    }

    /// Rounds up, so a nonzero duration never becomes a single attempt.
    pub fn from_duration(duration: Duration) -> Self {
        let mut millis = duration.as_millis();
        if duration.subsec_nanos() % 1_000_000 != 0 {
            millis += 1;
        }
        WaitTimeout::Millis(u64::try_from(millis).unwrap_or(u64::MAX))
    }

    /// `-1` for [`WaitTimeout::Forever`].
    pub fn as_millis(&self) -> i64 {
        match self {
            WaitTimeout::Forever => -1,
            WaitTimeout::Millis(m) => i64::try_from(*m).unwrap_or(i64::MAX),
        }
    }

    /// Time left after `elapsed`; `None` when waiting forever.
    pub(crate) fn remaining(
        &self,
        elapsed: Duration,
    ) -> Option<Duration> {
        match self {
            WaitTimeout::Forever => None,
            WaitTimeout::Millis(m) => Some(crate::time::remaining(Duration::from_millis(*m), elapsed)),
        }
    }

    pub(crate) fn is_expired(
        &self,
        elapsed: Duration,
    ) -> bool {
        matches!(self.remaining(elapsed), Some(d) if d.is_zero())
    }
}

/// Payload of every reservation node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReservationData {
    pub owner_id: String,
}

/// Where a reservation stands in one queue snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Position {
    Acquired,
    /// Blocked; `watch` is the path whose change may unblock it
    Blocked { watch: String },
    /// The reservation is no longer in the queue
    Missing,
}

/// Lock rule: the head always acquires; a non-exclusive reservation also
/// acquires when no exclusive one is queued ahead of it.
pub(crate) fn lock_position(
    queue: &[QueueEntry],
    own_name: &str,
    kind: ReservationKind,
) -> Position {
    let mut nearest_exclusive: Option<&str> = None;
    for (i, entry) in queue.iter().enumerate() {
        if entry.name == own_name {
            if i == 0 || (!kind.is_exclusive() && nearest_exclusive.is_none()) {
                return Position::Acquired;
            }
            let blocker = match nearest_exclusive {
                Some(exclusive) if !kind.is_exclusive() => exclusive,
                _ => queue[i - 1].name.as_str(),
            };
            return Position::Blocked {
                watch: blocker.to_string(),
            };
        }
        if entry.is_exclusive() {
            nearest_exclusive = Some(&entry.name);
        }
    }
    Position::Missing
}

/// Semaphore rule: the first `permits` reservations hold a permit. An
/// exclusive reservation ahead (not expected in semaphore queues) still
/// blocks everything behind it.
pub(crate) fn semaphore_position(
    queue: &[QueueEntry],
    own_name: &str,
    permits: u32,
    entity_path: &str,
) -> Position {
    let mut exclusive_seen = false;
    for (i, entry) in queue.iter().enumerate() {
        if entry.name == own_name {
            if (i as u64) < u64::from(permits) && (i == 0 || !exclusive_seen) {
                return Position::Acquired;
            }
            return Position::Blocked {
                watch: entity_path.to_string(),
            };
        }
        exclusive_seen |= entry.is_exclusive();
    }
    Position::Missing
}

/// What the loop does after one evaluation.
enum Step {
    Acquired,
    Wait,
    Fail,
    Fatal(Error),
}

/// Deletes a pending reservation node, and drops the watches registered
/// for it, if the acquisition future is dropped before it finishes.
pub(crate) struct ReservationGuard {
    store: Arc<dyn CoordinationStore>,
    path: Option<String>,
    listener: Arc<dyn WatchListener>,
    watched: Vec<String>,
}

impl ReservationGuard {
    pub(crate) fn new(
        store: Arc<dyn CoordinationStore>,
        path: String,
        listener: Arc<dyn WatchListener>,
    ) -> Self {
        Self {
            store,
            path: Some(path),
            listener,
            watched: Vec::new(),
        }
    }

    /// Records a path the listener was registered on.
    fn note_watch(
        &mut self,
        path: &str,
    ) {
        if !self.watched.iter().any(|p| p == path) {
            self.watched.push(path.to_string());
        }
    }

    pub(crate) fn disarm(&mut self) {
        self.path = None;
    }
}

impl Drop for ReservationGuard {
    fn drop(&mut self) {
        let Some(path) = self.path.take() else {
            return;
        };
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!(%path, "no runtime to clean up abandoned reservation");
            return;
        };
        let store = self.store.clone();
        let listener = self.listener.clone();
        let watched = std::mem::take(&mut self.watched);
        runtime.spawn(async move {
            match store.delete(&path, ANY_VERSION).await {
                Ok(()) => debug!(%path, "cleaned up abandoned reservation"),
                Err(e) if e.is_no_node() => {}
                Err(e) => warn!(%path, "failed to clean up abandoned reservation: {}", e),
            }
            for watch_path in watched {
                let _ = store.remove_watches(&watch_path, listener.clone()).await;
            }
        });
    }
}

/// Implements acquisition and release of reservations for every handle of
/// one client.
pub struct ReservationManager {
    store: Arc<dyn CoordinationStore>,
    config: ReservationConfig,
    retry: RetryPolicies,
    shutdown: CancellationToken,
}

impl ReservationManager {
    pub fn new(
        store: Arc<dyn CoordinationStore>,
        config: ReservationConfig,
        retry: RetryPolicies,
    ) -> Self {
        Self {
            store,
            config,
            retry,
            shutdown: CancellationToken::new(),
        }
    }

    pub fn store(&self) -> &Arc<dyn CoordinationStore> {
        &self.store
    }

    pub fn poll_ceiling(&self) -> Duration {
        Duration::from_millis(self.config.poll_ceiling_ms)
    }

    /// Wait used by handle operations that take no explicit timeout.
    pub fn default_wait_timeout(&self) -> WaitTimeout {
        WaitTimeout::from_millis(self.config.default_wait_timeout_ms).unwrap_or(WaitTimeout::Forever)
    }

    /// Stops new waits and wakes every acquisition currently waiting; they
    /// return `Ok(None)`.
    pub fn shutdown(&self) {
        info!("reservation manager shutting down");
        self.shutdown.cancel();
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// Acquires an exclusive or shared reservation on `entity_path`.
    ///
    /// Returns the acquired reservation node path, or `None` when the wait
    /// timed out, the manager shut down, or the store failed. On every path
    /// that does not acquire, the caller's own reservation node is deleted.
    ///
    /// # Errors
    /// - [`CoordinationError::WrongReservationKind`] for a semaphore kind
    /// - [`CoordinationError::Interrupted`] when `interruptible` and
    ///   `interrupt` is cancelled while waiting
    /// - [`CoordinationError::MalformedReservationName`] if a sibling name
    ///   cannot be ordered
    #[allow(clippy::too_many_arguments)]
    pub async fn acquire(
        &self,
        owner_id: &str,
        entity_path: &str,
        kind: ReservationKind,
        acl: &[Acl],
        wait_timeout: WaitTimeout,
        interruptible: bool,
        interrupt: &CancellationToken,
    ) -> Result<Option<String>> {
        if kind == ReservationKind::Semaphore {
            return Err(CoordinationError::WrongReservationKind {
                expected: ReservationKind::Exclusive,
                actual: kind,
            }
            .into());
        }
        self.run_acquisition(
            owner_id,
            entity_path,
            kind,
            None,
            acl,
            wait_timeout,
            interruptible,
            interrupt,
        )
        .await
    }

    /// Acquires one permit of a semaphore with `total_permits` capacity.
    ///
    /// While the entity has fewer children than `total_permits` the new
    /// reservation is granted without ranking, so a newcomer may overtake
    /// queued waiters when capacity is visibly free.
    ///
    /// # Errors
    /// - [`CoordinationError::WrongReservationKind`] unless `kind` is
    ///   [`ReservationKind::Semaphore`]
    /// - [`CoordinationError::InvalidPermits`] for `total_permits == 0`
    /// - as [`acquire`](Self::acquire) otherwise
    #[allow(clippy::too_many_arguments)]
    pub async fn acquire_for_semaphore(
        &self,
        owner_id: &str,
        entity_path: &str,
        kind: ReservationKind,
        total_permits: u32,
        acl: &[Acl],
        wait_timeout: WaitTimeout,
        interruptible: bool,
        interrupt: &CancellationToken,
    ) -> Result<Option<String>> {
        if kind != ReservationKind::Semaphore {
            return Err(CoordinationError::WrongReservationKind {
                expected: ReservationKind::Semaphore,
                actual: kind,
            }
            .into());
        }
        if total_permits == 0 {
            return Err(CoordinationError::InvalidPermits {
                entity_path: entity_path.to_string(),
                permits: total_permits,
            }
            .into());
        }
        self.run_acquisition(
            owner_id,
            entity_path,
            kind,
            Some(total_permits),
            acl,
            wait_timeout,
            interruptible,
            interrupt,
        )
        .await
    }

    #[allow(clippy::too_many_arguments)]
    async fn run_acquisition(
        &self,
        owner_id: &str,
        entity_path: &str,
        kind: ReservationKind,
        permits: Option<u32>,
        acl: &[Acl],
        wait_timeout: WaitTimeout,
        interruptible: bool,
        interrupt: &CancellationToken,
    ) -> Result<Option<String>> {
        let start = Instant::now();

        let reservation_path = match self.create_reservation(owner_id, entity_path, kind, acl).await {
            Ok(path) => path,
            Err(Error::Store(e)) => {
                error!(owner_id, entity_path, %kind, "error trying to acquire: {}", e);
                return Ok(None);
            }
            Err(e) => return Err(e),
        };
        let own_name = leaf_name(&reservation_path).to_string();

        debug!(owner_id, %kind, path = %reservation_path, "attempting to acquire");

        let watcher = ReservationWatcher::new(self.poll_ceiling());
        let mut guard = ReservationGuard::new(
            self.store.clone(),
            reservation_path.clone(),
            watcher.clone(),
        );
        let mut interrupt_logged = false;
        let outcome: Result<bool> = loop {
            watcher.rearm();
            let step = match permits {
                None => {
                    self.evaluate_lock(entity_path, &own_name, kind, &watcher, &mut guard)
                        .await
                }
                Some(n) => {
                    self.evaluate_semaphore(entity_path, &own_name, n, &watcher, &mut guard)
                        .await
                }
            };

            match step {
                Step::Acquired => break Ok(true),
                Step::Fail => break Ok(false),
                Step::Fatal(e) => break Err(e),
                Step::Wait => {}
            }

            let wait = wait_timeout
                .remaining(start.elapsed())
                .unwrap_or(Duration::MAX);
            trace!(
                owner_id,
                %kind,
                path = %reservation_path,
                total_wait_ms = start.elapsed().as_millis() as u64,
                "waiting to acquire"
            );

            tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => {}
                _ = interrupt.cancelled(), if interruptible => {
                    break Err(CoordinationError::Interrupted {
                        owner_id: owner_id.to_string(),
                        entity_path: entity_path.to_string(),
                    }
                    .into());
                }
                _ = watcher.wait_for_event(wait) => {}
            }

            if !interruptible && !interrupt_logged && interrupt.is_cancelled() {
                info!(
                    owner_id,
                    %kind,
                    entity_path,
                    "ignoring attempted interrupt while waiting for acquisition"
                );
                interrupt_logged = true;
            }

            if self.is_shutdown() || wait_timeout.is_expired(start.elapsed()) {
                break Ok(false);
            }
        };
        watcher.destroy();
        self.release_watches(&guard.watched, &watcher).await;

        let acquired = match outcome {
            Ok(true) => self.watch_acquired(&reservation_path).await,
            Ok(false) => false,
            Err(ref e) => {
                debug!(owner_id, %kind, entity_path, "acquisition aborted: {}", e);
                false
            }
        };

        if acquired {
            guard.disarm();
            debug!(owner_id, %kind, path = %reservation_path, "acquired");
            return Ok(Some(reservation_path));
        }

        let relinquished = self.relinquish(&reservation_path).await;
        guard.disarm();
        if !relinquished {
            error!(
                owner_id,
                path = %reservation_path,
                "unable to relinquish reservation after failed acquisition"
            );
        }
        info!(
            owner_id,
            %kind,
            entity_path,
            wait_timeout_ms = wait_timeout.as_millis(),
            relinquished,
            "could not acquire"
        );
        outcome.map(|_| None)
    }

    async fn evaluate_lock(
        &self,
        entity_path: &str,
        own_name: &str,
        kind: ReservationKind,
        watcher: &Arc<ReservationWatcher>,
        guard: &mut ReservationGuard,
    ) -> Step {
        let queue = match self.read_queue(entity_path, Watch::None).await {
            Ok(queue) => queue,
            Err(step) => return step,
        };
        trace!(entity_path, own_name, queue_len = queue.len(), "checking acquisition status");

        match lock_position(&queue, own_name, kind) {
            Position::Acquired => Step::Acquired,
            Position::Missing => {
                warn!(entity_path, own_name, "reservation disappeared while waiting");
                Step::Fail
            }
            Position::Blocked { watch } => {
                let watch_path = join_paths(entity_path, &watch);
                guard.note_watch(&watch_path);
                match self
                    .store
                    .exists(&watch_path, Watch::listener(watcher.clone()))
                    .await
                {
                    // Blocker already gone: the re-armed watcher is not needed
                    Ok(None) => {
                        watcher.process(WatchedEvent::node(WatchEventType::NodeDeleted, watch_path));
                        Step::Wait
                    }
                    Ok(Some(_)) => Step::Wait,
                    Err(e) => self.store_step(entity_path, e),
                }
            }
        }
    }

    async fn evaluate_semaphore(
        &self,
        entity_path: &str,
        own_name: &str,
        permits: u32,
        watcher: &Arc<ReservationWatcher>,
        guard: &mut ReservationGuard,
    ) -> Step {
        let stat = match self.store.exists(entity_path, Watch::None).await {
            Ok(Some(stat)) => stat,
            Ok(None) => {
                warn!(entity_path, own_name, "semaphore entity disappeared while waiting");
                return Step::Fail;
            }
            Err(e) => return self.store_step(entity_path, e),
        };
        if i64::from(stat.num_children) < i64::from(permits) {
            return Step::Acquired;
        }

        guard.note_watch(entity_path);
        let queue = match self
            .read_queue(entity_path, Watch::listener(watcher.clone()))
            .await
        {
            Ok(queue) => queue,
            Err(step) => return step,
        };
        match semaphore_position(&queue, own_name, permits, entity_path) {
            Position::Acquired => Step::Acquired,
            Position::Blocked { .. } => Step::Wait,
            Position::Missing => {
                warn!(entity_path, own_name, "reservation disappeared while waiting");
                Step::Fail
            }
        }
    }

    /// Drops the registrations a finished acquisition left behind. A watch
    /// on a deleted sequential node would otherwise never fire.
    async fn release_watches(
        &self,
        paths: &[String],
        watcher: &Arc<ReservationWatcher>,
    ) {
        for path in paths {
            let listener: Arc<dyn WatchListener> = watcher.clone();
            match self.store.remove_watches(path, listener).await {
                Ok(removed) => trace!(%path, removed, "released watch registration"),
                Err(e) => debug!(%path, "could not release watch registration: {}", e),
            }
        }
    }

    async fn read_queue(
        &self,
        entity_path: &str,
        watch: Watch,
    ) -> std::result::Result<Vec<QueueEntry>, Step> {
        let children = match self.store.list_children(entity_path, watch).await {
            Ok(children) => children,
            Err(e) => return Err(self.store_step(entity_path, e)),
        };
        sort_queue(children).map_err(|e| {
            error!(entity_path, "cannot order reservation queue: {}", e);
            Step::Fatal(e)
        })
    }

    /// Transient errors wait and retry; a missing entity means our own node
    /// is gone too; anything else fails the acquisition.
    fn store_step(
        &self,
        entity_path: &str,
        e: StoreError,
    ) -> Step {
        if e.is_transient() {
            warn!(entity_path, "transient store error while acquiring: {}", e);
            Step::Wait
        } else {
            error!(entity_path, "store error while acquiring: {}", e);
            Step::Fail
        }
    }

    /// Leaves a default watch on an acquired node so an external delete
    /// (session loss, operator action) reaches the client's listener.
    async fn watch_acquired(
        &self,
        reservation_path: &str,
    ) -> bool {
        match self.store.exists(reservation_path, Watch::Default).await {
            Ok(Some(_)) => true,
            Ok(None) => {
                warn!(path = reservation_path, "acquired reservation vanished before it was watched");
                false
            }
            Err(e) => {
                warn!(path = reservation_path, "could not watch acquired reservation: {}", e);
                true
            }
        }
    }

    async fn create_reservation(
        &self,
        owner_id: &str,
        entity_path: &str,
        kind: ReservationKind,
        acl: &[Acl],
    ) -> Result<String> {
        let data = serde_json::to_vec(&ReservationData {
            owner_id: owner_id.to_string(),
        })?;
        let prefix = PathScheme::reservation_prefix(entity_path, kind);

        match self
            .store
            .create_node(&prefix, data.clone(), CreateMode::EphemeralSequential, acl)
            .await
        {
            Err(StoreError::NoNode(_)) => {
                self.ensure_path(entity_path, acl).await?;
                Ok(self
                    .store
                    .create_node(&prefix, data, CreateMode::EphemeralSequential, acl)
                    .await?)
            }
            other => Ok(other?),
        }
    }

    /// Creates `path` and its missing ancestors as persistent nodes.
    /// Concurrent creation by another client counts as success.
    pub async fn ensure_path(
        &self,
        path: &str,
        acl: &[Acl],
    ) -> Result<()> {
        let mut paths = ancestors(path);
        paths.push(path);
        for p in paths {
            let result = store_op_with_timeout_and_exponential_backoff(
                || {
                    self.store
                        .create_node(p, Vec::new(), CreateMode::Persistent, acl)
                },
                self.retry.setup,
            )
            .await;
            match result {
                Ok(_) => trace!(path = p, "created path node"),
                Err(StoreError::NodeExists(_)) => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }

    /// Deletes a reservation node.
    ///
    /// A node that is already gone counts as relinquished. Failures are
    /// logged and reported as `false`, never raised: an orphaned ephemeral
    /// node disappears with its session.
    pub async fn relinquish(
        &self,
        reservation_path: &str,
    ) -> bool {
        trace!(path = reservation_path, "relinquishing");
        let result = store_op_with_timeout_and_exponential_backoff(
            || self.store.delete(reservation_path, ANY_VERSION),
            self.retry.relinquish,
        )
        .await;

        match result {
            Ok(()) => {
                debug!(path = reservation_path, "relinquished");
                true
            }
            Err(e) if e.is_no_node() => {
                debug!(path = reservation_path, "reservation already deleted");
                true
            }
            Err(e) => {
                error!(path = reservation_path, "error while deleting reservation node: {}", e);
                false
            }
        }
    }

    /// Child names of `entity_path` in queue order. A missing entity has an
    /// empty queue.
    pub async fn sorted_reservations(
        &self,
        entity_path: &str,
    ) -> Result<Vec<String>> {
        let children = match self.store.list_children(entity_path, Watch::None).await {
            Ok(children) => children,
            Err(e) if e.is_no_node() => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        Ok(sort_queue(children)?.into_iter().map(|e| e.name).collect())
    }

    /// Current number of reservations (held or queued) on `entity_path`.
    pub async fn reservation_count(
        &self,
        entity_path: &str,
    ) -> Result<usize> {
        let stat = self.store.exists(entity_path, Watch::None).await?;
        Ok(stat.map_or(0, |s| usize::try_from(s.num_children).unwrap_or(0)))
    }
}
