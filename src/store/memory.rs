//! In-memory coordination store with ZooKeeper semantics.
//!
//! One [`InMemoryStore`] is the shared "ensemble"; every
//! [`InMemoryStore::connect`] opens an independent [`MemorySession`], which
//! plays the role of one client process: it owns ephemeral nodes, has its own
//! default listener and can be disconnected or expired.

use std::collections::BTreeSet;
use std::collections::HashMap;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::debug;
use tracing::trace;

use super::Acl;
use super::CoordinationStore;
use super::CreateMode;
use super::NodeStat;
use super::SessionState;
use super::StoreError;
use super::StoreResult;
use super::Watch;
use super::WatchEventType;
use super::WatchListener;
use super::WatchedEvent;
use crate::constants::ANY_VERSION;
use crate::constants::SEQUENCE_WIDTH;
use crate::reservation::is_valid_path;
use crate::reservation::leaf_name;
use crate::reservation::parent_path;
use crate::time::get_now_as_i64;

type SessionId = u64;

struct MemNode {
    data: Vec<u8>,
    stat: NodeStat,
    children: BTreeSet<String>,
    next_sequence: u64,
    acl: Vec<Acl>,
}

impl MemNode {
    fn new(
        data: Vec<u8>,
        acl: Vec<Acl>,
        ephemeral_owner: Option<SessionId>,
    ) -> Self {
        let now = get_now_as_i64();
        let data_length = i32::try_from(data.len()).unwrap_or(i32::MAX);
        Self {
            data,
            stat: NodeStat {
                ctime: now,
                mtime: now,
                version: 0,
                cversion: 0,
                ephemeral_owner,
                data_length,
                num_children: 0,
            },
            children: BTreeSet::new(),
            next_sequence: 0,
            acl,
        }
    }
}

#[derive(Clone)]
enum WatchTarget {
    Default(SessionId),
    Listener(Arc<dyn WatchListener>),
}

impl WatchTarget {
    fn from_watch(
        watch: Watch,
        session_id: SessionId,
    ) -> Option<Self> {
        match watch {
            Watch::None => None,
            Watch::Default => Some(WatchTarget::Default(session_id)),
            Watch::Listener(l) => Some(WatchTarget::Listener(l)),
        }
    }

    fn same_as(
        &self,
        other: &WatchTarget,
    ) -> bool {
        match (self, other) {
            (WatchTarget::Default(a), WatchTarget::Default(b)) => a == b,
            (WatchTarget::Listener(a), WatchTarget::Listener(b)) => {
                Arc::as_ptr(a) as *const () == Arc::as_ptr(b) as *const ()
            }
            _ => false,
        }
    }
}

#[derive(Default)]
struct SessionEntry {
    listener: Option<Arc<dyn WatchListener>>,
    connected: bool,
    closed: bool,
}

type PendingEvents = Vec<(Arc<dyn WatchListener>, WatchedEvent)>;

struct StoreState {
    nodes: HashMap<String, MemNode>,
    // exists() and get_data() watches
    data_watches: HashMap<String, Vec<WatchTarget>>,
    // list_children() watches
    child_watches: HashMap<String, Vec<WatchTarget>>,
    sessions: HashMap<SessionId, SessionEntry>,
}

impl StoreState {
    fn new() -> Self {
        let mut nodes = HashMap::new();
        nodes.insert("/".to_string(), MemNode::new(Vec::new(), Acl::open_unsafe(), None));
        Self {
            nodes,
            data_watches: HashMap::new(),
            child_watches: HashMap::new(),
            sessions: HashMap::new(),
        }
    }

    fn check_session(
        &self,
        session_id: SessionId,
    ) -> StoreResult<()> {
        match self.sessions.get(&session_id) {
            Some(s) if s.closed => Err(StoreError::SessionExpired),
            Some(s) if !s.connected => Err(StoreError::ConnectionLoss),
            Some(_) => Ok(()),
            None => Err(StoreError::SessionExpired),
        }
    }

    fn add_watch(
        table: &mut HashMap<String, Vec<WatchTarget>>,
        path: &str,
        target: WatchTarget,
    ) {
        let targets = table.entry(path.to_string()).or_default();
        if !targets.iter().any(|t| t.same_as(&target)) {
            targets.push(target);
        }
    }

    /// Removes every watch of `listener` on `path` from `table`.
    fn remove_listener(
        table: &mut HashMap<String, Vec<WatchTarget>>,
        path: &str,
        listener: &WatchTarget,
    ) -> bool {
        let Some(targets) = table.get_mut(path) else {
            return false;
        };
        let before = targets.len();
        targets.retain(|t| !t.same_as(listener));
        let removed = targets.len() < before;
        if targets.is_empty() {
            table.remove(path);
        }
        removed
    }

    /// Drains the one-shot watches registered on `path` into `pending`.
    fn trigger(
        &mut self,
        data_table: bool,
        path: &str,
        event_type: WatchEventType,
        pending: &mut PendingEvents,
    ) {
        let table = if data_table {
            &mut self.data_watches
        } else {
            &mut self.child_watches
        };
        let Some(targets) = table.remove(path) else {
            return;
        };
        for target in targets {
            let listener = match target {
                WatchTarget::Listener(l) => Some(l),
                WatchTarget::Default(id) => self.sessions.get(&id).and_then(|s| s.listener.clone()),
            };
            if let Some(listener) = listener {
                pending.push((listener, WatchedEvent::node(event_type, path)));
            }
        }
    }

    fn remove_node(
        &mut self,
        path: &str,
        pending: &mut PendingEvents,
    ) {
        if self.nodes.remove(path).is_none() {
            return;
        }
        let parent = parent_path(path);
        if let Some(p) = self.nodes.get_mut(parent) {
            p.children.remove(leaf_name(path));
            p.stat.cversion += 1;
            p.stat.num_children = p.children.len() as i32;
        }
        self.trigger(true, path, WatchEventType::NodeDeleted, pending);
        self.trigger(false, path, WatchEventType::NodeDeleted, pending);
        self.trigger(false, parent, WatchEventType::NodeChildrenChanged, pending);
    }

    fn ephemerals_of(
        &self,
        session_id: SessionId,
    ) -> Vec<String> {
        self.nodes
            .iter()
            .filter(|(_, n)| n.stat.ephemeral_owner == Some(session_id))
            .map(|(p, _)| p.clone())
            .collect()
    }
}

struct StoreInner {
    state: Mutex<StoreState>,
    next_session_id: AtomicU64,
}

fn fire(pending: PendingEvents) {
    for (listener, event) in pending {
        trace!(?event, "delivering watch event");
        listener.process(event);
    }
}

fn validate_path(path: &str) -> StoreResult<()> {
    if !is_valid_path(path) {
        return Err(StoreError::Other(format!("Invalid path: {}", path)));
    }
    Ok(())
}

fn check_version(
    path: &str,
    stat: &NodeStat,
    expected_version: i32,
) -> StoreResult<()> {
    if expected_version != ANY_VERSION && expected_version != stat.version {
        return Err(StoreError::BadVersion {
            path: path.to_string(),
            expected: expected_version,
            actual: stat.version,
        });
    }
    Ok(())
}

/// Shared in-memory node tree; sessions are opened with [`connect`](Self::connect).
#[derive(Clone)]
pub struct InMemoryStore {
    inner: Arc<StoreInner>,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(StoreInner {
                state: Mutex::new(StoreState::new()),
                next_session_id: AtomicU64::new(1),
            }),
        }
    }

    /// Opens a new session against this store.
    pub fn connect(&self) -> Arc<MemorySession> {
        let session_id = self.inner.next_session_id.fetch_add(1, Ordering::SeqCst);
        self.inner.state.lock().sessions.insert(
            session_id,
            SessionEntry {
                listener: None,
                connected: true,
                closed: false,
            },
        );
        debug!(session_id, "in-memory session opened");
        Arc::new(MemorySession {
            inner: self.inner.clone(),
            session_id,
        })
    }

    /// Sorted child names of `path`; empty if the node does not exist.
    pub fn children(
        &self,
        path: &str,
    ) -> Vec<String> {
        self.inner
            .state
            .lock()
            .nodes
            .get(path)
            .map(|n| n.children.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn contains(
        &self,
        path: &str,
    ) -> bool {
        self.inner.state.lock().nodes.contains_key(path)
    }

    /// ACL a node was created with.
    pub fn acl(
        &self,
        path: &str,
    ) -> Option<Vec<Acl>> {
        self.inner.state.lock().nodes.get(path).map(|n| n.acl.clone())
    }

    /// Number of watch registrations not yet fired or removed, across all
    /// paths and sessions.
    pub fn pending_watch_count(&self) -> usize {
        let state = self.inner.state.lock();
        state
            .data_watches
            .values()
            .chain(state.child_watches.values())
            .map(Vec::len)
            .sum()
    }

    /// Deletes a node as an external actor would, bypassing sessions.
    pub fn force_delete(
        &self,
        path: &str,
    ) -> bool {
        let mut pending = Vec::new();
        let existed = {
            let mut state = self.inner.state.lock();
            let existed = state.nodes.contains_key(path);
            state.remove_node(path, &mut pending);
            existed
        };
        fire(pending);
        existed
    }
}

/// One client session of an [`InMemoryStore`].
pub struct MemorySession {
    inner: Arc<StoreInner>,
    session_id: SessionId,
}

impl MemorySession {
    pub fn session_id(&self) -> u64 {
        self.session_id
    }

    /// Ends the session as the ensemble would after a session timeout:
    /// ephemeral nodes are deleted, their watches fire, and the default
    /// listener receives `Expired`.
    pub fn expire(&self) {
        let listener = self.end_session();
        if let Some(listener) = listener {
            listener.process(WatchedEvent::session(SessionState::Expired));
        }
    }

    /// Closes the session cleanly, deleting its ephemeral nodes.
    pub fn close(&self) {
        self.end_session();
    }

    /// Simulates a dropped connection: calls fail with `ConnectionLoss`
    /// until [`reconnect`](Self::reconnect); ephemerals are kept.
    pub fn disconnect(&self) {
        let listener = {
            let mut state = self.inner.state.lock();
            match state.sessions.get_mut(&self.session_id) {
                Some(s) if !s.closed && s.connected => {
                    s.connected = false;
                    s.listener.clone()
                }
                _ => None,
            }
        };
        if let Some(listener) = listener {
            listener.process(WatchedEvent::session(SessionState::Disconnected));
        }
    }

    pub fn reconnect(&self) {
        let listener = {
            let mut state = self.inner.state.lock();
            match state.sessions.get_mut(&self.session_id) {
                Some(s) if !s.closed && !s.connected => {
                    s.connected = true;
                    s.listener.clone()
                }
                _ => None,
            }
        };
        if let Some(listener) = listener {
            listener.process(WatchedEvent::session(SessionState::SyncConnected));
        }
    }

    fn end_session(&self) -> Option<Arc<dyn WatchListener>> {
        let mut pending = Vec::new();
        let listener = {
            let mut state = self.inner.state.lock();
            let listener = match state.sessions.get_mut(&self.session_id) {
                Some(s) if !s.closed => {
                    s.closed = true;
                    s.connected = false;
                    s.listener.take()
                }
                _ => return None,
            };
            let mut ephemerals = state.ephemerals_of(self.session_id);
            ephemerals.sort();
            for path in &ephemerals {
                state.remove_node(path, &mut pending);
            }
            debug!(
                session_id = self.session_id,
                removed = ephemerals.len(),
                "in-memory session ended"
            );
            listener
        };
        fire(pending);
        listener
    }
}

impl Drop for MemorySession {
    fn drop(&mut self) {
        self.end_session();
    }
}

#[async_trait]
impl CoordinationStore for MemorySession {
    async fn create_node(
        &self,
        path: &str,
        data: Vec<u8>,
        mode: CreateMode,
        acl: &[Acl],
    ) -> StoreResult<String> {
        let mut pending = Vec::new();
        let realized = {
            let mut state = self.inner.state.lock();
            state.check_session(self.session_id)?;

            let parent = parent_path(path).to_string();
            let parent_node = state
                .nodes
                .get_mut(&parent)
                .ok_or_else(|| StoreError::NoNode(path.to_string()))?;
            if parent_node.stat.ephemeral_owner.is_some() {
                return Err(StoreError::NoChildrenForEphemerals(parent));
            }

            let realized = if mode.is_sequential() {
                let seq = parent_node.next_sequence;
                parent_node.next_sequence += 1;
                format!("{}{:0width$}", path, seq, width = SEQUENCE_WIDTH)
            } else {
                path.to_string()
            };
            validate_path(&realized)?;
            if state.nodes.contains_key(&realized) {
                return Err(StoreError::NodeExists(realized));
            }

            let owner = mode.is_ephemeral().then_some(self.session_id);
            state
                .nodes
                .insert(realized.clone(), MemNode::new(data, acl.to_vec(), owner));
            if let Some(p) = state.nodes.get_mut(&parent) {
                p.children.insert(leaf_name(&realized).to_string());
                p.stat.cversion += 1;
                p.stat.num_children = p.children.len() as i32;
            }

            state.trigger(true, &realized, WatchEventType::NodeCreated, &mut pending);
            state.trigger(false, &parent, WatchEventType::NodeChildrenChanged, &mut pending);
            realized
        };
        fire(pending);
        trace!(path = %realized, ?mode, "created node");
        Ok(realized)
    }

    async fn list_children(
        &self,
        path: &str,
        watch: Watch,
    ) -> StoreResult<Vec<String>> {
        let mut state = self.inner.state.lock();
        state.check_session(self.session_id)?;
        let children: Vec<String> = state
            .nodes
            .get(path)
            .ok_or_else(|| StoreError::NoNode(path.to_string()))?
            .children
            .iter()
            .cloned()
            .collect();
        if let Some(target) = WatchTarget::from_watch(watch, self.session_id) {
            StoreState::add_watch(&mut state.child_watches, path, target);
        }
        Ok(children)
    }

    async fn exists(
        &self,
        path: &str,
        watch: Watch,
    ) -> StoreResult<Option<NodeStat>> {
        let mut state = self.inner.state.lock();
        state.check_session(self.session_id)?;
        let stat = state.nodes.get(path).map(|n| n.stat);
        if let Some(target) = WatchTarget::from_watch(watch, self.session_id) {
            StoreState::add_watch(&mut state.data_watches, path, target);
        }
        Ok(stat)
    }

    async fn delete(
        &self,
        path: &str,
        expected_version: i32,
    ) -> StoreResult<()> {
        let mut pending = Vec::new();
        {
            let mut state = self.inner.state.lock();
            state.check_session(self.session_id)?;
            let node = state
                .nodes
                .get(path)
                .ok_or_else(|| StoreError::NoNode(path.to_string()))?;
            check_version(path, &node.stat, expected_version)?;
            if !node.children.is_empty() {
                return Err(StoreError::NotEmpty(path.to_string()));
            }
            state.remove_node(path, &mut pending);
        }
        fire(pending);
        trace!(path, "deleted node");
        Ok(())
    }

    async fn get_data(
        &self,
        path: &str,
        watch: Watch,
    ) -> StoreResult<(Vec<u8>, NodeStat)> {
        let mut state = self.inner.state.lock();
        state.check_session(self.session_id)?;
        let (data, stat) = state
            .nodes
            .get(path)
            .map(|n| (n.data.clone(), n.stat))
            .ok_or_else(|| StoreError::NoNode(path.to_string()))?;
        if let Some(target) = WatchTarget::from_watch(watch, self.session_id) {
            StoreState::add_watch(&mut state.data_watches, path, target);
        }
        Ok((data, stat))
    }

    async fn set_data(
        &self,
        path: &str,
        data: Vec<u8>,
        expected_version: i32,
    ) -> StoreResult<NodeStat> {
        let mut pending = Vec::new();
        let stat = {
            let mut state = self.inner.state.lock();
            state.check_session(self.session_id)?;
            let node = state
                .nodes
                .get_mut(path)
                .ok_or_else(|| StoreError::NoNode(path.to_string()))?;
            check_version(path, &node.stat, expected_version)?;
            node.stat.data_length = i32::try_from(data.len()).unwrap_or(i32::MAX);
            node.data = data;
            node.stat.version += 1;
            node.stat.mtime = get_now_as_i64();
            let stat = node.stat;
            state.trigger(true, path, WatchEventType::NodeDataChanged, &mut pending);
            stat
        };
        fire(pending);
        Ok(stat)
    }

    async fn remove_watches(
        &self,
        path: &str,
        listener: Arc<dyn WatchListener>,
    ) -> StoreResult<bool> {
        let mut state = self.inner.state.lock();
        state.check_session(self.session_id)?;
        let target = WatchTarget::Listener(listener);
        let from_data = StoreState::remove_listener(&mut state.data_watches, path, &target);
        let from_children = StoreState::remove_listener(&mut state.child_watches, path, &target);
        Ok(from_data || from_children)
    }

    fn register(
        &self,
        listener: Arc<dyn WatchListener>,
    ) {
        let mut state = self.inner.state.lock();
        if let Some(s) = state.sessions.get_mut(&self.session_id) {
            s.listener = Some(listener);
        }
    }
}
