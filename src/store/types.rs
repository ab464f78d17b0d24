use std::fmt;
use std::sync::Arc;

/// Statistics about a store node, similar to the UNIX `stat` structure.
///
/// Only the fields the reservation protocol and the in-memory store need are
/// carried; `num_children` drives the semaphore fast path.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Default)]
pub struct NodeStat {
    /// Milliseconds since epoch when the node was created.
    pub ctime: i64,
    /// Milliseconds since epoch when the node was last modified.
    pub mtime: i64,
    /// The number of changes to the data of the node.
    pub version: i32,
    /// The number of changes to the children of the node.
    pub cversion: i32,
    /// The session id of the owner of this node, if it is ephemeral.
    pub ephemeral_owner: Option<u64>,
    /// The length of the data field of the node.
    pub data_length: i32,
    /// The number of children this node has.
    pub num_children: i32,
}

/// Determines how a node is created in the store.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CreateMode {
    /// Survives the creating session.
    Persistent,
    /// Deleted by the store when the creating session ends.
    Ephemeral,
    /// Persistent, with a unique, strictly increasing 10-digit suffix scoped
    /// to the parent path.
    PersistentSequential,
    /// Ephemeral and sequential. Reservation nodes use this mode.
    EphemeralSequential,
}

impl CreateMode {
    pub fn is_ephemeral(&self) -> bool {
        matches!(self, CreateMode::Ephemeral | CreateMode::EphemeralSequential)
    }

    pub fn is_sequential(&self) -> bool {
        matches!(self, CreateMode::PersistentSequential | CreateMode::EphemeralSequential)
    }
}

/// Access control entry attached to created nodes.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Acl {
    /// Bitwise OR of the `Acl::*` permission constants.
    pub perms: u32,
    pub scheme: String,
    pub id: String,
}

impl Acl {
    pub const READ: u32 = 1 << 0;
    pub const WRITE: u32 = 1 << 1;
    pub const CREATE: u32 = 1 << 2;
    pub const DELETE: u32 = 1 << 3;
    pub const ADMIN: u32 = 1 << 4;
    pub const ALL: u32 = Self::READ | Self::WRITE | Self::CREATE | Self::DELETE | Self::ADMIN;

    /// Fully open ACL: anyone may do anything.
    pub fn open_unsafe() -> Vec<Acl> {
        vec![Acl {
            perms: Self::ALL,
            scheme: "world".to_string(),
            id: "anyone".to_string(),
        }]
    }

    /// Read-only ACL for everyone.
    pub fn read_unsafe() -> Vec<Acl> {
        vec![Acl {
            perms: Self::READ,
            scheme: "world".to_string(),
            id: "anyone".to_string(),
        }]
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum WatchEventType {
    /// Session state change; carries no path.
    None,
    NodeCreated,
    NodeDeleted,
    NodeDataChanged,
    NodeChildrenChanged,
}

/// Session state reported alongside every watch event.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SessionState {
    SyncConnected,
    Disconnected,
    Expired,
}

/// One-shot notification delivered to a [`WatchListener`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WatchedEvent {
    pub event_type: WatchEventType,
    pub session_state: SessionState,
    pub path: Option<String>,
}

impl WatchedEvent {
    pub fn node(
        event_type: WatchEventType,
        path: impl Into<String>,
    ) -> Self {
        Self {
            event_type,
            session_state: SessionState::SyncConnected,
            path: Some(path.into()),
        }
    }

    pub fn session(state: SessionState) -> Self {
        Self {
            event_type: WatchEventType::None,
            session_state: state,
            path: None,
        }
    }
}

/// Receives watch notifications on the store's callback path.
///
/// Implementations must not block: the store invokes `process` inline.
pub trait WatchListener: Send + Sync {
    fn process(
        &self,
        event: WatchedEvent,
    );
}

/// Watch registration passed along with a read.
#[derive(Clone, Default)]
pub enum Watch {
    /// Read without leaving a watch.
    #[default]
    None,
    /// Route the notification to the session's registered default listener.
    Default,
    /// Route the notification to a specific listener.
    Listener(Arc<dyn WatchListener>),
}

impl Watch {
    pub fn listener(listener: Arc<dyn WatchListener>) -> Self {
        Watch::Listener(listener)
    }

    pub fn is_none(&self) -> bool {
        matches!(self, Watch::None)
    }
}

impl fmt::Debug for Watch {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        match self {
            Watch::None => write!(f, "Watch::None"),
            Watch::Default => write!(f, "Watch::Default"),
            Watch::Listener(_) => write!(f, "Watch::Listener"),
        }
    }
}
