/// Remote store failures, modelled on the ZooKeeper result codes the
/// reservation protocol distinguishes.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// Node (or a parent of the node being created) does not exist
    #[error("No node: {0}")]
    NoNode(String),

    /// Node already exists at the requested path
    #[error("Node exists: {0}")]
    NodeExists(String),

    /// Expected version did not match the node's current version
    #[error("Bad version for {path}: expected {expected}, actual {actual}")]
    BadVersion {
        path: String,
        expected: i32,
        actual: i32,
    },

    /// Delete refused because the node still has children
    #[error("Node not empty: {0}")]
    NotEmpty(String),

    /// Ephemeral nodes may not have children
    #[error("Ephemeral node may not have children: {0}")]
    NoChildrenForEphemerals(String),

    /// Connection to the store was lost mid-operation
    #[error("Connection lost")]
    ConnectionLoss,

    /// The session owning this client has expired
    #[error("Session expired")]
    SessionExpired,

    /// The store did not answer in time
    #[error("Operation timed out")]
    OperationTimeout,

    #[error("Store error: {0}")]
    Other(String),
}

impl StoreError {
    /// Errors a later attempt may not see again
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::ConnectionLoss | StoreError::OperationTimeout)
    }

    pub fn is_no_node(&self) -> bool {
        matches!(self, StoreError::NoNode(_))
    }
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;
