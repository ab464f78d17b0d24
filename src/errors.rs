//! Coordination Error Hierarchy
//!
//! Defines the error types surfaced by the reservation protocol, categorized
//! by where the failure originates: the remote store, local configuration, or
//! a violated coordination contract.

use config::ConfigError;

use crate::ReservationKind;
use crate::StoreError;

#[doc(hidden)]
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Remote store failures (connection loss, missing nodes, version conflicts)
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Configuration loading and validation failures
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Reservation protocol contract violations and acquisition outcomes
    #[error(transparent)]
    Coordination(#[from] CoordinationError),

    /// Node payload encoding failures
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Unrecoverable failures requiring caller intervention
    #[error("Fatal error: {0}")]
    Fatal(String),
}

#[derive(Debug, thiserror::Error)]
pub enum CoordinationError {
    /// Wait timeout must be -1 (no limit) or >= 0
    #[error("Invalid wait timeout {0}ms: must be -1 (no limit) or >= 0")]
    InvalidWaitTimeout(i64),

    /// Semaphore permit counts must be positive
    #[error("Invalid permit count {permits} for {entity_path}")]
    InvalidPermits { entity_path: String, permits: u32 },

    /// A kind-specific operation received the wrong reservation kind
    #[error("Invalid reservation kind: expected {expected}, got {actual}")]
    WrongReservationKind {
        expected: ReservationKind,
        actual: ReservationKind,
    },

    /// A sibling node name carries no parseable sequence suffix.
    ///
    /// This is a local bug (or foreign data under an entity path) and is
    /// never retried.
    #[error("Malformed reservation node name: {0}")]
    MalformedReservationName(String),

    /// Entity names and store paths must be absolute with no empty segments
    #[error("Invalid path: {0}")]
    InvalidPath(String),

    /// An interruptible acquisition was cancelled by its caller
    #[error("Interrupted while waiting: owner_id={owner_id}, entity_path={entity_path}")]
    Interrupted { owner_id: String, entity_path: String },

    /// Release requested on a handle that holds nothing
    #[error("Handle does not hold {entity_path}")]
    NotHeld { entity_path: String },

    /// A wait-forever acquisition gave up (shutdown or remote failure)
    #[error("Could not acquire {kind} reservation on {entity_path}")]
    NotAcquired {
        entity_path: String,
        kind: ReservationKind,
    },

    /// The handle was destroyed and can no longer acquire
    #[error("Handle for {entity_path} has been destroyed")]
    HandleDestroyed { entity_path: String },

    /// A configured semaphore was requested before its pool size was written
    #[error("Permit pool size is not configured for {0}")]
    PermitPoolNotConfigured(String),
}

impl Error {
    /// True when the error is an interrupt propagated to the caller
    pub fn is_interrupted(&self) -> bool {
        matches!(self, Error::Coordination(CoordinationError::Interrupted { .. }))
    }
}
