use std::fmt;

use serde::Deserialize;
use serde::Serialize;

use crate::constants::RESERVATION_DELIMITER;

/// The kind of a reservation node.
///
/// The kind travels on the wire as the node-name prefix (`EX_`, `SH_`,
/// `SP_`), so siblings written by other processes can be classified from a
/// plain child listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReservationKind {
    Exclusive,
    Shared,
    Semaphore,
}

impl ReservationKind {
    pub const ALL: [ReservationKind; 3] = [
        ReservationKind::Exclusive,
        ReservationKind::Shared,
        ReservationKind::Semaphore,
    ];

    /// Node-name prefix token, without the delimiter.
    pub fn prefix(&self) -> &'static str {
        match self {
            ReservationKind::Exclusive => "EX",
            ReservationKind::Shared => "SH",
            ReservationKind::Semaphore => "SP",
        }
    }

    /// An exclusive reservation blocks every reservation queued behind it.
    pub fn is_exclusive(&self) -> bool {
        matches!(self, ReservationKind::Exclusive)
    }

    /// Entity bucket under `<base>/coord/`. Read and write reservations
    /// share the `lock` bucket so they queue on one entity path.
    pub fn category(&self) -> &'static str {
        match self {
            ReservationKind::Exclusive | ReservationKind::Shared => "lock",
            ReservationKind::Semaphore => "semaphore",
        }
    }

    /// Recovers the kind of a sibling reservation from its node name.
    ///
    /// Returns `None` for names that carry no known prefix.
    pub fn from_node_name(name: &str) -> Option<Self> {
        let (prefix, _) = name.split_once(RESERVATION_DELIMITER)?;
        Self::ALL.into_iter().find(|k| k.prefix() == prefix)
    }
}

impl fmt::Display for ReservationKind {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        let name = match self {
            ReservationKind::Exclusive => "EXCLUSIVE",
            ReservationKind::Shared => "SHARED",
            ReservationKind::Semaphore => "SEMAPHORE",
        };
        f.write_str(name)
    }
}
