//! Total order over reservation node names.
//!
//! Nodes are ordered by the numeric sequence suffix the store appends; the
//! kind prefix is ignored. Suffixes are parsed as integers, so unpadded
//! names of differing width still order numerically.

use std::cmp::Ordering;

use crate::constants::RESERVATION_DELIMITER;
use crate::CoordinationError;
use crate::ReservationKind;
use crate::Result;

/// One parsed child of an entity path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueEntry {
    /// Child name, relative to the entity path
    pub name: String,
    pub sequence: u64,
    /// `None` for children written with an unknown prefix
    pub kind: Option<ReservationKind>,
}

impl QueueEntry {
    pub fn parse(name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        let sequence = sequence_of(&name)?;
        let kind = ReservationKind::from_node_name(&name);
        Ok(Self {
            name,
            sequence,
            kind,
        })
    }

    pub fn is_exclusive(&self) -> bool {
        self.kind.is_some_and(|k| k.is_exclusive())
    }
}

/// Parses the sequence suffix of a reservation node name.
///
/// Accepts either a bare child name or a full path.
pub fn sequence_of(name: &str) -> Result<u64> {
    let leaf = name.rsplit('/').next().unwrap_or(name);
    leaf.rsplit_once(RESERVATION_DELIMITER)
        .and_then(|(_, suffix)| {
            if suffix.is_empty() || !suffix.bytes().all(|b| b.is_ascii_digit()) {
                None
            } else {
                suffix.parse::<u64>().ok()
            }
        })
        .ok_or_else(|| CoordinationError::MalformedReservationName(name.to_string()).into())
}

/// Compares two reservation node names by sequence number.
pub fn compare(
    a: &str,
    b: &str,
) -> Result<Ordering> {
    Ok(sequence_of(a)?.cmp(&sequence_of(b)?))
}

/// Parses and sorts a child listing into the reservation queue.
///
/// Every name is parsed before sorting, so one malformed sibling fails the
/// whole snapshot instead of producing a partial order.
pub fn sort_queue(children: Vec<String>) -> Result<Vec<QueueEntry>> {
    let mut queue = children
        .into_iter()
        .map(QueueEntry::parse)
        .collect::<Result<Vec<_>>>()?;
    queue.sort_by_key(|e| e.sequence);
    Ok(queue)
}
