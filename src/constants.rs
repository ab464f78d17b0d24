// -
// Reservation protocol

/// Upper bound on a single watcher wait. Watches are one-shot and
/// edge-triggered, so waiters re-poll at least this often even when no
/// notification arrives.
pub const DEFAULT_POLL_CEILING_MS: u64 = 15_000;

/// Separates a reservation node's kind prefix from its sequence suffix
pub const RESERVATION_DELIMITER: char = '_';

/// Width of store-assigned sequence suffixes
pub const SEQUENCE_WIDTH: usize = 10;

/// Version wildcard for unconditional deletes and writes
pub const ANY_VERSION: i32 = -1;

/// Appended to a semaphore's entity path to name the lock that
/// multi-permit takers queue on
pub const MULTI_PERMIT_GATE_SUFFIX: &str = "~gate";

/// Wait-forever marker accepted by [`crate::WaitTimeout::from_millis`]
pub const WAIT_FOREVER_MS: i64 = -1;

// -
// Path scheme

pub const DEFAULT_BASE_PATH: &str = "/d-coord";

/// Path segment under the base path that holds all coordination entities
pub(crate) const COORD_PATH_TOKEN: &str = "coord";

// -
// Client

/// Length of generated owner ids
pub(crate) const OWNER_ID_LENGTH: usize = 16;

/// Capacity of the reservation event broadcast channel
pub(crate) const EVENT_CHANNEL_CAPACITY: usize = 256;
