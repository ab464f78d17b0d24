//! Reservation protocol: node naming and ordering, the one-shot watch
//! bridge, and the acquire / relinquish state machine.

mod kind;
mod manager;
mod ordering;
mod path_scheme;
mod watcher;

pub use kind::*;
pub use manager::*;
pub use ordering::*;
pub use path_scheme::*;
pub use watcher::*;

#[cfg(test)]
mod ordering_test;
#[cfg(test)]
mod path_scheme_test;
