//! Fair distributed locks and counting semaphores over a hierarchical,
//! watch-capable coordination store.
//!
//! Every acquisition queues an ephemeral sequential reservation node under
//! the entity's path; the queue order decides who holds what. See
//! [`CoordClient`] for the entry point.

mod cache;
mod client;
mod config;
pub mod constants;
mod errors;
mod handles;
mod reservation;
mod store;
pub mod utils;

pub use cache::*;
pub use client::*;
pub use config::*;
pub use errors::*;
pub use handles::*;
pub use reservation::*;
pub use store::*;
pub use utils::*;


//-----------------------------------------------------------
// Test utils

#[cfg(test)]
pub mod test_utils;
