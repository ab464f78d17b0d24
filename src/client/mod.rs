//! Client module for distributed coordination
//!
//! Provides the components an application talks to:
//! - [`CoordClient`] - Factory for locks and semaphores over one store session
//! - [`CoordClientBuilder`] - Configurable client construction
//! - [`ReservationEvent`] - Revocations and connection changes
//!
//! # Basic Usage
//! ```no_run
//! use std::sync::Arc;
//! use d_coord::{CoordClient, CoordinationStore, InMemoryStore};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() {
//!     let store = InMemoryStore::new();
//!     let session: Arc<dyn CoordinationStore> = store.connect();
//!     let client = CoordClient::builder(session)
//!         .owner_id("report-worker-1")
//!         .build()
//!         .await
//!         .unwrap();
//!
//!     let lock = client.exclusive_lock("jobs/export").unwrap();
//!     let guard = lock.lock_scoped().await.unwrap();
//!     // ... critical section ...
//!     guard.release().await.unwrap();
//!
//!     let pool = client.semaphore("pool/db", 4).unwrap();
//!     let permits = pool.acquire_scoped(2).await.unwrap();
//!     permits.release().await;
//!
//!     client.shutdown().await;
//! }
//! ```

mod builder;
#[allow(clippy::module_inception)]
mod client;
mod event;

pub use builder::*;
pub use client::*;
pub use event::ReservationEvent;
