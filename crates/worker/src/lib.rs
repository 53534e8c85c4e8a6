//! Worker side of a dbbench run.
//!
//! A worker waits for the collector, optionally takes part in the
//! synchronized prefill phase, runs its measured phase against the backend
//! under test and posts exactly one result to the collector.
//!
//! ```text
//! AwaitingCollector ──▶ Prefilling ──▶ AwaitingBarrier ──▶ Measuring ──▶ Reported
//!          │                                                   ▲
//!          └──────────────── (prefill == 0) ───────────────────┘
//! ```

pub mod backend;
pub mod client;
pub mod coordinator;
pub mod error;

pub use backend::{create_backend, StorageBackend, NAMED_QUERIES};
pub use client::CollectorClient;
pub use coordinator::{WorkerCoordinator, WorkerTimings};
pub use error::{BackendError, WorkerError};
