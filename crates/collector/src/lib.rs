//! Collector for dbbench runs.
//!
//! One collector process lives for the duration of one deployment. It is
//! the prefill barrier for the workers and the place where their results
//! are aggregated into the report the controller retrieves.
//!
//! ```text
//!   worker 1 ─┐  POST /prefill, POST /result
//!   worker 2 ─┼──────────────────────────────▶ ┌──────────────────┐
//!   worker N ─┘  GET /, GET /prefill           │ CollectorStore   │
//!                                              │ (Mutex-guarded)  │
//!   controller ── GET /report ───────────────▶ └──────────────────┘
//! ```
//!
//! Nothing is persisted; restarting the process resets the barrier and
//! the stored results.

pub mod aggregate;
pub mod server;
pub mod store;

pub use aggregate::{aggregate_inserts, aggregate_queries};
pub use server::{router, run_collector, Collector};
pub use store::{CollectorStore, ReportError};
