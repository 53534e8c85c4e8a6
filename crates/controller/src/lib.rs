//! Run controller for dbbench.
//!
//! A run deploys one collector and N workers through an [`Orchestrator`],
//! polls pod phases until the workers finish, fetches the aggregated report
//! from the collector through a [`Dialer`] and removes the deployment again.
//! [`RunController`] repeats that per worker count and repetition and the
//! [`summary`] module renders the resulting min/max/avg tables.
//!
//! [`Orchestrator`]: bench_cluster::Orchestrator
//! [`Dialer`]: bench_cluster::Dialer

pub mod controller;
pub mod error;
pub mod fetch;
pub mod series;
pub mod summary;

pub use controller::{ControllerTimings, Deployment, RunController, RunReport, RunSettings};
pub use error::{ControllerError, Invariant};
pub use fetch::{HttpGetter, RequestError};
pub use series::{InsertSeries, QuerySeries, StepResult};
pub use summary::{format_insert_summary, format_query_summary, format_steps};
