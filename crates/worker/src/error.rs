//! Error types for the worker and its backends.

use bench_types::ConfigError;
use std::time::Duration;
use thiserror::Error;

/// Errors raised by a storage backend.
#[derive(Error, Debug)]
pub enum BackendError {
    /// PostgreSQL connection or query error.
    #[error("PostgreSQL error: {0}")]
    PostgreSQL(#[from] tokio_postgres::Error),

    /// A batch kept failing after every attempt.
    #[error("Failed to insert batch after {attempts} attempts: {source}")]
    RetriesExhausted {
        attempts: u32,
        #[source]
        source: tokio_postgres::Error,
    },

    /// Backend options are missing or invalid.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// No backend is registered under the requested module tag.
    #[error("Unknown backend module: {0}")]
    UnknownModule(String),
}

/// Errors that terminate a worker without reporting.
#[derive(Error, Debug)]
pub enum WorkerError {
    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),

    #[error("Collector request failed: {0}")]
    Collector(#[from] reqwest::Error),

    /// Only raised when an outer wait cap is configured.
    #[error("Gave up waiting for {what} after {waited:?}")]
    WaitTimeout { what: &'static str, waited: Duration },
}
