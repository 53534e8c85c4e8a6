//! Pluggable storage backends.
//!
//! A backend is chosen once per process from the `module` tag of the run
//! configuration and never re-selected.

mod memory;
mod postgres;
pub mod sql;

pub use memory::MemoryBackend;
pub use postgres::PostgresBackend;

use crate::error::BackendError;
use async_trait::async_trait;
use bench_types::{QueryTimings, RunConfig};
use event_generator::EventStream;
use std::sync::Arc;

/// Names of the query benchmark, in execution order.
pub const NAMED_QUERIES: [&str; 5] = [
    "count-events",
    "temperature-min-max",
    "temperature-stats",
    "temperature-stats-per-device",
    "newest-per-device",
];

/// The storage system under test.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Module tag this backend is registered under.
    fn name(&self) -> &'static str;

    /// Prepare the backend for an insert run. Called once, by the collector.
    async fn init(&self) -> Result<(), BackendError>;

    /// Bulk path used by the prefill phase.
    async fn prefill_events(&self, events: EventStream) -> Result<(), BackendError> {
        self.insert_events(events).await
    }

    /// Insert every event of the stream, returning once all are stored.
    async fn insert_events(&self, events: EventStream) -> Result<(), BackendError>;

    /// Run the named-query set the configured number of times.
    async fn run_queries(&self) -> Result<QueryTimings, BackendError>;
}

/// Instantiate the backend named by `config.module`.
pub fn create_backend(config: &RunConfig) -> Result<Arc<dyn StorageBackend>, BackendError> {
    match config.module.as_str() {
        "postgres" | "postgresql" => Ok(Arc::new(PostgresBackend::new(config.clone())?)),
        "memory" => Ok(Arc::new(MemoryBackend::from_config(config))),
        other => Err(BackendError::UnknownModule(other.to_string())),
    }
}

/// Query names selected by the optional comma-separated `queries` option.
pub fn selected_queries(config: &RunConfig) -> Vec<&'static str> {
    match config.option_str("queries") {
        Some(filter) => {
            let wanted: Vec<&str> = filter.split(',').map(str::trim).collect();
            NAMED_QUERIES
                .iter()
                .copied()
                .filter(|name| wanted.contains(name))
                .collect()
        }
        None => NAMED_QUERIES.to_vec(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bench_types::TaskKind;

    #[test]
    fn test_create_backend_by_tag() {
        let config = RunConfig::new(TaskKind::Insert, "memory");
        assert_eq!(create_backend(&config).unwrap().name(), "memory");

        let mut config = RunConfig::new(TaskKind::Insert, "postgres");
        config
            .options
            .insert("connection_string".to_string(), "host=localhost".into());
        assert_eq!(create_backend(&config).unwrap().name(), "postgres");
    }

    #[test]
    fn test_create_backend_errors() {
        let config = RunConfig::new(TaskKind::Insert, "cassandra");
        assert!(matches!(
            create_backend(&config),
            Err(BackendError::UnknownModule(m)) if m == "cassandra"
        ));

        let config = RunConfig::new(TaskKind::Insert, "postgres");
        assert!(matches!(create_backend(&config), Err(BackendError::Config(_))));
    }

    #[test]
    fn test_selected_queries_filter() {
        let mut config = RunConfig::new(TaskKind::Query, "memory");
        assert_eq!(selected_queries(&config).len(), NAMED_QUERIES.len());

        config.options.insert(
            "queries".to_string(),
            "newest-per-device, count-events,unknown".into(),
        );
        assert_eq!(
            selected_queries(&config),
            vec!["count-events", "newest-per-device"]
        );
    }
}
