//! In-process backend for local runs and tests.

use super::{selected_queries, StorageBackend, NAMED_QUERIES};
use crate::error::BackendError;
use async_trait::async_trait;
use bench_types::{QueryTimings, RunConfig};
use event_generator::{Event, EventStream};
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use std::time::Instant;

/// Keeps events in a vector; queries are evaluated by scanning it.
pub struct MemoryBackend {
    events: Mutex<Vec<Event>>,
    runs: u32,
    queries: Vec<&'static str>,
}

impl MemoryBackend {
    /// Backend timing every named query `runs` times.
    pub fn new(runs: u32) -> Self {
        Self {
            events: Mutex::new(Vec::new()),
            runs,
            queries: NAMED_QUERIES.to_vec(),
        }
    }

    /// Backend honouring the `runs` count and `queries` filter of a run configuration.
    pub fn from_config(config: &RunConfig) -> Self {
        Self {
            queries: selected_queries(config),
            ..Self::new(config.runs)
        }
    }

    /// Number of stored events.
    pub fn len(&self) -> usize {
        self.events.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Copy of the stored events.
    pub fn events(&self) -> Vec<Event> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn evaluate(name: &str, events: &[Event]) -> usize {
        match name {
            "count-events" => events.len(),
            "temperature-min-max" | "temperature-stats" => {
                let (min, max) = events.iter().fold((f64::MAX, f64::MIN), |(lo, hi), e| {
                    (lo.min(e.temperature), hi.max(e.temperature))
                });
                usize::from(min <= max)
            }
            "temperature-stats-per-device" => {
                let mut per_device: HashMap<&str, (f64, usize)> = HashMap::new();
                for e in events {
                    let entry = per_device.entry(e.device_id.as_str()).or_insert((0.0, 0));
                    entry.0 += e.temperature;
                    entry.1 += 1;
                }
                per_device.len()
            }
            "newest-per-device" => {
                let mut newest: HashMap<&str, &Event> = HashMap::new();
                for e in events {
                    let entry = newest.entry(e.device_id.as_str()).or_insert(e);
                    if e.timestamp > entry.timestamp {
                        *entry = e;
                    }
                }
                newest.len()
            }
            _ => 0,
        }
    }
}

#[async_trait]
impl StorageBackend for MemoryBackend {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn init(&self) -> Result<(), BackendError> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
        Ok(())
    }

    async fn insert_events(&self, events: EventStream) -> Result<(), BackendError> {
        let mut store = self.events.lock().unwrap_or_else(PoisonError::into_inner);
        store.extend(events);
        Ok(())
    }

    async fn run_queries(&self) -> Result<QueryTimings, BackendError> {
        let store = self.events.lock().unwrap_or_else(PoisonError::into_inner);
        let mut timings: QueryTimings = self
            .queries
            .iter()
            .map(|name| (name.to_string(), Vec::with_capacity(self.runs as usize)))
            .collect();

        for _ in 0..self.runs {
            for name in &self.queries {
                let start = Instant::now();
                std::hint::black_box(Self::evaluate(name, &store));
                if let Some(samples) = timings.get_mut(*name) {
                    samples.push(start.elapsed().as_secs_f64());
                }
            }
        }
        Ok(timings)
    }
}
