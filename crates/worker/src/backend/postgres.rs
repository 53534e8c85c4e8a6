//! PostgreSQL backend (also usable for wire-compatible databases).

use super::sql;
use super::{selected_queries, StorageBackend};
use crate::error::BackendError;
use async_trait::async_trait;
use bench_types::{PrimaryKeyMode, QueryTimings, RunConfig};
use event_generator::{Event, EventStream};
use std::time::Instant;
use tokio_postgres::binary_copy::BinaryCopyInWriter;
use tokio_postgres::types::{ToSql, Type};
use tokio_postgres::{Client, NoTls};
use tracing::{debug, info, warn};

/// Batch size of the prefill bulk path.
const PREFILL_BATCH_SIZE: usize = 1000;
/// Attempts per VALUES-list batch before giving up.
const MAX_BATCH_ATTEMPTS: u32 = 5;

/// Write path of an insert run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertMode {
    /// One INSERT per event, autocommitted.
    Single,
    /// Multi-row VALUES statements, committed every `batch_size` events.
    ValuesLists,
    /// Binary COPY, committed every `batch_size` events.
    Copy,
}

impl InsertMode {
    pub fn select(batch_mode: bool, use_values_lists: bool) -> Self {
        match (batch_mode, use_values_lists) {
            (true, true) => InsertMode::ValuesLists,
            (true, false) => InsertMode::Copy,
            (false, _) => InsertMode::Single,
        }
    }
}

/// Backend writing events into one or four `events` tables.
pub struct PostgresBackend {
    connection_string: String,
    config: RunConfig,
}

impl PostgresBackend {
    /// Create the backend. Requires the `connection_string` option.
    pub fn new(config: RunConfig) -> Result<Self, BackendError> {
        let connection_string = config.require_option("connection_string")?;
        Ok(Self {
            connection_string,
            config,
        })
    }

    async fn connect(&self) -> Result<Client, BackendError> {
        let (client, connection) = tokio_postgres::connect(&self.connection_string, NoTls).await?;

        tokio::spawn(async move {
            if let Err(e) = connection.await {
                tracing::error!("PostgreSQL connection error: {}", e);
            }
        });

        Ok(client)
    }

    fn client_key(&self) -> bool {
        self.config.primary_key == PrimaryKeyMode::Client
    }

    fn tables(&self) -> Vec<&'static str> {
        sql::table_names(self.config.use_multiple_tables)
    }

    /// Bind parameters of one event, in column order.
    fn event_params(&self, event: &Event) -> Vec<Box<dyn ToSql + Sync + Send>> {
        let mut params: Vec<Box<dyn ToSql + Sync + Send>> = Vec::with_capacity(5);
        if self.client_key() {
            params.push(Box::new(event.client_key()));
        }
        params.push(Box::new(event.timestamp));
        params.push(Box::new(event.device_id.clone()));
        params.push(Box::new(event.sequence_number));
        params.push(Box::new(event.temperature as f32));
        params
    }

    /// One autocommitted INSERT per event.
    async fn insert_single(&self, events: EventStream) -> Result<(), BackendError> {
        let client = self.connect().await?;
        let tables = self.tables();
        let mut statements = Vec::with_capacity(tables.len());
        for table in &tables {
            statements.push(
                client
                    .prepare(&sql::insert_statement(table, self.client_key()))
                    .await?,
            );
        }

        for (idx, event) in events.enumerate() {
            let params = self.event_params(&event);
            let refs: Vec<&(dyn ToSql + Sync)> = params
                .iter()
                .map(|p| p.as_ref() as &(dyn ToSql + Sync))
                .collect();
            client
                .execute(&statements[idx % statements.len()], &refs)
                .await?;
        }
        Ok(())
    }

    /// Column types of the COPY stream, in column order.
    fn copy_types(&self) -> Vec<Type> {
        let mut types = Vec::with_capacity(5);
        if self.client_key() {
            types.push(Type::VARCHAR);
        }
        types.extend([Type::INT8, Type::VARCHAR, Type::INT8, Type::FLOAT4]);
        types
    }

    /// Binary COPY into each table, one transaction per `batch_size` events.
    async fn insert_copy(
        &self,
        events: EventStream,
        batch_size: usize,
    ) -> Result<(), BackendError> {
        let client = self.connect().await?;
        let tables = self.tables();
        let mut buffers: Vec<Vec<Event>> = vec![Vec::with_capacity(batch_size); tables.len()];
        let mut pending = 0usize;

        for (idx, event) in events.enumerate() {
            buffers[idx % tables.len()].push(event);
            pending += 1;
            if pending >= batch_size {
                self.copy_batch(&client, &tables, &mut buffers).await?;
                pending = 0;
            }
        }
        if pending > 0 {
            self.copy_batch(&client, &tables, &mut buffers).await?;
        }
        Ok(())
    }

    async fn copy_batch(
        &self,
        client: &Client,
        tables: &[&'static str],
        buffers: &mut [Vec<Event>],
    ) -> Result<(), BackendError> {
        let types = self.copy_types();
        client.batch_execute("BEGIN").await?;
        for (table, rows) in tables.iter().zip(buffers.iter_mut()) {
            if rows.is_empty() {
                continue;
            }
            let sink = client
                .copy_in(sql::copy_statement(table, self.client_key()).as_str())
                .await?;
            let writer = BinaryCopyInWriter::new(sink, &types);
            tokio::pin!(writer);
            for event in rows.drain(..) {
                let params = self.event_params(&event);
                let refs: Vec<&(dyn ToSql + Sync)> = params
                    .iter()
                    .map(|p| p.as_ref() as &(dyn ToSql + Sync))
                    .collect();
                writer.as_mut().write(&refs).await?;
            }
            let copied = writer.finish().await?;
            debug!("Copied {} rows into {}", copied, table);
        }
        client.batch_execute("COMMIT").await?;
        Ok(())
    }

    /// Multi-row VALUES inserts, one transaction per batch across all tables.
    async fn insert_values_lists(
        &self,
        events: EventStream,
        batch_size: usize,
    ) -> Result<(), BackendError> {
        let client = self.connect().await?;
        let tables = self.tables();
        let mut buffers: Vec<Vec<Event>> = vec![Vec::with_capacity(batch_size); tables.len()];
        let mut pending = 0usize;

        for (idx, event) in events.enumerate() {
            buffers[idx % tables.len()].push(event);
            pending += 1;
            if pending >= batch_size {
                self.flush_with_retry(&client, &tables, &mut buffers).await?;
                pending = 0;
            }
        }
        if pending > 0 {
            self.flush_with_retry(&client, &tables, &mut buffers).await?;
        }
        Ok(())
    }

    async fn flush_with_retry(
        &self,
        client: &Client,
        tables: &[&'static str],
        buffers: &mut [Vec<Event>],
    ) -> Result<(), BackendError> {
        let mut attempt = 1;
        loop {
            match self.flush(client, tables, buffers).await {
                Ok(()) => break,
                Err(e) => {
                    // The transaction is aborted; roll back before retrying.
                    if let Err(rollback) = client.batch_execute("ROLLBACK").await {
                        warn!("Rollback of failed insert batch failed: {}", rollback);
                    }
                    if attempt >= MAX_BATCH_ATTEMPTS {
                        return Err(BackendError::RetriesExhausted {
                            attempts: attempt,
                            source: e,
                        });
                    }
                    warn!("Retrying insert batch (attempt {}): {}", attempt, e);
                    attempt += 1;
                }
            }
        }
        for buffer in buffers.iter_mut() {
            buffer.clear();
        }
        Ok(())
    }

    async fn flush(
        &self,
        client: &Client,
        tables: &[&'static str],
        buffers: &[Vec<Event>],
    ) -> Result<(), tokio_postgres::Error> {
        client.batch_execute("BEGIN").await?;
        for (table, rows) in tables.iter().zip(buffers) {
            if rows.is_empty() {
                continue;
            }
            for chunk in rows.chunks(sql::rows_per_statement(self.client_key())) {
                let statement =
                    sql::insert_values_statement(table, self.client_key(), chunk.len());
                let params: Vec<Box<dyn ToSql + Sync + Send>> =
                    chunk.iter().flat_map(|e| self.event_params(e)).collect();
                let refs: Vec<&(dyn ToSql + Sync)> = params
                    .iter()
                    .map(|p| p.as_ref() as &(dyn ToSql + Sync))
                    .collect();
                client.execute(statement.as_str(), &refs).await?;
            }
        }
        client.batch_execute("COMMIT").await
    }
}

#[async_trait]
impl StorageBackend for PostgresBackend {
    fn name(&self) -> &'static str {
        "postgres"
    }

    async fn init(&self) -> Result<(), BackendError> {
        let client = self.connect().await?;

        if self.config.clean_database {
            for table in sql::MULTI_TABLES.iter().chain([&sql::SINGLE_TABLE]) {
                info!("Dropping table: {}", table);
                client.batch_execute(&sql::drop_table(table)).await?;
            }
        }

        if let Some(extensions) = self.config.option_str("install_extensions") {
            for extension in extensions.split(',').map(str::trim) {
                info!("Installing extension: {}", extension);
                client
                    .batch_execute(&format!("CREATE EXTENSION IF NOT EXISTS {extension}"))
                    .await?;
            }
        }

        let pk_column = sql::primary_key_column(self.config.primary_key, self.config.batch_size());
        let constraint = self
            .config
            .option_str("primary_key_constraint")
            .unwrap_or_else(|| "PRIMARY KEY (id)".to_string());
        for table in self.tables() {
            let ddl = sql::create_table(table, &pk_column, &constraint);
            debug!("DDL: {}", ddl);
            client.batch_execute(&ddl).await?;
            info!("Created table {}", table);
        }
        Ok(())
    }

    async fn prefill_events(&self, events: EventStream) -> Result<(), BackendError> {
        info!("Prefilling {} events", events.remaining());
        self.insert_copy(events, PREFILL_BATCH_SIZE).await
    }

    async fn insert_events(&self, events: EventStream) -> Result<(), BackendError> {
        let batch_size = self.config.batch_size();
        info!(
            "Inserting {} events (batch mode: {}, batch size: {})",
            events.remaining(),
            self.config.batch_mode,
            batch_size
        );
        let mode = InsertMode::select(
            self.config.batch_mode,
            self.config.option_flag("use_values_lists"),
        );
        debug!("Insert mode: {:?}", mode);
        match mode {
            InsertMode::ValuesLists => self.insert_values_lists(events, batch_size).await?,
            InsertMode::Copy => self.insert_copy(events, batch_size).await?,
            InsertMode::Single => self.insert_single(events).await?,
        }
        info!("Finished inserting");
        Ok(())
    }

    async fn run_queries(&self) -> Result<QueryTimings, BackendError> {
        let client = self.connect().await?;
        if self.config.option_flag("create_indices") {
            for index in sql::QUERY_INDICES {
                client.batch_execute(index).await?;
            }
        }

        let queries: Vec<(&'static str, &'static str)> = selected_queries(&self.config)
            .into_iter()
            .filter_map(|name| sql::named_query(name).map(|text| (name, text)))
            .collect();
        let mut timings: QueryTimings = queries
            .iter()
            .map(|(name, _)| (name.to_string(), Vec::new()))
            .collect();

        for run in 0..self.config.runs {
            debug!("Query run {}/{}", run + 1, self.config.runs);
            for (name, text) in &queries {
                let start = Instant::now();
                // Rows are fully fetched before the clock stops.
                let rows = client.query(*text, &[]).await?;
                let elapsed = start.elapsed().as_secs_f64();
                debug!("{} returned {} rows in {:.3}s", name, rows.len(), elapsed);
                if let Some(samples) = timings.get_mut(*name) {
                    samples.push(elapsed);
                }
            }
        }
        Ok(timings)
    }
}
