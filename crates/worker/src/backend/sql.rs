//! SQL generation for the PostgreSQL backend.

use bench_types::PrimaryKeyMode;

/// Tables used in multi-table mode. Events are assigned round-robin by index.
pub const MULTI_TABLES: [&str; 4] = ["events0", "events1", "events2", "events3"];
/// Table used in single-table mode.
pub const SINGLE_TABLE: &str = "events";

const DATA_COLUMNS: [&str; 4] = ["timestamp", "device_id", "sequence_number", "temperature"];

/// Indices created when `create_indices=true`.
pub const QUERY_INDICES: [&str; 2] = [
    "CREATE INDEX IF NOT EXISTS events_device_ts ON events (device_id, timestamp ASC)",
    "CREATE INDEX IF NOT EXISTS events_temp ON events (temperature ASC)",
];

/// Tables written by a run.
pub fn table_names(use_multiple_tables: bool) -> Vec<&'static str> {
    if use_multiple_tables {
        MULTI_TABLES.to_vec()
    } else {
        vec![SINGLE_TABLE]
    }
}

/// Column type of the `id` column for a key mode.
pub fn primary_key_column(mode: PrimaryKeyMode, batch_size: usize) -> String {
    match mode {
        PrimaryKeyMode::Sql => {
            format!("bigint generated always as identity ( start with 1 cache {batch_size} )")
        }
        PrimaryKeyMode::Uuid => "uuid not null default gen_random_uuid()".to_string(),
        PrimaryKeyMode::Db => "serial".to_string(),
        PrimaryKeyMode::Client => "varchar".to_string(),
    }
}

pub fn drop_table(table: &str) -> String {
    format!("DROP TABLE IF EXISTS {table}")
}

pub fn create_table(table: &str, pk_column: &str, constraint: &str) -> String {
    format!(
        "CREATE TABLE IF NOT EXISTS {table} (id {pk_column}, \
         timestamp bigint, device_id varchar, sequence_number bigint, temperature real, \
         {constraint})"
    )
}

fn columns(client_key: bool) -> Vec<&'static str> {
    let mut columns = Vec::with_capacity(5);
    if client_key {
        columns.push("id");
    }
    columns.extend(DATA_COLUMNS);
    columns
}

/// Bind parameters accepted by one statement.
pub const MAX_BIND_PARAMS: usize = u16::MAX as usize;

/// Largest VALUES list that stays within [`MAX_BIND_PARAMS`].
pub fn rows_per_statement(client_key: bool) -> usize {
    MAX_BIND_PARAMS / columns(client_key).len()
}

/// Binary COPY into `table`, columns in insert order.
pub fn copy_statement(table: &str, client_key: bool) -> String {
    format!(
        "COPY {table} ({}) FROM STDIN BINARY",
        columns(client_key).join(", ")
    )
}

/// Single-row INSERT with `$n` placeholders.
pub fn insert_statement(table: &str, client_key: bool) -> String {
    insert_values_statement(table, client_key, 1)
}

/// Multi-row INSERT with `rows` VALUES tuples.
pub fn insert_values_statement(table: &str, client_key: bool, rows: usize) -> String {
    let columns = columns(client_key);
    let width = columns.len();
    let tuples: Vec<String> = (0..rows)
        .map(|row| {
            let placeholders: Vec<String> = (1..=width)
                .map(|col| format!("${}", row * width + col))
                .collect();
            format!("({})", placeholders.join(", "))
        })
        .collect();

    format!(
        "INSERT INTO {table} ({}) VALUES {}",
        columns.join(", "),
        tuples.join(", ")
    )
}

/// SQL text of a named query.
pub fn named_query(name: &str) -> Option<&'static str> {
    match name {
        "count-events" => Some("SELECT count(*) FROM events"),
        "temperature-min-max" => Some("SELECT max(temperature), min(temperature) FROM events"),
        "temperature-stats" => {
            Some("SELECT max(temperature), avg(temperature), min(temperature) FROM events")
        }
        "temperature-stats-per-device" => Some(
            "SELECT device_id, max(temperature), avg(temperature), min(temperature) \
             FROM events GROUP BY device_id",
        ),
        "newest-per-device" => Some(
            "SELECT e.device_id, e.temperature FROM events e \
             JOIN (SELECT device_id, max(timestamp) as ts FROM events GROUP BY device_id) newest \
             ON e.device_id=newest.device_id AND e.timestamp = newest.ts",
        ),
        _ => None,
    }
}
