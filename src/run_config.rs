//! Building the [`RunConfig`] handed to every pod of a run.

use crate::config::TargetConfig;
use anyhow::Context;
use bench_types::RunConfig;
use serde_json::{Map, Value};

/// Parse a `key=value` extra option.
///
/// Values that parse as JSON scalars (numbers, booleans, null) keep that
/// type; everything else is a string.
pub fn parse_extra_option(option: &str) -> anyhow::Result<(String, Value)> {
    let (key, raw) = option
        .split_once('=')
        .with_context(|| format!("Extra option '{option}' is not of the form key=value"))?;
    let key = key.trim();
    if key.is_empty() {
        anyhow::bail!("Extra option '{option}' has an empty key");
    }
    let value = match serde_json::from_str::<Value>(raw) {
        Ok(v) if !v.is_object() && !v.is_array() && !v.is_string() => v,
        _ => Value::String(raw.to_string()),
    };
    Ok((key.to_string(), value))
}

/// Merge target settings, command-line fields and extra options, in that
/// order of precedence (later wins), into a run configuration.
pub fn build_run_config(
    target: &TargetConfig,
    fields: Map<String, Value>,
    extra_options: &[String],
) -> anyhow::Result<RunConfig> {
    let mut merged: Map<String, Value> = target
        .iter()
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();
    merged.extend(fields);
    for option in extra_options {
        let (key, value) = parse_extra_option(option)?;
        merged.insert(key, value);
    }
    serde_json::from_value(Value::Object(merged)).context("Invalid run configuration")
}

#[cfg(test)]
mod tests {
    use super::*;
    use bench_types::{PrimaryKeyMode, TaskKind};
    use serde_json::json;

    fn target() -> TargetConfig {
        let mut target = TargetConfig::new();
        target.insert("module".to_string(), json!("postgres"));
        target.insert("connection_string".to_string(), json!("host=db"));
        target.insert("batch_size".to_string(), json!(10));
        target
    }

    #[test]
    fn test_parse_extra_option_types() {
        assert_eq!(
            parse_extra_option("use_values_lists=true").unwrap(),
            ("use_values_lists".to_string(), Value::Bool(true))
        );
        assert_eq!(
            parse_extra_option("batch_size=50").unwrap(),
            ("batch_size".to_string(), json!(50))
        );
        assert_eq!(
            parse_extra_option("queries=count-events,newest-per-device").unwrap(),
            (
                "queries".to_string(),
                json!("count-events,newest-per-device")
            )
        );
        assert_eq!(
            parse_extra_option("connection_string=host=db port=5432").unwrap(),
            ("connection_string".to_string(), json!("host=db port=5432"))
        );
        assert!(parse_extra_option("no-equals-sign").is_err());
        assert!(parse_extra_option("=value").is_err());
    }

    #[test]
    fn test_build_run_config_precedence() {
        let fields = json!({
            "task": "insert",
            "num_inserts": 1000,
            "primary_key": "uuid",
            "batch_size": 20,
        });
        let Value::Object(fields) = fields else {
            unreachable!()
        };
        let config = build_run_config(
            &target(),
            fields,
            &["batch_size=30".to_string(), "create_indices=true".to_string()],
        )
        .unwrap();

        assert_eq!(config.task, TaskKind::Insert);
        assert_eq!(config.module, "postgres");
        assert_eq!(config.num_inserts, 1000);
        assert_eq!(config.primary_key, PrimaryKeyMode::Uuid);
        assert_eq!(config.batch_size, Some(30));
        assert_eq!(config.option_str("connection_string").as_deref(), Some("host=db"));
        assert!(config.option_flag("create_indices"));
    }

    #[test]
    fn test_build_run_config_rejects_bad_values() {
        let fields = json!({"task": "insert", "num_inserts": "many"});
        let Value::Object(fields) = fields else {
            unreachable!()
        };
        assert!(build_run_config(&target(), fields, &[]).is_err());
    }
}
