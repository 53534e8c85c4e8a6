//! The benchmark configuration file.
//!
//! ```yaml
//! namespace: default
//! image: dbbench:latest
//! targets:
//!   local-pg:
//!     module: postgres
//!     connection_string: host=postgres user=bench
//! ```

pub mod duration;

pub use duration::{parse_duration, parse_timeout};

use anyhow::Context;
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::Path;

/// Settings of one target database, passed to the workers verbatim.
pub type TargetConfig = BTreeMap<String, Value>;

#[derive(Debug, Clone, Deserialize)]
pub struct BenchConfig {
    #[serde(default = "default_namespace")]
    pub namespace: String,
    #[serde(default = "default_image")]
    pub image: String,
    #[serde(default)]
    pub targets: BTreeMap<String, TargetConfig>,
}

fn default_namespace() -> String {
    "default".to_string()
}

fn default_image() -> String {
    "dbbench:latest".to_string()
}

impl BenchConfig {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::from_yaml(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))
    }

    pub fn from_yaml(yaml: &str) -> anyhow::Result<Self> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    /// Look up a target; it must name its backend `module`.
    pub fn target(&self, name: &str) -> anyhow::Result<&TargetConfig> {
        let target = self.targets.get(name).with_context(|| {
            let known: Vec<&str> = self.targets.keys().map(String::as_str).collect();
            format!("Unknown target '{name}' (configured: {})", known.join(", "))
        })?;
        match target.get("module") {
            Some(Value::String(_)) => Ok(target),
            _ => anyhow::bail!("Target '{name}' is missing required key 'module'"),
        }
    }
}
