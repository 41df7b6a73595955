//! Extraction configuration, from snowdoc.toml (or a `.json` file).

use crate::error::{SnowError, SnowResult};
use crate::planner::SnowflakeOptions;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub database: DatabaseConfig,
    pub snowflake: SnowflakeConfig,
    pub extract: ExtractConfig,
    /// JSON-lines output file; stdout when absent.
    pub destination: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite::memory:".to_string(),
            max_connections: 5,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SnowflakeConfig {
    pub fact_table: String,
    /// Values treated as absent on ingestion.
    pub null_values: Vec<Value>,
    #[serde(flatten)]
    pub options: SnowflakeOptions,
}

/// Batching of extractions over the fact table.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractConfig {
    /// Fact field walked in ascending order.
    pub field: Option<String>,
    /// Only values strictly greater than this are extracted.
    pub start: Option<Value>,
    /// Distinct field values per batch.
    pub batch: usize,
    /// Custom sub-query returning the `__id__` of every fact to extract.
    pub ids: Option<String>,
}

impl Default for ExtractConfig {
    fn default() -> Self {
        Self {
            field: None,
            start: None,
            batch: 100,
            ids: None,
        }
    }
}

impl Config {
    /// `$CONFIG_DIR/snowdoc/snowdoc.toml`
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("snowdoc").join("snowdoc.toml"))
    }

    pub fn from_file(path: &Path) -> SnowResult<Self> {
        let content = fs::read_to_string(path)?;
        let config = if path.extension().is_some_and(|ext| ext == "json") {
            serde_json::from_str(&content)?
        } else {
            Self::from_toml(&content)?
        };
        tracing::debug!("Loaded config from {}", path.display());
        Ok(config)
    }

    pub fn from_toml(content: &str) -> SnowResult<Self> {
        toml::from_str(content).map_err(|e| SnowError::Config(e.to_string()))
    }

    /// Load `path`, else the default location, else built-in defaults.
    pub fn load(path: Option<&Path>) -> SnowResult<Self> {
        match path {
            Some(path) => Self::from_file(path),
            None => match Self::default_path() {
                Some(path) if path.exists() => Self::from_file(&path),
                _ => Ok(Self::default()),
            },
        }
    }

    /// The configured fact table, which every extraction needs.
    pub fn fact_table(&self) -> SnowResult<&str> {
        if self.snowflake.fact_table.is_empty() {
            return Err(SnowError::Config("snowflake.fact_table is not set".to_string()));
        }
        Ok(&self.snowflake.fact_table)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_defaults() {
        let config = Config::from_toml("").unwrap();
        assert_eq!(config.database.url, "sqlite::memory:");
        assert_eq!(config.database.max_connections, 5);
        assert_eq!(config.extract.batch, 100);
        assert!(config.snowflake.options.show_foreign_keys);
        assert!(!config.snowflake.options.inline_singletons);
        assert!(config.fact_table().is_err());
    }

    #[test]
    fn test_from_toml() {
        let config = Config::from_toml(
            r#"
destination = "out.jsonl"

[database]
url = "sqlite://facts.db"

[snowflake]
fact_table = "fact"
show_foreign_keys = false
reference_only = ["inner1"]
null_values = ["", "N/A"]

[extract]
field = "id"
start = 9
batch = 2
"#,
        )
        .unwrap();
        assert_eq!(config.fact_table().unwrap(), "fact");
        assert!(!config.snowflake.options.show_foreign_keys);
        assert_eq!(config.snowflake.options.reference_only, vec!["inner1".to_string()]);
        assert_eq!(config.snowflake.null_values, vec![json!(""), json!("N/A")]);
        assert_eq!(config.extract.field.as_deref(), Some("id"));
        assert_eq!(config.extract.start, Some(json!(9)));
        assert_eq!(config.extract.batch, 2);
        assert_eq!(config.destination, Some(PathBuf::from("out.jsonl")));
        assert_eq!(config.database.max_connections, 5);
    }

    #[test]
    fn test_bad_toml() {
        let err = Config::from_toml("[database\nurl = 1").unwrap_err();
        assert!(matches!(err, SnowError::Config(_)));
    }
}
