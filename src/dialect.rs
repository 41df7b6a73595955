//! SQL dialects.
//!
//! Everything that differs between engines lives here: identifier quoting,
//! literal rendering, storage type names and the DDL/DML text the rest of
//! the crate executes.

use crate::typed::JsonType;
use serde_json::Value;

/// Supported SQL dialects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Dialect {
    #[default]
    SQLite,
    Postgres,
    MySQL,
}

impl Dialect {
    /// Pick the dialect from a connection URL.
    pub fn from_url(url: &str) -> Option<Self> {
        let scheme = url.split(':').next()?.to_ascii_lowercase();
        match scheme.as_str() {
            "sqlite" => Some(Dialect::SQLite),
            "postgres" | "postgresql" => Some(Dialect::Postgres),
            "mysql" | "mariadb" => Some(Dialect::MySQL),
            _ => None,
        }
    }

    /// Quote an identifier.
    pub fn quote(&self, name: &str) -> String {
        match self {
            Dialect::MySQL => format!("`{}`", name.replace('`', "``")),
            _ => format!("\"{}\"", name.replace('"', "\"\"")),
        }
    }

    /// Quote `alias.column`.
    pub fn qualified(&self, alias: &str, column: &str) -> String {
        format!("{}.{}", alias, self.quote(column))
    }

    /// Render a value as an inline SQL literal.
    pub fn literal(&self, value: &Value) -> String {
        match value {
            Value::Null => "NULL".to_string(),
            Value::Bool(b) => {
                let text = match (self, b) {
                    (Dialect::Postgres, true) => "TRUE",
                    (Dialect::Postgres, false) => "FALSE",
                    (_, true) => "1",
                    (_, false) => "0",
                };
                text.to_string()
            }
            Value::Number(n) => match n.as_i64() {
                Some(i) => i.to_string(),
                None => match n.as_u64() {
                    Some(u) => u.to_string(),
                    None => format!("{:?}", n.as_f64().unwrap_or_default()),
                },
            },
            Value::String(s) => self.string_literal(s),
            other => self.string_literal(&other.to_string()),
        }
    }

    fn string_literal(&self, s: &str) -> String {
        let escaped = s.replace('\'', "''");
        match self {
            Dialect::MySQL => format!("'{}'", escaped.replace('\\', "\\\\")),
            _ => format!("'{}'", escaped),
        }
    }

    /// Storage type for a column of the given JSON type; structural types have none.
    ///
    /// Only Postgres gets a real `BOOLEAN`; elsewhere booleans are stored as
    /// 0/1 integers, which the `Any` driver can decode.
    pub fn storage_type(&self, json_type: JsonType) -> Option<&'static str> {
        match json_type {
            JsonType::Boolean => match self {
                Dialect::Postgres => Some("BOOLEAN"),
                Dialect::SQLite | Dialect::MySQL => Some("BIGINT"),
            },
            JsonType::Integer => Some("BIGINT"),
            JsonType::Number => Some("DOUBLE PRECISION"),
            JsonType::String => Some("TEXT"),
            JsonType::Object | JsonType::Array | JsonType::Exists => None,
        }
    }

    /// Generate CREATE TABLE SQL.
    pub fn create_table(&self, table: &str, columns: &[(&str, JsonType)], unique: Option<&str>) -> String {
        let defs: Vec<String> = columns
            .iter()
            .filter_map(|(name, json_type)| {
                let sql_type = self.storage_type(*json_type)?;
                let mut line = format!("{} {}", self.quote(name), sql_type);
                if unique == Some(*name) {
                    line.push_str(" PRIMARY KEY");
                }
                Some(line)
            })
            .collect();
        format!("CREATE TABLE {} ({})", self.quote(table), defs.join(", "))
    }

    /// Generate DROP TABLE SQL.
    pub fn drop_table(&self, table: &str) -> String {
        format!("DROP TABLE IF EXISTS {}", self.quote(table))
    }

    /// Generate ALTER TABLE ... ADD COLUMN SQL.
    pub fn add_column(&self, table: &str, column: &str, json_type: JsonType) -> Option<String> {
        let sql_type = self.storage_type(json_type)?;
        Some(format!(
            "ALTER TABLE {} ADD COLUMN {} {}",
            self.quote(table),
            self.quote(column),
            sql_type
        ))
    }

    /// Generate INSERT SQL for one row.
    pub fn insert(&self, table: &str, values: &[(String, Value)]) -> String {
        let cols: Vec<String> = values.iter().map(|(c, _)| self.quote(c)).collect();
        let vals: Vec<String> = values.iter().map(|(_, v)| self.literal(v)).collect();
        format!(
            "INSERT INTO {} ({}) VALUES ({})",
            self.quote(table),
            cols.join(", "),
            vals.join(", ")
        )
    }

    /// Query counting tables named `table`, aliased `n`.
    pub fn table_exists(&self, table: &str) -> String {
        let name = self.string_literal(table);
        match self {
            Dialect::SQLite => format!(
                "SELECT COUNT(*) AS n FROM sqlite_master WHERE type = 'table' AND name = {}",
                name
            ),
            Dialect::Postgres => format!(
                "SELECT COUNT(*) AS n FROM information_schema.tables WHERE table_schema = current_schema() AND table_name = {}",
                name
            ),
            Dialect::MySQL => format!(
                "SELECT COUNT(*) AS n FROM information_schema.tables WHERE table_schema = DATABASE() AND table_name = {}",
                name
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_from_url() {
        assert_eq!(Dialect::from_url("sqlite::memory:"), Some(Dialect::SQLite));
        assert_eq!(Dialect::from_url("postgres://localhost/db"), Some(Dialect::Postgres));
        assert_eq!(Dialect::from_url("mysql://root@localhost/db"), Some(Dialect::MySQL));
        assert_eq!(Dialect::from_url("redis://localhost"), None);
    }

    #[test]
    fn test_quote() {
        assert_eq!(Dialect::SQLite.quote("a.$S"), "\"a.$S\"");
        assert_eq!(Dialect::Postgres.quote("we\"ird"), "\"we\"\"ird\"");
        assert_eq!(Dialect::MySQL.quote("a.$S"), "`a.$S`");
    }

    #[test]
    fn test_literal() {
        let d = Dialect::SQLite;
        assert_eq!(d.literal(&json!(10)), "10");
        assert_eq!(d.literal(&json!(3.1415926539)), "3.1415926539");
        assert_eq!(d.literal(&json!(4.0)), "4.0");
        assert_eq!(d.literal(&json!("it's")), "'it''s'");
        assert_eq!(d.literal(&json!(true)), "1");
        assert_eq!(Dialect::Postgres.literal(&json!(false)), "FALSE");
        assert_eq!(d.literal(&json!(null)), "NULL");
        assert_eq!(Dialect::MySQL.literal(&json!("a\\b")), "'a\\\\b'");
    }

    #[test]
    fn test_create_table() {
        let sql = Dialect::SQLite.create_table(
            "fact",
            &[("__id__", JsonType::Integer), ("_id", JsonType::String), ("x", JsonType::Object)],
            Some("__id__"),
        );
        assert_eq!(sql, "CREATE TABLE \"fact\" (\"__id__\" BIGINT PRIMARY KEY, \"_id\" TEXT)");
    }

    #[test]
    fn test_boolean_storage() {
        assert_eq!(Dialect::SQLite.storage_type(JsonType::Boolean), Some("BIGINT"));
        assert_eq!(Dialect::MySQL.storage_type(JsonType::Boolean), Some("BIGINT"));
        assert_eq!(Dialect::Postgres.storage_type(JsonType::Boolean), Some("BOOLEAN"));
    }

    #[test]
    fn test_insert() {
        let sql = Dialect::SQLite.insert(
            "fact.nested1",
            &[("__id__".to_string(), json!(1000)), ("about.$S".to_string(), json!("a"))],
        );
        assert_eq!(
            sql,
            "INSERT INTO \"fact.nested1\" (\"__id__\", \"about.$S\") VALUES (1000, 'a')"
        );
    }

    #[test]
    fn test_add_column_skips_structural() {
        assert!(Dialect::SQLite.add_column("fact", "a.$A", JsonType::Array).is_none());
        assert_eq!(
            Dialect::SQLite.add_column("fact", "a.$N", JsonType::Number).unwrap(),
            "ALTER TABLE \"fact\" ADD COLUMN \"a.$N\" DOUBLE PRECISION"
        );
    }
}
