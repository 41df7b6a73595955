//! The `__columns__` meta table.
//!
//! Mirrors the in-memory catalog so a container opened later sees every
//! column registered earlier.

use crate::catalog::{Catalog, Column, NestedPath};
use crate::dialect::Dialect;
use crate::engine::{Database, Row};
use crate::error::{SnowError, SnowResult};
use crate::typed::JsonType;
use chrono::{DateTime, Utc};
use serde_json::Value;

pub const COLUMNS_TABLE: &str = "__columns__";

const FIELDS: [(&str, JsonType); 7] = [
    ("name", JsonType::String),
    ("es_column", JsonType::String),
    ("es_index", JsonType::String),
    ("json_type", JsonType::String),
    ("nested_path", JsonType::String),
    ("multi", JsonType::Integer),
    ("last_updated", JsonType::String),
];

pub async fn setup(db: &Database) -> SnowResult<()> {
    if !db.table_exists(COLUMNS_TABLE).await? {
        db.execute(&db.dialect().create_table(COLUMNS_TABLE, &FIELDS, None))
            .await?;
    }
    Ok(())
}

/// Statements replacing the stored definition of `column`.
pub fn save(dialect: Dialect, column: &Column) -> SnowResult<[String; 2]> {
    let nested_path = serde_json::to_string(&column.nested_path)?;
    let delete = format!(
        "DELETE FROM {} WHERE {} = {} AND {} = {}",
        dialect.quote(COLUMNS_TABLE),
        dialect.quote("es_index"),
        dialect.literal(&Value::from(column.es_index.as_str())),
        dialect.quote("es_column"),
        dialect.literal(&Value::from(column.es_column.as_str())),
    );
    let insert = dialect.insert(
        COLUMNS_TABLE,
        &[
            ("name".to_string(), Value::from(column.name.as_str())),
            ("es_column".to_string(), Value::from(column.es_column.as_str())),
            ("es_index".to_string(), Value::from(column.es_index.as_str())),
            ("json_type".to_string(), Value::from(column.json_type.to_string())),
            ("nested_path".to_string(), Value::from(nested_path)),
            ("multi".to_string(), Value::from(column.multi)),
            ("last_updated".to_string(), Value::from(column.last_updated.to_rfc3339())),
        ],
    );
    Ok([delete, insert])
}

/// Statement forgetting every column of `tables`.
pub fn remove(dialect: Dialect, tables: &[String]) -> String {
    let names: Vec<String> = tables
        .iter()
        .map(|t| dialect.literal(&Value::from(t.as_str())))
        .collect();
    format!(
        "DELETE FROM {} WHERE {} IN ({})",
        dialect.quote(COLUMNS_TABLE),
        dialect.quote("es_index"),
        names.join(", ")
    )
}

/// Load every stored column into `catalog`, fact tables first.
pub async fn load(db: &Database, catalog: &Catalog) -> SnowResult<usize> {
    let rows = db
        .fetch_all(&format!("SELECT * FROM {}", db.dialect().quote(COLUMNS_TABLE)))
        .await?;
    let mut columns = rows.iter().map(parse).collect::<SnowResult<Vec<Column>>>()?;
    columns.sort_by_key(|c| c.nested_path.depth());
    let loaded = columns.len();
    for column in columns {
        catalog.add(column)?;
    }
    tracing::debug!("Loaded {} catalog columns", loaded);
    Ok(loaded)
}

fn text<'r>(row: &'r Row, field: &str) -> SnowResult<&'r str> {
    row.get(field)
        .and_then(Value::as_str)
        .ok_or_else(|| SnowError::Database(format!("{} row without {}", COLUMNS_TABLE, field)))
}

fn parse(row: &Row) -> SnowResult<Column> {
    let json_type: JsonType = serde_json::from_value(Value::from(text(row, "json_type")?))?;
    let nested_path: NestedPath = serde_json::from_str(text(row, "nested_path")?)?;
    let multi = row
        .get("multi")
        .and_then(Value::as_i64)
        .and_then(|m| u32::try_from(m).ok())
        .unwrap_or(1);
    let last_updated = DateTime::parse_from_rfc3339(text(row, "last_updated")?)
        .map(|t| t.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now());
    Ok(Column {
        name: text(row, "name")?.to_string(),
        es_column: text(row, "es_column")?.to_string(),
        es_index: text(row, "es_index")?.to_string(),
        json_type,
        nested_path,
        multi,
        last_updated,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::UID;

    #[tokio::test]
    async fn test_save_and_load() {
        let db = Database::connect("sqlite::memory:", 1).await.unwrap();
        setup(&db).await.unwrap();
        setup(&db).await.unwrap();

        let root = Column::new(UID, UID, "fact", JsonType::Integer, NestedPath::root());
        let path = NestedPath::root().child("a.b");
        let nested = Column::new("a.b.x", "x.$N", "fact.a.b", JsonType::Number, path).with_multi(1);
        for column in [&nested, &root, &root] {
            for sql in save(db.dialect(), column).unwrap() {
                db.execute(&sql).await.unwrap();
            }
        }

        let catalog = Catalog::new();
        assert_eq!(load(&db, &catalog).await.unwrap(), 2);
        let found = catalog.find("fact.a.b", None);
        assert_eq!(found.len(), 1);
        assert!(found[0].same_definition(&nested));

        db.execute(&remove(db.dialect(), &["fact".to_string(), "fact.a.b".to_string()]))
            .await
            .unwrap();
        assert_eq!(load(&db, &Catalog::new()).await.unwrap(), 0);
    }
}
