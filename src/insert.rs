//! Typed insert path.
//!
//! Documents are flattened into one row for the fact table plus one row per
//! array element in the matching nested table. Objects become dotted columns
//! of the row they sit in; every leaf lands in the column for its JSON type.
//! Tables and columns missing from the catalog are created in the same
//! transaction as the inserts.

use crate::catalog::{Column, NestedPath, Snowflake, GUID, ORDER, PARENT, UID};
use crate::container::Facts;
use crate::dialect::Dialect;
use crate::error::{SnowError, SnowResult};
use crate::fields::{concat_field, escape_key, relative_field, ROOT};
use crate::meta;
use crate::typed::{encode, JsonType};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap};
use std::ops::Range;

struct TableRow {
    table: String,
    values: Vec<(String, Value)>,
}

/// Flattens documents into typed rows, collecting the columns they need.
struct Flattener<'a> {
    fact: &'a str,
    null_values: &'a [Value],
    ids: Range<i64>,
    rows: Vec<TableRow>,
    columns: Vec<Column>,
    column_index: HashMap<(String, String), usize>,
    /// Nested tables seen, with their path.
    tables: BTreeMap<String, NestedPath>,
}

impl<'a> Flattener<'a> {
    fn new(fact: &'a str, null_values: &'a [Value], ids: Range<i64>) -> Self {
        Self {
            fact,
            null_values,
            ids,
            rows: Vec::new(),
            columns: Vec::new(),
            column_index: HashMap::new(),
            tables: BTreeMap::new(),
        }
    }

    fn next_id(&mut self) -> SnowResult<i64> {
        self.ids
            .next()
            .ok_or_else(|| SnowError::Database("identity block exhausted".to_string()))
    }

    fn is_null(&self, value: &Value) -> bool {
        value.is_null() || self.null_values.contains(value)
    }

    fn column(&mut self, column: Column) {
        let key = (column.es_index.clone(), column.es_column.clone());
        match self.column_index.get(&key) {
            Some(&i) => self.columns[i].multi = self.columns[i].multi.max(column.multi),
            None => {
                self.column_index.insert(key, self.columns.len());
                self.columns.push(column);
            }
        }
    }

    fn document(&mut self, doc: &Value) -> SnowResult<i64> {
        let Value::Object(fields) = doc else {
            return Err(SnowError::InvalidDocument(format!(
                "expected an object, got {}",
                JsonType::of(doc).map(|t| t.to_string()).unwrap_or_else(|| "null".to_string())
            )));
        };
        let id = self.next_id()?;
        let mut values = vec![(UID.to_string(), Value::from(id))];
        if let Some(Value::String(guid)) = fields.get(GUID) {
            values.push((GUID.to_string(), Value::from(guid.as_str())));
        }
        let root = NestedPath::root();
        self.object(fields, ROOT, &root, self.fact.to_string(), id, &mut values, true)?;
        self.rows.push(TableRow {
            table: self.fact.to_string(),
            values,
        });
        Ok(id)
    }

    #[allow(clippy::too_many_arguments)]
    fn object(
        &mut self,
        fields: &Map<String, Value>,
        prefix: &str,
        path: &NestedPath,
        table: String,
        row_id: i64,
        values: &mut Vec<(String, Value)>,
        at_root: bool,
    ) -> SnowResult<()> {
        for (key, value) in fields {
            if at_root && key == GUID && value.is_string() {
                continue;
            }
            if self.is_null(value) {
                continue;
            }
            let name = concat_field(prefix, &escape_key(key));
            match value {
                Value::Object(inner) => {
                    self.object(inner, &name, path, table.clone(), row_id, values, false)?;
                }
                Value::Array(items) => {
                    self.array(items, &name, path, &table, row_id)?;
                }
                leaf => self.leaf(leaf, &name, path, &table, values),
            }
        }
        Ok(())
    }

    fn leaf(
        &mut self,
        value: &Value,
        name: &str,
        path: &NestedPath,
        table: &str,
        values: &mut Vec<(String, Value)>,
    ) {
        let Some(json_type) = JsonType::of(value) else {
            return;
        };
        let es_column = encode(&relative_field(name, path.innermost()), json_type);
        self.column(Column::new(name, es_column.clone(), table, json_type, path.clone()));
        values.push((es_column, value.clone()));
    }

    fn array(
        &mut self,
        items: &[Value],
        name: &str,
        parent_path: &NestedPath,
        parent_table: &str,
        parent_id: i64,
    ) -> SnowResult<()> {
        let elements: Vec<&Value> = items.iter().filter(|v| !self.is_null(v)).collect();
        if elements.is_empty() {
            return Ok(());
        }
        let multi = u32::try_from(elements.len()).unwrap_or(u32::MAX);
        self.column(
            Column::new(
                name,
                encode(&relative_field(name, parent_path.innermost()), JsonType::Array),
                parent_table,
                JsonType::Array,
                parent_path.clone(),
            )
            .with_multi(multi),
        );

        let path = parent_path.child(name);
        let table = path.table_name(self.fact);
        self.tables.insert(table.clone(), path.clone());
        for bookkeeping in [UID, PARENT, ORDER] {
            self.column(Column::new(
                concat_field(name, bookkeeping),
                bookkeeping,
                table.as_str(),
                JsonType::Integer,
                path.clone(),
            ));
        }

        for (order, element) in elements.into_iter().enumerate() {
            let id = self.next_id()?;
            let mut values = vec![
                (UID.to_string(), Value::from(id)),
                (PARENT.to_string(), Value::from(parent_id)),
                (ORDER.to_string(), Value::from(order)),
            ];
            match element {
                Value::Object(fields) => {
                    self.object(fields, name, &path, table.clone(), id, &mut values, false)?;
                }
                Value::Array(_) => {
                    return Err(SnowError::InvalidDocument(format!(
                        "array directly inside array at {}",
                        name
                    )));
                }
                leaf => self.leaf(leaf, name, &path, &table, &mut values),
            }
            self.rows.push(TableRow { table: table.clone(), values });
        }
        Ok(())
    }
}

/// Rows a document will produce: itself plus every non-null array element.
fn row_count(value: &Value) -> usize {
    match value {
        Value::Object(fields) => fields.values().map(row_count).sum(),
        Value::Array(items) => items
            .iter()
            .filter(|v| !v.is_null())
            .map(|v| 1 + row_count(v))
            .sum(),
        _ => 0,
    }
}

/// DDL needed to bring `snowflake` up to `columns`, and the columns that are new
/// or whose cardinality grew.
fn schema_changes(
    dialect: Dialect,
    snowflake: &Snowflake,
    tables: &BTreeMap<String, NestedPath>,
    columns: &[Column],
) -> (Vec<String>, Vec<Column>) {
    let mut ddl = Vec::new();
    let mut changed = Vec::new();

    let mut new_tables: Vec<(&String, &NestedPath)> = tables
        .iter()
        .filter(|(table, _)| snowflake.find(table, None).is_empty())
        .collect();
    new_tables.sort_by_key(|(_, path)| path.depth());
    for (table, _) in &new_tables {
        ddl.push(dialect.create_table(
            table,
            &[(UID, JsonType::Integer), (PARENT, JsonType::Integer), (ORDER, JsonType::Integer)],
            Some(UID),
        ));
    }

    for column in columns {
        let existing = snowflake
            .find(&column.es_index, Some(column.name.as_str()))
            .into_iter()
            .find(|c| c.es_column == column.es_column);
        match existing {
            Some(c) if c.multi >= column.multi => {}
            Some(_) => changed.push(column.clone()),
            None => {
                if !column.is_bookkeeping() {
                    if let Some(sql) = dialect.add_column(&column.es_index, &column.es_column, column.json_type) {
                        ddl.push(sql);
                    }
                }
                changed.push(column.clone());
            }
        }
    }
    (ddl, changed)
}

impl Facts {
    /// Insert documents, returning the identity given to each.
    pub async fn insert(&self, docs: &[Value]) -> SnowResult<Vec<i64>> {
        self.insert_with(docs, &[]).await
    }

    /// Insert documents, treating any of `null_values` as absent.
    pub async fn insert_with(&self, docs: &[Value], null_values: &[Value]) -> SnowResult<Vec<i64>> {
        if docs.is_empty() {
            return Ok(Vec::new());
        }
        let container = &self.container;
        let total: usize = docs.iter().map(|d| 1 + row_count(d)).sum();
        let ids = container.ids().next_n(total).await?;

        let mut flattener = Flattener::new(&self.name, null_values, ids);
        let mut inserted = Vec::with_capacity(docs.len());
        for doc in docs {
            inserted.push(flattener.document(doc)?);
        }

        let _guard = container.schema_lock().lock().await;
        let catalog = container.catalog();
        let snowflake = self.snowflake()?;
        catalog.validate(&self.name, &flattener.columns)?;

        let dialect = container.dialect();
        let (ddl, changed) = schema_changes(dialect, &snowflake, &flattener.tables, &flattener.columns);

        let mut tx = container.db().begin().await?;
        for sql in &ddl {
            tx.execute(sql).await?;
        }
        for column in &changed {
            for sql in meta::save(dialect, column)? {
                tx.execute(&sql).await?;
            }
        }
        for row in &flattener.rows {
            tx.execute(&dialect.insert(&row.table, &row.values)).await?;
        }
        tx.commit().await?;

        for column in changed {
            catalog.add(column)?;
        }
        tracing::info!(
            "Inserted {} documents ({} rows) into {}",
            inserted.len(),
            flattener.rows.len(),
            self.name
        );
        Ok(inserted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn flatten(doc: Value) -> Flattener<'static> {
        let mut flattener = Flattener::new("fact", &[], 1000..2000);
        flattener.document(&doc).unwrap();
        flattener
    }

    #[test]
    fn test_row_count() {
        assert_eq!(row_count(&json!({"a": [1, null, 2], "b": {"c": [{"d": [3]}]}})), 4);
        assert_eq!(row_count(&json!({"a": 1})), 0);
    }

    #[test]
    fn test_flatten_objects_into_columns() {
        let f = flatten(json!({"id": 10, "nested1": {"description": "aaa"}, "_id": "x"}));
        assert_eq!(f.rows.len(), 1);
        assert_eq!(
            f.rows[0].values,
            vec![
                ("__id__".to_string(), json!(1000)),
                ("_id".to_string(), json!("x")),
                ("id.$I".to_string(), json!(10)),
                ("nested1.description.$S".to_string(), json!("aaa")),
            ]
        );
    }

    #[test]
    fn test_flatten_arrays_into_tables() {
        let f = flatten(json!({"a": {"b": [{"x": 1.5}, {"x": 2}, null]}}));
        assert_eq!(f.rows.len(), 3);
        assert_eq!(f.rows[0].table, "fact.a.b");
        assert_eq!(
            f.rows[0].values,
            vec![
                ("__id__".to_string(), json!(1001)),
                ("__parent__".to_string(), json!(1000)),
                ("__order__".to_string(), json!(0)),
                ("x.$N".to_string(), json!(1.5)),
            ]
        );
        assert_eq!(f.rows[1].values[3], ("x.$I".to_string(), json!(2)));
        assert_eq!(f.rows[2].table, "fact");
        let placeholder = f.columns.iter().find(|c| c.json_type == JsonType::Array).unwrap();
        assert_eq!(placeholder.es_column, "a.b.$A");
        assert_eq!(placeholder.multi, 2);
        assert_eq!(f.tables.keys().collect::<Vec<_>>(), vec!["fact.a.b"]);
    }

    #[test]
    fn test_flatten_primitive_array() {
        let f = flatten(json!({"tags": ["x", "y"]}));
        assert_eq!(f.rows[0].values[3], ("$S".to_string(), json!("x")));
        let element = f.columns.iter().find(|c| c.es_column == "$S").unwrap();
        assert_eq!(element.name, "tags");
        assert_eq!(element.nested_path, NestedPath::root().child("tags"));
    }

    #[test]
    fn test_flatten_escapes_keys() {
        let f = flatten(json!({"a.b": 1, "$x": "y"}));
        let names: Vec<&str> = f.rows[0].values.iter().map(|(c, _)| c.as_str()).collect();
        assert_eq!(names, vec!["__id__", "\\$x.$S", "a\\.b.$I"]);
    }

    #[test]
    fn test_nested_arrays_rejected() {
        let mut flattener = Flattener::new("fact", &[], 1000..2000);
        let err = flattener.document(&json!({"a": [[1]]})).unwrap_err();
        assert!(matches!(err, SnowError::InvalidDocument(_)));
        let err = flattener.document(&json!([1])).unwrap_err();
        assert!(matches!(err, SnowError::InvalidDocument(_)));
    }

    #[test]
    fn test_null_values_skipped() {
        let nulls = [json!(""), json!("N/A")];
        let mut flattener = Flattener::new("fact", &nulls, 1000..2000);
        flattener
            .document(&json!({"a": "", "b": "N/A", "c": "ok", "d": null, "e": {}, "f": []}))
            .unwrap();
        assert_eq!(flattener.rows[0].values.len(), 2);
        assert!(flattener.columns.iter().all(|c| c.name == "c"));
    }
}
