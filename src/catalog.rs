//! Column catalog.
//!
//! Holds the definition of every column of every table, grouped by the fact
//! table ("snowflake") the table belongs to. The catalog is the single source
//! of truth for schema; planning reads an immutable [`Snowflake`] snapshot, and
//! writers replace the snapshot copy-on-write so a reader never observes a
//! half-applied change.

use crate::error::{SnowError, SnowResult};
use crate::fields::ROOT;
use crate::typed::JsonType;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

/// Row identity column, present in every table.
pub const UID: &str = "__id__";
/// External reference column of a fact table.
pub const GUID: &str = "_id";
/// Foreign key from a nested row to its parent row.
pub const PARENT: &str = "__parent__";
/// Position of a nested row within its parent array.
pub const ORDER: &str = "__order__";

/// Chain of nested tables from the innermost level out to the fact root.
///
/// Entries are absolute field paths, innermost first, and the last entry is
/// always the root sentinel `.`: a column under `nested1.nested2` lives on the
/// path `["nested1.nested2", "nested1", "."]`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NestedPath(Vec<String>);

impl NestedPath {
    /// The fact table itself.
    pub fn root() -> Self {
        Self(vec![ROOT.to_string()])
    }

    /// Build from innermost-first entries; the root sentinel is appended if missing.
    pub fn new(mut entries: Vec<String>) -> Self {
        if entries.last().map(String::as_str) != Some(ROOT) {
            entries.push(ROOT.to_string());
        }
        Self(entries)
    }

    /// Absolute path of the innermost level.
    pub fn innermost(&self) -> &str {
        &self.0[0]
    }

    pub fn is_root(&self) -> bool {
        self.0.len() == 1
    }

    /// Number of one-to-many hops below the fact table.
    pub fn depth(&self) -> usize {
        self.0.len() - 1
    }

    /// The enclosing level, `None` at the root.
    pub fn parent(&self) -> Option<NestedPath> {
        if self.is_root() {
            None
        } else {
            Some(Self(self.0[1..].to_vec()))
        }
    }

    /// A nested level under this one, at absolute path `name`.
    pub fn child(&self, name: &str) -> NestedPath {
        let mut entries = Vec::with_capacity(self.0.len() + 1);
        entries.push(name.to_string());
        entries.extend(self.0.iter().cloned());
        Self(entries)
    }

    /// Levels from innermost out to the root.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    /// Physical table holding this level of `fact`.
    pub fn table_name(&self, fact: &str) -> String {
        if self.is_root() {
            fact.to_string()
        } else {
            format!("{}.{}", fact, self.innermost())
        }
    }

    /// Recover the fact name from a table on this level.
    pub fn fact_of(&self, table: &str) -> Option<String> {
        if self.is_root() {
            return Some(table.to_string());
        }
        table
            .strip_suffix(self.innermost())
            .and_then(|t| t.strip_suffix('.'))
            .filter(|t| !t.is_empty())
            .map(str::to_string)
    }
}

impl fmt::Display for NestedPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}]", self.0.join(", "))
    }
}

/// One physical column (or structural placeholder).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Column {
    /// Logical dotted name, absolute from the fact root.
    pub name: String,
    /// Physical column name, typed and relative to the owning table.
    pub es_column: String,
    /// Physical table name.
    pub es_index: String,
    pub json_type: JsonType,
    pub nested_path: NestedPath,
    /// Largest number of values seen per parent row (arrays), else 1.
    pub multi: u32,
    pub last_updated: DateTime<Utc>,
}

impl Column {
    pub fn new(
        name: impl Into<String>,
        es_column: impl Into<String>,
        es_index: impl Into<String>,
        json_type: JsonType,
        nested_path: NestedPath,
    ) -> Self {
        Self {
            name: name.into(),
            es_column: es_column.into(),
            es_index: es_index.into(),
            json_type,
            nested_path,
            multi: 1,
            last_updated: Utc::now(),
        }
    }

    pub fn with_multi(mut self, multi: u32) -> Self {
        self.multi = multi;
        self
    }

    /// Same slot, ignoring timestamp and cardinality.
    pub fn same_definition(&self, other: &Column) -> bool {
        self.name == other.name
            && self.es_column == other.es_column
            && self.es_index == other.es_index
            && self.json_type == other.json_type
            && self.nested_path == other.nested_path
    }

    /// Identity, parent and order columns.
    pub fn is_bookkeeping(&self) -> bool {
        matches!(self.es_column.as_str(), UID | PARENT | ORDER)
    }
}

/// A fact table, its nested tables and their columns.
#[derive(Debug, Clone)]
pub struct Snowflake {
    fact_name: String,
    columns: Vec<Column>,
    primary_keys: HashMap<String, Vec<String>>,
}

impl Snowflake {
    pub fn new(fact_name: impl Into<String>) -> Self {
        Self {
            fact_name: fact_name.into(),
            columns: Vec::new(),
            primary_keys: HashMap::new(),
        }
    }

    pub fn fact_name(&self) -> &str {
        &self.fact_name
    }

    /// Every column of every table in this snowflake.
    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    /// Every nested path, parents before children; the root comes first.
    pub fn query_paths(&self) -> Vec<NestedPath> {
        let mut paths: Vec<NestedPath> = vec![NestedPath::root()];
        for c in &self.columns {
            if !paths.contains(&c.nested_path) {
                paths.push(c.nested_path.clone());
            }
        }
        paths.sort_by(|a, b| {
            a.depth()
                .cmp(&b.depth())
                .then_with(|| a.innermost().cmp(b.innermost()))
        });
        paths
    }

    pub fn table_name(&self, path: &NestedPath) -> String {
        path.table_name(&self.fact_name)
    }

    /// Columns of one table, optionally only those for one logical field.
    pub fn find(&self, table: &str, field: Option<&str>) -> Vec<Column> {
        self.columns
            .iter()
            .filter(|c| c.es_index == table)
            .filter(|c| field.is_none_or(|f| c.name == f))
            .cloned()
            .collect()
    }

    /// The array placeholder recorded at the parent level of `path`.
    pub fn placeholder(&self, path: &NestedPath) -> Option<&Column> {
        let parent = path.parent()?;
        self.columns.iter().find(|c| {
            c.json_type == JsonType::Array && c.nested_path == parent && c.name == path.innermost()
        })
    }

    /// Columns forming the identity of `table`.
    pub fn primary_keys(&self, table: &str) -> Vec<String> {
        self.primary_keys
            .get(table)
            .cloned()
            .unwrap_or_else(|| vec![UID.to_string()])
    }

    fn add(&mut self, column: Column) -> SnowResult<()> {
        if let Some(existing) = self
            .columns
            .iter_mut()
            .find(|c| c.es_index == column.es_index && c.es_column == column.es_column)
        {
            if existing.json_type != column.json_type {
                return Err(SnowError::conflict(
                    &column.es_index,
                    &column.es_column,
                    existing.json_type,
                    column.json_type,
                ));
            }
            if !existing.same_definition(&column) {
                return Err(SnowError::conflict(
                    &column.es_index,
                    &column.es_column,
                    &existing.name,
                    &column.name,
                ));
            }
            existing.multi = existing.multi.max(column.multi);
            existing.last_updated = existing.last_updated.max(column.last_updated);
            return Ok(());
        }

        if let Some(clash) = self.columns.iter().find(|c| {
            c.nested_path == column.nested_path
                && c.name == column.name
                && c.json_type == column.json_type
        }) {
            return Err(SnowError::conflict(
                &column.es_index,
                &column.name,
                &clash.es_column,
                &column.es_column,
            ));
        }

        self.columns.push(column);
        Ok(())
    }
}

/// All known snowflakes, keyed by fact name.
#[derive(Debug, Default)]
pub struct Catalog {
    snowflakes: RwLock<HashMap<String, Arc<Snowflake>>>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a column definition; re-adding an identical definition only
    /// refreshes its timestamp and cardinality.
    pub fn add(&self, column: Column) -> SnowResult<()> {
        let fact = column
            .nested_path
            .fact_of(&column.es_index)
            .ok_or_else(|| SnowError::UnknownTable(column.es_index.clone()))?;
        let mut snowflakes = self.snowflakes.write().unwrap_or_else(PoisonError::into_inner);
        if !column.nested_path.is_root() && !snowflakes.contains_key(&fact) {
            return Err(SnowError::UnknownTable(fact));
        }
        let entry = snowflakes
            .entry(fact.clone())
            .or_insert_with(|| Arc::new(Snowflake::new(fact)));
        Arc::make_mut(entry).add(column)
    }

    /// Check that `columns` could all be added, without adding them.
    pub fn validate(&self, fact: &str, columns: &[Column]) -> SnowResult<()> {
        let mut snowflake = self
            .snowflake(fact)
            .map(|s| (*s).clone())
            .unwrap_or_else(|| Snowflake::new(fact));
        for column in columns {
            snowflake.add(column.clone())?;
        }
        Ok(())
    }

    /// Columns of `table`, optionally filtered to one logical field.
    pub fn find(&self, table: &str, field: Option<&str>) -> Vec<Column> {
        let snowflakes = self.snowflakes.read().unwrap_or_else(PoisonError::into_inner);
        snowflakes
            .values()
            .flat_map(|s| s.find(table, field))
            .collect()
    }

    /// Forget a fact and every nested table under it.
    pub fn remove_table(&self, fact: &str) -> Option<Arc<Snowflake>> {
        let mut snowflakes = self.snowflakes.write().unwrap_or_else(PoisonError::into_inner);
        snowflakes.remove(fact)
    }

    /// Columns forming the identity of `table`; a single `__id__` by default.
    pub fn primary_keys(&self, table: &str) -> Vec<String> {
        let snowflakes = self.snowflakes.read().unwrap_or_else(PoisonError::into_inner);
        snowflakes
            .values()
            .find(|s| s.primary_keys.contains_key(table))
            .map(|s| s.primary_keys(table))
            .unwrap_or_else(|| vec![UID.to_string()])
    }

    pub fn set_primary_keys(&self, fact: &str, table: &str, keys: Vec<String>) -> SnowResult<()> {
        let mut snowflakes = self.snowflakes.write().unwrap_or_else(PoisonError::into_inner);
        let entry = snowflakes
            .get_mut(fact)
            .ok_or_else(|| SnowError::UnknownTable(fact.to_string()))?;
        Arc::make_mut(entry).primary_keys.insert(table.to_string(), keys);
        Ok(())
    }

    /// Immutable view of one fact's schema.
    pub fn snowflake(&self, fact: &str) -> Option<Arc<Snowflake>> {
        let snowflakes = self.snowflakes.read().unwrap_or_else(PoisonError::into_inner);
        snowflakes.get(fact).cloned()
    }

    pub fn facts(&self) -> Vec<String> {
        let snowflakes = self.snowflakes.read().unwrap_or_else(PoisonError::into_inner);
        let mut facts: Vec<String> = snowflakes.keys().cloned().collect();
        facts.sort();
        facts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn root_column(name: &str, json_type: JsonType) -> Column {
        Column::new(
            name,
            crate::typed::encode(name, json_type),
            "fact",
            json_type,
            NestedPath::root(),
        )
    }

    #[test]
    fn test_nested_path() {
        let nested1 = NestedPath::root().child("nested1");
        let nested2 = nested1.child("nested1.nested2");
        assert_eq!(nested2.depth(), 2);
        assert_eq!(nested2.innermost(), "nested1.nested2");
        assert_eq!(nested2.parent(), Some(nested1.clone()));
        assert_eq!(nested2.table_name("fact"), "fact.nested1.nested2");
        assert_eq!(nested2.fact_of("fact.nested1.nested2"), Some("fact".to_string()));
        assert_eq!(NestedPath::root().table_name("fact"), "fact");
        assert_eq!(nested1.fact_of("other"), None);
    }

    #[test]
    fn test_add_twice_is_noop() {
        let catalog = Catalog::new();
        catalog.add(root_column("name", JsonType::String)).unwrap();
        catalog.add(root_column("name", JsonType::String)).unwrap();
        assert_eq!(catalog.find("fact", None).len(), 1);
    }

    #[test]
    fn test_add_conflict() {
        let catalog = Catalog::new();
        catalog
            .add(Column::new("a", "a", "fact", JsonType::String, NestedPath::root()))
            .unwrap();
        let err = catalog
            .add(Column::new("a", "a", "fact", JsonType::Integer, NestedPath::root()))
            .unwrap_err();
        assert!(matches!(err, SnowError::Conflict { .. }));
    }

    #[test]
    fn test_typed_slots_do_not_conflict() {
        let catalog = Catalog::new();
        catalog.add(root_column("a", JsonType::String)).unwrap();
        catalog.add(root_column("a", JsonType::Integer)).unwrap();
        assert_eq!(catalog.find("fact", Some("a")).len(), 2);
        assert!(catalog.find("fact", Some("b")).is_empty());
        assert!(catalog.find("unknown", None).is_empty());
    }

    #[test]
    fn test_nested_column_needs_fact() {
        let catalog = Catalog::new();
        let path = NestedPath::root().child("a");
        let err = catalog
            .add(Column::new("a.x", "x.$S", "fact.a", JsonType::String, path))
            .unwrap_err();
        assert!(matches!(err, SnowError::UnknownTable(_)));
    }

    #[test]
    fn test_multi_keeps_maximum() {
        let catalog = Catalog::new();
        let path = NestedPath::root().child("a");
        let placeholder =
            Column::new("a", "a.$A", "fact", JsonType::Array, NestedPath::root());
        catalog.add(placeholder.clone().with_multi(3)).unwrap();
        catalog.add(placeholder.with_multi(1)).unwrap();
        let snowflake = catalog.snowflake("fact").unwrap();
        assert_eq!(snowflake.placeholder(&path).unwrap().multi, 3);
    }

    #[test]
    fn test_remove_table_cascades() {
        let catalog = Catalog::new();
        catalog.add(root_column("name", JsonType::String)).unwrap();
        let path = NestedPath::root().child("a");
        catalog
            .add(Column::new("a.x", "x.$S", "fact.a", JsonType::String, path.clone()))
            .unwrap();
        assert_eq!(catalog.snowflake("fact").unwrap().query_paths().len(), 2);
        assert!(catalog.remove_table("fact").is_some());
        assert!(catalog.find("fact.a", None).is_empty());
        assert!(catalog.snowflake("fact").is_none());
        assert!(catalog.remove_table("fact").is_none());
    }

    #[test]
    fn test_primary_keys_default() {
        let catalog = Catalog::new();
        assert_eq!(catalog.primary_keys("fact"), vec![UID.to_string()]);
        catalog.add(root_column("name", JsonType::String)).unwrap();
        catalog
            .set_primary_keys("fact", "fact", vec!["name.$S".to_string()])
            .unwrap();
        assert_eq!(catalog.primary_keys("fact"), vec!["name.$S".to_string()]);
    }

    #[test]
    fn test_snapshot_is_isolated() {
        let catalog = Catalog::new();
        catalog.add(root_column("name", JsonType::String)).unwrap();
        let before = catalog.snowflake("fact").unwrap();
        catalog.add(root_column("size", JsonType::Integer)).unwrap();
        assert_eq!(before.columns().len(), 1);
        assert_eq!(catalog.snowflake("fact").unwrap().columns().len(), 2);
    }
}
