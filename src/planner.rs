//! Snowflake query planner.
//!
//! Turns the nested paths of one fact into a single SELECT that LEFT-joins
//! every nested table to its parent and orders the result by the identity of
//! each level, outermost first. The [`QueryPlan`] it returns also tells the
//! [`crate::reconstruct::Reconstructor`] which result columns belong to which
//! level of the output documents.

use crate::catalog::{Catalog, Column, NestedPath, Snowflake, PARENT, UID};
use crate::dialect::Dialect;
use crate::error::{SnowError, SnowResult};
use crate::fields::{property_name, relative_field, startswith_field, ROOT};
use crate::schema::Schema;
use crate::typed::JsonType;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// How a snowflake is rendered into documents.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SnowflakeOptions {
    /// Emit identity and parent columns as document fields.
    pub show_foreign_keys: bool,
    /// Nested paths collapsed into their parent as a single object.
    pub reference_only: Vec<String>,
    /// When non-empty, only fields under these paths are extracted.
    pub include: Vec<String>,
    /// Fields (and nested paths) under these paths are never extracted.
    pub exclude: Vec<String>,
    /// Also collapse nested paths never seen with more than one element.
    pub inline_singletons: bool,
}

impl Default for SnowflakeOptions {
    fn default() -> Self {
        Self {
            show_foreign_keys: true,
            reference_only: Vec::new(),
            include: Vec::new(),
            exclude: Vec::new(),
            inline_singletons: false,
        }
    }
}

/// Which facts a query covers.
#[derive(Debug, Clone, PartialEq)]
pub enum Selection {
    /// Every fact.
    All,
    /// Facts whose `field` holds one of `values`.
    Ids { field: String, values: Vec<Value> },
    /// Facts whose `__id__` is returned by this query.
    SubQuery(String),
}

impl Selection {
    pub fn ids(field: impl Into<String>, values: Vec<Value>) -> Self {
        Selection::Ids {
            field: field.into(),
            values,
        }
    }
}

/// A result column feeding one document field.
#[derive(Debug, Clone)]
pub struct Leaf {
    /// Alias of the table the column is read from.
    pub table_alias: String,
    /// Result column alias.
    pub alias: String,
    pub column: Column,
}

/// A reference-only table folded into a host level.
#[derive(Debug, Clone)]
pub struct Inlined {
    /// Table alias in the query.
    pub alias: String,
    pub primary_key: String,
    /// Result column holding the folded row's identity.
    pub id_alias: String,
}

/// One array level of the output documents.
#[derive(Debug, Clone)]
pub struct Level {
    pub nested_path: NestedPath,
    /// Index of the enclosing level; `None` for the fact itself.
    pub parent: Option<usize>,
    /// Table alias in the query.
    pub alias: String,
    /// Identity column of this level's table.
    pub primary_key: String,
    /// Result column holding this level's row identity.
    pub id_alias: String,
    /// Property path of this level's array inside the parent document.
    pub key: String,
    /// Leaf columns, including those of reference-only tables folded into this level.
    pub leaves: Vec<Leaf>,
    /// Tables folded into this level, in join order.
    pub inlined: Vec<Inlined>,
    pub schema: Schema,
}

/// A planned extraction.
#[derive(Debug, Clone)]
pub struct QueryPlan {
    pub fact_name: String,
    pub sql: String,
    /// Levels in pre-order; every parent precedes its children.
    pub levels: Vec<Level>,
}

struct Join {
    table: String,
    alias: String,
    parent: Option<(String, String)>,
}

/// Plans snowflake queries against a catalog.
pub struct Planner<'a> {
    catalog: &'a Catalog,
    dialect: Dialect,
    options: SnowflakeOptions,
}

impl<'a> Planner<'a> {
    pub fn new(catalog: &'a Catalog, dialect: Dialect) -> Self {
        Self {
            catalog,
            dialect,
            options: SnowflakeOptions::default(),
        }
    }

    pub fn with_options(mut self, options: SnowflakeOptions) -> Self {
        self.options = options;
        self
    }

    pub fn options(&self) -> &SnowflakeOptions {
        &self.options
    }

    fn snowflake(&self, fact: &str) -> SnowResult<Arc<Snowflake>> {
        self.catalog
            .snowflake(fact)
            .filter(|s| !s.columns().is_empty())
            .ok_or_else(|| SnowError::UnknownTable(fact.to_string()))
    }

    /// Plan the query returning every fact in `selection` with all its nested rows.
    pub fn plan(&self, fact: &str, selection: &Selection) -> SnowResult<QueryPlan> {
        let snowflake = self.snowflake(fact)?;
        let paths = snowflake.query_paths();

        let mut joins: Vec<Join> = Vec::new();
        let mut levels: Vec<Level> = Vec::new();
        let mut host_of: HashMap<NestedPath, usize> = HashMap::new();
        let mut alias_of: HashMap<NestedPath, String> = HashMap::new();
        let mut long_aliases = 0;

        let mut stack = vec![NestedPath::root()];
        while let Some(path) = stack.pop() {
            if !path.is_root() && !self.path_wanted(&path) {
                continue;
            }
            let table = snowflake.table_name(&path);
            let alias = format!("__t{}__", joins.len());
            let parent_path = path.parent();
            let parent = parent_path.as_ref().and_then(|p| {
                let pk = identity(&snowflake, p);
                alias_of.get(p).map(|a| (a.clone(), pk))
            });
            if parent_path.is_some() && parent.is_none() {
                continue;
            }

            let level_idx = match &parent_path {
                None => {
                    levels.push(self.level(&snowflake, &path, None, &alias, ROOT.to_string()));
                    levels.len() - 1
                }
                Some(p) => {
                    let host = host_of[p];
                    if self.is_inlined(&snowflake, &path) {
                        let primary_key = identity(&snowflake, &path);
                        levels[host].inlined.push(Inlined {
                            id_alias: format!("{}.{}", alias, primary_key),
                            alias: alias.clone(),
                            primary_key,
                        });
                        host
                    } else {
                        let host_path = levels[host].nested_path.innermost();
                        let key = property_name(&relative_field(path.innermost(), host_path));
                        levels.push(self.level(&snowflake, &path, Some(host), &alias, key));
                        levels.len() - 1
                    }
                }
            };

            for c in snowflake.columns() {
                if c.nested_path == path && !c.json_type.is_structural() && self.column_wanted(c) {
                    levels[level_idx].leaves.push(Leaf {
                        table_alias: alias.clone(),
                        alias: result_alias(&alias, &c.es_column, &mut long_aliases),
                        column: c.clone(),
                    });
                }
            }

            host_of.insert(path.clone(), level_idx);
            alias_of.insert(path.clone(), alias.clone());
            joins.push(Join {
                table,
                alias,
                parent,
            });

            let mut children: Vec<NestedPath> = paths
                .iter()
                .filter(|p| p.parent().as_ref() == Some(&path))
                .cloned()
                .collect();
            // reversed so the stack pops them in name order
            children.sort_by(|a, b| b.innermost().cmp(a.innermost()));
            stack.extend(children);
        }

        let sql = self.build_sql(&snowflake, &joins, &levels, selection)?;
        tracing::debug!("Planned {} levels for {}: {}", levels.len(), fact, sql);
        Ok(QueryPlan {
            fact_name: fact.to_string(),
            sql,
            levels,
        })
    }

    fn level(
        &self,
        snowflake: &Arc<Snowflake>,
        path: &NestedPath,
        parent: Option<usize>,
        alias: &str,
        key: String,
    ) -> Level {
        let primary_key = identity(snowflake, path);
        Level {
            nested_path: path.clone(),
            parent,
            alias: alias.to_string(),
            id_alias: format!("{}.{}", alias, primary_key),
            primary_key,
            key,
            leaves: Vec::new(),
            inlined: Vec::new(),
            schema: Schema::new(path.clone(), snowflake.clone()),
        }
    }

    fn is_inlined(&self, snowflake: &Snowflake, path: &NestedPath) -> bool {
        if self.options.reference_only.iter().any(|r| r == path.innermost()) {
            return true;
        }
        self.options.inline_singletons
            && snowflake.placeholder(path).is_some_and(|c| c.multi <= 1)
    }

    fn path_wanted(&self, path: &NestedPath) -> bool {
        let name = path.innermost();
        if self.options.exclude.iter().any(|e| startswith_field(name, e)) {
            return false;
        }
        self.options.include.is_empty()
            || self
                .options
                .include
                .iter()
                .any(|i| startswith_field(name, i) || startswith_field(i, name))
    }

    fn column_wanted(&self, column: &Column) -> bool {
        if column.is_bookkeeping() {
            return self.options.show_foreign_keys;
        }
        if self.options.exclude.iter().any(|e| startswith_field(&column.name, e)) {
            return false;
        }
        self.options.include.is_empty()
            || self.options.include.iter().any(|i| startswith_field(&column.name, i))
    }

    fn build_sql(
        &self,
        snowflake: &Snowflake,
        joins: &[Join],
        levels: &[Level],
        selection: &Selection,
    ) -> SnowResult<String> {
        let d = self.dialect;

        let mut selected: HashSet<String> = HashSet::new();
        let mut select: Vec<String> = Vec::new();
        let mut push = |alias: &str, column: &str, name: &str| {
            if selected.insert(name.to_string()) {
                select.push(format!("{} AS {}", d.qualified(alias, column), d.quote(name)));
            }
        };
        for level in levels {
            push(&level.alias, &level.primary_key, &level.id_alias);
        }
        for level in levels {
            for inlined in &level.inlined {
                push(&inlined.alias, &inlined.primary_key, &inlined.id_alias);
            }
        }
        for level in levels {
            for leaf in &level.leaves {
                push(&leaf.table_alias, &leaf.column.es_column, &leaf.alias);
            }
        }

        let mut sql = String::from("SELECT ");
        sql.push_str(&select.join(", "));

        for join in joins {
            match &join.parent {
                None => {
                    sql.push_str(&format!(" FROM {} AS {}", d.quote(&join.table), join.alias));
                }
                Some((parent_alias, parent_pk)) => {
                    sql.push_str(&format!(
                        " LEFT JOIN {} AS {} ON {} = {}",
                        d.quote(&join.table),
                        join.alias,
                        d.qualified(&join.alias, PARENT),
                        d.qualified(parent_alias, parent_pk)
                    ));
                }
            }
        }

        if let Some(condition) = self.selection_sql(snowflake, &levels[0], selection)? {
            sql.push_str(" WHERE ");
            sql.push_str(&condition);
        }

        // folded tables sort last so rows of one expanded element stay together
        let order: Vec<String> = levels
            .iter()
            .map(|l| d.qualified(&l.alias, &l.primary_key))
            .chain(
                levels
                    .iter()
                    .flat_map(|l| &l.inlined)
                    .map(|i| d.qualified(&i.alias, &i.primary_key)),
            )
            .collect();
        sql.push_str(" ORDER BY ");
        sql.push_str(&order.join(", "));
        Ok(sql)
    }

    fn selection_sql(
        &self,
        snowflake: &Snowflake,
        root: &Level,
        selection: &Selection,
    ) -> SnowResult<Option<String>> {
        let d = self.dialect;
        match selection {
            Selection::All => Ok(None),
            Selection::SubQuery(query) => Ok(Some(format!(
                "{} IN ({})",
                d.qualified(&root.alias, UID),
                query
            ))),
            Selection::Ids { field, values } => {
                let columns = self.resolve_field(snowflake, root, field)?;
                let mut conditions = Vec::new();
                for c in &columns {
                    let literals: Vec<String> = values
                        .iter()
                        .filter(|v| accepts(c, v))
                        .map(|v| d.literal(v))
                        .collect();
                    if !literals.is_empty() {
                        conditions.push(format!(
                            "{} IN ({})",
                            d.qualified(&root.alias, &c.es_column),
                            literals.join(", ")
                        ));
                    }
                }
                Ok(Some(match conditions.len() {
                    0 => "1 = 0".to_string(),
                    1 => conditions.remove(0),
                    _ => format!("({})", conditions.join(" OR ")),
                }))
            }
        }
    }

    /// Fact-level columns holding `field`.
    fn resolve_field(&self, snowflake: &Snowflake, root: &Level, field: &str) -> SnowResult<Vec<Column>> {
        let columns: Vec<Column> = root
            .schema
            .map_to_sql(field)
            .remove(field)
            .unwrap_or_default()
            .into_iter()
            .filter(|c| c.nested_path.is_root() && !c.json_type.is_structural())
            .collect();
        if columns.is_empty() {
            return Err(SnowError::unknown_field(snowflake.fact_name(), field));
        }
        Ok(columns)
    }

    /// Fact columns holding `field`, in the order a batched walk visits them:
    /// integers, numbers, strings, then booleans.
    pub fn batch_columns(&self, fact: &str, field: &str) -> SnowResult<Vec<Column>> {
        let snowflake = self.snowflake(fact)?;
        let root = self.level(&snowflake, &NestedPath::root(), None, "__t0__", ROOT.to_string());
        let mut columns = self.resolve_field(&snowflake, &root, field)?;
        columns.sort_by_key(|c| batch_rank(c.json_type));
        Ok(columns)
    }

    /// Query for the next `limit` distinct values of `column` after `after`,
    /// ascending, in a result column named `value`.
    pub fn batch_sql(&self, fact: &str, column: &Column, after: Option<&Value>, limit: usize) -> String {
        let d = self.dialect;
        let col = d.quote(&column.es_column);
        let mut sql = format!(
            "SELECT DISTINCT {} AS {} FROM {} WHERE {} IS NOT NULL",
            col,
            d.quote("value"),
            d.quote(fact),
            col
        );
        if let Some(v) = after {
            sql.push_str(&format!(" AND {} > {}", col, d.literal(v)));
        }
        sql.push_str(&format!(" ORDER BY {} LIMIT {}", col, limit));
        sql
    }

    /// Facts whose `column` holds one of `values`.
    ///
    /// Unlike [`Selection::Ids`] this matches the one column only, so a batch
    /// of integers never pulls in facts stored under the number column.
    pub fn batch_selection(&self, fact: &str, column: &Column, values: &[Value]) -> Selection {
        let d = self.dialect;
        let literals: Vec<String> = values.iter().map(|v| d.literal(v)).collect();
        Selection::SubQuery(format!(
            "SELECT {} FROM {} WHERE {} IN ({})",
            d.quote(UID),
            d.quote(fact),
            d.quote(&column.es_column),
            literals.join(", ")
        ))
    }
}

/// Longest result alias every supported engine keeps intact (Postgres truncates at 63 bytes).
const MAX_ALIAS_LEN: usize = 63;

/// Result alias for `column` of table `alias`; long names get a numbered stand-in.
fn result_alias(alias: &str, column: &str, long_aliases: &mut usize) -> String {
    let name = format!("{}.{}", alias, column);
    if name.len() <= MAX_ALIAS_LEN {
        return name;
    }
    *long_aliases += 1;
    format!("{}.__c{}__", alias, long_aliases)
}

/// The identity column of the table at `path`.
fn identity(snowflake: &Snowflake, path: &NestedPath) -> String {
    snowflake
        .primary_keys(&snowflake.table_name(path))
        .into_iter()
        .next()
        .unwrap_or_else(|| UID.to_string())
}

fn batch_rank(json_type: JsonType) -> u8 {
    match json_type {
        JsonType::Integer => 0,
        JsonType::Number => 1,
        JsonType::String => 2,
        _ => 3,
    }
}

/// Types whose values compare with each other in SQL share a group.
pub(crate) fn batch_group(json_type: JsonType) -> u8 {
    match json_type {
        JsonType::Integer | JsonType::Number => 0,
        JsonType::String => 1,
        _ => 2,
    }
}

/// Whether `value` can be compared against `column`.
fn accepts(column: &Column, value: &Value) -> bool {
    match (column.json_type, JsonType::of(value)) {
        (a, Some(b)) if a == b => true,
        (JsonType::Number, Some(JsonType::Integer)) => true,
        _ => false,
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::catalog::{GUID, ORDER};
    use crate::typed::encode;
    use serde_json::json;

    fn bookkeeping(catalog: &Catalog, table: &str, path: &NestedPath) {
        catalog
            .add(Column::new(
                crate::fields::concat_field(path.innermost(), UID),
                UID,
                table,
                JsonType::Integer,
                path.clone(),
            ))
            .unwrap();
        if path.is_root() {
            catalog
                .add(Column::new(GUID, GUID, table, JsonType::String, path.clone()))
                .unwrap();
        } else {
            for name in [PARENT, ORDER] {
                catalog
                    .add(Column::new(
                        crate::fields::concat_field(path.innermost(), name),
                        name,
                        table,
                        JsonType::Integer,
                        path.clone(),
                    ))
                    .unwrap();
            }
        }
    }

    /// fact { id, name, nested1.description, nested1.nested2: [ { about, minutia } ], tags: [..] }
    pub(crate) fn fixture() -> Catalog {
        let catalog = Catalog::new();
        let root = NestedPath::root();
        let nested2 = root.child("nested1.nested2");
        let tags = root.child("tags");
        bookkeeping(&catalog, "fact", &root);
        bookkeeping(&catalog, "fact.nested1.nested2", &nested2);
        bookkeeping(&catalog, "fact.tags", &tags);
        let add = |name: &str, rel: &str, table: &str, t: JsonType, p: &NestedPath| {
            catalog
                .add(Column::new(name, encode(rel, t), table, t, p.clone()))
                .unwrap();
        };
        add("id", "id", "fact", JsonType::Integer, &root);
        add("name", "name", "fact", JsonType::String, &root);
        add("nested1.description", "nested1.description", "fact", JsonType::String, &root);
        catalog
            .add(
                Column::new("nested1.nested2", "nested1.nested2.$A", "fact", JsonType::Array, root.clone())
                    .with_multi(3),
            )
            .unwrap();
        catalog
            .add(Column::new("tags", "tags.$A", "fact", JsonType::Array, root.clone()).with_multi(1))
            .unwrap();
        add("nested1.nested2.about", "about", "fact.nested1.nested2", JsonType::String, &nested2);
        add("nested1.nested2.minutia", "minutia", "fact.nested1.nested2", JsonType::Number, &nested2);
        add("tags", ".", "fact.tags", JsonType::String, &tags);
        catalog
    }

    pub(crate) fn lean() -> SnowflakeOptions {
        SnowflakeOptions {
            show_foreign_keys: false,
            ..Default::default()
        }
    }

    #[test]
    fn test_unknown_table() {
        let catalog = Catalog::new();
        let err = Planner::new(&catalog, Dialect::SQLite)
            .plan("missing", &Selection::All)
            .unwrap_err();
        assert!(matches!(err, SnowError::UnknownTable(name) if name == "missing"));
    }

    #[test]
    fn test_plan_levels() {
        let catalog = fixture();
        let plan = Planner::new(&catalog, Dialect::SQLite)
            .with_options(lean())
            .plan("fact", &Selection::All)
            .unwrap();
        assert_eq!(plan.levels.len(), 3);
        assert_eq!(plan.levels[0].key, ".");
        assert_eq!(plan.levels[1].key, "nested1.nested2");
        assert_eq!(plan.levels[1].parent, Some(0));
        assert_eq!(plan.levels[2].key, "tags");
        assert_eq!(plan.levels[1].id_alias, "__t1__.__id__");
        let root_leaves: Vec<&str> = plan.levels[0]
            .leaves
            .iter()
            .map(|l| l.alias.as_str())
            .collect();
        assert_eq!(
            root_leaves,
            vec!["__t0__._id", "__t0__.id.$I", "__t0__.name.$S", "__t0__.nested1.description.$S"]
        );
    }

    #[test]
    fn test_plan_sql() {
        let catalog = fixture();
        let plan = Planner::new(&catalog, Dialect::SQLite)
            .with_options(lean())
            .plan("fact", &Selection::All)
            .unwrap();
        assert!(plan.sql.starts_with(
            "SELECT __t0__.\"__id__\" AS \"__t0__.__id__\", __t1__.\"__id__\" AS \"__t1__.__id__\""
        ));
        assert!(plan.sql.contains(
            " FROM \"fact\" AS __t0__ LEFT JOIN \"fact.nested1.nested2\" AS __t1__ ON __t1__.\"__parent__\" = __t0__.\"__id__\""
        ));
        assert!(plan.sql.contains("__t1__.\"minutia.$N\" AS \"__t1__.minutia.$N\""));
        assert!(plan.sql.ends_with(
            " ORDER BY __t0__.\"__id__\", __t1__.\"__id__\", __t2__.\"__id__\""
        ));
        assert!(!plan.sql.contains("__parent__\" AS"));
    }

    #[test]
    fn test_show_foreign_keys() {
        let catalog = fixture();
        let plan = Planner::new(&catalog, Dialect::SQLite)
            .plan("fact", &Selection::All)
            .unwrap();
        let nested: Vec<&str> = plan.levels[1]
            .leaves
            .iter()
            .map(|l| l.alias.as_str())
            .collect();
        assert!(nested.contains(&"__t1__.__id__"));
        assert!(nested.contains(&"__t1__.__parent__"));
        assert!(nested.contains(&"__t1__.__order__"));
        assert_eq!(plan.sql.matches("AS \"__t1__.__id__\"").count(), 1);
    }

    #[test]
    fn test_reference_only_inlines() {
        let catalog = fixture();
        let options = SnowflakeOptions {
            reference_only: vec!["tags".to_string()],
            ..lean()
        };
        let plan = Planner::new(&catalog, Dialect::SQLite)
            .with_options(options)
            .plan("fact", &Selection::All)
            .unwrap();
        assert_eq!(plan.levels.len(), 2);
        assert!(plan.levels[0].leaves.iter().any(|l| l.alias == "__t2__.$S"));
        assert_eq!(plan.levels[0].inlined[0].id_alias, "__t2__.__id__");
        assert!(plan.sql.contains("LEFT JOIN \"fact.tags\" AS __t2__"));
        assert!(plan.sql.contains("__t2__.\"__id__\" AS \"__t2__.__id__\""));
        assert!(plan.sql.ends_with(" ORDER BY __t0__.\"__id__\", __t1__.\"__id__\", __t2__.\"__id__\""));
    }

    #[test]
    fn test_long_result_aliases() {
        let catalog = Catalog::new();
        let root = NestedPath::root();
        bookkeeping(&catalog, "fact", &root);
        let long = format!("{}.{}", "a".repeat(40), "b".repeat(40));
        for name in [long.as_str(), "short"] {
            catalog
                .add(Column::new(name, encode(name, JsonType::String), "fact", JsonType::String, root.clone()))
                .unwrap();
        }
        let plan = Planner::new(&catalog, Dialect::Postgres)
            .with_options(lean())
            .plan("fact", &Selection::All)
            .unwrap();
        let aliases: Vec<&str> = plan.levels[0].leaves.iter().map(|l| l.alias.as_str()).collect();
        assert_eq!(aliases, vec!["__t0__._id", "__t0__.__c1__", "__t0__.short.$S"]);
        assert!(plan.sql.contains(&format!("__t0__.\"{}.$S\" AS \"__t0__.__c1__\"", long)));
    }

    #[test]
    fn test_inline_singletons() {
        let catalog = fixture();
        let options = SnowflakeOptions {
            inline_singletons: true,
            ..lean()
        };
        let plan = Planner::new(&catalog, Dialect::SQLite)
            .with_options(options)
            .plan("fact", &Selection::All)
            .unwrap();
        let keys: Vec<&str> = plan.levels.iter().map(|l| l.key.as_str()).collect();
        assert_eq!(keys, vec![".", "nested1.nested2"]);
    }

    #[test]
    fn test_exclude_drops_join() {
        let catalog = fixture();
        let options = SnowflakeOptions {
            exclude: vec!["nested1".to_string()],
            ..lean()
        };
        let plan = Planner::new(&catalog, Dialect::SQLite)
            .with_options(options)
            .plan("fact", &Selection::All)
            .unwrap();
        assert!(!plan.sql.contains("fact.nested1.nested2"));
        assert!(!plan.sql.contains("nested1.description"));
        assert_eq!(plan.levels.len(), 2);
    }

    #[test]
    fn test_include_keeps_ancestors() {
        let catalog = fixture();
        let options = SnowflakeOptions {
            include: vec!["nested1.nested2.about".to_string()],
            ..lean()
        };
        let plan = Planner::new(&catalog, Dialect::SQLite)
            .with_options(options)
            .plan("fact", &Selection::All)
            .unwrap();
        assert_eq!(plan.levels.len(), 2);
        assert!(plan.levels[0].leaves.is_empty());
        assert_eq!(plan.levels[1].leaves.len(), 1);
    }

    #[test]
    fn test_selection_ids() {
        let catalog = fixture();
        let plan = Planner::new(&catalog, Dialect::SQLite)
            .with_options(lean())
            .plan("fact", &Selection::ids("id", vec![json!(10), json!(11), json!(12)]))
            .unwrap();
        assert!(plan.sql.contains(" WHERE __t0__.\"id.$I\" IN (10, 11, 12) ORDER BY"));
    }

    #[test]
    fn test_selection_unknown_field() {
        let catalog = fixture();
        let err = Planner::new(&catalog, Dialect::SQLite)
            .plan("fact", &Selection::ids("nope", vec![json!(1)]))
            .unwrap_err();
        assert!(matches!(err, SnowError::UnknownField { .. }));
    }

    #[test]
    fn test_selection_sub_query() {
        let catalog = fixture();
        let plan = Planner::new(&catalog, Dialect::SQLite)
            .plan("fact", &Selection::SubQuery("SELECT \"__id__\" FROM \"fact\"".to_string()))
            .unwrap();
        assert!(plan
            .sql
            .contains(" WHERE __t0__.\"__id__\" IN (SELECT \"__id__\" FROM \"fact\")"));
    }

    #[test]
    fn test_batch_sql() {
        let catalog = fixture();
        let planner = Planner::new(&catalog, Dialect::SQLite);
        let columns = planner.batch_columns("fact", "id").unwrap();
        assert_eq!(columns.len(), 1);
        assert_eq!(
            planner.batch_sql("fact", &columns[0], Some(&json!(10)), 100),
            "SELECT DISTINCT \"id.$I\" AS \"value\" FROM \"fact\" WHERE \"id.$I\" IS NOT NULL AND \"id.$I\" > 10 ORDER BY \"id.$I\" LIMIT 100"
        );
        assert_eq!(
            planner.batch_selection("fact", &columns[0], &[json!(10), json!(11)]),
            Selection::SubQuery("SELECT \"__id__\" FROM \"fact\" WHERE \"id.$I\" IN (10, 11)".to_string())
        );
    }

    #[test]
    fn test_batch_columns_cover_every_type() {
        let catalog = fixture();
        for t in [JsonType::String, JsonType::Number] {
            catalog
                .add(Column::new("id", encode("id", t), "fact", t, NestedPath::root()))
                .unwrap();
        }
        let columns = Planner::new(&catalog, Dialect::SQLite)
            .batch_columns("fact", "id")
            .unwrap();
        let types: Vec<JsonType> = columns.iter().map(|c| c.json_type).collect();
        assert_eq!(types, vec![JsonType::Integer, JsonType::Number, JsonType::String]);
    }
}
