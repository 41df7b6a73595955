//! Schema views.
//!
//! A [`Schema`] looks at a snowflake from one nesting level. It is a pure
//! function of a catalog snapshot and holds no state of its own.

use crate::catalog::{Column, NestedPath, Snowflake, GUID};
use crate::fields::{concat_field, property_name, relative_field, startswith_field};
use crate::typed::untype_field;
use std::collections::BTreeMap;
use std::sync::Arc;

/// All columns of a snowflake, seen from the level `nested_path`.
#[derive(Debug, Clone)]
pub struct Schema {
    nested_path: NestedPath,
    snowflake: Arc<Snowflake>,
}

impl Schema {
    pub fn new(nested_path: NestedPath, snowflake: Arc<Snowflake>) -> Self {
        Self {
            nested_path,
            snowflake,
        }
    }

    pub fn nested_path(&self) -> &NestedPath {
        &self.nested_path
    }

    pub fn snowflake(&self) -> &Arc<Snowflake> {
        &self.snowflake
    }

    /// Physical table of this level.
    pub fn table(&self) -> String {
        self.snowflake.table_name(&self.nested_path)
    }

    /// Every column of the snowflake.
    pub fn columns(&self) -> &[Column] {
        self.snowflake.columns()
    }

    /// Columns stored on the table of this level, optionally for one field.
    pub fn find(&self, field: Option<&str>) -> Vec<Column> {
        self.snowflake.find(&self.table(), field)
    }

    /// Leaf columns under `prefix`, with their names relative to it.
    ///
    /// The prefix is tried at this level first, then at each ancestor level
    /// out to the root; the first level with any match wins. Structural
    /// placeholders are never leaves.
    pub fn leaves(&self, prefix: &str) -> Vec<(String, Column)> {
        for level in self.nested_path.iter() {
            let full_name = concat_field(level, prefix);
            let mut output: Vec<(String, Column)> = self
                .columns()
                .iter()
                .filter(|c| !c.json_type.is_structural())
                .filter(|c| c.es_column != GUID || full_name == GUID)
                .filter(|c| startswith_field(&c.name, &full_name))
                .map(|c| (untype_field(&relative_field(&c.name, &full_name)), c.clone()))
                .collect();
            if !output.is_empty() {
                output.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.es_column.cmp(&b.1.es_column)));
                return output;
            }
        }
        Vec::new()
    }

    /// Name of `column` from the perspective of this level.
    pub fn get_column_name(&self, column: &Column) -> String {
        property_name(&relative_field(&column.name, self.nested_path.innermost()))
    }

    /// Map every name reachable under `var` to its columns.
    ///
    /// Names are offered both relative to this level and, for columns owned by
    /// another level, as absolute names from the fact root; relative spellings
    /// win when both exist.
    pub fn map_to_sql(&self, var: &str) -> BTreeMap<String, Vec<Column>> {
        let origin = self.nested_path.innermost();
        let absolute_var = var;
        let var = if startswith_field(var, origin) && var != origin {
            relative_field(var, origin)
        } else {
            var.to_string()
        };
        let anchored_var = concat_field(origin, &var);

        let mut origin_dict: BTreeMap<String, Vec<Column>> = BTreeMap::new();
        let mut fact_dict: BTreeMap<String, Vec<Column>> = BTreeMap::new();
        for c in self.columns() {
            if c.json_type.is_structural() {
                continue;
            }
            let relative = property_name(&relative_field(&c.name, origin));
            if c.name != relative
                && (startswith_field(&c.name, absolute_var) || startswith_field(&c.name, &anchored_var))
            {
                fact_dict.entry(c.name.clone()).or_default().push(c.clone());
            }
            if startswith_field(&relative, &var) {
                origin_dict.entry(relative).or_default().push(c.clone());
            }
        }

        for (name, columns) in fact_dict {
            origin_dict.entry(name).or_insert(columns);
        }
        origin_dict
    }
}
