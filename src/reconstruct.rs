//! Document reconstruction.
//!
//! Folds the ordered rows of a snowflake query back into nested documents.
//! Rows arrive sorted by the identity of every level, outermost first, so a
//! level's element is complete as soon as its identity changes. Sibling
//! nested tables multiply each other's rows; identities already emitted for
//! the current parent element are ignored on repeat. A reference-only table
//! folded into an element keeps only its last row: when its identity changes,
//! the fields it wrote are cleared first.

use crate::engine::Row;
use crate::fields::split_field;
use crate::planner::QueryPlan;
use crate::typed::coerce;
use serde_json::{Map, Value};
use std::collections::{HashMap, HashSet};

#[derive(Debug, Default)]
struct LevelState {
    current: Option<Value>,
    active: bool,
    seen: HashSet<String>,
    fields: Map<String, Value>,
    scalar: Option<Value>,
    /// Identity of the row each folded table last wrote, by table alias.
    inlined: HashMap<String, Value>,
}

impl LevelState {
    fn take(&mut self) -> Value {
        self.inlined.clear();
        let fields = std::mem::take(&mut self.fields);
        match self.scalar.take() {
            Some(scalar) if fields.is_empty() => scalar,
            _ => Value::Object(fields),
        }
    }
}

/// Streaming row-to-document assembler for one [`QueryPlan`].
pub struct Reconstructor<'a> {
    plan: &'a QueryPlan,
    /// Per level, per leaf: output path relative to the level (empty for the element itself).
    leaf_paths: Vec<Vec<Vec<String>>>,
    key_paths: Vec<Vec<String>>,
    state: Vec<LevelState>,
}

impl<'a> Reconstructor<'a> {
    pub fn new(plan: &'a QueryPlan) -> Self {
        let leaf_paths = plan
            .levels
            .iter()
            .map(|level| {
                level
                    .leaves
                    .iter()
                    .map(|leaf| split_field(&level.schema.get_column_name(&leaf.column)))
                    .collect()
            })
            .collect();
        let key_paths = plan.levels.iter().map(|l| split_field(&l.key)).collect();
        let state = plan.levels.iter().map(|_| LevelState::default()).collect();
        Self {
            plan,
            leaf_paths,
            key_paths,
            state,
        }
    }

    /// Feed the next result row; completed documents go to `sink`.
    pub fn push(&mut self, row: &Row, sink: &mut impl FnMut(Value)) {
        let plan = self.plan;
        let levels = &plan.levels;
        let ids: Vec<Option<Value>> = levels
            .iter()
            .map(|l| row.get(&l.id_alias).filter(|v| !v.is_null()).cloned())
            .collect();

        let mut changed = vec![false; levels.len()];
        for (i, level) in levels.iter().enumerate() {
            let parent_changed = level.parent.is_some_and(|p| changed[p]);
            changed[i] = parent_changed || ids[i] != self.state[i].current;
        }

        for i in (0..levels.len()).rev() {
            if changed[i] {
                self.close(i, sink);
            }
        }

        for (i, id) in ids.into_iter().enumerate() {
            if !changed[i] {
                continue;
            }
            if levels[i].parent.is_some_and(|p| changed[p]) {
                self.state[i].seen.clear();
            }
            let state = &mut self.state[i];
            state.active = match &id {
                Some(v) => state.seen.insert(v.to_string()),
                None => false,
            };
            state.current = id;
        }

        for (i, level) in levels.iter().enumerate() {
            if !self.state[i].active {
                continue;
            }
            for inlined in &level.inlined {
                let Some(id) = row.get(&inlined.id_alias).filter(|v| !v.is_null()) else {
                    continue;
                };
                let state = &mut self.state[i];
                let previous = state.inlined.insert(inlined.alias.clone(), id.clone());
                if previous.is_none_or(|p| &p == id) {
                    continue;
                }
                for (leaf, path) in level.leaves.iter().zip(&self.leaf_paths[i]) {
                    if leaf.table_alias != inlined.alias {
                        continue;
                    }
                    if path.is_empty() {
                        state.scalar = None;
                    } else {
                        remove_path(&mut state.fields, path);
                    }
                }
            }
            for (leaf, path) in level.leaves.iter().zip(&self.leaf_paths[i]) {
                let value = match row.get(&leaf.alias) {
                    Some(v) if !v.is_null() => coerce(v.clone(), leaf.column.json_type),
                    _ => continue,
                };
                let state = &mut self.state[i];
                if path.is_empty() {
                    state.scalar = Some(value);
                } else {
                    set_path(&mut state.fields, path, value);
                }
            }
        }
    }

    /// Flush the document still being assembled.
    pub fn finish(&mut self, sink: &mut impl FnMut(Value)) {
        for i in (0..self.state.len()).rev() {
            self.close(i, sink);
        }
    }

    fn close(&mut self, i: usize, sink: &mut impl FnMut(Value)) {
        let state = &mut self.state[i];
        let was_open = state.current.take().is_some();
        let active = std::mem::replace(&mut state.active, false);
        let value = state.take();
        if !was_open || !active {
            return;
        }
        match self.plan.levels[i].parent {
            None => sink(value),
            Some(p) => push_path(&mut self.state[p].fields, &self.key_paths[i], value),
        }
    }
}

/// Assemble every document in `rows`.
pub fn reconstruct<'r>(plan: &QueryPlan, rows: impl IntoIterator<Item = &'r Row>) -> Vec<Value> {
    let mut docs = Vec::new();
    let mut sink = |doc| docs.push(doc);
    let mut reconstructor = Reconstructor::new(plan);
    for row in rows {
        reconstructor.push(row, &mut sink);
    }
    reconstructor.finish(&mut sink);
    docs
}

fn object_at<'m>(fields: &'m mut Map<String, Value>, path: &[String]) -> &'m mut Map<String, Value> {
    let mut current = fields;
    for key in path {
        let entry = current
            .entry(key.clone())
            .or_insert_with(|| Value::Object(Map::new()));
        if !entry.is_object() {
            *entry = Value::Object(Map::new());
        }
        current = match entry {
            Value::Object(map) => map,
            _ => unreachable!(),
        };
    }
    current
}

fn set_path(fields: &mut Map<String, Value>, path: &[String], value: Value) {
    if let Some((last, parents)) = path.split_last() {
        object_at(fields, parents).insert(last.clone(), value);
    }
}

/// Remove the value at `path`, dropping objects left empty on the way.
fn remove_path(fields: &mut Map<String, Value>, path: &[String]) {
    let Some((first, rest)) = path.split_first() else {
        return;
    };
    if rest.is_empty() {
        fields.remove(first);
        return;
    }
    if let Some(Value::Object(inner)) = fields.get_mut(first) {
        remove_path(inner, rest);
        if inner.is_empty() {
            fields.remove(first);
        }
    }
}

fn push_path(fields: &mut Map<String, Value>, path: &[String], value: Value) {
    let Some((last, parents)) = path.split_last() else {
        return;
    };
    let parent = object_at(fields, parents);
    match parent.get_mut(last) {
        Some(Value::Array(items)) => items.push(value),
        _ => {
            parent.insert(last.clone(), Value::Array(vec![value]));
        }
    }
}
