//! Config-driven extraction.
//!
//! Plans one snowflake query per selection, streams its rows through a
//! [`Reconstructor`] and hands every finished document to a sink. Batched
//! extraction walks a fact field in ascending order so a large fact table
//! is pulled in bounded chunks.

use crate::config::ExtractConfig;
use crate::container::Container;
use crate::error::SnowResult;
use crate::planner::{batch_group, QueryPlan, Selection, SnowflakeOptions};
use crate::reconstruct::Reconstructor;
use crate::typed::{coerce, JsonType};
use futures::TryStreamExt;
use serde_json::Value;

pub struct Extractor {
    container: Container,
    fact: String,
    options: SnowflakeOptions,
    batches: ExtractConfig,
}

impl Extractor {
    pub fn new(container: Container, fact: impl Into<String>, options: SnowflakeOptions) -> Self {
        Self {
            container,
            fact: fact.into(),
            options,
            batches: ExtractConfig::default(),
        }
    }

    pub fn with_batches(mut self, batches: ExtractConfig) -> Self {
        self.batches = batches;
        self
    }

    pub fn plan(&self, selection: &Selection) -> SnowResult<QueryPlan> {
        self.container
            .planner()
            .with_options(self.options.clone())
            .plan(&self.fact, selection)
    }

    /// Extract every fact in `selection`, returning how many documents were emitted.
    pub async fn extract(&self, selection: &Selection, mut sink: impl FnMut(Value)) -> SnowResult<usize> {
        let plan = self.plan(selection)?;
        let mut emitted = 0;
        let mut counted = |doc: Value| {
            emitted += 1;
            sink(doc);
        };

        let mut reconstructor = Reconstructor::new(&plan);
        let mut rows = self.container.db().fetch(&plan.sql);
        while let Some(row) = rows.try_next().await? {
            reconstructor.push(&row, &mut counted);
        }
        reconstructor.finish(&mut counted);
        Ok(emitted)
    }

    /// Extract the whole fact table as configured: through the custom identity
    /// sub-query, in batches of the configured field, or in one pass.
    ///
    /// A field stored under several types is walked one typed column after
    /// another. `start` skips the values of its own type group up to and
    /// including it, and every column of a group sorting before it.
    pub async fn extract_batches(&self, mut sink: impl FnMut(Value)) -> SnowResult<usize> {
        if let Some(ids) = &self.batches.ids {
            return self.extract(&Selection::SubQuery(ids.clone()), &mut sink).await;
        }
        let Some(field) = &self.batches.field else {
            return self.extract(&Selection::All, &mut sink).await;
        };

        let planner = self.container.planner();
        let start = self.batches.start.as_ref().filter(|v| !v.is_null());
        let start_group = start.and_then(JsonType::of).map(batch_group);
        let limit = self.batches.batch.max(1);
        let mut total = 0;
        let mut batch_number = 0;
        for column in planner.batch_columns(&self.fact, field)? {
            let group = batch_group(column.json_type);
            let mut after = match start_group {
                Some(g) if g > group => continue,
                Some(g) if g == group => start.cloned(),
                _ => None,
            };
            loop {
                let sql = planner.batch_sql(&self.fact, &column, after.as_ref(), limit);
                let values: Vec<Value> = self
                    .container
                    .db()
                    .fetch_all(&sql)
                    .await?
                    .into_iter()
                    .filter_map(|mut row| row.remove("value"))
                    .filter(|v| !v.is_null())
                    .map(|v| coerce(v, column.json_type))
                    .collect();
                let Some(last) = values.last().cloned() else {
                    break;
                };

                let selection = planner.batch_selection(&self.fact, &column, &values);
                let emitted = self.extract(&selection, &mut sink).await?;
                batch_number += 1;
                total += emitted;
                tracing::info!(
                    "Batch {} of {} ({}): {} values up to {}, {} documents",
                    batch_number,
                    self.fact,
                    column.es_column,
                    values.len(),
                    last,
                    emitted
                );
                after = Some(last);
            }
        }
        Ok(total)
    }
}
