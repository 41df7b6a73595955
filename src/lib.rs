//! # snowdoc
//!
//! Store JSON documents in a relational "snowflake" of tables and get them
//! back out, nested as they went in.
//!
//! Every fact table holds one row per document. Objects are flattened into
//! dotted columns; every array becomes a nested table whose rows point back
//! at their parent. Column names carry the JSON type of the values they hold
//! (`name.$S`, `minutia.$N`), so a field seen with different types simply gets
//! one column per type.
//!
//! ## Quick Example
//!
//! ```rust,ignore
//! use snowdoc::prelude::*;
//! use serde_json::json;
//!
//! let container = Container::connect("sqlite::memory:", 1).await?;
//! let facts = container.create_table("fact").await?;
//! facts.insert(&[json!({"id": 10, "nested": [{"about": "a"}]})]).await?;
//!
//! let options = SnowflakeOptions { show_foreign_keys: false, ..Default::default() };
//! let extractor = Extractor::new(container, "fact", options);
//! extractor.extract(&Selection::All, |doc| println!("{}", doc)).await?;
//! ```
//!
//! ## Storage
//!
//! | Column       | Table         | Meaning                          |
//! |--------------|---------------|----------------------------------|
//! | `__id__`     | every table   | row identity                     |
//! | `_id`        | fact table    | external reference of a document |
//! | `__parent__` | nested tables | identity of the parent row       |
//! | `__order__`  | nested tables | position in the parent array     |

pub mod catalog;
pub mod config;
pub mod container;
pub mod dialect;
pub mod engine;
pub mod error;
pub mod extract;
pub mod fields;
pub mod ids;
pub mod insert;
pub mod meta;
pub mod planner;
pub mod reconstruct;
pub mod schema;
pub mod typed;

pub mod prelude {
    pub use crate::catalog::{Catalog, Column, NestedPath, Snowflake};
    pub use crate::config::Config;
    pub use crate::container::{Container, Facts};
    pub use crate::dialect::Dialect;
    pub use crate::engine::{Database, Row};
    pub use crate::error::*;
    pub use crate::extract::Extractor;
    pub use crate::planner::{Planner, QueryPlan, Selection, SnowflakeOptions};
    pub use crate::reconstruct::{reconstruct, Reconstructor};
    pub use crate::schema::Schema;
    pub use crate::typed::JsonType;
}
