//! Fact table lifecycle.
//!
//! A [`Container`] owns the connection, the column catalog and the identity
//! allocator of one database. It creates and drops snowflakes, keeps the
//! `__columns__` meta table in step with the catalog, and hands out
//! [`Facts`] handles for inserting and extracting documents.

use crate::catalog::{Catalog, Column, NestedPath, Snowflake, GUID, UID};
use crate::dialect::Dialect;
use crate::engine::Database;
use crate::error::{SnowError, SnowResult};
use crate::ids::IdAllocator;
use crate::meta;
use crate::planner::Planner;
use crate::schema::Schema;
use crate::typed::JsonType;
use std::sync::Arc;
use tokio::sync::Mutex;

struct Inner {
    db: Database,
    catalog: Catalog,
    ids: IdAllocator,
    /// Serializes DDL and catalog writes.
    schema_lock: Mutex<()>,
}

/// One database worth of snowflakes.
#[derive(Clone)]
pub struct Container {
    inner: Arc<Inner>,
}

impl Container {
    /// Open a container on an existing connection, loading its catalog.
    pub async fn open(db: Database) -> SnowResult<Self> {
        IdAllocator::setup(&db).await?;
        meta::setup(&db).await?;
        let catalog = Catalog::new();
        meta::load(&db, &catalog).await?;
        Ok(Self {
            inner: Arc::new(Inner {
                ids: IdAllocator::new(db.clone()),
                db,
                catalog,
                schema_lock: Mutex::new(()),
            }),
        })
    }

    pub async fn connect(url: &str, max_connections: u32) -> SnowResult<Self> {
        let db = Database::connect(url, max_connections).await?;
        Self::open(db).await
    }

    pub fn db(&self) -> &Database {
        &self.inner.db
    }

    pub fn dialect(&self) -> Dialect {
        self.inner.db.dialect()
    }

    pub fn catalog(&self) -> &Catalog {
        &self.inner.catalog
    }

    pub(crate) fn ids(&self) -> &IdAllocator {
        &self.inner.ids
    }

    pub(crate) fn schema_lock(&self) -> &Mutex<()> {
        &self.inner.schema_lock
    }

    /// A planner over this container's catalog.
    pub fn planner(&self) -> Planner<'_> {
        Planner::new(&self.inner.catalog, self.dialect())
    }

    /// A fresh identity, unique across every table of the container.
    pub async fn next_id(&self) -> SnowResult<i64> {
        self.inner.ids.next().await
    }

    /// Create a fact table; fails when it already exists.
    pub async fn create_table(&self, name: &str) -> SnowResult<Facts> {
        let _guard = self.inner.schema_lock.lock().await;
        self.create_locked(name).await
    }

    /// Drop `name` if present, then create it empty.
    pub async fn create_or_replace_table(&self, name: &str) -> SnowResult<Facts> {
        let _guard = self.inner.schema_lock.lock().await;
        self.remove_locked(name).await?;
        self.create_locked(name).await
    }

    pub async fn get_or_create_table(&self, name: &str) -> SnowResult<Facts> {
        let _guard = self.inner.schema_lock.lock().await;
        if self.inner.catalog.snowflake(name).is_some() {
            return Ok(self.facts(name));
        }
        self.create_locked(name).await
    }

    /// Handle on an existing fact table.
    pub fn get_table(&self, name: &str) -> SnowResult<Facts> {
        match self.inner.catalog.snowflake(name) {
            Some(_) => Ok(self.facts(name)),
            None => Err(SnowError::UnknownTable(name.to_string())),
        }
    }

    /// Drop a fact table and every nested table under it; no-op when absent.
    pub async fn remove_facts(&self, name: &str) -> SnowResult<()> {
        let _guard = self.inner.schema_lock.lock().await;
        self.remove_locked(name).await
    }

    pub fn snowflake(&self, name: &str) -> Option<Arc<Snowflake>> {
        self.inner.catalog.snowflake(name)
    }

    /// Names of every known fact table.
    pub fn facts_names(&self) -> Vec<String> {
        self.inner.catalog.facts()
    }

    fn facts(&self, name: &str) -> Facts {
        Facts {
            container: self.clone(),
            name: name.to_string(),
        }
    }

    async fn create_locked(&self, name: &str) -> SnowResult<Facts> {
        let db = &self.inner.db;
        let d = db.dialect();
        if self.inner.catalog.snowflake(name).is_some() || db.table_exists(name).await? {
            return Err(SnowError::TableExists(name.to_string()));
        }

        let columns = vec![
            Column::new(UID, UID, name, JsonType::Integer, NestedPath::root()),
            Column::new(GUID, GUID, name, JsonType::String, NestedPath::root()),
        ];
        let mut tx = db.begin().await?;
        tx.execute(&d.create_table(
            name,
            &[(UID, JsonType::Integer), (GUID, JsonType::String)],
            Some(UID),
        ))
        .await?;
        for column in &columns {
            for sql in meta::save(d, column)? {
                tx.execute(&sql).await?;
            }
        }
        tx.commit().await?;

        for column in columns {
            self.inner.catalog.add(column)?;
        }
        tracing::info!("Created fact table {}", name);
        Ok(self.facts(name))
    }

    async fn remove_locked(&self, name: &str) -> SnowResult<()> {
        let db = &self.inner.db;
        let d = db.dialect();
        let tables: Vec<String> = match self.inner.catalog.snowflake(name) {
            Some(snowflake) => snowflake
                .query_paths()
                .iter()
                .map(|p| snowflake.table_name(p))
                .collect(),
            None => vec![name.to_string()],
        };

        let mut tx = db.begin().await?;
        // children first
        for table in tables.iter().rev() {
            tx.execute(&d.drop_table(table)).await?;
        }
        tx.execute(&meta::remove(d, &tables)).await?;
        tx.commit().await?;

        if self.inner.catalog.remove_table(name).is_some() {
            tracing::info!("Dropped fact table {} ({} tables)", name, tables.len());
        }
        Ok(())
    }
}

/// Handle on one fact table.
#[derive(Clone)]
pub struct Facts {
    pub(crate) container: Container,
    pub(crate) name: String,
}

impl Facts {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn container(&self) -> &Container {
        &self.container
    }

    pub fn snowflake(&self) -> SnowResult<Arc<Snowflake>> {
        self.container
            .snowflake(&self.name)
            .ok_or_else(|| SnowError::UnknownTable(self.name.clone()))
    }

    /// Schema view from the fact root.
    pub fn schema(&self) -> SnowResult<Schema> {
        Ok(Schema::new(NestedPath::root(), self.snowflake()?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn container() -> Container {
        Container::connect("sqlite::memory:", 1).await.unwrap()
    }

    #[tokio::test]
    async fn test_create_table() {
        let container = container().await;
        let facts = container.create_table("fact").await.unwrap();
        assert_eq!(facts.name(), "fact");
        assert!(container.db().table_exists("fact").await.unwrap());
        let columns = container.catalog().find("fact", None);
        assert_eq!(columns.len(), 2);
        assert_eq!(container.catalog().primary_keys("fact"), vec![UID.to_string()]);
    }

    #[tokio::test]
    async fn test_create_existing_fails() {
        let container = container().await;
        container.create_table("fact").await.unwrap();
        let err = container.create_table("fact").await.err().unwrap();
        assert!(matches!(err, SnowError::TableExists(name) if name == "fact"));
        container.get_or_create_table("fact").await.unwrap();
        container.create_or_replace_table("fact").await.unwrap();
    }

    #[tokio::test]
    async fn test_get_table() {
        let container = container().await;
        assert!(matches!(
            container.get_table("fact").err().unwrap(),
            SnowError::UnknownTable(_)
        ));
        container.get_or_create_table("fact").await.unwrap();
        assert_eq!(container.get_table("fact").unwrap().name(), "fact");
        assert_eq!(container.facts_names(), vec!["fact".to_string()]);
    }

    #[tokio::test]
    async fn test_remove_facts() {
        let container = container().await;
        container.create_table("fact").await.unwrap();
        container.remove_facts("fact").await.unwrap();
        assert!(!container.db().table_exists("fact").await.unwrap());
        assert!(container.snowflake("fact").is_none());
        container.remove_facts("fact").await.unwrap();
    }

    #[tokio::test]
    async fn test_catalog_survives_reopen() {
        let container = container().await;
        container.create_table("fact").await.unwrap();
        let reopened = Container::open(container.db().clone()).await.unwrap();
        assert!(reopened.get_table("fact").is_ok());
        assert_eq!(reopened.next_id().await.unwrap() % 1000, 0);
    }
}
