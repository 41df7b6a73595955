//! Row identity allocation.
//!
//! Identities are unique across every table of a container. They are claimed
//! from the `__about__` table in blocks, so most allocations never touch the
//! database, and two containers sharing a database never hand out the same id.

use crate::engine::{count, Database};
use crate::error::{SnowError, SnowResult};
use std::ops::Range;
use tokio::sync::Mutex;

/// Container metadata table holding the next unclaimed identity.
pub const ABOUT_TABLE: &str = "__about__";
/// Identities claimed per round trip.
pub const ID_BLOCK_SIZE: i64 = 1000;

/// First identity handed out by a fresh container.
const FIRST_ID: i64 = 1000;

pub struct IdAllocator {
    db: Database,
    block: Mutex<Range<i64>>,
}

impl IdAllocator {
    pub fn new(db: Database) -> Self {
        Self {
            db,
            block: Mutex::new(0..0),
        }
    }

    /// Create and seed the about table when missing.
    pub async fn setup(db: &Database) -> SnowResult<()> {
        let d = db.dialect();
        if !db.table_exists(ABOUT_TABLE).await? {
            db.execute(&format!(
                "CREATE TABLE {} ({} BIGINT)",
                d.quote(ABOUT_TABLE),
                d.quote("next_id")
            ))
            .await?;
        }
        let rows = db
            .fetch_all(&format!("SELECT COUNT(*) AS n FROM {}", d.quote(ABOUT_TABLE)))
            .await?;
        if count(&rows) == 0 {
            db.execute(&format!(
                "INSERT INTO {} ({}) VALUES ({})",
                d.quote(ABOUT_TABLE),
                d.quote("next_id"),
                FIRST_ID
            ))
            .await?;
        }
        Ok(())
    }

    /// One fresh identity.
    pub async fn next(&self) -> SnowResult<i64> {
        Ok(self.next_n(1).await?.start)
    }

    /// `n` consecutive fresh identities.
    pub async fn next_n(&self, n: usize) -> SnowResult<Range<i64>> {
        let n = i64::try_from(n).map_err(|_| SnowError::Database(format!("cannot allocate {} ids", n)))?;
        let mut block = self.block.lock().await;
        if block.end - block.start < n {
            *block = self.claim(n.max(ID_BLOCK_SIZE)).await?;
        }
        let ids = block.start..block.start + n;
        block.start += n;
        Ok(ids)
    }

    async fn claim(&self, size: i64) -> SnowResult<Range<i64>> {
        let d = self.db.dialect();
        let table = d.quote(ABOUT_TABLE);
        let column = d.quote("next_id");

        let mut tx = self.db.begin().await?;
        tx.execute(&format!("UPDATE {} SET {} = {} + {}", table, column, column, size))
            .await?;
        let rows = tx
            .fetch_all(&format!("SELECT {} AS n FROM {}", column, table))
            .await?;
        tx.commit().await?;

        let end = count(&rows);
        if end < size {
            return Err(SnowError::Database(format!("{} is corrupt", ABOUT_TABLE)));
        }
        tracing::debug!("Claimed ids {}..{}", end - size, end);
        Ok(end - size..end)
    }
}
