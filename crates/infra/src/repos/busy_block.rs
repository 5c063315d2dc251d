use std::{collections::HashMap, sync::Arc};

use chrono::{DateTime, Utc};
use scheduling_domain::{booking::BusyBlock, ID};
use sqlx::{FromRow, PgPool};
use tokio::sync::RwLock;

/// External (calendar-sync) busy time, loaded alongside active bookings
/// when computing a host's busy set.
#[async_trait::async_trait]
pub trait IBusyBlockRepo: Send + Sync {
    async fn insert(&self, block: &BusyBlock) -> anyhow::Result<()>;
    async fn find_overlapping(&self, user_id: &ID, start: DateTime<Utc>, end: DateTime<Utc>) -> anyhow::Result<Vec<BusyBlock>>;
    async fn delete_for_user(&self, user_id: &ID) -> anyhow::Result<()>;
}

#[derive(Debug, FromRow)]
struct BusyBlockRow {
    busy_block_uid: uuid::Uuid,
    user_uid: uuid::Uuid,
    start_time: DateTime<Utc>,
    end_time: DateTime<Utc>,
}

impl From<BusyBlockRow> for BusyBlock {
    fn from(row: BusyBlockRow) -> Self {
        BusyBlock {
            id: row.busy_block_uid.into(),
            user_id: row.user_uid.into(),
            start_time: row.start_time,
            end_time: row.end_time,
        }
    }
}

pub struct PostgresBusyBlockRepo {
    pool: PgPool,
}

impl PostgresBusyBlockRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl IBusyBlockRepo for PostgresBusyBlockRepo {
    async fn insert(&self, block: &BusyBlock) -> anyhow::Result<()> {
        sqlx::query("INSERT INTO busy_blocks (busy_block_uid, user_uid, start_time, end_time) VALUES ($1, $2, $3, $4)")
            .bind(*block.id.as_ref())
            .bind(*block.user_id.as_ref())
            .bind(block.start_time)
            .bind(block.end_time)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn find_overlapping(&self, user_id: &ID, start: DateTime<Utc>, end: DateTime<Utc>) -> anyhow::Result<Vec<BusyBlock>> {
        let rows: Vec<BusyBlockRow> = sqlx::query_as(
            "SELECT busy_block_uid, user_uid, start_time, end_time FROM busy_blocks WHERE user_uid = $1 AND start_time < $3 AND end_time > $2",
        )
        .bind(*user_id.as_ref())
        .bind(start)
        .bind(end)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(BusyBlock::from).collect())
    }

    async fn delete_for_user(&self, user_id: &ID) -> anyhow::Result<()> {
        sqlx::query("DELETE FROM busy_blocks WHERE user_uid = $1")
            .bind(*user_id.as_ref())
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryBusyBlockRepo {
    rows: RwLock<HashMap<ID, Vec<BusyBlock>>>,
}

impl InMemoryBusyBlockRepo {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }
}

#[async_trait::async_trait]
impl IBusyBlockRepo for InMemoryBusyBlockRepo {
    async fn insert(&self, block: &BusyBlock) -> anyhow::Result<()> {
        self.rows.write().await.entry(block.user_id.clone()).or_default().push(block.clone());
        Ok(())
    }

    async fn find_overlapping(&self, user_id: &ID, start: DateTime<Utc>, end: DateTime<Utc>) -> anyhow::Result<Vec<BusyBlock>> {
        Ok(self
            .rows
            .read()
            .await
            .get(user_id)
            .map(|blocks| {
                blocks
                    .iter()
                    .filter(|b| b.start_time < end && b.end_time > start)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn delete_for_user(&self, user_id: &ID) -> anyhow::Result<()> {
        self.rows.write().await.remove(user_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn overlap_filter_excludes_touching_blocks() {
        let repo = InMemoryBusyBlockRepo::new();
        let user = ID::default();
        repo.insert(&BusyBlock {
            id: ID::default(),
            user_id: user.clone(),
            start_time: DateTime::from_timestamp_millis(0).unwrap(),
            end_time: DateTime::from_timestamp_millis(1_800_000).unwrap(),
        })
        .await
        .unwrap();

        let touching = repo
            .find_overlapping(
                &user,
                DateTime::from_timestamp_millis(1_800_000).unwrap(),
                DateTime::from_timestamp_millis(3_600_000).unwrap(),
            )
            .await
            .unwrap();
        assert!(touching.is_empty());
    }
}
