use std::{collections::HashMap, sync::Arc};

use scheduling_domain::{User, ID};
use sqlx::{FromRow, PgPool};
use tokio::sync::RwLock;

#[async_trait::async_trait]
pub trait IUserRepo: Send + Sync {
    async fn insert(&self, user: &User) -> anyhow::Result<()>;
    async fn find(&self, id: &ID) -> anyhow::Result<Option<User>>;
    async fn find_by_email(&self, organization_id: &ID, email: &str) -> anyhow::Result<Option<User>>;
    async fn find_many(&self, ids: &[ID]) -> anyhow::Result<Vec<User>>;
}

#[derive(Debug, FromRow)]
struct UserRow {
    user_uid: uuid::Uuid,
    organization_uid: uuid::Uuid,
    email: String,
    name: String,
    timezone: String,
    metadata: serde_json::Value,
}

impl TryFrom<UserRow> for User {
    type Error = anyhow::Error;

    fn try_from(row: UserRow) -> Result<Self, Self::Error> {
        Ok(User {
            id: row.user_uid.into(),
            organization_id: row.organization_uid.into(),
            email: row.email,
            name: row.name,
            timezone: row
                .timezone
                .parse()
                .map_err(|_| anyhow::anyhow!("invalid stored timezone: {}", row.timezone))?,
            metadata: serde_json::from_value(row.metadata)?,
        })
    }
}

pub struct PostgresUserRepo {
    pool: PgPool,
}

impl PostgresUserRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl IUserRepo for PostgresUserRepo {
    async fn insert(&self, user: &User) -> anyhow::Result<()> {
        sqlx::query(
            "INSERT INTO users (user_uid, organization_uid, email, name, timezone, metadata) VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(*user.id.as_ref())
        .bind(*user.organization_id.as_ref())
        .bind(&user.email)
        .bind(&user.name)
        .bind(user.timezone.to_string())
        .bind(serde_json::to_value(&user.metadata)?)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find(&self, id: &ID) -> anyhow::Result<Option<User>> {
        let row: Option<UserRow> = sqlx::query_as(
            "SELECT user_uid, organization_uid, email, name, timezone, metadata FROM users WHERE user_uid = $1",
        )
        .bind(*id.as_ref())
        .fetch_optional(&self.pool)
        .await?;
        row.map(User::try_from).transpose()
    }

    async fn find_by_email(&self, organization_id: &ID, email: &str) -> anyhow::Result<Option<User>> {
        let row: Option<UserRow> = sqlx::query_as(
            "SELECT user_uid, organization_uid, email, name, timezone, metadata FROM users WHERE organization_uid = $1 AND email = $2",
        )
        .bind(*organization_id.as_ref())
        .bind(email.to_lowercase())
        .fetch_optional(&self.pool)
        .await?;
        row.map(User::try_from).transpose()
    }

    async fn find_many(&self, ids: &[ID]) -> anyhow::Result<Vec<User>> {
        let uuids: Vec<uuid::Uuid> = ids.iter().map(|id| *id.as_ref()).collect();
        let rows: Vec<UserRow> = sqlx::query_as(
            "SELECT user_uid, organization_uid, email, name, timezone, metadata FROM users WHERE user_uid = ANY($1)",
        )
        .bind(&uuids)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(User::try_from).collect()
    }
}

/// In-process fake, keyed by user id.
#[derive(Default)]
pub struct InMemoryUserRepo {
    rows: RwLock<HashMap<ID, User>>,
}

impl InMemoryUserRepo {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }
}

#[async_trait::async_trait]
impl IUserRepo for InMemoryUserRepo {
    async fn insert(&self, user: &User) -> anyhow::Result<()> {
        self.rows.write().await.insert(user.id.clone(), user.clone());
        Ok(())
    }

    async fn find(&self, id: &ID) -> anyhow::Result<Option<User>> {
        Ok(self.rows.read().await.get(id).cloned())
    }

    async fn find_by_email(&self, organization_id: &ID, email: &str) -> anyhow::Result<Option<User>> {
        let email = email.to_lowercase();
        Ok(self
            .rows
            .read()
            .await
            .values()
            .find(|u| &u.organization_id == organization_id && u.email == email)
            .cloned())
    }

    async fn find_many(&self, ids: &[ID]) -> anyhow::Result<Vec<User>> {
        let rows = self.rows.read().await;
        Ok(ids.iter().filter_map(|id| rows.get(id).cloned()).collect())
    }
}
