use std::{collections::HashMap, sync::Arc};

use scheduling_domain::{Organization, ID};
use sqlx::{FromRow, PgPool};
use tokio::sync::RwLock;

#[async_trait::async_trait]
pub trait IOrganizationRepo: Send + Sync {
    async fn insert(&self, org: &Organization) -> anyhow::Result<()>;
    async fn find(&self, id: &ID) -> anyhow::Result<Option<Organization>>;
    async fn find_by_slug(&self, slug: &str) -> anyhow::Result<Option<Organization>>;
}

#[derive(Debug, FromRow)]
struct OrganizationRow {
    organization_uid: uuid::Uuid,
    slug: String,
    default_timezone: String,
    metadata: serde_json::Value,
}

impl TryFrom<OrganizationRow> for Organization {
    type Error = anyhow::Error;

    fn try_from(row: OrganizationRow) -> Result<Self, Self::Error> {
        Ok(Organization {
            id: row.organization_uid.into(),
            slug: row.slug,
            default_timezone: row.default_timezone.parse().map_err(|_| {
                anyhow::anyhow!("invalid stored timezone: {}", row.default_timezone)
            })?,
            metadata: serde_json::from_value(row.metadata)?,
        })
    }
}

pub struct PostgresOrganizationRepo {
    pool: PgPool,
}

impl PostgresOrganizationRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl IOrganizationRepo for PostgresOrganizationRepo {
    async fn insert(&self, org: &Organization) -> anyhow::Result<()> {
        sqlx::query(
            "INSERT INTO organizations (organization_uid, slug, default_timezone, metadata) VALUES ($1, $2, $3, $4)",
        )
        .bind(*org.id.as_ref())
        .bind(&org.slug)
        .bind(org.default_timezone.to_string())
        .bind(serde_json::to_value(&org.metadata)?)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find(&self, id: &ID) -> anyhow::Result<Option<Organization>> {
        let row: Option<OrganizationRow> =
            sqlx::query_as("SELECT organization_uid, slug, default_timezone, metadata FROM organizations WHERE organization_uid = $1")
                .bind(*id.as_ref())
                .fetch_optional(&self.pool)
                .await?;
        row.map(Organization::try_from).transpose()
    }

    async fn find_by_slug(&self, slug: &str) -> anyhow::Result<Option<Organization>> {
        let row: Option<OrganizationRow> =
            sqlx::query_as("SELECT organization_uid, slug, default_timezone, metadata FROM organizations WHERE slug = $1")
                .bind(slug)
                .fetch_optional(&self.pool)
                .await?;
        row.map(Organization::try_from).transpose()
    }
}

/// In-process fake used by tests and by the bin's local-dev mode; keeps
/// organizations in a `RwLock`-guarded map rather than hitting Postgres.
#[derive(Default)]
pub struct InMemoryOrganizationRepo {
    rows: RwLock<HashMap<ID, Organization>>,
}

impl InMemoryOrganizationRepo {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }
}

#[async_trait::async_trait]
impl IOrganizationRepo for InMemoryOrganizationRepo {
    async fn insert(&self, org: &Organization) -> anyhow::Result<()> {
        self.rows.write().await.insert(org.id.clone(), org.clone());
        Ok(())
    }

    async fn find(&self, id: &ID) -> anyhow::Result<Option<Organization>> {
        Ok(self.rows.read().await.get(id).cloned())
    }

    async fn find_by_slug(&self, slug: &str) -> anyhow::Result<Option<Organization>> {
        Ok(self.rows.read().await.values().find(|o| o.slug == slug).cloned())
    }
}
