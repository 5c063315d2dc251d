use std::{collections::HashMap, sync::Arc, time::Duration};

use chrono::{DateTime, Utc};
use moka::future::Cache;
use scheduling_domain::{
    event_type::{AssignmentType, EventType, EventTypeHost, LocationType},
    ID,
};
use sqlx::{FromRow, PgPool};
use tokio::sync::RwLock;

use crate::tenant::TenantScope;

#[async_trait::async_trait]
pub trait IEventTypeRepo: Send + Sync {
    async fn insert(&self, event_type: &EventType) -> anyhow::Result<()>;
    /// Respects `deleted_at`: soft-deleted types are invisible.
    async fn find(&self, id: &ID) -> anyhow::Result<Option<EventType>>;
    async fn find_by_slug(&self, organization_id: &ID, slug: &str) -> anyhow::Result<Option<EventType>>;

    async fn insert_host(&self, host: &EventTypeHost) -> anyhow::Result<()>;
    /// `is_active = true` rows only, the rotation eligible set.
    async fn find_active_hosts(&self, event_type_id: &ID) -> anyhow::Result<Vec<EventTypeHost>>;
    /// Bumps `bookingCount`/`lastBookedAt` after a successful create.
    async fn record_booking(&self, event_type_id: &ID, user_id: &ID, at: DateTime<Utc>) -> anyhow::Result<()>;
}

#[derive(Debug, FromRow)]
struct EventTypeRow {
    event_type_uid: uuid::Uuid,
    organization_uid: uuid::Uuid,
    owner_uid: Option<uuid::Uuid>,
    slug: String,
    duration_minutes: i32,
    assignment_type: String,
    location_type: String,
    requires_confirmation: bool,
    buffer_before_minutes: Option<i64>,
    buffer_after_minutes: Option<i64>,
    minimum_notice_hours: Option<i64>,
    max_bookings_per_day: Option<i32>,
    is_active: bool,
    is_public: bool,
    deleted_at: Option<DateTime<Utc>>,
}

fn parse_assignment_type(s: &str) -> anyhow::Result<AssignmentType> {
    match s {
        "SINGLE" => Ok(AssignmentType::Single),
        "ROUND_ROBIN" => Ok(AssignmentType::RoundRobin),
        "COLLECTIVE" => Ok(AssignmentType::Collective),
        other => Err(anyhow::anyhow!("invalid assignment_type: {other}")),
    }
}

fn assignment_type_str(t: AssignmentType) -> &'static str {
    match t {
        AssignmentType::Single => "SINGLE",
        AssignmentType::RoundRobin => "ROUND_ROBIN",
        AssignmentType::Collective => "COLLECTIVE",
    }
}

fn parse_location_type(s: &str) -> anyhow::Result<LocationType> {
    match s {
        "MEET" => Ok(LocationType::Meet),
        "PHONE" => Ok(LocationType::Phone),
        "IN_PERSON" => Ok(LocationType::InPerson),
        "CUSTOM" => Ok(LocationType::Custom),
        other => Err(anyhow::anyhow!("invalid location_type: {other}")),
    }
}

fn location_type_str(t: LocationType) -> &'static str {
    match t {
        LocationType::Meet => "MEET",
        LocationType::Phone => "PHONE",
        LocationType::InPerson => "IN_PERSON",
        LocationType::Custom => "CUSTOM",
    }
}

impl TryFrom<EventTypeRow> for EventType {
    type Error = anyhow::Error;

    fn try_from(row: EventTypeRow) -> Result<Self, Self::Error> {
        Ok(EventType {
            id: row.event_type_uid.into(),
            organization_id: row.organization_uid.into(),
            owner_id: row.owner_uid.map(Into::into),
            slug: row.slug,
            duration_minutes: row.duration_minutes as u32,
            assignment_type: parse_assignment_type(&row.assignment_type)?,
            location_type: parse_location_type(&row.location_type)?,
            requires_confirmation: row.requires_confirmation,
            buffer_before_minutes: row.buffer_before_minutes,
            buffer_after_minutes: row.buffer_after_minutes,
            minimum_notice_hours: row.minimum_notice_hours,
            max_bookings_per_day: row.max_bookings_per_day.map(|v| v as u32),
            is_active: row.is_active,
            is_public: row.is_public,
            deleted_at: row.deleted_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct EventTypeHostRow {
    event_type_uid: uuid::Uuid,
    user_uid: uuid::Uuid,
    priority: i32,
    is_active: bool,
    booking_count: i64,
    last_booked_at: Option<DateTime<Utc>>,
}

impl From<EventTypeHostRow> for EventTypeHost {
    fn from(row: EventTypeHostRow) -> Self {
        EventTypeHost {
            event_type_id: row.event_type_uid.into(),
            user_id: row.user_uid.into(),
            priority: row.priority,
            is_active: row.is_active,
            booking_count: row.booking_count,
            last_booked_at: row.last_booked_at,
        }
    }
}

pub struct PostgresEventTypeRepo {
    pool: PgPool,
    /// Keyed by `"{organization_uid}:{slug}"`, the public-booking-page read
    /// path (`find_by_slug` is re-queried on every page load and booking
    /// attempt for the same event type, unlike `find` which callers already
    /// hold an id for). A 5-minute TTL bounds how stale a soft-delete or
    /// slug rename can be observed through the cache.
    slug_cache: Cache<String, EventType>,
}

impl PostgresEventTypeRepo {
    pub fn new(pool: PgPool) -> Self {
        let slug_cache = Cache::builder().time_to_live(Duration::from_secs(300)).build();
        Self { pool, slug_cache }
    }

    fn slug_cache_key(organization_id: &ID, slug: &str) -> String {
        format!("{organization_id}:{slug}")
    }
}

#[async_trait::async_trait]
impl IEventTypeRepo for PostgresEventTypeRepo {
    async fn insert(&self, event_type: &EventType) -> anyhow::Result<()> {
        sqlx::query(
            "INSERT INTO event_types (event_type_uid, organization_uid, owner_uid, slug, duration_minutes, assignment_type, location_type, requires_confirmation, buffer_before_minutes, buffer_after_minutes, minimum_notice_hours, max_bookings_per_day, is_active, is_public, deleted_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)",
        )
        .bind(*event_type.id.as_ref())
        .bind(*event_type.organization_id.as_ref())
        .bind(event_type.owner_id.as_ref().map(|id| *id.as_ref()))
        .bind(&event_type.slug)
        .bind(event_type.duration_minutes as i32)
        .bind(assignment_type_str(event_type.assignment_type))
        .bind(location_type_str(event_type.location_type))
        .bind(event_type.requires_confirmation)
        .bind(event_type.buffer_before_minutes)
        .bind(event_type.buffer_after_minutes)
        .bind(event_type.minimum_notice_hours)
        .bind(event_type.max_bookings_per_day.map(|v| v as i32))
        .bind(event_type.is_active)
        .bind(event_type.is_public)
        .bind(event_type.deleted_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find(&self, id: &ID) -> anyhow::Result<Option<EventType>> {
        let row: Option<EventTypeRow> = sqlx::query_as(
            "SELECT event_type_uid, organization_uid, owner_uid, slug, duration_minutes, assignment_type, location_type, requires_confirmation, buffer_before_minutes, buffer_after_minutes, minimum_notice_hours, max_bookings_per_day, is_active, is_public, deleted_at \
             FROM event_types WHERE event_type_uid = $1",
        )
        .bind(*id.as_ref())
        .fetch_optional(&self.pool)
        .await?;
        row.map(EventType::try_from).transpose()
    }

    async fn find_by_slug(&self, organization_id: &ID, slug: &str) -> anyhow::Result<Option<EventType>> {
        let cache_key = Self::slug_cache_key(organization_id, slug);
        if let Some(cached) = self.slug_cache.get(&cache_key).await {
            return Ok(Some(cached));
        }

        let row: Option<EventTypeRow> = sqlx::query_as(
            "SELECT event_type_uid, organization_uid, owner_uid, slug, duration_minutes, assignment_type, location_type, requires_confirmation, buffer_before_minutes, buffer_after_minutes, minimum_notice_hours, max_bookings_per_day, is_active, is_public, deleted_at \
             FROM event_types WHERE organization_uid = $1 AND slug = $2 AND deleted_at IS NULL",
        )
        .bind(*organization_id.as_ref())
        .bind(slug)
        .fetch_optional(&self.pool)
        .await?;
        let event_type = row.map(EventType::try_from).transpose()?;

        if let Some(ref event_type) = event_type {
            self.slug_cache.insert(cache_key, event_type.clone()).await;
        }

        Ok(event_type)
    }

    async fn insert_host(&self, host: &EventTypeHost) -> anyhow::Result<()> {
        sqlx::query(
            "INSERT INTO event_type_hosts (event_type_uid, user_uid, priority, is_active, booking_count, last_booked_at) VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(*host.event_type_id.as_ref())
        .bind(*host.user_id.as_ref())
        .bind(host.priority)
        .bind(host.is_active)
        .bind(host.booking_count)
        .bind(host.last_booked_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find_active_hosts(&self, event_type_id: &ID) -> anyhow::Result<Vec<EventTypeHost>> {
        let rows: Vec<EventTypeHostRow> = sqlx::query_as(
            "SELECT event_type_uid, user_uid, priority, is_active, booking_count, last_booked_at FROM event_type_hosts WHERE event_type_uid = $1 AND is_active = true",
        )
        .bind(*event_type_id.as_ref())
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(EventTypeHost::from).collect())
    }

    async fn record_booking(&self, event_type_id: &ID, user_id: &ID, at: DateTime<Utc>) -> anyhow::Result<()> {
        sqlx::query(
            "UPDATE event_type_hosts SET booking_count = booking_count + 1, last_booked_at = $3 WHERE event_type_uid = $1 AND user_uid = $2",
        )
        .bind(*event_type_id.as_ref())
        .bind(*user_id.as_ref())
        .bind(at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryEventTypeRepo {
    event_types: RwLock<HashMap<ID, EventType>>,
    hosts: RwLock<HashMap<ID, Vec<EventTypeHost>>>,
}

impl InMemoryEventTypeRepo {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }
}

#[async_trait::async_trait]
impl IEventTypeRepo for InMemoryEventTypeRepo {
    async fn insert(&self, event_type: &EventType) -> anyhow::Result<()> {
        self.event_types
            .write()
            .await
            .insert(event_type.id.clone(), event_type.clone());
        Ok(())
    }

    async fn find(&self, id: &ID) -> anyhow::Result<Option<EventType>> {
        Ok(self.event_types.read().await.get(id).cloned())
    }

    async fn find_by_slug(&self, organization_id: &ID, slug: &str) -> anyhow::Result<Option<EventType>> {
        Ok(self
            .event_types
            .read()
            .await
            .values()
            .find(|e| &e.organization_id == organization_id && e.slug == slug && e.is_visible())
            .cloned())
    }

    async fn insert_host(&self, host: &EventTypeHost) -> anyhow::Result<()> {
        self.hosts
            .write()
            .await
            .entry(host.event_type_id.clone())
            .or_default()
            .push(host.clone());
        Ok(())
    }

    async fn find_active_hosts(&self, event_type_id: &ID) -> anyhow::Result<Vec<EventTypeHost>> {
        Ok(self
            .hosts
            .read()
            .await
            .get(event_type_id)
            .map(|hosts| hosts.iter().filter(|h| h.is_active).cloned().collect())
            .unwrap_or_default())
    }

    async fn record_booking(&self, event_type_id: &ID, user_id: &ID, at: DateTime<Utc>) -> anyhow::Result<()> {
        if let Some(hosts) = self.hosts.write().await.get_mut(event_type_id) {
            if let Some(host) = hosts.iter_mut().find(|h| &h.user_id == user_id) {
                host.booking_count += 1;
                host.last_booked_at = Some(at);
            }
        }
        Ok(())
    }
}

/// The tenant-scope interceptor for `EventType` reads/writes: wraps
/// any `IEventTypeRepo` and, when the scope carries an `organization_id`,
/// refuses to return or accept rows for a different tenant. One wrapper
/// per tenant-bounded repo, per the Design Notes -- not a dynamic
/// query-rewriting layer.
pub struct TenantScopedEventTypeRepo<R: IEventTypeRepo> {
    inner: Arc<R>,
    scope: TenantScope,
}

impl<R: IEventTypeRepo> TenantScopedEventTypeRepo<R> {
    pub fn new(inner: Arc<R>, scope: TenantScope) -> Self {
        Self { inner, scope }
    }
}

#[async_trait::async_trait]
impl<R: IEventTypeRepo> IEventTypeRepo for TenantScopedEventTypeRepo<R> {
    async fn insert(&self, event_type: &EventType) -> anyhow::Result<()> {
        if let Some(scope_org) = self.scope.organization_id() {
            if scope_org != &event_type.organization_id {
                anyhow::bail!("tenant scope mismatch on event type insert");
            }
        }
        self.inner.insert(event_type).await
    }

    async fn find(&self, id: &ID) -> anyhow::Result<Option<EventType>> {
        let found = self.inner.find(id).await?;
        Ok(found.filter(|e| self.scope.allows(&e.organization_id)))
    }

    async fn find_by_slug(&self, organization_id: &ID, slug: &str) -> anyhow::Result<Option<EventType>> {
        if !self.scope.allows(organization_id) {
            return Ok(None);
        }
        self.inner.find_by_slug(organization_id, slug).await
    }

    async fn insert_host(&self, host: &EventTypeHost) -> anyhow::Result<()> {
        self.inner.insert_host(host).await
    }

    async fn find_active_hosts(&self, event_type_id: &ID) -> anyhow::Result<Vec<EventTypeHost>> {
        self.inner.find_active_hosts(event_type_id).await
    }

    async fn record_booking(&self, event_type_id: &ID, user_id: &ID, at: DateTime<Utc>) -> anyhow::Result<()> {
        self.inner.record_booking(event_type_id, user_id, at).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_event_type(org: ID) -> EventType {
        EventType {
            id: ID::default(),
            organization_id: org,
            owner_id: None,
            slug: "intro".into(),
            duration_minutes: 30,
            assignment_type: AssignmentType::Single,
            location_type: LocationType::Meet,
            requires_confirmation: false,
            buffer_before_minutes: None,
            buffer_after_minutes: None,
            minimum_notice_hours: None,
            max_bookings_per_day: None,
            is_active: true,
            is_public: true,
            deleted_at: None,
        }
    }

    #[tokio::test]
    async fn scoped_repo_hides_other_tenants_rows() {
        let inner = InMemoryEventTypeRepo::new();
        let org_a = ID::default();
        let org_b = ID::default();
        let event_type = sample_event_type(org_a.clone());
        inner.insert(&event_type).await.unwrap();

        let scoped = TenantScopedEventTypeRepo::new(inner, TenantScope::scoped(org_b));
        assert!(scoped.find(&event_type.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn scoped_repo_allows_matching_tenant() {
        let inner = InMemoryEventTypeRepo::new();
        let org_a = ID::default();
        let event_type = sample_event_type(org_a.clone());
        inner.insert(&event_type).await.unwrap();

        let scoped = TenantScopedEventTypeRepo::new(inner, TenantScope::scoped(org_a));
        assert!(scoped.find(&event_type.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn unscoped_sees_every_tenant() {
        let inner = InMemoryEventTypeRepo::new();
        let event_type = sample_event_type(ID::default());
        inner.insert(&event_type).await.unwrap();

        let scoped = TenantScopedEventTypeRepo::new(inner, TenantScope::unscoped());
        assert!(scoped.find(&event_type.id).await.unwrap().is_some());
    }
}
