use std::{collections::HashMap, sync::Arc};

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use scheduling_domain::{
    booking::{
        ActorType, Attendee, AuditAction, Booking, BookingAuditLog, BookingResource, BookingSource,
        BookingStatus, CancelledBy, ResponseStatus,
    },
    ID,
};
use sqlx::{FromRow, PgPool};
use tokio::sync::{Mutex, RwLock};

use crate::tenant::TenantScope;

/// Result of the guarded insert used by the booking-create critical section.
/// `Conflict` means another active booking for the
/// same host was found to overlap at the moment the lock was held --
/// the caller maps this straight to a `Conflict` use-case error, no retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertBookingOutcome {
    Inserted,
    Conflict,
}

#[async_trait::async_trait]
pub trait IBookingRepo: Send + Sync {
    async fn insert(&self, booking: &Booking) -> anyhow::Result<()>;
    async fn find(&self, id: &ID) -> anyhow::Result<Option<Booking>>;
    async fn find_by_uid(&self, uid: &str) -> anyhow::Result<Option<Booking>>;
    async fn update(&self, booking: &Booking) -> anyhow::Result<()>;

    /// All active (`PENDING`/`CONFIRMED`) bookings for a host overlapping
    /// `[start, end)`, used by the transactional re-check before commit
    /// and by the availability engine's busy-time load.
    async fn find_active_overlapping(
        &self,
        host_id: &ID,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> anyhow::Result<Vec<Booking>>;

    /// Inserts `booking` only if no other active booking for
    /// `booking.host_id` overlaps `[start_time, end_time)`, as a single
    /// serialized unit. This is the hard guarantee the slot lock is merely an
    /// optimization in front of: even if the slot lock was unavailable and
    /// the caller proceeded without it, this method still cannot double-book
    /// a host.
    ///
    /// The Postgres implementation takes a transaction-scoped advisory lock
    /// keyed on the host id so that two concurrent callers serialize against
    /// each other rather than both observing "no conflict" and both
    /// inserting; the `bookings_no_host_overlap` exclusion constraint is a
    /// second, independent backstop against any insert path that bypasses
    /// this method. The in-memory implementation serializes on a mutex.
    async fn insert_if_free(&self, booking: &Booking) -> anyhow::Result<InsertBookingOutcome>;

    /// Count of active bookings for a host on a given UTC calendar day,
    /// used to enforce `maxBookingsPerDay`.
    async fn count_active_on_day(&self, host_id: &ID, day_start: DateTime<Utc>, day_end: DateTime<Utc>) -> anyhow::Result<u32>;

    async fn insert_attendee(&self, attendee: &Attendee) -> anyhow::Result<()>;
    async fn find_attendees(&self, booking_id: &ID) -> anyhow::Result<Vec<Attendee>>;

    async fn insert_resource(&self, resource: &BookingResource) -> anyhow::Result<()>;

    /// All active bookings that hold `resource_id` (via `booking_resources`)
    /// and overlap `[start, end)`, the resource-exclusivity counterpart of
    /// `find_active_overlapping`'s host check (§3: "same overlap
    /// exclusivity per `resourceId` across active bookings").
    async fn find_active_resource_overlapping(
        &self,
        resource_id: &ID,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> anyhow::Result<Vec<Booking>>;

    async fn insert_audit_log(&self, entry: &BookingAuditLog) -> anyhow::Result<()>;
    async fn find_audit_logs(&self, booking_id: &ID) -> anyhow::Result<Vec<BookingAuditLog>>;
}

fn parse_status(s: &str) -> anyhow::Result<BookingStatus> {
    match s {
        "PENDING" => Ok(BookingStatus::Pending),
        "CONFIRMED" => Ok(BookingStatus::Confirmed),
        "CANCELLED" => Ok(BookingStatus::Cancelled),
        "COMPLETED" => Ok(BookingStatus::Completed),
        "NO_SHOW" => Ok(BookingStatus::NoShow),
        other => Err(anyhow::anyhow!("invalid booking status: {other}")),
    }
}

fn status_str(s: BookingStatus) -> &'static str {
    match s {
        BookingStatus::Pending => "PENDING",
        BookingStatus::Confirmed => "CONFIRMED",
        BookingStatus::Cancelled => "CANCELLED",
        BookingStatus::Completed => "COMPLETED",
        BookingStatus::NoShow => "NO_SHOW",
    }
}

fn parse_source(s: &str) -> anyhow::Result<BookingSource> {
    match s {
        "WEB" => Ok(BookingSource::Web),
        "API" => Ok(BookingSource::Api),
        "INTERNAL" => Ok(BookingSource::Internal),
        other => Err(anyhow::anyhow!("invalid booking source: {other}")),
    }
}

fn source_str(s: BookingSource) -> &'static str {
    match s {
        BookingSource::Web => "WEB",
        BookingSource::Api => "API",
        BookingSource::Internal => "INTERNAL",
    }
}

fn parse_cancelled_by(s: &str) -> anyhow::Result<CancelledBy> {
    match s {
        "HOST" => Ok(CancelledBy::Host),
        "ATTENDEE" => Ok(CancelledBy::Attendee),
        "SYSTEM" => Ok(CancelledBy::System),
        other => Err(anyhow::anyhow!("invalid cancelled_by: {other}")),
    }
}

fn cancelled_by_str(c: CancelledBy) -> &'static str {
    match c {
        CancelledBy::Host => "HOST",
        CancelledBy::Attendee => "ATTENDEE",
        CancelledBy::System => "SYSTEM",
    }
}

fn parse_actor_type(s: &str) -> anyhow::Result<ActorType> {
    match s {
        "USER" => Ok(ActorType::User),
        "API_KEY" => Ok(ActorType::ApiKey),
        "SYSTEM" => Ok(ActorType::System),
        "WEBHOOK" => Ok(ActorType::Webhook),
        other => Err(anyhow::anyhow!("invalid actor_type: {other}")),
    }
}

fn actor_type_str(a: ActorType) -> &'static str {
    match a {
        ActorType::User => "USER",
        ActorType::ApiKey => "API_KEY",
        ActorType::System => "SYSTEM",
        ActorType::Webhook => "WEBHOOK",
    }
}

fn parse_response_status(s: &str) -> anyhow::Result<ResponseStatus> {
    match s {
        "PENDING" => Ok(ResponseStatus::Pending),
        "ACCEPTED" => Ok(ResponseStatus::Accepted),
        "DECLINED" => Ok(ResponseStatus::Declined),
        other => Err(anyhow::anyhow!("invalid response_status: {other}")),
    }
}

fn response_status_str(r: ResponseStatus) -> &'static str {
    match r {
        ResponseStatus::Pending => "PENDING",
        ResponseStatus::Accepted => "ACCEPTED",
        ResponseStatus::Declined => "DECLINED",
    }
}

fn parse_audit_action(s: &str) -> anyhow::Result<AuditAction> {
    match s {
        "CREATED" => Ok(AuditAction::Created),
        "CONFIRMED" => Ok(AuditAction::Confirmed),
        "CANCELLED" => Ok(AuditAction::Cancelled),
        "RESCHEDULED" => Ok(AuditAction::Rescheduled),
        other => Err(anyhow::anyhow!("invalid audit action: {other}")),
    }
}

fn audit_action_str(a: AuditAction) -> &'static str {
    match a {
        AuditAction::Created => "CREATED",
        AuditAction::Confirmed => "CONFIRMED",
        AuditAction::Cancelled => "CANCELLED",
        AuditAction::Rescheduled => "RESCHEDULED",
    }
}

#[derive(Debug, FromRow)]
struct BookingRow {
    booking_uid: uuid::Uuid,
    public_uid: String,
    organization_uid: uuid::Uuid,
    event_type_uid: Option<uuid::Uuid>,
    host_uid: uuid::Uuid,
    start_time: DateTime<Utc>,
    end_time: DateTime<Utc>,
    timezone: String,
    status: String,
    source: String,
    rescheduled_from_uid: Option<uuid::Uuid>,
    title: Option<String>,
    description: Option<String>,
    meeting_url: Option<String>,
    cancelled_at: Option<DateTime<Utc>>,
    cancel_reason: Option<String>,
    cancelled_by: Option<String>,
}

impl TryFrom<BookingRow> for Booking {
    type Error = anyhow::Error;

    fn try_from(row: BookingRow) -> Result<Self, Self::Error> {
        Ok(Booking {
            id: row.booking_uid.into(),
            uid: row.public_uid,
            organization_id: row.organization_uid.into(),
            event_type_id: row.event_type_uid.map(Into::into),
            host_id: row.host_uid.into(),
            start_time: row.start_time,
            end_time: row.end_time,
            timezone: row
                .timezone
                .parse::<Tz>()
                .map_err(|_| anyhow::anyhow!("invalid stored timezone: {}", row.timezone))?,
            status: parse_status(&row.status)?,
            source: parse_source(&row.source)?,
            rescheduled_from: row.rescheduled_from_uid.map(Into::into),
            title: row.title,
            description: row.description,
            meeting_url: row.meeting_url,
            cancelled_at: row.cancelled_at,
            cancel_reason: row.cancel_reason,
            cancelled_by: row.cancelled_by.map(|s| parse_cancelled_by(&s)).transpose()?,
        })
    }
}

#[derive(Debug, FromRow)]
struct AttendeeRow {
    attendee_uid: uuid::Uuid,
    booking_uid: uuid::Uuid,
    email: String,
    name: String,
    phone: Option<String>,
    user_uid: Option<uuid::Uuid>,
    response_status: String,
    is_host: bool,
}

impl TryFrom<AttendeeRow> for Attendee {
    type Error = anyhow::Error;

    fn try_from(row: AttendeeRow) -> Result<Self, Self::Error> {
        Ok(Attendee {
            id: row.attendee_uid.into(),
            booking_id: row.booking_uid.into(),
            email: row.email,
            name: row.name,
            phone: row.phone,
            user_id: row.user_uid.map(Into::into),
            response_status: parse_response_status(&row.response_status)?,
            is_host: row.is_host,
        })
    }
}

#[derive(Debug, FromRow)]
struct AuditLogRow {
    audit_log_uid: uuid::Uuid,
    booking_uid: uuid::Uuid,
    action: String,
    actor_uid: Option<uuid::Uuid>,
    actor_type: String,
    details: serde_json::Value,
    created_at: DateTime<Utc>,
}

impl TryFrom<AuditLogRow> for BookingAuditLog {
    type Error = anyhow::Error;

    fn try_from(row: AuditLogRow) -> Result<Self, Self::Error> {
        Ok(BookingAuditLog {
            id: row.audit_log_uid.into(),
            booking_id: row.booking_uid.into(),
            action: parse_audit_action(&row.action)?,
            actor_id: row.actor_uid.map(Into::into),
            actor_type: parse_actor_type(&row.actor_type)?,
            details: row.details,
            created_at: row.created_at,
        })
    }
}

pub struct PostgresBookingRepo {
    pool: PgPool,
}

impl PostgresBookingRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl IBookingRepo for PostgresBookingRepo {
    async fn insert(&self, booking: &Booking) -> anyhow::Result<()> {
        sqlx::query(
            "INSERT INTO bookings (booking_uid, public_uid, organization_uid, event_type_uid, host_uid, start_time, end_time, timezone, status, source, rescheduled_from_uid, title, description, meeting_url, cancelled_at, cancel_reason, cancelled_by) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)",
        )
        .bind(*booking.id.as_ref())
        .bind(&booking.uid)
        .bind(*booking.organization_id.as_ref())
        .bind(booking.event_type_id.as_ref().map(|id| *id.as_ref()))
        .bind(*booking.host_id.as_ref())
        .bind(booking.start_time)
        .bind(booking.end_time)
        .bind(booking.timezone.to_string())
        .bind(status_str(booking.status))
        .bind(source_str(booking.source))
        .bind(booking.rescheduled_from.as_ref().map(|id| *id.as_ref()))
        .bind(&booking.title)
        .bind(&booking.description)
        .bind(&booking.meeting_url)
        .bind(booking.cancelled_at)
        .bind(&booking.cancel_reason)
        .bind(booking.cancelled_by.map(cancelled_by_str))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn insert_if_free(&self, booking: &Booking) -> anyhow::Result<InsertBookingOutcome> {
        let mut tx = self.pool.begin().await?;

        // Advisory locks are transaction-scoped (`_xact_lock`) and released
        // automatically on commit/rollback; `hashtext` folds the uuid down
        // to the i32 the lock table keys on.
        sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1))")
            .bind(booking.host_id.to_string())
            .execute(&mut *tx)
            .await?;

        let conflict: Option<(uuid::Uuid,)> = sqlx::query_as(
            "SELECT booking_uid FROM bookings WHERE host_uid = $1 AND status IN ('PENDING', 'CONFIRMED') AND start_time < $3 AND end_time > $2 LIMIT 1",
        )
        .bind(*booking.host_id.as_ref())
        .bind(booking.start_time)
        .bind(booking.end_time)
        .fetch_optional(&mut *tx)
        .await?;

        if conflict.is_some() {
            tx.rollback().await?;
            return Ok(InsertBookingOutcome::Conflict);
        }

        let insert = sqlx::query(
            "INSERT INTO bookings (booking_uid, public_uid, organization_uid, event_type_uid, host_uid, start_time, end_time, timezone, status, source, rescheduled_from_uid, title, description, meeting_url, cancelled_at, cancel_reason, cancelled_by) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)",
        )
        .bind(*booking.id.as_ref())
        .bind(&booking.uid)
        .bind(*booking.organization_id.as_ref())
        .bind(booking.event_type_id.as_ref().map(|id| *id.as_ref()))
        .bind(*booking.host_id.as_ref())
        .bind(booking.start_time)
        .bind(booking.end_time)
        .bind(booking.timezone.to_string())
        .bind(status_str(booking.status))
        .bind(source_str(booking.source))
        .bind(booking.rescheduled_from.as_ref().map(|id| *id.as_ref()))
        .bind(&booking.title)
        .bind(&booking.description)
        .bind(&booking.meeting_url)
        .bind(booking.cancelled_at)
        .bind(&booking.cancel_reason)
        .bind(booking.cancelled_by.map(cancelled_by_str))
        .execute(&mut *tx)
        .await;

        match insert {
            Ok(_) => {
                tx.commit().await?;
                Ok(InsertBookingOutcome::Inserted)
            }
            // 23P01 = exclusion_violation: the `bookings_no_host_overlap`
            // constraint caught an overlap the SELECT above missed (e.g. a
            // row inserted by a connection that bypassed the advisory
            // lock). Treat it the same as an application-level conflict.
            Err(sqlx::Error::Database(ref db_err)) if db_err.code().as_deref() == Some("23P01") => {
                tx.rollback().await?;
                Ok(InsertBookingOutcome::Conflict)
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn find(&self, id: &ID) -> anyhow::Result<Option<Booking>> {
        let row: Option<BookingRow> = sqlx::query_as(
            "SELECT booking_uid, public_uid, organization_uid, event_type_uid, host_uid, start_time, end_time, timezone, status, source, rescheduled_from_uid, title, description, meeting_url, cancelled_at, cancel_reason, cancelled_by \
             FROM bookings WHERE booking_uid = $1",
        )
        .bind(*id.as_ref())
        .fetch_optional(&self.pool)
        .await?;
        row.map(Booking::try_from).transpose()
    }

    async fn find_by_uid(&self, uid: &str) -> anyhow::Result<Option<Booking>> {
        let row: Option<BookingRow> = sqlx::query_as(
            "SELECT booking_uid, public_uid, organization_uid, event_type_uid, host_uid, start_time, end_time, timezone, status, source, rescheduled_from_uid, title, description, meeting_url, cancelled_at, cancel_reason, cancelled_by \
             FROM bookings WHERE public_uid = $1",
        )
        .bind(uid)
        .fetch_optional(&self.pool)
        .await?;
        row.map(Booking::try_from).transpose()
    }

    async fn update(&self, booking: &Booking) -> anyhow::Result<()> {
        sqlx::query(
            "UPDATE bookings SET event_type_uid = $2, host_uid = $3, start_time = $4, end_time = $5, timezone = $6, status = $7, source = $8, rescheduled_from_uid = $9, title = $10, description = $11, meeting_url = $12, cancelled_at = $13, cancel_reason = $14, cancelled_by = $15 \
             WHERE booking_uid = $1",
        )
        .bind(*booking.id.as_ref())
        .bind(booking.event_type_id.as_ref().map(|id| *id.as_ref()))
        .bind(*booking.host_id.as_ref())
        .bind(booking.start_time)
        .bind(booking.end_time)
        .bind(booking.timezone.to_string())
        .bind(status_str(booking.status))
        .bind(source_str(booking.source))
        .bind(booking.rescheduled_from.as_ref().map(|id| *id.as_ref()))
        .bind(&booking.title)
        .bind(&booking.description)
        .bind(&booking.meeting_url)
        .bind(booking.cancelled_at)
        .bind(&booking.cancel_reason)
        .bind(booking.cancelled_by.map(cancelled_by_str))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find_active_overlapping(
        &self,
        host_id: &ID,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> anyhow::Result<Vec<Booking>> {
        let rows: Vec<BookingRow> = sqlx::query_as(
            "SELECT booking_uid, public_uid, organization_uid, event_type_uid, host_uid, start_time, end_time, timezone, status, source, rescheduled_from_uid, title, description, meeting_url, cancelled_at, cancel_reason, cancelled_by \
             FROM bookings WHERE host_uid = $1 AND status IN ('PENDING', 'CONFIRMED') AND start_time < $3 AND end_time > $2",
        )
        .bind(*host_id.as_ref())
        .bind(start)
        .bind(end)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(Booking::try_from).collect()
    }

    async fn find_active_resource_overlapping(
        &self,
        resource_id: &ID,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> anyhow::Result<Vec<Booking>> {
        let rows: Vec<BookingRow> = sqlx::query_as(
            "SELECT b.booking_uid, b.public_uid, b.organization_uid, b.event_type_uid, b.host_uid, b.start_time, b.end_time, b.timezone, b.status, b.source, b.rescheduled_from_uid, b.title, b.description, b.meeting_url, b.cancelled_at, b.cancel_reason, b.cancelled_by \
             FROM bookings b \
             JOIN booking_resources r ON r.booking_uid = b.booking_uid \
             WHERE r.resource_uid = $1 AND b.status IN ('PENDING', 'CONFIRMED') AND b.start_time < $3 AND b.end_time > $2",
        )
        .bind(*resource_id.as_ref())
        .bind(start)
        .bind(end)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(Booking::try_from).collect()
    }

    async fn count_active_on_day(&self, host_id: &ID, day_start: DateTime<Utc>, day_end: DateTime<Utc>) -> anyhow::Result<u32> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM bookings WHERE host_uid = $1 AND status IN ('PENDING', 'CONFIRMED') AND start_time >= $2 AND start_time < $3",
        )
        .bind(*host_id.as_ref())
        .bind(day_start)
        .bind(day_end)
        .fetch_one(&self.pool)
        .await?;
        Ok(count as u32)
    }

    async fn insert_attendee(&self, attendee: &Attendee) -> anyhow::Result<()> {
        sqlx::query(
            "INSERT INTO booking_attendees (attendee_uid, booking_uid, email, name, phone, user_uid, response_status, is_host) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
        )
        .bind(*attendee.id.as_ref())
        .bind(*attendee.booking_id.as_ref())
        .bind(&attendee.email)
        .bind(&attendee.name)
        .bind(&attendee.phone)
        .bind(attendee.user_id.as_ref().map(|id| *id.as_ref()))
        .bind(response_status_str(attendee.response_status))
        .bind(attendee.is_host)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find_attendees(&self, booking_id: &ID) -> anyhow::Result<Vec<Attendee>> {
        let rows: Vec<AttendeeRow> = sqlx::query_as(
            "SELECT attendee_uid, booking_uid, email, name, phone, user_uid, response_status, is_host FROM booking_attendees WHERE booking_uid = $1",
        )
        .bind(*booking_id.as_ref())
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(Attendee::try_from).collect()
    }

    async fn insert_resource(&self, resource: &BookingResource) -> anyhow::Result<()> {
        sqlx::query("INSERT INTO booking_resources (booking_uid, resource_uid) VALUES ($1, $2)")
            .bind(*resource.booking_id.as_ref())
            .bind(*resource.resource_id.as_ref())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn insert_audit_log(&self, entry: &BookingAuditLog) -> anyhow::Result<()> {
        sqlx::query(
            "INSERT INTO booking_audit_logs (audit_log_uid, booking_uid, action, actor_uid, actor_type, details, created_at) VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(*entry.id.as_ref())
        .bind(*entry.booking_id.as_ref())
        .bind(audit_action_str(entry.action))
        .bind(entry.actor_id.as_ref().map(|id| *id.as_ref()))
        .bind(actor_type_str(entry.actor_type))
        .bind(&entry.details)
        .bind(entry.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find_audit_logs(&self, booking_id: &ID) -> anyhow::Result<Vec<BookingAuditLog>> {
        let rows: Vec<AuditLogRow> = sqlx::query_as(
            "SELECT audit_log_uid, booking_uid, action, actor_uid, actor_type, details, created_at FROM booking_audit_logs WHERE booking_uid = $1 ORDER BY created_at ASC",
        )
        .bind(*booking_id.as_ref())
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(BookingAuditLog::try_from).collect()
    }
}

/// In-process fake. Overlap/day-count queries replicate the Postgres
/// predicates directly instead of delegating to `scheduling_domain`'s
/// interval arithmetic, so that a repo-level test failure points at the
/// query logic rather than at the domain engine.
#[derive(Default)]
pub struct InMemoryBookingRepo {
    bookings: RwLock<HashMap<ID, Booking>>,
    attendees: RwLock<HashMap<ID, Vec<Attendee>>>,
    resources: RwLock<HashMap<ID, Vec<BookingResource>>>,
    audit_logs: RwLock<HashMap<ID, Vec<BookingAuditLog>>>,
    /// Stands in for the Postgres advisory lock: serializes
    /// `insert_if_free` across the whole repo rather than per-host, which
    /// is coarser than production but sufficient to make the single-process
    /// test suite exercise the same check-then-insert race the real
    /// backend closes.
    insert_guard: Mutex<()>,
}

impl InMemoryBookingRepo {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }
}

#[async_trait::async_trait]
impl IBookingRepo for InMemoryBookingRepo {
    async fn insert(&self, booking: &Booking) -> anyhow::Result<()> {
        self.bookings.write().await.insert(booking.id.clone(), booking.clone());
        Ok(())
    }

    async fn insert_if_free(&self, booking: &Booking) -> anyhow::Result<InsertBookingOutcome> {
        let _guard = self.insert_guard.lock().await;
        let conflicting = self.find_active_overlapping(&booking.host_id, booking.start_time, booking.end_time).await?;
        if !conflicting.is_empty() {
            return Ok(InsertBookingOutcome::Conflict);
        }
        self.bookings.write().await.insert(booking.id.clone(), booking.clone());
        Ok(InsertBookingOutcome::Inserted)
    }

    async fn find(&self, id: &ID) -> anyhow::Result<Option<Booking>> {
        Ok(self.bookings.read().await.get(id).cloned())
    }

    async fn find_by_uid(&self, uid: &str) -> anyhow::Result<Option<Booking>> {
        Ok(self.bookings.read().await.values().find(|b| b.uid == uid).cloned())
    }

    async fn update(&self, booking: &Booking) -> anyhow::Result<()> {
        self.bookings.write().await.insert(booking.id.clone(), booking.clone());
        Ok(())
    }

    async fn find_active_overlapping(
        &self,
        host_id: &ID,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> anyhow::Result<Vec<Booking>> {
        Ok(self
            .bookings
            .read()
            .await
            .values()
            .filter(|b| {
                &b.host_id == host_id
                    && b.status.is_active()
                    && b.start_time < end
                    && b.end_time > start
            })
            .cloned()
            .collect())
    }

    async fn count_active_on_day(&self, host_id: &ID, day_start: DateTime<Utc>, day_end: DateTime<Utc>) -> anyhow::Result<u32> {
        Ok(self
            .bookings
            .read()
            .await
            .values()
            .filter(|b| {
                &b.host_id == host_id
                    && b.status.is_active()
                    && b.start_time >= day_start
                    && b.start_time < day_end
            })
            .count() as u32)
    }

    async fn find_active_resource_overlapping(
        &self,
        resource_id: &ID,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> anyhow::Result<Vec<Booking>> {
        let resources = self.resources.read().await;
        let bookings = self.bookings.read().await;
        Ok(resources
            .iter()
            .filter(|(_, links)| links.iter().any(|r| &r.resource_id == resource_id))
            .filter_map(|(booking_id, _)| bookings.get(booking_id))
            .filter(|b| b.status.is_active() && b.start_time < end && b.end_time > start)
            .cloned()
            .collect())
    }

    async fn insert_attendee(&self, attendee: &Attendee) -> anyhow::Result<()> {
        self.attendees
            .write()
            .await
            .entry(attendee.booking_id.clone())
            .or_default()
            .push(attendee.clone());
        Ok(())
    }

    async fn find_attendees(&self, booking_id: &ID) -> anyhow::Result<Vec<Attendee>> {
        Ok(self.attendees.read().await.get(booking_id).cloned().unwrap_or_default())
    }

    async fn insert_resource(&self, resource: &BookingResource) -> anyhow::Result<()> {
        self.resources
            .write()
            .await
            .entry(resource.booking_id.clone())
            .or_default()
            .push(resource.clone());
        Ok(())
    }

    async fn insert_audit_log(&self, entry: &BookingAuditLog) -> anyhow::Result<()> {
        self.audit_logs
            .write()
            .await
            .entry(entry.booking_id.clone())
            .or_default()
            .push(entry.clone());
        Ok(())
    }

    async fn find_audit_logs(&self, booking_id: &ID) -> anyhow::Result<Vec<BookingAuditLog>> {
        Ok(self.audit_logs.read().await.get(booking_id).cloned().unwrap_or_default())
    }
}

/// The tenant-scope interceptor for `Booking`. `AuditLog` rows are
/// intentionally NOT filtered here -- they're reached only via
/// `find_audit_logs(booking_id)` after the caller already holds a
/// scope-checked `Booking`, matching the "scoped transitively through the
/// parent booking, never directly" rule.
pub struct TenantScopedBookingRepo<R: IBookingRepo> {
    inner: Arc<R>,
    scope: TenantScope,
}

impl<R: IBookingRepo> TenantScopedBookingRepo<R> {
    pub fn new(inner: Arc<R>, scope: TenantScope) -> Self {
        Self { inner, scope }
    }
}

#[async_trait::async_trait]
impl<R: IBookingRepo> IBookingRepo for TenantScopedBookingRepo<R> {
    async fn insert(&self, booking: &Booking) -> anyhow::Result<()> {
        if let Some(scope_org) = self.scope.organization_id() {
            if scope_org != &booking.organization_id {
                anyhow::bail!("tenant scope mismatch on booking insert");
            }
        }
        self.inner.insert(booking).await
    }

    async fn insert_if_free(&self, booking: &Booking) -> anyhow::Result<InsertBookingOutcome> {
        if let Some(scope_org) = self.scope.organization_id() {
            if scope_org != &booking.organization_id {
                anyhow::bail!("tenant scope mismatch on booking insert");
            }
        }
        self.inner.insert_if_free(booking).await
    }

    async fn find(&self, id: &ID) -> anyhow::Result<Option<Booking>> {
        let found = self.inner.find(id).await?;
        Ok(found.filter(|b| self.scope.allows(&b.organization_id)))
    }

    async fn find_by_uid(&self, uid: &str) -> anyhow::Result<Option<Booking>> {
        let found = self.inner.find_by_uid(uid).await?;
        Ok(found.filter(|b| self.scope.allows(&b.organization_id)))
    }

    async fn update(&self, booking: &Booking) -> anyhow::Result<()> {
        if !self.scope.allows(&booking.organization_id) {
            anyhow::bail!("tenant scope mismatch on booking update");
        }
        self.inner.update(booking).await
    }

    async fn find_active_overlapping(
        &self,
        host_id: &ID,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> anyhow::Result<Vec<Booking>> {
        let rows = self.inner.find_active_overlapping(host_id, start, end).await?;
        Ok(rows.into_iter().filter(|b| self.scope.allows(&b.organization_id)).collect())
    }

    async fn find_active_resource_overlapping(
        &self,
        resource_id: &ID,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> anyhow::Result<Vec<Booking>> {
        let rows = self.inner.find_active_resource_overlapping(resource_id, start, end).await?;
        Ok(rows.into_iter().filter(|b| self.scope.allows(&b.organization_id)).collect())
    }

    async fn count_active_on_day(&self, host_id: &ID, day_start: DateTime<Utc>, day_end: DateTime<Utc>) -> anyhow::Result<u32> {
        self.inner.count_active_on_day(host_id, day_start, day_end).await
    }

    async fn insert_attendee(&self, attendee: &Attendee) -> anyhow::Result<()> {
        self.inner.insert_attendee(attendee).await
    }

    async fn find_attendees(&self, booking_id: &ID) -> anyhow::Result<Vec<Attendee>> {
        self.inner.find_attendees(booking_id).await
    }

    async fn insert_resource(&self, resource: &BookingResource) -> anyhow::Result<()> {
        self.inner.insert_resource(resource).await
    }

    async fn insert_audit_log(&self, entry: &BookingAuditLog) -> anyhow::Result<()> {
        self.inner.insert_audit_log(entry).await
    }

    async fn find_audit_logs(&self, booking_id: &ID) -> anyhow::Result<Vec<BookingAuditLog>> {
        self.inner.find_audit_logs(booking_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_booking(org: ID, host: ID, start_ms: i64, end_ms: i64) -> Booking {
        Booking {
            id: ID::default(),
            uid: "abc123xyz789".into(),
            organization_id: org,
            event_type_id: None,
            host_id: host,
            start_time: DateTime::from_timestamp_millis(start_ms).unwrap(),
            end_time: DateTime::from_timestamp_millis(end_ms).unwrap(),
            timezone: chrono_tz::UTC,
            status: BookingStatus::Confirmed,
            source: BookingSource::Web,
            rescheduled_from: None,
            title: None,
            description: None,
            meeting_url: None,
            cancelled_at: None,
            cancel_reason: None,
            cancelled_by: None,
        }
    }

    #[tokio::test]
    async fn find_active_overlapping_matches_half_open_interval() {
        let repo = InMemoryBookingRepo::new();
        let host = ID::default();
        let booking = sample_booking(ID::default(), host.clone(), 0, 1_800_000);
        repo.insert(&booking).await.unwrap();

        let touching = repo
            .find_active_overlapping(
                &host,
                DateTime::from_timestamp_millis(1_800_000).unwrap(),
                DateTime::from_timestamp_millis(3_600_000).unwrap(),
            )
            .await
            .unwrap();
        assert!(touching.is_empty(), "touching interval must not count as overlap");

        let overlapping = repo
            .find_active_overlapping(
                &host,
                DateTime::from_timestamp_millis(900_000).unwrap(),
                DateTime::from_timestamp_millis(2_700_000).unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(overlapping.len(), 1);
    }

    #[tokio::test]
    async fn insert_if_free_rejects_overlapping_booking_for_same_host() {
        let repo = InMemoryBookingRepo::new();
        let host = ID::default();
        let first = sample_booking(ID::default(), host.clone(), 0, 1_800_000);
        assert_eq!(repo.insert_if_free(&first).await.unwrap(), InsertBookingOutcome::Inserted);

        let overlapping = sample_booking(ID::default(), host.clone(), 900_000, 2_700_000);
        assert_eq!(repo.insert_if_free(&overlapping).await.unwrap(), InsertBookingOutcome::Conflict);

        let touching = sample_booking(ID::default(), host, 1_800_000, 3_600_000);
        assert_eq!(repo.insert_if_free(&touching).await.unwrap(), InsertBookingOutcome::Inserted);
    }

    #[tokio::test]
    async fn scoped_repo_hides_cross_tenant_bookings() {
        let inner = InMemoryBookingRepo::new();
        let org_a = ID::default();
        let org_b = ID::default();
        let booking = sample_booking(org_a.clone(), ID::default(), 0, 1_800_000);
        inner.insert(&booking).await.unwrap();

        let scoped = TenantScopedBookingRepo::new(inner, TenantScope::scoped(org_b));
        assert!(scoped.find(&booking.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn scoped_repo_rejects_cross_tenant_insert() {
        let inner = InMemoryBookingRepo::new();
        let org_a = ID::default();
        let org_b = ID::default();
        let booking = sample_booking(org_a, ID::default(), 0, 1_800_000);

        let scoped = TenantScopedBookingRepo::new(inner, TenantScope::scoped(org_b));
        assert!(scoped.insert(&booking).await.is_err());
    }
}
