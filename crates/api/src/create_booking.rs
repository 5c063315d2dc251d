use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use scheduling_domain::{
    booking::{
        ActorType, Attendee, AuditAction, Booking, BookingAuditLog, BookingResource, BookingSource,
        BookingStatus, ResponseStatus,
    },
    event_type::{AssignmentType, LocationType},
    ID,
};
use scheduling_infra::{
    repos::{
        booking::InsertBookingOutcome,
        event_type::{IEventTypeRepo, TenantScopedEventTypeRepo},
    },
    queue::JobPayload,
    AppContext, TenantScope,
};
use serde_json::json;
use thiserror::Error;
use tracing::warn;

use crate::{error::SchedulingError, shared::usecase::UseCase};

#[derive(Debug, Clone)]
pub struct CreateBookingAttendee {
    pub email: String,
    pub name: String,
    pub phone: Option<String>,
    pub user_id: Option<ID>,
}

/// Input to create a new booking.
#[derive(Debug)]
pub struct CreateBookingUseCase {
    pub organization_id: ID,
    pub event_type_id: Option<ID>,
    pub host_id: ID,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub timezone: Tz,
    pub title: Option<String>,
    pub description: Option<String>,
    pub attendee: CreateBookingAttendee,
    pub resource_ids: Vec<ID>,
    pub source: BookingSource,
    pub actor_id: Option<ID>,
    pub actor_type: ActorType,
}

impl CreateBookingUseCase {
    /// Stamps `source`/`actor_id`/`actor_type` from the caller's request
    /// context (§4.1: `source` is API if `apiKeyId` is set, else WEB;
    /// `actorType` is `apiKeyId ? API_KEY : userId ? USER : SYSTEM`).
    pub fn apply_request_context(&mut self, ctx: &crate::shared::request_context::RequestContext) {
        self.source = ctx.booking_source();
        self.actor_id = ctx.actor_id();
        self.actor_type = ctx.actor_type();
    }
}

#[derive(Debug, Error)]
pub enum CreateBookingError {
    #[error("{0}")]
    Validation(String),
    #[error("event type not found")]
    EventTypeNotFound,
    #[error("{0}")]
    Conflict(String),
    #[error(transparent)]
    Infra(#[from] anyhow::Error),
}

impl From<CreateBookingError> for SchedulingError {
    fn from(e: CreateBookingError) -> Self {
        match e {
            CreateBookingError::Validation(msg) => SchedulingError::Validation(msg),
            CreateBookingError::EventTypeNotFound => SchedulingError::NotFound("event type not found".into()),
            CreateBookingError::Conflict(msg) => SchedulingError::Conflict(msg),
            CreateBookingError::Infra(e) => e.into(),
        }
    }
}

/// Synthesizes an opaque meeting URL for `locationType = MEET` bookings.
/// The real generator is an external collaborator (video-conferencing
/// integration); this stands in with a stable, unguessable path under a
/// placeholder host.
fn synthesize_meeting_url(booking_uid: &str) -> String {
    format!("https://meet.example.com/{booking_uid}")
}

#[async_trait::async_trait]
impl UseCase for CreateBookingUseCase {
    type Response = Booking;
    type Error = CreateBookingError;

    const NAME: &'static str = "CreateBooking";

    async fn execute(&mut self, ctx: &AppContext) -> Result<Self::Response, Self::Error> {
        if self.end <= self.start {
            return Err(CreateBookingError::Validation("end must be after start".into()));
        }
        if self.attendee.email.trim().is_empty() {
            return Err(CreateBookingError::Validation("attendee email is required".into()));
        }

        let tenant_scope = TenantScope::scoped(self.organization_id.clone());

        let event_type = match &self.event_type_id {
            Some(id) => {
                let event_type = TenantScopedEventTypeRepo::new(ctx.repos.event_types.clone(), tenant_scope.clone())
                    .find(id)
                    .await?
                    .filter(|e| e.is_visible());
                Some(event_type.ok_or(CreateBookingError::EventTypeNotFound)?)
            }
            None => None,
        };

        // Best-effort slot lock. Unavailability of the lock service must
        // never block booking -- only another holder's lock does.
        // `acquire` returning `Ok(None)` is itself ambiguous between
        // "someone holds it" and "lock store down", so both are treated
        // the same way: proceed to the transactional re-check, which is
        // the actual correctness guarantee.
        let lock_handle = match ctx.slot_lock.acquire(&self.host_id, self.start.timestamp_millis(), self.end.timestamp_millis()).await {
            Ok(handle) => handle,
            Err(e) => {
                warn!(error = %e, "slot lock service unavailable, proceeding without a lock");
                None
            }
        };

        let result = self.create_inner(ctx, event_type.as_ref()).await;

        // Lock release happens-before fan-out, regardless of whether the
        // create itself succeeded.
        if let Some(handle) = lock_handle {
            if let Err(e) = ctx.slot_lock.release(&handle).await {
                warn!(error = %e, "failed to release slot lock");
            }
        }

        let booking = result?;

        self.fan_out(ctx, &booking).await;

        Ok(booking)
    }
}

impl CreateBookingUseCase {
    async fn create_inner(
        &self,
        ctx: &AppContext,
        event_type: Option<&scheduling_domain::event_type::EventType>,
    ) -> Result<Booking, CreateBookingError> {
        for resource_id in &self.resource_ids {
            let conflicting = ctx
                .repos
                .bookings
                .find_active_resource_overlapping(resource_id, self.start, self.end)
                .await?;
            if !conflicting.is_empty() {
                return Err(CreateBookingError::Conflict("resource is already booked for this time".into()));
            }
        }

        let requires_confirmation = event_type.map(|e| e.requires_confirmation).unwrap_or(false);
        let uid = scheduling_utils::create_short_uid(12);
        let meeting_url = if matches!(event_type, Some(e) if e.location_type == LocationType::Meet) {
            Some(synthesize_meeting_url(&uid))
        } else {
            None
        };

        let booking = Booking {
            id: ID::default(),
            uid,
            organization_id: self.organization_id.clone(),
            event_type_id: self.event_type_id.clone(),
            host_id: self.host_id.clone(),
            start_time: self.start,
            end_time: self.end,
            timezone: self.timezone,
            status: if requires_confirmation { BookingStatus::Pending } else { BookingStatus::Confirmed },
            source: self.source,
            rescheduled_from: None,
            title: self.title.clone(),
            description: self.description.clone(),
            meeting_url,
            cancelled_at: None,
            cancel_reason: None,
            cancelled_by: None,
        };

        // The transactional re-verify-and-insert is the hard guarantee;
        // the slot lock above is an optimization in front of it.
        let outcome = ctx.repos.bookings.insert_if_free(&booking).await?;
        if outcome == InsertBookingOutcome::Conflict {
            return Err(CreateBookingError::Conflict("slot is already booked".into()));
        }

        let attendee = Attendee {
            id: ID::default(),
            booking_id: booking.id.clone(),
            email: self.attendee.email.to_lowercase(),
            name: self.attendee.name.clone(),
            phone: self.attendee.phone.clone(),
            user_id: self.attendee.user_id.clone(),
            response_status: ResponseStatus::Pending,
            is_host: false,
        };
        ctx.repos.bookings.insert_attendee(&attendee).await?;

        for resource_id in &self.resource_ids {
            ctx.repos
                .bookings
                .insert_resource(&BookingResource {
                    booking_id: booking.id.clone(),
                    resource_id: resource_id.clone(),
                })
                .await?;
        }

        // Round-robin fairness counters.
        if let (Some(event_type), AssignmentType::RoundRobin) = (event_type, event_type.map(|e| e.assignment_type).unwrap_or(AssignmentType::Single)) {
            ctx.repos
                .event_types
                .record_booking(&event_type.id, &self.host_id, ctx.clock.now())
                .await?;
        }

        let audit = BookingAuditLog {
            id: ID::default(),
            booking_id: booking.id.clone(),
            action: AuditAction::Created,
            actor_id: self.actor_id.clone(),
            actor_type: self.actor_type,
            details: json!({ "hostId": self.host_id.to_string() }),
            created_at: ctx.clock.now(),
        };
        ctx.repos.bookings.insert_audit_log(&audit).await?;

        Ok(booking)
    }

    /// Post-commit, non-fatal fan-out. Any enqueue failure is logged and
    /// the booking is still returned successfully -- everything after
    /// commit is best-effort.
    async fn fan_out(&self, ctx: &AppContext, booking: &Booking) {
        let now = ctx.clock.now();

        if let Err(e) = ctx
            .notifications
            .enqueue(
                &format!("notification:booking-created:{}", booking.id),
                JobPayload::BookingCreatedNotification { booking_id: booking.id.clone() },
                now,
                3,
            )
            .await
        {
            warn!(error = %e, booking_id = %booking.id, "failed to enqueue booking-created notification");
        }

        if let Err(e) = ctx
            .webhooks
            .enqueue(
                &format!("webhook:booking-created:{}", booking.id),
                JobPayload::Webhook {
                    organization_id: booking.organization_id.clone(),
                    event: "booking.created".into(),
                    payload: json!({
                        "id": booking.id.to_string(),
                        "uid": booking.uid,
                        "status": format!("{:?}", booking.status),
                        "startTime": booking.start_time,
                        "endTime": booking.end_time,
                        "meetingUrl": booking.meeting_url,
                    }),
                },
                now,
                3,
            )
            .await
        {
            warn!(error = %e, booking_id = %booking.id, "failed to enqueue booking.created webhook");
        }

        if let Err(e) = ctx.reminders.schedule_for_booking(&booking.id, booking.start_time, now).await {
            warn!(error = %e, booking_id = %booking.id, "failed to schedule reminders");
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;
    use scheduling_domain::event_type::{AssignmentType, EventType, LocationType};
    use scheduling_infra::repos::event_type::IEventTypeRepo;

    use super::*;
    use crate::shared::usecase::execute;

    fn attendee() -> CreateBookingAttendee {
        CreateBookingAttendee {
            email: "attendee@example.com".into(),
            name: "Attendee".into(),
            phone: None,
            user_id: None,
        }
    }

    fn basic_usecase(organization_id: ID, host_id: ID, start: DateTime<Utc>, end: DateTime<Utc>) -> CreateBookingUseCase {
        CreateBookingUseCase {
            organization_id,
            event_type_id: None,
            host_id,
            start,
            end,
            timezone: chrono_tz::UTC,
            title: None,
            description: None,
            attendee: attendee(),
            resource_ids: Vec::new(),
            source: BookingSource::Web,
            actor_id: None,
            actor_type: ActorType::ApiKey,
        }
    }

    fn sample_event_type(organization_id: ID, assignment_type: AssignmentType, requires_confirmation: bool) -> EventType {
        EventType {
            id: ID::default(),
            organization_id,
            owner_id: None,
            slug: "intro-call".into(),
            duration_minutes: 30,
            assignment_type,
            location_type: LocationType::Meet,
            requires_confirmation,
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
    async fn rejects_inverted_timespan() {
        let ctx = scheduling_infra::setup_in_memory_context();
        let start = Utc::now() + Duration::hours(1);
        let usecase = basic_usecase(ID::default(), ID::default(), start, start - Duration::minutes(30));
        let err = execute(usecase, &ctx).await.unwrap_err();
        assert!(matches!(err, CreateBookingError::Validation(_)));
    }

    #[tokio::test]
    async fn rejects_blank_attendee_email() {
        let ctx = scheduling_infra::setup_in_memory_context();
        let start = Utc::now() + Duration::hours(1);
        let mut usecase = basic_usecase(ID::default(), ID::default(), start, start + Duration::minutes(30));
        usecase.attendee.email = "   ".into();
        let err = execute(usecase, &ctx).await.unwrap_err();
        assert!(matches!(err, CreateBookingError::Validation(_)));
    }

    #[tokio::test]
    async fn creates_confirmed_booking_without_event_type() {
        let ctx = scheduling_infra::setup_in_memory_context();
        let start = Utc::now() + Duration::hours(1);
        let usecase = basic_usecase(ID::default(), ID::default(), start, start + Duration::minutes(30));
        let booking = execute(usecase, &ctx).await.unwrap();
        assert_eq!(booking.status, BookingStatus::Confirmed);
        assert!(booking.meeting_url.is_none());
    }

    #[tokio::test]
    async fn event_type_requiring_confirmation_creates_pending_booking_with_meeting_url() {
        let ctx = scheduling_infra::setup_in_memory_context();
        let organization_id = ID::default();
        let event_type = sample_event_type(organization_id.clone(), AssignmentType::Single, true);
        ctx.repos.event_types.insert(&event_type).await.unwrap();

        let start = Utc::now() + Duration::hours(1);
        let mut usecase = basic_usecase(organization_id, ID::default(), start, start + Duration::minutes(30));
        usecase.event_type_id = Some(event_type.id.clone());

        let booking = execute(usecase, &ctx).await.unwrap();
        assert_eq!(booking.status, BookingStatus::Pending);
        assert!(booking.meeting_url.is_some());
    }

    #[tokio::test]
    async fn unknown_event_type_is_rejected() {
        let ctx = scheduling_infra::setup_in_memory_context();
        let start = Utc::now() + Duration::hours(1);
        let mut usecase = basic_usecase(ID::default(), ID::default(), start, start + Duration::minutes(30));
        usecase.event_type_id = Some(ID::default());

        let err = execute(usecase, &ctx).await.unwrap_err();
        assert!(matches!(err, CreateBookingError::EventTypeNotFound));
    }

    #[tokio::test]
    async fn overlapping_booking_for_same_host_is_a_conflict() {
        let ctx = scheduling_infra::setup_in_memory_context();
        let host_id = ID::default();
        let start = Utc::now() + Duration::hours(1);
        let end = start + Duration::minutes(30);

        execute(basic_usecase(ID::default(), host_id.clone(), start, end), &ctx).await.unwrap();

        let overlapping = basic_usecase(ID::default(), host_id, start + Duration::minutes(15), end + Duration::minutes(15));
        let err = execute(overlapping, &ctx).await.unwrap_err();
        assert!(matches!(err, CreateBookingError::Conflict(_)));
    }

    #[tokio::test]
    async fn overlapping_booking_for_shared_resource_is_a_conflict() {
        let ctx = scheduling_infra::setup_in_memory_context();
        let resource_id = ID::default();
        let start = Utc::now() + Duration::hours(1);
        let end = start + Duration::minutes(30);

        let mut first = basic_usecase(ID::default(), ID::default(), start, end);
        first.resource_ids = vec![resource_id.clone()];
        execute(first, &ctx).await.unwrap();

        // Different host, same resource, overlapping time.
        let mut second = basic_usecase(ID::default(), ID::default(), start, end);
        second.resource_ids = vec![resource_id];
        let err = execute(second, &ctx).await.unwrap_err();
        assert!(matches!(err, CreateBookingError::Conflict(_)));
    }

    #[tokio::test]
    async fn round_robin_event_type_bumps_host_booking_count() {
        let ctx = scheduling_infra::setup_in_memory_context();
        let organization_id = ID::default();
        let host_id = ID::default();
        let event_type = sample_event_type(organization_id.clone(), AssignmentType::RoundRobin, false);
        ctx.repos.event_types.insert(&event_type).await.unwrap();
        ctx.repos
            .event_types
            .insert_host(&scheduling_domain::event_type::EventTypeHost {
                event_type_id: event_type.id.clone(),
                user_id: host_id.clone(),
                priority: 0,
                is_active: true,
                booking_count: 0,
                last_booked_at: None,
            })
            .await
            .unwrap();

        let start = Utc::now() + Duration::hours(1);
        let mut usecase = basic_usecase(organization_id, host_id.clone(), start, start + Duration::minutes(30));
        usecase.event_type_id = Some(event_type.id.clone());
        execute(usecase, &ctx).await.unwrap();

        let hosts = ctx.repos.event_types.find_active_hosts(&event_type.id).await.unwrap();
        let host = hosts.iter().find(|h| h.user_id == host_id).unwrap();
        assert_eq!(host.booking_count, 1);
        assert!(host.last_booked_at.is_some());
    }
}
