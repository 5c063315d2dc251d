use scheduling_domain::{
    booking::{ActorType, AuditAction, Booking, BookingAuditLog, BookingTransitionError, CancelledBy},
    ID,
};
use scheduling_infra::{
    queue::JobPayload,
    repos::booking::{IBookingRepo, TenantScopedBookingRepo},
    AppContext, TenantScope,
};
use serde_json::json;
use thiserror::Error;
use tracing::warn;

use crate::{error::SchedulingError, shared::usecase::UseCase};

/// Cancels a booking: validates the state transition, writes the audit
/// entry, and fans out cancellation notifications.
#[derive(Debug)]
pub struct CancelBookingUseCase {
    pub tenant_scope: TenantScope,
    pub booking_id: ID,
    pub reason: Option<String>,
    pub cancelled_by: CancelledBy,
    pub actor_id: Option<ID>,
    pub actor_type: ActorType,
}

impl CancelBookingUseCase {
    /// Stamps `actor_id`/`actor_type` from the caller's request context
    /// (§4.1: `actorType` is `apiKeyId ? API_KEY : userId ? USER : SYSTEM`).
    pub fn apply_request_context(&mut self, ctx: &crate::shared::request_context::RequestContext) {
        self.actor_id = ctx.actor_id();
        self.actor_type = ctx.actor_type();
    }
}

#[derive(Debug, Error)]
pub enum CancelBookingError {
    #[error("not found")]
    NotFound,
    #[error("booking is already cancelled")]
    AlreadyCancelled,
    #[error(transparent)]
    Infra(#[from] anyhow::Error),
}

impl From<CancelBookingError> for SchedulingError {
    fn from(e: CancelBookingError) -> Self {
        match e {
            CancelBookingError::NotFound => SchedulingError::NotFound("booking not found".into()),
            CancelBookingError::AlreadyCancelled => SchedulingError::Validation("booking is already cancelled".into()),
            CancelBookingError::Infra(e) => e.into(),
        }
    }
}

/// `/public/booking/{uid}/cancel` (§6): resolves a booking by its public
/// `uid` and refuses unless the supplied email matches one of the
/// booking's attendees' emails, case-insensitively (§3: "First attendee is
/// the public cancellation identity"; §6: "the core refuses if none of the
/// booking's attendees' emails ... match"). On a match, cancels with
/// `cancelledBy = ATTENDEE` by delegating to `CancelBookingUseCase`.
#[derive(Debug)]
pub struct CancelBookingByUidUseCase {
    pub booking_uid: String,
    pub email: String,
    pub reason: Option<String>,
}

#[derive(Debug, Error)]
pub enum CancelBookingByUidError {
    #[error("not found")]
    NotFound,
    #[error("email does not match any attendee on this booking")]
    EmailMismatch,
    #[error("booking is already cancelled")]
    AlreadyCancelled,
    #[error(transparent)]
    Infra(#[from] anyhow::Error),
}

impl From<CancelBookingByUidError> for SchedulingError {
    fn from(e: CancelBookingByUidError) -> Self {
        match e {
            CancelBookingByUidError::NotFound => SchedulingError::NotFound("booking not found".into()),
            CancelBookingByUidError::EmailMismatch => {
                SchedulingError::Validation("email does not match any attendee on this booking".into())
            }
            CancelBookingByUidError::AlreadyCancelled => SchedulingError::Validation("booking is already cancelled".into()),
            CancelBookingByUidError::Infra(e) => e.into(),
        }
    }
}

impl From<CancelBookingError> for CancelBookingByUidError {
    fn from(e: CancelBookingError) -> Self {
        match e {
            CancelBookingError::NotFound => CancelBookingByUidError::NotFound,
            CancelBookingError::AlreadyCancelled => CancelBookingByUidError::AlreadyCancelled,
            CancelBookingError::Infra(e) => CancelBookingByUidError::Infra(e),
        }
    }
}

#[async_trait::async_trait]
impl UseCase for CancelBookingByUidUseCase {
    type Response = Booking;
    type Error = CancelBookingByUidError;

    const NAME: &'static str = "CancelBookingByUid";

    async fn execute(&mut self, ctx: &AppContext) -> Result<Self::Response, Self::Error> {
        let booking = ctx
            .repos
            .bookings
            .find_by_uid(&self.booking_uid)
            .await?
            .ok_or(CancelBookingByUidError::NotFound)?;

        let attendees = ctx.repos.bookings.find_attendees(&booking.id).await?;
        let email_matches = attendees.iter().any(|a| a.email.eq_ignore_ascii_case(&self.email));
        if !email_matches {
            return Err(CancelBookingByUidError::EmailMismatch);
        }

        let cancel = CancelBookingUseCase {
            tenant_scope: TenantScope::scoped(booking.organization_id.clone()),
            booking_id: booking.id,
            reason: self.reason.clone(),
            cancelled_by: CancelledBy::Attendee,
            actor_id: None,
            actor_type: ActorType::System,
        };

        Ok(crate::shared::usecase::execute(cancel, ctx).await?)
    }
}

#[async_trait::async_trait]
impl UseCase for CancelBookingUseCase {
    type Response = Booking;
    type Error = CancelBookingError;

    const NAME: &'static str = "CancelBooking";

    async fn execute(&mut self, ctx: &AppContext) -> Result<Self::Response, Self::Error> {
        let repo = TenantScopedBookingRepo::new(ctx.repos.bookings.clone(), self.tenant_scope.clone());

        let mut booking = repo.find(&self.booking_id).await?.ok_or(CancelBookingError::NotFound)?;

        let now = ctx.clock.now();
        booking
            .cancel(now, self.reason.clone(), self.cancelled_by)
            .map_err(|e| match e {
                BookingTransitionError::AlreadyCancelled => CancelBookingError::AlreadyCancelled,
                BookingTransitionError::NotPending => unreachable!("cancel() never returns NotPending"),
            })?;

        repo.update(&booking).await?;

        repo.insert_audit_log(&BookingAuditLog {
            id: ID::default(),
            booking_id: booking.id.clone(),
            action: AuditAction::Cancelled,
            actor_id: self.actor_id.clone(),
            actor_type: self.actor_type,
            details: json!({ "reason": self.reason, "cancelledBy": format!("{:?}", self.cancelled_by) }),
            created_at: now,
        })
        .await?;

        self.fan_out(ctx, &booking).await;

        Ok(booking)
    }
}

impl CancelBookingUseCase {
    /// Notifies host + all attendees, best-effort removes pending
    /// reminders. Enqueue/remove failures are logged, not fatal.
    async fn fan_out(&self, ctx: &AppContext, booking: &Booking) {
        let now = ctx.clock.now();

        if let Err(e) = ctx
            .notifications
            .enqueue(
                &format!("notification:booking-cancelled:{}", booking.id),
                JobPayload::BookingCancelledNotification { booking_id: booking.id.clone() },
                now,
                3,
            )
            .await
        {
            warn!(error = %e, booking_id = %booking.id, "failed to enqueue booking-cancelled notification");
        }

        if let Err(e) = ctx
            .webhooks
            .enqueue(
                &format!("webhook:booking-cancelled:{}", booking.id),
                JobPayload::Webhook {
                    organization_id: booking.organization_id.clone(),
                    event: "booking.cancelled".into(),
                    payload: json!({
                        "id": booking.id.to_string(),
                        "uid": booking.uid,
                        "cancelReason": booking.cancel_reason,
                        "cancelledBy": booking.cancelled_by.map(|c| format!("{c:?}")),
                    }),
                },
                now,
                3,
            )
            .await
        {
            warn!(error = %e, booking_id = %booking.id, "failed to enqueue booking.cancelled webhook");
        }

        if let Err(e) = ctx.reminders.cancel_for_booking(&booking.id).await {
            warn!(error = %e, booking_id = %booking.id, "failed to remove pending reminders");
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::DateTime;
    use scheduling_domain::booking::{Attendee, BookingSource, BookingStatus, ResponseStatus};
    use scheduling_infra::repos::booking::IBookingRepo;

    use super::*;
    use crate::shared::usecase::execute;

    fn confirmed_booking(organization_id: ID) -> Booking {
        Booking {
            id: ID::default(),
            uid: "abc123xyz789".into(),
            organization_id,
            event_type_id: None,
            host_id: ID::default(),
            start_time: DateTime::from_timestamp_millis(0).unwrap(),
            end_time: DateTime::from_timestamp_millis(1_800_000).unwrap(),
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
    async fn cancels_a_confirmed_booking_and_stamps_reason() {
        let ctx = scheduling_infra::setup_in_memory_context();
        let organization_id = ID::default();
        let booking = confirmed_booking(organization_id.clone());
        ctx.repos.bookings.insert(&booking).await.unwrap();

        let usecase = CancelBookingUseCase {
            tenant_scope: TenantScope::scoped(organization_id),
            booking_id: booking.id.clone(),
            reason: Some("no longer needed".into()),
            cancelled_by: CancelledBy::Attendee,
            actor_id: None,
            actor_type: ActorType::ApiKey,
        };
        let cancelled = execute(usecase, &ctx).await.unwrap();
        assert_eq!(cancelled.status, BookingStatus::Cancelled);
        assert_eq!(cancelled.cancel_reason.as_deref(), Some("no longer needed"));
        assert_eq!(cancelled.cancelled_by, Some(CancelledBy::Attendee));
    }

    #[tokio::test]
    async fn cancelling_twice_is_rejected() {
        let ctx = scheduling_infra::setup_in_memory_context();
        let organization_id = ID::default();
        let booking = confirmed_booking(organization_id.clone());
        ctx.repos.bookings.insert(&booking).await.unwrap();

        let first = CancelBookingUseCase {
            tenant_scope: TenantScope::scoped(organization_id.clone()),
            booking_id: booking.id.clone(),
            reason: None,
            cancelled_by: CancelledBy::Host,
            actor_id: None,
            actor_type: ActorType::ApiKey,
        };
        execute(first, &ctx).await.unwrap();

        let second = CancelBookingUseCase {
            tenant_scope: TenantScope::scoped(organization_id),
            booking_id: booking.id.clone(),
            reason: None,
            cancelled_by: CancelledBy::Host,
            actor_id: None,
            actor_type: ActorType::ApiKey,
        };
        let err = execute(second, &ctx).await.unwrap_err();
        assert!(matches!(err, CancelBookingError::AlreadyCancelled));
    }

    #[tokio::test]
    async fn unknown_booking_is_not_found() {
        let ctx = scheduling_infra::setup_in_memory_context();
        let usecase = CancelBookingUseCase {
            tenant_scope: TenantScope::unscoped(),
            booking_id: ID::default(),
            reason: None,
            cancelled_by: CancelledBy::System,
            actor_id: None,
            actor_type: ActorType::System,
        };
        let err = execute(usecase, &ctx).await.unwrap_err();
        assert!(matches!(err, CancelBookingError::NotFound));
    }

    #[tokio::test]
    async fn public_cancel_by_uid_refuses_email_mismatch_but_accepts_case_insensitive_match() {
        let ctx = scheduling_infra::setup_in_memory_context();
        let organization_id = ID::default();
        let booking = confirmed_booking(organization_id);
        ctx.repos.bookings.insert(&booking).await.unwrap();
        ctx.repos
            .bookings
            .insert_attendee(&Attendee {
                id: ID::default(),
                booking_id: booking.id.clone(),
                email: "alice@example.com".into(),
                name: "Alice".into(),
                phone: None,
                user_id: None,
                response_status: ResponseStatus::Accepted,
                is_host: false,
            })
            .await
            .unwrap();

        let mismatch = CancelBookingByUidUseCase {
            booking_uid: booking.uid.clone(),
            email: "bob@example.com".into(),
            reason: None,
        };
        let err = execute(mismatch, &ctx).await.unwrap_err();
        assert!(matches!(err, CancelBookingByUidError::EmailMismatch));

        let booking_after_mismatch = ctx.repos.bookings.find(&booking.id).await.unwrap().unwrap();
        assert_eq!(booking_after_mismatch.status, BookingStatus::Confirmed);

        let matching = CancelBookingByUidUseCase {
            booking_uid: booking.uid.clone(),
            email: "ALICE@example.com".into(),
            reason: Some("can't make it".into()),
        };
        let cancelled = execute(matching, &ctx).await.unwrap();
        assert_eq!(cancelled.status, BookingStatus::Cancelled);
        assert_eq!(cancelled.cancelled_by, Some(CancelledBy::Attendee));
        assert_eq!(cancelled.cancel_reason.as_deref(), Some("can't make it"));
    }
}
