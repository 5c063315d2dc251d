use scheduling_domain::{
    booking::{Booking, BookingStatus, BookingTransitionError},
    ID,
};
use scheduling_infra::{queue::JobPayload, AppContext, TenantScope};
use serde_json::json;
use thiserror::Error;
use tracing::warn;

use crate::{error::SchedulingError, shared::usecase::UseCase};

/// Confirms a pending booking. Only a `PENDING` booking may confirm.
#[derive(Debug)]
pub struct ConfirmBookingUseCase {
    pub tenant_scope: TenantScope,
    pub booking_id: ID,
    pub actor_id: Option<ID>,
    pub actor_type: scheduling_domain::booking::ActorType,
}

impl ConfirmBookingUseCase {
    /// Stamps `actor_id`/`actor_type` from the caller's request context
    /// (§4.1: `actorType` is `apiKeyId ? API_KEY : userId ? USER : SYSTEM`).
    pub fn apply_request_context(&mut self, ctx: &crate::shared::request_context::RequestContext) {
        self.actor_id = ctx.actor_id();
        self.actor_type = ctx.actor_type();
    }
}

#[derive(Debug, Error)]
pub enum ConfirmBookingError {
    #[error("not found")]
    NotFound,
    #[error("only pending")]
    NotPending,
    #[error(transparent)]
    Infra(#[from] anyhow::Error),
}

impl From<ConfirmBookingError> for SchedulingError {
    fn from(e: ConfirmBookingError) -> Self {
        match e {
            ConfirmBookingError::NotFound => SchedulingError::NotFound("booking not found".into()),
            ConfirmBookingError::NotPending => SchedulingError::Validation("only pending".into()),
            ConfirmBookingError::Infra(e) => e.into(),
        }
    }
}

#[async_trait::async_trait]
impl UseCase for ConfirmBookingUseCase {
    type Response = Booking;
    type Error = ConfirmBookingError;

    const NAME: &'static str = "ConfirmBooking";

    async fn execute(&mut self, ctx: &AppContext) -> Result<Self::Response, Self::Error> {
        use scheduling_infra::repos::booking::{IBookingRepo, TenantScopedBookingRepo};
        let repo = TenantScopedBookingRepo::new(ctx.repos.bookings.clone(), self.tenant_scope.clone());

        let mut booking = repo.find(&self.booking_id).await?.ok_or(ConfirmBookingError::NotFound)?;

        booking.confirm().map_err(|e| match e {
            BookingTransitionError::NotPending => ConfirmBookingError::NotPending,
            BookingTransitionError::AlreadyCancelled => ConfirmBookingError::NotPending,
        })?;
        debug_assert_eq!(booking.status, BookingStatus::Confirmed);

        repo.update(&booking).await?;

        let now = ctx.clock.now();
        repo.insert_audit_log(&scheduling_domain::booking::BookingAuditLog {
            id: ID::default(),
            booking_id: booking.id.clone(),
            action: scheduling_domain::booking::AuditAction::Confirmed,
            actor_id: self.actor_id.clone(),
            actor_type: self.actor_type,
            details: json!({}),
            created_at: now,
        })
        .await?;

        if let Err(e) = ctx
            .notifications
            .enqueue(
                &format!("notification:booking-confirmed:{}", booking.id),
                JobPayload::BookingConfirmedNotification { booking_id: booking.id.clone() },
                now,
                3,
            )
            .await
        {
            warn!(error = %e, booking_id = %booking.id, "failed to enqueue booking-confirmed notification");
        }

        Ok(booking)
    }
}

#[cfg(test)]
mod tests {
    use chrono::DateTime;
    use scheduling_domain::booking::BookingSource;
    use scheduling_infra::repos::booking::IBookingRepo;

    use super::*;
    use crate::shared::usecase::execute;

    fn pending_booking(organization_id: ID) -> Booking {
        Booking {
            id: ID::default(),
            uid: "abc123xyz789".into(),
            organization_id,
            event_type_id: None,
            host_id: ID::default(),
            start_time: DateTime::from_timestamp_millis(0).unwrap(),
            end_time: DateTime::from_timestamp_millis(1_800_000).unwrap(),
            timezone: chrono_tz::UTC,
            status: BookingStatus::Pending,
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
    async fn confirms_a_pending_booking() {
        let ctx = scheduling_infra::setup_in_memory_context();
        let organization_id = ID::default();
        let booking = pending_booking(organization_id.clone());
        ctx.repos.bookings.insert(&booking).await.unwrap();

        let usecase = ConfirmBookingUseCase {
            tenant_scope: TenantScope::scoped(organization_id),
            booking_id: booking.id.clone(),
            actor_id: None,
            actor_type: scheduling_domain::booking::ActorType::ApiKey,
        };
        let confirmed = execute(usecase, &ctx).await.unwrap();
        assert_eq!(confirmed.status, BookingStatus::Confirmed);
    }

    #[tokio::test]
    async fn rejects_confirming_an_already_confirmed_booking() {
        let ctx = scheduling_infra::setup_in_memory_context();
        let organization_id = ID::default();
        let mut booking = pending_booking(organization_id.clone());
        booking.status = BookingStatus::Confirmed;
        ctx.repos.bookings.insert(&booking).await.unwrap();

        let usecase = ConfirmBookingUseCase {
            tenant_scope: TenantScope::scoped(organization_id),
            booking_id: booking.id.clone(),
            actor_id: None,
            actor_type: scheduling_domain::booking::ActorType::ApiKey,
        };
        let err = execute(usecase, &ctx).await.unwrap_err();
        assert!(matches!(err, ConfirmBookingError::NotPending));
    }

    #[tokio::test]
    async fn other_tenant_cannot_confirm_booking() {
        let ctx = scheduling_infra::setup_in_memory_context();
        let organization_id = ID::default();
        let booking = pending_booking(organization_id);
        ctx.repos.bookings.insert(&booking).await.unwrap();

        let usecase = ConfirmBookingUseCase {
            tenant_scope: TenantScope::scoped(ID::default()),
            booking_id: booking.id.clone(),
            actor_id: None,
            actor_type: scheduling_domain::booking::ActorType::ApiKey,
        };
        let err = execute(usecase, &ctx).await.unwrap_err();
        assert!(matches!(err, ConfirmBookingError::NotFound));
    }
}
