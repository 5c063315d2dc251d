use chrono::{DateTime, Utc};
use chrono_tz::Tz;

use crate::shared::entity::{Entity, ID};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BookingStatus {
    Pending,
    Confirmed,
    Cancelled,
    Completed,
    NoShow,
}

impl BookingStatus {
    /// Active bookings are the ones that occupy a host's calendar and are
    /// checked for overlap by the availability engine and booking engine.
    pub fn is_active(&self) -> bool {
        matches!(self, BookingStatus::Pending | BookingStatus::Confirmed)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            BookingStatus::Cancelled | BookingStatus::Completed | BookingStatus::NoShow
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BookingSource {
    Web,
    Api,
    Internal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelledBy {
    Host,
    Attendee,
    System,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActorType {
    User,
    ApiKey,
    System,
    Webhook,
}

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum BookingTransitionError {
    #[error("only a pending booking can be confirmed")]
    NotPending,
    #[error("booking is already cancelled")]
    AlreadyCancelled,
}

#[derive(Debug, Clone)]
pub struct Booking {
    pub id: ID,
    pub uid: String,
    pub organization_id: ID,
    pub event_type_id: Option<ID>,
    pub host_id: ID,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub timezone: Tz,
    pub status: BookingStatus,
    pub source: BookingSource,
    pub rescheduled_from: Option<ID>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub meeting_url: Option<String>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub cancel_reason: Option<String>,
    pub cancelled_by: Option<CancelledBy>,
}

impl Entity<ID> for Booking {
    fn id(&self) -> ID {
        self.id.clone()
    }
}

impl Booking {
    /// Confirm a `PENDING` booking. Any other status is a `Validation`
    /// error at the use-case layer — this transition is the pure check.
    pub fn confirm(&mut self) -> Result<(), BookingTransitionError> {
        if self.status != BookingStatus::Pending {
            return Err(BookingTransitionError::NotPending);
        }
        self.status = BookingStatus::Confirmed;
        Ok(())
    }

    pub fn cancel(
        &mut self,
        now: DateTime<Utc>,
        reason: Option<String>,
        cancelled_by: CancelledBy,
    ) -> Result<(), BookingTransitionError> {
        if self.status == BookingStatus::Cancelled {
            return Err(BookingTransitionError::AlreadyCancelled);
        }
        self.status = BookingStatus::Cancelled;
        self.cancelled_at = Some(now);
        self.cancel_reason = reason;
        self.cancelled_by = Some(cancelled_by);
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseStatus {
    Pending,
    Accepted,
    Declined,
}

#[derive(Debug, Clone)]
pub struct Attendee {
    pub id: ID,
    pub booking_id: ID,
    pub email: String,
    pub name: String,
    pub phone: Option<String>,
    pub user_id: Option<ID>,
    pub response_status: ResponseStatus,
    pub is_host: bool,
}

#[derive(Debug, Clone)]
pub struct BookingResource {
    pub booking_id: ID,
    pub resource_id: ID,
}

/// External busy time pulled in from calendar sync; treated identically to
/// an active booking when computing a host's busy set.
#[derive(Debug, Clone)]
pub struct BusyBlock {
    pub id: ID,
    pub user_id: ID,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditAction {
    Created,
    Confirmed,
    Cancelled,
    Rescheduled,
}

/// Append-only log entry; one per state transition. The booking engine
/// writes exactly one of these per successful create/confirm/cancel.
#[derive(Debug, Clone)]
pub struct BookingAuditLog {
    pub id: ID,
    pub booking_id: ID,
    pub action: AuditAction,
    pub actor_id: Option<ID>,
    pub actor_type: ActorType,
    pub details: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_booking(status: BookingStatus) -> Booking {
        Booking {
            id: ID::default(),
            uid: "abc123xyz789".into(),
            organization_id: ID::default(),
            event_type_id: None,
            host_id: ID::default(),
            start_time: DateTime::from_timestamp_millis(0).unwrap(),
            end_time: DateTime::from_timestamp_millis(1_800_000).unwrap(),
            timezone: chrono_tz::UTC,
            status,
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

    #[test]
    fn confirm_requires_pending() {
        let mut booking = sample_booking(BookingStatus::Confirmed);
        assert_eq!(booking.confirm(), Err(BookingTransitionError::NotPending));

        let mut booking = sample_booking(BookingStatus::Pending);
        assert!(booking.confirm().is_ok());
        assert_eq!(booking.status, BookingStatus::Confirmed);
    }

    #[test]
    fn cancel_rejects_already_cancelled() {
        let mut booking = sample_booking(BookingStatus::Cancelled);
        assert_eq!(
            booking.cancel(DateTime::from_timestamp_millis(0).unwrap(), None, CancelledBy::Host),
            Err(BookingTransitionError::AlreadyCancelled)
        );
    }

    #[test]
    fn cancel_from_pending_stamps_fields() {
        let mut booking = sample_booking(BookingStatus::Pending);
        let now = DateTime::from_timestamp_millis(5000).unwrap();
        booking
            .cancel(now, Some("no longer needed".into()), CancelledBy::Attendee)
            .unwrap();
        assert_eq!(booking.status, BookingStatus::Cancelled);
        assert_eq!(booking.cancelled_at, Some(now));
        assert_eq!(booking.cancelled_by, Some(CancelledBy::Attendee));
    }

    #[test]
    fn active_status_classification() {
        assert!(BookingStatus::Pending.is_active());
        assert!(BookingStatus::Confirmed.is_active());
        assert!(!BookingStatus::Cancelled.is_active());
        assert!(BookingStatus::Completed.is_terminal());
        assert!(BookingStatus::NoShow.is_terminal());
    }
}
