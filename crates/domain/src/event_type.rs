use chrono::{DateTime, Utc};

use crate::shared::entity::{Entity, ID};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssignmentType {
    Single,
    RoundRobin,
    Collective,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocationType {
    Meet,
    Phone,
    InPerson,
    Custom,
}

/// A bookable offering: the combination of duration, host assignment
/// strategy, and constraint overrides a customer picks when booking.
/// Soft-deleted (`deleted_at` set) types are invisible to booking and
/// availability lookups; callers must filter for that themselves, as the
/// domain layer never implicitly hides rows.
#[derive(Debug, Clone)]
pub struct EventType {
    pub id: ID,
    pub organization_id: ID,
    pub owner_id: Option<ID>,
    pub slug: String,
    pub duration_minutes: u32,
    pub assignment_type: AssignmentType,
    pub location_type: LocationType,
    pub requires_confirmation: bool,
    pub buffer_before_minutes: Option<i64>,
    pub buffer_after_minutes: Option<i64>,
    pub minimum_notice_hours: Option<i64>,
    pub max_bookings_per_day: Option<u32>,
    pub is_active: bool,
    pub is_public: bool,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl EventType {
    pub fn is_visible(&self) -> bool {
        self.deleted_at.is_none()
    }
}

impl Entity<ID> for EventType {
    fn id(&self) -> ID {
        self.id.clone()
    }
}

/// Effective availability constraints for a single host, after layering
/// an `EventType`'s non-null overrides over the schedule's defaults.
/// Field-wise: an event-type value wins when present, else the schedule's.
#[derive(Debug, Clone, Copy)]
pub struct EffectiveConstraints {
    pub buffer_before_minutes: i64,
    pub buffer_after_minutes: i64,
    pub minimum_notice_hours: i64,
    pub max_bookings_per_day: Option<u32>,
    /// Not part of `EventType` (no per-event-type override exists for it);
    /// carried straight from the schedule. Reference behavior never enforces
    /// this value even though it's read; this implementation extends the
    /// daily cap's grouping symmetrically to ISO weeks as a documented
    /// extension (see DESIGN.md).
    pub max_bookings_per_week: Option<u32>,
}

impl EffectiveConstraints {
    pub fn layer(schedule: &crate::schedule::UserSchedule, event_type: Option<&EventType>) -> Self {
        let event_type = event_type;
        Self {
            buffer_before_minutes: event_type
                .and_then(|e| e.buffer_before_minutes)
                .unwrap_or(schedule.buffer_before_minutes),
            buffer_after_minutes: event_type
                .and_then(|e| e.buffer_after_minutes)
                .unwrap_or(schedule.buffer_after_minutes),
            minimum_notice_hours: event_type
                .and_then(|e| e.minimum_notice_hours)
                .unwrap_or(schedule.minimum_notice_hours),
            max_bookings_per_day: event_type
                .and_then(|e| e.max_bookings_per_day)
                .or(schedule.max_bookings_per_day),
            max_bookings_per_week: schedule.max_bookings_per_week,
        }
    }
}

/// One host's membership in a round-robin `EventType`. `booking_count`
/// and `last_booked_at` drive the round-robin fairness ordering; they
/// are bumped by the booking engine after each successful create.
#[derive(Debug, Clone)]
pub struct EventTypeHost {
    pub event_type_id: ID,
    pub user_id: ID,
    pub priority: i32,
    pub is_active: bool,
    pub booking_count: i64,
    pub last_booked_at: Option<DateTime<Utc>>,
}
