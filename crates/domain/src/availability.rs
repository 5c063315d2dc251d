use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Datelike, Duration, NaiveDate, TimeZone, Utc};
use chrono_tz::Tz;
use validator::Validate;

use crate::{
    CompatibleInstances,
    EventInstance,
    event_type::{AssignmentType, EffectiveConstraints},
    round_robin::{RoundRobinAssignment, RoundRobinHost},
    schedule::ScheduleWindow,
    shared::entity::ID,
    timespan::TimeSpan,
};

/// Slot start times must land on a 15-minute grid, aligned to the start of
/// each available range rather than to the top of the hour.
pub const SLOT_GRID_MINUTES: i64 = 15;

#[derive(Debug, thiserror::Error)]
pub enum AvailabilityQueryError {
    #[error("{0}")]
    Validation(String),
    #[error("end must be after start")]
    InvertedTimespan,
}

/// Inbound shape of an availability request, before any storage lookups.
/// Field bounds mirror the ones enforced on `EventType.durationMinutes`.
#[derive(Debug, Validate)]
pub struct AvailabilityQuery {
    pub user_ids: Vec<ID>,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    #[validate(range(min = 5, max = 480))]
    pub duration_minutes: i64,
    pub timezone: Tz,
}

impl AvailabilityQuery {
    /// Validates field bounds and the timespan ordering, returning an
    /// empty-result short-circuit for an empty host list per the engine's
    /// documented error conditions.
    pub fn validate_query(&self) -> Result<(), AvailabilityQueryError> {
        self.validate()
            .map_err(|e| AvailabilityQueryError::Validation(e.to_string()))?;
        if self.end <= self.start {
            return Err(AvailabilityQueryError::InvertedTimespan);
        }
        Ok(())
    }

    pub fn is_empty_host_list(&self) -> bool {
        self.user_ids.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Slot {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub host_ids: Vec<ID>,
}

/// Everything the availability engine needs about one host to compute
/// their free slots, already loaded by the caller (step 1's schedule
/// windows, step 2's busy instances, the layered constraints from step 4,
/// and existing booking counts per local calendar day for the daily cap).
pub struct HostAvailabilityInput {
    pub user_id: ID,
    pub schedule_windows: Vec<ScheduleWindow>,
    pub busy: Vec<EventInstance>,
    pub constraints: EffectiveConstraints,
    pub booking_counts_by_local_day: HashMap<NaiveDate, u32>,
    /// Keyed by `(ISO year, ISO week)`, mirroring `booking_counts_by_local_day`
    /// but grouped by week for the `maxBookingsPerWeek` extension. Empty
    /// when the caller has no schedule carrying a weekly cap, in which
    /// case this grouping is simply never consulted.
    pub booking_counts_by_local_week: HashMap<(i32, u32), u32>,
}

/// Runs steps 1-5 of the availability algorithm for a single host,
/// returning the duration-long free ranges left after subtracting busy
/// time and applying minimum notice, buffers, and the daily cap.
fn host_free_ranges(
    input: &HostAvailabilityInput,
    span: &TimeSpan,
    duration_minutes: i64,
    timezone: &Tz,
    now: DateTime<Utc>,
) -> CompatibleInstances {
    // Step 1: schedule-window resolution.
    let mut free = crate::schedule::resolve_schedule_windows(&input.schedule_windows, span, timezone);

    // Step 2-3: busy-time loading and subtraction.
    let busy = CompatibleInstances::new(input.busy.clone());
    free.remove_instances(&busy, 0);

    // Step 4a: minimum notice.
    let notice_cutoff = now + Duration::hours(input.constraints.minimum_notice_hours);
    free.remove_all_before(notice_cutoff);

    // Step 4b: buffers.
    let buffered: Vec<EventInstance> = free
        .inner()
        .into_iter()
        .filter_map(|range| {
            let start = range.start_time + Duration::minutes(input.constraints.buffer_before_minutes);
            let end = range.end_time - Duration::minutes(input.constraints.buffer_after_minutes);
            if end - start >= Duration::minutes(duration_minutes) {
                Some(EventInstance {
                    start_time: start,
                    end_time: end,
                    busy: false,
                })
            } else {
                None
            }
        })
        .collect();
    let mut free = CompatibleInstances::new(buffered);

    // Step 4c: daily cap.
    if let Some(max_per_day) = input.constraints.max_bookings_per_day {
        let retained: Vec<EventInstance> = free
            .inner()
            .into_iter()
            .filter(|range| {
                let local_day = range.start_time.with_timezone(timezone).date_naive();
                input.booking_counts_by_local_day.get(&local_day).copied().unwrap_or(0) < max_per_day
            })
            .collect();
        free = CompatibleInstances::new(retained);
    }

    // Weekly cap (extension, not reference-accurate -- see DESIGN.md):
    // same grouped-drop shape as the daily cap, over the ISO week instead.
    if let Some(max_per_week) = input.constraints.max_bookings_per_week {
        let retained: Vec<EventInstance> = free
            .inner()
            .into_iter()
            .filter(|range| {
                let iso_week = range.start_time.with_timezone(timezone).date_naive().iso_week();
                input
                    .booking_counts_by_local_week
                    .get(&(iso_week.year(), iso_week.week()))
                    .copied()
                    .unwrap_or(0)
                    < max_per_week
            })
            .collect();
        free = CompatibleInstances::new(retained);
    }

    free
}

/// Step 5: slice a single free range into `duration_minutes`-long slots,
/// the first aligned to the range's own start and each subsequent one
/// advanced by the fixed 15-minute grid.
fn slice_range(range: &EventInstance, duration_minutes: i64) -> Vec<DateTime<Utc>> {
    let duration = Duration::minutes(duration_minutes);
    let grid = Duration::minutes(SLOT_GRID_MINUTES);
    let mut starts = Vec::new();
    let mut cursor = range.start_time;
    while cursor + duration <= range.end_time {
        starts.push(cursor);
        cursor += grid;
    }
    starts
}

fn host_slot_starts(
    input: &HostAvailabilityInput,
    span: &TimeSpan,
    duration_minutes: i64,
    timezone: &Tz,
    now: DateTime<Utc>,
) -> Vec<DateTime<Utc>> {
    host_free_ranges(input, span, duration_minutes, timezone, now)
        .inner()
        .iter()
        .flat_map(|range| slice_range(range, duration_minutes))
        .collect()
}

/// Step 6 host-assignment policy. `RoundRobin` carries the rotation's
/// current standings (`EventTypeHost` rows with `is_active = true`).
pub enum Assignment {
    Single,
    Collective,
    RoundRobin(Vec<RoundRobinHost>),
}

impl From<AssignmentType> for Assignment {
    fn from(value: AssignmentType) -> Self {
        match value {
            AssignmentType::Single => Assignment::Single,
            AssignmentType::Collective => Assignment::Collective,
            AssignmentType::RoundRobin => Assignment::RoundRobin(Vec::new()),
        }
    }
}

/// Runs the full availability algorithm: per-host schedule resolution
/// through slicing (steps 1-5), then combines per-host slots according to
/// the assignment policy (step 6). `span` and `duration_minutes` must
/// already be validated non-inverted and within slicing bounds by the
/// caller.
pub fn compute_availability(
    hosts: Vec<HostAvailabilityInput>,
    span: TimeSpan,
    duration_minutes: i64,
    timezone: Tz,
    now: DateTime<Utc>,
    assignment: Assignment,
) -> Vec<Slot> {
    if hosts.is_empty() {
        return Vec::new();
    }

    let per_host_starts: Vec<(ID, Vec<DateTime<Utc>>)> = hosts
        .iter()
        .map(|h| {
            (
                h.user_id.clone(),
                host_slot_starts(h, &span, duration_minutes, &timezone, now),
            )
        })
        .collect();

    let duration = Duration::minutes(duration_minutes);

    match assignment {
        Assignment::Single => {
            let mut slots: Vec<Slot> = per_host_starts
                .into_iter()
                .flat_map(|(host_id, starts)| {
                    starts.into_iter().map(move |start| Slot {
                        start,
                        end: start + duration,
                        host_ids: vec![host_id.clone()],
                    })
                })
                .collect();
            slots.sort_by_key(|s| s.start);
            slots
        }
        Assignment::Collective => {
            let all_host_ids: Vec<ID> = hosts.iter().map(|h| h.user_id.clone()).collect();
            let mut counts: HashMap<DateTime<Utc>, usize> = HashMap::new();
            for (_, starts) in &per_host_starts {
                for &start in starts {
                    *counts.entry(start).or_insert(0) += 1;
                }
            }
            let mut slots: Vec<Slot> = counts
                .into_iter()
                .filter(|(_, count)| *count == per_host_starts.len())
                .map(|(start, _)| Slot {
                    start,
                    end: start + duration,
                    host_ids: all_host_ids.clone(),
                })
                .collect();
            slots.sort_by_key(|s| s.start);
            slots
        }
        Assignment::RoundRobin(rr_hosts) => {
            let availability: HashMap<ID, HashSet<DateTime<Utc>>> = per_host_starts
                .into_iter()
                .map(|(id, starts)| (id, starts.into_iter().collect()))
                .collect();

            let mut all_starts: Vec<DateTime<Utc>> = availability
                .values()
                .flat_map(|set| set.iter().copied())
                .collect::<HashSet<_>>()
                .into_iter()
                .collect();
            all_starts.sort();

            let mut rotation = RoundRobinAssignment::new(&rr_hosts);
            rotation
                .assign_all(&all_starts, |host_id, start| {
                    availability.get(host_id).is_some_and(|set| set.contains(&start))
                })
                .into_iter()
                .map(|(start, host_id)| Slot {
                    start,
                    end: start + duration,
                    host_ids: vec![host_id],
                })
                .collect()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schedule::ScheduleWindow;

    fn at(millis: i64) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(millis).unwrap()
    }

    fn full_day_window(day: chrono::Weekday) -> ScheduleWindow {
        ScheduleWindow {
            id: ID::default(),
            schedule_id: ID::default(),
            day_of_week: day,
            start_time: "09:00".parse().unwrap(),
            end_time: "17:00".parse().unwrap(),
            specific_date: None,
            is_available: true,
        }
    }

    fn basic_constraints() -> EffectiveConstraints {
        EffectiveConstraints {
            buffer_before_minutes: 0,
            buffer_after_minutes: 0,
            minimum_notice_hours: 0,
            max_bookings_per_day: None,
            max_bookings_per_week: None,
        }
    }

    #[test]
    fn query_rejects_inverted_timespan() {
        let query = AvailabilityQuery {
            user_ids: vec![ID::default()],
            start: at(1000),
            end: at(0),
            duration_minutes: 30,
            timezone: chrono_tz::UTC,
        };
        assert!(matches!(
            query.validate_query(),
            Err(AvailabilityQueryError::InvertedTimespan)
        ));
    }

    #[test]
    fn query_rejects_out_of_range_duration() {
        let query = AvailabilityQuery {
            user_ids: vec![ID::default()],
            start: at(0),
            end: at(1000),
            duration_minutes: 4,
            timezone: chrono_tz::UTC,
        };
        assert!(query.validate_query().is_err());
    }

    #[test]
    fn empty_host_list_yields_no_slots() {
        let span = TimeSpan::new(at(0), at(1000 * 60 * 60 * 24));
        let slots = compute_availability(Vec::new(), span, 30, chrono_tz::UTC, at(0), Assignment::Single);
        assert!(slots.is_empty());
    }

    #[test]
    fn single_host_slices_into_expected_slots() {
        // 1970-01-05 is a Monday.
        let start = chrono_tz::UTC.with_ymd_and_hms(1970, 1, 5, 0, 0, 0).unwrap().with_timezone(&Utc);
        let end = start + Duration::days(1);
        let span = TimeSpan::new(start, end);

        let host = HostAvailabilityInput {
            user_id: ID::default(),
            schedule_windows: vec![full_day_window(chrono::Weekday::Mon)],
            busy: Vec::new(),
            constraints: basic_constraints(),
            booking_counts_by_local_day: HashMap::new(),
            booking_counts_by_local_week: HashMap::new(),
        };

        let slots = compute_availability(vec![host], span, 30, chrono_tz::UTC, at(0), Assignment::Single);
        assert!(!slots.is_empty());
        for slot in &slots {
            assert_eq!((slot.end - slot.start).num_minutes(), 30);
        }
    }

    #[test]
    fn buffers_remove_slots_too_close_to_edges() {
        let start = chrono_tz::UTC.with_ymd_and_hms(1970, 1, 5, 0, 0, 0).unwrap().with_timezone(&Utc);
        let end = start + Duration::days(1);
        let span = TimeSpan::new(start, end);

        let mut constraints = basic_constraints();
        constraints.buffer_before_minutes = 480; // consumes the whole 09:00-17:00 window almost entirely
        constraints.buffer_after_minutes = 470;

        let host = HostAvailabilityInput {
            user_id: ID::default(),
            schedule_windows: vec![full_day_window(chrono::Weekday::Mon)],
            busy: Vec::new(),
            constraints,
            booking_counts_by_local_day: HashMap::new(),
            booking_counts_by_local_week: HashMap::new(),
        };

        let slots = compute_availability(vec![host], span, 30, chrono_tz::UTC, at(0), Assignment::Single);
        assert!(slots.is_empty());
    }

    #[test]
    fn collective_requires_every_host_free() {
        let start = chrono_tz::UTC.with_ymd_and_hms(1970, 1, 5, 0, 0, 0).unwrap().with_timezone(&Utc);
        let end = start + Duration::days(1);
        let span = TimeSpan::new(start, end);

        let host_a = HostAvailabilityInput {
            user_id: ID::default(),
            schedule_windows: vec![full_day_window(chrono::Weekday::Mon)],
            busy: Vec::new(),
            constraints: basic_constraints(),
            booking_counts_by_local_day: HashMap::new(),
            booking_counts_by_local_week: HashMap::new(),
        };
        let busy_start = chrono_tz::UTC.with_ymd_and_hms(1970, 1, 5, 9, 0, 0).unwrap().with_timezone(&Utc);
        let host_b = HostAvailabilityInput {
            user_id: ID::default(),
            schedule_windows: vec![full_day_window(chrono::Weekday::Mon)],
            busy: vec![EventInstance {
                start_time: busy_start,
                end_time: busy_start + Duration::hours(8),
                busy: true,
            }],
            constraints: basic_constraints(),
            booking_counts_by_local_day: HashMap::new(),
            booking_counts_by_local_week: HashMap::new(),
        };

        let slots = compute_availability(
            vec![host_a, host_b],
            span,
            30,
            chrono_tz::UTC,
            at(0),
            Assignment::Collective,
        );
        assert!(slots.is_empty());
    }
}
