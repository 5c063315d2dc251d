use std::collections::HashMap;

use chrono::{DateTime, Datelike, Duration, NaiveDate, TimeZone, Utc};
use chrono_tz::Tz;
use scheduling_domain::{
    availability::{
        compute_availability, Assignment, AvailabilityQuery, AvailabilityQueryError, HostAvailabilityInput, Slot,
    },
    event_type::EffectiveConstraints,
    round_robin::RoundRobinHost,
    ID,
};
use scheduling_infra::{
    repos::event_type::{IEventTypeRepo, TenantScopedEventTypeRepo},
    AppContext, TenantScope,
};
use thiserror::Error;

use crate::{error::SchedulingError, shared::usecase::UseCase};

#[derive(Debug, Error)]
pub enum GetAvailabilityError {
    #[error("{0}")]
    Validation(String),
    #[error("event type not found")]
    EventTypeNotFound,
    #[error(transparent)]
    Infra(#[from] anyhow::Error),
}

impl From<GetAvailabilityError> for SchedulingError {
    fn from(e: GetAvailabilityError) -> Self {
        match e {
            GetAvailabilityError::Validation(msg) => SchedulingError::Validation(msg),
            GetAvailabilityError::EventTypeNotFound => SchedulingError::NotFound("event type not found".into()),
            GetAvailabilityError::Infra(e) => e.into(),
        }
    }
}

/// `getAvailability`. Loads everything the pure
/// `scheduling_domain::availability` engine needs for each requested host,
/// then delegates the algorithm itself -- this use case is orchestration
/// only, no scheduling logic of its own.
#[derive(Debug)]
pub struct GetAvailabilityUseCase {
    pub tenant_scope: TenantScope,
    pub event_type_id: Option<ID>,
    pub user_ids: Vec<ID>,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub duration_minutes: i64,
    pub timezone: Tz,
}

#[async_trait::async_trait]
impl UseCase for GetAvailabilityUseCase {
    type Response = Vec<Slot>;
    type Error = GetAvailabilityError;

    const NAME: &'static str = "GetAvailability";

    async fn execute(&mut self, ctx: &AppContext) -> Result<Self::Response, Self::Error> {
        let query = AvailabilityQuery {
            user_ids: self.user_ids.clone(),
            start: self.start,
            end: self.end,
            duration_minutes: self.duration_minutes,
            timezone: self.timezone,
        };
        query
            .validate_query()
            .map_err(|e| match e {
                AvailabilityQueryError::Validation(msg) => GetAvailabilityError::Validation(msg),
                AvailabilityQueryError::InvertedTimespan => {
                    GetAvailabilityError::Validation("end must be after start".into())
                }
            })?;

        if query.is_empty_host_list() {
            return Ok(Vec::new());
        }

        let event_type = match &self.event_type_id {
            Some(id) => {
                let event_type = TenantScopedEventTypeRepo::new(ctx.repos.event_types.clone(), self.tenant_scope.clone())
                    .find(id)
                    .await?
                    .filter(|e| e.is_visible());
                Some(event_type.ok_or(GetAvailabilityError::EventTypeNotFound)?)
            }
            None => None,
        };

        let now = ctx.clock.now();
        let assignment = match &event_type {
            Some(e) if self.user_ids.len() > 1 => Assignment::from(e.assignment_type),
            _ => Assignment::Single,
        };

        let mut rr_hosts: Vec<RoundRobinHost> = Vec::new();
        if let (Assignment::RoundRobin(_), Some(event_type)) = (&assignment, &event_type) {
            let active = ctx.repos.event_types.find_active_hosts(&event_type.id).await?;
            rr_hosts = active
                .into_iter()
                .map(|h| RoundRobinHost {
                    user_id: h.user_id,
                    priority: h.priority,
                    booking_count: h.booking_count,
                    last_booked_at: h.last_booked_at,
                })
                .collect();
        }
        let assignment = match assignment {
            Assignment::RoundRobin(_) => Assignment::RoundRobin(rr_hosts),
            other => other,
        };

        let mut hosts = Vec::with_capacity(self.user_ids.len());
        for user_id in &self.user_ids {
            hosts.push(self.load_host_input(ctx, user_id, event_type.as_ref()).await?);
        }

        let span = scheduling_domain::TimeSpan::new(self.start, self.end);
        Ok(compute_availability(
            hosts,
            span,
            self.duration_minutes,
            self.timezone,
            now,
            assignment,
        ))
    }
}

/// Every distinct local calendar date touched by `[start, end)` in `tz`,
/// used to enumerate the daily/weekly cap buckets to look up.
fn local_days_in_range(start: DateTime<Utc>, end: DateTime<Utc>, tz: &Tz) -> Vec<NaiveDate> {
    let mut days = Vec::new();
    let mut day = start.with_timezone(tz).date_naive();
    let last = end.with_timezone(tz).date_naive();
    while day <= last {
        days.push(day);
        day = match day.succ_opt() {
            Some(next) => next,
            None => break,
        };
    }
    days
}

/// UTC instant bounds of one local calendar day in `tz`; `None` if a DST
/// transition makes the local midnight ambiguous or nonexistent (in which
/// case the day contributes no count rather than panicking).
fn local_day_bounds_utc(day: NaiveDate, tz: &Tz) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
    let start = tz.from_local_datetime(&day.and_hms_opt(0, 0, 0)?).single()?.with_timezone(&Utc);
    let end = start + Duration::days(1);
    Some((start, end))
}

impl GetAvailabilityUseCase {
    async fn load_host_input(
        &self,
        ctx: &AppContext,
        user_id: &ID,
        event_type: Option<&scheduling_domain::event_type::EventType>,
    ) -> Result<HostAvailabilityInput, GetAvailabilityError> {
        let schedule = ctx
            .repos
            .schedules
            .find_effective_for_user(user_id)
            .await?
            .unwrap_or_else(|| scheduling_domain::schedule::UserSchedule::new(user_id.clone(), "Default".into()));
        let windows = ctx.repos.schedules.find_windows(&schedule.id).await?;
        let constraints = EffectiveConstraints::layer(&schedule, event_type);

        let active_bookings = ctx
            .repos
            .bookings
            .find_active_overlapping(user_id, self.start, self.end)
            .await?;
        let busy_blocks = ctx.repos.busy_blocks.find_overlapping(user_id, self.start, self.end).await?;

        let mut busy: Vec<scheduling_domain::EventInstance> = active_bookings
            .iter()
            .map(|b| scheduling_domain::EventInstance {
                start_time: b.start_time,
                end_time: b.end_time,
                busy: true,
            })
            .collect();
        busy.extend(busy_blocks.iter().map(|b| scheduling_domain::EventInstance {
            start_time: b.start_time,
            end_time: b.end_time,
            busy: true,
        }));

        let mut booking_counts_by_local_day: HashMap<chrono::NaiveDate, u32> = HashMap::new();
        let mut booking_counts_by_local_week: HashMap<(i32, u32), u32> = HashMap::new();
        if constraints.max_bookings_per_day.is_some() || constraints.max_bookings_per_week.is_some() {
            for local_day in local_days_in_range(self.start, self.end, &self.timezone) {
                let Some((day_start, day_end)) = local_day_bounds_utc(local_day, &self.timezone) else {
                    continue;
                };
                let count = ctx.repos.bookings.count_active_on_day(user_id, day_start, day_end).await?;
                booking_counts_by_local_day.insert(local_day, count);
                let iso_week = local_day.iso_week();
                *booking_counts_by_local_week.entry((iso_week.year(), iso_week.week())).or_insert(0) += count;
            }
        }

        Ok(HostAvailabilityInput {
            user_id: user_id.clone(),
            schedule_windows: windows,
            busy,
            constraints,
            booking_counts_by_local_day,
            booking_counts_by_local_week,
        })
    }
}
