use std::{collections::HashMap, str::FromStr};

use chrono::{offset::LocalResult, prelude::*, NaiveDate};
use chrono_tz::Tz;

use crate::{
    CompatibleInstances,
    date,
    event_instance::EventInstance,
    shared::entity::{Entity, ID},
    timespan::TimeSpan,
};

/// A named set of availability windows belonging to a user. At most one
/// schedule per user has `is_default = true`; enforcement of that
/// invariant lives in the scheduler service, not here.
#[derive(Debug, Clone)]
pub struct UserSchedule {
    pub id: ID,
    pub user_id: ID,
    pub name: String,
    pub is_default: bool,
    pub buffer_before_minutes: i64,
    pub buffer_after_minutes: i64,
    pub minimum_notice_hours: i64,
    pub max_bookings_per_day: Option<u32>,
    pub max_bookings_per_week: Option<u32>,
}

impl UserSchedule {
    pub fn new(user_id: ID, name: String) -> Self {
        Self {
            id: ID::default(),
            user_id,
            name,
            is_default: false,
            buffer_before_minutes: 0,
            buffer_after_minutes: 0,
            minimum_notice_hours: 0,
            max_bookings_per_day: None,
            max_bookings_per_week: None,
        }
    }
}

impl Entity<ID> for UserSchedule {
    fn id(&self) -> ID {
        self.id.clone()
    }
}

/// A clock-time-of-day, minute resolution. Used for `ScheduleWindow`
/// `start_time`/`end_time`, which are interpreted in the schedule's
/// timezone rather than stored as absolute instants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Time {
    pub hours: u32,
    pub minutes: u32,
}

impl std::cmp::PartialOrd for Time {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl std::cmp::Ord for Time {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        (self.hours, self.minutes).cmp(&(other.hours, other.minutes))
    }
}

impl FromStr for Time {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (h, m) = s
            .split_once(':')
            .ok_or_else(|| format!("Malformed time of day: {s}"))?;
        let hours: u32 = h.parse().map_err(|_| format!("Malformed time of day: {s}"))?;
        let minutes: u32 = m.parse().map_err(|_| format!("Malformed time of day: {s}"))?;
        if hours > 23 || minutes > 59 {
            return Err(format!("Time of day out of range: {s}"));
        }
        Ok(Time { hours, minutes })
    }
}

/// A single availability range for one day of the week, optionally
/// overridden for a specific calendar date (e.g. a holiday blackout).
#[derive(Debug, Clone)]
pub struct ScheduleWindow {
    pub id: ID,
    pub schedule_id: ID,
    pub day_of_week: Weekday,
    pub start_time: Time,
    pub end_time: Time,
    pub specific_date: Option<NaiveDate>,
    pub is_available: bool,
}

impl ScheduleWindow {
    /// Materializes this window's `[start_time, end_time)` on the given
    /// calendar day into an absolute `EventInstance`, walking forward
    /// through any DST-invalid wall-clock times. Returns `None` if no
    /// valid instant exists for this window on this day.
    fn to_event(&self, day: &Day, tzid: &Tz) -> Option<EventInstance> {
        let date = tzid
            .with_ymd_and_hms(day.year, day.month, day.day, 0, 0, 0)
            .single()?;

        let mut start_hours = self.start_time.hours;
        let mut start = date.with_time(NaiveTime::from_hms_opt(start_hours, self.start_time.minutes, 0)?);
        while matches!(start, LocalResult::None) {
            start_hours = (start_hours + 1) % 24;
            start = match NaiveTime::from_hms_opt(start_hours, self.start_time.minutes, 0) {
                Some(t) => date.with_time(t),
                None => LocalResult::None,
            };
        }
        let start = start.single()?;
        if self.start_time.hours > start.hour() {
            return None;
        }

        let mut end_hours = self.end_time.hours;
        let mut end = date.with_time(NaiveTime::from_hms_opt(end_hours, self.end_time.minutes, 0)?);
        while matches!(end, LocalResult::None) {
            end_hours = if end_hours == 0 { 23 } else { end_hours - 1 };
            end = match NaiveTime::from_hms_opt(end_hours, self.end_time.minutes, 0) {
                Some(t) => date.with_time(t),
                None => LocalResult::None,
            };
        }
        let end = end.single()?;
        if end.hour() < self.end_time.hours {
            return None;
        }
        if start > end {
            return None;
        }

        Some(EventInstance {
            busy: false,
            start_time: start.with_timezone(&Utc),
            end_time: end.with_timezone(&Utc),
        })
    }
}

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
struct Day {
    pub year: i32,
    pub month: u32,
    pub day: u32,
}

impl Day {
    fn inc(&mut self) {
        if self.day == date::get_month_length(self.year, self.month) {
            self.day = 1;
            if self.month == 12 {
                self.month = 1;
                self.year += 1;
            } else {
                self.month += 1;
            }
        } else {
            self.day += 1;
        }
    }

    fn weekday(&self, _tzid: &Tz) -> Weekday {
        self.naive_date().weekday()
    }

    fn naive_date(&self) -> NaiveDate {
        #[allow(clippy::unwrap_used)]
        NaiveDate::from_ymd_opt(self.year, self.month, self.day).unwrap()
    }
}

impl std::cmp::PartialOrd for Day {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl std::cmp::Ord for Day {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        (self.year, self.month, self.day).cmp(&(other.year, other.month, other.day))
    }
}

/// Resolves a set of `ScheduleWindow`s into the free ranges they produce
/// over `span`, walking day by day: a matching `specific_date` override
/// wins outright (available or blackout), otherwise every weekday window
/// with `is_available = true` for that day of week contributes a range.
/// This is step 1 of the availability algorithm.
pub fn resolve_schedule_windows(
    windows: &[ScheduleWindow],
    span: &TimeSpan,
    tz: &Tz,
) -> CompatibleInstances {
    let start = span.start().with_timezone(tz);
    let end = span.end().with_timezone(tz);

    let mut date_lookup: HashMap<NaiveDate, Vec<&ScheduleWindow>> = HashMap::new();
    let mut weekday_lookup: HashMap<Weekday, Vec<&ScheduleWindow>> = HashMap::new();
    for window in windows {
        match window.specific_date {
            Some(date) => date_lookup.entry(date).or_default().push(window),
            None => weekday_lookup.entry(window.day_of_week).or_default().push(window),
        }
    }

    let mut free_instances = CompatibleInstances::new(Vec::new());

    let mut day_cursor = Day {
        year: start.year(),
        month: start.month(),
        day: start.day(),
    };
    let last_day = Day {
        year: end.year(),
        month: end.month(),
        day: end.day(),
    };

    while day_cursor <= last_day {
        let applicable: Option<Vec<&ScheduleWindow>> = match date_lookup.get(&day_cursor.naive_date()) {
            Some(overrides) => Some(overrides.iter().filter(|w| w.is_available).copied().collect()),
            None => weekday_lookup
                .get(&day_cursor.weekday(tz))
                .map(|ws| ws.iter().filter(|w| w.is_available).copied().collect()),
        };
        if let Some(windows) = applicable {
            for window in windows {
                if let Some(event) = window.to_event(&day_cursor, tz) {
                    free_instances.push_back(event);
                }
            }
        }
        day_cursor.inc();
    }

    free_instances.remove_all_before(span.start());
    free_instances.remove_all_after(span.end());

    free_instances
}

#[cfg(test)]
mod test {
    use super::*;

    fn at(millis: i64) -> DateTime<Utc> {
        #[allow(clippy::unwrap_used)]
        DateTime::from_timestamp_millis(millis).unwrap()
    }

    fn window(day: Weekday, start: &str, end: &str) -> ScheduleWindow {
        ScheduleWindow {
            id: ID::default(),
            schedule_id: ID::default(),
            day_of_week: day,
            start_time: start.parse().unwrap(),
            end_time: end.parse().unwrap(),
            specific_date: None,
            is_available: true,
        }
    }

    #[test]
    fn time_parses_hh_mm() {
        let t: Time = "09:30".parse().unwrap();
        assert_eq!(t, Time { hours: 9, minutes: 30 });
        assert!("25:00".parse::<Time>().is_err());
    }

    #[test]
    fn resolves_weekday_windows_across_month() {
        let windows = vec![window(Weekday::Mon, "08:00", "10:30")];
        let span = TimeSpan::new(at(0), at(1000 * 60 * 60 * 24 * 30));
        let free = resolve_schedule_windows(&windows, &span, &chrono_tz::UTC).inner();
        assert!(!free.is_empty());
        for instance in &free {
            assert_eq!(instance.start_time.weekday(), Weekday::Mon);
        }
    }

    #[test]
    fn specific_date_override_wins_over_weekday() {
        let mut windows = vec![window(Weekday::Mon, "08:00", "10:30")];
        windows.push(ScheduleWindow {
            id: ID::default(),
            schedule_id: ID::default(),
            day_of_week: Weekday::Mon,
            start_time: "09:00".parse().unwrap(),
            end_time: "12:30".parse().unwrap(),
            specific_date: NaiveDate::from_ymd_opt(1970, 1, 12),
            is_available: true,
        });

        let span = TimeSpan::new(at(0), at(1000 * 60 * 60 * 24 * 30));
        let free = resolve_schedule_windows(&windows, &span, &chrono_tz::UTC).inner();

        let overridden_day = free
            .iter()
            .find(|i| i.start_time.date_naive() == NaiveDate::from_ymd_opt(1970, 1, 12).unwrap());
        assert!(overridden_day.is_some());
        let overridden_day = overridden_day.unwrap();
        assert_eq!(overridden_day.start_time.hour(), 9);
        assert_eq!(overridden_day.end_time.hour(), 12);
    }

    #[test]
    fn blackout_override_removes_the_day() {
        let windows = vec![
            window(Weekday::Mon, "08:00", "10:30"),
            ScheduleWindow {
                id: ID::default(),
                schedule_id: ID::default(),
                day_of_week: Weekday::Mon,
                start_time: "00:00".parse().unwrap(),
                end_time: "00:00".parse().unwrap(),
                specific_date: NaiveDate::from_ymd_opt(1970, 1, 12),
                is_available: false,
            },
        ];

        let span = TimeSpan::new(at(0), at(1000 * 60 * 60 * 24 * 30));
        let free = resolve_schedule_windows(&windows, &span, &chrono_tz::UTC).inner();
        assert!(
            !free
                .iter()
                .any(|i| i.start_time.date_naive() == NaiveDate::from_ymd_opt(1970, 1, 12).unwrap())
        );
    }
}
