use std::{collections::HashMap, sync::Arc};

use chrono::{NaiveDate, Weekday};
use scheduling_domain::{
    schedule::{ScheduleWindow, Time, UserSchedule},
    ID,
};
use sqlx::{FromRow, PgPool};
use tokio::sync::RwLock;

#[async_trait::async_trait]
pub trait IScheduleRepo: Send + Sync {
    async fn insert(&self, schedule: &UserSchedule) -> anyhow::Result<()>;
    async fn insert_window(&self, window: &ScheduleWindow) -> anyhow::Result<()>;

    /// The user's default schedule, else any schedule belonging to them.
    async fn find_effective_for_user(&self, user_id: &ID) -> anyhow::Result<Option<UserSchedule>>;
    async fn find_windows(&self, schedule_id: &ID) -> anyhow::Result<Vec<ScheduleWindow>>;
}

fn weekday_from_i16(v: i16) -> anyhow::Result<Weekday> {
    Weekday::try_from(v as u8).map_err(|_| anyhow::anyhow!("invalid day_of_week: {v}"))
}

#[derive(Debug, FromRow)]
struct ScheduleRow {
    schedule_uid: uuid::Uuid,
    user_uid: uuid::Uuid,
    name: String,
    is_default: bool,
    buffer_before_minutes: i64,
    buffer_after_minutes: i64,
    minimum_notice_hours: i64,
    max_bookings_per_day: Option<i32>,
    max_bookings_per_week: Option<i32>,
}

impl From<ScheduleRow> for UserSchedule {
    fn from(row: ScheduleRow) -> Self {
        UserSchedule {
            id: row.schedule_uid.into(),
            user_id: row.user_uid.into(),
            name: row.name,
            is_default: row.is_default,
            buffer_before_minutes: row.buffer_before_minutes,
            buffer_after_minutes: row.buffer_after_minutes,
            minimum_notice_hours: row.minimum_notice_hours,
            max_bookings_per_day: row.max_bookings_per_day.map(|v| v as u32),
            max_bookings_per_week: row.max_bookings_per_week.map(|v| v as u32),
        }
    }
}

#[derive(Debug, FromRow)]
struct ScheduleWindowRow {
    window_uid: uuid::Uuid,
    schedule_uid: uuid::Uuid,
    day_of_week: i16,
    start_hour: i16,
    start_minute: i16,
    end_hour: i16,
    end_minute: i16,
    specific_date: Option<NaiveDate>,
    is_available: bool,
}

impl TryFrom<ScheduleWindowRow> for ScheduleWindow {
    type Error = anyhow::Error;

    fn try_from(row: ScheduleWindowRow) -> Result<Self, Self::Error> {
        Ok(ScheduleWindow {
            id: row.window_uid.into(),
            schedule_id: row.schedule_uid.into(),
            day_of_week: weekday_from_i16(row.day_of_week)?,
            start_time: Time {
                hours: row.start_hour as u32,
                minutes: row.start_minute as u32,
            },
            end_time: Time {
                hours: row.end_hour as u32,
                minutes: row.end_minute as u32,
            },
            specific_date: row.specific_date,
            is_available: row.is_available,
        })
    }
}

pub struct PostgresScheduleRepo {
    pool: PgPool,
}

impl PostgresScheduleRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl IScheduleRepo for PostgresScheduleRepo {
    async fn insert(&self, schedule: &UserSchedule) -> anyhow::Result<()> {
        sqlx::query(
            "INSERT INTO user_schedules (schedule_uid, user_uid, name, is_default, buffer_before_minutes, buffer_after_minutes, minimum_notice_hours, max_bookings_per_day, max_bookings_per_week) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
        )
        .bind(*schedule.id.as_ref())
        .bind(*schedule.user_id.as_ref())
        .bind(&schedule.name)
        .bind(schedule.is_default)
        .bind(schedule.buffer_before_minutes)
        .bind(schedule.buffer_after_minutes)
        .bind(schedule.minimum_notice_hours)
        .bind(schedule.max_bookings_per_day.map(|v| v as i32))
        .bind(schedule.max_bookings_per_week.map(|v| v as i32))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn insert_window(&self, window: &ScheduleWindow) -> anyhow::Result<()> {
        sqlx::query(
            "INSERT INTO schedule_windows (window_uid, schedule_uid, day_of_week, start_hour, start_minute, end_hour, end_minute, specific_date, is_available) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
        )
        .bind(*window.id.as_ref())
        .bind(*window.schedule_id.as_ref())
        .bind(window.day_of_week.num_days_from_sunday() as i16)
        .bind(window.start_time.hours as i16)
        .bind(window.start_time.minutes as i16)
        .bind(window.end_time.hours as i16)
        .bind(window.end_time.minutes as i16)
        .bind(window.specific_date)
        .bind(window.is_available)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find_effective_for_user(&self, user_id: &ID) -> anyhow::Result<Option<UserSchedule>> {
        let row: Option<ScheduleRow> = sqlx::query_as(
            "SELECT schedule_uid, user_uid, name, is_default, buffer_before_minutes, buffer_after_minutes, minimum_notice_hours, max_bookings_per_day, max_bookings_per_week \
             FROM user_schedules WHERE user_uid = $1 ORDER BY is_default DESC LIMIT 1",
        )
        .bind(*user_id.as_ref())
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(UserSchedule::from))
    }

    async fn find_windows(&self, schedule_id: &ID) -> anyhow::Result<Vec<ScheduleWindow>> {
        let rows: Vec<ScheduleWindowRow> = sqlx::query_as(
            "SELECT window_uid, schedule_uid, day_of_week, start_hour, start_minute, end_hour, end_minute, specific_date, is_available \
             FROM schedule_windows WHERE schedule_uid = $1",
        )
        .bind(*schedule_id.as_ref())
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(ScheduleWindow::try_from).collect()
    }
}

/// In-process fake. Schedules and windows are both stored flat; the
/// "default, else any" resolution is done in `fn find_effective_for_user`
/// exactly as the Postgres `ORDER BY is_default DESC LIMIT 1` does.
#[derive(Default)]
pub struct InMemoryScheduleRepo {
    schedules: RwLock<HashMap<ID, UserSchedule>>,
    windows: RwLock<HashMap<ID, Vec<ScheduleWindow>>>,
}

impl InMemoryScheduleRepo {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }
}

#[async_trait::async_trait]
impl IScheduleRepo for InMemoryScheduleRepo {
    async fn insert(&self, schedule: &UserSchedule) -> anyhow::Result<()> {
        self.schedules.write().await.insert(schedule.id.clone(), schedule.clone());
        Ok(())
    }

    async fn insert_window(&self, window: &ScheduleWindow) -> anyhow::Result<()> {
        self.windows
            .write()
            .await
            .entry(window.schedule_id.clone())
            .or_default()
            .push(window.clone());
        Ok(())
    }

    async fn find_effective_for_user(&self, user_id: &ID) -> anyhow::Result<Option<UserSchedule>> {
        let schedules = self.schedules.read().await;
        let mut candidates: Vec<&UserSchedule> =
            schedules.values().filter(|s| &s.user_id == user_id).collect();
        candidates.sort_by_key(|s| !s.is_default);
        Ok(candidates.into_iter().next().cloned())
    }

    async fn find_windows(&self, schedule_id: &ID) -> anyhow::Result<Vec<ScheduleWindow>> {
        Ok(self.windows.read().await.get(schedule_id).cloned().unwrap_or_default())
    }
}
