use std::{collections::HashMap, sync::Arc};

use chrono::{DateTime, Utc};
use scheduling_domain::ID;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use tokio::sync::RwLock;

/// The kinds of side-effect work the booking engine fans out after a
/// successful state transition. Each variant carries just
/// enough to let a worker re-derive the notification/webhook payload
/// without a second read of the booking -- the job row is the source of
/// truth for retries.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobPayload {
    BookingCreatedNotification { booking_id: ID },
    BookingConfirmedNotification { booking_id: ID },
    BookingCancelledNotification { booking_id: ID },
    BookingRescheduledNotification { booking_id: ID, previous_booking_id: ID },
    BookingReminder { booking_id: ID, offset_minutes: i64 },
    Webhook { organization_id: ID, event: String, payload: serde_json::Value },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobStatus {
    Pending,
    Delivered,
    Failed,
}

/// One row of at-least-once delivery work. `job_key` is the
/// dedupe key: enqueuing the same `job_key` twice is a no-op, which is
/// how the booking engine can safely re-enqueue a reminder on reschedule
/// without double-sending the original.
#[derive(Debug, Clone)]
pub struct QueuedJob {
    pub id: ID,
    pub job_key: String,
    pub payload: JobPayload,
    pub status: JobStatus,
    pub attempts: u32,
    pub max_attempts: u32,
    pub run_at: DateTime<Utc>,
    pub last_error: Option<String>,
}

/// The async job sink the use cases enqueue onto. Delivery itself
/// (actually sending an email or POSTing a webhook) is out of scope here;
/// this only models durable enqueue/dequeue/ack/retry bookkeeping.
#[async_trait::async_trait]
pub trait IQueue: Send + Sync {
    async fn enqueue(&self, job_key: &str, payload: JobPayload, run_at: DateTime<Utc>, max_attempts: u32) -> anyhow::Result<()>;
    /// Cancels any not-yet-delivered job with this key, used when a
    /// reschedule/cancel makes a previously scheduled reminder stale.
    async fn cancel(&self, job_key: &str) -> anyhow::Result<()>;
    /// Pending jobs whose `run_at` has elapsed, ready for a worker to claim.
    async fn due(&self, now: DateTime<Utc>, limit: u32) -> anyhow::Result<Vec<QueuedJob>>;
    async fn mark_delivered(&self, id: &ID) -> anyhow::Result<()>;
    /// Records a failed attempt; the caller computes the exponential
    /// backoff and passes the next `run_at` (`base * 2^attempts`).
    async fn mark_failed(&self, id: &ID, error: &str, next_run_at: DateTime<Utc>) -> anyhow::Result<()>;
}

/// Schedules the fixed set of pre-start reminder offsets for a booking
/// built on top of any `IQueue`.
pub struct ReminderScheduler {
    queue: Arc<dyn IQueue>,
    offsets_minutes: Vec<i64>,
    max_attempts: u32,
}

impl ReminderScheduler {
    pub fn new(queue: Arc<dyn IQueue>, offsets_minutes: Vec<i64>, max_attempts: u32) -> Self {
        Self {
            queue,
            offsets_minutes,
            max_attempts,
        }
    }

    /// Schedules one reminder job per configured offset, skipping offsets
    /// that would fire in the past relative to `now`.
    pub async fn schedule_for_booking(&self, booking_id: &ID, start_time: DateTime<Utc>, now: DateTime<Utc>) -> anyhow::Result<()> {
        for &offset in &self.offsets_minutes {
            let run_at = start_time - chrono::Duration::minutes(offset);
            if run_at <= now {
                continue;
            }
            let job_key = format!("reminder:{booking_id}:{offset}");
            self.queue
                .enqueue(
                    &job_key,
                    JobPayload::BookingReminder {
                        booking_id: booking_id.clone(),
                        offset_minutes: offset,
                    },
                    run_at,
                    self.max_attempts,
                )
                .await?;
        }
        Ok(())
    }

    /// Cancels every reminder offset for a booking, used on cancel and
    /// before rescheduling a new set onto the moved booking.
    pub async fn cancel_for_booking(&self, booking_id: &ID) -> anyhow::Result<()> {
        for offset in &self.offsets_minutes {
            self.queue.cancel(&format!("reminder:{booking_id}:{offset}")).await?;
        }
        Ok(())
    }
}

#[derive(Debug, FromRow)]
struct JobRow {
    job_uid: uuid::Uuid,
    job_key: String,
    payload: serde_json::Value,
    status: String,
    attempts: i32,
    max_attempts: i32,
    run_at: DateTime<Utc>,
    last_error: Option<String>,
}

fn parse_status(s: &str) -> anyhow::Result<JobStatus> {
    match s {
        "PENDING" => Ok(JobStatus::Pending),
        "DELIVERED" => Ok(JobStatus::Delivered),
        "FAILED" => Ok(JobStatus::Failed),
        other => Err(anyhow::anyhow!("invalid job status: {other}")),
    }
}

fn status_str(s: &JobStatus) -> &'static str {
    match s {
        JobStatus::Pending => "PENDING",
        JobStatus::Delivered => "DELIVERED",
        JobStatus::Failed => "FAILED",
    }
}

impl TryFrom<JobRow> for QueuedJob {
    type Error = anyhow::Error;

    fn try_from(row: JobRow) -> Result<Self, Self::Error> {
        Ok(QueuedJob {
            id: row.job_uid.into(),
            job_key: row.job_key,
            payload: serde_json::from_value(row.payload)?,
            status: parse_status(&row.status)?,
            attempts: row.attempts as u32,
            max_attempts: row.max_attempts as u32,
            run_at: row.run_at,
            last_error: row.last_error,
        })
    }
}

/// Postgres-table-backed queue: every enqueue is an upsert keyed on
/// `job_key` so a duplicate enqueue is a no-op rather than a second row
/// (the dedupe key).
pub struct PostgresQueue {
    pool: PgPool,
}

impl PostgresQueue {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl IQueue for PostgresQueue {
    async fn enqueue(&self, job_key: &str, payload: JobPayload, run_at: DateTime<Utc>, max_attempts: u32) -> anyhow::Result<()> {
        sqlx::query(
            "INSERT INTO queued_jobs (job_uid, job_key, payload, status, attempts, max_attempts, run_at, last_error) \
             VALUES ($1, $2, $3, 'PENDING', 0, $4, $5, NULL) \
             ON CONFLICT (job_key) DO NOTHING",
        )
        .bind(uuid::Uuid::new_v4())
        .bind(job_key)
        .bind(serde_json::to_value(&payload)?)
        .bind(max_attempts as i32)
        .bind(run_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn cancel(&self, job_key: &str) -> anyhow::Result<()> {
        sqlx::query("DELETE FROM queued_jobs WHERE job_key = $1 AND status = 'PENDING'")
            .bind(job_key)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn due(&self, now: DateTime<Utc>, limit: u32) -> anyhow::Result<Vec<QueuedJob>> {
        let rows: Vec<JobRow> = sqlx::query_as(
            "SELECT job_uid, job_key, payload, status, attempts, max_attempts, run_at, last_error \
             FROM queued_jobs WHERE status = 'PENDING' AND run_at <= $1 ORDER BY run_at ASC LIMIT $2",
        )
        .bind(now)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(QueuedJob::try_from).collect()
    }

    async fn mark_delivered(&self, id: &ID) -> anyhow::Result<()> {
        sqlx::query("UPDATE queued_jobs SET status = 'DELIVERED' WHERE job_uid = $1")
            .bind(*id.as_ref())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn mark_failed(&self, id: &ID, error: &str, next_run_at: DateTime<Utc>) -> anyhow::Result<()> {
        sqlx::query(
            "UPDATE queued_jobs SET attempts = attempts + 1, last_error = $2, run_at = $3, \
             status = CASE WHEN attempts + 1 >= max_attempts THEN 'FAILED' ELSE 'PENDING' END \
             WHERE job_uid = $1",
        )
        .bind(*id.as_ref())
        .bind(error)
        .bind(next_run_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryQueue {
    jobs: RwLock<HashMap<String, QueuedJob>>,
}

impl InMemoryQueue {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }
}

#[async_trait::async_trait]
impl IQueue for InMemoryQueue {
    async fn enqueue(&self, job_key: &str, payload: JobPayload, run_at: DateTime<Utc>, max_attempts: u32) -> anyhow::Result<()> {
        let mut jobs = self.jobs.write().await;
        if jobs.contains_key(job_key) {
            return Ok(());
        }
        jobs.insert(
            job_key.to_string(),
            QueuedJob {
                id: ID::default(),
                job_key: job_key.to_string(),
                payload,
                status: JobStatus::Pending,
                attempts: 0,
                max_attempts,
                run_at,
                last_error: None,
            },
        );
        Ok(())
    }

    async fn cancel(&self, job_key: &str) -> anyhow::Result<()> {
        let mut jobs = self.jobs.write().await;
        if matches!(jobs.get(job_key), Some(j) if j.status == JobStatus::Pending) {
            jobs.remove(job_key);
        }
        Ok(())
    }

    async fn due(&self, now: DateTime<Utc>, limit: u32) -> anyhow::Result<Vec<QueuedJob>> {
        let jobs = self.jobs.read().await;
        let mut due: Vec<QueuedJob> = jobs
            .values()
            .filter(|j| j.status == JobStatus::Pending && j.run_at <= now)
            .cloned()
            .collect();
        due.sort_by_key(|j| j.run_at);
        due.truncate(limit as usize);
        Ok(due)
    }

    async fn mark_delivered(&self, id: &ID) -> anyhow::Result<()> {
        let mut jobs = self.jobs.write().await;
        if let Some(job) = jobs.values_mut().find(|j| &j.id == id) {
            job.status = JobStatus::Delivered;
        }
        Ok(())
    }

    async fn mark_failed(&self, id: &ID, error: &str, next_run_at: DateTime<Utc>) -> anyhow::Result<()> {
        let mut jobs = self.jobs.write().await;
        if let Some(job) = jobs.values_mut().find(|j| &j.id == id) {
            job.attempts += 1;
            job.last_error = Some(error.to_string());
            job.run_at = next_run_at;
            if job.attempts >= job.max_attempts {
                job.status = JobStatus::Failed;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn duplicate_enqueue_with_same_key_is_a_no_op() {
        let queue = InMemoryQueue::new();
        let booking_id = ID::default();
        let now = DateTime::from_timestamp_millis(0).unwrap();

        queue
            .enqueue("reminder:x:60", JobPayload::BookingReminder { booking_id: booking_id.clone(), offset_minutes: 60 }, now, 3)
            .await
            .unwrap();
        queue
            .enqueue("reminder:x:60", JobPayload::BookingReminder { booking_id, offset_minutes: 60 }, now, 3)
            .await
            .unwrap();

        let due = queue.due(now, 10).await.unwrap();
        assert_eq!(due.len(), 1);
    }

    #[tokio::test]
    async fn reminder_scheduler_skips_offsets_already_in_the_past() {
        let queue = InMemoryQueue::new();
        let scheduler = ReminderScheduler::new(queue.clone(), vec![1440, 60, 15], 3);

        let booking_id = ID::default();
        let start = DateTime::from_timestamp_millis(30 * 60 * 1000).unwrap(); // 30 min from epoch
        let now = DateTime::from_timestamp_millis(0).unwrap();

        scheduler.schedule_for_booking(&booking_id, start, now).await.unwrap();

        // 1440m and 60m before `start` are already in the past relative to `now`; only 15m survives.
        let due = queue.due(start, 10).await.unwrap();
        assert_eq!(due.len(), 1);
    }

    #[tokio::test]
    async fn mark_failed_past_max_attempts_marks_job_failed() {
        let queue = InMemoryQueue::new();
        let now = DateTime::from_timestamp_millis(0).unwrap();
        queue
            .enqueue("webhook:1", JobPayload::Webhook { organization_id: ID::default(), event: "booking.created".into(), payload: serde_json::json!({}) }, now, 1)
            .await
            .unwrap();

        let due = queue.due(now, 10).await.unwrap();
        let job = &due[0];
        queue.mark_failed(&job.id, "connection refused", now).await.unwrap();

        let due_after = queue.due(now, 10).await.unwrap();
        assert!(due_after.is_empty(), "job should no longer be pending after exceeding max_attempts");
    }
}
