use chrono::{DateTime, Utc};
use scheduling_domain::ID;
use scheduling_infra::{slot_lock::SlotLockHandle, AppContext};
use thiserror::Error;

use crate::error::SchedulingError;

/// `acquireSlotLock` / `releaseSlotLock`. Thin pass-through onto
/// `AppContext::slot_lock` -- the use-case layer adds nothing beyond
/// mapping the lock service's best-effort contract onto the closed error
/// surface: an unavailable lock store is `Transient`, never `Fatal`, since
/// callers (the booking engine included) are expected to proceed without a
/// lock rather than fail.
#[derive(Debug, Error)]
pub enum SlotLockError {
    #[error("slot is already locked")]
    AlreadyLocked,
    #[error("lock service unavailable: {0}")]
    Transient(String),
}

impl From<SlotLockError> for SchedulingError {
    fn from(e: SlotLockError) -> Self {
        match e {
            SlotLockError::AlreadyLocked => SchedulingError::Conflict("slot being booked".into()),
            SlotLockError::Transient(msg) => SchedulingError::Transient(msg),
        }
    }
}

pub async fn acquire_slot_lock(
    ctx: &AppContext,
    host_id: &ID,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> Result<SlotLockHandle, SlotLockError> {
    match ctx.slot_lock.acquire(host_id, start.timestamp_millis(), end.timestamp_millis()).await {
        Ok(Some(handle)) => Ok(handle),
        Ok(None) => Err(SlotLockError::AlreadyLocked),
        Err(e) => Err(SlotLockError::Transient(e.to_string())),
    }
}

pub async fn release_slot_lock(ctx: &AppContext, handle: &SlotLockHandle) -> Result<(), SlotLockError> {
    ctx.slot_lock
        .release(handle)
        .await
        .map_err(|e| SlotLockError::Transient(e.to_string()))
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;

    #[tokio::test]
    async fn acquire_then_release_round_trips() {
        let ctx = scheduling_infra::setup_in_memory_context();
        let host_id = ID::default();
        let start = Utc::now();
        let end = start + Duration::minutes(30);

        let handle = acquire_slot_lock(&ctx, &host_id, start, end).await.unwrap();
        release_slot_lock(&ctx, &handle).await.unwrap();
    }

    #[tokio::test]
    async fn second_acquire_on_same_slot_is_already_locked() {
        let ctx = scheduling_infra::setup_in_memory_context();
        let host_id = ID::default();
        let start = Utc::now();
        let end = start + Duration::minutes(30);

        let _handle = acquire_slot_lock(&ctx, &host_id, start, end).await.unwrap();
        let err = acquire_slot_lock(&ctx, &host_id, start, end).await.unwrap_err();
        assert!(matches!(err, SlotLockError::AlreadyLocked));
    }
}
