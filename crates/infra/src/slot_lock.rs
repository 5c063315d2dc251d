use std::{collections::HashMap, sync::Arc, time::Duration};

use redis::{AsyncCommands, Script};
use scheduling_domain::ID;
use tokio::sync::Mutex;

/// A held lock token, returned by `acquire` and required by `release`. The
/// value is a random token rather than the lock key itself, so a release
/// call can never accidentally drop a lock some other holder re-acquired
/// after this one's TTL expired (the classic single-writer lock pitfall).
#[derive(Debug, Clone)]
pub struct SlotLockHandle {
    key: String,
    token: String,
}

/// Distributed single-writer lock over a host/time-slot key, guarding the
/// booking engine's create/reschedule critical section. Acquiring is
/// best-effort: when the lock cannot be taken within
/// the wait window, `acquire` returns `Ok(None)` rather than an error --
/// the caller treats that identically to "someone else is booking this
/// slot right now".
#[async_trait::async_trait]
pub trait ISlotLockService: Send + Sync {
    async fn acquire(&self, host_id: &ID, start_ms: i64, end_ms: i64) -> anyhow::Result<Option<SlotLockHandle>>;
    async fn release(&self, handle: &SlotLockHandle) -> anyhow::Result<()>;
}

fn lock_key(host_id: &ID, start_ms: i64, end_ms: i64) -> String {
    format!("slotlock:{host_id}:{start_ms}:{end_ms}")
}

/// Redis-backed implementation: `SET key token NX PX ttl` to acquire,
/// and a Lua compare-and-delete script to release only if the caller
/// still holds the token (avoids deleting a lock someone else now owns).
pub struct RedisSlotLockService {
    conn: redis::aio::ConnectionManager,
    ttl: Duration,
}

impl RedisSlotLockService {
    pub fn new(conn: redis::aio::ConnectionManager, ttl: Duration) -> Self {
        Self { conn, ttl }
    }
}

const RELEASE_SCRIPT: &str = r#"
if redis.call("get", KEYS[1]) == ARGV[1] then
    return redis.call("del", KEYS[1])
else
    return 0
end
"#;

#[async_trait::async_trait]
impl ISlotLockService for RedisSlotLockService {
    async fn acquire(&self, host_id: &ID, start_ms: i64, end_ms: i64) -> anyhow::Result<Option<SlotLockHandle>> {
        let key = lock_key(host_id, start_ms, end_ms);
        let token = scheduling_utils::create_random_secret(24);
        let mut conn = self.conn.clone();

        let reply: Option<String> = redis::cmd("SET")
            .arg(&key)
            .arg(&token)
            .arg("NX")
            .arg("PX")
            .arg(self.ttl.as_millis() as u64)
            .query_async(&mut conn)
            .await?;

        Ok(reply.map(|_| SlotLockHandle { key, token }))
    }

    async fn release(&self, handle: &SlotLockHandle) -> anyhow::Result<()> {
        let mut conn = self.conn.clone();
        let script = Script::new(RELEASE_SCRIPT);
        let _: i32 = script
            .key(&handle.key)
            .arg(&handle.token)
            .invoke_async(&mut conn)
            .await?;
        Ok(())
    }
}

struct InMemoryLockEntry {
    token: String,
    expires_at: std::time::Instant,
}

/// In-process fallback used by tests and local-dev mode, when no Redis is
/// configured. Expiry is checked lazily on the next `acquire` for the same
/// key rather than via a background sweeper.
#[derive(Default)]
pub struct InMemorySlotLockService {
    locks: Mutex<HashMap<String, InMemoryLockEntry>>,
    ttl: Duration,
}

impl InMemorySlotLockService {
    pub fn new(ttl: Duration) -> Arc<Self> {
        Arc::new(Self {
            locks: Mutex::new(HashMap::new()),
            ttl,
        })
    }
}

#[async_trait::async_trait]
impl ISlotLockService for InMemorySlotLockService {
    async fn acquire(&self, host_id: &ID, start_ms: i64, end_ms: i64) -> anyhow::Result<Option<SlotLockHandle>> {
        let key = lock_key(host_id, start_ms, end_ms);
        let mut locks = self.locks.lock().await;

        if let Some(entry) = locks.get(&key) {
            if entry.expires_at > std::time::Instant::now() {
                return Ok(None);
            }
        }

        let token = scheduling_utils::create_random_secret(24);
        locks.insert(
            key.clone(),
            InMemoryLockEntry {
                token: token.clone(),
                expires_at: std::time::Instant::now() + self.ttl,
            },
        );
        Ok(Some(SlotLockHandle { key, token }))
    }

    async fn release(&self, handle: &SlotLockHandle) -> anyhow::Result<()> {
        let mut locks = self.locks.lock().await;
        if let Some(entry) = locks.get(&handle.key) {
            if entry.token == handle.token {
                locks.remove(&handle.key);
            }
        }
        Ok(())
    }
}
