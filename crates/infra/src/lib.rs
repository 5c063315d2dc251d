pub mod clock;
pub mod metrics;
pub mod queue;
pub mod repos;
pub mod slot_lock;
pub mod tenant;

use std::{sync::Arc, time::Duration};

use sqlx::postgres::PgPoolOptions;
use tracing::warn;

pub use clock::{Clock, FixedClock, SystemClock};
pub use queue::{IQueue, ReminderScheduler};
pub use repos::Repos;
pub use slot_lock::ISlotLockService;
pub use tenant::TenantScope;

use queue::{InMemoryQueue, PostgresQueue};
use slot_lock::{InMemorySlotLockService, RedisSlotLockService};

/// The process-wide dependency bag every use case in `scheduling_api`
/// receives explicitly, rather than reaching into globals: repos + config
/// + the things tests want to swap out (here, the clock, the lock
/// service, and the job sinks).
#[derive(Clone)]
pub struct AppContext {
    pub repos: Repos,
    pub clock: Arc<dyn Clock>,
    pub slot_lock: Arc<dyn ISlotLockService>,
    pub notifications: Arc<dyn IQueue>,
    pub webhooks: Arc<dyn IQueue>,
    pub reminders: Arc<ReminderScheduler>,
}

/// Builds a real `AppContext` wired to Postgres and Redis, using
/// `scheduling_utils::config::APP_CONFIG` for connection strings and
/// tunables. Called once at bootstrap by `bins/scheduling-core`.
pub async fn setup_context() -> anyhow::Result<AppContext> {
    let config = &scheduling_utils::config::APP_CONFIG;

    let pool = PgPoolOptions::new()
        .min_connections(config.pg.min_connections)
        .max_connections(config.pg.max_connections)
        .connect(&config.pg.database_url)
        .await?;

    if let Err(e) = metrics::register_metrics() {
        warn!(error = %e, "failed to register infra metrics (already registered?)");
    }
    metrics::update_connection_pool_metrics(pool.size() as i64, pool.num_idle() as i64, pool.size() as i64 - pool.num_idle() as i64);

    let repos = Repos::new_postgres(pool.clone());

    let redis_client = redis::Client::open(config.redis.url.clone())?;
    let redis_conn = redis::aio::ConnectionManager::new(redis_client).await?;
    let slot_lock: Arc<dyn ISlotLockService> = Arc::new(RedisSlotLockService::new(
        redis_conn,
        Duration::from_secs(config.slot_lock_ttl_seconds),
    ));

    let notifications: Arc<dyn IQueue> = Arc::new(PostgresQueue::new(pool.clone()));
    let webhooks: Arc<dyn IQueue> = Arc::new(PostgresQueue::new(pool));
    let reminders = Arc::new(ReminderScheduler::new(
        notifications.clone(),
        config.reminder_offsets_minutes.clone(),
        config.queue_default_attempts,
    ));

    Ok(AppContext {
        repos,
        clock: Arc::new(SystemClock),
        slot_lock,
        notifications,
        webhooks,
        reminders,
    })
}

/// An in-process `AppContext` for tests and local-dev mode: no Postgres,
/// no Redis.
pub fn setup_in_memory_context() -> AppContext {
    let config = &scheduling_utils::config::APP_CONFIG;

    let notifications: Arc<dyn IQueue> = InMemoryQueue::new();
    let webhooks: Arc<dyn IQueue> = InMemoryQueue::new();
    let reminders = Arc::new(ReminderScheduler::new(
        notifications.clone(),
        config.reminder_offsets_minutes.clone(),
        config.queue_default_attempts,
    ));

    AppContext {
        repos: Repos::new_in_memory(),
        clock: Arc::new(SystemClock),
        slot_lock: InMemorySlotLockService::new(Duration::from_secs(config.slot_lock_ttl_seconds)),
        notifications,
        webhooks,
        reminders,
    }
}

/// Run the migrations. Not invoked by the application itself; exposed as
/// a utility for `bins/scheduling-core/src/bin/migrate.rs`.
pub async fn run_migration() -> anyhow::Result<()> {
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(scheduling_utils::config::APP_CONFIG.pg.database_url.as_str())
        .await?;

    sqlx::migrate!().run(&pool).await.map_err(|e| e.into())
}
