pub mod booking;
pub mod busy_block;
pub mod event_type;
pub mod organization;
pub mod schedule;
pub mod user;

use std::sync::Arc;

use sqlx::PgPool;

use self::{
    booking::{IBookingRepo, PostgresBookingRepo},
    busy_block::{IBusyBlockRepo, PostgresBusyBlockRepo},
    event_type::{IEventTypeRepo, PostgresEventTypeRepo},
    organization::{IOrganizationRepo, PostgresOrganizationRepo},
    schedule::{IScheduleRepo, PostgresScheduleRepo},
    user::{IUserRepo, PostgresUserRepo},
};

/// The untenanted, process-wide set of repos. Tenant scoping is applied
/// per request by wrapping the `booking`/`event_type` members in their
/// `TenantScoped*` adapters -- `Repos` itself holds the unscoped
/// base repos, which call sites narrow as needed.
#[derive(Clone)]
pub struct Repos {
    pub organizations: Arc<dyn IOrganizationRepo>,
    pub users: Arc<dyn IUserRepo>,
    pub schedules: Arc<dyn IScheduleRepo>,
    pub event_types: Arc<dyn IEventTypeRepo>,
    pub bookings: Arc<dyn IBookingRepo>,
    pub busy_blocks: Arc<dyn IBusyBlockRepo>,
}

impl Repos {
    pub fn new_postgres(pool: PgPool) -> Self {
        Self {
            organizations: Arc::new(PostgresOrganizationRepo::new(pool.clone())),
            users: Arc::new(PostgresUserRepo::new(pool.clone())),
            schedules: Arc::new(PostgresScheduleRepo::new(pool.clone())),
            event_types: Arc::new(PostgresEventTypeRepo::new(pool.clone())),
            bookings: Arc::new(PostgresBookingRepo::new(pool.clone())),
            busy_blocks: Arc::new(PostgresBusyBlockRepo::new(pool)),
        }
    }

    pub fn new_in_memory() -> Self {
        Self {
            organizations: organization::InMemoryOrganizationRepo::new(),
            users: user::InMemoryUserRepo::new(),
            schedules: schedule::InMemoryScheduleRepo::new(),
            event_types: event_type::InMemoryEventTypeRepo::new(),
            bookings: booking::InMemoryBookingRepo::new(),
            busy_blocks: busy_block::InMemoryBusyBlockRepo::new(),
        }
    }
}
