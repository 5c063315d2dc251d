pub mod availability;
pub mod booking;
pub mod date;
mod event_instance;
pub mod event_type;
pub mod overlap;
pub mod round_robin;
pub mod schedule;
mod shared;
mod timespan;
mod user;

pub use chrono_tz::Tz;
pub use date::format_date;
pub use event_instance::{CompatibleInstances, EventInstance, FreeBusy, get_free_busy};
pub use shared::{
    entity::{Entity, ID},
    metadata::{Meta, Metadata},
};
pub use timespan::TimeSpan;
pub use user::{Organization, User};
