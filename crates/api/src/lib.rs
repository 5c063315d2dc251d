//! In-process use-case API for the scheduling core. Each module is
//! one orchestration entry point -- `getAvailability`, `createBooking`,
//! `confirmBooking`, `cancelBooking`, `rescheduleBooking` -- that wires an
//! `AppContext` (repos, clock, slot lock, queues) into the pure algorithms
//! in `scheduling_domain`. There is no HTTP surface here: routing, request
//! validation, and auth are the surrounding layer's job.

pub mod availability;
pub mod cancel_booking;
pub mod confirm_booking;
pub mod create_booking;
pub mod error;
pub mod reschedule_booking;
pub mod shared;
pub mod slot_lock;

pub use availability::{GetAvailabilityError, GetAvailabilityUseCase};
pub use cancel_booking::{CancelBookingError, CancelBookingUseCase};
pub use confirm_booking::{ConfirmBookingError, ConfirmBookingUseCase};
pub use create_booking::{CreateBookingAttendee, CreateBookingError, CreateBookingUseCase};
pub use error::SchedulingError;
pub use reschedule_booking::{RescheduleBookingError, RescheduleBookingUseCase};
pub use shared::{request_context::RequestContext, usecase::{execute, UseCase}};
pub use slot_lock::{acquire_slot_lock, release_slot_lock, SlotLockError};
