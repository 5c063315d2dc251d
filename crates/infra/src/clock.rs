use chrono::{DateTime, Utc};

/// Abstracts "now" so the booking/availability use cases never call
/// `Utc::now()` directly -- tests can pin a clock, since boundary tests
/// around minimum-notice cutoffs need exact control over what `now` is.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// The production clock, backed by the system wall clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock fixed to a single instant, settable at construction and mutable
/// behind an internal lock so tests can advance it mid-scenario.
#[derive(Debug)]
pub struct FixedClock {
    instant: std::sync::Mutex<DateTime<Utc>>,
}

impl FixedClock {
    pub fn new(instant: DateTime<Utc>) -> Self {
        Self {
            instant: std::sync::Mutex::new(instant),
        }
    }

    #[allow(clippy::unwrap_used)]
    pub fn set(&self, instant: DateTime<Utc>) {
        *self.instant.lock().unwrap() = instant;
    }
}

impl Clock for FixedClock {
    #[allow(clippy::unwrap_used)]
    fn now(&self) -> DateTime<Utc> {
        *self.instant.lock().unwrap()
    }
}
