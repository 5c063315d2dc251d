use chrono::{DateTime, Utc};

use crate::shared::entity::ID;

/// A host's current round-robin standing, as loaded from `EventTypeHost`.
#[derive(Debug, Clone)]
pub struct RoundRobinHost {
    pub user_id: ID,
    pub priority: i32,
    pub booking_count: i64,
    pub last_booked_at: Option<DateTime<Utc>>,
}

/// Walks a fairness-ordered rotation of hosts across an ascending sequence
/// of slot start times, assigning each start to the next host in rotation
/// that is available at that instant. Only `is_active = true` hosts are
/// admitted to the rotation.
///
/// Ordering: `(booking_count asc, last_booked_at asc NULLS FIRST, priority desc)`.
pub struct RoundRobinAssignment {
    fairness_order: Vec<ID>,
    cursor: usize,
}

impl RoundRobinAssignment {
    pub fn new(hosts: &[RoundRobinHost]) -> Self {
        let mut ordered: Vec<&RoundRobinHost> = hosts.iter().collect();
        ordered.sort_by(|a, b| {
            a.booking_count
                .cmp(&b.booking_count)
                .then_with(|| match (a.last_booked_at, b.last_booked_at) {
                    (None, None) => std::cmp::Ordering::Equal,
                    (None, Some(_)) => std::cmp::Ordering::Less,
                    (Some(_), None) => std::cmp::Ordering::Greater,
                    (Some(a), Some(b)) => a.cmp(&b),
                })
                .then_with(|| b.priority.cmp(&a.priority))
        });

        Self {
            fairness_order: ordered.into_iter().map(|h| h.user_id.clone()).collect(),
            cursor: 0,
        }
    }

    /// Assigns one slot start to the next available host in rotation,
    /// advancing the cursor past whoever is chosen. Returns `None` (and
    /// leaves the cursor untouched) if no host in the rotation is
    /// available at `start`, per the "skip that instant" rule.
    pub fn assign_one(
        &mut self,
        start: DateTime<Utc>,
        is_available: impl Fn(&ID, DateTime<Utc>) -> bool,
    ) -> Option<ID> {
        let len = self.fairness_order.len();
        if len == 0 {
            return None;
        }
        for offset in 0..len {
            let idx = (self.cursor + offset) % len;
            let candidate = &self.fairness_order[idx];
            if is_available(candidate, start) {
                self.cursor = (idx + 1) % len;
                return Some(candidate.clone());
            }
        }
        None
    }

    /// Assigns an entire ascending sequence of slot starts in one pass,
    /// dropping any start for which no host is available.
    pub fn assign_all(
        &mut self,
        starts: &[DateTime<Utc>],
        is_available: impl Fn(&ID, DateTime<Utc>) -> bool,
    ) -> Vec<(DateTime<Utc>, ID)> {
        starts
            .iter()
            .filter_map(|&start| self.assign_one(start, &is_available).map(|host| (start, host)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn host(id: ID, priority: i32, booking_count: i64, last_booked_at: Option<i64>) -> RoundRobinHost {
        RoundRobinHost {
            user_id: id,
            priority,
            booking_count,
            last_booked_at: last_booked_at.map(|m| DateTime::from_timestamp_millis(m).unwrap()),
        }
    }

    fn at(millis: i64) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(millis).unwrap()
    }

    #[test]
    fn orders_by_least_loaded_first() {
        let a = ID::default();
        let b = ID::default();
        let hosts = vec![
            host(a.clone(), 0, 5, Some(100)),
            host(b.clone(), 0, 1, Some(100)),
        ];
        let mut rr = RoundRobinAssignment::new(&hosts);
        let chosen = rr.assign_one(at(0), |_, _| true);
        assert_eq!(chosen, Some(b));
    }

    #[test]
    fn null_last_booked_sorts_first() {
        let a = ID::default();
        let b = ID::default();
        let hosts = vec![host(a.clone(), 0, 0, Some(100)), host(b.clone(), 0, 0, None)];
        let mut rr = RoundRobinAssignment::new(&hosts);
        let chosen = rr.assign_one(at(0), |_, _| true);
        assert_eq!(chosen, Some(b));
    }

    #[test]
    fn priority_breaks_ties() {
        let a = ID::default();
        let b = ID::default();
        let hosts = vec![host(a.clone(), 1, 0, None), host(b.clone(), 5, 0, None)];
        let mut rr = RoundRobinAssignment::new(&hosts);
        let chosen = rr.assign_one(at(0), |_, _| true);
        assert_eq!(chosen, Some(b));
    }

    #[test]
    fn cursor_advances_past_chosen_host() {
        let a = ID::default();
        let b = ID::default();
        let hosts = vec![host(a.clone(), 0, 0, None), host(b.clone(), 0, 0, None)];
        let mut rr = RoundRobinAssignment::new(&hosts);
        let first = rr.assign_one(at(0), |_, _| true).unwrap();
        let second = rr.assign_one(at(1), |_, _| true).unwrap();
        assert_ne!(first, second);
    }

    #[test]
    fn skips_instant_when_nobody_available() {
        let a = ID::default();
        let hosts = vec![host(a.clone(), 0, 0, None)];
        let mut rr = RoundRobinAssignment::new(&hosts);
        let assigned = rr.assign_one(at(0), |_, _| false);
        assert_eq!(assigned, None);
    }

    #[test]
    fn unavailable_host_is_skipped_for_next_in_rotation() {
        let a = ID::default();
        let b = ID::default();
        let hosts = vec![host(a.clone(), 0, 0, None), host(b.clone(), 0, 0, None)];
        let mut rr = RoundRobinAssignment::new(&hosts);
        let a2 = a.clone();
        let chosen = rr.assign_one(at(0), move |id, _| id != &a2);
        assert_eq!(chosen, Some(b));
    }
}
