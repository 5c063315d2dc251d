use chrono::{DateTime, Utc};

/// Half-open interval overlap predicate used by both the availability
/// engine's busy subtraction and the booking engine's transactional
/// conflict re-check: `[s, e)` overlaps `[s', e')` iff `s < e' && e > s'`.
/// Equality at a boundary does not count as overlap.
pub fn intervals_overlap(
    s: DateTime<Utc>,
    e: DateTime<Utc>,
    s_prime: DateTime<Utc>,
    e_prime: DateTime<Utc>,
) -> bool {
    s < e_prime && e > s_prime
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(millis: i64) -> DateTime<Utc> {
        #[allow(clippy::unwrap_used)]
        DateTime::from_timestamp_millis(millis).unwrap()
    }

    #[test]
    fn touching_boundaries_do_not_overlap() {
        assert!(!intervals_overlap(at(0), at(10), at(10), at(20)));
    }

    #[test]
    fn overlapping_ranges_detected() {
        assert!(intervals_overlap(at(0), at(10), at(5), at(20)));
    }

    #[test]
    fn disjoint_ranges_do_not_overlap() {
        assert!(!intervals_overlap(at(0), at(5), at(10), at(20)));
    }
}

#[cfg(test)]
mod proptests {
    use proptest::prelude::*;

    use super::*;

    fn at(millis: i64) -> DateTime<Utc> {
        #[allow(clippy::unwrap_used)]
        DateTime::from_timestamp_millis(millis).unwrap()
    }

    proptest! {
        /// Overlap is symmetric regardless of argument order.
        #[test]
        fn overlap_is_symmetric(a in 0i64..1_000_000, b in 1i64..1_000, c in 0i64..1_000_000, d in 1i64..1_000) {
            let (s, e) = (at(a), at(a + b));
            let (s_prime, e_prime) = (at(c), at(c + d));
            prop_assert_eq!(
                intervals_overlap(s, e, s_prime, e_prime),
                intervals_overlap(s_prime, e_prime, s, e)
            );
        }

        /// Two intervals placed back-to-back, `[s, e)` then `[e, e+d)`,
        /// never overlap regardless of how long either one is.
        #[test]
        fn adjacent_half_open_intervals_never_overlap(start in 0i64..1_000_000, first_len in 1i64..10_000, second_len in 1i64..10_000) {
            let boundary = start + first_len;
            prop_assert!(!intervals_overlap(at(start), at(boundary), at(boundary), at(boundary + second_len)));
        }
    }
}
