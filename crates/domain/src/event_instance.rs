use std::collections::VecDeque;

use chrono::{DateTime, Utc};

/// A concrete busy-or-free occurrence on a host's timeline: a booking, a
/// `BusyBlock`, or a free range produced by subtracting the two from a
/// schedule window.
#[derive(Clone, Debug, PartialEq)]
pub struct EventInstance {
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub busy: bool,
}

/// A list of `EventInstance`s guaranteed sorted by `start_time` and
/// guaranteed non-overlapping (overlapping instances are merged on
/// construction). Two instances are compatible if they do not overlap.
#[derive(PartialEq, Debug, Default)]
pub struct CompatibleInstances {
    events: VecDeque<EventInstance>,
}

impl CompatibleInstances {
    pub fn new(mut events: Vec<EventInstance>) -> Self {
        events.sort_by(|i1, i2| i1.start_time.cmp(&i2.start_time));

        let mut compatible_events: VecDeque<EventInstance> = Default::default();

        for (i, instance) in events.into_iter().enumerate() {
            if i == 0 {
                compatible_events.push_back(instance);
                continue;
            }
            #[allow(clippy::unwrap_used)]
            if let Some(merged) = EventInstance::merge(&instance, compatible_events.back().unwrap())
            {
                let len = compatible_events.len();
                compatible_events[len - 1] = merged;
            } else {
                compatible_events.push_back(instance);
            }
        }

        Self {
            events: compatible_events,
        }
    }

    pub fn remove_instances(&mut self, instances: &CompatibleInstances, skip: usize) {
        self.events = self
            .events
            .iter()
            .flat_map(|free_instance| free_instance.remove_instances(instances, skip).inner())
            .collect()
    }

    pub fn push_front(&mut self, instance: EventInstance) -> bool {
        if let Some(first_instance) = self.events.front() {
            if first_instance.start_time < instance.end_time {
                return false;
            }
        }
        self.events.push_front(instance);
        true
    }

    pub fn push_back(&mut self, instance: EventInstance) -> bool {
        if let Some(last_instance) = self.events.back() {
            if last_instance.end_time > instance.start_time {
                return false;
            }
        }
        self.events.push_back(instance);
        true
    }

    pub fn remove_all_before(&mut self, cutoff: DateTime<Utc>) {
        while let Some(e) = self.events.front_mut() {
            if e.start_time >= cutoff {
                break;
            }
            if e.end_time <= cutoff {
                self.events.pop_front();
            } else {
                e.start_time = cutoff;
                break;
            }
        }
    }

    pub fn remove_all_after(&mut self, cutoff: DateTime<Utc>) {
        while let Some(last) = self.events.back_mut() {
            if last.end_time <= cutoff {
                break;
            }
            if last.start_time >= cutoff {
                self.events.pop_back();
            } else {
                last.end_time = cutoff;
                break;
            }
        }
    }

    pub fn extend(&mut self, instances: CompatibleInstances) {
        for instance in instances.inner() {
            self.push_back(instance);
        }
    }

    pub fn inner(self) -> VecDeque<EventInstance> {
        self.events
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn get(&self, index: usize) -> Option<&EventInstance> {
        self.events.get(index)
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

impl AsRef<VecDeque<EventInstance>> for CompatibleInstances {
    fn as_ref(&self) -> &VecDeque<EventInstance> {
        &self.events
    }
}

#[derive(PartialEq, Debug)]
pub enum SubtractInstanceResult {
    /// Instances do not overlap.
    NoOverlap,
    /// Overlaps, and `free.start > instance.start && free.end > instance.end`.
    OverlapBeginning(CompatibleInstances),
    /// Overlaps, and `free.start < instance.start && free.end < instance.end`.
    OverlapEnd(CompatibleInstances),
    /// Overlaps, and `instance` is strictly contained within `free`.
    Split(CompatibleInstances),
    /// Overlaps, and `instance` fully contains `free`.
    Empty,
}

impl EventInstance {
    pub fn has_overlap(instance1: &Self, instance2: &Self) -> bool {
        instance1.start_time < instance2.end_time && instance1.end_time > instance2.start_time
    }

    pub fn can_merge(instance1: &Self, instance2: &Self) -> bool {
        instance1.busy == instance2.busy
            && instance1.start_time <= instance2.end_time
            && instance1.end_time >= instance2.start_time
    }

    /// Merges two instances into one if they overlap (or touch) and share
    /// the same `busy` flag.
    pub fn merge(instance1: &Self, instance2: &Self) -> Option<Self> {
        if !Self::can_merge(instance1, instance2) {
            return None;
        }

        Some(Self {
            start_time: std::cmp::min(instance1.start_time, instance2.start_time),
            end_time: std::cmp::max(instance1.end_time, instance2.end_time),
            busy: instance1.busy,
        })
    }

    pub fn remove_instance(free_instance: &Self, instance: &Self) -> SubtractInstanceResult {
        if !Self::has_overlap(free_instance, instance) {
            return SubtractInstanceResult::NoOverlap;
        }

        if instance.start_time <= free_instance.start_time
            && instance.end_time >= free_instance.end_time
        {
            return SubtractInstanceResult::Empty;
        }

        if instance.start_time > free_instance.start_time
            && instance.end_time < free_instance.end_time
        {
            let free_instance_1 = Self {
                start_time: free_instance.start_time,
                end_time: instance.start_time,
                busy: false,
            };
            let free_instance_2 = Self {
                start_time: instance.end_time,
                end_time: free_instance.end_time,
                busy: false,
            };
            let events = CompatibleInstances::new(vec![free_instance_1, free_instance_2]);
            return SubtractInstanceResult::Split(events);
        }

        if free_instance.start_time >= instance.start_time {
            let e = CompatibleInstances::new(vec![Self {
                start_time: instance.end_time,
                end_time: free_instance.end_time,
                busy: false,
            }]);
            SubtractInstanceResult::OverlapBeginning(e)
        } else {
            let e = CompatibleInstances::new(vec![Self {
                start_time: free_instance.start_time,
                end_time: instance.start_time,
                busy: false,
            }]);
            SubtractInstanceResult::OverlapEnd(e)
        }
    }

    pub fn remove_instances(
        &self,
        instances: &CompatibleInstances,
        skip: usize,
    ) -> CompatibleInstances {
        let mut free_instances_without_conflict = CompatibleInstances::new(Vec::new());

        let mut conflict = false;
        for (pos, instance) in instances.as_ref().iter().skip(skip).enumerate() {
            if instance.start_time >= self.end_time {
                break;
            }
            let free_instances = match EventInstance::remove_instance(self, instance) {
                SubtractInstanceResult::OverlapEnd(event) => {
                    conflict = true;
                    Some(event)
                }
                SubtractInstanceResult::OverlapBeginning(mut event) => {
                    conflict = true;
                    event.remove_instances(instances, pos + 1);
                    Some(event)
                }
                SubtractInstanceResult::Split(events) => {
                    conflict = true;

                    let mut events = events.inner();
                    #[allow(clippy::unwrap_used)]
                    let last_event = events.pop_back().unwrap();
                    #[allow(clippy::unwrap_used)]
                    let first_event = events.pop_front().unwrap();

                    let mut events = CompatibleInstances::new(vec![last_event]);
                    events.remove_instances(instances, pos + 1);
                    events.push_front(first_event);

                    Some(events)
                }
                SubtractInstanceResult::Empty => {
                    conflict = true;
                    None
                }
                SubtractInstanceResult::NoOverlap => {
                    conflict = false;
                    None
                }
            };
            if let Some(new_free_instances) = free_instances {
                free_instances_without_conflict.extend(new_free_instances);
            }
        }
        if !conflict {
            free_instances_without_conflict.push_back(self.clone());
        }

        free_instances_without_conflict
    }
}

fn separate_free_busy_events(
    instances: Vec<EventInstance>,
) -> (Vec<EventInstance>, Vec<EventInstance>) {
    let mut free_instances = Vec::new();
    let mut busy_instances = Vec::new();

    for instance in instances {
        if instance.busy {
            busy_instances.push(instance);
        } else {
            free_instances.push(instance);
        }
    }

    (free_instances, busy_instances)
}

pub struct FreeBusy {
    pub free: CompatibleInstances,
    pub busy: CompatibleInstances,
}

/// Splits a mixed list of free/busy instances, merges each group, and
/// subtracts busy time from free time. This is the busy-time-loading step
/// of the availability engine applied to a single host's timeline.
pub fn get_free_busy(instances: Vec<EventInstance>) -> FreeBusy {
    let (free_instances, busy_instances) = separate_free_busy_events(instances);

    let mut free_instances = CompatibleInstances::new(free_instances);
    let busy_instances = CompatibleInstances::new(busy_instances);

    free_instances.remove_instances(&busy_instances, 0);

    FreeBusy {
        free: free_instances,
        busy: busy_instances,
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn at(millis: i64) -> DateTime<Utc> {
        #[allow(clippy::unwrap_used)]
        DateTime::from_timestamp_millis(millis).unwrap()
    }

    mod combining_events {
        use super::*;

        #[test]
        fn no_overlap() {
            let e1 = EventInstance {
                start_time: at(0),
                end_time: at(4),
                busy: false,
            };
            let e2 = EventInstance {
                start_time: at(5),
                end_time: at(10),
                busy: false,
            };

            assert!(EventInstance::merge(&e1, &e2).is_none());
        }

        #[test]
        fn overlap_without_extending() {
            let e1 = EventInstance {
                start_time: at(1),
                end_time: at(10),
                busy: false,
            };
            let e2 = EventInstance {
                start_time: at(5),
                end_time: at(7),
                busy: false,
            };

            let res = EventInstance::merge(&e1, &e2);
            assert_eq!(res, Some(e1));
        }

        #[test]
        fn overlap_with_extending() {
            let e1 = EventInstance {
                start_time: at(1),
                end_time: at(10),
                busy: false,
            };
            let e2 = EventInstance {
                start_time: at(5),
                end_time: at(15),
                busy: false,
            };

            let res = EventInstance::merge(&e1, &e2).unwrap();
            assert_eq!(res.start_time, at(1));
            assert_eq!(res.end_time, at(15));
        }

        #[test]
        fn different_busy_flags_do_not_merge() {
            let e1 = EventInstance {
                start_time: at(1),
                end_time: at(10),
                busy: true,
            };
            let e2 = EventInstance {
                start_time: at(5),
                end_time: at(15),
                busy: false,
            };

            assert!(EventInstance::merge(&e1, &e2).is_none());
        }
    }

    mod removing_instances {
        use super::*;

        #[test]
        fn subtracts_busy_from_free() {
            let free = EventInstance {
                start_time: at(0),
                end_time: at(100),
                busy: false,
            };
            let busy = CompatibleInstances::new(vec![EventInstance {
                start_time: at(30),
                end_time: at(50),
                busy: true,
            }]);

            let remaining = free.remove_instances(&busy, 0);
            assert_eq!(remaining.len(), 2);
            assert_eq!(remaining.get(0).unwrap().start_time, at(0));
            assert_eq!(remaining.get(0).unwrap().end_time, at(30));
            assert_eq!(remaining.get(1).unwrap().start_time, at(50));
            assert_eq!(remaining.get(1).unwrap().end_time, at(100));
        }

        #[test]
        fn fully_booked_leaves_nothing() {
            let free = EventInstance {
                start_time: at(10),
                end_time: at(20),
                busy: false,
            };
            let busy = CompatibleInstances::new(vec![EventInstance {
                start_time: at(0),
                end_time: at(100),
                busy: true,
            }]);

            let remaining = free.remove_instances(&busy, 0);
            assert!(remaining.is_empty());
        }
    }

    #[test]
    fn get_free_busy_merges_and_subtracts() {
        let instances = vec![
            EventInstance {
                start_time: at(0),
                end_time: at(100),
                busy: false,
            },
            EventInstance {
                start_time: at(40),
                end_time: at(60),
                busy: true,
            },
        ];

        let result = get_free_busy(instances);
        assert_eq!(result.free.len(), 2);
        assert_eq!(result.busy.len(), 1);
    }
}
