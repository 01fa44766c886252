use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};

use cgmath::Point3;

use crate::core::position::{pack_section, unpack_section};

/// Number of sections reported by [`RenderSectionMetricsTracker::slowest_sections`].
pub const SLOWEST_SECTION_COUNT: usize = 5;

/// Tracks the most recent build duration of every section.
#[derive(Default)]
pub struct RenderSectionMetricsTracker {
    durations: HashMap<u64, u64>,
}

impl RenderSectionMetricsTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records how long the latest build of a section took.
    pub fn update_section_build_duration(&mut self, section: Point3<i32>, nanos: u64) {
        self.durations
            .insert(pack_section(section.x, section.y, section.z), nanos);
    }

    /// Forgets a removed section.
    pub fn remove_section(&mut self, section: Point3<i32>) {
        self.durations
            .remove(&pack_section(section.x, section.y, section.z));
    }

    /// The slowest sections, slowest first.
    pub fn slowest_sections(&self) -> Vec<(Point3<i32>, u64)> {
        let mut heap = BinaryHeap::with_capacity(SLOWEST_SECTION_COUNT + 1);
        for (&key, &nanos) in &self.durations {
            heap.push(Reverse((nanos, key)));
            if heap.len() > SLOWEST_SECTION_COUNT {
                heap.pop();
            }
        }

        let mut slowest: Vec<_> = heap
            .into_iter()
            .map(|Reverse((nanos, key))| (unpack_section(key), nanos))
            .collect();
        slowest.sort_by(|a, b| b.1.cmp(&a.1));
        slowest
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_the_five_slowest() {
        let mut tracker = RenderSectionMetricsTracker::new();
        for i in 0..10 {
            tracker.update_section_build_duration(Point3::new(i, 0, 0), (i as u64 + 1) * 100);
        }
        tracker.remove_section(Point3::new(9, 0, 0));

        let slowest = tracker.slowest_sections();
        assert_eq!(slowest.len(), SLOWEST_SECTION_COUNT);
        assert_eq!(slowest[0], (Point3::new(8, 0, 0), 900));
        assert_eq!(slowest[4], (Point3::new(4, 0, 0), 500));
    }
}
