//! Execution time statistics for finished jobs.

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use web_time::Instant;

use crate::rendering::compile::output::TaskOutputKind;

use super::job_result::ChunkJobResult;

/// Length of one observation interval.
pub const OBSERVATION_COUNT_TIME: Duration = Duration::from_secs(1);

/// Oldest observations are dropped beyond this many per kind.
pub const MAX_OBSERVATIONS: usize = 10_000;

/// Summary of recorded execution times in nanoseconds.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct MetricStats {
    pub average: f64,
    pub max: u64,
    pub min: u64,
}

#[derive(Default)]
struct MetricsData {
    observations: VecDeque<u64>,
    current_interval_count: usize,
    last_interval_count: usize,
}

impl MetricsData {
    fn record(&mut self, nanos: u64) {
        if self.observations.len() == MAX_OBSERVATIONS {
            self.observations.pop_front();
        }
        self.observations.push_back(nanos);
        self.current_interval_count += 1;
    }

    fn flip(&mut self) {
        self.last_interval_count = self.current_interval_count;
        self.current_interval_count = 0;
    }

    fn stats(&self) -> MetricStats {
        if self.observations.is_empty() {
            return MetricStats::default();
        }
        let sum: u128 = self.observations.iter().map(|&nanos| nanos as u128).sum();
        MetricStats {
            average: sum as f64 / self.observations.len() as f64,
            max: self.observations.iter().copied().max().unwrap_or(0),
            min: self.observations.iter().copied().min().unwrap_or(0),
        }
    }
}

/// Tracks job execution times per output kind.
pub struct ChunkJobMetricsTracker {
    data: HashMap<TaskOutputKind, MetricsData>,
    interval_start: Instant,
}

impl ChunkJobMetricsTracker {
    pub fn new() -> Self {
        Self {
            data: HashMap::new(),
            interval_start: Instant::now(),
        }
    }

    pub fn record(&mut self, kind: TaskOutputKind, nanos: u64) {
        self.data.entry(kind).or_default().record(nanos);
    }

    /// Records the execution time of a successful job. Failures are ignored.
    pub fn collect_metrics(&mut self, result: &ChunkJobResult) {
        if let ChunkJobResult::Success {
            output,
            execution_time_nanos,
        } = result
        {
            self.record(output.kind(), *execution_time_nanos);
        }
    }

    pub fn tick(&mut self) {
        self.tick_at(Instant::now());
    }

    /// Closes the current observation interval once it is older than
    /// [`OBSERVATION_COUNT_TIME`].
    pub fn tick_at(&mut self, now: Instant) {
        if now.saturating_duration_since(self.interval_start) < OBSERVATION_COUNT_TIME {
            return;
        }
        for data in self.data.values_mut() {
            data.flip();
        }
        self.interval_start = now;
    }

    pub fn stats(&self, kind: TaskOutputKind) -> MetricStats {
        self.data.get(&kind).map(MetricsData::stats).unwrap_or_default()
    }

    /// Jobs of `kind` finished during the last complete interval.
    pub fn observations_in_last_time_interval(&self, kind: TaskOutputKind) -> usize {
        self.data.get(&kind).map_or(0, |data| data.last_interval_count)
    }
}

impl Default for ChunkJobMetricsTracker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use cgmath::Point3;

    use super::*;
    use crate::error::RenderError;
    use crate::rendering::compile::output::{ChunkBuildOutput, ChunkTaskOutput};
    use crate::task_management::job_result::ChunkJobFailure;

    #[test]
    fn empty_trackers_report_zero() {
        let tracker = ChunkJobMetricsTracker::new();
        assert_eq!(tracker.stats(TaskOutputKind::Build), MetricStats::default());
        assert_eq!(tracker.observations_in_last_time_interval(TaskOutputKind::Sort), 0);
    }

    #[test]
    fn stats_cover_recorded_successes_only() {
        let mut tracker = ChunkJobMetricsTracker::new();
        for nanos in [100, 300] {
            tracker.collect_metrics(&ChunkJobResult::Success {
                output: ChunkTaskOutput::Build(ChunkBuildOutput::empty(Point3::new(0, 0, 0), 0)),
                execution_time_nanos: nanos,
            });
        }
        tracker.collect_metrics(&ChunkJobResult::Failure {
            section: Point3::new(0, 0, 0),
            failure: ChunkJobFailure::Error(RenderError::Unsupported("test")),
        });

        let stats = tracker.stats(TaskOutputKind::Build);
        assert_eq!(stats.average, 200.0);
        assert_eq!(stats.max, 300);
        assert_eq!(stats.min, 100);
        assert_eq!(tracker.stats(TaskOutputKind::Sort), MetricStats::default());
    }

    #[test]
    fn interval_counts_flip_after_a_second() {
        let mut tracker = ChunkJobMetricsTracker::new();
        let start = Instant::now();
        tracker.record(TaskOutputKind::Sort, 5);
        tracker.record(TaskOutputKind::Sort, 7);

        tracker.tick_at(start);
        assert_eq!(tracker.observations_in_last_time_interval(TaskOutputKind::Sort), 0);

        tracker.tick_at(start + OBSERVATION_COUNT_TIME + Duration::from_millis(1));
        assert_eq!(tracker.observations_in_last_time_interval(TaskOutputKind::Sort), 2);
    }

    #[test]
    fn observations_are_capped() {
        let mut tracker = ChunkJobMetricsTracker::new();
        tracker.record(TaskOutputKind::Build, 1_000_000);
        for _ in 0..MAX_OBSERVATIONS {
            tracker.record(TaskOutputKind::Build, 1);
        }
        assert_eq!(tracker.stats(TaskOutputKind::Build).max, 1);
    }
}
