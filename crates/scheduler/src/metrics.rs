use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Loop operational metrics, one set per scheduler instance.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LoopMetrics {
    /// Slices run since construction.
    pub slices_run: u64,
    /// Tasks popped and run, failed ones included.
    pub tasks_run: u64,
    /// Tasks that were already overdue when popped.
    pub overdue_tasks_run: u64,
    pub tasks_failed: u64,
    /// Tasks run by the most recent slice.
    pub last_slice_tasks: usize,
    pub avg_tasks_per_slice: f64,
    pub avg_slice_duration: Duration,
    /// Wall-clock time the most recent slice finished.
    pub last_slice_at: Option<DateTime<Utc>>,
}

impl LoopMetrics {
    /// Record one finished slice.
    pub fn record_slice(&mut self, tasks: usize, overdue: usize, failed: bool, duration: Duration) {
        self.slices_run += 1;
        self.tasks_run += tasks as u64;
        self.overdue_tasks_run += overdue as u64;
        if failed {
            self.tasks_failed += 1;
        }
        self.last_slice_tasks = tasks;
        self.last_slice_at = Some(Utc::now());

        // Incremental mean: new_avg = prev_avg + (value - prev_avg) / count
        let count = self.slices_run as f64;
        self.avg_tasks_per_slice += (tasks as f64 - self.avg_tasks_per_slice) / count;

        self.avg_slice_duration = if self.slices_run == 1 {
            duration
        } else {
            let prev_nanos = self.avg_slice_duration.as_nanos() as f64;
            let cur_nanos = duration.as_nanos() as f64;
            let avg_nanos = prev_nanos + (cur_nanos - prev_nanos) / count;
            Duration::from_nanos(avg_nanos as u64)
        };
    }
}
