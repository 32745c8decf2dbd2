//! Slice policies: how long one slot may keep draining the registry.
//!
//! Every policy answers two questions for the loop. How many tasks may a
//! single slot run at most, and is there budget left at `now` given the
//! signal the host delivered with the slot. Overdue tasks bypass the budget
//! check but never the per-slot cap.

use std::fmt;
use std::time::Duration;

use serde::Serialize;

use tickwork_core::{ConfigError, SchedulerConfig, Timestamp};

/// Default per-slice budget for frame-bounded policies.
pub const DEFAULT_FRAME_DURATION: Duration = Duration::from_millis(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyKind {
    ContinuousFrame,
    IdleTime,
    Deferred,
    SinglePerTick,
}

impl fmt::Display for PolicyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PolicyKind::ContinuousFrame => "continuous_frame",
            PolicyKind::IdleTime => "idle_time",
            PolicyKind::Deferred => "deferred",
            PolicyKind::SinglePerTick => "single_per_tick",
        };
        f.write_str(name)
    }
}

pub trait SlicePolicy {
    /// What the host hands to `run_slice` when a slot fires.
    type Signal;

    const KIND: PolicyKind;

    /// Whether the slice may start another non-overdue task at `now`.
    fn has_budget(&self, signal: &Self::Signal, now: Timestamp) -> bool;

    /// Hard cap on tasks per slot, overdue or not.
    fn max_tasks_per_slice(&self) -> Option<usize> {
        None
    }

    /// Apply the policy-relevant part of a config. Ignored by default.
    fn configure(&mut self, _config: &SchedulerConfig) -> Result<(), ConfigError> {
        Ok(())
    }

    fn frame_duration(&self) -> Option<Duration> {
        None
    }
}

fn frame_duration_from(config: &SchedulerConfig) -> Result<Option<Duration>, ConfigError> {
    match config.frame_duration_ms {
        Some(0) => Err(ConfigError::InvalidFrameDuration(0)),
        Some(ms) => Ok(Some(Duration::from_millis(ms))),
        None => Ok(None),
    }
}

// ── Frame-bounded ────────────────────────────────────────────────

/// Drains from the start of a host frame until the frame budget is spent.
///
/// Signal: the frame start timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContinuousFrame {
    frame_duration: Duration,
}

impl ContinuousFrame {
    pub fn new(frame_duration: Duration) -> Self {
        Self { frame_duration }
    }
}

impl Default for ContinuousFrame {
    fn default() -> Self {
        Self::new(DEFAULT_FRAME_DURATION)
    }
}

impl SlicePolicy for ContinuousFrame {
    type Signal = Timestamp;
    const KIND: PolicyKind = PolicyKind::ContinuousFrame;

    fn has_budget(&self, frame_start: &Timestamp, now: Timestamp) -> bool {
        now.duration_since(*frame_start) <= self.frame_duration
    }

    fn configure(&mut self, config: &SchedulerConfig) -> Result<(), ConfigError> {
        if let Some(duration) = frame_duration_from(config)? {
            self.frame_duration = duration;
        }
        Ok(())
    }

    fn frame_duration(&self) -> Option<Duration> {
        Some(self.frame_duration)
    }
}

/// Drains from the moment the slot was armed until the budget is spent.
///
/// Signal: the `armed_at` timestamp passed to
/// [`SlotRequester::request_slot`](crate::slots::SlotRequester::request_slot).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Deferred {
    frame_duration: Duration,
}

impl Deferred {
    pub fn new(frame_duration: Duration) -> Self {
        Self { frame_duration }
    }

    /// Set the budget to half the measured host tick, floored to whole
    /// milliseconds. Returns false (and changes nothing) when that is zero.
    pub fn tune_from_tick_duration(&mut self, avg_tick: Duration) -> bool {
        let half_ms = (avg_tick.as_millis() / 2) as u64;
        if half_ms == 0 {
            return false;
        }
        self.frame_duration = Duration::from_millis(half_ms);
        true
    }
}

impl Default for Deferred {
    fn default() -> Self {
        Self::new(DEFAULT_FRAME_DURATION)
    }
}

impl SlicePolicy for Deferred {
    type Signal = Timestamp;
    const KIND: PolicyKind = PolicyKind::Deferred;

    fn has_budget(&self, armed_at: &Timestamp, now: Timestamp) -> bool {
        now.duration_since(*armed_at) <= self.frame_duration
    }

    fn configure(&mut self, config: &SchedulerConfig) -> Result<(), ConfigError> {
        if let Some(duration) = frame_duration_from(config)? {
            self.frame_duration = duration;
        }
        Ok(())
    }

    fn frame_duration(&self) -> Option<Duration> {
        Some(self.frame_duration)
    }
}

// ── Idle window ──────────────────────────────────────────────────

/// Host-reported end of the current idle window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdleDeadline {
    ends_at: Timestamp,
}

impl IdleDeadline {
    pub fn new(ends_at: Timestamp) -> Self {
        Self { ends_at }
    }

    /// Window of `length` starting at `now`.
    pub fn starting_at(now: Timestamp, length: Duration) -> Self {
        Self::new(now.saturating_add(length))
    }

    pub fn ends_at(&self) -> Timestamp {
        self.ends_at
    }

    pub fn time_remaining(&self, now: Timestamp) -> Duration {
        self.ends_at.duration_since(now)
    }
}

/// Drains while the host's idle window has time left.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IdleTime;

impl SlicePolicy for IdleTime {
    type Signal = IdleDeadline;
    const KIND: PolicyKind = PolicyKind::IdleTime;

    fn has_budget(&self, deadline: &IdleDeadline, now: Timestamp) -> bool {
        !deadline.time_remaining(now).is_zero()
    }
}

// ── One per tick ─────────────────────────────────────────────────

/// Exactly one task per slot, whatever its deadline.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SinglePerTick;

impl SlicePolicy for SinglePerTick {
    type Signal = ();
    const KIND: PolicyKind = PolicyKind::SinglePerTick;

    fn has_budget(&self, _: &(), _: Timestamp) -> bool {
        true
    }

    fn max_tasks_per_slice(&self) -> Option<usize> {
        Some(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(v: u64) -> Timestamp {
        Timestamp::from_millis(v)
    }

    #[test]
    fn frame_budget_is_inclusive() {
        let p = ContinuousFrame::default();
        assert!(p.has_budget(&ms(100), ms(100)));
        assert!(p.has_budget(&ms(100), ms(105)));
        assert!(!p.has_budget(&ms(100), ms(106)));
    }

    #[test]
    fn frame_configure_keeps_duration_when_absent() {
        let mut p = ContinuousFrame::new(Duration::from_millis(9));
        p.configure(&SchedulerConfig::default()).unwrap();
        assert_eq!(p.frame_duration(), Some(Duration::from_millis(9)));

        let config = SchedulerConfig {
            frame_duration_ms: Some(12),
            ..Default::default()
        };
        p.configure(&config).unwrap();
        assert_eq!(p.frame_duration(), Some(Duration::from_millis(12)));
    }

    #[test]
    fn frame_configure_rejects_zero() {
        let mut p = Deferred::default();
        let config = SchedulerConfig {
            frame_duration_ms: Some(0),
            ..Default::default()
        };
        assert!(matches!(p.configure(&config), Err(ConfigError::InvalidFrameDuration(0))));
        assert_eq!(p.frame_duration(), Some(DEFAULT_FRAME_DURATION));
    }

    #[test]
    fn deferred_tuning_halves_the_tick() {
        let mut p = Deferred::default();
        assert!(p.tune_from_tick_duration(Duration::from_micros(16_700)));
        assert_eq!(p.frame_duration(), Some(Duration::from_millis(8)));

        assert!(!p.tune_from_tick_duration(Duration::from_micros(1_900)));
        assert_eq!(p.frame_duration(), Some(Duration::from_millis(8)));
    }

    #[test]
    fn idle_budget_tracks_remaining_time() {
        let deadline = IdleDeadline::starting_at(ms(50), Duration::from_millis(10));
        assert_eq!(deadline.time_remaining(ms(55)), Duration::from_millis(5));
        assert!(IdleTime.has_budget(&deadline, ms(59)));
        assert!(!IdleTime.has_budget(&deadline, ms(60)));
        assert!(!IdleTime.has_budget(&deadline, ms(80)));
        assert_eq!(IdleTime.frame_duration(), None);
    }

    #[test]
    fn single_per_tick_caps_at_one() {
        assert_eq!(SinglePerTick.max_tasks_per_slice(), Some(1));
        assert_eq!(ContinuousFrame::default().max_tasks_per_slice(), None);
        assert_eq!(SinglePerTick::KIND.to_string(), "single_per_tick");
    }
}
