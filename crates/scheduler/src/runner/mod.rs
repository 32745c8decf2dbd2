//! Scheduler loop: idle/working state machine over one task registry.
//!
//! Split into focused submodules:
//! - `core`: Scheduler struct, constructors, push, config and accessors
//! - `slice`: draining one host slot and the idle/re-arm bookkeeping after it

mod core;
mod slice;

use std::fmt;

use serde::Serialize;

use crate::policy::{ContinuousFrame, Deferred, IdleTime, SinglePerTick};

pub use self::core::Scheduler;
pub use self::slice::SliceReport;

/// Drains during host frames, bounded by the frame budget.
pub type FrameScheduler = Scheduler<ContinuousFrame>;
/// Drains during host idle windows.
pub type IdleScheduler = Scheduler<IdleTime>;
/// Drains from zero-delay deferred callbacks, bounded by a tunable budget.
pub type DeferredScheduler = Scheduler<Deferred>;
/// Runs one task per host frame.
pub type SingleFrameScheduler = Scheduler<SinglePerTick>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LoopState {
    /// No pending work and no outstanding slot request.
    Idle,
    /// A slot has been requested (or a slice is running).
    Working,
}

impl fmt::Display for LoopState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoopState::Idle => f.write_str("idle"),
            LoopState::Working => f.write_str("working"),
        }
    }
}
