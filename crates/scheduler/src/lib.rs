//! Cooperative, priority-aware scheduling loops over a [`tickwork_core::TaskRegistry`].
//!
//! A [`Scheduler`] never blocks: it asks a [`SlotRequester`] for host
//! execution slots (frame ticks, idle windows, deferred callbacks) and
//! drains as much work per slot as its [`SlicePolicy`] allows.

pub mod error;
pub mod metrics;
pub mod policy;
pub mod runner;
pub mod slots;
pub mod tuning;

pub use error::SchedulerError;
pub use metrics::LoopMetrics;
pub use policy::{
    ContinuousFrame, Deferred, IdleDeadline, IdleTime, PolicyKind, SinglePerTick, SlicePolicy, DEFAULT_FRAME_DURATION,
};
pub use runner::{
    DeferredScheduler, FrameScheduler, IdleScheduler, LoopState, Scheduler, SingleFrameScheduler, SliceReport,
};
pub use slots::{ManualSlots, SlotRequester};
pub use tuning::TickSampler;
