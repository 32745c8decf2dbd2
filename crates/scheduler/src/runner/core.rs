use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;
use std::time::Duration;

use tracing::debug;

use tickwork_core::{
    Clock, PriorityTimeouts, PushOptions, PutOutcome, SchedulerConfig, TaskKey, TaskRegistry, TaskResult,
    Timestamp,
};

use crate::error::SchedulerError;
use crate::metrics::LoopMetrics;
use crate::policy::{Deferred, PolicyKind, SlicePolicy};
use crate::slots::SlotRequester;

use super::LoopState;

/// A cooperative task scheduler driven by host slots.
///
/// All methods take `&self`: a task holding an `Rc<Scheduler<_>>` may push
/// more work (or reconfigure) while it runs inside a slice.
pub struct Scheduler<P: SlicePolicy> {
    pub(super) registry: RefCell<TaskRegistry>,
    pub(super) state: Cell<LoopState>,
    pub(super) policy: RefCell<P>,
    pub(super) metrics: RefCell<LoopMetrics>,
    pub(super) clock: Rc<dyn Clock>,
    pub(super) slots: Rc<dyn SlotRequester>,
}

impl<P: SlicePolicy> Scheduler<P> {
    /// Scheduler with an entropy-seeded registry.
    pub fn new(policy: P, clock: Rc<dyn Clock>, slots: Rc<dyn SlotRequester>) -> Self {
        let registry = TaskRegistry::new(Rc::clone(&clock));
        Self::with_registry(policy, registry, clock, slots)
    }

    /// Scheduler whose registry draws reproducible levels.
    pub fn with_seed(policy: P, clock: Rc<dyn Clock>, slots: Rc<dyn SlotRequester>, seed: u64) -> Self {
        let registry = TaskRegistry::with_seed(Rc::clone(&clock), seed);
        Self::with_registry(policy, registry, clock, slots)
    }

    fn with_registry(policy: P, registry: TaskRegistry, clock: Rc<dyn Clock>, slots: Rc<dyn SlotRequester>) -> Self {
        Self {
            registry: RefCell::new(registry),
            state: Cell::new(LoopState::Idle),
            policy: RefCell::new(policy),
            metrics: RefCell::new(LoopMetrics::default()),
            clock,
            slots,
        }
    }

    /// Queue a task, merging with any pending task under the same key.
    ///
    /// The first push after the loop went idle arms a slot; later pushes
    /// ride on the outstanding request.
    pub fn push_task(
        &self,
        action: impl FnOnce() -> TaskResult + 'static,
        options: PushOptions,
    ) -> Result<PutOutcome, SchedulerError> {
        let outcome = self.registry.borrow_mut().put(Box::new(action), options)?;
        if self.state.get() == LoopState::Idle {
            self.state.set(LoopState::Working);
            self.arm();
        }
        Ok(outcome)
    }

    /// Apply priority timeouts and, for frame-bounded policies, the frame
    /// duration. Nothing is applied when the config is invalid.
    pub fn set_config(&self, config: &SchedulerConfig) -> Result<(), SchedulerError> {
        config.validate()?;
        self.policy.borrow_mut().configure(config)?;
        self.registry
            .borrow_mut()
            .set_priority_timeout(&config.priority_timeout_params);
        debug!(
            policy = %P::KIND,
            frame_duration = ?self.policy.borrow().frame_duration(),
            "scheduler config applied"
        );
        Ok(())
    }

    pub(super) fn arm(&self) {
        let armed_at = self.clock.now();
        debug!(policy = %P::KIND, %armed_at, pending = self.pending(), "requesting slot");
        self.slots.request_slot(armed_at);
    }

    // ── Accessors ─────────────────────────────────────────────────

    /// Current loop state.
    pub fn state(&self) -> LoopState {
        self.state.get()
    }

    /// Whether a slot is outstanding.
    pub fn is_working(&self) -> bool {
        self.state.get() == LoopState::Working
    }

    /// Number of pending tasks.
    pub fn pending(&self) -> usize {
        self.registry.borrow().len()
    }

    /// Whether a task is pending under `key`.
    pub fn has_task(&self, key: &TaskKey) -> bool {
        self.registry.borrow().has(key)
    }

    /// Deadline of the most urgent pending task.
    pub fn peek_deadline(&self) -> Result<Timestamp, SchedulerError> {
        Ok(self.registry.borrow().peek_deadline()?)
    }

    /// Active per-priority timeouts.
    pub fn timeouts(&self) -> PriorityTimeouts {
        *self.registry.borrow().timeouts()
    }

    /// Per-slice budget, or `None` for policies without one.
    pub fn frame_duration(&self) -> Option<Duration> {
        self.policy.borrow().frame_duration()
    }

    /// Snapshot of the loop metrics.
    pub fn metrics(&self) -> LoopMetrics {
        self.metrics.borrow().clone()
    }

    /// Which slice policy drives this loop.
    pub fn policy_kind(&self) -> PolicyKind {
        P::KIND
    }

    /// Reading of the scheduler's clock.
    pub fn now(&self) -> Timestamp {
        self.clock.now()
    }
}

impl Scheduler<Deferred> {
    /// Size the deferred budget from a measured host tick.
    ///
    /// See [`Deferred::tune_from_tick_duration`].
    pub fn tune_from_tick_duration(&self, avg_tick: Duration) -> bool {
        let tuned = self.policy.borrow_mut().tune_from_tick_duration(avg_tick);
        if tuned {
            debug!(?avg_tick, frame_duration = ?self.frame_duration(), "deferred budget tuned");
        }
        tuned
    }
}

impl<P: SlicePolicy> fmt::Debug for Scheduler<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scheduler")
            .field("policy", &P::KIND)
            .field("state", &self.state.get())
            .field("pending", &self.pending())
            .finish()
    }
}
