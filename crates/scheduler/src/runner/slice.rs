use std::time::Duration;

use serde::Serialize;
use tracing::{debug, trace, warn};

use crate::error::SchedulerError;
use crate::policy::SlicePolicy;

use super::{LoopState, Scheduler};

/// What one slice did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SliceReport {
    pub tasks_run: usize,
    /// Tasks run past their deadline, budget or not.
    pub overdue_run: usize,
    /// Tasks still pending when the slice ended.
    pub remaining: usize,
    /// Whether another slot was requested.
    pub rearmed: bool,
    pub elapsed: Duration,
}

impl<P: SlicePolicy> Scheduler<P> {
    /// Drain the registry for one host slot.
    ///
    /// The registry is re-read before every task, so work pushed by a
    /// running task is seen by the same slice. Overdue tasks run even when
    /// the policy's budget is spent. Afterwards the loop goes idle if
    /// nothing is left, otherwise it requests the next slot.
    ///
    /// A failing task ends the slice early. The bookkeeping above still
    /// happens before the error is returned, so the loop never stalls.
    pub fn run_slice(&self, signal: P::Signal) -> Result<SliceReport, SchedulerError> {
        if self.state.get() == LoopState::Idle {
            warn!(policy = %P::KIND, "slice signal delivered while idle");
        }

        let started = self.clock.now();
        let cap = self.policy.borrow().max_tasks_per_slice();
        let mut tasks_run = 0usize;
        let mut overdue_run = 0usize;
        let mut failure = None;

        loop {
            if cap.is_some_and(|cap| tasks_run >= cap) {
                break;
            }
            let deadline = {
                let registry = self.registry.borrow();
                if registry.is_empty() {
                    break;
                }
                registry.peek_deadline()?
            };

            let now = self.clock.now();
            let overdue = deadline <= now;
            if !overdue && !self.policy.borrow().has_budget(&signal, now) {
                break;
            }

            let Some(task) = self.registry.borrow_mut().pop_min()? else {
                break;
            };
            let key = task.key().clone();
            trace!(%key, priority = %task.priority(), deadline = %task.deadline(), overdue, "running task");

            tasks_run += 1;
            if overdue {
                overdue_run += 1;
            }
            if let Err(source) = task.run() {
                warn!(%key, error = %source, "task failed");
                failure = Some(SchedulerError::Task { key, source });
                break;
            }
        }

        let remaining = self.pending();
        let rearmed = remaining > 0;
        if rearmed {
            self.state.set(LoopState::Working);
            self.arm();
        } else {
            if self.state.get() == LoopState::Working {
                debug!(policy = %P::KIND, "registry drained, going idle");
            }
            self.state.set(LoopState::Idle);
        }

        let elapsed = self.clock.now().duration_since(started);
        self.metrics
            .borrow_mut()
            .record_slice(tasks_run, overdue_run, failure.is_some(), elapsed);

        match failure {
            Some(err) => Err(err),
            None => Ok(SliceReport {
                tasks_run,
                overdue_run,
                remaining,
                rearmed,
                elapsed,
            }),
        }
    }
}
