//! Deadline-ordered task registry.
//!
//! Tasks live in an arena of nodes threaded onto up to [`MAX_LEVEL`] sorted
//! linked lists (a skip list). Every node keeps both successor and
//! predecessor links per level, which lets a deadline promotion splice the
//! node out and walk backward to its new slot instead of searching from the
//! head. A hash index maps each [`TaskKey`] to its arena handle.
//!
//! Ordering rule: ascending deadline, and among equal deadlines the task
//! inserted first comes first.

mod node;

use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, error, trace};

use crate::clock::{Clock, Timestamp};
use crate::error::RegistryError;
use crate::key::TaskKey;
use crate::priority::{Priority, PriorityTimeoutOverrides, PriorityTimeouts, IDLE_TIMEOUT_MS};
use crate::task::{Action, Callback, PushOptions, Task};

pub use node::MAX_LEVEL;
use node::{Node, NodeHandle, HEAD, TAIL};

/// What [`TaskRegistry::put`] did with the pushed task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PutOutcome {
    /// A new task was created.
    Inserted,
    /// An existing task was updated in place; its position is unchanged.
    Updated,
    /// An existing task received an earlier deadline and moved forward.
    Promoted,
}

/// Hash index plus multi-level ordering of pending tasks.
pub struct TaskRegistry {
    nodes: Vec<Node>,
    free: Vec<NodeHandle>,
    index: HashMap<TaskKey, NodeHandle>,
    /// Highest level whose head successor is not the tail.
    max_level: usize,
    timeouts: PriorityTimeouts,
    clock: Rc<dyn Clock>,
    rng: StdRng,
}

impl TaskRegistry {
    /// Empty registry with entropy-seeded level draws.
    pub fn new(clock: Rc<dyn Clock>) -> Self {
        Self::with_rng(clock, StdRng::from_entropy())
    }

    /// Registry with reproducible level draws.
    pub fn with_seed(clock: Rc<dyn Clock>, seed: u64) -> Self {
        Self::with_rng(clock, StdRng::seed_from_u64(seed))
    }

    fn with_rng(clock: Rc<dyn Clock>, rng: StdRng) -> Self {
        let mut head = Node::sentinel();
        let mut tail = Node::sentinel();
        for level in 0..MAX_LEVEL {
            head.next[level] = Some(TAIL);
            tail.prev[level] = Some(HEAD);
        }

        Self {
            nodes: vec![head, tail],
            free: Vec::new(),
            index: HashMap::new(),
            max_level: 0,
            timeouts: PriorityTimeouts::default(),
            clock,
            rng,
        }
    }

    // ── Queries ───────────────────────────────────────────────────

    /// Whether a task is pending under `key`.
    pub fn has(&self, key: &TaskKey) -> bool {
        self.index.contains_key(key)
    }

    /// The pending task stored under `key`.
    pub fn get(&self, key: &TaskKey) -> Option<&Task> {
        self.index
            .get(key)
            .and_then(|handle| self.nodes[handle.0].task.as_ref())
    }

    /// Number of pending tasks.
    pub fn len(&self) -> usize {
        self.index.len()
    }

    /// True when the bottom chain holds no task.
    pub fn is_empty(&self) -> bool {
        self.is_level_empty(0)
    }

    /// True when `level` links no task. Levels past [`MAX_LEVEL`] are
    /// always empty.
    pub fn is_level_empty(&self, level: usize) -> bool {
        self.nodes[HEAD.0]
            .next
            .get(level)
            .map_or(true, |next| *next == Some(TAIL))
    }

    /// Number of levels currently holding at least one task.
    pub fn current_max_level(&self) -> usize {
        self.max_level
    }

    /// Active per-priority timeout table.
    pub fn timeouts(&self) -> &PriorityTimeouts {
        &self.timeouts
    }

    /// Deadline of the most urgent task.
    ///
    /// An empty registry reports the IDLE timeout, i.e. "nothing urgent".
    pub fn peek_deadline(&self) -> Result<Timestamp, RegistryError> {
        if self.is_empty() {
            return Ok(Timestamp::from_millis(IDLE_TIMEOUT_MS));
        }
        let first = self.next_of(HEAD, 0)?;
        self.deadline_of(first)
    }

    /// Keys and deadlines in execution order.
    pub fn ordered_keys(&self) -> Result<Vec<(TaskKey, Timestamp)>, RegistryError> {
        let mut out = Vec::with_capacity(self.len());
        let mut cur = self.next_of(HEAD, 0)?;
        while cur != TAIL {
            let task = self.task_of(cur)?;
            out.push((task.key().clone(), task.deadline()));
            cur = self.next_of(cur, 0)?;
        }
        Ok(out)
    }

    // ── Mutations ─────────────────────────────────────────────────

    /// Merge new HIGH/NORMAL/LOW timeouts into the active table.
    ///
    /// Affects tasks pushed from now on; scheduled deadlines stay put.
    pub fn set_priority_timeout(&mut self, overrides: &PriorityTimeoutOverrides) {
        self.timeouts.merge(overrides);
        debug!(timeouts = ?self.timeouts, "priority timeouts updated");
    }

    /// Insert a task, or update the task already stored under the key.
    ///
    /// An update replaces the action and appends the callback. The task only
    /// moves when the newly computed deadline is strictly earlier; its
    /// priority label stays the one it was first pushed with.
    pub fn put(&mut self, action: Action, options: PushOptions) -> Result<PutOutcome, RegistryError> {
        let PushOptions {
            key,
            priority,
            callback,
        } = options;
        let key = key.unwrap_or_else(TaskKey::auto);
        let priority = priority.unwrap_or_default();
        let deadline = self.timeouts.deadline_for(priority, self.clock.now());

        if let Some(&handle) = self.index.get(&key) {
            return self.update(handle, action, callback, priority, deadline);
        }

        let mut task = Task::new(key, action, priority, deadline);
        if let Some(callback) = callback {
            task.add_callback(callback);
        }
        let level = self.random_level();
        self.insert(task, level)?;
        Ok(PutOutcome::Inserted)
    }

    /// Remove and return the most urgent task.
    pub fn pop_min(&mut self) -> Result<Option<Task>, RegistryError> {
        if self.is_empty() {
            return Ok(None);
        }
        let handle = self.next_of(HEAD, 0)?;

        for level in (0..self.max_level).rev() {
            let node = &self.nodes[handle.0];
            match (node.prev[level], node.next[level]) {
                (None, None) => continue,
                (Some(pred), Some(succ)) => {
                    self.splice_out(pred, succ, level);
                    if self.is_level_empty(level) {
                        self.max_level -= 1;
                    }
                }
                (Some(_), None) => {
                    return Err(self.corruption(level, "first node has a predecessor but no successor"))
                }
                (None, Some(_)) => {
                    return Err(self.corruption(level, "first node has a successor but no predecessor"))
                }
            }
        }

        let node = self.release(handle);
        let task = node.task.ok_or(RegistryError::MissingTask(handle.0))?;
        self.index.remove(task.key());
        trace!(key = %task.key(), deadline = %task.deadline(), "popped task");
        Ok(Some(task))
    }

    /// Audit every structural invariant.
    ///
    /// Checks per-level link symmetry and ordering, that every upper-level
    /// member is also linked below, that the level-0 chain matches the key
    /// index, and that `current_max_level` equals the tallest populated level.
    pub fn verify(&self) -> Result<(), RegistryError> {
        let mut tallest = 0;
        for level in 0..MAX_LEVEL {
            let mut prev = HEAD;
            let mut cur = self.next_of(HEAD, level)?;
            let mut last_deadline: Option<Timestamp> = None;
            let mut members = 0usize;

            while cur != TAIL {
                if self.prev_of(cur, level)? != prev {
                    return Err(self.corruption(level, format!("node {} has a stale predecessor", cur.0)));
                }
                let task = self.task_of(cur)?;
                if last_deadline.is_some_and(|last| task.deadline() < last) {
                    return Err(self.corruption(level, format!("node {} is out of order", cur.0)));
                }
                if level > 0 && self.nodes[cur.0].next[level - 1].is_none() {
                    return Err(self.corruption(level, format!("node {} is missing from level {}", cur.0, level - 1)));
                }
                if level == 0 && self.index.get(task.key()) != Some(&cur) {
                    return Err(RegistryError::IndexMismatch(format!("{} is not indexed", task.key())));
                }

                last_deadline = Some(task.deadline());
                members += 1;
                if members > self.nodes.len() {
                    return Err(self.corruption(level, "cycle in successor chain"));
                }
                prev = cur;
                cur = self.next_of(cur, level)?;
            }

            if self.prev_of(TAIL, level)? != prev {
                return Err(self.corruption(level, "tail predecessor does not match chain end"));
            }
            if level == 0 && members != self.index.len() {
                return Err(RegistryError::IndexMismatch(format!(
                    "{} tasks on level 0, {} keys indexed",
                    members,
                    self.index.len()
                )));
            }
            if members > 0 {
                tallest = level + 1;
            }
        }

        if tallest != self.max_level {
            return Err(self.corruption(
                tallest,
                format!("current max level is {} but tallest populated level is {}", self.max_level, tallest),
            ));
        }
        Ok(())
    }

    // ── Internals ─────────────────────────────────────────────────

    /// Geometric level draw: each extra level with probability 1/2.
    fn random_level(&mut self) -> usize {
        let mut level = 1;
        while level < MAX_LEVEL && self.rng.gen_bool(0.5) {
            level += 1;
        }
        level
    }

    /// Link a new task on levels `0..height`, after any equal deadlines.
    pub(crate) fn insert(&mut self, task: Task, height: usize) -> Result<(), RegistryError> {
        let deadline = task.deadline();
        let key = task.key().clone();
        let handle = self.alloc(Node::with_task(task));

        let mut pred = HEAD;
        for level in (0..height).rev() {
            let mut succ = self.next_of(pred, level)?;
            while succ != TAIL && self.deadline_of(succ)? <= deadline {
                pred = succ;
                succ = self.next_of(succ, level)?;
            }
            self.link(pred, handle, succ, level);
        }

        trace!(key = %key, deadline = %deadline, height, "inserted task");
        self.index.insert(key, handle);
        self.max_level = self.max_level.max(height);
        Ok(())
    }

    fn update(
        &mut self,
        handle: NodeHandle,
        action: Action,
        callback: Option<Callback>,
        priority: Priority,
        deadline: Timestamp,
    ) -> Result<PutOutcome, RegistryError> {
        let task = self.nodes[handle.0]
            .task
            .as_mut()
            .ok_or(RegistryError::MissingTask(handle.0))?;
        task.set_action(action);
        if let Some(callback) = callback {
            task.add_callback(callback);
        }

        if deadline >= task.deadline() {
            return Ok(PutOutcome::Updated);
        }

        debug!(key = %task.key(), from = %task.deadline(), to = %deadline, %priority, "promoting task");
        task.set_deadline(deadline);
        self.reposition(handle, deadline)?;
        Ok(PutOutcome::Promoted)
    }

    /// Move a node whose deadline just decreased to its new slot.
    ///
    /// The node is unlinked from each level it occupies, then each level is
    /// searched backward from the node's former successor.
    fn reposition(&mut self, handle: NodeHandle, deadline: Timestamp) -> Result<(), RegistryError> {
        let height = self.nodes[handle.0].height();
        if height == 0 {
            return Err(self.corruption(0, format!("promoted node {} is not linked", handle.0)));
        }
        if height < MAX_LEVEL && self.nodes[handle.0].prev[height].is_some() {
            return Err(self.corruption(height, "promoted node has a predecessor but no successor"));
        }

        let mut anchors = [TAIL; MAX_LEVEL];
        for level in (0..height).rev() {
            let node = &self.nodes[handle.0];
            let Some(pred) = node.prev[level] else {
                return Err(self.corruption(level, "promoted node has a successor but no predecessor"));
            };
            let Some(succ) = node.next[level] else {
                return Err(self.corruption(level, "promoted node has a predecessor but no successor"));
            };
            self.splice_out(pred, succ, level);
            anchors[level] = succ;
        }
        self.nodes[handle.0].clear_links();

        for level in (0..height).rev() {
            let mut succ = anchors[level];
            let mut pred = self.prev_of(succ, level)?;
            while pred != HEAD && self.deadline_of(pred)? > deadline {
                succ = pred;
                pred = self.prev_of(pred, level)?;
            }
            self.link(pred, handle, succ, level);
        }
        Ok(())
    }

    fn alloc(&mut self, node: Node) -> NodeHandle {
        match self.free.pop() {
            Some(handle) => {
                self.nodes[handle.0] = node;
                handle
            }
            None => {
                self.nodes.push(node);
                NodeHandle(self.nodes.len() - 1)
            }
        }
    }

    fn release(&mut self, handle: NodeHandle) -> Node {
        let node = std::mem::replace(&mut self.nodes[handle.0], Node::sentinel());
        self.free.push(handle);
        node
    }

    fn link(&mut self, pred: NodeHandle, node: NodeHandle, succ: NodeHandle, level: usize) {
        self.nodes[pred.0].next[level] = Some(node);
        self.nodes[node.0].prev[level] = Some(pred);
        self.nodes[node.0].next[level] = Some(succ);
        self.nodes[succ.0].prev[level] = Some(node);
    }

    fn splice_out(&mut self, pred: NodeHandle, succ: NodeHandle, level: usize) {
        self.nodes[pred.0].next[level] = Some(succ);
        self.nodes[succ.0].prev[level] = Some(pred);
    }

    fn next_of(&self, handle: NodeHandle, level: usize) -> Result<NodeHandle, RegistryError> {
        self.nodes[handle.0].next[level]
            .ok_or_else(|| self.corruption(level, format!("node {} has no successor", handle.0)))
    }

    fn prev_of(&self, handle: NodeHandle, level: usize) -> Result<NodeHandle, RegistryError> {
        self.nodes[handle.0].prev[level]
            .ok_or_else(|| self.corruption(level, format!("node {} has no predecessor", handle.0)))
    }

    fn task_of(&self, handle: NodeHandle) -> Result<&Task, RegistryError> {
        self.nodes[handle.0].task.as_ref().ok_or_else(|| {
            error!(node = handle.0, "linked node holds no task");
            RegistryError::MissingTask(handle.0)
        })
    }

    fn deadline_of(&self, handle: NodeHandle) -> Result<Timestamp, RegistryError> {
        self.task_of(handle).map(Task::deadline)
    }

    fn corruption(&self, level: usize, detail: impl Into<String>) -> RegistryError {
        let err = RegistryError::corrupted(level, detail);
        error!(error = %err, pending = self.index.len(), "task registry invariant violated");
        err
    }
}

impl fmt::Debug for TaskRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskRegistry")
            .field("len", &self.index.len())
            .field("max_level", &self.max_level)
            .field("timeouts", &self.timeouts)
            .finish()
    }
}
