use std::fmt;

use crate::clock::Timestamp;
use crate::error::TaskError;
use crate::key::TaskKey;
use crate::priority::Priority;

/// Outcome of an action or callback.
pub type TaskResult = Result<(), TaskError>;

/// The unit of work a task performs. Runs at most once.
pub type Action = Box<dyn FnOnce() -> TaskResult>;

/// Runs after the action, in the order callbacks were added.
pub type Callback = Box<dyn FnOnce() -> TaskResult>;

/// A pending unit of work plus its completion callbacks.
///
/// Tasks are created and mutated by the registry; hosts only see them when
/// popped.
pub struct Task {
    key: TaskKey,
    action: Action,
    callbacks: Vec<Callback>,
    priority: Priority,
    deadline: Timestamp,
}

impl Task {
    pub fn new(key: TaskKey, action: Action, priority: Priority, deadline: Timestamp) -> Self {
        Self {
            key,
            action,
            callbacks: Vec::new(),
            priority,
            deadline,
        }
    }

    pub fn key(&self) -> &TaskKey {
        &self.key
    }

    pub fn priority(&self) -> Priority {
        self.priority
    }

    pub fn deadline(&self) -> Timestamp {
        self.deadline
    }

    pub fn set_deadline(&mut self, deadline: Timestamp) {
        self.deadline = deadline;
    }

    /// Replace the action. The previous one is dropped without running.
    pub fn set_action(&mut self, action: Action) {
        self.action = action;
    }

    pub fn add_callback(&mut self, callback: Callback) {
        self.callbacks.push(callback);
    }

    pub fn callback_count(&self) -> usize {
        self.callbacks.len()
    }

    /// Run the action, then each callback in insertion order.
    ///
    /// The first error stops execution and is returned as-is.
    pub fn run(self) -> TaskResult {
        (self.action)()?;
        for callback in self.callbacks {
            callback()?;
        }
        Ok(())
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("key", &self.key)
            .field("priority", &self.priority)
            .field("deadline", &self.deadline)
            .field("callbacks", &self.callbacks.len())
            .finish()
    }
}

/// Options accepted when pushing a task.
#[derive(Default)]
pub struct PushOptions {
    /// Merge target. A fresh auto key is used when absent.
    pub key: Option<TaskKey>,
    /// Defaults to [`Priority::Normal`].
    pub priority: Option<Priority>,
    pub callback: Option<Callback>,
}

impl PushOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_key(mut self, key: impl Into<TaskKey>) -> Self {
        self.key = Some(key.into());
        self
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = Some(priority);
        self
    }

    pub fn with_callback(mut self, callback: impl FnOnce() -> TaskResult + 'static) -> Self {
        self.callback = Some(Box::new(callback));
        self
    }
}

impl fmt::Debug for PushOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PushOptions")
            .field("key", &self.key)
            .field("priority", &self.priority)
            .field("callback", &self.callback.is_some())
            .finish()
    }
}
