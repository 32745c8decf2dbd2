pub mod clock;
pub mod config;
pub mod error;
pub mod key;
pub mod priority;
pub mod registry;
pub mod task;

pub use clock::{Clock, ManualClock, MonotonicClock, Timestamp};
pub use config::SchedulerConfig;
pub use error::*;
pub use key::TaskKey;
pub use priority::{Priority, PriorityTimeoutOverrides, PriorityTimeouts, IDLE_TIMEOUT_MS};
pub use registry::{PutOutcome, TaskRegistry, MAX_LEVEL};
pub use task::{Action, Callback, PushOptions, Task, TaskResult};
