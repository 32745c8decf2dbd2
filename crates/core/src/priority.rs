use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::clock::Timestamp;

/// Timeout used for [`Priority::Idle`]: practically never urgent.
///
/// Also reported by an empty registry as its next deadline.
pub const IDLE_TIMEOUT_MS: u64 = 1_073_741_823;

/// How far an IMMEDIATE deadline is placed behind "now", so it is overdue
/// the moment it is scheduled.
const IMMEDIATE_LEAD: Duration = Duration::from_millis(1);

/// Coarse urgency label. Each maps to a deadline offset from "now".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    /// Already overdue when scheduled.
    Immediate,
    /// 250ms by default.
    High,
    /// 1s by default.
    Normal,
    /// 5s by default.
    Low,
    /// Runs whenever budget allows; never becomes urgent in practice.
    Idle,
}

impl Default for Priority {
    fn default() -> Self {
        Priority::Normal
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Priority::Immediate => write!(f, "immediate"),
            Priority::High => write!(f, "high"),
            Priority::Normal => write!(f, "normal"),
            Priority::Low => write!(f, "low"),
            Priority::Idle => write!(f, "idle"),
        }
    }
}

impl FromStr for Priority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "immediate" => Ok(Priority::Immediate),
            "high" => Ok(Priority::High),
            "normal" => Ok(Priority::Normal),
            "low" => Ok(Priority::Low),
            "idle" => Ok(Priority::Idle),
            other => Err(format!("unknown priority: {other}")),
        }
    }
}

/// Partial update to the overridable timeouts, in milliseconds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriorityTimeoutOverrides {
    #[serde(default)]
    pub high: Option<u64>,
    #[serde(default)]
    pub normal: Option<u64>,
    #[serde(default)]
    pub low: Option<u64>,
}

impl PriorityTimeoutOverrides {
    pub fn is_empty(&self) -> bool {
        self.high.is_none() && self.normal.is_none() && self.low.is_none()
    }
}

/// Active timeout table. IMMEDIATE and IDLE are fixed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriorityTimeouts {
    pub high_ms: u64,
    pub normal_ms: u64,
    pub low_ms: u64,
}

impl Default for PriorityTimeouts {
    fn default() -> Self {
        Self {
            high_ms: 250,
            normal_ms: 1000,
            low_ms: 5000,
        }
    }
}

impl PriorityTimeouts {
    /// Merge overrides into the table, leaving unspecified entries alone.
    pub fn merge(&mut self, overrides: &PriorityTimeoutOverrides) {
        if let Some(ms) = overrides.high {
            self.high_ms = ms;
        }
        if let Some(ms) = overrides.normal {
            self.normal_ms = ms;
        }
        if let Some(ms) = overrides.low {
            self.low_ms = ms;
        }
    }

    /// Offset from "now" for a priority. `None` means already overdue.
    pub fn timeout_for(&self, priority: Priority) -> Option<Duration> {
        match priority {
            Priority::Immediate => None,
            Priority::High => Some(Duration::from_millis(self.high_ms)),
            Priority::Normal => Some(Duration::from_millis(self.normal_ms)),
            Priority::Low => Some(Duration::from_millis(self.low_ms)),
            Priority::Idle => Some(Duration::from_millis(IDLE_TIMEOUT_MS)),
        }
    }

    /// Absolute deadline for a task of `priority` scheduled at `now`.
    pub fn deadline_for(&self, priority: Priority, now: Timestamp) -> Timestamp {
        match self.timeout_for(priority) {
            Some(timeout) => now.saturating_add(timeout),
            None => now.saturating_sub(IMMEDIATE_LEAD),
        }
    }
}
