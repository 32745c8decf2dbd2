use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identifier under which a task is stored in the registry.
///
/// Pushing twice with equal keys merges into one task. Keys created by
/// [`TaskKey::auto`] are unique, so such tasks never merge.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TaskKey {
    Name(String),
    Int(i64),
    Auto(Uuid),
}

impl TaskKey {
    /// A fresh key that equals no other.
    pub fn auto() -> Self {
        TaskKey::Auto(Uuid::new_v4())
    }

    pub fn is_auto(&self) -> bool {
        matches!(self, TaskKey::Auto(_))
    }
}

impl fmt::Display for TaskKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskKey::Name(name) => write!(f, "{name}"),
            TaskKey::Int(n) => write!(f, "#{n}"),
            TaskKey::Auto(id) => write!(f, "auto:{id}"),
        }
    }
}

impl From<&str> for TaskKey {
    fn from(name: &str) -> Self {
        TaskKey::Name(name.to_string())
    }
}

impl From<String> for TaskKey {
    fn from(name: String) -> Self {
        TaskKey::Name(name)
    }
}

impl From<i64> for TaskKey {
    fn from(n: i64) -> Self {
        TaskKey::Int(n)
    }
}

impl From<i32> for TaskKey {
    fn from(n: i32) -> Self {
        TaskKey::Int(n.into())
    }
}

impl From<u32> for TaskKey {
    fn from(n: u32) -> Self {
        TaskKey::Int(n.into())
    }
}

impl From<Uuid> for TaskKey {
    fn from(id: Uuid) -> Self {
        TaskKey::Auto(id)
    }
}
