use crate::task::Task;

/// Maximum number of levels in the ordering structure.
pub const MAX_LEVEL: usize = 16;

/// Index of a node in the registry arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct NodeHandle(pub(crate) usize);

/// Head sentinel, permanently allocated in slot 0.
pub(crate) const HEAD: NodeHandle = NodeHandle(0);
/// Tail sentinel, permanently allocated in slot 1.
pub(crate) const TAIL: NodeHandle = NodeHandle(1);

pub(crate) type Links = [Option<NodeHandle>; MAX_LEVEL];

/// Arena slot: one task plus its neighbours on every level it occupies.
///
/// Sentinels and free slots carry no task.
pub(crate) struct Node {
    pub(crate) task: Option<Task>,
    pub(crate) next: Links,
    pub(crate) prev: Links,
}

impl Node {
    pub(crate) fn sentinel() -> Self {
        Self {
            task: None,
            next: [None; MAX_LEVEL],
            prev: [None; MAX_LEVEL],
        }
    }

    pub(crate) fn with_task(task: Task) -> Self {
        Self {
            task: Some(task),
            next: [None; MAX_LEVEL],
            prev: [None; MAX_LEVEL],
        }
    }

    /// Number of consecutive levels, from 0 up, that have a successor link.
    pub(crate) fn height(&self) -> usize {
        self.next.iter().take_while(|link| link.is_some()).count()
    }

    pub(crate) fn clear_links(&mut self) {
        self.next = [None; MAX_LEVEL];
        self.prev = [None; MAX_LEVEL];
    }
}
