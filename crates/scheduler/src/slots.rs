//! Host-side slot sources.
//!
//! A scheduler never runs on its own: it asks its [`SlotRequester`] for the
//! next eligible execution slot and the host later answers by calling
//! `run_slice` with the policy's signal.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;

use tickwork_core::Timestamp;

/// "Call me back at the next eligible slot."
pub trait SlotRequester {
    /// `armed_at` is the clock reading when the request was made. Deferred
    /// hosts hand it back as the slice signal.
    fn request_slot(&self, armed_at: Timestamp);
}

/// Records slot requests so the host (or a test) can answer them later.
#[derive(Debug, Default)]
pub struct ManualSlots {
    requests: RefCell<VecDeque<Timestamp>>,
    total: Cell<usize>,
}

impl ManualSlots {
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests made since construction, including already taken ones.
    pub fn total_requests(&self) -> usize {
        self.total.get()
    }

    /// Requests not yet taken.
    pub fn pending(&self) -> usize {
        self.requests.borrow().len()
    }

    pub fn last(&self) -> Option<Timestamp> {
        self.requests.borrow().back().copied()
    }

    /// Take the oldest outstanding request.
    pub fn take(&self) -> Option<Timestamp> {
        self.requests.borrow_mut().pop_front()
    }
}

impl SlotRequester for ManualSlots {
    fn request_slot(&self, armed_at: Timestamp) {
        self.requests.borrow_mut().push_back(armed_at);
        self.total.set(self.total.get() + 1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_and_takes_in_order() {
        let slots = ManualSlots::new();
        slots.request_slot(Timestamp::from_millis(1));
        slots.request_slot(Timestamp::from_millis(2));

        assert_eq!(slots.pending(), 2);
        assert_eq!(slots.last(), Some(Timestamp::from_millis(2)));
        assert_eq!(slots.take(), Some(Timestamp::from_millis(1)));
        assert_eq!(slots.take(), Some(Timestamp::from_millis(2)));
        assert_eq!(slots.take(), None);
        assert_eq!(slots.total_requests(), 2);
    }
}
