use std::time::Duration;

use tickwork_core::Timestamp;

/// Number of tick intervals averaged by [`TickSampler::default`].
pub const DEFAULT_TICK_SAMPLES: usize = 10;

/// Measures the host's average tick duration.
///
/// Feed it one timestamp per host tick. Once `samples` intervals have been
/// observed it yields their mean, which deferred schedulers use to size
/// their budget.
#[derive(Debug, Clone)]
pub struct TickSampler {
    samples: usize,
    last: Option<Timestamp>,
    total: Duration,
    intervals: usize,
}

impl TickSampler {
    pub fn new(samples: usize) -> Self {
        Self {
            samples: samples.max(1),
            last: None,
            total: Duration::ZERO,
            intervals: 0,
        }
    }

    /// Record a tick. Returns the average exactly once, on the tick that
    /// completes the sample window.
    pub fn record(&mut self, tick: Timestamp) -> Option<Duration> {
        if self.is_complete() {
            return None;
        }
        if let Some(last) = self.last.replace(tick) {
            self.total += tick.duration_since(last);
            self.intervals += 1;
            if self.is_complete() {
                return self.average();
            }
        }
        None
    }

    pub fn is_complete(&self) -> bool {
        self.intervals >= self.samples
    }

    /// Mean interval so far, if at least one interval was seen.
    pub fn average(&self) -> Option<Duration> {
        (self.intervals > 0).then(|| self.total / self.intervals as u32)
    }
}

impl Default for TickSampler {
    fn default() -> Self {
        Self::new(DEFAULT_TICK_SAMPLES)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn yields_average_once() {
        let mut s = TickSampler::new(3);
        assert_eq!(s.record(Timestamp::from_millis(0)), None);
        assert_eq!(s.record(Timestamp::from_millis(16)), None);
        assert_eq!(s.record(Timestamp::from_millis(34)), None);
        assert_eq!(s.record(Timestamp::from_millis(51)), Some(Duration::from_millis(17)));
        assert!(s.is_complete());
        assert_eq!(s.record(Timestamp::from_millis(70)), None);
        assert_eq!(s.average(), Some(Duration::from_millis(17)));
    }

    #[test]
    fn empty_sampler_has_no_average() {
        let mut s = TickSampler::default();
        assert_eq!(s.average(), None);
        s.record(Timestamp::from_millis(5));
        assert_eq!(s.average(), None);
    }
}
