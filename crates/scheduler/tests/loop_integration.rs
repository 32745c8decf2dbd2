//! End-to-end tests: a host answering slot requests with a manual clock.

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use tickwork_core::{
    Clock, ManualClock, Priority, PriorityTimeouts, PushOptions, SchedulerConfig, TaskError, TaskKey, Timestamp,
};
use tickwork_scheduler::{
    ContinuousFrame, DeferredScheduler, FrameScheduler, IdleDeadline, IdleScheduler, IdleTime, LoopState,
    ManualSlots, Scheduler, SchedulerError, SingleFrameScheduler, SinglePerTick, Deferred,
};

struct Host {
    clock: Rc<ManualClock>,
    slots: Rc<ManualSlots>,
}

impl Host {
    fn new() -> Self {
        Self {
            clock: Rc::new(ManualClock::starting_at(Timestamp::from_millis(500))),
            slots: Rc::new(ManualSlots::new()),
        }
    }

    fn frame_scheduler(&self, seed: u64) -> FrameScheduler {
        Scheduler::with_seed(ContinuousFrame::default(), self.clock.clone(), self.slots.clone(), seed)
    }

    /// Answer frame slots 16ms apart until the scheduler goes idle.
    fn run_frames(&self, scheduler: &FrameScheduler) -> usize {
        let mut frames = 0;
        while scheduler.is_working() {
            assert!(self.slots.take().is_some(), "working scheduler must have a slot pending");
            self.clock.advance(Duration::from_millis(16));
            scheduler.run_slice(self.clock.now()).unwrap();
            frames += 1;
            assert!(frames < 10_000, "scheduler never went idle");
        }
        frames
    }
}

#[test]
fn frame_host_runs_everything_in_deadline_order() {
    let host = Host::new();
    let scheduler = host.frame_scheduler(3);
    let order = Rc::new(RefCell::new(Vec::new()));
    let mut rng = StdRng::seed_from_u64(99);
    let timeouts = PriorityTimeouts::default();
    let mut expected = Vec::new();

    for i in 0..120u32 {
        let priority = match rng.gen_range(0..4) {
            0 => Priority::Immediate,
            1 => Priority::High,
            2 => Priority::Normal,
            _ => Priority::Low,
        };
        expected.push((timeouts.deadline_for(priority, host.clock.now()), i));

        let order = Rc::clone(&order);
        let clock = Rc::clone(&host.clock);
        scheduler
            .push_task(
                move || {
                    order.borrow_mut().push(i);
                    clock.advance(Duration::from_millis(1));
                    Ok(())
                },
                PushOptions::new().with_key(i).with_priority(priority),
            )
            .unwrap();
        if i % 10 == 0 {
            host.clock.advance(Duration::from_millis(1));
        }
    }
    expected.sort();

    let frames = host.run_frames(&scheduler);

    let expected: Vec<u32> = expected.into_iter().map(|(_, i)| i).collect();
    assert_eq!(*order.borrow(), expected);
    assert!(frames > 1, "120ms of work cannot fit a single 5ms frame");
    assert_eq!(scheduler.state(), LoopState::Idle);
    assert_eq!(scheduler.pending(), 0);

    let metrics = scheduler.metrics();
    assert_eq!(metrics.tasks_run, 120);
    assert_eq!(metrics.slices_run, frames as u64);
    assert_eq!(metrics.tasks_failed, 0);
}

#[test]
fn config_file_drives_timeouts_and_budget() {
    let dir = std::env::temp_dir().join(format!("tickwork-it-{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join("scheduler.toml");
    std::fs::write(
        &path,
        "frame_duration_ms = 2\n\n[priority_timeout_params]\nhigh = 20\nnormal = 40\n",
    )
    .unwrap();
    let config = SchedulerConfig::from_file(&path).unwrap();
    std::fs::remove_dir_all(&dir).ok();

    let host = Host::new();
    let scheduler = host.frame_scheduler(5);
    scheduler.set_config(&config).unwrap();

    scheduler.push_task(|| Ok(()), PushOptions::new().with_key("n").with_priority(Priority::Normal)).unwrap();
    assert_eq!(scheduler.peek_deadline().unwrap(), Timestamp::from_millis(540));
    scheduler.push_task(|| Ok(()), PushOptions::new().with_key("h").with_priority(Priority::High)).unwrap();
    assert_eq!(scheduler.peek_deadline().unwrap(), Timestamp::from_millis(520));
    assert_eq!(scheduler.frame_duration(), Some(Duration::from_millis(2)));
    // LOW was not overridden.
    assert_eq!(scheduler.timeouts().low_ms, 5_000);
}

#[test]
fn idle_host_merges_repeated_producers() {
    let host = Host::new();
    let scheduler: IdleScheduler = Scheduler::with_seed(IdleTime, host.clock.clone(), host.slots.clone(), 8);
    let runs = Rc::new(Cell::new(0));
    let notified = Rc::new(Cell::new(0));

    // Three producers ask for the same save; the last one upgrades it.
    for priority in [Priority::Low, Priority::Normal, Priority::High] {
        let runs = Rc::clone(&runs);
        let notified = Rc::clone(&notified);
        scheduler
            .push_task(
                move || {
                    runs.set(runs.get() + 1);
                    Ok(())
                },
                PushOptions::new()
                    .with_key("save")
                    .with_priority(priority)
                    .with_callback(move || {
                        notified.set(notified.get() + 1);
                        Ok(())
                    }),
            )
            .unwrap();
    }
    assert_eq!(scheduler.pending(), 1);
    assert_eq!(host.slots.total_requests(), 1);
    assert_eq!(scheduler.peek_deadline().unwrap(), Timestamp::from_millis(750));

    let window = IdleDeadline::starting_at(host.clock.now(), Duration::from_millis(10));
    let report = scheduler.run_slice(window).unwrap();

    assert_eq!(report.tasks_run, 1);
    assert_eq!(runs.get(), 1);
    assert_eq!(notified.get(), 3);
    assert_eq!(scheduler.state(), LoopState::Idle);
}

#[test]
fn schedulers_share_nothing() {
    let host = Host::new();
    let frame = host.frame_scheduler(1);
    let other_slots = Rc::new(ManualSlots::new());
    let single: SingleFrameScheduler = Scheduler::new(SinglePerTick, host.clock.clone(), other_slots.clone());

    frame.push_task(|| Ok(()), PushOptions::new().with_key("x")).unwrap();

    assert!(frame.is_working());
    assert!(!single.is_working());
    assert!(!single.has_task(&TaskKey::from("x")));
    assert_eq!(other_slots.total_requests(), 0);
    assert_eq!(host.slots.total_requests(), 1);
}

#[test]
fn single_frame_animation_chain() {
    let host = Host::new();
    let scheduler: Rc<SingleFrameScheduler> =
        Rc::new(Scheduler::with_seed(SinglePerTick, host.clock.clone(), host.slots.clone(), 4));
    let frames_seen = Rc::new(RefCell::new(Vec::new()));

    fn step(scheduler: Weak<SingleFrameScheduler>, seen: Rc<RefCell<Vec<u32>>>, n: u32) -> impl FnOnce() -> Result<(), TaskError> {
        move || {
            seen.borrow_mut().push(n);
            if n < 4 {
                if let Some(s) = scheduler.upgrade() {
                    let next = step(Rc::downgrade(&s), Rc::clone(&seen), n + 1);
                    s.push_task(next, PushOptions::new().with_priority(Priority::Immediate))
                        .map_err(|e| TaskError::failed(e.to_string()))?;
                }
            }
            Ok(())
        }
    }

    scheduler
        .push_task(
            step(Rc::downgrade(&scheduler), Rc::clone(&frames_seen), 0),
            PushOptions::new().with_priority(Priority::Immediate),
        )
        .unwrap();

    let mut ticks = 0;
    while scheduler.is_working() {
        host.slots.take().unwrap();
        scheduler.run_slice(()).unwrap();
        ticks += 1;
    }

    assert_eq!(*frames_seen.borrow(), vec![0, 1, 2, 3, 4]);
    assert_eq!(ticks, 5);
}

#[test]
fn deferred_host_recovers_from_failures() {
    let host = Host::new();
    let scheduler: DeferredScheduler =
        Scheduler::with_seed(Deferred::default(), host.clock.clone(), host.slots.clone(), 6);
    let ok = Rc::new(Cell::new(0));

    for i in 0..6 {
        let ok = Rc::clone(&ok);
        scheduler
            .push_task(
                move || {
                    if i % 3 == 0 {
                        return Err(TaskError::failed(format!("job {i} broke")));
                    }
                    ok.set(ok.get() + 1);
                    Ok(())
                },
                PushOptions::new().with_key(i).with_priority(Priority::Normal),
            )
            .unwrap();
    }

    let mut failed = Vec::new();
    while scheduler.is_working() {
        let armed_at = host.slots.take().unwrap();
        match scheduler.run_slice(armed_at) {
            Ok(_) => {}
            Err(SchedulerError::Task { key, .. }) => failed.push(key),
            Err(other) => panic!("unexpected error: {other}"),
        }
    }

    assert_eq!(failed, vec![TaskKey::from(0), TaskKey::from(3)]);
    assert_eq!(ok.get(), 4);
    assert_eq!(scheduler.metrics().tasks_failed, 2);
    assert_eq!(scheduler.state(), LoopState::Idle);
}
