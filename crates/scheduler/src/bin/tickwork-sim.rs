//! tickwork-sim: drives a scheduler from simulated host slots.
//!
//! Tick-driven policies (frame, idle, single) fire on a tokio interval;
//! the deferred policy fires right after yielding to the runtime, the way a
//! zero-delay callback would. A batch of tasks with mixed priorities is
//! pushed up front, slots are answered until the loop goes idle, and the
//! loop metrics are printed as JSON.

use std::cell::Cell;
use std::path::PathBuf;
use std::rc::Rc;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use tracing::{debug, info, warn};

use tickwork_core::{config, Clock, MonotonicClock, Priority, PushOptions, SchedulerConfig, Timestamp};
use tickwork_scheduler::{
    ContinuousFrame, Deferred, IdleDeadline, IdleTime, LoopMetrics, ManualSlots, PolicyKind, Scheduler,
    SinglePerTick, SlicePolicy, TickSampler,
};

// ── CLI ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, ValueEnum)]
enum PolicyArg {
    Frame,
    Idle,
    Deferred,
    Single,
}

/// Cooperative scheduler simulation host.
#[derive(Parser, Debug)]
#[command(name = "tickwork-sim", version, about)]
struct Cli {
    /// Slice policy to simulate.
    #[arg(long, value_enum, default_value_t = PolicyArg::Frame)]
    policy: PolicyArg,

    /// Number of tasks to push.
    #[arg(long, default_value_t = 200)]
    tasks: usize,

    /// Simulated host tick in milliseconds.
    #[arg(long, default_value_t = 16)]
    tick_ms: u64,

    /// Work performed by each task in milliseconds.
    #[arg(long, default_value_t = 1)]
    busy_ms: u64,

    /// Path to a scheduler TOML config file.
    #[arg(long, env = "TICKWORK_CONFIG")]
    config: Option<PathBuf>,

    /// Seed for priorities and registry levels.
    #[arg(long)]
    seed: Option<u64>,
}

// ── Host pacing ─────────────────────────────────────────────────────

enum Pace {
    Interval(tokio::time::Interval),
    Yield,
}

impl Pace {
    fn every(tick: Duration) -> Self {
        let mut interval = tokio::time::interval(tick);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        Pace::Interval(interval)
    }

    async fn wait(&mut self) {
        match self {
            Pace::Interval(interval) => {
                interval.tick().await;
            }
            Pace::Yield => tokio::task::yield_now().await,
        }
    }
}

#[derive(Debug, Serialize)]
struct Summary {
    policy: PolicyKind,
    tasks_pushed: usize,
    tasks_completed: usize,
    frame_duration_ms: Option<u128>,
    metrics: LoopMetrics,
}

// ── Simulation ──────────────────────────────────────────────────────

struct Sim {
    clock: Rc<MonotonicClock>,
    slots: Rc<ManualSlots>,
    rng: StdRng,
    config: SchedulerConfig,
    seed: Option<u64>,
}

impl Sim {
    fn scheduler<P: SlicePolicy>(&self, policy: P) -> anyhow::Result<Scheduler<P>> {
        let scheduler = match self.seed {
            Some(seed) => Scheduler::with_seed(policy, self.clock.clone(), self.slots.clone(), seed),
            None => Scheduler::new(policy, self.clock.clone(), self.slots.clone()),
        };
        scheduler.set_config(&self.config)?;
        Ok(scheduler)
    }

    fn push_batch<P: SlicePolicy>(
        &mut self,
        scheduler: &Scheduler<P>,
        count: usize,
        busy: Duration,
        done: &Rc<Cell<usize>>,
    ) -> anyhow::Result<()> {
        // Some keys repeat so merging and promotion get exercised.
        let distinct = (count * 3 / 4).max(1);
        for i in 0..count {
            let priority = match self.rng.gen_range(0..10) {
                0 => Priority::Immediate,
                1..=3 => Priority::High,
                4..=7 => Priority::Normal,
                _ => Priority::Low,
            };
            let done = Rc::clone(done);
            let options = PushOptions::new()
                .with_key(format!("job-{}", i % distinct))
                .with_priority(priority)
                .with_callback(move || {
                    done.set(done.get() + 1);
                    Ok(())
                });
            let outcome = scheduler.push_task(
                move || {
                    std::thread::sleep(busy);
                    Ok(())
                },
                options,
            )?;
            debug!(job = i, %priority, ?outcome, "pushed");
        }
        Ok(())
    }

    /// Answer slot requests until the scheduler goes idle.
    async fn drive<P, F>(&self, scheduler: &Scheduler<P>, mut pace: Pace, mut signal_for: F) -> anyhow::Result<()>
    where
        P: SlicePolicy,
        F: FnMut(Timestamp, Timestamp) -> P::Signal,
    {
        while scheduler.is_working() {
            let Some(armed_at) = self.slots.take() else {
                warn!("scheduler is working but never requested a slot");
                break;
            };
            pace.wait().await;
            let signal = signal_for(armed_at, self.clock.now());
            match scheduler.run_slice(signal) {
                Ok(report) => debug!(
                    tasks = report.tasks_run,
                    overdue = report.overdue_run,
                    remaining = report.remaining,
                    "slice done"
                ),
                Err(e) if e.task_key().is_some() => warn!(error = %e, "task failed, continuing"),
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }

    async fn run<P, F>(
        &mut self,
        scheduler: Scheduler<P>,
        cli: &Cli,
        pace: Pace,
        signal_for: F,
    ) -> anyhow::Result<Summary>
    where
        P: SlicePolicy,
        F: FnMut(Timestamp, Timestamp) -> P::Signal,
    {
        let done = Rc::new(Cell::new(0));
        self.push_batch(&scheduler, cli.tasks, Duration::from_millis(cli.busy_ms), &done)?;
        info!(policy = %scheduler.policy_kind(), pending = scheduler.pending(), "batch queued");

        self.drive(&scheduler, pace, signal_for).await?;

        Ok(Summary {
            policy: scheduler.policy_kind(),
            tasks_pushed: cli.tasks,
            tasks_completed: done.get(),
            frame_duration_ms: scheduler.frame_duration().map(|d| d.as_millis()),
            metrics: scheduler.metrics(),
        })
    }
}

/// Average the host tick over a few interval ticks.
async fn measure_tick(clock: &MonotonicClock, tick: Duration) -> Duration {
    let mut sampler = TickSampler::default();
    let mut pace = Pace::every(tick);
    loop {
        pace.wait().await;
        if let Some(avg) = sampler.record(clock.now()) {
            return avg;
        }
    }
}

fn load_config(path: Option<&PathBuf>) -> anyhow::Result<SchedulerConfig> {
    let base = match path {
        Some(path) => {
            let loaded = SchedulerConfig::from_file(path)?;
            info!(path = %path.display(), "loaded scheduler config");
            loaded
        }
        None => SchedulerConfig::default(),
    };
    Ok(base.with_env_overrides()?)
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    config::load_dotenv();
    let cli = Cli::parse();
    let config = load_config(cli.config.as_ref())?;
    config.log_summary();

    let tick = Duration::from_millis(cli.tick_ms.max(1));
    let mut sim = Sim {
        clock: Rc::new(MonotonicClock::new()),
        slots: Rc::new(ManualSlots::new()),
        rng: match cli.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        },
        config,
        seed: cli.seed,
    };

    let summary = match cli.policy {
        PolicyArg::Frame => {
            let scheduler = sim.scheduler(ContinuousFrame::default())?;
            sim.run(scheduler, &cli, Pace::every(tick), |_, frame_start| frame_start)
                .await?
        }
        PolicyArg::Idle => {
            let scheduler = sim.scheduler(IdleTime)?;
            let window = tick / 2;
            sim.run(scheduler, &cli, Pace::every(tick), move |_, now| {
                IdleDeadline::starting_at(now, window)
            })
            .await?
        }
        PolicyArg::Deferred => {
            let scheduler = sim.scheduler(Deferred::default())?;
            let avg = measure_tick(&sim.clock, tick).await;
            if scheduler.tune_from_tick_duration(avg) {
                info!(?avg, frame_duration = ?scheduler.frame_duration(), "deferred budget tuned");
            } else {
                warn!(?avg, "tick too short to tune deferred budget");
            }
            sim.run(scheduler, &cli, Pace::Yield, |armed_at, _| armed_at).await?
        }
        PolicyArg::Single => {
            let scheduler = sim.scheduler(SinglePerTick)?;
            sim.run(scheduler, &cli, Pace::every(tick), |_, _| ()).await?
        }
    };

    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}
