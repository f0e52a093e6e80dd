//! Parallel experiment execution using rayon
//!
//! Every [`InstanceTask`] runs the same pipeline on a worker of a fixed-size
//! rayon pool: seed a fresh randomness source, generate the formula, write the
//! instance file and hand it to the solver. Each worker blocks on at most one
//! solver process, so the pool size bounds the number of concurrent solvers.
//!
//! Outcomes are collected in completion order. A task that fails before the
//! solver runs (or panics) becomes a [`TaskFailure`] instead of a record; it
//! never affects sibling tasks.

use crate::experiment::{InstanceTask, SeedPolicy};
use crate::formula::{DEFAULT_MAX_IMPLICATION_ATTEMPTS, FormulaGenerator};
use crate::instance::{Instance, InstanceError, InstanceWriter};
use crate::invoker::{Invoke, Verdict};
use crate::record::{OutcomeRecord, RunSummary};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Default share of the host's cores used for the worker pool
pub const DEFAULT_POOL_FRACTION: f64 = 0.75;

/// Error type for setting up a parallel run
#[derive(Error, Debug)]
pub enum ParallelError {
    /// The worker pool could not be created
    #[error("Failed to build thread pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
    /// The output directory could not be prepared
    #[error(transparent)]
    Instance(#[from] InstanceError),
}

/// Result type for parallel runs
pub type ParallelResult<T> = Result<T, ParallelError>;

/// Number of cores available to this process
#[must_use]
pub fn available_cores() -> usize {
    std::thread::available_parallelism()
        .map(std::num::NonZeroUsize::get)
        .unwrap_or(1)
}

/// Worker pool size for a core fraction: `max(1, floor(fraction * cores))`
#[must_use]
pub fn pool_size_for(fraction: f64, total_cores: usize) -> usize {
    let size = (fraction * total_cores as f64).floor();
    if size.is_finite() && size >= 1.0 {
        size as usize
    } else {
        1
    }
}

/// Configuration for parallel execution
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParallelConfig {
    /// Number of worker threads
    pub num_threads: usize,
    /// Seeding policy for per-task randomness
    pub seed: SeedPolicy,
    /// Cap on consecutive rejected classical-implication draws
    pub max_implication_attempts: usize,
    /// Progress callback interval (report every N instances)
    pub progress_interval: usize,
}

impl Default for ParallelConfig {
    fn default() -> Self {
        Self {
            num_threads: pool_size_for(DEFAULT_POOL_FRACTION, available_cores()),
            seed: SeedPolicy::Entropy,
            max_implication_attempts: DEFAULT_MAX_IMPLICATION_ATTEMPTS,
            progress_interval: 1,
        }
    }
}

impl ParallelConfig {
    /// Create a config with a fixed number of workers
    #[must_use]
    pub fn new(num_threads: usize) -> Self {
        Self {
            num_threads: num_threads.max(1),
            ..Default::default()
        }
    }

    /// Set the seeding policy
    #[must_use]
    pub fn with_seed(mut self, seed: SeedPolicy) -> Self {
        self.seed = seed;
        self
    }

    /// Set the rejection-sampling cap
    #[must_use]
    pub fn with_max_implication_attempts(mut self, attempts: usize) -> Self {
        self.max_implication_attempts = attempts;
        self
    }

    /// Set the progress interval
    #[must_use]
    pub fn with_progress_interval(mut self, interval: usize) -> Self {
        self.progress_interval = interval.max(1);
        self
    }
}

/// Pipeline stage at which a task failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailureStage {
    /// Formula generation
    Generate,
    /// Writing the instance file
    Materialize,
    /// The task panicked
    Panic,
}

impl fmt::Display for FailureStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Generate => write!(f, "generation"),
            Self::Materialize => write!(f, "materialization"),
            Self::Panic => write!(f, "panic"),
        }
    }
}

/// A task that did not produce a solver outcome
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskFailure {
    /// The failed task
    pub task: InstanceTask,
    /// Where it failed
    pub stage: FailureStage,
    /// Cause
    pub message: String,
}

impl TaskFailure {
    fn new(task: &InstanceTask, stage: FailureStage, cause: impl fmt::Display) -> Self {
        Self {
            task: *task,
            stage,
            message: cause.to_string(),
        }
    }
}

impl fmt::Display for TaskFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "instance {} ({}) failed during {}: {}",
            self.task.id, self.task.point, self.stage, self.message
        )
    }
}

/// Outcome of a run: solver records and task failures, each in completion order
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunOutcome {
    /// One record per task that reached the solver
    pub records: Vec<OutcomeRecord>,
    /// One entry per task that failed before (or instead of) the solver
    pub failures: Vec<TaskFailure>,
}

impl RunOutcome {
    /// Summary over records and failures
    #[must_use]
    pub fn summary(&self) -> RunSummary {
        RunSummary::from_results(&self.records, &self.failures)
    }

    /// Number of dispatched tasks accounted for
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len() + self.failures.len()
    }

    /// Check if nothing was run
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Outcome of a generate-only run
#[derive(Debug, Clone, Default)]
pub struct MaterializeOutcome {
    /// Written instances, in completion order
    pub instances: Vec<Instance>,
    /// Tasks that could not be generated or written
    pub failures: Vec<TaskFailure>,
}

/// Progress information during parallel execution
#[derive(Debug, Clone)]
pub struct ParallelProgress {
    /// Total number of tasks
    pub total: usize,
    /// Number of finished tasks
    pub completed: usize,
    /// Number solved (SAT + UNSAT)
    pub solved: usize,
    /// Number of timeouts
    pub timeouts: usize,
    /// Number of ERROR verdicts and task failures
    pub errors: usize,
    /// Instance that just finished
    pub instance: u64,
    /// Its solver time, `None` for a task failure
    pub time: Option<Duration>,
    /// Elapsed wall-clock time of the run
    pub elapsed: Duration,
}

/// Callback type for progress updates
pub type ProgressCallback = Box<dyn Fn(ParallelProgress) + Send + Sync>;

#[derive(Default)]
struct Counters {
    completed: AtomicUsize,
    solved: AtomicUsize,
    timeouts: AtomicUsize,
    errors: AtomicUsize,
}

impl Counters {
    fn finish(&self, verdict: Option<Verdict>) -> usize {
        let counter = match verdict {
            Some(v) if v.is_solved() => &self.solved,
            Some(Verdict::Timeout) => &self.timeouts,
            _ => &self.errors,
        };
        counter.fetch_add(1, Ordering::Relaxed);
        self.completed.fetch_add(1, Ordering::Relaxed) + 1
    }
}

/// Parallel experiment runner
pub struct ParallelRunner {
    config: ParallelConfig,
    writer: InstanceWriter,
}

impl ParallelRunner {
    /// Create a runner writing instances with `writer`
    #[must_use]
    pub fn new(config: ParallelConfig, writer: InstanceWriter) -> Self {
        Self { config, writer }
    }

    /// Configuration
    #[must_use]
    pub fn config(&self) -> &ParallelConfig {
        &self.config
    }

    /// Run all tasks against `invoker`
    pub fn run<I: Invoke>(&self, tasks: &[InstanceTask], invoker: &I) -> ParallelResult<RunOutcome> {
        self.run_with_progress(tasks, invoker, None)
    }

    /// Run all tasks against `invoker` with a progress callback
    pub fn run_with_progress<I: Invoke>(
        &self,
        tasks: &[InstanceTask],
        invoker: &I,
        progress_callback: Option<ProgressCallback>,
    ) -> ParallelResult<RunOutcome> {
        self.writer.ensure_dir()?;
        let pool = self.build_pool()?;

        let start = Instant::now();
        let total = tasks.len();
        let counters = Counters::default();
        let records = Mutex::new(Vec::with_capacity(total));
        let failures = Mutex::new(Vec::new());

        info!(
            "Running {} instances on {} workers",
            total, self.config.num_threads
        );

        pool.install(|| {
            tasks.par_iter().for_each(|task| {
                let (verdict, time) = match catch_task(task, || self.run_task(task, invoker)) {
                    Ok(record) => {
                        info!(
                            "Instance {} finished: {} in {:.3}s",
                            record.instance,
                            record.verdict,
                            record.time.as_secs_f64()
                        );
                        let finished = (Some(record.verdict), Some(record.time));
                        push(&records, record);
                        finished
                    }
                    Err(failure) => {
                        warn!("{}", failure);
                        push(&failures, failure);
                        (None, None)
                    }
                };

                let count = counters.finish(verdict);

                if let Some(ref callback) = progress_callback
                    && (count.is_multiple_of(self.config.progress_interval) || count == total)
                {
                    callback(ParallelProgress {
                        total,
                        completed: count,
                        solved: counters.solved.load(Ordering::Relaxed),
                        timeouts: counters.timeouts.load(Ordering::Relaxed),
                        errors: counters.errors.load(Ordering::Relaxed),
                        instance: task.id,
                        time,
                        elapsed: start.elapsed(),
                    });
                }
            });
        });

        Ok(RunOutcome {
            records: records.into_inner().unwrap_or_else(PoisonError::into_inner),
            failures: failures.into_inner().unwrap_or_else(PoisonError::into_inner),
        })
    }

    /// Generate and write every instance without invoking a solver
    pub fn materialize(&self, tasks: &[InstanceTask]) -> ParallelResult<MaterializeOutcome> {
        self.writer.ensure_dir()?;
        let pool = self.build_pool()?;

        let instances = Mutex::new(Vec::with_capacity(tasks.len()));
        let failures = Mutex::new(Vec::new());

        pool.install(|| {
            tasks.par_iter().for_each(|task| {
                match catch_task(task, || self.materialize_task(task)) {
                    Ok(instance) => push(&instances, instance),
                    Err(failure) => {
                        warn!("{}", failure);
                        push(&failures, failure);
                    }
                }
            });
        });

        Ok(MaterializeOutcome {
            instances: instances.into_inner().unwrap_or_else(PoisonError::into_inner),
            failures: failures.into_inner().unwrap_or_else(PoisonError::into_inner),
        })
    }

    fn build_pool(&self) -> ParallelResult<rayon::ThreadPool> {
        Ok(rayon::ThreadPoolBuilder::new()
            .num_threads(self.config.num_threads.max(1))
            .thread_name(|i| format!("fplbench-worker-{i}"))
            .build()?)
    }

    fn materialize_task(&self, task: &InstanceTask) -> Result<Instance, TaskFailure> {
        let mut generator = FormulaGenerator::new(self.config.seed.rng_for(task.id))
            .with_max_implication_attempts(self.config.max_implication_attempts);

        let formula = task
            .point
            .generate(&mut generator)
            .map_err(|e| TaskFailure::new(task, FailureStage::Generate, e))?;

        self.writer
            .write(task.id, &formula)
            .map_err(|e| TaskFailure::new(task, FailureStage::Materialize, e))
    }

    fn run_task<I: Invoke>(&self, task: &InstanceTask, invoker: &I) -> Result<OutcomeRecord, TaskFailure> {
        debug!("Dispatching instance {} ({})", task.id, task.point);

        let instance = self.materialize_task(task)?;
        let invocation = invoker.invoke(&instance.path, task.id);

        if !invocation.stdout.is_empty() {
            debug!("Instance {} stdout: {}", task.id, invocation.stdout.trim_end());
        }
        if !invocation.stderr.is_empty() {
            debug!("Instance {} stderr: {}", task.id, invocation.stderr.trim_end());
        }
        if let Some(ref message) = invocation.message {
            warn!("Instance {}: {}", task.id, message);
        }

        Ok(OutcomeRecord::new(task, &invocation))
    }
}

/// Run `f`, turning a panic into a failure
fn catch_task<T>(
    task: &InstanceTask,
    f: impl FnOnce() -> Result<T, TaskFailure>,
) -> Result<T, TaskFailure> {
    panic::catch_unwind(AssertUnwindSafe(f)).unwrap_or_else(|payload| {
        Err(TaskFailure::new(
            task,
            FailureStage::Panic,
            panic_message(payload.as_ref()),
        ))
    })
}

fn push<T>(sink: &Mutex<Vec<T>>, item: T) {
    sink.lock().unwrap_or_else(PoisonError::into_inner).push(item);
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "task panicked".to_string()
    }
}
