//! fplbench - Probabilistic Łukasiewicz Benchmark Infrastructure
//!
//! This crate generates random benchmark formulas in a fragment of
//! probabilistic Łukasiewicz logic, writes them to instance files and runs an
//! external solver on each instance under a per-instance wall-clock timeout,
//! with a fixed-size worker pool. Reported solver time is CPU time.
//!
//! # Features
//!
//! - Random 3-CNFs, classical implications and the eleven L-clause templates
//! - Two experiment modes (np-modal, np-classical) over a parameter grid
//! - Explicit, per-instance seeded randomness
//! - Solver runs in their own process group, pinned to a core, killed as a
//!   group on timeout
//! - Per-child CPU time accounting
//! - CSV result table plus JSON and text summaries
//!
//! # Examples
//!
//! ## Generating a formula
//!
//! ```
//! use fplbench::{FormulaGenerator, ParameterPoint, SeedPolicy};
//!
//! let mut generator = FormulaGenerator::new(SeedPolicy::Fixed(42).rng_for(1));
//! let point = ParameterPoint::NpClassical { n: 4, m: 2, l1: 3, l2: 1 };
//! let formula = point.generate(&mut generator).unwrap();
//! assert_eq!(formula.matches("P(").count(), 3);
//! ```
//!
//! ## Running an experiment
//!
//! ```no_run
//! use fplbench::{ExperimentConfig, ExperimentMode, Reporter, available_cores};
//!
//! let config = ExperimentConfig::for_mode(ExperimentMode::NpModal)
//!     .with_output_dir("exp-np-modal")
//!     .with_solver("/usr/local/bin/fplsol", "/usr/local/bin/minisat+");
//! let cores = available_cores();
//! config.validate_for_host(cores).expect("invalid configuration");
//!
//! let outcome = config
//!     .runner(cores)
//!     .run(&config.tasks(), &config.invoker(cores))
//!     .expect("failed to start run");
//!
//! Reporter::csv()
//!     .write_results(&outcome, config.results_path())
//!     .expect("failed to write results");
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

#[cfg(not(unix))]
compile_error!("fplbench needs Unix process groups and wait4(2)");

pub mod config;
pub mod experiment;
pub mod formula;
pub mod instance;
pub mod invoker;
pub mod parallel;
pub mod process;
pub mod record;
pub mod reporter;

pub use config::{ConfigError, ConfigResult, ExperimentConfig};

pub use experiment::{
    ExperimentMode, InstanceTask, ParameterGrid, ParameterPoint, SeedPolicy, enumerate_tasks,
};

pub use formula::{
    Formula, FormulaGenerator, GenerateError, GenerateResult, LTemplate, ProbabilityOperand,
    apply_probability_operator, combine_top_level, render_top_level,
};

pub use instance::{Instance, InstanceError, InstanceResult, InstanceWriter};

pub use invoker::{CoreLayout, Invocation, Invoke, SolverConfig, SolverInvoker, Verdict};

pub use parallel::{
    FailureStage, MaterializeOutcome, ParallelConfig, ParallelError, ParallelProgress,
    ParallelResult, ParallelRunner, ProgressCallback, RunOutcome, TaskFailure, available_cores,
    pool_size_for,
};

pub use process::{CpuTime, GroupChild};

pub use record::{OutcomeRecord, PointSummary, RunSummary, VerdictCounts};

pub use reporter::{
    FailurePolicy, Report, ReportFormat, Reporter, ReporterConfig, ReporterError, ReporterResult,
    ResultTable, results_file_name,
};
