//! Experiment configuration
//!
//! [`ExperimentConfig`] gathers everything one experiment needs and hands out
//! the pieces ([`SolverConfig`], [`ParallelConfig`], [`InstanceWriter`], the
//! task list) to the rest of the crate. Defaults describe the np-classical
//! sweep with 500 replicates per point and a two-hour timeout.

use crate::experiment::{
    ExperimentMode, InstanceTask, ParameterGrid, SeedPolicy, enumerate_tasks,
};
use crate::formula::DEFAULT_MAX_IMPLICATION_ATTEMPTS;
use crate::instance::{DEFAULT_EXTENSION, InstanceWriter};
use crate::invoker::{CoreLayout, SolverConfig, SolverInvoker, duration_secs};
use crate::parallel::{DEFAULT_POOL_FRACTION, ParallelConfig, ParallelRunner, pool_size_for};
use crate::reporter::{FailurePolicy, results_file_name};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Error type for configuration validation
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    /// Pool fraction outside (0, 1]
    #[error("Pool fraction must be in (0, 1], got {0}")]
    InvalidFraction(f64),
    /// The parameter grid has no points
    #[error("Parameter grid is empty")]
    EmptyGrid,
    /// No replicates requested
    #[error("Replicate count must be at least 1")]
    ZeroReplicates,
    /// No classical variables
    #[error("Variable count n must be at least 1")]
    NoVariables,
    /// An np-classical grid contains m = 0
    #[error("CNF size m must be at least 1")]
    EmptyCnf,
    /// An np-classical grid has l1 = 0
    #[error("Modal atoms per simple L-clause (l1) must be at least 1")]
    NoModalAtoms,
    /// Zero timeout
    #[error("Timeout must be positive")]
    ZeroTimeout,
    /// Empty instance file extension
    #[error("Instance file extension must not be empty")]
    EmptyExtension,
    /// More pinned workers than host cores
    #[error("Pool of {workers} pinned workers exceeds the {cores} cores of this host")]
    TooManyWorkers {
        /// Requested pool size
        workers: usize,
        /// Cores on the host
        cores: usize,
    },
}

/// Result type for configuration operations
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Full description of one experiment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExperimentConfig {
    /// Directory for instance files and the result table
    pub output_dir: PathBuf,
    /// Share of the host's cores used for the worker pool
    pub pool_fraction: f64,
    /// Explicit worker count, overriding `pool_fraction`
    pub workers: Option<usize>,
    /// Timeout per instance
    #[serde(with = "duration_secs")]
    pub timeout: Duration,
    /// Number of classical variables
    pub n: u32,
    /// Instances per parameter point
    pub replicates: usize,
    /// Parameter grid (selects the mode)
    pub grid: ParameterGrid,
    /// Solver binary
    pub solver: PathBuf,
    /// Auxiliary pseudo-boolean solver
    pub pb_solver: PathBuf,
    /// Core-pinning utility
    pub pin_utility: PathBuf,
    /// Whether solver runs are pinned to cores
    pub pin_cores: bool,
    /// Instance file extension
    pub extension: String,
    /// Fixed base seed; `None` seeds from time, pid and instance id
    pub seed: Option<u64>,
    /// Whether failed tasks appear in the result table
    pub failure_policy: FailurePolicy,
    /// Cap on consecutive rejected classical-implication draws
    pub max_implication_attempts: usize,
}

impl Default for ExperimentConfig {
    fn default() -> Self {
        let solver = SolverConfig::default();
        Self {
            output_dir: PathBuf::from("exp-np-classical-3-t2"),
            pool_fraction: DEFAULT_POOL_FRACTION,
            workers: None,
            timeout: solver.timeout,
            n: 120,
            replicates: 500,
            grid: ParameterGrid::np_classical_default(),
            solver: solver.solver,
            pb_solver: solver.pb_solver,
            pin_utility: solver.pin_utility,
            pin_cores: solver.pin_cores,
            extension: DEFAULT_EXTENSION.to_string(),
            seed: None,
            failure_policy: FailurePolicy::default(),
            max_implication_attempts: DEFAULT_MAX_IMPLICATION_ATTEMPTS,
        }
    }
}

impl ExperimentConfig {
    /// Default configuration for a mode
    #[must_use]
    pub fn for_mode(mode: ExperimentMode) -> Self {
        Self::default().with_mode(mode)
    }

    /// Switch mode, resetting the grid to the mode's default
    #[must_use]
    pub fn with_mode(mut self, mode: ExperimentMode) -> Self {
        if self.grid.mode() != mode {
            self.grid = ParameterGrid::default_for(mode);
        }
        self
    }

    /// Set the parameter grid
    #[must_use]
    pub fn with_grid(mut self, grid: ParameterGrid) -> Self {
        self.grid = grid;
        self
    }

    /// Set the output directory
    #[must_use]
    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = dir.into();
        self
    }

    /// Set the timeout
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the variable count
    #[must_use]
    pub fn with_variables(mut self, n: u32) -> Self {
        self.n = n;
        self
    }

    /// Set the replicate count
    #[must_use]
    pub fn with_replicates(mut self, replicates: usize) -> Self {
        self.replicates = replicates;
        self
    }

    /// Set the pool fraction
    #[must_use]
    pub fn with_pool_fraction(mut self, fraction: f64) -> Self {
        self.pool_fraction = fraction;
        self
    }

    /// Use exactly `workers` workers
    #[must_use]
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = Some(workers);
        self
    }

    /// Set the solver binaries
    #[must_use]
    pub fn with_solver(mut self, solver: impl Into<PathBuf>, pb_solver: impl Into<PathBuf>) -> Self {
        self.solver = solver.into();
        self.pb_solver = pb_solver.into();
        self
    }

    /// Enable or disable core pinning
    #[must_use]
    pub fn with_pin_cores(mut self, pin: bool) -> Self {
        self.pin_cores = pin;
        self
    }

    /// Use a fixed base seed
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Set the failure policy
    #[must_use]
    pub fn with_failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.failure_policy = policy;
        self
    }

    /// Experiment mode
    #[must_use]
    pub fn mode(&self) -> ExperimentMode {
        self.grid.mode()
    }

    /// Check the configuration for values that would make every task fail
    pub fn validate(&self) -> ConfigResult<()> {
        if self.workers.is_none()
            && !(self.pool_fraction > 0.0 && self.pool_fraction <= 1.0)
        {
            return Err(ConfigError::InvalidFraction(self.pool_fraction));
        }
        if self.grid.is_empty() {
            return Err(ConfigError::EmptyGrid);
        }
        if self.replicates == 0 {
            return Err(ConfigError::ZeroReplicates);
        }
        if self.n == 0 {
            return Err(ConfigError::NoVariables);
        }
        if self.timeout.is_zero() {
            return Err(ConfigError::ZeroTimeout);
        }
        if self.extension.trim_start_matches('.').is_empty() {
            return Err(ConfigError::EmptyExtension);
        }
        if let ParameterGrid::NpClassical { m_values, l1, .. } = &self.grid {
            if m_values.contains(&0) {
                return Err(ConfigError::EmptyCnf);
            }
            if *l1 == 0 {
                return Err(ConfigError::NoModalAtoms);
            }
        }
        Ok(())
    }

    /// Validate against a host with `total_cores` cores
    ///
    /// Pinned runs need one distinct core per worker, so a pinned pool may
    /// not be larger than the host.
    pub fn validate_for_host(&self, total_cores: usize) -> ConfigResult<()> {
        self.validate()?;
        let workers = self.pool_size(total_cores);
        if self.pin_cores && workers > total_cores {
            return Err(ConfigError::TooManyWorkers {
                workers,
                cores: total_cores,
            });
        }
        Ok(())
    }

    /// Seeding policy
    #[must_use]
    pub fn seed_policy(&self) -> SeedPolicy {
        self.seed.map_or(SeedPolicy::Entropy, SeedPolicy::Fixed)
    }

    /// Worker pool size on a host with `total_cores` cores
    #[must_use]
    pub fn pool_size(&self, total_cores: usize) -> usize {
        match self.workers {
            Some(workers) => workers.max(1),
            None => pool_size_for(self.pool_fraction, total_cores),
        }
    }

    /// All tasks of the experiment, in grid order
    #[must_use]
    pub fn tasks(&self) -> Vec<InstanceTask> {
        enumerate_tasks(&self.grid, self.n, self.replicates)
    }

    /// Solver command configuration
    #[must_use]
    pub fn solver_config(&self) -> SolverConfig {
        SolverConfig::new(&self.solver, &self.pb_solver)
            .with_pin_utility(&self.pin_utility)
            .with_pin_cores(self.pin_cores)
            .with_timeout(self.timeout)
    }

    /// Solver invoker for a host with `total_cores` cores
    #[must_use]
    pub fn invoker(&self, total_cores: usize) -> SolverInvoker {
        SolverInvoker::new(
            self.solver_config(),
            CoreLayout::new(total_cores, self.pool_size(total_cores)),
        )
    }

    /// Instance writer for the output directory
    #[must_use]
    pub fn writer(&self) -> InstanceWriter {
        InstanceWriter::new(&self.output_dir).with_extension(&self.extension)
    }

    /// Parallel configuration for a host with `total_cores` cores
    #[must_use]
    pub fn parallel_config(&self, total_cores: usize) -> ParallelConfig {
        ParallelConfig::new(self.pool_size(total_cores))
            .with_seed(self.seed_policy())
            .with_max_implication_attempts(self.max_implication_attempts)
    }

    /// Runner for a host with `total_cores` cores
    #[must_use]
    pub fn runner(&self, total_cores: usize) -> ParallelRunner {
        ParallelRunner::new(self.parallel_config(total_cores), self.writer())
    }

    /// Path of the result table
    #[must_use]
    pub fn results_path(&self) -> PathBuf {
        self.output_dir.join(results_file_name(self.mode()))
    }
}
