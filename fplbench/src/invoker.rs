//! External solver invocation with timeout and CPU accounting
//!
//! The solver is run once per instance as
//! `<pin-utility> -c <core> <solver> --pbsolver <aux-solver> -i <instance>`,
//! inside its own process group. The reported time is the user CPU time of
//! the solver process and the sub-solvers it waited for; a timed-out run is
//! reported at exactly the configured bound.

use crate::process::{CpuTime, GroupChild};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Exit code the solver uses for a satisfiable instance
pub const EXIT_SAT: i32 = 0;
/// Exit code the solver uses for an unsatisfiable instance
pub const EXIT_UNSAT: i32 = 2;

/// Solver verdict for one instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Verdict {
    /// Solver exited with code 0
    Sat,
    /// Solver exited with code 2
    Unsat,
    /// Any other exit, a launch failure, or a failed task
    Error,
    /// The timeout bound was reached and the process group was killed
    Timeout,
}

impl Verdict {
    /// Table representation
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sat => "SAT",
            Self::Unsat => "UNSAT",
            Self::Error => "ERROR",
            Self::Timeout => "TIMEOUT",
        }
    }

    /// Classify a solver exit code (`None` when killed by a signal)
    #[must_use]
    pub fn from_exit_code(code: Option<i32>) -> Self {
        match code {
            Some(EXIT_SAT) => Self::Sat,
            Some(EXIT_UNSAT) => Self::Unsat,
            _ => Self::Error,
        }
    }

    /// SAT or UNSAT
    #[must_use]
    pub fn is_solved(&self) -> bool {
        matches!(self, Self::Sat | Self::Unsat)
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Core reservation for pinned solver runs
///
/// The last `pool_size` cores of the host are reserved for solvers; instance
/// `id` always runs on core `(total_cores - pool_size) + id % pool_size`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoreLayout {
    /// Cores available on the host
    pub total_cores: usize,
    /// Worker pool size
    pub pool_size: usize,
}

impl CoreLayout {
    /// Create a layout; the pool size is clamped to at least 1
    #[must_use]
    pub fn new(total_cores: usize, pool_size: usize) -> Self {
        Self {
            total_cores,
            pool_size: pool_size.max(1),
        }
    }

    /// Core for the given instance
    ///
    /// Always below `total_cores`; a pool larger than the host wraps around
    /// and shares cores.
    #[must_use]
    pub fn core_for(&self, instance_id: u64) -> usize {
        let offset = (instance_id % self.pool_size as u64) as usize;
        (self.total_cores.saturating_sub(self.pool_size) + offset) % self.total_cores.max(1)
    }
}

/// Solver command configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SolverConfig {
    /// Solver binary
    pub solver: PathBuf,
    /// Auxiliary pseudo-boolean solver passed via `--pbsolver`
    pub pb_solver: PathBuf,
    /// Core-pinning utility (invoked as `<utility> -c <core> ...`)
    pub pin_utility: PathBuf,
    /// Whether to pin solver runs to a core
    pub pin_cores: bool,
    /// Timeout per instance
    #[serde(with = "duration_secs")]
    pub timeout: Duration,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            solver: PathBuf::from("fplsol"),
            pb_solver: PathBuf::from("minisat+"),
            pin_utility: PathBuf::from("taskset"),
            pin_cores: true,
            timeout: Duration::from_secs(2 * 60 * 60),
        }
    }
}

impl SolverConfig {
    /// Create a config for the given solver binaries
    #[must_use]
    pub fn new(solver: impl Into<PathBuf>, pb_solver: impl Into<PathBuf>) -> Self {
        Self {
            solver: solver.into(),
            pb_solver: pb_solver.into(),
            ..Default::default()
        }
    }

    /// Set the timeout
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the core-pinning utility
    #[must_use]
    pub fn with_pin_utility(mut self, utility: impl Into<PathBuf>) -> Self {
        self.pin_utility = utility.into();
        self
    }

    /// Enable or disable core pinning
    #[must_use]
    pub fn with_pin_cores(mut self, pin: bool) -> Self {
        self.pin_cores = pin;
        self
    }
}

/// Result of one solver invocation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Invocation {
    /// Verdict
    pub verdict: Verdict,
    /// Solver-attributable time (user CPU, or the bound on timeout)
    pub time: Duration,
    /// Full CPU usage of the solver when it was reaped normally
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_time: Option<Duration>,
    /// Wall-clock duration of the invocation
    pub wall: Duration,
    /// Core the solver was pinned to
    #[serde(skip_serializing_if = "Option::is_none")]
    pub core: Option<usize>,
    /// Exit code, if the solver exited normally
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    /// Captured standard output
    #[serde(skip)]
    pub stdout: String,
    /// Captured standard error
    #[serde(skip)]
    pub stderr: String,
    /// Error description for launch or wait failures
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl Invocation {
    /// A failed invocation with zero elapsed time
    #[must_use]
    pub fn error(message: impl Into<String>, core: Option<usize>) -> Self {
        Self {
            verdict: Verdict::Error,
            time: Duration::ZERO,
            system_time: None,
            wall: Duration::ZERO,
            core,
            exit_code: None,
            stdout: String::new(),
            stderr: String::new(),
            message: Some(message.into()),
        }
    }

    fn timeout(bound: Duration, wall: Duration, core: Option<usize>) -> Self {
        Self {
            verdict: Verdict::Timeout,
            time: bound,
            system_time: None,
            wall,
            core,
            exit_code: None,
            stdout: String::new(),
            stderr: String::new(),
            message: None,
        }
    }

    fn completed(exit_code: Option<i32>, cpu: CpuTime, wall: Duration, core: Option<usize>) -> Self {
        Self {
            verdict: Verdict::from_exit_code(exit_code),
            time: cpu.user,
            system_time: Some(cpu.system),
            wall,
            core,
            exit_code,
            stdout: String::new(),
            stderr: String::new(),
            message: None,
        }
    }
}

/// Something that can run the solver on one instance file
///
/// Implementations must be callable from several worker threads at once.
pub trait Invoke: Send + Sync {
    /// Run the solver on `instance` and classify the outcome
    fn invoke(&self, instance: &Path, instance_id: u64) -> Invocation;
}

/// Invoker for the external solver binary
#[derive(Debug, Clone)]
pub struct SolverInvoker {
    config: SolverConfig,
    layout: CoreLayout,
}

impl SolverInvoker {
    /// Create an invoker
    #[must_use]
    pub fn new(config: SolverConfig, layout: CoreLayout) -> Self {
        Self { config, layout }
    }

    /// Configuration
    #[must_use]
    pub fn config(&self) -> &SolverConfig {
        &self.config
    }

    /// Core assigned to an instance, if pinning is enabled
    #[must_use]
    pub fn core_for(&self, instance_id: u64) -> Option<usize> {
        self.config
            .pin_cores
            .then(|| self.layout.core_for(instance_id))
    }

    /// Build the command line for one instance
    #[must_use]
    pub fn command(&self, instance: &Path, instance_id: u64) -> Command {
        let mut cmd = match self.core_for(instance_id) {
            Some(core) => {
                let mut cmd = Command::new(&self.config.pin_utility);
                cmd.arg("-c").arg(core.to_string()).arg(&self.config.solver);
                cmd
            }
            None => Command::new(&self.config.solver),
        };
        cmd.arg("--pbsolver")
            .arg(&self.config.pb_solver)
            .arg("-i")
            .arg(instance);
        cmd
    }
}

impl Invoke for SolverInvoker {
    fn invoke(&self, instance: &Path, instance_id: u64) -> Invocation {
        let core = self.core_for(instance_id);
        let start = Instant::now();

        debug!(
            "Launching solver for instance {} on core {:?}: {}",
            instance_id,
            core,
            instance.display()
        );

        let mut child = match GroupChild::spawn(self.command(instance, instance_id)) {
            Ok(child) => child,
            Err(e) => {
                warn!("Failed to launch solver for instance {}: {}", instance_id, e);
                return Invocation::error(format!("Failed to launch solver: {e}"), core);
            }
        };

        match child.wait_timeout(self.config.timeout) {
            Ok(Some(reaped)) => {
                let wall = start.elapsed();
                let output = child.into_output();
                let mut invocation =
                    Invocation::completed(reaped.status.code(), reaped.cpu, wall, core);
                if invocation.verdict == Verdict::Error {
                    debug!(
                        "Instance {} exited with {}: {}",
                        instance_id,
                        reaped.status,
                        output.stderr.trim()
                    );
                }
                invocation.stdout = output.stdout;
                invocation.stderr = output.stderr;
                invocation
            }
            Ok(None) => {
                info!(
                    "Timeout in instance {} after {:?}, killing process group {}",
                    instance_id,
                    self.config.timeout,
                    child.id()
                );
                if let Err(e) = child.kill_group() {
                    warn!("Failed to kill process group {}: {}", child.id(), e);
                }
                if let Err(e) = child.wait() {
                    warn!("Failed to reap process group {}: {}", child.id(), e);
                }
                let _ = child.into_output();
                Invocation::timeout(self.config.timeout, start.elapsed(), core)
            }
            Err(e) => {
                warn!("Failed to wait for instance {}: {}", instance_id, e);
                Invocation::error(format!("Failed to wait for solver: {e}"), core)
            }
        }
    }
}

/// Serialize a `Duration` as fractional seconds
pub(crate) mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_f64(d.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(d)?;
        Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
    }
}
