//! Experiment definition: modes, parameter grids and instance enumeration
//!
//! An experiment is a parameter grid crossed with a replicate count. Every
//! (parameter point, replicate) pair becomes one [`InstanceTask`] with a
//! unique, 1-based instance id assigned in grid order.

use crate::formula::{FormulaGenerator, GenerateResult, combine_top_level};
use rand::Rng;
use rand::SeedableRng;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::{SystemTime, UNIX_EPOCH};

/// Experiment mode selector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ExperimentMode {
    /// k L-clauses over modal atoms wrapping classical implications
    NpModal,
    /// l2 simple L-clauses over modal atoms wrapping random 3-CNFs
    NpClassical,
}

impl ExperimentMode {
    /// Mode name as used in file names and configuration
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NpModal => "np-modal",
            Self::NpClassical => "np-classical",
        }
    }

    /// Column names of the result table for this mode
    #[must_use]
    pub fn columns(&self) -> &'static [&'static str] {
        match self {
            Self::NpModal => &["n", "k", "instance", "time", "verdict"],
            Self::NpClassical => &["n", "m", "l1", "l2", "instance", "time", "verdict"],
        }
    }
}

impl fmt::Display for ExperimentMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExperimentMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "np-modal" | "np_modal" => Ok(Self::NpModal),
            "np-classical" | "np_classical" => Ok(Self::NpClassical),
            other => Err(format!(
                "invalid experiment mode '{other}', expected 'np-modal' or 'np-classical'"
            )),
        }
    }
}

/// One point of the parameter grid, tagged by mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "kebab-case")]
pub enum ParameterPoint {
    /// np-modal point
    NpModal {
        /// Number of classical variables
        n: u32,
        /// Number of L-clauses
        k: usize,
    },
    /// np-classical point
    NpClassical {
        /// Number of classical variables
        n: u32,
        /// Clauses per CNF inside each modal atom
        m: usize,
        /// Modal atoms per simple L-clause
        l1: usize,
        /// Simple L-clauses in the formula
        l2: usize,
    },
}

impl ParameterPoint {
    /// Mode of this point
    #[must_use]
    pub fn mode(&self) -> ExperimentMode {
        match self {
            Self::NpModal { .. } => ExperimentMode::NpModal,
            Self::NpClassical { .. } => ExperimentMode::NpClassical,
        }
    }

    /// Parameter values in column order (without instance, time, verdict)
    #[must_use]
    pub fn values(&self) -> Vec<String> {
        match *self {
            Self::NpModal { n, k } => vec![n.to_string(), k.to_string()],
            Self::NpClassical { n, m, l1, l2 } => {
                vec![n.to_string(), m.to_string(), l1.to_string(), l2.to_string()]
            }
        }
    }

    /// Generate the top-level formula for this point
    ///
    /// An empty clause list (k = 0 or l2 = 0) renders as the empty string.
    pub fn generate<R: Rng>(&self, generator: &mut FormulaGenerator<R>) -> GenerateResult<String> {
        let clauses = match *self {
            Self::NpModal { n, k } => generator.l_clauses_modal(k, n)?,
            Self::NpClassical { n, m, l1, l2 } => generator.simple_l_clauses(m, n, l1, l2)?,
        };
        Ok(combine_top_level(clauses)
            .map(|f| f.to_string())
            .unwrap_or_default())
    }
}

impl fmt::Display for ParameterPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NpModal { n, k } => write!(f, "n={n} k={k}"),
            Self::NpClassical { n, m, l1, l2 } => write!(f, "n={n} m={m} l1={l1} l2={l2}"),
        }
    }
}

/// Parameter grid for one experiment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "kebab-case")]
pub enum ParameterGrid {
    /// Sweep over the number of L-clauses
    NpModal {
        /// Values of k
        k_values: Vec<usize>,
    },
    /// Sweep over the CNF size with fixed l1 and l2
    NpClassical {
        /// Values of m
        m_values: Vec<usize>,
        /// Modal atoms per simple L-clause
        l1: usize,
        /// Simple L-clauses per formula
        l2: usize,
    },
}

impl ParameterGrid {
    /// Default np-modal grid: k = 1..=20
    #[must_use]
    pub fn np_modal_default() -> Self {
        Self::NpModal {
            k_values: (1..=20).collect(),
        }
    }

    /// Default np-classical grid: m = 30, 60, ..., 960 with l1 = l2 = 3
    #[must_use]
    pub fn np_classical_default() -> Self {
        Self::NpClassical {
            m_values: (30..=960).step_by(30).collect(),
            l1: 3,
            l2: 3,
        }
    }

    /// Default grid for a mode
    #[must_use]
    pub fn default_for(mode: ExperimentMode) -> Self {
        match mode {
            ExperimentMode::NpModal => Self::np_modal_default(),
            ExperimentMode::NpClassical => Self::np_classical_default(),
        }
    }

    /// Mode of the grid
    #[must_use]
    pub fn mode(&self) -> ExperimentMode {
        match self {
            Self::NpModal { .. } => ExperimentMode::NpModal,
            Self::NpClassical { .. } => ExperimentMode::NpClassical,
        }
    }

    /// Number of grid points
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::NpModal { k_values } => k_values.len(),
            Self::NpClassical { m_values, .. } => m_values.len(),
        }
    }

    /// Check if the grid has no points
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Grid points for `n` variables, in grid order
    #[must_use]
    pub fn points(&self, n: u32) -> Vec<ParameterPoint> {
        match self {
            Self::NpModal { k_values } => k_values
                .iter()
                .map(|&k| ParameterPoint::NpModal { n, k })
                .collect(),
            Self::NpClassical { m_values, l1, l2 } => m_values
                .iter()
                .map(|&m| ParameterPoint::NpClassical {
                    n,
                    m,
                    l1: *l1,
                    l2: *l2,
                })
                .collect(),
        }
    }
}

/// A dispatched benchmark instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceTask {
    /// Unique 1-based instance id
    pub id: u64,
    /// Replicate index within the parameter point (0-based)
    pub replicate: usize,
    /// Parameter values
    pub point: ParameterPoint,
}

/// Enumerate grid × replicates in deterministic order
///
/// Ids run from 1 in grid order, replicates innermost.
#[must_use]
pub fn enumerate_tasks(grid: &ParameterGrid, n: u32, replicates: usize) -> Vec<InstanceTask> {
    let points = grid.points(n);
    let mut tasks = Vec::with_capacity(points.len() * replicates);
    let mut next_id = 1u64;

    for point in points {
        for replicate in 0..replicates {
            tasks.push(InstanceTask {
                id: next_id,
                replicate,
                point,
            });
            next_id += 1;
        }
    }

    tasks
}

/// How each task seeds its randomness source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SeedPolicy {
    /// Mix wall-clock nanoseconds, process id and instance id
    #[default]
    Entropy,
    /// Derive from a fixed base seed and the instance id (reproducible)
    Fixed(u64),
}

impl SeedPolicy {
    /// Seed for the given instance
    #[must_use]
    pub fn seed_for(&self, instance_id: u64) -> u64 {
        match *self {
            Self::Entropy => {
                let nanos = SystemTime::now()
                    .duration_since(UNIX_EPOCH)
                    .unwrap_or_default()
                    .as_nanos() as u64;
                let pid = u64::from(std::process::id());
                mix(nanos ^ pid.rotate_left(32) ^ instance_id)
            }
            Self::Fixed(base) => mix(base ^ instance_id.wrapping_mul(0x9E37_79B9_7F4A_7C15)),
        }
    }

    /// Fresh randomness source for the given instance
    #[must_use]
    pub fn rng_for(&self, instance_id: u64) -> StdRng {
        StdRng::seed_from_u64(self.seed_for(instance_id))
    }
}

/// SplitMix64 finalizer
fn mix(mut z: u64) -> u64 {
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}
