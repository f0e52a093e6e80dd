//! Outcome records and run summaries

use crate::experiment::{ExperimentMode, InstanceTask, ParameterPoint};
use crate::invoker::{Invocation, Verdict, duration_secs};
use crate::parallel::TaskFailure;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// Result of one benchmark instance: parameter values, id, time and verdict
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutcomeRecord {
    /// Parameter point the instance was generated from
    #[serde(flatten)]
    pub point: ParameterPoint,
    /// Instance id
    pub instance: u64,
    /// Solver-attributable time
    #[serde(with = "duration_secs")]
    pub time: Duration,
    /// Verdict
    pub verdict: Verdict,
}

impl OutcomeRecord {
    /// Record for a task whose solver invocation finished (in any way)
    #[must_use]
    pub fn new(task: &InstanceTask, invocation: &Invocation) -> Self {
        Self {
            point: task.point,
            instance: task.id,
            time: invocation.time,
            verdict: invocation.verdict,
        }
    }

    /// ERROR record with zero time for a task that never reached the solver
    #[must_use]
    pub fn failed(task: &InstanceTask) -> Self {
        Self {
            point: task.point,
            instance: task.id,
            time: Duration::ZERO,
            verdict: Verdict::Error,
        }
    }

    /// Mode of the record
    #[must_use]
    pub fn mode(&self) -> ExperimentMode {
        self.point.mode()
    }

    /// Field values in [`ExperimentMode::columns`] order
    #[must_use]
    pub fn row(&self) -> Vec<String> {
        let mut row = self.point.values();
        row.push(self.instance.to_string());
        row.push(format_secs(self.time));
        row.push(self.verdict.as_str().to_string());
        row
    }
}

/// Render a duration as seconds with microsecond precision
#[must_use]
pub fn format_secs(d: Duration) -> String {
    format!("{:.6}", d.as_secs_f64())
}

/// Verdict counts and timing over a set of records
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerdictCounts {
    /// Number of records
    pub total: usize,
    /// SAT verdicts
    pub sat: usize,
    /// UNSAT verdicts
    pub unsat: usize,
    /// ERROR verdicts
    pub errors: usize,
    /// TIMEOUT verdicts
    pub timeouts: usize,
    /// Sum of solver time
    #[serde(with = "duration_secs")]
    pub total_time: Duration,
    /// Mean solver time
    #[serde(with = "duration_secs")]
    pub avg_time: Duration,
}

impl VerdictCounts {
    /// Count the given records
    #[must_use]
    pub fn from_records<'a>(records: impl IntoIterator<Item = &'a OutcomeRecord>) -> Self {
        let mut counts = Self::default();
        for record in records {
            counts.add(record);
        }
        counts.finish();
        counts
    }

    fn add(&mut self, record: &OutcomeRecord) {
        self.total += 1;
        self.total_time += record.time;
        match record.verdict {
            Verdict::Sat => self.sat += 1,
            Verdict::Unsat => self.unsat += 1,
            Verdict::Error => self.errors += 1,
            Verdict::Timeout => self.timeouts += 1,
        }
    }

    fn finish(&mut self) {
        if let Ok(total) = u32::try_from(self.total)
            && total > 0
        {
            self.avg_time = self.total_time / total;
        }
    }

    /// SAT plus UNSAT
    #[must_use]
    pub fn solved(&self) -> usize {
        self.sat + self.unsat
    }

    /// Solved share as a percentage
    #[must_use]
    pub fn solve_rate(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            (self.solved() as f64 / self.total as f64) * 100.0
        }
    }
}

/// Counts for one parameter point
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PointSummary {
    /// Parameter point
    pub point: ParameterPoint,
    /// Counts over the point's records
    #[serde(flatten)]
    pub counts: VerdictCounts,
}

/// Summary of a benchmark run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    /// Counts over all solver records
    #[serde(flatten)]
    pub counts: VerdictCounts,
    /// Tasks that failed before reaching the solver
    pub failures: usize,
    /// Breakdown per parameter point, sorted by point (ascending parameter
    /// values), independent of grid and completion order
    pub by_point: Vec<PointSummary>,
}

impl RunSummary {
    /// Summarize records and task failures
    #[must_use]
    pub fn from_results(records: &[OutcomeRecord], failures: &[TaskFailure]) -> Self {
        let mut grouped: BTreeMap<ParameterPoint, VerdictCounts> = BTreeMap::new();
        for record in records {
            grouped.entry(record.point).or_default().add(record);
        }

        let by_point = grouped
            .into_iter()
            .map(|(point, mut counts)| {
                counts.finish();
                PointSummary { point, counts }
            })
            .collect();

        Self {
            counts: VerdictCounts::from_records(records),
            failures: failures.len(),
            by_point,
        }
    }

    /// Number of dispatched instances (records plus failures)
    #[must_use]
    pub fn dispatched(&self) -> usize {
        self.counts.total + self.failures
    }
}
