//! Result reporting
//!
//! The result table is a CSV file with one row per instance; its header is
//! the field set of the first record's mode. Besides the table, a run can be
//! reported as a JSON document or a plain text summary.

use crate::experiment::ExperimentMode;
use crate::parallel::{RunOutcome, TaskFailure};
use crate::record::{OutcomeRecord, RunSummary};
use serde::{Deserialize, Serialize};
use std::io::{self, Write};
use std::path::Path;
use thiserror::Error;
use tracing::info;

/// Error type for reporter operations
#[derive(Error, Debug)]
pub enum ReporterError {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    /// There is nothing to tabulate
    #[error("No results to write")]
    NoResults,
    /// Records of different modes cannot share a header
    #[error("Record for instance {instance} is {found}, table is {expected}")]
    MixedModes {
        /// Mode of the first record
        expected: ExperimentMode,
        /// Mode of the offending record
        found: ExperimentMode,
        /// Offending instance
        instance: u64,
    },
}

/// Result type for reporter operations
pub type ReporterResult<T> = Result<T, ReporterError>;

/// Result table file name for a mode
#[must_use]
pub fn results_file_name(mode: ExperimentMode) -> String {
    format!("results_{}.csv", mode.as_str())
}

/// Treatment of tasks that failed before reaching the solver
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailurePolicy {
    /// Add an ERROR row with zero time
    #[default]
    Record,
    /// Leave them out of the table
    Drop,
}

/// Output format for reports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportFormat {
    /// CSV result table
    Csv,
    /// JSON document with summary, failures and (optionally) records
    Json,
    /// Plain text summary
    Text,
}

/// Configuration for report generation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReporterConfig {
    /// Output format
    pub format: ReportFormat,
    /// Failure treatment in the table
    pub failure_policy: FailurePolicy,
    /// Include individual records in JSON and text output
    pub include_details: bool,
}

impl Default for ReporterConfig {
    fn default() -> Self {
        Self {
            format: ReportFormat::Csv,
            failure_policy: FailurePolicy::Record,
            include_details: false,
        }
    }
}

impl ReporterConfig {
    /// Create a new config with the given format
    #[must_use]
    pub fn new(format: ReportFormat) -> Self {
        Self {
            format,
            ..Default::default()
        }
    }

    /// Set the failure policy
    #[must_use]
    pub fn with_failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.failure_policy = policy;
        self
    }

    /// Include individual records
    #[must_use]
    pub fn with_details(mut self, include: bool) -> Self {
        self.include_details = include;
        self
    }
}

/// Tabular view of a run: one row per record, columns by mode
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultTable {
    mode: ExperimentMode,
    rows: Vec<Vec<String>>,
}

impl ResultTable {
    /// Build a table from records; the first record fixes the columns
    pub fn from_records(records: &[OutcomeRecord]) -> ReporterResult<Self> {
        let first = records.first().ok_or(ReporterError::NoResults)?;
        let mode = first.mode();

        let rows = records
            .iter()
            .map(|record| {
                if record.mode() == mode {
                    Ok(record.row())
                } else {
                    Err(ReporterError::MixedModes {
                        expected: mode,
                        found: record.mode(),
                        instance: record.instance,
                    })
                }
            })
            .collect::<ReporterResult<Vec<_>>>()?;

        Ok(Self { mode, rows })
    }

    /// Build the table for a run under a failure policy
    pub fn from_outcome(outcome: &RunOutcome, policy: FailurePolicy) -> ReporterResult<Self> {
        let mut records = outcome.records.clone();
        if policy == FailurePolicy::Record {
            records.extend(outcome.failures.iter().map(|f| OutcomeRecord::failed(&f.task)));
        }
        Self::from_records(&records)
    }

    /// Mode of the table
    #[must_use]
    pub fn mode(&self) -> ExperimentMode {
        self.mode
    }

    /// Column names
    #[must_use]
    pub fn columns(&self) -> &'static [&'static str] {
        self.mode.columns()
    }

    /// Rows, in record order
    #[must_use]
    pub fn rows(&self) -> &[Vec<String>] {
        &self.rows
    }

    /// Number of rows
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Check if the table has no rows
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Write the table as CSV
    pub fn write_csv<W: Write>(&self, writer: &mut W) -> ReporterResult<()> {
        writeln!(writer, "{}", self.columns().join(","))?;
        for row in &self.rows {
            let fields: Vec<String> = row.iter().map(|f| csv_escape(f)).collect();
            writeln!(writer, "{}", fields.join(","))?;
        }
        Ok(())
    }
}

/// Full JSON report
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Report {
    /// Experiment mode, if any record exists
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mode: Option<ExperimentMode>,
    /// Run summary
    pub summary: RunSummary,
    /// Tasks that failed before reaching the solver
    pub failures: Vec<TaskFailure>,
    /// Individual records (if configured)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub records: Option<Vec<OutcomeRecord>>,
}

/// Result reporter
pub struct Reporter {
    config: ReporterConfig,
}

impl Reporter {
    /// Create a new reporter with the given configuration
    #[must_use]
    pub fn new(config: ReporterConfig) -> Self {
        Self { config }
    }

    /// Create a CSV reporter
    #[must_use]
    pub fn csv() -> Self {
        Self::new(ReporterConfig::new(ReportFormat::Csv))
    }

    /// Create a JSON reporter
    #[must_use]
    pub fn json() -> Self {
        Self::new(ReporterConfig::new(ReportFormat::Json))
    }

    /// Create a plain text reporter
    #[must_use]
    pub fn text() -> Self {
        Self::new(ReporterConfig::new(ReportFormat::Text))
    }

    /// Generate a report from a run
    #[must_use]
    pub fn generate_report(&self, outcome: &RunOutcome) -> Report {
        Report {
            mode: outcome
                .records
                .first()
                .map(OutcomeRecord::mode)
                .or_else(|| outcome.failures.first().map(|f| f.task.point.mode())),
            summary: outcome.summary(),
            failures: outcome.failures.clone(),
            records: self
                .config
                .include_details
                .then(|| outcome.records.clone()),
        }
    }

    /// Write the result table to `path` in one go
    ///
    /// Fails with [`ReporterError::NoResults`] when there is no row to write;
    /// in that case no file is created.
    pub fn write_results(&self, outcome: &RunOutcome, path: impl AsRef<Path>) -> ReporterResult<()> {
        let path = path.as_ref();
        let table = ResultTable::from_outcome(outcome, self.config.failure_policy)?;

        let mut buf = Vec::new();
        table.write_csv(&mut buf)?;
        std::fs::write(path, buf)?;

        info!("Wrote {} results to {}", table.len(), path.display());
        Ok(())
    }

    /// Write report to a writer
    pub fn write_report<W: Write>(&self, outcome: &RunOutcome, writer: &mut W) -> ReporterResult<()> {
        match self.config.format {
            ReportFormat::Csv => {
                ResultTable::from_outcome(outcome, self.config.failure_policy)?.write_csv(writer)
            }
            ReportFormat::Json => self.write_json(outcome, writer),
            ReportFormat::Text => self.write_text(outcome, writer),
        }
    }

    /// Write report to a file
    pub fn write_to_file(&self, outcome: &RunOutcome, path: impl AsRef<Path>) -> ReporterResult<()> {
        let mut buf = Vec::new();
        self.write_report(outcome, &mut buf)?;
        std::fs::write(path, buf)?;
        Ok(())
    }

    /// Write report to a string
    pub fn to_string(&self, outcome: &RunOutcome) -> ReporterResult<String> {
        let mut buf = Vec::new();
        self.write_report(outcome, &mut buf)?;
        Ok(String::from_utf8_lossy(&buf).to_string())
    }

    fn write_json<W: Write>(&self, outcome: &RunOutcome, writer: &mut W) -> ReporterResult<()> {
        let report = self.generate_report(outcome);
        serde_json::to_writer_pretty(&mut *writer, &report)?;
        writeln!(writer)?;
        Ok(())
    }

    fn write_text<W: Write>(&self, outcome: &RunOutcome, writer: &mut W) -> ReporterResult<()> {
        let summary = outcome.summary();
        let counts = &summary.counts;

        writeln!(writer, "=== Benchmark Results ===")?;
        writeln!(writer, "Instances:        {}", summary.dispatched())?;
        writeln!(
            writer,
            "Solved:           {} ({:.1}%)",
            counts.solved(),
            counts.solve_rate()
        )?;
        writeln!(writer, "  SAT:            {}", counts.sat)?;
        writeln!(writer, "  UNSAT:          {}", counts.unsat)?;
        writeln!(writer, "Timeout:          {}", counts.timeouts)?;
        writeln!(writer, "Errors:           {}", counts.errors)?;
        writeln!(writer, "Task failures:    {}", summary.failures)?;
        writeln!(writer)?;
        writeln!(
            writer,
            "Total time:       {:.3}s",
            counts.total_time.as_secs_f64()
        )?;
        writeln!(
            writer,
            "Average time:     {:.3}s",
            counts.avg_time.as_secs_f64()
        )?;

        if summary.by_point.len() > 1 {
            writeln!(writer)?;
            writeln!(writer, "=== By Parameter Point ===")?;
            for point in &summary.by_point {
                let c = &point.counts;
                writeln!(
                    writer,
                    "{:28} {:5} instances, {:3} SAT, {:3} UNSAT, {:3} TIMEOUT, {:3} ERROR, avg {:.3}s",
                    point.point.to_string(),
                    c.total,
                    c.sat,
                    c.unsat,
                    c.timeouts,
                    c.errors,
                    c.avg_time.as_secs_f64()
                )?;
            }
        }

        if !outcome.failures.is_empty() {
            writeln!(writer)?;
            writeln!(writer, "=== Failures ===")?;
            for failure in &outcome.failures {
                writeln!(writer, "{failure}")?;
            }
        }

        if self.config.include_details {
            writeln!(writer)?;
            writeln!(writer, "=== Individual Results ===")?;
            for record in &outcome.records {
                writeln!(
                    writer,
                    "instance_{:<8} {:28} {:8} {:.3}s",
                    record.instance,
                    record.point.to_string(),
                    record.verdict.as_str(),
                    record.time.as_secs_f64()
                )?;
            }
        }

        Ok(())
    }
}

/// Escape a string for CSV output
fn csv_escape(s: &str) -> String {
    if s.contains(',') || s.contains('"') || s.contains('\n') {
        format!("\"{}\"", s.replace('"', "\"\""))
    } else {
        s.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::experiment::{InstanceTask, ParameterPoint};
    use crate::invoker::Verdict;
    use crate::parallel::FailureStage;
    use std::time::Duration;
    use tempfile::tempdir;

    fn modal(instance: u64, verdict: Verdict, millis: u64) -> OutcomeRecord {
        OutcomeRecord {
            point: ParameterPoint::NpModal { n: 20, k: 4 },
            instance,
            time: Duration::from_millis(millis),
            verdict,
        }
    }

    fn failure(id: u64) -> TaskFailure {
        TaskFailure {
            task: InstanceTask {
                id,
                replicate: 0,
                point: ParameterPoint::NpModal { n: 20, k: 4 },
            },
            stage: FailureStage::Generate,
            message: "rejection limit".to_string(),
        }
    }

    fn outcome() -> RunOutcome {
        RunOutcome {
            records: vec![modal(2, Verdict::Sat, 250), modal(1, Verdict::Timeout, 1000)],
            failures: vec![failure(3)],
        }
    }

    #[test]
    fn test_csv_escape() {
        assert_eq!(csv_escape("simple"), "simple");
        assert_eq!(csv_escape("a,b"), "\"a,b\"");
        assert_eq!(csv_escape("say \"hi\""), "\"say \"\"hi\"\"\"");
    }

    #[test]
    fn test_results_file_name() {
        assert_eq!(results_file_name(ExperimentMode::NpModal), "results_np-modal.csv");
    }

    #[test]
    fn test_table_with_failure_rows() {
        let table = ResultTable::from_outcome(&outcome(), FailurePolicy::Record).unwrap();
        assert_eq!(table.len(), 3);

        let mut buf = Vec::new();
        table.write_csv(&mut buf).unwrap();
        let csv = String::from_utf8(buf).unwrap();
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines[0], "n,k,instance,time,verdict");
        assert_eq!(lines[1], "20,4,2,0.250000,SAT");
        assert_eq!(lines[2], "20,4,1,1.000000,TIMEOUT");
        assert_eq!(lines[3], "20,4,3,0.000000,ERROR");
    }

    #[test]
    fn test_table_drop_policy() {
        let table = ResultTable::from_outcome(&outcome(), FailurePolicy::Drop).unwrap();
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn test_empty_table_fails() {
        assert!(matches!(
            ResultTable::from_records(&[]),
            Err(ReporterError::NoResults)
        ));

        let only_failures = RunOutcome {
            records: vec![],
            failures: vec![failure(1)],
        };
        assert!(matches!(
            ResultTable::from_outcome(&only_failures, FailurePolicy::Drop),
            Err(ReporterError::NoResults)
        ));
        assert_eq!(
            ResultTable::from_outcome(&only_failures, FailurePolicy::Record)
                .unwrap()
                .len(),
            1
        );
    }

    #[test]
    fn test_mixed_modes_rejected() {
        let records = vec![
            modal(1, Verdict::Sat, 1),
            OutcomeRecord {
                point: ParameterPoint::NpClassical {
                    n: 20,
                    m: 30,
                    l1: 3,
                    l2: 3,
                },
                instance: 2,
                time: Duration::ZERO,
                verdict: Verdict::Sat,
            },
        ];
        assert!(matches!(
            ResultTable::from_records(&records),
            Err(ReporterError::MixedModes { instance: 2, .. })
        ));
    }

    #[test]
    fn test_write_results_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(results_file_name(ExperimentMode::NpModal));

        Reporter::csv().write_results(&outcome(), &path).unwrap();
        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content.lines().count(), 4);

        let empty = dir.path().join("empty.csv");
        assert!(Reporter::csv().write_results(&RunOutcome::default(), &empty).is_err());
        assert!(!empty.exists());
    }

    #[test]
    fn test_json_report() {
        let reporter = Reporter::new(ReporterConfig::new(ReportFormat::Json).with_details(true));
        let json = reporter.to_string(&outcome()).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();

        assert_eq!(value["mode"], "np-modal");
        assert_eq!(value["summary"]["sat"], 1);
        assert_eq!(value["summary"]["timeouts"], 1);
        assert_eq!(value["summary"]["failures"], 1);
        assert_eq!(value["failures"][0]["stage"], "generate");
        assert_eq!(value["records"].as_array().unwrap().len(), 2);
    }

    #[test]
    fn test_text_report() {
        let text = Reporter::text().to_string(&outcome()).unwrap();
        assert!(text.contains("Instances:        3"));
        assert!(text.contains("Timeout:          1"));
        assert!(text.contains("=== Failures ==="));
        assert!(text.contains("instance 3"));
    }
}
