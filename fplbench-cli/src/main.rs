//! fplbench CLI - Command-line driver for fplbench experiments

use anyhow::{Context, Result, bail};
use clap::{Args as ClapArgs, Parser, Subcommand, ValueEnum};
use fplbench::{
    ExperimentConfig, ExperimentMode, FailurePolicy, ParallelProgress, ParameterGrid,
    ProgressCallback, ReportFormat, Reporter, ReporterConfig, available_cores,
};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;
use tracing::{Level, info};
use tracing_subscriber::FmtSubscriber;

/// Configuration file structure
///
/// Experiment settings sit at the top level next to `verbosity`; anything
/// left out keeps its default.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct CliConfig {
    /// Default verbosity level
    #[serde(default)]
    verbosity: Option<String>,
    /// Experiment settings
    #[serde(flatten)]
    experiment: ExperimentConfig,
}

impl CliConfig {
    /// Load configuration from a YAML file, or defaults when none is given
    fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let contents = fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        serde_yaml::from_str(&contents)
            .with_context(|| format!("failed to parse config file {}", path.display()))
    }

    /// Apply the file's verbosity unless one was given on the command line
    fn merge_with_args(&self, args: &mut Args) {
        if args.verbosity == Verbosity::Normal
            && let Some(ref v) = self.verbosity
            && let Ok(level) = Verbosity::from_str(v, true)
        {
            args.verbosity = level;
        }
    }
}

/// Verbosity level
#[derive(Debug, Clone, Copy, ValueEnum, PartialEq, Eq, PartialOrd, Ord)]
enum Verbosity {
    /// Errors only, no progress or report
    Quiet,
    /// Progress and report, warnings
    Normal,
    /// Per-instance log lines
    Verbose,
    /// Debug output, including solver output
    Debug,
    /// Trace output
    Trace,
}

/// Report format printed after a run
#[derive(Debug, Clone, Copy, ValueEnum, PartialEq, Eq)]
enum ReportKind {
    /// Plain text summary
    Text,
    /// JSON summary
    Json,
    /// The CSV result table
    Csv,
}

impl From<ReportKind> for ReportFormat {
    fn from(kind: ReportKind) -> Self {
        match kind {
            ReportKind::Text => ReportFormat::Text,
            ReportKind::Json => ReportFormat::Json,
            ReportKind::Csv => ReportFormat::Csv,
        }
    }
}

/// Random probabilistic Łukasiewicz benchmarks and parallel solver runs
#[derive(Parser, Debug, Clone)]
#[command(name = "fplbench")]
#[command(version)]
#[command(about = "Generate random probabilistic Łukasiewicz benchmarks and run a solver on them")]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// YAML configuration file
    #[arg(short, long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Verbosity level
    #[arg(short, long, value_enum, default_value = "normal", global = true)]
    verbosity: Verbosity,

    /// Quiet mode (same as --verbosity quiet)
    #[arg(short, long, global = true)]
    quiet: bool,
}

#[derive(Subcommand, Debug, Clone)]
enum Command {
    /// Generate instances and run the solver on each of them
    Run(RunArgs),
    /// Generate and write instances without running the solver
    Generate(ExperimentArgs),
    /// Print the effective configuration as YAML
    ShowConfig(ExperimentArgs),
}

#[derive(ClapArgs, Debug, Clone)]
struct RunArgs {
    #[command(flatten)]
    experiment: ExperimentArgs,

    /// Report printed after the run
    #[arg(long, value_enum, default_value = "text")]
    report: ReportKind,

    /// Include individual results in the report
    #[arg(long)]
    details: bool,

    /// Also write the report, in the `--report` format, to this file
    #[arg(long, value_name = "FILE")]
    summary_file: Option<PathBuf>,
}

/// Experiment settings overriding the configuration file
#[derive(ClapArgs, Debug, Clone, Default)]
struct ExperimentArgs {
    /// Experiment mode (np-modal or np-classical)
    #[arg(short, long)]
    mode: Option<ExperimentMode>,

    /// Output directory for instances and results
    #[arg(short, long, value_name = "DIR")]
    output_dir: Option<PathBuf>,

    /// Number of classical variables
    #[arg(short = 'n', long)]
    variables: Option<u32>,

    /// Instances per parameter point
    #[arg(short, long)]
    replicates: Option<usize>,

    /// Timeout per instance in seconds
    #[arg(short, long, value_name = "SECS")]
    timeout: Option<f64>,

    /// Share of the host's cores used for solver workers
    #[arg(long, value_name = "FRACTION")]
    pool_fraction: Option<f64>,

    /// Exact number of solver workers
    #[arg(short = 'j', long)]
    workers: Option<usize>,

    /// Solver binary
    #[arg(long, value_name = "PATH")]
    solver: Option<PathBuf>,

    /// Auxiliary pseudo-boolean solver binary
    #[arg(long, value_name = "PATH")]
    pb_solver: Option<PathBuf>,

    /// Core-pinning utility
    #[arg(long, value_name = "PATH")]
    pin_utility: Option<PathBuf>,

    /// Do not pin solver runs to cores
    #[arg(long)]
    no_pin: bool,

    /// Base seed for reproducible instances
    #[arg(long)]
    seed: Option<u64>,

    /// Values of k (np-modal), comma separated
    #[arg(long, value_delimiter = ',', num_args = 1..)]
    k_values: Option<Vec<usize>>,

    /// Values of m (np-classical), comma separated
    #[arg(long, value_delimiter = ',', num_args = 1..)]
    m_values: Option<Vec<usize>>,

    /// Modal atoms per simple L-clause (np-classical)
    #[arg(long)]
    l1: Option<usize>,

    /// Simple L-clauses per formula (np-classical)
    #[arg(long)]
    l2: Option<usize>,

    /// Instance file extension
    #[arg(long)]
    extension: Option<String>,

    /// Leave failed tasks out of the result table
    #[arg(long)]
    drop_failures: bool,
}

impl ExperimentArgs {
    fn classical_overrides(&self) -> bool {
        self.m_values.is_some() || self.l1.is_some() || self.l2.is_some()
    }

    /// Apply the command-line overrides to `config`
    fn apply(&self, mut config: ExperimentConfig) -> Result<ExperimentConfig> {
        let mode = match self.mode {
            Some(mode) => mode,
            None if self.k_values.is_some() => ExperimentMode::NpModal,
            None if self.classical_overrides() => ExperimentMode::NpClassical,
            None => config.mode(),
        };
        config = config.with_mode(mode);

        match &mut config.grid {
            ParameterGrid::NpModal { k_values } => {
                if self.classical_overrides() {
                    bail!("--m-values, --l1 and --l2 only apply to np-classical");
                }
                if let Some(ref k) = self.k_values {
                    k_values.clone_from(k);
                }
            }
            ParameterGrid::NpClassical { m_values, l1, l2 } => {
                if self.k_values.is_some() {
                    bail!("--k-values only applies to np-modal");
                }
                if let Some(ref m) = self.m_values {
                    m_values.clone_from(m);
                }
                if let Some(v) = self.l1 {
                    *l1 = v;
                }
                if let Some(v) = self.l2 {
                    *l2 = v;
                }
            }
        }

        if let Some(ref dir) = self.output_dir {
            config.output_dir.clone_from(dir);
        }
        if let Some(n) = self.variables {
            config.n = n;
        }
        if let Some(r) = self.replicates {
            config.replicates = r;
        }
        if let Some(secs) = self.timeout {
            config.timeout = Duration::try_from_secs_f64(secs)
                .with_context(|| format!("invalid timeout {secs}"))?;
        }
        if let Some(fraction) = self.pool_fraction {
            config.pool_fraction = fraction;
        }
        if let Some(workers) = self.workers {
            config.workers = Some(workers);
        }
        if let Some(ref solver) = self.solver {
            config.solver.clone_from(solver);
        }
        if let Some(ref pb_solver) = self.pb_solver {
            config.pb_solver.clone_from(pb_solver);
        }
        if let Some(ref utility) = self.pin_utility {
            config.pin_utility.clone_from(utility);
        }
        if self.no_pin {
            config.pin_cores = false;
        }
        if let Some(seed) = self.seed {
            config.seed = Some(seed);
        }
        if let Some(ref ext) = self.extension {
            config.extension.clone_from(ext);
        }
        if self.drop_failures {
            config.failure_policy = FailurePolicy::Drop;
        }

        Ok(config)
    }
}

fn main() -> ExitCode {
    let mut args = Args::parse();

    let file_config = match CliConfig::load(args.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {e:#}");
            return ExitCode::FAILURE;
        }
    };
    file_config.merge_with_args(&mut args);

    let verbosity = if args.quiet {
        Verbosity::Quiet
    } else {
        args.verbosity
    };

    if let Err(e) = init_logging(verbosity) {
        eprintln!("Error: {e:#}");
        return ExitCode::FAILURE;
    }

    let result = match &args.command {
        Command::Run(run_args) => run(file_config.experiment, run_args, verbosity),
        Command::Generate(exp_args) => generate(file_config.experiment, exp_args, verbosity),
        Command::ShowConfig(exp_args) => show_config(file_config.experiment, exp_args),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

/// Install the global tracing subscriber on stderr
fn init_logging(verbosity: Verbosity) -> Result<()> {
    let level = match verbosity {
        Verbosity::Quiet => Level::ERROR,
        Verbosity::Normal => Level::WARN,
        Verbosity::Verbose => Level::INFO,
        Verbosity::Debug => Level::DEBUG,
        Verbosity::Trace => Level::TRACE,
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("failed to set tracing subscriber")
}

fn progress_printer() -> ProgressCallback {
    Box::new(|p: ParallelProgress| {
        let time = p
            .time
            .map_or_else(|| "failed".to_string(), |t| format!("{:.3}s", t.as_secs_f64()));
        eprintln!(
            "[{}/{}] instance {} done ({}), {} solved, {} timeouts, {} errors, {:.1}s elapsed",
            p.completed,
            p.total,
            p.instance,
            time,
            p.solved,
            p.timeouts,
            p.errors,
            p.elapsed.as_secs_f64()
        );
    })
}

fn run(config: ExperimentConfig, args: &RunArgs, verbosity: Verbosity) -> Result<()> {
    let config = args.experiment.apply(config)?;
    let cores = available_cores();
    config
        .validate_for_host(cores)
        .context("invalid configuration")?;

    let tasks = config.tasks();
    info!(
        "{}: {} instances ({} points x {} replicates) on {} of {} cores, timeout {:?}",
        config.mode(),
        tasks.len(),
        config.grid.len(),
        config.replicates,
        config.pool_size(cores),
        cores,
        config.timeout
    );

    let callback = (verbosity >= Verbosity::Normal).then(progress_printer);
    let outcome = config
        .runner(cores)
        .run_with_progress(&tasks, &config.invoker(cores), callback)
        .context("failed to start the run")?;

    let results_path = config.results_path();
    Reporter::new(ReporterConfig::new(ReportFormat::Csv).with_failure_policy(config.failure_policy))
        .write_results(&outcome, &results_path)
        .with_context(|| format!("failed to write {}", results_path.display()))?;

    if let Some(ref path) = args.summary_file {
        Reporter::new(
            ReporterConfig::new(args.report.into())
                .with_failure_policy(config.failure_policy)
                .with_details(true),
        )
        .write_to_file(&outcome, path)
            .with_context(|| format!("failed to write {}", path.display()))?;
    }

    if verbosity > Verbosity::Quiet {
        let reporter = Reporter::new(
            ReporterConfig::new(args.report.into())
                .with_failure_policy(config.failure_policy)
                .with_details(args.details),
        );
        print!("{}", reporter.to_string(&outcome)?);
        if args.report == ReportKind::Text {
            println!();
            println!("Results written to {}", results_path.display());
        }
    }

    Ok(())
}

fn generate(config: ExperimentConfig, args: &ExperimentArgs, verbosity: Verbosity) -> Result<()> {
    let config = args.apply(config)?;
    config.validate().context("invalid configuration")?;

    let cores = available_cores();
    let outcome = config
        .runner(cores)
        .materialize(&config.tasks())
        .context("failed to generate instances")?;

    for failure in &outcome.failures {
        eprintln!("{failure}");
    }
    if verbosity > Verbosity::Quiet {
        println!(
            "Wrote {} instances to {} ({} failed)",
            outcome.instances.len(),
            config.output_dir.display(),
            outcome.failures.len()
        );
    }

    if outcome.instances.is_empty() {
        bail!("no instances were generated");
    }
    Ok(())
}

fn show_config(config: ExperimentConfig, args: &ExperimentArgs) -> Result<()> {
    let config = args.apply(config)?;
    print!("{}", serde_yaml::to_string(&config).context("failed to serialize configuration")?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_args_parse() {
        let args = Args::try_parse_from([
            "fplbench",
            "run",
            "--mode",
            "np-modal",
            "--k-values",
            "1,2,3",
            "-n",
            "10",
            "-t",
            "2.5",
            "--no-pin",
        ])
        .unwrap();

        let Command::Run(run_args) = args.command else {
            panic!("expected run");
        };
        let config = run_args.experiment.apply(ExperimentConfig::default()).unwrap();
        assert_eq!(config.mode(), ExperimentMode::NpModal);
        assert_eq!(config.grid, ParameterGrid::NpModal { k_values: vec![1, 2, 3] });
        assert_eq!(config.n, 10);
        assert_eq!(config.timeout, Duration::from_millis(2500));
        assert!(!config.pin_cores);
    }

    #[test]
    fn test_grid_overrides_imply_mode() {
        let args = ExperimentArgs {
            k_values: Some(vec![4]),
            ..Default::default()
        };
        let config = args.apply(ExperimentConfig::default()).unwrap();
        assert_eq!(config.mode(), ExperimentMode::NpModal);

        let args = ExperimentArgs {
            l1: Some(2),
            ..Default::default()
        };
        let config = args
            .apply(ExperimentConfig::for_mode(ExperimentMode::NpModal))
            .unwrap();
        match config.grid {
            ParameterGrid::NpClassical { l1, l2, .. } => assert_eq!((l1, l2), (2, 3)),
            other => panic!("unexpected grid {other:?}"),
        }
    }

    #[test]
    fn test_conflicting_grid_overrides() {
        let args = ExperimentArgs {
            mode: Some(ExperimentMode::NpModal),
            m_values: Some(vec![30]),
            ..Default::default()
        };
        assert!(args.apply(ExperimentConfig::default()).is_err());
    }

    #[test]
    fn test_config_file_merge() {
        let yaml = "verbosity: debug\nn: 7\nreplicates: 2\ngrid:\n  mode: np-modal\n  k_values: [1, 5]\n";
        let file: CliConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(file.experiment.n, 7);
        assert_eq!(file.experiment.replicates, 2);
        assert_eq!(file.experiment.mode(), ExperimentMode::NpModal);
        assert_eq!(file.experiment.timeout, Duration::from_secs(7200));

        let mut args = Args::try_parse_from(["fplbench", "generate"]).unwrap();
        file.merge_with_args(&mut args);
        assert_eq!(args.verbosity, Verbosity::Debug);

        let mut args = Args::try_parse_from(["fplbench", "-v", "quiet", "generate"]).unwrap();
        file.merge_with_args(&mut args);
        assert_eq!(args.verbosity, Verbosity::Quiet);
    }

    #[test]
    fn test_invalid_timeout() {
        let args = ExperimentArgs {
            timeout: Some(-1.0),
            ..Default::default()
        };
        assert!(args.apply(ExperimentConfig::default()).is_err());
    }
}
