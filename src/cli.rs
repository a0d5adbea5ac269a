//! Command-line surface: `run` sweeps the built-in simulated components,
//! `compare` checks two result documents against each other.
//!
//! Exit codes: 0 when everything passed, 1 on any regression or failed
//! scenario, 2 on usage, configuration or I/O errors.

use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use clap::{Args, Parser, Subcommand, ValueEnum};
use tracing::info;

use crate::{
    HarnessError,
    compare::{Tolerances, compare_baselines},
    config::{
        ComponentSweep, DEFAULT_BASELINE_NAME, DEFAULT_ITERATIONS, DEFAULT_WARMUP_ITERATIONS,
        MissingBaselinePolicy, RunnerConfig, StoreConfig, StoreKind, default_store_path,
        open_store,
    },
    record::{Baseline, LengthBucket},
    report::{render_comparison, render_sweep},
    runner::{BenchmarkRunner, SweepReport},
    store::{BaselineStore, encode_document, read_document},
    synthetic::{SimulatedEmbedder, SimulatedNli},
    target::InferenceTarget,
};

pub const EXIT_PASS: i32 = 0;
pub const EXIT_REGRESSION: i32 = 1;
pub const EXIT_ERROR: i32 = 2;

#[derive(Debug, Parser)]
#[command(
    name = "inferbench",
    version,
    about = "Inference latency/throughput/memory regression harness"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Benchmark components and compare against (or record) a baseline.
    Run(RunArgs),
    /// Compare a results document against a baseline document.
    Compare(CompareArgs),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum Component {
    Embedding,
    Nli,
}

#[derive(Clone, Copy, Debug, PartialEq, Args)]
pub struct ToleranceArgs {
    /// Allowed latency increase, percent.
    #[arg(long, default_value_t = 10.0)]
    pub latency_tolerance: f64,
    /// Allowed throughput decrease, percent.
    #[arg(long, default_value_t = 10.0)]
    pub throughput_tolerance: f64,
    /// Allowed peak memory increase, percent.
    #[arg(long, default_value_t = 10.0)]
    pub memory_tolerance: f64,
}

impl From<ToleranceArgs> for Tolerances {
    fn from(args: ToleranceArgs) -> Self {
        Tolerances {
            latency_pct: args.latency_tolerance,
            throughput_pct: args.throughput_tolerance,
            memory_pct: args.memory_tolerance,
        }
    }
}

#[derive(Debug, Args)]
pub struct RunArgs {
    /// Components to benchmark; repeat or comma-separate. Defaults to all.
    #[arg(long = "component", value_enum, value_delimiter = ',')]
    pub components: Vec<Component>,
    #[arg(long, default_value_t = DEFAULT_ITERATIONS)]
    pub iterations: usize,
    #[arg(long, default_value_t = DEFAULT_WARMUP_ITERATIONS)]
    pub warmup: usize,
    #[arg(long, value_delimiter = ',', default_values_t = [1, 8, 32, 64])]
    pub batch_sizes: Vec<usize>,
    #[arg(
        long,
        value_delimiter = ',',
        value_parser = parse_bucket,
        default_values_t = LengthBucket::ALL
    )]
    pub lengths: Vec<LengthBucket>,
    #[arg(long, value_parser = parse_store_kind, default_value = "json")]
    pub store_kind: StoreKind,
    /// Store location; defaults to $INFERBENCH_STORE or ./bench-baselines.
    #[arg(long)]
    pub store: Option<PathBuf>,
    /// Baseline name prefix; each component uses `<name>-<component>`.
    #[arg(long, default_value = DEFAULT_BASELINE_NAME)]
    pub baseline: String,
    /// Record this run as the new baseline instead of comparing.
    #[arg(long)]
    pub save_baseline: bool,
    /// When comparing and no baseline exists yet, record this run as one.
    #[arg(long)]
    pub establish_missing: bool,
    /// Write this run's records as a results document.
    #[arg(long)]
    pub output: Option<PathBuf>,
    /// Per-call timeout in milliseconds.
    #[arg(long)]
    pub timeout_ms: Option<u64>,
    /// Run scenarios concurrently when the component allows it.
    #[arg(long)]
    pub parallel: bool,
    #[command(flatten)]
    pub tolerances: ToleranceArgs,
}

#[derive(Debug, Args)]
pub struct CompareArgs {
    /// Baseline results document.
    #[arg(long)]
    pub baseline: PathBuf,
    /// Current results document.
    #[arg(long)]
    pub current: PathBuf,
    #[command(flatten)]
    pub tolerances: ToleranceArgs,
}

fn parse_bucket(value: &str) -> Result<LengthBucket, String> {
    value.parse().map_err(|e: HarnessError| e.to_string())
}

fn parse_store_kind(value: &str) -> Result<StoreKind, String> {
    value.parse().map_err(|e: HarnessError| e.to_string())
}

/// Runs the parsed command and returns the process exit code.
pub fn execute(cli: Cli) -> i32 {
    let outcome = match cli.command {
        Command::Run(args) => run_command(&args),
        Command::Compare(args) => compare_command(&args),
    };
    match outcome {
        Ok(true) => EXIT_PASS,
        Ok(false) => EXIT_REGRESSION,
        Err(err) => {
            eprintln!("error: {err}");
            EXIT_ERROR
        }
    }
}

pub fn run_command(args: &RunArgs) -> Result<bool, HarnessError> {
    let store_cfg = StoreConfig::new(
        args.store_kind,
        args.store.clone().unwrap_or_else(default_store_path),
    );
    let store = open_store(&store_cfg)?;
    let sweep = ComponentSweep::new(args.batch_sizes.clone(), args.lengths.clone());

    let components = if args.components.is_empty() {
        vec![Component::Embedding, Component::Nli]
    } else {
        let mut unique = Vec::new();
        for component in &args.components {
            if !unique.contains(component) {
                unique.push(*component);
            }
        }
        unique
    };

    let mut reports = Vec::with_capacity(components.len());
    for component in components {
        let report = match component {
            Component::Embedding => {
                sweep_component(SimulatedEmbedder::default(), store.as_ref(), &sweep, args)?
            }
            Component::Nli => sweep_component(SimulatedNli, store.as_ref(), &sweep, args)?,
        };
        print!("{}", render_sweep(&report));
        reports.push(report);
    }

    if let Some(path) = &args.output {
        let results = Baseline::from_records(
            "current",
            reports
                .iter()
                .flat_map(|r| r.records().into_iter().cloned()),
        );
        write_document(path, &results)?;
        info!(path = %path.display(), records = results.len(), "results written");
    }
    Ok(reports.iter().all(SweepReport::passed))
}

fn sweep_component<T: InferenceTarget + 'static>(
    target: T,
    store: &dyn BaselineStore,
    sweep: &ComponentSweep,
    args: &RunArgs,
) -> Result<SweepReport, HarnessError> {
    let name = format!("{}-{}", args.baseline, target.component());
    let mut config = if args.save_baseline {
        RunnerConfig::baseline(name)
    } else {
        RunnerConfig::compare(name)
    };
    config = config
        .with_iterations(args.iterations)
        .with_warmup(args.warmup)
        .with_tolerances(args.tolerances.into())
        .with_parallel_scenarios(args.parallel);
    if args.establish_missing {
        config = config.with_missing_baseline(MissingBaselinePolicy::Establish);
    }
    if let Some(ms) = args.timeout_ms {
        config = config.with_timeout(Duration::from_millis(ms));
    }
    BenchmarkRunner::new(target, store, config).run(sweep)
}

pub fn compare_command(args: &CompareArgs) -> Result<bool, HarnessError> {
    let baseline = read_document_file(&args.baseline)?;
    let current = read_document_file(&args.current)?;
    let comparison = compare_baselines(&baseline, &current, &args.tolerances.into())?;
    print!("{}", render_comparison(&comparison));
    Ok(comparison.passed())
}

fn read_document_file(path: &Path) -> Result<Baseline, HarnessError> {
    let data = fs::read(path)
        .map_err(|e| HarnessError::storage(format!("read {}: {e}", path.display())))?;
    read_document(&data)
}

fn write_document(path: &Path, baseline: &Baseline) -> Result<(), HarnessError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .map_err(|e| HarnessError::storage(format!("create {}: {e}", parent.display())))?;
    }
    fs::write(path, encode_document(baseline)?)
        .map_err(|e| HarnessError::storage(format!("write {}: {e}", path.display())))
}
