//! boutmix CLI

use anyhow::{Context, Result};
use boutmix::config::{RunConfig, RunConfigBuilder, Sampling};
use boutmix::pipeline::{self, TrainMode};
use boutmix::storage::load_dataset_store;
use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "boutmix")]
#[command(about = "boutmix - behavioral state discovery with Gaussian mixtures")]
#[command(version)]
struct Cli {
    /// Log filter used when RUST_LOG is unset (e.g. info, debug, boutmix=trace)
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Score candidate cluster counts by held-out log-likelihood
    Validate {
        #[command(flatten)]
        run: RunArgs,

        /// Smallest cluster count to score
        #[arg(long)]
        k_min: Option<usize>,

        /// Largest cluster count to score (inclusive)
        #[arg(long)]
        k_max: Option<usize>,

        /// Repetitions per cluster count
        #[arg(long)]
        repetitions: Option<usize>,

        /// Run trials one after another instead of on the thread pool
        #[arg(long)]
        sequential: bool,
    },

    /// Fit (or load) the chosen model and summarise one condition
    Train {
        #[command(flatten)]
        run: RunArgs,

        /// Fit a new model or load saved parameters
        #[arg(long, value_enum, default_value = "learn")]
        mode: ModeArg,
    },
}

#[derive(Args)]
struct RunArgs {
    /// JSON run configuration; flags below override its fields
    #[arg(long)]
    config: Option<PathBuf>,

    /// Base random seed
    #[arg(long)]
    seed: Option<u64>,

    /// Number of conditions to load
    #[arg(long)]
    conditions: Option<usize>,

    /// Cluster count of the final model
    #[arg(long)]
    clusters: Option<usize>,

    /// Condition to analyse after training
    #[arg(long)]
    condition: Option<usize>,

    /// Training rows drawn per condition
    #[arg(long)]
    train_size: Option<usize>,

    /// Draw training rows with replacement
    #[arg(long)]
    with_replacement: bool,

    /// Directory holding the per-condition Parquet files
    #[arg(long)]
    data: Option<PathBuf>,

    /// Directory for reports and model parameters
    #[arg(long)]
    out: Option<PathBuf>,

    /// Base name of the saved model files
    #[arg(long)]
    savename: Option<String>,
}

#[derive(Clone, Copy, ValueEnum)]
enum ModeArg {
    Learn,
    Load,
}

impl From<ModeArg> for TrainMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Learn => Self::Learn,
            ModeArg::Load => Self::Load,
        }
    }
}

impl RunArgs {
    fn builder(&self) -> Result<RunConfigBuilder> {
        let base = match &self.config {
            Some(path) => RunConfig::from_json_file(path)
                .with_context(|| format!("reading config {}", path.display()))?,
            None => RunConfig::default(),
        };
        let mut builder = RunConfigBuilder::from_config(base);
        if let Some(seed) = self.seed {
            builder = builder.seed(seed);
        }
        if let Some(n) = self.conditions {
            builder = builder.n_conditions(n);
        }
        if let Some(k) = self.clusters {
            builder = builder.n_clusters(k);
        }
        if let Some(c) = self.condition {
            builder = builder.condition(c);
        }
        if let Some(n) = self.train_size {
            builder = builder.train_size(n);
        }
        if self.with_replacement {
            builder = builder.sampling(Sampling::WithReplacement);
        }
        if let Some(dir) = &self.data {
            builder = builder.data_dir(dir);
        }
        if let Some(dir) = &self.out {
            builder = builder.out_dir(dir);
        }
        if let Some(name) = &self.savename {
            builder = builder.savename(name);
        }
        Ok(builder)
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(false).init();

    match cli.command {
        Commands::Validate { run, k_min, k_max, repetitions, sequential } => {
            let mut builder = run.builder()?;
            if k_min.is_some() || k_max.is_some() {
                let defaults = RunConfig::default();
                let lo = k_min.unwrap_or_else(|| defaults.cluster_counts()[0]);
                let hi = k_max.unwrap_or_else(|| defaults.cluster_counts().iter().copied().max().unwrap_or(lo));
                builder = builder.cluster_counts(lo..=hi);
            }
            if let Some(r) = repetitions {
                builder = builder.repetitions(r);
            }
            if sequential {
                builder = builder.parallel(false);
            }
            cmd_validate(&builder.build()?)
        }
        Commands::Train { run, mode } => cmd_train(&run.builder()?.build()?, mode.into()),
    }
}

fn cmd_validate(config: &RunConfig) -> Result<()> {
    let store = load_dataset_store(config.data_dir(), config.n_conditions())
        .with_context(|| format!("loading datasets from {}", config.data_dir().display()))?;
    let report = pipeline::run_selection(&store, config)?;

    println!("{:>8} {:>16} {:>12} {:>9}", "clusters", "mean held-out LL", "std", "failures");
    for s in report.summaries() {
        println!("{:>8} {:>16.3} {:>12.3} {:>9}", s.cluster_count, s.mean, s.std, s.failures);
    }
    Ok(())
}

fn cmd_train(config: &RunConfig, mode: TrainMode) -> Result<()> {
    let store = load_dataset_store(config.data_dir(), config.n_conditions())
        .with_context(|| format!("loading datasets from {}", config.data_dir().display()))?;
    let model = pipeline::learn_or_load(&store, config, mode)?;
    let report = pipeline::analyze(&model, &store, config)?;
    let path = pipeline::write_kinematic_report(&report, config)?;

    println!("condition {} occupancy: {:?}", report.condition, report.occupancy);
    println!("kinematics written to {}", path.display());
    Ok(())
}
