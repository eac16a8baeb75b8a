use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use chrono::{Local, NaiveDateTime};
use clap::{Args, Parser, Subcommand};
use serde::de::DeserializeOwned;
use tracing::{Level, info};
use tracing_subscriber::FmtSubscriber;

use scout_engine::cluster::{self, DEFAULT_SEED, Estimator};
use scout_engine::criteria::{self, Criteria};
use scout_engine::normalize::{self, RollingOptions, RollingReduction, StatCategories};
use scout_engine::rating::{self, RatingConfig};
use scout_engine::reduce;
use scout_engine::similarity::{self, Target};
use scout_engine::standardize::Imputation;
use scout_engine::Dataset;

/// Scouting analytics over player and team statistics
#[derive(Parser, Debug)]
#[command(name = "scout_engine")]
#[command(about = "Filter, compare, cluster and rate football players", long_about = None)]
struct Cli {
    /// Log level
    #[arg(long, default_value = "warn", global = true)]
    log_level: String,

    #[command(flatten)]
    output: OutputArgs,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args, Debug)]
struct OutputArgs {
    /// Write the resulting dataset to this file instead of stdout
    #[arg(long, global = true)]
    out: Option<PathBuf>,

    /// Write a dated `<basename>_<YYYY_MM_DD_HH_MM>.json` into this directory
    #[arg(long, global = true, conflicts_with = "out")]
    out_dir: Option<PathBuf>,

    /// File name prefix used with --out-dir
    #[arg(long, global = true, default_value = "scout")]
    basename: String,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Stack datasets from several sources into one
    Combine {
        inputs: Vec<PathBuf>,
        /// Label column recording each row's source file stem
        #[arg(long)]
        tag: Option<String>,
    },
    /// Keep rows meeting every threshold of a criteria document
    Filter {
        input: PathBuf,
        #[arg(long)]
        criteria: PathBuf,
    },
    /// Nearest records to a target in standardized stat space
    Similar {
        input: PathBuf,
        /// Identifier of the target record (row index with --row)
        #[arg(long)]
        target: String,
        #[arg(long)]
        row: bool,
        #[arg(long, value_delimiter = ',', required = true)]
        columns: Vec<String>,
        #[arg(long, default_value_t = 10)]
        num: usize,
        /// Fill nulls with the column mean instead of failing
        #[arg(long)]
        impute: bool,
    },
    /// Rescale cumulative stats to per-90-minute rates
    Per90 {
        input: PathBuf,
        #[arg(long, value_delimiter = ',', required = true)]
        columns: Vec<String>,
    },
    /// Trailing moving aggregates over row order
    Rolling {
        input: PathBuf,
        #[arg(long, value_delimiter = ',', required = true)]
        columns: Vec<String>,
        #[arg(long)]
        window: usize,
        #[arg(long, default_value_t = 1)]
        min_periods: usize,
        /// Sum instead of mean
        #[arg(long)]
        sum: bool,
        #[arg(long)]
        drop_incomplete: bool,
    },
    /// Clamp columns into their [alpha, 1 - alpha] quantile range
    Clamp {
        input: PathBuf,
        #[arg(long, value_delimiter = ',', required = true)]
        columns: Vec<String>,
        #[arg(long, default_value_t = 0.05)]
        alpha: f64,
    },
    /// Scale player stats by their team's possession in each match
    Possession {
        players: PathBuf,
        teams: PathBuf,
        #[arg(long, value_delimiter = ',', required = true)]
        columns: Vec<String>,
    },
    /// Keep or drop the stats of named categories
    Categories {
        input: PathBuf,
        #[arg(long)]
        config: PathBuf,
        #[arg(long, value_delimiter = ',', required = true)]
        names: Vec<String>,
        #[arg(long)]
        drop: bool,
    },
    /// Project columns onto principal components
    Reduce {
        input: PathBuf,
        #[arg(long, value_delimiter = ',', required = true)]
        columns: Vec<String>,
        #[arg(long, default_value_t = 1)]
        dims: usize,
    },
    /// Label records with style clusters
    Cluster {
        input: PathBuf,
        #[arg(long, value_delimiter = ',', required = true)]
        columns: Vec<String>,
        /// auto, elbow or kmeans:<k>
        #[arg(long, default_value = "auto")]
        estimator: String,
    },
    /// Add style ratings from a rating config
    Rate {
        input: PathBuf,
        #[arg(long)]
        config: PathBuf,
    },
}

/// Environment overrides, read once at startup.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Settings {
    seed: u64,
    max_k: usize,
}

impl Settings {
    fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let seed = lookup("SCOUT_SEED")
            .and_then(|val| val.parse::<u64>().ok())
            .unwrap_or(DEFAULT_SEED);
        let max_k = lookup("SCOUT_MAX_K")
            .and_then(|val| val.parse::<usize>().ok())
            .unwrap_or(10)
            .max(2);
        Self { seed, max_k }
    }

    fn estimator(&self, name: &str) -> Result<Box<dyn Estimator>> {
        Ok(cluster::builtin_estimator(name, self.seed, self.max_k)?)
    }
}

fn main() -> Result<()> {
    let _ = dotenvy::from_filename(".env.local");
    let _ = dotenvy::from_filename(".env");

    let cli = Cli::parse();

    let log_level = match cli.log_level.as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::WARN,
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let settings = Settings::from_env();
    let result = run(cli.command, &settings)?;
    write_output(&result, &cli.output)
}

fn run(command: Command, settings: &Settings) -> Result<Dataset> {
    let out = match command {
        Command::Combine { inputs, tag } => {
            if inputs.is_empty() {
                bail!("combine needs at least one input");
            }
            let mut parts = Vec::with_capacity(inputs.len());
            for path in &inputs {
                let ds: Dataset = read_json(path)?;
                parts.push(match &tag {
                    Some(column) => normalize::with_label(&ds, column, &file_stem(path)),
                    None => ds,
                });
            }
            normalize::combine(&parts)?
        }
        Command::Filter { input, criteria } => {
            let criteria: Criteria = read_json(&criteria)?;
            criteria::filter(&read_json(&input)?, &criteria)?
        }
        Command::Similar {
            input,
            target,
            row,
            columns,
            num,
            impute,
        } => {
            let target = if row {
                Target::Row(
                    target
                        .parse()
                        .with_context(|| format!("'{target}' is not a row index"))?,
                )
            } else {
                Target::Id(target)
            };
            let imputation = if impute {
                Imputation::ColumnMean
            } else {
                Imputation::Forbid
            };
            similarity::search_similar_with(&read_json(&input)?, &names(&columns), target, num, imputation)?
        }
        Command::Per90 { input, columns } => {
            normalize::adjust_per_90(&read_json(&input)?, &names(&columns))?
        }
        Command::Rolling {
            input,
            columns,
            window,
            min_periods,
            sum,
            drop_incomplete,
        } => {
            let opts = RollingOptions {
                min_periods,
                reduction: if sum {
                    RollingReduction::Sum
                } else {
                    RollingReduction::Mean
                },
                drop_incomplete,
                ..RollingOptions::new(window)
            };
            normalize::rolling_with(&read_json(&input)?, &names(&columns), &opts)?
        }
        Command::Clamp {
            input,
            columns,
            alpha,
        } => normalize::clamp_by_percentiles(&read_json(&input)?, &names(&columns), alpha)?,
        Command::Possession {
            players,
            teams,
            columns,
        } => normalize::adjust_possession(&read_json(&players)?, &read_json(&teams)?, &names(&columns))?,
        Command::Categories {
            input,
            config,
            names: categories,
            drop,
        } => {
            let config: StatCategories = read_json(&config)?;
            normalize::select_categories(&read_json(&input)?, &config, &names(&categories), !drop)?
        }
        Command::Reduce {
            input,
            columns,
            dims,
        } => reduce::reduce(&read_json(&input)?, &names(&columns), dims)?,
        Command::Cluster {
            input,
            columns,
            estimator,
        } => {
            let estimator = settings.estimator(&estimator)?;
            info!(estimator = estimator.name(), seed = settings.seed, "clustering");
            cluster::cluster_with(&read_json(&input)?, &names(&columns), estimator.as_ref())?
        }
        Command::Rate { input, config } => {
            let config: RatingConfig = read_json(&config)?;
            rating::estimate_style_ratings(&read_json(&input)?, &config)?
        }
    };
    Ok(out)
}

fn names(columns: &[String]) -> Vec<&str> {
    columns.iter().map(String::as_str).collect()
}

fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("failed to parse {}", path.display()))
}

fn write_output(dataset: &Dataset, output: &OutputArgs) -> Result<()> {
    let path = match (&output.out, &output.out_dir) {
        (Some(path), _) => path.clone(),
        (None, Some(dir)) => {
            fs::create_dir_all(dir)
                .with_context(|| format!("failed to create {}", dir.display()))?;
            dated_path(dir, &output.basename, Local::now().naive_local())
        }
        (None, None) => {
            println!("{}", serde_json::to_string_pretty(dataset)?);
            return Ok(());
        }
    };
    write_dataset(dataset, &path)?;
    info!(path = %path.display(), records = dataset.len(), "wrote dataset");
    Ok(())
}

fn dated_path(dir: &Path, basename: &str, at: NaiveDateTime) -> PathBuf {
    dir.join(format!("{basename}_{}.json", at.format("%Y_%m_%d_%H_%M")))
}

fn write_dataset(dataset: &Dataset, path: &Path) -> Result<()> {
    let json = serde_json::to_string_pretty(dataset)?;
    fs::write(path, json).with_context(|| format!("failed to write {}", path.display()))
}
