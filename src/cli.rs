//! Command-line dispatch: one handler per subcommand, each returning an exit code.

use std::fs;
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use serde_json::Value;

use crate::adapter::{registry_from_inbox, Context};
use crate::config::{PipelineConfig, DEFAULT_CONFIG_PATH};
use crate::derive::{check_derived, derive_daily, write_derived};
use crate::error::{Error, Result};
use crate::merge::make_monotonic;
use crate::parallel::WorkerPool;
use crate::pipeline::{increment_location, run_update};
use crate::series::io::to_csv_string;
use crate::series::{read_series, write_series, Metric};
use crate::validate::CountryChecker;

#[derive(Debug, Parser)]
#[command(name = "vaxseries")]
#[command(about = "Merge and sanity-check per-location vaccination series")]
#[command(version)]
pub struct Cli {
    /// YAML configuration; defaults apply when the file is missing
    #[arg(long, global = true, env = "VAXSERIES_CONFIG", default_value = DEFAULT_CONFIG_PATH)]
    pub config: PathBuf,

    /// Override the configured series directory
    #[arg(long, global = true)]
    pub output_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, PartialEq, Eq, Subcommand)]
pub enum Command {
    /// Validate one observation (JSON object) and merge it into its series
    Increment {
        path: PathBuf,
        /// Rewrite the series monotonic after merging
        #[arg(long)]
        monotonic: bool,
    },
    /// Run the sanity checks on a series file
    Check {
        path: PathBuf,
        /// Print the findings as JSON on stdout
        #[arg(long)]
        json: bool,
    },
    /// Drop the fewest rows needed to make one metric non-decreasing
    Monotonic {
        path: PathBuf,
        #[arg(long, default_value = "total_vaccinations")]
        metric: Metric,
        #[arg(long)]
        max_removed: Option<usize>,
        /// Rewrite the file in place instead of printing the result
        #[arg(long)]
        write: bool,
    },
    /// Daily changes, interpolated gaps and 7-row smoothing for a series file
    Derive {
        path: PathBuf,
        /// Write CSV here instead of stdout
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Run every adapter found in the inbox
    Update {
        #[arg(long)]
        inbox: Option<PathBuf>,
        #[arg(long)]
        workers: Option<usize>,
    },
}

pub fn run_with_args(args: &[String]) -> i32 {
    let cli = match Cli::try_parse_from(args) {
        Ok(cli) => cli,
        Err(err) => {
            let _ = err.print();
            return err.exit_code();
        }
    };

    let mut config = match PipelineConfig::load_or_default(&cli.config) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("failed to load config '{}': {err}", cli.config.display());
            return 2;
        }
    };
    if let Some(output_dir) = cli.output_dir {
        config.output_dir = output_dir;
    }

    match cli.command {
        Command::Increment { path, monotonic } => handle_increment(config, &path, monotonic),
        Command::Check { path, json } => handle_check(&config, &path, json),
        Command::Monotonic {
            path,
            metric,
            max_removed,
            write,
        } => {
            let max_removed = max_removed.unwrap_or(config.max_removed_rows);
            handle_monotonic(&path, metric, max_removed, write)
        }
        Command::Derive { path, output } => handle_derive(&path, output.as_deref()),
        Command::Update { inbox, workers } => {
            if let Some(inbox) = inbox {
                config.inbox_dir = inbox;
            }
            if let Some(workers) = workers {
                config.workers = workers;
            }
            handle_update(config)
        }
    }
}

fn handle_increment(config: PipelineConfig, path: &Path, monotonic: bool) -> i32 {
    let ctx = Context::new(config);
    let result = read_record(path).and_then(|record| increment_location(&ctx, &record, monotonic));
    match result {
        Ok((series, outcome)) => {
            println!(
                "increment complete: location='{}', outcome={outcome:?}, rows={}",
                series.location,
                series.len()
            );
            0
        }
        Err(err) => {
            eprintln!("increment failed ({}): {err}", err.kind());
            1
        }
    }
}

fn read_record(path: &Path) -> Result<serde_json::Map<String, Value>> {
    let raw = fs::read_to_string(path).map_err(|err| Error::io(path.display().to_string(), err))?;
    match serde_json::from_str::<Value>(&raw)? {
        Value::Object(record) => Ok(record),
        other => Err(Error::Type {
            field: path.display().to_string(),
            expected: "a JSON object",
            found: "other JSON value",
            value: other.to_string(),
        }),
    }
}

fn handle_check(config: &PipelineConfig, path: &Path, json: bool) -> i32 {
    let series = match read_series(path) {
        Ok(series) => series,
        Err(err) => {
            eprintln!("unable to read '{}': {err}", path.display());
            return 1;
        }
    };

    let checks = config.location(&series.location);
    let report = CountryChecker::new(&series, &config.checks, &checks).report();
    if json {
        match serde_json::to_string_pretty(&report) {
            Ok(payload) => println!("{payload}"),
            Err(err) => {
                eprintln!("failed to serialize check report: {err}");
                return 1;
            }
        }
    }
    for finding in &report.findings {
        eprintln!("- {finding}");
    }
    if report.has_failures() {
        let dates: Vec<String> = report.failing_dates().iter().map(|d| d.to_string()).collect();
        if !dates.is_empty() {
            eprintln!("rows to review: {}", dates.join(", "));
        }
        eprintln!("validation failed: {} issue(s)", report.failure_count());
        1
    } else {
        if !json {
            println!("validation passed: {}", path.display());
        }
        0
    }
}

fn handle_monotonic(path: &Path, metric: Metric, max_removed: usize, write: bool) -> i32 {
    let result = read_series(path).and_then(|series| {
        let fixed = make_monotonic(&series, metric, max_removed)?;
        Ok((series.len() - fixed.len(), fixed))
    });
    let (removed, fixed) = match result {
        Ok(done) => done,
        Err(err) => {
            eprintln!("monotonic failed ({}): {err}", err.kind());
            return 1;
        }
    };

    if write {
        if let Err(err) = write_series(path, &fixed) {
            eprintln!("failed to write '{}': {err}", path.display());
            return 1;
        }
        println!("removed {removed} row(s) from {}", path.display());
        return 0;
    }
    match to_csv_string(&fixed) {
        Ok(csv) => {
            print!("{csv}");
            eprintln!("removed {removed} row(s)");
            0
        }
        Err(err) => {
            eprintln!("failed to serialize series: {err}");
            1
        }
    }
}

fn handle_derive(path: &Path, output: Option<&Path>) -> i32 {
    let result = read_series(path).and_then(|series| {
        let derived = derive_daily(&series);
        check_derived(&derived)?;
        match output {
            Some(out) => {
                let file =
                    fs::File::create(out).map_err(|err| Error::io(out.display().to_string(), err))?;
                write_derived(file, &derived)?;
            }
            None => write_derived(std::io::stdout().lock(), &derived)?,
        }
        Ok(derived.rows.len())
    });
    match result {
        Ok(rows) => {
            eprintln!("derived {rows} daily row(s) from {}", path.display());
            0
        }
        Err(err) => {
            eprintln!("derive failed ({}): {err}", err.kind());
            1
        }
    }
}

fn handle_update(config: PipelineConfig) -> i32 {
    let pool = WorkerPool::with_workers(config.workers);
    let registry = match registry_from_inbox(&config.inbox_dir) {
        Ok(registry) => registry,
        Err(err) => {
            eprintln!("failed to scan inbox: {err}");
            return 1;
        }
    };
    let ctx = Context::new(config);

    let report = match run_update(&ctx, &registry, &pool) {
        Ok(report) => report,
        Err(err) => {
            eprintln!("update failed: {err}");
            return 1;
        }
    };
    match serde_json::to_string_pretty(&report) {
        Ok(payload) => println!("{payload}"),
        Err(err) => {
            eprintln!("failed to serialize update report: {err}");
            return 1;
        }
    }
    if report.has_failures() {
        1
    } else {
        0
    }
}
