mod assembler;
mod config;
mod fetch;
mod job;
mod merge;
mod model;
mod output;
mod parser;
mod runner;

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use clap::error::ErrorKind;
use clap::{Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

use crate::assembler::Assembler;
use crate::config::Settings;
use crate::job::{JobController, JobStatus, JobTracker};
use crate::merge::MergeOutcome;
use crate::model::{RunResult, RunScope};
use crate::output::Format;
use crate::runner::RangeRunner;

#[derive(Parser)]
#[command(
    name = "hymn_scraper",
    about = "Scrape Myanmar hymns into JSON, CSV or bulk-import files",
    arg_required_else_help = true
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scrape an inclusive range of hymn ids
    Scrape {
        start_id: i64,
        end_id: i64,
        #[arg(short, long, value_enum, default_value = "json")]
        format: Format,
        #[command(flatten)]
        pace: Pace,
        /// Run detached; poll with `status`
        #[arg(long)]
        background: bool,
    },
    /// Scrape an explicit comma-separated id list, e.g. 16,87,102
    Ids {
        ids: String,
        #[arg(short, long, value_enum, default_value = "csv")]
        format: Format,
        #[command(flatten)]
        pace: Pace,
    },
    /// Scrape ids missing from an existing CSV and write a merged copy
    Merge {
        /// CSV path, or a file name inside the output dir
        csv: PathBuf,
        ids: String,
        #[command(flatten)]
        pace: Pace,
    },
    /// Show the background job's progress
    Status,
    /// Stop the background job
    Cancel,
    #[command(hide = true)]
    Worker {
        start_id: i64,
        end_id: i64,
        #[arg(long, value_enum)]
        format: Format,
        #[arg(long)]
        delay_ms: u64,
        #[arg(long)]
        started_at: DateTime<Utc>,
    },
}

#[derive(Args)]
struct Pace {
    /// Short delay between requests
    #[arg(long, conflicts_with = "slow")]
    fast: bool,
    /// Long delay between requests
    #[arg(long)]
    slow: bool,
}

impl Pace {
    fn delay_ms(&self, settings: &Settings) -> u64 {
        if self.fast {
            settings.fast_delay_ms
        } else if self.slow {
            settings.slow_delay_ms
        } else {
            settings.default_delay_ms
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let code = match e.kind() {
                ErrorKind::DisplayHelp
                | ErrorKind::DisplayVersion
                | ErrorKind::DisplayHelpOnMissingArgumentOrSubcommand => 0,
                _ => 1,
            };
            let _ = e.print();
            std::process::exit(code);
        }
    };

    // The worker writes into a log file
    let is_worker = matches!(cli.command, Commands::Worker { .. });
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with_ansi(!is_worker)
        .init();

    let settings = Settings::load()?;
    let t0 = Instant::now();

    match cli.command {
        Commands::Scrape { start_id, end_id, format, pace, background } => {
            runner::check_range(start_id, end_id)?;
            let delay_ms = pace.delay_ms(&settings);
            settings.ensure_dirs()?;

            if background {
                if format == Format::Bulk {
                    bail!("--background supports json and csv output only");
                }
                let pid = JobController::new(&settings).start(start_id, end_id, delay_ms, format)?;
                println!("\nBackground scrape started");
                println!("  PID:    {}", pid);
                println!("  Range:  Hymn {} - {}", start_id, end_id);
                println!("  Format: {}", format.as_str().to_uppercase());
                println!("  Delay:  {}ms", delay_ms);
                println!("\nMonitor progress with: hymn_scraper status");
                println!("View logs with:        tail -f {}\n", settings.log_file().display());
                return Ok(());
            }

            let scope = RunScope::Range { start: start_id, end: end_id };
            let ids: Vec<i64> = (start_id..=end_id).collect();
            let result = scrape_foreground(&settings, &ids, delay_ms).await?;
            let path = output::write(&result, &scope, format, &settings.output_dir, Utc::now())?;
            output::print_summary(&result, Some(&path));
        }
        Commands::Ids { ids, format, pace } => {
            let ids = runner::parse_id_list(&ids).map_err(anyhow::Error::msg)?;
            settings.ensure_dirs()?;

            let result = scrape_foreground(&settings, &ids, pace.delay_ms(&settings)).await?;
            if result.accepted.is_empty() {
                output::print_summary(&result, None);
                println!("No hymns scraped; nothing written.");
            } else {
                let path = output::write(
                    &result,
                    &RunScope::Custom,
                    format,
                    &settings.output_dir,
                    Utc::now(),
                )?;
                output::print_summary(&result, Some(&path));
            }
        }
        Commands::Merge { csv, ids, pace } => {
            let ids = runner::parse_id_list(&ids).map_err(anyhow::Error::msg)?;
            let csv_path = merge::resolve_csv_path(&csv, &settings.output_dir)?;
            settings.ensure_dirs()?;
            run_merge(&settings, &csv_path, &ids, pace.delay_ms(&settings)).await?;
        }
        Commands::Status => {
            let report = JobController::new(&settings).status();
            job::print_report(&report, Utc::now());
        }
        Commands::Cancel => match JobController::new(&settings).cancel()? {
            Some(pid) => println!("Sent termination signal to background job (PID {})", pid),
            None => println!("Background job is not running."),
        },
        Commands::Worker { start_id, end_id, format, delay_ms, started_at } => {
            run_worker(&settings, start_id, end_id, format, delay_ms, started_at).await?;
        }
    }

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 {
        println!("\nDone in {}", format_duration(elapsed));
    }
    Ok(())
}

fn progress_bar(len: usize) -> Result<ProgressBar> {
    let pb = ProgressBar::new(len as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40} {pos}/{len} (eta {eta}) hymn {msg}")?
            .progress_chars("=> "),
    );
    Ok(pb)
}

async fn scrape_foreground(settings: &Settings, ids: &[i64], delay_ms: u64) -> Result<RunResult> {
    let assembler =
        Assembler::new(settings.clone()).context("Failed to build HTTP client")?;
    let runner = RangeRunner::new(&assembler, Duration::from_millis(delay_ms));

    let pb = progress_bar(ids.len())?;
    let mut on_progress = |id: i64| {
        pb.set_message(id.to_string());
        pb.inc(1);
    };
    let result = runner.run_ids(ids, Some(&mut on_progress)).await;
    pb.finish_and_clear();
    Ok(result)
}

async fn run_merge(settings: &Settings, csv_path: &Path, ids: &[i64], delay_ms: u64) -> Result<()> {
    let assembler =
        Assembler::new(settings.clone()).context("Failed to build HTTP client")?;
    println!("Reading existing CSV: {}", csv_path.display());

    let outcome = merge::run_merge(
        &assembler,
        csv_path,
        ids,
        Duration::from_millis(delay_ms),
        Utc::now(),
        None,
    )
    .await?;

    match outcome {
        MergeOutcome::AlreadyComplete => {
            println!("\nAll specified IDs already exist in the CSV file. No scraping needed.");
        }
        MergeOutcome::Merged(report) => merge::print_report(csv_path, &report),
    }
    Ok(())
}

async fn run_worker(
    settings: &Settings,
    start_id: i64,
    end_id: i64,
    format: Format,
    delay_ms: u64,
    started_at: DateTime<Utc>,
) -> Result<()> {
    runner::check_range(start_id, end_id)?;
    info!("Background worker {} started for {}-{}", std::process::id(), start_id, end_id);

    let controller = JobController::new(settings);
    let mut tracker = JobTracker::new(
        controller.store(),
        JobStatus::started(std::process::id(), start_id, end_id, started_at),
    );
    tracker.begin();

    let assembler =
        Assembler::new(settings.clone()).context("Failed to build HTTP client")?;
    let runner = RangeRunner::new(&assembler, Duration::from_millis(delay_ms));
    let mut on_progress = |id: i64| tracker.on_progress(id);
    let result = runner.run(start_id, end_id, Some(&mut on_progress)).await;

    let scope = RunScope::Range { start: start_id, end: end_id };
    let path = output::write(&result, &scope, format, &settings.output_dir, Utc::now())?;
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned());
    tracker.finish(file_name);
    info!(
        "Background worker finished: {}/{} ids processed",
        tracker.status().processed(),
        tracker.status().total
    );

    output::print_summary(&result, Some(&path));
    Ok(())
}

fn format_duration(d: Duration) -> String {
    let secs = d.as_secs();
    if secs < 60 {
        format!("{:.1}s", d.as_secs_f64())
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}
