//! `trace-deident` CLI (SPEC_FULL.md §4.11): reads a batch file of trip
//! paths plus a road-network CSV, runs the de-identification pipeline over
//! every trip with a worker pool, and reports aggregate point statistics.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;

use trace_deident::{batch, config, data::road_csv, graph::RoadGraph};

#[derive(Parser)]
#[command(name = "trace-deident")]
#[command(about = "De-identifies sequential vehicle GPS traces against a road network")]
#[command(version)]
struct Cli {
    /// Batch file listing one trip CSV path per line.
    batch_file: PathBuf,

    /// Road-network CSV (gid,source,target,... dialect).
    #[arg(long = "roads")]
    roads: PathBuf,

    /// Output directory for de-identified trip CSVs.
    #[arg(long = "out")]
    out: PathBuf,

    /// Optional configuration file (`key = value` lines).
    #[arg(long = "config")]
    config: Option<PathBuf>,

    /// Worker thread count; defaults to `hardware_threads + hardware_threads/2`.
    #[arg(long = "threads")]
    threads: Option<usize>,

    /// Increase log verbosity (repeatable).
    #[arg(short = 'v', action = clap::ArgAction::Count)]
    verbose: u8,
}

fn run(cli: Cli) -> anyhow::Result<batch::BatchStats> {
    let descriptors = batch::read_batch_file(&cli.batch_file)
        .with_context(|| format!("reading batch file {}", cli.batch_file.display()))?;

    let roads_file = std::fs::File::open(&cli.roads)
        .with_context(|| format!("opening road-network file {}", cli.roads.display()))?;
    let roads = road_csv::read_roads(roads_file).context("parsing road-network CSV")?;
    let graph = RoadGraph::build(roads).context("building road graph")?;

    let mut cfg = match &cli.config {
        Some(path) => config::load(path).with_context(|| format!("loading config file {}", path.display()))?,
        None => config::Config::default(),
    };
    if let Some(threads) = cli.threads {
        cfg.thread_count = threads.max(1);
    }

    batch::run(descriptors, graph, cfg, &cli.out).context("running batch")
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let mut log_builder = env_logger::Builder::from_default_env();
    log_builder.target(env_logger::Target::Stderr);
    let level = match cli.verbose {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };
    log_builder.filter_level(level);
    log_builder.init();

    match run(cli) {
        Ok(stats) => {
            log::info!(
                "processed {} trace(s), {} failed, {} points ({} critical, {} privacy)",
                stats.traces,
                stats.traces_failed,
                stats.total_points,
                stats.critical_points,
                stats.privacy_points
            );
            ExitCode::SUCCESS
        }
        Err(e) => {
            log::error!("{}", e);
            ExitCode::FAILURE
        }
    }
}
