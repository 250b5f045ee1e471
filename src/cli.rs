use crate::{
    aggregate::{Aggregator, EngineOptions},
    config::Config,
    report::{AggregateReport, render_entry, render_summary},
    stage::Stager,
    store::LocalObjectStore,
    util::ensure_dir,
};
use anyhow::{Context, Result, anyhow, bail};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, Layer, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "tppa-tally")]
#[command(about = "Daily TPPA pixel log tally (stage, gunzip, parallel scan + report)")]
pub struct Args {
    #[command(subcommand)]
    pub cmd: Command,

    /// Path to config TOML. If omitted, uses ./tppa-tally.toml if present.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Override log level (trace/debug/info/warn/error).
    #[arg(long)]
    pub log_level: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Print the object keys under the prefix.
    List {
        #[arg(long)]
        prefix: Option<String>,
    },
    /// Clean the download dir, fetch and gunzip every object under the prefix.
    Stage {
        #[arg(long)]
        prefix: Option<String>,
    },
    /// Count markers in an already staged log directory.
    Scan {
        #[arg(long)]
        dir: Option<PathBuf>,
        #[arg(long)]
        workers: Option<usize>,
        #[arg(long)]
        json: bool,
    },
    /// Stage, then scan.
    Run {
        #[arg(long)]
        prefix: Option<String>,
        #[arg(long)]
        workers: Option<usize>,
        #[arg(long)]
        json: bool,
    },
}

pub fn dispatch(args: Args) -> Result<()> {
    let cfg = load_config(args.config.as_deref())?;
    let _guard = init_logging(&args, &cfg)?;

    match &args.cmd {
        Command::List { prefix } => list(&cfg, prefix.as_deref()),
        Command::Stage { prefix } => {
            let summary = stager(&cfg).stage(resolve_prefix(&cfg, prefix.as_deref()))?;
            println!("{}", serde_json::to_string_pretty(&summary)?);
            Ok(())
        }
        Command::Scan { dir, workers, json } => {
            let dir = dir.clone().unwrap_or_else(|| cfg.log_dir());
            scan(&cfg, &dir, *workers, *json)
        }
        Command::Run {
            prefix,
            workers,
            json,
        } => {
            let summary = stager(&cfg).stage(resolve_prefix(&cfg, prefix.as_deref()))?;
            info!("Starting parsing of logs in {}", summary.log_dir.display());
            scan(&cfg, &summary.log_dir, *workers, *json)
        }
    }
}

fn load_config(user: Option<&Path>) -> Result<Config> {
    if let Some(p) = user {
        return Config::load(p);
    }
    let default = PathBuf::from("tppa-tally.toml");
    if default.exists() {
        Config::load(&default)
    } else {
        Ok(Config::default())
    }
}

fn init_logging(args: &Args, cfg: &Config) -> Result<Option<WorkerGuard>> {
    let level = args
        .log_level
        .as_deref()
        .unwrap_or(cfg.logging.level.as_str());

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    // stdout is reserved for the report.
    let stderr_layer = if cfg.logging.json {
        tracing_subscriber::fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .with_target(true)
            .boxed()
    } else {
        tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(true)
            .boxed()
    };

    let (file_layer, guard) = if let Some(path) = resolve_log_path(cfg) {
        let parent = path.parent().unwrap_or_else(|| Path::new("."));
        ensure_dir(parent)?;
        let file = std::fs::File::create(&path)
            .with_context(|| format!("create log file: {}", path.display()))?;
        let (non_blocking, guard) = tracing_appender::non_blocking(file);
        let layer = tracing_subscriber::fmt::layer()
            .with_writer(non_blocking)
            .with_ansi(false)
            .with_target(true)
            .boxed();
        (Some(layer), Some(guard))
    } else {
        (None, None)
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(stderr_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| anyhow!("failed to init logging: {e}"))?;

    Ok(guard)
}

fn resolve_log_path(cfg: &Config) -> Option<PathBuf> {
    if !cfg.logging.write_to_file {
        return None;
    }
    if !cfg.logging.file_path.is_empty() {
        return Some(PathBuf::from(&cfg.logging.file_path));
    }
    Some(PathBuf::from(&cfg.paths.out_dir).join("tppa-tally.log"))
}

fn resolve_prefix<'a>(cfg: &'a Config, user: Option<&'a str>) -> &'a str {
    user.unwrap_or(cfg.store.prefix.as_str())
}

fn stager(cfg: &Config) -> Stager<LocalObjectStore> {
    Stager::new(cfg, LocalObjectStore::new(&cfg.store.root))
}

fn list(cfg: &Config, prefix: Option<&str>) -> Result<()> {
    let keys = stager(cfg).keys(resolve_prefix(cfg, prefix))?;
    for key in &keys {
        println!("{key}");
    }
    info!("{} objects under {}", keys.len(), resolve_prefix(cfg, prefix));
    Ok(())
}

fn scan(cfg: &Config, dir: &Path, workers: Option<usize>, json: bool) -> Result<()> {
    let mut opts = EngineOptions::from_config(cfg);
    if let Some(w) = workers {
        if w == 0 {
            bail!("--workers must be greater than 0");
        }
        opts.max_workers = w;
    }
    let json = json || cfg.output.format == "json";

    let aggregator = Aggregator::new(&opts)?;
    let report = aggregator
        .aggregate_with(dir, |entry| {
            if json {
                // stdout carries the final document; progress goes to stderr
                // as one JSON object per file.
                match entry.to_json_line() {
                    Ok(line) => eprintln!("{line}"),
                    Err(e) => warn!("could not encode entry {}: {e}", entry.file_name()),
                }
            } else {
                print!("{}", render_entry(entry));
            }
        })
        .with_context(|| format!("aggregating {}", dir.display()))?;

    if cfg.output.write_report_json {
        write_report(cfg, &report)?;
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else if cfg.global.print_summary {
        print!("{}", render_summary(&report));
    }
    Ok(())
}

fn write_report(cfg: &Config, report: &AggregateReport) -> Result<()> {
    let job_dir = PathBuf::from(&cfg.paths.out_dir).join(&report.batch_id);
    ensure_dir(&job_dir)?;
    let path = job_dir.join(&cfg.output.report_filename);
    std::fs::write(&path, serde_json::to_string_pretty(report)?)
        .with_context(|| format!("write report: {}", path.display()))?;
    info!("report written to {}", path.display());
    Ok(())
}
