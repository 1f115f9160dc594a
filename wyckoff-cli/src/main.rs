//! Wyckoff CLI: replay, config checks, synthetic data.
//!
//! Commands:
//! - `replay`: replay a bar series through the current and proposed configs
//! - `check-config`: parse and validate a replay config file
//! - `synthetic`: write a deterministic synthetic bar series to CSV

use anyhow::{bail, Context, Result};
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use wyckoff_core::domain::{Bar, Timeframe};
use wyckoff_runner::{
    compute_dataset_hash, generate_synthetic_bars, load_csv, run_id, write_csv, BacktestService,
    FnSink, ReplayConfigFile, ReplayRequest, RunStatus, RunStatusRecord, SinkError,
};

#[derive(Parser)]
#[command(name = "wyckoff", about = "Wyckoff campaign detection and backtest replay")]
struct Cli {
    /// Verbosity (-v info, -vv debug, -vvv trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay bars through the current and proposed configurations.
    Replay {
        /// CSV file with timestamp,open,high,low,close,volume rows.
        #[arg(long, conflicts_with = "synthetic")]
        bars: Option<PathBuf>,

        /// Generate this many synthetic bars instead of reading a file.
        #[arg(long)]
        synthetic: Option<usize>,

        /// Replay config (TOML). Defaults apply when omitted.
        #[arg(long)]
        config: Option<PathBuf>,

        /// Symbol; defaults to the CSV file stem.
        #[arg(long)]
        symbol: Option<String>,

        /// Bar timeframe: 1m, 5m, 15m, 1h, 4h, 1d, 1w.
        #[arg(long, default_value = "1d")]
        timeframe: Timeframe,

        /// Abort on the first malformed bar.
        #[arg(long, default_value_t = false)]
        strict: bool,

        /// Print the full run as JSON.
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// Parse and validate a replay config file.
    CheckConfig {
        #[arg(long)]
        config: PathBuf,
    },
    /// Write synthetic bars to CSV.
    Synthetic {
        #[arg(long, default_value = "SYN")]
        symbol: String,

        #[arg(long, default_value_t = 2_000)]
        bars: usize,

        #[arg(long, default_value = "1d")]
        timeframe: Timeframe,

        /// First bar date (YYYY-MM-DD).
        #[arg(long, default_value = "2015-01-02")]
        start: String,

        #[arg(long)]
        out: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose)?;

    match cli.command {
        Commands::Replay {
            bars,
            synthetic,
            config,
            symbol,
            timeframe,
            strict,
            json,
        } => run_replay(bars, synthetic, config, symbol, timeframe, strict, json),
        Commands::CheckConfig { config } => run_check_config(&config),
        Commands::Synthetic {
            symbol,
            bars,
            timeframe,
            start,
            out,
        } => run_synthetic(&symbol, bars, timeframe, &start, &out),
    }
}

fn init_logging(verbose: u8) -> Result<()> {
    let level = match verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber).context("failed to set tracing subscriber")
}

#[allow(clippy::too_many_arguments)]
fn run_replay(
    bars_path: Option<PathBuf>,
    synthetic: Option<usize>,
    config_path: Option<PathBuf>,
    symbol: Option<String>,
    timeframe: Timeframe,
    strict: bool,
    json: bool,
) -> Result<()> {
    let mut config = match &config_path {
        Some(path) => ReplayConfigFile::load(path)?,
        None => ReplayConfigFile::default(),
    };
    config.replay.strict |= strict;

    let bars = load_bars(bars_path.as_deref(), synthetic, symbol, timeframe)?;
    let hash = compute_dataset_hash(&bars);
    let id = run_id(&hash, &config.replay, &config.current, config.proposed());
    info!(run_id = %id, bars = bars.len(), dataset = %&hash[..16], "loaded series");

    let request = ReplayRequest {
        run_id: id,
        bars,
        current: config.current.clone(),
        proposed: config.proposed().clone(),
    };
    let service = BacktestService::new(config.replay.clone())?;
    let sink = FnSink(|record: &RunStatusRecord| -> Result<(), SinkError> {
        info!(
            status = %record.status,
            bars = record.progress.bars_analyzed,
            pct = record.progress.percent_complete,
            "progress"
        );
        Ok(())
    });
    let run = service.submit(request, Box::new(sink))?.join()?;

    if json {
        println!("{}", serde_json::to_string_pretty(&run)?);
    } else {
        println!("Run:      {}", run.run_id);
        println!("Status:   {}", run.status);
        println!(
            "Bars:     {} of {} ({:.1}%)",
            run.progress.bars_analyzed, run.progress.total_bars, run.progress.percent_complete
        );
        println!("Elapsed:  {} ms", run.elapsed_ms);
        if !run.issues.is_empty() {
            println!("Skipped:  {} bars", run.issues.len());
            for issue in run.issues.iter().take(10) {
                println!("  #{} {}: {}", issue.index, issue.timestamp, issue.error);
            }
        }
        if let Some(report) = &run.report {
            println!();
            print!("{}", report.render_text());
        }
    }

    match run.status {
        RunStatus::Completed => Ok(()),
        status => bail!(
            "run {status}: {}",
            run.error.as_deref().unwrap_or("no error recorded")
        ),
    }
}

fn load_bars(
    path: Option<&Path>,
    synthetic: Option<usize>,
    symbol: Option<String>,
    timeframe: Timeframe,
) -> Result<Vec<Bar>> {
    match (path, synthetic) {
        (Some(path), _) => {
            let symbol = match symbol {
                Some(s) => s,
                None => path
                    .file_stem()
                    .and_then(|s| s.to_str())
                    .map(str::to_uppercase)
                    .context("cannot derive a symbol from the file name; pass --symbol")?,
            };
            Ok(load_csv(path, &symbol, timeframe)?)
        }
        (None, Some(n)) => {
            let symbol = symbol.unwrap_or_else(|| "SYN".to_string());
            Ok(generate_synthetic_bars(&symbol, timeframe, default_start(), n))
        }
        (None, None) => bail!("one of --bars or --synthetic is required"),
    }
}

fn run_check_config(path: &Path) -> Result<()> {
    let config = ReplayConfigFile::load(path)?;
    println!("{}: ok", path.display());
    println!(
        "  replay: batch {} bars, timeout {}s, {} concurrent runs, strict {}",
        config.replay.progress_batch,
        config.replay.timeout_secs,
        config.replay.max_concurrent_runs,
        config.replay.strict
    );
    for (label, engine) in [("current", &config.current), ("proposed", config.proposed())] {
        println!(
            "  {label}: volume window {}, range lookback {}, trailing {}, asset class {:?}",
            engine.volume_window, engine.range_lookback, engine.trailing_bars, engine.asset_class
        );
    }
    if config.proposed.is_none() {
        println!("  (no [proposed] section; proposed mirrors current)");
    }
    Ok(())
}

fn run_synthetic(
    symbol: &str,
    count: usize,
    timeframe: Timeframe,
    start: &str,
    out: &Path,
) -> Result<()> {
    let date = NaiveDate::parse_from_str(start, "%Y-%m-%d")
        .with_context(|| format!("invalid start date '{start}'"))?;
    let start = date
        .and_hms_opt(0, 0, 0)
        .map(|naive| Utc.from_utc_datetime(&naive))
        .context("invalid start time")?;
    let bars = generate_synthetic_bars(symbol, timeframe, start, count);
    let file = std::fs::File::create(out)
        .with_context(|| format!("cannot create {}", out.display()))?;
    write_csv(file, &bars)?;
    println!(
        "Wrote {} {} bars for {symbol} to {}",
        bars.len(),
        timeframe,
        out.display()
    );
    Ok(())
}

fn default_start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2015, 1, 2, 0, 0, 0)
        .single()
        .unwrap_or_default()
}
