//! Quorum CLI — configuration checks, one-shot evaluation, replay and live paper trading.
//!
//! Commands:
//! - `check-config`: validate a TOML config and print its fingerprint
//! - `evaluate`: run one cycle over CSV candles and print the decision as JSON
//! - `replay`: paper-trade through CSV history and print a summary
//! - `live`: paper-trade on Binance public klines (or synthetic candles)

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::EnvFilter;

use quorum_runner::sources::{BinanceFuturesSource, CsvCandleSource, SyntheticSource};
use quorum_runner::{
    run_replay, CandleSource, Journal, PaperBroker, ReplaySource, RunSummary, Trader,
    TraderConfig,
};

#[derive(Parser)]
#[command(name = "quorum", version, about = "Quorum — multi-timeframe futures signal engine")]
struct Cli {
    /// Debug-level logging (overrides RUST_LOG).
    #[arg(short, long, global = true, default_value_t = false)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate a TOML config file and print its fingerprint.
    CheckConfig {
        /// Path to the TOML config file.
        file: PathBuf,
    },
    /// Run one cycle over CSV candles and print the decision as JSON.
    Evaluate {
        /// Path to a TOML config file. Defaults are used when omitted.
        #[arg(long)]
        config: Option<PathBuf>,

        /// Directory of `<SYMBOL>_<timeframe>.csv` files.
        #[arg(long, default_value = "data")]
        data_dir: PathBuf,

        /// Evaluation instant (RFC 3339). Defaults to the close of the last primary candle.
        #[arg(long)]
        as_of: Option<String>,
    },
    /// Paper-trade through CSV history and print a summary.
    Replay {
        #[arg(long)]
        config: Option<PathBuf>,

        #[arg(long, default_value = "data")]
        data_dir: PathBuf,

        /// Starting paper balance in quote currency.
        #[arg(long, default_value_t = 10_000.0)]
        balance: f64,

        /// Taker fee as a fraction of notional (0.0004 = 4 bps).
        #[arg(long, default_value_t = 0.0)]
        fee_rate: f64,
    },
    /// Paper-trade live on the check interval.
    Live {
        #[arg(long)]
        config: Option<PathBuf>,

        /// Use seeded synthetic candles instead of Binance public klines.
        #[arg(long, default_value_t = false)]
        synthetic: bool,

        /// Seed for synthetic candles.
        #[arg(long, default_value_t = 42)]
        seed: u64,

        /// Stop after this many cycles.
        #[arg(long)]
        max_cycles: Option<u64>,

        #[arg(long, default_value_t = 10_000.0)]
        balance: f64,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Commands::CheckConfig { file } => run_check_config(&file),
        Commands::Evaluate {
            config,
            data_dir,
            as_of,
        } => run_evaluate(config.as_deref(), &data_dir, as_of.as_deref()),
        Commands::Replay {
            config,
            data_dir,
            balance,
            fee_rate,
        } => run_replay_cmd(config.as_deref(), &data_dir, balance, fee_rate),
        Commands::Live {
            config,
            synthetic,
            seed,
            max_cycles,
            balance,
        } => run_live(config.as_deref(), synthetic, seed, max_cycles, balance),
    }
}

/// Logs go to stderr so JSON on stdout stays clean.
fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(path: Option<&Path>) -> Result<TraderConfig> {
    let config = match path {
        Some(path) => TraderConfig::from_file(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => TraderConfig::default(),
    };
    Ok(config)
}

fn open_journal(config: &TraderConfig) -> Result<Option<Journal>> {
    config
        .journal_path
        .as_ref()
        .map(|path| {
            Journal::open(path).with_context(|| format!("opening journal {}", path.display()))
        })
        .transpose()
}

fn run_check_config(file: &Path) -> Result<()> {
    let config = load_config(Some(file))?;
    println!("ok: {}", file.display());
    println!("symbol:       {}", config.symbol);
    println!(
        "timeframes:   {}",
        config
            .engine
            .mtf
            .required_timeframes()
            .iter()
            .map(|tf| tf.to_string())
            .collect::<Vec<_>>()
            .join(" ")
    );
    println!("min lookback: {}", config.min_lookback());
    println!("config hash:  {}", config.engine.config_hash());
    Ok(())
}

fn run_evaluate(config_path: Option<&Path>, data_dir: &Path, as_of: Option<&str>) -> Result<()> {
    let config = load_config(config_path)?;
    let source = CsvCandleSource::new(data_dir);
    let primary = config.engine.mtf.primary;

    let now = match as_of {
        Some(raw) => DateTime::parse_from_rfc3339(raw)
            .with_context(|| format!("parsing --as-of '{raw}'"))?
            .with_timezone(&Utc),
        None => {
            let series = source
                .load(&config.symbol, primary)
                .with_context(|| format!("loading {} {primary} candles", config.symbol))?;
            match series.last() {
                Some(c) => c.open_time + primary.duration(),
                None => bail!("{} has no candles", source.path_for(&config.symbol, primary).display()),
            }
        }
    };

    // A throwaway paper account: evaluation starts flat.
    let broker = PaperBroker::new(10_000.0);
    let mut trader = Trader::new(
        config,
        Box::new(source),
        Box::new(broker.clone()),
        Box::new(broker),
    )?;
    let report = trader.run_cycle(now)?;
    println!("{}", serde_json::to_string_pretty(&report.decision)?);
    Ok(())
}

fn run_replay_cmd(
    config_path: Option<&Path>,
    data_dir: &Path,
    balance: f64,
    fee_rate: f64,
) -> Result<()> {
    if !(balance.is_finite() && balance > 0.0) {
        bail!("--balance must be positive, got {balance}");
    }
    let config = load_config(config_path)?;
    let timeframes = config.engine.mtf.required_timeframes();
    let source = ReplaySource::from_csv_dir(data_dir, &config.symbol, &timeframes)
        .with_context(|| format!("loading history from {}", data_dir.display()))?;
    let journal = open_journal(&config)?;

    let broker = PaperBroker::new(balance).with_fee_rate(fee_rate);
    let report = run_replay(config, source, broker, journal)?;

    print_summary(&report.summary);
    let pnl: f64 = report.trades.iter().map(|t| t.pnl).sum();
    let wins = report.trades.iter().filter(|t| t.pnl > 0.0).count();
    println!("Trades:           {} ({} winning)", report.trades.len(), wins);
    println!("Realized PnL:     {pnl:.2}");
    println!("Starting balance: {:.2}", report.starting_balance);
    println!("Final balance:    {:.2}", report.final_balance);
    println!("Final equity:     {:.2}", report.final_equity);
    Ok(())
}

fn run_live(
    config_path: Option<&Path>,
    synthetic: bool,
    seed: u64,
    max_cycles: Option<u64>,
    balance: f64,
) -> Result<()> {
    let config = load_config(config_path)?;
    let journal = open_journal(&config)?;
    let source: Box<dyn CandleSource> = if synthetic {
        Box::new(SyntheticSource::new(seed))
    } else {
        Box::new(BinanceFuturesSource::new().context("building Binance client")?)
    };
    info!(
        symbol = %config.symbol,
        source = source.name(),
        interval_secs = config.check_interval_secs,
        "starting live paper trading"
    );

    let broker = PaperBroker::new(balance);
    let mut trader = Trader::new(config, source, Box::new(broker.clone()), Box::new(broker.clone()))?;
    if let Some(journal) = journal {
        trader = trader.with_journal(journal);
    }
    let summary = trader.run(max_cycles)?;

    print_summary(&summary);
    println!("Final balance:    {:.2}", broker.balance());
    Ok(())
}

fn print_summary(summary: &RunSummary) {
    println!("Cycles:           {}", summary.cycles);
    println!("Entries:          {}", summary.entries);
    println!("Exits:            {}", summary.exits);
    println!("Suppressed:       {}", summary.suppressed);
    println!("Rejected:         {}", summary.rejected);
}
