//! settle - replay a batch of blocks through the settlement engine
//!
//! Run with: cargo run -- --batch blocks.json [--config settle.toml]
//!
//! The batch is a JSON list of `{height, txs}` blocks. Every processed block
//! appends one JSON line to the report log.

use chrono::{DateTime, Utc};
use clap::Parser;
use color_eyre::eyre::{Result, WrapErr};
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use settlement::{BlockReceipt, Config, InboundTx, SettlementEngine, TxOutcome};

#[derive(Parser, Debug)]
#[command(name = "settle", version, about = "Replay inbound blocks through the settlement engine")]
struct Args {
    /// TOML config file (environment and .env are used when omitted)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// JSON file with the blocks to process
    #[arg(short, long)]
    batch: PathBuf,

    /// Report log, overrides the configured path
    #[arg(short, long)]
    report: Option<PathBuf>,

    /// Skip the configuration summary and only log warnings
    #[arg(short, long)]
    quiet: bool,
}

#[derive(Debug, Deserialize)]
struct BlockInput {
    height: u64,
    #[serde(default)]
    txs: Vec<InboundTx>,
}

/// One line of the report log
#[derive(Debug, Serialize)]
struct BlockReport {
    timestamp: DateTime<Utc>,
    height: u64,
    accepted: usize,
    refunded: usize,
    failed: usize,
    outbound_due: usize,
    pending_outbound: u64,
    notes: Vec<String>,
}

impl BlockReport {
    fn from_receipt(receipt: &BlockReceipt) -> Self {
        let notes = receipt
            .outcomes
            .iter()
            .enumerate()
            .filter_map(|(i, outcome)| match outcome {
                TxOutcome::Accepted { .. } => None,
                TxOutcome::Refunded { reason, event } => {
                    Some(format!("tx {} refunded (event {}): {}", i, event, reason))
                }
                TxOutcome::Failed(err) => Some(format!("tx {} failed: {}", i, err)),
            })
            .collect();

        Self {
            timestamp: Utc::now(),
            height: receipt.height,
            accepted: receipt.count("accepted"),
            refunded: receipt.count("refunded"),
            failed: receipt.count("failed"),
            outbound_due: receipt.outbound.len(),
            pending_outbound: receipt.pending_outbound,
            notes,
        }
    }

    /// Append this report to a file
    fn append_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        if let Some(parent) = path.as_ref().parent() {
            fs::create_dir_all(parent)?;
        }

        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)?;

        let json = serde_json::to_string(self)?;
        writeln!(file, "{}", json)?;

        Ok(())
    }
}

#[derive(Debug, Default)]
struct Totals {
    blocks: usize,
    txs: usize,
    accepted: usize,
    refunded: usize,
    failed: usize,
    outbound: usize,
}

impl Totals {
    fn add(&mut self, receipt: &BlockReceipt) {
        self.blocks += 1;
        self.txs += receipt.outcomes.len();
        self.accepted += receipt.count("accepted");
        self.refunded += receipt.count("refunded");
        self.failed += receipt.count("failed");
        self.outbound += receipt.outbound.len();
    }
}

fn print_banner() {
    println!();
    println!(
        "{}",
        style("═══════════════════════════════════════════════════════════════").cyan()
    );
    println!("{}", style(" SETTLE - Block Replay").cyan().bold());
    println!(
        "{}",
        style("═══════════════════════════════════════════════════════════════").cyan()
    );
    println!();
}

fn main() -> Result<()> {
    color_eyre::install()?;
    let args = Args::parse();

    let level = if args.quiet { "settlement=warn" } else { "settlement=info" };
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.parse()?))
        .init();

    print_banner();

    // Load configuration
    let config = match &args.config {
        Some(path) => Config::from_file(path)
            .wrap_err_with(|| format!("Failed to read config {}", path.display()))?,
        None => Config::from_env()?,
    };

    if let Err(e) = config.validate() {
        error!("Configuration validation failed: {}", e);
        error!("Please check your config file or .env");
        return Err(e);
    }

    if !args.quiet {
        config.print_summary();
        println!();
    }

    let raw = fs::read_to_string(&args.batch)
        .wrap_err_with(|| format!("Failed to read batch {}", args.batch.display()))?;
    let blocks: Vec<BlockInput> = serde_json::from_str(&raw).wrap_err("Batch is not a list of blocks")?;
    let report_path = args
        .report
        .clone()
        .unwrap_or_else(|| PathBuf::from(&config.report_path));

    let engine = SettlementEngine::new(&config)?;
    info!("Replaying {} blocks from {}", blocks.len(), args.batch.display());

    let bar = ProgressBar::new(blocks.len() as u64);
    bar.set_style(
        ProgressStyle::with_template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} blocks {msg}")?
            .progress_chars("=>-"),
    );

    let start = Instant::now();
    let mut totals = Totals::default();
    for block in &blocks {
        bar.set_message(format!("height {}", block.height));
        let receipt = engine
            .process_block(block.height, &block.txs)
            .wrap_err_with(|| format!("Block {} was not committed", block.height))?;
        BlockReport::from_receipt(&receipt).append_to_file(&report_path)?;
        totals.add(&receipt);
        bar.inc(1);
    }
    bar.finish_and_clear();

    // =============================================
    // SUMMARY
    // =============================================
    let view = engine.snapshot()?;
    let heights = view.heights()?;

    println!(
        "{}",
        style("═══════════════════════════════════════════════════════════════").green()
    );
    println!("{}", style(" REPLAY COMPLETE").green().bold());
    println!(
        "{}",
        style("═══════════════════════════════════════════════════════════════").green()
    );
    println!();
    println!("Summary:");
    println!("  • Blocks: {} in {:?}", totals.blocks, start.elapsed());
    println!(
        "  • Inbound: {} ({} accepted, {} refunded, {} failed)",
        totals.txs,
        style(totals.accepted).green(),
        style(totals.refunded).yellow(),
        style(totals.failed).red()
    );
    println!(
        "  • Outbound: {} due, {} still pending",
        totals.outbound,
        view.pending_outbound_count()?
    );
    println!(
        "  • Heights: statechain {}, observed in {}, signed out {}",
        heights.statechain, heights.last_observed_in, heights.last_signed_out
    );
    println!();

    let pools = view.pools()?;
    if pools.is_empty() {
        println!("{}", style("No pools yet.").yellow());
    } else {
        println!("Pools:");
        for pool in &pools {
            println!("  • {}", style(pool).cyan());
        }
    }
    println!();
    println!("{} Reports appended to: {}", style("📝").cyan(), report_path.display());

    Ok(())
}
