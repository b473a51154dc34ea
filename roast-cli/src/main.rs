//! `roast-rewards`: daily points, tier, and ranking job for the ROAST
//! referral program.
//!
//! Invoked by an external scheduler; exits 0 on a fully committed run
//! (including no-op single-target runs) and non-zero on any error, with
//! the failing batch rolled back.

use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use dotenvy::dotenv;
use roast_engine::config::{canonical_wallet, parse_exclusion_list, RunConfig};
use roast_engine::{db, runner};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "roast-rewards")]
#[command(about = "Compute daily ROAST points, tiers, and ranks", long_about = None)]
#[command(version)]
struct Cli {
    /// SQLite database URL (e.g. sqlite:roast.db)
    #[arg(long, env = "DATABASE_URL")]
    database_url: String,

    /// Create the database file if it does not exist
    #[arg(long)]
    create_db: bool,

    /// SQLite busy timeout in milliseconds
    #[arg(long, default_value_t = 5000)]
    busy_timeout_ms: u64,

    /// Mindshare feed CSV (username,normalizedMindShare); omit for an
    /// empty allocation
    #[arg(long)]
    feed: Option<PathBuf>,

    /// Score a single wallet instead of the full population
    #[arg(long)]
    wallet: Option<String>,

    /// Wallet to exclude from the run (repeatable)
    #[arg(long = "exclude")]
    exclude: Vec<String>,

    /// File with one excluded wallet per line (# comments allowed)
    #[arg(long)]
    exclude_file: Option<PathBuf>,

    /// Participants per transaction
    #[arg(long, default_value_t = 100)]
    batch_size: usize,

    /// Run-lock lease in seconds
    #[arg(long, default_value_t = 900)]
    lock_lease_secs: u64,

    /// Print a JSON run summary to stdout
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    let mut excluded: HashSet<String> = cli.exclude.iter().map(|w| canonical_wallet(w)).collect();
    if let Some(path) = &cli.exclude_file {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("cannot read exclusion file {}", path.display()))?;
        excluded.extend(parse_exclusion_list(&text));
    }
    if !excluded.is_empty() {
        info!(count = excluded.len(), "exclusion list loaded");
    }

    let pool = db::connect(&cli.database_url, cli.create_db, cli.busy_timeout_ms).await?;
    db::migrate(&pool).await?;

    let cfg = RunConfig {
        feed_path: cli.feed,
        target_wallet: cli.wallet,
        excluded,
        batch_size: cli.batch_size,
        lock_lease: Duration::from_secs(cli.lock_lease_secs),
        ..RunConfig::default()
    };

    let summary = runner::run(&pool, &cfg).await?;

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        info!(
            processed = summary.participants_processed,
            batches = summary.batches_committed,
            tier_changes = summary.tier_changes,
            points = summary.points_awarded,
            ranked = summary.ranked_rows,
            "done"
        );
    }
    Ok(())
}
