//! Run orchestration: lock → mindshare pool → batched scoring → rank
//! pass.
//!
//! Batches are the unit of atomicity. Each batch of participants is
//! scored and persisted inside one transaction; any failure rolls that
//! whole batch back and aborts the run, while previously committed
//! batches stay committed.

use std::collections::HashSet;

use serde::Serialize;
use sqlx::{Connection, SqliteConnection};
use tracing::{debug, info, warn};

use crate::config::RunConfig;
use crate::db::{self, Db};
use crate::error::{EngineError, Result};
use crate::feed::MindsharePool;
use crate::ledger;
use crate::rank;
use crate::score;
use crate::select::{self, Participant};
use crate::tier;

/// What a completed run did, for logs and the `--json` summary.
#[derive(Debug, Default, Clone, Serialize)]
pub struct RunSummary {
    pub participants_processed: u64,
    pub batches_committed: u64,
    pub tier_changes: u64,
    /// Sum of `daily_points_earned` across inserted ledger rows.
    pub points_awarded: i64,
    pub roast_earned: f64,
    pub ranked_rows: u64,
}

/// Per-batch tallies folded into the run summary on commit.
#[derive(Debug, Default)]
pub struct BatchStats {
    pub processed: u64,
    pub tier_changes: u64,
    pub points_awarded: i64,
    pub roast_earned: f64,
}

/// Execute one full run. Holds the advisory run lock for the duration;
/// a live lock held elsewhere is a configuration error, reported before
/// any write happens.
pub async fn run(pool: &Db, cfg: &RunConfig) -> Result<RunSummary> {
    if cfg.batch_size == 0 {
        return Err(EngineError::Config("batch size must be positive".into()));
    }

    let mindshare = match &cfg.feed_path {
        Some(path) => MindsharePool::load(path)?,
        None => {
            info!("no mindshare feed supplied; proceeding with empty allocation");
            MindsharePool::empty()
        }
    };

    // One timestamp for the whole run: every ledger row and the rank
    // window use it, so a run that straddles UTC midnight still lands
    // all of its rows in a single ranked day.
    let started_ms = db::now_ms();

    let mut conn = pool.acquire().await?;
    db::acquire_run_lock(&mut conn, &cfg.lock_holder, cfg.lock_lease, started_ms).await?;
    let result = run_locked(&mut conn, cfg, &mindshare, started_ms).await;
    if let Err(e) = db::release_run_lock(&mut conn, &cfg.lock_holder).await {
        warn!("failed to release run lock: {e}");
    }
    result
}

async fn run_locked(
    conn: &mut SqliteConnection,
    cfg: &RunConfig,
    mindshare: &MindsharePool,
    started_ms: i64,
) -> Result<RunSummary> {
    let participants = match &cfg.target_wallet {
        Some(wallet) => {
            match select::single_participant(&mut *conn, wallet, &cfg.excluded).await? {
                Some(p) => vec![p],
                // Excluded or unverified target: logged no-op, zero writes.
                None => return Ok(RunSummary::default()),
            }
        }
        None => select::eligible_participants(&mut *conn, &cfg.excluded).await?,
    };
    info!(
        participants = participants.len(),
        batch_size = cfg.batch_size,
        "run starting"
    );

    let mut summary = RunSummary::default();
    for batch in participants.chunks(cfg.batch_size) {
        let stats = process_batch(&mut *conn, batch, mindshare, &cfg.excluded, started_ms).await?;
        summary.participants_processed += stats.processed;
        summary.tier_changes += stats.tier_changes;
        summary.points_awarded += stats.points_awarded;
        summary.roast_earned += stats.roast_earned;
        summary.batches_committed += 1;
    }

    let (day_start, day_end) = rank::utc_day_bounds(started_ms);
    let mut tx = conn.begin().await?;
    summary.ranked_rows = rank::assign_daily_ranks(&mut tx, day_start, day_end).await?;
    tx.commit().await?;

    info!(
        processed = summary.participants_processed,
        batches = summary.batches_committed,
        tier_changes = summary.tier_changes,
        "run complete"
    );
    Ok(summary)
}

/// Score and persist one batch inside a single transaction. Any error
/// (aggregation, ledger write, tier write) rolls back every participant
/// of the batch, including those already processed. `now_ms` is the
/// run's anchor timestamp, shared by every row the run writes.
pub async fn process_batch(
    conn: &mut SqliteConnection,
    batch: &[Participant],
    mindshare: &MindsharePool,
    excluded: &HashSet<String>,
    now_ms: i64,
) -> Result<BatchStats> {
    let mut tx = conn.begin().await?;
    let mut stats = BatchStats::default();

    for participant in batch {
        let breakdown = score::aggregate(&mut tx, participant, mindshare, excluded).await?;
        let delta = ledger::append_entry(&mut tx, participant, &breakdown, now_ms).await?;
        let new_tier = tier::resolve(
            participant.referral_count,
            breakdown.total_points,
            breakdown.purchase_count,
        );
        let change = tier::record_transition(
            &mut tx,
            &participant.wallet,
            new_tier,
            breakdown.total_points,
            participant.referral_count,
            now_ms,
        )
        .await?;

        stats.processed += 1;
        stats.points_awarded += delta;
        stats.roast_earned += breakdown.roast_earned;
        if change.is_some() {
            stats.tier_changes += 1;
        }
        debug!(
            wallet = %participant.wallet,
            total = breakdown.total_points,
            delta,
            tier = new_tier.as_str(),
            "participant scored"
        );
    }

    tx.commit().await?;
    Ok(stats)
}
