//! Per-participant score aggregation. Pure reads; all persistence lives
//! in the ledger and tier modules.

use std::collections::HashSet;

use serde::Serialize;
use sqlx::SqliteConnection;

use crate::config::canonical_wallet;
use crate::error::{EngineError, Result};
use crate::feed::MindsharePool;
use crate::select::Participant;
use crate::tier::{self, Tier};

pub const POINTS_PER_PURCHASE: i64 = 100;
pub const MILESTONE_EVERY: i64 = 20;
pub const MILESTONE_BONUS: i64 = 10_000;
pub const POINTS_PER_ACTIVE_REFERRAL: i64 = 1_000;
/// Lifetime completed purchases a referred wallet needs to count as
/// "active".
pub const ACTIVE_REFERRAL_MIN_PURCHASES: i64 = 2;

/// Everything one run computes for one participant, before persistence.
#[derive(Debug, Clone, Serialize)]
pub struct ScoreBreakdown {
    pub purchase_count: i64,
    pub purchase_points: i64,
    pub milestone_points: i64,
    pub referral_points: i64,
    pub mindshare_points: i64,
    pub total_points: i64,
    pub active_referrals: i64,
    pub referral_tx_value: f64,
    pub roast_earned: f64,
    /// Raw share from the feed, carried into the ledger for audit.
    pub mindshare_share: f64,
    /// Tier the commission was computed at (pre-upgrade).
    pub commission_tier: Tier,
}

pub fn purchase_points(purchase_count: i64) -> i64 {
    purchase_count * POINTS_PER_PURCHASE
}

/// Every 20th completed purchase banks a 10k bonus.
pub fn milestone_points(purchase_count: i64) -> i64 {
    (purchase_count / MILESTONE_EVERY) * MILESTONE_BONUS
}

/// Combine purchase, milestone, referral, and mindshare points for one
/// participant, and price their referral commission.
///
/// The exclusion set is re-checked here even though the selector already
/// filtered it: an excluded wallet reaching this point means selection is
/// broken, and the batch must abort rather than write a row for it.
pub async fn aggregate(
    conn: &mut SqliteConnection,
    participant: &Participant,
    mindshare: &MindsharePool,
    excluded: &HashSet<String>,
) -> Result<ScoreBreakdown> {
    let wallet = canonical_wallet(&participant.wallet);
    if excluded.contains(&wallet) {
        return Err(EngineError::Invariant(format!(
            "excluded wallet {wallet} reached the aggregator"
        )));
    }

    // Own purchases, window-limited to the participant's lifetime.
    let purchase_count: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM purchases
          WHERE wallet = ? AND status = 'completed' AND created_at >= ?",
    )
    .bind(&wallet)
    .bind(participant.created_at)
    .fetch_one(&mut *conn)
    .await?;

    // A referral is active once the referred wallet has made enough
    // completed purchases, lifetime, no date filter.
    let active_referrals: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM referral_edges re
          WHERE re.direct_referrer = ?
            AND (SELECT COUNT(*) FROM purchases pu
                  WHERE pu.wallet = re.referred_wallet
                    AND pu.status = 'completed') >= ?",
    )
    .bind(&wallet)
    .bind(ACTIVE_REFERRAL_MIN_PURCHASES)
    .fetch_one(&mut *conn)
    .await?;

    // Commission base: completed purchases by direct or grand referees,
    // windowed by *this* participant's creation time.
    let referral_tx_value: f64 = sqlx::query_scalar(
        "SELECT COALESCE(SUM(pu.price), 0.0)
           FROM purchases pu
           JOIN referral_edges re ON re.referred_wallet = pu.wallet
          WHERE (re.direct_referrer = ? OR re.grand_referrer = ?)
            AND pu.status = 'completed'
            AND pu.created_at >= ?",
    )
    .bind(&wallet)
    .bind(&wallet)
    .bind(participant.created_at)
    .fetch_one(&mut *conn)
    .await?;

    // Commission is priced at the tier held before this run's possible
    // upgrade; a never-seen wallet starts at Silver.
    let commission_tier = tier::cached_tier(&mut *conn, &wallet)
        .await?
        .unwrap_or(Tier::Silver);

    let purchase_points = purchase_points(purchase_count);
    let milestone_points = milestone_points(purchase_count);
    let referral_points = active_referrals * POINTS_PER_ACTIVE_REFERRAL;
    let mindshare_points = mindshare.points_for(&participant.handle);
    let total_points = purchase_points + milestone_points + referral_points + mindshare_points;

    Ok(ScoreBreakdown {
        purchase_count,
        purchase_points,
        milestone_points,
        referral_points,
        mindshare_points,
        total_points,
        active_referrals,
        referral_tx_value,
        roast_earned: referral_tx_value * commission_tier.commission_rate(),
        mindshare_share: mindshare.share_for(&participant.handle),
        commission_tier,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn milestone_points_step_every_twenty() {
        assert_eq!(milestone_points(0), 0);
        assert_eq!(milestone_points(19), 0);
        assert_eq!(milestone_points(20), 10_000);
        assert_eq!(milestone_points(37), 10_000);
        assert_eq!(milestone_points(40), 20_000);
    }

    #[test]
    fn purchase_points_are_flat_per_purchase() {
        assert_eq!(purchase_points(0), 0);
        assert_eq!(purchase_points(3), 300);
    }
}
