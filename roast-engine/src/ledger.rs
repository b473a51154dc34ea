//! Append-only daily ledger. A participant's "current" state is always
//! their most recently inserted row; nothing here updates or deletes.

use sqlx::SqliteConnection;

use crate::error::Result;
use crate::score::ScoreBreakdown;
use crate::select::Participant;

/// `total_points` from the wallet's most recent ledger row, `None` on
/// first sight.
pub async fn latest_total_points(
    conn: &mut SqliteConnection,
    wallet: &str,
) -> Result<Option<i64>> {
    let prev: Option<i64> = sqlx::query_scalar(
        "SELECT total_points FROM daily_points
          WHERE wallet = ? ORDER BY id DESC LIMIT 1",
    )
    .bind(wallet)
    .fetch_optional(&mut *conn)
    .await?;
    Ok(prev)
}

/// Insert one ledger row for this run.
///
/// The daily delta is floored at 0: a mindshare shrink can lower
/// `total_points` day-over-day, but the recorded delta never goes
/// negative. A 0-delta row is still inserted so the rank pass sees every
/// participant.
pub async fn append_entry(
    conn: &mut SqliteConnection,
    participant: &Participant,
    breakdown: &ScoreBreakdown,
    now_ms: i64,
) -> Result<i64> {
    let previous = latest_total_points(&mut *conn, &participant.wallet)
        .await?
        .unwrap_or(0);
    let daily_points_earned = (breakdown.total_points - previous).max(0);

    sqlx::query(
        "INSERT INTO daily_points
            (wallet, handle, total_referrals, active_referrals, referral_tx_value,
             roast_earned, mindshare, total_points, daily_points_earned, daily_rank,
             created_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, NULL, ?)",
    )
    .bind(&participant.wallet)
    .bind(&participant.handle)
    .bind(participant.referral_count)
    .bind(breakdown.active_referrals)
    .bind(breakdown.referral_tx_value)
    .bind(breakdown.roast_earned)
    .bind(breakdown.mindshare_share)
    .bind(breakdown.total_points)
    .bind(daily_points_earned)
    .bind(now_ms)
    .execute(&mut *conn)
    .await?;

    Ok(daily_points_earned)
}
