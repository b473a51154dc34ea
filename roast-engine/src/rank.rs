//! Daily rank pass: one full-window recompute over the current UTC day.

use sqlx::SqliteConnection;
use tracing::info;

use crate::error::Result;

const DAY_MS: i64 = 86_400_000;

/// `[start, end)` of the UTC calendar day containing `now_ms`.
pub fn utc_day_bounds(now_ms: i64) -> (i64, i64) {
    let start = now_ms - now_ms.rem_euclid(DAY_MS);
    (start, start + DAY_MS)
}

/// Rank every ledger row created in `[day_start_ms, day_end_ms)` by
/// daily delta, highest first, ties broken by earlier insertion. Ranks
/// are written back onto the rows; re-running over unchanged data yields
/// identical ranks.
pub async fn assign_daily_ranks(
    conn: &mut SqliteConnection,
    day_start_ms: i64,
    day_end_ms: i64,
) -> Result<u64> {
    let ids: Vec<i64> = sqlx::query_scalar(
        "SELECT id FROM daily_points
          WHERE created_at >= ? AND created_at < ?
          ORDER BY daily_points_earned DESC, created_at ASC, id ASC",
    )
    .bind(day_start_ms)
    .bind(day_end_ms)
    .fetch_all(&mut *conn)
    .await?;

    for (idx, id) in ids.iter().enumerate() {
        sqlx::query("UPDATE daily_points SET daily_rank = ? WHERE id = ?")
            .bind((idx + 1) as i64)
            .bind(id)
            .execute(&mut *conn)
            .await?;
    }

    info!(rows = ids.len(), "daily ranks assigned");
    Ok(ids.len() as u64)
}
