//! Participant selection: who gets scored this run.

use std::collections::HashSet;

use sqlx::{FromRow, SqliteConnection};
use tracing::info;

use crate::config::canonical_wallet;
use crate::error::Result;

/// A scoring candidate. `handle` comes from the verified social
/// connection; `referral_count` is maintained upstream.
#[derive(Debug, Clone, FromRow)]
pub struct Participant {
    pub wallet: String,
    pub handle: String,
    pub referral_count: i64,
    pub created_at: i64,
}

/// Full-population mode: every participant with a verified social
/// connection, minus the exclusion set. Ordered by creation time then
/// wallet so batching is deterministic across runs.
pub async fn eligible_participants(
    conn: &mut SqliteConnection,
    excluded: &HashSet<String>,
) -> Result<Vec<Participant>> {
    let rows: Vec<Participant> = sqlx::query_as(
        "SELECT p.wallet, sc.handle, p.referral_count, p.created_at
           FROM participants p
           JOIN social_connections sc ON sc.wallet = p.wallet
          WHERE sc.verified = 1
          ORDER BY p.created_at, p.wallet",
    )
    .fetch_all(&mut *conn)
    .await?;

    Ok(rows
        .into_iter()
        .filter(|p| !excluded.contains(&canonical_wallet(&p.wallet)))
        .collect())
}

/// Single-participant mode. An excluded or unverified target is a logged
/// no-op, not an error.
pub async fn single_participant(
    conn: &mut SqliteConnection,
    wallet: &str,
    excluded: &HashSet<String>,
) -> Result<Option<Participant>> {
    let wallet = canonical_wallet(wallet);
    if excluded.contains(&wallet) {
        info!(wallet = %wallet, "target wallet is excluded; nothing to do");
        return Ok(None);
    }

    let row: Option<Participant> = sqlx::query_as(
        "SELECT p.wallet, sc.handle, p.referral_count, p.created_at
           FROM participants p
           JOIN social_connections sc ON sc.wallet = p.wallet
          WHERE p.wallet = ? AND sc.verified = 1",
    )
    .bind(&wallet)
    .fetch_optional(&mut *conn)
    .await?;

    if row.is_none() {
        info!(wallet = %wallet, "target wallet has no verified social connection; nothing to do");
    }
    Ok(row)
}
