//! Tier ladder, resolution, and upgrade-only transition recording.

use serde::{Deserialize, Serialize};
use sqlx::{Row, SqliteConnection};
use tracing::{debug, info};

use crate::error::{EngineError, Result};

/// Membership tiers, lowest to highest. Variant order is the ladder
/// order, so `Ord` compares tiers directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Tier {
    Silver,
    Gold,
    Platinum,
    Emerald,
    Diamond,
    Unicorn,
}

/// Silver qualifies on the participant's own purchases, not referrals.
pub const SILVER_MIN_OWN_PURCHASES: i64 = 5;

/// (tier, referral threshold, point threshold), highest first. A tier
/// qualifies on *either* threshold independently.
const LADDER: [(Tier, i64, i64); 5] = [
    (Tier::Unicorn, 500, 500_000),
    (Tier::Diamond, 200, 200_000),
    (Tier::Emerald, 100, 100_000),
    (Tier::Platinum, 50, 50_000),
    (Tier::Gold, 20, 20_000),
];

impl Tier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Silver => "silver",
            Tier::Gold => "gold",
            Tier::Platinum => "platinum",
            Tier::Emerald => "emerald",
            Tier::Diamond => "diamond",
            Tier::Unicorn => "unicorn",
        }
    }

    pub fn from_str(s: &str) -> Option<Tier> {
        match s {
            "silver" => Some(Tier::Silver),
            "gold" => Some(Tier::Gold),
            "platinum" => Some(Tier::Platinum),
            "emerald" => Some(Tier::Emerald),
            "diamond" => Some(Tier::Diamond),
            "unicorn" => Some(Tier::Unicorn),
            _ => None,
        }
    }

    /// Commission rate applied to referral transaction value.
    pub fn commission_rate(&self) -> f64 {
        match self {
            Tier::Silver => 0.10,
            Tier::Gold => 0.15,
            Tier::Platinum => 0.20,
            Tier::Emerald => 0.25,
            Tier::Diamond => 0.30,
            Tier::Unicorn => 0.40,
        }
    }
}

/// Walk the ladder top-down, first match wins. Each rung is an
/// independent predicate (referrals OR points), so a wallet with a huge
/// referral count and zero points still reaches a high tier. Silver's
/// rung is own purchases; no match at all defaults to Silver.
pub fn resolve(referral_count: i64, total_points: i64, own_purchase_count: i64) -> Tier {
    for (tier, referral_min, points_min) in LADDER {
        if referral_count >= referral_min || total_points >= points_min {
            return tier;
        }
    }
    if own_purchase_count >= SILVER_MIN_OWN_PURCHASES {
        return Tier::Silver;
    }
    // Nothing matched, Silver is also the default.
    Tier::Silver
}

/// Cached "current tier" for a wallet, `None` when never recorded.
pub async fn cached_tier(conn: &mut SqliteConnection, wallet: &str) -> Result<Option<Tier>> {
    let row = sqlx::query("SELECT tier FROM current_tier WHERE wallet = ?")
        .bind(wallet)
        .fetch_optional(&mut *conn)
        .await?;
    match row {
        None => Ok(None),
        Some(row) => {
            let raw: String = row.try_get("tier")?;
            Tier::from_str(&raw).map(Some).ok_or_else(|| {
                EngineError::Invariant(format!("unknown tier {raw:?} cached for {wallet}"))
            })
        }
    }
}

/// A committed tier change (first entry has `from = None`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TierChange {
    pub from: Option<Tier>,
    pub to: Tier,
}

/// Persist a tier change only on first-ever entry or strict upgrade.
///
/// Demotions are computed and logged but intentionally never committed:
/// neither the history table nor the cache moves down.
pub async fn record_transition(
    conn: &mut SqliteConnection,
    wallet: &str,
    new_tier: Tier,
    points: i64,
    referrals: i64,
    now_ms: i64,
) -> Result<Option<TierChange>> {
    let cached = cached_tier(&mut *conn, wallet).await?;

    let change = match cached {
        None => TierChange { from: None, to: new_tier },
        Some(current) if new_tier > current => TierChange { from: Some(current), to: new_tier },
        Some(current) => {
            if new_tier < current {
                debug!(
                    wallet,
                    current = current.as_str(),
                    computed = new_tier.as_str(),
                    "demotion computed, suppressed"
                );
            }
            return Ok(None);
        }
    };

    sqlx::query(
        "INSERT INTO tier_history
            (wallet, tier, previous_tier, points_at_change, referrals_at_change, created_at)
         VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(wallet)
    .bind(change.to.as_str())
    .bind(change.from.map(|t| t.as_str()))
    .bind(points)
    .bind(referrals)
    .bind(now_ms)
    .execute(&mut *conn)
    .await?;

    match change.from {
        None => {
            sqlx::query("INSERT INTO current_tier (wallet, tier, updated_at) VALUES (?, ?, ?)")
                .bind(wallet)
                .bind(change.to.as_str())
                .bind(now_ms)
                .execute(&mut *conn)
                .await?;
        }
        Some(_) => {
            let res = sqlx::query("UPDATE current_tier SET tier = ?, updated_at = ? WHERE wallet = ?")
                .bind(change.to.as_str())
                .bind(now_ms)
                .bind(wallet)
                .execute(&mut *conn)
                .await?;
            if res.rows_affected() != 1 {
                return Err(EngineError::Invariant(format!(
                    "tier cache update for {wallet} touched {} rows, expected 1",
                    res.rows_affected()
                )));
            }
        }
    }

    info!(
        wallet,
        from = change.from.map(|t| t.as_str()).unwrap_or("-"),
        to = change.to.as_str(),
        "tier recorded"
    );
    Ok(Some(change))
}
