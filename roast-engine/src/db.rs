use std::str::FromStr;
use std::time::Duration;

use chrono::Utc;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::SqliteConnection;
use tracing::debug;

use crate::error::{EngineError, Result};

pub type Db = SqlitePool;

/// Tables this job reads (seeded externally) and writes (ledger, tier
/// history, tier cache, run lock). Bootstrap is idempotent so a fresh
/// database file is usable immediately.
const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS participants (
        wallet         TEXT PRIMARY KEY,
        created_at     INTEGER NOT NULL,
        referral_count INTEGER NOT NULL DEFAULT 0,
        handle         TEXT
    )",
    "CREATE TABLE IF NOT EXISTS social_connections (
        wallet   TEXT PRIMARY KEY,
        handle   TEXT NOT NULL,
        verified INTEGER NOT NULL DEFAULT 0
    )",
    "CREATE TABLE IF NOT EXISTS purchases (
        id         INTEGER PRIMARY KEY AUTOINCREMENT,
        wallet     TEXT NOT NULL,
        price      REAL NOT NULL,
        status     TEXT NOT NULL,
        created_at INTEGER NOT NULL
    )",
    "CREATE INDEX IF NOT EXISTS idx_purchases_wallet ON purchases (wallet, status)",
    "CREATE TABLE IF NOT EXISTS referral_edges (
        referred_wallet TEXT PRIMARY KEY,
        direct_referrer TEXT NOT NULL,
        grand_referrer  TEXT
    )",
    "CREATE INDEX IF NOT EXISTS idx_edges_direct ON referral_edges (direct_referrer)",
    "CREATE INDEX IF NOT EXISTS idx_edges_grand ON referral_edges (grand_referrer)",
    "CREATE TABLE IF NOT EXISTS daily_points (
        id                  INTEGER PRIMARY KEY AUTOINCREMENT,
        wallet              TEXT NOT NULL,
        handle              TEXT,
        total_referrals     INTEGER NOT NULL,
        active_referrals    INTEGER NOT NULL,
        referral_tx_value   REAL NOT NULL,
        roast_earned        REAL NOT NULL,
        mindshare           REAL NOT NULL,
        total_points        INTEGER NOT NULL,
        daily_points_earned INTEGER NOT NULL,
        daily_rank          INTEGER,
        created_at          INTEGER NOT NULL
    )",
    "CREATE INDEX IF NOT EXISTS idx_daily_points_wallet ON daily_points (wallet, id)",
    "CREATE INDEX IF NOT EXISTS idx_daily_points_day ON daily_points (created_at)",
    "CREATE TABLE IF NOT EXISTS tier_history (
        id                  INTEGER PRIMARY KEY AUTOINCREMENT,
        wallet              TEXT NOT NULL,
        tier                TEXT NOT NULL,
        previous_tier       TEXT,
        points_at_change    INTEGER NOT NULL,
        referrals_at_change INTEGER NOT NULL,
        created_at          INTEGER NOT NULL
    )",
    "CREATE INDEX IF NOT EXISTS idx_tier_history_wallet ON tier_history (wallet, id)",
    "CREATE TABLE IF NOT EXISTS current_tier (
        wallet     TEXT PRIMARY KEY,
        tier       TEXT NOT NULL,
        updated_at INTEGER NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS run_lock (
        id         INTEGER PRIMARY KEY CHECK (id = 1),
        holder     TEXT NOT NULL,
        expires_at INTEGER NOT NULL
    )",
];

/// Open a pool against a SQLite URL (e.g. `sqlite:roast.db` or
/// `sqlite::memory:`).
///
/// A single connection is enough for a sequential batch job, and it keeps
/// in-memory databases coherent across the whole run.
pub async fn connect(url: &str, create_if_missing: bool, busy_timeout_ms: u64) -> Result<Db> {
    let opts = SqliteConnectOptions::from_str(url)
        .map_err(|e| EngineError::Config(format!("bad database url {url:?}: {e}")))?
        .create_if_missing(create_if_missing)
        .busy_timeout(Duration::from_millis(busy_timeout_ms))
        .foreign_keys(false);

    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(opts)
        .await?;
    Ok(pool)
}

pub async fn migrate(pool: &Db) -> Result<()> {
    for stmt in SCHEMA {
        sqlx::query(stmt).execute(pool).await?;
    }
    debug!("schema bootstrap complete ({} statements)", SCHEMA.len());
    Ok(())
}

/// Current time as unix milliseconds; every persisted timestamp goes
/// through here.
pub fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

/// Take the single-row advisory run lock, or fail if another holder's
/// lease is still live. The scheduler is expected to guarantee one run at
/// a time; this makes that assumption enforceable.
pub async fn acquire_run_lock(
    conn: &mut SqliteConnection,
    holder: &str,
    lease: Duration,
    now_ms: i64,
) -> Result<()> {
    let expires_at = now_ms + lease.as_millis() as i64;
    let res = sqlx::query(
        "INSERT INTO run_lock (id, holder, expires_at) VALUES (1, ?, ?)
         ON CONFLICT (id) DO UPDATE
            SET holder = excluded.holder, expires_at = excluded.expires_at
          WHERE run_lock.expires_at <= ?",
    )
    .bind(holder)
    .bind(expires_at)
    .bind(now_ms)
    .execute(&mut *conn)
    .await?;

    if res.rows_affected() == 0 {
        return Err(EngineError::Config(
            "run lock is held by another process (lease not expired)".into(),
        ));
    }
    debug!(holder, expires_at, "run lock acquired");
    Ok(())
}

/// Release only our own lock row; a reclaimed (expired) lock belonging to
/// someone else is left alone.
pub async fn release_run_lock(conn: &mut SqliteConnection, holder: &str) -> Result<()> {
    sqlx::query("DELETE FROM run_lock WHERE id = 1 AND holder = ?")
        .bind(holder)
        .execute(&mut *conn)
        .await?;
    Ok(())
}
