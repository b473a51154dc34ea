//! Mindshare pool allocation.
//!
//! The feed is an externally produced CSV ranking social handles by
//! normalized mindshare. The top 100 handles split a fixed daily pool in
//! direct proportion to their share; no renormalization happens, so a
//! feed whose top-100 shares sum below 1.0 simply allocates fewer than
//! `MINDSHARE_POOL` points.

use std::collections::HashMap;
use std::fs::File;
use std::io::Read;
use std::path::Path;

use serde::Deserialize;
use tracing::{debug, info};

use crate::error::{EngineError, Result};

/// Fixed daily pool split across the top cohort.
pub const MINDSHARE_POOL: i64 = 100_000;

/// Size of the cohort that receives mindshare points.
pub const MINDSHARE_TOP_N: usize = 100;

#[derive(Debug, Deserialize)]
struct FeedRow {
    username: String,
    /// Kept as a string so one unparseable row doesn't fail the file.
    #[serde(rename = "normalizedMindShare")]
    normalized_mind_share: String,
}

#[derive(Debug, Clone, Copy)]
struct Allocation {
    points: i64,
    share: f64,
}

/// Handle (lowercase) → allocated points + raw share for ledger audit.
#[derive(Debug, Clone, Default)]
pub struct MindsharePool {
    allocations: HashMap<String, Allocation>,
}

impl MindsharePool {
    /// No feed: every participant gets 0 mindshare points.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Load a feed file. A path that does not exist is the "feed not
    /// delivered today" case: the run proceeds with an empty allocation.
    /// Only a file that exists but cannot be read is an error.
    pub fn load(path: &Path) -> Result<Self> {
        let file = match File::open(path) {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!(path = %path.display(), "mindshare feed absent; proceeding with empty allocation");
                return Ok(Self::empty());
            }
            Err(e) => {
                return Err(EngineError::Config(format!(
                    "cannot read mindshare feed {path:?}: {e}"
                )))
            }
        };
        let pool = Self::from_reader(file)?;
        info!(
            handles = pool.len(),
            allocated = pool.total_allocated(),
            "mindshare pool loaded"
        );
        Ok(pool)
    }

    pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
        let mut rdr = csv::ReaderBuilder::new()
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(reader);

        let mut rows: Vec<(String, f64)> = Vec::new();
        let mut dropped = 0usize;
        for record in rdr.deserialize::<FeedRow>() {
            let row = match record {
                Ok(row) => row,
                Err(_) => {
                    dropped += 1;
                    continue;
                }
            };
            let handle = normalize_handle(&row.username);
            let share = row.normalized_mind_share.trim().parse::<f64>();
            match (handle, share) {
                (Some(handle), Ok(share)) if share >= 0.0 && share.is_finite() => {
                    rows.push((handle, share));
                }
                _ => dropped += 1,
            }
        }
        if dropped > 0 {
            debug!(dropped, "malformed mindshare rows skipped");
        }

        // Highest share first; ties keep feed order.
        rows.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        rows.truncate(MINDSHARE_TOP_N);

        let allocations = rows
            .into_iter()
            .map(|(handle, share)| {
                let points = (share * MINDSHARE_POOL as f64).round() as i64;
                (handle, Allocation { points, share })
            })
            .collect();
        Ok(Self { allocations })
    }

    /// Points for a handle, 0 when absent or outside the top cohort.
    pub fn points_for(&self, handle: &str) -> i64 {
        self.allocations
            .get(&handle.to_ascii_lowercase())
            .map(|a| a.points)
            .unwrap_or(0)
    }

    /// Raw share value for the ledger's audit column.
    pub fn share_for(&self, handle: &str) -> f64 {
        self.allocations
            .get(&handle.to_ascii_lowercase())
            .map(|a| a.share)
            .unwrap_or(0.0)
    }

    pub fn len(&self) -> usize {
        self.allocations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.allocations.is_empty()
    }

    pub fn total_allocated(&self) -> i64 {
        self.allocations.values().map(|a| a.points).sum()
    }
}

/// Strip a leading `@`, lowercase; empty handles are malformed.
fn normalize_handle(raw: &str) -> Option<String> {
    let handle = raw.trim().trim_start_matches('@').to_ascii_lowercase();
    if handle.is_empty() {
        None
    } else {
        Some(handle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pool_from(csv: &str) -> MindsharePool {
        MindsharePool::from_reader(csv.as_bytes()).unwrap()
    }

    #[test]
    fn proportional_allocation_without_renormalization() {
        let pool = pool_from("username,normalizedMindShare\n@alice,0.6\nbob,0.4\n");
        assert_eq!(pool.points_for("alice"), 60_000);
        assert_eq!(pool.points_for("BOB"), 40_000);
        assert_eq!(pool.total_allocated(), 100_000);
    }

    #[test]
    fn partial_coverage_allocates_less_than_pool() {
        let pool = pool_from("username,normalizedMindShare\nalice,0.25\nbob,0.1\n");
        assert_eq!(pool.total_allocated(), 35_000);
    }

    #[test]
    fn rank_101_gets_nothing() {
        let mut csv = String::from("username,normalizedMindShare\n");
        // 100 handles above, one straggler below.
        for i in 0..100 {
            csv.push_str(&format!("user{i},0.009\n"));
        }
        csv.push_str("straggler,0.001\n");
        let pool = pool_from(&csv);
        assert_eq!(pool.len(), 100);
        assert_eq!(pool.points_for("user42"), 900);
        assert_eq!(pool.points_for("straggler"), 0);
    }

    #[test]
    fn malformed_rows_are_dropped() {
        let pool = pool_from(
            "username,normalizedMindShare\n\
             alice,0.5\n\
             ,0.3\n\
             bob,not-a-number\n\
             carol,-0.2\n\
             @,0.1\n",
        );
        assert_eq!(pool.len(), 1);
        assert_eq!(pool.points_for("alice"), 50_000);
    }

    #[test]
    fn handles_are_at_stripped_and_lowercased() {
        let pool = pool_from("username,normalizedMindShare\n@CryptoChad,0.02\n");
        assert_eq!(pool.points_for("cryptochad"), 2_000);
        assert_eq!(pool.share_for("CryptoChad"), 0.02);
    }

    #[test]
    fn empty_pool_scores_zero() {
        let pool = MindsharePool::empty();
        assert_eq!(pool.points_for("anyone"), 0);
        assert!(pool.is_empty());
    }

    #[test]
    fn absent_feed_file_yields_empty_pool() {
        let path = std::env::temp_dir().join("roast_feed_absent_test.csv");
        std::fs::remove_file(&path).ok();
        let pool = MindsharePool::load(&path).unwrap();
        assert!(pool.is_empty());
        assert_eq!(pool.points_for("alice"), 0);
    }
}
