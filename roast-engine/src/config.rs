use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration;

/// Participants per batch; one batch commits as one transaction.
pub const DEFAULT_BATCH_SIZE: usize = 100;

/// Default lease on the advisory run lock.
pub const DEFAULT_LOCK_LEASE: Duration = Duration::from_secs(900);

/// Everything a single run needs beyond the database pool.
#[derive(Debug, Clone)]
pub struct RunConfig {
    /// Optional mindshare feed; `None` means an empty allocation.
    pub feed_path: Option<PathBuf>,
    /// Optional single-participant target (any casing accepted).
    pub target_wallet: Option<String>,
    /// Wallets that must never appear in the ledger or tier tables
    /// (stored lowercase).
    pub excluded: HashSet<String>,
    pub batch_size: usize,
    /// Identifies this process in the run-lock row.
    pub lock_holder: String,
    pub lock_lease: Duration,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            feed_path: None,
            target_wallet: None,
            excluded: HashSet::new(),
            batch_size: DEFAULT_BATCH_SIZE,
            lock_holder: format!("roast-rewards-{}", std::process::id()),
            lock_lease: DEFAULT_LOCK_LEASE,
        }
    }
}

/// Wallet addresses are case-insensitive; lowercase is canonical everywhere.
pub fn canonical_wallet(wallet: &str) -> String {
    wallet.trim().to_ascii_lowercase()
}

/// Parse an exclusion-list file: one wallet per line, blank lines and
/// `#` comments ignored, entries lowercased.
pub fn parse_exclusion_list(text: &str) -> HashSet<String> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(canonical_wallet)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exclusion_list_skips_blanks_and_comments() {
        let text = "# ops wallets\n0xABC\n\n  0xdef  \n# trailing\n";
        let set = parse_exclusion_list(text);
        assert_eq!(set.len(), 2);
        assert!(set.contains("0xabc"));
        assert!(set.contains("0xdef"));
    }

    #[test]
    fn canonical_wallet_lowercases_and_trims() {
        assert_eq!(canonical_wallet(" 0xAbCd "), "0xabcd");
    }
}
