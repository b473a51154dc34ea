//! # roast-engine
//!
//! Daily scoring engine for the ROAST referral rewards program.
//!
//! One invocation computes, for every eligible participant (or a single
//! targeted wallet), a daily point score from purchases, milestones,
//! referral activity and an externally fed mindshare pool, resolves a
//! cumulative tier, appends an immutable ledger snapshot, and finally
//! ranks the whole day's ledger. Participants are processed in fixed-size
//! batches, one database transaction per batch.
//!
//! ```rust,ignore
//! use roast_engine::{db, runner, config::RunConfig};
//!
//! let pool = db::connect("sqlite:roast.db", true, 5000).await?;
//! db::migrate(&pool).await?;
//! let summary = runner::run(&pool, &RunConfig::default()).await?;
//! ```

pub mod config;
pub mod db;
pub mod error;
pub mod feed;
pub mod ledger;
pub mod rank;
pub mod runner;
pub mod score;
pub mod select;
pub mod tier;

pub use config::RunConfig;
pub use error::{EngineError, Result};
pub use runner::RunSummary;
