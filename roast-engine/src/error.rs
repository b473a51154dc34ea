use thiserror::Error;

/// Engine-level failure taxonomy.
///
/// `Config` aborts before any write. `Invariant` and `Db` abort the
/// containing batch transaction, which rolls back in full; the run then
/// fails rather than skipping the offending participant.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("invariant violation: {0}")]
    Invariant(String),

    #[error("database error: {0}")]
    Db(#[from] sqlx::Error),
}

pub type Result<T> = std::result::Result<T, EngineError>;
