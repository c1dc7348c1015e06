//! Crate-wide error type.
//!
//! `NoMatch` is intentionally absent here: a failed identification is a
//! regular return value (see [`crate::matcher::MatchOutcome`]), not an error.

/// Errors surfaced at the core's operation boundaries (ingest, identify,
/// open-store). The core never retries internally; retry policy belongs to
/// the caller.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Input could not be decoded, or declared zero channels.
    #[error("invalid audio: {0}")]
    InvalidAudio(String),

    /// Fewer than one full frame (`W` samples) could be produced.
    #[error("audio too short to yield a single frame")]
    EmptyAudio,

    /// An opened store's header disagrees with the runtime configuration.
    #[error("store schema mismatch: {0}")]
    SchemaMismatch(String),

    /// Checksum or structural failure in the index or catalog. Fatal for
    /// the current process; the store must be reopened or rebuilt.
    #[error("store corruption: {0}")]
    StoreCorruption(String),

    /// The operation was cancelled before it committed or returned.
    #[error("operation cancelled")]
    Cancelled,

    /// Unexpected but always recoverable by restart.
    #[error("internal error: {0}")]
    Internal(String),

    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Config(#[from] toml::de::Error),
}

impl Error {
    /// Maps an error to the stable CLI exit code from the external
    /// interface contract (decode failure = 2, schema mismatch = 3).
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::InvalidAudio(_) | Error::EmptyAudio => 2,
            Error::SchemaMismatch(_) => 3,
            _ => 1,
        }
    }
}
