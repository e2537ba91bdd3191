//! Error types for the space engine

use thiserror::Error;

/// Result type for space operations
pub type Result<T> = std::result::Result<T, Error>;

/// Space engine errors
#[derive(Error, Debug)]
pub enum Error {
    /// Backing-store read/write failure
    #[error("storage error: {0}")]
    Storage(String),

    /// Block serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    /// A scan or write channel closed unexpectedly
    #[error("channel error: {0}")]
    Channel(String),

    /// Operation not supported by this space variant
    #[error("unsupported operation: {0}")]
    Unsupported(&'static str),

    /// Transaction entry set exceeds what one block can address
    #[error(
        "transaction at moment {moment} has {entries} entries, more than a block can hold ({limit})"
    )]
    TransactionTooLarge {
        /// Moment of the rejected transaction
        moment: u64,
        /// Its entry count
        entries: usize,
        /// The per-block entry limit
        limit: usize,
    },

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<rocksdb::Error> for Error {
    fn from(err: rocksdb::Error) -> Self {
        Error::Storage(err.to_string())
    }
}
