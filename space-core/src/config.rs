//! Configuration for the space engine

use crate::block::BITS_PER_TRANSACTION;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Space engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Data directory for the RocksDB block store
    pub data_dir: PathBuf,

    /// Per-block byte budget expressed in bits; divided by the average
    /// per-transaction column width to obtain the block capacity in
    /// transactions.
    pub block_bits: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data/space"),
            block_bits: 1024 * 1024,
        }
    }
}

impl Config {
    /// Nominal block capacity in transactions, derived from the bit
    /// budget. At least 1, and capped so entry-column boundary offsets
    /// always fit in the block's u16 boundary column.
    pub fn block_capacity(&self) -> usize {
        let capacity = self.block_bits / BITS_PER_TRANSACTION;
        capacity.clamp(1, u16::MAX as u64 / 2) as usize
    }

    /// Load from a TOML file
    pub fn from_file(path: impl AsRef<std::path::Path>) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| crate::Error::Config(format!("failed to parse config: {}", e)))?;
        Ok(config)
    }

    /// Load from environment variables
    pub fn from_env() -> crate::Result<Self> {
        let mut config = Config::default();

        if let Ok(data_dir) = std::env::var("SPACE_DATA_DIR") {
            config.data_dir = PathBuf::from(data_dir);
        }

        if let Ok(bits) = std::env::var("SPACE_BLOCK_BITS") {
            config.block_bits = bits
                .parse()
                .map_err(|e| crate::Error::Config(format!("invalid SPACE_BLOCK_BITS: {}", e)))?;
        }

        Ok(config)
    }
}
