//! Space Core
//!
//! Block-paginated columnar storage engine for double-entry bookkeeping
//! transactions.
//!
//! # Architecture
//!
//! - **Packed columns**: transactions live in fixed-capacity
//!   [`DataBlock`] pages as parallel flat arrays
//! - **Pluggable persistence**: the [`BlockStore`] protocol only ever
//!   moves opaque blocks, so any ordered block container can back a
//!   space (in-memory list, RocksDB, remote document store)
//! - **Streaming scans**: every read is a producer task feeding a
//!   bounded channel; dropping the stream cancels the producer
//! - **Sequential writes**: one shared sink per store, one in-flight
//!   block write at a time
//!
//! # Preconditions
//!
//! The engine stays free of domain assumptions; these are caller
//! discipline, not validated at runtime:
//!
//! - Moments are unique within one space
//! - Projection windows do not overlap
//! - Writers against one backing store are externally serialized
//!
//! # Example
//!
//! ```no_run
//! use space_core::{ChannelSpace, Config, LargeSpace, MemoryStore, Space};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> space_core::Result<()> {
//!     let store = Arc::new(MemoryStore::new());
//!     let mut space = LargeSpace::new(store, &Config::default());
//!
//!     let incoming = ChannelSpace::from_transactions(vec![]);
//!     space.append(&incoming).await?;
//!
//!     let all = space.transactions().collect().await?;
//!     println!("{} transactions", all.len());
//!     Ok(())
//! }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, unused_qualifications)]

pub mod array;
pub mod block;
pub mod config;
pub mod error;
pub mod large;
pub mod rocks;
pub mod small;
pub mod space;
pub mod store;
pub mod types;

// Re-exports
pub use array::Array;
pub use block::{BlockKey, DataBlock};
pub use config::Config;
pub use error::{Error, Result};
pub use large::LargeSpace;
pub use rocks::RocksStore;
pub use small::SmallSpace;
pub use space::{ChannelSpace, Space, TransactionStream};
pub use store::{put_block, BlockSource, BlockStore, BlockWrite, MemoryStore};
pub use types::{
    Account, Amount, Date, DateRange, Entries, Moment, MomentRange, Transaction,
};
