//! Packed columnar block codec
//!
//! A [`DataBlock`] is one fixed-capacity page of transactions stored as
//! parallel flat columns: moments, dates, boundary offsets, and the
//! flattened account/value pairs of every transaction's entries.
//! Transaction *i*'s entries occupy `a[b[2i]..b[2i+1]]` and
//! `v[b[2i]..b[2i+1]]`. A metadata side table runs parallel to the
//! moment column; an empty blob means "no metadata".

use crate::types::{Account, Date, Entries, Moment, Transaction};
use serde::{Deserialize, Serialize};

/// Column bits one transaction contributes under the assumption of two
/// entries per transaction: one moment (64), one date (32), two
/// accounts (2x32), two values (2x64), two boundary offsets (2x16).
pub const BITS_PER_TRANSACTION: u64 = 64 + 32 + 2 * 32 + 2 * 64 + 2 * 16;

/// Entries per transaction assumed by the capacity heuristic.
pub const AVERAGE_ENTRIES: usize = 2;

/// Most entries one block can hold: the boundary column stores entry
/// offsets as `u16`, so offsets past this would wrap.
pub const MAX_BLOCK_ENTRIES: usize = u16::MAX as usize;

/// Backing-store handle of a block.
///
/// `New` means the block has never been written; the store assigns an
/// id on first write and acknowledges it back. `Existing` writes
/// overwrite the stored block under that id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BlockKey {
    /// Not yet persisted.
    New,
    /// Persisted under the given store-assigned id.
    Existing(u64),
}

impl BlockKey {
    /// Whether this block has never been written.
    pub fn is_new(&self) -> bool {
        matches!(self, BlockKey::New)
    }
}

impl Default for BlockKey {
    fn default() -> Self {
        BlockKey::New
    }
}

/// One page of transactions in packed columnar form.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DataBlock {
    /// Store handle; [`BlockKey::New`] until first written.
    pub key: BlockKey,
    m: Vec<u64>,
    d: Vec<u32>,
    b: Vec<u16>,
    a: Vec<u32>,
    v: Vec<i64>,
    metadata: Vec<Vec<u8>>,
}

impl DataBlock {
    /// Empty block with columns preallocated for `capacity` average
    /// transactions.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            key: BlockKey::New,
            m: Vec::with_capacity(capacity),
            d: Vec::with_capacity(capacity),
            b: Vec::with_capacity(capacity * 2),
            a: Vec::with_capacity(capacity * AVERAGE_ENTRIES),
            v: Vec::with_capacity(capacity * AVERAGE_ENTRIES),
            metadata: Vec::with_capacity(capacity),
        }
    }

    /// Number of transactions in the block.
    pub fn len(&self) -> usize {
        self.m.len()
    }

    /// True when the block holds no transactions.
    pub fn is_empty(&self) -> bool {
        self.m.is_empty()
    }

    /// Total entries across all transactions in the block.
    pub fn entry_len(&self) -> usize {
        self.a.len()
    }

    /// Capacity policy: hard cap with block split. A block accepts a
    /// transaction with `entry_count` entries iff it holds fewer than
    /// `capacity` transactions and its entry columns stay within
    /// `capacity * AVERAGE_ENTRIES` afterward. An empty block accepts
    /// any transaction the boundary column can address
    /// ([`MAX_BLOCK_ENTRIES`]), so an oversized transaction is still
    /// storable, alone in its block.
    pub fn has_room(&self, entry_count: usize, capacity: usize) -> bool {
        if self.a.len() + entry_count > MAX_BLOCK_ENTRIES {
            return false;
        }
        if self.m.is_empty() {
            return true;
        }
        self.m.len() < capacity && self.a.len() + entry_count <= capacity * AVERAGE_ENTRIES
    }

    /// Append one transaction to the columns. No validation beyond the
    /// boundary encoding: the caller checks `has_room` first, which
    /// bounds the entry columns at [`MAX_BLOCK_ENTRIES`].
    pub fn push(&mut self, transaction: &Transaction) {
        let start = self.a.len() as u16;
        self.m.push(transaction.moment.as_u64());
        self.d.push(transaction.date.as_u32());
        for (account, value) in &transaction.entries {
            self.a.push(account.index());
            self.v.push(*value);
        }
        self.b.push(start);
        self.b.push(self.a.len() as u16);
        self.metadata.push(transaction.metadata.clone());
    }

    /// Decode the `index`-th transaction from the columns.
    ///
    /// # Panics
    ///
    /// Panics if `index >= self.len()`.
    pub fn transaction(&self, index: usize) -> Transaction {
        let start = self.b[index * 2] as usize;
        let end = self.b[index * 2 + 1] as usize;
        let mut entries = Entries::with_capacity(end - start);
        for j in start..end {
            entries.insert(Account::new(self.a[j]), self.v[j]);
        }
        Transaction {
            moment: Moment::new(self.m[index]),
            date: Date::new(self.d[index]),
            entries,
            metadata: self.metadata.get(index).cloned().unwrap_or_default(),
        }
    }
}
