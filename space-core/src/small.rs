//! Dense single-array Space variant
//!
//! [`SmallSpace`] stores one value cube indexed account x date x
//! moment, with date/moment offsets so small value ranges far from
//! zero stay compact, and a `[date][moment]` metadata side table.
//! Suited to small datasets (the cube is dense: extents are bounded by
//! `max - min` along every axis) and used as the append-source adapter
//! when merging foreign data into the block-paginated engine.

use crate::array::Array;
use crate::error::Result;
use crate::space::{Space, TransactionStream};
use crate::types::{
    account_matches, Account, Date, DateRange, Entries, Moment, MomentRange, Transaction,
};
use async_trait::async_trait;
use std::collections::BTreeMap;

/// Dense in-memory space.
///
/// Cell `(i, j, k)` holds the amount of account `i+1` on date
/// `date_offset + j + 1` at moment `moment_offset + k + 1`; zero means
/// "no entry", so zero-valued entries are not representable. The
/// 1-based cell convention means every stored date and moment must be
/// at least 1; value 0 on either axis is out of range and unsupported.
#[derive(Debug, Clone, Default)]
pub struct SmallSpace {
    arr: Array,
    date_offset: u32,
    moment_offset: u64,
    metadata: Vec<Vec<Vec<u8>>>,
}

/// Bounding envelope of a transaction set, used to size the dense
/// array before any value is written.
struct Envelope {
    max_account: u32,
    min_date: u32,
    max_date: u32,
    min_moment: u64,
    max_moment: u64,
}

impl Envelope {
    fn new() -> Self {
        Self {
            max_account: 0,
            min_date: u32::MAX,
            max_date: 0,
            min_moment: u64::MAX,
            max_moment: 0,
        }
    }

    fn observe(&mut self, transaction: &Transaction) {
        self.min_date = self.min_date.min(transaction.date.as_u32());
        self.max_date = self.max_date.max(transaction.date.as_u32());
        self.min_moment = self.min_moment.min(transaction.moment.as_u64());
        self.max_moment = self.max_moment.max(transaction.moment.as_u64());
        for account in transaction.entries.keys() {
            self.max_account = self.max_account.max(account.index());
        }
    }

    fn observe_extents(&mut self, space: &SmallSpace) {
        if space.arr.is_empty() {
            return;
        }
        let (accounts, dates, moments) = space.arr.dimensions();
        self.max_account = self.max_account.max(accounts as u32);
        self.min_date = self.min_date.min(space.date_offset + 1);
        self.max_date = self.max_date.max(space.date_offset + dates as u32);
        self.min_moment = self.min_moment.min(space.moment_offset + 1);
        self.max_moment = self.max_moment.max(space.moment_offset + moments as u64);
    }

    fn is_empty(&self) -> bool {
        self.max_account == 0
    }
}

impl SmallSpace {
    /// Space over the given array with zero offsets. `metadata` is a
    /// `[date][moment]` blob table; pass an empty vector for none.
    pub fn new(arr: Array, metadata: Vec<Vec<Vec<u8>>>) -> Self {
        Self::with_offset(arr, 0, 0, metadata)
    }

    /// Space over the given array and date/moment offsets: cell
    /// `(i, j, k)` maps to date `date_offset + j + 1` and moment
    /// `moment_offset + k + 1`.
    pub fn with_offset(
        arr: Array,
        date_offset: u32,
        moment_offset: u64,
        mut metadata: Vec<Vec<Vec<u8>>>,
    ) -> Self {
        let (_, dates, moments) = arr.dimensions();
        metadata.resize(dates, Vec::new());
        for row in &mut metadata {
            row.resize(moments, Vec::new());
        }
        Self {
            arr,
            date_offset,
            moment_offset,
            metadata,
        }
    }

    /// Dense space holding exactly the given transactions, sized to
    /// their bounding envelope. Dates and moments must be at least 1.
    pub fn from_transactions(transactions: &[Transaction]) -> Self {
        let mut space = Self::default();
        let mut envelope = Envelope::new();
        for t in transactions {
            envelope.observe(t);
        }
        if envelope.is_empty() {
            return space;
        }
        space.rebase(&envelope);
        for t in transactions {
            space.insert(t);
        }
        space
    }

    /// Reallocate the array and metadata table to cover `envelope`
    /// (which must already include this space's own extents) and embed
    /// the existing values at their shifted positions.
    fn rebase(&mut self, envelope: &Envelope) {
        let accounts = envelope.max_account as usize;
        let dates = (envelope.max_date - envelope.min_date + 1) as usize;
        let moments = (envelope.max_moment - envelope.min_moment + 1) as usize;
        let mut arr = Array::new(accounts, dates, moments);
        let mut metadata = vec![vec![Vec::new(); moments]; dates];

        if !self.arr.is_empty() {
            let date_shift = (self.date_offset + 1 - envelope.min_date) as usize;
            let moment_shift = (self.moment_offset + 1 - envelope.min_moment) as usize;
            arr.embed(&self.arr, date_shift, moment_shift);
            for (j, row) in self.metadata.iter().enumerate() {
                for (k, blob) in row.iter().enumerate() {
                    if !blob.is_empty() {
                        metadata[j + date_shift][k + moment_shift] = blob.clone();
                    }
                }
            }
        }

        self.arr = arr;
        self.metadata = metadata;
        self.date_offset = envelope.min_date - 1;
        self.moment_offset = envelope.min_moment - 1;
    }

    /// Write one transaction's entries into the array. The array must
    /// already cover the transaction's envelope.
    fn insert(&mut self, transaction: &Transaction) {
        let j = (transaction.date.as_u32() - 1 - self.date_offset) as usize;
        let k = (transaction.moment.as_u64() - 1 - self.moment_offset) as usize;
        for (account, value) in &transaction.entries {
            self.arr.set(account.index() as usize - 1, j, k, *value);
        }
        if !transaction.metadata.is_empty() {
            self.metadata[j][k] = transaction.metadata.clone();
        }
    }

    /// Rebuild the transaction stored in the `(j, k)` date/moment cell
    /// column. Entries may be empty when the column holds no values.
    fn cell_transaction(&self, j: usize, k: usize) -> Transaction {
        let (accounts, _, _) = self.arr.dimensions();
        let mut entries = Entries::new();
        for i in 0..accounts {
            let value = self.arr.get(i, j, k);
            if value != 0 {
                entries.insert(Account::new(i as u32 + 1), value);
            }
        }
        Transaction {
            moment: Moment::new(self.moment_offset + k as u64 + 1),
            date: Date::new(self.date_offset + j as u32 + 1),
            entries,
            metadata: self.metadata[j][k].clone(),
        }
    }
}

#[async_trait]
impl Space for SmallSpace {
    /// Merge a foreign space. Costs two full scans of `source`: one to
    /// discover the bounding envelope (so the merged array is allocated
    /// once, correctly sized), one to embed the values. The source must
    /// therefore support restartable scans; a consumed-once
    /// [`crate::ChannelSpace`] cannot be appended here. Source dates
    /// and moments must be at least 1.
    async fn append(&mut self, source: &dyn Space) -> Result<()> {
        let mut envelope = Envelope::new();
        envelope.observe_extents(self);
        let mut scan = source.transactions();
        while let Some(t) = scan.next().await {
            envelope.observe(&t);
        }
        scan.finish().await?;
        if envelope.is_empty() {
            return Ok(());
        }
        self.rebase(&envelope);

        let mut scan = source.transactions();
        while let Some(t) = scan.next().await {
            self.insert(&t);
        }
        scan.finish().await
    }

    fn slice(
        &self,
        accounts: &[Account],
        dates: &[DateRange],
        moments: &[MomentRange],
    ) -> Result<Box<dyn Space>> {
        let mut result = self.clone();
        let (x, y, z) = result.arr.dimensions();
        for j in 0..y {
            for k in 0..z {
                let date = Date::new(self.date_offset + j as u32 + 1);
                let moment = Moment::new(self.moment_offset + k as u64 + 1);
                let in_windows = dates.iter().any(|r| r.contains(date))
                    && moments.iter().any(|r| r.contains(moment));
                let keep = in_windows
                    && (0..x).any(|i| {
                        account_matches(accounts, Account::new(i as u32 + 1))
                            && result.arr.get(i, j, k) != 0
                    });
                if !keep {
                    for i in 0..x {
                        result.arr.set(i, j, k, 0);
                    }
                    result.metadata[j][k].clear();
                }
            }
        }
        Ok(Box::new(result))
    }

    fn projection(
        &self,
        accounts: &[Account],
        dates: &[DateRange],
        moments: &[MomentRange],
    ) -> Result<Box<dyn Space>> {
        let mut buckets: BTreeMap<(u64, u32), Entries> = BTreeMap::new();
        let (_, y, z) = self.arr.dimensions();
        for k in 0..z {
            for j in 0..y {
                let t = self.cell_transaction(j, k);
                if t.entries.is_empty() || !t.matches(accounts, dates, moments) {
                    continue;
                }
                let moment_window = moments.iter().find(|r| r.contains(t.moment));
                let date_window = dates.iter().find(|r| r.contains(t.date));
                let (Some(mw), Some(dw)) = (moment_window, date_window) else {
                    continue;
                };
                let bucket = buckets
                    .entry((mw.start.as_u64(), dw.start.as_u32()))
                    .or_default();
                for (account, value) in &t.entries {
                    *bucket.entry(*account).or_insert(0) += value;
                }
            }
        }

        let transactions: Vec<Transaction> = buckets
            .into_iter()
            .map(|((moment, date), entries)| Transaction {
                moment: Moment::new(moment),
                date: Date::new(date),
                entries,
                metadata: Vec::new(),
            })
            .collect();
        Ok(Box::new(SmallSpace::from_transactions(&transactions)))
    }

    fn transactions(&self) -> TransactionStream {
        let (tx, done, stream) = TransactionStream::channel();
        let space = self.clone();
        tokio::spawn(async move {
            if !space.arr.is_empty() {
                let (_, y, z) = space.arr.dimensions();
                for k in 0..z {
                    for j in 0..y {
                        let t = space.cell_transaction(j, k);
                        if t.entries.is_empty() {
                            continue;
                        }
                        if tx.send(t).await.is_err() {
                            return;
                        }
                    }
                }
            }
            let _ = done.send(Ok(()));
        });
        stream
    }
}
